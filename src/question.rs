use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::choice::ChoiceWidget;
use crate::question_timer::QuestionTimer;
use crate::source::{AnswerResponse, QuestionPayload};

pub type QuestionId = u64;

/// Ordered option labels with the explanatory text for each label.
///
/// On the wire this is `{"labels": ["A", "B"], "A": "...", "B": "..."}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionSet {
    pub labels: Vec<String>,
    #[serde(flatten)]
    pub text: BTreeMap<String, String>,
}

impl OptionSet {
    pub fn new<L: Into<String>, T: Into<String>>(entries: Vec<(L, T)>) -> Self {
        let mut labels = Vec::with_capacity(entries.len());
        let mut text = BTreeMap::new();
        for (label, body) in entries {
            let label = label.into();
            text.insert(label.clone(), body.into());
            labels.push(label);
        }
        Self { labels, text }
    }

    pub fn text_for(&self, label: &str) -> &str {
        self.text.get(label).map(String::as_str).unwrap_or("")
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum ConfidenceRating {
    #[strum(serialize = "I'm guessing")]
    Guess = 1,
    #[strum(serialize = "I'm doubtful")]
    Unsure = 2,
    #[strum(serialize = "I'm feeling neutral")]
    Neutral = 3,
    #[strum(serialize = "I'm fairly sure")]
    Sure = 4,
    #[strum(serialize = "I'm certain")]
    Certain = 5,
}

impl ConfidenceRating {
    pub const ALL: [ConfidenceRating; 5] = [
        ConfidenceRating::Guess,
        ConfidenceRating::Unsure,
        ConfidenceRating::Neutral,
        ConfidenceRating::Sure,
        ConfidenceRating::Certain,
    ];

    /// Value submitted when no rating was chosen
    pub const DEFAULT_VALUE: u8 = 0;

    pub fn value(self) -> u8 {
        self as u8
    }

    pub fn from_value(value: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.value() == value)
    }
}

impl TryFrom<u8> for ConfidenceRating {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_value(value).ok_or_else(|| format!("invalid confidence rating {value}"))
    }
}

impl From<ConfidenceRating> for u8 {
    fn from(r: ConfidenceRating) -> Self {
        r.value()
    }
}

/// One question of a quiz and the user's interaction with it.
#[derive(Clone, Debug)]
pub struct Question {
    id: QuestionId,
    position: usize,
    body: String,
    options: OptionSet,
    choice: ChoiceWidget<String>,
    confidence: ChoiceWidget<ConfidenceRating>,
    timer: QuestionTimer,
    correct_answer: Option<String>,
    explanation: Option<OptionSet>,
    completed: bool,
}

impl Question {
    pub fn from_payload(payload: QuestionPayload) -> Self {
        let choice = ChoiceWidget::new(payload.options.labels.clone());
        let confidence = ChoiceWidget::new(ConfidenceRating::ALL.to_vec());
        let mut question = Self {
            id: payload.id,
            position: payload.position,
            body: payload.body,
            options: payload.options,
            choice,
            confidence,
            timer: QuestionTimer::new(),
            correct_answer: None,
            explanation: payload.explanation,
            completed: false,
        };

        if payload.completed {
            question.choice.preset(payload.choice.filter(|c| !c.is_empty()));
            question
                .confidence
                .preset(payload.confidence_rating.and_then(ConfidenceRating::from_value));
            question.complete_with(payload.answer);
        } else if let Some(answer) = payload.answer {
            // known up front but not yet revealed to the user
            question.correct_answer = Some(answer);
        }
        question
    }

    pub fn id(&self) -> QuestionId {
        self.id
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn options(&self) -> &OptionSet {
        &self.options
    }

    pub fn choice(&self) -> &ChoiceWidget<String> {
        &self.choice
    }

    pub fn confidence(&self) -> &ChoiceWidget<ConfidenceRating> {
        &self.confidence
    }

    pub fn chosen_option(&self) -> Option<&str> {
        self.choice.current().map(String::as_str)
    }

    pub fn confidence_rating(&self) -> Option<ConfidenceRating> {
        self.confidence.current().copied()
    }

    pub fn explanation(&self) -> Option<&OptionSet> {
        self.explanation.as_ref()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn is_revealed(&self) -> bool {
        self.choice.revealed().is_some()
    }

    pub fn time_taken(&self) -> Duration {
        self.timer.time_taken()
    }

    pub fn live_elapsed(&self, now: Instant) -> Duration {
        self.timer.live_elapsed(now)
    }

    pub fn timer(&self) -> &QuestionTimer {
        &self.timer
    }

    /// 1 for a correct revealed answer, 0 for a wrong one, None until known
    pub fn score(&self) -> Option<u8> {
        let correct = self.correct_answer.as_ref()?;
        Some(u8::from(self.chosen_option() == Some(correct.as_str())))
    }

    pub fn correct_answer(&self) -> Option<&str> {
        self.correct_answer.as_deref()
    }

    pub(crate) fn select_option(&mut self, label: &str) -> bool {
        self.choice.select(&label.to_string())
    }

    pub(crate) fn select_confidence(&mut self, rating: ConfidenceRating) -> bool {
        self.confidence.select(&rating)
    }

    pub(crate) fn timer_mut(&mut self) -> &mut QuestionTimer {
        &mut self.timer
    }

    /// Apply a successful answer submission.
    pub(crate) fn mark(&mut self, response: AnswerResponse) {
        if response.explanation.is_some() {
            self.explanation = response.explanation;
        }
        self.complete_with(response.answer);
    }

    fn complete_with(&mut self, answer: Option<String>) {
        if let Some(answer) = answer.or_else(|| self.correct_answer.clone()) {
            self.correct_answer = Some(answer.clone());
            self.choice.reveal(answer);
        } else {
            self.choice.disable();
        }
        self.confidence.disable();
        self.completed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> QuestionPayload {
        QuestionPayload {
            id: 42,
            position: 1,
            body: "Which nerve innervates deltoid?".into(),
            options: OptionSet::new(vec![
                ("A", "Radial"),
                ("B", "Axillary"),
                ("C", "Median"),
            ]),
            answer: None,
            completed: false,
            choice: None,
            confidence_rating: None,
            explanation: None,
        }
    }

    #[test]
    fn test_option_set_wire_shape() {
        let json = r#"{"labels": ["A", "B"], "A": "first", "B": "second"}"#;
        let set: OptionSet = serde_json::from_str(json).unwrap();

        assert_eq!(set.labels, vec!["A", "B"]);
        assert_eq!(set.text_for("B"), "second");
        assert_eq!(set.text_for("Z"), "");

        let back = serde_json::to_value(&set).unwrap();
        assert_eq!(back["A"], "first");
        assert_eq!(back["labels"][1], "B");
    }

    #[test]
    fn test_confidence_rating_values() {
        assert_eq!(ConfidenceRating::Guess.value(), 1);
        assert_eq!(ConfidenceRating::from_value(5), Some(ConfidenceRating::Certain));
        assert_eq!(ConfidenceRating::from_value(0), None);
        assert_eq!(ConfidenceRating::Sure.to_string(), "I'm fairly sure");

        let r: ConfidenceRating = serde_json::from_str("3").unwrap();
        assert_eq!(r, ConfidenceRating::Neutral);
        assert!(serde_json::from_str::<ConfidenceRating>("9").is_err());
    }

    #[test]
    fn test_new_question_is_open() {
        let q = Question::from_payload(payload());

        assert_eq!(q.id(), 42);
        assert!(!q.is_completed());
        assert!(!q.choice().has_chosen());
        assert_eq!(q.score(), None);
        assert_eq!(q.time_taken(), Duration::ZERO);
    }

    #[test]
    fn test_completed_payload_restores_state() {
        let mut p = payload();
        p.completed = true;
        p.choice = Some("A".into());
        p.confidence_rating = Some(4);
        p.answer = Some("B".into());

        let q = Question::from_payload(p);

        assert!(q.is_completed());
        assert_eq!(q.chosen_option(), Some("A"));
        assert_eq!(q.confidence_rating(), Some(ConfidenceRating::Sure));
        assert_eq!(q.choice().displayed(), Some(&"B".to_string()));
        assert!(q.choice().is_disabled());
        assert!(q.confidence().is_disabled());
        assert_eq!(q.score(), Some(0));
    }

    #[test]
    fn test_completed_payload_with_empty_choice() {
        let mut p = payload();
        p.completed = true;
        p.choice = Some(String::new());
        p.confidence_rating = Some(0);
        p.answer = Some("C".into());

        let q = Question::from_payload(p);

        assert_eq!(q.chosen_option(), None);
        assert_eq!(q.confidence_rating(), None);
        assert_eq!(q.score(), Some(0));
    }

    #[test]
    fn test_mark_reveals_and_freezes() {
        let mut q = Question::from_payload(payload());
        q.select_option("B");
        q.mark(AnswerResponse {
            answer: Some("B".into()),
            completed: true,
            ..AnswerResponse::default()
        });

        assert!(q.is_completed());
        assert!(q.is_revealed());
        assert_eq!(q.score(), Some(1));
        assert!(!q.select_option("A"));
        assert!(!q.select_confidence(ConfidenceRating::Guess));
    }

    #[test]
    fn test_answer_known_up_front_is_not_revealed() {
        let mut p = payload();
        p.answer = Some("B".into());
        let mut q = Question::from_payload(p);

        assert!(!q.is_revealed());
        assert!(q.select_option("B"));
        assert_eq!(q.score(), Some(1));
    }
}
