use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::clock::as_millis;
use crate::error::{QuizError, Result};
use crate::question::{ConfidenceRating, Question, QuestionId};
use crate::source::{AnswerRequest, AnswerResponse, QuestionPayload, SubmissionEntry};

/// When a question counts as done for the purpose of finishing the quiz
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
pub enum CompletionRule {
    /// an option has been chosen
    Chosen,
    /// an option and a confidence rating have been chosen
    ChosenWithConfidence,
    /// the answer has been submitted and revealed
    Marked,
}

impl CompletionRule {
    pub fn is_satisfied(self, question: &Question) -> bool {
        match self {
            CompletionRule::Chosen => question.choice().has_chosen(),
            CompletionRule::ChosenWithConfidence => {
                question.choice().has_chosen() && question.confidence().has_chosen()
            }
            CompletionRule::Marked => question.is_completed(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    Complete,
    Incomplete { remaining: usize },
}

/// Ask the question source for the question at `position`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    pub position: usize,
    pub excluded: Vec<QuestionId>,
}

/// Outcome of handing a response to the manager
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Applied,
    /// nobody was waiting for it any more
    Stale,
}

/// Owns every question of a quiz, in position order.
#[derive(Clone, Debug)]
pub struct QuestionManager {
    slots: Vec<Option<Question>>,
    rule: CompletionRule,
    loading: BTreeSet<usize>,
    awaiting_answer: HashMap<QuestionId, usize>,
    ready: bool,
}

impl QuestionManager {
    pub fn new(count: usize, rule: CompletionRule) -> Self {
        Self {
            slots: vec![None; count],
            rule,
            loading: BTreeSet::new(),
            awaiting_answer: HashMap::new(),
            ready: count == 0,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn rule(&self) -> CompletionRule {
        self.rule
    }

    pub fn question(&self, position: usize) -> Option<&Question> {
        self.slots.get(position.checked_sub(1)?)?.as_ref()
    }

    fn question_mut(&mut self, position: usize) -> Option<&mut Question> {
        self.slots.get_mut(position.checked_sub(1)?)?.as_mut()
    }

    pub fn questions(&self) -> impl Iterator<Item = &Question> {
        self.slots.iter().flatten()
    }

    pub fn is_loaded(&self, position: usize) -> bool {
        self.question(position).is_some()
    }

    pub fn is_loading(&self, position: usize) -> bool {
        self.loading.contains(&position)
    }

    pub fn position_of(&self, id: QuestionId) -> Option<usize> {
        self.questions().find(|q| q.id() == id).map(Question::position)
    }

    /// Screen 1 is the intro; question `p` sits on screen `p + 1`.
    pub fn position_for_screen(&self, screen: usize) -> Option<usize> {
        let position = screen.checked_sub(1)?;
        (1..=self.len()).contains(&position).then_some(position)
    }

    /// The question on the active screen.
    ///
    /// Panics when the screen holds no materialised question: callers must
    /// only ask while a question screen is active.
    pub fn active_question(&self, screen: usize) -> &Question {
        self.position_for_screen(screen)
            .and_then(|p| self.question(p))
            .unwrap_or_else(|| panic!("no active question on screen {screen}"))
    }

    /// Place a whole batch of payloads by their positions.
    pub fn add_batch(&mut self, payloads: Vec<QuestionPayload>) -> Result<()> {
        for payload in &payloads {
            if payload.position == 0 || payload.position > self.len() {
                return Err(QuizError::Protocol(format!(
                    "question {} reported at position {} of {}",
                    payload.id,
                    payload.position,
                    self.len()
                )));
            }
        }
        for payload in payloads {
            let position = payload.position;
            if self.is_loaded(position) {
                return Err(QuizError::Protocol(format!(
                    "position {position} delivered twice"
                )));
            }
            self.slots[position - 1] = Some(Question::from_payload(payload));
        }
        self.refresh_completion();
        Ok(())
    }

    /// Lazy delivery: request the question for `position` unless it is
    /// already present or on its way.
    pub fn ensure_loaded(&mut self, position: usize) -> Option<FetchRequest> {
        if position == 0 || position > self.len() {
            return None;
        }
        if self.is_loaded(position) || self.loading.contains(&position) {
            return None;
        }
        self.loading.insert(position);
        Some(FetchRequest {
            position,
            excluded: self.answered_ids(),
        })
    }

    pub fn deliver_question(&mut self, position: usize, payload: QuestionPayload) -> Result<Delivery> {
        if !self.loading.remove(&position) {
            debug!(position, id = payload.id, "dropping unrequested question");
            return Ok(Delivery::Stale);
        }
        if payload.position != position {
            return Err(QuizError::Protocol(format!(
                "requested position {position} but received {}",
                payload.position
            )));
        }
        if self.position_of(payload.id).is_some() {
            return Err(QuizError::Protocol(format!(
                "question {} is already in this quiz",
                payload.id
            )));
        }
        self.slots[position - 1] = Some(Question::from_payload(payload));
        self.refresh_completion();
        Ok(Delivery::Applied)
    }

    pub fn fetch_failed(&mut self, position: usize) {
        self.loading.remove(&position);
    }

    pub fn select_option(&mut self, position: usize, label: &str, now: Instant) -> Option<Completion> {
        let question = self.question_mut(position)?;
        if !question.select_option(label) {
            return None;
        }
        if question.timer().is_running() {
            question.timer_mut().lap(now);
        }
        Some(self.refresh_completion())
    }

    pub fn select_confidence(&mut self, position: usize, rating: ConfidenceRating) -> Option<Completion> {
        let question = self.question_mut(position)?;
        if !question.select_confidence(rating) {
            return None;
        }
        Some(self.refresh_completion())
    }

    pub fn remaining(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| !slot.as_ref().is_some_and(|q| self.rule.is_satisfied(q)))
            .count()
    }

    pub fn ready_to_finish(&self) -> bool {
        self.ready
    }

    /// Recount after any change; the predicate is global, so every
    /// question is re-evaluated.
    pub fn refresh_completion(&mut self) -> Completion {
        let remaining = self.remaining();
        self.ready = remaining == 0;
        if self.ready {
            Completion::Complete
        } else {
            Completion::Incomplete { remaining }
        }
    }

    pub fn answered_ids(&self) -> Vec<QuestionId> {
        self.questions()
            .filter(|q| q.is_completed())
            .map(Question::id)
            .collect()
    }

    pub fn is_awaiting_answer(&self, position: usize) -> bool {
        self.awaiting_answer.values().any(|p| *p == position)
    }

    /// Stop the clock on `position` and build its answer submission.
    pub fn begin_answer(
        &mut self,
        position: usize,
        attempt_id: Option<String>,
        now: Instant,
    ) -> Option<AnswerRequest> {
        if self.is_awaiting_answer(position) {
            return None;
        }
        let question = self.question_mut(position)?;
        if question.is_completed() {
            return None;
        }
        question.timer_mut().stop(now);
        let request = AnswerRequest {
            attempt_id,
            question_id: question.id(),
            position,
            choice: question.chosen_option().map(str::to_string),
            confidence_rating: question.confidence_rating(),
            time_taken_ms: as_millis(question.time_taken()),
        };
        self.awaiting_answer.insert(request.question_id, position);
        Some(request)
    }

    pub fn deliver_answer(
        &mut self,
        question_id: QuestionId,
        response: Result<AnswerResponse>,
    ) -> Result<Delivery> {
        let Some(position) = self.awaiting_answer.remove(&question_id) else {
            warn!(question_id, "dropping stale answer response");
            return Ok(Delivery::Stale);
        };
        let response = response?.into_result()?;
        let question = self
            .question_mut(position)
            .ok_or_else(|| QuizError::Protocol(format!("answer for unknown question {question_id}")))?;
        question.mark(response);
        self.refresh_completion();
        Ok(Delivery::Applied)
    }

    /// Start or continue the visit timer, unless the question is done or
    /// its answer is being checked
    pub fn start_timer(&mut self, position: usize, now: Instant) {
        if self.is_awaiting_answer(position) {
            return;
        }
        if let Some(q) = self.question_mut(position) {
            if !q.is_completed() {
                q.timer_mut().start(now);
            }
        }
    }

    pub fn stop_timer(&mut self, position: usize, now: Instant) {
        if let Some(q) = self.question_mut(position) {
            q.timer_mut().stop(now);
        }
    }

    pub fn pause_timer(&mut self, position: usize, now: Instant) {
        if let Some(q) = self.question_mut(position) {
            q.timer_mut().pause(now);
        }
    }

    pub fn submission_entries(&self) -> Vec<SubmissionEntry> {
        self.questions()
            .map(|q| SubmissionEntry {
                question_id: q.id(),
                position: q.position(),
                choice: q.chosen_option().map(str::to_string),
                confidence_rating: q.confidence_rating(),
                time_taken_ms: as_millis(q.time_taken()),
            })
            .collect()
    }

    /// Correct answers among the questions whose answer is known
    pub fn score(&self) -> (usize, usize) {
        self.questions()
            .filter_map(Question::score)
            .fold((0, 0), |(correct, known), s| (correct + s as usize, known + 1))
    }
}
