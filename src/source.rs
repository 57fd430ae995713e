use std::collections::HashMap;
use std::fs;
use std::path::Path;

use include_dir::{include_dir, Dir};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{QuizError, Result};
use crate::question::{ConfidenceRating, OptionSet, QuestionId};
use crate::session::DeliveryMode;

static BANK_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/src/banks");

/// A question as delivered by the question source
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QuestionPayload {
    pub id: QuestionId,
    pub position: usize,
    pub body: String,
    pub options: OptionSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<OptionSet>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnswerRequest {
    pub attempt_id: Option<String>,
    pub question_id: QuestionId,
    pub position: usize,
    pub choice: Option<String>,
    pub confidence_rating: Option<ConfidenceRating>,
    pub time_taken_ms: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    #[default]
    Success,
    Error,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub status: ResponseStatus,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub explanation: Option<OptionSet>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub choice: Option<String>,
    #[serde(default)]
    pub confidence_rating: Option<u8>,
    #[serde(default)]
    pub message: Option<String>,
}

impl AnswerResponse {
    /// Collapse an `"error"` status into a server error
    pub fn into_result(self) -> Result<Self> {
        match self.status {
            ResponseStatus::Success => Ok(self),
            ResponseStatus::Error => Err(QuizError::Server {
                message: self.message.unwrap_or_else(|| "unknown error".to_string()),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptInfo {
    pub attempt_id: String,
    pub report_url: String,
}

/// One row of the final batch submission
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubmissionEntry {
    pub question_id: QuestionId,
    pub position: usize,
    pub choice: Option<String>,
    pub confidence_rating: Option<ConfidenceRating>,
    pub time_taken_ms: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinalSubmission {
    pub attempt_id: Option<String>,
    pub mode: DeliveryMode,
    pub entries: Vec<SubmissionEntry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttemptReport {
    pub attempt_id: String,
    pub report_url: String,
    pub total: usize,
    pub answered: usize,
    pub correct: usize,
    pub total_time_ms: u64,
}

impl AttemptReport {
    pub fn score(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.correct as f64 / self.total as f64
    }
}

pub trait QuestionSource {
    fn fetch_all_questions(&mut self) -> Result<Vec<QuestionPayload>>;

    /// Fetch one question for `position`, skipping the ids already answered.
    fn fetch_next_question(
        &mut self,
        position: usize,
        specification: Option<&str>,
        excluded: &[QuestionId],
    ) -> Result<QuestionPayload>;
}

pub trait AnswerSubmitter {
    fn submit_answer(&mut self, request: &AnswerRequest) -> Result<AnswerResponse>;
}

pub trait AttemptLifecycle {
    fn start_attempt(&mut self, specification: Option<&str>) -> Result<AttemptInfo>;
}

pub trait FinalSubmitter {
    fn submit_final(&mut self, submission: &FinalSubmission) -> Result<AttemptReport>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BankQuestion {
    pub id: QuestionId,
    pub body: String,
    pub options: OptionSet,
    pub answer: String,
    #[serde(default)]
    pub explanation: Option<OptionSet>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BankFile {
    pub name: String,
    pub questions: Vec<BankQuestion>,
}

#[derive(Clone, Debug, PartialEq)]
struct StoredAnswer {
    choice: Option<String>,
    confidence_rating: Option<ConfidenceRating>,
    time_taken_ms: u64,
}

#[derive(Clone, Debug, Default)]
struct AttemptRecord {
    served: Vec<QuestionId>,
    answers: HashMap<QuestionId, StoredAnswer>,
}

/// In-memory question source and answer store backed by a JSON bank.
#[derive(Clone, Debug)]
pub struct QuestionBank {
    name: String,
    questions: Vec<BankQuestion>,
    shuffle: bool,
    limit: Option<usize>,
    report_base_url: String,
    attempts: HashMap<String, AttemptRecord>,
    current_attempt: Option<String>,
    next_attempt: u64,
}

pub const DEFAULT_REPORT_BASE_URL: &str = "http://localhost:8000/quiz/attempt";

impl QuestionBank {
    pub fn from_bank_file(bank: BankFile) -> Result<Self> {
        if bank.questions.is_empty() {
            return Err(QuizError::Config(format!(
                "question bank '{}' is empty",
                bank.name
            )));
        }
        for q in &bank.questions {
            if !q.options.contains(&q.answer) {
                return Err(QuizError::Config(format!(
                    "question {} answer '{}' is not one of its options",
                    q.id, q.answer
                )));
            }
        }
        Ok(Self {
            name: bank.name,
            questions: bank.questions,
            shuffle: false,
            limit: None,
            report_base_url: DEFAULT_REPORT_BASE_URL.to_string(),
            attempts: HashMap::new(),
            current_attempt: None,
            next_attempt: 1,
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_bank_file(serde_json::from_str(json)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// Load one of the banks compiled into the binary
    pub fn bundled(name: &str) -> Result<Self> {
        let file = BANK_DIR
            .get_file(format!("{name}.json"))
            .ok_or_else(|| QuizError::Config(format!("no bundled bank named '{name}'")))?;
        let json = file
            .contents_utf8()
            .ok_or_else(|| QuizError::Config(format!("bank '{name}' is not valid UTF-8")))?;
        Self::from_json(json)
    }

    pub fn bundled_names() -> Vec<String> {
        let mut names: Vec<String> = BANK_DIR
            .files()
            .filter_map(|f| f.path().file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_report_base_url<S: Into<String>>(mut self, base: S) -> Self {
        self.report_base_url = base.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of questions a quiz drawn from this bank will have
    pub fn quiz_length(&self) -> usize {
        match self.limit {
            Some(limit) => limit.min(self.questions.len()),
            None => self.questions.len(),
        }
    }

    fn find(&self, id: QuestionId) -> Option<&BankQuestion> {
        self.questions.iter().find(|q| q.id == id)
    }

    fn report_url(&self, attempt_id: &str) -> String {
        format!("{}/{}/report", self.report_base_url.trim_end_matches('/'), attempt_id)
    }

    fn ensure_attempt(&mut self) -> String {
        if let Some(id) = &self.current_attempt {
            return id.clone();
        }
        let id = format!("attempt-{}", self.next_attempt);
        self.next_attempt += 1;
        self.attempts.insert(id.clone(), AttemptRecord::default());
        self.current_attempt = Some(id.clone());
        id
    }

    fn attempt_mut(&mut self, attempt_id: Option<&str>) -> Result<(String, &mut AttemptRecord)> {
        let id = match attempt_id {
            Some(id) => id.to_string(),
            None => self.ensure_attempt(),
        };
        let record = self.attempts.get_mut(&id).ok_or_else(|| QuizError::Server {
            message: "Not found.".to_string(),
        })?;
        Ok((id, record))
    }

    fn payload_for(&self, q: &BankQuestion, position: usize, stored: Option<&StoredAnswer>) -> QuestionPayload {
        let mut payload = QuestionPayload {
            id: q.id,
            position,
            body: q.body.clone(),
            options: q.options.clone(),
            ..QuestionPayload::default()
        };
        if let Some(stored) = stored {
            payload.completed = true;
            payload.answer = Some(q.answer.clone());
            payload.explanation = q.explanation.clone();
            payload.choice = stored.choice.clone();
            payload.confidence_rating = stored.confidence_rating.map(ConfidenceRating::value);
        }
        payload
    }

    /// Score an attempt against the answer key
    pub fn report(&self, attempt_id: &str) -> Result<AttemptReport> {
        let record = self.attempts.get(attempt_id).ok_or_else(|| QuizError::Server {
            message: "Not found.".to_string(),
        })?;
        let correct = record
            .answers
            .iter()
            .filter(|(id, a)| {
                self.find(**id)
                    .is_some_and(|q| a.choice.as_deref() == Some(q.answer.as_str()))
            })
            .count();
        Ok(AttemptReport {
            attempt_id: attempt_id.to_string(),
            report_url: self.report_url(attempt_id),
            total: record.served.len().max(record.answers.len()),
            answered: record.answers.values().filter(|a| a.choice.is_some()).count(),
            correct,
            total_time_ms: record.answers.values().map(|a| a.time_taken_ms).sum(),
        })
    }

    pub fn current_attempt(&self) -> Option<&str> {
        self.current_attempt.as_deref()
    }

    pub fn answer_for(&self, id: QuestionId) -> Option<&str> {
        self.find(id).map(|q| q.answer.as_str())
    }
}

impl QuestionSource for QuestionBank {
    fn fetch_all_questions(&mut self) -> Result<Vec<QuestionPayload>> {
        let mut order: Vec<QuestionId> = {
            let attempt_id = self.ensure_attempt();
            let record = &self.attempts[&attempt_id];
            record.served.clone()
        };

        if order.is_empty() {
            order = self.questions.iter().map(|q| q.id).collect();
            if self.shuffle {
                order.shuffle(&mut rand::thread_rng());
            }
            order.truncate(self.quiz_length());
            let (_, record) = self.attempt_mut(None)?;
            record.served = order.clone();
        }

        let (_, record) = self.attempt_mut(None)?;
        let record = record.clone();
        let payloads = order
            .iter()
            .enumerate()
            .filter_map(|(i, id)| {
                self.find(*id)
                    .map(|q| self.payload_for(q, i + 1, record.answers.get(id)))
            })
            .collect::<Vec<_>>();
        info!(bank = %self.name, count = payloads.len(), "served question batch");
        Ok(payloads)
    }

    fn fetch_next_question(
        &mut self,
        position: usize,
        _specification: Option<&str>,
        excluded: &[QuestionId],
    ) -> Result<QuestionPayload> {
        let (_, record) = self.attempt_mut(None)?;
        let served = record.served.clone();
        let candidates: Vec<&BankQuestion> = self
            .questions
            .iter()
            .filter(|q| !excluded.contains(&q.id) && !served.contains(&q.id))
            .collect();
        let picked = if self.shuffle {
            candidates.choose(&mut rand::thread_rng()).copied()
        } else {
            candidates.first().copied()
        };
        let Some(question) = picked.cloned() else {
            return Err(QuizError::Server {
                message: "No more questions.".to_string(),
            });
        };
        debug!(id = question.id, position, "serving next question");
        let (_, record) = self.attempt_mut(None)?;
        record.served.push(question.id);
        Ok(self.payload_for(&question, position, None))
    }
}

impl AnswerSubmitter for QuestionBank {
    fn submit_answer(&mut self, request: &AnswerRequest) -> Result<AnswerResponse> {
        let Some(question) = self.find(request.question_id).cloned() else {
            return Ok(AnswerResponse {
                status: ResponseStatus::Error,
                message: Some("Not found.".to_string()),
                ..AnswerResponse::default()
            });
        };
        let (_, record) = self.attempt_mut(request.attempt_id.as_deref())?;
        if record.answers.contains_key(&request.question_id) {
            return Ok(AnswerResponse {
                status: ResponseStatus::Error,
                message: Some("Question already answered for this quiz.".to_string()),
                ..AnswerResponse::default()
            });
        }
        if !record.served.contains(&request.question_id) {
            record.served.push(request.question_id);
        }
        record.answers.insert(
            request.question_id,
            StoredAnswer {
                choice: request.choice.clone(),
                confidence_rating: request.confidence_rating,
                time_taken_ms: request.time_taken_ms,
            },
        );
        Ok(AnswerResponse {
            status: ResponseStatus::Success,
            answer: Some(question.answer.clone()),
            explanation: question.explanation.clone(),
            completed: true,
            choice: request.choice.clone(),
            confidence_rating: Some(
                request
                    .confidence_rating
                    .map(ConfidenceRating::value)
                    .unwrap_or(ConfidenceRating::DEFAULT_VALUE),
            ),
            message: None,
        })
    }
}

impl AttemptLifecycle for QuestionBank {
    fn start_attempt(&mut self, _specification: Option<&str>) -> Result<AttemptInfo> {
        self.current_attempt = None;
        let attempt_id = self.ensure_attempt();
        info!(%attempt_id, "attempt started");
        Ok(AttemptInfo {
            report_url: self.report_url(&attempt_id),
            attempt_id,
        })
    }
}

impl FinalSubmitter for QuestionBank {
    fn submit_final(&mut self, submission: &FinalSubmission) -> Result<AttemptReport> {
        let (attempt_id, record) = self.attempt_mut(submission.attempt_id.as_deref())?;
        for entry in &submission.entries {
            // answers already recorded through submit_answer stay as they are
            record
                .answers
                .entry(entry.question_id)
                .or_insert_with(|| StoredAnswer {
                    choice: entry.choice.clone(),
                    confidence_rating: entry.confidence_rating,
                    time_taken_ms: entry.time_taken_ms,
                });
            if !record.served.contains(&entry.question_id) {
                record.served.push(entry.question_id);
            }
        }
        self.current_attempt = None;
        self.report(&attempt_id)
    }
}
