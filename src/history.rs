use chrono::{DateTime, Local};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

use crate::app_dirs::AppDirs;
use crate::error::Result;
use crate::question::{ConfidenceRating, QuestionId};
use crate::session::DeliveryMode;
use crate::source::{FinalSubmission, SubmissionEntry};
use crate::util::{mean, std_dev};

/// One answered (or skipped) question of a finished attempt
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub question_id: QuestionId,
    pub position: usize,
    pub choice: Option<String>,
    pub confidence_rating: Option<ConfidenceRating>,
    pub time_taken_ms: u64,
    /// None when the answer key was not available
    pub correct: Option<bool>,
}

/// A finished attempt ready to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedAttempt {
    pub attempt_id: String,
    pub mode: DeliveryMode,
    pub bank: String,
    pub finished_at: DateTime<Local>,
    pub entries: Vec<HistoryEntry>,
}

impl FinishedAttempt {
    /// Grade a final submission with `answer_key`.
    pub fn grade<'a, F>(submission: &FinalSubmission, bank: &str, answer_key: F) -> Self
    where
        F: Fn(QuestionId) -> Option<&'a str>,
    {
        let entries = submission
            .entries
            .iter()
            .map(|entry: &SubmissionEntry| HistoryEntry {
                question_id: entry.question_id,
                position: entry.position,
                choice: entry.choice.clone(),
                confidence_rating: entry.confidence_rating,
                time_taken_ms: entry.time_taken_ms,
                correct: answer_key(entry.question_id)
                    .map(|answer| entry.choice.as_deref() == Some(answer)),
            })
            .collect();
        Self {
            attempt_id: submission
                .attempt_id
                .clone()
                .unwrap_or_else(|| format!("local-{}", Local::now().timestamp_millis())),
            mode: submission.mode,
            bank: bank.to_string(),
            finished_at: Local::now(),
            entries,
        }
    }

    pub fn correct(&self) -> usize {
        self.entries.iter().filter(|e| e.correct == Some(true)).count()
    }

    pub fn total_time_ms(&self) -> u64 {
        self.entries.iter().map(|e| e.time_taken_ms).sum()
    }
}

/// One row of the past attempts listing
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptSummary {
    pub attempt_id: String,
    pub mode: String,
    pub bank: String,
    pub finished_at: DateTime<Local>,
    pub total: usize,
    pub correct: usize,
    pub total_time_ms: u64,
}

impl AttemptSummary {
    pub fn score(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.correct as f64 / self.total as f64
    }
}

/// Finished attempts persisted in SQLite
#[derive(Debug)]
pub struct AttemptStore {
    conn: Connection,
}

impl AttemptStore {
    /// Open the store under the state dir, creating tables if needed
    pub fn new() -> Result<Self> {
        let path = AppDirs::db_path().unwrap_or_else(|| PathBuf::from("quizdeck_history.db"));
        Self::open(path)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS attempts (
                attempt_id TEXT PRIMARY KEY,
                mode TEXT NOT NULL,
                bank TEXT NOT NULL,
                finished_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS attempt_answers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                attempt_id TEXT NOT NULL REFERENCES attempts(attempt_id),
                question_id INTEGER NOT NULL,
                position INTEGER NOT NULL,
                choice TEXT,
                confidence_rating INTEGER NOT NULL,
                time_taken_ms INTEGER NOT NULL,
                correct BOOLEAN
            );
            CREATE INDEX IF NOT EXISTS idx_attempt_answers_attempt
                ON attempt_answers(attempt_id);
            "#,
        )?;
        Ok(Self { conn })
    }

    /// Store an attempt and its answers in one transaction.
    /// Recording the same attempt twice replaces the earlier rows.
    pub fn record(&mut self, attempt: &FinishedAttempt) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM attempt_answers WHERE attempt_id = ?1",
            params![attempt.attempt_id],
        )?;
        tx.execute(
            r#"
            INSERT OR REPLACE INTO attempts (attempt_id, mode, bank, finished_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                attempt.attempt_id,
                attempt.mode.to_string(),
                attempt.bank,
                attempt.finished_at.to_rfc3339(),
            ],
        )?;
        for entry in &attempt.entries {
            tx.execute(
                r#"
                INSERT INTO attempt_answers
                (attempt_id, question_id, position, choice, confidence_rating, time_taken_ms, correct)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    attempt.attempt_id,
                    entry.question_id as i64,
                    entry.position as i64,
                    entry.choice,
                    entry
                        .confidence_rating
                        .map(ConfidenceRating::value)
                        .unwrap_or(ConfidenceRating::DEFAULT_VALUE),
                    entry.time_taken_ms as i64,
                    entry.correct,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Past attempts, most recent first
    pub fn attempt_summaries(&self) -> Result<Vec<AttemptSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT
                a.attempt_id,
                a.mode,
                a.bank,
                a.finished_at,
                COUNT(q.id),
                COALESCE(SUM(CASE WHEN q.correct = 1 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(q.time_taken_ms), 0)
            FROM attempts a
            LEFT JOIN attempt_answers q ON q.attempt_id = a.attempt_id
            GROUP BY a.attempt_id
            ORDER BY a.finished_at DESC
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            let finished_at: String = row.get(3)?;
            let finished_at = DateTime::parse_from_rfc3339(&finished_at)
                .map_err(|_| {
                    rusqlite::Error::InvalidColumnType(
                        3,
                        "finished_at".to_string(),
                        rusqlite::types::Type::Text,
                    )
                })?
                .with_timezone(&Local);
            Ok(AttemptSummary {
                attempt_id: row.get(0)?,
                mode: row.get(1)?,
                bank: row.get(2)?,
                finished_at,
                total: row.get::<_, i64>(4)? as usize,
                correct: row.get::<_, i64>(5)? as usize,
                total_time_ms: row.get::<_, i64>(6)? as u64,
            })
        })?;

        let mut summaries = Vec::new();
        for summary in rows {
            summaries.push(summary?);
        }
        Ok(summaries)
    }

    /// Mean score over every stored attempt
    pub fn average_score(&self) -> Result<Option<f64>> {
        let scores: Vec<f64> = self
            .attempt_summaries()?
            .iter()
            .map(AttemptSummary::score)
            .collect();
        Ok(mean(&scores))
    }

    /// Mean and spread of the per-question time within one attempt
    pub fn time_profile(&self, attempt_id: &str) -> Result<Option<(f64, f64)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT time_taken_ms FROM attempt_answers WHERE attempt_id = ?1")?;
        let times = stmt
            .query_map([attempt_id], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?
            .into_iter()
            .map(|ms| ms as f64)
            .collect::<Vec<f64>>();
        Ok(mean(&times).zip(std_dev(&times)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn submission(attempt_id: &str, choices: &[Option<&str>]) -> FinalSubmission {
        FinalSubmission {
            attempt_id: Some(attempt_id.to_string()),
            mode: DeliveryMode::Classic,
            entries: choices
                .iter()
                .enumerate()
                .map(|(i, c)| SubmissionEntry {
                    question_id: (i + 1) as u64,
                    position: i + 1,
                    choice: c.map(str::to_string),
                    confidence_rating: Some(ConfidenceRating::Neutral),
                    time_taken_ms: 1000 * (i as u64 + 1),
                })
                .collect(),
        }
    }

    fn key(id: QuestionId) -> Option<&'static str> {
        match id {
            1 => Some("A"),
            2 => Some("B"),
            _ => None,
        }
    }

    #[test]
    fn test_grade_marks_correctness() {
        let attempt = FinishedAttempt::grade(
            &submission("a-1", &[Some("A"), Some("C"), Some("D")]),
            "anatomy",
            key,
        );

        assert_eq!(attempt.entries[0].correct, Some(true));
        assert_eq!(attempt.entries[1].correct, Some(false));
        assert_eq!(attempt.entries[2].correct, None);
        assert_eq!(attempt.correct(), 1);
        assert_eq!(attempt.total_time_ms(), 6000);
    }

    #[test]
    fn test_record_and_summarise() {
        let mut store = AttemptStore::in_memory().unwrap();
        store
            .record(&FinishedAttempt::grade(
                &submission("a-1", &[Some("A"), Some("B")]),
                "anatomy",
                key,
            ))
            .unwrap();
        store
            .record(&FinishedAttempt::grade(
                &submission("a-2", &[Some("A"), None]),
                "anatomy",
                key,
            ))
            .unwrap();

        let summaries = store.attempt_summaries().unwrap();
        assert_eq!(summaries.len(), 2);
        let first = summaries.iter().find(|s| s.attempt_id == "a-1").unwrap();
        assert_eq!(first.total, 2);
        assert_eq!(first.correct, 2);
        assert_eq!(first.total_time_ms, 3000);
        assert_eq!(first.mode, "classic");

        assert_eq!(store.average_score().unwrap(), Some(0.75));
    }

    #[test]
    fn test_recording_twice_replaces() {
        let mut store = AttemptStore::in_memory().unwrap();
        let attempt = FinishedAttempt::grade(&submission("a-1", &[Some("A")]), "x", key);
        store.record(&attempt).unwrap();
        store.record(&attempt).unwrap();

        let summaries = store.attempt_summaries().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].total, 1);
    }

    #[test]
    fn test_empty_store() {
        let store = AttemptStore::in_memory().unwrap();
        assert!(store.attempt_summaries().unwrap().is_empty());
        assert_eq!(store.average_score().unwrap(), None);
        assert_eq!(store.time_profile("none").unwrap(), None);
    }

    #[test]
    fn test_time_profile() {
        let mut store = AttemptStore::in_memory().unwrap();
        store
            .record(&FinishedAttempt::grade(
                &submission("a-1", &[Some("A"), Some("B"), None]),
                "x",
                key,
            ))
            .unwrap();

        let (avg, spread) = store.time_profile("a-1").unwrap().unwrap();
        assert_eq!(avg, 2000.0);
        assert!(spread > 0.0);
    }

    #[test]
    fn test_persists_to_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("history.db");
        {
            let mut store = AttemptStore::open(&path).unwrap();
            store
                .record(&FinishedAttempt::grade(&submission("a-1", &[None]), "x", key))
                .unwrap();
        }
        let store = AttemptStore::open(&path).unwrap();
        assert_eq!(store.attempt_summaries().unwrap().len(), 1);
    }
}
