use serde::Serialize;
use std::fs::OpenOptions;
use std::path::Path;

use crate::error::Result;
use crate::history::FinishedAttempt;
use crate::question::ConfidenceRating;

#[derive(Debug, Serialize)]
struct LogRow<'a> {
    date: String,
    attempt_id: &'a str,
    mode: String,
    bank: &'a str,
    position: usize,
    question_id: u64,
    choice: &'a str,
    confidence_rating: u8,
    time_taken_ms: u64,
    correct: Option<bool>,
}

/// Append one row per question of `attempt` to the CSV log at `path`.
///
/// The header is written only when the file is new.
pub fn append_attempt<P: AsRef<Path>>(path: P, attempt: &FinishedAttempt) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let needs_header = !path.exists();

    let file = OpenOptions::new().append(true).create(true).open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_header)
        .from_writer(file);

    let date = attempt.finished_at.format("%Y-%m-%d %H:%M:%S").to_string();
    for entry in &attempt.entries {
        writer.serialize(LogRow {
            date: date.clone(),
            attempt_id: &attempt.attempt_id,
            mode: attempt.mode.to_string(),
            bank: &attempt.bank,
            position: entry.position,
            question_id: entry.question_id,
            choice: entry.choice.as_deref().unwrap_or(""),
            confidence_rating: entry
                .confidence_rating
                .map(ConfidenceRating::value)
                .unwrap_or(ConfidenceRating::DEFAULT_VALUE),
            time_taken_ms: entry.time_taken_ms,
            correct: entry.correct,
        })?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoryEntry;
    use crate::session::DeliveryMode;
    use chrono::Local;
    use tempfile::tempdir;

    fn attempt(id: &str) -> FinishedAttempt {
        FinishedAttempt {
            attempt_id: id.to_string(),
            mode: DeliveryMode::Preset,
            bank: "anatomy".into(),
            finished_at: Local::now(),
            entries: vec![
                HistoryEntry {
                    question_id: 101,
                    position: 1,
                    choice: Some("B".into()),
                    confidence_rating: Some(ConfidenceRating::Certain),
                    time_taken_ms: 4200,
                    correct: Some(true),
                },
                HistoryEntry {
                    question_id: 102,
                    position: 2,
                    choice: None,
                    confidence_rating: None,
                    time_taken_ms: 0,
                    correct: None,
                },
            ],
        }
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log").join("attempts.csv");

        append_attempt(&path, &attempt("a-1")).unwrap();
        append_attempt(&path, &attempt("a-2")).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("date,attempt_id,mode"));
        assert_eq!(text.matches("attempt_id").count(), 1);
        assert!(lines[1].contains(",a-1,preset,anatomy,1,101,B,5,4200,true"));
        assert!(lines[2].ends_with(",a-1,preset,anatomy,2,102,,0,0,"));
    }

    #[test]
    fn test_rows_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("attempts.csv");
        append_attempt(&path, &attempt("a-1")).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][5], "101");
        assert_eq!(&rows[1][7], "0");
    }
}
