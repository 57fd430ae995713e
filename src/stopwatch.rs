use std::time::{Duration, Instant};

/// Elapsed-time primitive with pause/resume and lap support.
///
/// `paused` is exactly `run_started_at.is_none()`; a stopwatch that has
/// never been started (or was stopped) also reads as paused.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Stopwatch {
    accumulated: Duration,
    run_started_at: Option<Instant>,
    started: bool,
}

impl Stopwatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero the accumulator and begin running. No-op while already running.
    pub fn start(&mut self, now: Instant) {
        if self.is_running() {
            return;
        }
        self.accumulated = Duration::ZERO;
        self.run_started_at = Some(now);
        self.started = true;
    }

    pub fn pause(&mut self, now: Instant) {
        if let Some(run_start) = self.run_started_at.take() {
            self.accumulated += now.saturating_duration_since(run_start);
        }
    }

    pub fn resume(&mut self, now: Instant) {
        if self.started && self.is_paused() {
            self.run_started_at = Some(now);
        }
    }

    pub fn toggle(&mut self, now: Instant) {
        if self.is_running() {
            self.pause(now);
        } else {
            self.resume(now);
        }
    }

    /// Zero the accumulator; the run clock restarts only if running.
    pub fn reset(&mut self, now: Instant) {
        self.accumulated = Duration::ZERO;
        if self.run_started_at.is_some() {
            self.run_started_at = Some(now);
        }
    }

    pub fn stop(&mut self, now: Instant) {
        self.pause(now);
        self.started = false;
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        match self.run_started_at {
            Some(run_start) => self.accumulated + now.saturating_duration_since(run_start),
            None => self.accumulated,
        }
    }

    /// Checkpoint: hand back the current elapsed and reset, keeping the
    /// running/paused state as it was.
    pub fn lap(&mut self, now: Instant) -> Duration {
        let lap = self.elapsed(now);
        self.reset(now);
        lap
    }

    pub fn has_started(&self) -> bool {
        self.started
    }

    pub fn is_paused(&self) -> bool {
        self.run_started_at.is_none()
    }

    pub fn is_running(&self) -> bool {
        self.started && !self.is_paused()
    }
}
