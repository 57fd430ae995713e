use std::time::{Duration, Instant};

use crate::stopwatch::Stopwatch;

/// Accumulates time spent on a single question across visits.
///
/// Each visit is a run (`start` .. `stop`). Selecting an answer laps the
/// timer; once a run has lapped, stopping it does not commit the tail of
/// the visit, so time spent looking at an already answered question is
/// not counted.
#[derive(Clone, Debug, Default)]
pub struct QuestionTimer {
    stopwatch: Stopwatch,
    total: Duration,
    has_recorded_final_lap: bool,
}

impl QuestionTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a visit. A run that is already going is left alone.
    pub fn start(&mut self, now: Instant) {
        if self.stopwatch.is_running() {
            return;
        }
        if self.stopwatch.has_started() {
            // paused mid-visit: continue the same run
            self.stopwatch.resume(now);
            return;
        }
        self.has_recorded_final_lap = false;
        self.stopwatch.start(now);
    }

    pub fn pause(&mut self, now: Instant) {
        self.stopwatch.pause(now);
    }

    pub fn resume(&mut self, now: Instant) {
        self.stopwatch.resume(now);
    }

    pub fn commit(&mut self, now: Instant) {
        self.total += self.stopwatch.lap(now);
    }

    pub fn lap(&mut self, now: Instant) {
        self.commit(now);
        self.has_recorded_final_lap = true;
    }

    pub fn stop(&mut self, now: Instant) {
        if !self.stopwatch.has_started() {
            return;
        }
        if !self.has_recorded_final_lap {
            self.commit(now);
        }
        self.stopwatch.stop(now);
    }

    pub fn time_taken(&self) -> Duration {
        self.total
    }

    /// Committed total plus the uncommitted part of the current run
    pub fn live_elapsed(&self, now: Instant) -> Duration {
        if self.has_recorded_final_lap {
            self.total
        } else {
            self.total + self.stopwatch.elapsed(now)
        }
    }

    pub fn is_running(&self) -> bool {
        self.stopwatch.is_running()
    }

    pub fn is_paused(&self) -> bool {
        self.stopwatch.is_paused()
    }

    pub fn has_started(&self) -> bool {
        self.stopwatch.has_started()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_stop_without_lap_commits_visit() {
        let clock = ManualClock::new();
        let mut timer = QuestionTimer::new();

        timer.start(clock.now());
        clock.advance_ms(700);
        timer.stop(clock.now());

        assert_eq!(timer.time_taken(), ms(700));
        assert!(!timer.is_running());
    }

    #[test]
    fn test_stop_right_after_lap_does_not_double_count() {
        let clock = ManualClock::new();
        let mut timer = QuestionTimer::new();

        timer.start(clock.now());
        clock.advance_ms(400);
        timer.lap(clock.now());
        timer.stop(clock.now());

        assert_eq!(timer.time_taken(), ms(400));
    }

    #[test]
    fn test_multiple_laps_each_counted_once() {
        let clock = ManualClock::new();
        let mut timer = QuestionTimer::new();

        timer.start(clock.now());
        clock.advance_ms(100);
        timer.lap(clock.now());
        clock.advance_ms(250);
        timer.lap(clock.now());
        timer.stop(clock.now());

        assert_eq!(timer.time_taken(), ms(350));
    }

    #[test]
    fn test_tail_after_lap_is_not_counted() {
        let clock = ManualClock::new();
        let mut timer = QuestionTimer::new();

        timer.start(clock.now());
        clock.advance_ms(100);
        timer.lap(clock.now());
        clock.advance_ms(5_000);
        timer.stop(clock.now());

        assert_eq!(timer.time_taken(), ms(100));
    }

    #[test]
    fn test_total_accumulates_across_visits() {
        let clock = ManualClock::new();
        let mut timer = QuestionTimer::new();

        timer.start(clock.now());
        clock.advance_ms(100);
        timer.lap(clock.now());
        timer.stop(clock.now());

        // second visit without answering again is counted in full
        timer.start(clock.now());
        clock.advance_ms(60);
        timer.stop(clock.now());

        assert_eq!(timer.time_taken(), ms(160));
    }

    #[test]
    fn test_stop_twice_is_stable() {
        let clock = ManualClock::new();
        let mut timer = QuestionTimer::new();

        timer.start(clock.now());
        clock.advance_ms(90);
        timer.stop(clock.now());
        clock.advance_ms(90);
        timer.stop(clock.now());

        assert_eq!(timer.time_taken(), ms(90));
    }

    #[test]
    fn test_pause_excludes_paused_time() {
        let clock = ManualClock::new();
        let mut timer = QuestionTimer::new();

        timer.start(clock.now());
        clock.advance_ms(100);
        timer.pause(clock.now());
        clock.advance_ms(60_000);
        timer.resume(clock.now());
        clock.advance_ms(50);
        timer.stop(clock.now());

        assert_eq!(timer.time_taken(), ms(150));
    }

    #[test]
    fn test_start_while_paused_resumes_same_run() {
        let clock = ManualClock::new();
        let mut timer = QuestionTimer::new();

        timer.start(clock.now());
        clock.advance_ms(100);
        timer.lap(clock.now());
        timer.pause(clock.now());
        timer.start(clock.now());

        assert!(timer.is_running());
        // still the lapped run: nothing more is counted
        clock.advance_ms(50);
        assert_eq!(timer.live_elapsed(clock.now()), ms(100));
    }

    #[test]
    fn test_live_elapsed() {
        let clock = ManualClock::new();
        let mut timer = QuestionTimer::new();

        timer.start(clock.now());
        clock.advance_ms(30);
        assert_eq!(timer.live_elapsed(clock.now()), ms(30));

        timer.lap(clock.now());
        clock.advance_ms(30);
        assert_eq!(timer.live_elapsed(clock.now()), ms(30));
    }
}
