use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{QuizError, Result};

/// Callbacks around a screen transition.
///
/// `before_transition` runs synchronously before the active index moves
/// from `from` to `to`; `after_transition` runs once the settle delay has
/// elapsed.
pub trait TransitionHooks {
    fn before_transition(&mut self, from: usize, to: usize, total: usize);
    fn after_transition(&mut self, current: usize, total: usize, forward: bool);
}

/// A transition whose after hook has not fired yet
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PendingSettle {
    pub due: Instant,
    pub forward: bool,
}

/// Finite sequence of screens `1..=total` with exactly one active.
#[derive(Clone, Debug)]
pub struct PageScroller {
    current: usize,
    total: usize,
    settle_delay: Duration,
    pending: Option<PendingSettle>,
}

impl PageScroller {
    pub fn new(total: usize, settle_delay: Duration) -> Self {
        assert!(total >= 1, "a scroller needs at least one screen");
        Self {
            current: 1,
            total,
            settle_delay,
            pending: None,
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_first(&self) -> bool {
        self.current == 1
    }

    pub fn is_last(&self) -> bool {
        self.current == self.total
    }

    pub fn is_settling(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<PendingSettle> {
        self.pending
    }

    pub fn forward<H: TransitionHooks>(&mut self, now: Instant, hooks: &mut H) -> bool {
        if self.is_last() {
            return false;
        }
        self.transition(self.current + 1, now, hooks);
        true
    }

    pub fn back<H: TransitionHooks>(&mut self, now: Instant, hooks: &mut H) -> bool {
        if self.is_first() {
            return false;
        }
        self.transition(self.current - 1, now, hooks);
        true
    }

    pub fn jump_to<H: TransitionHooks>(
        &mut self,
        index: usize,
        now: Instant,
        hooks: &mut H,
    ) -> Result<()> {
        if index == 0 || index > self.total {
            return Err(QuizError::InvalidScreen {
                index,
                total: self.total,
            });
        }
        self.transition(index, now, hooks);
        Ok(())
    }

    /// Fire the after hook if the settle delay has elapsed.
    pub fn poll<H: TransitionHooks>(&mut self, now: Instant, hooks: &mut H) -> bool {
        match self.pending {
            Some(pending) if now >= pending.due => {
                self.settle(hooks);
                true
            }
            _ => false,
        }
    }

    /// Fire a pending after hook immediately.
    pub fn flush<H: TransitionHooks>(&mut self, hooks: &mut H) -> bool {
        if self.pending.is_none() {
            return false;
        }
        self.settle(hooks);
        true
    }

    fn transition<H: TransitionHooks>(&mut self, target: usize, now: Instant, hooks: &mut H) {
        self.flush(hooks);

        let forward = target > self.current;
        hooks.before_transition(self.current, target, self.total);
        debug!(from = self.current, to = target, total = self.total, "screen transition");
        self.current = target;
        self.pending = Some(PendingSettle {
            due: now + self.settle_delay,
            forward,
        });
    }

    fn settle<H: TransitionHooks>(&mut self, hooks: &mut H) {
        if let Some(pending) = self.pending.take() {
            hooks.after_transition(self.current, self.total, pending.forward);
        }
    }
}
