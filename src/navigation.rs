use serde::{Deserialize, Serialize};

use crate::session::DeliveryMode;

/// What the "next" control does right now
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
pub enum NavMode {
    /// advancing moves to the next question
    #[strum(serialize = "Next question")]
    Question,
    /// the control checks and reveals the current answer
    #[strum(serialize = "Check answer")]
    Answer,
}

/// Enabled/disabled flags for every navigation affordance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ControlState {
    pub start_enabled: bool,
    pub previous_enabled: bool,
    pub next_enabled: bool,
    pub finish_enabled: bool,
    pub finish_highlighted: bool,
    pub next_action: NavMode,
}

#[derive(Clone, Debug)]
pub struct NavigationController {
    delivery: DeliveryMode,
    mode: NavMode,
    awaiting_response: bool,
}

impl NavigationController {
    pub fn new(delivery: DeliveryMode) -> Self {
        Self {
            delivery,
            mode: NavMode::Question,
            awaiting_response: false,
        }
    }

    pub fn mode(&self) -> NavMode {
        self.mode
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.awaiting_response
    }

    fn reveals_answers(&self) -> bool {
        self.delivery.reveals_immediately()
    }

    /// A question screen became active.
    pub fn on_question_shown(&mut self, completed: bool) {
        if !self.reveals_answers() {
            return;
        }
        self.awaiting_response = false;
        self.mode = if completed {
            NavMode::Question
        } else {
            NavMode::Answer
        };
    }

    pub fn on_answer_requested(&mut self) {
        if self.mode == NavMode::Answer {
            self.awaiting_response = true;
        }
    }

    pub fn on_answered(&mut self) {
        self.awaiting_response = false;
        self.mode = NavMode::Question;
    }

    /// Answer request failed; the user may check again
    pub fn on_answer_failed(&mut self) {
        self.awaiting_response = false;
    }

    /// Derive the control flags from the scroller position.
    ///
    /// `at_end` means the quiz may finish: every question satisfies the
    /// completion rule.
    pub fn controls(&self, position: usize, total: usize, at_end: bool) -> ControlState {
        if position <= 1 {
            return ControlState {
                start_enabled: true,
                previous_enabled: false,
                next_enabled: false,
                finish_enabled: false,
                finish_highlighted: false,
                next_action: NavMode::Question,
            };
        }

        let answer_mode = self.reveals_answers() && self.mode == NavMode::Answer;
        let next_action = if answer_mode {
            NavMode::Answer
        } else {
            NavMode::Question
        };

        let mut next_enabled = position < total || answer_mode;
        if self.awaiting_response {
            next_enabled = false;
        }
        let previous_enabled = position > 2;

        let finish_enabled = match self.delivery {
            DeliveryMode::Individual => at_end,
            DeliveryMode::Classic | DeliveryMode::Preset => true,
        };

        ControlState {
            start_enabled: false,
            previous_enabled,
            next_enabled,
            finish_enabled,
            finish_highlighted: at_end,
            next_action,
        }
    }
}
