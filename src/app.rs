use std::path::PathBuf;

use tracing::{info, warn};
use webbrowser::Browser;

use crate::export;
use crate::history::{AttemptStore, FinishedAttempt};
use crate::keymap::Action;
use crate::session::{FinishAction, FinishOutcome, PauseReason, QuizSession, SessionState};
use crate::source::QuestionBank;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Overlay {
    None,
    /// jump-to-question list with the highlighted position
    List { cursor: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Front-end state: the session, its backend and what happens at the end.
pub struct App {
    pub session: QuizSession,
    pub bank: QuestionBank,
    pub overlay: Overlay,
    pub notice: Option<String>,
    history: Option<AttemptStore>,
    export_path: Option<PathBuf>,
    recorded: Option<FinishedAttempt>,
}

impl App {
    pub fn new(session: QuizSession, bank: QuestionBank) -> Self {
        Self {
            session,
            bank,
            overlay: Overlay::None,
            notice: None,
            history: None,
            export_path: None,
            recorded: None,
        }
    }

    pub fn with_history(mut self, store: Option<AttemptStore>) -> Self {
        self.history = store;
        self
    }

    pub fn with_export(mut self, path: Option<PathBuf>) -> Self {
        self.export_path = path;
        self
    }

    /// The attempt as stored once the quiz finished
    pub fn recorded(&self) -> Option<&FinishedAttempt> {
        self.recorded.as_ref()
    }

    /// Poll timers and fulfil whatever the session asked for.
    pub fn on_tick(&mut self) -> bool {
        let redraw = self.session.on_tick();
        let pending = self.session.pending_requests() > 0;
        self.session.pump(&mut self.bank);
        redraw || pending
    }

    pub fn handle(&mut self, action: Action) -> Flow {
        if action == Action::Quit {
            return Flow::Quit;
        }
        if let Overlay::List { cursor } = self.overlay {
            self.handle_list(action, cursor);
            self.session.pump(&mut self.bank);
            return Flow::Continue;
        }

        match self.session.state() {
            SessionState::Paused(PauseReason::Confirming) => match action {
                Action::Confirm => {
                    if let Some(finish) = self.session.force_finish() {
                        self.finish(finish);
                    }
                }
                Action::Decline | Action::Next => {
                    self.session.continue_quiz();
                }
                _ => {}
            },
            SessionState::Paused(PauseReason::Error) => {
                if matches!(action, Action::Next | Action::TogglePause) {
                    self.session.resume();
                }
            }
            SessionState::Finished => match action {
                Action::OpenReport => self.open_report(),
                Action::Next => return Flow::Quit,
                _ => {}
            },
            _ => self.handle_quiz(action),
        }
        self.session.pump(&mut self.bank);
        Flow::Continue
    }

    fn handle_quiz(&mut self, action: Action) {
        match action {
            Action::Next => {
                self.session.next();
            }
            Action::Previous => {
                self.session.back();
            }
            Action::Option(index) => {
                let label = self
                    .session
                    .active_question()
                    .and_then(|q| q.options().labels.get(index).cloned());
                if let Some(label) = label {
                    self.session.select_option(&label);
                }
            }
            Action::Confidence(rating) => {
                self.session.select_confidence(rating);
            }
            Action::TogglePause => {
                self.session.toggle_pause();
            }
            Action::ToggleList => {
                if self.session.state() == SessionState::InProgress {
                    let cursor = self.session.active_position().unwrap_or(1);
                    self.overlay = Overlay::List { cursor };
                }
            }
            Action::Finish => match self.session.request_finish() {
                Some(FinishOutcome::Finishing(finish)) => self.finish(finish),
                Some(FinishOutcome::NeedsConfirmation { remaining }) => {
                    info!(remaining, "finish requested with questions left");
                }
                None => {}
            },
            _ => {}
        }
    }

    fn handle_list(&mut self, action: Action, cursor: usize) {
        let last = self.session.manager().len().max(1);
        match action {
            Action::Up => self.overlay = Overlay::List { cursor: cursor.saturating_sub(1).max(1) },
            Action::Down => self.overlay = Overlay::List { cursor: (cursor + 1).min(last) },
            Action::Next => {
                self.overlay = Overlay::None;
                if let Err(err) = self.session.jump_to_question(cursor) {
                    self.notice = Some(err.to_string());
                }
            }
            Action::ToggleList | Action::Previous => self.overlay = Overlay::None,
            _ => {}
        }
    }

    fn finish(&mut self, action: FinishAction) {
        self.session.complete_finish(&mut self.bank, action);
        if self.session.is_finished() {
            self.record();
        }
    }

    fn record(&mut self) {
        let submission = self.session.final_submission();
        let bank = &self.bank;
        let attempt = FinishedAttempt::grade(&submission, bank.name(), |id| bank.answer_for(id));

        if let Some(store) = self.history.as_mut() {
            if let Err(err) = store.record(&attempt) {
                warn!(%err, "could not store attempt");
                self.notice = Some(format!("history not saved: {err}"));
            }
        }
        if let Some(path) = &self.export_path {
            if let Err(err) = export::append_attempt(path, &attempt) {
                warn!(%err, path = %path.display(), "could not export attempt");
                self.notice = Some(format!("export failed: {err}"));
            }
        }
        self.recorded = Some(attempt);
    }

    fn open_report(&mut self) {
        let Some(url) = self.session.attempt().map(|a| a.report_url.clone()) else {
            return;
        };
        if Browser::is_available() {
            if let Err(err) = webbrowser::open(&url) {
                self.notice = Some(format!("could not open {url}: {err}"));
            }
        } else {
            self.notice = Some(format!("report: {url}"));
        }
    }
}
