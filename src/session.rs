use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{QuizError, Result};
use crate::manager::{Completion, CompletionRule, Delivery, FetchRequest, QuestionManager};
use crate::navigation::{ControlState, NavMode, NavigationController};
use crate::question::{ConfidenceRating, Question};
use crate::runtime::RenderTick;
use crate::scroller::{PageScroller, TransitionHooks};
use crate::source::{
    AnswerRequest, AnswerResponse, AnswerSubmitter, AttemptInfo, AttemptLifecycle, AttemptReport,
    FinalSubmission, FinalSubmitter, QuestionPayload, QuestionSource,
};
use crate::stopwatch::Stopwatch;

/// How questions reach the user and when answers are checked
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeliveryMode {
    /// whole quiz up front, answers checked one at a time
    Preset,
    /// whole quiz up front, scored after the final submission
    #[default]
    Classic,
    /// one question at a time, fetched when its screen is shown
    Individual,
}

impl DeliveryMode {
    pub fn reveals_immediately(self) -> bool {
        matches!(self, DeliveryMode::Preset | DeliveryMode::Individual)
    }

    pub fn loads_lazily(self) -> bool {
        self == DeliveryMode::Individual
    }

    pub fn completion_rule(self, require_confidence: bool) -> CompletionRule {
        match self {
            DeliveryMode::Classic if require_confidence => CompletionRule::ChosenWithConfidence,
            DeliveryMode::Classic => CompletionRule::Chosen,
            DeliveryMode::Preset | DeliveryMode::Individual => CompletionRule::Marked,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionSettings {
    pub mode: DeliveryMode,
    pub settle_delay: Duration,
    pub tick_rate: Duration,
    pub require_confidence: bool,
    /// passed through to the question source when fetching lazily
    pub specification: Option<String>,
}

impl SessionSettings {
    pub fn new(mode: DeliveryMode) -> Self {
        Self {
            mode,
            settle_delay: Duration::from_millis(600),
            tick_rate: Duration::from_millis(100),
            require_confidence: false,
            specification: None,
        }
    }

    pub fn completion_rule(&self) -> CompletionRule {
        self.mode.completion_rule(self.require_confidence)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, strum_macros::Display)]
pub enum PauseReason {
    User,
    /// waiting for the user to confirm finishing an incomplete quiz
    Confirming,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Loading,
    InProgress,
    Paused(PauseReason),
    Finishing,
    Finished,
}

#[derive(Clone, Debug, PartialEq)]
pub enum QuizEvent {
    Ready { questions: usize },
    Started,
    Paused(PauseReason),
    Resumed,
    OptionSelected { position: usize, choice: Option<String> },
    ConfidenceSelected { position: usize, rating: Option<ConfidenceRating> },
    QuestionLoaded { position: usize },
    QuestionAnswered { position: usize, correct: Option<bool> },
    QuizComplete,
    QuizIncomplete { remaining: usize },
    ScreenChanged { screen: usize, total: usize, forward: bool },
    Error { message: String },
    Finishing,
    Finished,
}

/// Work the session needs done by the outside world
#[derive(Clone, Debug, PartialEq)]
pub enum Request {
    Fetch(FetchRequest),
    Answer(AnswerRequest),
}

#[derive(Clone, Debug, PartialEq)]
pub enum FinishAction {
    /// hand the collected answers to the final submitter
    Submit(FinalSubmission),
    /// answers were already recorded; show the attempt report
    OpenReport { report_url: String },
}

#[derive(Clone, Debug, PartialEq)]
pub enum FinishOutcome {
    Finishing(FinishAction),
    NeedsConfirmation { remaining: usize },
}

/// One row of the jump-to-question list
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListEntry {
    pub position: usize,
    pub loaded: bool,
    pub done: bool,
    pub active: bool,
}

/// Snapshot of everything the renderer draws
#[derive(Clone, Debug)]
pub struct RenderState<'a> {
    pub mode: DeliveryMode,
    pub state: SessionState,
    pub screen: usize,
    pub total_screens: usize,
    pub controls: ControlState,
    pub question: Option<&'a Question>,
    pub loading_question: bool,
    pub remaining: usize,
    pub ready_to_finish: bool,
    pub elapsed: Duration,
    pub question_elapsed: Option<Duration>,
    pub list: Vec<ListEntry>,
    pub error: Option<&'a str>,
    pub report: Option<&'a AttemptReport>,
    pub report_url: Option<&'a str>,
}

type Observer = Box<dyn FnMut(&QuizEvent)>;

/// Runs the transition hooks against the parts of the session they touch.
struct SessionHooks<'a> {
    manager: &'a mut QuestionManager,
    nav: &'a mut NavigationController,
    events: &'a mut Vec<QuizEvent>,
    outbox: &'a mut VecDeque<Request>,
    lazy: bool,
    timing: bool,
    now: Instant,
}

impl TransitionHooks for SessionHooks<'_> {
    fn before_transition(&mut self, from: usize, _to: usize, _total: usize) {
        if let Some(position) = self.manager.position_for_screen(from) {
            self.manager.stop_timer(position, self.now);
        }
    }

    fn after_transition(&mut self, current: usize, total: usize, forward: bool) {
        self.events.push(QuizEvent::ScreenChanged {
            screen: current,
            total,
            forward,
        });
        let Some(position) = self.manager.position_for_screen(current) else {
            return;
        };
        if self.lazy {
            if let Some(request) = self.manager.ensure_loaded(position) {
                debug!(position, "requesting question");
                self.outbox.push_back(Request::Fetch(request));
            }
        }
        if let Some(question) = self.manager.question(position) {
            self.nav.on_question_shown(question.is_completed());
            if self.timing {
                self.manager.start_timer(position, self.now);
            }
        }
    }
}

/// A quiz in progress: screens, questions, timers and the finish flow.
pub struct QuizSession {
    settings: SessionSettings,
    clock: Rc<dyn Clock>,
    scroller: PageScroller,
    nav: NavigationController,
    manager: QuestionManager,
    state: SessionState,
    overall: Stopwatch,
    tick: RenderTick,
    loaded: bool,
    attempt: Option<AttemptInfo>,
    report: Option<AttemptReport>,
    last_error: Option<String>,
    outbox: VecDeque<Request>,
    events: Vec<QuizEvent>,
    observers: Vec<Observer>,
}

impl QuizSession {
    pub fn new(settings: SessionSettings, question_count: usize, clock: Rc<dyn Clock>) -> Self {
        let manager = QuestionManager::new(question_count, settings.completion_rule());
        Self {
            scroller: PageScroller::new(question_count + 1, settings.settle_delay),
            nav: NavigationController::new(settings.mode),
            tick: RenderTick::new(settings.tick_rate),
            manager,
            settings,
            clock,
            state: SessionState::Loading,
            overall: Stopwatch::new(),
            loaded: false,
            attempt: None,
            report: None,
            last_error: None,
            outbox: VecDeque::new(),
            events: Vec::new(),
            observers: Vec::new(),
        }
    }

    pub fn subscribe<F: FnMut(&QuizEvent) + 'static>(&mut self, observer: F) {
        self.observers.push(Box::new(observer));
    }

    pub fn mode(&self) -> DeliveryMode {
        self.settings.mode
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_finished(&self) -> bool {
        self.state == SessionState::Finished
    }

    pub fn manager(&self) -> &QuestionManager {
        &self.manager
    }

    pub fn scroller(&self) -> &PageScroller {
        &self.scroller
    }

    pub fn attempt(&self) -> Option<&AttemptInfo> {
        self.attempt.as_ref()
    }

    pub fn report(&self) -> Option<&AttemptReport> {
        self.report.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn tick_interval(&self) -> Option<Duration> {
        self.tick.interval()
    }

    pub fn pending_requests(&self) -> usize {
        self.outbox.len()
    }

    /// Hand outstanding requests to the caller, oldest first.
    pub fn take_requests(&mut self) -> Vec<Request> {
        self.outbox.drain(..).collect()
    }

    pub fn active_position(&self) -> Option<usize> {
        self.manager.position_for_screen(self.scroller.current())
    }

    pub fn active_question(&self) -> Option<&Question> {
        self.active_position().and_then(|p| self.manager.question(p))
    }

    pub fn controls(&self) -> ControlState {
        let mut controls = self.nav.controls(
            self.scroller.current(),
            self.scroller.total(),
            self.manager.ready_to_finish(),
        );
        if self.state != SessionState::InProgress {
            let can_start = self.state == SessionState::Loading && self.loaded;
            controls.start_enabled &= can_start;
            controls.previous_enabled = false;
            controls.next_enabled = false;
            controls.finish_enabled = false;
        }
        controls
    }

    // Loading

    pub fn deliver_attempt(&mut self, result: Result<AttemptInfo>) {
        match result {
            Ok(info) => {
                info!(attempt_id = %info.attempt_id, "attempt ready");
                self.attempt = Some(info);
                if self.settings.mode.loads_lazily() {
                    self.mark_loaded();
                }
            }
            Err(err) => self.fail(err),
        }
        self.dispatch();
    }

    pub fn deliver_batch(&mut self, result: Result<Vec<QuestionPayload>>) {
        match result.and_then(|payloads| self.manager.add_batch(payloads)) {
            Ok(()) => self.mark_loaded(),
            Err(err) => self.fail(err),
        }
        self.dispatch();
    }

    fn mark_loaded(&mut self) {
        if self.loaded {
            return;
        }
        self.loaded = true;
        if self.state == SessionState::Paused(PauseReason::Error) && !self.overall.has_started() {
            self.state = SessionState::Loading;
        }
        self.events.push(QuizEvent::Ready {
            questions: self.manager.len(),
        });
    }

    /// Leave the intro screen and start the clocks.
    pub fn start(&mut self) -> bool {
        if self.state != SessionState::Loading || !self.loaded || self.manager.is_empty() {
            return false;
        }
        let now = self.clock.now();
        self.state = SessionState::InProgress;
        self.overall.start(now);
        self.tick.arm();
        self.events.push(QuizEvent::Started);
        info!(mode = %self.settings.mode, questions = self.manager.len(), "quiz started");
        self.with_scroller(now, |scroller, hooks| scroller.forward(now, hooks));
        self.dispatch();
        true
    }

    // Navigation

    fn with_scroller<R>(
        &mut self,
        now: Instant,
        f: impl FnOnce(&mut PageScroller, &mut SessionHooks<'_>) -> R,
    ) -> R {
        let Self {
            scroller,
            manager,
            nav,
            events,
            outbox,
            settings,
            state,
            ..
        } = self;
        let mut hooks = SessionHooks {
            manager,
            nav,
            events,
            outbox,
            lazy: settings.mode.loads_lazily(),
            timing: *state == SessionState::InProgress,
            now,
        };
        f(scroller, &mut hooks)
    }

    /// The "next" control: start, check the answer, or move on.
    pub fn next(&mut self) -> bool {
        let controls = self.controls();
        if controls.start_enabled {
            return self.start();
        }
        if !controls.next_enabled {
            return false;
        }
        match controls.next_action {
            NavMode::Answer => self.check_answer(),
            NavMode::Question => self.forward(),
        }
    }

    pub fn forward(&mut self) -> bool {
        if self.state != SessionState::InProgress {
            return false;
        }
        let now = self.clock.now();
        let moved = self.with_scroller(now, |scroller, hooks| scroller.forward(now, hooks));
        self.dispatch();
        moved
    }

    pub fn back(&mut self) -> bool {
        if self.state != SessionState::InProgress || !self.controls().previous_enabled {
            return false;
        }
        let now = self.clock.now();
        let moved = self.with_scroller(now, |scroller, hooks| scroller.back(now, hooks));
        self.dispatch();
        moved
    }

    /// Jump to question `position`; the intro screen is not a target.
    pub fn jump_to_question(&mut self, position: usize) -> Result<()> {
        if self.state != SessionState::InProgress {
            return Ok(());
        }
        let screen = position.saturating_add(1);
        if self.manager.position_for_screen(screen).is_none() {
            return Err(QuizError::InvalidScreen {
                index: screen,
                total: self.scroller.total(),
            });
        }
        let now = self.clock.now();
        let result = self.with_scroller(now, |scroller, hooks| scroller.jump_to(screen, now, hooks));
        self.dispatch();
        result
    }

    /// Drive the settle delay. Returns whether a redraw is due.
    pub fn on_tick(&mut self) -> bool {
        let now = self.clock.now();
        let settled = self.with_scroller(now, |scroller, hooks| scroller.poll(now, hooks));
        self.dispatch();
        settled || self.tick.is_armed()
    }

    /// Complete a pending settle right away.
    pub fn settle(&mut self) -> bool {
        let now = self.clock.now();
        let settled = self.with_scroller(now, |scroller, hooks| scroller.flush(hooks));
        self.dispatch();
        settled
    }

    // Answering

    pub fn select_option(&mut self, label: &str) -> bool {
        if self.state != SessionState::InProgress {
            return false;
        }
        let Some(position) = self.active_position() else {
            return false;
        };
        let now = self.clock.now();
        let Some(completion) = self.manager.select_option(position, label, now) else {
            return false;
        };
        let choice = self
            .manager
            .question(position)
            .and_then(|q| q.chosen_option())
            .map(str::to_string);
        self.events.push(QuizEvent::OptionSelected { position, choice });
        self.push_completion(completion);
        self.dispatch();
        true
    }

    pub fn select_confidence(&mut self, rating: ConfidenceRating) -> bool {
        if self.state != SessionState::InProgress {
            return false;
        }
        let Some(position) = self.active_position() else {
            return false;
        };
        let Some(completion) = self.manager.select_confidence(position, rating) else {
            return false;
        };
        let rating = self.manager.question(position).and_then(Question::confidence_rating);
        self.events.push(QuizEvent::ConfidenceSelected { position, rating });
        self.push_completion(completion);
        self.dispatch();
        true
    }

    fn push_completion(&mut self, completion: Completion) {
        self.events.push(match completion {
            Completion::Complete => QuizEvent::QuizComplete,
            Completion::Incomplete { remaining } => QuizEvent::QuizIncomplete { remaining },
        });
    }

    /// Submit the active question for marking.
    pub fn check_answer(&mut self) -> bool {
        if self.state != SessionState::InProgress || self.nav.mode() != NavMode::Answer {
            return false;
        }
        if self.nav.is_awaiting_response() {
            return false;
        }
        let Some(position) = self.active_position() else {
            return false;
        };
        let attempt_id = self.attempt.as_ref().map(|a| a.attempt_id.clone());
        let now = self.clock.now();
        let Some(request) = self.manager.begin_answer(position, attempt_id, now) else {
            return false;
        };
        self.nav.on_answer_requested();
        self.outbox.push_back(Request::Answer(request));
        true
    }

    pub fn deliver_question(&mut self, position: usize, result: Result<QuestionPayload>) {
        let delivery = match result {
            Ok(payload) => self.manager.deliver_question(position, payload),
            Err(err) => {
                self.manager.fetch_failed(position);
                Err(err)
            }
        };
        match delivery {
            Ok(Delivery::Applied) => {
                self.events.push(QuizEvent::QuestionLoaded { position });
                if self.active_position() == Some(position) && !self.scroller.is_settling() {
                    let completed = self
                        .manager
                        .question(position)
                        .is_some_and(Question::is_completed);
                    self.nav.on_question_shown(completed);
                    if self.state == SessionState::InProgress {
                        self.manager.start_timer(position, self.clock.now());
                    }
                }
            }
            Ok(Delivery::Stale) => {}
            Err(err) => self.fail(err),
        }
        self.dispatch();
    }

    pub fn deliver_answer(&mut self, question_id: u64, result: Result<AnswerResponse>) {
        let position = self.manager.position_of(question_id);
        let is_active = position.is_some() && position == self.active_position();
        match self.manager.deliver_answer(question_id, result) {
            Ok(Delivery::Applied) => {
                if is_active {
                    self.nav.on_answered();
                }
                if let Some(position) = position {
                    let correct = self
                        .manager
                        .question(position)
                        .and_then(|q| q.choice().is_correct());
                    self.events.push(QuizEvent::QuestionAnswered { position, correct });
                }
                let completion = self.manager.refresh_completion();
                self.push_completion(completion);
            }
            Ok(Delivery::Stale) => {}
            Err(err) => {
                if is_active {
                    self.nav.on_answer_failed();
                }
                self.fail(err);
            }
        }
        self.dispatch();
    }

    // Pausing

    pub fn pause(&mut self) -> bool {
        if self.state != SessionState::InProgress {
            return false;
        }
        self.pause_with(PauseReason::User);
        self.dispatch();
        true
    }

    fn pause_with(&mut self, reason: PauseReason) {
        let now = self.clock.now();
        if let Some(position) = self.active_position() {
            self.manager.pause_timer(position, now);
        }
        self.overall.pause(now);
        self.state = SessionState::Paused(reason);
        self.events.push(QuizEvent::Paused(reason));
    }

    pub fn resume(&mut self) -> bool {
        let SessionState::Paused(reason) = self.state else {
            return false;
        };
        if reason == PauseReason::Error && !self.overall.has_started() {
            // failed before the quiz began
            self.state = SessionState::Loading;
            self.last_error = None;
            self.dispatch();
            return true;
        }
        let now = self.clock.now();
        self.state = SessionState::InProgress;
        self.last_error = None;
        self.overall.resume(now);
        if !self.tick.is_armed() {
            self.tick.arm();
        }
        if let Some(position) = self.active_position() {
            if self.settings.mode.loads_lazily() {
                if let Some(request) = self.manager.ensure_loaded(position) {
                    self.outbox.push_back(Request::Fetch(request));
                }
            }
            if !self.scroller.is_settling() {
                self.manager.start_timer(position, now);
            }
        }
        self.events.push(QuizEvent::Resumed);
        self.dispatch();
        true
    }

    pub fn toggle_pause(&mut self) -> bool {
        match self.state {
            SessionState::InProgress => self.pause(),
            SessionState::Paused(PauseReason::User) => self.resume(),
            _ => false,
        }
    }

    // Finishing

    pub fn request_finish(&mut self) -> Option<FinishOutcome> {
        if self.state != SessionState::InProgress || !self.controls().finish_enabled {
            return None;
        }
        if self.manager.ready_to_finish() {
            let action = self.begin_finish();
            self.dispatch();
            return Some(FinishOutcome::Finishing(action));
        }
        let remaining = self.manager.remaining();
        self.pause_with(PauseReason::Confirming);
        self.dispatch();
        Some(FinishOutcome::NeedsConfirmation { remaining })
    }

    pub fn continue_quiz(&mut self) -> bool {
        if self.state != SessionState::Paused(PauseReason::Confirming) {
            return false;
        }
        self.resume()
    }

    pub fn force_finish(&mut self) -> Option<FinishAction> {
        if self.state != SessionState::Paused(PauseReason::Confirming) {
            return None;
        }
        let action = self.begin_finish();
        self.dispatch();
        Some(action)
    }

    fn begin_finish(&mut self) -> FinishAction {
        let now = self.clock.now();
        self.state = SessionState::Finishing;
        self.with_scroller(now, |scroller, hooks| scroller.flush(hooks));
        if let Some(position) = self.active_position() {
            self.manager.stop_timer(position, now);
        }
        self.overall.pause(now);
        self.tick.cancel();
        self.events.push(QuizEvent::Finishing);

        let report_url = self.attempt.as_ref().map(|a| a.report_url.clone());
        match report_url {
            Some(report_url) if self.settings.mode.reveals_immediately() => {
                FinishAction::OpenReport { report_url }
            }
            _ => FinishAction::Submit(self.final_submission()),
        }
    }

    pub fn final_submission(&self) -> FinalSubmission {
        FinalSubmission {
            attempt_id: self.attempt.as_ref().map(|a| a.attempt_id.clone()),
            mode: self.settings.mode,
            entries: self.manager.submission_entries(),
        }
    }

    pub fn finished(&mut self, report: Option<AttemptReport>) {
        if self.state != SessionState::Finishing {
            return;
        }
        if let Some(report) = &report {
            info!(
                attempt_id = %report.attempt_id,
                correct = report.correct,
                total = report.total,
                "quiz finished"
            );
        }
        self.report = report;
        self.state = SessionState::Finished;
        self.events.push(QuizEvent::Finished);
        self.dispatch();
    }

    pub fn finish_failed(&mut self, err: QuizError) {
        self.fail(err);
        self.dispatch();
    }

    fn fail(&mut self, err: QuizError) {
        warn!(error = %err, state = ?self.state, "quiz error");
        let message = err.to_string();
        match self.state {
            SessionState::InProgress => self.pause_with(PauseReason::Error),
            SessionState::Loading | SessionState::Finishing => {
                self.state = SessionState::Paused(PauseReason::Error);
                self.events.push(QuizEvent::Paused(PauseReason::Error));
            }
            SessionState::Paused(_) => {
                self.state = SessionState::Paused(PauseReason::Error);
            }
            SessionState::Finished => {}
        }
        self.tick.cancel();
        self.events.push(QuizEvent::Error {
            message: message.clone(),
        });
        self.last_error = Some(message);
    }

    fn dispatch(&mut self) {
        if self.events.is_empty() {
            return;
        }
        let events = std::mem::take(&mut self.events);
        for event in &events {
            for observer in self.observers.iter_mut() {
                observer(event);
            }
        }
    }

    // Rendering

    pub fn elapsed(&self) -> Duration {
        self.overall.elapsed(self.clock.now())
    }

    pub fn render_state(&self) -> RenderState<'_> {
        let now = self.clock.now();
        let active = self.active_position();
        let question = self.active_question();
        let list = (1..=self.manager.len())
            .map(|position| {
                let q = self.manager.question(position);
                ListEntry {
                    position,
                    loaded: q.is_some(),
                    done: q.is_some_and(|q| self.manager.rule().is_satisfied(q)),
                    active: active == Some(position),
                }
            })
            .collect();
        RenderState {
            mode: self.settings.mode,
            state: self.state,
            screen: self.scroller.current(),
            total_screens: self.scroller.total(),
            controls: self.controls(),
            question,
            loading_question: active.is_some_and(|p| self.manager.is_loading(p)),
            remaining: self.manager.remaining(),
            ready_to_finish: self.manager.ready_to_finish(),
            elapsed: self.overall.elapsed(now),
            question_elapsed: question.map(|q| q.live_elapsed(now)),
            list,
            error: self.last_error.as_deref(),
            report: self.report.as_ref(),
            report_url: self.attempt.as_ref().map(|a| a.report_url.as_str()),
        }
    }

    // Synchronous drivers

    /// Start an attempt and, for batch modes, fetch the whole quiz.
    pub fn load<B: QuestionSource + AttemptLifecycle>(&mut self, backend: &mut B) {
        let attempt = backend.start_attempt(self.settings.specification.as_deref());
        let failed = attempt.is_err();
        self.deliver_attempt(attempt);
        if failed || self.settings.mode.loads_lazily() {
            return;
        }
        let batch = backend.fetch_all_questions();
        self.deliver_batch(batch);
    }

    /// Fulfil every outstanding request against `backend`.
    pub fn pump<B: QuestionSource + AnswerSubmitter>(&mut self, backend: &mut B) {
        while let Some(request) = self.outbox.pop_front() {
            match request {
                Request::Fetch(fetch) => {
                    let result = backend.fetch_next_question(
                        fetch.position,
                        self.settings.specification.as_deref(),
                        &fetch.excluded,
                    );
                    self.deliver_question(fetch.position, result);
                }
                Request::Answer(answer) => {
                    let result = backend.submit_answer(&answer);
                    self.deliver_answer(answer.question_id, result);
                }
            }
        }
    }

    /// Carry out a finish action and record the outcome.
    pub fn complete_finish<B: FinalSubmitter>(&mut self, backend: &mut B, action: FinishAction) {
        match action {
            FinishAction::Submit(submission) => match backend.submit_final(&submission) {
                Ok(report) => self.finished(Some(report)),
                Err(err) => self.finish_failed(err),
            },
            FinishAction::OpenReport { report_url } => {
                debug!(%report_url, "finished with report link");
                self.finished(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::source::QuestionBank;
    use assert_matches::assert_matches;
    use std::cell::RefCell;

    const BANK: &str = r#"{
        "name": "tiny",
        "questions": [
            {"id": 1, "body": "one", "options": {"labels": ["A", "B"], "A": "a", "B": "b"}, "answer": "A"},
            {"id": 2, "body": "two", "options": {"labels": ["A", "B"], "A": "a", "B": "b"}, "answer": "B"},
            {"id": 3, "body": "three", "options": {"labels": ["A", "B"], "A": "a", "B": "b"}, "answer": "A"}
        ]
    }"#;

    fn session(mode: DeliveryMode) -> (QuizSession, ManualClock, QuestionBank) {
        let clock = ManualClock::new();
        let mut bank = QuestionBank::from_json(BANK).unwrap();
        let mut session = QuizSession::new(SessionSettings::new(mode), 3, Rc::new(clock.clone()));
        session.load(&mut bank);
        (session, clock, bank)
    }

    fn settle(session: &mut QuizSession, clock: &ManualClock) {
        clock.advance_ms(600);
        session.on_tick();
    }

    #[test]
    fn test_delivery_mode_rules() {
        assert_eq!(DeliveryMode::Classic.completion_rule(false), CompletionRule::Chosen);
        assert_eq!(
            DeliveryMode::Classic.completion_rule(true),
            CompletionRule::ChosenWithConfidence
        );
        assert_eq!(DeliveryMode::Preset.completion_rule(true), CompletionRule::Marked);
        assert!(DeliveryMode::Individual.reveals_immediately());
        assert!(!DeliveryMode::Classic.reveals_immediately());
        assert_eq!(DeliveryMode::Individual.to_string(), "individual");
    }

    #[test]
    fn test_starts_on_intro_screen() {
        let (session, _, _) = session(DeliveryMode::Classic);

        assert_eq!(session.state(), SessionState::Loading);
        assert!(session.is_loaded());
        assert_eq!(session.scroller().current(), 1);
        assert_eq!(session.scroller().total(), 4);
        assert!(session.controls().start_enabled);
        assert!(session.active_question().is_none());
    }

    #[test]
    fn test_start_moves_to_first_question() {
        let (mut session, clock, _) = session(DeliveryMode::Classic);

        assert!(session.start());
        assert_eq!(session.state(), SessionState::InProgress);
        assert_eq!(session.scroller().current(), 2);
        assert!(session.tick_interval().is_some());
        assert!(!session.start());

        settle(&mut session, &clock);
        assert!(session.active_question().unwrap().timer().is_running());
    }

    #[test]
    fn test_selection_emits_completion_events() {
        let (mut session, clock, _) = session(DeliveryMode::Classic);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        session.subscribe(move |e| sink.borrow_mut().push(e.clone()));

        session.start();
        settle(&mut session, &clock);
        assert!(session.select_option("A"));

        let events = seen.borrow();
        assert!(events.contains(&QuizEvent::Started));
        assert!(events.contains(&QuizEvent::OptionSelected {
            position: 1,
            choice: Some("A".into())
        }));
        assert_eq!(events.last(), Some(&QuizEvent::QuizIncomplete { remaining: 2 }));
    }

    #[test]
    fn test_paused_session_ignores_input() {
        let (mut session, clock, _) = session(DeliveryMode::Classic);
        session.start();
        settle(&mut session, &clock);

        assert!(session.pause());
        assert_eq!(session.state(), SessionState::Paused(PauseReason::User));
        assert!(!session.select_option("A"));
        assert!(!session.forward());
        assert!(session.toggle_pause());
        assert!(session.select_option("A"));
    }

    #[test]
    fn test_finish_needs_confirmation_when_incomplete() {
        let (mut session, clock, mut bank) = session(DeliveryMode::Classic);
        session.start();
        settle(&mut session, &clock);
        session.select_option("B");

        assert_matches!(
            session.request_finish(),
            Some(FinishOutcome::NeedsConfirmation { remaining: 2 })
        );
        assert_eq!(session.state(), SessionState::Paused(PauseReason::Confirming));

        assert!(session.continue_quiz());
        assert_eq!(session.state(), SessionState::InProgress);

        session.request_finish();
        let action = session.force_finish().unwrap();
        assert_matches!(&action, FinishAction::Submit(s) if s.entries.len() == 3);

        session.complete_finish(&mut bank, action);
        assert!(session.is_finished());
        assert_eq!(session.report().unwrap().answered, 1);
        assert!(session.tick_interval().is_none());
    }

    #[test]
    fn test_individual_fetches_on_arrival() {
        let (mut session, clock, mut bank) = session(DeliveryMode::Individual);
        assert!(session.is_loaded());
        assert!(session.attempt().is_some());

        session.start();
        assert_eq!(session.pending_requests(), 0);
        settle(&mut session, &clock);
        assert_eq!(session.pending_requests(), 1);
        assert!(session.render_state().loading_question);

        session.pump(&mut bank);
        assert!(session.active_question().is_some());
        assert_eq!(session.controls().next_action, NavMode::Answer);
    }

    #[test]
    fn test_stale_question_is_ignored() {
        let (mut session, clock, _) = session(DeliveryMode::Individual);
        session.start();
        settle(&mut session, &clock);
        let requests = session.take_requests();
        assert_eq!(requests.len(), 1);

        session.deliver_question(
            3,
            Ok(QuestionPayload {
                id: 9,
                position: 3,
                ..QuestionPayload::default()
            }),
        );
        assert!(!session.manager().is_loaded(3));
        assert_eq!(session.state(), SessionState::InProgress);
    }

    #[test]
    fn test_fetch_error_pauses_and_resume_retries() {
        let (mut session, clock, _) = session(DeliveryMode::Individual);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        session.subscribe(move |e| sink.borrow_mut().push(e.clone()));
        session.start();
        settle(&mut session, &clock);
        session.take_requests();

        session.deliver_question(1, Err(QuizError::Transport("offline".into())));
        assert_eq!(session.state(), SessionState::Paused(PauseReason::Error));
        assert!(session.tick_interval().is_none());
        assert_eq!(session.last_error(), Some("Transport error: offline"));
        assert!(seen
            .borrow()
            .iter()
            .any(|e| matches!(e, QuizEvent::Error { .. })));

        assert!(session.resume());
        assert_eq!(session.pending_requests(), 1);
        assert!(session.tick_interval().is_some());
    }

    #[test]
    fn test_jump_out_of_range() {
        let (mut session, _, _) = session(DeliveryMode::Classic);
        session.start();

        assert_matches!(
            session.jump_to_question(7),
            Err(QuizError::InvalidScreen { index: 8, total: 4 })
        );
        session.jump_to_question(3).unwrap();
        assert_eq!(session.scroller().current(), 4);
    }

    #[test]
    fn test_jump_never_returns_to_intro() {
        let (mut session, clock, _) = session(DeliveryMode::Classic);
        session.start();
        settle(&mut session, &clock);

        assert_matches!(
            session.jump_to_question(0),
            Err(QuizError::InvalidScreen { index: 1, total: 4 })
        );
        assert_matches!(
            session.jump_to_question(usize::MAX),
            Err(QuizError::InvalidScreen { .. })
        );
        assert_eq!(session.scroller().current(), 2);
        assert!(!session.scroller().is_settling());
        assert!(session.controls().next_enabled);
        assert!(session.next());
        assert_eq!(session.scroller().current(), 3);
    }
}
