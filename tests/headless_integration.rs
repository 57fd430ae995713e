use std::rc::Rc;
use std::sync::mpsc::{self, Sender};
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use quizdeck::app::{App, Flow};
use quizdeck::clock::ManualClock;
use quizdeck::history::AttemptStore;
use quizdeck::keymap::action_for;
use quizdeck::runtime::{AppEvent, FixedTicker, Runner, TestEventSource};
use quizdeck::session::SessionState;
use quizdeck::source::QuestionBank;
use quizdeck::{DeliveryMode, QuizSession, SessionSettings};

type TestRunner = Runner<TestEventSource, FixedTicker>;

fn app(mode: DeliveryMode, questions: usize) -> App {
    let mut bank = QuestionBank::bundled("anatomy")
        .unwrap()
        .with_limit(Some(questions));
    let mut settings = SessionSettings::new(mode);
    settings.settle_delay = Duration::ZERO;
    let mut session = QuizSession::new(
        settings,
        bank.quiz_length(),
        Rc::new(ManualClock::new()),
    );
    session.load(&mut bank);
    App::new(session, bank)
}

fn runner() -> (Sender<AppEvent>, TestRunner) {
    let (tx, rx) = mpsc::channel();
    let runner = Runner::new(
        TestEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(5)),
    );
    (tx, runner)
}

/// Deliver one key through the runner, then let a tick through.
fn press(tx: &Sender<AppEvent>, runner: &TestRunner, app: &mut App, code: KeyCode) -> Flow {
    tx.send(AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE)))
        .unwrap();
    let flow = match runner.step(app.session.tick_interval()) {
        AppEvent::Key(key) => action_for(key).map_or(Flow::Continue, |a| app.handle(a)),
        other => panic!("expected the key back, got {other:?}"),
    };
    match runner.step(app.session.tick_interval()) {
        AppEvent::Tick => {
            app.on_tick();
        }
        other => panic!("expected a tick, got {other:?}"),
    }
    flow
}

#[test]
fn headless_classic_quiz_completes() {
    let mut app = app(DeliveryMode::Classic, 2).with_history(Some(AttemptStore::in_memory().unwrap()));
    let (tx, runner) = runner();

    press(&tx, &runner, &mut app, KeyCode::Enter);
    assert_eq!(app.session.state(), SessionState::InProgress);

    press(&tx, &runner, &mut app, KeyCode::Char('a'));
    press(&tx, &runner, &mut app, KeyCode::Char('4'));
    press(&tx, &runner, &mut app, KeyCode::Right);
    press(&tx, &runner, &mut app, KeyCode::Char('b'));
    assert_eq!(app.session.manager().remaining(), 0);

    press(&tx, &runner, &mut app, KeyCode::Char('f'));
    assert!(app.session.is_finished());
    assert_eq!(app.session.report().unwrap().answered, 2);

    let recorded = app.recorded().unwrap();
    assert_eq!(recorded.entries.len(), 2);
    assert_eq!(
        recorded.entries[0].confidence_rating.map(|r| r.value()),
        Some(4)
    );

    assert_eq!(press(&tx, &runner, &mut app, KeyCode::Enter), Flow::Quit);
}

#[test]
fn headless_individual_quiz_reveals_answers() {
    let mut app = app(DeliveryMode::Individual, 2);
    let (tx, runner) = runner();

    press(&tx, &runner, &mut app, KeyCode::Enter);
    assert!(app.session.active_question().is_some());

    press(&tx, &runner, &mut app, KeyCode::Char('c'));
    press(&tx, &runner, &mut app, KeyCode::Enter);
    assert!(app.session.active_question().unwrap().is_revealed());

    press(&tx, &runner, &mut app, KeyCode::Enter);
    assert_eq!(app.session.active_position(), Some(2));
    assert!(app.session.active_question().is_some());

    press(&tx, &runner, &mut app, KeyCode::Char('a'));
    press(&tx, &runner, &mut app, KeyCode::Enter);
    press(&tx, &runner, &mut app, KeyCode::Char('f'));
    assert!(app.session.is_finished());
    assert!(app.session.report().is_none());
}

#[test]
fn headless_pause_blocks_answers() {
    let mut app = app(DeliveryMode::Classic, 2);
    let (tx, runner) = runner();

    press(&tx, &runner, &mut app, KeyCode::Enter);
    press(&tx, &runner, &mut app, KeyCode::Char('p'));
    press(&tx, &runner, &mut app, KeyCode::Char('a'));
    assert!(app.session.active_question().unwrap().chosen_option().is_none());

    press(&tx, &runner, &mut app, KeyCode::Char('p'));
    press(&tx, &runner, &mut app, KeyCode::Char('a'));
    assert!(app.session.active_question().unwrap().chosen_option().is_some());

    assert_eq!(press(&tx, &runner, &mut app, KeyCode::Esc), Flow::Quit);
}
