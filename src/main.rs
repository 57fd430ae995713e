mod ui;

use clap::{error::ErrorKind, CommandFactory, Parser};
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    tty::IsTty,
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    Terminal,
};
use std::{
    error::Error,
    io::{self, stdin},
    path::Path,
    rc::Rc,
    time::Duration,
};
use tracing::info;

use quizdeck::{
    app::{App, Flow},
    app_dirs::AppDirs,
    clock::SystemClock,
    config::{Config, ConfigStore, FileConfigStore},
    history::AttemptStore,
    keymap,
    logging,
    runtime::{AppEvent, CrosstermEventSource, EventSource, FixedTicker, Runner, Ticker},
    source::QuestionBank,
    util::format_clock,
    DeliveryMode, QuizSession, SessionSettings,
};

use crate::ui::QuizView;

const IDLE_TICK_MS: u64 = 500;
const DEFAULT_BANK: &str = "anatomy";

/// timed multiple-choice quizzes in the terminal
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "Timed multiple-choice quizzes in the terminal: work through a question bank in classic, preset or one-at-a-time mode and keep a history of your attempts."
)]
pub struct Cli {
    /// how questions are delivered and answers revealed
    #[clap(short = 'm', long, value_enum)]
    mode: Option<DeliveryMode>,

    /// bundled bank name or path to a bank JSON file
    #[clap(short = 'b', long)]
    bank: Option<String>,

    /// number of questions to draw from the bank
    #[clap(short = 'n', long = "questions")]
    number_of_questions: Option<usize>,

    /// shuffle the bank before drawing questions
    #[clap(long)]
    shuffle: bool,

    /// a question only counts as answered once a confidence rating is picked
    #[clap(long)]
    require_confidence: bool,

    /// store the effective options as the new defaults
    #[clap(long)]
    save_config: bool,

    /// print past attempts and exit
    #[clap(long)]
    history: bool,

    /// print the bundled banks and exit
    #[clap(long)]
    list_banks: bool,
}

impl Cli {
    /// Command-line flags override the stored config
    fn apply_to(&self, mut config: Config) -> Config {
        if let Some(mode) = self.mode {
            config.delivery_mode = mode;
        }
        if let Some(bank) = &self.bank {
            config.bank = Some(bank.clone());
        }
        if self.number_of_questions.is_some() {
            config.number_of_questions = self.number_of_questions;
        }
        config.shuffle |= self.shuffle;
        config.require_confidence |= self.require_confidence;
        config
    }
}

fn open_bank(config: &Config) -> quizdeck::Result<QuestionBank> {
    let name = config.bank.as_deref().unwrap_or(DEFAULT_BANK);
    let bank = if Path::new(name).is_file() {
        QuestionBank::from_path(name)?
    } else {
        QuestionBank::bundled(name)?
    };
    Ok(bank
        .with_shuffle(config.shuffle)
        .with_limit(config.number_of_questions))
}

/// One line per stored attempt, then the average score
fn history_lines(store: &AttemptStore) -> quizdeck::Result<Vec<String>> {
    let summaries = store.attempt_summaries()?;
    if summaries.is_empty() {
        return Ok(vec!["no attempts yet".to_string()]);
    }
    let mut lines = Vec::with_capacity(summaries.len() + 1);
    for s in &summaries {
        let pace = match store.time_profile(&s.attempt_id)? {
            Some((avg, spread)) => {
                format!("{:.1}s ±{:.1}s per question", avg / 1000.0, spread / 1000.0)
            }
            None => String::new(),
        };
        lines.push(format!(
            "{}  {:<12} {:<10} {:>3}/{:<3} {:>5.1}%  {}  {}",
            s.finished_at.format("%Y-%m-%d %H:%M"),
            s.bank,
            s.mode,
            s.correct,
            s.total,
            s.score() * 100.0,
            format_clock(Duration::from_millis(s.total_time_ms)),
            pace,
        ));
    }
    if let Some(avg) = store.average_score()? {
        lines.push(format!("average {:.1}%", avg * 100.0));
    }
    Ok(lines)
}

fn print_history() -> Result<(), Box<dyn Error>> {
    let store = AttemptStore::new()?;
    for line in history_lines(&store)? {
        println!("{line}");
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if cli.list_banks {
        for name in QuestionBank::bundled_names() {
            println!("{name}");
        }
        return Ok(());
    }
    if cli.history {
        return print_history();
    }

    let store = FileConfigStore::new();
    let config = cli.apply_to(store.load());
    if let Err(err) = config.validate() {
        Cli::command().error(ErrorKind::InvalidValue, err).exit();
    }
    if cli.save_config {
        store.save(&config)?;
    }

    if !stdin().is_tty() {
        let mut cmd = Cli::command();
        cmd.error(ErrorKind::Io, "stdin must be a tty").exit();
    }

    // logging is best effort
    let _ = logging::init(AppDirs::log_path().as_deref());

    let mut bank = match open_bank(&config) {
        Ok(bank) => bank,
        Err(err) => Cli::command().error(ErrorKind::InvalidValue, err).exit(),
    };
    info!(bank = bank.name(), mode = %config.delivery_mode, "opening quiz");

    let settings = SessionSettings::from(&config);
    let mut session = QuizSession::new(settings, bank.quiz_length(), Rc::new(SystemClock));
    session.load(&mut bank);

    let mut app = App::new(session, bank)
        .with_history(AttemptStore::new().ok())
        .with_export(AppDirs::export_path());

    enable_raw_mode()?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = start_tui(
        &mut terminal,
        &mut app,
        Runner::new(
            CrosstermEventSource::new(),
            FixedTicker::new(Duration::from_millis(IDLE_TICK_MS)),
        ),
    );

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen,)?;
    terminal.show_cursor()?;

    result
}

fn start_tui<B: Backend, E: EventSource, T: Ticker>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    runner: Runner<E, T>,
) -> Result<(), Box<dyn Error>> {
    terminal.draw(|f| f.render_widget(QuizView::new(app), f.area()))?;

    loop {
        let redraw = match runner.step(app.session.tick_interval()) {
            AppEvent::Tick => app.on_tick(),
            AppEvent::Resize => true,
            AppEvent::Key(key) => match keymap::action_for(key) {
                Some(action) => {
                    if app.handle(action) == Flow::Quit {
                        break;
                    }
                    true
                }
                None => false,
            },
        };
        if redraw {
            terminal.draw(|f| f.render_widget(QuizView::new(app), f.area()))?;
        }
    }

    info!(finished = app.session.is_finished(), "leaving quiz");
    Ok(())
}
