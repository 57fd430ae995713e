// Library surface for the binary, headless runs and integration tests.
// The terminal rendering lives in the binary (src/ui.rs).
pub mod app;
pub mod app_dirs;
pub mod choice;
pub mod clock;
pub mod config;
pub mod error;
pub mod export;
pub mod history;
pub mod keymap;
pub mod logging;
pub mod manager;
pub mod navigation;
pub mod question;
pub mod question_timer;
pub mod runtime;
pub mod scroller;
pub mod session;
pub mod source;
pub mod stopwatch;
pub mod util;

pub use error::{QuizError, Result};
pub use session::{DeliveryMode, QuizSession, SessionSettings};
