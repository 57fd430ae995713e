use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::error::{QuizError, Result};

/// Environment variable holding the log filter directives
pub const LOG_ENV: &str = "QUIZDECK_LOG";

const DEFAULT_DIRECTIVES: &str = "quizdeck=info";

fn filter_from(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Install the global subscriber.
///
/// The terminal belongs to the UI, so events go to `path` when given and
/// are discarded otherwise.
pub fn init(path: Option<&Path>) -> Result<()> {
    let directives = std::env::var(LOG_ENV).ok();
    let filter = filter_from(directives.as_deref());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(true);

    let installed = match path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().append(true).create(true).open(path)?;
            builder.with_writer(Mutex::new(file)).try_init()
        }
        None => builder.with_writer(std::io::sink).try_init(),
    };
    installed.map_err(|e| QuizError::Config(format!("logging already initialised: {e}")))
}
