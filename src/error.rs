pub type Result<T> = std::result::Result<T, QuizError>;

#[derive(Debug, thiserror::Error)]
pub enum QuizError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server error: {message}")]
    Server { message: String },

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Screen {index} is outside 1..={total}")]
    InvalidScreen { index: usize, total: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
