use thiserror::Error;

/// Application error types.
///
/// Price lookups never surface these; a missing price is `None`. This covers
/// input parsing and configuration.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
