use thiserror::Error;

/// Errors that can occur while setting up a chaining run
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
}

pub type ChainResult<T> = Result<T, ChainError>;

/// Report an unrecoverable condition and abort the process.
///
/// Used for backing-allocator exhaustion and free-list corruption; neither is
/// ever turned into a recoverable error.
#[cold]
pub fn fatal(message: &str) -> ! {
    log::error!("{}", message);
    eprintln!("{}", message);
    std::process::abort()
}
