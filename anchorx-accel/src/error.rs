use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccelError {
    #[error("Accelerator unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Invalid accelerator command: {0}")]
    InvalidCommand(String),
}

pub type AccelResult<T> = Result<T, AccelError>;
