use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Container runtime not found: {0}")]
    RuntimeNotFound(String),

    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Container '{name}' did not become healthy within {timeout_secs}s (last status: {status})")]
    NotHealthy {
        name: String,
        timeout_secs: u64,
        status: String,
    },

    #[error("Smoke check failed: {0}")]
    SmokeFailed(String),
}

pub type Result<T> = std::result::Result<T, ImageError>;
