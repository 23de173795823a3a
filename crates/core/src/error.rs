use thiserror::Error;

#[derive(Error, Debug)]
pub enum TagBufferError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid buffer path: {0}")]
    InvalidPath(String),
}
