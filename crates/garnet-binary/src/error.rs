use thiserror::Error;

#[derive(Error, Debug)]
pub enum BinaryError {
    #[error("buffer ended unexpectedly: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },
    #[error("invalid data: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, BinaryError>;
