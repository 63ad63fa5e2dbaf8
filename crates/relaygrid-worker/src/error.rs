//! Worker error types.

use thiserror::Error;

use relaygrid_queue::TransportError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("invalid job descriptor: {0:?}")]
    InvalidJob(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("scratch i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}
