use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("connection is closed")]
    Closed,
    #[error("connection is already running")]
    AlreadyRunning,
    #[error("encode message error {0:?}")]
    Encode(anyhow::Error),
}
