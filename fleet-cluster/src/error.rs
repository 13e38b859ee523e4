use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("coordination store client error: {0}")]
    Client(#[from] etcd_client::Error),
    #[error("coordination store unavailable: {0}")]
    Unavailable(String),
    #[error("coordination store rejected the request: {0}")]
    Rejected(String),
    #[error("coordination store call timed out")]
    Timeout,
}

impl StoreError {
    /// Transient errors are expected to clear on their own. A rejected request points at bad
    /// data or configuration. Both are retried on the next cycle; only the watchdog ends a node.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Client(_) | StoreError::Unavailable(_) | StoreError::Timeout => true,
            StoreError::Rejected(_) => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("malformed machine record: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported machine record version {0}")]
    UnsupportedVersion(u32),
}

#[derive(Error, Debug)]
pub enum MembershipError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Record(#[from] RecordError),
}

impl MembershipError {
    pub fn is_transient(&self) -> bool {
        match self {
            MembershipError::Store(error) => error.is_transient(),
            MembershipError::Record(_) => false,
        }
    }
}
