use thiserror::Error;

/// Failure reported by a host callback.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    #[error("{0}")]
    Failed(String),
    #[error("'{member}' expects argument {index} to be {expected}")]
    ArgumentType {
        member: String,
        index: usize,
        expected: &'static str,
    },
    #[error("'{0}' was called on an object of the wrong type")]
    Receiver(String),
    #[error("Index {index} is out of range for {len} items")]
    IndexOutOfRange { index: f64, len: usize },
    #[error("'{0}' is read-only")]
    ReadOnly(String),
}

impl HostError {
    pub fn failed(message: impl Into<String>) -> Self {
        HostError::Failed(message.into())
    }
}
