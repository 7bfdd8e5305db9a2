//! Runtime errors (`5xx`) and warnings (`6xx`).

use std::fmt;

use ember_host::HostError;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum RuntimeErrorCode {
    InvalidOperation = 501,
    InvalidType = 502,
    StackOverflow = 503,
    StackUnderflow = 504,
    InvalidBytecode = 505,
    InvalidLocal = 506,
    InvalidReference = 507,
    ReferenceTableFull = 508,
    HostCallFailed = 509,
    InvalidMember = 510,
    InVarTypeError = 511,

    StackNotEmpty = 601,
    ReferenceNotRemoved = 602,
}

impl RuntimeErrorCode {
    pub fn number(self) -> u16 {
        self as u16
    }

    pub fn is_warning(self) -> bool {
        self.number() >= 600
    }

    pub fn header(self) -> &'static str {
        if self.is_warning() {
            "Runtime Warning"
        } else {
            "Runtime Error"
        }
    }
}

/// An error that terminated a run. The runtime is fully reset afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{header}: {message}")]
pub struct RuntimeError {
    pub code: RuntimeErrorCode,
    pub header: String,
    pub message: String,
}

impl RuntimeError {
    pub fn new(code: RuntimeErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            header: code.header().to_string(),
            message: message.into(),
        }
    }
}

impl From<HostError> for RuntimeError {
    fn from(e: HostError) -> Self {
        RuntimeError::new(RuntimeErrorCode::HostCallFailed, e.to_string())
    }
}

/// Advisory condition reported to the listener; the run continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeWarning {
    pub code: RuntimeErrorCode,
    pub message: String,
}

impl fmt::Display for RuntimeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.header(), self.message)
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Shorthand for `Err(RuntimeError::new(code, message))`.
pub fn fail<T>(code: RuntimeErrorCode, message: impl Into<String>) -> RuntimeResult<T> {
    Err(RuntimeError::new(code, message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bands_and_headers() {
        assert_eq!(RuntimeErrorCode::InvalidType.number(), 502);
        assert!(!RuntimeErrorCode::InVarTypeError.is_warning());
        assert!(RuntimeErrorCode::ReferenceNotRemoved.is_warning());
        assert_eq!(RuntimeErrorCode::StackNotEmpty.header(), "Runtime Warning");
    }

    #[test]
    fn test_host_errors_become_host_call_failures() {
        let err: RuntimeError = HostError::failed("boom").into();
        assert_eq!(err.code, RuntimeErrorCode::HostCallFailed);
        assert_eq!(err.header, "Runtime Error");
        assert!(err.to_string().contains("boom"));
    }
}
