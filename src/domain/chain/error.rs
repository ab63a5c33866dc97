//! Chain execution error types

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a run was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// Explicit cancel request from a client
    Cancelled,

    /// The chain's maximum execution time elapsed
    Timeout,
}

impl CancelReason {
    /// Message recorded on step entries interrupted by this cancellation
    pub fn message(&self) -> &'static str {
        match self {
            Self::Cancelled => "cancelled",
            Self::Timeout => "cancelled: timeout",
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Coarse error category recorded on failed steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    ExternalService,
    Bounds,
    Cancellation,
    Rejected,
}

/// Errors raised while validating or executing a chain
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChainError {
    /// Invalid chain or step configuration (unknown kind, missing field,
    /// bad regex, dangling reference, cycle)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A collaborator (LLM, HTTP endpoint, database, sandbox) failed
    #[error("{service} error: {message}")]
    ExternalService {
        service: String,
        message: String,
        status: Option<u16>,
    },

    /// A loop, nesting or time limit was exceeded
    #[error("Bounds exceeded: {0}")]
    Bounds(String),

    /// The run was cancelled or timed out
    #[error("{}", .0.message())]
    Cancelled(CancelReason),

    /// An approval step was rejected
    #[error("Approval rejected: {0}")]
    Rejected(String),
}

impl ChainError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn external(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn external_with_status(
        service: impl Into<String>,
        status: u16,
        message: impl Into<String>,
    ) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
            status: Some(status),
        }
    }

    pub fn bounds(message: impl Into<String>) -> Self {
        Self::Bounds(message.into())
    }

    pub fn cancelled(reason: CancelReason) -> Self {
        Self::Cancelled(reason)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// Category recorded on the failing step
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::ExternalService { .. } => ErrorKind::ExternalService,
            Self::Bounds(_) => ErrorKind::Bounds,
            Self::Cancelled(_) => ErrorKind::Cancellation,
            Self::Rejected(_) => ErrorKind::Rejected,
        }
    }

    /// Cancellation is never retried nor recovered by an error handler
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        match self {
            Self::Cancelled(reason) => Some(*reason),
            _ => None,
        }
    }

    /// Prefix the message with context while keeping the category
    pub fn context(self, context: impl fmt::Display) -> Self {
        match self {
            Self::Configuration(message) => Self::Configuration(format!("{}: {}", context, message)),
            Self::ExternalService {
                service,
                message,
                status,
            } => Self::ExternalService {
                service,
                message: format!("{}: {}", context, message),
                status,
            },
            Self::Bounds(message) => Self::Bounds(format!("{}: {}", context, message)),
            Self::Rejected(message) => Self::Rejected(format!("{}: {}", context, message)),
            cancelled @ Self::Cancelled(_) => cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_display() {
        let err = ChainError::configuration("unknown step type 'foo'");
        assert_eq!(err.to_string(), "Configuration error: unknown step type 'foo'");
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_external_service_display() {
        let err = ChainError::external_with_status("http", 502, "Bad Gateway");
        assert_eq!(err.to_string(), "http error: Bad Gateway");
        assert_eq!(err.kind(), ErrorKind::ExternalService);
    }

    #[test]
    fn test_cancelled_display() {
        assert_eq!(
            ChainError::cancelled(CancelReason::Cancelled).to_string(),
            "cancelled"
        );
        assert_eq!(
            ChainError::cancelled(CancelReason::Timeout).to_string(),
            "cancelled: timeout"
        );
    }

    #[test]
    fn test_context_keeps_kind() {
        let err = ChainError::bounds("loop exceeded 5 iterations").context("step 'poll'");
        assert_eq!(
            err.to_string(),
            "Bounds exceeded: step 'poll': loop exceeded 5 iterations"
        );

        let cancelled = ChainError::cancelled(CancelReason::Cancelled).context("ignored");
        assert_eq!(cancelled, ChainError::Cancelled(CancelReason::Cancelled));
    }

    #[test]
    fn test_cancel_reason_serialization() {
        assert_eq!(
            serde_json::to_string(&CancelReason::Timeout).unwrap(),
            "\"timeout\""
        );
    }
}
