//! Error types for the certsuite QE harness
//!
//! Errors carry the resource or operation they belong to so a failing test
//! step can be traced back to the object it was waiting on. The variants map
//! onto the four failure classes the engine distinguishes: local validation
//! failures, benign absence, poller deadlines and transient server errors.

use std::time::Duration;

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for harness operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error other than "not found"
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Handle or definition failed a local invariant check
    #[error("validation error for {resource}: {message}")]
    Validation {
        /// Identity of the resource whose handle is invalid
        resource: String,
        /// Description of which invariant failed
        message: String,
        /// The offending field path, if known (e.g. "metadata.name")
        field: Option<String>,
    },

    /// The requested object does not exist on the server
    #[error("{kind} {name} not found")]
    NotFound {
        /// Resource kind (e.g. "Deployment")
        kind: String,
        /// Identity of the missing object
        name: String,
    },

    /// A poller deadline elapsed before its condition held
    #[error("timed out after {timeout:?} waiting for {operation}: {message}")]
    Timeout {
        /// What was being waited on
        operation: String,
        /// The budget that elapsed
        timeout: Duration,
        /// Last observed reason the condition did not hold
        message: String,
    },

    /// A wait was aborted through its cancellation token
    #[error("wait for {operation} was cancelled")]
    Cancelled {
        /// What was being waited on
        operation: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Configuration could not be loaded or is inconsistent
    #[error("configuration error: {message}")]
    Config {
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred
        context: String,
    },
}

impl Error {
    /// Create a validation error without resource context
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error for a specific resource
    pub fn validation_for(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error for a specific resource and field path
    pub fn validation_for_field(
        resource: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            resource: resource.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a not-found error
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(
        operation: impl Into<String>,
        timeout: Duration,
        msg: impl Into<String>,
    ) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout,
            message: msg.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an internal error without specific context
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// True for "the object is absent", whether classified locally or
    /// returned as a raw 404 from the API server.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube {
                source: kube::Error::Api(ae),
            } => ae.code == 404,
            _ => false,
        }
    }

    /// True when a poller deadline elapsed
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Check if this error is retryable inside a poll loop
    ///
    /// Validation, not-found, serialization and configuration errors need a
    /// caller-side fix. Transient Kubernetes errors (connection failures,
    /// 5xx, 429) are retried until the poller's own deadline.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => match source {
                kube::Error::Api(ae) => ae.code == 429 || !(400..500).contains(&ae.code),
                _ => true,
            },
            Error::Validation { .. } => false,
            Error::NotFound { .. } => false,
            Error::Timeout { .. } => false,
            Error::Cancelled { .. } => false,
            Error::Serialization { .. } => false,
            Error::Config { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Get the resource identity if this error is tied to one
    pub fn resource(&self) -> Option<&str> {
        match self {
            Error::Validation { resource, .. } => Some(resource),
            Error::NotFound { name, .. } => Some(name),
            _ => None,
        }
    }
}
