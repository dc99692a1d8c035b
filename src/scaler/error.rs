//! # Scaler Errors
//!
//! Typed error taxonomy for scaler construction and metric queries. Every
//! error carries enough context to identify the field or backend involved,
//! and maps to a stable `kind` label used by the error counters.

use thiserror::Error;

/// Errors produced by scaler construction, metadata binding, and metric queries
#[derive(Debug, Error)]
pub enum ScalerError {
    /// A required configuration field is absent from every declared source
    #[error("missing required field: {field}")]
    MissingRequiredField {
        /// Name of the missing trigger metadata field
        field: String,
    },

    /// A configuration field is present but cannot be parsed into its target type
    #[error("invalid value for {field}: {reason}")]
    BadValue {
        /// Name of the offending field
        field: String,
        /// Why the value was rejected
        reason: String,
    },

    /// Mutually-exclusive configuration options were both set
    #[error("conflicting trigger configuration: {reason}")]
    ConflictingConfig {
        /// Which options conflict
        reason: String,
    },

    /// Unknown trigger type or metric name
    #[error("{what} not found")]
    NotFound {
        /// What could not be resolved
        what: String,
    },

    /// Network, HTTP, or SDK failure while talking to the backend
    #[error("transport failure against {backend}: {source}")]
    Transport {
        /// Backend identifier (host, queue, monitor namespace)
        backend: String,
        /// Underlying client error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Credentials rejected by the backend
    #[error("authentication rejected by {backend}: {reason}")]
    Auth {
        /// Backend identifier
        backend: String,
        /// Rejection detail as reported by the backend
        reason: String,
    },

    /// The caller's context was cancelled or its deadline expired
    #[error("query cancelled or deadline exceeded")]
    Cancelled,

    /// Backend answered but produced no data, and no fallback is configured
    #[error("backend {backend} returned no data")]
    EmptyResponse {
        /// Backend identifier
        backend: String,
    },

    /// A call arrived after `close` completed
    #[error("scaler already closed")]
    AlreadyClosed,

    /// Invariant violated; a bug, not an operator error
    #[error("internal error: {0}")]
    Internal(String),
}

impl ScalerError {
    /// Shorthand for [`ScalerError::MissingRequiredField`]
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
        }
    }

    /// Shorthand for [`ScalerError::BadValue`]
    pub fn bad_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BadValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for [`ScalerError::ConflictingConfig`]
    pub fn conflicting(reason: impl Into<String>) -> Self {
        Self::ConflictingConfig {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`ScalerError::Transport`]
    pub fn transport(
        backend: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            backend: backend.into(),
            source: Box::new(source),
        }
    }

    /// Stable kind tag for error counters and adapter status mapping
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MissingRequiredField { .. } => "missing-required-field",
            Self::BadValue { .. } => "bad-value",
            Self::ConflictingConfig { .. } => "conflicting-config",
            Self::NotFound { .. } => "not-found",
            Self::Transport { .. } => "transport",
            Self::Auth { .. } => "auth",
            Self::Cancelled => "cancelled",
            Self::EmptyResponse { .. } => "empty-response",
            Self::AlreadyClosed | Self::Internal(_) => "internal",
        }
    }

    /// True when the error stems from trigger configuration rather than the
    /// backend, meaning retries cannot succeed until the `ScaledObject` changes
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::MissingRequiredField { .. } | Self::BadValue { .. } | Self::ConflictingConfig { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels_are_stable() {
        assert_eq!(
            ScalerError::missing_field("queueName").kind(),
            "missing-required-field"
        );
        assert_eq!(
            ScalerError::bad_value("threshold", "not a number").kind(),
            "bad-value"
        );
        assert_eq!(ScalerError::Cancelled.kind(), "cancelled");
        assert_eq!(ScalerError::AlreadyClosed.kind(), "internal");
    }

    #[test]
    fn test_messages_name_the_field() {
        let err = ScalerError::missing_field("password");
        assert!(err.to_string().contains("password"));

        let err = ScalerError::bad_value("desiredReplicas", "must be positive");
        assert!(err.to_string().contains("desiredReplicas"));
        assert!(err.to_string().contains("must be positive"));
    }

    #[test]
    fn test_config_errors_are_flagged() {
        assert!(ScalerError::missing_field("host").is_config_error());
        assert!(ScalerError::conflicting("queueName and topicName").is_config_error());
        assert!(!ScalerError::Cancelled.is_config_error());
    }
}
