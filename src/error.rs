//! Error types for the Converge reconciliation engine.
//!
//! This module provides the error hierarchy for every stage of an
//! invocation: parameter validation, target connectivity, authentication,
//! resource lookup, and remote mutations.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the Converge engine.
#[derive(Debug, Error)]
pub enum ConvergeError {
    /// Parameter or definition validation errors.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Transport/network errors reaching the target system.
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Authentication errors against the target system.
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// A lookup matched more than one remote object.
    #[error("Ambiguous resource: identity ({identity}) matched {} objects: {}", matches.len(), matches.join(", "))]
    AmbiguousResource {
        /// Rendered identity parameters used for the lookup.
        identity: String,
        /// Identifiers of all matching remote objects.
        matches: Vec<String>,
    },

    /// A remote mutation call failed.
    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Parameter and definition validation errors.
///
/// These are always recoverable by the caller correcting input and are
/// never retried.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required parameter was not supplied.
    #[error("Missing required parameter: {name}")]
    MissingRequired {
        /// Name of the missing parameter.
        name: String,
    },

    /// A supplied parameter is not declared in the schema.
    #[error("Unknown parameter: {name}")]
    UnknownParameter {
        /// Name of the unknown parameter.
        name: String,
    },

    /// A value could not be coerced to the declared type.
    #[error("Parameter '{name}' expects {expected}, got {found}")]
    TypeMismatch {
        /// Name of the offending parameter.
        name: String,
        /// Declared type.
        expected: String,
        /// Type of the supplied value.
        found: String,
    },

    /// A value is outside the declared choices.
    #[error("Parameter '{name}' must be one of [{allowed}], got '{value}'")]
    InvalidChoice {
        /// Name of the offending parameter.
        name: String,
        /// Comma-separated allowed choices.
        allowed: String,
        /// The rejected value.
        value: String,
    },

    /// Two or more mutually exclusive parameters were supplied together.
    #[error("Parameters [{names}] are mutually exclusive")]
    MutuallyExclusive {
        /// Comma-separated names of the conflicting parameters.
        names: String,
    },

    /// A required-together group was only partially supplied.
    #[error("Parameters [{names}] are required together, missing '{missing}'")]
    RequiredTogether {
        /// Comma-separated names of the group.
        names: String,
        /// Name of the parameter missing from the group.
        missing: String,
    },

    /// The schema itself is malformed.
    #[error("Invalid schema: {message}")]
    InvalidSchema {
        /// Description of the schema problem.
        message: String,
    },

    /// The module definition file was not found.
    #[error("Definition file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The module definition file could not be parsed.
    #[error("Failed to parse definition: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },
}

/// Transport and network errors.
///
/// These may be transient; any retry policy belongs to the transport
/// layer, not the pipeline.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The target system could not be reached.
    #[error("Target unreachable: {message}")]
    Unreachable {
        /// Description of the network failure.
        message: String,
    },

    /// The request timed out.
    #[error("Request timed out: {message}")]
    Timeout {
        /// Description of the timeout.
        message: String,
    },

    /// The target rate-limited the request.
    #[error("Rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// The target returned a response the client could not interpret.
    #[error("Invalid response from target ({status}): {message}")]
    InvalidResponse {
        /// HTTP status code, or 0 when not applicable.
        status: u16,
        /// Description of the response issue.
        message: String,
    },
}

/// Authentication errors.
///
/// Never retried; surfaced immediately.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The target rejected the supplied credentials.
    #[error("Credentials rejected by target: {message}")]
    Rejected {
        /// Error detail from the target.
        message: String,
    },

    /// No credentials were available to present.
    #[error("No credentials available: set the '{env_var}' environment variable")]
    MissingCredentials {
        /// Environment variable expected to hold the credential.
        env_var: String,
    },
}

/// Remote mutation errors.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The target rejected a create/update/delete call.
    ///
    /// The remote error payload is preserved verbatim.
    #[error("{operation} rejected by target ({status}): {payload}")]
    RemoteRejected {
        /// The logical operation that failed (create, update, delete).
        operation: String,
        /// HTTP status code, or 0 when not applicable.
        status: u16,
        /// The remote system's error payload, verbatim.
        payload: serde_json::Value,
    },

    /// A mutation succeeded but the target did not report the resulting
    /// state, and it could not be re-fetched.
    #[error("{operation} succeeded but resulting state is unknown: {message}")]
    IncompleteState {
        /// The logical operation involved.
        operation: String,
        /// Description of what is missing.
        message: String,
    },
}

/// Result type alias for Converge operations.
pub type Result<T> = std::result::Result<T, ConvergeError>;

impl ConvergeError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error is transient from the transport's point
    /// of view.
    ///
    /// The pipeline itself never retries; this is consulted only by the
    /// connection handle beneath it.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection(
                ConnectionError::RateLimited { .. }
                    | ConnectionError::Unreachable { .. }
                    | ConnectionError::Timeout { .. }
            )
        )
    }

    /// Returns a short machine-readable name for the error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Connection(_) => "connection",
            Self::Auth(_) => "auth",
            Self::AmbiguousResource { .. } => "ambiguous_resource",
            Self::Action(_) => "action",
            Self::Io(_) => "io",
            Self::Internal(_) => "internal",
        }
    }

    /// Returns the structured remote error payload, if this error carries
    /// one.
    #[must_use]
    pub const fn payload(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Action(ActionError::RemoteRejected { payload, .. }) => Some(payload),
            _ => None,
        }
    }
}

impl ValidationError {
    /// Creates a schema error with the given message.
    #[must_use]
    pub fn schema(message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates a parse error with the given message.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
            location: None,
        }
    }
}

impl ConnectionError {
    /// Creates an unreachable error with the given message.
    #[must_use]
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable {
            message: message.into(),
        }
    }
}

impl ActionError {
    /// Creates a remote-rejection error preserving the raw payload.
    #[must_use]
    pub fn rejected(operation: impl Into<String>, status: u16, payload: serde_json::Value) -> Self {
        Self::RemoteRejected {
            operation: operation.into(),
            status,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        let rate_limited = ConvergeError::Connection(ConnectionError::RateLimited {
            retry_after_secs: 30,
        });
        assert!(rate_limited.is_retryable());

        let auth = ConvergeError::Auth(AuthError::Rejected {
            message: String::from("bad token"),
        });
        assert!(!auth.is_retryable());

        let validation = ConvergeError::Validation(ValidationError::MissingRequired {
            name: String::from("name"),
        });
        assert!(!validation.is_retryable());
    }

    #[test]
    fn test_action_error_preserves_payload() {
        let payload = serde_json::json!({ "code": "quota_exceeded", "detail": "limit reached" });
        let err = ConvergeError::Action(ActionError::rejected("create", 409, payload.clone()));

        assert_eq!(err.kind(), "action");
        assert_eq!(err.payload(), Some(&payload));
    }

    #[test]
    fn test_ambiguous_resource_message_names_matches() {
        let err = ConvergeError::AmbiguousResource {
            identity: String::from("name=web"),
            matches: vec![String::from("r-1"), String::from("r-2")],
        };
        let rendered = err.to_string();
        assert!(rendered.contains("r-1"));
        assert!(rendered.contains("r-2"));
    }
}
