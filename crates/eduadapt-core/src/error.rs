//! Error types for EduAdapt.
//!
//! Errors are grouped into the categories the workflows react to: a blocked
//! transition with a user-visible message (validation, auth, lookup, state),
//! a generation failure that is always swallowed behind a fallback, or a
//! storage/configuration fault.

use std::path::PathBuf;

use crate::model::Role;

/// A specialized `Result` type for EduAdapt operations.
pub type Result<T> = std::result::Result<T, EduError>;

/// Errors that can occur while running the EduAdapt workflows.
#[derive(Debug, thiserror::Error)]
pub enum EduError {
    // ========================================================================
    // Validation Errors
    // ========================================================================
    /// A required field was missing or empty.
    #[error("Invalid {field}: {message}")]
    Validation {
        /// Name of the offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// A one-time record already exists and cannot be recreated.
    #[error("{what} is already configured")]
    AlreadyConfigured {
        /// Which record was already present.
        what: String,
    },

    // ========================================================================
    // Auth Errors
    // ========================================================================
    /// Registration attempted for a username that is already taken.
    #[error("User '{username}' already exists")]
    UserExists {
        /// The duplicate username.
        username: String,
    },

    /// Login attempted for an unknown username.
    #[error("User '{username}' not found")]
    UserNotFound {
        /// The unknown username.
        username: String,
    },

    /// Login attempted with the wrong password.
    #[error("Incorrect password")]
    WrongPassword,

    /// Credentials are valid but registered under another role.
    #[error("This user does not have a {expected} profile")]
    WrongRole {
        /// The role the caller tried to authenticate as.
        expected: Role,
    },

    /// The session id is unknown or has been logged out.
    #[error("Session not found or expired")]
    SessionNotFound,

    // ========================================================================
    // Lookup Errors
    // ========================================================================
    /// No subject owns the given lookup code.
    #[error("Invalid code or student not found: '{code}'")]
    InvalidCode {
        /// The code as entered.
        code: String,
    },

    /// The referenced subject does not exist in the profile.
    #[error("Subject '{id}' not found")]
    SubjectNotFound {
        /// The subject id.
        id: String,
    },

    /// The referenced class group does not exist.
    #[error("Group '{id}' not found")]
    GroupNotFound {
        /// The group id.
        id: String,
    },

    /// The operation needs a profile that has not been created yet.
    #[error("No {what} profile exists for '{username}'")]
    ProfileNotFound {
        /// Which kind of profile was expected.
        what: String,
        /// The owning username.
        username: String,
    },

    // ========================================================================
    // Generation Errors
    // ========================================================================
    /// The content provider failed or returned content of the wrong shape.
    #[error("Content generation failed ({kind}): {message}")]
    Generation {
        /// Broad classification of the failure.
        kind: GenerationErrorKind,
        /// Provider or parser detail, for logs only.
        message: String,
    },

    // ========================================================================
    // Workflow State Errors
    // ========================================================================
    /// The operation is not valid in the current workflow step.
    #[error("Invalid state transition: cannot go from {from} to {to}")]
    InvalidStateTransition {
        /// The current step.
        from: String,
        /// The attempted target.
        to: String,
    },

    /// A generation-backed request is already outstanding for this session.
    #[error("A request is already in progress for this session")]
    RequestInFlight,

    /// The lesson answer was already submitted; the selection is locked.
    #[error("Answer already submitted for this lesson")]
    AnswerLocked,

    // ========================================================================
    // Storage Errors
    // ========================================================================
    /// A collection file exists but cannot be parsed.
    #[error("Corrupted record store file '{path}': {message}\n\nSuggestion: Restore the file from backup or remove it to start fresh")]
    StoreCorrupted {
        /// Path to the corrupted file.
        path: PathBuf,
        /// Description of the corruption.
        message: String,
    },

    /// No unused lookup code could be drawn for this prefix.
    #[error("No free subject codes left for prefix '{prefix}'")]
    CodeSpaceExhausted {
        /// The three-letter prefix.
        prefix: String,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in the configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your eduadapt.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Categories of content generation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationErrorKind {
    /// The call did not finish within the configured timeout.
    Timeout,
    /// No provider is configured or reachable.
    Unavailable,
    /// The provider answered with an error status.
    Provider,
    /// The response did not match the requested output shape.
    Malformed,
}

impl std::fmt::Display for GenerationErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::Provider => write!(f, "provider"),
            Self::Malformed => write!(f, "malformed"),
        }
    }
}

/// Coarse error taxonomy used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing or empty input; the transition is blocked.
    Validation,
    /// Registration or login rejected.
    Auth,
    /// A code, subject, group or profile could not be resolved.
    Lookup,
    /// Provider failure; always replaced by fallback content.
    Generation,
    /// Operation not allowed in the current workflow step.
    State,
    /// Persistence or configuration fault.
    Storage,
}

impl EduError {
    /// Creates a new `Validation` error.
    #[must_use]
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a `Validation` error for a required field left empty.
    #[must_use]
    pub fn required(field: impl Into<String>) -> Self {
        Self::validation(field, "this field is required")
    }

    /// Creates a new `AlreadyConfigured` error.
    #[must_use]
    pub fn already_configured(what: impl Into<String>) -> Self {
        Self::AlreadyConfigured { what: what.into() }
    }

    /// Creates a new `UserExists` error.
    #[must_use]
    pub fn user_exists(username: impl Into<String>) -> Self {
        Self::UserExists {
            username: username.into(),
        }
    }

    /// Creates a new `UserNotFound` error.
    #[must_use]
    pub fn user_not_found(username: impl Into<String>) -> Self {
        Self::UserNotFound {
            username: username.into(),
        }
    }

    /// Creates a new `InvalidCode` error.
    #[must_use]
    pub fn invalid_code(code: impl Into<String>) -> Self {
        Self::InvalidCode { code: code.into() }
    }

    /// Creates a new `SubjectNotFound` error.
    #[must_use]
    pub fn subject_not_found(id: impl Into<String>) -> Self {
        Self::SubjectNotFound { id: id.into() }
    }

    /// Creates a new `GroupNotFound` error.
    #[must_use]
    pub fn group_not_found(id: impl Into<String>) -> Self {
        Self::GroupNotFound { id: id.into() }
    }

    /// Creates a new `ProfileNotFound` error.
    #[must_use]
    pub fn profile_not_found(what: impl Into<String>, username: impl Into<String>) -> Self {
        Self::ProfileNotFound {
            what: what.into(),
            username: username.into(),
        }
    }

    /// Creates a new `Generation` error.
    #[must_use]
    pub fn generation(kind: GenerationErrorKind, message: impl Into<String>) -> Self {
        Self::Generation {
            kind,
            message: message.into(),
        }
    }

    /// Creates a `Generation` error for a response of the wrong shape.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::generation(GenerationErrorKind::Malformed, message)
    }

    /// Creates a new `InvalidStateTransition` error.
    #[must_use]
    pub fn invalid_transition(from: impl std::fmt::Display, to: impl std::fmt::Display) -> Self {
        Self::InvalidStateTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Creates a new `StoreCorrupted` error.
    #[must_use]
    pub fn store_corrupted(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::StoreCorrupted {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Returns the taxonomy bucket this error belongs to.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation { .. } | Self::AlreadyConfigured { .. } => ErrorCategory::Validation,
            Self::UserExists { .. }
            | Self::UserNotFound { .. }
            | Self::WrongPassword
            | Self::WrongRole { .. }
            | Self::SessionNotFound => ErrorCategory::Auth,
            Self::InvalidCode { .. }
            | Self::SubjectNotFound { .. }
            | Self::GroupNotFound { .. }
            | Self::ProfileNotFound { .. } => ErrorCategory::Lookup,
            Self::Generation { .. } => ErrorCategory::Generation,
            Self::InvalidStateTransition { .. } | Self::RequestInFlight | Self::AnswerLocked => {
                ErrorCategory::State
            }
            Self::StoreCorrupted { .. }
            | Self::CodeSpaceExhausted { .. }
            | Self::ConfigParseError { .. }
            | Self::ConfigValidationError { .. }
            | Self::Io(_)
            | Self::Json(_) => ErrorCategory::Storage,
        }
    }

    /// Returns `true` if this error is fatal and should stop the process at startup.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError { .. }
                | Self::ConfigValidationError { .. }
                | Self::StoreCorrupted { .. }
        )
    }
}
