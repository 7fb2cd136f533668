//! Error types for Handy operations

use thiserror::Error;

/// Cache layer errors.
///
/// Persistent-tier failures never surface here: the cache logs them and keeps
/// serving from memory. These are the failures a caller can act on.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Invalid TTL for key {key}: must be greater than zero")]
    InvalidTtl { key: String },

    #[error("Failed to serialize value for key {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Corrupt cache entry for key {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Persistent key-value store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Failed to open store at {path}: {reason}")]
    Open { path: String, reason: String },

    #[error("Read failed for key {key}: {reason}")]
    Read { key: String, reason: String },

    #[error("Write failed for key {key}: {reason}")]
    Write { key: String, reason: String },

    #[error("Remove failed for {count} key(s): {reason}")]
    Remove { count: usize, reason: String },

    #[error("Key enumeration failed: {reason}")]
    Enumerate { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Authentication errors.
///
/// Closed set of failures reported by an auth provider. Provider-specific
/// error codes are folded in with [`AuthError::from_code`], and every variant
/// has a user-facing message via [`AuthError::user_message`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("User not found")]
    UserNotFound,

    #[error("Wrong password")]
    WrongPassword,

    #[error("Email already in use")]
    EmailAlreadyInUse,

    #[error("Password too weak")]
    WeakPassword,

    #[error("Invalid email")]
    InvalidEmail,

    #[error("Too many requests")]
    TooManyRequests,

    #[error("Network failure: {reason}")]
    NetworkFailure { reason: String },

    #[error("Unknown auth error: {code}")]
    Unknown { code: String },
}

impl AuthError {
    /// Map a provider error code (`auth/user-not-found`, ...) to a variant.
    pub fn from_code(code: &str) -> Self {
        match code {
            "auth/user-not-found" => Self::UserNotFound,
            "auth/wrong-password" => Self::WrongPassword,
            "auth/email-already-in-use" => Self::EmailAlreadyInUse,
            "auth/weak-password" => Self::WeakPassword,
            "auth/invalid-email" => Self::InvalidEmail,
            "auth/too-many-requests" => Self::TooManyRequests,
            "auth/network-request-failed" => Self::NetworkFailure {
                reason: code.to_string(),
            },
            other => Self::Unknown {
                code: other.to_string(),
            },
        }
    }

    /// Message suitable for showing to the person signing in.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::UserNotFound => "User not found",
            Self::WrongPassword => "Incorrect password",
            Self::EmailAlreadyInUse => "That email is already in use",
            Self::WeakPassword => "The password is too weak",
            Self::InvalidEmail => "Invalid email address",
            Self::TooManyRequests => "Too many failed attempts, try again later",
            Self::NetworkFailure { .. } => "Network unavailable, check your connection",
            Self::Unknown { .. } => "Authentication error",
        }
    }

    /// True for failures that may succeed when retried unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkFailure { .. } | Self::TooManyRequests)
    }
}

/// Document store errors.
///
/// A missing document on `get` is not an error (it is `Ok(None)`);
/// `NotFound` is only produced by operations that require the document.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("Document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("Document store unreachable: {reason}")]
    Transport { reason: String },

    #[error("Document {collection}/{id} does not match schema: {reason}")]
    Schema {
        collection: String,
        id: String,
        reason: String,
    },

    #[error("Permission denied on {collection}/{id}")]
    PermissionDenied { collection: String, id: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or HANDY_CONFIG)")]
    MissingConfigPath,

    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },

    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Query errors raised by the query layer itself, as opposed to the
/// failures a query function reports.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("Query {key} is disabled")]
    Disabled { key: String },

    #[error("Query {key} is detached from its consumer")]
    Detached { key: String },

    #[error("Query {key} failed: {reason}")]
    Failed { key: String, reason: String },
}

impl QueryError {
    /// Wrap an arbitrary query-function failure.
    pub fn failed(key: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Failed {
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}

/// Master error type for all Handy errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandyError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Document error: {0}")]
    Document(#[from] DocumentError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),
}

/// Result type alias for Handy operations.
pub type HandyResult<T> = Result<T, HandyError>;

// =============================================================================
// TESTS
// =============================================================================
