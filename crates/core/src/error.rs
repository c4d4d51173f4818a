//! Error types for the BoltStudio domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all BoltStudio operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Sandbox errors ---
    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Persistence errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    /// The account's usage allowance is spent. Retrying without an upgrade
    /// produces the same answer.
    #[error("Usage quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether this failure is the quota-exhaustion variant rather than a
    /// generic transport failure.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, Self::QuotaExceeded(_))
    }
}

#[derive(Debug, Clone, Error)]
pub enum SandboxError {
    #[error("No such file or directory: {0}")]
    NotFound(String),

    #[error("Path rejected: {path}: {reason}")]
    PathRejected { path: String, reason: String },

    #[error("Failed to spawn '{command}': {reason}")]
    Spawn { command: String, reason: String },

    #[error("Command timed out after {timeout_secs}s: {command}")]
    Timeout { command: String, timeout_secs: u64 },

    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Missing argument for {kind} tool")]
    MissingArgument { kind: String },

    #[error("Fetch failed for {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Project not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corrupted project document {id}: {reason}")]
    Corrupted { id: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 502,
            message: "Bad gateway".into(),
        });
        assert!(err.to_string().contains("502"));
        assert!(err.to_string().contains("Bad gateway"));
    }

    #[test]
    fn quota_is_distinguished_from_transport() {
        assert!(ProviderError::QuotaExceeded("Usage limit reached".into()).is_quota_exceeded());
        assert!(!ProviderError::Network("connection reset".into()).is_quota_exceeded());
        assert!(
            !ProviderError::ApiError {
                status_code: 403,
                message: "forbidden".into()
            }
            .is_quota_exceeded()
        );
    }

    #[test]
    fn sandbox_error_wraps_into_tool_error() {
        let err: ToolError = SandboxError::NotFound("src/missing.ts".into()).into();
        assert!(err.to_string().contains("src/missing.ts"));
    }
}
