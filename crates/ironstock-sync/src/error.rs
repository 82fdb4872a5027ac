//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Remote        │  │     Payload             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Unauthorized   │  │  Rejected               │ │
//! │  │  InvalidUrl     │  │  RateLimited    │  │  SerializationFailed    │ │
//! │  │  ConfigLoad/Save│  │  Server         │  │                         │ │
//! │  │                 │  │  Request        │  │                         │ │
//! │  │                 │  │  Network        │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │    Storage      │  │    Internal     │                              │
//! │  │  Storage        │  │  ShuttingDown   │                              │
//! │  │                 │  │  ChannelError   │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Remote errors never leave the engine. Their `Display` text is exactly
//! what lands in the status record's `lastError`.

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Invalid remote base URL.
    #[error("Invalid remote URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// 401 from the remote store.
    #[error("{}", or_default(.detail, "Unauthorized (check sync token)."))]
    Unauthorized { detail: Option<String> },

    /// 429 from the remote store, with the `retry-after` hint in seconds.
    #[error("{}", or_default(.detail, "Rate limited by remote store. Retrying…"))]
    RateLimited {
        retry_after: Option<f64>,
        detail: Option<String>,
    },

    /// 5xx from the remote store.
    #[error("{}", or_default(.detail, "Server error. Retrying…"))]
    Server { status: u16, detail: Option<String> },

    /// Any other non-2xx status.
    #[error("{}", request_failed(.status, .url, .detail))]
    Request {
        status: u16,
        url: String,
        detail: Option<String>,
    },

    /// The request never produced a response.
    #[error("Network error: {0}")]
    Network(String),

    // =========================================================================
    // Payload Errors
    // =========================================================================
    /// A 2xx response whose body is not usable (`ok` missing, bad shape).
    #[error("Remote payload rejected: {0}")]
    Rejected(String),

    /// Failed to serialize or parse a local value.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Local key-value store or ledger persistence failed.
    #[error("Storage error: {0}")]
    Storage(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Engine is shutting down.
    #[error("Sync engine is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

fn or_default(detail: &Option<String>, fallback: &str) -> String {
    detail.clone().unwrap_or_else(|| fallback.to_string())
}

fn request_failed(status: &u16, url: &str, detail: &Option<String>) -> String {
    match detail {
        Some(detail) => detail.clone(),
        None => format!("Request failed ({}) for {}", status, url),
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<ironstock_db::DbError> for SyncError {
    fn from(err: ironstock_db::DbError) -> Self {
        SyncError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Classifies a non-2xx response.
    ///
    /// `detail` is the server's own `error` text, which wins over the
    /// built-in message. `retry_after` is only honoured for 429.
    pub fn from_status(
        status: u16,
        url: impl Into<String>,
        detail: Option<String>,
        retry_after: Option<f64>,
    ) -> Self {
        match status {
            401 => SyncError::Unauthorized { detail },
            429 => SyncError::RateLimited {
                retry_after,
                detail,
            },
            500..=599 => SyncError::Server { status, detail },
            _ => SyncError::Request {
                status,
                url: url.into(),
                detail,
            },
        }
    }

    /// Server-supplied retry hint, in seconds.
    pub fn retry_after(&self) -> Option<f64> {
        match self {
            SyncError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// HTTP status behind this error, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::Unauthorized { .. } => Some(401),
            SyncError::RateLimited { .. } => Some(429),
            SyncError::Server { status, .. } | SyncError::Request { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true if retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::RateLimited { .. } | SyncError::Server { .. } | SyncError::Network(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
                | SyncError::Unauthorized { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_messages() {
        let url = "http://localhost/api/sheets/export";
        assert_eq!(
            SyncError::from_status(401, url, None, None).to_string(),
            "Unauthorized (check sync token)."
        );
        assert_eq!(
            SyncError::from_status(429, url, None, Some(5.0)).to_string(),
            "Rate limited by remote store. Retrying…"
        );
        assert_eq!(
            SyncError::from_status(503, url, None, None).to_string(),
            "Server error. Retrying…"
        );
        assert_eq!(
            SyncError::from_status(404, url, None, None).to_string(),
            "Request failed (404) for http://localhost/api/sheets/export"
        );
        assert_eq!(
            SyncError::Network("connection refused".into()).to_string(),
            "Network error: connection refused"
        );
    }

    #[test]
    fn test_server_detail_wins() {
        let err = SyncError::from_status(500, "u", Some("Missing environment variable: SHEETS_SYNC_TOKEN".into()), None);
        assert_eq!(
            err.to_string(),
            "Missing environment variable: SHEETS_SYNC_TOKEN"
        );
        let err = SyncError::from_status(400, "u", Some("Invalid JSON body".into()), None);
        assert_eq!(err.to_string(), "Invalid JSON body");
    }

    #[test]
    fn test_retry_after_only_on_429() {
        assert_eq!(
            SyncError::from_status(429, "u", None, Some(5.0)).retry_after(),
            Some(5.0)
        );
        assert_eq!(SyncError::from_status(503, "u", None, Some(5.0)).retry_after(), None);
    }

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::Network("reset".into()).is_retryable());
        assert!(SyncError::from_status(429, "u", None, None).is_retryable());
        assert!(SyncError::from_status(502, "u", None, None).is_retryable());

        assert!(!SyncError::from_status(401, "u", None, None).is_retryable());
        assert!(!SyncError::from_status(404, "u", None, None).is_retryable());
        assert!(!SyncError::InvalidConfig("bad".into()).is_retryable());
    }

    #[test]
    fn test_config_errors() {
        assert!(SyncError::InvalidUrl("x".into()).is_config_error());
        assert!(SyncError::from_status(401, "u", None, None).is_config_error());
        assert!(!SyncError::Network("x".into()).is_config_error());
        assert_eq!(SyncError::from_status(418, "u", None, None).status(), Some(418));
    }
}
