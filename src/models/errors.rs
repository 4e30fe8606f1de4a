//! Centralized Error Handling Module
//!
//! Every failure carries a unique error code so that log lines from the
//! polling loops, the chain client and the read API can be grepped and
//! alerted on without parsing free text.
//!
//! Error codes follow pattern: CATEGORY_SPECIFIC_ERROR
//! - RPC_xxx: chain client errors
//! - DECODE_xxx: log decoding errors
//! - SINK_xxx / SENTIMENT_xxx / STORE_xxx: external collaborators
//! - CFG_xxx: configuration errors

use std::fmt;

/// Application-wide error type
#[derive(Debug)]
pub struct AppError {
    /// Unique error code for logging/monitoring
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
    /// Optional underlying error
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        code: ErrorCode,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get error code as string (for logging)
    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    /// True when the failure came from the network path and should move
    /// the chain client to the next endpoint.
    pub fn is_transport(&self) -> bool {
        self.code.is_transport()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Unique error codes for monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // ============================================
    // RPC Errors
    // ============================================
    /// Network level failure (connection refused, 5xx, 429)
    RpcTransport,
    /// RPC request exceeded its timeout
    RpcTimeout,
    /// Every endpoint was tried in the current rotation
    RpcNoEndpoints,
    /// Log query spans more blocks than allowed
    RpcRangeTooLarge,
    /// Node answered with a JSON-RPC error object
    RpcError,
    /// Node answered with something we could not parse
    RpcInvalidResponse,

    // ============================================
    // Decoding
    // ============================================
    /// Log did not match the expected ABI shape
    DecodeFailed,

    // ============================================
    // External collaborators
    // ============================================
    /// Alert sink could not deliver
    SinkDeliveryFailed,
    /// Sentiment capability failed or timed out
    SentimentFailed,
    /// Persistence write failed
    StoreWriteFailed,

    // ============================================
    // Configuration Errors
    // ============================================
    /// No RPC endpoint configured
    ConfigNoEndpoints,
    /// Invalid configuration value
    ConfigInvalidValue,

    // ============================================
    // API Errors
    // ============================================
    /// Invalid request parameters
    ApiBadRequest,
    /// Resource not found
    ApiNotFound,

    /// Unknown error
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RpcTransport => "RPC_TRANSPORT",
            Self::RpcTimeout => "RPC_TIMEOUT",
            Self::RpcNoEndpoints => "RPC_NO_ENDPOINTS",
            Self::RpcRangeTooLarge => "RPC_RANGE_TOO_LARGE",
            Self::RpcError => "RPC_ERROR",
            Self::RpcInvalidResponse => "RPC_INVALID_RESPONSE",

            Self::DecodeFailed => "DECODE_FAILED",

            Self::SinkDeliveryFailed => "SINK_DELIVERY_FAILED",
            Self::SentimentFailed => "SENTIMENT_FAILED",
            Self::StoreWriteFailed => "STORE_WRITE_FAILED",

            Self::ConfigNoEndpoints => "CFG_NO_ENDPOINTS",
            Self::ConfigInvalidValue => "CFG_INVALID_VALUE",

            Self::ApiBadRequest => "API_BAD_REQUEST",
            Self::ApiNotFound => "API_NOT_FOUND",

            Self::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Get HTTP status code for API responses
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ApiBadRequest | Self::RpcRangeTooLarge | Self::ConfigInvalidValue => 400,
            Self::ApiNotFound => 404,
            Self::RpcNoEndpoints => 503,
            _ => 500,
        }
    }

    /// Errors that trigger endpoint failover
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::RpcTransport | Self::RpcTimeout)
    }

    /// Errors a polling loop recovers from by backing off and trying again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RpcTransport
                | Self::RpcTimeout
                | Self::RpcNoEndpoints
                | Self::RpcError
                | Self::RpcInvalidResponse
        )
    }
}

// ============================================
// Convenience constructors
// ============================================

impl AppError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RpcTransport, msg)
    }

    pub fn rpc_timeout(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RpcTimeout, msg)
    }

    pub fn no_endpoint_available() -> Self {
        Self::new(
            ErrorCode::RpcNoEndpoints,
            "No RPC endpoint available in the current rotation",
        )
    }

    pub fn range_too_large(requested: u64, max: u64) -> Self {
        Self::new(
            ErrorCode::RpcRangeTooLarge,
            format!("Block range of {} exceeds maximum of {}", requested, max),
        )
    }

    pub fn rpc_error(code: i64, msg: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::RpcError,
            format!("RPC error: {} (code: {})", msg.into(), code),
        )
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::RpcInvalidResponse, msg)
    }

    pub fn decode_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::DecodeFailed, msg)
    }

    pub fn sink_failed(sink: &str, msg: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::SinkDeliveryFailed,
            format!("{}: {}", sink, msg.into()),
        )
    }

    pub fn sentiment_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::SentimentFailed, msg)
    }

    pub fn store_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::StoreWriteFailed, msg)
    }

    pub fn no_endpoints_configured() -> Self {
        Self::new(
            ErrorCode::ConfigNoEndpoints,
            "RPC_URLS must list at least one endpoint",
        )
    }

    pub fn invalid_config(var: &str, value: &str) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidValue,
            format!("Invalid value for {}: {:?}", var, value),
        )
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiBadRequest, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::ApiNotFound, msg)
    }
}

/// Application Result type
pub type AppResult<T> = Result<T, AppError>;

// ============================================
// Conversion from common error types
// ============================================

impl From<eyre::Report> for AppError {
    fn from(err: eyre::Report) -> Self {
        Self::new(ErrorCode::Unknown, err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::with_source(ErrorCode::StoreWriteFailed, "IO error", err)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::new(ErrorCode::RpcTimeout, "Request timeout")
        } else if err.is_connect() || err.is_request() {
            Self::with_source(ErrorCode::RpcTransport, "Connection failed", err)
        } else if err.is_decode() {
            Self::with_source(ErrorCode::RpcInvalidResponse, "Undecodable response", err)
        } else {
            Self::new(ErrorCode::RpcTransport, err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(ErrorCode::RpcInvalidResponse, "JSON parse error", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = AppError::rpc_timeout("eth_blockNumber timed out");
        assert_eq!(err.code, ErrorCode::RpcTimeout);
        assert_eq!(err.code_str(), "RPC_TIMEOUT");
        assert!(err.to_string().starts_with("[RPC_TIMEOUT]"));
    }

    #[test]
    fn test_transport_classification() {
        assert!(ErrorCode::RpcTransport.is_transport());
        assert!(ErrorCode::RpcTimeout.is_transport());
        assert!(!ErrorCode::RpcError.is_transport());
        assert!(!ErrorCode::RpcRangeTooLarge.is_transport());
    }

    #[test]
    fn test_retryable() {
        assert!(ErrorCode::RpcNoEndpoints.is_retryable());
        assert!(!ErrorCode::RpcRangeTooLarge.is_retryable());
        assert!(!ErrorCode::ConfigNoEndpoints.is_retryable());
    }

    #[test]
    fn test_http_status() {
        assert_eq!(ErrorCode::ApiBadRequest.http_status(), 400);
        assert_eq!(ErrorCode::RpcNoEndpoints.http_status(), 503);
        assert_eq!(ErrorCode::DecodeFailed.http_status(), 500);
    }
}
