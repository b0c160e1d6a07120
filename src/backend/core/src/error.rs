//! Error handling for governance rule operations.
//!
//! This module provides:
//! - Stable business status codes (`ApiCode`) embedded in every console response
//! - Transport status mapping for the few codes that affect HTTP status
//! - A single error type (`GovernanceError`) pairing a code with a message
//! - Error logging with tracing integration and error counters
//!
//! Batch endpoints never fail at the transport level for business outcomes:
//! an item that cannot be written becomes an item response carrying its code.

use axum::http::StatusCode;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for governance operations.
pub type Result<T> = std::result::Result<T, GovernanceError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Business Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable status codes for console responses.
///
/// The numeric values are stable and shared with console clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiCode {
    ExecuteSuccess,

    // Request shape (400000-400099)
    ParseException,
    EmptyRequest,
    BatchSizeOverLimit,

    // Parameters (400100-400199)
    InvalidParameter,
    InvalidRuleId,
    InvalidRuleName,
    InvalidNamespaceName,
    InvalidServiceName,
    InvalidComment,

    // Resources (400200-400299)
    ExistedResource,
    NotFoundResource,

    // Authorization (401000-401099)
    NotAllowedAccess,
    TokenNotExisted,
    TokenDisabled,

    // Server side (500000-500099)
    ExecuteException,
    StoreLayerException,
}

impl ApiCode {
    /// Get the numeric code.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::ExecuteSuccess => 200000,

            Self::ParseException => 400004,
            Self::EmptyRequest => 400005,
            Self::BatchSizeOverLimit => 400006,

            Self::InvalidParameter => 400100,
            Self::InvalidRuleId => 400110,
            Self::InvalidRuleName => 400111,
            Self::InvalidNamespaceName => 400112,
            Self::InvalidServiceName => 400113,
            Self::InvalidComment => 400114,

            Self::ExistedResource => 400201,
            Self::NotFoundResource => 400202,

            Self::NotAllowedAccess => 401000,
            Self::TokenNotExisted => 401001,
            Self::TokenDisabled => 401002,

            Self::ExecuteException => 500000,
            Self::StoreLayerException => 500001,
        }
    }

    /// Whether this code reports success.
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::ExecuteSuccess)
    }

    /// Whether this code belongs to the parameter-invalid family.
    pub const fn is_invalid_parameter(&self) -> bool {
        matches!(self.numeric_code(), 400100..=400199)
    }

    /// Whether this code reports an authorization failure.
    pub const fn is_access_denied(&self) -> bool {
        matches!(self.numeric_code(), 401000..=401099)
    }

    /// HTTP status used by the console adapter.
    ///
    /// Only authorization failures change the transport status; every other
    /// outcome travels inside the response body.
    pub const fn transport_status(&self) -> StatusCode {
        match self {
            Self::NotAllowedAccess => StatusCode::FORBIDDEN,
            Self::TokenNotExisted | Self::TokenDisabled => StatusCode::UNAUTHORIZED,
            _ => StatusCode::OK,
        }
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            200000..=200999 => "success",
            400000..=400099 => "request",
            400100..=400199 => "parameter",
            400200..=400299 => "resource",
            401000..=401099 => "authorization",
            500000..=500099 => "server",
            _ => "unknown",
        }
    }

    /// Static label, used for metrics.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ExecuteSuccess => "execute_success",
            Self::ParseException => "parse_exception",
            Self::EmptyRequest => "empty_request",
            Self::BatchSizeOverLimit => "batch_size_over_limit",
            Self::InvalidParameter => "invalid_parameter",
            Self::InvalidRuleId => "invalid_rule_id",
            Self::InvalidRuleName => "invalid_rule_name",
            Self::InvalidNamespaceName => "invalid_namespace_name",
            Self::InvalidServiceName => "invalid_service_name",
            Self::InvalidComment => "invalid_comment",
            Self::ExistedResource => "existed_resource",
            Self::NotFoundResource => "not_found_resource",
            Self::NotAllowedAccess => "not_allowed_access",
            Self::TokenNotExisted => "token_not_existed",
            Self::TokenDisabled => "token_disabled",
            Self::ExecuteException => "execute_exception",
            Self::StoreLayerException => "store_layer_exception",
        }
    }

    /// Message used when no more specific one is available.
    pub const fn default_message(&self) -> &'static str {
        match self {
            Self::ExecuteSuccess => "execute success",
            Self::ParseException => "parse request body exception",
            Self::EmptyRequest => "empty request",
            Self::BatchSizeOverLimit => "batch size over the limit",
            Self::InvalidParameter => "invalid request parameter",
            Self::InvalidRuleId => "invalid rule id",
            Self::InvalidRuleName => "invalid rule name",
            Self::InvalidNamespaceName => "invalid namespace name",
            Self::InvalidServiceName => "invalid service name",
            Self::InvalidComment => "invalid comment",
            Self::ExistedResource => "existed resource",
            Self::NotFoundResource => "not found resource",
            Self::NotAllowedAccess => "access is not approved",
            Self::TokenNotExisted => "token not existed",
            Self::TokenDisabled => "token already disabled",
            Self::ExecuteException => "execute exception",
            Self::StoreLayerException => "store layer exception",
        }
    }
}

impl fmt::Display for ApiCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.numeric_code())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Governance Error
// ═══════════════════════════════════════════════════════════════════════════════

/// Error raised while handling a single rule or a whole request.
#[derive(Debug, Error)]
pub struct GovernanceError {
    code: ApiCode,
    message: Cow<'static, str>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for GovernanceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl GovernanceError {
    pub fn new(code: ApiCode, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Error carrying only the code's default message.
    pub fn from_code(code: ApiCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn invalid_parameter(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ApiCode::InvalidParameter, message)
    }

    pub fn parse(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ApiCode::ParseException, message)
    }

    pub fn not_found(kind: impl fmt::Display, id: &str) -> Self {
        Self::new(
            ApiCode::NotFoundResource,
            format!("{} rule not found: id={}", kind, id),
        )
    }

    pub fn conflict(kind: impl fmt::Display, name: &str, namespace: &str) -> Self {
        Self::new(
            ApiCode::ExistedResource,
            format!(
                "{} rule already exists: name={}, namespace={}",
                kind, name, namespace
            ),
        )
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> ApiCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Log the error at a level matching its category and count it.
    pub fn log(&self, request_id: &str) {
        match self.code.category() {
            "server" => error!(
                request_id = %request_id,
                code = %self.code,
                error = %self.message,
                source = ?self.source,
                "governance operation failed"
            ),
            _ => warn!(
                request_id = %request_id,
                code = %self.code,
                error = %self.message,
                "governance operation rejected"
            ),
        }
        self.record_metrics();
    }

    fn record_metrics(&self) {
        counter!(
            "governance_errors_total",
            "code" => self.code.as_str(),
            "category" => self.code.category()
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Conversions
// ═══════════════════════════════════════════════════════════════════════════════

impl From<serde_json::Error> for GovernanceError {
    fn from(error: serde_json::Error) -> Self {
        Self::parse(format!("malformed rule payload: {}", error)).with_source(error)
    }
}

impl From<serde_yaml::Error> for GovernanceError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::parse(format!("malformed rule document: {}", error)).with_source(error)
    }
}

impl From<zip::result::ZipError> for GovernanceError {
    fn from(error: zip::result::ZipError) -> Self {
        Self::parse(format!("unreadable archive: {}", error)).with_source(error)
    }
}

impl From<std::io::Error> for GovernanceError {
    fn from(error: std::io::Error) -> Self {
        Self::parse(format!("archive I/O failure: {}", error)).with_source(error)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
