//! Comprehensive error handling for the Academix backend
//!
//! This module provides a unified error system with proper HTTP status mapping,
//! user-friendly messages, and structured error codes for client handling.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors
    #[serde(rename = "CONVERSION_COOLDOWN")]
    ConversionCooldown,
    #[serde(rename = "CONVERSION_NOT_FOUND")]
    ConversionNotFound,

    // Auth errors
    #[serde(rename = "UNAUTHORIZED")]
    Unauthorized,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // Generic
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Domain-specific business logic errors
#[derive(Debug, Clone)]
pub enum DomainError {
    /// A successful conversion already ran inside the cooldown window
    ConversionCooldown {
        from_currency: String,
        to_currency: String,
        converted_by: String,
        occurred_at: DateTime<Utc>,
    },
    /// Conversion log with the given ID doesn't exist for this tenant
    ConversionNotFound { conversion_id: String },
}

/// Infrastructure-level errors (database, configuration)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    /// Database connection or query failure
    Database { message: String, is_retryable: bool },
    /// Missing or invalid configuration
    Configuration { message: String },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// Required field missing or empty
    MissingField { field: String },
    /// Unsupported or malformed currency code
    InvalidCurrency { currency: String, reason: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    Validation(ValidationError),
    Unauthorized { reason: String },
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Unauthorized {
            reason: reason.into(),
        })
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Validation(ValidationError::MissingField {
            field: field.into(),
        }))
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::ConversionCooldown { .. } => 429,
                DomainError::ConversionNotFound { .. } => 404,
            },
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::Validation(_) => 400,
            AppErrorKind::Unauthorized { .. } => 401,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::ConversionCooldown { .. } => ErrorCode::ConversionCooldown,
                DomainError::ConversionNotFound { .. } => ErrorCode::ConversionNotFound,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
            AppErrorKind::Unauthorized { .. } => ErrorCode::Unauthorized,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::ConversionCooldown {
                    from_currency,
                    to_currency,
                    converted_by,
                    occurred_at,
                } => {
                    format!(
                        "Currency conversion is allowed once every 24 hours. Last conversion {} -> {} by {} at {}",
                        from_currency,
                        to_currency,
                        converted_by,
                        occurred_at.to_rfc3339()
                    )
                }
                DomainError::ConversionNotFound { conversion_id } => {
                    format!("Conversion '{}' not found", conversion_id)
                }
            },
            AppErrorKind::Infrastructure(_) => {
                "Currency conversion failed. Please try again later".to_string()
            }
            AppErrorKind::Validation(err) => match err {
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
                ValidationError::InvalidCurrency { currency, reason } => {
                    format!("Invalid currency '{}': {}", currency, reason)
                }
            },
            AppErrorKind::Unauthorized { reason } => {
                format!("Unauthorized: {}", reason)
            }
        }
    }

    /// Structured details for the response body.
    ///
    /// Cooldown violations expose the prior conversion so the caller can tell
    /// the operator when the window reopens; infrastructure failures surface
    /// the raw message (this is an internal admin operation, not sanitized).
    pub fn details(&self) -> Option<serde_json::Value> {
        match &self.kind {
            AppErrorKind::Domain(DomainError::ConversionCooldown {
                from_currency,
                to_currency,
                converted_by,
                occurred_at,
            }) => Some(serde_json::json!({
                "fromCurrency": from_currency,
                "toCurrency": to_currency,
                "convertedBy": converted_by,
                "timestamp": occurred_at.to_rfc3339(),
            })),
            AppErrorKind::Infrastructure(InfrastructureError::Database { message, .. }) => {
                Some(serde_json::json!({ "message": message }))
            }
            _ => None,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(err) => {
                matches!(err, DomainError::ConversionCooldown { .. })
            }
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Configuration { .. } => false,
            },
            AppErrorKind::Validation(_) => false,
            AppErrorKind::Unauthorized { .. } => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

// Conversions from specific error types
// Note: From<DatabaseError> is implemented in database/error.rs to avoid circular dependency

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;
