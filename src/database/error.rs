//! Database error classification
//!
//! Wraps sqlx errors into a small taxonomy the service layer can reason
//! about (retryable vs. not, missing rows, constraint violations).

use std::fmt;

/// Database error with classified kind
#[derive(Debug)]
pub struct DatabaseError {
    kind: DatabaseErrorKind,
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseErrorKind {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: String, id: String },

    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("connection error: {message}")]
    Connection { message: String },

    #[error("operation timed out: {message}")]
    Timeout { message: String },

    #[error("{message}")]
    Unknown { message: String },
}

impl DatabaseError {
    pub fn new(kind: DatabaseErrorKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> &DatabaseErrorKind {
        &self.kind
    }

    /// Classify a raw sqlx error
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::RowNotFound => DatabaseErrorKind::NotFound {
                entity: "row".to_string(),
                id: String::new(),
            },
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                // unique_violation
                Some("23505") => DatabaseErrorKind::UniqueViolation {
                    constraint: db_err
                        .constraint()
                        .unwrap_or("unknown")
                        .to_string(),
                },
                _ => DatabaseErrorKind::Unknown {
                    message: db_err.to_string(),
                },
            },
            sqlx::Error::PoolTimedOut => DatabaseErrorKind::Timeout {
                message: "connection pool timed out".to_string(),
            },
            sqlx::Error::Io(io_err) => DatabaseErrorKind::Connection {
                message: io_err.to_string(),
            },
            other => DatabaseErrorKind::Unknown {
                message: other.to_string(),
            },
        };

        Self { kind }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            DatabaseErrorKind::Connection { .. } | DatabaseErrorKind::Timeout { .. }
        )
    }
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for DatabaseError {}

// Implemented here rather than in error.rs to avoid a circular dependency
impl From<DatabaseError> for crate::error::AppError {
    fn from(err: DatabaseError) -> Self {
        let is_retryable = err.is_retryable();
        crate::error::AppError::new(crate::error::AppErrorKind::Infrastructure(
            crate::error::InfrastructureError::Database {
                message: err.to_string(),
                is_retryable,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_retryable() {
        let err = DatabaseError::from_sqlx(sqlx::Error::PoolTimedOut);
        assert!(err.is_retryable());
        assert!(matches!(err.kind(), DatabaseErrorKind::Timeout { .. }));
    }

    #[test]
    fn test_row_not_found_classification() {
        let err = DatabaseError::from_sqlx(sqlx::Error::RowNotFound);
        assert!(!err.is_retryable());
        assert!(matches!(err.kind(), DatabaseErrorKind::NotFound { .. }));
    }

    #[test]
    fn test_app_error_conversion_maps_to_500() {
        let err = DatabaseError::new(DatabaseErrorKind::Unknown {
            message: "boom".to_string(),
        });
        let app_err: crate::error::AppError = err.into();
        assert_eq!(app_err.status_code(), 500);
    }
}
