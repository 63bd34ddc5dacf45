use crate::database::error::DatabaseError;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

/// Conversion attempt status
///
/// Lifecycle: created as `Partial` at transaction start, flipped to
/// `Success` just before commit. `Failed` records are standalone rows
/// written after a rollback (the in-transaction `Partial` row never
/// persisted, since it was part of the aborted transaction).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStatus {
    Partial,
    Success,
    Failed,
}

impl ConversionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConversionStatus::Partial => "partial",
            ConversionStatus::Success => "success",
            ConversionStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ConversionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Conversion log entity
#[derive(Debug, Clone, FromRow)]
pub struct ConversionLog {
    pub id: Uuid,
    pub tenant_id: String,
    pub from_currency: String,
    pub to_currency: String,
    pub exchange_rate: f64,
    pub converted_by: String,
    pub converted_by_id: String,
    pub role: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub status: String,
    pub statistics: serde_json::Value,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a conversion log entry
#[derive(Debug, Clone)]
pub struct NewConversionLog {
    pub tenant_id: String,
    pub from_currency: String,
    pub to_currency: String,
    pub exchange_rate: f64,
    pub converted_by: String,
    pub converted_by_id: String,
    pub role: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Repository for conversion log entries
#[derive(Clone)]
pub struct ConversionLogRepository {
    pool: PgPool,
}

impl ConversionLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a PARTIAL entry with zeroed statistics, inside the caller's transaction
    pub async fn insert_partial(
        &self,
        conn: &mut PgConnection,
        entry: &NewConversionLog,
        statistics: serde_json::Value,
    ) -> Result<ConversionLog, DatabaseError> {
        sqlx::query_as::<_, ConversionLog>(
            "INSERT INTO conversion_logs
             (tenant_id, from_currency, to_currency, exchange_rate, converted_by,
              converted_by_id, role, ip_address, user_agent, status, statistics)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING id, tenant_id, from_currency, to_currency, exchange_rate,
                       converted_by, converted_by_id, role, ip_address, user_agent,
                       status, statistics, error_message, created_at",
        )
        .bind(&entry.tenant_id)
        .bind(&entry.from_currency)
        .bind(&entry.to_currency)
        .bind(entry.exchange_rate)
        .bind(&entry.converted_by)
        .bind(&entry.converted_by_id)
        .bind(&entry.role)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(ConversionStatus::Partial.as_str())
        .bind(statistics)
        .fetch_one(&mut *conn)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Flip a PARTIAL entry to SUCCESS with final statistics, inside the caller's transaction
    pub async fn mark_success(
        &self,
        conn: &mut PgConnection,
        id: Uuid,
        statistics: serde_json::Value,
    ) -> Result<ConversionLog, DatabaseError> {
        sqlx::query_as::<_, ConversionLog>(
            "UPDATE conversion_logs
             SET status = $2, statistics = $3
             WHERE id = $1
             RETURNING id, tenant_id, from_currency, to_currency, exchange_rate,
                       converted_by, converted_by_id, role, ip_address, user_agent,
                       status, statistics, error_message, created_at",
        )
        .bind(id)
        .bind(ConversionStatus::Success.as_str())
        .bind(statistics)
        .fetch_one(&mut *conn)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Record a standalone FAILED entry, outside any transaction.
    ///
    /// Called after a rollback, so it must not reuse the aborted transaction.
    pub async fn insert_failed(
        &self,
        entry: &NewConversionLog,
        error_message: &str,
    ) -> Result<ConversionLog, DatabaseError> {
        sqlx::query_as::<_, ConversionLog>(
            "INSERT INTO conversion_logs
             (tenant_id, from_currency, to_currency, exchange_rate, converted_by,
              converted_by_id, role, ip_address, user_agent, status, statistics, error_message)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
             RETURNING id, tenant_id, from_currency, to_currency, exchange_rate,
                       converted_by, converted_by_id, role, ip_address, user_agent,
                       status, statistics, error_message, created_at",
        )
        .bind(&entry.tenant_id)
        .bind(&entry.from_currency)
        .bind(&entry.to_currency)
        .bind(entry.exchange_rate)
        .bind(&entry.converted_by)
        .bind(&entry.converted_by_id)
        .bind(&entry.role)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(ConversionStatus::Failed.as_str())
        .bind(serde_json::json!({}))
        .bind(error_message)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// Most recent SUCCESS entry for the tenant at or after `cutoff`.
    ///
    /// This is the cooldown gate: it deliberately ignores the currency pair,
    /// so any successful conversion throttles the tenant as a whole.
    pub async fn find_recent_success(
        &self,
        tenant_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<ConversionLog>, DatabaseError> {
        sqlx::query_as::<_, ConversionLog>(
            "SELECT id, tenant_id, from_currency, to_currency, exchange_rate,
                    converted_by, converted_by_id, role, ip_address, user_agent,
                    status, statistics, error_message, created_at
             FROM conversion_logs
             WHERE tenant_id = $1 AND status = $2 AND created_at >= $3
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(tenant_id)
        .bind(ConversionStatus::Success.as_str())
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// List the tenant's conversion attempts, most recent first
    pub async fn list_for_tenant(
        &self,
        tenant_id: &str,
        limit: i64,
    ) -> Result<Vec<ConversionLog>, DatabaseError> {
        sqlx::query_as::<_, ConversionLog>(
            "SELECT id, tenant_id, from_currency, to_currency, exchange_rate,
                    converted_by, converted_by_id, role, ip_address, user_agent,
                    status, statistics, error_message, created_at
             FROM conversion_logs
             WHERE tenant_id = $1
             ORDER BY created_at DESC
             LIMIT $2",
        )
        .bind(tenant_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        assert_eq!(ConversionStatus::Partial.as_str(), "partial");
        assert_eq!(ConversionStatus::Success.to_string(), "success");
        assert_eq!(ConversionStatus::Failed.as_str(), "failed");
    }
}
