use crate::database::error::DatabaseError;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

/// Reversal snapshot for one mutated document.
///
/// `original_values` and `converted_values` are parallel maps with identical
/// key sets (dotted keys for nested fields). The currency pair and rate are
/// duplicated from the owning conversion so each record is sufficient on its
/// own to reverse its document. Rows are append-only: this subsystem never
/// updates or deletes them.
#[derive(Debug, Clone, FromRow)]
pub struct CurrencyHistory {
    pub id: Uuid,
    pub tenant_id: String,
    pub conversion_id: Uuid,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub original_values: serde_json::Value,
    pub converted_values: serde_json::Value,
    pub from_currency: String,
    pub to_currency: String,
    pub exchange_rate: f64,
    pub created_at: DateTime<Utc>,
}

/// Input for recording one document's snapshot
#[derive(Debug, Clone)]
pub struct NewCurrencyHistory {
    pub tenant_id: String,
    pub conversion_id: Uuid,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub original_values: serde_json::Value,
    pub converted_values: serde_json::Value,
    pub from_currency: String,
    pub to_currency: String,
    pub exchange_rate: f64,
}

/// Repository for currency history records
#[derive(Clone)]
pub struct CurrencyHistoryRepository {
    pool: PgPool,
}

impl CurrencyHistoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record one snapshot, inside the same transaction as the document update
    /// so the write and its audit trail commit or roll back together.
    pub async fn insert(
        &self,
        conn: &mut PgConnection,
        record: &NewCurrencyHistory,
    ) -> Result<CurrencyHistory, DatabaseError> {
        sqlx::query_as::<_, CurrencyHistory>(
            "INSERT INTO currency_histories
             (tenant_id, conversion_id, entity_type, entity_id, original_values,
              converted_values, from_currency, to_currency, exchange_rate)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING id, tenant_id, conversion_id, entity_type, entity_id,
                       original_values, converted_values, from_currency, to_currency,
                       exchange_rate, created_at",
        )
        .bind(&record.tenant_id)
        .bind(record.conversion_id)
        .bind(&record.entity_type)
        .bind(record.entity_id)
        .bind(&record.original_values)
        .bind(&record.converted_values)
        .bind(&record.from_currency)
        .bind(&record.to_currency)
        .bind(record.exchange_rate)
        .fetch_one(&mut *conn)
        .await
        .map_err(DatabaseError::from_sqlx)
    }

    /// List the snapshots belonging to one conversion, oldest first
    pub async fn list_for_conversion(
        &self,
        tenant_id: &str,
        conversion_id: Uuid,
    ) -> Result<Vec<CurrencyHistory>, DatabaseError> {
        sqlx::query_as::<_, CurrencyHistory>(
            "SELECT id, tenant_id, conversion_id, entity_type, entity_id,
                    original_values, converted_values, from_currency, to_currency,
                    exchange_rate, created_at
             FROM currency_histories
             WHERE tenant_id = $1 AND conversion_id = $2
             ORDER BY created_at ASC",
        )
        .bind(tenant_id)
        .bind(conversion_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)
    }
}
