//! Conversion orchestrator
//!
//! Coordinates a tenant-wide currency re-denomination: cooldown gate, rate
//! resolution, then a single database transaction that rewrites the monetary
//! fields of every eligible document across all entity types, records one
//! reversal snapshot per mutated document, and tracks the attempt in the
//! conversion log. The transaction commits or rolls back as one unit, so
//! readers never observe a half-converted tenant.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::database::conversion_log_repository::{ConversionLogRepository, NewConversionLog};
use crate::database::currency_history_repository::{
    CurrencyHistoryRepository, NewCurrencyHistory,
};
use crate::database::documents::DocumentRepository;
use crate::database::error::DatabaseError;
use crate::error::{AppError, AppErrorKind, DomainError};
use crate::services::field_converter::{convert_fields, EntityKind};
use crate::services::rate_resolver::RateResolver;

/// Caller identity and request provenance, resolved by the auth layer and
/// threaded through explicitly so the orchestrator stays testable without a
/// web framework.
#[derive(Debug, Clone)]
pub struct ConversionContext {
    pub tenant_id: String,
    pub user_id: String,
    pub user_email: String,
    pub role: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Conversion request body
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub from_currency: String,
    pub to_currency: String,
}

/// Per-entity-type counters for one conversion run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionStatistics {
    pub courses_updated: u32,
    pub payments_updated: u32,
    pub products_updated: u32,
    pub monthly_subscriptions_updated: u32,
    pub schedules_updated: u32,
    pub notifications_updated: u32,
    pub incomes_updated: u32,
    pub expenses_updated: u32,
    pub total_records_updated: u32,
}

impl ConversionStatistics {
    /// Count one mutated document; keeps the total equal to the sum of the
    /// per-type counters by construction.
    pub fn bump(&mut self, kind: EntityKind) {
        let counter = match kind {
            EntityKind::Course => &mut self.courses_updated,
            EntityKind::Payment => &mut self.payments_updated,
            EntityKind::Product => &mut self.products_updated,
            EntityKind::MonthlySubscription => &mut self.monthly_subscriptions_updated,
            EntityKind::Schedule => &mut self.schedules_updated,
            EntityKind::Notification => &mut self.notifications_updated,
            EntityKind::Income => &mut self.incomes_updated,
            EntityKind::Expense => &mut self.expenses_updated,
        };
        *counter += 1;
        self.total_records_updated += 1;
    }
}

/// Result of a conversion run
#[derive(Debug, Clone)]
pub enum ConversionOutcome {
    /// `from == to`: nothing to rewrite, no persistence happened at all
    Identity { exchange_rate: f64 },
    /// Committed conversion with its statistics
    Converted {
        conversion_id: Uuid,
        exchange_rate: f64,
        statistics: ConversionStatistics,
    },
}

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct ConversionConfig {
    /// Tenant-level throttle window between successful conversions
    pub cooldown_hours: i64,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self { cooldown_hours: 24 }
    }
}

impl ConversionConfig {
    pub fn from_env() -> Self {
        Self {
            cooldown_hours: std::env::var("CONVERSION_COOLDOWN_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(24),
        }
    }
}

/// The conversion transaction coordinator
pub struct ConversionService {
    pool: PgPool,
    resolver: Arc<RateResolver>,
    logs: ConversionLogRepository,
    histories: CurrencyHistoryRepository,
    documents: DocumentRepository,
    config: ConversionConfig,
}

impl ConversionService {
    pub fn new(pool: PgPool, resolver: Arc<RateResolver>) -> Self {
        Self {
            logs: ConversionLogRepository::new(pool.clone()),
            histories: CurrencyHistoryRepository::new(pool.clone()),
            documents: DocumentRepository::new(),
            pool,
            resolver,
            config: ConversionConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ConversionConfig) -> Self {
        self.config = config;
        self
    }

    /// Run one tenant-wide conversion.
    ///
    /// The cooldown is enforced at check time only: two requests for the same
    /// tenant arriving in the same instant can both pass it and run full
    /// transactions. Store isolation keeps each run internally consistent but
    /// does not prevent the double conversion; accepted for now since
    /// conversions are rare, manual, admin-triggered operations.
    pub async fn convert(
        &self,
        ctx: &ConversionContext,
        request: &ConversionRequest,
    ) -> Result<ConversionOutcome, AppError> {
        let from = request.from_currency.trim();
        let to = request.to_currency.trim();

        if from.is_empty() {
            return Err(AppError::missing_field("fromCurrency"));
        }
        if to.is_empty() {
            return Err(AppError::missing_field("toCurrency"));
        }

        // Same currency: nothing to rewrite, skip cooldown and persistence entirely
        if from == to {
            info!(tenant_id = %ctx.tenant_id, currency = %from, "identity conversion short-circuit");
            return Ok(ConversionOutcome::Identity { exchange_rate: 1.0 });
        }

        // Cooldown gate: any successful conversion inside the window blocks the
        // tenant, regardless of currency pair
        let cutoff = Utc::now() - Duration::hours(self.config.cooldown_hours);
        if let Some(prior) = self.logs.find_recent_success(&ctx.tenant_id, cutoff).await? {
            warn!(
                tenant_id = %ctx.tenant_id,
                prior_conversion = %prior.id,
                prior_at = %prior.created_at,
                "conversion rejected by cooldown"
            );
            return Err(AppError::new(AppErrorKind::Domain(
                DomainError::ConversionCooldown {
                    from_currency: prior.from_currency,
                    to_currency: prior.to_currency,
                    converted_by: prior.converted_by,
                    occurred_at: prior.created_at,
                },
            )));
        }

        let exchange_rate = self.resolver.resolve(from, to).await;

        let entry = NewConversionLog {
            tenant_id: ctx.tenant_id.clone(),
            from_currency: from.to_string(),
            to_currency: to.to_string(),
            exchange_rate,
            converted_by: ctx.user_email.clone(),
            converted_by_id: ctx.user_id.clone(),
            role: ctx.role.clone(),
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(DatabaseError::from_sqlx)?;

        let result = match self.run_in_tx(&mut tx, &entry).await {
            Ok((conversion_id, statistics)) => tx
                .commit()
                .await
                .map_err(DatabaseError::from_sqlx)
                .map(|_| (conversion_id, statistics)),
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "transaction rollback reported an error");
                }
                Err(err)
            }
        };

        match result {
            Ok((conversion_id, statistics)) => {
                info!(
                    tenant_id = %ctx.tenant_id,
                    conversion_id = %conversion_id,
                    from_currency = %from,
                    to_currency = %to,
                    exchange_rate,
                    total_records_updated = statistics.total_records_updated,
                    "currency conversion committed"
                );

                Ok(ConversionOutcome::Converted {
                    conversion_id,
                    exchange_rate,
                    statistics,
                })
            }
            Err(err) => {
                error!(
                    tenant_id = %ctx.tenant_id,
                    error = %err,
                    "currency conversion failed, transaction aborted"
                );

                // Best-effort standalone failure record; the PARTIAL entry was
                // part of the aborted transaction and never persisted. If this
                // write fails too, the caller still gets the original error.
                if let Err(log_err) = self.logs.insert_failed(&entry, &err.to_string()).await {
                    warn!(error = %log_err, "failed to record failed conversion");
                }

                Err(err.into())
            }
        }
    }

    /// The in-transaction body: PARTIAL log entry, eight entity sweeps, then
    /// the SUCCESS flip. Any error propagates so the caller can abort the
    /// whole transaction.
    async fn run_in_tx(
        &self,
        conn: &mut PgConnection,
        entry: &NewConversionLog,
    ) -> Result<(Uuid, ConversionStatistics), DatabaseError> {
        let mut statistics = ConversionStatistics::default();

        let log = self
            .logs
            .insert_partial(
                &mut *conn,
                entry,
                serde_json::to_value(&statistics).unwrap_or_default(),
            )
            .await?;

        for kind in EntityKind::ALL {
            let documents = self
                .documents
                .find_eligible(
                    &mut *conn,
                    kind.collection(),
                    kind.money_fields(),
                    &entry.tenant_id,
                )
                .await?;

            for document in documents {
                let Some(changes) =
                    convert_fields(&document.data, kind.money_fields(), entry.exchange_rate)
                else {
                    // All allow-listed fields were zero or absent: no write,
                    // no history record, no counter increment
                    continue;
                };

                self.documents
                    .update_fields(
                        &mut *conn,
                        kind.collection(),
                        document.id,
                        &changes.converted_values,
                    )
                    .await?;

                self.histories
                    .insert(
                        &mut *conn,
                        &NewCurrencyHistory {
                            tenant_id: entry.tenant_id.clone(),
                            conversion_id: log.id,
                            entity_type: kind.as_str().to_string(),
                            entity_id: document.id,
                            original_values: serde_json::to_value(&changes.original_values)
                                .unwrap_or_default(),
                            converted_values: serde_json::to_value(&changes.converted_values)
                                .unwrap_or_default(),
                            from_currency: entry.from_currency.clone(),
                            to_currency: entry.to_currency.clone(),
                            exchange_rate: entry.exchange_rate,
                        },
                    )
                    .await?;

                statistics.bump(kind);
            }
        }

        self.logs
            .mark_success(
                &mut *conn,
                log.id,
                serde_json::to_value(&statistics).unwrap_or_default(),
            )
            .await?;

        Ok((log.id, statistics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_total_tracks_sum() {
        let mut stats = ConversionStatistics::default();
        stats.bump(EntityKind::Course);
        stats.bump(EntityKind::Course);
        stats.bump(EntityKind::Payment);
        stats.bump(EntityKind::Expense);

        assert_eq!(stats.courses_updated, 2);
        assert_eq!(stats.payments_updated, 1);
        assert_eq!(stats.expenses_updated, 1);
        assert_eq!(stats.total_records_updated, 4);
    }

    #[test]
    fn test_statistics_serialize_as_camel_case() {
        let mut stats = ConversionStatistics::default();
        stats.bump(EntityKind::MonthlySubscription);

        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["monthlySubscriptionsUpdated"], 1);
        assert_eq!(value["totalRecordsUpdated"], 1);
        assert_eq!(value["coursesUpdated"], 0);
    }

    #[test]
    fn test_cooldown_config_default() {
        assert_eq!(ConversionConfig::default().cooldown_hours, 24);
    }
}
