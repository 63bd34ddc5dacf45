//! Currency conversion API
//!
//! The conversion endpoint plus its audit reads. Authentication is owned by
//! the gateway in front of this service: it verifies the session and injects
//! the identity headers this module extracts. Requests without them are
//! rejected with 401 before any handler logic runs.

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use http::request::Parts;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::database::conversion_log_repository::{ConversionLog, ConversionLogRepository};
use crate::database::currency_history_repository::{CurrencyHistory, CurrencyHistoryRepository};
use crate::error::AppError;
use crate::services::conversion::{
    ConversionContext, ConversionOutcome, ConversionRequest, ConversionService,
    ConversionStatistics,
};
use crate::services::rate_resolver::RateResolver;

/// State for the currency API
#[derive(Clone)]
pub struct CurrencyApiState {
    pub conversions: Arc<ConversionService>,
    pub resolver: Arc<RateResolver>,
    pub logs: ConversionLogRepository,
    pub histories: CurrencyHistoryRepository,
}

/// Verified caller identity, injected by the auth gateway as headers
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub tenant_id: String,
    pub user_id: String,
    pub user_email: String,
    pub role: String,
}

fn required_header(parts: &Parts, name: &str) -> Result<String, AppError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::unauthorized("missing or invalid session context"))
}

impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(SessionContext {
            tenant_id: required_header(parts, "x-tenant-id")?,
            user_id: required_header(parts, "x-user-id")?,
            user_email: required_header(parts, "x-user-email")?,
            role: required_header(parts, "x-user-role")?,
        })
    }
}

/// Request provenance captured for the audit trail
#[derive(Debug, Clone)]
pub struct RequestProvenance {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl<S> FromRequestParts<S> for RequestProvenance
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip_address = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string());

        let user_agent = parts
            .headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        Ok(RequestProvenance {
            ip_address,
            user_agent,
        })
    }
}

/// Request body for POST /api/currency/convert
#[derive(Debug, Deserialize)]
pub struct ConvertCurrencyRequest {
    #[serde(rename = "fromCurrency")]
    pub from_currency: Option<String>,
    #[serde(rename = "toCurrency")]
    pub to_currency: Option<String>,
}

/// Response for a completed (or short-circuited) conversion
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertCurrencyResponse {
    pub success: bool,
    pub exchange_rate: f64,
    pub from_currency: String,
    pub to_currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<ConversionStatistics>,
}

/// Convert all of a tenant's monetary fields to a new currency
pub async fn convert_currency(
    State(state): State<CurrencyApiState>,
    session: SessionContext,
    provenance: RequestProvenance,
    Json(body): Json<ConvertCurrencyRequest>,
) -> Result<Json<ConvertCurrencyResponse>, AppError> {
    let ctx = ConversionContext {
        tenant_id: session.tenant_id,
        user_id: session.user_id,
        user_email: session.user_email,
        role: session.role,
        ip_address: provenance.ip_address,
        user_agent: provenance.user_agent,
    };

    let request = ConversionRequest {
        from_currency: body.from_currency.unwrap_or_default(),
        to_currency: body.to_currency.unwrap_or_default(),
    };

    let outcome = state.conversions.convert(&ctx, &request).await?;

    let response = match outcome {
        ConversionOutcome::Identity { exchange_rate } => ConvertCurrencyResponse {
            success: true,
            exchange_rate,
            from_currency: request.from_currency,
            to_currency: request.to_currency,
            statistics: None,
        },
        ConversionOutcome::Converted {
            exchange_rate,
            statistics,
            ..
        } => ConvertCurrencyResponse {
            success: true,
            exchange_rate,
            from_currency: request.from_currency,
            to_currency: request.to_currency,
            statistics: Some(statistics),
        },
    };

    Ok(Json(response))
}

/// Query parameters for GET /api/currency/rate
#[derive(Debug, Deserialize)]
pub struct RateQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Rate preview response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatePreviewResponse {
    pub from_currency: String,
    pub to_currency: String,
    pub exchange_rate: f64,
    pub timestamp: DateTime<Utc>,
}

/// Resolve the current rate for a pair without converting anything
pub async fn get_rate(
    State(state): State<CurrencyApiState>,
    _session: SessionContext,
    Query(params): Query<RateQuery>,
) -> Result<Json<RatePreviewResponse>, AppError> {
    let from = params
        .from
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::missing_field("from"))?;
    let to = params
        .to
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AppError::missing_field("to"))?;

    let exchange_rate = state.resolver.resolve(&from, &to).await;

    Ok(Json(RatePreviewResponse {
        from_currency: from,
        to_currency: to,
        exchange_rate,
        timestamp: Utc::now(),
    }))
}

/// Query parameters for listing conversions
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

/// One conversion attempt in the listing
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionLogResponse {
    pub id: Uuid,
    pub from_currency: String,
    pub to_currency: String,
    pub exchange_rate: f64,
    pub converted_by: String,
    pub role: String,
    pub status: String,
    pub statistics: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<ConversionLog> for ConversionLogResponse {
    fn from(log: ConversionLog) -> Self {
        Self {
            id: log.id,
            from_currency: log.from_currency,
            to_currency: log.to_currency,
            exchange_rate: log.exchange_rate,
            converted_by: log.converted_by,
            role: log.role,
            status: log.status,
            statistics: log.statistics,
            error_message: log.error_message,
            timestamp: log.created_at,
        }
    }
}

/// List the tenant's conversion attempts, most recent first
pub async fn list_conversions(
    State(state): State<CurrencyApiState>,
    session: SessionContext,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<ConversionLogResponse>>, AppError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    let logs = state.logs.list_for_tenant(&session.tenant_id, limit).await?;

    Ok(Json(logs.into_iter().map(Into::into).collect()))
}

/// One reversal snapshot in a conversion's history
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyHistoryResponse {
    pub id: Uuid,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub original_values: serde_json::Value,
    pub converted_values: serde_json::Value,
    pub from_currency: String,
    pub to_currency: String,
    pub exchange_rate: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<CurrencyHistory> for CurrencyHistoryResponse {
    fn from(record: CurrencyHistory) -> Self {
        Self {
            id: record.id,
            entity_type: record.entity_type,
            entity_id: record.entity_id,
            original_values: record.original_values,
            converted_values: record.converted_values,
            from_currency: record.from_currency,
            to_currency: record.to_currency,
            exchange_rate: record.exchange_rate,
            timestamp: record.created_at,
        }
    }
}

/// List the per-document snapshots recorded by one conversion
pub async fn list_conversion_history(
    State(state): State<CurrencyApiState>,
    session: SessionContext,
    Path(conversion_id): Path<Uuid>,
) -> Result<Json<Vec<CurrencyHistoryResponse>>, AppError> {
    let records = state
        .histories
        .list_for_conversion(&session.tenant_id, conversion_id)
        .await?;

    Ok(Json(records.into_iter().map(Into::into).collect()))
}
