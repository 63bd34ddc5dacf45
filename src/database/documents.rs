//! Generic repository over the tenant document collections
//!
//! The business entities this service rewrites (courses, payments, products,
//! subscriptions, schedules, notifications, incomes, expenses) are owned by
//! other subsystems and stored as schema-flexible JSONB bags, one table per
//! collection. This repository treats them uniformly: find the documents
//! eligible for conversion, and patch the converted fields in place.
//!
//! All operations take a caller-supplied connection so reads and writes share
//! one transaction. Collection names and field paths come from the static
//! per-entity tables in the field converter, never from request input, so the
//! assembled SQL contains no user-controlled text.

use crate::database::error::DatabaseError;
use sqlx::{FromRow, PgConnection};
use std::collections::BTreeMap;
use uuid::Uuid;

/// One raw document scoped to a tenant
#[derive(Debug, Clone, FromRow)]
pub struct TenantDocument {
    pub id: Uuid,
    pub tenant_id: Option<String>,
    pub academy_id: Option<String>,
    pub data: serde_json::Value,
}

/// Repository over the document collections
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentRepository;

impl DocumentRepository {
    pub fn new() -> Self {
        Self
    }

    /// Find the tenant's documents with at least one positive monetary field.
    ///
    /// Matches on `tenant_id` or the legacy `academy_id` key (some
    /// collections were scoped by academy historically). Rows are locked
    /// `FOR UPDATE` so concurrent writers to the same document block until
    /// this transaction commits or aborts. Iteration order is unspecified.
    pub async fn find_eligible(
        &self,
        conn: &mut PgConnection,
        collection: &str,
        money_fields: &[&str],
        tenant_id: &str,
    ) -> Result<Vec<TenantDocument>, DatabaseError> {
        let sql = format!(
            "SELECT id, tenant_id, academy_id, data
             FROM {}
             WHERE (tenant_id = $1 OR academy_id = $1) AND ({})
             FOR UPDATE",
            collection,
            eligibility_clause(money_fields)
        );

        sqlx::query_as::<_, TenantDocument>(&sql)
            .bind(tenant_id)
            .fetch_all(&mut *conn)
            .await
            .map_err(DatabaseError::from_sqlx)
    }

    /// Patch the converted fields of one document in place.
    ///
    /// Only the changed fields are touched (nested `jsonb_set` composition);
    /// the rest of the document's structure is left exactly as found.
    pub async fn update_fields(
        &self,
        conn: &mut PgConnection,
        collection: &str,
        id: Uuid,
        values: &BTreeMap<String, i64>,
    ) -> Result<(), DatabaseError> {
        let mut expr = String::from("data");
        for (i, path) in values.keys().enumerate() {
            expr = format!(
                "jsonb_set({}, '{}', to_jsonb(${}::bigint))",
                expr,
                json_path_literal(path),
                i + 2
            );
        }

        let sql = format!("UPDATE {} SET data = {} WHERE id = $1", collection, expr);

        let mut query = sqlx::query(&sql).bind(id);
        for value in values.values() {
            query = query.bind(*value);
        }

        let result = query
            .execute(&mut *conn)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::new(
                crate::database::error::DatabaseErrorKind::NotFound {
                    entity: collection.to_string(),
                    id: id.to_string(),
                },
            ));
        }

        Ok(())
    }
}

/// Predicate selecting documents with any allow-listed field that is a JSON
/// number strictly greater than zero. Absent fields yield NULL and drop out
/// of the OR; non-number values fail the typeof guard before the cast.
fn eligibility_clause(money_fields: &[&str]) -> String {
    money_fields
        .iter()
        .map(|field| {
            let path = json_path_literal(field);
            format!(
                "(jsonb_typeof(data #> '{0}') = 'number' AND (data #>> '{0}')::double precision > 0)",
                path
            )
        })
        .collect::<Vec<_>>()
        .join(" OR ")
}

/// `metadata.amount` -> `{metadata,amount}` (one level of nesting supported)
fn json_path_literal(field: &str) -> String {
    format!("{{{}}}", field.replace('.', ","))
}
