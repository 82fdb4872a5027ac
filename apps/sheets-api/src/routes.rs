//! HTTP handlers.
//!
//! ```text
//! GET  /api/health          {ok}
//! GET  /api/sheets/health   {ok, serverTime, config, meta}      token
//! GET  /api/sheets/import   {ok, data, meta}                    token
//! GET  /api/sheets/meta     {ok, meta}                          token
//! POST /api/sheets/export   {ok, exported, meta}                token
//! ```

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use ironstock_core::{CementProduct, ItemClass, RodSize};
use serde_json::{json, Value};
use tracing::info;

use crate::auth::require_sync_token;
use crate::db::Region;
use crate::error::ApiError;
use crate::regions::{self, ExportRegions};
use crate::AppState;

type ApiResult = Result<Json<Value>, ApiError>;

fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A marker strictly after `previous`, so two exports in one millisecond
/// still look different to pollers.
fn next_marker(previous: Option<&str>) -> String {
    let mut stamp = Utc::now();
    if let Some(previous) = previous.and_then(|p| DateTime::parse_from_rfc3339(p).ok()) {
        let previous = previous.with_timezone(&Utc);
        if stamp <= previous {
            stamp = previous + Duration::milliseconds(1);
        }
    }
    stamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

pub async fn sheets_health(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult {
    require_sync_token(&headers, state.config.sync_token.as_deref())?;

    let has_database = state.db.health_check().await;
    let updated_at = state.db.updated_at().await?;
    Ok(Json(json!({
        "ok": true,
        "serverTime": now_iso(),
        "config": {
            "hasDatabase": has_database,
            "hasSyncToken": state.config.sync_token.is_some(),
        },
        "meta": { "updatedAt": updated_at },
    })))
}

pub async fn import(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult {
    require_sync_token(&headers, state.config.sync_token.as_deref())?;

    let items = state.db.read_region(Region::Items).await?;
    let transactions = state.db.read_region(Region::Transactions).await?;
    let cement_transactions = state.db.read_region(Region::CementTransactions).await?;
    let updated_at = state.db.updated_at().await?;

    Ok(Json(json!({
        "ok": true,
        "data": regions::document(
            items.as_ref(),
            transactions.as_ref(),
            cement_transactions.as_ref(),
        ),
        "meta": { "updatedAt": updated_at },
    })))
}

pub async fn meta(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult {
    require_sync_token(&headers, state.config.sync_token.as_deref())?;

    let updated_at = state.db.updated_at().await?;
    Ok(Json(json!({ "ok": true, "meta": { "updatedAt": updated_at } })))
}

pub async fn export(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    require_sync_token(&headers, state.config.sync_token.as_deref())?;

    let body: Value = serde_json::from_slice(&body).map_err(|_| ApiError::InvalidBody)?;
    if !body.is_object() {
        return Err(ApiError::InvalidBody);
    }
    let regions = ExportRegions::from_body(&body);

    // One export at a time; the regions themselves are written independently
    // and the marker goes last
    let _guard = state.export_lock.lock().await;
    state.db.write_region(Region::Items, &regions.items).await?;
    state
        .db
        .write_region(Region::Transactions, &Value::Array(regions.transactions.clone()))
        .await?;
    state
        .db
        .write_region(
            Region::CementTransactions,
            &Value::Array(regions.cement_transactions.clone()),
        )
        .await?;

    let previous = state.db.updated_at().await?;
    let updated_at = next_marker(previous.as_deref());
    state
        .db
        .write_region(Region::Meta, &json!({ "updatedAt": updated_at }))
        .await?;
    let confirmed = state.db.updated_at().await?.unwrap_or(updated_at);

    info!(
        transactions = regions.transactions.len(),
        cement_transactions = regions.cement_transactions.len(),
        updated_at = %confirmed,
        "Snapshot exported"
    );

    Ok(Json(json!({
        "ok": true,
        "exported": {
            "items": RodSize::ALL.len(),
            "transactions": regions.transactions.len(),
            "cementItems": CementProduct::ALL.len(),
            "cementTransactions": regions.cement_transactions.len(),
        },
        "meta": { "updatedAt": confirmed },
    })))
}
