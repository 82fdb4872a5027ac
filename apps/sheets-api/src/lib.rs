//! # Ironstock Sheets API
//!
//! REST server holding the shared remote document that sync agents import
//! from and export to.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Sheets API Server                              │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────────┐│
//! │  │  Token check   │  │  Routes        │  │  Document store            ││
//! │  │                │  │                │  │                            ││
//! │  │ x-sync-token   │─►│ • health       │─►│ SQLite `regions` table     ││
//! │  │ == configured  │  │ • import       │  │ Items / Transactions /     ││
//! │  │ secret         │  │ • meta         │  │ CementTransactions / Meta  ││
//! │  │                │  │ • export       │  │                            ││
//! │  └────────────────┘  └────────────────┘  └────────────────────────────┘│
//! │                                                                         │
//! │  Every response: cache-control: no-store                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! Environment variables:
//! - `PORT` - listen port (default 8787)
//! - `SHEETS_DATABASE_PATH` - SQLite file (default `sheets.db`)
//! - `SHEETS_SYNC_TOKEN` - shared secret

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod regions;
pub mod routes;

use std::sync::Arc;

use axum::http::header::CACHE_CONTROL;
use axum::http::HeaderValue;
use axum::middleware;
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::Mutex;

use crate::config::SheetsApiConfig;
use crate::db::Database;
use crate::error::ApiError;

/// Shared application state.
pub struct AppState {
    pub db: Database,
    pub config: SheetsApiConfig,
    /// Serializes exports so their region writes never interleave.
    pub export_lock: Mutex<()>,
}

impl AppState {
    /// Opens the document store and applies migrations.
    pub async fn open(config: SheetsApiConfig) -> Result<Arc<Self>, ApiError> {
        let db = Database::connect(&config.database_path).await?;
        db.run_migrations().await?;
        Ok(Arc::new(AppState {
            db,
            config,
            export_lock: Mutex::new(()),
        }))
    }
}

/// Builds the router.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/sheets/health", get(routes::sheets_health))
        .route("/api/sheets/import", get(routes::import))
        .route("/api/sheets/meta", get(routes::meta))
        .route("/api/sheets/export", post(routes::export))
        .layer(middleware::map_response(no_store))
        .with_state(state)
}

async fn no_store(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{HeaderMap, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const TOKEN: &str = "secret";

    async fn test_app(token: Option<&str>) -> Router {
        let state = AppState::open(SheetsApiConfig::in_memory(token)).await.unwrap();
        app(state)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, headers, body)
    }

    fn get_with_token(uri: &str, token: &str) -> Request<Body> {
        Request::get(uri)
            .header("x-sync-token", token)
            .body(Body::empty())
            .unwrap()
    }

    fn export_request(body: &str) -> Request<Body> {
        Request::post("/api/sheets/export")
            .header("x-sync-token", TOKEN)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_needs_no_token() {
        let app = test_app(None).await;
        let request = Request::get("/api/health").body(Body::empty()).unwrap();
        let (status, headers, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));
        assert_eq!(headers.get("cache-control").unwrap(), "no-store");
    }

    #[tokio::test]
    async fn test_wrong_token_is_unauthorized() {
        let app = test_app(Some(TOKEN)).await;
        let (status, headers, body) = send(&app, get_with_token("/api/sheets/meta", "nope")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "error": "Unauthorized" }));
        assert_eq!(headers.get("cache-control").unwrap(), "no-store");
    }

    #[tokio::test]
    async fn test_missing_server_token_is_500() {
        let app = test_app(None).await;
        let (status, _, body) = send(&app, get_with_token("/api/sheets/import", TOKEN)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({ "error": "Missing environment variable: SHEETS_SYNC_TOKEN" })
        );
    }

    #[tokio::test]
    async fn test_fresh_store_imports_defaults() {
        let app = test_app(Some(TOKEN)).await;
        let (status, _, body) = send(&app, get_with_token("/api/sheets/import", TOKEN)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], json!(true));
        assert_eq!(body["meta"]["updatedAt"], Value::Null);
        assert_eq!(body["data"]["items"]["12mm"]["lowStockThreshold"], json!(10));
        assert_eq!(body["data"]["cementTransactions"], json!([]));
    }

    #[tokio::test]
    async fn test_export_then_import() {
        let app = test_app(Some(TOKEN)).await;
        let snapshot = json!({
            "items": {
                "8mm": { "quantity": 5, "bundles": 1, "averageCostPrice": 100,
                         "sellingPrice": 120, "lowStockThreshold": 10 }
            },
            "transactions": [{
                "id": "a", "type": "ADD", "size": "8mm", "quantity": 5, "bundles": 1,
                "unitCost": 100, "unitPrice": null, "profit": 0,
                "createdAt": "2024-05-01T00:00:00.000Z"
            }],
            "cementItems": {},
            "cementTransactions": []
        });

        let (status, _, exported) = send(&app, export_request(&snapshot.to_string())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            exported["exported"],
            json!({ "items": 3, "transactions": 1, "cementItems": 2, "cementTransactions": 0 })
        );
        let marker = exported["meta"]["updatedAt"].clone();
        assert!(marker.is_string());

        let (_, _, meta) = send(&app, get_with_token("/api/sheets/meta", TOKEN)).await;
        assert_eq!(meta["meta"]["updatedAt"], marker);

        let (_, _, imported) = send(&app, get_with_token("/api/sheets/import", TOKEN)).await;
        assert_eq!(imported["meta"]["updatedAt"], marker);
        assert_eq!(imported["data"]["items"]["8mm"]["quantity"], json!(5.0));
        assert_eq!(imported["data"]["transactions"][0]["id"], json!("a"));
        assert!(ironstock_core::validation::validate_snapshot(&imported["data"]).is_ok());
    }

    #[tokio::test]
    async fn test_successive_exports_change_marker() {
        let app = test_app(Some(TOKEN)).await;
        let body = r#"{"items":{},"transactions":[]}"#;
        let (_, _, first) = send(&app, export_request(body)).await;
        let (_, _, second) = send(&app, export_request(body)).await;
        assert_ne!(first["meta"]["updatedAt"], second["meta"]["updatedAt"]);
    }

    #[tokio::test]
    async fn test_non_object_body_is_rejected() {
        let app = test_app(Some(TOKEN)).await;
        for body in ["[1,2]", "not json", "null"] {
            let (status, _, response) = send(&app, export_request(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(response, json!({ "error": "Invalid JSON body" }));
        }
    }

    #[tokio::test]
    async fn test_sheets_health_reports_config() {
        let app = test_app(Some(TOKEN)).await;
        let (status, _, body) = send(&app, get_with_token("/api/sheets/health", TOKEN)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["config"],
            json!({ "hasDatabase": true, "hasSyncToken": true })
        );
        assert!(body["serverTime"].is_string());
    }
}
