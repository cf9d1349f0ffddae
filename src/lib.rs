//! Brewery lot lineage API
//!
//! Tracks lots through fermentation, conditioning and packaging, including
//! splits into child lots and blends of several lots, and serves the current
//! state of every tenant's production with consumed intermediates hidden.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod commands;
pub mod config;
pub mod db;
pub mod dto;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod health;
pub mod lineage;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod repositories;
pub mod services;
pub mod tracing;

use axum::{response::Json, routing::get, Router};
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};

use crate::services::LineageService;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: Arc<events::EventSender>,
    pub lineage: LineageService,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let event_sender = Arc::new(event_sender);
        let lineage = LineageService::new(
            db.clone(),
            event_sender.clone(),
            Arc::new(config.lineage.clone()),
        );
        Self {
            db,
            config,
            event_sender,
            lineage,
        }
    }
}

pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(api_status))
        .merge(handlers::lineage_routes())
}

/// The full HTTP surface: versioned API, health probes and API docs, with
/// request-id, tracing, timeout and CORS layers.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_v1_routes())
        .merge(health::health_routes())
        .with_state(state)
        .merge(openapi::swagger_ui())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CorsLayer::permissive())
        .layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
}

async fn api_status() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "lot-lineage-api",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub mod prelude {
    pub use crate::auth::TenantContext;
    pub use crate::db::{with_transaction, DbPool};
    pub use crate::errors::{ErrorResponse, ServiceError};
    pub use crate::events::{Event, EventSender};
    pub use crate::lineage::{LineageGraph, LineagePolicy, LotType};
    pub use crate::repositories::LineageRepository;
    pub use crate::services::LineageService;
}
