#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use lot_lineage_api::{
    build_router,
    config::AppConfig,
    db::{self, DbConfig},
    entities::{
        batch, lot, lot_batch, recipe, tank, tank_assignment, AssignmentStatus, BatchStatus,
        LotPhase, LotStatus, TankStatus, TankType,
    },
    events::{self, EventSender},
    AppState,
};

pub const TENANT: &str = "brewery-a";
pub const OTHER_TENANT: &str = "brewery-b";
pub const USER: &str = "brewer-1";

/// In-memory application over a single-connection SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

/// Status and parsed JSON body of a response.
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Ids of a lot seeded through [`TestApp::seed_lot`].
#[derive(Debug, Clone)]
pub struct SeededLot {
    pub lot_id: Uuid,
    pub lot_code: String,
    pub batch_id: Uuid,
    pub tank_id: Uuid,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            8080,
            "test".to_string(),
        ))
        .await
    }

    pub async fn with_config(cfg: AppConfig) -> Self {
        let pool = db::establish_connection_with_config(&DbConfig {
            url: cfg.database_url.clone(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        })
        .await
        .expect("failed to open in-memory database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(Arc::new(pool), cfg, EventSender::new(event_tx));
        let router = build_router(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    pub fn db(&self) -> &sea_orm::DatabaseConnection {
        self.state.db.as_ref()
    }

    /// Sends a request with explicit tenant and user headers.
    pub async fn request_as(
        &self,
        tenant: Option<&str>,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tenant) = tenant {
            builder = builder
                .header("x-tenant-id", tenant)
                .header("x-user-id", USER);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("build request"))
            .await
            .expect("router error during test request");

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read response body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        TestResponse { status, body }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request_as(Some(TENANT), Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> TestResponse {
        self.request_as(Some(TENANT), Method::POST, uri, Some(body))
            .await
    }

    /// `GET /api/v1/lots` with an optional query string.
    pub async fn list_lots(&self, query: &str) -> TestResponse {
        let uri = if query.is_empty() {
            "/api/v1/lots".to_string()
        } else {
            format!("/api/v1/lots?{}", query)
        };
        self.get(&uri).await
    }

    pub async fn seed_tank(&self, tenant: &str, name: &str, capacity: Option<f64>) -> tank::Model {
        tank::ActiveModel::from(tank::Model {
            id: Uuid::new_v4(),
            tenant_id: tenant.to_string(),
            name: name.to_string(),
            tank_type: TankType::Unitank.to_string(),
            capacity_liters: capacity,
            status: TankStatus::Available.as_str().to_string(),
            current_lot_id: None,
            current_phase: None,
            needs_cleaning: false,
            version: 1,
            updated_at: Utc::now(),
        })
        .reset_all()
        .insert(self.db())
        .await
        .expect("seed tank")
    }

    pub async fn seed_recipe(&self, tenant: &str, name: &str, style: &str) -> recipe::Model {
        recipe::ActiveModel::from(recipe::Model {
            id: Uuid::new_v4(),
            tenant_id: tenant.to_string(),
            name: name.to_string(),
            style: Some(style.to_string()),
            created_at: Utc::now(),
        })
        .reset_all()
        .insert(self.db())
        .await
        .expect("seed recipe")
    }

    /// Seeds a batch with one ACTIVE lot of the same code held in `tank`.
    pub async fn seed_lot(
        &self,
        tenant: &str,
        code: &str,
        volume: f64,
        phase: LotPhase,
        tank: &tank::Model,
        recipe_id: Option<Uuid>,
    ) -> SeededLot {
        let now = Utc::now();
        let db = self.db();

        let batch = batch::ActiveModel::from(batch::Model {
            id: Uuid::new_v4(),
            tenant_id: tenant.to_string(),
            batch_number: code.to_string(),
            recipe_id,
            status: BatchStatus::for_phase(phase).as_str().to_string(),
            volume,
            packaged_volume: 0.0,
            original_gravity: Some(1.052),
            current_gravity: Some(1.012),
            final_gravity: None,
            tank_id: Some(tank.id),
            brew_date: Some(now),
            completed_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        })
        .reset_all()
        .insert(db)
        .await
        .expect("seed batch");

        let lot = lot::ActiveModel::from(lot::Model {
            id: Uuid::new_v4(),
            tenant_id: tenant.to_string(),
            lot_code: code.to_string(),
            phase: Some(phase.as_str().to_string()),
            status: LotStatus::Active.as_str().to_string(),
            planned_volume: Some(volume),
            actual_volume: Some(volume),
            parent_lot_id: None,
            is_blend_result: false,
            blended_at: None,
            split_at: None,
            completed_at: None,
            version: 1,
            created_at: now,
            updated_at: now,
        })
        .reset_all()
        .insert(db)
        .await
        .expect("seed lot");

        lot_batch::ActiveModel::from(lot_batch::Model {
            id: Uuid::new_v4(),
            tenant_id: tenant.to_string(),
            lot_id: lot.id,
            batch_id: batch.id,
            volume_contribution: volume,
            batch_percentage: 100.0,
            created_at: now,
        })
        .reset_all()
        .insert(db)
        .await
        .expect("seed lot batch");

        tank_assignment::ActiveModel::from(tank_assignment::Model {
            id: Uuid::new_v4(),
            tenant_id: tenant.to_string(),
            tank_id: tank.id,
            lot_id: lot.id,
            phase: phase.as_str().to_string(),
            status: AssignmentStatus::Active.as_str().to_string(),
            planned_start: Some(now),
            planned_end: None,
            actual_start: Some(now),
            actual_end: None,
            planned_volume: Some(volume),
            actual_volume: Some(volume),
            version: 1,
            created_at: now,
            updated_at: now,
        })
        .reset_all()
        .insert(db)
        .await
        .expect("seed tank assignment");

        tank::ActiveModel::from(tank::Model {
            status: TankStatus::InUse.as_str().to_string(),
            current_lot_id: Some(lot.id),
            current_phase: Some(phase.as_str().to_string()),
            ..tank.clone()
        })
        .reset_all()
        .update(db)
        .await
        .expect("occupy seeded tank");

        SeededLot {
            lot_id: lot.id,
            lot_code: lot.lot_code,
            batch_id: batch.id,
            tank_id: tank.id,
        }
    }

    pub async fn find_tank(&self, id: Uuid) -> tank::Model {
        tank::Entity::find_by_id(id)
            .one(self.db())
            .await
            .expect("load tank")
            .expect("tank exists")
    }

    pub async fn find_batch(&self, id: Uuid) -> batch::Model {
        batch::Entity::find_by_id(id)
            .one(self.db())
            .await
            .expect("load batch")
            .expect("batch exists")
    }

    pub async fn find_lot(&self, id: Uuid) -> lot::Model {
        lot::Entity::find_by_id(id)
            .one(self.db())
            .await
            .expect("load lot")
            .expect("lot exists")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Lot codes of a list response, in response order.
pub fn lot_codes(body: &Value) -> Vec<String> {
    body["lots"]
        .as_array()
        .map(|lots| {
            lots.iter()
                .filter_map(|l| l["lot_code"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

pub fn approx(actual: &Value, expected: f64) -> bool {
    actual
        .as_f64()
        .is_some_and(|v| (v - expected).abs() < 1e-6)
}
