pub mod batches;
pub mod common;
pub mod lots;
pub mod operations;
pub mod packaging;

use axum::{
    routing::{get, post},
    Router,
};

pub use crate::AppState;

/// Lineage routes, mounted under `/api/v1`.
pub fn lineage_routes() -> Router<AppState> {
    Router::new()
        .route("/lots", get(lots::list_lots))
        .route("/lots/split", post(lots::split_lot))
        .route("/lots/blend", post(lots::blend_lots))
        .route("/lots/:id", get(lots::get_lot))
        .route("/lots/:id/volume", get(lots::lot_volume))
        .route("/lots/:id/complete", post(lots::complete_lot))
        .route("/lots/:id/advance", post(lots::advance_lot))
        .route("/packaging", post(packaging::record_packaging))
        .route("/operations", post(operations::execute_operation))
        .route("/batches", post(batches::create_batch))
        .route(
            "/batches/:id/gravity-readings",
            post(batches::record_gravity_reading),
        )
        .route("/batches/:id/timeline", get(batches::batch_timeline))
}
