use chrono::{Datelike, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::entities::{
    batch, batch_timeline_event, gravity_reading, lot, lot_batch, packaging_run, recipe, tank,
    tank_assignment, AssignmentStatus,
};
use crate::errors::ServiceError;
use crate::lineage::{lot_code, LineageSnapshot};

/// Tenant-scoped access to the lineage tables.
///
/// Generic over the connection so the same code runs on the pool for reads
/// and inside a transaction for writes. Every query filters on `tenant_id`;
/// a row belonging to another tenant is indistinguishable from a missing one.
pub struct LineageRepository<'a, C: ConnectionTrait> {
    conn: &'a C,
    tenant_id: &'a str,
}

impl<'a, C: ConnectionTrait> LineageRepository<'a, C> {
    pub fn new(conn: &'a C, tenant_id: &'a str) -> Self {
        Self { conn, tenant_id }
    }

    pub fn tenant_id(&self) -> &str {
        self.tenant_id
    }

    /// Loads every lineage row of the tenant.
    pub async fn load_snapshot(&self) -> Result<LineageSnapshot, ServiceError> {
        let tenant = self.tenant_id;

        let lots = lot::Entity::find()
            .filter(lot::Column::TenantId.eq(tenant))
            .order_by_desc(lot::Column::CreatedAt)
            .all(self.conn)
            .await?;
        let lot_batches = lot_batch::Entity::find()
            .filter(lot_batch::Column::TenantId.eq(tenant))
            .order_by_asc(lot_batch::Column::CreatedAt)
            .all(self.conn)
            .await?;
        let batches = batch::Entity::find()
            .filter(batch::Column::TenantId.eq(tenant))
            .all(self.conn)
            .await?;
        let recipes = recipe::Entity::find()
            .filter(recipe::Column::TenantId.eq(tenant))
            .all(self.conn)
            .await?;
        let assignments = tank_assignment::Entity::find()
            .filter(tank_assignment::Column::TenantId.eq(tenant))
            .all(self.conn)
            .await?;
        let tanks = tank::Entity::find()
            .filter(tank::Column::TenantId.eq(tenant))
            .all(self.conn)
            .await?;
        let readings = gravity_reading::Entity::find()
            .filter(gravity_reading::Column::TenantId.eq(tenant))
            .order_by_asc(gravity_reading::Column::RecordedAt)
            .all(self.conn)
            .await?;
        let packaged_by_lot_code = self.packaged_totals_by_lot_code().await?;

        debug!(
            tenant_id = %tenant,
            lots = lots.len(),
            batches = batches.len(),
            "Loaded lineage snapshot"
        );

        Ok(LineageSnapshot {
            lots,
            lot_batches,
            batches,
            recipes,
            assignments,
            tanks,
            readings,
            packaged_by_lot_code,
        })
    }

    async fn packaged_totals_by_lot_code(&self) -> Result<HashMap<String, f64>, ServiceError> {
        let rows: Vec<(String, Option<f64>)> = packaging_run::Entity::find()
            .select_only()
            .column(packaging_run::Column::LotNumber)
            .column_as(Expr::col(packaging_run::Column::VolumeTotal).sum(), "total")
            .filter(packaging_run::Column::TenantId.eq(self.tenant_id))
            .group_by(packaging_run::Column::LotNumber)
            .into_tuple()
            .all(self.conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(code, total)| (code, total.unwrap_or(0.0)))
            .collect())
    }

    /// Liters packaged under `lot_code` so far.
    pub async fn packaged_volume_for_lot_code(&self, lot_code: &str) -> Result<f64, ServiceError> {
        let total: Option<Option<f64>> = packaging_run::Entity::find()
            .select_only()
            .column_as(Expr::col(packaging_run::Column::VolumeTotal).sum(), "total")
            .filter(packaging_run::Column::TenantId.eq(self.tenant_id))
            .filter(packaging_run::Column::LotNumber.eq(lot_code))
            .into_tuple()
            .one(self.conn)
            .await?;
        Ok(total.flatten().unwrap_or(0.0))
    }

    /// Liters of packaging runs billed to `batch_id`.
    pub async fn packaged_volume_for_batch(&self, batch_id: Uuid) -> Result<f64, ServiceError> {
        let total: Option<Option<f64>> = packaging_run::Entity::find()
            .select_only()
            .column_as(Expr::col(packaging_run::Column::VolumeTotal).sum(), "total")
            .filter(packaging_run::Column::TenantId.eq(self.tenant_id))
            .filter(packaging_run::Column::BatchId.eq(batch_id))
            .into_tuple()
            .one(self.conn)
            .await?;
        Ok(total.flatten().unwrap_or(0.0))
    }

    pub async fn find_lot(&self, id: Uuid) -> Result<lot::Model, ServiceError> {
        lot::Entity::find_by_id(id)
            .filter(lot::Column::TenantId.eq(self.tenant_id))
            .one(self.conn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Lot", id))
    }

    pub async fn find_lot_by_code(&self, code: &str) -> Result<Option<lot::Model>, ServiceError> {
        Ok(lot::Entity::find()
            .filter(lot::Column::TenantId.eq(self.tenant_id))
            .filter(lot::Column::LotCode.eq(code))
            .one(self.conn)
            .await?)
    }

    pub async fn lot_code_exists(&self, code: &str) -> Result<bool, ServiceError> {
        Ok(self.find_lot_by_code(code).await?.is_some())
    }

    /// True when an unlinked lot named `{code}-{A..Z}` exists, so the legacy
    /// naming fallback would read `code` as an already split parent.
    pub async fn has_legacy_split_children(&self, code: &str) -> Result<bool, ServiceError> {
        let children: Vec<String> = lot::Entity::find()
            .select_only()
            .column(lot::Column::LotCode)
            .filter(lot::Column::TenantId.eq(self.tenant_id))
            .filter(lot::Column::ParentLotId.is_null())
            .filter(lot::Column::IsBlendResult.eq(false))
            .filter(lot::Column::LotCode.starts_with(format!("{}-", code)))
            .into_tuple()
            .all(self.conn)
            .await?;
        Ok(children
            .iter()
            .any(|c| lot_code::split_parent_code(c) == Some(code)))
    }

    pub async fn find_batch(&self, id: Uuid) -> Result<batch::Model, ServiceError> {
        batch::Entity::find_by_id(id)
            .filter(batch::Column::TenantId.eq(self.tenant_id))
            .one(self.conn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Batch", id))
    }

    pub async fn batch_number_exists(&self, number: &str) -> Result<bool, ServiceError> {
        let count = batch::Entity::find()
            .filter(batch::Column::TenantId.eq(self.tenant_id))
            .filter(batch::Column::BatchNumber.eq(number))
            .count(self.conn)
            .await?;
        Ok(count > 0)
    }

    pub async fn find_batches(&self, ids: &[Uuid]) -> Result<Vec<batch::Model>, ServiceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(batch::Entity::find()
            .filter(batch::Column::TenantId.eq(self.tenant_id))
            .filter(batch::Column::Id.is_in(ids.iter().copied()))
            .all(self.conn)
            .await?)
    }

    pub async fn find_tank(&self, id: Uuid) -> Result<tank::Model, ServiceError> {
        tank::Entity::find_by_id(id)
            .filter(tank::Column::TenantId.eq(self.tenant_id))
            .one(self.conn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Tank", id))
    }

    pub async fn find_recipe(&self, id: Uuid) -> Result<recipe::Model, ServiceError> {
        recipe::Entity::find_by_id(id)
            .filter(recipe::Column::TenantId.eq(self.tenant_id))
            .one(self.conn)
            .await?
            .ok_or_else(|| ServiceError::not_found("Recipe", id))
    }

    pub async fn find_recipes(&self, ids: &[Uuid]) -> Result<Vec<recipe::Model>, ServiceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(recipe::Entity::find()
            .filter(recipe::Column::TenantId.eq(self.tenant_id))
            .filter(recipe::Column::Id.is_in(ids.iter().copied()))
            .all(self.conn)
            .await?)
    }

    pub async fn lot_batches_for_lot(
        &self,
        lot_id: Uuid,
    ) -> Result<Vec<lot_batch::Model>, ServiceError> {
        Ok(lot_batch::Entity::find()
            .filter(lot_batch::Column::TenantId.eq(self.tenant_id))
            .filter(lot_batch::Column::LotId.eq(lot_id))
            .order_by_asc(lot_batch::Column::CreatedAt)
            .all(self.conn)
            .await?)
    }

    /// Every lot holding volume from `batch_id`, consumed parents included.
    pub async fn lots_for_batch(&self, batch_id: Uuid) -> Result<Vec<lot::Model>, ServiceError> {
        let lot_ids: Vec<Uuid> = lot_batch::Entity::find()
            .select_only()
            .column(lot_batch::Column::LotId)
            .filter(lot_batch::Column::TenantId.eq(self.tenant_id))
            .filter(lot_batch::Column::BatchId.eq(batch_id))
            .into_tuple()
            .all(self.conn)
            .await?;
        if lot_ids.is_empty() {
            return Ok(Vec::new());
        }

        Ok(lot::Entity::find()
            .filter(lot::Column::TenantId.eq(self.tenant_id))
            .filter(lot::Column::Id.is_in(lot_ids))
            .order_by_desc(lot::Column::CreatedAt)
            .all(self.conn)
            .await?)
    }

    /// True once a lot has been split, by timestamp, child reference or
    /// legacy child code.
    pub async fn is_split_parent(&self, parent: &lot::Model) -> Result<bool, ServiceError> {
        if parent.split_at.is_some() {
            return Ok(true);
        }

        let children = lot::Entity::find()
            .filter(lot::Column::TenantId.eq(self.tenant_id))
            .filter(lot::Column::ParentLotId.eq(parent.id))
            .count(self.conn)
            .await?;
        if children > 0 {
            return Ok(true);
        }

        let named_like_children: Vec<lot::Model> = lot::Entity::find()
            .filter(lot::Column::TenantId.eq(self.tenant_id))
            .filter(lot::Column::LotCode.starts_with(format!("{}-", parent.lot_code)))
            .filter(lot::Column::ParentLotId.is_null())
            .filter(lot::Column::IsBlendResult.eq(false))
            .all(self.conn)
            .await?;

        Ok(named_like_children
            .iter()
            .any(|l| lot_code::split_parent_code(&l.lot_code) == Some(parent.lot_code.as_str())))
    }

    pub async fn open_assignments_for_lot(
        &self,
        lot_id: Uuid,
    ) -> Result<Vec<tank_assignment::Model>, ServiceError> {
        Ok(tank_assignment::Entity::find()
            .filter(tank_assignment::Column::TenantId.eq(self.tenant_id))
            .filter(tank_assignment::Column::LotId.eq(lot_id))
            .filter(tank_assignment::Column::Status.is_in([
                AssignmentStatus::Active.as_str(),
                AssignmentStatus::Planned.as_str(),
            ]))
            .order_by_desc(tank_assignment::Column::CreatedAt)
            .all(self.conn)
            .await?)
    }

    pub async fn tanks_held_by(&self, lot_id: Uuid) -> Result<Vec<tank::Model>, ServiceError> {
        Ok(tank::Entity::find()
            .filter(tank::Column::TenantId.eq(self.tenant_id))
            .filter(tank::Column::CurrentLotId.eq(lot_id))
            .all(self.conn)
            .await?)
    }

    /// Next free `{prefix}-{year}-{seq:04}` code across lots and batches.
    pub async fn next_code(&self, prefix: &str) -> Result<String, ServiceError> {
        let stem = format!("{}-{}-", prefix, Utc::now().year());

        let mut codes: Vec<String> = lot::Entity::find()
            .select_only()
            .column(lot::Column::LotCode)
            .filter(lot::Column::TenantId.eq(self.tenant_id))
            .filter(lot::Column::LotCode.starts_with(&stem))
            .into_tuple()
            .all(self.conn)
            .await?;
        let numbers: Vec<String> = batch::Entity::find()
            .select_only()
            .column(batch::Column::BatchNumber)
            .filter(batch::Column::TenantId.eq(self.tenant_id))
            .filter(batch::Column::BatchNumber.starts_with(&stem))
            .into_tuple()
            .all(self.conn)
            .await?;
        codes.extend(numbers);

        let mut next = codes
            .iter()
            .filter_map(|c| c.strip_prefix(stem.as_str()))
            .filter_map(|seq| seq.parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1;

        loop {
            let code = format!("{}{:04}", stem, next);
            if !self.has_legacy_split_children(&code).await? {
                return Ok(code);
            }
            debug!(tenant_id = %self.tenant_id, %code, "Skipping code shadowed by legacy split lots");
            next += 1;
        }
    }

    pub async fn reading_count(&self, batch_id: Uuid) -> Result<u64, ServiceError> {
        Ok(gravity_reading::Entity::find()
            .filter(gravity_reading::Column::TenantId.eq(self.tenant_id))
            .filter(gravity_reading::Column::BatchId.eq(batch_id))
            .count(self.conn)
            .await?)
    }

    // Inserts overwrite `tenant_id` with the repository's tenant.

    pub async fn insert_batch(&self, model: batch::Model) -> Result<batch::Model, ServiceError> {
        let mut active = batch::ActiveModel::from(model).reset_all();
        active.tenant_id = Set(self.tenant_id.to_string());
        Ok(active.insert(self.conn).await?)
    }

    pub async fn insert_lot(&self, model: lot::Model) -> Result<lot::Model, ServiceError> {
        let mut active = lot::ActiveModel::from(model).reset_all();
        active.tenant_id = Set(self.tenant_id.to_string());
        Ok(active.insert(self.conn).await?)
    }

    pub async fn insert_lot_batch(
        &self,
        lot_id: Uuid,
        batch_id: Uuid,
        volume_contribution: f64,
        batch_percentage: f64,
    ) -> Result<lot_batch::Model, ServiceError> {
        let row = lot_batch::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(self.tenant_id.to_string()),
            lot_id: Set(lot_id),
            batch_id: Set(batch_id),
            volume_contribution: Set(volume_contribution),
            batch_percentage: Set(batch_percentage),
            created_at: Set(Utc::now()),
        };
        Ok(row.insert(self.conn).await?)
    }

    pub async fn insert_assignment(
        &self,
        model: tank_assignment::Model,
    ) -> Result<tank_assignment::Model, ServiceError> {
        let mut active = tank_assignment::ActiveModel::from(model).reset_all();
        active.tenant_id = Set(self.tenant_id.to_string());
        Ok(active.insert(self.conn).await?)
    }

    pub async fn insert_reading(
        &self,
        model: gravity_reading::Model,
    ) -> Result<gravity_reading::Model, ServiceError> {
        let mut active = gravity_reading::ActiveModel::from(model).reset_all();
        active.tenant_id = Set(self.tenant_id.to_string());
        Ok(active.insert(self.conn).await?)
    }

    pub async fn insert_packaging_run(
        &self,
        model: packaging_run::Model,
    ) -> Result<packaging_run::Model, ServiceError> {
        let mut active = packaging_run::ActiveModel::from(model).reset_all();
        active.tenant_id = Set(self.tenant_id.to_string());
        Ok(active.insert(self.conn).await?)
    }

    /// Writes `model` if its `version` is still current, bumping the version.
    pub async fn save_lot(&self, model: lot::Model) -> Result<lot::Model, ServiceError> {
        let expected = model.version;
        let now = Utc::now();
        let result = lot::Entity::update_many()
            .set(lot::ActiveModel {
                phase: Set(model.phase.clone()),
                status: Set(model.status.clone()),
                planned_volume: Set(model.planned_volume),
                actual_volume: Set(model.actual_volume),
                blended_at: Set(model.blended_at),
                split_at: Set(model.split_at),
                completed_at: Set(model.completed_at),
                version: Set(expected + 1),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(lot::Column::Id.eq(model.id))
            .filter(lot::Column::TenantId.eq(self.tenant_id))
            .filter(lot::Column::Version.eq(expected))
            .exec(self.conn)
            .await?;

        self.ensure_single_row("lot", model.id, result.rows_affected)?;
        Ok(lot::Model {
            version: expected + 1,
            updated_at: now,
            ..model
        })
    }

    pub async fn save_batch(&self, model: batch::Model) -> Result<batch::Model, ServiceError> {
        let expected = model.version;
        let now = Utc::now();
        let result = batch::Entity::update_many()
            .set(batch::ActiveModel {
                status: Set(model.status.clone()),
                packaged_volume: Set(model.packaged_volume),
                original_gravity: Set(model.original_gravity),
                current_gravity: Set(model.current_gravity),
                final_gravity: Set(model.final_gravity),
                tank_id: Set(model.tank_id),
                completed_at: Set(model.completed_at),
                version: Set(expected + 1),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(batch::Column::Id.eq(model.id))
            .filter(batch::Column::TenantId.eq(self.tenant_id))
            .filter(batch::Column::Version.eq(expected))
            .exec(self.conn)
            .await?;

        self.ensure_single_row("batch", model.id, result.rows_affected)?;
        Ok(batch::Model {
            version: expected + 1,
            updated_at: now,
            ..model
        })
    }

    pub async fn save_tank(&self, model: tank::Model) -> Result<tank::Model, ServiceError> {
        let expected = model.version;
        let now = Utc::now();
        let result = tank::Entity::update_many()
            .set(tank::ActiveModel {
                status: Set(model.status.clone()),
                current_lot_id: Set(model.current_lot_id),
                current_phase: Set(model.current_phase.clone()),
                needs_cleaning: Set(model.needs_cleaning),
                version: Set(expected + 1),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(tank::Column::Id.eq(model.id))
            .filter(tank::Column::TenantId.eq(self.tenant_id))
            .filter(tank::Column::Version.eq(expected))
            .exec(self.conn)
            .await?;

        self.ensure_single_row("tank", model.id, result.rows_affected)?;
        Ok(tank::Model {
            version: expected + 1,
            updated_at: now,
            ..model
        })
    }

    pub async fn save_assignment(
        &self,
        model: tank_assignment::Model,
    ) -> Result<tank_assignment::Model, ServiceError> {
        let expected = model.version;
        let now = Utc::now();
        let result = tank_assignment::Entity::update_many()
            .set(tank_assignment::ActiveModel {
                status: Set(model.status.clone()),
                actual_start: Set(model.actual_start),
                actual_end: Set(model.actual_end),
                actual_volume: Set(model.actual_volume),
                version: Set(expected + 1),
                updated_at: Set(now),
                ..Default::default()
            })
            .filter(tank_assignment::Column::Id.eq(model.id))
            .filter(tank_assignment::Column::TenantId.eq(self.tenant_id))
            .filter(tank_assignment::Column::Version.eq(expected))
            .exec(self.conn)
            .await?;

        self.ensure_single_row("tank assignment", model.id, result.rows_affected)?;
        Ok(tank_assignment::Model {
            version: expected + 1,
            updated_at: now,
            ..model
        })
    }

    fn ensure_single_row(&self, what: &str, id: Uuid, rows: u64) -> Result<(), ServiceError> {
        if rows == 1 {
            Ok(())
        } else if rows > 1 {
            Err(ServiceError::InternalError(format!(
                "versioned update of {} {} touched {} rows",
                what, id, rows
            )))
        } else {
            warn!(tenant_id = %self.tenant_id, %id, "Stale {} version; update rejected", what);
            Err(ServiceError::Conflict(format!(
                "{} {} was modified concurrently; reload and retry",
                what, id
            )))
        }
    }

    /// Batch audit trail, oldest first.
    pub async fn timeline_for_batch(
        &self,
        batch_id: Uuid,
    ) -> Result<Vec<batch_timeline_event::Model>, ServiceError> {
        Ok(batch_timeline_event::Entity::find()
            .filter(batch_timeline_event::Column::TenantId.eq(self.tenant_id))
            .filter(batch_timeline_event::Column::BatchId.eq(batch_id))
            .order_by_asc(batch_timeline_event::Column::CreatedAt)
            .all(self.conn)
            .await?)
    }

    pub async fn insert_timeline(
        &self,
        batch_id: Uuid,
        event_type: &str,
        description: String,
        metadata: Option<Value>,
        created_by: Option<String>,
    ) -> Result<batch_timeline_event::Model, ServiceError> {
        let entry = batch_timeline_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(self.tenant_id.to_string()),
            batch_id: Set(batch_id),
            event_type: Set(event_type.to_string()),
            description: Set(description),
            metadata: Set(metadata),
            created_by: Set(created_by),
            created_at: Set(Utc::now()),
        };
        Ok(entry.insert(self.conn).await?)
    }
}
