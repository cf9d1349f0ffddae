use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter as StrumEnumIter, EnumString, IntoStaticStr};
use utoipa::ToSchema;

use super::lot::LotPhase;

/// Brew run lifecycle. Declaration order is the forward order of the lifecycle.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    ToSchema,
    Display,
    EnumString,
    IntoStaticStr,
    StrumEnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Planned,
    Fermenting,
    Conditioning,
    Ready,
    Packaging,
    Completed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Batch status that corresponds to a lot being in `phase`.
    pub fn for_phase(phase: LotPhase) -> Self {
        match phase {
            LotPhase::Fermentation => BatchStatus::Fermenting,
            LotPhase::Conditioning => BatchStatus::Conditioning,
            LotPhase::Bright => BatchStatus::Ready,
            LotPhase::Packaging => BatchStatus::Packaging,
        }
    }

    pub fn is_packageable(&self) -> bool {
        matches!(self, BatchStatus::Ready | BatchStatus::Packaging)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "batches")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: String,
    pub batch_number: String,
    pub recipe_id: Option<Uuid>,
    pub status: String,
    pub volume: f64,
    /// Cumulative liters packaged against this batch; never decreases.
    pub packaged_volume: f64,
    pub original_gravity: Option<f64>,
    pub current_gravity: Option<f64>,
    pub final_gravity: Option<f64>,
    /// Direct tank reference kept by older brew records.
    pub tank_id: Option<Uuid>,
    pub brew_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn batch_status(&self) -> Option<BatchStatus> {
        self.status.parse().ok()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::recipe::Entity",
        from = "Column::RecipeId",
        to = "super::recipe::Column::Id"
    )]
    Recipe,
    #[sea_orm(has_many = "super::lot_batch::Entity")]
    LotBatches,
    #[sea_orm(has_many = "super::gravity_reading::Entity")]
    GravityReadings,
    #[sea_orm(has_many = "super::packaging_run::Entity")]
    PackagingRuns,
}

impl Related<super::recipe::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Recipe.def()
    }
}

impl Related<super::lot_batch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LotBatches.def()
    }
}

impl Related<super::gravity_reading::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GravityReadings.def()
    }
}

impl Related<super::packaging_run::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PackagingRuns.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
