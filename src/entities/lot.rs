use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter as StrumEnumIter, EnumString, IntoStaticStr};
use utoipa::ToSchema;

/// Production phase of a lot. Declaration order is the forward order.
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
pub enum LotPhase {
    Fermentation,
    Conditioning,
    Bright,
    Packaging,
}

impl LotPhase {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Following phase, `None` once packaging is reached.
    pub fn next(&self) -> Option<LotPhase> {
        match self {
            LotPhase::Fermentation => Some(LotPhase::Conditioning),
            LotPhase::Conditioning => Some(LotPhase::Bright),
            LotPhase::Bright => Some(LotPhase::Packaging),
            LotPhase::Packaging => None,
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
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
pub enum LotStatus {
    Planned,
    Active,
    Completed,
}

impl LotStatus {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    pub fn is_live(&self) -> bool {
        matches!(self, LotStatus::Planned | LotStatus::Active)
    }
}

/// A physically distinct volume of beer.
///
/// `parent_lot_id` is set only on lots produced by a split. `is_blend_result`
/// marks lots produced by a blend. Rows are never deleted.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "lots")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: String,
    pub lot_code: String,
    pub phase: Option<String>,
    pub status: String,
    pub planned_volume: Option<f64>,
    pub actual_volume: Option<f64>,
    pub parent_lot_id: Option<Uuid>,
    pub is_blend_result: bool,
    pub blended_at: Option<DateTime<Utc>>,
    pub split_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn lot_status(&self) -> Option<LotStatus> {
        self.status.parse().ok()
    }

    pub fn lot_phase(&self) -> Option<LotPhase> {
        self.phase.as_deref().and_then(|p| p.parse().ok())
    }

    pub fn is_completed(&self) -> bool {
        self.lot_status() == Some(LotStatus::Completed)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Entity",
        from = "Column::ParentLotId",
        to = "Column::Id"
    )]
    Parent,
    #[sea_orm(has_many = "super::lot_batch::Entity")]
    LotBatches,
    #[sea_orm(has_many = "super::tank_assignment::Entity")]
    TankAssignments,
}

impl Related<super::lot_batch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LotBatches.def()
    }
}

impl Related<super::tank_assignment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TankAssignments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
