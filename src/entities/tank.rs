use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use utoipa::ToSchema;

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
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TankStatus {
    Available,
    InUse,
    Cleaning,
    Maintenance,
}

impl TankStatus {
    pub fn as_str(&self) -> &'static str {
        self.into()
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
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TankType {
    Fermenter,
    Conditioning,
    Brite,
    Unitank,
}

/// Tank-capable equipment. Rows are provisioned by the equipment subsystem;
/// lineage operations only flip occupancy and cleaning fields.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tanks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub tank_type: String,
    pub capacity_liters: Option<f64>,
    pub status: String,
    pub current_lot_id: Option<Uuid>,
    pub current_phase: Option<String>,
    pub needs_cleaning: bool,
    pub version: i32,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn tank_status(&self) -> Option<TankStatus> {
        self.status.parse().ok()
    }

    /// True when the tank may take `lot_id`: either free or already holding it.
    pub fn can_hold(&self, lot_id: Uuid) -> bool {
        self.current_lot_id == Some(lot_id) || self.tank_status() == Some(TankStatus::Available)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::tank_assignment::Entity")]
    TankAssignments,
}

impl Related<super::tank_assignment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::TankAssignments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
