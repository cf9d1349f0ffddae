use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter as StrumEnumIter, EnumString, IntoStaticStr};
use utoipa::ToSchema;

/// Package formats with a fixed fill volume.
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
pub enum PackageType {
    #[serde(rename = "KEG_HALF_BARREL")]
    #[strum(serialize = "KEG_HALF_BARREL")]
    KegHalfBarrel,
    #[serde(rename = "KEG_QUARTER_BARREL")]
    #[strum(serialize = "KEG_QUARTER_BARREL")]
    KegQuarterBarrel,
    #[serde(rename = "KEG_SIXTH_BARREL")]
    #[strum(serialize = "KEG_SIXTH_BARREL")]
    KegSixthBarrel,
    #[serde(rename = "KEG_50L")]
    #[strum(serialize = "KEG_50L")]
    Keg50L,
    #[serde(rename = "KEG_30L")]
    #[strum(serialize = "KEG_30L")]
    Keg30L,
    #[serde(rename = "KEG_20L")]
    #[strum(serialize = "KEG_20L")]
    Keg20L,
    #[serde(rename = "BOTTLE_330ML")]
    #[strum(serialize = "BOTTLE_330ML")]
    Bottle330Ml,
    #[serde(rename = "BOTTLE_355ML")]
    #[strum(serialize = "BOTTLE_355ML")]
    Bottle355Ml,
    #[serde(rename = "BOTTLE_500ML")]
    #[strum(serialize = "BOTTLE_500ML")]
    Bottle500Ml,
    #[serde(rename = "BOTTLE_750ML")]
    #[strum(serialize = "BOTTLE_750ML")]
    Bottle750Ml,
    #[serde(rename = "CAN_330ML")]
    #[strum(serialize = "CAN_330ML")]
    Can330Ml,
    #[serde(rename = "CAN_355ML")]
    #[strum(serialize = "CAN_355ML")]
    Can355Ml,
    #[serde(rename = "CAN_473ML")]
    #[strum(serialize = "CAN_473ML")]
    Can473Ml,
    #[serde(rename = "CAN_500ML")]
    #[strum(serialize = "CAN_500ML")]
    Can500Ml,
}

impl PackageType {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    pub fn size_liters(&self) -> f64 {
        match self {
            PackageType::KegHalfBarrel => 58.67,
            PackageType::KegQuarterBarrel => 29.34,
            PackageType::KegSixthBarrel => 19.55,
            PackageType::Keg50L => 50.0,
            PackageType::Keg30L => 30.0,
            PackageType::Keg20L => 20.0,
            PackageType::Bottle330Ml | PackageType::Can330Ml => 0.33,
            PackageType::Bottle355Ml | PackageType::Can355Ml => 0.355,
            PackageType::Bottle500Ml | PackageType::Can500Ml => 0.5,
            PackageType::Bottle750Ml => 0.75,
            PackageType::Can473Ml => 0.473,
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "packaging_runs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: String,
    /// Primary batch the run is billed against.
    pub batch_id: Uuid,
    pub lot_id: Option<Uuid>,
    /// Lot code scope used to total what has been packaged from a lot.
    pub lot_number: String,
    pub package_type: String,
    pub quantity: i32,
    pub volume_total: f64,
    pub performed_by: String,
    pub performed_at: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::batch::Entity",
        from = "Column::BatchId",
        to = "super::batch::Column::Id"
    )]
    Batch,
}

impl Related<super::batch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Batch.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn every_package_type_parses_from_its_wire_name() {
        for package_type in PackageType::iter() {
            let parsed: PackageType = package_type.as_str().parse().expect("known package type");
            assert_eq!(parsed, package_type);
            let json = serde_json::to_value(package_type).unwrap();
            assert_eq!(json, serde_json::json!(package_type.as_str()));
        }
    }

    #[test]
    fn unknown_package_type_is_rejected() {
        assert!("KEG_HOGSHEAD".parse::<PackageType>().is_err());
        assert!(serde_json::from_str::<PackageType>("\"CASK\"").is_err());
    }

    #[test]
    fn sizes_are_in_liters() {
        assert_eq!(PackageType::Keg50L.size_liters(), 50.0);
        assert_eq!(PackageType::Can500Ml.size_liters(), 0.5);
    }
}
