use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::entities::{batch_timeline_event, packaging_run, LotPhase, LotStatus, PackageType};
use crate::lineage::lot_code::is_valid_suffix;
use crate::lineage::progress::ConditioningProgress;
use crate::lineage::{LotType, SourceLot};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct SplitTarget {
    pub tank_id: Uuid,
    /// Liters moved to this child lot
    #[schema(example = 500.0)]
    pub volume: f64,
    /// Child code suffix; defaults to A, B, … in target order
    #[schema(example = "A")]
    pub suffix: Option<String>,
}

/// Divide one lot into two or more child lots in separate tanks.
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct SplitLotRequest {
    pub source_lot_id: Uuid,
    #[validate(length(min = 2, max = 26), custom = "validate_split_targets")]
    pub targets: Vec<SplitTarget>,
    /// Reject the split if the lot has changed since this version was read
    pub expected_version: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct SourceVolume {
    /// Source lot id, or batch id when blending by batch
    pub source_id: Uuid,
    pub volume: f64,
}

/// Combine two or more lots into one result lot.
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct BlendLotsRequest {
    #[serde(default)]
    pub source_lot_ids: Vec<Uuid>,
    /// Each batch resolves to its visible ACTIVE lots
    #[serde(default)]
    pub source_batch_ids: Vec<Uuid>,
    pub target_tank_id: Uuid,
    /// Partial draws; sources not listed contribute their full volume
    #[serde(default)]
    #[validate(custom = "validate_source_volumes")]
    pub source_volumes: Vec<SourceVolume>,
    #[validate(length(min = 1, max = 64))]
    pub lot_code: Option<String>,
    #[serde(default)]
    pub allow_phase_override: bool,
    pub target_phase: Option<LotPhase>,
}

/// Record a packaging run against a lot.
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RecordPackagingRequest {
    pub lot_id: Option<Uuid>,
    /// Explicit lot code scope
    #[validate(length(min = 1, max = 64))]
    pub lot_number: Option<String>,
    pub batch_id: Option<Uuid>,
    #[serde(default)]
    pub batch_ids: Vec<Uuid>,
    pub package_type: PackageType,
    #[validate(range(min = 1, max = 1000000))]
    pub quantity: i32,
    /// Defaults to the calling user
    #[validate(length(min = 1, max = 255))]
    pub performed_by: Option<String>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

impl RecordPackagingRequest {
    /// `batch_id` and `batch_ids` merged, order kept, duplicates dropped.
    pub fn referenced_batch_ids(&self) -> Vec<Uuid> {
        let mut seen = HashSet::new();
        self.batch_id
            .iter()
            .chain(self.batch_ids.iter())
            .copied()
            .filter(|id| seen.insert(*id))
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CompleteLotRequest {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// Move a lot to a later phase, optionally into another tank.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct AdvanceLotPhaseRequest {
    /// Defaults to the next phase
    pub target_phase: Option<LotPhase>,
    pub tank_id: Option<Uuid>,
}

/// Schedule a brew: creates the batch and its initial lot.
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CreateBatchRequest {
    /// Defaults to the next BRW-{year}-{seq} number
    #[validate(length(min = 1, max = 64))]
    pub batch_number: Option<String>,
    pub recipe_id: Option<Uuid>,
    #[validate(range(min = 0.001))]
    #[schema(example = 1000.0)]
    pub volume: f64,
    /// Fermenter to start in; without one the batch stays PLANNED
    pub tank_id: Option<Uuid>,
    pub brew_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RecordGravityReadingRequest {
    #[validate(range(min = 0.9, max = 1.2))]
    #[schema(example = 1.052)]
    pub gravity: f64,
    #[validate(range(min = -10.0, max = 110.0))]
    pub temperature: Option<f64>,
    /// "OG" or "FG" in the notes mark original or final gravity
    #[validate(length(max = 500))]
    pub notes: Option<String>,
    pub recorded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ListLotsQuery {
    pub phase: Option<LotPhase>,
    pub status: Option<LotStatus>,
    /// Defaults to true; false also lists COMPLETED lots
    pub active_only: Option<bool>,
    pub lot_id: Option<Uuid>,
    pub lot_number: Option<String>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct CompleteLotOperation {
    pub lot_id: Uuid,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct AdvanceLotOperation {
    pub lot_id: Uuid,
    pub target_phase: Option<LotPhase>,
    pub tank_id: Option<Uuid>,
}

/// Body of `POST /operations`.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum LineageOperation {
    Split(SplitLotRequest),
    Blend(BlendLotsRequest),
    Package(RecordPackagingRequest),
    Complete(CompleteLotOperation),
    Advance(AdvanceLotOperation),
}

impl LineageOperation {
    pub fn name(&self) -> &'static str {
        match self {
            LineageOperation::Split(_) => "split",
            LineageOperation::Blend(_) => "blend",
            LineageOperation::Package(_) => "package",
            LineageOperation::Complete(_) => "complete",
            LineageOperation::Advance(_) => "advance",
        }
    }
}

impl Validate for LineageOperation {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        match self {
            LineageOperation::Split(req) => req.validate(),
            LineageOperation::Blend(req) => req.validate(),
            LineageOperation::Package(req) => req.validate(),
            LineageOperation::Complete(op) => op.validate(),
            LineageOperation::Advance(op) => op.validate(),
        }
    }
}

fn validate_split_targets(targets: &Vec<SplitTarget>) -> Result<(), ValidationError> {
    let mut tanks = HashSet::new();
    let mut suffixes = HashSet::new();

    for target in targets {
        if !target.volume.is_finite() || target.volume <= 0.0 {
            let mut err = ValidationError::new("volume");
            err.message = Some("every split volume must be greater than zero".into());
            return Err(err);
        }
        if !tanks.insert(target.tank_id) {
            let mut err = ValidationError::new("tank_id");
            err.message = Some("split targets must use distinct tanks".into());
            return Err(err);
        }
        if let Some(suffix) = &target.suffix {
            if !is_valid_suffix(suffix) {
                let mut err = ValidationError::new("suffix");
                err.message = Some("suffix must be 1-8 uppercase letters or digits".into());
                return Err(err);
            }
            if !suffixes.insert(suffix.as_str()) {
                let mut err = ValidationError::new("suffix");
                err.message = Some("split suffixes must be unique".into());
                return Err(err);
            }
        }
    }
    Ok(())
}

fn validate_source_volumes(volumes: &Vec<SourceVolume>) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for v in volumes {
        if !v.volume.is_finite() || v.volume <= 0.0 {
            let mut err = ValidationError::new("volume");
            err.message = Some("blend volumes must be greater than zero".into());
            return Err(err);
        }
        if !seen.insert(v.source_id) {
            let mut err = ValidationError::new("source_id");
            err.message = Some("each source may be listed once".into());
            return Err(err);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TankView {
    pub id: Uuid,
    pub name: String,
    pub tank_type: String,
    pub capacity_liters: Option<f64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LotBatchView {
    pub batch_id: Uuid,
    pub batch_number: Option<String>,
    pub status: Option<String>,
    pub volume_contribution: f64,
    pub batch_percentage: f64,
}

/// A lot with everything derived from its lineage.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LotView {
    pub id: Uuid,
    pub lot_code: String,
    pub lot_type: LotType,
    pub phase: Option<String>,
    pub status: String,
    /// Coarse completion percentage, 0-100
    pub progress: u8,
    pub source_batch_number: Option<String>,
    pub source_lots: Vec<SourceLot>,
    pub recipe_name: Option<String>,
    pub recipe_style: Option<String>,
    pub total_volume: f64,
    pub packaged_volume: f64,
    pub remaining_volume: f64,
    pub original_gravity: Option<f64>,
    pub current_gravity: Option<f64>,
    pub temperature: Option<f64>,
    pub tank: Option<TankView>,
    pub batches: Vec<LotBatchView>,
    pub parent_lot_id: Option<Uuid>,
    pub is_blend_result: bool,
    pub split_at: Option<DateTime<Utc>>,
    pub blended_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub conditioning: Option<ConditioningProgress>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct LotStats {
    /// Lots matching the filters before the limit is applied
    pub total: usize,
    pub total_volume: f64,
    pub by_phase: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LotListResponse {
    pub lots: Vec<LotView>,
    pub count: usize,
    pub stats: LotStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VolumeInfo {
    pub total_volume: f64,
    pub used_volume: f64,
    pub remaining_volume: f64,
}

impl VolumeInfo {
    pub fn new(total_volume: f64, used_volume: f64) -> Self {
        Self {
            total_volume,
            used_volume,
            remaining_volume: crate::lineage::round_volume((total_volume - used_volume).max(0.0)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SplitChild {
    pub id: Uuid,
    pub lot_code: String,
    pub volume: f64,
    pub tank_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SplitLotResult {
    pub parent_lot_id: Uuid,
    pub parent_lot_code: String,
    pub children: Vec<SplitChild>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BlendLotsResult {
    pub lot_id: Uuid,
    pub lot_code: String,
    pub volume: f64,
    pub phase: LotPhase,
    pub tank_id: Uuid,
    pub source_lot_ids: Vec<Uuid>,
    pub contributions: Vec<SourceLot>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PackagingRunView {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub lot_id: Option<Uuid>,
    pub lot_number: String,
    pub package_type: String,
    pub quantity: i32,
    pub volume_total: f64,
    pub performed_by: String,
    pub performed_at: DateTime<Utc>,
    pub notes: Option<String>,
}

impl From<packaging_run::Model> for PackagingRunView {
    fn from(m: packaging_run::Model) -> Self {
        Self {
            id: m.id,
            batch_id: m.batch_id,
            lot_id: m.lot_id,
            lot_number: m.lot_number,
            package_type: m.package_type,
            quantity: m.quantity,
            volume_total: m.volume_total,
            performed_by: m.performed_by,
            performed_at: m.performed_at,
            notes: m.notes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RecordPackagingResult {
    pub packaging_run: PackagingRunView,
    pub volume_info: VolumeInfo,
    pub lot_id: Uuid,
    pub lot_completed: bool,
    pub completed_batch_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CompleteLotResult {
    pub lot_id: Uuid,
    pub lot_code: String,
    pub completed_at: DateTime<Utc>,
    pub released_tank_ids: Vec<Uuid>,
    pub completed_batch_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AdvanceLotPhaseResult {
    pub lot_id: Uuid,
    pub lot_code: String,
    pub from_phase: Option<LotPhase>,
    pub to_phase: LotPhase,
    pub status: LotStatus,
    pub tank_id: Option<Uuid>,
    pub version: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateBatchResult {
    pub batch_id: Uuid,
    pub batch_number: String,
    pub status: String,
    pub lot_id: Uuid,
    pub lot_code: String,
    pub tank_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GravityReadingResult {
    pub reading_id: Uuid,
    pub batch_id: Uuid,
    pub gravity: f64,
    pub original_gravity: Option<f64>,
    pub current_gravity: Option<f64>,
    pub final_gravity: Option<f64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TimelineEntryView {
    pub id: Uuid,
    pub event_type: String,
    pub description: String,
    #[schema(value_type = Object)]
    pub metadata: Option<Value>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<batch_timeline_event::Model> for TimelineEntryView {
    fn from(m: batch_timeline_event::Model) -> Self {
        Self {
            id: m.id,
            event_type: m.event_type,
            description: m.description,
            metadata: m.metadata,
            created_by: m.created_by,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BatchTimelineResponse {
    pub batch_id: Uuid,
    pub batch_number: String,
    pub status: String,
    pub entries: Vec<TimelineEntryView>,
}

/// Result of `POST /operations`, tagged like the request.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum OperationResult {
    Split(SplitLotResult),
    Blend(BlendLotsResult),
    Package(RecordPackagingResult),
    Complete(CompleteLotResult),
    Advance(AdvanceLotPhaseResult),
}
