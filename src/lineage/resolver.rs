//! Graph resolution over a tenant snapshot.
//!
//! Resolution never fails: dangling references and unparseable status or
//! phase strings degrade to `None`, `single` or "not visible".

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use strum::{Display, IntoStaticStr};
use utoipa::ToSchema;
use uuid::Uuid;

use super::lot_code::{legacy_parent_codes, split_parent_code};
use super::snapshot::LineageSnapshot;
use crate::entities::{
    batch, gravity_reading, lot, lot_batch, recipe, tank, tank_assignment, LotStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema, Display, IntoStaticStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LotType {
    Single,
    Split,
    Blend,
}

impl LotType {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// One contributing batch of a blended lot.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SourceLot {
    pub batch_id: Uuid,
    pub batch_number: Option<String>,
    pub volume_contribution: f64,
    pub batch_percentage: f64,
}

/// Which lots a query asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum LotSelection {
    /// Living lots, optionally with completed history. Consumed parents are
    /// always hidden.
    Active { include_completed: bool },
    /// Direct lookup; returns the lot whatever its status.
    ById(Uuid),
    ByCode(String),
}

/// Ids of lots that were split: every explicit `parent_lot_id`, plus parents
/// recovered from legacy `{code}-{A..Z}` naming among `lots`.
pub fn consumed_lot_ids(lots: &[lot::Model]) -> HashSet<Uuid> {
    let mut consumed: HashSet<Uuid> = lots.iter().filter_map(|l| l.parent_lot_id).collect();

    let by_code: HashMap<&str, Uuid> = lots
        .iter()
        .map(|l| (l.lot_code.as_str(), l.id))
        .collect();
    let known: HashSet<&str> = by_code.keys().copied().collect();
    let candidates = lots
        .iter()
        .filter(|l| l.parent_lot_id.is_none() && !l.is_blend_result)
        .map(|l| l.lot_code.as_str());

    for parent_code in legacy_parent_codes(candidates, &known) {
        if let Some(id) = by_code.get(parent_code.as_str()) {
            consumed.insert(*id);
        }
    }

    consumed
}

/// Total volume of a lot: positive contribution sum, else actual, else planned.
pub fn lot_volume<'b, I>(lot: &lot::Model, contributions: I) -> f64
where
    I: IntoIterator<Item = &'b lot_batch::Model>,
{
    let sum: f64 = contributions
        .into_iter()
        .map(|c| c.volume_contribution)
        .sum();
    if sum > 0.0 {
        sum
    } else {
        lot.actual_volume.or(lot.planned_volume).unwrap_or(0.0)
    }
}

/// Largest contribution; ties go to the earliest row.
pub fn primary_contribution<'b, I>(contributions: I) -> Option<&'b lot_batch::Model>
where
    I: IntoIterator<Item = &'b lot_batch::Model>,
{
    contributions.into_iter().max_by(|a, b| {
        a.volume_contribution
            .total_cmp(&b.volume_contribution)
            .then(b.created_at.cmp(&a.created_at))
    })
}

pub fn classify<'b, I>(lot: &lot::Model, contributions: I) -> LotType
where
    I: IntoIterator<Item = &'b lot_batch::Model>,
{
    let distinct: HashSet<Uuid> = contributions.into_iter().map(|c| c.batch_id).collect();
    if lot.is_blend_result || distinct.len() > 1 {
        LotType::Blend
    } else if lot.parent_lot_id.is_some() {
        LotType::Split
    } else {
        LotType::Single
    }
}

/// Indexed view of a [`LineageSnapshot`].
pub struct LineageGraph<'a> {
    snapshot: &'a LineageSnapshot,
    lots_by_id: HashMap<Uuid, &'a lot::Model>,
    lots_by_code: HashMap<&'a str, &'a lot::Model>,
    contributions: HashMap<Uuid, Vec<&'a lot_batch::Model>>,
    batches: HashMap<Uuid, &'a batch::Model>,
    recipes: HashMap<Uuid, &'a recipe::Model>,
    tanks: HashMap<Uuid, &'a tank::Model>,
    assignments: HashMap<Uuid, Vec<&'a tank_assignment::Model>>,
    readings: HashMap<Uuid, Vec<&'a gravity_reading::Model>>,
    consumed: HashSet<Uuid>,
}

impl<'a> LineageGraph<'a> {
    pub fn new(snapshot: &'a LineageSnapshot) -> Self {
        let mut contributions: HashMap<Uuid, Vec<&lot_batch::Model>> = HashMap::new();
        for lb in &snapshot.lot_batches {
            contributions.entry(lb.lot_id).or_default().push(lb);
        }

        let mut assignments: HashMap<Uuid, Vec<&tank_assignment::Model>> = HashMap::new();
        for a in &snapshot.assignments {
            assignments.entry(a.lot_id).or_default().push(a);
        }
        for list in assignments.values_mut() {
            list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }

        let mut readings: HashMap<Uuid, Vec<&gravity_reading::Model>> = HashMap::new();
        for r in &snapshot.readings {
            readings.entry(r.batch_id).or_default().push(r);
        }
        for list in readings.values_mut() {
            list.sort_by(|a, b| a.recorded_at.cmp(&b.recorded_at));
        }

        Self {
            snapshot,
            lots_by_id: snapshot.lots.iter().map(|l| (l.id, l)).collect(),
            lots_by_code: snapshot
                .lots
                .iter()
                .map(|l| (l.lot_code.as_str(), l))
                .collect(),
            contributions,
            batches: snapshot.batches.iter().map(|b| (b.id, b)).collect(),
            recipes: snapshot.recipes.iter().map(|r| (r.id, r)).collect(),
            tanks: snapshot.tanks.iter().map(|t| (t.id, t)).collect(),
            assignments,
            readings,
            consumed: consumed_lot_ids(&snapshot.lots),
        }
    }

    pub fn is_consumed(&self, lot_id: Uuid) -> bool {
        self.consumed.contains(&lot_id)
    }

    /// Lots matching `selection`, in snapshot order.
    pub fn select(&self, selection: &LotSelection) -> Vec<&'a lot::Model> {
        match selection {
            LotSelection::ById(id) => self.lots_by_id.get(id).copied().into_iter().collect(),
            LotSelection::ByCode(code) => self
                .lots_by_code
                .get(code.as_str())
                .copied()
                .into_iter()
                .collect(),
            LotSelection::Active { include_completed } => self
                .snapshot
                .lots
                .iter()
                .filter(|l| !self.is_consumed(l.id))
                .filter(|l| match l.lot_status() {
                    Some(status) if status.is_live() => true,
                    Some(LotStatus::Completed) => *include_completed,
                    _ => false,
                })
                .collect(),
        }
    }

    pub fn lot(&self, id: Uuid) -> Option<&'a lot::Model> {
        self.lots_by_id.get(&id).copied()
    }

    pub fn contributions(&self, lot_id: Uuid) -> &[&'a lot_batch::Model] {
        self.contributions
            .get(&lot_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn lot_type(&self, lot: &lot::Model) -> LotType {
        classify(lot, self.contributions(lot.id).iter().copied())
    }

    pub fn lot_volume(&self, lot: &lot::Model) -> f64 {
        lot_volume(lot, self.contributions(lot.id).iter().copied())
    }

    pub fn packaged_volume(&self, lot: &lot::Model) -> f64 {
        self.snapshot
            .packaged_by_lot_code
            .get(&lot.lot_code)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn batch(&self, id: Uuid) -> Option<&'a batch::Model> {
        self.batches.get(&id).copied()
    }

    pub fn tank(&self, id: Uuid) -> Option<&'a tank::Model> {
        self.tanks.get(&id).copied()
    }

    pub fn recipe_for(&self, batch: &batch::Model) -> Option<&'a recipe::Model> {
        batch
            .recipe_id
            .and_then(|id| self.recipes.get(&id).copied())
    }

    /// The lot's assignments, newest first.
    pub fn assignments(&self, lot_id: Uuid) -> &[&'a tank_assignment::Model] {
        self.assignments
            .get(&lot_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The batch's readings, oldest first.
    pub fn readings(&self, batch_id: Uuid) -> &[&'a gravity_reading::Model] {
        self.readings
            .get(&batch_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn primary_batch(&self, lot: &lot::Model) -> Option<&'a batch::Model> {
        primary_contribution(self.contributions(lot.id).iter().copied())
            .and_then(|c| self.batch(c.batch_id))
    }

    /// Batch number the lot traces back to.
    ///
    /// Split lots report their parent's primary batch; blends have no single
    /// source and report `None`.
    pub fn source_batch_number(&self, lot: &lot::Model) -> Option<String> {
        match self.lot_type(lot) {
            LotType::Blend => None,
            LotType::Split => lot
                .parent_lot_id
                .and_then(|pid| self.lot(pid))
                .or_else(|| {
                    split_parent_code(&lot.lot_code).and_then(|c| self.lots_by_code.get(c).copied())
                })
                .and_then(|parent| self.primary_batch(parent))
                .map(|b| b.batch_number.clone()),
            LotType::Single => self.primary_batch(lot).map(|b| b.batch_number.clone()),
        }
    }

    /// One entry per contributing row of a blend; empty for other lots.
    pub fn source_lots(&self, lot: &lot::Model) -> Vec<SourceLot> {
        if self.lot_type(lot) != LotType::Blend {
            return Vec::new();
        }
        self.contributions(lot.id)
            .iter()
            .map(|c| SourceLot {
                batch_id: c.batch_id,
                batch_number: self.batch(c.batch_id).map(|b| b.batch_number.clone()),
                volume_contribution: c.volume_contribution,
                batch_percentage: c.batch_percentage,
            })
            .collect()
    }

    /// Non-consumed lots holding volume from `batch_id`.
    pub fn lots_descending_from_batch(&self, batch_id: Uuid) -> Vec<&'a lot::Model> {
        self.snapshot
            .lot_batches
            .iter()
            .filter(|lb| lb.batch_id == batch_id)
            .filter_map(|lb| self.lot(lb.lot_id))
            .filter(|l| !self.is_consumed(l.id))
            .fold(Vec::new(), |mut acc, l| {
                if !acc.iter().any(|seen: &&lot::Model| seen.id == l.id) {
                    acc.push(l);
                }
                acc
            })
    }
}
