//! Phase, tank, gravity and progress derivation for lot views.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::{
    batch, gravity_reading, lot, tank_assignment, AssignmentStatus, BatchStatus, LotPhase,
};

/// Lot phase implied by a batch status.
pub fn expected_phase(status: BatchStatus) -> Option<LotPhase> {
    match status {
        BatchStatus::Fermenting => Some(LotPhase::Fermentation),
        BatchStatus::Conditioning => Some(LotPhase::Conditioning),
        BatchStatus::Ready => Some(LotPhase::Bright),
        BatchStatus::Packaging => Some(LotPhase::Packaging),
        BatchStatus::Planned | BatchStatus::Completed => None,
    }
}

/// Tank currently holding the lot.
///
/// `assignments` must be newest first. Completed lots hold no tank.
pub fn resolve_tank_id(
    lot: &lot::Model,
    assignments: &[&tank_assignment::Model],
    primary_batch: Option<&batch::Model>,
) -> Option<Uuid> {
    if lot.is_completed() {
        return None;
    }

    let wanted = primary_batch
        .and_then(|b| b.batch_status())
        .and_then(expected_phase)
        .or_else(|| lot.lot_phase());

    let not_completed =
        |a: &&&tank_assignment::Model| a.assignment_status() != Some(AssignmentStatus::Completed);

    wanted
        .and_then(|phase| {
            assignments
                .iter()
                .filter(not_completed)
                .find(|a| a.assignment_phase() == Some(phase))
        })
        .or_else(|| assignments.iter().find(|a| a.is_open()))
        .map(|a| a.tank_id)
        .or_else(|| primary_batch.and_then(|b| b.tank_id))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, ToSchema)]
pub struct GravitySummary {
    pub original_gravity: Option<f64>,
    pub current_gravity: Option<f64>,
    pub temperature: Option<f64>,
}

/// True when the reading's notes carry `token` as a standalone word.
pub fn notes_mention(reading: &gravity_reading::Model, token: &str) -> bool {
    reading.notes.as_deref().is_some_and(|notes| {
        notes
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|word| word.eq_ignore_ascii_case(token))
    })
}

/// `readings` must be oldest first.
pub fn summarize_gravity(
    batch: Option<&batch::Model>,
    readings: &[&gravity_reading::Model],
) -> GravitySummary {
    let latest = readings.last();

    let original_gravity = batch.and_then(|b| b.original_gravity).or_else(|| {
        readings
            .iter()
            .find(|r| notes_mention(r, "OG"))
            .or_else(|| readings.first())
            .map(|r| r.gravity)
    });

    GravitySummary {
        original_gravity,
        current_gravity: batch
            .and_then(|b| b.current_gravity)
            .or_else(|| latest.map(|r| r.gravity)),
        temperature: latest.and_then(|r| r.temperature),
    }
}

/// Coarse completion percentage for a lot.
pub fn phase_progress(lot: &lot::Model, total_volume: f64, packaged_volume: f64) -> u8 {
    if lot.is_completed() {
        return 100;
    }
    match lot.lot_phase() {
        None => 10,
        Some(LotPhase::Fermentation) => 40,
        Some(LotPhase::Conditioning) => 70,
        Some(LotPhase::Bright) => 85,
        Some(LotPhase::Packaging) => {
            if total_volume <= 0.0 {
                0
            } else {
                (packaged_volume / total_volume * 100.0).round().clamp(0.0, 99.0) as u8
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct ConditioningProgress {
    pub days_elapsed: i64,
    pub duration_days: u32,
    pub progress: u8,
    pub days_remaining: i64,
}

pub fn conditioning_progress(
    started_at: DateTime<Utc>,
    now: DateTime<Utc>,
    duration_days: u32,
) -> ConditioningProgress {
    let days_elapsed = (now - started_at).num_days().max(0);
    let duration = i64::from(duration_days.max(1));
    let progress = ((days_elapsed as f64 / duration as f64) * 100.0)
        .round()
        .min(100.0) as u8;

    ConditioningProgress {
        days_elapsed,
        duration_days,
        progress,
        days_remaining: (i64::from(duration_days) - days_elapsed).max(0),
    }
}

/// Conditioning metric for a live lot in CONDITIONING with a dated assignment.
pub fn conditioning_for(
    lot: &lot::Model,
    assignments: &[&tank_assignment::Model],
    now: DateTime<Utc>,
    duration_days: u32,
) -> Option<ConditioningProgress> {
    if lot.is_completed() || lot.lot_phase() != Some(LotPhase::Conditioning) {
        return None;
    }
    assignments
        .iter()
        .filter(|a| a.assignment_phase() == Some(LotPhase::Conditioning))
        .find_map(|a| a.started_at())
        .map(|start| conditioning_progress(start, now, duration_days))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lineage::resolver::tests::{sample_batch, sample_lot};
    use chrono::Duration;
    use rstest::rstest;

    fn assignment(
        lot: &lot::Model,
        phase: &str,
        status: &str,
        created_at: DateTime<Utc>,
    ) -> tank_assignment::Model {
        tank_assignment::Model {
            id: Uuid::new_v4(),
            tenant_id: "t".into(),
            tank_id: Uuid::new_v4(),
            lot_id: lot.id,
            phase: phase.into(),
            status: status.into(),
            planned_start: None,
            planned_end: None,
            actual_start: Some(created_at),
            actual_end: None,
            planned_volume: None,
            actual_volume: None,
            version: 1,
            created_at,
            updated_at: created_at,
        }
    }

    fn reading(gravity: f64, notes: Option<&str>, at: DateTime<Utc>) -> gravity_reading::Model {
        gravity_reading::Model {
            id: Uuid::new_v4(),
            tenant_id: "t".into(),
            batch_id: Uuid::new_v4(),
            gravity,
            temperature: Some(18.0 + gravity),
            notes: notes.map(str::to_string),
            recorded_by: None,
            recorded_at: at,
        }
    }

    #[rstest]
    #[case(None, "ACTIVE", 10)]
    #[case(Some("FERMENTATION"), "ACTIVE", 40)]
    #[case(Some("CONDITIONING"), "PLANNED", 70)]
    #[case(Some("BRIGHT"), "ACTIVE", 85)]
    #[case(Some("BRIGHT"), "COMPLETED", 100)]
    fn fixed_progress_by_phase(
        #[case] phase: Option<&str>,
        #[case] status: &str,
        #[case] expected: u8,
    ) {
        let mut l = sample_lot("X", status);
        l.phase = phase.map(str::to_string);
        assert_eq!(phase_progress(&l, 100.0, 0.0), expected);
    }

    #[rstest]
    #[case(100.0, 0.0, 0)]
    #[case(100.0, 33.3, 33)]
    #[case(100.0, 99.6, 99)]
    #[case(100.0, 250.0, 99)]
    #[case(0.0, 10.0, 0)]
    fn packaging_progress_is_proportional_and_capped(
        #[case] total: f64,
        #[case] packaged: f64,
        #[case] expected: u8,
    ) {
        let mut l = sample_lot("X", "ACTIVE");
        l.phase = Some("PACKAGING".into());
        assert_eq!(phase_progress(&l, total, packaged), expected);
    }

    #[rstest]
    #[case(0, 7, 0, 7)]
    #[case(3, 7, 43, 4)]
    #[case(7, 7, 100, 0)]
    #[case(12, 7, 100, 0)]
    fn conditioning_metric(
        #[case] elapsed: i64,
        #[case] duration: u32,
        #[case] progress: u8,
        #[case] remaining: i64,
    ) {
        let now = Utc::now();
        let out = conditioning_progress(now - Duration::days(elapsed), now, duration);
        assert_eq!(out.days_elapsed, elapsed);
        assert_eq!(out.progress, progress);
        assert_eq!(out.days_remaining, remaining);
    }

    #[test]
    fn completed_lot_reports_no_tank() {
        let l = sample_lot("X", "COMPLETED");
        let a = assignment(&l, "CONDITIONING", "ACTIVE", Utc::now());
        assert_eq!(resolve_tank_id(&l, &[&a], None), None);
    }

    #[test]
    fn tank_prefers_assignment_matching_batch_phase() {
        let l = sample_lot("X", "ACTIVE");
        let mut b = sample_batch("B");
        b.status = "READY".into();
        b.tank_id = Some(Uuid::new_v4());
        let now = Utc::now();
        let bright = assignment(&l, "BRIGHT", "PLANNED", now - Duration::hours(1));
        let cond = assignment(&l, "CONDITIONING", "ACTIVE", now);

        assert_eq!(
            resolve_tank_id(&l, &[&cond, &bright], Some(&b)),
            Some(bright.tank_id)
        );

        b.status = "PLANNED".into();
        assert_eq!(
            resolve_tank_id(&l, &[&cond, &bright], Some(&b)),
            Some(cond.tank_id),
            "falls back to the lot's own phase"
        );

        let done = assignment(&l, "CONDITIONING", "COMPLETED", now);
        assert_eq!(resolve_tank_id(&l, &[&done], Some(&b)), b.tank_id);
    }

    #[test]
    fn gravity_prefers_batch_values_then_readings() {
        let now = Utc::now();
        let first = reading(1.060, None, now - Duration::days(3));
        let og = reading(1.058, Some("OG after top-up"), now - Duration::days(2));
        let last = reading(1.012, Some("fg check"), now);
        let readings = [&first, &og, &last];

        let summary = summarize_gravity(None, &readings);
        assert_eq!(summary.original_gravity, Some(1.058));
        assert_eq!(summary.current_gravity, Some(1.012));
        assert_eq!(summary.temperature, last.temperature);

        let mut b = sample_batch("B");
        b.original_gravity = Some(1.065);
        b.current_gravity = Some(1.020);
        let summary = summarize_gravity(Some(&b), &readings);
        assert_eq!(summary.original_gravity, Some(1.065));
        assert_eq!(summary.current_gravity, Some(1.020));

        let summary = summarize_gravity(None, &[&first, &last]);
        assert_eq!(summary.original_gravity, Some(1.060), "earliest reading");
        assert_eq!(summarize_gravity(None, &[]), GravitySummary::default());
    }

    #[test]
    fn og_token_must_be_a_word() {
        let r = reading(1.05, Some("fog on the glass"), Utc::now());
        assert!(!notes_mention(&r, "OG"));
        let r = reading(1.05, Some("og/temp"), Utc::now());
        assert!(notes_mention(&r, "OG"));
    }

    #[test]
    fn conditioning_needs_conditioning_phase() {
        let mut l = sample_lot("X", "ACTIVE");
        let started = Utc::now() - Duration::days(2);
        let a = assignment(&l, "CONDITIONING", "ACTIVE", started);
        let out = conditioning_for(&l, &[&a], Utc::now(), 7).expect("metric");
        assert_eq!(out.days_elapsed, 2);
        assert_eq!(out.days_remaining, 5);

        l.phase = Some("BRIGHT".into());
        assert!(conditioning_for(&l, &[&a], Utc::now(), 7).is_none());
    }
}
