//! Property-based tests for lot code and volume arithmetic.

use chrono::Utc;
use lot_lineage_api::{
    dto::lineage::VolumeInfo,
    entities::{lot, lot_batch},
    lineage::{
        lot_code::{child_code, default_suffix, is_valid_suffix, split_parent_code},
        resolver::{classify, lot_volume},
        round_volume, LotType,
    },
};
use proptest::prelude::*;
use rstest::rstest;
use uuid::Uuid;

fn parent_code_strategy() -> impl Strategy<Value = String> {
    "[A-Z]{2,4}-20[0-9]{2}-[0-9]{4}"
}

fn volume_strategy() -> impl Strategy<Value = f64> {
    (0u64..5_000_000).prop_map(|ml| ml as f64 / 1000.0)
}

fn plain_lot(planned: Option<f64>, actual: Option<f64>) -> lot::Model {
    let now = Utc::now();
    lot::Model {
        id: Uuid::new_v4(),
        tenant_id: "t".to_string(),
        lot_code: "L-1".to_string(),
        phase: None,
        status: "ACTIVE".to_string(),
        planned_volume: planned,
        actual_volume: actual,
        parent_lot_id: None,
        is_blend_result: false,
        blended_at: None,
        split_at: None,
        completed_at: None,
        version: 1,
        created_at: now,
        updated_at: now,
    }
}

fn contribution(lot_id: Uuid, batch_id: Uuid, volume: f64) -> lot_batch::Model {
    lot_batch::Model {
        id: Uuid::new_v4(),
        tenant_id: "t".to_string(),
        lot_id,
        batch_id,
        volume_contribution: volume,
        batch_percentage: 0.0,
        created_at: Utc::now(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn default_suffixes_are_valid_and_distinct(a in 0usize..2000, b in 0usize..2000) {
        let sa = default_suffix(a);
        prop_assert!(is_valid_suffix(&sa), "invalid suffix {}", sa);
        if a != b {
            prop_assert_ne!(sa, default_suffix(b));
        }
    }

    #[test]
    fn single_letter_children_point_back_to_parent(parent in parent_code_strategy(), i in 0usize..26) {
        let child = child_code(&parent, &default_suffix(i));
        prop_assert_eq!(split_parent_code(&child), Some(parent.as_str()));
    }

    #[test]
    fn rounding_is_idempotent_and_close(v in -1.0e6f64..1.0e6) {
        let r = round_volume(v);
        prop_assert_eq!(round_volume(r), r);
        prop_assert!((r - v).abs() <= 0.0005 + f64::EPSILON * v.abs());
    }

    #[test]
    fn volume_info_never_goes_negative(total in volume_strategy(), used in volume_strategy()) {
        let info = VolumeInfo::new(total, used);
        prop_assert!(info.remaining_volume >= 0.0);
        if used <= total {
            prop_assert!((info.remaining_volume - (total - used)).abs() < 1e-6);
        }
    }

    #[test]
    fn contributions_take_precedence_over_recorded_volume(
        parts in prop::collection::vec(1u64..1_000_000, 1..6),
        recorded in volume_strategy(),
    ) {
        let l = plain_lot(Some(recorded), Some(recorded));
        let rows: Vec<lot_batch::Model> = parts
            .iter()
            .map(|ml| contribution(l.id, Uuid::new_v4(), *ml as f64 / 1000.0))
            .collect();
        let expected: f64 = rows.iter().map(|c| c.volume_contribution).sum();
        prop_assert!((lot_volume(&l, &rows) - expected).abs() < 1e-6);
    }

    #[test]
    fn split_shares_conserve_volume(
        parts in prop::collection::vec(1u64..1_000_000, 1..5),
        draw_ml in 1u64..1_000_000,
    ) {
        let total: f64 = parts.iter().map(|ml| *ml as f64 / 1000.0).sum();
        let draw = draw_ml as f64 / 1000.0;
        let shares: f64 = parts
            .iter()
            .map(|ml| draw * (*ml as f64 / 1000.0) / total)
            .sum();
        prop_assert!((shares - draw).abs() < 1e-6);
    }
}

#[rstest]
#[case(Some(500.0), Some(480.0), 480.0)]
#[case(Some(500.0), None, 500.0)]
#[case(None, None, 0.0)]
fn lot_volume_falls_back_without_contributions(
    #[case] planned: Option<f64>,
    #[case] actual: Option<f64>,
    #[case] expected: f64,
) {
    let l = plain_lot(planned, actual);
    let none: Vec<lot_batch::Model> = Vec::new();
    assert_eq!(lot_volume(&l, &none), expected);
}

#[rstest]
#[case(false, false, 1, LotType::Single)]
#[case(false, true, 1, LotType::Split)]
#[case(true, false, 1, LotType::Blend)]
#[case(false, false, 2, LotType::Blend)]
#[case(false, true, 2, LotType::Blend)]
fn lot_type_follows_lineage_fields(
    #[case] is_blend_result: bool,
    #[case] has_parent: bool,
    #[case] batches: usize,
    #[case] expected: LotType,
) {
    let mut l = plain_lot(Some(100.0), None);
    l.is_blend_result = is_blend_result;
    l.parent_lot_id = has_parent.then(Uuid::new_v4);
    let rows: Vec<lot_batch::Model> = (0..batches)
        .map(|_| contribution(l.id, Uuid::new_v4(), 50.0))
        .collect();
    assert_eq!(classify(&l, &rows), expected);
}
