//! Pure lineage logic: graph resolution, progress and lot code rules.
//!
//! Nothing in here touches the database. Commands and the read service load a
//! [`snapshot::LineageSnapshot`] or individual rows and hand them to these
//! functions.

pub mod lot_code;
pub mod policy;
pub mod progress;
pub mod resolver;
pub mod snapshot;

pub use policy::{BlendCompatibility, LineagePolicy};
pub use resolver::{LineageGraph, LotSelection, LotType, SourceLot};
pub use snapshot::LineageSnapshot;

/// Volumes closer than this are treated as equal.
pub const VOLUME_EPSILON: f64 = 1e-6;

/// Rounds a volume to milliliter precision.
pub fn round_volume(liters: f64) -> f64 {
    (liters * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_three_decimals() {
        assert_eq!(round_volume(24.0 * 0.355), 8.52);
        assert_eq!(round_volume(0.0004), 0.0);
        assert_eq!(round_volume(58.6749), 58.675);
    }
}
