use std::collections::HashMap;

use crate::entities::{batch, gravity_reading, lot, lot_batch, recipe, tank, tank_assignment};

/// Everything the read path needs for one tenant, loaded up front.
#[derive(Debug, Clone, Default)]
pub struct LineageSnapshot {
    pub lots: Vec<lot::Model>,
    pub lot_batches: Vec<lot_batch::Model>,
    pub batches: Vec<batch::Model>,
    pub recipes: Vec<recipe::Model>,
    pub assignments: Vec<tank_assignment::Model>,
    pub tanks: Vec<tank::Model>,
    /// Ordered by `recorded_at` ascending.
    pub readings: Vec<gravity_reading::Model>,
    /// Sum of packaging run volumes keyed by lot number.
    pub packaged_by_lot_code: HashMap<String, f64>,
}
