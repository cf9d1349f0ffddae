pub mod batch;
pub mod batch_timeline_event;
pub mod gravity_reading;
pub mod lot;
pub mod lot_batch;
pub mod packaging_run;
pub mod recipe;
pub mod tank;
pub mod tank_assignment;

pub use batch::BatchStatus;
pub use lot::{LotPhase, LotStatus};
pub use packaging_run::PackageType;
pub use tank::{TankStatus, TankType};
pub use tank_assignment::AssignmentStatus;
