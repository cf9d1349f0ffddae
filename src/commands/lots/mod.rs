pub mod advance_lot_phase_command;
pub mod blend_lots_command;
pub mod complete_lot_command;
pub(crate) mod lifecycle;
pub mod record_packaging_command;
pub mod split_lot_command;

pub use advance_lot_phase_command::AdvanceLotPhaseCommand;
pub use blend_lots_command::BlendLotsCommand;
pub use complete_lot_command::CompleteLotCommand;
pub use record_packaging_command::RecordPackagingCommand;
pub use split_lot_command::SplitLotCommand;
