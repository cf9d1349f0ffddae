pub mod create_batch_command;
pub mod record_gravity_reading_command;

pub use create_batch_command::CreateBatchCommand;
pub use record_gravity_reading_command::RecordGravityReadingCommand;
