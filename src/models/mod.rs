pub mod day_record;
pub mod metrics;
pub mod range;
pub mod sensor;
pub mod task;
