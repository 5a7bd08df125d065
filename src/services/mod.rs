pub mod aggregation;
pub mod api_client;
pub mod day_detail;
pub mod exclusion;
pub mod range_fetch;
pub mod sensor_stream;
