pub mod logger;
pub mod stomp;
