pub mod alignment;
pub mod config;
pub mod dashboard;
pub mod dish_client;
pub mod error;
pub mod obstruction_log;
pub mod payload;
pub mod scheduler;
pub mod status;
pub mod summary;
