pub mod calc;
pub mod config;
pub mod db;
pub mod grades;
pub mod ipc;
pub mod ranking;
pub mod reports;
pub mod scores;
pub mod store;
pub mod telemetry;
pub mod weights;
