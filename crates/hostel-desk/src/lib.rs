pub mod config;
pub mod error;
pub mod hostel;
pub mod telemetry;
