pub mod analysis;
pub mod analytics;
pub mod comparison;
pub mod config;
pub mod error;
pub mod mock;
pub mod report;
