pub mod app;
pub mod config;
pub mod error;
pub mod google;
pub mod narrative;
pub mod pdf;
pub mod routes;
pub mod service;
pub mod state;
