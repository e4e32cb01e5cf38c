//! Video ingestion backend: authenticated uploads are persisted to disk,
//! transcoded to HLS by an external engine and published to a catalog.

pub mod app;
pub mod common;
pub mod config;
pub mod docs;
pub mod infrastructure;
pub mod middleware;
pub mod modules;
pub mod routes;
pub mod state;
pub mod workers;
