//! arcus: floor-plan document ingestion and detection-layer service.
//!
//! Plans arrive as rendered page images, uploaded in batches and reassembled
//! server-side. Each page carries up to seven detection overlays; the layer
//! resolver picks which one the viewer shows for the current toggles.

pub mod cli;
pub mod config;
pub mod ingest;
pub mod layers;
pub mod models;
pub mod repository;
pub mod schema;
pub mod server;
pub mod services;
