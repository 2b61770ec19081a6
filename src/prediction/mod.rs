//! Failure risk scoring engine

pub mod config;
pub mod grouping;
pub mod health_graph;
pub mod metrics;
pub mod scorer;
pub mod service;
pub mod summary;
pub mod window;

pub use config::{PredictionConfig, PredictionConfigOverride};
pub use service::PredictionService;
