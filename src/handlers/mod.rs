//! HTTP handlers

pub mod health;
pub mod health_graph;
pub mod predictions;
pub mod risk_notifications;
