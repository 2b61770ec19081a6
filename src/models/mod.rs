//! Data models

pub mod entity;
pub mod transaction;
pub mod prediction;
pub mod health_graph;
pub mod alert;
pub mod user;
pub mod notification;
pub mod risk_notification;

pub use entity::*;
pub use transaction::*;
pub use prediction::*;
pub use health_graph::*;
pub use alert::*;
pub use user::*;
pub use notification::*;
pub use risk_notification::*;
