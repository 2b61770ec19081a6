//! Risk notification escalation state machine

pub mod channels;
pub mod locks;
pub mod messages;
pub mod orchestrator;
pub mod policy;

#[cfg(test)]
mod tests;

pub use orchestrator::{DetectOutcome, OrchestratorSettings, RetryReport, RiskOrchestrator, SweepReport};
pub use policy::{ChannelPolicy, EscalationPolicy, EscalationRules};
