//! Escalation timing and channel selection

use std::collections::HashMap;

use chrono::Duration;

use crate::models::{ChannelType, EntityType};

pub const DEFAULT_RETRY_MINUTES: i64 = 10;
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;
pub const DEFAULT_SUPPRESSION_HOURS: i64 = 24;
pub const DEFAULT_RETENTION_DAYS: i64 = 7;

/// Guard retry cadence and dismissal suppression for one entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationRules {
    pub retry_interval: Duration,
    pub max_attempts: i32,
    pub suppression_window: Duration,
}

impl Default for EscalationRules {
    fn default() -> Self {
        Self {
            retry_interval: Duration::minutes(DEFAULT_RETRY_MINUTES),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            suppression_window: Duration::hours(DEFAULT_SUPPRESSION_HOURS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationPolicy {
    pub defaults: EscalationRules,
    pub overrides: HashMap<EntityType, EscalationRules>,
    /// How long resolved records are kept
    pub retention: Duration,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            defaults: EscalationRules::default(),
            overrides: HashMap::new(),
            retention: Duration::days(DEFAULT_RETENTION_DAYS),
        }
    }
}

impl EscalationPolicy {
    pub fn rules_for(&self, entity_type: EntityType) -> EscalationRules {
        self.overrides
            .get(&entity_type)
            .copied()
            .unwrap_or(self.defaults)
    }
}

/// Ordered channel lists. Only channels the dispatcher reports as
/// available are used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPolicy {
    pub guard: Vec<ChannelType>,
    pub escalation: Vec<ChannelType>,
}

impl Default for ChannelPolicy {
    fn default() -> Self {
        Self {
            guard: vec![ChannelType::Gmail, ChannelType::Whatsapp],
            escalation: vec![ChannelType::Gmail, ChannelType::Whatsapp],
        }
    }
}

impl ChannelPolicy {
    pub fn usable(configured: &[ChannelType], available: &[ChannelType]) -> Vec<ChannelType> {
        configured
            .iter()
            .copied()
            .filter(|c| available.contains(c))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_per_entity_type() {
        let mut policy = EscalationPolicy::default();
        policy.overrides.insert(
            EntityType::Provider,
            EscalationRules {
                max_attempts: 1,
                ..EscalationRules::default()
            },
        );

        assert_eq!(policy.rules_for(EntityType::Provider).max_attempts, 1);
        assert_eq!(policy.rules_for(EntityType::Merchant).max_attempts, 3);
        assert_eq!(policy.rules_for(EntityType::Merchant).retry_interval, Duration::minutes(10));
    }

    #[test]
    fn test_usable_keeps_configured_order() {
        let usable = ChannelPolicy::usable(
            &[ChannelType::Whatsapp, ChannelType::Slack, ChannelType::Gmail],
            &[ChannelType::Gmail, ChannelType::Whatsapp],
        );
        assert_eq!(usable, vec![ChannelType::Whatsapp, ChannelType::Gmail]);
    }
}
