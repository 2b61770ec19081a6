//! Partition window data by aggregation key

use std::collections::HashMap;

use crate::models::{EntityType, TransactionFact};

/// Transactions of one entity in both windows
#[derive(Debug, Default)]
pub struct EntityGroup<'a> {
    pub recent: Vec<&'a TransactionFact>,
    pub baseline: Vec<&'a TransactionFact>,
}

/// Groups keyed by entity id. Only entities seen in the recent window are
/// returned; baseline-only entities have nothing to score.
pub fn group<'a>(
    entity_type: EntityType,
    recent: &'a [TransactionFact],
    baseline: &'a [TransactionFact],
) -> HashMap<String, EntityGroup<'a>> {
    group_by(recent, baseline, |tx| entity_type.key_of(tx))
}

/// Same as `group` with an arbitrary key, e.g. a merchant|provider pair
pub fn group_by<'a, F>(
    recent: &'a [TransactionFact],
    baseline: &'a [TransactionFact],
    key: F,
) -> HashMap<String, EntityGroup<'a>>
where
    F: Fn(&TransactionFact) -> String,
{
    let mut groups: HashMap<String, EntityGroup<'a>> = HashMap::new();

    for tx in recent {
        groups.entry(key(tx)).or_default().recent.push(tx);
    }

    for tx in baseline {
        if let Some(group) = groups.get_mut(&key(tx)) {
            group.baseline.push(tx);
        }
    }

    groups
}
