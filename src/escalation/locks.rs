//! Per-entity serialisation of read-modify-write sequences

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::EntityType;

type Key = (EntityType, String);

#[derive(Default)]
pub struct EntityLocks {
    locks: Mutex<HashMap<Key, Arc<AsyncMutex<()>>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Held for the whole find-mutate-save of one entity
    pub async fn acquire(&self, entity_type: EntityType, entity_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            // drop entries nobody is holding or waiting on
            if locks.len() > 1024 {
                locks.retain(|_, l| Arc::strong_count(l) > 1);
            }
            locks
                .entry((entity_type, entity_id.to_string()))
                .or_default()
                .clone()
        };
        lock.lock_owned().await
    }
}
