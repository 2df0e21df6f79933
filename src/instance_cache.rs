use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use ustr::Ustr;

use crate::payload::id_key;
use crate::record::Record;
use crate::serializer::RelatedSerializer;

/// The instances of one related type pending batch serialization, in the
/// order they were first encountered, plus the delegate that will serialize
/// them.
pub struct PendingBatch {
    pub serializer: Arc<dyn RelatedSerializer>,
    pub instances: Vec<Arc<dyn Record>>,
    seen: HashSet<String>,
}

/// Accumulates, per related entity type, the full set of instances that must
/// be serialized for the current record (across all of its sibling relation
/// fields) before any of them are serialized.  Registration dedups by
/// stringified id, so an instance reached through several sibling fields is
/// queued once.  The first registration of a type fixes its delegate.
pub struct InstanceCache {
    pending: BTreeMap<Ustr, PendingBatch>,
}

impl InstanceCache {
    pub fn new() -> InstanceCache {
        InstanceCache {
            pending: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Queues an instance for its type's batch.  Returns false if an
    /// instance with the same id was already queued.
    pub fn register(
        &mut self,
        related_type: Ustr,
        serializer: &Arc<dyn RelatedSerializer>,
        instance: Arc<dyn Record>,
    ) -> bool {
        let batch = self
            .pending
            .entry(related_type)
            .or_insert_with(|| PendingBatch {
                serializer: serializer.clone(),
                instances: Vec::new(),
                seen: HashSet::new(),
            });
        if !batch.seen.insert(id_key(&instance.id())) {
            return false;
        }
        batch.instances.push(instance);
        true
    }

    /// Consumes the cache, yielding each type's batch in deterministic type
    /// order.
    pub fn into_batches(self) -> BTreeMap<Ustr, PendingBatch> {
        self.pending
    }
}

impl Default for InstanceCache {
    fn default() -> InstanceCache {
        InstanceCache::new()
    }
}
