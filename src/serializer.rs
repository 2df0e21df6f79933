use std::collections::HashSet;
use std::sync::Arc;

use crate::errors::Result;
use crate::payload::{EntityKey, PrimaryObject, RelatedObjectTable};
use crate::record::Record;

/// What a related-type delegate produced for one batch.
///
/// `Plain` delegates emit the final per-id representation directly and have
/// no related-object table of their own; `Normalized` delegates are
/// themselves normalizing serializers whose nested table must be merged into
/// the caller's output.
pub enum BatchOutput {
    Plain(Vec<PrimaryObject>),
    Normalized {
        objects: Vec<PrimaryObject>,
        related: RelatedObjectTable,
    },
}

/// Serializes the full accumulated batch of one related type in a single
/// pass.  One call per related type per traversal level; an entity
/// referenced by several sibling fields is serialized once.
pub trait RelatedSerializer: Send + Sync {
    fn serialize_batch(
        &self,
        records: &[Arc<dyn Record>],
        traversal: &mut Traversal,
    ) -> Result<BatchOutput>;
}

/// Call-scoped traversal state, created fresh per top-level normalization
/// and passed by reference down the recursion, never held as ambient or
/// global state, so independent top-level calls share nothing.
///
/// The collected set is the cycle breaker: a `(type_name, id)` is marked
/// when it is first queued for serialization, and any later encounter on any
/// path contributes only its id reference instead of re-entering recursion.
/// First seen wins.
#[derive(Default)]
pub struct Traversal {
    collected: HashSet<EntityKey>,
}

impl Traversal {
    pub fn new() -> Traversal {
        Traversal {
            collected: HashSet::new(),
        }
    }

    /// Marks the key as collected.  Returns false if it already was, in
    /// which case the caller must emit only an id reference.
    pub fn mark_collected(&mut self, key: EntityKey) -> bool {
        self.collected.insert(key)
    }

    pub fn is_collected(&self, key: &EntityKey) -> bool {
        self.collected.contains(key)
    }
}

/// Adapter for plain (non-normalizing) delegates: a render function applied
/// per record, yielding the final per-id representation.
pub struct PlainSerializer<F> {
    render: F,
}

impl<F> PlainSerializer<F>
where
    F: Fn(&dyn Record) -> Result<PrimaryObject> + Send + Sync,
{
    pub fn new(render: F) -> PlainSerializer<F> {
        PlainSerializer { render }
    }
}

impl<F> RelatedSerializer for PlainSerializer<F>
where
    F: Fn(&dyn Record) -> Result<PrimaryObject> + Send + Sync,
{
    fn serialize_batch(
        &self,
        records: &[Arc<dyn Record>],
        _traversal: &mut Traversal,
    ) -> Result<BatchOutput> {
        let mut objects = Vec::with_capacity(records.len());
        for record in records {
            objects.push((self.render)(record.as_ref())?);
        }
        Ok(BatchOutput::Plain(objects))
    }
}
