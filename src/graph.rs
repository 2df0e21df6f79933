use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::trace;
use ustr::Ustr;

use crate::collection::CollectionNormalizer;
use crate::errors::{NormalizeError, Result, WriteOp};
use crate::instance_cache::InstanceCache;
use crate::merger::merge_related_objects;
use crate::payload::{
    id_key, EntityKey, NormalizedPayload, PrimaryObject, RelatedObjectTable, RootObject,
};
use crate::record::{FieldKind, Record, RecordRef, RecordView, Relation, Resolved};
use crate::serializer::{BatchOutput, RelatedSerializer, Traversal};

/// The recursive core: serializes one record into a primary object plus the
/// flat table of every related entity reachable from it.  Read-only by
/// contract; the write-shaped surface (`with_input`, `validate`, `create`,
/// `update`) exists only to be refused.
#[derive(Clone)]
pub struct GraphNormalizer {
    view: Arc<dyn RecordView>,
}

impl GraphNormalizer {
    pub fn new(view: Arc<dyn RecordView>) -> GraphNormalizer {
        GraphNormalizer { view }
    }

    /// Constructing a normalizer around input data signals write intent,
    /// which this serializer refuses before doing any work.
    pub fn with_input(view: Arc<dyn RecordView>, _input: Value) -> Result<GraphNormalizer> {
        Err(NormalizeError::ProhibitedOperation {
            operation: WriteOp::Deserialization,
            type_name: view.type_name(),
        })
    }

    pub fn type_name(&self) -> Ustr {
        self.view.type_name()
    }

    /// Wraps this normalizer for an ordered collection of records, the way
    /// the single-record form serializes its own related batches.
    pub fn many(&self) -> CollectionNormalizer {
        CollectionNormalizer::new(self.clone())
    }

    /// Sole entry point for a single root record.
    pub fn normalize(&self, record: &dyn Record) -> Result<NormalizedPayload> {
        let mut traversal = Traversal::new();
        let (object, related_objects) = self.normalize_one(record, &mut traversal)?;
        Ok(NormalizedPayload {
            object: RootObject::One(object),
            related_objects,
        })
    }

    /// Serializes one record: every declared field in declaration order,
    /// relations replaced by id references, then one batch serialization per
    /// related type accumulated across the record's sibling fields, with
    /// each batch's own related table merged bottom-up into the output.
    ///
    /// Field resolution faults are configuration errors: they propagate and
    /// abort the call.  There is no partial-success mode.
    pub fn normalize_one(
        &self,
        record: &dyn Record,
        traversal: &mut Traversal,
    ) -> Result<(PrimaryObject, RelatedObjectTable)> {
        let type_name = self.view.type_name();
        // The record itself counts as collected: a cycle leading back to it
        // must yield an id reference, not recursion.
        traversal.mark_collected(EntityKey::new(type_name, &record.id()));

        let mut primary = PrimaryObject::new();
        let mut cache = InstanceCache::new();

        for field in self.view.fields() {
            let resolved = self.view.resolve(record, field).map_err(|err| {
                NormalizeError::FieldResolutionFault {
                    type_name,
                    field: field.name.clone(),
                    message: err.to_string(),
                }
            })?;
            match (&field.kind, resolved) {
                // Intentionally skipped for this record: no key at all.
                (_, Resolved::Absent) => {}
                (_, Resolved::Null) => {
                    primary.insert(field.name.clone(), Value::Null);
                }
                (FieldKind::Scalar, Resolved::Scalar(value)) => {
                    primary.insert(field.name.clone(), value);
                }
                (FieldKind::RelationOne(relation), Resolved::One(related)) => {
                    // Key-only references resolve by identifier; the null
                    // check is on the identifier, never a forced fetch.
                    let related_id = related.id();
                    if related_id.is_null() {
                        primary.insert(field.name.clone(), Value::Null);
                    } else {
                        primary.insert(field.name.clone(), related_id.clone());
                        self.queue_related(relation, &related, &related_id, &mut cache, traversal);
                    }
                }
                (FieldKind::RelationMany(relation), Resolved::Many(related)) => {
                    let mut ids = Vec::with_capacity(related.len());
                    for related_ref in &related {
                        let related_id = related_ref.id();
                        self.queue_related(relation, related_ref, &related_id, &mut cache, traversal);
                        ids.push(related_id);
                    }
                    primary.insert(field.name.clone(), Value::Array(ids));
                }
                (kind, resolved) => {
                    return Err(NormalizeError::FieldResolutionFault {
                        type_name,
                        field: field.name.clone(),
                        message: format!(
                            "resolver produced a {} value for a {} field",
                            resolved.shape_name(),
                            kind.kind_name()
                        ),
                    });
                }
            }
        }

        let mut related_objects = RelatedObjectTable::new();
        for (related_type, batch) in cache.into_batches() {
            trace!(
                related_type = %related_type,
                count = batch.instances.len(),
                "serializing related batch"
            );
            let output = batch.serializer.serialize_batch(&batch.instances, traversal)?;
            let objects = match output {
                BatchOutput::Normalized { objects, related } => {
                    merge_related_objects(&mut related_objects, related)?;
                    objects
                }
                // A plain delegate's output already is the final per-id
                // representation; index it directly.
                BatchOutput::Plain(objects) => objects,
            };
            assert_eq!(
                objects.len(),
                batch.instances.len(),
                "batch output must correspond 1:1 with its instances"
            );
            let mut indexed = RelatedObjectTable::new();
            for (instance, object) in batch.instances.iter().zip(objects) {
                indexed.insert(related_type, id_key(&instance.id()), object);
            }
            merge_related_objects(&mut related_objects, indexed)?;
        }

        Ok((primary, related_objects))
    }

    /// Queues a related instance for its type's batch unless its
    /// `(type_name, id)` was already collected on some path, in which case
    /// the id reference already emitted is all this encounter contributes.
    /// Key-only references queue nothing: there is no instance to serialize
    /// and the core never fetches.
    fn queue_related(
        &self,
        relation: &Relation,
        related: &RecordRef,
        related_id: &Value,
        cache: &mut InstanceCache,
        traversal: &mut Traversal,
    ) {
        let instance = match related.instance() {
            Some(instance) => instance,
            None => return,
        };
        if !traversal.mark_collected(EntityKey::new(relation.related_type, related_id)) {
            return;
        }
        cache.register(relation.related_type, &relation.serializer, instance.clone());
    }

    pub fn validate(&self, _input: &Value) -> Result<()> {
        Err(self.prohibited(WriteOp::Validation))
    }

    pub fn create(&self, _input: &Value) -> Result<()> {
        Err(self.prohibited(WriteOp::Creation))
    }

    pub fn update(&self, _record: &dyn Record, _input: &Value) -> Result<()> {
        Err(self.prohibited(WriteOp::Update))
    }

    fn prohibited(&self, operation: WriteOp) -> NormalizeError {
        NormalizeError::ProhibitedOperation {
            operation,
            type_name: self.view.type_name(),
        }
    }
}

impl fmt::Debug for GraphNormalizer {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter
            .debug_struct("GraphNormalizer")
            .field("type_name", &self.view.type_name())
            .finish()
    }
}

/// A normalizing serializer is its own related-type delegate: a batch is
/// normalized like a collection and reports its nested table for the caller
/// to merge.
impl RelatedSerializer for GraphNormalizer {
    fn serialize_batch(
        &self,
        records: &[Arc<dyn Record>],
        traversal: &mut Traversal,
    ) -> Result<BatchOutput> {
        let (objects, related) = self.many().normalize_batch(records, traversal)?;
        Ok(BatchOutput::Normalized { objects, related })
    }
}
