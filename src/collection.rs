use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use ustr::Ustr;

use crate::errors::{NormalizeError, Result, WriteOp};
use crate::graph::GraphNormalizer;
use crate::merger::merge_related_objects;
use crate::payload::{NormalizedPayload, PrimaryObject, RelatedObjectTable, RootObject};
use crate::record::Record;
use crate::serializer::Traversal;

/// Applies a [`GraphNormalizer`] across an ordered sequence of records:
/// primary objects concatenate in input order, related-object tables fold
/// into one accumulator.
pub struct CollectionNormalizer {
    child: GraphNormalizer,
}

impl CollectionNormalizer {
    pub fn new(child: GraphNormalizer) -> CollectionNormalizer {
        CollectionNormalizer { child }
    }

    /// See [`GraphNormalizer::with_input`]: write intent is refused before
    /// any work, for collections as for single records.
    pub fn with_input(child: GraphNormalizer, _input: Value) -> Result<CollectionNormalizer> {
        Err(NormalizeError::ProhibitedOperation {
            operation: WriteOp::Deserialization,
            type_name: child.type_name(),
        })
    }

    /// Sole entry point for a root collection.
    pub fn normalize<I>(&self, records: I) -> Result<NormalizedPayload>
    where
        I: IntoIterator<Item = Arc<dyn Record>>,
    {
        // Materialize the handle once up front; a lazy source cannot be
        // iterated twice.
        let records: Vec<Arc<dyn Record>> = records.into_iter().collect();
        let mut traversal = Traversal::new();
        let (objects, related_objects) = self.normalize_batch(&records, &mut traversal)?;
        Ok(NormalizedPayload {
            object: RootObject::Many(objects),
            related_objects,
        })
    }

    /// Traversal-threaded form shared by the entry point and the recursion
    /// seam: normalizes each record in order and folds the tables.
    pub(crate) fn normalize_batch(
        &self,
        records: &[Arc<dyn Record>],
        traversal: &mut Traversal,
    ) -> Result<(Vec<PrimaryObject>, RelatedObjectTable)> {
        let mut objects = Vec::with_capacity(records.len());
        let mut related_objects = RelatedObjectTable::new();
        for record in records {
            let (object, related) = self.child.normalize_one(record.as_ref(), traversal)?;
            objects.push(object);
            merge_related_objects(&mut related_objects, related)?;
        }
        Ok((objects, related_objects))
    }

    pub fn type_name(&self) -> Ustr {
        self.child.type_name()
    }

    pub fn validate(&self, input: &Value) -> Result<()> {
        self.child.validate(input)
    }

    pub fn create(&self, input: &Value) -> Result<()> {
        self.child.create(input)
    }

    pub fn update(&self, record: &dyn Record, input: &Value) -> Result<()> {
        self.child.update(record, input)
    }
}

impl fmt::Debug for CollectionNormalizer {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter
            .debug_struct("CollectionNormalizer")
            .field("type_name", &self.child.type_name())
            .finish()
    }
}
