use std::any::Any;
use std::error::Error;
use std::sync::Arc;

use serde_json::Value;
use ustr::Ustr;

use crate::serializer::RelatedSerializer;

/// An entity instance owned by the external data source.  The core never
/// mutates a record; it only reads the id here and resolves declared fields
/// through the type's [`RecordView`].
pub trait Record: Send + Sync {
    /// Stable identifier for this record.
    fn id(&self) -> Value;

    /// Downcast seam so a concrete view can get back at its own record type.
    fn as_any(&self) -> &dyn Any;
}

/// A reference to a related record as produced by field resolution.
///
/// `KeyOnly` is the already-fetched single-key optimized form: the source
/// knows the identifier without having loaded the full record, and we must
/// not force a full fetch just to emit an id reference.
#[derive(Clone)]
pub enum RecordRef {
    Instance(Arc<dyn Record>),
    KeyOnly(Value),
}

impl RecordRef {
    pub fn id(&self) -> Value {
        match self {
            RecordRef::Instance(record) => record.id(),
            RecordRef::KeyOnly(id) => id.clone(),
        }
    }

    pub fn instance(&self) -> Option<&Arc<dyn Record>> {
        match self {
            RecordRef::Instance(record) => Some(record),
            RecordRef::KeyOnly(_) => None,
        }
    }
}

/// Declared metadata for one relation field: the related type's identity and
/// the serializer that turns a batch of its instances into representations.
#[derive(Clone)]
pub struct Relation {
    pub related_type: Ustr,
    pub serializer: Arc<dyn RelatedSerializer>,
}

impl Relation {
    pub fn new(related_type: Ustr, serializer: Arc<dyn RelatedSerializer>) -> Relation {
        Relation {
            related_type,
            serializer,
        }
    }
}

/// What kind of field a descriptor declares.  Resolved once when the record
/// type's view is constructed, never re-derived per field access.
#[derive(Clone)]
pub enum FieldKind {
    Scalar,
    RelationOne(Relation),
    RelationMany(Relation),
}

impl FieldKind {
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldKind::Scalar => "scalar",
            FieldKind::RelationOne(_) => "relation-one",
            FieldKind::RelationMany(_) => "relation-many",
        }
    }
}

/// One declared field of a record type.  The declaration order of the
/// descriptor slice is the field order of the primary object.
#[derive(Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub fn scalar(name: &str) -> FieldDescriptor {
        FieldDescriptor {
            name: name.to_string(),
            kind: FieldKind::Scalar,
        }
    }

    pub fn relation_one(name: &str, relation: Relation) -> FieldDescriptor {
        FieldDescriptor {
            name: name.to_string(),
            kind: FieldKind::RelationOne(relation),
        }
    }

    pub fn relation_many(name: &str, relation: Relation) -> FieldDescriptor {
        FieldDescriptor {
            name: name.to_string(),
            kind: FieldKind::RelationMany(relation),
        }
    }
}

/// The current value of a field for one record.
///
/// `Absent` means the field is intentionally skipped for this record (e.g.
/// write-only or conditionally excluded) and must be omitted from the
/// primary object entirely, which is distinct from `Null`.  Scalars arrive
/// already rendered; applying the field's own rendering rule (date
/// formatting and the like) is the declaring side's contract.  `Many` must
/// already be materialized: a lazy handle cannot be iterated twice.
pub enum Resolved {
    Absent,
    Null,
    Scalar(Value),
    One(RecordRef),
    Many(Vec<RecordRef>),
}

impl Resolved {
    pub fn shape_name(&self) -> &'static str {
        match self {
            Resolved::Absent => "absent",
            Resolved::Null => "null",
            Resolved::Scalar(_) => "scalar",
            Resolved::One(_) => "one",
            Resolved::Many(_) => "many",
        }
    }
}

/// Errors from the resolution collaborator.  They are configuration
/// problems, not data conditions; the normalizer attaches record-type and
/// field context and aborts the call.
pub type ResolveError = Box<dyn Error + Send + Sync>;

/// Read adapter over one record type: declares the ordered field list and
/// resolves the current value of any declared field for a given record.
/// This is the boundary to the field-declaration collaborator; the core owns
/// nothing behind it.
pub trait RecordView: Send + Sync {
    /// Explicit entity type name, attached at declaration time.
    fn type_name(&self) -> Ustr;

    /// Declared fields, in declaration order.
    fn fields(&self) -> &[FieldDescriptor];

    fn resolve(
        &self,
        record: &dyn Record,
        field: &FieldDescriptor,
    ) -> std::result::Result<Resolved, ResolveError>;
}
