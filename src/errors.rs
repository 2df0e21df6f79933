use std::error::Error;
use std::fmt;

use serde_json::Value;
use ustr::Ustr;

pub type Result<T> = std::result::Result<T, NormalizeError>;

/// The write-shaped operations a read-only normalizer refuses to perform.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WriteOp {
    Deserialization,
    Validation,
    Creation,
    Update,
}

impl WriteOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteOp::Deserialization => "Deserialization",
            WriteOp::Validation => "Validation",
            WriteOp::Creation => "Creation",
            WriteOp::Update => "Update",
        }
    }
}

impl fmt::Display for WriteOp {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Everything a caller needs to locate a merge conflict: the entity it
/// occurred on, the field, and both disagreeing values.
#[derive(Clone, Debug, PartialEq)]
pub struct ConflictDetails {
    pub type_name: Ustr,
    pub id: String,
    pub field: String,
    pub left: Value,
    pub right: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NormalizeError {
    /// A write/validate/create/update was invoked on a read-only normalizer.
    /// Always fatal to that call, never retried.
    ProhibitedOperation { operation: WriteOp, type_name: Ustr },
    /// The declared field-resolution collaborator failed for a record/field.
    /// Not recovered locally; `message` is the stringified lower-level error
    /// and the record-type/field context is attached here.
    FieldResolutionFault {
        type_name: Ustr,
        field: String,
        message: String,
    },
    /// Two merge inputs disagree on a non-sequence value for the same
    /// `(type_name, id, field)`.  The same identifier denoting different
    /// field values on different traversal paths is a consistency violation
    /// in the source data, so it is surfaced rather than silently resolved.
    UnmergeableConflict(ConflictDetails),
}

impl fmt::Display for NormalizeError {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NormalizeError::ProhibitedOperation {
                operation,
                type_name,
            } => {
                write!(
                    formatter,
                    "{} is prohibited for {}",
                    operation, type_name
                )
            }
            NormalizeError::FieldResolutionFault {
                type_name,
                field,
                message,
            } => {
                write!(
                    formatter,
                    "failed to resolve field '{}' on {}: {}",
                    field, type_name, message
                )
            }
            NormalizeError::UnmergeableConflict(details) => {
                write!(
                    formatter,
                    "conflicting values for {}[{}].{}: {} != {}",
                    details.type_name,
                    details.id,
                    details.field,
                    details.left,
                    details.right
                )
            }
        }
    }
}

impl Error for NormalizeError {}
