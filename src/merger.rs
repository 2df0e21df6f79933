use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use itertools::Itertools;
use serde_json::Value;
use tracing::trace;
use ustr::Ustr;

use crate::errors::{ConflictDetails, NormalizeError, Result};
use crate::payload::{PrimaryObject, RelatedObjectTable};

/// Deep-merges `from` into `into`.  For each entity type the per-id maps are
/// unioned; an id present in both sides gets a field-by-field merge (see
/// `merge_primary_objects`).  Entries are never duplicated and previously
/// known fields are never dropped.
///
/// The operation is associative, and commutative up to the ordering of
/// unioned sequences, so folding tables in any traversal order yields the
/// same entries.
pub fn merge_related_objects(
    into: &mut RelatedObjectTable,
    from: RelatedObjectTable,
) -> Result<()> {
    for (type_name, entities) in from.into_entries() {
        let dest = into
            .entries_mut()
            .entry(type_name)
            .or_insert_with(BTreeMap::new);
        for (id, object) in entities {
            match dest.entry(id) {
                Entry::Vacant(vacant) => {
                    vacant.insert(object);
                }
                Entry::Occupied(mut occupied) => {
                    let id = occupied.key().clone();
                    trace!(type_name = %type_name, id = %id, "merging entity observed on multiple paths");
                    merge_primary_objects(type_name, &id, occupied.get_mut(), object)?;
                }
            }
        }
    }
    Ok(())
}

/// By-value form of `merge_related_objects` for callers folding fresh
/// tables.
pub fn merge(a: RelatedObjectTable, b: RelatedObjectTable) -> Result<RelatedObjectTable> {
    let mut merged = a;
    merge_related_objects(&mut merged, b)?;
    Ok(merged)
}

/// Merges two representations of the same entity, field by field:
///
/// - a field present (non-null) on one side only keeps that value;
/// - equal values on both sides keep either;
/// - sequence values on both sides (a many-relation id list reached
///   independently at different depths) union without duplicates, preserving
///   first-seen order;
/// - unequal non-sequence values are a consistency violation in the source
///   data and surface as `UnmergeableConflict`.
fn merge_primary_objects(
    type_name: Ustr,
    id: &str,
    into: &mut PrimaryObject,
    from: PrimaryObject,
) -> Result<()> {
    for (field, incoming) in from {
        match into.get_mut(&field) {
            None => {
                into.insert(field, incoming);
            }
            Some(existing) => {
                if incoming.is_null() || *existing == incoming {
                    continue;
                }
                if existing.is_null() {
                    *existing = incoming;
                    continue;
                }
                match (existing, incoming) {
                    (Value::Array(have), Value::Array(add)) => {
                        union_sequences(have, add);
                    }
                    (existing, incoming) => {
                        return Err(NormalizeError::UnmergeableConflict(ConflictDetails {
                            type_name,
                            id: id.to_string(),
                            field,
                            left: existing.clone(),
                            right: incoming,
                        }));
                    }
                }
            }
        }
    }
    Ok(())
}

/// Unions `add` into `have` preserving first-seen order.  `Value` is not
/// hashable, so dedup keys off the compact JSON rendering.
fn union_sequences(have: &mut Vec<Value>, add: Vec<Value>) {
    let merged: Vec<Value> = have
        .drain(..)
        .chain(add)
        .unique_by(|value| value.to_string())
        .collect();
    *have = merged;
}
