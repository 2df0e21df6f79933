use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};
use ustr::Ustr;

/// A normalized record representation: field name to value, where relation
/// fields hold id references instead of nested objects.  The underlying map
/// preserves insertion order, so fields come out in declaration order.
pub type PrimaryObject = Map<String, Value>;

/// Canonical string form of an identifier, used for table keys and dedup
/// keys.  String ids are used verbatim; everything else (notably integer
/// ids) uses its compact JSON rendering.
pub fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Identifies one entity instance: its declared type plus its stringified
/// id.  This is the dedup key for the related-object index.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct EntityKey {
    pub type_name: Ustr,
    pub id: String,
}

impl EntityKey {
    pub fn new(type_name: Ustr, id: &Value) -> EntityKey {
        EntityKey {
            type_name,
            id: id_key(id),
        }
    }
}

/// Flat index of every related entity encountered in a traversal, grouped by
/// entity type and keyed by stringified id.  Depth is exactly one level: an
/// entity's representation never embeds another entity's representation,
/// only its id.  A type key is only present when it has at least one entity.
///
/// BTreeMaps keep iteration (and JSON emission) order deterministic across
/// repeated normalization of the same input.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RelatedObjectTable {
    entries: BTreeMap<Ustr, BTreeMap<String, PrimaryObject>>,
}

impl RelatedObjectTable {
    pub fn new() -> RelatedObjectTable {
        RelatedObjectTable {
            entries: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct entity types present.
    pub fn type_count(&self) -> usize {
        self.entries.len()
    }

    pub fn contains_type(&self, type_name: Ustr) -> bool {
        self.entries.contains_key(&type_name)
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.entity(key.type_name, &key.id).is_some()
    }

    pub fn entity(&self, type_name: Ustr, id: &str) -> Option<&PrimaryObject> {
        self.entries.get(&type_name).and_then(|ids| ids.get(id))
    }

    /// All entities of one type, keyed by stringified id.
    pub fn entities_of(&self, type_name: Ustr) -> Option<&BTreeMap<String, PrimaryObject>> {
        self.entries.get(&type_name)
    }

    pub fn types(&self) -> impl Iterator<Item = Ustr> + '_ {
        self.entries.keys().copied()
    }

    pub fn insert(
        &mut self,
        type_name: Ustr,
        id: String,
        object: PrimaryObject,
    ) -> Option<PrimaryObject> {
        self.entries
            .entry(type_name)
            .or_insert_with(BTreeMap::new)
            .insert(id, object)
    }

    pub(crate) fn entries_mut(
        &mut self,
    ) -> &mut BTreeMap<Ustr, BTreeMap<String, PrimaryObject>> {
        &mut self.entries
    }

    pub(crate) fn into_entries(self) -> BTreeMap<Ustr, BTreeMap<String, PrimaryObject>> {
        self.entries
    }
}

/// The root of a normalized payload: a single primary object, or an ordered
/// sequence of them when a collection was normalized.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RootObject {
    One(PrimaryObject),
    Many(Vec<PrimaryObject>),
}

/// The externally observed result of a normalization call.  Fully
/// constructed in one call and returned immutable; serializes as
/// `{"object": ..., "related_objects": {...}}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NormalizedPayload {
    pub object: RootObject,
    pub related_objects: RelatedObjectTable,
}

impl NormalizedPayload {
    /// The JSON document form of the payload for the boundary layer:
    /// `object` as a JSON object or array, `related_objects` keyed by
    /// type name and then by stringified id.
    pub fn to_value(&self) -> Value {
        let object = match &self.object {
            RootObject::One(primary) => Value::Object(primary.clone()),
            RootObject::Many(primaries) => Value::Array(
                primaries.iter().cloned().map(Value::Object).collect(),
            ),
        };
        let mut related = Map::new();
        for (type_name, entities) in &self.related_objects.entries {
            let mut by_id = Map::new();
            for (id, entity) in entities {
                by_id.insert(id.clone(), Value::Object(entity.clone()));
            }
            related.insert(type_name.to_string(), Value::Object(by_id));
        }
        let mut payload = Map::new();
        payload.insert("object".to_string(), object);
        payload.insert("related_objects".to_string(), Value::Object(related));
        Value::Object(payload)
    }
}
