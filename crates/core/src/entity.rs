//! Behaviour shared by every entity kind.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::id::EntityKind;

/// Common view over roadmaps, tracks, tasks, iterations, criteria and ADRs.
pub trait Entity {
    /// Unique id (the decimal number for iterations).
    fn id(&self) -> String;

    /// Type tag.
    fn kind(&self) -> EntityKind;

    /// Derived progress in `[0, 1]`.
    fn progress(&self) -> f64 {
        0.0
    }

    /// True only in the kind's blocked state.
    fn is_blocked(&self) -> bool {
        false
    }

    /// Every field as a generic map, including `progress` and `is_blocked`.
    fn fields(&self) -> Map<String, Value>;
}

/// Serializes `entity` into a field map and appends the derived values.
pub fn field_map<E: Entity + Serialize>(entity: &E) -> Map<String, Value> {
    let mut map = match serde_json::to_value(entity) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    map.entry("id").or_insert_with(|| Value::from(entity.id()));
    map.insert("entity_type".into(), Value::from(entity.kind().as_str()));
    map.insert("progress".into(), Value::from(entity.progress()));
    map.insert("is_blocked".into(), Value::from(entity.is_blocked()));
    map
}
