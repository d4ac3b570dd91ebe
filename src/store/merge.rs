use serde_json::{Map, Value};

use super::FieldPath;

/// Recursive merge: objects merge key by key, anything else replaces.
pub fn deep_merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value)
                    }
                    _ => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

pub fn get_field<'a>(doc: &'a Value, field: &FieldPath) -> Option<&'a Value> {
    field
        .segments()
        .iter()
        .try_fold(doc, |current, segment| current.get(segment))
}

/// Walks to the parent of the last segment, replacing non-object
/// intermediates with empty maps, and returns the slot for the last segment.
fn field_slot<'a>(doc: &'a mut Value, field: &FieldPath) -> Option<(&'a mut Map<String, Value>, String)> {
    let (last, parents) = field.segments().split_last()?;

    let mut current = doc;
    for segment in parents {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let map = current.as_object_mut()?;
        current = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    Some((current.as_object_mut()?, last.clone()))
}

pub fn set_field(doc: &mut Value, field: &FieldPath, value: Value) {
    if let Some((map, key)) = field_slot(doc, field) {
        map.insert(key, value);
    }
}

pub fn array_union(doc: &mut Value, field: &FieldPath, values: &[Value]) {
    let Some((map, key)) = field_slot(doc, field) else {
        return;
    };

    let slot = map.entry(key).or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }

    if let Value::Array(items) = slot {
        for value in values {
            if !items.contains(value) {
                items.push(value.clone());
            }
        }
    }
}
