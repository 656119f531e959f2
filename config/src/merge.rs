//! # Document Merge
//!
//! Pairwise deep merge of YAML documents, applied in order so later
//! documents override earlier ones.
//!
//! # Rules
//! - mapping onto mapping: recursive merge, scalars replaced
//! - list of mappings where every element carries `name`: merged
//!   element-wise by name (recursive on match, append on new)
//! - any other list: replaced wholesale
//! - scalar / null: replaced wholesale; an explicit null in the override
//!   keeps the base value

use serde_yaml::{Mapping, Value};

/// Merge `b` onto `a` and return the combined document.
pub fn deep_merge(a: Value, b: Value) -> Value {
    match (a, b) {
        (Value::Mapping(mut base), Value::Mapping(over)) => {
            for (key, incoming) in over {
                let merged = match base.remove(&key) {
                    Some(existing) => deep_merge(existing, incoming),
                    None => incoming
                };
                base.insert(key, merged);
            }
            Value::Mapping(base)
        }
        (Value::Sequence(base), Value::Sequence(over)) => {
            if all_named(&base) && all_named(&over) {
                merge_named_lists(base, over)
            } else {
                Value::Sequence(over)
            }
        }
        (base, Value::Null) => base,
        (_, over) => over
    }
}

/// True when every element is a mapping carrying a `name` field.
fn all_named(items: &[Value]) -> bool {
    !items.is_empty()
        && items.iter().all(|item| {
            item.as_mapping().is_some_and(|m| m.contains_key("name"))
        })
}

fn merge_named_lists(base: Vec<Value>, over: Vec<Value>) -> Value {
    let mut order: Vec<String> = Vec::new();
    let mut by_name: Vec<(String, Value)> = Vec::new();

    for item in base {
        let name = entry_name(&item);
        order.push(name.clone());
        by_name.push((name, item));
    }

    for item in over {
        let name = entry_name(&item);
        match by_name.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => {
                let merged = deep_merge(existing.clone(), item);
                *existing = merged;
            }
            None => {
                order.push(name.clone());
                by_name.push((name, item));
            }
        }
    }

    let merged = order
        .into_iter()
        .filter_map(|name| {
            by_name
                .iter()
                .position(|(n, _)| *n == name)
                .map(|i| by_name.remove(i).1)
        })
        .collect();
    Value::Sequence(merged)
}

fn entry_name(item: &Value) -> String {
    item.get("name").map(scalar_to_string).unwrap_or_default()
}

/// Render a YAML scalar as the string form used for names and variables.
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new()
    }
}
