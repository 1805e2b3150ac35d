//! Display names
//!
//! Maps raw stored values (choice codes such as `RAID`) to human-readable
//! labels using each resource's cached choices listing. Lookups never fetch
//! and never fail: a listing that is not loaded yet, or has no matching
//! entry, yields `None` and the caller renders its own fallback.

use crate::cache::{CacheKey, QueryCache};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Keys that may wrap a choices array
const CHOICE_LIST_KEYS: &[&str] = &["results", "choices"];

/// One selectable value of a resource field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub value: Value,
    #[serde(alias = "label", alias = "name")]
    pub display_name: String,
}

impl Choice {
    /// Value as compared against raw stored values
    pub fn encoded_value(&self) -> String {
        encode_value(&self.value)
    }
}

fn encode_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse_choice(item: &Value) -> Option<Choice> {
    match item {
        // Django-style ["CODE", "Label"] pairs
        Value::Array(pair) if pair.len() == 2 => Some(Choice {
            value: pair[0].clone(),
            display_name: pair[1].as_str()?.to_string(),
        }),
        Value::Object(_) => Choice::deserialize(item).ok(),
        _ => None,
    }
}

fn parse_list(value: &Value) -> Option<Vec<Choice>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => CHOICE_LIST_KEYS
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_array))?,
        _ => return None,
    };
    Some(items.iter().filter_map(parse_choice).collect())
}

/// Extract choices from a choices payload
///
/// Accepts a bare array, a `results`/`choices` envelope, or an object keyed
/// by field name. With `field` set only that field's choices are returned;
/// without it every field's choices are merged.
pub fn parse_choices(value: &Value, field: Option<&str>) -> Vec<Choice> {
    if let Some(field) = field {
        return value.get(field).and_then(parse_list).unwrap_or_default();
    }

    if let Some(list) = parse_list(value) {
        return list;
    }

    match value {
        Value::Object(map) => map.values().filter_map(parse_list).flatten().collect(),
        _ => Vec::new(),
    }
}

/// Label lookups over cached choices listings
#[derive(Debug, Clone)]
pub struct DisplayNames {
    cache: QueryCache,
}

impl DisplayNames {
    pub fn new(cache: QueryCache) -> Self {
        Self { cache }
    }

    /// Label for `raw` in `resource_type`'s choices, if loaded and present
    pub fn resolve(&self, resource_type: &str, raw: &str) -> Option<String> {
        self.lookup(resource_type, None, raw)
    }

    /// Label for `raw` among the choices of one field
    pub fn resolve_field(&self, resource_type: &str, field: &str, raw: &str) -> Option<String> {
        self.lookup(resource_type, Some(field), raw)
    }

    /// Label, or `fallback` when unresolved
    pub fn resolve_or(&self, resource_type: &str, raw: &str, fallback: &str) -> String {
        self.resolve(resource_type, raw)
            .unwrap_or_else(|| fallback.to_string())
    }

    /// True once the resource's choices have been fetched at least once
    pub fn is_loaded(&self, resource_type: &str) -> bool {
        self.cache
            .peek(&CacheKey::choices(resource_type))
            .is_some_and(|s| s.data.is_some())
    }

    fn lookup(&self, resource_type: &str, field: Option<&str>, raw: &str) -> Option<String> {
        // Stale listings still label correctly; a refetch only refreshes them
        let data = self.cache.peek(&CacheKey::choices(resource_type))?.data?;
        parse_choices(&data, field)
            .into_iter()
            .find(|choice| choice.encoded_value() == raw)
            .map(|choice| choice.display_name)
    }
}
