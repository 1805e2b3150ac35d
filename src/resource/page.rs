//! Pagination
//!
//! List endpoints answer with either a bare array or an envelope
//! (`results` plus `count`/`next`/`previous`). Both become a [`Page`].

use crate::api::{ApiError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Keys that may hold the items of an enveloped response, in lookup order
const RESULT_KEYS: &[&str] = &["results", "data", "items"];

/// One page of a collection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    /// Total number of items across pages, when the server reports it
    pub count: Option<u64>,
    pub next: Option<String>,
    pub previous: Option<String>,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.next.is_some()
    }
}

impl Page<Value> {
    /// Normalize a raw list response
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Array(items) => Ok(Self {
                count: Some(items.len() as u64),
                results: items.clone(),
                next: None,
                previous: None,
            }),
            Value::Object(map) => {
                let items = RESULT_KEYS
                    .iter()
                    .find_map(|k| map.get(*k).and_then(Value::as_array))
                    .ok_or_else(|| {
                        ApiError::decode("list response has neither an array nor a results field")
                    })?;

                let link = |key: &str| {
                    map.get(key)
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                };

                Ok(Self {
                    results: items.clone(),
                    count: map.get("count").and_then(Value::as_u64),
                    next: link("next"),
                    previous: link("previous"),
                })
            }
            other => Err(ApiError::decode(format!(
                "expected a list response, got {}",
                json_kind(other)
            ))),
        }
    }

    /// Decode every item into `T`
    pub fn decode<T: DeserializeOwned>(self, resource: &str) -> Result<Page<T>> {
        let results = self
            .results
            .iter()
            .enumerate()
            .map(|(index, item)| {
                T::deserialize(item).map_err(|e| {
                    tracing::error!(
                        "Item {} of {} list does not match its declared shape: {}",
                        index,
                        resource,
                        e
                    );
                    ApiError::decode(format!("{}[{}]: {}", resource, index, e))
                })
            })
            .collect::<Result<Vec<T>>>()?;

        Ok(Page {
            results,
            count: self.count,
            next: self.next,
            previous: self.previous,
        })
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
