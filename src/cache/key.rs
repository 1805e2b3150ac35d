//! Cache keys
//!
//! A key is the resource name (its namespace), the scope of the read and the
//! canonical serialization of the query parameters. Parameters are kept
//! sorted so `?a=1&b=2` and `?b=2&a=1` share one entry.

use std::collections::BTreeMap;
use std::fmt;

/// Sorted query-string parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryParams(BTreeMap<String, String>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) -> &mut Self {
        self.0.insert(key.into(), value.to_string());
        self
    }

    /// Builder form of [`insert`](Self::insert)
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse `key=value` pairs (as given on a command line)
    pub fn parse_pair(pair: &str) -> Option<(String, String)> {
        let (key, value) = pair.split_once('=')?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        Some((key.to_string(), value.trim().to_string()))
    }

    /// Collect the query string of a URL (pagination links)
    pub fn from_url(url: &url::Url) -> Self {
        Self(url.query_pairs().into_owned().collect())
    }

    /// Canonical `a=1&b=2` encoding
    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.0.iter())
            .finish()
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.to_string()))
                .collect(),
        )
    }
}

/// What a cache entry holds for its resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyScope {
    /// A collection page
    List,
    /// A single instance by id
    Item(String),
    /// The resource's choices listing
    Choices,
    /// A named extra endpoint
    Named(String),
}

impl fmt::Display for KeyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List => f.write_str("list"),
            Self::Item(id) => write!(f, "item/{}", id),
            Self::Choices => f.write_str("choices"),
            Self::Named(name) => write!(f, "named/{}", name),
        }
    }
}

/// Identifies one cached fetch
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    namespace: String,
    scope: KeyScope,
    params: QueryParams,
}

impl CacheKey {
    pub fn new(namespace: impl Into<String>, scope: KeyScope, params: QueryParams) -> Self {
        Self {
            namespace: namespace.into(),
            scope,
            params,
        }
    }

    pub fn list(namespace: &str, params: &QueryParams) -> Self {
        Self::new(namespace, KeyScope::List, params.clone())
    }

    pub fn item(namespace: &str, id: impl ToString) -> Self {
        Self::new(namespace, KeyScope::Item(id.to_string()), QueryParams::new())
    }

    pub fn choices(namespace: &str) -> Self {
        Self::new(namespace, KeyScope::Choices, QueryParams::new())
    }

    pub fn named(namespace: &str, name: &str, params: &QueryParams) -> Self {
        Self::new(namespace, KeyScope::Named(name.to_string()), params.clone())
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn scope(&self) -> &KeyScope {
        &self.scope
    }

    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    /// True when the serialized key starts with `prefix`
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        self.to_string().starts_with(prefix)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.scope)?;
        if !self.params.is_empty() {
            write!(f, "?{}", self.params.to_query_string())?;
        }
        Ok(())
    }
}
