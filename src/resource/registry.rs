//! Resource Registry - Load resource descriptors from JSON
//!
//! Descriptors for every dashboard resource are embedded JSON compiled into
//! the binary, loaded once and never mutated afterwards.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Embedded resource JSON files (compiled into the binary)
const RESOURCE_FILES: &[&str] = &[
    include_str!("../resources/journal.json"),
    include_str!("../resources/world.json"),
    include_str!("../resources/community.json"),
];

/// HTTP verb used by `update`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMethod {
    #[default]
    Patch,
    Put,
}

/// Static metadata for one resource type
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResourceDescriptor {
    /// Registry key; filled in from the JSON map key
    #[serde(skip)]
    name: String,
    pub display_name: String,
    /// Dashboard area this resource belongs to (journal, shop, rank, news, admin)
    #[serde(default)]
    pub section: Option<String>,
    #[serde(rename = "url")]
    collection_url: String,
    #[serde(default)]
    create_url: Option<String>,
    #[serde(default)]
    choices_url: Option<String>,
    /// Extra endpoints for actions beyond plain CRUD
    #[serde(default)]
    urls: BTreeMap<String, String>,
    #[serde(default)]
    pub update_method: UpdateMethod,
    /// Field holding the server-assigned id
    #[serde(default = "default_id_field")]
    pub id_field: String,
}

fn default_id_field() -> String {
    "id".to_string()
}

impl ResourceDescriptor {
    /// Descriptor with only a name and collection URL
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            section: None,
            collection_url: url.into(),
            create_url: None,
            choices_url: None,
            urls: BTreeMap::new(),
            update_method: UpdateMethod::default(),
            id_field: default_id_field(),
        }
    }

    pub fn with_create_url(mut self, url: impl Into<String>) -> Self {
        self.create_url = Some(url.into());
        self
    }

    pub fn with_choices_url(mut self, url: impl Into<String>) -> Self {
        self.choices_url = Some(url.into());
        self
    }

    pub fn with_named_url(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.urls.insert(name.into(), url.into());
        self
    }

    pub fn with_update_method(mut self, method: UpdateMethod) -> Self {
        self.update_method = method;
        self
    }

    /// Unique name; also the cache namespace
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Collection endpoint
    pub fn url(&self) -> &str {
        &self.collection_url
    }

    /// Endpoint for a single instance: `<url><id>/`
    pub fn item_url(&self, id: &str) -> String {
        let base = self.collection_url.trim_end_matches('/');
        format!("{}/{}/", base, urlencoding::encode(id))
    }

    /// Create endpoint, falling back to the collection
    pub fn create_url(&self) -> &str {
        self.create_url.as_deref().unwrap_or(&self.collection_url)
    }

    pub fn choices_url(&self) -> Option<&str> {
        self.choices_url.as_deref()
    }

    pub fn named_url(&self, name: &str) -> Option<&str> {
        self.urls.get(name).map(String::as_str)
    }

    pub fn named_urls(&self) -> impl Iterator<Item = (&str, &str)> {
        self.urls.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Root structure of resources/*.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceConfig {
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceDescriptor>,
}

/// Problems found while building a registry
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Failed to parse resource JSON: {0}")]
    Parse(String),
    #[error("Resource {0} is defined more than once")]
    Duplicate(String),
    #[error("Resource names must not be empty")]
    EmptyName,
    #[error("Resource {0} has an empty URL")]
    EmptyUrl(String),
}

/// Merge resource definition files into one registry
///
/// Names must be unique across all files.
pub fn build_registry(files: &[&str]) -> Result<ResourceConfig, RegistryError> {
    let mut final_config = ResourceConfig::default();

    for content in files {
        let partial: ResourceConfig =
            serde_json::from_str(content).map_err(|e| RegistryError::Parse(e.to_string()))?;

        for (name, mut descriptor) in partial.resources {
            if name.trim().is_empty() {
                return Err(RegistryError::EmptyName);
            }
            if descriptor.collection_url.trim().is_empty() {
                return Err(RegistryError::EmptyUrl(name));
            }
            if final_config.resources.contains_key(&name) {
                return Err(RegistryError::Duplicate(name));
            }
            descriptor.name = name.clone();
            final_config.resources.insert(name, descriptor);
        }
    }

    Ok(final_config)
}

/// Global registry loaded from JSON
static REGISTRY: OnceLock<ResourceConfig> = OnceLock::new();

/// Get the resource registry (loads from embedded JSON on first access)
pub fn get_registry() -> &'static ResourceConfig {
    REGISTRY.get_or_init(|| {
        build_registry(RESOURCE_FILES)
            .unwrap_or_else(|e| panic!("Invalid embedded resource definitions: {}", e))
    })
}

/// Get a resource descriptor by name
pub fn get_resource(name: &str) -> Option<&'static ResourceDescriptor> {
    get_registry().resources.get(name)
}

/// Get all resource names (sorted)
pub fn get_all_resource_names() -> Vec<&'static str> {
    get_registry()
        .resources
        .keys()
        .map(|s| s.as_str())
        .collect()
}
