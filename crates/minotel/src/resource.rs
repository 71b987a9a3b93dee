//! Resource: the immutable attribute set identifying the emitting process.
//!
//! Resources are compared by content, not by pointer: two resources built
//! through different paths but carrying the same attributes merge into one
//! group on the wire. Content identity is the sorted canonical
//! `key:value` join of the attribute set.

use crate::attribute::{canonical_attributes, set_attribute, AttributeValue, KeyValue};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Well-known resource attribute keys (OpenTelemetry semantic conventions).
pub const SERVICE_NAME: &str = "service.name";
pub const SERVICE_VERSION: &str = "service.version";
pub const DEPLOYMENT_ENVIRONMENT: &str = "deployment.environment";

/// Static attributes identifying the emitting process/device.
///
/// Constructed once at SDK initialization and shared read-only (`Arc`) by
/// every record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    attributes: Vec<KeyValue>,
}

impl Resource {
    /// Builds a resource from an attribute list, deduplicating keys
    /// (last write wins).
    pub fn new(attributes: impl IntoIterator<Item = KeyValue>) -> Self {
        let mut deduped = Vec::new();
        for kv in attributes {
            set_attribute(&mut deduped, kv.key, kv.value);
        }
        Self { attributes: deduped }
    }

    /// An empty resource.
    pub fn empty() -> Self {
        Self {
            attributes: Vec::new(),
        }
    }

    pub fn builder() -> ResourceBuilder {
        ResourceBuilder::default()
    }

    pub fn attributes(&self) -> &[KeyValue] {
        &self.attributes
    }

    /// Content-identity key: sorted canonical `key:value` entries joined
    /// with `|`. Stable across construction order.
    pub fn canonical_key(&self) -> String {
        canonical_attributes(&self.attributes)
    }

    /// Value of a single attribute, if present.
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes
            .iter()
            .find(|kv| kv.key == key)
            .map(|kv| &kv.value)
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_key() == other.canonical_key()
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_key().hash(state);
    }
}

/// Builder for [`Resource`].
#[derive(Debug, Default)]
pub struct ResourceBuilder {
    attributes: Vec<KeyValue>,
}

impl ResourceBuilder {
    pub fn with_service_name(self, name: impl Into<String>) -> Self {
        self.with_attribute(SERVICE_NAME, name.into())
    }

    pub fn with_service_version(self, version: impl Into<String>) -> Self {
        self.with_attribute(SERVICE_VERSION, version.into())
    }

    pub fn with_environment(self, environment: impl Into<String>) -> Self {
        self.with_attribute(DEPLOYMENT_ENVIRONMENT, environment.into())
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        set_attribute(&mut self.attributes, key, value.into());
        self
    }

    pub fn with_attributes(mut self, attributes: impl IntoIterator<Item = KeyValue>) -> Self {
        for kv in attributes {
            set_attribute(&mut self.attributes, kv.key, kv.value);
        }
        self
    }

    pub fn build(self) -> Resource {
        Resource {
            attributes: self.attributes,
        }
    }
}
