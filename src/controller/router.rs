//! Version bundle routing
//!
//! Each AWSConfig is pinned to one version bundle. The router maps that
//! value to the resource set built for it at boot. There is no default: an
//! unknown version fails the pass, and moving a cluster to another bundle is
//! a separate migration step that rewrites the version field.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use super::pipeline::ResourceSet;
use crate::crd::AWSConfig;
use crate::error::{Error, Result};

#[derive(Default)]
pub struct ResourceRouter {
    sets: BTreeMap<String, Arc<ResourceSet>>,
}

impl ResourceRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the resource set for its version. Registering a version
    /// twice is a boot-time bug.
    pub fn register(&mut self, set: ResourceSet) -> Result<()> {
        let version = set.version().to_string();
        if self.sets.contains_key(&version) {
            return Err(Error::InvalidConfig(format!(
                "version bundle {} registered twice",
                version
            )));
        }
        info!(version = %version, resources = ?set.resource_names(), "Registered resource set");
        self.sets.insert(version, Arc::new(set));
        Ok(())
    }

    /// Check that exactly the given versions are registered.
    pub fn validate(&self, known: &[&str]) -> Result<()> {
        for version in known {
            if !self.sets.contains_key(*version) {
                return Err(Error::InvalidConfig(format!(
                    "no resource set registered for version bundle {}",
                    version
                )));
            }
        }
        for version in self.sets.keys() {
            if !known.contains(&version.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "resource set registered for unknown version bundle {}",
                    version
                )));
            }
        }
        Ok(())
    }

    pub fn route_version(&self, version: &str) -> Result<Arc<ResourceSet>> {
        self.sets
            .get(version)
            .cloned()
            .ok_or_else(|| Error::InvalidVersionBundle(version.to_string()))
    }

    pub fn route(&self, obj: &AWSConfig) -> Result<Arc<ResourceSet>> {
        self.route_version(obj.version_bundle())
    }

    pub fn versions(&self) -> Vec<&str> {
        self.sets.keys().map(String::as_str).collect()
    }
}
