// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scheme dispatch
//!
//! A [`Resolver`] holds one shared client per object-store scheme and turns
//! raw addresses into concrete paths. Every path it hands out, and every
//! path derived from those, reuses the registered client.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::{
    address::{Address, Scheme},
    error::{CloudFsError, CloudFsResult},
    local::LocalPath,
    object::ObjectPath,
    operations::PathSettings,
    path::CloudPath,
    store::ObjectStore,
};

#[derive(Clone, Default)]
pub struct Resolver {
    stores: HashMap<Scheme, Arc<dyn ObjectStore>>,
    settings: Arc<PathSettings>,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the client used for `scheme`. `file://` needs none.
    pub fn with_store(mut self, scheme: Scheme, store: Arc<dyn ObjectStore>) -> Self {
        if !scheme.is_object_store() {
            tracing::warn!("Ignoring store {} registered for {}://", store.id(), scheme);
            return self;
        }
        self.stores.insert(scheme, store);
        self
    }

    pub fn with_settings(mut self, settings: PathSettings) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    pub fn settings(&self) -> &PathSettings {
        &self.settings
    }

    pub fn store(&self, scheme: Scheme) -> Option<&Arc<dyn ObjectStore>> {
        self.stores.get(&scheme)
    }

    /// Parse `raw` and build the path type its scheme calls for.
    pub fn resolve(&self, raw: &str) -> CloudFsResult<CloudPath> {
        self.resolve_address(Address::parse(raw)?)
    }

    pub fn resolve_address(&self, address: Address) -> CloudFsResult<CloudPath> {
        let scheme = address.scheme();
        if scheme == Scheme::Local {
            return Ok(CloudPath::Local(LocalPath::new(address)?));
        }

        let store = self
            .stores
            .get(&scheme)
            .ok_or_else(|| CloudFsError::BackendNotFound(scheme.to_string()))?;
        let path = ObjectPath::new(address, Arc::clone(store), Arc::clone(&self.settings))?;
        Ok(CloudPath::from(path))
    }

    /// Like [`resolve`](Self::resolve) but only for object-store schemes.
    pub fn resolve_object(&self, raw: &str) -> CloudFsResult<ObjectPath> {
        match self.resolve(raw)? {
            CloudPath::Gcs(path) | CloudPath::S3(path) | CloudPath::Azure(path) => Ok(path),
            CloudPath::Local(path) => Err(CloudFsError::Unsupported(format!(
                "{} is not an object store address",
                path
            ))),
        }
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut schemes: Vec<&Scheme> = self.stores.keys().collect();
        schemes.sort();
        f.debug_struct("Resolver")
            .field("schemes", &schemes)
            .field("settings", &self.settings)
            .finish()
    }
}
