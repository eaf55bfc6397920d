//! Typed descriptor model.
//!
//! Specs are immutable once built: a run reads them once at start and
//! discards them at shutdown.

pub mod healthcheck;
pub mod port;
pub mod restart;
pub mod service;
pub mod volume;

pub use healthcheck::HealthCheckSpec;
pub use port::{PortMapping, Protocol};
pub use restart::RestartPolicy;
pub use service::{Dependency, DependencyCondition, ImageSource, ServiceSpec};
pub use volume::{MountSource, VolumeMount, VolumeSpec};

use crate::error::{DescriptorError, Result};
use crate::raw::RawDescriptor;
use serde::Serialize;
use std::collections::BTreeMap;

/// A whole orchestration descriptor: one project, its services and its named volumes.
#[derive(Serialize, Debug, Clone)]
pub struct Descriptor {
    name: String,
    services: BTreeMap<String, ServiceSpec>,
    volumes: BTreeMap<String, VolumeSpec>,
}

impl Descriptor {
    pub fn new(
        name: String,
        services: BTreeMap<String, ServiceSpec>,
        volumes: BTreeMap<String, VolumeSpec>,
    ) -> Self {
        Self {
            name,
            services,
            volumes,
        }
    }

    /// Builds the typed descriptor from its raw serde form.
    ///
    /// `default_name` is used when the file has no top-level `name`.
    /// `lookup` resolves pass-through environment entries (`KEY` with no value).
    pub fn from_raw(
        raw: RawDescriptor,
        default_name: &str,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        if raw.services.is_empty() {
            return Err(DescriptorError::NoServices);
        }

        let name = normalize_project_name(raw.name.as_deref().unwrap_or(default_name));

        let mut services = BTreeMap::new();
        for (service_name, raw_service) in raw.services {
            let spec = ServiceSpec::from_raw(&service_name, raw_service, lookup)?;
            services.insert(service_name, spec);
        }

        let volumes = raw
            .volumes
            .into_iter()
            .map(|(key, body)| {
                let external = body.and_then(|b| b.name);
                (key.clone(), VolumeSpec::new(key, external))
            })
            .collect();

        Ok(Self::new(name, services, volumes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn services(&self) -> &BTreeMap<String, ServiceSpec> {
        &self.services
    }

    pub fn service(&self, name: &str) -> Option<&ServiceSpec> {
        self.services.get(name)
    }

    pub fn volumes(&self) -> &BTreeMap<String, VolumeSpec> {
        &self.volumes
    }
}

/// Lowercases and strips everything but `[a-z0-9_-]`, falling back to `default`.
pub fn normalize_project_name(name: &str) -> String {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}
