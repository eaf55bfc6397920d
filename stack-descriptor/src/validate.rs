//! Cross-reference checks that need the whole descriptor.

use crate::error::{DescriptorError, Result};
use crate::graph::DependencyGraph;
use crate::model::{Descriptor, DependencyCondition};

/// Rejects descriptors that must never reach launch:
/// dangling or self dependencies, `service_healthy` on a service without a
/// probe, mounts of undeclared volumes, and dependency cycles.
pub fn validate(descriptor: &Descriptor) -> Result<()> {
    for (name, spec) in descriptor.services() {
        for dep in spec.depends_on() {
            if dep.service() == name {
                return Err(DescriptorError::SelfDependency {
                    service: name.clone(),
                });
            }

            let target = descriptor.service(dep.service()).ok_or_else(|| {
                DescriptorError::UndeclaredDependency {
                    service: name.clone(),
                    dependency: dep.service().to_string(),
                }
            })?;

            if dep.condition() == DependencyCondition::ServiceHealthy
                && target.healthcheck().is_none()
            {
                return Err(DescriptorError::MissingHealthCheck {
                    service: name.clone(),
                    dependency: dep.service().to_string(),
                });
            }
        }

        for mount in spec.volumes() {
            if let Some(volume) = mount.volume_name() {
                if !descriptor.volumes().contains_key(volume) {
                    return Err(DescriptorError::UndeclaredVolume {
                        service: name.clone(),
                        volume: volume.to_string(),
                    });
                }
            }
        }
    }

    if let Some(cycle) = DependencyGraph::from_descriptor(descriptor).find_cycle() {
        return Err(DescriptorError::Cycle(cycle));
    }

    Ok(())
}
