use crate::config::RuntimeKind;
use crate::plan::model::{
    BuildConfig, LaunchPlan, MountConfig, MountSource, ServiceConfig, VolumeConfig,
};
use anyhow::{Context, Result};
use crate::runtime::local::volume_env_var;
use log::{info, warn};
use stack_descriptor::model::normalize_project_name;
use stack_descriptor::{DependencyGraph, Descriptor, ImageSource, ServiceSpec};
use stack_descriptor::MountSource as DescriptorMount;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// The Pure Logic Core: descriptor in, launch plan out. No I/O.
pub struct PlanEngine;

impl PlanEngine {
    /// Resolves a validated descriptor into a launch plan.
    ///
    /// `root_dir` anchors relative build contexts and bind mounts.
    /// `project` overrides the descriptor's project name.
    pub fn resolve(
        descriptor: &Descriptor,
        root_dir: &Path,
        project: Option<&str>,
    ) -> Result<LaunchPlan> {
        let project = match project {
            Some(name) => normalize_project_name(name),
            None => descriptor.name().to_string(),
        };

        let graph = DependencyGraph::from_descriptor(descriptor);
        let layers = graph
            .layers()
            .context("Failed to order services by dependency")?;
        let order: Vec<String> = layers.iter().flatten().cloned().collect();

        let volumes: Vec<VolumeConfig> = descriptor
            .volumes()
            .values()
            .map(|v| {
                let runtime_name = v
                    .external_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{}_{}", project, v.name()));
                VolumeConfig::new(v.name().to_string(), runtime_name)
            })
            .collect();
        let runtime_names: BTreeMap<&str, &str> = volumes
            .iter()
            .map(|v| (v.name(), v.runtime_name()))
            .collect();

        let network = format!("{}_default", project);
        let mut services = BTreeMap::new();
        for (name, spec) in descriptor.services() {
            let config = Self::resolve_service(&project, root_dir, spec, &runtime_names)?
                .with_network(network.clone());
            services.insert(name.clone(), config);
        }

        Ok(LaunchPlan::new(
            project.clone(),
            Uuid::new_v4(),
            root_dir.to_path_buf(),
            network,
            order,
            layers,
            services,
            volumes,
        ))
    }

    /// Rejects plans the chosen runtime cannot launch.
    pub fn check_runtime(plan: &LaunchPlan, runtime: RuntimeKind) -> Result<()> {
        for (name, service) in plan.services() {
            match runtime {
                RuntimeKind::Local => {
                    if service.command().is_none() {
                        anyhow::bail!(
                            "Service '{}' has no 'command' and cannot run on the local runtime",
                            name
                        );
                    }
                    for mount in service.mounts() {
                        match mount.source() {
                            MountSource::Anonymous => anyhow::bail!(
                                "Service '{}' mounts an anonymous volume at '{}', which the local runtime cannot provide",
                                name,
                                mount.target()
                            ),
                            MountSource::Volume { name: volume, .. } => warn!(
                                "Plan: '{}' runs on the host, so volume '{}' is not mounted at '{}'; its directory is in ${}",
                                name,
                                volume,
                                mount.target(),
                                volume_env_var(volume)
                            ),
                            MountSource::Host { path } => warn!(
                                "Plan: '{}' runs on the host, so {} is not mounted at '{}'",
                                name,
                                path.display(),
                                mount.target()
                            ),
                        }
                    }
                }
                RuntimeKind::Docker => {
                    if service.image().is_none() {
                        anyhow::bail!(
                            "Service '{}' needs 'image' or 'build' to run on the docker runtime",
                            name
                        );
                    }
                }
            }
        }
        Ok(())
    }

    // --- Internal Helpers ---

    fn resolve_service(
        project: &str,
        root_dir: &Path,
        spec: &ServiceSpec,
        runtime_names: &BTreeMap<&str, &str>,
    ) -> Result<ServiceConfig> {
        let name = spec.name();
        let host_dir = match spec.working_dir() {
            Some(dir) => Self::host_path(root_dir, dir),
            None => root_dir.to_path_buf(),
        };

        let container_name = spec
            .container_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-{}-1", project, name));

        let mut config = ServiceConfig::new(name, host_dir)
            .with_container_name(container_name)
            .with_env(spec.environment().clone())
            .with_ports(spec.ports().to_vec())
            .with_restart(spec.restart())
            .with_healthcheck(spec.healthcheck().cloned())
            .with_dependencies(spec.depends_on().to_vec());

        match spec.source() {
            Some(ImageSource::Image { reference }) => config = config.with_image(reference),
            Some(ImageSource::Build {
                context,
                dockerfile,
                tag,
            }) => {
                let tag = tag
                    .clone()
                    .unwrap_or_else(|| format!("{}-{}", project, name));
                config = config.with_build(BuildConfig::new(
                    Self::host_path(root_dir, context),
                    dockerfile.clone(),
                    tag,
                ));
            }
            None => {}
        }

        if let Some(command) = spec.command() {
            config = config.with_command(command.to_vec());
        }
        if let Some(dir) = spec.working_dir() {
            config = config.with_working_dir(dir);
        }

        for mount in spec.volumes() {
            let source = match mount.source() {
                DescriptorMount::Named(volume) => {
                    let runtime_name = runtime_names.get(volume.as_str()).with_context(|| {
                        format!("Service '{}' mounts unknown volume '{}'", name, volume)
                    })?;
                    MountSource::Volume {
                        name: volume.clone(),
                        runtime_name: runtime_name.to_string(),
                    }
                }
                DescriptorMount::Bind(path) => MountSource::Host {
                    path: Self::host_path(root_dir, path),
                },
                DescriptorMount::Anonymous => MountSource::Anonymous,
            };
            config = config.with_mount(MountConfig::new(
                source,
                mount.target().to_string(),
                mount.read_only(),
            ));
        }

        for port in spec.ports() {
            if let Some(host) = port.host() {
                info!(
                    "Plan: '{}' publishes container port {} on host port {}",
                    name,
                    port.container(),
                    host
                );
            }
        }

        Ok(config)
    }

    /// Resolves `~/...` against `$HOME` and relative paths against `root_dir`.
    fn host_path(root_dir: &Path, path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = std::env::var_os("HOME") {
                return PathBuf::from(home).join(rest);
            }
        }
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            let joined = root_dir.join(candidate);
            // Drop `./` segments so logs and docker args read cleanly.
            joined.components().collect()
        }
    }
}
