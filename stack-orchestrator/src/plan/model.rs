use serde::Serialize;
use stack_descriptor::{Dependency, HealthCheckSpec, PortMapping, RestartPolicy};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

// --- Launch Model (the output of the Plan Engine) ---
// Everything a provider needs, with names and paths already resolved.

#[derive(Serialize, Debug, Clone)]
pub struct LaunchPlan {
    project: String,
    run_id: Uuid,
    root_dir: PathBuf,
    network: String,
    order: Vec<String>,
    layers: Vec<Vec<String>>,
    services: BTreeMap<String, ServiceConfig>,
    volumes: Vec<VolumeConfig>,
}

impl LaunchPlan {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        project: String,
        run_id: Uuid,
        root_dir: PathBuf,
        network: String,
        order: Vec<String>,
        layers: Vec<Vec<String>>,
        services: BTreeMap<String, ServiceConfig>,
        volumes: Vec<VolumeConfig>,
    ) -> Self {
        Self {
            project,
            run_id,
            root_dir,
            network,
            order,
            layers,
            services,
            volumes,
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// The container network all services join, reachable by service name.
    pub fn network(&self) -> &str {
        &self.network
    }

    /// Dependencies first, ties broken by name.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn layers(&self) -> &[Vec<String>] {
        &self.layers
    }

    pub fn services(&self) -> &BTreeMap<String, ServiceConfig> {
        &self.services
    }

    pub fn service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.get(name)
    }

    pub fn volumes(&self) -> &[VolumeConfig] {
        &self.volumes
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct VolumeConfig {
    name: String,
    runtime_name: String,
}

impl VolumeConfig {
    pub fn new(name: String, runtime_name: String) -> Self {
        Self { name, runtime_name }
    }

    /// The key under the descriptor's top-level `volumes`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `<project>_<name>` unless the descriptor pins a name.
    pub fn runtime_name(&self) -> &str {
        &self.runtime_name
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MountSource {
    Volume { name: String, runtime_name: String },
    Host { path: PathBuf },
    Anonymous,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MountConfig {
    source: MountSource,
    target: String,
    read_only: bool,
}

impl MountConfig {
    pub fn new(source: MountSource, target: String, read_only: bool) -> Self {
        Self {
            source,
            target,
            read_only,
        }
    }

    pub fn source(&self) -> &MountSource {
        &self.source
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// The `-v` argument for `docker run`.
    pub fn to_volume_arg(&self) -> String {
        let mut arg = match &self.source {
            MountSource::Volume { runtime_name, .. } => format!("{}:{}", runtime_name, self.target),
            MountSource::Host { path } => format!("{}:{}", path.display(), self.target),
            MountSource::Anonymous => self.target.clone(),
        };
        if self.read_only && !matches!(self.source, MountSource::Anonymous) {
            arg.push_str(":ro");
        }
        arg
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct BuildConfig {
    context: PathBuf,
    dockerfile: Option<String>,
    tag: String,
}

impl BuildConfig {
    pub fn new(context: PathBuf, dockerfile: Option<String>, tag: String) -> Self {
        Self {
            context,
            dockerfile,
            tag,
        }
    }

    pub fn context(&self) -> &Path {
        &self.context
    }

    pub fn dockerfile(&self) -> Option<&str> {
        self.dockerfile.as_deref()
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

/// One service, ready to hand to a provider.
#[derive(Serialize, Debug, Clone)]
pub struct ServiceConfig {
    name: String,
    container_name: String,
    image: Option<String>,
    build: Option<BuildConfig>,
    command: Option<Vec<String>>,
    working_dir: Option<String>,
    host_dir: PathBuf,
    network: Option<String>,
    env: BTreeMap<String, String>,
    ports: Vec<PortMapping>,
    mounts: Vec<MountConfig>,
    restart: RestartPolicy,
    healthcheck: Option<HealthCheckSpec>,
    depends_on: Vec<Dependency>,
}

impl ServiceConfig {
    /// A service with only a name and a host directory; fill it with the `with_*` builders.
    pub fn new(name: impl Into<String>, host_dir: PathBuf) -> Self {
        let name = name.into();
        Self {
            container_name: name.clone(),
            name,
            image: None,
            build: None,
            command: None,
            working_dir: None,
            host_dir,
            network: None,
            env: BTreeMap::new(),
            ports: Vec::new(),
            mounts: Vec::new(),
            restart: RestartPolicy::Never,
            healthcheck: None,
            depends_on: Vec::new(),
        }
    }

    pub fn with_container_name(mut self, container_name: impl Into<String>) -> Self {
        self.container_name = container_name.into();
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_build(mut self, build: BuildConfig) -> Self {
        self.image = Some(build.tag().to_string());
        self.build = Some(build);
        self
    }

    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = Some(command);
        self
    }

    pub fn with_working_dir(mut self, working_dir: impl Into<String>) -> Self {
        self.working_dir = Some(working_dir.into());
        self
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_ports(mut self, ports: Vec<PortMapping>) -> Self {
        self.ports = ports;
        self
    }

    pub fn with_mount(mut self, mount: MountConfig) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }

    pub fn with_healthcheck(mut self, check: Option<HealthCheckSpec>) -> Self {
        self.healthcheck = check;
        self
    }

    pub fn with_dependencies(mut self, depends_on: Vec<Dependency>) -> Self {
        self.depends_on = depends_on;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn container_name(&self) -> &str {
        &self.container_name
    }

    /// The image to run: the pulled reference, or the tag of a local build.
    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    pub fn build(&self) -> Option<&BuildConfig> {
        self.build.as_ref()
    }

    pub fn command(&self) -> Option<&[String]> {
        self.command.as_deref()
    }

    /// Working directory inside the container, as declared.
    pub fn working_dir(&self) -> Option<&str> {
        self.working_dir.as_deref()
    }

    /// Working directory for host processes and host-side probes.
    pub fn host_dir(&self) -> &Path {
        &self.host_dir
    }

    pub fn network(&self) -> Option<&str> {
        self.network.as_deref()
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn ports(&self) -> &[PortMapping] {
        &self.ports
    }

    pub fn mounts(&self) -> &[MountConfig] {
        &self.mounts
    }

    pub fn restart(&self) -> RestartPolicy {
        self.restart
    }

    pub fn healthcheck(&self) -> Option<&HealthCheckSpec> {
        self.healthcheck.as_ref()
    }

    pub fn depends_on(&self) -> &[Dependency] {
        &self.depends_on
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_args() {
        let named = MountConfig::new(
            MountSource::Volume {
                name: "pgdata".into(),
                runtime_name: "shop_pgdata".into(),
            },
            "/var/lib/postgresql/data".into(),
            false,
        );
        assert_eq!(named.to_volume_arg(), "shop_pgdata:/var/lib/postgresql/data");

        let bind = MountConfig::new(
            MountSource::Host {
                path: PathBuf::from("/srv/app"),
            },
            "/app".into(),
            true,
        );
        assert_eq!(bind.to_volume_arg(), "/srv/app:/app:ro");

        let anon = MountConfig::new(MountSource::Anonymous, "/cache".into(), true);
        assert_eq!(anon.to_volume_arg(), "/cache");
    }
}
