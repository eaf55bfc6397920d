use super::{HealthCheckSpec, PortMapping, RestartPolicy, VolumeMount};
use crate::error::{DescriptorError, Result};
use crate::raw::{MapOrList, RawBuild, RawDependsOn, RawService, StringOrList};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The predicate a dependency must satisfy before its dependent may start.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DependencyCondition {
    /// Satisfied as soon as the dependency's process is launched.
    ServiceStarted,
    /// Satisfied once the dependency's readiness probe succeeds.
    ServiceHealthy,
}

impl std::fmt::Display for DependencyCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ServiceStarted => f.write_str("service_started"),
            Self::ServiceHealthy => f.write_str("service_healthy"),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    service: String,
    condition: DependencyCondition,
}

impl Dependency {
    pub fn new(service: impl Into<String>, condition: DependencyCondition) -> Self {
        Self {
            service: service.into(),
            condition,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn condition(&self) -> DependencyCondition {
        self.condition
    }
}

/// Where the service image comes from.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ImageSource {
    /// Pulled by reference.
    Image { reference: String },
    /// Built locally from a context. `tag` is the `image:` key when both are given.
    Build {
        context: String,
        dockerfile: Option<String>,
        tag: Option<String>,
    },
}

/// One entry of the `services` collection.
#[derive(Serialize, Debug, Clone)]
pub struct ServiceSpec {
    name: String,
    source: Option<ImageSource>,
    command: Option<Vec<String>>,
    container_name: Option<String>,
    working_dir: Option<String>,
    environment: BTreeMap<String, String>,
    ports: Vec<PortMapping>,
    volumes: Vec<VolumeMount>,
    restart: RestartPolicy,
    healthcheck: Option<HealthCheckSpec>,
    depends_on: Vec<Dependency>,
}

impl ServiceSpec {
    /// A bare service with nothing but a name; fill it with the `with_*` builders.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
            command: None,
            container_name: None,
            working_dir: None,
            environment: BTreeMap::new(),
            ports: Vec::new(),
            volumes: Vec::new(),
            restart: RestartPolicy::Never,
            healthcheck: None,
            depends_on: Vec::new(),
        }
    }

    pub fn with_image(mut self, reference: impl Into<String>) -> Self {
        self.source = Some(ImageSource::Image {
            reference: reference.into(),
        });
        self
    }

    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = Some(command);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn with_port(mut self, port: PortMapping) -> Self {
        self.ports.push(port);
        self
    }

    pub fn with_volume(mut self, mount: VolumeMount) -> Self {
        self.volumes.push(mount);
        self
    }

    pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }

    pub fn with_healthcheck(mut self, check: HealthCheckSpec) -> Self {
        self.healthcheck = Some(check);
        self
    }

    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.depends_on.push(dependency);
        self
    }

    pub(crate) fn from_raw(
        name: &str,
        raw: RawService,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        if !is_service_name(name) {
            return Err(DescriptorError::InvalidServiceName(name.to_string()));
        }

        let source = match (raw.build, raw.image) {
            (Some(build), tag) => {
                let (context, dockerfile) = match build {
                    RawBuild::Context(context) => (context, None),
                    RawBuild::Detailed {
                        context,
                        dockerfile,
                    } => (context, dockerfile),
                };
                Some(ImageSource::Build {
                    context,
                    dockerfile,
                    tag,
                })
            }
            (None, Some(reference)) => Some(ImageSource::Image { reference }),
            (None, None) => None,
        };

        let command = match raw.command {
            None => None,
            Some(StringOrList::List(argv)) if argv.is_empty() => {
                return Err(DescriptorError::InvalidCommand {
                    service: name.to_string(),
                    reason: "empty command".to_string(),
                })
            }
            Some(StringOrList::List(argv)) => Some(argv),
            Some(StringOrList::String(line)) => {
                let argv = split_command(&line).map_err(|reason| {
                    DescriptorError::InvalidCommand {
                        service: name.to_string(),
                        reason,
                    }
                })?;
                if argv.is_empty() {
                    return Err(DescriptorError::InvalidCommand {
                        service: name.to_string(),
                        reason: "empty command".to_string(),
                    });
                }
                Some(argv)
            }
        };

        let environment = match raw.environment {
            None => BTreeMap::new(),
            Some(env) => parse_environment(name, env, lookup)?,
        };

        let ports = raw
            .ports
            .iter()
            .map(|entry| {
                let spec = entry.to_text();
                PortMapping::parse(&spec).map_err(|reason| DescriptorError::InvalidPort {
                    service: name.to_string(),
                    spec,
                    reason,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let volumes = raw
            .volumes
            .iter()
            .map(|spec| {
                VolumeMount::parse(spec).ok_or_else(|| DescriptorError::InvalidVolume {
                    service: name.to_string(),
                    spec: spec.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let restart = match raw.restart {
            None => RestartPolicy::Never,
            Some(value) => {
                RestartPolicy::parse(&value).ok_or_else(|| DescriptorError::InvalidRestartPolicy {
                    service: name.to_string(),
                    value,
                })?
            }
        };

        let healthcheck = match raw.healthcheck {
            None => None,
            Some(check) => HealthCheckSpec::from_raw(name, check)?,
        };

        let depends_on = match raw.depends_on {
            None => Vec::new(),
            Some(RawDependsOn::List(names)) => {
                let mut deps: Vec<Dependency> = Vec::new();
                for dep in names {
                    if !deps.iter().any(|d| d.service() == dep) {
                        deps.push(Dependency::new(dep, DependencyCondition::ServiceStarted));
                    }
                }
                deps
            }
            Some(RawDependsOn::Map(entries)) => entries
                .into_iter()
                .map(|(dep, settings)| {
                    Dependency::new(
                        dep,
                        settings
                            .condition
                            .unwrap_or(DependencyCondition::ServiceStarted),
                    )
                })
                .collect(),
        };

        Ok(Self {
            name: name.to_string(),
            source,
            command,
            container_name: raw.container_name,
            working_dir: raw.working_dir,
            environment,
            ports,
            volumes,
            restart,
            healthcheck,
            depends_on,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> Option<&ImageSource> {
        self.source.as_ref()
    }

    pub fn command(&self) -> Option<&[String]> {
        self.command.as_deref()
    }

    pub fn container_name(&self) -> Option<&str> {
        self.container_name.as_deref()
    }

    pub fn working_dir(&self) -> Option<&str> {
        self.working_dir.as_deref()
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }

    pub fn ports(&self) -> &[PortMapping] {
        &self.ports
    }

    pub fn volumes(&self) -> &[VolumeMount] {
        &self.volumes
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

fn is_service_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

fn parse_environment(
    service: &str,
    env: MapOrList,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    match env {
        MapOrList::Map(entries) => {
            for (key, value) in entries {
                // `KEY:` with no value passes the orchestrator's own variable through.
                let resolved = match value {
                    Some(scalar) => Some(scalar.to_text()),
                    None => lookup(&key),
                };
                if let Some(v) = resolved {
                    out.insert(key, v);
                }
            }
        }
        MapOrList::List(entries) => {
            for entry in entries {
                let (key, value) = match entry.split_once('=') {
                    Some((k, v)) => (k.to_string(), Some(v.to_string())),
                    None => (entry.clone(), lookup(&entry)),
                };
                if key.trim().is_empty() {
                    return Err(DescriptorError::InvalidEnvEntry {
                        service: service.to_string(),
                        entry,
                    });
                }
                if out.contains_key(&key) {
                    return Err(DescriptorError::DuplicateEnvKey {
                        service: service.to_string(),
                        key,
                    });
                }
                if let Some(v) = value {
                    out.insert(key, v);
                }
            }
        }
    }
    Ok(out)
}

/// Splits a command line into words, honoring single quotes, double quotes and backslashes.
pub fn split_command(line: &str) -> std::result::Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => return Err("unbalanced single quote".to_string()),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch) => current.push(ch),
                            None => return Err("dangling backslash".to_string()),
                        },
                        Some(ch) => current.push(ch),
                        None => return Err("unbalanced double quote".to_string()),
                    }
                }
            }
            '\\' => {
                in_word = true;
                match chars.next() {
                    Some(ch) => current.push(ch),
                    None => return Err("dangling backslash".to_string()),
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::Scalar;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn splits_command_lines() {
        assert_eq!(
            split_command("uvicorn main:app --host 0.0.0.0 --port 8000").unwrap(),
            vec!["uvicorn", "main:app", "--host", "0.0.0.0", "--port", "8000"]
        );
        assert_eq!(
            split_command(r#"sh -c 'echo "hi there"' "a b""#).unwrap(),
            vec!["sh", "-c", r#"echo "hi there""#, "a b"]
        );
        assert_eq!(split_command("''").unwrap(), vec![""]);
        assert!(split_command("echo 'oops").is_err());
    }

    #[test]
    fn environment_list_rejects_duplicates() {
        let env = MapOrList::List(vec!["A=1".into(), "A=2".into()]);
        assert!(matches!(
            parse_environment("api", env, &no_env),
            Err(DescriptorError::DuplicateEnvKey { .. })
        ));
    }

    #[test]
    fn environment_map_stringifies_scalars_and_passes_through() {
        let mut entries = BTreeMap::new();
        entries.insert("PORT".to_string(), Some(Scalar::Integer(5432)));
        entries.insert("DEBUG".to_string(), Some(Scalar::Bool(true)));
        entries.insert("HOME_DIR".to_string(), None);
        entries.insert("UNSET".to_string(), None);

        let lookup = |key: &str| (key == "HOME_DIR").then(|| "/home/app".to_string());
        let env = parse_environment("api", MapOrList::Map(entries), &lookup).unwrap();

        assert_eq!(env.get("PORT").map(String::as_str), Some("5432"));
        assert_eq!(env.get("DEBUG").map(String::as_str), Some("true"));
        assert_eq!(env.get("HOME_DIR").map(String::as_str), Some("/home/app"));
        assert!(!env.contains_key("UNSET"));
    }

    #[test]
    fn list_depends_on_means_started() {
        let raw = RawService {
            image: Some("nginx".into()),
            depends_on: Some(RawDependsOn::List(vec!["db".into(), "db".into()])),
            ..Default::default()
        };
        let spec = ServiceSpec::from_raw("web", raw, &no_env).unwrap();
        assert_eq!(
            spec.depends_on(),
            &[Dependency::new("db", DependencyCondition::ServiceStarted)]
        );
    }

    #[test]
    fn build_with_image_becomes_tagged_build() {
        let raw = RawService {
            image: Some("backend:dev".into()),
            build: Some(RawBuild::Context("./backend".into())),
            ..Default::default()
        };
        let spec = ServiceSpec::from_raw("api", raw, &no_env).unwrap();
        assert_eq!(
            spec.source(),
            Some(&ImageSource::Build {
                context: "./backend".into(),
                dockerfile: None,
                tag: Some("backend:dev".into()),
            })
        );
    }

    #[test]
    fn rejects_bad_service_names() {
        assert!(matches!(
            ServiceSpec::from_raw("bad name", RawService::default(), &no_env),
            Err(DescriptorError::InvalidServiceName(_))
        ));
    }
}
