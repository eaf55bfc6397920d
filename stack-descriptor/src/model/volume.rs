use serde::Serialize;

/// A top-level named volume declaration.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct VolumeSpec {
    name: String,
    external_name: Option<String>,
}

impl VolumeSpec {
    pub fn new(name: String, external_name: Option<String>) -> Self {
        Self {
            name,
            external_name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The runtime-level name, when the descriptor pins one with `name:`.
    pub fn external_name(&self) -> Option<&str> {
        self.external_name.as_deref()
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", content = "source", rename_all = "lowercase")]
pub enum MountSource {
    /// A top-level named volume.
    Named(String),
    /// A host path, relative paths resolved against the descriptor directory.
    Bind(String),
    /// A throwaway volume with no source (`/data`).
    Anonymous,
}

/// One `volumes:` entry of a service: `source:target[:ro|rw]`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    source: MountSource,
    target: String,
    read_only: bool,
}

impl VolumeMount {
    pub fn new(source: MountSource, target: String, read_only: bool) -> Self {
        Self {
            source,
            target,
            read_only,
        }
    }

    pub fn parse(spec: &str) -> Option<Self> {
        let parts: Vec<&str> = spec.trim().split(':').collect();
        let (source, target, mode) = match parts.as_slice() {
            [target] => (None, *target, None),
            [source, target] => (Some(*source), *target, None),
            [source, target, mode] => (Some(*source), *target, Some(*mode)),
            _ => return None,
        };

        if !target.starts_with('/') {
            return None;
        }

        let read_only = match mode {
            None => false,
            Some(mode) => {
                let flags: Vec<&str> = mode.split(',').collect();
                if flags
                    .iter()
                    .any(|f| !matches!(*f, "ro" | "rw" | "z" | "Z" | "cached" | "delegated"))
                {
                    return None;
                }
                flags.contains(&"ro")
            }
        };

        let source = match source {
            None => MountSource::Anonymous,
            Some(s) if s.starts_with('.') || s.starts_with('/') || s.starts_with('~') => {
                MountSource::Bind(s.to_string())
            }
            Some(s) if is_volume_name(s) => MountSource::Named(s.to_string()),
            Some(_) => return None,
        };

        Some(Self::new(source, target.to_string(), read_only))
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

    pub fn volume_name(&self) -> Option<&str> {
        match &self.source {
            MountSource::Named(name) => Some(name),
            _ => None,
        }
    }
}

fn is_volume_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_bind_and_anonymous() {
        let named = VolumeMount::parse("pgdata:/var/lib/postgresql/data").unwrap();
        assert_eq!(named.volume_name(), Some("pgdata"));
        assert!(!named.read_only());

        let bind = VolumeMount::parse("./backend:/app:ro").unwrap();
        assert_eq!(bind.source(), &MountSource::Bind("./backend".into()));
        assert!(bind.read_only());

        let anon = VolumeMount::parse("/cache").unwrap();
        assert_eq!(anon.source(), &MountSource::Anonymous);
    }

    #[test]
    fn rejects_malformed_mounts() {
        assert!(VolumeMount::parse("pgdata:relative/path").is_none());
        assert!(VolumeMount::parse("pgdata:/data:bogus").is_none());
        assert!(VolumeMount::parse("bad name:/data").is_none());
        assert!(VolumeMount::parse("a:/b:ro:extra").is_none());
    }
}
