use std::path::PathBuf;
use thiserror::Error;

/// Every way a descriptor can be rejected before a single service starts.
#[derive(Error, Debug)]
pub enum DescriptorError {
    /// The descriptor file could not be read.
    #[error("Failed to read descriptor {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The YAML is not valid or does not match the descriptor layout.
    #[error("Malformed descriptor: {0}")]
    Malformed(#[from] serde_yaml::Error),

    /// The descriptor has an empty `services` collection.
    #[error("Descriptor declares no services")]
    NoServices,

    #[error("Invalid service name '{0}' (allowed: letters, digits, '.', '_', '-')")]
    InvalidServiceName(String),

    #[error("Service '{service}': invalid port '{spec}': {reason}")]
    InvalidPort {
        service: String,
        spec: String,
        reason: String,
    },

    #[error("Service '{service}': invalid volume mount '{spec}'")]
    InvalidVolume { service: String, spec: String },

    /// A named mount points at a volume missing from the top-level `volumes`.
    #[error("Service '{service}' mounts undeclared volume '{volume}'")]
    UndeclaredVolume { service: String, volume: String },

    #[error("Service '{service}' depends on undeclared service '{dependency}'")]
    UndeclaredDependency { service: String, dependency: String },

    #[error("Service '{service}' depends on itself")]
    SelfDependency { service: String },

    /// `condition: service_healthy` on a dependency that has no probe.
    #[error(
        "Service '{service}' waits for '{dependency}' to be healthy, but '{dependency}' declares no healthcheck"
    )]
    MissingHealthCheck { service: String, dependency: String },

    /// The dependency graph is not a DAG. Holds the cycle path, first node repeated last.
    #[error("Dependency cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("Service '{service}': duplicate environment key '{key}'")]
    DuplicateEnvKey { service: String, key: String },

    #[error("Service '{service}': invalid environment entry '{entry}'")]
    InvalidEnvEntry { service: String, entry: String },

    #[error("Service '{service}': invalid duration '{value}' for '{field}'")]
    InvalidDuration {
        service: String,
        field: String,
        value: String,
    },

    #[error("Service '{service}': invalid healthcheck: {reason}")]
    InvalidHealthCheck { service: String, reason: String },

    #[error("Service '{service}': unknown restart policy '{value}'")]
    InvalidRestartPolicy { service: String, value: String },

    #[error("Service '{service}': invalid command: {reason}")]
    InvalidCommand { service: String, reason: String },

    /// Unterminated or malformed `${...}` expression.
    #[error("Invalid interpolation: {0}")]
    Interpolation(String),

    /// `${NAME:?message}` with `NAME` unset.
    #[error("Required variable '{name}' is missing: {message}")]
    MissingVariable { name: String, message: String },
}

/// A specialized Result type for descriptor operations.
pub type Result<T> = std::result::Result<T, DescriptorError>;
