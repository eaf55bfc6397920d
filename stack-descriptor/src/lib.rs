//! # Stack Descriptor
//!
//! The compose-style orchestration descriptor: services, their probes and
//! dependency conditions, and the named volumes they mount.
//!
//! [`load`] reads a file, resolves `${VAR}` references, builds the typed
//! [`Descriptor`] and rejects anything that must not reach launch.
//! [`DependencyGraph`] turns a valid descriptor into a start order.

pub mod duration;
pub mod endpoint;
pub mod error;
pub mod graph;
pub mod interpolate;
pub mod loader;
pub mod model;
pub mod raw;
pub mod validate;

pub use endpoint::{check_endpoints, Endpoint, EndpointWarning, ServiceReference};
pub use error::{DescriptorError, Result};
pub use graph::DependencyGraph;
pub use loader::{load, parse_str};
pub use model::{
    Dependency, DependencyCondition, Descriptor, HealthCheckSpec, ImageSource, MountSource,
    PortMapping, Protocol, RestartPolicy, ServiceSpec, VolumeMount, VolumeSpec,
};
pub use validate::validate;
