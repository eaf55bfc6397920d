//! Connection strings found in service environments.
//!
//! Services reach each other by service name, so a value such as
//! `postgresql+asyncpg://user:password@db:5432/app` is a reference from the
//! owning service to `db` on port 5432. Extracting these lets the tooling
//! check that the referenced port is one the target actually exposes.

use crate::model::{DependencyCondition, Descriptor};
use serde::Serialize;
use std::fmt;

/// The parts of `scheme://[user[:password]@]host[:port][/path]` we care about.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    scheme: String,
    user: Option<String>,
    host: String,
    port: Option<u16>,
    path: Option<String>,
}

impl Endpoint {
    pub fn parse(value: &str) -> Option<Self> {
        let (scheme, rest) = value.trim().split_once("://")?;
        if scheme.is_empty()
            || !scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return None;
        }

        let (authority, path) = match rest.find(['/', '?']) {
            Some(idx) => (&rest[..idx], Some(rest[idx..].to_string())),
            None => (rest, None),
        };

        // The password may itself contain '@', so split on the last one.
        let (userinfo, hostport) = match authority.rsplit_once('@') {
            Some((info, hp)) => (Some(info), hp),
            None => (None, authority),
        };
        let user = userinfo.map(|info| info.split(':').next().unwrap_or_default().to_string());

        let (host, port) = match hostport.rsplit_once(':') {
            Some((h, p)) => (h, Some(p.parse::<u16>().ok()?)),
            None => (hostport, None),
        };
        if host.is_empty() {
            return None;
        }

        Some(Self {
            scheme: scheme.to_string(),
            user,
            host: host.to_string(),
            port,
            path,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }
}

/// An environment variable of `service` that points at another declared service.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ServiceReference {
    pub service: String,
    pub variable: String,
    pub target: String,
    pub endpoint: Endpoint,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndpointWarning {
    /// The port is not among the target's declared container ports.
    PortNotExposed {
        reference: ServiceReference,
        exposed: Vec<u16>,
    },
    /// The owner talks to the target without waiting for it.
    MissingDependency { reference: ServiceReference },
}

impl fmt::Display for EndpointWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PortNotExposed { reference, exposed } => write!(
                f,
                "{}.{} targets {}:{} but '{}' exposes {:?}",
                reference.service,
                reference.variable,
                reference.target,
                reference.endpoint.port().unwrap_or_default(),
                reference.target,
                exposed
            ),
            Self::MissingDependency { reference } => write!(
                f,
                "{}.{} targets '{}' but '{}' does not depend on it",
                reference.service, reference.variable, reference.target, reference.service
            ),
        }
    }
}

/// Every environment value, across all services, whose host is a declared service name.
pub fn service_references(descriptor: &Descriptor) -> Vec<ServiceReference> {
    let mut refs = Vec::new();
    for (name, spec) in descriptor.services() {
        for (variable, value) in spec.environment() {
            let Some(endpoint) = Endpoint::parse(value) else {
                continue;
            };
            if descriptor.service(endpoint.host()).is_some() {
                refs.push(ServiceReference {
                    service: name.clone(),
                    variable: variable.clone(),
                    target: endpoint.host().to_string(),
                    endpoint,
                });
            }
        }
    }
    refs
}

/// Checks each reference against the target's container ports and the owner's `depends_on`.
///
/// A target that declares no ports is not checked for ports: it may listen
/// on the service network without publishing anything.
pub fn check_endpoints(descriptor: &Descriptor) -> Vec<EndpointWarning> {
    let mut warnings = Vec::new();
    for reference in service_references(descriptor) {
        let (Some(owner), Some(target)) = (
            descriptor.service(&reference.service),
            descriptor.service(&reference.target),
        ) else {
            continue;
        };

        let exposed: Vec<u16> = target.ports().iter().map(|p| p.container()).collect();
        let port_ok = match reference.endpoint.port() {
            Some(port) => exposed.is_empty() || exposed.contains(&port),
            None => true,
        };

        let depends = owner.depends_on().iter().any(|d| {
            d.service() == reference.target
                && matches!(
                    d.condition(),
                    DependencyCondition::ServiceStarted | DependencyCondition::ServiceHealthy
                )
        });

        if !port_ok {
            warnings.push(EndpointWarning::PortNotExposed {
                reference: reference.clone(),
                exposed,
            });
        }
        if !depends && reference.service != reference.target {
            warnings.push(EndpointWarning::MissingDependency { reference });
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_driver_qualified_urls() {
        let ep = Endpoint::parse("postgresql+asyncpg://user:password@db:5432/dbname").unwrap();
        assert_eq!(
            ep,
            Endpoint {
                scheme: "postgresql+asyncpg".into(),
                user: Some("user".into()),
                host: "db".into(),
                port: Some(5432),
                path: Some("/dbname".into()),
            }
        );
    }

    #[test]
    fn handles_missing_parts() {
        let ep = Endpoint::parse("redis://cache").unwrap();
        assert_eq!(ep.host(), "cache");
        assert_eq!(ep.port(), None);
        assert_eq!(ep.user, None);

        let at_in_password = Endpoint::parse("amqp://u:p@ss@broker:5672").unwrap();
        assert_eq!(at_in_password.host(), "broker");
    }

    #[test]
    fn rejects_non_urls() {
        assert!(Endpoint::parse("plain value").is_none());
        assert!(Endpoint::parse("http://:80").is_none());
        assert!(Endpoint::parse("http://db:notaport").is_none());
    }
}
