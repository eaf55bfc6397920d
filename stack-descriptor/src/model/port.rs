use serde::Serialize;
use std::fmt;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

/// A published port: `[host_ip:][host:]container[/protocol]`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    host_ip: Option<String>,
    host: Option<u16>,
    container: u16,
    protocol: Protocol,
}

impl PortMapping {
    pub fn new(host: Option<u16>, container: u16) -> Self {
        Self {
            host_ip: None,
            host,
            container,
            protocol: Protocol::Tcp,
        }
    }

    /// Parses the short port syntax. Ranges and IPv6 host addresses are not supported.
    pub fn parse(spec: &str) -> Result<Self, String> {
        let spec = spec.trim();
        let (body, protocol) = match spec.rsplit_once('/') {
            Some((body, "tcp")) => (body, Protocol::Tcp),
            Some((body, "udp")) => (body, Protocol::Udp),
            Some((_, other)) => return Err(format!("unsupported protocol '{}'", other)),
            None => (spec, Protocol::Tcp),
        };

        if body.contains('-') {
            return Err("port ranges are not supported".to_string());
        }

        let parts: Vec<&str> = body.split(':').collect();
        let (host_ip, host, container) = match parts.as_slice() {
            [container] => (None, None, *container),
            [host, container] => (None, Some(*host), *container),
            [ip, host, container] => (Some(*ip), Some(*host), *container),
            _ => return Err("expected [host_ip:][host:]container".to_string()),
        };

        let container = parse_port(container)?;
        let host = match host {
            Some(h) if !h.is_empty() => Some(parse_port(h)?),
            _ => None,
        };
        let host_ip = host_ip.filter(|ip| !ip.is_empty()).map(str::to_string);

        Ok(Self {
            host_ip,
            host,
            container,
            protocol,
        })
    }

    pub fn host_ip(&self) -> Option<&str> {
        self.host_ip.as_deref()
    }

    pub fn host(&self) -> Option<u16> {
        self.host
    }

    pub fn container(&self) -> u16 {
        self.container
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.host_ip, self.host) {
            (Some(ip), Some(host)) => write!(f, "{}:{}:", ip, host)?,
            (Some(ip), None) => write!(f, "{}::", ip)?,
            (None, Some(host)) => write!(f, "{}:", host)?,
            (None, None) => {}
        }
        write!(f, "{}", self.container)?;
        if self.protocol == Protocol::Udp {
            write!(f, "/udp")?;
        }
        Ok(())
    }
}

fn parse_port(text: &str) -> Result<u16, String> {
    match text.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(format!("'{}' is not a valid port number", text)),
        Ok(port) => Ok(port),
    }
}
