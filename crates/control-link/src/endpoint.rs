//! Endpoint resolution
//!
//! Turns whatever the operator typed into the settings form (a LAN address,
//! an IPv6 literal, a `host:port` pair or a tunnel hostname) into the control
//! and camera URLs of the vehicle.

use std::net::Ipv6Addr;

use serde::{Deserialize, Serialize};

use crate::{CAMERA_PATH, DEFAULT_CAMERA_PORT, DEFAULT_CONTROL_PORT, EndpointError};

/// Hostname patterns that identify a TLS-terminating tunnel
pub const DEFAULT_TUNNEL_PATTERNS: [&str; 3] = ["*.ngrok-free.app", "*.ngrok-free.dev", "*.ngrok.*"];

const SCHEME_PREFIXES: [&str; 4] = ["https://", "http://", "wss://", "ws://"];

/// Resolver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Tunnel hostname patterns. A leading `*` label matches one or more
    /// labels, any other `*` label matches exactly one.
    pub tunnel_patterns: Vec<String>,
    /// Control port used when the endpoint names none
    pub control_port: u16,
    /// Camera port used when the endpoint names none
    pub camera_port: u16,
    pub camera_path: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            tunnel_patterns: DEFAULT_TUNNEL_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            control_port: DEFAULT_CONTROL_PORT,
            camera_port: DEFAULT_CAMERA_PORT,
            camera_path: CAMERA_PATH.to_string(),
        }
    }
}

/// Transport security of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheme {
    /// Direct connection, `ws://` and `http://`
    Plain,
    /// Public tunnel hostname with TLS, `wss://` and `https://`
    SecureTunnel,
}

/// Resolved vehicle endpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub scheme: Scheme,
    /// Hostname or address; IPv6 literals keep their brackets
    pub host: String,
    /// Control port, `None` for tunnels which route through their own port
    pub port: Option<u16>,
    pub control_url: String,
    pub media_base_url: String,
}

impl EndpointDescriptor {
    pub fn is_secure(&self) -> bool {
        self.scheme == Scheme::SecureTunnel
    }
}

impl std::fmt::Display for EndpointDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (camera: {})", self.control_url, self.media_base_url)
    }
}

/// Resolve a raw endpoint string.
///
/// Pure: the same input and config always yield the same descriptor.
pub fn resolve(raw: &str, config: &ResolverConfig) -> Result<EndpointDescriptor, EndpointError> {
    let authority = strip_decorations(raw);
    if authority.is_empty() {
        return Err(EndpointError::Empty);
    }

    let (host, port_text) = split_host_port(authority)?;
    let path = &config.camera_path;

    // Tunnels route through their own port, so whatever follows ':' is dropped
    if is_tunnel_host(&host, &config.tunnel_patterns) {
        return Ok(EndpointDescriptor {
            scheme: Scheme::SecureTunnel,
            control_url: format!("wss://{host}"),
            media_base_url: format!("https://{host}{path}"),
            host,
            port: None,
        });
    }

    let explicit_port = port_text.map(parse_port).transpose()?;
    let descriptor = match explicit_port {
        // Control and camera share the one listening port
        Some(port) => EndpointDescriptor {
            scheme: Scheme::Plain,
            control_url: format!("ws://{host}:{port}"),
            media_base_url: format!("http://{host}:{port}{path}"),
            host,
            port: Some(port),
        },
        None => EndpointDescriptor {
            scheme: Scheme::Plain,
            control_url: format!("ws://{host}:{}", config.control_port),
            media_base_url: format!("http://{host}:{}{path}", config.camera_port),
            host,
            port: Some(config.control_port),
        },
    };

    Ok(descriptor)
}

/// Trim, drop a scheme prefix, trailing slashes and any path
fn strip_decorations(raw: &str) -> &str {
    let mut rest = raw.trim();

    for prefix in SCHEME_PREFIXES {
        if rest
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        {
            rest = &rest[prefix.len()..];
            break;
        }
    }

    let rest = rest.trim_end_matches('/');
    match rest.find('/') {
        Some(index) => &rest[..index],
        None => rest,
    }
}

/// Split into a validated host and the unparsed text after its port colon
fn split_host_port(authority: &str) -> Result<(String, Option<&str>), EndpointError> {
    if let Some(rest) = authority.strip_prefix('[') {
        let Some(close) = rest.find(']') else {
            return Err(EndpointError::UnterminatedBracket(authority.to_string()));
        };

        let literal = &rest[..close];
        if literal.parse::<Ipv6Addr>().is_err() {
            return Err(EndpointError::InvalidIpv6(literal.to_string()));
        }

        let host = format!("[{}]", literal.to_ascii_lowercase());
        let tail = &rest[close + 1..];
        let port = if tail.is_empty() {
            None
        } else if let Some(port) = tail.strip_prefix(':') {
            Some(port)
        } else {
            return Err(EndpointError::TrailingText(tail.to_string()));
        };

        return Ok((host, port));
    }

    if authority.contains(['[', ']']) {
        return Err(EndpointError::StrayBracket(authority.to_string()));
    }

    // Bare IPv6 literal, no room for a port without brackets
    if authority.parse::<Ipv6Addr>().is_ok() {
        return Ok((format!("[{}]", authority.to_ascii_lowercase()), None));
    }

    match authority.rsplit_once(':') {
        Some((host, port)) => {
            if host.is_empty() {
                return Err(EndpointError::MissingHost);
            }
            if host.contains(':') {
                return Err(EndpointError::InvalidIpv6(authority.to_string()));
            }
            Ok((checked_host(host)?, Some(port)))
        }
        None => Ok((checked_host(authority)?, None)),
    }
}

/// Hostnames and IPv4 addresses: letters, digits, `-`, `_` and `.` only
fn checked_host(host: &str) -> Result<String, EndpointError> {
    let valid = host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(EndpointError::InvalidHost(host.to_string()));
    }
    Ok(host.to_ascii_lowercase())
}

fn parse_port(text: &str) -> Result<u16, EndpointError> {
    text.parse::<u16>()
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| EndpointError::InvalidPort(text.to_string()))
}

fn is_tunnel_host(host: &str, patterns: &[String]) -> bool {
    if host.starts_with('[') {
        return false;
    }

    let host_labels: Vec<&str> = host.split('.').collect();
    patterns
        .iter()
        .any(|pattern| pattern_matches(pattern.trim(), &host_labels))
}

fn pattern_matches(pattern: &str, host_labels: &[&str]) -> bool {
    let pattern_labels: Vec<&str> = pattern.split('.').collect();

    match pattern_labels.split_first() {
        Some((first, suffix)) if *first == "*" => {
            host_labels.len() > suffix.len()
                && labels_match(suffix, &host_labels[host_labels.len() - suffix.len()..])
        }
        _ => labels_match(&pattern_labels, host_labels),
    }
}

fn labels_match(pattern: &[&str], host: &[&str]) -> bool {
    pattern.len() == host.len()
        && pattern
            .iter()
            .zip(host)
            .all(|(p, h)| *p == "*" || p.eq_ignore_ascii_case(h))
}
