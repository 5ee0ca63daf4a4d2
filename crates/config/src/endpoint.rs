//! Endpoint descriptors.
//!
//! Listening endpoints:
//!
//! ```text
//! tcp:8080
//! tcp:port=8080:interface=127.0.0.1
//! 127.0.0.1:8080
//! ```
//!
//! Dial targets:
//!
//! ```text
//! tcp:host=amp.internal:port=9000
//! tcp:amp.internal:9000
//! amp.internal:9000
//! ```
//!
//! A literal `:` inside a descriptor field is escaped as `\:`, as in
//! `tcp:port=80:interface=\:\:1`.

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const TCP_SCHEME: &str = "tcp";

/// Split a descriptor on unescaped `:`, resolving `\x` escapes.
fn split_fields(descriptor: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = descriptor.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            },
            ':' => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}

fn escape(field: &str) -> String {
    field.replace('\\', "\\\\").replace(':', "\\:")
}

fn parse_port(descriptor: &str, value: &str) -> Result<u16> {
    value
        .parse()
        .map_err(|_| Error::invalid_endpoint(descriptor, format!("bad port {value:?}")))
}

/// The fields after `tcp:`, or `None` for the bare `host:port` shorthand.
fn tcp_fields(descriptor: &str) -> Result<Option<Vec<String>>> {
    let mut fields = split_fields(descriptor);
    if fields.len() < 2 {
        return Ok(None);
    }
    let scheme = fields[0].to_ascii_lowercase();
    if scheme == TCP_SCHEME {
        fields.remove(0);
        return Ok(Some(fields));
    }
    let looks_like_host_port = fields.len() == 2 && fields[1].parse::<u16>().is_ok();
    if looks_like_host_port || descriptor.starts_with('[') {
        Ok(None)
    } else {
        Err(Error::invalid_endpoint(
            descriptor,
            format!("unsupported endpoint type {:?}", fields[0]),
        ))
    }
}

// ── Listening endpoints ──────────────────────────────────────────────────────

/// Where a service accepts connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ListenEndpoint {
    pub interface: IpAddr,
    pub port: u16,
}

impl ListenEndpoint {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.interface, self.port)
    }
}

impl FromStr for ListenEndpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let Some(fields) = tcp_fields(s)? else {
            if let Ok(port) = s.parse::<u16>() {
                return Ok(Self {
                    interface: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                    port,
                });
            }
            let addr: SocketAddr = s
                .parse()
                .map_err(|_| Error::invalid_endpoint(s, "expected <ip>:<port>"))?;
            return Ok(Self {
                interface: addr.ip(),
                port: addr.port(),
            });
        };

        let mut port = None;
        let mut interface = None;
        for (index, field) in fields.iter().enumerate() {
            match field.split_once('=') {
                Some(("port", value)) => port = Some(parse_port(s, value)?),
                Some(("interface", value)) => {
                    interface = Some(value.parse::<IpAddr>().map_err(|_| {
                        Error::invalid_endpoint(s, format!("bad interface {value:?}"))
                    })?);
                },
                Some((key, _)) => {
                    return Err(Error::invalid_endpoint(s, format!("unknown option {key:?}")));
                },
                None if index == 0 => port = Some(parse_port(s, field)?),
                None => {
                    return Err(Error::invalid_endpoint(
                        s,
                        format!("unexpected field {field:?}"),
                    ));
                },
            }
        }

        Ok(Self {
            interface: interface.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
            port: port.ok_or_else(|| Error::invalid_endpoint(s, "missing port"))?,
        })
    }
}

impl fmt::Display for ListenEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tcp:port={}:interface={}",
            self.port,
            escape(&self.interface.to_string())
        )
    }
}

impl TryFrom<String> for ListenEndpoint {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ListenEndpoint> for String {
    fn from(endpoint: ListenEndpoint) -> Self {
        endpoint.to_string()
    }
}

// ── Dial targets ─────────────────────────────────────────────────────────────

/// Where the backend AMP service is reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConnectEndpoint {
    pub host: String,
    pub port: u16,
}

impl ConnectEndpoint {
    /// `host:port`, suitable for `TcpStream::connect`.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn check_host(descriptor: &str, host: &str) -> Result<String> {
    if host.is_empty() || host.chars().any(char::is_whitespace) {
        return Err(Error::invalid_endpoint(descriptor, format!("bad host {host:?}")));
    }
    Ok(host.to_owned())
}

impl FromStr for ConnectEndpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let Some(fields) = tcp_fields(s)? else {
            let (host, port) = s
                .rsplit_once(':')
                .ok_or_else(|| Error::invalid_endpoint(s, "expected <host>:<port>"))?;
            let host = host
                .strip_prefix('[')
                .and_then(|h| h.strip_suffix(']'))
                .unwrap_or(host);
            return Ok(Self {
                host: check_host(s, host)?,
                port: parse_port(s, port)?,
            });
        };

        let mut host = None;
        let mut port = None;
        let mut positional = 0;
        for field in &fields {
            match field.split_once('=') {
                Some(("host", value)) => host = Some(check_host(s, value)?),
                Some(("port", value)) => port = Some(parse_port(s, value)?),
                Some((key, _)) => {
                    return Err(Error::invalid_endpoint(s, format!("unknown option {key:?}")));
                },
                None => {
                    match positional {
                        0 => host = Some(check_host(s, field)?),
                        1 => port = Some(parse_port(s, field)?),
                        _ => {
                            return Err(Error::invalid_endpoint(
                                s,
                                format!("unexpected field {field:?}"),
                            ));
                        },
                    }
                    positional += 1;
                },
            }
        }

        Ok(Self {
            host: host.ok_or_else(|| Error::invalid_endpoint(s, "missing host"))?,
            port: port.ok_or_else(|| Error::invalid_endpoint(s, "missing port"))?,
        })
    }
}

impl fmt::Display for ConnectEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp:host={}:port={}", escape(&self.host), self.port)
    }
}

impl TryFrom<String> for ConnectEndpoint {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ConnectEndpoint> for String {
    fn from(endpoint: ConnectEndpoint) -> Self {
        endpoint.to_string()
    }
}
