//! Server addresses.

use crate::error::ClientError;
use boltwire_protocol::DEFAULT_PORT;
use std::fmt;
use std::str::FromStr;

/// Host and port of a server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoltAddress {
    host: String,
    port: u16,
}

impl BoltAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

/// Accepts `host`, `host:port`, `[v6]:port` and an optional `bolt://`,
/// `bolt+s://` or `neo4j://` scheme prefix.
impl FromStr for BoltAddress {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.split_once("://").map_or(s, |(_, rest)| rest);
        let rest = rest.trim_end_matches('/');
        if rest.is_empty() {
            return Err(ClientError::Config(format!("invalid address: '{}'", s)));
        }

        let (host, port) = if let Some(v6) = rest.strip_prefix('[') {
            let (host, tail) = v6
                .split_once(']')
                .ok_or_else(|| ClientError::Config(format!("invalid address: '{}'", s)))?;
            match tail.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if tail.is_empty() => (host, None),
                None => return Err(ClientError::Config(format!("invalid address: '{}'", s))),
            }
        } else {
            match rest.rsplit_once(':') {
                Some((host, port)) if !host.contains(':') => (host, Some(port)),
                // Bare IPv6 literal without a port.
                Some(_) => (rest, None),
                None => (rest, None),
            }
        };

        let port = match port {
            Some(port) => port
                .parse()
                .map_err(|_| ClientError::Config(format!("invalid port in address: '{}'", s)))?,
            None => DEFAULT_PORT,
        };
        Ok(BoltAddress::new(host, port))
    }
}

impl fmt::Display for BoltAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_addresses() {
        let addr: BoltAddress = "localhost".parse().unwrap();
        assert_eq!(addr, BoltAddress::new("localhost", 7687));

        let addr: BoltAddress = "db.example.com:7688".parse().unwrap();
        assert_eq!(addr.host(), "db.example.com");
        assert_eq!(addr.port(), 7688);

        let addr: BoltAddress = "bolt://10.0.0.1:7690".parse().unwrap();
        assert_eq!(addr, BoltAddress::new("10.0.0.1", 7690));

        let addr: BoltAddress = "[::1]:7000".parse().unwrap();
        assert_eq!(addr, BoltAddress::new("::1", 7000));

        let addr: BoltAddress = "::1".parse().unwrap();
        assert_eq!(addr.port(), 7687);
    }

    #[test]
    fn test_parse_invalid() {
        assert!("".parse::<BoltAddress>().is_err());
        assert!("host:notaport".parse::<BoltAddress>().is_err());
        assert!("[::1".parse::<BoltAddress>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(BoltAddress::new("localhost", 7687).to_string(), "localhost:7687");
        assert_eq!(BoltAddress::new("::1", 7687).to_string(), "[::1]:7687");
    }
}
