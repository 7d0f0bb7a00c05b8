// ABOUTME: Endpoint URI parsing — tcpromp://, udpromp://, and unixromp:// schemes
// ABOUTME: Produces the tagged Endpoint that the transport layer turns into an Acceptor or a Stream

use std::path::PathBuf;

use crate::error::RompError;

/// A parsed endpoint: which transport family, and where to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Reliable stream over TCP. `host: None` means "all interfaces" —
    /// valid only when binding a listener, a configuration error on the
    /// client side.
    Tcp { host: Option<String>, port: u16 },
    /// Reliable stream over a Unix domain socket.
    Unix { path: PathBuf },
    /// Best-effort datagram socket (known-weak: no per-peer framing).
    Datagram { host: Option<String>, port: u16 },
}

impl Endpoint {
    /// Parses a `<scheme>romp://host:port` or `unixromp:///absolute/path`
    /// URI. Recognized schemes: `tcp`, `romp` (alias for `tcp`), `udp`,
    /// `unix`.
    pub fn parse(uri: &str) -> Result<Endpoint, RompError> {
        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| RompError::Config(format!("missing scheme separator in {uri:?}")))?;

        let scheme = scheme
            .strip_suffix("romp")
            .ok_or_else(|| RompError::Config(format!("endpoint scheme must end in 'romp': {scheme:?}")))?;

        match scheme {
            "tcp" | "" => parse_host_port(rest).map(|(host, port)| Endpoint::Tcp { host, port }),
            "udp" => parse_host_port(rest).map(|(host, port)| Endpoint::Datagram { host, port }),
            "unix" => Ok(Endpoint::Unix {
                path: PathBuf::from(rest),
            }),
            other => Err(RompError::Config(format!("unknown endpoint scheme: {other:?}"))),
        }
    }

    /// True for endpoints this crate can build a framed [`crate::session::Session`]
    /// over. Datagram endpoints can be listened on / connected to at the
    /// transport layer but never get per-peer framing.
    pub fn is_stream(&self) -> bool {
        !matches!(self, Endpoint::Datagram { .. })
    }
}

fn parse_host_port(rest: &str) -> Result<(Option<String>, u16), RompError> {
    let (host, port) = rest
        .rsplit_once(':')
        .ok_or_else(|| RompError::Config(format!("missing port in {rest:?}")))?;
    let port: u16 = port
        .parse()
        .map_err(|_| RompError::Config(format!("invalid port {port:?}")))?;
    let host = if host.is_empty() {
        None
    } else {
        Some(host.to_string())
    };
    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcpromp() {
        assert_eq!(
            Endpoint::parse("tcpromp://localhost:9000").unwrap(),
            Endpoint::Tcp {
                host: Some("localhost".to_string()),
                port: 9000
            }
        );
    }

    #[test]
    fn parses_bare_romp_as_tcp() {
        assert_eq!(
            Endpoint::parse("romp://example.com:1234").unwrap(),
            Endpoint::Tcp {
                host: Some("example.com".to_string()),
                port: 1234
            }
        );
    }

    #[test]
    fn parses_empty_host_as_listen_all() {
        assert_eq!(
            Endpoint::parse("tcpromp://:9000").unwrap(),
            Endpoint::Tcp {
                host: None,
                port: 9000
            }
        );
    }

    #[test]
    fn parses_udpromp_as_datagram() {
        assert_eq!(
            Endpoint::parse("udpromp://host:53").unwrap(),
            Endpoint::Datagram {
                host: Some("host".to_string()),
                port: 53
            }
        );
    }

    #[test]
    fn parses_unixromp_path() {
        assert_eq!(
            Endpoint::parse("unixromp:///tmp/romp.sock").unwrap(),
            Endpoint::Unix {
                path: PathBuf::from("/tmp/romp.sock")
            }
        );
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!(Endpoint::parse("httpromp://host:80").is_err());
    }

    #[test]
    fn rejects_missing_scheme_separator() {
        assert!(Endpoint::parse("not-a-uri").is_err());
    }

    #[test]
    fn rejects_scheme_not_ending_in_romp() {
        assert!(Endpoint::parse("tcp://host:80").is_err());
    }

    #[test]
    fn datagram_endpoint_is_not_a_stream() {
        let endpoint = Endpoint::parse("udpromp://host:53").unwrap();
        assert!(!endpoint.is_stream());
        let endpoint = Endpoint::parse("tcpromp://host:53").unwrap();
        assert!(endpoint.is_stream());
    }
}
