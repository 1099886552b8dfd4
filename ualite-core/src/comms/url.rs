// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Endpoint URL handling for `opc.tcp://host:port/path` addresses.

use url::Url;

use ualite_types::{EncodingResult, Error, StatusCode};

/// URL scheme of the OPC UA TCP transport.
pub const OPC_TCP_SCHEME: &str = "opc.tcp";

/// The registered default port of OPC UA TCP servers.
pub const DEFAULT_OPC_UA_SERVER_PORT: u16 = 4840;

fn parse(endpoint_url: &str) -> EncodingResult<Url> {
    Url::parse(endpoint_url).map_err(|e| {
        Error::new(
            StatusCode::BadTcpEndpointUrlInvalid,
            format!("Endpoint url \"{}\" does not parse: {}", endpoint_url, e),
        )
    })
}

/// `true` when the url uses the binary TCP transport scheme.
pub fn is_opc_ua_binary_url(endpoint_url: &str) -> bool {
    parse(endpoint_url)
        .map(|url| url.scheme() == OPC_TCP_SCHEME)
        .unwrap_or(false)
}

/// Extract host and port from an endpoint url, applying the default port when
/// none is given.
pub fn hostname_port_from_url(
    endpoint_url: &str,
    default_port: u16,
) -> EncodingResult<(String, u16)> {
    let url = parse(endpoint_url)?;
    if url.scheme() != OPC_TCP_SCHEME {
        return Err(Error::new(
            StatusCode::BadTcpEndpointUrlInvalid,
            format!(
                "Endpoint url \"{}\" does not use the {} scheme",
                endpoint_url, OPC_TCP_SCHEME
            ),
        ));
    }
    let host = url.host_str().ok_or_else(|| {
        Error::new(
            StatusCode::BadTcpEndpointUrlInvalid,
            format!("Endpoint url \"{}\" has no host", endpoint_url),
        )
    })?;
    Ok((host.to_string(), url.port().unwrap_or(default_port)))
}

/// `true` when the two urls name the same endpoint, ignoring a trailing slash.
pub fn url_matches_except_host(a: &str, b: &str) -> bool {
    match (parse(a), parse(b)) {
        (Ok(a), Ok(b)) => {
            a.scheme() == b.scheme()
                && a.port() == b.port()
                && a.path().trim_end_matches('/') == b.path().trim_end_matches('/')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_and_port() {
        assert_eq!(
            hostname_port_from_url("opc.tcp://box:4855/UA/Server", 4840).unwrap(),
            ("box".to_string(), 4855)
        );
        assert_eq!(
            hostname_port_from_url("opc.tcp://box/UA/Server", 4840).unwrap(),
            ("box".to_string(), 4840)
        );
    }

    #[test]
    fn wrong_scheme_is_rejected() {
        assert!(hostname_port_from_url("http://box:80/", 4840).is_err());
        assert!(!is_opc_ua_binary_url("http://box:80/"));
        assert!(is_opc_ua_binary_url("opc.tcp://box:4840/"));
    }
}
