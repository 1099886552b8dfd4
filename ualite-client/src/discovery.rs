// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Endpoint discovery: a one-shot unsecured connection fetching the server's
//! endpoints, and matching them against the client's security wishes.

use std::sync::Arc;

use arc_swap::ArcSwap;
use log::debug;

use ualite_core::ResponseMessage;
use ualite_crypto::{MemoryCertificateStore, SecurityPolicy};
use ualite_types::{
    DecodingOptions, EndpointDescription, GetEndpointsRequest, MessageSecurityMode, NodeId,
    StatusCode, UaString,
};

use crate::{
    config::{ClientConfig, IdentityToken},
    session::SessionInfo,
    transport::{AsyncSecureChannel, TcpConnector, TransportConfiguration, TransportPollResult},
};

/// Ask the server at `endpoint_url` for its endpoints over an unsecured
/// connection, as clients do before picking one to create a session against.
pub async fn get_endpoints(
    endpoint_url: &str,
    config: &ClientConfig,
) -> Result<Vec<EndpointDescription>, StatusCode> {
    let endpoint = EndpointDescription {
        endpoint_url: UaString::from(endpoint_url),
        security_mode: MessageSecurityMode::None,
        security_policy_uri: UaString::from(SecurityPolicy::None.to_uri()),
        ..Default::default()
    };
    let session_info = SessionInfo {
        endpoint,
        user_identity_token: IdentityToken::Anonymous,
        preferred_locales: Vec::new(),
    };
    let channel = AsyncSecureChannel::new(
        Arc::new(MemoryCertificateStore::insecure()),
        session_info,
        Arc::new(ArcSwap::new(Arc::new(NodeId::null()))),
        TransportConfiguration {
            send_buffer_size: config.send_buffer_size,
            recv_buffer_size: config.receive_buffer_size,
            max_message_size: config.max_message_size,
            max_chunk_count: config.max_chunk_count,
        },
        Box::new(TcpConnector),
        config.channel_lifetime_ms,
        DecodingOptions {
            max_message_size: config.max_message_size,
            max_chunk_count: config.max_chunk_count,
            ..Default::default()
        },
    );

    let mut event_loop = channel.connect().await?;
    let request = GetEndpointsRequest {
        request_header: channel.make_request_header(config.operation_timeout()),
        endpoint_url: UaString::from(endpoint_url),
        locale_ids: None,
        profile_uris: None,
    };

    let send_fut = channel.send(request, config.operation_timeout());
    tokio::pin!(send_fut);
    let response = loop {
        tokio::select! {
            r = &mut send_fut => break r,
            r = event_loop.poll() => {
                if let TransportPollResult::Closed(e) = r {
                    return Err(e);
                }
            }
        }
    };

    let close_fut = channel.close_channel();
    tokio::pin!(close_fut);
    loop {
        tokio::select! {
            _ = &mut close_fut => break,
            r = event_loop.poll() => {
                if let TransportPollResult::Closed(_) = r {
                    break;
                }
            }
        }
    }

    let ResponseMessage::GetEndpoints(response) = response? else {
        return Err(StatusCode::BadUnknownResponse);
    };
    if response.response_header.service_result.is_bad() {
        return Err(response.response_header.service_result);
    }
    let endpoints = response.endpoints.unwrap_or_default();
    debug!("Server offered {} endpoints", endpoints.len());
    Ok(endpoints)
}

/// Pick the endpoint matching the requested security policy and mode, preferring
/// the server's highest security level among matches.
pub fn find_matching_endpoint(
    endpoints: &[EndpointDescription],
    security_policy: SecurityPolicy,
    security_mode: MessageSecurityMode,
) -> Option<EndpointDescription> {
    endpoints
        .iter()
        .filter(|e| {
            SecurityPolicy::from_uri(e.security_policy_uri.as_ref()) == security_policy
                && e.security_mode == security_mode
        })
        .max_by_key(|e| e.security_level)
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(policy: SecurityPolicy, mode: MessageSecurityMode, level: u8) -> EndpointDescription {
        EndpointDescription {
            endpoint_url: UaString::from("opc.tcp://localhost:4840/"),
            security_policy_uri: UaString::from(policy.to_uri()),
            security_mode: mode,
            security_level: level,
            ..Default::default()
        }
    }

    #[test]
    fn matching_prefers_security_level() {
        let endpoints = vec![
            endpoint(SecurityPolicy::None, MessageSecurityMode::None, 0),
            endpoint(
                SecurityPolicy::Basic256Sha256,
                MessageSecurityMode::SignAndEncrypt,
                3,
            ),
            endpoint(
                SecurityPolicy::Basic256Sha256,
                MessageSecurityMode::SignAndEncrypt,
                5,
            ),
        ];
        let matched = find_matching_endpoint(
            &endpoints,
            SecurityPolicy::Basic256Sha256,
            MessageSecurityMode::SignAndEncrypt,
        )
        .unwrap();
        assert_eq!(matched.security_level, 5);

        assert!(find_matching_endpoint(
            &endpoints,
            SecurityPolicy::Aes256Sha256RsaPss,
            MessageSecurityMode::SignAndEncrypt
        )
        .is_none());
    }
}
