// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Endpoint discovery: GetEndpoints and the endpoint description types.

use crate::{
    byte_string::ByteString,
    encoding::BinaryEncodable,
    localized_text::LocalizedText,
    request_header::RequestHeader,
    response_header::ResponseHeader,
    string::UaString,
};

use super::{binary_struct, message_info, ua_enum, MessageSecurityMode};

ua_enum! {
    /// The kind of application an endpoint belongs to.
    ApplicationType {
        /// A server.
        Server = 0,
        /// A client.
        Client = 1,
        /// Both client and server.
        ClientAndServer = 2,
        /// A discovery server.
        DiscoveryServer = 3,
    }
}

impl Default for ApplicationType {
    fn default() -> Self {
        ApplicationType::Server
    }
}

ua_enum! {
    /// The kind of user identity token accepted by an endpoint.
    UserTokenType {
        /// No credentials.
        Anonymous = 0,
        /// User name and password.
        UserName = 1,
        /// An X.509 certificate.
        Certificate = 2,
        /// A token issued by an external authority.
        IssuedToken = 3,
    }
}

impl Default for UserTokenType {
    fn default() -> Self {
        UserTokenType::Anonymous
    }
}

/// Describes an OPC UA application, sent in CreateSession and returned by discovery.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApplicationDescription {
    /// Globally unique application URI.
    pub application_uri: UaString,
    /// URI of the product.
    pub product_uri: UaString,
    /// Human readable name of the application.
    pub application_name: LocalizedText,
    /// The application type.
    pub application_type: ApplicationType,
    /// Gateway server URI, if connecting through one.
    pub gateway_server_uri: UaString,
    /// Discovery profile URI.
    pub discovery_profile_uri: UaString,
    /// URLs the application can be discovered at.
    pub discovery_urls: Option<Vec<UaString>>,
}

binary_struct!(ApplicationDescription {
    application_uri,
    product_uri,
    application_name,
    application_type,
    gateway_server_uri,
    discovery_profile_uri,
    discovery_urls,
});

/// A user token policy an endpoint accepts.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserTokenPolicy {
    /// Endpoint-assigned identifier, echoed in the identity token.
    pub policy_id: UaString,
    /// The kind of token.
    pub token_type: UserTokenType,
    /// Issued token type URI, for [`UserTokenType::IssuedToken`].
    pub issued_token_type: UaString,
    /// Endpoint to pass the issued token to.
    pub issuer_endpoint_url: UaString,
    /// Security policy URI used to encrypt the token, empty to inherit the
    /// endpoint's own policy.
    pub security_policy_uri: UaString,
}

binary_struct!(UserTokenPolicy {
    policy_id,
    token_type,
    issued_token_type,
    issuer_endpoint_url,
    security_policy_uri,
});

/// One endpoint a server offers: url, security settings and accepted identities.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EndpointDescription {
    /// URL of the endpoint.
    pub endpoint_url: UaString,
    /// Description of the hosting server.
    pub server: ApplicationDescription,
    /// DER form of the server certificate.
    pub server_certificate: ByteString,
    /// Message security mode of the endpoint.
    pub security_mode: MessageSecurityMode,
    /// Security policy URI of the endpoint.
    pub security_policy_uri: UaString,
    /// Identity token policies accepted here.
    pub user_identity_tokens: Option<Vec<UserTokenPolicy>>,
    /// Transport profile URI.
    pub transport_profile_uri: UaString,
    /// Relative rank the server assigns this endpoint.
    pub security_level: u8,
}

binary_struct!(EndpointDescription {
    endpoint_url,
    server,
    server_certificate,
    security_mode,
    security_policy_uri,
    user_identity_tokens,
    transport_profile_uri,
    security_level,
});

/// Asks a server for its endpoints. Usable before any session exists.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GetEndpointsRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// The url the client used to connect.
    pub endpoint_url: UaString,
    /// Locales for returned descriptions, in preference order.
    pub locale_ids: Option<Vec<UaString>>,
    /// Restrict results to these transport profile URIs.
    pub profile_uris: Option<Vec<UaString>>,
}

binary_struct!(GetEndpointsRequest {
    request_header,
    endpoint_url,
    locale_ids,
    profile_uris,
});
message_info!(GetEndpointsRequest, 428);

/// Response to [`GetEndpointsRequest`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GetEndpointsResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// The endpoints on offer.
    pub endpoints: Option<Vec<EndpointDescription>>,
}

binary_struct!(GetEndpointsResponse {
    response_header,
    endpoints,
});
message_info!(GetEndpointsResponse, 431);
