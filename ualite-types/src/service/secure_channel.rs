// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! OpenSecureChannel / CloseSecureChannel messages and the service fault.

use crate::{
    byte_string::ByteString,
    date_time::DateTime,
    encoding::BinaryEncodable,
    request_header::RequestHeader,
    response_header::ResponseHeader,
};

use super::{binary_struct, message_info, ua_enum};

ua_enum! {
    /// Whether an OpenSecureChannel call issues a fresh token or renews the channel.
    SecurityTokenRequestType {
        /// Issue a token on a new channel.
        Issue = 0,
        /// Renew the token on an existing channel.
        Renew = 1,
    }
}

ua_enum! {
    /// The degree of message protection on a channel.
    MessageSecurityMode {
        /// No security mode selected.
        Invalid = 0,
        /// Messages are neither signed nor encrypted.
        None = 1,
        /// Messages are signed.
        Sign = 2,
        /// Messages are signed and encrypted.
        SignAndEncrypt = 3,
    }
}

/// The security token the server issues for a channel.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChannelSecurityToken {
    /// Server-assigned id of the channel.
    pub channel_id: u32,
    /// Server-assigned id of the token, selecting the key set.
    pub token_id: u32,
    /// Server time at which the token was created.
    pub created_at: DateTime,
    /// Lifetime of the token in milliseconds.
    pub revised_lifetime: u32,
}

binary_struct!(ChannelSecurityToken {
    channel_id,
    token_id,
    created_at,
    revised_lifetime,
});

/// Opens or renews a secure channel. Always sent in an asymmetrically secured chunk.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OpenSecureChannelRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// Protocol version, matching the Hello message.
    pub client_protocol_version: u32,
    /// Issue or Renew.
    pub request_type: SecurityTokenRequestType,
    /// Requested degree of message protection.
    pub security_mode: MessageSecurityMode,
    /// Client nonce for key derivation, sized by the security policy.
    pub client_nonce: ByteString,
    /// Requested token lifetime in milliseconds.
    pub requested_lifetime: u32,
}

binary_struct!(OpenSecureChannelRequest {
    request_header,
    client_protocol_version,
    request_type,
    security_mode,
    client_nonce,
    requested_lifetime,
});
message_info!(OpenSecureChannelRequest, 446);

impl Default for SecurityTokenRequestType {
    fn default() -> Self {
        SecurityTokenRequestType::Issue
    }
}

impl Default for MessageSecurityMode {
    fn default() -> Self {
        MessageSecurityMode::Invalid
    }
}

/// Response to [`OpenSecureChannelRequest`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OpenSecureChannelResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// Protocol version of the server.
    pub server_protocol_version: u32,
    /// The issued or renewed token.
    pub security_token: ChannelSecurityToken,
    /// Server nonce for key derivation.
    pub server_nonce: ByteString,
}

binary_struct!(OpenSecureChannelResponse {
    response_header,
    server_protocol_version,
    security_token,
    server_nonce,
});
message_info!(OpenSecureChannelResponse, 449);

/// Closes the secure channel. The server does not respond; the transport is torn down.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CloseSecureChannelRequest {
    /// Common request header.
    pub request_header: RequestHeader,
}

binary_struct!(CloseSecureChannelRequest { request_header });
message_info!(CloseSecureChannelRequest, 452);

/// Response to [`CloseSecureChannelRequest`], defined by the standard but not
/// normally observed since the channel closes first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CloseSecureChannelResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
}

binary_struct!(CloseSecureChannelResponse { response_header });
message_info!(CloseSecureChannelResponse, 455);

/// Returned in place of the expected response when a service call fails outright.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServiceFault {
    /// Common response header carrying the failure status.
    pub response_header: ResponseHeader,
}

binary_struct!(ServiceFault { response_header });
message_info!(ServiceFault, 397);
