// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! CreateSession / ActivateSession / CloseSession and the user identity tokens.

use crate::{
    byte_string::ByteString,
    encoding::BinaryEncodable,
    extension_object::ExtensionObject,
    node_id::NodeId,
    request_header::RequestHeader,
    response_header::ResponseHeader,
    status_code::StatusCode,
    string::UaString,
};

use super::{binary_struct, message_info, ApplicationDescription, EndpointDescription};

/// A digital signature carried in session messages: the algorithm URI and the
/// signature bytes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignatureData {
    /// URI of the signature algorithm.
    pub algorithm: UaString,
    /// The signature.
    pub signature: ByteString,
}

binary_struct!(SignatureData {
    algorithm,
    signature,
});

impl SignatureData {
    /// The null signature, sent when the security policy requires none.
    pub fn null() -> SignatureData {
        SignatureData {
            algorithm: UaString::null(),
            signature: ByteString::null(),
        }
    }
}

/// A software certificate with its signature. Sent in ActivateSession; most
/// deployments pass an empty list.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignedSoftwareCertificate {
    /// DER encoded certificate data.
    pub certificate_data: ByteString,
    /// Signature over the certificate data.
    pub signature: ByteString,
}

binary_struct!(SignedSoftwareCertificate {
    certificate_data,
    signature,
});

/// Creates a session on the server.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CreateSessionRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// Description of the client application.
    pub client_description: ApplicationDescription,
    /// URI of the server the client expects to talk to.
    pub server_uri: UaString,
    /// URL the client used to connect.
    pub endpoint_url: UaString,
    /// Human readable session name.
    pub session_name: UaString,
    /// Client nonce, at least 32 bytes, signed by the server in its response.
    pub client_nonce: ByteString,
    /// DER form of the client certificate.
    pub client_certificate: ByteString,
    /// Requested session timeout in milliseconds.
    pub requested_session_timeout: f64,
    /// Largest response message the client accepts, 0 for no limit.
    pub max_response_message_size: u32,
}

binary_struct!(CreateSessionRequest {
    request_header,
    client_description,
    server_uri,
    endpoint_url,
    session_name,
    client_nonce,
    client_certificate,
    requested_session_timeout,
    max_response_message_size,
});
message_info!(CreateSessionRequest, 461);

/// Response to [`CreateSessionRequest`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CreateSessionResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// Server-assigned session id.
    pub session_id: NodeId,
    /// Secret token binding subsequent requests to the session.
    pub authentication_token: NodeId,
    /// The session timeout the server granted, in milliseconds.
    pub revised_session_timeout: f64,
    /// Server nonce, consumed by ActivateSession signatures and password encryption.
    pub server_nonce: ByteString,
    /// DER form of the server certificate.
    pub server_certificate: ByteString,
    /// The endpoints of the server, for endpoint validation.
    pub server_endpoints: Option<Vec<EndpointDescription>>,
    /// Obsolete, always empty.
    pub server_software_certificates: Option<Vec<SignedSoftwareCertificate>>,
    /// Server signature over client certificate and nonce.
    pub server_signature: SignatureData,
    /// Largest request message the server accepts.
    pub max_request_message_size: u32,
}

binary_struct!(CreateSessionResponse {
    response_header,
    session_id,
    authentication_token,
    revised_session_timeout,
    server_nonce,
    server_certificate,
    server_endpoints,
    server_software_certificates,
    server_signature,
    max_request_message_size,
});
message_info!(CreateSessionResponse, 464);

/// Activates a created session, presenting the user identity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActivateSessionRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// Client signature over server certificate and server nonce.
    pub client_signature: SignatureData,
    /// Software certificates, normally empty.
    pub client_software_certificates: Option<Vec<SignedSoftwareCertificate>>,
    /// Preferred locales in order.
    pub locale_ids: Option<Vec<UaString>>,
    /// The identity token, an extension object holding one of the token types below.
    pub user_identity_token: ExtensionObject,
    /// Signature made with the user token's key, for X.509 identities.
    pub user_token_signature: SignatureData,
}

binary_struct!(ActivateSessionRequest {
    request_header,
    client_signature,
    client_software_certificates,
    locale_ids,
    user_identity_token,
    user_token_signature,
});
message_info!(ActivateSessionRequest, 467);

/// Response to [`ActivateSessionRequest`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActivateSessionResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// Fresh server nonce for the next activation.
    pub server_nonce: ByteString,
    /// Results for the software certificates.
    pub results: Option<Vec<StatusCode>>,
    /// Diagnostics for the software certificates.
    pub diagnostic_infos: Option<Vec<crate::diagnostic_info::DiagnosticInfo>>,
}

binary_struct!(ActivateSessionResponse {
    response_header,
    server_nonce,
    results,
    diagnostic_infos,
});
message_info!(ActivateSessionResponse, 470);

/// Closes the session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CloseSessionRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// Whether to delete the session's subscriptions too.
    pub delete_subscriptions: bool,
}

binary_struct!(CloseSessionRequest {
    request_header,
    delete_subscriptions,
});
message_info!(CloseSessionRequest, 473);

/// Response to [`CloseSessionRequest`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CloseSessionResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
}

binary_struct!(CloseSessionResponse { response_header });
message_info!(CloseSessionResponse, 476);

/// Identity token for anonymous access.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnonymousIdentityToken {
    /// Policy id from the endpoint's [`super::UserTokenPolicy`].
    pub policy_id: UaString,
}

binary_struct!(AnonymousIdentityToken { policy_id });
message_info!(AnonymousIdentityToken, 321);

/// Identity token carrying a user name and a password, the password possibly
/// encrypted with the server certificate per the endpoint's token policy.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserNameIdentityToken {
    /// Policy id from the endpoint's [`super::UserTokenPolicy`].
    pub policy_id: UaString,
    /// The user name, in plain text.
    pub user_name: UaString,
    /// The password: plain UTF-8 bytes when unencrypted, otherwise ciphertext.
    pub password: ByteString,
    /// URI of the encryption algorithm, null when the password is plain.
    pub encryption_algorithm: UaString,
}

binary_struct!(UserNameIdentityToken {
    policy_id,
    user_name,
    password,
    encryption_algorithm,
});
message_info!(UserNameIdentityToken, 324);

/// Identity token referencing an X.509 certificate. Proof of possession is the
/// `user_token_signature` in the activate request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct X509IdentityToken {
    /// Policy id from the endpoint's [`super::UserTokenPolicy`].
    pub policy_id: UaString,
    /// DER form of the user certificate.
    pub certificate_data: ByteString,
}

binary_struct!(X509IdentityToken {
    policy_id,
    certificate_data,
});
message_info!(X509IdentityToken, 327);
