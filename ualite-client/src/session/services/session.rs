// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! CreateSession, ActivateSession and CloseSession, including user identity
//! token encoding.

use log::{debug, error};

use ualite_core::ResponseMessage;
use ualite_crypto::{user_identity, SecurityPolicy, X509};
use ualite_types::{
    ActivateSessionRequest, AnonymousIdentityToken, ApplicationDescription, ApplicationType,
    ByteString, CloseSessionRequest, CreateSessionRequest, ExtensionObject, LocalizedText,
    MessageInfo, NodeId, ReadValueId, SignatureData, StatusCode, UaString, UserNameIdentityToken,
    UserTokenPolicy, UserTokenType, Variant, X509IdentityToken,
};

use crate::config::IdentityToken;
use crate::session::{
    services::{process_service_result, process_unexpected_response},
    Session,
};

impl Session {
    /// Create the session on the server. On success the session id and
    /// authentication token are installed, and the server signature over our
    /// certificate and nonce has been verified.
    pub async fn create_session(&self) -> Result<(), StatusCode> {
        let client_certificate = {
            let channel = self.channel.secure_channel.read();
            channel
                .cert()
                .map(|c| c.as_byte_string())
                .unwrap_or_else(ByteString::null)
        };
        let client_nonce = self.channel.client_nonce();

        let request = CreateSessionRequest {
            request_header: self.channel.make_request_header(self.operation_timeout()),
            client_description: ApplicationDescription {
                application_uri: UaString::from(self.config.application_uri.as_str()),
                product_uri: UaString::from(self.config.product_uri.as_str()),
                application_name: LocalizedText::from(self.config.application_name.as_str()),
                application_type: ApplicationType::Client,
                gateway_server_uri: UaString::null(),
                discovery_profile_uri: UaString::null(),
                discovery_urls: None,
            },
            server_uri: self.session_info.endpoint.server.application_uri.clone(),
            endpoint_url: self.session_info.endpoint.endpoint_url.clone(),
            session_name: UaString::from(self.config.session_name.as_str()),
            client_nonce: client_nonce.clone(),
            client_certificate: client_certificate.clone(),
            requested_session_timeout: self.config.session_timeout_ms as f64,
            max_response_message_size: self.config.max_message_size as u32,
        };

        let response = self
            .channel
            .send(request, self.operation_timeout())
            .await?;
        let ResponseMessage::CreateSession(response) = response else {
            return Err(process_unexpected_response(response));
        };
        process_service_result(&response.response_header)?;

        let security_policy = self.channel.security_policy();
        if security_policy != SecurityPolicy::None {
            // The server proves possession of its key by signing our certificate
            // and nonce
            let server_certificate = X509::from_byte_string(&response.server_certificate)
                .map_err(StatusCode::from)?;
            user_identity::verify_signature_data(
                security_policy,
                &server_certificate,
                &response.server_signature,
                client_certificate.as_ref(),
                client_nonce.as_ref(),
            )
            .map_err(|e| {
                error!("Server signature did not verify: {}", e);
                StatusCode::BadApplicationSignatureInvalid
            })?;
        }

        self.set_session_id(response.session_id.clone());
        self.set_auth_token(response.authentication_token.clone());
        self.set_session_timeout(response.revised_session_timeout);
        *self.server_nonce.lock() = response.server_nonce.clone();
        *self.server_certificate.lock() = response.server_certificate.clone();
        self.channel
            .update_from_created_session(&response.server_nonce, &response.server_certificate)?;

        debug!(
            "Session created, id {} timeout {} ms",
            response.session_id, response.revised_session_timeout
        );
        Ok(())
    }

    /// Activate the session with the configured identity. The session serves
    /// calls only after this succeeds.
    pub async fn activate_session(&self) -> Result<(), StatusCode> {
        let security_policy = self.channel.security_policy();
        let (server_certificate, server_nonce) = {
            (
                self.server_certificate.lock().clone(),
                self.server_nonce.lock().clone(),
            )
        };

        // Our signature over server certificate and nonce, when the channel is
        // secured
        let client_signature = if security_policy == SecurityPolicy::None {
            SignatureData::null()
        } else {
            self.make_client_signature(security_policy, &server_certificate, &server_nonce)?
        };

        let (user_identity_token, user_token_signature) =
            self.make_user_identity_token(&server_certificate, &server_nonce)?;

        let locale_ids = if self.session_info.preferred_locales.is_empty() {
            None
        } else {
            Some(
                self.session_info
                    .preferred_locales
                    .iter()
                    .map(|l| UaString::from(l.as_str()))
                    .collect(),
            )
        };

        let request = ActivateSessionRequest {
            request_header: self.channel.make_request_header(self.operation_timeout()),
            client_signature,
            client_software_certificates: None,
            locale_ids,
            user_identity_token,
            user_token_signature,
        };
        let response = self
            .channel
            .send(request, self.operation_timeout())
            .await?;
        let ResponseMessage::ActivateSession(response) = response else {
            return Err(process_unexpected_response(response));
        };
        process_service_result(&response.response_header)?;
        // The server echoes a fresh nonce for the next activation or password
        *self.server_nonce.lock() = response.server_nonce.clone();
        debug!("Session activated");
        Ok(())
    }

    /// Close the session on the server. The transport stays open; use
    /// [`Session::disconnect`] for a full teardown.
    pub async fn close_session(&self, delete_subscriptions: bool) -> Result<(), StatusCode> {
        let request = CloseSessionRequest {
            request_header: self.channel.make_request_header(self.operation_timeout()),
            delete_subscriptions,
        };
        let response = self
            .channel
            .send(request, self.operation_timeout())
            .await?;
        let ResponseMessage::CloseSession(response) = response else {
            return Err(process_unexpected_response(response));
        };
        process_service_result(&response.response_header)?;
        self.set_session_id(NodeId::null());
        self.set_auth_token(NodeId::null());
        Ok(())
    }

    /// A minimal read of the server state, used as a keep-alive when the session
    /// is otherwise idle.
    pub(crate) async fn keep_alive(&self) -> Result<(), StatusCode> {
        let results = self
            .read(
                &[ReadValueId::from(NodeId::ns0(
                    ualite_types::node_ids::SERVER_STATUS_STATE,
                ))],
                ualite_types::TimestampsToReturn::Neither,
                0.0,
            )
            .await?;
        match results.first().and_then(|v| v.value.as_ref()) {
            Some(Variant::Int32(state)) => {
                debug!("Keep-alive read server state {}", state);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn make_client_signature(
        &self,
        security_policy: SecurityPolicy,
        server_certificate: &ByteString,
        server_nonce: &ByteString,
    ) -> Result<SignatureData, StatusCode> {
        let channel = self.channel.secure_channel.read();
        let Some(private_key) = channel.private_key() else {
            error!("Cannot sign the activate request without a private key");
            return Err(StatusCode::BadConfigurationError);
        };
        user_identity::create_signature_data(
            security_policy,
            private_key,
            server_certificate.as_ref(),
            server_nonce.as_ref(),
        )
        .map_err(|e| {
            error!("Could not create the client signature: {}", e);
            StatusCode::BadUnexpectedError
        })
    }

    /// Find the endpoint's policy for the given token type.
    fn user_token_policy(&self, token_type: UserTokenType) -> Option<&UserTokenPolicy> {
        self.session_info
            .endpoint
            .user_identity_tokens
            .as_ref()?
            .iter()
            .find(|p| p.token_type == token_type)
    }

    // The security policy protecting the user token itself: the policy named by
    // the endpoint's token policy, falling back to the channel's.
    fn user_token_security_policy(&self, policy: &UserTokenPolicy) -> SecurityPolicy {
        if policy.security_policy_uri.is_empty() {
            self.channel.security_policy()
        } else {
            SecurityPolicy::from_uri(policy.security_policy_uri.as_ref())
        }
    }

    fn make_user_identity_token(
        &self,
        server_certificate: &ByteString,
        server_nonce: &ByteString,
    ) -> Result<(ExtensionObject, SignatureData), StatusCode> {
        match &self.session_info.user_identity_token {
            IdentityToken::Anonymous => {
                let policy_id = self
                    .user_token_policy(UserTokenType::Anonymous)
                    .map(|p| p.policy_id.clone())
                    .unwrap_or_else(UaString::null);
                let token = AnonymousIdentityToken { policy_id };
                Ok((
                    ExtensionObject::from_message(token.type_id(), &token),
                    SignatureData::null(),
                ))
            }
            IdentityToken::UserName { user, password } => {
                let Some(policy) = self.user_token_policy(UserTokenType::UserName).cloned()
                else {
                    error!("The endpoint offers no user name token policy");
                    return Err(StatusCode::BadIdentityTokenRejected);
                };
                let token_policy = self.user_token_security_policy(&policy);
                let token = if token_policy == SecurityPolicy::None {
                    // Plaintext password, relying on channel encryption
                    UserNameIdentityToken {
                        policy_id: policy.policy_id,
                        user_name: UaString::from(user.as_str()),
                        password: ByteString::from(password.as_bytes()),
                        encryption_algorithm: UaString::null(),
                    }
                } else {
                    let server_certificate = X509::from_byte_string(server_certificate)
                        .map_err(StatusCode::from)?;
                    let password = user_identity::encrypt_user_identity_token_password(
                        token_policy,
                        &server_certificate,
                        server_nonce.as_ref(),
                        password.as_bytes(),
                    )
                    .map_err(StatusCode::from)?;
                    UserNameIdentityToken {
                        policy_id: policy.policy_id,
                        user_name: UaString::from(user.as_str()),
                        password,
                        encryption_algorithm: UaString::from(
                            token_policy.asymmetric_encryption_algorithm(),
                        ),
                    }
                };
                Ok((
                    ExtensionObject::from_message(token.type_id(), &token),
                    SignatureData::null(),
                ))
            }
            IdentityToken::X509 { cert, key } => {
                let Some(policy) = self.user_token_policy(UserTokenType::Certificate).cloned()
                else {
                    error!("The endpoint offers no certificate token policy");
                    return Err(StatusCode::BadIdentityTokenRejected);
                };
                let token = X509IdentityToken {
                    policy_id: policy.policy_id.clone(),
                    certificate_data: cert.as_byte_string(),
                };
                let mut signature_policy = self.user_token_security_policy(&policy);
                if signature_policy == SecurityPolicy::None {
                    signature_policy = self.channel.security_policy();
                }
                if signature_policy == SecurityPolicy::None {
                    error!("An X509 identity requires a security policy to sign with");
                    return Err(StatusCode::BadSecurityPolicyRejected);
                }
                // Proof of possession: sign server certificate and nonce with the
                // user key
                let user_token_signature = user_identity::create_signature_data(
                    signature_policy,
                    key,
                    server_certificate.as_ref(),
                    server_nonce.as_ref(),
                )
                .map_err(StatusCode::from)?;
                Ok((
                    ExtensionObject::from_message(token.type_id(), &token),
                    user_token_signature,
                ))
            }
        }
    }
}
