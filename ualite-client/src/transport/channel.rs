// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The async secure channel: request multiplexing over one transport, and the
//! OpenSecureChannel issue/renew machinery.

use std::{
    str::FromStr,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use arc_swap::{ArcSwap, ArcSwapOption};
use log::{debug, error};
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};

use ualite_core::{
    comms::secure_channel::SecureChannel,
    RequestMessage, ResponseMessage,
};
use ualite_crypto::{CertificateStore, SecurityPolicy, X509};
use ualite_types::{
    DecodingOptions, NodeId, OpenSecureChannelRequest, RequestHeader, SecurityTokenRequestType,
    StatusCode,
};

use crate::session::SessionInfo;

use super::{
    connect::{Connector, TransportPollResult},
    state::OutgoingMessage,
    tcp::{TcpTransport, TransportConfiguration},
};

// Backstop on queued messages; far beyond anything a sane client produces.
const MAX_INFLIGHT_MESSAGES: usize = 100_000;

/// Polls the transport behind an [`AsyncSecureChannel`]. Nothing moves on the
/// connection unless this is polled.
pub struct SecureChannelEventLoop {
    transport: TcpTransport,
}

impl SecureChannelEventLoop {
    /// Drive the connection one step.
    pub async fn poll(&mut self) -> TransportPollResult {
        self.transport.poll().await
    }
}

/// A secure channel plus the counters and request plumbing callers share. Calls
/// from any number of tasks are multiplexed onto the transport by request id.
pub struct AsyncSecureChannel {
    pub(crate) secure_channel: Arc<RwLock<SecureChannel>>,
    session_info: SessionInfo,
    certificate_store: Arc<dyn CertificateStore>,
    transport_config: TransportConfiguration,
    connector: Box<dyn Connector>,
    channel_lifetime: u32,
    /// The authentication token attached to request headers, shared with the
    /// session which updates it on activation.
    auth_token: Arc<ArcSwap<NodeId>>,
    request_handle: AtomicU32,
    request_id: AtomicU32,
    /// Sender into the live transport, absent while disconnected.
    request_send: ArcSwapOption<mpsc::Sender<OutgoingMessage>>,
    /// Serializes issue/renew so concurrent senders renew once.
    issue_lock: tokio::sync::Mutex<()>,
}

impl AsyncSecureChannel {
    /// Create a channel for the given endpoint. It does nothing until
    /// [`Self::connect`] is called.
    pub fn new(
        certificate_store: Arc<dyn CertificateStore>,
        session_info: SessionInfo,
        auth_token: Arc<ArcSwap<NodeId>>,
        transport_config: TransportConfiguration,
        connector: Box<dyn Connector>,
        channel_lifetime: u32,
        decoding_options: DecodingOptions,
    ) -> Self {
        let security_policy =
            SecurityPolicy::from_str(session_info.endpoint.security_policy_uri.as_ref())
                .unwrap_or(SecurityPolicy::Unknown);
        let secure_channel = Arc::new(RwLock::new(SecureChannel::new(
            security_policy,
            session_info.endpoint.security_mode,
            decoding_options,
        )));
        AsyncSecureChannel {
            secure_channel,
            session_info,
            certificate_store,
            transport_config,
            connector,
            channel_lifetime,
            auth_token,
            request_handle: AtomicU32::new(1),
            request_id: AtomicU32::new(1),
            request_send: ArcSwapOption::empty(),
            issue_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// The security policy of the channel.
    pub fn security_policy(&self) -> SecurityPolicy {
        self.secure_channel.read().security_policy()
    }

    /// Our current nonce, needed by CreateSession.
    pub(crate) fn client_nonce(&self) -> ualite_types::ByteString {
        self.secure_channel.read().local_nonce_as_byte_string()
    }

    /// Install the server nonce and certificate returned by CreateSession.
    pub(crate) fn update_from_created_session(
        &self,
        nonce: &ualite_types::ByteString,
        certificate: &ualite_types::ByteString,
    ) -> Result<(), StatusCode> {
        let mut secure_channel = self.secure_channel.write();
        secure_channel
            .set_remote_nonce_from_byte_string(nonce)
            .map_err(StatusCode::from)?;
        secure_channel
            .set_remote_cert_from_byte_string(certificate)
            .map_err(StatusCode::from)?;
        Ok(())
    }

    /// The next request handle, skipping 0.
    pub fn next_request_handle(&self) -> u32 {
        loop {
            let handle = self.request_handle.fetch_add(1, Ordering::Relaxed);
            if handle != 0 {
                break handle;
            }
        }
    }

    fn next_request_id(&self) -> u32 {
        loop {
            let id = self.request_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                break id;
            }
        }
    }

    /// A request header carrying the session's authentication token and a fresh
    /// request handle.
    pub fn make_request_header(&self, timeout: Duration) -> RequestHeader {
        RequestHeader::new(
            &self.auth_token.load(),
            self.next_request_handle(),
            timeout.as_millis() as u32,
        )
    }

    /// Send a request and wait up to `timeout` for the response. Renews the
    /// channel token first when it is due.
    pub async fn send(
        &self,
        request: impl Into<RequestMessage>,
        timeout: Duration,
    ) -> Result<ResponseMessage, StatusCode> {
        let Some(send) = self.request_send.load_full() else {
            return Err(StatusCode::BadNotConnected);
        };

        if self.secure_channel.read().should_renew_security_token() {
            // Take the lock then re-check, so a burst of callers renews once
            let guard = self.issue_lock.lock().await;
            if self.secure_channel.read().should_renew_security_token() {
                self.issue_or_renew(SecurityTokenRequestType::Renew, &send)
                    .await?;
            }
            drop(guard);
        }

        self.send_with_sender(request.into(), &send, timeout).await
    }

    async fn send_with_sender(
        &self,
        request: RequestMessage,
        send: &mpsc::Sender<OutgoingMessage>,
        timeout: Duration,
    ) -> Result<ResponseMessage, StatusCode> {
        let request_id = self.next_request_id();
        let (tx, rx) = oneshot::channel();
        let message = OutgoingMessage {
            request_id,
            request,
            response: Some(tx),
            deadline: Instant::now() + timeout,
        };
        send.send(message)
            .await
            .map_err(|_| StatusCode::BadConnectionClosed)?;

        match tokio::time::timeout(timeout, rx).await {
            // Deadline elapsed; the transport prunes the dead waiter and discards
            // any late response
            Err(_) => Err(StatusCode::BadTimeout),
            Ok(Err(_)) => Err(StatusCode::BadConnectionClosed),
            Ok(Ok(result)) => result,
        }
    }

    /// Establish the transport and open the secure channel, returning the event
    /// loop that drives the connection.
    pub async fn connect(&self) -> Result<SecureChannelEventLoop, StatusCode> {
        self.request_send.store(None);
        {
            let mut secure_channel = self.secure_channel.write();
            secure_channel.clear_security_token();

            let policy = secure_channel.security_policy();
            if policy == SecurityPolicy::Unknown {
                return Err(StatusCode::BadSecurityPolicyRejected);
            }
            if policy != SecurityPolicy::None {
                let cert = self.certificate_store.own_certificate().cloned();
                let key = self.certificate_store.own_private_key().cloned();
                if cert.is_none() || key.is_none() {
                    error!("The endpoint requires an application certificate");
                    return Err(StatusCode::BadConfigurationError);
                }
                secure_channel.set_own_certificate(cert, key);

                let server_certificate =
                    X509::from_byte_string(&self.session_info.endpoint.server_certificate)
                        .map_err(StatusCode::from)?;
                let validation = self.certificate_store.validate(&server_certificate);
                if validation.is_bad() {
                    error!("Server certificate was rejected: {}", validation);
                    return Err(validation);
                }
                secure_channel.set_remote_cert(Some(server_certificate));
            }
        }

        let (send, recv) = mpsc::channel(MAX_INFLIGHT_MESSAGES);
        let mut transport = self
            .connector
            .connect(
                self.secure_channel.clone(),
                recv,
                self.transport_config.clone(),
                self.session_info.endpoint.endpoint_url.as_ref(),
            )
            .await?;

        // Open the channel while polling the transport ourselves; the event loop
        // does not exist yet
        {
            let open_fut = self.issue_or_renew(SecurityTokenRequestType::Issue, &send);
            tokio::pin!(open_fut);
            loop {
                tokio::select! {
                    r = &mut open_fut => {
                        r?;
                        break;
                    }
                    r = transport.poll() => {
                        if let TransportPollResult::Closed(e) = r {
                            return Err(e);
                        }
                    }
                }
            }
        }

        self.request_send.store(Some(Arc::new(send)));
        Ok(SecureChannelEventLoop { transport })
    }

    /// `true` while the channel has a live transport.
    pub fn is_connected(&self) -> bool {
        self.request_send.load().is_some()
    }

    /// `true` when the token is due for renewal.
    pub fn should_renew_security_token(&self) -> bool {
        self.secure_channel.read().should_renew_security_token()
    }

    /// Renew the channel token if due. Driven from the session event loop.
    pub async fn renew_security_token(&self) -> Result<(), StatusCode> {
        let Some(send) = self.request_send.load_full() else {
            return Err(StatusCode::BadNotConnected);
        };
        let guard = self.issue_lock.lock().await;
        if self.secure_channel.read().should_renew_security_token() {
            self.issue_or_renew(SecurityTokenRequestType::Renew, &send)
                .await?;
        }
        drop(guard);
        Ok(())
    }

    async fn issue_or_renew(
        &self,
        request_type: SecurityTokenRequestType,
        send: &mpsc::Sender<OutgoingMessage>,
    ) -> Result<(), StatusCode> {
        debug!("Sending OpenSecureChannel({:?})", request_type);
        let request = {
            let mut secure_channel = self.secure_channel.write();
            secure_channel.create_random_nonce();
            OpenSecureChannelRequest {
                request_header: self.make_request_header(Duration::from_secs(30)),
                client_protocol_version: ualite_core::comms::tcp_types::PROTOCOL_VERSION,
                request_type,
                security_mode: secure_channel.security_mode(),
                client_nonce: secure_channel.local_nonce_as_byte_string(),
                requested_lifetime: self.channel_lifetime,
            }
        };
        let response = self
            .send_with_sender(request.into(), send, Duration::from_secs(30))
            .await?;

        let ResponseMessage::OpenSecureChannel(response) = response else {
            error!("OpenSecureChannel was answered by something else");
            return Err(StatusCode::BadUnknownResponse);
        };
        let service_result = response.response_header.service_result;
        if service_result.is_bad() {
            error!("OpenSecureChannel failed: {}", service_result);
            return Err(service_result);
        }

        let mut secure_channel = self.secure_channel.write();
        secure_channel
            .set_remote_nonce_from_byte_string(&response.server_nonce)
            .map_err(StatusCode::from)?;
        secure_channel.set_security_token(response.security_token.clone());
        secure_channel.derive_keys();
        debug!(
            "Secure channel {} token {} open, lifetime {} ms",
            response.security_token.channel_id,
            response.security_token.token_id,
            response.security_token.revised_lifetime
        );
        Ok(())
    }

    /// Send CloseSecureChannel and forget the transport. The server closes the
    /// socket without replying.
    pub async fn close_channel(&self) {
        let request = ualite_types::CloseSecureChannelRequest {
            request_header: self.make_request_header(Duration::from_secs(60)),
        };
        if let Some(send) = self.request_send.swap(None) {
            let message = OutgoingMessage {
                request_id: self.next_request_id(),
                request: request.into(),
                response: None,
                deadline: Instant::now() + Duration::from_secs(60),
            };
            if let Err(e) = send.send(message).await {
                error!("Could not send the close message: {}", e);
            }
        }
    }
}
