// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The session: an authenticated context on the server, bound to a secure
//! channel, through which every service call is made.

mod event_loop;
pub mod node_cache;
pub mod services;

pub use event_loop::{SessionEventLoop, SessionPollResult};
pub use services::limits::OperationalLimits;
pub use services::subscriptions::{
    DataChangeCallback, EventCallback, MonitoredItem, OnSubscriptionNotification, Subscription,
    SubscriptionCallbacks,
};

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use arc_swap::ArcSwap;
use log::error;
use parking_lot::Mutex;
use tokio::sync::watch;

use ualite_crypto::CertificateStore;
use ualite_types::{
    ByteString, DecodingOptions, EndpointDescription, NodeId, StatusCode,
};

use crate::{
    config::{ClientConfig, IdentityToken},
    retry::SessionRetryPolicy,
    transport::{AsyncSecureChannel, Connector, TcpConnector, TransportConfiguration},
};

use node_cache::NodeCache;
use services::subscriptions::state::SubscriptionState;

/// Everything needed to reach and authenticate against one endpoint.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// The endpoint to connect to.
    pub endpoint: EndpointDescription,
    /// The identity presented on activation.
    pub user_identity_token: IdentityToken,
    /// Preferred locales.
    pub preferred_locales: Vec<String>,
}

/// Observable connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No transport.
    Disconnected,
    /// Transport and channel are being established.
    Connecting,
    /// The session is active and serving calls.
    Connected,
    /// The session was closed deliberately and will not reconnect.
    Closed,
}

/// An OPC UA client session. Create one with [`Session::new`], spawn the returned
/// event loop, and make service calls through the session handle.
pub struct Session {
    pub(crate) channel: AsyncSecureChannel,
    pub(crate) config: ClientConfig,
    pub(crate) session_info: SessionInfo,
    /// Server-assigned session id, null until created.
    session_id: ArcSwap<NodeId>,
    /// Authentication token attached to every request, shared with the channel.
    auth_token: Arc<ArcSwap<NodeId>>,
    /// Latest server nonce, refreshed by create and activate.
    pub(crate) server_nonce: Mutex<ByteString>,
    /// Server certificate as returned by CreateSession.
    pub(crate) server_certificate: Mutex<ByteString>,
    /// Revised session timeout in milliseconds.
    session_timeout: Mutex<f64>,
    /// Client-side subscription shadow state.
    pub(crate) subscriptions: Arc<Mutex<SubscriptionState>>,
    /// Source of unique monitored item client handles.
    monitored_item_handle: AtomicU32,
    /// Node metadata cache.
    node_cache: Mutex<NodeCache>,
    /// Server operational limits, fetched on demand.
    pub(crate) operational_limits: Mutex<Option<OperationalLimits>>,
    state_sender: watch::Sender<SessionState>,
    state_receiver: watch::Receiver<SessionState>,
    /// Set when the user asks for disconnection; stops the event loop.
    should_close: AtomicBool,
}

impl Session {
    /// Create a session against `endpoint` with the default TCP connector,
    /// returning the handle and the event loop that must be polled (usually via
    /// [`SessionEventLoop::spawn`]).
    pub fn new(
        config: ClientConfig,
        endpoint: EndpointDescription,
        identity_token: IdentityToken,
        certificate_store: Arc<dyn CertificateStore>,
    ) -> (Arc<Session>, SessionEventLoop) {
        Self::new_with_connector(
            config,
            endpoint,
            identity_token,
            certificate_store,
            Box::new(TcpConnector),
        )
    }

    /// As [`Session::new`] with a custom connector, e.g. for local stream sockets
    /// or in-memory transports.
    pub fn new_with_connector(
        config: ClientConfig,
        endpoint: EndpointDescription,
        identity_token: IdentityToken,
        certificate_store: Arc<dyn CertificateStore>,
        connector: Box<dyn Connector>,
    ) -> (Arc<Session>, SessionEventLoop) {
        let session_info = SessionInfo {
            endpoint,
            user_identity_token: identity_token,
            preferred_locales: config.preferred_locales.clone(),
        };
        let auth_token = Arc::new(ArcSwap::new(Arc::new(NodeId::null())));
        let decoding_options = DecodingOptions {
            max_message_size: config.max_message_size,
            max_chunk_count: config.max_chunk_count,
            ..Default::default()
        };
        let transport_config = TransportConfiguration {
            send_buffer_size: config.send_buffer_size,
            recv_buffer_size: config.receive_buffer_size,
            max_message_size: config.max_message_size,
            max_chunk_count: config.max_chunk_count,
        };
        let channel = AsyncSecureChannel::new(
            certificate_store,
            session_info.clone(),
            auth_token.clone(),
            transport_config,
            connector,
            config.channel_lifetime_ms,
            decoding_options,
        );
        let (state_sender, state_receiver) = watch::channel(SessionState::Disconnected);
        let node_cache = NodeCache::new(
            config.node_cache_size.max(1),
            Duration::from_secs(config.node_cache_ttl_secs),
        );
        let retry = SessionRetryPolicy::new(
            config.session_retry_limit,
            Duration::from_millis(config.session_retry_initial_ms),
            Duration::from_millis(config.session_retry_max_ms),
        );

        let session = Arc::new(Session {
            channel,
            config,
            session_info,
            session_id: ArcSwap::new(Arc::new(NodeId::null())),
            auth_token,
            server_nonce: Mutex::new(ByteString::null()),
            server_certificate: Mutex::new(ByteString::null()),
            session_timeout: Mutex::new(0.0),
            subscriptions: Arc::new(Mutex::new(SubscriptionState::new())),
            monitored_item_handle: AtomicU32::new(1),
            node_cache: Mutex::new(node_cache),
            operational_limits: Mutex::new(None),
            state_sender,
            state_receiver,
            should_close: AtomicBool::new(false),
        });
        let event_loop = SessionEventLoop::new(session.clone(), retry);
        (session, event_loop)
    }

    /// The server-assigned session id, null before the session exists.
    pub fn session_id(&self) -> NodeId {
        (**self.session_id.load()).clone()
    }

    pub(crate) fn set_session_id(&self, session_id: NodeId) {
        self.session_id.store(Arc::new(session_id));
    }

    pub(crate) fn set_auth_token(&self, token: NodeId) {
        self.auth_token.store(Arc::new(token));
    }

    /// The session timeout granted by the server, in milliseconds.
    pub fn session_timeout(&self) -> f64 {
        *self.session_timeout.lock()
    }

    pub(crate) fn set_session_timeout(&self, timeout: f64) {
        *self.session_timeout.lock() = timeout;
    }

    /// The default deadline applied to service calls.
    pub fn operation_timeout(&self) -> Duration {
        self.config.operation_timeout()
    }

    /// Watch the connection state; resolves whenever it changes.
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state_receiver.clone()
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        let _ = self.state_sender.send(state);
    }

    /// Wait until the session reports Connected. Fails once the session closes
    /// or the event loop gives up reconnecting.
    pub async fn wait_for_connection(&self) -> Result<(), StatusCode> {
        let mut watch = self.state_watch();
        loop {
            match *watch.borrow_and_update() {
                SessionState::Connected => return Ok(()),
                SessionState::Closed => return Err(StatusCode::BadSessionClosed),
                _ => {}
            }
            if watch.changed().await.is_err() {
                return Err(StatusCode::BadSessionClosed);
            }
        }
    }

    /// A fresh client handle for a monitored item.
    pub(crate) fn next_monitored_item_handle(&self) -> u32 {
        loop {
            let handle = self.monitored_item_handle.fetch_add(1, Ordering::Relaxed);
            if handle != 0 {
                break handle;
            }
        }
    }

    /// Access the node metadata cache.
    pub fn node_cache(&self) -> parking_lot::MutexGuard<'_, NodeCache> {
        self.node_cache.lock()
    }

    pub(crate) fn should_close(&self) -> bool {
        self.should_close.load(Ordering::Relaxed)
    }

    /// Close the session and channel and stop the event loop. Service errors
    /// during close are logged, not returned; the transport goes away regardless.
    pub async fn disconnect(&self) -> Result<(), StatusCode> {
        self.should_close.store(true, Ordering::Relaxed);
        if self.channel.is_connected() {
            if let Err(e) = self.close_session(true).await {
                error!("CloseSession failed during disconnect: {}", e);
            }
            self.channel.close_channel().await;
        }
        self.set_state(SessionState::Closed);
        Ok(())
    }
}
