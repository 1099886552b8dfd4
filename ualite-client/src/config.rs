// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Client configuration. Loading these from files is up to the application; the
//! types derive serde so any format will do.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use ualite_crypto::{PrivateKey, X509};

/// How the client identifies its user when activating a session.
#[derive(Clone)]
pub enum IdentityToken {
    /// No credentials.
    Anonymous,
    /// User name and password. The password is encrypted in transit when the
    /// endpoint's user token policy requires it.
    UserName {
        /// The user name.
        user: String,
        /// The password.
        password: String,
    },
    /// An X.509 user certificate; the private key signs the server nonce as proof
    /// of possession.
    X509 {
        /// The user certificate.
        cert: X509,
        /// The matching private key.
        key: PrivateKey,
    },
}

impl std::fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityToken::Anonymous => write!(f, "Anonymous"),
            IdentityToken::UserName { user, .. } => write!(f, "UserName({})", user),
            IdentityToken::X509 { .. } => write!(f, "X509"),
        }
    }
}

/// Limits and timeouts governing a client's sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Human readable application name, sent in the client description.
    pub application_name: String,
    /// Globally unique application URI.
    pub application_uri: String,
    /// Product URI.
    pub product_uri: String,
    /// Session name presented to the server.
    pub session_name: String,
    /// Requested session timeout in milliseconds.
    pub session_timeout_ms: u32,
    /// Default deadline for a single service call, in milliseconds.
    pub operation_timeout_ms: u64,
    /// Requested secure channel token lifetime in milliseconds.
    pub channel_lifetime_ms: u32,
    /// Idle interval after which a keep-alive read is sent, in milliseconds.
    pub keep_alive_interval_ms: u64,
    /// Our receive buffer size proposal for the transport handshake.
    pub receive_buffer_size: usize,
    /// Our send buffer size proposal.
    pub send_buffer_size: usize,
    /// Largest whole message we accept, 0 for no limit.
    pub max_message_size: usize,
    /// Largest chunk count per message we accept, 0 for no limit.
    pub max_chunk_count: usize,
    /// Ceiling on concurrently outstanding publish requests.
    pub max_inflight_publish: usize,
    /// Ceiling on operations per batched service call, combined with the server's
    /// advertised limits.
    pub max_batch_size: usize,
    /// Reconnect attempts before giving up, 0 for unlimited.
    pub session_retry_limit: u32,
    /// First reconnect delay in milliseconds; doubles per attempt.
    pub session_retry_initial_ms: u64,
    /// Ceiling on the reconnect delay in milliseconds.
    pub session_retry_max_ms: u64,
    /// Node metadata cache capacity in entries.
    pub node_cache_size: usize,
    /// Node metadata cache time to live in seconds.
    pub node_cache_ttl_secs: u64,
    /// Preferred locales in order.
    pub preferred_locales: Vec<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            application_name: "ualite client".to_string(),
            application_uri: "urn:ualite:client".to_string(),
            product_uri: "urn:ualite".to_string(),
            session_name: "ualite session".to_string(),
            session_timeout_ms: 60_000,
            operation_timeout_ms: 30_000,
            channel_lifetime_ms: 600_000,
            keep_alive_interval_ms: 10_000,
            receive_buffer_size: 65_535,
            send_buffer_size: 65_535,
            max_message_size: 2 * 1024 * 1024,
            max_chunk_count: 64,
            max_inflight_publish: 10,
            max_batch_size: 1000,
            session_retry_limit: 10,
            session_retry_initial_ms: 500,
            session_retry_max_ms: 30_000,
            node_cache_size: 1024,
            node_cache_ttl_secs: 300,
            preferred_locales: Vec::new(),
        }
    }
}

impl ClientConfig {
    /// The per-call deadline as a [`Duration`].
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    /// The keep-alive interval as a [`Duration`].
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval_ms)
    }
}
