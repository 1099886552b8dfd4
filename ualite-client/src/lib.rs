// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! An async OPC UA client: secure channel management, sessions, address space
//! services and subscriptions over tokio.
//!
//! The shape of a client program:
//!
//! ```ignore
//! let endpoints = ualite_client::get_endpoints("opc.tcp://server:4840/", &config).await?;
//! let endpoint = ualite_client::find_matching_endpoint(
//!     &endpoints, SecurityPolicy::None, MessageSecurityMode::None).unwrap();
//! let (session, event_loop) = Session::new(
//!     config, endpoint, IdentityToken::Anonymous, certificate_store);
//! let handle = event_loop.spawn();
//! session.wait_for_connection().await?;
//! let values = session.read(&nodes, TimestampsToReturn::Both, 0.0).await?;
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod discovery;
pub mod retry;
pub mod session;
pub mod transport;

pub use config::{ClientConfig, IdentityToken};
pub use discovery::{find_matching_endpoint, get_endpoints};
pub use retry::SessionRetryPolicy;
pub use session::{
    node_cache::{NodeCache, NodeCacheEntry, NodeCacheStats},
    DataChangeCallback, EventCallback, MonitoredItem, OnSubscriptionNotification,
    OperationalLimits, Session, SessionEventLoop, SessionState, Subscription,
    SubscriptionCallbacks,
};
pub use session::services::subscriptions::MonitoredItemCreate;
pub use transport::{
    AsyncSecureChannel, ByteStream, Connector, SecureChannelEventLoop, TcpConnector,
    TransportConfiguration, TransportPollResult,
};
