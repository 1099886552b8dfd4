// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The connector boundary: anything that can produce a connected, handshaken
//! transport over some byte stream.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc::Receiver;

use ualite_core::comms::secure_channel::SecureChannel;
use ualite_types::StatusCode;

use super::{
    state::OutgoingMessage,
    tcp::{TcpTransport, TransportConfiguration},
};

/// Result of polling a transport once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportPollResult {
    /// An inbound message was processed.
    IncomingMessage,
    /// An outgoing message was queued into the send buffer.
    OutgoingMessage,
    /// Outgoing bytes were flushed to the stream.
    OutgoingMessageSent,
    /// A send failed but the connection survives; the caller was notified.
    RecoverableError(StatusCode),
    /// The transport closed, fatally or by request.
    Closed(StatusCode),
}

/// Opens a byte stream to an endpoint and performs the Hello/Acknowledge
/// handshake, yielding a ready transport. [`super::tcp::TcpConnector`] is the
/// stock implementation; tests use in-memory streams.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect to `endpoint_url` and hand the negotiated transport back.
    async fn connect(
        &self,
        channel: Arc<RwLock<SecureChannel>>,
        outgoing_recv: Receiver<OutgoingMessage>,
        config: TransportConfiguration,
        endpoint_url: &str,
    ) -> Result<TcpTransport, StatusCode>;
}
