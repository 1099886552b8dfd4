// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The transport layer of the client: connectors, the poll-driven TCP transport,
//! and the secure channel callers send requests through.

mod channel;
mod connect;
mod state;
pub mod tcp;

pub use channel::{AsyncSecureChannel, SecureChannelEventLoop};
pub use connect::{Connector, TransportPollResult};
pub use state::OutgoingMessage;
pub use tcp::{ByteStream, TcpConnector, TcpTransport, TransportConfiguration};
