// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The OPC UA transport and secure channel layer: message framing, chunk
//! splitting and reassembly, and the per-chunk security pipeline. The client
//! crate drives these against a socket.

#![warn(missing_docs)]

pub mod comms;
pub mod messages;

pub use messages::{Message, RequestMessage, ResponseMessage};
