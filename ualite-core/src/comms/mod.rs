// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Everything between the socket and a decoded service message: framing,
//! chunking, and the secure channel.

pub mod buffer;
pub mod chunker;
pub mod message_chunk;
pub mod secure_channel;
pub mod security_header;
pub mod tcp_codec;
pub mod tcp_types;
pub mod url;
