// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! A compact async OPC UA client stack, re-exporting the layer crates under one
//! roof:
//!
//! - [`types`]: built-in types and the binary codec
//! - [`crypto`]: security policies, keys and certificates
//! - [`core`]: transport framing, chunking and the secure channel
//! - [`client`]: sessions, services and subscriptions

#![warn(missing_docs)]

pub use ualite_client as client;
pub use ualite_core as core;
pub use ualite_crypto as crypto;
pub use ualite_types as types;
