// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The RequestHeader, common to every service request.

use std::io::{Read, Write};

use crate::{
    date_time::DateTime,
    diagnostic_info::DiagnosticBits,
    encoding::{BinaryDecodable, BinaryEncodable, DecodingOptions, EncodingResult},
    extension_object::ExtensionObject,
    node_id::NodeId,
    string::UaString,
};

/// Information common to every request a client sends to a server.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RequestHeader {
    /// The authentication token returned by CreateSession, binding the request to
    /// the session. Null until a session is activated.
    pub authentication_token: NodeId,
    /// The time the client sent the request.
    pub timestamp: DateTime,
    /// Client-assigned handle, echoed in the response and usable for cancellation.
    pub request_handle: u32,
    /// Bit mask selecting the vendor diagnostics to return.
    pub return_diagnostics: DiagnosticBits,
    /// Identifier carried into the server's audit logs.
    pub audit_entry_id: UaString,
    /// Hint in milliseconds for how long the client will wait. 0 means no hint.
    pub timeout_hint: u32,
    /// Reserved extension point.
    pub additional_header: ExtensionObject,
}

impl BinaryEncodable for RequestHeader {
    fn byte_len(&self) -> usize {
        self.authentication_token.byte_len()
            + self.timestamp.byte_len()
            + 4
            + 4
            + self.audit_entry_id.byte_len()
            + 4
            + self.additional_header.byte_len()
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        self.authentication_token.encode(stream)?;
        self.timestamp.encode(stream)?;
        self.request_handle.encode(stream)?;
        self.return_diagnostics.bits().encode(stream)?;
        self.audit_entry_id.encode(stream)?;
        self.timeout_hint.encode(stream)?;
        self.additional_header.encode(stream)
    }
}

impl BinaryDecodable for RequestHeader {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        Ok(RequestHeader {
            authentication_token: NodeId::decode(stream, options)?,
            timestamp: DateTime::decode(stream, options)?,
            request_handle: u32::decode(stream, options)?,
            return_diagnostics: DiagnosticBits::from_bits_truncate(u32::decode(stream, options)?),
            audit_entry_id: UaString::decode(stream, options)?,
            timeout_hint: u32::decode(stream, options)?,
            additional_header: ExtensionObject::decode(stream, options)?,
        })
    }
}

impl RequestHeader {
    /// Construct a header for a request on an activated session.
    pub fn new(authentication_token: &NodeId, request_handle: u32, timeout_hint: u32) -> Self {
        RequestHeader {
            authentication_token: authentication_token.clone(),
            timestamp: DateTime::now(),
            request_handle,
            return_diagnostics: DiagnosticBits::empty(),
            audit_entry_id: UaString::null(),
            timeout_hint,
            additional_header: ExtensionObject::null(),
        }
    }
}
