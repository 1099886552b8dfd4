// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The ResponseHeader, common to every service response.

use std::io::{Read, Write};

use crate::{
    date_time::DateTime,
    diagnostic_info::DiagnosticInfo,
    encoding::{BinaryDecodable, BinaryEncodable, DecodingOptions, EncodingResult},
    extension_object::ExtensionObject,
    status_code::StatusCode,
    string::UaString,
};

/// Information common to every response a server returns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponseHeader {
    /// The time the server sent the response.
    pub timestamp: DateTime,
    /// The request handle from the matching request.
    pub request_handle: u32,
    /// Overall outcome of the service call. Operation-level results are carried
    /// in the response body's result arrays.
    pub service_result: StatusCode,
    /// Diagnostics for the service itself, if requested.
    pub service_diagnostics: DiagnosticInfo,
    /// Strings referenced by index from the diagnostics.
    pub string_table: Option<Vec<UaString>>,
    /// Reserved extension point.
    pub additional_header: ExtensionObject,
}

impl BinaryEncodable for ResponseHeader {
    fn byte_len(&self) -> usize {
        self.timestamp.byte_len()
            + 4
            + self.service_result.byte_len()
            + self.service_diagnostics.byte_len()
            + self.string_table.byte_len()
            + self.additional_header.byte_len()
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        self.timestamp.encode(stream)?;
        self.request_handle.encode(stream)?;
        self.service_result.encode(stream)?;
        self.service_diagnostics.encode(stream)?;
        self.string_table.encode(stream)?;
        self.additional_header.encode(stream)
    }
}

impl BinaryDecodable for ResponseHeader {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        Ok(ResponseHeader {
            timestamp: DateTime::decode(stream, options)?,
            request_handle: u32::decode(stream, options)?,
            service_result: StatusCode::decode(stream, options)?,
            service_diagnostics: DiagnosticInfo::decode(stream, options)?,
            string_table: Option::<Vec<UaString>>::decode(stream, options)?,
            additional_header: ExtensionObject::decode(stream, options)?,
        })
    }
}
