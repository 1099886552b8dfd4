// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The DiagnosticInfo type, vendor diagnostics attached to service results.

use std::io::{Read, Write};

use bitflags::bitflags;

use crate::{
    encoding::{
        read_u8, write_u8, BinaryDecodable, BinaryEncodable, DecodingOptions, EncodingResult,
    },
    status_code::StatusCode,
    string::UaString,
};

bitflags! {
    /// Mask of the diagnostic fields a client asks the server to return.
    #[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
    pub struct DiagnosticBits: u32 {
        /// Service level symbolic id.
        const SERVICE_LEVEL_SYMBOLIC_ID = 0x01;
        /// Service level localized text.
        const SERVICE_LEVEL_LOCALIZED_TEXT = 0x02;
        /// Service level additional info.
        const SERVICE_LEVEL_ADDITIONAL_INFO = 0x04;
        /// Service level inner status code.
        const SERVICE_LEVEL_INNER_STATUS_CODE = 0x08;
        /// Service level inner diagnostics.
        const SERVICE_LEVEL_INNER_DIAGNOSTICS = 0x10;
        /// Operation level symbolic id.
        const OPERATIONAL_LEVEL_SYMBOLIC_ID = 0x20;
        /// Operation level localized text.
        const OPERATIONAL_LEVEL_LOCALIZED_TEXT = 0x40;
        /// Operation level additional info.
        const OPERATIONAL_LEVEL_ADDITIONAL_INFO = 0x80;
        /// Operation level inner status code.
        const OPERATIONAL_LEVEL_INNER_STATUS_CODE = 0x100;
        /// Operation level inner diagnostics.
        const OPERATIONAL_LEVEL_INNER_DIAGNOSTICS = 0x200;
    }
}

const HAS_SYMBOLIC_ID: u8 = 0x01;
const HAS_NAMESPACE: u8 = 0x02;
const HAS_LOCALIZED_TEXT: u8 = 0x04;
const HAS_LOCALE: u8 = 0x08;
const HAS_ADDITIONAL_INFO: u8 = 0x10;
const HAS_INNER_STATUS_CODE: u8 = 0x20;
const HAS_INNER_DIAGNOSTIC_INFO: u8 = 0x40;

/// Diagnostic information, each field present only when its mask bit is set.
/// Symbolic ids and locales index into the string table of the response header.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct DiagnosticInfo {
    /// Index into the string table for the symbolic id.
    pub symbolic_id: Option<i32>,
    /// Index into the string table for the namespace uri.
    pub namespace_uri: Option<i32>,
    /// Index into the string table for the locale.
    pub locale: Option<i32>,
    /// Index into the string table for the localized text.
    pub localized_text: Option<i32>,
    /// Vendor-specific detail.
    pub additional_info: Option<UaString>,
    /// Status code of an inner operation.
    pub inner_status_code: Option<StatusCode>,
    /// Nested diagnostics of an inner operation.
    pub inner_diagnostic_info: Option<Box<DiagnosticInfo>>,
}

impl BinaryEncodable for DiagnosticInfo {
    fn byte_len(&self) -> usize {
        let mut size = 1;
        size += self.symbolic_id.map(|_| 4).unwrap_or(0);
        size += self.namespace_uri.map(|_| 4).unwrap_or(0);
        size += self.locale.map(|_| 4).unwrap_or(0);
        size += self.localized_text.map(|_| 4).unwrap_or(0);
        size += self
            .additional_info
            .as_ref()
            .map(|v| v.byte_len())
            .unwrap_or(0);
        size += self.inner_status_code.map(|_| 4).unwrap_or(0);
        size += self
            .inner_diagnostic_info
            .as_ref()
            .map(|v| v.byte_len())
            .unwrap_or(0);
        size
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        write_u8(stream, self.encoding_mask())?;
        if let Some(v) = self.symbolic_id {
            v.encode(stream)?;
        }
        if let Some(v) = self.namespace_uri {
            v.encode(stream)?;
        }
        if let Some(v) = self.locale {
            v.encode(stream)?;
        }
        if let Some(v) = self.localized_text {
            v.encode(stream)?;
        }
        if let Some(v) = &self.additional_info {
            v.encode(stream)?;
        }
        if let Some(v) = self.inner_status_code {
            v.encode(stream)?;
        }
        if let Some(v) = &self.inner_diagnostic_info {
            v.encode(stream)?;
        }
        Ok(())
    }
}

impl BinaryDecodable for DiagnosticInfo {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        // Inner diagnostics nest, so guard the recursion
        let _depth_lock = options.depth_lock()?;
        let mask = read_u8(stream)?;
        let mut diagnostic_info = DiagnosticInfo::default();
        if mask & HAS_SYMBOLIC_ID != 0 {
            diagnostic_info.symbolic_id = Some(i32::decode(stream, options)?);
        }
        if mask & HAS_NAMESPACE != 0 {
            diagnostic_info.namespace_uri = Some(i32::decode(stream, options)?);
        }
        if mask & HAS_LOCALE != 0 {
            diagnostic_info.locale = Some(i32::decode(stream, options)?);
        }
        if mask & HAS_LOCALIZED_TEXT != 0 {
            diagnostic_info.localized_text = Some(i32::decode(stream, options)?);
        }
        if mask & HAS_ADDITIONAL_INFO != 0 {
            diagnostic_info.additional_info = Some(UaString::decode(stream, options)?);
        }
        if mask & HAS_INNER_STATUS_CODE != 0 {
            diagnostic_info.inner_status_code = Some(StatusCode::decode(stream, options)?);
        }
        if mask & HAS_INNER_DIAGNOSTIC_INFO != 0 {
            diagnostic_info.inner_diagnostic_info =
                Some(Box::new(DiagnosticInfo::decode(stream, options)?));
        }
        Ok(diagnostic_info)
    }
}

impl DiagnosticInfo {
    /// The null diagnostic info, encoded as a single zero mask byte.
    pub fn null() -> DiagnosticInfo {
        DiagnosticInfo::default()
    }

    fn encoding_mask(&self) -> u8 {
        let mut mask = 0;
        if self.symbolic_id.is_some() {
            mask |= HAS_SYMBOLIC_ID;
        }
        if self.namespace_uri.is_some() {
            mask |= HAS_NAMESPACE;
        }
        if self.locale.is_some() {
            mask |= HAS_LOCALE;
        }
        if self.localized_text.is_some() {
            mask |= HAS_LOCALIZED_TEXT;
        }
        if self.additional_info.is_some() {
            mask |= HAS_ADDITIONAL_INFO;
        }
        if self.inner_status_code.is_some() {
            mask |= HAS_INNER_STATUS_CODE;
        }
        if self.inner_diagnostic_info.is_some() {
            mask |= HAS_INNER_DIAGNOSTIC_INFO;
        }
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trip_nested() {
        let info = DiagnosticInfo {
            symbolic_id: Some(2),
            additional_info: Some(UaString::from("detail")),
            inner_status_code: Some(StatusCode::BadNodeIdUnknown),
            inner_diagnostic_info: Some(Box::new(DiagnosticInfo {
                locale: Some(0),
                ..Default::default()
            })),
            ..Default::default()
        };
        let mut stream = Cursor::new(info.encode_to_vec());
        let decoded = DiagnosticInfo::decode(&mut stream, &DecodingOptions::default()).unwrap();
        assert_eq!(decoded, info);
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let mut info = DiagnosticInfo::null();
        for _ in 0..200 {
            info = DiagnosticInfo {
                inner_diagnostic_info: Some(Box::new(info)),
                ..Default::default()
            };
        }
        let mut stream = Cursor::new(info.encode_to_vec());
        assert!(DiagnosticInfo::decode(&mut stream, &DecodingOptions::default()).is_err());
    }
}
