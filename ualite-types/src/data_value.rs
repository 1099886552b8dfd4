// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The DataValue type, a value with status and timestamps.

use std::io::{Read, Write};

use crate::{
    date_time::DateTime,
    encoding::{
        read_u8, write_u8, BinaryDecodable, BinaryEncodable, DecodingOptions, EncodingResult,
    },
    status_code::StatusCode,
    variant::Variant,
};

const HAS_VALUE: u8 = 0x01;
const HAS_STATUS: u8 = 0x02;
const HAS_SOURCE_TIMESTAMP: u8 = 0x04;
const HAS_SERVER_TIMESTAMP: u8 = 0x08;
const HAS_SOURCE_PICOSECONDS: u8 = 0x10;
const HAS_SERVER_PICOSECONDS: u8 = 0x20;

/// A value together with its quality and the timestamps at which it was sourced and
/// processed. Every field is optional; absent fields are omitted from the encoding
/// and their mask bit is clear. An absent status means Good.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataValue {
    /// The value itself.
    pub value: Option<Variant>,
    /// Quality of the value.
    pub status: Option<StatusCode>,
    /// Time the value was observed at its source.
    pub source_timestamp: Option<DateTime>,
    /// Extra sub-millisecond resolution for the source timestamp, in 10 ps units.
    pub source_picoseconds: Option<u16>,
    /// Time the server processed the value.
    pub server_timestamp: Option<DateTime>,
    /// Extra sub-millisecond resolution for the server timestamp, in 10 ps units.
    pub server_picoseconds: Option<u16>,
}

impl BinaryEncodable for DataValue {
    fn byte_len(&self) -> usize {
        let mut size = 1;
        size += self.value.as_ref().map(|v| v.byte_len()).unwrap_or(0);
        size += self.status.map(|v| v.byte_len()).unwrap_or(0);
        size += self.source_timestamp.map(|v| v.byte_len()).unwrap_or(0);
        if self.source_timestamp.is_some() {
            size += self.source_picoseconds.map(|v| v.byte_len()).unwrap_or(0);
        }
        size += self.server_timestamp.map(|v| v.byte_len()).unwrap_or(0);
        if self.server_timestamp.is_some() {
            size += self.server_picoseconds.map(|v| v.byte_len()).unwrap_or(0);
        }
        size
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        write_u8(stream, self.encoding_mask())?;
        if let Some(value) = &self.value {
            value.encode(stream)?;
        }
        if let Some(status) = self.status {
            status.encode(stream)?;
        }
        // Picoseconds are only meaningful alongside their timestamp
        if let Some(source_timestamp) = self.source_timestamp {
            source_timestamp.encode(stream)?;
            if let Some(source_picoseconds) = self.source_picoseconds {
                source_picoseconds.encode(stream)?;
            }
        }
        if let Some(server_timestamp) = self.server_timestamp {
            server_timestamp.encode(stream)?;
            if let Some(server_picoseconds) = self.server_picoseconds {
                server_picoseconds.encode(stream)?;
            }
        }
        Ok(())
    }
}

impl BinaryDecodable for DataValue {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let mask = read_u8(stream)?;
        let mut value = DataValue::default();
        if mask & HAS_VALUE != 0 {
            value.value = Some(Variant::decode(stream, options)?);
        }
        if mask & HAS_STATUS != 0 {
            value.status = Some(StatusCode::decode(stream, options)?);
        }
        if mask & HAS_SOURCE_TIMESTAMP != 0 {
            value.source_timestamp = Some(DateTime::decode(stream, options)?);
            if mask & HAS_SOURCE_PICOSECONDS != 0 {
                value.source_picoseconds = Some(u16::decode(stream, options)?);
            }
        }
        if mask & HAS_SERVER_TIMESTAMP != 0 {
            value.server_timestamp = Some(DateTime::decode(stream, options)?);
            if mask & HAS_SERVER_PICOSECONDS != 0 {
                value.server_picoseconds = Some(u16::decode(stream, options)?);
            }
        }
        Ok(value)
    }
}

impl From<Variant> for DataValue {
    fn from(value: Variant) -> Self {
        DataValue {
            value: Some(value),
            ..Default::default()
        }
    }
}

impl DataValue {
    /// A value observed now with Good status and both timestamps set.
    pub fn new_now(value: impl Into<Variant>) -> DataValue {
        let now = DateTime::now();
        DataValue {
            value: Some(value.into()),
            status: Some(StatusCode::Good),
            source_timestamp: Some(now),
            server_timestamp: Some(now),
            ..Default::default()
        }
    }

    /// The status, treating an absent status as Good.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::Good)
    }

    /// `true` if the value is usable, i.e. status is Good or Uncertain.
    pub fn is_valid(&self) -> bool {
        !self.status().is_bad()
    }

    fn encoding_mask(&self) -> u8 {
        let mut mask = 0;
        if self.value.is_some() {
            mask |= HAS_VALUE;
        }
        if self.status.is_some() {
            mask |= HAS_STATUS;
        }
        if self.source_timestamp.is_some() {
            mask |= HAS_SOURCE_TIMESTAMP;
            if self.source_picoseconds.is_some() {
                mask |= HAS_SOURCE_PICOSECONDS;
            }
        }
        if self.server_timestamp.is_some() {
            mask |= HAS_SERVER_TIMESTAMP;
            if self.server_picoseconds.is_some() {
                mask |= HAS_SERVER_PICOSECONDS;
            }
        }
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn round_trip(v: &DataValue) -> DataValue {
        let encoded = v.encode_to_vec();
        assert_eq!(encoded.len(), v.byte_len());
        let mut stream = Cursor::new(encoded);
        DataValue::decode(&mut stream, &DecodingOptions::default()).unwrap()
    }

    #[test]
    fn empty_is_one_byte() {
        assert_eq!(DataValue::default().encode_to_vec(), vec![0]);
    }

    #[test]
    fn round_trips() {
        let values = vec![
            DataValue::default(),
            DataValue::from(Variant::from(5i32)),
            DataValue::new_now("abc"),
            DataValue {
                value: Some(Variant::from(1.5f64)),
                status: Some(StatusCode::UncertainInitialValue),
                source_timestamp: Some(DateTime::now()),
                source_picoseconds: Some(100),
                server_timestamp: Some(DateTime::now()),
                server_picoseconds: Some(200),
            },
        ];
        for v in &values {
            assert_eq!(&round_trip(v), v);
        }
    }

    #[test]
    fn picoseconds_without_timestamp_are_dropped() {
        let v = DataValue {
            source_picoseconds: Some(10),
            ..Default::default()
        };
        assert_eq!(round_trip(&v), DataValue::default());
    }
}
