// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The NodeId type, an identifier for a node in the address space of a server.

use std::{
    fmt,
    io::{Read, Write},
    str::FromStr,
    sync::LazyLock,
};

use crate::{
    byte_string::ByteString,
    encoding::{
        read_u16, read_u32, read_u8, write_u16, write_u32, write_u8, BinaryDecodable,
        BinaryEncodable, DecodingOptions, EncodingResult, Error,
    },
    guid::Guid,
    status_code::StatusCode,
    string::UaString,
};

/// The kind of identifier: numeric, string, guid or opaque bytes.
#[derive(Eq, PartialEq, Clone, Debug, Hash)]
pub enum Identifier {
    /// Numeric identifier, i=123
    Numeric(u32),
    /// String identifier, s=...
    String(UaString),
    /// Guid identifier, g=...
    Guid(Guid),
    /// Opaque identifier, b=...
    ByteString(ByteString),
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Identifier::Numeric(v) => write!(f, "i={}", v),
            Identifier::String(v) => write!(f, "s={}", v),
            Identifier::Guid(v) => write!(f, "g={:?}", v),
            Identifier::ByteString(v) => write!(f, "b={}", v.as_base64()),
        }
    }
}

impl FromStr for Identifier {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() < 2 {
            return Err(());
        }
        let (k, v) = s.split_at(2);
        match k {
            "i=" => v.parse::<u32>().map(Identifier::Numeric).map_err(|_| ()),
            "s=" => Ok(Identifier::String(UaString::from(v))),
            "g=" => Guid::from_str(v).map(Identifier::Guid).map_err(|_| ()),
            "b=" => ByteString::from_base64(v)
                .map(Identifier::ByteString)
                .ok_or(()),
            _ => Err(()),
        }
    }
}

impl From<u32> for Identifier {
    fn from(v: u32) -> Self {
        Identifier::Numeric(v)
    }
}

impl From<&str> for Identifier {
    fn from(v: &str) -> Self {
        Identifier::String(UaString::from(v))
    }
}

impl From<String> for Identifier {
    fn from(v: String) -> Self {
        Identifier::String(UaString::from(v))
    }
}

impl From<UaString> for Identifier {
    fn from(v: UaString) -> Self {
        Identifier::String(v)
    }
}

impl From<Guid> for Identifier {
    fn from(v: Guid) -> Self {
        Identifier::Guid(v)
    }
}

impl From<ByteString> for Identifier {
    fn from(v: ByteString) -> Self {
        Identifier::ByteString(v)
    }
}

/// An identifier for a node in the address space of a server.
#[derive(PartialEq, Eq, Clone, Debug, Hash)]
pub struct NodeId {
    /// Index into the server's namespace array.
    pub namespace: u16,
    /// The identifier of the node within the namespace.
    pub identifier: Identifier,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.namespace != 0 {
            write!(f, "ns={};{}", self.namespace, self.identifier)
        } else {
            write!(f, "{}", self.identifier)
        }
    }
}

impl Default for NodeId {
    fn default() -> Self {
        NodeId::null()
    }
}

// Wire encoding selector byte. Encoding must pick the most compact applicable
// format; decoding accepts any of them.
const TWO_BYTE: u8 = 0x00;
const FOUR_BYTE: u8 = 0x01;
const NUMERIC: u8 = 0x02;
const STRING: u8 = 0x03;
const GUID: u8 = 0x04;
const OPAQUE: u8 = 0x05;

impl BinaryEncodable for NodeId {
    fn byte_len(&self) -> usize {
        match &self.identifier {
            Identifier::Numeric(value) => {
                if self.namespace == 0 && *value <= 255 {
                    2
                } else if self.namespace <= 255 && *value <= 65535 {
                    4
                } else {
                    7
                }
            }
            Identifier::String(value) => 3 + value.byte_len(),
            Identifier::Guid(value) => 3 + value.byte_len(),
            Identifier::ByteString(value) => 3 + value.byte_len(),
        }
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        match &self.identifier {
            Identifier::Numeric(value) => {
                if self.namespace == 0 && *value <= 255 {
                    write_u8(stream, TWO_BYTE)?;
                    write_u8(stream, *value as u8)
                } else if self.namespace <= 255 && *value <= 65535 {
                    write_u8(stream, FOUR_BYTE)?;
                    write_u8(stream, self.namespace as u8)?;
                    write_u16(stream, *value as u16)
                } else {
                    write_u8(stream, NUMERIC)?;
                    write_u16(stream, self.namespace)?;
                    write_u32(stream, *value)
                }
            }
            Identifier::String(value) => {
                write_u8(stream, STRING)?;
                write_u16(stream, self.namespace)?;
                value.encode(stream)
            }
            Identifier::Guid(value) => {
                write_u8(stream, GUID)?;
                write_u16(stream, self.namespace)?;
                value.encode(stream)
            }
            Identifier::ByteString(value) => {
                write_u8(stream, OPAQUE)?;
                write_u16(stream, self.namespace)?;
                value.encode(stream)
            }
        }
    }
}

impl BinaryDecodable for NodeId {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let encoding = read_u8(stream)?;
        Self::decode_body(encoding, stream, options)
    }
}

impl NodeId {
    /// Decode the node id body for an already-read encoding byte. ExpandedNodeId
    /// shares this, since its flag bits live in the high bits of the same byte.
    pub(crate) fn decode_body<S: Read + ?Sized>(
        encoding: u8,
        stream: &mut S,
        options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let node_id = match encoding {
            TWO_BYTE => NodeId::new(0, read_u8(stream)? as u32),
            FOUR_BYTE => {
                let namespace = read_u8(stream)?;
                let value = read_u16(stream)?;
                NodeId::new(namespace as u16, value as u32)
            }
            NUMERIC => {
                let namespace = read_u16(stream)?;
                let value = read_u32(stream)?;
                NodeId::new(namespace, value)
            }
            STRING => {
                let namespace = read_u16(stream)?;
                let value = UaString::decode(stream, options)?;
                NodeId::new(namespace, value)
            }
            GUID => {
                let namespace = read_u16(stream)?;
                let value = Guid::decode(stream, options)?;
                NodeId::new(namespace, value)
            }
            OPAQUE => {
                let namespace = read_u16(stream)?;
                let value = ByteString::decode(stream, options)?;
                NodeId::new(namespace, value)
            }
            _ => {
                return Err(Error::decoding(format!(
                    "Unrecognized node id encoding byte {}",
                    encoding
                )));
            }
        };
        Ok(node_id)
    }
}

impl FromStr for NodeId {
    type Err = StatusCode;

    // Parses "ns=<namespaceindex>;<type>=<value>" per Part 6 5.3.1.10,
    // where the ns= prefix is omitted for namespace 0.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use regex::Regex;

        static RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"^(ns=(?P<ns>[0-9]+);)?(?P<t>[isgb]=.+)$").unwrap());

        let captures = RE.captures(s).ok_or(StatusCode::BadNodeIdInvalid)?;

        let namespace = match captures.name("ns") {
            Some(ns) => ns
                .as_str()
                .parse::<u16>()
                .map_err(|_| StatusCode::BadNodeIdInvalid)?,
            None => 0,
        };

        Identifier::from_str(captures.name("t").unwrap().as_str())
            .map(|t| NodeId::new(namespace, t))
            .map_err(|_| StatusCode::BadNodeIdInvalid)
    }
}

impl From<&NodeId> for NodeId {
    fn from(v: &NodeId) -> Self {
        v.clone()
    }
}

impl From<(u16, u32)> for NodeId {
    fn from(v: (u16, u32)) -> Self {
        Self::new(v.0, v.1)
    }
}

impl From<(u16, &str)> for NodeId {
    fn from(v: (u16, &str)) -> Self {
        Self::new(v.0, UaString::from(v.1))
    }
}

impl NodeId {
    /// Construct a new NodeId from anything convertible to [`Identifier`]:
    /// u32, Guid, ByteString, &str or String.
    pub fn new<T>(namespace: u16, value: T) -> NodeId
    where
        T: Into<Identifier>,
    {
        NodeId {
            namespace,
            identifier: value.into(),
        }
    }

    /// A numeric node id in namespace 0.
    pub fn ns0(value: u32) -> NodeId {
        NodeId::new(0, value)
    }

    /// The null node id, namespace 0 and numeric identifier 0.
    pub fn null() -> NodeId {
        NodeId::new(0, 0u32)
    }

    /// Test if the node id is null.
    pub fn is_null(&self) -> bool {
        self.namespace == 0 && self.identifier == Identifier::Numeric(0)
    }

    /// The numeric value, if the identifier is numeric.
    pub fn as_u32(&self) -> Option<u32> {
        match &self.identifier {
            Identifier::Numeric(v) => Some(*v),
            _ => None,
        }
    }

    /// The numeric value, if this is a numeric identifier in namespace 0.
    /// Service type ids on the wire always have this form.
    pub fn as_ns0_u32(&self) -> Option<u32> {
        match &self.identifier {
            Identifier::Numeric(v) if self.namespace == 0 => Some(*v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn round_trip(id: &NodeId) -> NodeId {
        let mut stream = Cursor::new(id.encode_to_vec());
        NodeId::decode(&mut stream, &DecodingOptions::default()).unwrap()
    }

    #[test]
    fn two_byte_form() {
        let id = NodeId::ns0(85);
        assert_eq!(id.encode_to_vec(), vec![0x00, 0x55]);
        assert_eq!(round_trip(&id), id);
    }

    #[test]
    fn four_byte_form() {
        let id = NodeId::new(3, 1000u32);
        assert_eq!(id.encode_to_vec(), vec![0x01, 0x03, 0xE8, 0x03]);
        // A large value in namespace 0 still needs the four byte form
        let id = NodeId::ns0(2258);
        assert_eq!(id.encode_to_vec(), vec![0x01, 0x00, 0xD2, 0x08]);
        assert_eq!(round_trip(&id), id);
    }

    #[test]
    fn full_numeric_form() {
        let id = NodeId::new(300, 100_000u32);
        let encoded = id.encode_to_vec();
        assert_eq!(encoded[0], 0x02);
        assert_eq!(encoded.len(), 7);
        assert_eq!(round_trip(&id), id);
    }

    #[test]
    fn string_guid_opaque_forms() {
        for id in [
            NodeId::new(2, "Demo.Static"),
            NodeId::new(1, Guid::new()),
            NodeId::new(4, ByteString::from(vec![1, 2, 3])),
        ] {
            assert_eq!(round_trip(&id), id);
        }
    }

    #[test]
    fn parse() {
        assert_eq!(NodeId::from_str("i=85").unwrap(), NodeId::ns0(85));
        assert_eq!(
            NodeId::from_str("ns=2;s=Demo").unwrap(),
            NodeId::new(2, "Demo")
        );
        assert!(NodeId::from_str("nonsense").is_err());
    }

    #[test]
    fn unknown_encoding_byte_is_rejected() {
        let mut stream = Cursor::new(vec![0x06u8, 0, 0]);
        assert!(NodeId::decode(&mut stream, &DecodingOptions::default()).is_err());
    }
}
