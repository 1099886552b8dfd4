// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The ExtensionObject type, a serialized structure tagged with its encoding id.

use std::io::{Cursor, Read, Write};

use crate::{
    encoding::{
        read_u8, write_u8, BinaryDecodable, BinaryEncodable, DecodingOptions, EncodingResult,
        Error,
    },
    node_id::NodeId,
    string::XmlElement,
};

const BODY_NONE: u8 = 0x00;
const BODY_BYTE_STRING: u8 = 0x01;
const BODY_XML: u8 = 0x02;

/// Body of an extension object.
#[derive(PartialEq, Debug, Clone, Default)]
pub enum ExtensionObjectBody {
    /// No body.
    #[default]
    None,
    /// Binary encoded body, a length-prefixed blob.
    ByteString(Vec<u8>),
    /// XML encoded body, carried opaquely.
    XmlElement(XmlElement),
}

/// A structure serialized inside an envelope identifying its binary encoding by
/// node id, so unknown types can be carried through undecoded.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct ExtensionObject {
    /// Node id of the structure's encoding, e.g. `DataChangeFilter_Encoding_DefaultBinary`.
    pub node_id: NodeId,
    /// The serialized body.
    pub body: ExtensionObjectBody,
}

impl BinaryEncodable for ExtensionObject {
    fn byte_len(&self) -> usize {
        let mut size = self.node_id.byte_len() + 1;
        match &self.body {
            ExtensionObjectBody::None => {}
            ExtensionObjectBody::ByteString(value) => size += 4 + value.len(),
            ExtensionObjectBody::XmlElement(value) => size += value.byte_len(),
        }
        size
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        self.node_id.encode(stream)?;
        match &self.body {
            ExtensionObjectBody::None => write_u8(stream, BODY_NONE),
            ExtensionObjectBody::ByteString(value) => {
                write_u8(stream, BODY_BYTE_STRING)?;
                crate::encoding::write_i32(stream, value.len() as i32)?;
                stream.write_all(value).map_err(Error::encoding)
            }
            ExtensionObjectBody::XmlElement(value) => {
                write_u8(stream, BODY_XML)?;
                value.encode(stream)
            }
        }
    }
}

impl BinaryDecodable for ExtensionObject {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let _depth_lock = options.depth_lock()?;
        let node_id = NodeId::decode(stream, options)?;
        let encoding = read_u8(stream)?;
        let body = match encoding {
            BODY_NONE => ExtensionObjectBody::None,
            BODY_BYTE_STRING => {
                let len = crate::encoding::read_i32(stream)?;
                if len < 0 {
                    ExtensionObjectBody::ByteString(Vec::new())
                } else if len as usize > options.max_byte_string_length {
                    return Err(Error::decoding(format!(
                        "ExtensionObject body length {} exceeds decoding limit {}",
                        len, options.max_byte_string_length
                    )));
                } else {
                    let mut value = vec![0u8; len as usize];
                    stream.read_exact(&mut value).map_err(Error::decoding)?;
                    ExtensionObjectBody::ByteString(value)
                }
            }
            BODY_XML => ExtensionObjectBody::XmlElement(XmlElement::decode(stream, options)?),
            _ => {
                return Err(Error::decoding(format!(
                    "ExtensionObject has unrecognized body encoding {}",
                    encoding
                )));
            }
        };
        Ok(ExtensionObject { node_id, body })
    }
}

impl ExtensionObject {
    /// An extension object with no node id and no body.
    pub fn null() -> ExtensionObject {
        ExtensionObject::default()
    }

    /// Returns `true` when there is neither a type id nor a body.
    pub fn is_null(&self) -> bool {
        self.node_id.is_null() && matches!(self.body, ExtensionObjectBody::None)
    }

    /// Serialize `value` into a binary-bodied extension object tagged with
    /// `encoding_id`.
    pub fn from_message<T: BinaryEncodable>(encoding_id: NodeId, value: &T) -> ExtensionObject {
        ExtensionObject {
            node_id: encoding_id,
            body: ExtensionObjectBody::ByteString(value.encode_to_vec()),
        }
    }

    /// Decode the binary body as a `T`. Fails on missing or XML bodies.
    pub fn decode_inner<T: BinaryDecodable>(
        &self,
        options: &DecodingOptions,
    ) -> EncodingResult<T> {
        match &self.body {
            ExtensionObjectBody::ByteString(value) => {
                let mut stream = Cursor::new(value);
                T::decode(&mut stream, options)
            }
            _ => Err(Error::decoding(
                "ExtensionObject does not have a binary body",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn null_object() {
        let v = ExtensionObject::null();
        // Two byte node id, body encoding 0
        assert_eq!(v.encode_to_vec(), vec![0x00, 0x00, 0x00]);
    }

    #[test]
    fn round_trip_binary_body() {
        let inner = crate::qualified_name::QualifiedName::new(1, "Name");
        let v = ExtensionObject::from_message(NodeId::ns0(722), &inner);
        let mut stream = Cursor::new(v.encode_to_vec());
        let decoded = ExtensionObject::decode(&mut stream, &DecodingOptions::default()).unwrap();
        assert_eq!(decoded, v);
        let inner2: crate::qualified_name::QualifiedName = decoded
            .decode_inner(&DecodingOptions::default())
            .unwrap();
        assert_eq!(inner2, inner);
    }

    #[test]
    fn unknown_body_encoding_is_rejected() {
        let mut stream = Cursor::new(vec![0x00, 0x00, 0x03]);
        assert!(ExtensionObject::decode(&mut stream, &DecodingOptions::default()).is_err());
    }
}
