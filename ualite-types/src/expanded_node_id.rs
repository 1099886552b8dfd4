// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The ExpandedNodeId type, a node id extended with a namespace URI and server index.

use std::{
    fmt,
    io::{Read, Write},
};

use crate::{
    encoding::{
        read_u8, write_u8, BinaryDecodable, BinaryEncodable, DecodingOptions, EncodingResult,
        Error,
    },
    node_id::{Identifier, NodeId},
    string::UaString,
};

const HAS_NAMESPACE_URI: u8 = 0x80;
const HAS_SERVER_INDEX: u8 = 0x40;

/// A [`NodeId`] that can reference a node in another server's address space. When
/// `namespace_uri` is set it takes precedence over the node id's namespace index.
#[derive(PartialEq, Eq, Clone, Debug, Hash, Default)]
pub struct ExpandedNodeId {
    /// The node id within the namespace.
    pub node_id: NodeId,
    /// Namespace URI, overriding the numeric namespace index when not null.
    pub namespace_uri: UaString,
    /// Index into the server table, 0 for the local server.
    pub server_index: u32,
}

impl fmt::Display for ExpandedNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace_uri.is_null() {
            write!(f, "{}", self.node_id)
        } else {
            write!(f, "nsu={};{}", self.namespace_uri, self.node_id.identifier)
        }
    }
}

impl BinaryEncodable for ExpandedNodeId {
    fn byte_len(&self) -> usize {
        let mut size = self.node_id.byte_len();
        if !self.namespace_uri.is_null() {
            size += self.namespace_uri.byte_len();
        }
        if self.server_index != 0 {
            size += 4;
        }
        size
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        // The flags live in the high bits of the node id's encoding byte, so the
        // node id body is written manually here.
        let mut encoding = match &self.node_id.identifier {
            Identifier::Numeric(value) => {
                if self.node_id.namespace == 0 && *value <= 255 {
                    0x00
                } else if self.node_id.namespace <= 255 && *value <= 65535 {
                    0x01
                } else {
                    0x02
                }
            }
            Identifier::String(_) => 0x03,
            Identifier::Guid(_) => 0x04,
            Identifier::ByteString(_) => 0x05,
        };
        if !self.namespace_uri.is_null() {
            encoding |= HAS_NAMESPACE_URI;
        }
        if self.server_index != 0 {
            encoding |= HAS_SERVER_INDEX;
        }
        write_u8(stream, encoding)?;
        // Re-encode the node id body without its own encoding byte
        let body = self.node_id.encode_to_vec();
        stream.write_all(&body[1..]).map_err(Error::encoding)?;
        if !self.namespace_uri.is_null() {
            self.namespace_uri.encode(stream)?;
        }
        if self.server_index != 0 {
            self.server_index.encode(stream)?;
        }
        Ok(())
    }
}

impl BinaryDecodable for ExpandedNodeId {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let encoding = read_u8(stream)?;
        // The low bits select the node id format, the high bits are the flags
        let node_id = NodeId::decode_body(encoding & 0x0F, stream, options)?;
        let namespace_uri = if encoding & HAS_NAMESPACE_URI != 0 {
            UaString::decode(stream, options)?
        } else {
            UaString::null()
        };
        let server_index = if encoding & HAS_SERVER_INDEX != 0 {
            u32::decode(stream, options)?
        } else {
            0
        };
        Ok(ExpandedNodeId {
            node_id,
            namespace_uri,
            server_index,
        })
    }
}

impl From<NodeId> for ExpandedNodeId {
    fn from(node_id: NodeId) -> Self {
        ExpandedNodeId {
            node_id,
            namespace_uri: UaString::null(),
            server_index: 0,
        }
    }
}

impl ExpandedNodeId {
    /// The null expanded node id.
    pub fn null() -> ExpandedNodeId {
        ExpandedNodeId::from(NodeId::null())
    }

    /// Returns `true` for the null expanded node id.
    pub fn is_null(&self) -> bool {
        self.node_id.is_null() && self.namespace_uri.is_null() && self.server_index == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trip() {
        for id in [
            ExpandedNodeId::null(),
            ExpandedNodeId::from(NodeId::new(2, "State")),
            ExpandedNodeId {
                node_id: NodeId::ns0(2253),
                namespace_uri: UaString::from("urn:other"),
                server_index: 3,
            },
        ] {
            let mut stream = Cursor::new(id.encode_to_vec());
            let decoded =
                ExpandedNodeId::decode(&mut stream, &DecodingOptions::default()).unwrap();
            assert_eq!(decoded, id);
        }
    }

    #[test]
    fn plain_id_matches_node_id_encoding() {
        let id = ExpandedNodeId::from(NodeId::ns0(85));
        assert_eq!(id.encode_to_vec(), NodeId::ns0(85).encode_to_vec());
    }
}
