// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The OPC UA TCP transport messages: the 8 byte message header shared by every
//! message on the wire, and the Hello / Acknowledge / Error handshake bodies.

use std::io::{Read, Write};

use ualite_types::{
    encoding::{
        read_u32, read_u8, write_u32, write_u8, BinaryDecodable, BinaryEncodable,
        DecodingOptions, EncodingResult, Error,
    },
    StatusCode, UaString,
};

/// The protocol version this stack implements.
pub const PROTOCOL_VERSION: u32 = 0;

/// Smallest receive/send buffer size either side may propose.
pub const MIN_BUFFER_SIZE: usize = 8192;

/// Size in bytes of the message header: three ASCII type bytes, one chunk kind
/// byte and a little-endian u32 total size including the header itself.
pub const MESSAGE_HEADER_SIZE: usize = 8;

/// Offset of the message size field within the header.
pub const MESSAGE_SIZE_OFFSET: usize = 4;

const TYPE_HELLO: &[u8; 3] = b"HEL";
const TYPE_ACKNOWLEDGE: &[u8; 3] = b"ACK";
const TYPE_ERROR: &[u8; 3] = b"ERR";
const TYPE_MESSAGE: &[u8; 3] = b"MSG";
const TYPE_OPEN_SECURE_CHANNEL: &[u8; 3] = b"OPN";
const TYPE_CLOSE_SECURE_CHANNEL: &[u8; 3] = b"CLO";
const TYPE_REVERSE_HELLO: &[u8; 3] = b"RHE";

const CHUNK_KIND_FINAL: u8 = b'F';
const CHUNK_KIND_INTERMEDIATE: u8 = b'C';
const CHUNK_KIND_ABORT: u8 = b'A';

/// The type of a message on the wire, the first three bytes of every header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Client hello.
    Hello,
    /// Server acknowledge.
    Acknowledge,
    /// Transport-level error.
    Error,
    /// A secured service message chunk.
    Message,
    /// An OpenSecureChannel chunk.
    OpenSecureChannel,
    /// A CloseSecureChannel chunk.
    CloseSecureChannel,
    /// Reverse hello, sent by servers initiating reverse connections.
    ReverseHello,
}

impl MessageType {
    fn as_bytes(&self) -> &'static [u8; 3] {
        match self {
            MessageType::Hello => TYPE_HELLO,
            MessageType::Acknowledge => TYPE_ACKNOWLEDGE,
            MessageType::Error => TYPE_ERROR,
            MessageType::Message => TYPE_MESSAGE,
            MessageType::OpenSecureChannel => TYPE_OPEN_SECURE_CHANNEL,
            MessageType::CloseSecureChannel => TYPE_CLOSE_SECURE_CHANNEL,
            MessageType::ReverseHello => TYPE_REVERSE_HELLO,
        }
    }

    /// `true` for the chunked, securable message types.
    pub fn is_chunk(&self) -> bool {
        matches!(
            self,
            MessageType::Message | MessageType::OpenSecureChannel | MessageType::CloseSecureChannel
        )
    }
}

/// Whether a chunk continues a message, completes it, or aborts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// An intermediate chunk; more follow.
    Intermediate,
    /// The final chunk of a message.
    Final,
    /// The sender abandoned the message; discard accumulated chunks.
    Abort,
}

/// The 8 byte header at the start of every message and chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MessageHeader {
    /// The message type.
    pub message_type: MessageType,
    /// The chunk kind. Handshake messages always use `Final`.
    pub chunk_kind: ChunkKind,
    /// Total size in bytes including this header.
    pub message_size: u32,
}

impl BinaryEncodable for MessageHeader {
    fn byte_len(&self) -> usize {
        MESSAGE_HEADER_SIZE
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        stream
            .write_all(self.message_type.as_bytes())
            .map_err(Error::encoding)?;
        let kind = match self.chunk_kind {
            ChunkKind::Intermediate => CHUNK_KIND_INTERMEDIATE,
            ChunkKind::Final => CHUNK_KIND_FINAL,
            ChunkKind::Abort => CHUNK_KIND_ABORT,
        };
        write_u8(stream, kind)?;
        write_u32(stream, self.message_size)
    }
}

impl BinaryDecodable for MessageHeader {
    fn decode<S: Read + ?Sized>(stream: &mut S, _: &DecodingOptions) -> EncodingResult<Self> {
        let mut message_type = [0u8; 3];
        stream.read_exact(&mut message_type).map_err(Error::decoding)?;
        let message_type = match &message_type {
            TYPE_HELLO => MessageType::Hello,
            TYPE_ACKNOWLEDGE => MessageType::Acknowledge,
            TYPE_ERROR => MessageType::Error,
            TYPE_MESSAGE => MessageType::Message,
            TYPE_OPEN_SECURE_CHANNEL => MessageType::OpenSecureChannel,
            TYPE_CLOSE_SECURE_CHANNEL => MessageType::CloseSecureChannel,
            TYPE_REVERSE_HELLO => MessageType::ReverseHello,
            other => {
                return Err(Error::new(
                    StatusCode::BadTcpMessageTypeInvalid,
                    format!("Unknown message type {:?}", other),
                ));
            }
        };
        let chunk_kind = match read_u8(stream)? {
            CHUNK_KIND_FINAL => ChunkKind::Final,
            CHUNK_KIND_INTERMEDIATE => ChunkKind::Intermediate,
            CHUNK_KIND_ABORT => ChunkKind::Abort,
            other => {
                return Err(Error::new(
                    StatusCode::BadTcpMessageTypeInvalid,
                    format!("Unknown chunk kind {}", other),
                ));
            }
        };
        let message_size = read_u32(stream)?;
        if (message_size as usize) < MESSAGE_HEADER_SIZE {
            return Err(Error::new(
                StatusCode::BadTcpInternalError,
                format!("Message size {} is below the header size", message_size),
            ));
        }
        Ok(MessageHeader {
            message_type,
            chunk_kind,
            message_size,
        })
    }
}

/// The client's opening message, proposing buffer sizes and limits.
#[derive(Debug, Clone, PartialEq)]
pub struct HelloMessage {
    /// Protocol version, currently always 0.
    pub protocol_version: u32,
    /// Largest chunk the client is prepared to receive.
    pub receive_buffer_size: u32,
    /// Largest chunk the client will send.
    pub send_buffer_size: u32,
    /// Largest whole message the client accepts, 0 for no limit.
    pub max_message_size: u32,
    /// Largest chunk count per message the client accepts, 0 for no limit.
    pub max_chunk_count: u32,
    /// The endpoint the client wants to reach.
    pub endpoint_url: UaString,
}

impl BinaryEncodable for HelloMessage {
    fn byte_len(&self) -> usize {
        MESSAGE_HEADER_SIZE + 20 + self.endpoint_url.byte_len()
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        self.header().encode(stream)?;
        self.protocol_version.encode(stream)?;
        self.receive_buffer_size.encode(stream)?;
        self.send_buffer_size.encode(stream)?;
        self.max_message_size.encode(stream)?;
        self.max_chunk_count.encode(stream)?;
        self.endpoint_url.encode(stream)
    }
}

impl HelloMessage {
    /// Build a hello for `endpoint_url` with the given limits. Buffer sizes below
    /// the protocol minimum are raised to it.
    pub fn new(
        endpoint_url: &str,
        send_buffer_size: usize,
        receive_buffer_size: usize,
        max_message_size: usize,
        max_chunk_count: usize,
    ) -> HelloMessage {
        HelloMessage {
            protocol_version: PROTOCOL_VERSION,
            receive_buffer_size: receive_buffer_size.max(MIN_BUFFER_SIZE) as u32,
            send_buffer_size: send_buffer_size.max(MIN_BUFFER_SIZE) as u32,
            max_message_size: max_message_size as u32,
            max_chunk_count: max_chunk_count as u32,
            endpoint_url: UaString::from(endpoint_url),
        }
    }

    fn header(&self) -> MessageHeader {
        MessageHeader {
            message_type: MessageType::Hello,
            chunk_kind: ChunkKind::Final,
            message_size: self.byte_len() as u32,
        }
    }

    /// Decode the hello body; the header has already been consumed.
    pub fn decode_body<S: Read + ?Sized>(
        stream: &mut S,
        options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        Ok(HelloMessage {
            protocol_version: u32::decode(stream, options)?,
            receive_buffer_size: u32::decode(stream, options)?,
            send_buffer_size: u32::decode(stream, options)?,
            max_message_size: u32::decode(stream, options)?,
            max_chunk_count: u32::decode(stream, options)?,
            endpoint_url: UaString::decode(stream, options)?,
        })
    }
}

/// The server's reply to Hello, carrying the values it revised.
#[derive(Debug, Clone, PartialEq)]
pub struct AcknowledgeMessage {
    /// Protocol version of the server.
    pub protocol_version: u32,
    /// Largest chunk the server will receive, bounding our sends.
    pub receive_buffer_size: u32,
    /// Largest chunk the server will send.
    pub send_buffer_size: u32,
    /// Largest whole message the server accepts.
    pub max_message_size: u32,
    /// Largest chunk count per message the server accepts.
    pub max_chunk_count: u32,
}

impl BinaryEncodable for AcknowledgeMessage {
    fn byte_len(&self) -> usize {
        MESSAGE_HEADER_SIZE + 20
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        MessageHeader {
            message_type: MessageType::Acknowledge,
            chunk_kind: ChunkKind::Final,
            message_size: self.byte_len() as u32,
        }
        .encode(stream)?;
        self.protocol_version.encode(stream)?;
        self.receive_buffer_size.encode(stream)?;
        self.send_buffer_size.encode(stream)?;
        self.max_message_size.encode(stream)?;
        self.max_chunk_count.encode(stream)
    }
}

impl AcknowledgeMessage {
    /// Decode the acknowledge body; the header has already been consumed.
    pub fn decode_body<S: Read + ?Sized>(
        stream: &mut S,
        options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        Ok(AcknowledgeMessage {
            protocol_version: u32::decode(stream, options)?,
            receive_buffer_size: u32::decode(stream, options)?,
            send_buffer_size: u32::decode(stream, options)?,
            max_message_size: u32::decode(stream, options)?,
            max_chunk_count: u32::decode(stream, options)?,
        })
    }

    /// Reject acknowledges whose buffers fall below the protocol floor; the
    /// client must not adopt them.
    pub fn validate(&self) -> EncodingResult<()> {
        if (self.receive_buffer_size as usize) < MIN_BUFFER_SIZE
            || (self.send_buffer_size as usize) < MIN_BUFFER_SIZE
        {
            Err(Error::new(
                StatusCode::BadTcpNotEnoughResources,
                format!(
                    "Server acknowledged buffers {}/{} below the {} byte minimum",
                    self.receive_buffer_size, self.send_buffer_size, MIN_BUFFER_SIZE
                ),
            ))
        } else {
            Ok(())
        }
    }
}

/// A transport-level failure. After sending this the peer closes the connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorMessage {
    /// The status code of the failure.
    pub error: StatusCode,
    /// Human readable reason.
    pub reason: UaString,
}

impl BinaryEncodable for ErrorMessage {
    fn byte_len(&self) -> usize {
        MESSAGE_HEADER_SIZE + 4 + self.reason.byte_len()
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        MessageHeader {
            message_type: MessageType::Error,
            chunk_kind: ChunkKind::Final,
            message_size: self.byte_len() as u32,
        }
        .encode(stream)?;
        self.error.encode(stream)?;
        self.reason.encode(stream)
    }
}

impl ErrorMessage {
    /// Decode the error body; the header has already been consumed.
    pub fn decode_body<S: Read + ?Sized>(
        stream: &mut S,
        options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        Ok(ErrorMessage {
            error: StatusCode::decode(stream, options)?,
            reason: UaString::decode(stream, options)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_layout() {
        let header = MessageHeader {
            message_type: MessageType::Hello,
            chunk_kind: ChunkKind::Final,
            message_size: 0x2030,
        };
        assert_eq!(
            header.encode_to_vec(),
            vec![b'H', b'E', b'L', b'F', 0x30, 0x20, 0, 0]
        );
    }

    #[test]
    fn header_rejects_undersized_message() {
        let bytes = vec![b'M', b'S', b'G', b'F', 7, 0, 0, 0];
        let mut stream = Cursor::new(bytes);
        assert!(MessageHeader::decode(&mut stream, &DecodingOptions::default()).is_err());
    }

    #[test]
    fn header_rejects_unknown_type() {
        let bytes = vec![b'X', b'Y', b'Z', b'F', 8, 0, 0, 0];
        let mut stream = Cursor::new(bytes);
        let err = MessageHeader::decode(&mut stream, &DecodingOptions::default()).unwrap_err();
        assert_eq!(err.status(), StatusCode::BadTcpMessageTypeInvalid);
    }

    #[test]
    fn hello_round_trip() {
        let hello = HelloMessage::new("opc.tcp://localhost:4840/", 65536, 65536, 1 << 20, 64);
        let encoded = hello.encode_to_vec();
        assert_eq!(encoded.len(), hello.byte_len());
        let mut stream = Cursor::new(&encoded[MESSAGE_HEADER_SIZE..]);
        let decoded =
            HelloMessage::decode_body(&mut stream, &DecodingOptions::default()).unwrap();
        assert_eq!(decoded, hello);
    }

    #[test]
    fn hello_raises_small_buffers_to_minimum() {
        let hello = HelloMessage::new("opc.tcp://localhost:4840/", 100, 100, 0, 0);
        assert_eq!(hello.send_buffer_size as usize, MIN_BUFFER_SIZE);
        assert_eq!(hello.receive_buffer_size as usize, MIN_BUFFER_SIZE);
    }

    #[test]
    fn acknowledge_validates_minimum() {
        let ack = AcknowledgeMessage {
            protocol_version: 0,
            receive_buffer_size: 4096,
            send_buffer_size: 65536,
            max_message_size: 0,
            max_chunk_count: 0,
        };
        assert!(ack.validate().is_err());
    }
}
