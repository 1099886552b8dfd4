// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! A tokio codec that frames the inbound byte stream into transport messages.
//! Handshake messages are decoded in place; chunks are passed through whole for
//! the secure channel to verify and decrypt.

use std::io::Cursor;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use ualite_types::{
    encoding::BinaryDecodable, DecodingOptions, EncodingResult, StatusCode,
};

use super::{
    message_chunk::MessageChunk,
    tcp_types::{
        AcknowledgeMessage, ErrorMessage, HelloMessage, MessageHeader, MessageType,
        MESSAGE_HEADER_SIZE,
    },
};

/// One framed message off the wire.
#[derive(Debug)]
pub enum Message {
    /// A client hello. Only ever seen by servers; decoded for completeness.
    Hello(HelloMessage),
    /// The server's handshake acknowledgement.
    Acknowledge(AcknowledgeMessage),
    /// A transport error; the connection is about to close.
    Error(ErrorMessage),
    /// A chunk of a secured message.
    Chunk(MessageChunk),
}

/// Decoder from the raw byte stream to [`Message`]s, applying the negotiated
/// receive limits chunk by chunk.
pub struct TcpCodec {
    options: DecodingOptions,
}

impl TcpCodec {
    /// Create a codec enforcing the given limits.
    pub fn new(options: DecodingOptions) -> TcpCodec {
        TcpCodec { options }
    }

    fn decode_message(
        header: MessageHeader,
        body: &mut Cursor<&[u8]>,
        options: &DecodingOptions,
        whole: &[u8],
    ) -> EncodingResult<Message> {
        match header.message_type {
            MessageType::Hello => Ok(Message::Hello(HelloMessage::decode_body(body, options)?)),
            MessageType::Acknowledge => Ok(Message::Acknowledge(
                AcknowledgeMessage::decode_body(body, options)?,
            )),
            MessageType::Error => Ok(Message::Error(ErrorMessage::decode_body(body, options)?)),
            MessageType::Message
            | MessageType::OpenSecureChannel
            | MessageType::CloseSecureChannel => Ok(Message::Chunk(MessageChunk {
                data: whole.to_vec(),
            })),
            MessageType::ReverseHello => Err(ualite_types::Error::new(
                StatusCode::BadTcpMessageTypeInvalid,
                "Reverse hello is not accepted on client connections",
            )),
        }
    }
}

impl Decoder for TcpCodec {
    type Item = Message;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Message>, std::io::Error> {
        if buf.len() < MESSAGE_HEADER_SIZE {
            return Ok(None);
        }
        let header = {
            let mut stream = Cursor::new(&buf[..MESSAGE_HEADER_SIZE]);
            MessageHeader::decode(&mut stream, &self.options)?
        };
        let message_size = header.message_size as usize;
        if self.options.max_message_size > 0 && message_size > self.options.max_message_size {
            return Err(ualite_types::Error::new(
                StatusCode::BadTcpMessageTooLarge,
                format!(
                    "Inbound message of {} bytes exceeds the limit {}",
                    message_size, self.options.max_message_size
                ),
            )
            .into());
        }
        if buf.len() < message_size {
            buf.reserve(message_size - buf.len());
            return Ok(None);
        }

        let whole = buf[..message_size].to_vec();
        let mut body = Cursor::new(&whole[MESSAGE_HEADER_SIZE..]);
        let message = Self::decode_message(header, &mut body, &self.options, &whole)?;
        buf.advance(message_size);
        Ok(Some(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ualite_types::encoding::BinaryEncodable;

    #[test]
    fn partial_data_yields_nothing() {
        let mut codec = TcpCodec::new(DecodingOptions::default());
        let ack = AcknowledgeMessage {
            protocol_version: 0,
            receive_buffer_size: 65536,
            send_buffer_size: 65536,
            max_message_size: 1 << 20,
            max_chunk_count: 64,
        };
        let bytes = ack.encode_to_vec();
        let mut buf = BytesMut::from(&bytes[..5]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&bytes[5..]);
        match codec.decode(&mut buf).unwrap() {
            Some(Message::Acknowledge(decoded)) => assert_eq!(decoded, ack),
            other => panic!("Expected an acknowledge, got {:?}", other),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn error_message_is_framed() {
        let mut codec = TcpCodec::new(DecodingOptions::default());
        let error = ErrorMessage {
            error: StatusCode::BadTcpServerTooBusy,
            reason: "busy".into(),
        };
        let mut buf = BytesMut::from(error.encode_to_vec().as_slice());
        match codec.decode(&mut buf).unwrap() {
            Some(Message::Error(decoded)) => assert_eq!(decoded.error, error.error),
            other => panic!("Expected an error message, got {:?}", other),
        }
    }

    #[test]
    fn oversize_message_fails_the_stream() {
        let options = DecodingOptions {
            max_message_size: 16,
            ..Default::default()
        };
        let mut codec = TcpCodec::new(options);
        let error = ErrorMessage {
            error: StatusCode::Bad,
            reason: "this reason does not fit in sixteen bytes".into(),
        };
        let mut buf = BytesMut::from(error.encode_to_vec().as_slice());
        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn two_messages_in_one_read() {
        let mut codec = TcpCodec::new(DecodingOptions::default());
        let ack = AcknowledgeMessage {
            protocol_version: 0,
            receive_buffer_size: 8192,
            send_buffer_size: 8192,
            max_message_size: 0,
            max_chunk_count: 0,
        };
        let mut bytes = ack.encode_to_vec();
        bytes.extend_from_slice(&ack.encode_to_vec());
        let mut buf = BytesMut::from(bytes.as_slice());
        assert!(matches!(
            codec.decode(&mut buf).unwrap(),
            Some(Message::Acknowledge(_))
        ));
        assert!(matches!(
            codec.decode(&mut buf).unwrap(),
            Some(Message::Acknowledge(_))
        ));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }
}
