// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! A message chunk: one unit of the on-wire protocol, 8 byte header plus a
//! possibly signed and encrypted body. Large messages are split over several
//! chunks; each chunk is secured independently.

use std::io::{Cursor, Read, Write};

use ualite_types::{
    encoding::{BinaryDecodable, BinaryEncodable},
    DecodingOptions, EncodingResult, Error, StatusCode,
};

use super::{
    secure_channel::SecureChannel,
    security_header::{SecurityHeader, SequenceHeader},
    tcp_types::{ChunkKind, MessageHeader, MessageType, MESSAGE_HEADER_SIZE, MIN_BUFFER_SIZE},
};

/// Everything parsed out of a chunk's leading headers.
#[derive(Debug)]
pub struct ChunkInfo {
    /// The message header.
    pub message_header: MessageHeader,
    /// The security header.
    pub security_header: SecurityHeader,
    /// The sequence header.
    pub sequence_header: SequenceHeader,
    /// Offset of the message body within the chunk data.
    pub body_offset: usize,
    /// Length of the message body.
    pub body_length: usize,
}

/// A chunk in plaintext form: headers, sequence header, body, and, when secured,
/// padding and signature.
#[derive(Debug, Clone)]
pub struct MessageChunk {
    /// The raw chunk bytes including every header.
    pub data: Vec<u8>,
}

impl MessageChunk {
    /// Assemble a plaintext chunk around `body`. Security is applied afterwards by
    /// [`SecureChannel::apply_security`].
    pub fn new(
        sequence_number: u32,
        request_id: u32,
        message_type: MessageType,
        chunk_kind: ChunkKind,
        secure_channel: &SecureChannel,
        body: &[u8],
    ) -> EncodingResult<MessageChunk> {
        let security_header = secure_channel.make_security_header(message_type);
        let sequence_header = SequenceHeader {
            sequence_number,
            request_id,
        };

        let message_size = MESSAGE_HEADER_SIZE
            + security_header.byte_len()
            + sequence_header.byte_len()
            + body.len();

        let header = MessageHeader {
            message_type,
            chunk_kind,
            message_size: message_size as u32,
        };

        let mut stream = Cursor::new(Vec::with_capacity(message_size));
        header.encode(&mut stream)?;
        security_header.encode(&mut stream)?;
        sequence_header.encode(&mut stream)?;
        stream.write_all(body).map_err(Error::encoding)?;

        Ok(MessageChunk {
            data: stream.into_inner(),
        })
    }

    /// Read a whole chunk, header included, off a stream.
    pub fn decode<S: Read + ?Sized>(
        in_stream: &mut S,
        options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let header = MessageHeader::decode(in_stream, options)?;
        let message_size = header.message_size as usize;
        if options.max_message_size > 0 && message_size > options.max_message_size {
            return Err(Error::new(
                StatusCode::BadTcpMessageTooLarge,
                format!(
                    "Chunk size {} exceeds the message size limit {}",
                    message_size, options.max_message_size
                ),
            ));
        }
        let mut data = Vec::with_capacity(message_size);
        header.encode(&mut data)?;
        data.resize(message_size, 0);
        in_stream
            .read_exact(&mut data[MESSAGE_HEADER_SIZE..])
            .map_err(Error::decoding)?;
        Ok(MessageChunk { data })
    }

    /// The message header at the start of the chunk.
    pub fn message_header(&self, options: &DecodingOptions) -> EncodingResult<MessageHeader> {
        let mut stream = Cursor::new(&self.data);
        MessageHeader::decode(&mut stream, options)
    }

    /// `true` if this chunk belongs to an OpenSecureChannel message.
    pub fn is_open_secure_channel(&self, options: &DecodingOptions) -> bool {
        self.message_header(options)
            .map(|h| h.message_type == MessageType::OpenSecureChannel)
            .unwrap_or(false)
    }

    /// Parse the chunk's headers, yielding offsets into the (decrypted) data.
    pub fn chunk_info(&self, secure_channel: &SecureChannel) -> EncodingResult<ChunkInfo> {
        let options = secure_channel.decoding_options();
        let mut stream = Cursor::new(&self.data);
        let message_header = MessageHeader::decode(&mut stream, &options)?;
        let security_header = SecurityHeader::decode_from_stream(
            &mut stream,
            message_header.message_type == MessageType::OpenSecureChannel,
            &options,
        )?;
        let sequence_header = SequenceHeader::decode(&mut stream, &options)?;
        let body_offset = stream.position() as usize;
        if self.data.len() < body_offset {
            return Err(Error::decoding("Chunk is shorter than its headers"));
        }
        Ok(ChunkInfo {
            message_header,
            security_header,
            sequence_header,
            body_offset,
            // In plaintext chunks the body runs to the end of the data. Secured
            // inbound chunks are truncated to this shape during verification.
            body_length: self.data.len() - body_offset,
        })
    }

    /// Offset where encryption starts: everything from the sequence header on.
    pub(crate) fn encrypted_data_offset(
        &self,
        options: &DecodingOptions,
    ) -> EncodingResult<usize> {
        let mut stream = Cursor::new(&self.data);
        let message_header = MessageHeader::decode(&mut stream, options)?;
        SecurityHeader::decode_from_stream(
            &mut stream,
            message_header.message_type == MessageType::OpenSecureChannel,
            options,
        )?;
        Ok(stream.position() as usize)
    }

    /// The largest body that fits a chunk of `max_chunk_size` once headers,
    /// signature, padding and cipher block alignment are accounted for.
    pub fn body_size_from_message_size(
        message_type: MessageType,
        secure_channel: &SecureChannel,
        max_chunk_size: usize,
    ) -> EncodingResult<usize> {
        if max_chunk_size < MIN_BUFFER_SIZE {
            return Err(Error::new(
                StatusCode::BadTcpInternalError,
                format!(
                    "Chunk size {} is below the protocol minimum {}",
                    max_chunk_size, MIN_BUFFER_SIZE
                ),
            ));
        }
        let security_header = secure_channel.make_security_header(message_type);
        let header_size = MESSAGE_HEADER_SIZE + security_header.byte_len() + 8;

        let signature_size = secure_channel.signature_size(&security_header)?;
        let (plain_block_size, minimum_padding) =
            secure_channel.padding_block_sizes(&security_header, signature_size, message_type)?;

        // When encrypting, the ciphertext is a whole multiple of the block size;
        // round the available chunk size down to a block boundary first.
        let aligned = if plain_block_size > 0 {
            max_chunk_size - (max_chunk_size % plain_block_size)
        } else {
            max_chunk_size
        };
        Ok(aligned - header_size - signature_size - minimum_padding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comms::secure_channel::SecureChannel;

    #[test]
    fn plaintext_chunk_layout() {
        let channel = SecureChannel::new_insecure_test();
        let body = vec![1u8, 2, 3, 4];
        let chunk = MessageChunk::new(
            5,
            10,
            MessageType::Message,
            ChunkKind::Final,
            &channel,
            &body,
        )
        .unwrap();
        // header(8) + symmetric security header(8) + sequence header(8) + body(4)
        assert_eq!(chunk.data.len(), 28);
        let info = chunk.chunk_info(&channel).unwrap();
        assert_eq!(info.body_offset, 24);
        assert_eq!(info.body_length, 4);
        assert_eq!(info.sequence_header.sequence_number, 5);
        assert_eq!(info.sequence_header.request_id, 10);
        assert_eq!(&chunk.data[24..], body.as_slice());
    }

    #[test]
    fn decode_round_trip() {
        let channel = SecureChannel::new_insecure_test();
        let chunk = MessageChunk::new(
            1,
            1,
            MessageType::Message,
            ChunkKind::Final,
            &channel,
            &[9u8; 100],
        )
        .unwrap();
        let mut stream = std::io::Cursor::new(chunk.data.clone());
        let decoded = MessageChunk::decode(&mut stream, &DecodingOptions::default()).unwrap();
        assert_eq!(decoded.data, chunk.data);
    }

    #[test]
    fn oversize_chunk_is_rejected() {
        let options = DecodingOptions {
            max_message_size: 64,
            ..Default::default()
        };
        let channel = SecureChannel::new_insecure_test();
        let chunk = MessageChunk::new(
            1,
            1,
            MessageType::Message,
            ChunkKind::Final,
            &channel,
            &[0u8; 128],
        )
        .unwrap();
        let mut stream = std::io::Cursor::new(chunk.data);
        let err = MessageChunk::decode(&mut stream, &options).unwrap_err();
        assert_eq!(err.status(), StatusCode::BadTcpMessageTooLarge);
    }
}
