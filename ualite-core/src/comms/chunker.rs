// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Turning messages into chunk sequences and chunk sequences back into messages.

use std::io::Cursor;

use log::error;

use ualite_types::{
    encoding::{BinaryDecodable, BinaryEncodable},
    EncodingResult, Error, NodeId, StatusCode,
};

use crate::messages::Message;

use super::{
    message_chunk::MessageChunk,
    secure_channel::SecureChannel,
    tcp_types::ChunkKind,
};

// Sequence numbers may only wrap once they pass this value, and must wrap to a
// value below 1024.
const SEQUENCE_WRAP_MIN: u32 = u32::MAX - 1024;
const SEQUENCE_WRAP_LIMIT: u32 = 1024;

/// Splits outgoing messages into secured-size chunks and reassembles inbound
/// chunk sequences, enforcing sequence number discipline.
pub struct Chunker;

impl Chunker {
    /// `true` when `actual` is acceptable where `expected` was predicted, i.e.
    /// equal, or a legal wrap of the 32 bit counter.
    pub fn is_valid_sequence_number(expected: u32, actual: u32) -> bool {
        actual == expected || (expected >= SEQUENCE_WRAP_MIN && actual < SEQUENCE_WRAP_LIMIT)
    }

    /// Validate that the chunks carry the expected channel id, contiguous
    /// sequence numbers starting at `starting_sequence_number`, and a single
    /// request id. Returns the sequence number to expect next.
    pub fn validate_chunks(
        starting_sequence_number: u32,
        secure_channel: &SecureChannel,
        chunks: &[MessageChunk],
    ) -> EncodingResult<u32> {
        let secure_channel_id = secure_channel.secure_channel_id();
        let mut expected_sequence_number = starting_sequence_number;
        let mut expected_request_id = 0;

        for (i, chunk) in chunks.iter().enumerate() {
            let chunk_info = chunk.chunk_info(secure_channel)?;

            if secure_channel_id != 0
                && chunk_info.security_header.secure_channel_id() != secure_channel_id
            {
                return Err(Error::new(
                    StatusCode::BadSecureChannelIdInvalid,
                    format!(
                        "Chunk has channel id {}, expected {}",
                        chunk_info.security_header.secure_channel_id(),
                        secure_channel_id
                    ),
                ));
            }

            let sequence_number = chunk_info.sequence_header.sequence_number;
            if !Self::is_valid_sequence_number(expected_sequence_number, sequence_number) {
                return Err(Error::new(
                    StatusCode::BadSequenceNumberInvalid,
                    format!(
                        "Chunk {} has sequence number {}, expected {}",
                        i, sequence_number, expected_sequence_number
                    ),
                ));
            }
            expected_sequence_number = sequence_number.wrapping_add(1);

            if i == 0 {
                expected_request_id = chunk_info.sequence_header.request_id;
            } else if chunk_info.sequence_header.request_id != expected_request_id {
                return Err(Error::new(
                    StatusCode::BadSequenceNumberInvalid,
                    format!(
                        "Chunk {} has request id {}, expected {}",
                        i, chunk_info.sequence_header.request_id, expected_request_id
                    ),
                ));
            }
        }
        Ok(expected_sequence_number)
    }

    /// Encode `message` and split it into chunks no larger than `max_chunk_size`,
    /// consuming one sequence number per chunk starting at `sequence_number`.
    /// `max_chunk_size` and `max_message_size` of 0 mean no limit.
    pub fn encode(
        sequence_number: u32,
        request_id: u32,
        max_message_size: usize,
        max_chunk_size: usize,
        secure_channel: &SecureChannel,
        message: &impl Message,
    ) -> EncodingResult<Vec<MessageChunk>> {
        // Serialize the whole message: type id then body
        let node_id = message.type_id();
        let mut body = Cursor::new(Vec::with_capacity(
            node_id.byte_len() + message.byte_len(),
        ));
        node_id.encode(&mut body)?;
        message.encode(&mut body)?;
        let body = body.into_inner();

        if max_message_size > 0 && body.len() > max_message_size {
            error!(
                "Message of {} bytes exceeds the max message size {}",
                body.len(),
                max_message_size
            );
            return Err(Error::new(
                StatusCode::BadRequestTooLarge,
                format!(
                    "Message of {} bytes exceeds the max message size {}",
                    body.len(),
                    max_message_size
                ),
            )
            .with_context(Some(request_id), Some(message.request_handle())));
        }

        let message_type = message.message_type();
        let max_body_per_chunk = if max_chunk_size > 0 {
            MessageChunk::body_size_from_message_size(
                message_type,
                secure_channel,
                max_chunk_size,
            )?
        } else {
            body.len().max(1)
        };

        let mut chunks = Vec::with_capacity(body.len() / max_body_per_chunk + 1);
        let mut slices = body.chunks(max_body_per_chunk).peekable();
        while let Some(slice) = slices.next() {
            let chunk_kind = if slices.peek().is_none() {
                ChunkKind::Final
            } else {
                ChunkKind::Intermediate
            };
            let chunk = MessageChunk::new(
                sequence_number.wrapping_add(chunks.len() as u32),
                request_id,
                message_type,
                chunk_kind,
                secure_channel,
                slice,
            )?;
            chunks.push(chunk);
        }
        Ok(chunks)
    }

    /// Reassemble validated plaintext chunks into a message of type `T`. When
    /// `expected_node_id` is given, the message's type id must match it.
    pub fn decode<T: Message>(
        chunks: &[MessageChunk],
        secure_channel: &SecureChannel,
        expected_node_id: Option<NodeId>,
    ) -> EncodingResult<T> {
        let mut body = Vec::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let chunk_info = chunk.chunk_info(secure_channel)?;
            let expected_kind = if i == chunks.len() - 1 {
                ChunkKind::Final
            } else {
                ChunkKind::Intermediate
            };
            if chunk_info.message_header.chunk_kind != expected_kind {
                return Err(Error::decoding(
                    "Chunk sequence does not end in a single final chunk",
                ));
            }
            body.extend_from_slice(
                &chunk.data[chunk_info.body_offset..chunk_info.body_offset + chunk_info.body_length],
            );
        }

        let options = secure_channel.decoding_options();
        let mut stream = Cursor::new(body);
        // The message body leads with the node id of its binary encoding
        let node_id = NodeId::decode(&mut stream, &options)?;
        if let Some(expected) = expected_node_id {
            if node_id != expected {
                return Err(Error::decoding(format!(
                    "Message type id {} is not the expected {}",
                    node_id, expected
                )));
            }
        }
        let Some(type_id) = node_id.as_ns0_u32() else {
            return Err(Error::decoding(format!(
                "Message type id {} is not numeric in namespace 0",
                node_id
            )));
        };
        T::decode_by_type_id(&mut stream, type_id, &options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::RequestMessage;
    use ualite_types::{GetEndpointsRequest, RequestHeader, UaString};

    fn test_message() -> RequestMessage {
        GetEndpointsRequest {
            request_header: RequestHeader::new(&NodeId::null(), 1, 1000),
            endpoint_url: UaString::from("opc.tcp://localhost:4840/"),
            locale_ids: None,
            profile_uris: None,
        }
        .into()
    }

    #[test]
    fn single_chunk_round_trip() {
        let channel = SecureChannel::new_insecure_test();
        let message = test_message();
        let chunks = Chunker::encode(1, 1, 0, 0, &channel, &message).unwrap();
        assert_eq!(chunks.len(), 1);
        let decoded: RequestMessage = Chunker::decode(&chunks, &channel, None).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn multi_chunk_round_trip() {
        let channel = SecureChannel::new_insecure_test();
        let message = test_message();
        // A chunk size floor of 8192 still forces chunking for big messages; use a
        // large URL to exceed one chunk
        let message = match message {
            RequestMessage::GetEndpoints(mut m) => {
                m.endpoint_url = UaString::from("x".repeat(20000).as_str());
                RequestMessage::GetEndpoints(m)
            }
            _ => unreachable!(),
        };
        let chunks = Chunker::encode(1, 1, 0, 8192, &channel, &message).unwrap();
        assert!(chunks.len() > 1);
        // Sequence numbers increment per chunk
        let last = Chunker::validate_chunks(1, &channel, &chunks).unwrap();
        assert_eq!(last, 1 + chunks.len() as u32);
        let decoded: RequestMessage = Chunker::decode(&chunks, &channel, None).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn chunk_sizes_stay_bounded() {
        let channel = SecureChannel::new_insecure_test();
        let message = match test_message() {
            RequestMessage::GetEndpoints(mut m) => {
                m.endpoint_url = UaString::from("y".repeat(50000).as_str());
                RequestMessage::GetEndpoints(m)
            }
            _ => unreachable!(),
        };
        let chunks = Chunker::encode(1, 1, 0, 8192, &channel, &message).unwrap();
        for chunk in &chunks {
            assert!(chunk.data.len() <= 8192);
        }
    }

    #[test]
    fn message_size_limit_is_enforced() {
        let channel = SecureChannel::new_insecure_test();
        let message = test_message();
        let err = Chunker::encode(1, 1, 16, 0, &channel, &message).unwrap_err();
        assert_eq!(err.status(), StatusCode::BadRequestTooLarge);
    }

    #[test]
    fn bad_sequence_number_is_rejected() {
        let channel = SecureChannel::new_insecure_test();
        let message = test_message();
        let chunks = Chunker::encode(5, 1, 0, 0, &channel, &message).unwrap();
        let err = Chunker::validate_chunks(6, &channel, &chunks).unwrap_err();
        assert_eq!(err.status(), StatusCode::BadSequenceNumberInvalid);
    }

    #[test]
    fn sequence_wrap_rule() {
        // Wrap is legal only near the top of the range, to a small value
        assert!(Chunker::is_valid_sequence_number(u32::MAX, u32::MAX));
        assert!(Chunker::is_valid_sequence_number(u32::MAX, 0));
        assert!(Chunker::is_valid_sequence_number(u32::MAX - 100, 5));
        assert!(!Chunker::is_valid_sequence_number(u32::MAX, 1024));
        assert!(!Chunker::is_valid_sequence_number(1000, 0));
        assert!(!Chunker::is_valid_sequence_number(1000, 1002));
    }
}
