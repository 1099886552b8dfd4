// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The outgoing side of a transport: queues encoded chunks, secures them one at a
//! time, and drains the secured bytes into the socket.

use std::collections::VecDeque;

use log::trace;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use ualite_types::{EncodingResult, Error, StatusCode};

use crate::messages::{Message, RequestMessage};

use super::{chunker::Chunker, message_chunk::MessageChunk, secure_channel::SecureChannel};

/// Buffers one or more outgoing messages as chunks, securing each chunk as it is
/// moved into the write buffer. The write buffer never holds more than one
/// secured chunk, bounding memory to the negotiated send buffer size.
pub struct SendBuffer {
    /// Secured bytes waiting to be written to the socket.
    out: Vec<u8>,
    /// Read position within `out`.
    out_pos: usize,
    /// Plaintext chunks awaiting securing.
    chunks: VecDeque<MessageChunk>,
    /// The negotiated bound on our chunk size.
    send_buffer_size: usize,
    /// The negotiated bound on total message size, 0 for none.
    max_message_size: usize,
    /// The negotiated bound on chunks per message, 0 for none.
    max_chunk_count: usize,
    /// The next sequence number to assign. Wraps to 1 after `u32::MAX`.
    sequence_number: u32,
}

impl SendBuffer {
    /// Create a buffer with the client's proposed limits.
    pub fn new(
        send_buffer_size: usize,
        max_message_size: usize,
        max_chunk_count: usize,
    ) -> SendBuffer {
        SendBuffer {
            out: Vec::with_capacity(send_buffer_size),
            out_pos: 0,
            chunks: VecDeque::new(),
            send_buffer_size,
            max_message_size,
            max_chunk_count,
            sequence_number: 1,
        }
    }

    /// Adopt the limits the server acknowledged. Only ever revises downwards.
    pub fn revise(
        &mut self,
        send_buffer_size: usize,
        max_message_size: usize,
        max_chunk_count: usize,
    ) {
        if send_buffer_size > 0 {
            self.send_buffer_size = self.send_buffer_size.min(send_buffer_size);
        }
        if max_message_size > 0 {
            self.max_message_size = if self.max_message_size == 0 {
                max_message_size
            } else {
                self.max_message_size.min(max_message_size)
            };
        }
        if max_chunk_count > 0 {
            self.max_chunk_count = if self.max_chunk_count == 0 {
                max_chunk_count
            } else {
                self.max_chunk_count.min(max_chunk_count)
            };
        }
    }

    /// The bound on our chunk size.
    pub fn send_buffer_size(&self) -> usize {
        self.send_buffer_size
    }

    /// The bound on total message size.
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Encode `message` into plaintext chunks and queue them.
    pub fn write(
        &mut self,
        request_id: u32,
        message: &RequestMessage,
        secure_channel: &SecureChannel,
    ) -> EncodingResult<()> {
        let chunks = Chunker::encode(
            self.sequence_number,
            request_id,
            self.max_message_size,
            self.send_buffer_size,
            secure_channel,
            message,
        )?;
        if self.max_chunk_count > 0 && chunks.len() > self.max_chunk_count {
            return Err(Error::new(
                StatusCode::BadRequestTooLarge,
                format!(
                    "Message needs {} chunks, the server accepts {}",
                    chunks.len(),
                    self.max_chunk_count
                ),
            )
            .with_context(Some(request_id), Some(message.request_handle())));
        }
        trace!(
            "Queueing request {} as {} chunks from sequence {}",
            request_id,
            chunks.len(),
            self.sequence_number
        );
        self.sequence_number = Self::advance_sequence(self.sequence_number, chunks.len() as u32);
        self.chunks.extend(chunks);
        Ok(())
    }

    // The outbound counter wraps to 1, skipping 0.
    fn advance_sequence(sequence_number: u32, by: u32) -> u32 {
        let (next, overflow) = sequence_number.overflowing_add(by);
        if overflow {
            next.wrapping_add(1)
        } else {
            next
        }
    }

    /// `true` when a chunk is queued and the write buffer is drained.
    pub fn should_encode_chunks(&self) -> bool {
        !self.chunks.is_empty() && !self.can_read()
    }

    /// Secure the next queued chunk into the write buffer.
    pub fn encode_next_chunk(&mut self, secure_channel: &SecureChannel) -> EncodingResult<()> {
        let Some(chunk) = self.chunks.pop_front() else {
            return Ok(());
        };
        self.out.clear();
        // Asymmetric chunks grow under RSA encryption, so allow headroom beyond
        // the nominal buffer size
        let capacity = self.send_buffer_size.max(chunk.data.len() * 2 + 1024);
        self.out.resize(capacity, 0);
        self.out_pos = 0;
        let size = secure_channel.apply_security(&chunk, &mut self.out)?;
        self.out.truncate(size);
        Ok(())
    }

    /// `true` when secured bytes are waiting for the socket.
    pub fn can_read(&self) -> bool {
        self.out_pos < self.out.len()
    }

    /// Write the remaining secured bytes to the stream. Cancel safe in the sense
    /// that a partial write is resumed on the next call.
    pub async fn read_into_async<W: AsyncWrite + Unpin>(
        &mut self,
        write: &mut W,
    ) -> std::io::Result<()> {
        while self.can_read() {
            let n = write.write(&self.out[self.out_pos..]).await?;
            self.out_pos += n;
        }
        self.out.clear();
        self.out_pos = 0;
        write.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ualite_types::{CloseSecureChannelRequest, RequestHeader};

    #[test]
    fn revise_only_shrinks() {
        let mut buffer = SendBuffer::new(65536, 0, 0);
        buffer.revise(32768, 1 << 23, 2048);
        assert_eq!(buffer.send_buffer_size(), 32768);
        assert_eq!(buffer.max_message_size(), 1 << 23);
        buffer.revise(65536, 1 << 24, 4096);
        assert_eq!(buffer.send_buffer_size(), 32768);
        assert_eq!(buffer.max_message_size(), 1 << 23);
    }

    #[test]
    fn sequence_wraps_past_zero() {
        assert_eq!(SendBuffer::advance_sequence(5, 2), 7);
        assert_eq!(SendBuffer::advance_sequence(u32::MAX, 1), 1);
        assert_eq!(SendBuffer::advance_sequence(u32::MAX - 1, 3), 2);
    }

    #[tokio::test]
    async fn queued_chunk_is_written() {
        let channel = SecureChannel::new_insecure_test();
        let mut buffer = SendBuffer::new(8192, 0, 0);
        let message = CloseSecureChannelRequest {
            request_header: RequestHeader::new(&ualite_types::NodeId::null(), 1, 0),
        }
        .into();
        buffer.write(1, &message, &channel).unwrap();
        assert!(buffer.should_encode_chunks());
        buffer.encode_next_chunk(&channel).unwrap();
        assert!(buffer.can_read());
        let mut sink = Vec::new();
        buffer.read_into_async(&mut sink).await.unwrap();
        assert!(!sink.is_empty());
        assert!(!buffer.can_read());
    }
}
