// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Shared transport state: the pending-request map keyed by request id, inbound
//! chunk reassembly and sequence number enforcement.

use std::{
    collections::HashMap,
    sync::Arc,
    time::Instant,
};

use log::{debug, error, trace, warn};
use parking_lot::RwLock;
use tokio::sync::{mpsc::Receiver, oneshot};

use ualite_core::{
    comms::{
        chunker::Chunker,
        message_chunk::MessageChunk,
        secure_channel::SecureChannel,
        tcp_codec::Message,
        tcp_types::ChunkKind,
    },
    RequestMessage, ResponseMessage,
};
use ualite_types::StatusCode;

/// A request on its way out, with the waiter to wake when the response arrives.
/// Requests that expect no response (CloseSecureChannel) carry no sender.
pub struct OutgoingMessage {
    /// The request id assigned by the channel.
    pub request_id: u32,
    /// The request itself.
    pub request: RequestMessage,
    /// Waker for the response, or `None` for fire-and-forget messages.
    pub response: Option<oneshot::Sender<Result<ResponseMessage, StatusCode>>>,
    /// When the caller stops waiting. Expired waiters are pruned.
    pub deadline: Instant,
}

struct PendingRequest {
    response: oneshot::Sender<Result<ResponseMessage, StatusCode>>,
    deadline: Instant,
}

/// State driven by the transport poll loop.
pub(crate) struct TransportState {
    /// The secure channel securing this connection.
    pub(crate) secure_channel: Arc<RwLock<SecureChannel>>,
    /// Requests flowing in from callers.
    outgoing_recv: Receiver<OutgoingMessage>,
    /// Waiting callers by request id.
    pending: HashMap<u32, PendingRequest>,
    /// Partially assembled inbound messages by request id.
    partial: HashMap<u32, Vec<MessageChunk>>,
    /// The next inbound sequence number we expect.
    expected_sequence_number: u32,
    /// Bound on chunks per inbound message, 0 for none.
    max_chunk_count: usize,
    /// Bound on a single inbound chunk, from the handshake.
    receive_buffer_size: usize,
}

impl TransportState {
    pub(crate) fn new(
        secure_channel: Arc<RwLock<SecureChannel>>,
        outgoing_recv: Receiver<OutgoingMessage>,
        max_chunk_count: usize,
        receive_buffer_size: usize,
    ) -> Self {
        TransportState {
            secure_channel,
            outgoing_recv,
            pending: HashMap::new(),
            partial: HashMap::new(),
            expected_sequence_number: 1,
            max_chunk_count,
            receive_buffer_size,
        }
    }

    /// Wait for the next outgoing message, registering its waiter. Returns `None`
    /// when all senders are gone and the transport should shut down.
    pub(crate) async fn wait_for_outgoing_message(
        &mut self,
    ) -> Option<(RequestMessage, u32)> {
        self.prune_expired();
        let message = self.outgoing_recv.recv().await?;
        if let Some(response) = message.response {
            self.pending.insert(
                message.request_id,
                PendingRequest {
                    response,
                    deadline: message.deadline,
                },
            );
        }
        Some((message.request, message.request_id))
    }

    /// Fail a request that could not be sent, without closing the transport.
    pub(crate) fn message_send_failed(&mut self, request_id: u32, status: StatusCode) {
        if let Some(pending) = self.pending.remove(&request_id) {
            let _ = pending.response.send(Err(status));
        }
    }

    /// Process one framed inbound message. An error return is fatal to the
    /// connection.
    pub(crate) fn handle_incoming_message(&mut self, message: Message) -> Result<(), StatusCode> {
        match message {
            Message::Chunk(chunk) => self.process_chunk(chunk),
            Message::Error(error) => {
                error!(
                    "Transport error from server: {} ({})",
                    error.error, error.reason
                );
                Err(error.error)
            }
            unexpected => {
                error!("Unexpected message on open connection: {:?}", unexpected);
                Err(StatusCode::BadUnexpectedError)
            }
        }
    }

    fn process_chunk(&mut self, chunk: MessageChunk) -> Result<(), StatusCode> {
        if chunk.data.len() > self.receive_buffer_size {
            error!(
                "Inbound chunk of {} bytes exceeds the negotiated receive buffer {}",
                chunk.data.len(),
                self.receive_buffer_size
            );
            return Err(StatusCode::BadTcpMessageTooLarge);
        }

        let secure_channel = self.secure_channel.read();
        let chunk = secure_channel
            .verify_and_remove_security(&chunk.data)
            .map_err(|e| {
                error!("Inbound chunk failed security checks: {}", e);
                e.status()
            })?;
        let chunk_info = chunk.chunk_info(&secure_channel).map_err(StatusCode::from)?;
        drop(secure_channel);

        let sequence_number = chunk_info.sequence_header.sequence_number;
        if !Chunker::is_valid_sequence_number(self.expected_sequence_number, sequence_number) {
            error!(
                "Inbound chunk has sequence number {}, expected {}",
                sequence_number, self.expected_sequence_number
            );
            return Err(StatusCode::BadSequenceNumberInvalid);
        }
        self.expected_sequence_number = sequence_number.wrapping_add(1);

        let request_id = chunk_info.sequence_header.request_id;
        match chunk_info.message_header.chunk_kind {
            ChunkKind::Abort => {
                // The server abandoned the message; drop whatever accumulated
                warn!("Server aborted message for request {}", request_id);
                self.partial.remove(&request_id);
                self.message_send_failed(request_id, StatusCode::BadCommunicationError);
                Ok(())
            }
            ChunkKind::Intermediate => {
                let chunks = self.partial.entry(request_id).or_default();
                chunks.push(chunk);
                if self.max_chunk_count > 0 && chunks.len() > self.max_chunk_count {
                    error!(
                        "Inbound message for request {} exceeds {} chunks",
                        request_id, self.max_chunk_count
                    );
                    return Err(StatusCode::BadEncodingLimitsExceeded);
                }
                Ok(())
            }
            ChunkKind::Final => {
                let mut chunks = self.partial.remove(&request_id).unwrap_or_default();
                chunks.push(chunk);
                self.dispatch_message(request_id, chunks)
            }
        }
    }

    fn dispatch_message(
        &mut self,
        request_id: u32,
        chunks: Vec<MessageChunk>,
    ) -> Result<(), StatusCode> {
        let secure_channel = self.secure_channel.read();
        let response: ResponseMessage = Chunker::decode(&chunks, &secure_channel, None)
            .map_err(|e| {
                error!("Failed to decode response for request {}: {}", request_id, e);
                e.status()
            })?;
        drop(secure_channel);

        trace!("Response for request {} arrived", request_id);
        match self.pending.remove(&request_id) {
            Some(pending) => {
                // A dead receiver means the caller timed out; drop the response
                let _ = pending.response.send(Ok(response));
            }
            None => {
                debug!("Discarding late response for request {}", request_id);
            }
        }
        Ok(())
    }

    // Remove waiters whose deadline passed; their receivers resolve the timeout
    // on the caller side.
    fn prune_expired(&mut self) {
        let now = Instant::now();
        self.pending.retain(|id, pending| {
            if pending.deadline <= now {
                debug!("Pruning expired request {}", id);
                false
            } else {
                true
            }
        });
    }

    /// Fail every waiter and shut the state down. Called when the transport
    /// closes for any reason.
    pub(crate) async fn close(&mut self, status: StatusCode) -> StatusCode {
        self.outgoing_recv.close();
        // Drain anything that raced with the close
        while let Ok(message) = self.outgoing_recv.try_recv() {
            if let Some(response) = message.response {
                let _ = response.send(Err(StatusCode::BadConnectionClosed));
            }
        }
        for (_, pending) in self.pending.drain() {
            let _ = pending.response.send(Err(if status.is_good() {
                StatusCode::BadConnectionClosed
            } else {
                status
            }));
        }
        self.partial.clear();
        status
    }
}
