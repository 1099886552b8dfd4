// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The TCP transport: connect, Hello/Acknowledge negotiation, and the poll loop
//! moving bytes both ways. The transport itself works over any async byte stream;
//! only [`TcpConnector`] is TCP specific.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, error, trace, warn};
use parking_lot::RwLock;
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf},
    net::TcpStream,
    sync::mpsc::Receiver,
};
use tokio_util::codec::FramedRead;

use ualite_core::{
    comms::{
        buffer::SendBuffer,
        secure_channel::SecureChannel,
        tcp_codec::{Message, TcpCodec},
        tcp_types::{AcknowledgeMessage, HelloMessage},
        url::{hostname_port_from_url, DEFAULT_OPC_UA_SERVER_PORT},
    },
    RequestMessage,
};
use ualite_types::{encoding::BinaryEncodable, StatusCode};

use super::{
    connect::{Connector, TransportPollResult},
    state::{OutgoingMessage, TransportState},
};

/// Any reliable bidirectional byte stream the transport can run over: TCP, unix
/// sockets, or in-memory duplex pipes in tests.
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin> ByteStream for T {}

/// Buffer and limit proposals for the transport handshake.
#[derive(Debug, Clone)]
pub struct TransportConfiguration {
    /// Our proposed send buffer size.
    pub send_buffer_size: usize,
    /// Our proposed receive buffer size.
    pub recv_buffer_size: usize,
    /// Largest whole message we accept, 0 for no limit.
    pub max_message_size: usize,
    /// Largest chunk count per message we accept, 0 for no limit.
    pub max_chunk_count: usize,
}

#[derive(Debug, Clone, Copy)]
enum TransportCloseState {
    Open,
    Closing(StatusCode),
    Closed(StatusCode),
}

/// A connected, handshaken transport. Poll it to make progress in either
/// direction; nothing moves while it is not polled.
pub struct TcpTransport {
    state: TransportState,
    read: FramedRead<ReadHalf<Box<dyn ByteStream>>, TcpCodec>,
    write: WriteHalf<Box<dyn ByteStream>>,
    send_buffer: SendBuffer,
    should_close: bool,
    closed: TransportCloseState,
}

/// The stock connector for `opc.tcp` endpoints.
pub struct TcpConnector;

impl TcpConnector {
    async fn connect_socket(endpoint_url: &str) -> Result<TcpStream, StatusCode> {
        let (host, port) = hostname_port_from_url(endpoint_url, DEFAULT_OPC_UA_SERVER_PORT)
            .map_err(StatusCode::from)?;
        let addr = format!("{}:{}", host, port);
        let mut addrs = tokio::net::lookup_host(&addr).await.map_err(|e| {
            error!("Endpoint {} does not resolve: {}", addr, e);
            StatusCode::BadTcpEndpointUrlInvalid
        })?;
        let Some(addr) = addrs.next() else {
            error!("Endpoint {} resolves to no addresses", addr);
            return Err(StatusCode::BadTcpEndpointUrlInvalid);
        };
        debug!("Connecting to {} for {}", addr, endpoint_url);
        TcpStream::connect(&addr).await.map_err(|e| {
            error!("Could not connect to {}: {}", addr, e);
            StatusCode::BadCommunicationError
        })
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(
        &self,
        channel: Arc<RwLock<SecureChannel>>,
        outgoing_recv: Receiver<OutgoingMessage>,
        config: TransportConfiguration,
        endpoint_url: &str,
    ) -> Result<TcpTransport, StatusCode> {
        let socket = Self::connect_socket(endpoint_url).await?;
        let _ = socket.set_nodelay(true);
        TcpTransport::connect(
            Box::new(socket),
            channel,
            outgoing_recv,
            config,
            endpoint_url,
        )
        .await
    }
}

impl TcpTransport {
    /// Perform the Hello/Acknowledge handshake over `stream` and build the
    /// transport with the negotiated limits.
    pub async fn connect(
        stream: Box<dyn ByteStream>,
        channel: Arc<RwLock<SecureChannel>>,
        outgoing_recv: Receiver<OutgoingMessage>,
        config: TransportConfiguration,
        endpoint_url: &str,
    ) -> Result<TcpTransport, StatusCode> {
        let (reader, mut writer) = tokio::io::split(stream);

        let hello = HelloMessage::new(
            endpoint_url,
            config.send_buffer_size,
            config.recv_buffer_size,
            config.max_message_size,
            config.max_chunk_count,
        );
        trace!("Sending hello {:?}", hello);

        let mut framed_read = {
            let channel = channel.read();
            FramedRead::new(reader, TcpCodec::new(channel.decoding_options()))
        };

        writer
            .write_all(&hello.encode_to_vec())
            .await
            .map_err(|e| {
                error!("Could not send hello: {}", e);
                StatusCode::BadCommunicationError
            })?;

        let ack = match framed_read.next().await {
            Some(Ok(Message::Acknowledge(ack))) => {
                trace!("Received acknowledge {:?}", ack);
                ack.validate().map_err(StatusCode::from)?;
                if ack.send_buffer_size > hello.receive_buffer_size {
                    warn!("Server acknowledged a send buffer larger than our receive buffer");
                }
                ack
            }
            Some(Ok(Message::Error(error))) => {
                error!(
                    "Server rejected the handshake: {} ({})",
                    error.error, error.reason
                );
                return Err(error.error);
            }
            other => {
                error!("Expected an acknowledge, got {:?}", other);
                return Err(StatusCode::BadConnectionClosed);
            }
        };

        Ok(Self::from_handshake(
            framed_read,
            writer,
            channel,
            outgoing_recv,
            config,
            &ack,
        ))
    }

    fn from_handshake(
        read: FramedRead<ReadHalf<Box<dyn ByteStream>>, TcpCodec>,
        write: WriteHalf<Box<dyn ByteStream>>,
        channel: Arc<RwLock<SecureChannel>>,
        outgoing_recv: Receiver<OutgoingMessage>,
        config: TransportConfiguration,
        ack: &AcknowledgeMessage,
    ) -> TcpTransport {
        // Adopt the minima of what we offered and what the server revised
        let mut send_buffer = SendBuffer::new(
            config.send_buffer_size,
            config.max_message_size,
            config.max_chunk_count,
        );
        send_buffer.revise(
            ack.receive_buffer_size as usize,
            ack.max_message_size as usize,
            ack.max_chunk_count as usize,
        );
        let receive_buffer_size = (ack.send_buffer_size as usize).min(config.recv_buffer_size);

        TcpTransport {
            state: TransportState::new(
                channel,
                outgoing_recv,
                config.max_chunk_count,
                receive_buffer_size,
            ),
            read,
            write,
            send_buffer,
            should_close: false,
            closed: TransportCloseState::Open,
        }
    }

    /// The negotiated send buffer size, bounding outbound chunks.
    pub fn send_buffer_size(&self) -> usize {
        self.send_buffer.send_buffer_size()
    }

    /// The negotiated max message size.
    pub fn max_message_size(&self) -> usize {
        self.send_buffer.max_message_size()
    }

    fn handle_incoming_message(
        &mut self,
        incoming: Option<Result<Message, std::io::Error>>,
    ) -> TransportPollResult {
        let Some(incoming) = incoming else {
            return TransportPollResult::Closed(StatusCode::BadConnectionClosed);
        };
        match incoming {
            Ok(message) => match self.state.handle_incoming_message(message) {
                Ok(()) => TransportPollResult::IncomingMessage,
                Err(e) => TransportPollResult::Closed(e),
            },
            Err(err) => {
                error!("Error reading from the stream: {}", err);
                TransportPollResult::Closed(StatusCode::BadConnectionClosed)
            }
        }
    }

    async fn poll_inner(&mut self) -> TransportPollResult {
        // Queued chunks are secured into the send buffer before anything else
        if self.send_buffer.should_encode_chunks() {
            let channel = self.state.secure_channel.read();
            if let Err(e) = self.send_buffer.encode_next_chunk(&channel) {
                return TransportPollResult::Closed(e.status());
            }
        }

        // Write pending bytes or wait for work, always listening for input
        if self.send_buffer.can_read() {
            tokio::select! {
                r = self.send_buffer.read_into_async(&mut self.write) => {
                    if let Err(e) = r {
                        error!("Failed to write to the stream: {}", e);
                        return TransportPollResult::Closed(StatusCode::BadCommunicationError);
                    }
                    TransportPollResult::OutgoingMessageSent
                }
                incoming = self.read.next() => {
                    self.handle_incoming_message(incoming)
                }
            }
        } else {
            if self.should_close {
                debug!("Closing the connection after CloseSecureChannel");
                return TransportPollResult::Closed(StatusCode::Good);
            }
            tokio::select! {
                outgoing = self.state.wait_for_outgoing_message() => {
                    let Some((request, request_id)) = outgoing else {
                        return TransportPollResult::Closed(StatusCode::Good);
                    };
                    if matches!(request, RequestMessage::CloseSecureChannel(_)) {
                        self.should_close = true;
                    }
                    let channel = self.state.secure_channel.read();
                    match self.send_buffer.write(request_id, &request, &channel) {
                        Ok(()) => TransportPollResult::OutgoingMessage,
                        Err(e) => {
                            drop(channel);
                            if e.full_context().is_some() {
                                error!("Failed to encode request {}: {}", request_id, e);
                                let status = e.status();
                                self.state.message_send_failed(request_id, status);
                                TransportPollResult::RecoverableError(status)
                            } else {
                                TransportPollResult::Closed(e.status())
                            }
                        }
                    }
                }
                incoming = self.read.next() => {
                    self.handle_incoming_message(incoming)
                }
            }
        }
    }

    /// Drive the transport one step. Cancel safe: dropping the returned future
    /// loses no data.
    pub async fn poll(&mut self) -> TransportPollResult {
        // Closing is resumable, so a cancelled close picks up where it left off
        match self.closed {
            TransportCloseState::Open => {}
            TransportCloseState::Closing(status) => {
                let r = self.state.close(status).await;
                self.closed = TransportCloseState::Closed(r);
                return TransportPollResult::Closed(r);
            }
            TransportCloseState::Closed(status) => {
                return TransportPollResult::Closed(status);
            }
        }

        let r = self.poll_inner().await;
        if let TransportPollResult::Closed(status) = &r {
            self.closed = TransportCloseState::Closing(*status);
            let r = self.state.close(*status).await;
            self.closed = TransportCloseState::Closed(r);
        }
        r
    }
}
