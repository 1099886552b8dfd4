// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Transport handshake behavior against a scripted peer on an in-memory stream.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

use ualite_client::transport::{TcpTransport, TransportConfiguration};
use ualite_core::comms::{
    secure_channel::SecureChannel,
    tcp_types::{AcknowledgeMessage, ErrorMessage},
};
use ualite_crypto::SecurityPolicy;
use ualite_types::{
    encoding::BinaryEncodable, DecodingOptions, MessageSecurityMode, StatusCode, UaString,
};

fn test_channel() -> Arc<RwLock<SecureChannel>> {
    Arc::new(RwLock::new(SecureChannel::new(
        SecurityPolicy::None,
        MessageSecurityMode::None,
        DecodingOptions::default(),
    )))
}

fn test_config() -> TransportConfiguration {
    TransportConfiguration {
        send_buffer_size: 65536,
        recv_buffer_size: 65536,
        max_message_size: 1 << 24,
        max_chunk_count: 4096,
    }
}

async fn read_hello(stream: &mut DuplexStream) -> Vec<u8> {
    let mut header = [0u8; 8];
    stream.read_exact(&mut header).await.unwrap();
    assert_eq!(&header[0..3], b"HEL");
    assert_eq!(header[3], b'F');
    let size = u32::from_le_bytes(header[4..8].try_into().unwrap()) as usize;
    let mut body = vec![0u8; size - 8];
    stream.read_exact(&mut body).await.unwrap();
    body
}

#[tokio::test]
async fn handshake_adopts_server_revised_limits() {
    let (client_stream, mut server_stream) = duplex(1 << 20);

    // The peer acknowledges with smaller buffers; the client must adopt them
    let server = tokio::spawn(async move {
        let _hello = read_hello(&mut server_stream).await;
        let ack = AcknowledgeMessage {
            protocol_version: 0,
            receive_buffer_size: 32768,
            send_buffer_size: 32768,
            max_message_size: 8 * 1024 * 1024,
            max_chunk_count: 2048,
        };
        server_stream
            .write_all(&ack.encode_to_vec())
            .await
            .unwrap();
        // Keep the connection open until the test is done
        server_stream
    });

    let (_send, recv) = tokio::sync::mpsc::channel(8);
    let transport = TcpTransport::connect(
        Box::new(client_stream),
        test_channel(),
        recv,
        test_config(),
        "opc.tcp://test:4840/",
    )
    .await
    .unwrap();

    assert_eq!(transport.send_buffer_size(), 32768);
    assert_eq!(transport.max_message_size(), 8 * 1024 * 1024);

    let _stream = server.await.unwrap();
}

#[tokio::test]
async fn handshake_rejects_buffers_below_the_floor() {
    let (client_stream, mut server_stream) = duplex(1 << 20);

    let server = tokio::spawn(async move {
        let _hello = read_hello(&mut server_stream).await;
        let ack = AcknowledgeMessage {
            protocol_version: 0,
            receive_buffer_size: 4096,
            send_buffer_size: 4096,
            max_message_size: 0,
            max_chunk_count: 0,
        };
        server_stream
            .write_all(&ack.encode_to_vec())
            .await
            .unwrap();
        server_stream
    });

    let (_send, recv) = tokio::sync::mpsc::channel(8);
    let result = TcpTransport::connect(
        Box::new(client_stream),
        test_channel(),
        recv,
        test_config(),
        "opc.tcp://test:4840/",
    )
    .await;

    assert_eq!(result.err().unwrap(), StatusCode::BadTcpNotEnoughResources);
    let _ = server.await.unwrap();
}

#[tokio::test]
async fn error_before_acknowledge_fails_with_server_status() {
    let (client_stream, mut server_stream) = duplex(1 << 20);

    let server = tokio::spawn(async move {
        let _hello = read_hello(&mut server_stream).await;
        let error = ErrorMessage {
            error: StatusCode::BadTcpServerTooBusy,
            reason: UaString::from("try later"),
        };
        server_stream
            .write_all(&error.encode_to_vec())
            .await
            .unwrap();
        server_stream
    });

    let (_send, recv) = tokio::sync::mpsc::channel(8);
    let result = TcpTransport::connect(
        Box::new(client_stream),
        test_channel(),
        recv,
        test_config(),
        "opc.tcp://test:4840/",
    )
    .await;

    assert_eq!(result.err().unwrap(), StatusCode::BadTcpServerTooBusy);
    let _ = server.await.unwrap();
}
