// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Chunk security headers. OpenSecureChannel chunks carry the asymmetric header
//! naming the policy and certificates; everything else carries the symmetric
//! header naming the token. Both start with the secure channel id the server
//! assigned, 0 before the first open completes.

use std::io::{Read, Write};

use ualite_crypto::{SecurityPolicy, Thumbprint, X509};
use ualite_types::{
    constants, ByteString, DecodingOptions, EncodingResult, Error, StatusCode, UaString,
};
use ualite_types::encoding::{BinaryDecodable, BinaryEncodable};

/// Security header of an OpenSecureChannel chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct AsymmetricSecurityHeader {
    /// Secure channel id, 0 on the initial Issue.
    pub secure_channel_id: u32,
    /// URI of the security policy in force.
    pub security_policy_uri: UaString,
    /// DER certificate of the sender, null for SecurityPolicy::None.
    pub sender_certificate: ByteString,
    /// SHA-1 thumbprint of the receiver certificate the message is encrypted for.
    pub receiver_certificate_thumbprint: ByteString,
}

impl BinaryEncodable for AsymmetricSecurityHeader {
    fn byte_len(&self) -> usize {
        4 + self.security_policy_uri.byte_len()
            + self.sender_certificate.byte_len()
            + self.receiver_certificate_thumbprint.byte_len()
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        self.secure_channel_id.encode(stream)?;
        self.security_policy_uri.encode(stream)?;
        self.sender_certificate.encode(stream)?;
        self.receiver_certificate_thumbprint.encode(stream)
    }
}

impl BinaryDecodable for AsymmetricSecurityHeader {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let secure_channel_id = u32::decode(stream, options)?;
        let security_policy_uri = UaString::decode(stream, options)?;
        let sender_certificate = ByteString::decode(stream, options)?;
        let receiver_certificate_thumbprint = ByteString::decode(stream, options)?;

        if sender_certificate.len() >= constants::MAX_CERTIFICATE_LENGTH {
            return Err(Error::new(
                StatusCode::BadEncodingLimitsExceeded,
                format!(
                    "Sender certificate length {} exceeds the maximum {}",
                    sender_certificate.len(),
                    constants::MAX_CERTIFICATE_LENGTH
                ),
            ));
        }
        let thumbprint_len = receiver_certificate_thumbprint.len();
        if thumbprint_len > 0 && thumbprint_len != Thumbprint::THUMBPRINT_SIZE {
            return Err(Error::decoding(format!(
                "Receiver certificate thumbprint is {} bytes, not {}",
                thumbprint_len,
                Thumbprint::THUMBPRINT_SIZE
            )));
        }
        Ok(AsymmetricSecurityHeader {
            secure_channel_id,
            security_policy_uri,
            sender_certificate,
            receiver_certificate_thumbprint,
        })
    }
}

impl AsymmetricSecurityHeader {
    /// Header for a SecurityPolicy::None open.
    pub fn none(secure_channel_id: u32) -> AsymmetricSecurityHeader {
        AsymmetricSecurityHeader {
            secure_channel_id,
            security_policy_uri: UaString::from(SecurityPolicy::None.to_uri()),
            sender_certificate: ByteString::null(),
            receiver_certificate_thumbprint: ByteString::null(),
        }
    }

    /// Header for a secured open with our certificate and the receiver's thumbprint.
    pub fn new(
        secure_channel_id: u32,
        security_policy: SecurityPolicy,
        sender_certificate: &X509,
        receiver_certificate_thumbprint: ByteString,
    ) -> AsymmetricSecurityHeader {
        AsymmetricSecurityHeader {
            secure_channel_id,
            security_policy_uri: UaString::from(security_policy.to_uri()),
            sender_certificate: sender_certificate.as_byte_string(),
            receiver_certificate_thumbprint,
        }
    }
}

/// Security header of MSG and CLO chunks: the channel and the token whose keys
/// secure this chunk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymmetricSecurityHeader {
    /// Secure channel id assigned by the server.
    pub secure_channel_id: u32,
    /// Token id selecting the key set, changing on renewal.
    pub token_id: u32,
}

impl BinaryEncodable for SymmetricSecurityHeader {
    fn byte_len(&self) -> usize {
        8
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        self.secure_channel_id.encode(stream)?;
        self.token_id.encode(stream)
    }
}

impl BinaryDecodable for SymmetricSecurityHeader {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        Ok(SymmetricSecurityHeader {
            secure_channel_id: u32::decode(stream, options)?,
            token_id: u32::decode(stream, options)?,
        })
    }
}

/// Either security header, selected by the chunk's message type.
#[derive(Debug, Clone, PartialEq)]
pub enum SecurityHeader {
    /// Asymmetric header on OPN chunks.
    Asymmetric(AsymmetricSecurityHeader),
    /// Symmetric header on MSG and CLO chunks.
    Symmetric(SymmetricSecurityHeader),
}

impl BinaryEncodable for SecurityHeader {
    fn byte_len(&self) -> usize {
        match self {
            SecurityHeader::Asymmetric(v) => v.byte_len(),
            SecurityHeader::Symmetric(v) => v.byte_len(),
        }
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        match self {
            SecurityHeader::Asymmetric(v) => v.encode(stream),
            SecurityHeader::Symmetric(v) => v.encode(stream),
        }
    }
}

impl SecurityHeader {
    /// Decode the header variant implied by `is_open_secure_channel`.
    pub fn decode_from_stream<S: Read + ?Sized>(
        stream: &mut S,
        is_open_secure_channel: bool,
        options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        if is_open_secure_channel {
            let header = AsymmetricSecurityHeader::decode(stream, options)?;
            if !header.security_policy_uri.is_null()
                && SecurityPolicy::from_uri(header.security_policy_uri.as_ref())
                    == SecurityPolicy::Unknown
            {
                return Err(Error::new(
                    StatusCode::BadSecurityPolicyRejected,
                    format!(
                        "Policy {} of inbound chunk is unknown",
                        header.security_policy_uri
                    ),
                ));
            }
            Ok(SecurityHeader::Asymmetric(header))
        } else {
            Ok(SecurityHeader::Symmetric(SymmetricSecurityHeader::decode(
                stream, options,
            )?))
        }
    }

    /// The secure channel id carried by either variant.
    pub fn secure_channel_id(&self) -> u32 {
        match self {
            SecurityHeader::Asymmetric(v) => v.secure_channel_id,
            SecurityHeader::Symmetric(v) => v.secure_channel_id,
        }
    }
}

/// The sequence header following the security header in every chunk: the running
/// chunk sequence number and the request the chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceHeader {
    /// Sequence number, incremented per chunk, never per message.
    pub sequence_number: u32,
    /// Id of the request/response pair, identical in every chunk of a message.
    pub request_id: u32,
}

impl BinaryEncodable for SequenceHeader {
    fn byte_len(&self) -> usize {
        8
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        self.sequence_number.encode(stream)?;
        self.request_id.encode(stream)
    }
}

impl BinaryDecodable for SequenceHeader {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        Ok(SequenceHeader {
            sequence_number: u32::decode(stream, options)?,
            request_id: u32::decode(stream, options)?,
        })
    }
}
