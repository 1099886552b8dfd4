// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The secure channel: token and key state plus the per-chunk security pipeline.
//!
//! Outbound chunks are padded, signed and encrypted in that order; inbound chunks
//! are decrypted, signature verified, padding verified and stripped. Key sets are
//! kept per token id so chunks secured with the previous token keep verifying
//! during renewal overlap.

use std::{
    collections::HashMap,
    io::{Cursor, Write},
    ops::Range,
};

use chrono::Duration;
use log::{debug, error, trace};

use ualite_crypto::{
    KeySize, PrivateKey, SecureChannelKeys, SecurityPolicy, X509,
};
use ualite_types::{
    encoding::{write_bytes, write_u32, write_u8, BinaryDecodable},
    ByteString, ChannelSecurityToken, DateTime, DecodingOptions, EncodingResult, Error,
    MessageSecurityMode, StatusCode,
};

use super::{
    message_chunk::MessageChunk,
    security_header::{AsymmetricSecurityHeader, SecurityHeader, SymmetricSecurityHeader},
    tcp_types::{MessageType, MESSAGE_SIZE_OFFSET},
};

#[derive(Debug)]
struct RemoteKeys {
    keys: SecureChannelKeys,
    expires_at: DateTime,
}

/// Client-side secure channel state and the chunk security pipeline.
pub struct SecureChannel {
    security_policy: SecurityPolicy,
    security_mode: MessageSecurityMode,
    secure_channel_id: u32,
    token_id: u32,
    token_created_at: DateTime,
    /// Token lifetime in milliseconds.
    token_lifetime: u32,
    /// Our application certificate.
    cert: Option<X509>,
    /// Our private key.
    private_key: Option<PrivateKey>,
    /// The server certificate.
    remote_cert: Option<X509>,
    /// Our nonce from the current open/renew exchange.
    local_nonce: Vec<u8>,
    /// The server nonce from the current open/renew exchange.
    remote_nonce: Vec<u8>,
    /// Keys securing what we send: signing key, encryption key, IV.
    local_keys: Option<SecureChannelKeys>,
    /// Keys verifying what we receive, per token id. Old tokens stay usable for
    /// 25% of their lifetime past expiry, per Part 4 5.5.2.
    remote_keys: HashMap<u32, RemoteKeys>,
    decoding_options: DecodingOptions,
}

impl SecureChannel {
    /// Create a channel in the given policy and mode. Certificates and keys are
    /// set separately, before connecting.
    pub fn new(
        security_policy: SecurityPolicy,
        security_mode: MessageSecurityMode,
        decoding_options: DecodingOptions,
    ) -> SecureChannel {
        SecureChannel {
            security_policy,
            security_mode,
            secure_channel_id: 0,
            token_id: 0,
            token_created_at: DateTime::now(),
            token_lifetime: 0,
            cert: None,
            private_key: None,
            remote_cert: None,
            local_nonce: Vec::new(),
            remote_nonce: Vec::new(),
            local_keys: None,
            remote_keys: HashMap::new(),
            decoding_options,
        }
    }

    #[cfg(test)]
    pub(crate) fn new_insecure_test() -> SecureChannel {
        SecureChannel::new(
            SecurityPolicy::None,
            MessageSecurityMode::None,
            DecodingOptions::default(),
        )
    }

    /// The channel's security policy.
    pub fn security_policy(&self) -> SecurityPolicy {
        self.security_policy
    }

    /// The channel's security mode.
    pub fn security_mode(&self) -> MessageSecurityMode {
        self.security_mode
    }

    /// Set our certificate and private key.
    pub fn set_own_certificate(&mut self, cert: Option<X509>, key: Option<PrivateKey>) {
        self.cert = cert;
        self.private_key = key;
    }

    /// Our certificate.
    pub fn cert(&self) -> Option<&X509> {
        self.cert.as_ref()
    }

    /// Our private key, for session signatures.
    pub fn private_key(&self) -> Option<&PrivateKey> {
        self.private_key.as_ref()
    }

    /// Set the server certificate.
    pub fn set_remote_cert(&mut self, remote_cert: Option<X509>) {
        self.remote_cert = remote_cert;
    }

    /// Set the server certificate from the DER byte string in a message.
    pub fn set_remote_cert_from_byte_string(
        &mut self,
        remote_cert: &ByteString,
    ) -> EncodingResult<()> {
        self.remote_cert = if remote_cert.is_null() {
            None
        } else {
            Some(X509::from_byte_string(remote_cert)?)
        };
        Ok(())
    }

    /// The server certificate.
    pub fn remote_cert(&self) -> Option<&X509> {
        self.remote_cert.as_ref()
    }

    /// The id the server assigned this channel, 0 before the first open.
    pub fn secure_channel_id(&self) -> u32 {
        self.secure_channel_id
    }

    /// The id of the current token.
    pub fn token_id(&self) -> u32 {
        self.token_id
    }

    /// Reset the token before a reconnect.
    pub fn clear_security_token(&mut self) {
        self.secure_channel_id = 0;
        self.token_id = 0;
        self.token_created_at = DateTime::now();
        self.token_lifetime = 0;
    }

    /// Install the token issued or renewed by the server.
    pub fn set_security_token(&mut self, token: ChannelSecurityToken) {
        self.secure_channel_id = token.channel_id;
        self.token_id = token.token_id;
        self.token_created_at = token.created_at;
        self.token_lifetime = token.revised_lifetime;
    }

    /// `true` once 75% of the token lifetime has elapsed and a renew should go out.
    pub fn should_renew_security_token(&self) -> bool {
        if self.token_id == 0 {
            false
        } else {
            let renew_after = Duration::milliseconds((self.token_lifetime as i64) * 3 / 4);
            DateTime::now() - self.token_created_at > renew_after
        }
    }

    /// `true` once the full token lifetime has elapsed.
    pub fn token_has_expired(&self) -> bool {
        if self.token_id == 0 {
            false
        } else {
            let lifetime = Duration::milliseconds(self.token_lifetime as i64);
            DateTime::now() - self.token_created_at > lifetime
        }
    }

    /// The decoding options in force on this channel.
    pub fn decoding_options(&self) -> DecodingOptions {
        self.decoding_options.clone()
    }

    /// Replace the decoding options, e.g. after the transport handshake revises
    /// message limits.
    pub fn set_decoding_options(&mut self, options: DecodingOptions) {
        self.decoding_options = options;
    }

    /// Create a fresh local nonce of the policy's nonce length.
    pub fn create_random_nonce(&mut self) {
        self.local_nonce
            .resize(self.security_policy.secure_channel_nonce_length(), 0);
        ualite_crypto::random::bytes(&mut self.local_nonce);
    }

    /// Our current nonce as a byte string for OpenSecureChannel.
    pub fn local_nonce_as_byte_string(&self) -> ByteString {
        if self.local_nonce.is_empty() {
            ByteString::null()
        } else {
            ByteString::from(&self.local_nonce)
        }
    }

    /// Our current nonce.
    pub fn local_nonce(&self) -> &[u8] {
        &self.local_nonce
    }

    /// The server nonce.
    pub fn remote_nonce(&self) -> &[u8] {
        &self.remote_nonce
    }

    /// Install the server nonce, validating its length against the policy.
    pub fn set_remote_nonce_from_byte_string(
        &mut self,
        remote_nonce: &ByteString,
    ) -> EncodingResult<()> {
        match &remote_nonce.value {
            Some(nonce) => {
                if self.security_policy != SecurityPolicy::None
                    && nonce.len() != self.security_policy.secure_channel_nonce_length()
                {
                    return Err(Error::new(
                        StatusCode::BadNonceInvalid,
                        format!(
                            "Server nonce is {} bytes, policy requires {}",
                            nonce.len(),
                            self.security_policy.secure_channel_nonce_length()
                        ),
                    ));
                }
                self.remote_nonce = nonce.clone();
                Ok(())
            }
            None if self.security_policy != SecurityPolicy::None => Err(Error::new(
                StatusCode::BadNonceInvalid,
                "Server nonce is null",
            )),
            None => Ok(()),
        }
    }

    /// Derive both directions' symmetric keys from the current nonces and install
    /// the inbound set under the current token id. Keys for expired old tokens are
    /// purged here.
    pub fn derive_keys(&mut self) {
        if !self.security_policy.is_encryption_enabled() {
            return;
        }
        self.local_keys = Some(
            self.security_policy
                .make_secure_channel_keys(&self.remote_nonce, &self.local_nonce),
        );
        let remote = self
            .security_policy
            .make_secure_channel_keys(&self.local_nonce, &self.remote_nonce);

        let now = DateTime::now();
        self.remote_keys.retain(|_, v| now < v.expires_at);
        // 25% overlap allowance on top of the lifetime
        let expires_at = self.token_created_at
            + Duration::milliseconds((self.token_lifetime as i64) * 5 / 4);
        self.remote_keys.insert(
            self.token_id,
            RemoteKeys {
                keys: remote,
                expires_at,
            },
        );
        debug!(
            "Derived keys for channel {} token {}",
            self.secure_channel_id, self.token_id
        );
    }

    fn local_keys(&self) -> EncodingResult<&SecureChannelKeys> {
        self.local_keys.as_ref().ok_or_else(|| {
            Error::new(
                StatusCode::BadSecureChannelClosed,
                "No keys have been derived for this channel",
            )
        })
    }

    fn remote_keys(&self, token_id: u32) -> EncodingResult<&SecureChannelKeys> {
        self.remote_keys
            .get(&token_id)
            .map(|k| &k.keys)
            .ok_or_else(|| {
                Error::new(
                    StatusCode::BadSecureChannelTokenUnknown,
                    format!("No keys for token {}", token_id),
                )
            })
    }

    /// Build the security header a chunk of `message_type` must carry.
    pub fn make_security_header(&self, message_type: MessageType) -> SecurityHeader {
        match message_type {
            MessageType::OpenSecureChannel => {
                let header = if self.security_policy == SecurityPolicy::None {
                    AsymmetricSecurityHeader::none(self.secure_channel_id)
                } else {
                    let receiver_certificate_thumbprint = self
                        .remote_cert
                        .as_ref()
                        .map(|c| c.thumbprint().as_byte_string())
                        .unwrap_or_else(ByteString::null);
                    AsymmetricSecurityHeader::new(
                        self.secure_channel_id,
                        self.security_policy,
                        self.cert.as_ref().expect("open requires own certificate"),
                        receiver_certificate_thumbprint,
                    )
                };
                SecurityHeader::Asymmetric(header)
            }
            _ => SecurityHeader::Symmetric(SymmetricSecurityHeader {
                secure_channel_id: self.secure_channel_id,
                token_id: self.token_id,
            }),
        }
    }

    /// Signature length for a chunk carrying `security_header`. For asymmetric
    /// headers this is the signer's key size, for symmetric ones the policy's
    /// HMAC length.
    pub fn signature_size(&self, security_header: &SecurityHeader) -> EncodingResult<usize> {
        match security_header {
            SecurityHeader::Asymmetric(header) => {
                if header.sender_certificate.is_null() {
                    Ok(0)
                } else {
                    let x509 = X509::from_byte_string(&header.sender_certificate)?;
                    Ok(x509.public_key()?.size())
                }
            }
            SecurityHeader::Symmetric(_) => Ok(self.security_policy.symmetric_signature_size()),
        }
    }

    // Extra padding byte required for key sizes over 2048 bits.
    fn minimum_padding(key_or_signature_size: usize) -> usize {
        if key_or_signature_size <= 256 {
            1
        } else {
            2
        }
    }

    /// Plaintext block size and minimum padding for chunks of `message_type`, or
    /// (0, 0) when no padding applies.
    pub fn padding_block_sizes(
        &self,
        security_header: &SecurityHeader,
        signature_size: usize,
        message_type: MessageType,
    ) -> EncodingResult<(usize, usize)> {
        let is_open = message_type == MessageType::OpenSecureChannel;
        if self.security_policy == SecurityPolicy::None
            || (self.security_mode != MessageSecurityMode::SignAndEncrypt && !is_open)
        {
            return Ok((0, 0));
        }
        match security_header {
            SecurityHeader::Asymmetric(_) => {
                let remote_cert = self.remote_cert.as_ref().ok_or_else(|| {
                    Error::new(
                        StatusCode::BadNoValidCertificates,
                        "Cannot compute padding without the server certificate",
                    )
                })?;
                let key = remote_cert.public_key()?;
                let padding = self.security_policy.asymmetric_encryption_padding();
                Ok((
                    key.plain_text_block_size(padding),
                    Self::minimum_padding(key.size()),
                ))
            }
            SecurityHeader::Symmetric(_) => Ok((
                self.security_policy.plain_block_size(),
                Self::minimum_padding(signature_size),
            )),
        }
    }

    /// Total padding (including the size byte or bytes) for a body of `body_size`.
    ///
    /// PaddingSize = PlainTextBlockSize - ((BytesToWrite + SignatureSize + 1) % PlainTextBlockSize)
    pub fn padding_size(
        &self,
        security_header: &SecurityHeader,
        body_size: usize,
        signature_size: usize,
        message_type: MessageType,
    ) -> EncodingResult<(usize, usize)> {
        let (plain_block_size, minimum_padding) =
            self.padding_block_sizes(security_header, signature_size, message_type)?;
        if plain_block_size == 0 {
            return Ok((0, 0));
        }
        // 8 bytes of sequence header are encrypted along with the body
        let encrypt_size = 8 + body_size + signature_size + minimum_padding;
        let padding_size = if encrypt_size % plain_block_size != 0 {
            plain_block_size - (encrypt_size % plain_block_size)
        } else {
            0
        };
        Ok((minimum_padding + padding_size, minimum_padding))
    }

    fn update_message_size(data: &mut [u8], message_size: usize) -> EncodingResult<()> {
        let mut stream = Cursor::new(&mut data[MESSAGE_SIZE_OFFSET..]);
        write_u32(&mut stream, message_size as u32)
    }

    fn update_message_size_and_truncate(
        mut data: Vec<u8>,
        message_size: usize,
    ) -> EncodingResult<Vec<u8>> {
        Self::update_message_size(&mut data, message_size)?;
        data.truncate(message_size);
        Ok(data)
    }

    // Append padding bytes and reserve zeroed space for the signature, updating the
    // message size header to the final on-wire size.
    fn add_space_for_padding_and_signature(
        &self,
        message_chunk: &MessageChunk,
    ) -> EncodingResult<Vec<u8>> {
        let chunk_info = message_chunk.chunk_info(self)?;
        let security_header = chunk_info.security_header;
        let signature_size = self.signature_size(&security_header)?;
        let (padding_size, minimum_padding) = self.padding_size(
            &security_header,
            chunk_info.body_length,
            signature_size,
            chunk_info.message_header.message_type,
        )?;

        let mut stream = Cursor::new(Vec::with_capacity(
            message_chunk.data.len() + padding_size + signature_size,
        ));
        stream
            .write_all(&message_chunk.data)
            .map_err(Error::encoding)?;

        if padding_size > 0 {
            // Each padding byte holds the padding size; with the two byte form the
            // final byte holds the high bits
            if minimum_padding == 1 {
                let padding_byte = ((padding_size - 1) & 0xFF) as u8;
                write_bytes(&mut stream, padding_byte, padding_size)?;
            } else {
                let padding_byte = ((padding_size - 2) & 0xFF) as u8;
                let extra_padding_byte = ((padding_size - 2) >> 8) as u8;
                write_bytes(&mut stream, padding_byte, padding_size - 1)?;
                write_u8(&mut stream, extra_padding_byte)?;
            }
        }
        write_bytes(&mut stream, 0u8, signature_size)?;

        let message_size = message_chunk.data.len() + padding_size + signature_size;
        Self::update_message_size_and_truncate(stream.into_inner(), message_size)
    }

    /// Secure an outbound chunk into `dst`, returning the number of bytes written.
    /// With policy None or plain-Message modes this is a copy.
    pub fn apply_security(
        &self,
        message_chunk: &MessageChunk,
        dst: &mut [u8],
    ) -> EncodingResult<usize> {
        let is_signed = self.security_policy != SecurityPolicy::None
            && (self.security_mode == MessageSecurityMode::Sign
                || self.security_mode == MessageSecurityMode::SignAndEncrypt);
        if !is_signed {
            let size = message_chunk.data.len();
            if size > dst.len() {
                return Err(Error::new(
                    StatusCode::BadEncodingLimitsExceeded,
                    format!("Chunk of {} bytes exceeds the send buffer", size),
                ));
            }
            dst[..size].copy_from_slice(&message_chunk.data);
            return Ok(size);
        }

        let encrypted_data_offset =
            message_chunk.encrypted_data_offset(&self.decoding_options)?;
        let mut data = self.add_space_for_padding_and_signature(message_chunk)?;
        let encrypted_range = encrypted_data_offset..data.len();

        if message_chunk.is_open_secure_channel(&self.decoding_options) {
            self.asymmetric_sign_and_encrypt(&mut data, encrypted_range, dst)
        } else {
            let signed_range =
                0..(data.len() - self.security_policy.symmetric_signature_size());
            self.symmetric_sign_and_encrypt(&mut data, signed_range, encrypted_range, dst)
        }
    }

    // Sign with our private key, encrypt with the server public key. Both apply to
    // OPN chunks whenever the policy is not None, regardless of security mode.
    fn asymmetric_sign_and_encrypt(
        &self,
        src: &mut [u8],
        encrypted_range: Range<usize>,
        dst: &mut [u8],
    ) -> EncodingResult<usize> {
        let header_size = encrypted_range.start;
        let signing_key = self.private_key.as_ref().ok_or_else(|| {
            Error::new(
                StatusCode::BadNoValidCertificates,
                "Cannot sign the open message without a private key",
            )
        })?;
        let signing_key_size = signing_key.size();
        let signed_range = 0..(encrypted_range.end - signing_key_size);

        let encryption_key = self
            .remote_cert
            .as_ref()
            .ok_or_else(|| {
                Error::new(
                    StatusCode::BadNoValidCertificates,
                    "Cannot encrypt the open message without the server certificate",
                )
            })?
            .public_key()?;

        // Encryption changes the size; since the header is signed, rewrite it first
        let padding = self.security_policy.asymmetric_encryption_padding();
        let plain_text_size = encrypted_range.end - encrypted_range.start;
        let cipher_text_size = encryption_key.cipher_text_size(plain_text_size, padding);
        Self::update_message_size(src, header_size + cipher_text_size)?;

        let (l, r) = src.split_at_mut(signed_range.end);
        self.security_policy
            .asymmetric_sign(signing_key, l, &mut r[..signing_key_size])?;

        dst[..encrypted_range.start].copy_from_slice(&src[..encrypted_range.start]);
        let encrypted_size = self.security_policy.asymmetric_encrypt(
            &encryption_key,
            &src[encrypted_range.clone()],
            &mut dst[encrypted_range.start..],
        )?;
        trace!(
            "Asymmetric chunk: plaintext {} -> ciphertext {}",
            plain_text_size,
            encrypted_size
        );
        Ok(header_size + encrypted_size)
    }

    // Sign then optionally encrypt with the derived keys.
    fn symmetric_sign_and_encrypt(
        &self,
        src: &mut [u8],
        signed_range: Range<usize>,
        encrypted_range: Range<usize>,
        dst: &mut [u8],
    ) -> EncodingResult<usize> {
        self.security_policy.expect_supported()?;
        let signature_size = self.security_policy.symmetric_signature_size();
        let (signing_key, encryption_key, iv) = self.local_keys()?;

        let (l, r) = src.split_at_mut(signed_range.end);
        self.security_policy
            .symmetric_sign(signing_key, l, &mut r[..signature_size])?;

        match self.security_mode {
            MessageSecurityMode::Sign => {
                let size = signed_range.end + signature_size;
                dst[..size].copy_from_slice(&src[..size]);
                Ok(size)
            }
            MessageSecurityMode::SignAndEncrypt => {
                dst[..encrypted_range.start].copy_from_slice(&src[..encrypted_range.start]);
                let encrypted_size = self.security_policy.symmetric_encrypt(
                    encryption_key,
                    iv,
                    &src[encrypted_range.clone()],
                    &mut dst[encrypted_range.start..],
                )?;
                Ok(encrypted_range.start + encrypted_size)
            }
            _ => Err(Error::new(
                StatusCode::BadSecurityModeRejected,
                "Invalid security mode for symmetric signing",
            )),
        }
    }

    /// Verify and strip security from an inbound chunk, returning it in plaintext
    /// form with the message size header rewritten to the plaintext length.
    pub fn verify_and_remove_security(&self, src: &[u8]) -> EncodingResult<MessageChunk> {
        let options = self.decoding_options();
        let (message_header, security_header, encrypted_data_offset) = {
            let mut stream = Cursor::new(src);
            let message_header =
                super::tcp_types::MessageHeader::decode(&mut stream, &options)?;
            let security_header = SecurityHeader::decode_from_stream(
                &mut stream,
                message_header.message_type == MessageType::OpenSecureChannel,
                &options,
            )?;
            (message_header, security_header, stream.position() as usize)
        };

        let message_size = message_header.message_size as usize;
        if message_size != src.len() {
            return Err(Error::new(
                StatusCode::BadTcpInternalError,
                format!(
                    "Chunk header says {} bytes but the buffer holds {}",
                    message_size,
                    src.len()
                ),
            ));
        }

        let data = if message_header.message_type == MessageType::OpenSecureChannel {
            let SecurityHeader::Asymmetric(security_header) = security_header else {
                return Err(Error::decoding("OPN chunk without asymmetric header"));
            };
            let policy = SecurityPolicy::from_uri(security_header.security_policy_uri.as_ref());
            match policy {
                SecurityPolicy::Unknown => {
                    return Err(Error::new(
                        StatusCode::BadSecurityPolicyRejected,
                        format!(
                            "Policy {} is unknown",
                            security_header.security_policy_uri
                        ),
                    ));
                }
                SecurityPolicy::None => {
                    return Ok(MessageChunk { data: src.to_vec() });
                }
                _ => {}
            }
            // The open response is signed with the server key and encrypted with
            // our public key, whatever the security mode
            if security_header.sender_certificate.is_null() {
                return Err(Error::new(
                    StatusCode::BadCertificateInvalid,
                    "Sender certificate of the open response is null",
                ));
            }
            let sender_certificate =
                X509::from_byte_string(&security_header.sender_certificate)?;
            let verification_key = sender_certificate.public_key()?;
            let encrypted_range = encrypted_data_offset..message_size;
            let mut decrypted = vec![0u8; message_size];
            let size = self.asymmetric_decrypt_and_verify(
                policy,
                &verification_key,
                &security_header.receiver_certificate_thumbprint,
                src,
                encrypted_range,
                &mut decrypted,
            )?;
            Self::update_message_size_and_truncate(decrypted, size)?
        } else if self.security_policy != SecurityPolicy::None
            && (self.security_mode == MessageSecurityMode::Sign
                || self.security_mode == MessageSecurityMode::SignAndEncrypt)
        {
            let SecurityHeader::Symmetric(security_header) = security_header else {
                return Err(Error::decoding("MSG chunk without symmetric header"));
            };
            let signature_size = self.security_policy.symmetric_signature_size();
            let encrypted_range = encrypted_data_offset..message_size;
            let signed_range = 0..(message_size - signature_size);
            let mut decrypted = vec![0u8; message_size];
            let size = self.symmetric_decrypt_and_verify(
                src,
                signed_range,
                encrypted_range,
                security_header.token_id,
                &mut decrypted,
            )?;
            Self::update_message_size_and_truncate(decrypted, size)?
        } else {
            src.to_vec()
        };

        Ok(MessageChunk { data })
    }

    fn check_padding_bytes(
        padding_bytes: &[u8],
        expected: u8,
        start_index: usize,
    ) -> EncodingResult<()> {
        for (i, b) in padding_bytes.iter().enumerate() {
            if *b != expected {
                return Err(Error::new(
                    StatusCode::BadSecurityChecksFailed,
                    format!(
                        "Expected padding byte {}, got {} at index {}",
                        expected,
                        b,
                        start_index + i
                    ),
                ));
            }
        }
        Ok(())
    }

    // Verify every padding byte equals the declared padding size and return the
    // padding range so the caller can strip it.
    fn verify_padding(
        &self,
        src: &[u8],
        key_size: usize,
        padding_end: usize,
    ) -> EncodingResult<Range<usize>> {
        let padding_range = if key_size > 256 {
            let padding_byte = src[padding_end - 2];
            let extra_padding_byte = src[padding_end - 1];
            let padding_size = ((extra_padding_byte as usize) << 8) + padding_byte as usize;
            if padding_size + 2 > padding_end {
                return Err(Error::new(
                    StatusCode::BadSecurityChecksFailed,
                    format!("Padding size {} exceeds the chunk", padding_size),
                ));
            }
            let range = (padding_end - padding_size - 2)..padding_end;
            Self::check_padding_bytes(
                &src[range.start..range.end - 1],
                padding_byte,
                range.start,
            )?;
            range
        } else {
            let padding_byte = src[padding_end - 1];
            let padding_size = padding_byte as usize;
            if padding_size + 1 > padding_end {
                return Err(Error::new(
                    StatusCode::BadSecurityChecksFailed,
                    format!("Padding size {} exceeds the chunk", padding_size),
                ));
            }
            let range = (padding_end - padding_size - 1)..padding_end;
            Self::check_padding_bytes(&src[range.clone()], padding_byte, range.start)?;
            range
        };
        Ok(padding_range)
    }

    fn asymmetric_decrypt_and_verify(
        &self,
        policy: SecurityPolicy,
        verification_key: &ualite_crypto::PublicKey,
        receiver_thumbprint: &ByteString,
        src: &[u8],
        encrypted_range: Range<usize>,
        dst: &mut [u8],
    ) -> EncodingResult<usize> {
        // The thumbprint says which of our certificates the peer encrypted for
        let our_cert = self.cert.as_ref().ok_or_else(|| {
            Error::new(
                StatusCode::BadNoValidCertificates,
                "No application certificate to decrypt with",
            )
        })?;
        if our_cert.thumbprint().value() != receiver_thumbprint.as_ref() {
            return Err(Error::new(
                StatusCode::BadNoValidCertificates,
                "Receiver thumbprint does not match our certificate",
            ));
        }

        dst[..encrypted_range.start].copy_from_slice(&src[..encrypted_range.start]);

        let private_key = self.private_key.as_ref().ok_or_else(|| {
            Error::new(
                StatusCode::BadNoValidCertificates,
                "No private key to decrypt with",
            )
        })?;
        let mut decrypted = vec![0u8; encrypted_range.len()];
        let decrypted_size =
            policy.asymmetric_decrypt(private_key, &src[encrypted_range.clone()], &mut decrypted)?;
        dst[encrypted_range.start..encrypted_range.start + decrypted_size]
            .copy_from_slice(&decrypted[..decrypted_size]);

        // The signature sits at the end of the decrypted plaintext
        let signature_size = verification_key.size();
        if decrypted_size < signature_size {
            return Err(Error::new(
                StatusCode::BadSecurityChecksFailed,
                "Decrypted chunk is shorter than its signature",
            ));
        }
        let signature_start = encrypted_range.start + decrypted_size - signature_size;
        policy.asymmetric_verify_signature(
            verification_key,
            &dst[..signature_start],
            &dst[signature_start..signature_start + signature_size],
        )?;

        // Our own key size governs the padding format the sender used
        let key_size = our_cert.public_key()?.size();
        let padding_range = self.verify_padding(dst, key_size, signature_start)?;
        Ok(padding_range.start)
    }

    fn symmetric_decrypt_and_verify(
        &self,
        src: &[u8],
        signed_range: Range<usize>,
        encrypted_range: Range<usize>,
        token_id: u32,
        dst: &mut [u8],
    ) -> EncodingResult<usize> {
        match self.security_mode {
            MessageSecurityMode::Sign => {
                self.security_policy.expect_supported()?;
                dst[..src.len()].copy_from_slice(src);
                let signature_range = signed_range.end..src.len();
                let (verification_key, _, _) = self.remote_keys(token_id)?;
                self.security_policy.symmetric_verify_signature(
                    verification_key,
                    &dst[signed_range.clone()],
                    &dst[signature_range],
                )?;
                Ok(signed_range.end)
            }
            MessageSecurityMode::SignAndEncrypt => {
                self.security_policy.expect_supported()?;
                dst[..encrypted_range.start].copy_from_slice(&src[..encrypted_range.start]);

                let (verification_key, decryption_key, iv) = self.remote_keys(token_id)?;
                let ciphertext_size = encrypted_range.len();
                let mut decrypted = vec![0u8; ciphertext_size];
                let decrypted_size = self.security_policy.symmetric_decrypt(
                    decryption_key,
                    iv,
                    &src[encrypted_range.clone()],
                    &mut decrypted,
                )?;
                let encrypted_range =
                    encrypted_range.start..encrypted_range.start + decrypted_size;
                dst[encrypted_range.clone()].copy_from_slice(&decrypted[..decrypted_size]);

                let signature_range = (encrypted_range.end
                    - self.security_policy.symmetric_signature_size())
                    ..encrypted_range.end;
                self.security_policy.symmetric_verify_signature(
                    verification_key,
                    &dst[signed_range],
                    &dst[signature_range.clone()],
                )?;

                let key_size = decryption_key.key_length();
                let padding_range = self.verify_padding(dst, key_size, signature_range.start)?;
                Ok(padding_range.start)
            }
            _ => {
                error!("Inbound secured chunk in security mode {:?}", self.security_mode);
                Err(Error::new(
                    StatusCode::BadSecurityModeRejected,
                    "Channel is not in a signing mode",
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comms::tcp_types::ChunkKind;

    fn secured_channel(mode: MessageSecurityMode) -> SecureChannel {
        let mut channel = SecureChannel::new(
            SecurityPolicy::Basic256Sha256,
            mode,
            DecodingOptions::default(),
        );
        // Fake an established token with derived keys
        channel.set_security_token(ChannelSecurityToken {
            channel_id: 7,
            token_id: 1,
            created_at: DateTime::now(),
            revised_lifetime: 60_000,
        });
        channel.create_random_nonce();
        let remote = ualite_crypto::random::byte_string(32);
        channel.set_remote_nonce_from_byte_string(&remote).unwrap();
        channel.derive_keys();
        channel
    }

    fn roundtrip_chunk(channel: &SecureChannel, body: &[u8]) -> MessageChunk {
        let chunk = MessageChunk::new(
            1,
            1,
            MessageType::Message,
            ChunkKind::Final,
            channel,
            body,
        )
        .unwrap();
        let mut wire = vec![0u8; chunk.data.len() + 1024];
        let n = channel.apply_security(&chunk, &mut wire).unwrap();
        channel.verify_and_remove_security(&wire[..n]).unwrap()
    }

    #[test]
    fn sign_and_encrypt_round_trip() {
        let channel = secured_channel(MessageSecurityMode::SignAndEncrypt);
        let body: Vec<u8> = (0..50u8).collect();
        let decrypted = roundtrip_chunk(&channel, &body);
        let info = decrypted.chunk_info(&channel).unwrap();
        assert_eq!(
            &decrypted.data[info.body_offset..info.body_offset + info.body_length],
            body.as_slice()
        );
    }

    #[test]
    fn every_body_length_pads_cleanly() {
        // Padding must round-trip for every residue of the cipher block size
        let channel = secured_channel(MessageSecurityMode::SignAndEncrypt);
        for len in 0..=64usize {
            let body = vec![0x11u8; len];
            let decrypted = roundtrip_chunk(&channel, &body);
            let info = decrypted.chunk_info(&channel).unwrap();
            assert_eq!(
                &decrypted.data[info.body_offset..info.body_offset + info.body_length],
                body.as_slice(),
                "body length {}",
                len
            );
        }
    }

    #[test]
    fn sign_only_round_trip() {
        let channel = secured_channel(MessageSecurityMode::Sign);
        let body = vec![0xEE; 17];
        let decrypted = roundtrip_chunk(&channel, &body);
        let info = decrypted.chunk_info(&channel).unwrap();
        assert_eq!(
            &decrypted.data[info.body_offset..info.body_offset + info.body_length],
            body.as_slice()
        );
    }

    #[test]
    fn tampered_chunk_is_rejected() {
        let channel = secured_channel(MessageSecurityMode::SignAndEncrypt);
        let chunk = MessageChunk::new(
            1,
            1,
            MessageType::Message,
            ChunkKind::Final,
            &channel,
            &[1, 2, 3],
        )
        .unwrap();
        let mut wire = vec![0u8; chunk.data.len() + 1024];
        let n = channel.apply_security(&chunk, &mut wire).unwrap();
        // Flip a ciphertext bit
        wire[n - 1] ^= 0x01;
        let err = channel.verify_and_remove_security(&wire[..n]).unwrap_err();
        assert_eq!(err.status(), StatusCode::BadSecurityChecksFailed);
    }

    #[test]
    fn unknown_token_is_rejected() {
        let channel = secured_channel(MessageSecurityMode::SignAndEncrypt);
        assert_eq!(
            channel.remote_keys(99).unwrap_err().status(),
            StatusCode::BadSecureChannelTokenUnknown
        );
    }

    #[test]
    fn renewal_keeps_old_keys_until_expiry() {
        let mut channel = secured_channel(MessageSecurityMode::SignAndEncrypt);
        // Renew: new token, fresh nonces, derive again
        channel.set_security_token(ChannelSecurityToken {
            channel_id: 7,
            token_id: 2,
            created_at: DateTime::now(),
            revised_lifetime: 60_000,
        });
        channel.create_random_nonce();
        let remote = ualite_crypto::random::byte_string(32);
        channel.set_remote_nonce_from_byte_string(&remote).unwrap();
        channel.derive_keys();
        // Both tokens' keys are available during the overlap
        assert!(channel.remote_keys(1).is_ok());
        assert!(channel.remote_keys(2).is_ok());
    }

    #[test]
    fn renew_threshold() {
        let mut channel = SecureChannel::new_insecure_test();
        assert!(!channel.should_renew_security_token());
        channel.set_security_token(ChannelSecurityToken {
            channel_id: 1,
            token_id: 1,
            created_at: DateTime::now() - Duration::milliseconds(800),
            revised_lifetime: 1000,
        });
        assert!(channel.should_renew_security_token());
        assert!(!channel.token_has_expired());
    }
}
