// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Security policies and the algorithm dispatch they imply.
//!
//! | Policy | Asym key-wrap | Asym sign | Sym encrypt | Sym sign |
//! |---|---|---|---|---|
//! | None | - | - | - | - |
//! | Basic256Sha256 | RSA-OAEP-SHA1 | RSA-PKCS1-v1.5 SHA256 | AES-256-CBC | HMAC-SHA256 |
//! | Aes128-Sha256-RsaOaep | RSA-OAEP-SHA1 | RSA-PSS-SHA256 | AES-128-CBC | HMAC-SHA256 |
//! | Aes256-Sha256-RsaPss | RSA-OAEP-SHA256 | RSA-PSS-SHA256 | AES-256-CBC | HMAC-SHA256 |

use std::fmt;
use std::str::FromStr;

use ualite_types::{Error, StatusCode};

use crate::{
    aeskey::{AesKey, AES_BLOCK_SIZE},
    hash,
    pkey::{KeySize, PrivateKey, PublicKey, RsaPadding, RsaSignature},
};

/// URI of the None security policy.
pub const SECURITY_POLICY_NONE_URI: &str = "http://opcfoundation.org/UA/SecurityPolicy#None";
/// URI of the Basic256Sha256 security policy.
pub const SECURITY_POLICY_BASIC_256_SHA_256_URI: &str =
    "http://opcfoundation.org/UA/SecurityPolicy#Basic256Sha256";
/// URI of the Aes128-Sha256-RsaOaep security policy.
pub const SECURITY_POLICY_AES_128_SHA_256_RSA_OAEP_URI: &str =
    "http://opcfoundation.org/UA/SecurityPolicy#Aes128_Sha256_RsaOaep";
/// URI of the Aes256-Sha256-RsaPss security policy.
pub const SECURITY_POLICY_AES_256_SHA_256_RSA_PSS_URI: &str =
    "http://opcfoundation.org/UA/SecurityPolicy#Aes256_Sha256_RsaPss";

/// The derived symmetric key material for one direction of a channel:
/// signing key, encryption key and initialization vector.
pub type SecureChannelKeys = (Vec<u8>, AesKey, Vec<u8>);

/// A security policy selects every algorithm used on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityPolicy {
    /// Policy was not recognized.
    Unknown,
    /// No signing, no encryption.
    None,
    /// AES-256-CBC with RSA PKCS#1 v1.5 signatures.
    Basic256Sha256,
    /// AES-128-CBC with RSA-PSS signatures and OAEP-SHA1 key transport.
    Aes128Sha256RsaOaep,
    /// AES-256-CBC with RSA-PSS signatures and OAEP-SHA256 key transport.
    Aes256Sha256RsaPss,
}

impl fmt::Display for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

impl FromStr for SecurityPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(SecurityPolicy::from_uri(s))
    }
}

impl SecurityPolicy {
    /// Map a policy URI to a policy. Unrecognized URIs map to `Unknown`.
    pub fn from_uri(uri: &str) -> SecurityPolicy {
        match uri {
            SECURITY_POLICY_NONE_URI => SecurityPolicy::None,
            SECURITY_POLICY_BASIC_256_SHA_256_URI => SecurityPolicy::Basic256Sha256,
            SECURITY_POLICY_AES_128_SHA_256_RSA_OAEP_URI => SecurityPolicy::Aes128Sha256RsaOaep,
            SECURITY_POLICY_AES_256_SHA_256_RSA_PSS_URI => SecurityPolicy::Aes256Sha256RsaPss,
            _ => {
                log::error!("Security policy \"{}\" is unknown", uri);
                SecurityPolicy::Unknown
            }
        }
    }

    /// The URI of the policy.
    pub fn to_uri(&self) -> &'static str {
        match self {
            SecurityPolicy::None => SECURITY_POLICY_NONE_URI,
            SecurityPolicy::Basic256Sha256 => SECURITY_POLICY_BASIC_256_SHA_256_URI,
            SecurityPolicy::Aes128Sha256RsaOaep => SECURITY_POLICY_AES_128_SHA_256_RSA_OAEP_URI,
            SecurityPolicy::Aes256Sha256RsaPss => SECURITY_POLICY_AES_256_SHA_256_RSA_PSS_URI,
            SecurityPolicy::Unknown => {
                panic!("Unknown security policy has no URI")
            }
        }
    }

    /// `true` for every policy this stack can actually run.
    pub fn is_supported(&self) -> bool {
        !matches!(self, SecurityPolicy::Unknown)
    }

    /// `true` when the policy applies cryptography at all.
    pub fn is_encryption_enabled(&self) -> bool {
        matches!(
            self,
            SecurityPolicy::Basic256Sha256
                | SecurityPolicy::Aes128Sha256RsaOaep
                | SecurityPolicy::Aes256Sha256RsaPss
        )
    }

    /// Length in bytes of the nonces exchanged in OpenSecureChannel.
    pub fn secure_channel_nonce_length(&self) -> usize {
        if self.is_encryption_enabled() {
            32
        } else {
            0
        }
    }

    /// Length in bytes of the derived symmetric signing key.
    pub fn derived_signature_key_length(&self) -> usize {
        if self.is_encryption_enabled() {
            hash::SHA256_SIZE
        } else {
            0
        }
    }

    /// Length in bytes of the derived symmetric encryption key.
    pub fn derived_encryption_key_length(&self) -> usize {
        match self {
            SecurityPolicy::Basic256Sha256 | SecurityPolicy::Aes256Sha256RsaPss => 32,
            SecurityPolicy::Aes128Sha256RsaOaep => 16,
            _ => 0,
        }
    }

    /// Length in bytes of a symmetric signature.
    pub fn symmetric_signature_size(&self) -> usize {
        if self.is_encryption_enabled() {
            hash::SHA256_SIZE
        } else {
            0
        }
    }

    /// The symmetric cipher's plaintext block size.
    pub fn plain_block_size(&self) -> usize {
        if self.is_encryption_enabled() {
            AES_BLOCK_SIZE
        } else {
            0
        }
    }

    /// The RSA padding used for asymmetric encryption.
    pub fn asymmetric_encryption_padding(&self) -> RsaPadding {
        match self {
            SecurityPolicy::Aes256Sha256RsaPss => RsaPadding::OaepSha256,
            _ => RsaPadding::OaepSha1,
        }
    }

    /// The RSA scheme used for asymmetric signatures.
    pub fn asymmetric_signature_scheme(&self) -> RsaSignature {
        match self {
            SecurityPolicy::Basic256Sha256 => RsaSignature::Pkcs1v15Sha256,
            _ => RsaSignature::PssSha256,
        }
    }

    /// URI of the asymmetric signature algorithm, carried in SignatureData.
    pub fn asymmetric_signature_algorithm(&self) -> &'static str {
        match self.asymmetric_signature_scheme() {
            RsaSignature::Pkcs1v15Sha256 => "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256",
            RsaSignature::PssSha256 => "http://opcfoundation.org/UA/security/rsa-pss-sha2-256",
        }
    }

    /// URI of the asymmetric encryption algorithm, used for password encryption.
    pub fn asymmetric_encryption_algorithm(&self) -> &'static str {
        match self.asymmetric_encryption_padding() {
            RsaPadding::OaepSha1 => "http://www.w3.org/2001/04/xmlenc#rsa-oaep",
            RsaPadding::OaepSha256 => "http://opcfoundation.org/UA/security/rsa-oaep-sha2-256",
        }
    }

    /// Derive the symmetric keys for one direction from the nonces, per Part 6
    /// 6.7.5: signing key, then encryption key, then IV out of one P-SHA256 stream
    /// keyed by the remote nonce and seeded by the local nonce (and vice versa for
    /// the other direction).
    pub fn make_secure_channel_keys(&self, secret: &[u8], seed: &[u8]) -> SecureChannelKeys {
        let signing_key_length = self.derived_signature_key_length();
        let encryption_key_length = self.derived_encryption_key_length();
        let iv_length = self.plain_block_size();

        let bytes = hash::p_sha256(
            secret,
            seed,
            signing_key_length + encryption_key_length + iv_length,
        );
        let signing_key = bytes[..signing_key_length].to_vec();
        let encryption_key = AesKey::new(
            &bytes[signing_key_length..signing_key_length + encryption_key_length],
        )
        .expect("derived key length is 16 or 32");
        let iv = bytes[signing_key_length + encryption_key_length..].to_vec();
        (signing_key, encryption_key, iv)
    }

    /// Symmetrically sign `data` into `signature`.
    pub fn symmetric_sign(
        &self,
        key: &[u8],
        data: &[u8],
        signature: &mut [u8],
    ) -> Result<(), Error> {
        hash::hmac_sha256(key, data, signature)
    }

    /// Verify a symmetric signature, constant time.
    pub fn symmetric_verify_signature(
        &self,
        key: &[u8],
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), Error> {
        hash::verify_hmac_sha256(key, data, signature)
    }

    /// Symmetrically encrypt `src` into `dst`.
    pub fn symmetric_encrypt(
        &self,
        key: &AesKey,
        iv: &[u8],
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<usize, Error> {
        key.encrypt(src, iv, dst)
    }

    /// Symmetrically decrypt `src` into `dst`.
    pub fn symmetric_decrypt(
        &self,
        key: &AesKey,
        iv: &[u8],
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<usize, Error> {
        key.decrypt(src, iv, dst)
    }

    /// Asymmetrically sign `data` with our private key.
    pub fn asymmetric_sign(
        &self,
        signing_key: &PrivateKey,
        data: &[u8],
        signature: &mut [u8],
    ) -> Result<usize, Error> {
        signing_key.sign(self.asymmetric_signature_scheme(), data, signature)
    }

    /// Verify an asymmetric signature with the sender's public key.
    pub fn asymmetric_verify_signature(
        &self,
        verification_key: &PublicKey,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), Error> {
        verification_key.verify(self.asymmetric_signature_scheme(), data, signature)
    }

    /// Asymmetrically encrypt `src` with the receiver's public key.
    pub fn asymmetric_encrypt(
        &self,
        encryption_key: &PublicKey,
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<usize, Error> {
        encryption_key.encrypt(self.asymmetric_encryption_padding(), src, dst)
    }

    /// Asymmetrically decrypt `src` with our private key.
    pub fn asymmetric_decrypt(
        &self,
        decryption_key: &PrivateKey,
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<usize, Error> {
        decryption_key.decrypt(self.asymmetric_encryption_padding(), src, dst)
    }

    /// Guard for paths that must not run without cryptography.
    pub fn expect_supported(&self) -> Result<(), Error> {
        if self.is_encryption_enabled() {
            Ok(())
        } else {
            Err(Error::new(
                StatusCode::BadSecurityPolicyRejected,
                format!("Policy {:?} cannot be used here", self),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_round_trip() {
        for policy in [
            SecurityPolicy::None,
            SecurityPolicy::Basic256Sha256,
            SecurityPolicy::Aes128Sha256RsaOaep,
            SecurityPolicy::Aes256Sha256RsaPss,
        ] {
            assert_eq!(SecurityPolicy::from_uri(policy.to_uri()), policy);
        }
        assert_eq!(
            SecurityPolicy::from_uri("http://opcfoundation.org/UA/SecurityPolicy#Basic128Rsa15"),
            SecurityPolicy::Unknown
        );
    }

    #[test]
    fn derived_key_lengths() {
        // policy, encryption key length
        let cases = [
            (SecurityPolicy::Basic256Sha256, 32),
            (SecurityPolicy::Aes128Sha256RsaOaep, 16),
            (SecurityPolicy::Aes256Sha256RsaPss, 32),
        ];
        for (policy, key_len) in cases {
            let (signing, encryption, iv) =
                policy.make_secure_channel_keys(&[1u8; 32], &[2u8; 32]);
            assert_eq!(signing.len(), 32);
            assert_eq!(encryption.key_length(), key_len);
            assert_eq!(iv.len(), 16);
        }
    }

    #[test]
    fn derivation_is_deterministic_and_direction_sensitive() {
        // The spec scenario: fixed nonces, Basic256Sha256
        let client_nonce: Vec<u8> = (1..=32).collect();
        let server_nonce: Vec<u8> = (33..=64).collect();
        let policy = SecurityPolicy::Basic256Sha256;

        let client_keys = policy.make_secure_channel_keys(&server_nonce, &client_nonce);
        let client_keys2 = policy.make_secure_channel_keys(&server_nonce, &client_nonce);
        assert_eq!(client_keys.0, client_keys2.0);
        assert_eq!(client_keys.1.value(), client_keys2.1.value());
        assert_eq!(client_keys.2, client_keys2.2);

        // Swapping the nonces yields the other direction's keys, not the same ones
        let server_keys = policy.make_secure_channel_keys(&client_nonce, &server_nonce);
        assert_ne!(client_keys.0, server_keys.0);
        assert_ne!(client_keys.1.value(), server_keys.1.value());
    }

    #[test]
    fn symmetric_sign_encrypt_round_trip() {
        for policy in [
            SecurityPolicy::Basic256Sha256,
            SecurityPolicy::Aes128Sha256RsaOaep,
            SecurityPolicy::Aes256Sha256RsaPss,
        ] {
            let (signing, encryption, iv) =
                policy.make_secure_channel_keys(&[5u8; 32], &[6u8; 32]);
            let data = vec![0x5A; 48];
            let mut signature = vec![0u8; policy.symmetric_signature_size()];
            policy.symmetric_sign(&signing, &data, &mut signature).unwrap();
            policy
                .symmetric_verify_signature(&signing, &data, &signature)
                .unwrap();

            let mut ciphertext = vec![0u8; 48];
            policy
                .symmetric_encrypt(&encryption, &iv, &data, &mut ciphertext)
                .unwrap();
            let mut plaintext = vec![0u8; 48];
            let n = policy
                .symmetric_decrypt(&encryption, &iv, &ciphertext, &mut plaintext)
                .unwrap();
            assert_eq!(&plaintext[..n], data.as_slice());
        }
    }
}
