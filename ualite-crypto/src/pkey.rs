// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! RSA public and private key wrappers for the asymmetric half of the handshake.
//!
//! RSA can only transform one key-sized block at a time, so encryption and
//! decryption here are block-wise: the plaintext is split into blocks of
//! `plain_text_block_size` and every block becomes `size()` bytes of ciphertext.

use rsa::{
    pkcs8::{DecodePrivateKey, EncodePrivateKey},
    signature::{RandomizedSigner, SignatureEncoding, Signer, Verifier},
    traits::PublicKeyParts,
    Oaep, RsaPrivateKey, RsaPublicKey,
};
use sha1::Sha1;
use sha2::Sha256;

use ualite_types::{Error, StatusCode};

/// OAEP overhead for SHA-1: two hash lengths plus two bytes.
const OAEP_SHA1_OVERHEAD: usize = 42;
/// OAEP overhead for SHA-256.
const OAEP_SHA256_OVERHEAD: usize = 66;

/// The padding scheme for asymmetric encryption, dictated by the security policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsaPadding {
    /// RSA-OAEP with SHA-1 (the mask generation hash also SHA-1).
    OaepSha1,
    /// RSA-OAEP with SHA-256.
    OaepSha256,
}

impl RsaPadding {
    fn overhead(&self) -> usize {
        match self {
            RsaPadding::OaepSha1 => OAEP_SHA1_OVERHEAD,
            RsaPadding::OaepSha256 => OAEP_SHA256_OVERHEAD,
        }
    }

    fn scheme(&self) -> Oaep {
        match self {
            RsaPadding::OaepSha1 => Oaep::new::<Sha1>(),
            RsaPadding::OaepSha256 => Oaep::new::<Sha256>(),
        }
    }
}

/// The signature scheme for asymmetric signing, dictated by the security policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsaSignature {
    /// RSA PKCS#1 v1.5 with SHA-256.
    Pkcs1v15Sha256,
    /// RSA-PSS with SHA-256.
    PssSha256,
}

/// Number of bytes an RSA signature or cipher block occupies for `key`.
pub trait KeySize {
    /// Key size in bytes.
    fn size(&self) -> usize;

    /// Largest plaintext block that fits one RSA encryption with `padding`.
    fn plain_text_block_size(&self, padding: RsaPadding) -> usize {
        self.size() - padding.overhead()
    }

    /// Ciphertext size for `plain_text_size` bytes of plaintext with `padding`.
    fn cipher_text_size(&self, plain_text_size: usize, padding: RsaPadding) -> usize {
        let block_size = self.plain_text_block_size(padding);
        plain_text_size.div_ceil(block_size) * self.size()
    }
}

/// An RSA private key: decrypts inbound asymmetric chunks and signs outbound ones.
#[derive(Debug, Clone)]
pub struct PrivateKey {
    key: RsaPrivateKey,
}

impl KeySize for PrivateKey {
    fn size(&self) -> usize {
        self.key.size()
    }
}

impl PrivateKey {
    /// Generate a fresh key, mostly useful for tests and self-signed setups.
    pub fn new_rsa(bit_length: usize) -> Result<PrivateKey, Error> {
        let mut rng = rand::thread_rng();
        RsaPrivateKey::new(&mut rng, bit_length)
            .map(|key| PrivateKey { key })
            .map_err(|e| Error::new(StatusCode::BadSecurityChecksFailed, e.to_string()))
    }

    /// Parse a PKCS#8 DER blob.
    pub fn from_pkcs8_der(der: &[u8]) -> Result<PrivateKey, Error> {
        RsaPrivateKey::from_pkcs8_der(der)
            .map(|key| PrivateKey { key })
            .map_err(|e| Error::new(StatusCode::BadCertificateInvalid, e.to_string()))
    }

    /// Serialize to PKCS#8 DER.
    pub fn to_pkcs8_der(&self) -> Result<Vec<u8>, Error> {
        self.key
            .to_pkcs8_der()
            .map(|d| d.as_bytes().to_vec())
            .map_err(|e| Error::new(StatusCode::BadCertificateInvalid, e.to_string()))
    }

    /// The matching public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            key: self.key.to_public_key(),
        }
    }

    /// Sign `data`, writing exactly `size()` bytes into `signature`.
    pub fn sign(
        &self,
        scheme: RsaSignature,
        data: &[u8],
        signature: &mut [u8],
    ) -> Result<usize, Error> {
        let bytes = match scheme {
            RsaSignature::Pkcs1v15Sha256 => {
                let signing_key = rsa::pkcs1v15::SigningKey::<Sha256>::new(self.key.clone());
                signing_key.sign(data).to_vec()
            }
            RsaSignature::PssSha256 => {
                let signing_key = rsa::pss::SigningKey::<Sha256>::new(self.key.clone());
                let mut rng = rand::thread_rng();
                signing_key.sign_with_rng(&mut rng, data).to_vec()
            }
        };
        if signature.len() != bytes.len() {
            return Err(Error::new(
                StatusCode::BadSecurityChecksFailed,
                format!(
                    "Signature buffer is {} bytes, key produces {}",
                    signature.len(),
                    bytes.len()
                ),
            ));
        }
        signature.copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    /// Decrypt `src` block-wise into `dst`, returning the plaintext length.
    pub fn decrypt(
        &self,
        padding: RsaPadding,
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<usize, Error> {
        let cipher_block = self.size();
        if src.len() % cipher_block != 0 {
            return Err(Error::new(
                StatusCode::BadSecurityChecksFailed,
                format!(
                    "Ciphertext length {} is not a multiple of the key size {}",
                    src.len(),
                    cipher_block
                ),
            ));
        }
        let mut written = 0;
        for block in src.chunks(cipher_block) {
            let plain = self
                .key
                .decrypt(padding.scheme(), block)
                .map_err(|_| {
                    Error::new(
                        StatusCode::BadSecurityChecksFailed,
                        "RSA decryption failed",
                    )
                })?;
            dst[written..written + plain.len()].copy_from_slice(&plain);
            written += plain.len();
        }
        Ok(written)
    }
}

/// An RSA public key: encrypts outbound asymmetric chunks and verifies signatures.
#[derive(Debug, Clone)]
pub struct PublicKey {
    key: RsaPublicKey,
}

impl KeySize for PublicKey {
    fn size(&self) -> usize {
        self.key.size()
    }
}

impl From<RsaPublicKey> for PublicKey {
    fn from(key: RsaPublicKey) -> Self {
        PublicKey { key }
    }
}

impl PublicKey {
    /// Verify a signature over `data`.
    pub fn verify(
        &self,
        scheme: RsaSignature,
        data: &[u8],
        signature: &[u8],
    ) -> Result<(), Error> {
        let failed = || {
            Error::new(
                StatusCode::BadSecurityChecksFailed,
                "RSA signature verification failed",
            )
        };
        match scheme {
            RsaSignature::Pkcs1v15Sha256 => {
                let verifying_key =
                    rsa::pkcs1v15::VerifyingKey::<Sha256>::new(self.key.clone());
                let signature =
                    rsa::pkcs1v15::Signature::try_from(signature).map_err(|_| failed())?;
                verifying_key.verify(data, &signature).map_err(|_| failed())
            }
            RsaSignature::PssSha256 => {
                let verifying_key = rsa::pss::VerifyingKey::<Sha256>::new(self.key.clone());
                let signature = rsa::pss::Signature::try_from(signature).map_err(|_| failed())?;
                verifying_key.verify(data, &signature).map_err(|_| failed())
            }
        }
    }

    /// Encrypt `src` block-wise into `dst`, returning the ciphertext length.
    pub fn encrypt(
        &self,
        padding: RsaPadding,
        src: &[u8],
        dst: &mut [u8],
    ) -> Result<usize, Error> {
        let plain_block = self.plain_text_block_size(padding);
        let mut rng = rand::thread_rng();
        let mut written = 0;
        for block in src.chunks(plain_block) {
            let cipher = self
                .key
                .encrypt(&mut rng, padding.scheme(), block)
                .map_err(|e| Error::new(StatusCode::BadSecurityChecksFailed, e.to_string()))?;
            if dst.len() < written + cipher.len() {
                return Err(Error::new(
                    StatusCode::BadSecurityChecksFailed,
                    "Destination buffer too small for RSA ciphertext",
                ));
            }
            dst[written..written + cipher.len()].copy_from_slice(&cipher);
            written += cipher.len();
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> PrivateKey {
        PrivateKey::new_rsa(2048).unwrap()
    }

    #[test]
    fn block_size_arithmetic() {
        let key = test_key();
        assert_eq!(key.size(), 256);
        assert_eq!(key.plain_text_block_size(RsaPadding::OaepSha1), 214);
        assert_eq!(key.plain_text_block_size(RsaPadding::OaepSha256), 190);
        // 215 plaintext bytes need two blocks
        assert_eq!(key.cipher_text_size(215, RsaPadding::OaepSha1), 512);
    }

    #[test]
    fn encrypt_decrypt_multi_block() {
        let key = test_key();
        let public = key.public_key();
        let plaintext: Vec<u8> = (0..400).map(|i| i as u8).collect();
        let mut ciphertext =
            vec![0u8; public.cipher_text_size(plaintext.len(), RsaPadding::OaepSha1)];
        let n = public
            .encrypt(RsaPadding::OaepSha1, &plaintext, &mut ciphertext)
            .unwrap();
        assert_eq!(n, ciphertext.len());
        let mut decrypted = vec![0u8; n];
        let n = key
            .decrypt(RsaPadding::OaepSha1, &ciphertext, &mut decrypted)
            .unwrap();
        assert_eq!(&decrypted[..n], plaintext.as_slice());
    }

    #[test]
    fn sign_verify_both_schemes() {
        let key = test_key();
        let public = key.public_key();
        let data = b"chunk contents";
        for scheme in [RsaSignature::Pkcs1v15Sha256, RsaSignature::PssSha256] {
            let mut signature = vec![0u8; key.size()];
            key.sign(scheme, data, &mut signature).unwrap();
            public.verify(scheme, data, &signature).unwrap();
            signature[10] ^= 0xFF;
            assert!(public.verify(scheme, data, &signature).is_err());
        }
    }
}
