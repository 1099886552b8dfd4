// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! AES-CBC symmetric encryption with the derived channel keys.

use aes::cipher::{
    block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit,
};

use ualite_types::{Error, StatusCode};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AES block size, also the derived IV length.
pub const AES_BLOCK_SIZE: usize = 16;

/// A derived symmetric key for one direction of a channel. The key length selects
/// AES-128 or AES-256; OPC UA always uses CBC with the static derived IV per chunk,
/// never chaining from the previous chunk's ciphertext.
#[derive(Debug, Clone)]
pub struct AesKey {
    value: Vec<u8>,
}

impl AesKey {
    /// Wrap a derived key. The length must be 16 or 32 bytes.
    pub fn new(value: &[u8]) -> Result<AesKey, Error> {
        match value.len() {
            16 | 32 => Ok(AesKey {
                value: value.to_vec(),
            }),
            len => Err(Error::new(
                StatusCode::BadSecurityChecksFailed,
                format!("AES key length {} is not 16 or 32", len),
            )),
        }
    }

    /// The raw key bytes.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Key length in bytes.
    pub fn key_length(&self) -> usize {
        self.value.len()
    }

    /// Cipher block size in bytes.
    pub fn block_size(&self) -> usize {
        AES_BLOCK_SIZE
    }

    fn validate_args(&self, src: &[u8], iv: &[u8], dst: &[u8]) -> Result<(), Error> {
        if src.len() % AES_BLOCK_SIZE != 0 {
            Err(Error::new(
                StatusCode::BadSecurityChecksFailed,
                format!("Input length {} is not block aligned", src.len()),
            ))
        } else if dst.len() < src.len() {
            Err(Error::new(
                StatusCode::BadSecurityChecksFailed,
                format!(
                    "Destination buffer {} is smaller than input {}",
                    dst.len(),
                    src.len()
                ),
            ))
        } else if iv.len() != AES_BLOCK_SIZE {
            Err(Error::new(
                StatusCode::BadSecurityChecksFailed,
                format!("IV length {} is not the block size", iv.len()),
            ))
        } else {
            Ok(())
        }
    }

    /// Encrypt block-aligned `src` into `dst`, returning the ciphertext length.
    pub fn encrypt(&self, src: &[u8], iv: &[u8], dst: &mut [u8]) -> Result<usize, Error> {
        self.validate_args(src, iv, dst)?;
        let result = match self.value.len() {
            16 => Aes128CbcEnc::new(self.value.as_slice().into(), iv.into())
                .encrypt_padded_b2b_mut::<NoPadding>(src, dst),
            _ => Aes256CbcEnc::new(self.value.as_slice().into(), iv.into())
                .encrypt_padded_b2b_mut::<NoPadding>(src, dst),
        };
        result
            .map(|out| out.len())
            .map_err(|e| Error::new(StatusCode::BadSecurityChecksFailed, e.to_string()))
    }

    /// Decrypt block-aligned `src` into `dst`, returning the plaintext length.
    pub fn decrypt(&self, src: &[u8], iv: &[u8], dst: &mut [u8]) -> Result<usize, Error> {
        self.validate_args(src, iv, dst)?;
        let result = match self.value.len() {
            16 => Aes128CbcDec::new(self.value.as_slice().into(), iv.into())
                .decrypt_padded_b2b_mut::<NoPadding>(src, dst),
            _ => Aes256CbcDec::new(self.value.as_slice().into(), iv.into())
                .decrypt_padded_b2b_mut::<NoPadding>(src, dst),
        };
        result
            .map(|out| out.len())
            .map_err(|e| Error::new(StatusCode::BadSecurityChecksFailed, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_identity() {
        for key_len in [16usize, 32] {
            let key = AesKey::new(&vec![9u8; key_len]).unwrap();
            let iv = [3u8; 16];
            let plaintext = vec![0xAB; 64];
            let mut ciphertext = vec![0u8; 64];
            let n = key.encrypt(&plaintext, &iv, &mut ciphertext).unwrap();
            assert_eq!(n, 64);
            assert_ne!(ciphertext, plaintext);
            let mut decrypted = vec![0u8; 64];
            let n = key.decrypt(&ciphertext, &iv, &mut decrypted).unwrap();
            assert_eq!(&decrypted[..n], plaintext.as_slice());
        }
    }

    #[test]
    fn unaligned_input_is_rejected() {
        let key = AesKey::new(&[1u8; 16]).unwrap();
        let iv = [0u8; 16];
        let mut dst = vec![0u8; 32];
        assert!(key.encrypt(&[0u8; 15], &iv, &mut dst).is_err());
    }

    #[test]
    fn bad_key_length_is_rejected() {
        assert!(AesKey::new(&[0u8; 24]).is_err());
    }
}
