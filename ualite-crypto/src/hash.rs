// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! HMAC signing and the P-SHA256 pseudo random function used for key derivation.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use ualite_types::{Error, StatusCode};

type HmacSha256 = Hmac<Sha256>;

/// Size in bytes of an HMAC-SHA256 signature.
pub const SHA256_SIZE: usize = 32;

/// The P_SHA256 pseudo random function from TLS, as OPC UA Part 6 6.7.5 requires
/// for symmetric key derivation.
///
/// `A(0) = seed`, `A(i) = HMAC(secret, A(i-1))`, and the output is the
/// concatenation of `HMAC(secret, A(i) || seed)` until `length` bytes exist.
pub fn p_sha256(secret: &[u8], seed: &[u8], length: usize) -> Vec<u8> {
    let mut result = Vec::with_capacity(length + SHA256_SIZE);
    let mut a_i = hmac_vec(secret, seed);
    while result.len() < length {
        let mut input = a_i.clone();
        input.extend_from_slice(seed);
        result.extend_from_slice(&hmac_vec(secret, &input));
        a_i = hmac_vec(secret, &a_i);
    }
    result.truncate(length);
    result
}

fn hmac_vec(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Write the HMAC-SHA256 of `data` into `signature`, which must be 32 bytes.
pub fn hmac_sha256(key: &[u8], data: &[u8], signature: &mut [u8]) -> Result<(), Error> {
    if signature.len() != SHA256_SIZE {
        return Err(Error::new(
            StatusCode::BadSecurityChecksFailed,
            format!("Signature buffer len {} is not 32", signature.len()),
        ));
    }
    signature.copy_from_slice(&hmac_vec(key, data));
    Ok(())
}

/// Verify an HMAC-SHA256 signature. The comparison is constant time.
pub fn verify_hmac_sha256(key: &[u8], data: &[u8], signature: &[u8]) -> Result<(), Error> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.verify_slice(signature).map_err(|_| {
        Error::new(
            StatusCode::BadSecurityChecksFailed,
            "HMAC-SHA256 signature verification failed",
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p_sha256_is_deterministic() {
        let secret = [1u8; 32];
        let seed = [2u8; 32];
        let a = p_sha256(&secret, &seed, 80);
        let b = p_sha256(&secret, &seed, 80);
        assert_eq!(a, b);
        assert_eq!(a.len(), 80);
        // Prefix property: a shorter request is a prefix of a longer one
        assert_eq!(p_sha256(&secret, &seed, 16), a[..16].to_vec());
    }

    #[test]
    fn p_sha256_depends_on_both_inputs() {
        let a = p_sha256(&[1u8; 32], &[2u8; 32], 32);
        let b = p_sha256(&[2u8; 32], &[1u8; 32], 32);
        let c = p_sha256(&[1u8; 32], &[3u8; 32], 32);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn sign_verify_round_trip() {
        let key = [7u8; 32];
        let data = b"payload bytes";
        let mut signature = [0u8; 32];
        hmac_sha256(&key, data, &mut signature).unwrap();
        verify_hmac_sha256(&key, data, &signature).unwrap();
        // Tampering is caught
        let mut bad = signature;
        bad[0] ^= 1;
        assert!(verify_hmac_sha256(&key, data, &bad).is_err());
        assert!(verify_hmac_sha256(&[8u8; 32], data, &signature).is_err());
    }
}
