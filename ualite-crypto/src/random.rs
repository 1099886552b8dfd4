// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Cryptographically strong random bytes for nonces.

use ualite_types::ByteString;

/// Fill the slice with cryptographically strong pseudo-random bytes.
pub fn bytes(bytes: &mut [u8]) {
    use rand::RngCore;

    let mut rng = rand::thread_rng();
    rng.fill_bytes(bytes);
}

/// A byte string of `number_of_bytes` random bytes, e.g. for a nonce.
pub fn byte_string(number_of_bytes: usize) -> ByteString {
    let mut data = vec![0u8; number_of_bytes];
    bytes(&mut data);
    ByteString::from(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonces_differ() {
        // Not a randomness test, just a wiring check
        assert_ne!(byte_string(32), byte_string(32));
        assert_eq!(byte_string(32).len(), 32);
    }
}
