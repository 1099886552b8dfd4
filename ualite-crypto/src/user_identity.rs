// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Cryptography for user identity tokens: legacy password encryption and the
//! signatures proving possession of a key.

use ualite_types::{ByteString, Error, SignatureData, StatusCode, UaString};

use crate::{
    pkey::{KeySize, PrivateKey},
    security_policy::SecurityPolicy,
    x509::X509,
};

/// Encrypt a password for a UserNameIdentityToken using the server certificate.
///
/// The plaintext is the 4 byte little-endian length of password plus nonce,
/// followed by the password bytes and the most recent server nonce. The whole
/// blob is RSA encrypted with the token security policy's padding.
pub fn encrypt_user_identity_token_password(
    policy: SecurityPolicy,
    server_certificate: &X509,
    server_nonce: &[u8],
    password: &[u8],
) -> Result<ByteString, Error> {
    policy.expect_supported()?;
    let key = server_certificate.public_key()?;

    let len = password.len() + server_nonce.len();
    let mut plaintext = Vec::with_capacity(4 + len);
    plaintext.extend_from_slice(&(len as u32).to_le_bytes());
    plaintext.extend_from_slice(password);
    plaintext.extend_from_slice(server_nonce);

    let padding = policy.asymmetric_encryption_padding();
    let mut ciphertext = vec![0u8; key.cipher_text_size(plaintext.len(), padding)];
    let written = policy.asymmetric_encrypt(&key, &plaintext, &mut ciphertext)?;
    ciphertext.truncate(written);
    Ok(ByteString::from(ciphertext))
}

/// Decrypt a password encrypted by [`encrypt_user_identity_token_password`],
/// verifying the echoed nonce. Mostly useful for tests.
pub fn decrypt_user_identity_token_password(
    policy: SecurityPolicy,
    key: &PrivateKey,
    server_nonce: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, Error> {
    policy.expect_supported()?;
    let mut plaintext = vec![0u8; ciphertext.len()];
    let n = policy.asymmetric_decrypt(key, ciphertext, &mut plaintext)?;
    plaintext.truncate(n);
    if plaintext.len() < 4 {
        return Err(Error::new(
            StatusCode::BadIdentityTokenInvalid,
            "Encrypted password is too short",
        ));
    }
    let len = u32::from_le_bytes(plaintext[..4].try_into().unwrap()) as usize;
    if plaintext.len() < 4 + len || len < server_nonce.len() {
        return Err(Error::new(
            StatusCode::BadIdentityTokenInvalid,
            "Encrypted password length prefix is inconsistent",
        ));
    }
    let password_len = len - server_nonce.len();
    let nonce = &plaintext[4 + password_len..4 + len];
    if nonce != server_nonce {
        return Err(Error::new(
            StatusCode::BadIdentityTokenRejected,
            "Server nonce in encrypted password does not match",
        ));
    }
    Ok(plaintext[4..4 + password_len].to_vec())
}

/// Create the signature over `data ++ nonce` used for the session client signature
/// and for X.509 user token signatures.
pub fn create_signature_data(
    policy: SecurityPolicy,
    signing_key: &PrivateKey,
    data: &[u8],
    nonce: &[u8],
) -> Result<SignatureData, Error> {
    policy.expect_supported()?;
    let mut signed = Vec::with_capacity(data.len() + nonce.len());
    signed.extend_from_slice(data);
    signed.extend_from_slice(nonce);

    let mut signature = vec![0u8; signing_key.size()];
    policy.asymmetric_sign(signing_key, &signed, &mut signature)?;
    Ok(SignatureData {
        algorithm: UaString::from(policy.asymmetric_signature_algorithm()),
        signature: ByteString::from(signature),
    })
}

/// Verify a [`SignatureData`] over `data ++ nonce` against a certificate, as done
/// with the server signature returned by CreateSession.
pub fn verify_signature_data(
    policy: SecurityPolicy,
    signer_certificate: &X509,
    signature: &SignatureData,
    data: &[u8],
    nonce: &[u8],
) -> Result<(), Error> {
    policy.expect_supported()?;
    if signature.signature.is_null() {
        return Err(Error::new(
            StatusCode::BadApplicationSignatureInvalid,
            "Signature is null",
        ));
    }
    let mut signed = Vec::with_capacity(data.len() + nonce.len());
    signed.extend_from_slice(data);
    signed.extend_from_slice(nonce);
    let key = signer_certificate.public_key()?;
    policy.asymmetric_verify_signature(&key, &signed, signature.signature.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_round_trip() {
        // Build a throwaway self-signed-ish setup: key only, certificate is not
        // needed for the decrypt direction.
        let key = PrivateKey::new_rsa(2048).unwrap();
        let nonce: Vec<u8> = (0..32).collect();
        let policy = SecurityPolicy::Basic256Sha256;

        // Encrypt manually against the public key, as the client would against the
        // server certificate.
        let password = b"correct horse battery staple";
        let len = password.len() + nonce.len();
        let mut plaintext = Vec::new();
        plaintext.extend_from_slice(&(len as u32).to_le_bytes());
        plaintext.extend_from_slice(password);
        plaintext.extend_from_slice(&nonce);
        let public = key.public_key();
        let padding = policy.asymmetric_encryption_padding();
        let mut ciphertext = vec![0u8; public.cipher_text_size(plaintext.len(), padding)];
        let n = policy
            .asymmetric_encrypt(&public, &plaintext, &mut ciphertext)
            .unwrap();
        ciphertext.truncate(n);

        let decrypted =
            decrypt_user_identity_token_password(policy, &key, &nonce, &ciphertext).unwrap();
        assert_eq!(decrypted, password);

        // A different nonce is rejected
        let wrong: Vec<u8> = (1..33).collect();
        assert!(
            decrypt_user_identity_token_password(policy, &key, &wrong, &ciphertext).is_err()
        );
    }

    #[test]
    fn signature_algorithm_uris() {
        assert_eq!(
            SecurityPolicy::Basic256Sha256.asymmetric_signature_algorithm(),
            "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256"
        );
        assert_eq!(
            SecurityPolicy::Aes256Sha256RsaPss.asymmetric_signature_algorithm(),
            "http://opcfoundation.org/UA/security/rsa-pss-sha2-256"
        );
    }
}
