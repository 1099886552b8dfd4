// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! X.509 certificate handling: DER parsing, the SHA-1 thumbprint that identifies
//! certificates in security headers, and public key extraction.

use const_oid::db::rfc5912::RSA_ENCRYPTION;
use sha1::{Digest, Sha1};
use x509_cert::{
    der::{Decode, Encode},
    Certificate,
};

use ualite_types::{ByteString, DateTime, Error, StatusCode};

use crate::pkey::PublicKey;

/// The SHA-1 digest of a certificate's DER form. Receivers use it to select which
/// of their certificates a message was encrypted for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbprint {
    value: [u8; Thumbprint::THUMBPRINT_SIZE],
}

impl Thumbprint {
    /// Size in bytes of a thumbprint.
    pub const THUMBPRINT_SIZE: usize = 20;

    /// Digest the given DER bytes.
    pub fn new(der: &[u8]) -> Thumbprint {
        let digest = Sha1::digest(der);
        let mut value = [0u8; Self::THUMBPRINT_SIZE];
        value.copy_from_slice(&digest);
        Thumbprint { value }
    }

    /// The raw digest bytes.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// The digest as a byte string for security headers.
    pub fn as_byte_string(&self) -> ByteString {
        ByteString::from(self.value.as_slice())
    }
}

/// A parsed X.509 certificate plus its raw DER form.
#[derive(Debug, Clone)]
pub struct X509 {
    der: Vec<u8>,
    certificate: Certificate,
}

impl X509 {
    /// Parse a certificate from DER bytes.
    pub fn from_der(der: &[u8]) -> Result<X509, Error> {
        let certificate = Certificate::from_der(der).map_err(|e| {
            Error::new(
                StatusCode::BadCertificateInvalid,
                format!("Certificate does not parse: {}", e),
            )
        })?;
        Ok(X509 {
            der: der.to_vec(),
            certificate,
        })
    }

    /// Parse a certificate from a non-null byte string.
    pub fn from_byte_string(data: &ByteString) -> Result<X509, Error> {
        if data.is_empty() {
            Err(Error::new(
                StatusCode::BadCertificateInvalid,
                "Certificate byte string is null",
            ))
        } else {
            X509::from_der(data.as_ref())
        }
    }

    /// The certificate as a byte string for security headers and session messages.
    pub fn as_byte_string(&self) -> ByteString {
        ByteString::from(self.der.as_slice())
    }

    /// The raw DER bytes.
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// The SHA-1 thumbprint of the DER form.
    pub fn thumbprint(&self) -> Thumbprint {
        Thumbprint::new(&self.der)
    }

    /// The RSA public key of the certificate.
    pub fn public_key(&self) -> Result<PublicKey, Error> {
        let spki = &self.certificate.tbs_certificate.subject_public_key_info;
        if spki.algorithm.oid != RSA_ENCRYPTION {
            return Err(Error::new(
                StatusCode::BadCertificateInvalid,
                format!("Certificate public key algorithm {} is not RSA", spki.algorithm.oid),
            ));
        }
        let spki_der = spki.to_der().map_err(|e| {
            Error::new(StatusCode::BadCertificateInvalid, e.to_string())
        })?;
        use rsa::pkcs8::DecodePublicKey;
        rsa::RsaPublicKey::from_public_key_der(&spki_der)
            .map(PublicKey::from)
            .map_err(|e| Error::new(StatusCode::BadCertificateInvalid, e.to_string()))
    }

    /// Check the validity period against `now`.
    pub fn is_time_valid(&self, now: &DateTime) -> bool {
        let validity = &self.certificate.tbs_certificate.validity;
        let now = now.as_chrono();
        let not_before = chrono::DateTime::<chrono::Utc>::from(
            validity.not_before.to_system_time(),
        );
        let not_after =
            chrono::DateTime::<chrono::Utc>::from(validity.not_after.to_system_time());
        not_before <= now && now <= not_after
    }

    /// The subject name, for diagnostics.
    pub fn subject_name(&self) -> String {
        self.certificate.tbs_certificate.subject.to_string()
    }
}
