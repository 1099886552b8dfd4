// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The certificate store boundary. The core only needs trust decisions and access
//! to its own certificate and key; where certificates come from (files, OS stores,
//! provisioning) is the caller's concern.

use ualite_types::{DateTime, StatusCode};

use crate::{pkey::PrivateKey, x509::X509};

/// Supplies the application's own certificate and decides whether to trust peers.
pub trait CertificateStore: Send + Sync {
    /// The application instance certificate, if one is configured.
    fn own_certificate(&self) -> Option<&X509>;

    /// The private key matching the application certificate.
    fn own_private_key(&self) -> Option<&PrivateKey>;

    /// Decide whether the peer certificate is trusted. `Good` accepts the peer;
    /// any bad code rejects the connection with that code.
    fn validate(&self, certificate: &X509) -> StatusCode;
}

/// A store holding everything in memory. Trusts either everything (for tests and
/// commissioning) or an explicit list of peer thumbprints, and always checks
/// validity periods.
pub struct MemoryCertificateStore {
    own_certificate: Option<X509>,
    own_private_key: Option<PrivateKey>,
    trust_any: bool,
    trusted_thumbprints: Vec<Vec<u8>>,
}

impl MemoryCertificateStore {
    /// Create a store. With `trust_any` set, any time-valid peer certificate is
    /// accepted.
    pub fn new(
        own_certificate: Option<X509>,
        own_private_key: Option<PrivateKey>,
        trust_any: bool,
    ) -> Self {
        MemoryCertificateStore {
            own_certificate,
            own_private_key,
            trust_any,
            trusted_thumbprints: Vec::new(),
        }
    }

    /// An empty, trust-everything store for SecurityPolicy::None connections.
    pub fn insecure() -> Self {
        Self::new(None, None, true)
    }

    /// Add a peer thumbprint to the trust list.
    pub fn trust_thumbprint(&mut self, thumbprint: &[u8]) {
        self.trusted_thumbprints.push(thumbprint.to_vec());
    }
}

impl CertificateStore for MemoryCertificateStore {
    fn own_certificate(&self) -> Option<&X509> {
        self.own_certificate.as_ref()
    }

    fn own_private_key(&self) -> Option<&PrivateKey> {
        self.own_private_key.as_ref()
    }

    fn validate(&self, certificate: &X509) -> StatusCode {
        if !certificate.is_time_valid(&DateTime::now()) {
            return StatusCode::BadCertificateTimeInvalid;
        }
        if self.trust_any {
            return StatusCode::Good;
        }
        let thumbprint = certificate.thumbprint();
        if self
            .trusted_thumbprints
            .iter()
            .any(|t| t.as_slice() == thumbprint.value())
        {
            StatusCode::Good
        } else {
            StatusCode::BadCertificateUntrusted
        }
    }
}
