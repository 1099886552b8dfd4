// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Cryptography for the OPC UA secure channel: security policies, key derivation,
//! symmetric and asymmetric primitives, X.509 handling and the certificate store
//! boundary.

#![warn(missing_docs)]

pub mod aeskey;
pub mod certificate_store;
pub mod hash;
pub mod pkey;
pub mod random;
pub mod security_policy;
pub mod user_identity;
pub mod x509;

pub use aeskey::AesKey;
pub use certificate_store::{CertificateStore, MemoryCertificateStore};
pub use pkey::{KeySize, PrivateKey, PublicKey, RsaPadding, RsaSignature};
pub use security_policy::{SecureChannelKeys, SecurityPolicy};
pub use x509::{Thumbprint, X509};
