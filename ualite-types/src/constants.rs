// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Default protocol limits.

/// Default maximum size in bytes of a whole message. 0 would mean no limit.
pub const MAX_MESSAGE_SIZE: usize = 2 * 1024 * 1024;
/// Default maximum number of chunks in a message.
pub const MAX_CHUNK_COUNT: usize = 64;
/// Default maximum length in bytes of a string.
pub const MAX_STRING_LENGTH: usize = 65535;
/// Default maximum length in bytes of a byte string.
pub const MAX_BYTE_STRING_LENGTH: usize = 65535;
/// Default maximum number of array elements.
pub const MAX_ARRAY_LENGTH: usize = 65535;
/// Default maximum recursion depth when decoding nested values.
pub const MAX_DECODING_DEPTH: u64 = 100;
/// Maximum accepted certificate size in bytes.
pub const MAX_CERTIFICATE_LENGTH: usize = 32768;
