// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The [`BinaryEncodable`] / [`BinaryDecodable`] traits and helpers for reading and
//! writing the OPC UA binary wire format. All multi-byte primitives are little-endian.

use std::{
    error::Error as StdError,
    fmt::{Debug, Display},
    io::{Cursor, Read, Write},
    sync::atomic::{AtomicU64, Ordering},
};

use byteorder::{ByteOrder, LittleEndian};
use chrono::Duration;
use log::error;

use crate::{constants, status_code::StatusCode};

/// Result of an encoding or decoding operation.
pub type EncodingResult<T> = std::result::Result<T, Error>;

/// General protocol error: a status code plus a dynamic error source giving context,
/// and optionally the request id / request handle of the request it occurred in.
#[derive(Debug)]
pub struct Error {
    status: StatusCode,
    request_id: Option<u32>,
    request_handle: Option<u32>,
    context: Box<dyn StdError + Send + Sync>,
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.context)
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&*self.context)
    }
}

impl Error {
    /// Create a new error with the given `status` code and `context`.
    pub fn new(status: StatusCode, context: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            status,
            request_id: None,
            request_handle: None,
            context: context.into(),
        }
    }

    /// Create a new error with status code `BadDecodingError`.
    pub fn decoding(context: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::new(StatusCode::BadDecodingError, context)
    }

    /// Create a new error with status code `BadEncodingError`.
    pub fn encoding(context: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::new(StatusCode::BadEncodingError, context)
    }

    /// Attach request id and request handle to this error.
    pub fn with_context(mut self, request_id: Option<u32>, request_handle: Option<u32>) -> Self {
        self.request_id = request_id;
        self.request_handle = request_handle;
        self
    }

    /// Get the inner status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Request id and request handle, if both are known.
    pub fn full_context(&self) -> Option<(u32, u32)> {
        match (self.request_id, self.request_handle) {
            (Some(id), Some(handle)) => Some((id, handle)),
            _ => None,
        }
    }
}

impl From<Error> for StatusCode {
    fn from(value: Error) -> Self {
        error!("{}", value);
        value.status()
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::decoding(value)
    }
}

impl From<Error> for std::io::Error {
    fn from(value: Error) -> Self {
        std::io::Error::other(value)
    }
}

/// Guards recursive structures (Variant, ExtensionObject, DiagnosticInfo) against
/// malicious nesting. Holding a [`DepthLock`] counts one level; dropping it releases it.
#[derive(Debug)]
pub struct DepthGauge {
    max_depth: u64,
    current_depth: AtomicU64,
}

impl Clone for DepthGauge {
    fn clone(&self) -> Self {
        Self {
            max_depth: self.max_depth,
            current_depth: AtomicU64::new(0),
        }
    }
}

impl Default for DepthGauge {
    fn default() -> Self {
        Self::new(constants::MAX_DECODING_DEPTH)
    }
}

impl DepthGauge {
    /// Create a gauge with the given maximum depth.
    pub fn new(max_depth: u64) -> Self {
        Self {
            max_depth,
            current_depth: AtomicU64::new(0),
        }
    }

    /// Maximum depth of the gauge.
    pub fn max_depth(&self) -> u64 {
        self.max_depth
    }
}

/// Lease on a [`DepthGauge`]. The drop impl decrements the depth even on unwind.
#[derive(Debug)]
pub struct DepthLock<'a> {
    gauge: &'a DepthGauge,
}

impl Drop for DepthLock<'_> {
    fn drop(&mut self) {
        self.gauge.current_depth.fetch_sub(1, Ordering::Release);
    }
}

impl<'a> DepthLock<'a> {
    /// Increment the depth, failing if the maximum is exceeded.
    pub fn obtain(gauge: &'a DepthGauge) -> EncodingResult<DepthLock<'a>> {
        let val = gauge.current_depth.fetch_add(1, Ordering::Acquire);
        let lock = Self { gauge };
        if val >= gauge.max_depth {
            Err(Error::decoding(
                "Decoding aborted, maximum recursion depth reached",
            ))
        } else {
            Ok(lock)
        }
    }
}

/// Limits applied while decoding, negotiated between client and server.
#[derive(Clone, Debug)]
pub struct DecodingOptions {
    /// Time offset between the client and the server, applied to decoded timestamps
    /// when the client is configured to ignore clock skew.
    pub client_offset: Duration,
    /// Maximum size of a message in bytes. 0 means no limit.
    pub max_message_size: usize,
    /// Maximum number of chunks in a message. 0 means no limit.
    pub max_chunk_count: usize,
    /// Maximum length in bytes of a string.
    pub max_string_length: usize,
    /// Maximum length in bytes of a byte string.
    pub max_byte_string_length: usize,
    /// Maximum number of array elements.
    pub max_array_length: usize,
    /// Recursion guard for nested values.
    pub decoding_depth_gauge: DepthGauge,
}

impl Default for DecodingOptions {
    fn default() -> Self {
        DecodingOptions {
            client_offset: Duration::zero(),
            max_message_size: constants::MAX_MESSAGE_SIZE,
            max_chunk_count: constants::MAX_CHUNK_COUNT,
            max_string_length: constants::MAX_STRING_LENGTH,
            max_byte_string_length: constants::MAX_BYTE_STRING_LENGTH,
            max_array_length: constants::MAX_ARRAY_LENGTH,
            decoding_depth_gauge: DepthGauge::default(),
        }
    }
}

impl DecodingOptions {
    /// Restrictive options for decoding small payloads such as extension object
    /// bodies that are not expected to hold large values.
    pub fn minimal() -> Self {
        DecodingOptions {
            max_string_length: 8192,
            max_byte_string_length: 8192,
            max_array_length: 8192,
            ..Default::default()
        }
    }

    /// Obtain a depth lease, failing when max depth is exceeded.
    pub fn depth_lock(&self) -> EncodingResult<DepthLock<'_>> {
        DepthLock::obtain(&self.decoding_depth_gauge)
    }
}

/// OPC UA binary encoding. `byte_len` must return exactly the number of bytes
/// `encode` will write, so buffers can be allocated up front.
pub trait BinaryEncodable {
    /// Exact byte length of the encoded form.
    fn byte_len(&self) -> usize;

    /// Encode the instance to the write stream.
    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()>;

    /// Convenience for encoding straight into a vector. Prefer reusing buffers;
    /// this is for tests and trivial code.
    fn encode_to_vec(&self) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::with_capacity(self.byte_len()));
        let _ = self.encode(&mut buffer);
        buffer.into_inner()
    }
}

/// OPC UA binary decoding. Implementations must respect the limits in
/// [`DecodingOptions`] and fail with `BadDecodingError` as soon as one is exceeded.
pub trait BinaryDecodable: Sized {
    /// Decode an instance from the read stream.
    fn decode<S: Read + ?Sized>(stream: &mut S, options: &DecodingOptions)
        -> EncodingResult<Self>;
}

macro_rules! impl_fixed_size {
    ($t:ty, $len:expr, $write:ident, $read:ident) => {
        impl BinaryEncodable for $t {
            fn byte_len(&self) -> usize {
                $len
            }

            fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
                $write(stream, *self)
            }
        }

        impl BinaryDecodable for $t {
            fn decode<S: Read + ?Sized>(
                stream: &mut S,
                _: &DecodingOptions,
            ) -> EncodingResult<Self> {
                $read(stream)
            }
        }
    };
}

impl_fixed_size!(u8, 1, write_u8, read_u8);
impl_fixed_size!(i16, 2, write_i16, read_i16);
impl_fixed_size!(u16, 2, write_u16, read_u16);
impl_fixed_size!(i32, 4, write_i32, read_i32);
impl_fixed_size!(u32, 4, write_u32, read_u32);
impl_fixed_size!(i64, 8, write_i64, read_i64);
impl_fixed_size!(u64, 8, write_u64, read_u64);
impl_fixed_size!(f32, 4, write_f32, read_f32);
impl_fixed_size!(f64, 8, write_f64, read_f64);

impl BinaryEncodable for i8 {
    fn byte_len(&self) -> usize {
        1
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        write_u8(stream, *self as u8)
    }
}

impl BinaryDecodable for i8 {
    fn decode<S: Read + ?Sized>(stream: &mut S, _: &DecodingOptions) -> EncodingResult<Self> {
        Ok(read_u8(stream)? as i8)
    }
}

impl BinaryEncodable for bool {
    fn byte_len(&self) -> usize {
        1
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        write_u8(stream, u8::from(*self))
    }
}

impl BinaryDecodable for bool {
    fn decode<S: Read + ?Sized>(stream: &mut S, _: &DecodingOptions) -> EncodingResult<Self> {
        Ok(read_u8(stream)? == 1)
    }
}

/// Arrays are encoded as an `int32` element count, -1 for null, followed by the elements.
impl<T> BinaryEncodable for Option<Vec<T>>
where
    T: BinaryEncodable,
{
    fn byte_len(&self) -> usize {
        let mut size = 4;
        if let Some(values) = self {
            size += values.iter().map(|v| v.byte_len()).sum::<usize>();
        }
        size
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        if let Some(values) = self {
            write_i32(stream, values.len() as i32)?;
            for value in values {
                value.encode(stream)?;
            }
        } else {
            write_i32(stream, -1)?;
        }
        Ok(())
    }
}

impl<T> BinaryDecodable for Option<Vec<T>>
where
    T: BinaryDecodable,
{
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let len = read_i32(stream)?;
        if len == -1 {
            Ok(None)
        } else if len < -1 {
            Err(Error::decoding("Array length is an invalid negative value"))
        } else if len as usize > options.max_array_length {
            Err(Error::decoding(format!(
                "Array length {} exceeds decoding limit {}",
                len, options.max_array_length
            )))
        } else {
            let mut values: Vec<T> = Vec::with_capacity(len as usize);
            for _ in 0..len {
                values.push(T::decode(stream, options)?);
            }
            Ok(Some(values))
        }
    }
}

/// Write a run of identical bytes to the stream.
pub fn write_bytes<W: Write + ?Sized>(
    stream: &mut W,
    value: u8,
    count: usize,
) -> EncodingResult<usize> {
    for _ in 0..count {
        stream.write_all(&[value]).map_err(Error::encoding)?;
    }
    Ok(count)
}

macro_rules! write_le {
    ($name:ident, $t:ty, $len:expr, $f:ident) => {
        #[doc = concat!("Write a `", stringify!($t), "` to the stream.")]
        pub fn $name<W: Write + ?Sized>(stream: &mut W, value: $t) -> EncodingResult<()> {
            let mut buf = [0u8; $len];
            LittleEndian::$f(&mut buf, value);
            stream.write_all(&buf).map_err(Error::encoding)
        }
    };
}

macro_rules! read_le {
    ($name:ident, $t:ty, $len:expr, $f:ident) => {
        #[doc = concat!("Read a `", stringify!($t), "` from the stream.")]
        pub fn $name<R: Read + ?Sized>(stream: &mut R) -> EncodingResult<$t> {
            let mut buf = [0u8; $len];
            stream.read_exact(&mut buf).map_err(Error::decoding)?;
            Ok(LittleEndian::$f(&buf))
        }
    };
}

/// Write an unsigned byte to the stream.
pub fn write_u8<W: Write + ?Sized>(stream: &mut W, value: u8) -> EncodingResult<()> {
    stream.write_all(&[value]).map_err(Error::encoding)
}

/// Read an unsigned byte from the stream.
pub fn read_u8<R: Read + ?Sized>(stream: &mut R) -> EncodingResult<u8> {
    let mut buf = [0u8];
    stream.read_exact(&mut buf).map_err(Error::decoding)?;
    Ok(buf[0])
}

write_le!(write_i16, i16, 2, write_i16);
write_le!(write_u16, u16, 2, write_u16);
write_le!(write_i32, i32, 4, write_i32);
write_le!(write_u32, u32, 4, write_u32);
write_le!(write_i64, i64, 8, write_i64);
write_le!(write_u64, u64, 8, write_u64);
write_le!(write_f32, f32, 4, write_f32);
write_le!(write_f64, f64, 8, write_f64);

read_le!(read_i16, i16, 2, read_i16);
read_le!(read_u16, u16, 2, read_u16);
read_le!(read_i32, i32, 4, read_i32);
read_le!(read_u32, u32, 4, read_u32);
read_le!(read_i64, i64, 8, read_i64);
read_le!(read_u64, u64, 8, read_u64);
read_le!(read_f32, f32, 4, read_f32);
read_le!(read_f64, f64, 8, read_f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_are_little_endian() {
        assert_eq!(0x12345678u32.encode_to_vec(), vec![0x78, 0x56, 0x34, 0x12]);
        assert_eq!((-2i32).encode_to_vec(), vec![0xFE, 0xFF, 0xFF, 0xFF]);
        assert_eq!(1.0f64.encode_to_vec()[7], 0x3F);
    }

    #[test]
    fn array_null_and_empty_are_distinct() {
        let null: Option<Vec<u32>> = None;
        let empty: Option<Vec<u32>> = Some(vec![]);
        assert_eq!(null.encode_to_vec(), vec![0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(empty.encode_to_vec(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn array_length_limit_is_enforced() {
        let v: Option<Vec<u32>> = Some((0..100).collect());
        let encoded = v.encode_to_vec();
        let options = DecodingOptions {
            max_array_length: 99,
            ..Default::default()
        };
        let mut stream = Cursor::new(encoded);
        let err = Option::<Vec<u32>>::decode(&mut stream, &options).unwrap_err();
        assert_eq!(err.status(), StatusCode::BadDecodingError);
    }

    #[test]
    fn depth_gauge_limits_recursion() {
        let gauge = DepthGauge::new(2);
        let l1 = DepthLock::obtain(&gauge).unwrap();
        let _l2 = DepthLock::obtain(&gauge).unwrap();
        assert!(DepthLock::obtain(&gauge).is_err());
        drop(l1);
        // Releasing one level makes room again
        assert!(DepthLock::obtain(&gauge).is_ok());
    }
}
