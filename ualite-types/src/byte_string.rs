// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The ByteString type, an arbitrary run of bytes or a null value.

use std::io::{Read, Write};

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::encoding::{
    read_i32, write_i32, BinaryDecodable, BinaryEncodable, DecodingOptions, EncodingResult, Error,
};

/// A sequence of octets or a null value. Like strings, null and empty are distinct.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Default)]
pub struct ByteString {
    /// The raw bytes, `None` for null.
    pub value: Option<Vec<u8>>,
}

impl BinaryEncodable for ByteString {
    fn byte_len(&self) -> usize {
        4 + self.value.as_ref().map(|b| b.len()).unwrap_or(0)
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        match &self.value {
            Some(b) => {
                write_i32(stream, b.len() as i32)?;
                stream.write_all(b).map_err(Error::encoding)
            }
            None => write_i32(stream, -1),
        }
    }
}

impl BinaryDecodable for ByteString {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let len = read_i32(stream)?;
        if len == -1 {
            Ok(ByteString::null())
        } else if len < -1 {
            Err(Error::decoding(format!(
                "ByteString length is a negative number {}",
                len
            )))
        } else if len as usize > options.max_byte_string_length {
            Err(Error::decoding(format!(
                "ByteString length {} exceeds decoding limit {}",
                len, options.max_byte_string_length
            )))
        } else {
            let mut value = vec![0u8; len as usize];
            stream.read_exact(&mut value).map_err(Error::decoding)?;
            Ok(ByteString { value: Some(value) })
        }
    }
}

impl AsRef<[u8]> for ByteString {
    fn as_ref(&self) -> &[u8] {
        self.value.as_deref().unwrap_or(&[])
    }
}

impl From<&[u8]> for ByteString {
    fn from(value: &[u8]) -> Self {
        ByteString {
            value: Some(value.to_vec()),
        }
    }
}

impl From<Vec<u8>> for ByteString {
    fn from(value: Vec<u8>) -> Self {
        ByteString { value: Some(value) }
    }
}

impl From<&Vec<u8>> for ByteString {
    fn from(value: &Vec<u8>) -> Self {
        ByteString {
            value: Some(value.clone()),
        }
    }
}

impl<const N: usize> From<[u8; N]> for ByteString {
    fn from(value: [u8; N]) -> Self {
        ByteString {
            value: Some(value.to_vec()),
        }
    }
}

impl ByteString {
    /// The null byte string.
    pub fn null() -> ByteString {
        ByteString { value: None }
    }

    /// Returns `true` for the null byte string.
    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// Returns `true` for null or empty byte strings.
    pub fn is_empty(&self) -> bool {
        self.value.as_ref().map(|v| v.is_empty()).unwrap_or(true)
    }

    /// Length in bytes. A null byte string has length 0.
    pub fn len(&self) -> usize {
        self.value.as_ref().map(|v| v.len()).unwrap_or(0)
    }

    /// Copy the content to a vector, empty for null.
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_ref().to_vec()
    }

    /// Base64 representation, used for display of opaque identifiers.
    pub fn as_base64(&self) -> String {
        STANDARD.encode(self.as_ref())
    }

    /// Parse from base64.
    pub fn from_base64(data: &str) -> Option<ByteString> {
        STANDARD.decode(data).map(ByteString::from).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trip() {
        for b in [
            ByteString::null(),
            ByteString::from(vec![]),
            ByteString::from(vec![1, 2, 3]),
        ] {
            let mut stream = Cursor::new(b.encode_to_vec());
            let decoded = ByteString::decode(&mut stream, &DecodingOptions::default()).unwrap();
            assert_eq!(decoded, b);
        }
    }

    #[test]
    fn base64_round_trip() {
        let b = ByteString::from(vec![0, 1, 254, 255]);
        assert_eq!(ByteString::from_base64(&b.as_base64()), Some(b));
    }
}
