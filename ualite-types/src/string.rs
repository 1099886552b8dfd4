// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The OPC UA String type. Named `UaString` so it does not collide with `std::string::String`.

use std::{
    fmt,
    io::{Read, Write},
};

use crate::encoding::{
    read_i32, write_i32, BinaryDecodable, BinaryEncodable, DecodingOptions, EncodingResult, Error,
};

/// An XML element. Without an XML encoder these are carried opaquely as strings.
pub type XmlElement = UaString;

/// A string of UTF-8 characters or a null value. Null is distinct from empty, so the
/// value is held as an `Option<String>`.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Default)]
pub struct UaString {
    value: Option<String>,
}

impl fmt::Display for UaString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}", value),
            None => write!(f, "[null]"),
        }
    }
}

impl BinaryEncodable for UaString {
    fn byte_len(&self) -> usize {
        4 + self.value.as_ref().map(|s| s.len()).unwrap_or(0)
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        // UTF-8 bytes preceded by an int32 length, -1 for null
        match &self.value {
            Some(s) => {
                write_i32(stream, s.len() as i32)?;
                stream.write_all(s.as_bytes()).map_err(Error::encoding)
            }
            None => write_i32(stream, -1),
        }
    }
}

impl BinaryDecodable for UaString {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let len = read_i32(stream)?;
        if len == -1 {
            Ok(UaString::null())
        } else if len < -1 {
            Err(Error::decoding(format!(
                "String length is a negative number {}",
                len
            )))
        } else if len as usize > options.max_string_length {
            Err(Error::decoding(format!(
                "String length {} exceeds decoding limit {}",
                len, options.max_string_length
            )))
        } else {
            let mut buf = vec![0u8; len as usize];
            stream.read_exact(&mut buf).map_err(Error::decoding)?;
            let value = String::from_utf8(buf)
                .map_err(|err| Error::decoding(format!("String is not valid UTF-8, {}", err)))?;
            Ok(UaString::from(value))
        }
    }
}

impl From<&str> for UaString {
    fn from(value: &str) -> Self {
        Self {
            value: Some(value.to_string()),
        }
    }
}

impl From<&String> for UaString {
    fn from(value: &String) -> Self {
        Self {
            value: Some(value.clone()),
        }
    }
}

impl From<String> for UaString {
    fn from(value: String) -> Self {
        Self { value: Some(value) }
    }
}

impl From<Option<String>> for UaString {
    fn from(value: Option<String>) -> Self {
        Self { value }
    }
}

impl AsRef<str> for UaString {
    fn as_ref(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }
}

impl UaString {
    /// The string value, or `None` for null.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Returns `true` for the null string.
    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// Returns `true` for null or empty strings.
    pub fn is_empty(&self) -> bool {
        self.value.as_ref().map(|v| v.is_empty()).unwrap_or(true)
    }

    /// Length in bytes (not characters). A null string has length 0.
    pub fn len(&self) -> usize {
        self.value.as_ref().map(|v| v.len()).unwrap_or(0)
    }

    /// The null string.
    pub fn null() -> UaString {
        UaString { value: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn wire_format() {
        assert_eq!(UaString::null().encode_to_vec(), vec![0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(UaString::from("").encode_to_vec(), vec![0, 0, 0, 0]);
        assert_eq!(
            UaString::from("ab").encode_to_vec(),
            vec![2, 0, 0, 0, b'a', b'b']
        );
    }

    #[test]
    fn round_trip_preserves_null() {
        for s in [UaString::null(), UaString::from(""), UaString::from("héllo")] {
            let mut stream = Cursor::new(s.encode_to_vec());
            let decoded = UaString::decode(&mut stream, &DecodingOptions::default()).unwrap();
            assert_eq!(decoded, s);
        }
    }

    #[test]
    fn rejects_invalid_utf8() {
        let mut stream = Cursor::new(vec![2u8, 0, 0, 0, 0xC3, 0x28]);
        assert!(UaString::decode(&mut stream, &DecodingOptions::default()).is_err());
    }
}
