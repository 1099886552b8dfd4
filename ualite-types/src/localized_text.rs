// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The LocalizedText type, human readable text with an optional locale.

use std::{
    fmt,
    io::{Read, Write},
};

use crate::{
    encoding::{
        read_u8, write_u8, BinaryDecodable, BinaryEncodable, DecodingOptions, EncodingResult,
    },
    string::UaString,
};

const HAS_LOCALE: u8 = 0x1;
const HAS_TEXT: u8 = 0x2;

/// Human readable text with an optional locale identifier. Each field is only
/// present on the wire if its encoding mask bit is set.
#[derive(PartialEq, Eq, Debug, Clone, Hash, Default)]
pub struct LocalizedText {
    /// The locale, e.g. "en-GB".
    pub locale: UaString,
    /// The text in that locale.
    pub text: UaString,
}

impl fmt::Display for LocalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}

impl BinaryEncodable for LocalizedText {
    fn byte_len(&self) -> usize {
        let mut size = 1;
        if !self.locale.is_null() {
            size += self.locale.byte_len();
        }
        if !self.text.is_null() {
            size += self.text.byte_len();
        }
        size
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        let mut mask = 0u8;
        if !self.locale.is_null() {
            mask |= HAS_LOCALE;
        }
        if !self.text.is_null() {
            mask |= HAS_TEXT;
        }
        write_u8(stream, mask)?;
        if !self.locale.is_null() {
            self.locale.encode(stream)?;
        }
        if !self.text.is_null() {
            self.text.encode(stream)?;
        }
        Ok(())
    }
}

impl BinaryDecodable for LocalizedText {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let mask = read_u8(stream)?;
        let locale = if mask & HAS_LOCALE != 0 {
            UaString::decode(stream, options)?
        } else {
            UaString::null()
        };
        let text = if mask & HAS_TEXT != 0 {
            UaString::decode(stream, options)?
        } else {
            UaString::null()
        };
        Ok(LocalizedText { locale, text })
    }
}

impl From<&str> for LocalizedText {
    fn from(value: &str) -> Self {
        LocalizedText {
            locale: UaString::null(),
            text: UaString::from(value),
        }
    }
}

impl LocalizedText {
    /// Construct a new localized text.
    pub fn new(locale: &str, text: &str) -> LocalizedText {
        LocalizedText {
            locale: UaString::from(locale),
            text: UaString::from(text),
        }
    }

    /// The null localized text.
    pub fn null() -> LocalizedText {
        LocalizedText {
            locale: UaString::null(),
            text: UaString::null(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn mask_skips_absent_fields() {
        assert_eq!(LocalizedText::null().encode_to_vec(), vec![0]);
        let text = LocalizedText::from("hi");
        assert_eq!(text.encode_to_vec()[0], HAS_TEXT);
        let both = LocalizedText::new("en", "hi");
        assert_eq!(both.encode_to_vec()[0], HAS_LOCALE | HAS_TEXT);
    }

    #[test]
    fn round_trip() {
        for v in [
            LocalizedText::null(),
            LocalizedText::from("hello"),
            LocalizedText::new("de", "hallo"),
        ] {
            let mut stream = Cursor::new(v.encode_to_vec());
            assert_eq!(
                LocalizedText::decode(&mut stream, &DecodingOptions::default()).unwrap(),
                v
            );
        }
    }
}
