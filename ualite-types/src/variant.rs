// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The Variant type, a tagged union over every built-in type, scalar or array.

use std::io::{Read, Write};

use crate::{
    byte_string::ByteString,
    data_value::DataValue,
    date_time::DateTime,
    diagnostic_info::DiagnosticInfo,
    encoding::{
        read_i32, read_u8, write_i32, write_u8, BinaryDecodable, BinaryEncodable, DecodingOptions,
        EncodingResult, Error,
    },
    expanded_node_id::ExpandedNodeId,
    extension_object::ExtensionObject,
    guid::Guid,
    localized_text::LocalizedText,
    node_id::NodeId,
    qualified_name::QualifiedName,
    status_code::StatusCode,
    string::{UaString, XmlElement},
};

// Variant encoding mask. The low six bits hold the built-in type id, bit 7 marks
// an array of values, bit 6 marks a dimensions array following the values.
const ARRAY_VALUES_BIT: u8 = 0x80;
const ARRAY_DIMENSIONS_BIT: u8 = 0x40;

/// The built-in type id of a variant value, as used in the encoding mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VariantTypeId {
    /// Boolean
    Boolean = 1,
    /// Signed byte
    SByte = 2,
    /// Unsigned byte
    Byte = 3,
    /// Signed 16-bit integer
    Int16 = 4,
    /// Unsigned 16-bit integer
    UInt16 = 5,
    /// Signed 32-bit integer
    Int32 = 6,
    /// Unsigned 32-bit integer
    UInt32 = 7,
    /// Signed 64-bit integer
    Int64 = 8,
    /// Unsigned 64-bit integer
    UInt64 = 9,
    /// IEEE-754 single precision
    Float = 10,
    /// IEEE-754 double precision
    Double = 11,
    /// UTF-8 string
    String = 12,
    /// Timestamp
    DateTime = 13,
    /// 16 byte GUID
    Guid = 14,
    /// Byte string
    ByteString = 15,
    /// XML element, carried as a string
    XmlElement = 16,
    /// Node id
    NodeId = 17,
    /// Expanded node id
    ExpandedNodeId = 18,
    /// Status code
    StatusCode = 19,
    /// Qualified name
    QualifiedName = 20,
    /// Localized text
    LocalizedText = 21,
    /// Extension object
    ExtensionObject = 22,
    /// Data value
    DataValue = 23,
    /// Nested variant
    Variant = 24,
    /// Diagnostic info
    DiagnosticInfo = 25,
}

impl TryFrom<u8> for VariantTypeId {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use VariantTypeId::*;
        Ok(match value {
            1 => Boolean,
            2 => SByte,
            3 => Byte,
            4 => Int16,
            5 => UInt16,
            6 => Int32,
            7 => UInt32,
            8 => Int64,
            9 => UInt64,
            10 => Float,
            11 => Double,
            12 => String,
            13 => DateTime,
            14 => Guid,
            15 => ByteString,
            16 => XmlElement,
            17 => NodeId,
            18 => ExpandedNodeId,
            19 => StatusCode,
            20 => QualifiedName,
            21 => LocalizedText,
            22 => ExtensionObject,
            23 => DataValue,
            24 => Variant,
            25 => DiagnosticInfo,
            _ => {
                return Err(Error::decoding(format!(
                    "Unrecognized variant type id {}",
                    value
                )))
            }
        })
    }
}

/// A value of any built-in type, or an array of such values.
#[derive(PartialEq, Debug, Clone, Default)]
pub enum Variant {
    /// An empty variant, carrying no value.
    #[default]
    Empty,
    /// Boolean
    Boolean(bool),
    /// Signed byte
    SByte(i8),
    /// Unsigned byte
    Byte(u8),
    /// Signed 16-bit integer
    Int16(i16),
    /// Unsigned 16-bit integer
    UInt16(u16),
    /// Signed 32-bit integer
    Int32(i32),
    /// Unsigned 32-bit integer
    UInt32(u32),
    /// Signed 64-bit integer
    Int64(i64),
    /// Unsigned 64-bit integer
    UInt64(u64),
    /// IEEE-754 single precision
    Float(f32),
    /// IEEE-754 double precision
    Double(f64),
    /// UTF-8 string or null
    String(UaString),
    /// Timestamp
    DateTime(DateTime),
    /// 16 byte GUID
    Guid(Guid),
    /// Byte string
    ByteString(ByteString),
    /// XML element, carried as a string
    XmlElement(XmlElement),
    /// Node id
    NodeId(Box<NodeId>),
    /// Expanded node id
    ExpandedNodeId(Box<ExpandedNodeId>),
    /// Status code
    StatusCode(StatusCode),
    /// Qualified name
    QualifiedName(Box<QualifiedName>),
    /// Localized text
    LocalizedText(Box<LocalizedText>),
    /// Extension object
    ExtensionObject(Box<ExtensionObject>),
    /// Data value
    DataValue(Box<DataValue>),
    /// Nested variant
    Variant(Box<Variant>),
    /// Diagnostic info
    DiagnosticInfo(Box<DiagnosticInfo>),
    /// A single or multi dimensional array of values.
    Array(Box<Array>),
}

/// An array of variant values with optional dimensions for the multi-dimensional case.
#[derive(PartialEq, Debug, Clone)]
pub struct Array {
    /// The element type. All values must be scalars of this type.
    pub value_type: VariantTypeId,
    /// The values, flattened in row-major order.
    pub values: Vec<Variant>,
    /// Dimensions of a multi-dimensional array. `None` for one dimension.
    pub dimensions: Option<Vec<u32>>,
}

impl Array {
    /// Create a single dimension array, verifying element types.
    pub fn new(
        value_type: VariantTypeId,
        values: impl Into<Vec<Variant>>,
    ) -> EncodingResult<Array> {
        let values = values.into();
        Self::validate(value_type, &values, None)?;
        Ok(Array {
            value_type,
            values,
            dimensions: None,
        })
    }

    /// Create a multi dimensional array. The dimension product must equal the
    /// number of values.
    pub fn new_multi(
        value_type: VariantTypeId,
        values: impl Into<Vec<Variant>>,
        dimensions: Vec<u32>,
    ) -> EncodingResult<Array> {
        let values = values.into();
        Self::validate(value_type, &values, Some(&dimensions))?;
        Ok(Array {
            value_type,
            values,
            dimensions: Some(dimensions),
        })
    }

    fn validate(
        value_type: VariantTypeId,
        values: &[Variant],
        dimensions: Option<&Vec<u32>>,
    ) -> EncodingResult<()> {
        if values
            .iter()
            .any(|v| v.scalar_type_id() != Some(value_type))
        {
            return Err(Error::encoding(
                "Array values must all be scalars of the declared type",
            ));
        }
        if let Some(dimensions) = dimensions {
            let expected: usize = dimensions.iter().map(|d| *d as usize).product();
            if expected != values.len() {
                return Err(Error::encoding(format!(
                    "Array dimensions imply {} values but there are {}",
                    expected,
                    values.len()
                )));
            }
        }
        Ok(())
    }
}

macro_rules! from_scalar {
    ($($t:ty => $v:ident),+ $(,)?) => {
        $(
            impl From<$t> for Variant {
                fn from(value: $t) -> Self {
                    Variant::$v(value)
                }
            }
        )+
    };
}

from_scalar! {
    bool => Boolean,
    i8 => SByte,
    u8 => Byte,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float,
    f64 => Double,
    UaString => String,
    DateTime => DateTime,
    Guid => Guid,
    ByteString => ByteString,
    StatusCode => StatusCode,
}

impl From<&str> for Variant {
    fn from(value: &str) -> Self {
        Variant::String(UaString::from(value))
    }
}

impl From<String> for Variant {
    fn from(value: String) -> Self {
        Variant::String(UaString::from(value))
    }
}

impl From<NodeId> for Variant {
    fn from(value: NodeId) -> Self {
        Variant::NodeId(Box::new(value))
    }
}

impl From<LocalizedText> for Variant {
    fn from(value: LocalizedText) -> Self {
        Variant::LocalizedText(Box::new(value))
    }
}

impl From<QualifiedName> for Variant {
    fn from(value: QualifiedName) -> Self {
        Variant::QualifiedName(Box::new(value))
    }
}

impl From<ExtensionObject> for Variant {
    fn from(value: ExtensionObject) -> Self {
        Variant::ExtensionObject(Box::new(value))
    }
}

impl Variant {
    /// The type id of a scalar value, `None` for Empty and Array.
    pub fn scalar_type_id(&self) -> Option<VariantTypeId> {
        use VariantTypeId as T;
        Some(match self {
            Variant::Empty | Variant::Array(_) => return None,
            Variant::Boolean(_) => T::Boolean,
            Variant::SByte(_) => T::SByte,
            Variant::Byte(_) => T::Byte,
            Variant::Int16(_) => T::Int16,
            Variant::UInt16(_) => T::UInt16,
            Variant::Int32(_) => T::Int32,
            Variant::UInt32(_) => T::UInt32,
            Variant::Int64(_) => T::Int64,
            Variant::UInt64(_) => T::UInt64,
            Variant::Float(_) => T::Float,
            Variant::Double(_) => T::Double,
            Variant::String(_) => T::String,
            Variant::DateTime(_) => T::DateTime,
            Variant::Guid(_) => T::Guid,
            Variant::ByteString(_) => T::ByteString,
            Variant::XmlElement(_) => T::XmlElement,
            Variant::NodeId(_) => T::NodeId,
            Variant::ExpandedNodeId(_) => T::ExpandedNodeId,
            Variant::StatusCode(_) => T::StatusCode,
            Variant::QualifiedName(_) => T::QualifiedName,
            Variant::LocalizedText(_) => T::LocalizedText,
            Variant::ExtensionObject(_) => T::ExtensionObject,
            Variant::DataValue(_) => T::DataValue,
            Variant::Variant(_) => T::Variant,
            Variant::DiagnosticInfo(_) => T::DiagnosticInfo,
        })
    }

    /// Returns `true` for the empty variant.
    pub fn is_empty(&self) -> bool {
        matches!(self, Variant::Empty)
    }

    /// The value as a `u32`, converting from any unsigned integer type that fits.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Variant::Byte(v) => Some(*v as u32),
            Variant::UInt16(v) => Some(*v as u32),
            Variant::UInt32(v) => Some(*v),
            Variant::Int32(v) if *v >= 0 => Some(*v as u32),
            _ => None,
        }
    }

    fn byte_len_scalar(&self) -> usize {
        match self {
            Variant::Empty => 0,
            Variant::Boolean(v) => v.byte_len(),
            Variant::SByte(v) => v.byte_len(),
            Variant::Byte(v) => v.byte_len(),
            Variant::Int16(v) => v.byte_len(),
            Variant::UInt16(v) => v.byte_len(),
            Variant::Int32(v) => v.byte_len(),
            Variant::UInt32(v) => v.byte_len(),
            Variant::Int64(v) => v.byte_len(),
            Variant::UInt64(v) => v.byte_len(),
            Variant::Float(v) => v.byte_len(),
            Variant::Double(v) => v.byte_len(),
            Variant::String(v) => v.byte_len(),
            Variant::DateTime(v) => v.byte_len(),
            Variant::Guid(v) => v.byte_len(),
            Variant::ByteString(v) => v.byte_len(),
            Variant::XmlElement(v) => v.byte_len(),
            Variant::NodeId(v) => v.byte_len(),
            Variant::ExpandedNodeId(v) => v.byte_len(),
            Variant::StatusCode(v) => v.byte_len(),
            Variant::QualifiedName(v) => v.byte_len(),
            Variant::LocalizedText(v) => v.byte_len(),
            Variant::ExtensionObject(v) => v.byte_len(),
            Variant::DataValue(v) => v.byte_len(),
            Variant::Variant(v) => v.byte_len(),
            Variant::DiagnosticInfo(v) => v.byte_len(),
            Variant::Array(_) => 0,
        }
    }

    fn encode_scalar<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        match self {
            Variant::Empty | Variant::Array(_) => Ok(()),
            Variant::Boolean(v) => v.encode(stream),
            Variant::SByte(v) => v.encode(stream),
            Variant::Byte(v) => v.encode(stream),
            Variant::Int16(v) => v.encode(stream),
            Variant::UInt16(v) => v.encode(stream),
            Variant::Int32(v) => v.encode(stream),
            Variant::UInt32(v) => v.encode(stream),
            Variant::Int64(v) => v.encode(stream),
            Variant::UInt64(v) => v.encode(stream),
            Variant::Float(v) => v.encode(stream),
            Variant::Double(v) => v.encode(stream),
            Variant::String(v) => v.encode(stream),
            Variant::DateTime(v) => v.encode(stream),
            Variant::Guid(v) => v.encode(stream),
            Variant::ByteString(v) => v.encode(stream),
            Variant::XmlElement(v) => v.encode(stream),
            Variant::NodeId(v) => v.encode(stream),
            Variant::ExpandedNodeId(v) => v.encode(stream),
            Variant::StatusCode(v) => v.encode(stream),
            Variant::QualifiedName(v) => v.encode(stream),
            Variant::LocalizedText(v) => v.encode(stream),
            Variant::ExtensionObject(v) => v.encode(stream),
            Variant::DataValue(v) => v.encode(stream),
            Variant::Variant(v) => v.encode(stream),
            Variant::DiagnosticInfo(v) => v.encode(stream),
        }
    }

    fn decode_scalar<S: Read + ?Sized>(
        type_id: VariantTypeId,
        stream: &mut S,
        options: &DecodingOptions,
    ) -> EncodingResult<Variant> {
        use VariantTypeId as T;
        Ok(match type_id {
            T::Boolean => Variant::Boolean(bool::decode(stream, options)?),
            T::SByte => Variant::SByte(i8::decode(stream, options)?),
            T::Byte => Variant::Byte(u8::decode(stream, options)?),
            T::Int16 => Variant::Int16(i16::decode(stream, options)?),
            T::UInt16 => Variant::UInt16(u16::decode(stream, options)?),
            T::Int32 => Variant::Int32(i32::decode(stream, options)?),
            T::UInt32 => Variant::UInt32(u32::decode(stream, options)?),
            T::Int64 => Variant::Int64(i64::decode(stream, options)?),
            T::UInt64 => Variant::UInt64(u64::decode(stream, options)?),
            T::Float => Variant::Float(f32::decode(stream, options)?),
            T::Double => Variant::Double(f64::decode(stream, options)?),
            T::String => Variant::String(UaString::decode(stream, options)?),
            T::DateTime => Variant::DateTime(DateTime::decode(stream, options)?),
            T::Guid => Variant::Guid(Guid::decode(stream, options)?),
            T::ByteString => Variant::ByteString(ByteString::decode(stream, options)?),
            T::XmlElement => Variant::XmlElement(XmlElement::decode(stream, options)?),
            T::NodeId => Variant::NodeId(Box::new(NodeId::decode(stream, options)?)),
            T::ExpandedNodeId => {
                Variant::ExpandedNodeId(Box::new(ExpandedNodeId::decode(stream, options)?))
            }
            T::StatusCode => Variant::StatusCode(StatusCode::decode(stream, options)?),
            T::QualifiedName => {
                Variant::QualifiedName(Box::new(QualifiedName::decode(stream, options)?))
            }
            T::LocalizedText => {
                Variant::LocalizedText(Box::new(LocalizedText::decode(stream, options)?))
            }
            T::ExtensionObject => {
                Variant::ExtensionObject(Box::new(ExtensionObject::decode(stream, options)?))
            }
            T::DataValue => Variant::DataValue(Box::new(DataValue::decode(stream, options)?)),
            T::Variant => Variant::Variant(Box::new(Variant::decode(stream, options)?)),
            T::DiagnosticInfo => {
                Variant::DiagnosticInfo(Box::new(DiagnosticInfo::decode(stream, options)?))
            }
        })
    }
}

impl BinaryEncodable for Variant {
    fn byte_len(&self) -> usize {
        let mut size = 1;
        match self {
            Variant::Array(array) => {
                size += 4;
                size += array
                    .values
                    .iter()
                    .map(|v| v.byte_len_scalar())
                    .sum::<usize>();
                if let Some(dimensions) = &array.dimensions {
                    size += 4 + dimensions.len() * 4;
                }
            }
            other => size += other.byte_len_scalar(),
        }
        size
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        match self {
            Variant::Empty => write_u8(stream, 0),
            Variant::Array(array) => {
                let mut mask = array.value_type as u8 | ARRAY_VALUES_BIT;
                if array.dimensions.is_some() {
                    mask |= ARRAY_DIMENSIONS_BIT;
                }
                write_u8(stream, mask)?;
                write_i32(stream, array.values.len() as i32)?;
                for value in &array.values {
                    value.encode_scalar(stream)?;
                }
                if let Some(dimensions) = &array.dimensions {
                    write_i32(stream, dimensions.len() as i32)?;
                    for dimension in dimensions {
                        dimension.encode(stream)?;
                    }
                }
                Ok(())
            }
            scalar => {
                // scalar_type_id is always Some for non-empty scalars
                let type_id = scalar.scalar_type_id().expect("scalar variant");
                write_u8(stream, type_id as u8)?;
                scalar.encode_scalar(stream)
            }
        }
    }
}

impl BinaryDecodable for Variant {
    fn decode<S: Read + ?Sized>(
        stream: &mut S,
        options: &DecodingOptions,
    ) -> EncodingResult<Self> {
        let _depth_lock = options.depth_lock()?;
        let encoding_mask = read_u8(stream)?;
        if encoding_mask == 0 {
            return Ok(Variant::Empty);
        }
        let type_id = VariantTypeId::try_from(encoding_mask & 0x3F)?;
        if encoding_mask & ARRAY_VALUES_BIT != 0 {
            let len = read_i32(stream)?;
            if len < -1 {
                return Err(Error::decoding("Variant array length is negative"));
            }
            if len as usize > options.max_array_length {
                return Err(Error::decoding(format!(
                    "Variant array length {} exceeds decoding limit {}",
                    len, options.max_array_length
                )));
            }
            let mut values = Vec::with_capacity(len.max(0) as usize);
            for _ in 0..len {
                values.push(Self::decode_scalar(type_id, stream, options)?);
            }
            let dimensions = if encoding_mask & ARRAY_DIMENSIONS_BIT != 0 {
                Option::<Vec<u32>>::decode(stream, options)?
            } else {
                None
            };
            let array = match dimensions {
                Some(dimensions) => Array::new_multi(type_id, values, dimensions),
                None => Array::new(type_id, values),
            }
            .map_err(|e| Error::decoding(format!("Invalid variant array: {e}")))?;
            Ok(Variant::Array(Box::new(array)))
        } else if encoding_mask & ARRAY_DIMENSIONS_BIT != 0 {
            // Dimensions without values is a reserved combination
            Err(Error::decoding(
                "Variant mask has dimensions bit without the array bit",
            ))
        } else {
            Self::decode_scalar(type_id, stream, options)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn round_trip(v: &Variant) -> Variant {
        let encoded = v.encode_to_vec();
        assert_eq!(encoded.len(), v.byte_len());
        let mut stream = Cursor::new(encoded);
        Variant::decode(&mut stream, &DecodingOptions::default()).unwrap()
    }

    #[test]
    fn scalars() {
        let values = vec![
            Variant::Empty,
            Variant::from(true),
            Variant::from(-42i8),
            Variant::from(0xDEADBEEFu32),
            Variant::from(1.5f64),
            Variant::from("text"),
            Variant::from(DateTime::now()),
            Variant::from(Guid::new()),
            Variant::from(ByteString::from(vec![1, 2, 3])),
            Variant::from(NodeId::new(2, "Demo")),
            Variant::from(LocalizedText::new("en", "hi")),
            Variant::from(StatusCode::BadNodeIdUnknown),
        ];
        for v in &values {
            assert_eq!(&round_trip(v), v);
        }
    }

    #[test]
    fn single_dimension_array() {
        let array = Array::new(
            VariantTypeId::Int32,
            vec![Variant::from(1i32), Variant::from(2i32), Variant::from(3i32)],
        )
        .unwrap();
        let v = Variant::Array(Box::new(array));
        assert_eq!(round_trip(&v), v);
        // Mask has the array bit and the element type id
        assert_eq!(v.encode_to_vec()[0], 0x80 | 6);
    }

    #[test]
    fn multi_dimension_array() {
        let values: Vec<Variant> = (0..6u32).map(Variant::from).collect();
        let array = Array::new_multi(VariantTypeId::UInt32, values, vec![2, 3]).unwrap();
        let v = Variant::Array(Box::new(array));
        assert_eq!(round_trip(&v), v);
        assert_eq!(v.encode_to_vec()[0], 0x80 | 0x40 | 7);
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let values: Vec<Variant> = (0..5u32).map(Variant::from).collect();
        assert!(Array::new_multi(VariantTypeId::UInt32, values, vec![2, 3]).is_err());
    }

    #[test]
    fn mixed_type_array_is_rejected() {
        assert!(Array::new(
            VariantTypeId::Int32,
            vec![Variant::from(1i32), Variant::from("x")]
        )
        .is_err());
    }

    #[test]
    fn reserved_mask_is_rejected() {
        // Dimensions bit without values bit
        let mut stream = Cursor::new(vec![0x40u8 | 6, 0, 0, 0, 0]);
        assert!(Variant::decode(&mut stream, &DecodingOptions::default()).is_err());
    }
}
