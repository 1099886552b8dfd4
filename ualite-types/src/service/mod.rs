// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Service request and response types.
//!
//! Structures here encode field-by-field in declaration order, which is what the
//! `binary_struct!` macro generates. Enumerations are `Int32` on the wire. Types
//! that travel inside a message body are plain structures; the top level request
//! and response types additionally implement [`MessageInfo`] tying them to the
//! numeric id of their binary encoding.

use crate::node_id::NodeId;

/// Implemented by every message that can appear at the top level of a service
/// call, supplying the node id of its binary encoding.
pub trait MessageInfo {
    /// Numeric id (namespace 0) of the DefaultBinary encoding of this type.
    const TYPE_ID: u32;

    /// The encoding id as a node id, as written before the message body.
    fn type_id(&self) -> NodeId {
        NodeId::ns0(Self::TYPE_ID)
    }
}

macro_rules! binary_struct {
    ($name:ident { $($field:ident),+ $(,)? }) => {
        impl crate::encoding::BinaryEncodable for $name {
            fn byte_len(&self) -> usize {
                let mut size = 0usize;
                $( size += self.$field.byte_len(); )+
                size
            }

            fn encode<S: std::io::Write + ?Sized>(
                &self,
                stream: &mut S,
            ) -> crate::encoding::EncodingResult<()> {
                $( self.$field.encode(stream)?; )+
                Ok(())
            }
        }

        impl crate::encoding::BinaryDecodable for $name {
            fn decode<S: std::io::Read + ?Sized>(
                stream: &mut S,
                options: &crate::encoding::DecodingOptions,
            ) -> crate::encoding::EncodingResult<Self> {
                Ok(Self {
                    $( $field: crate::encoding::BinaryDecodable::decode(stream, options)?, )+
                })
            }
        }
    };
}

macro_rules! message_info {
    ($name:ident, $id:expr) => {
        impl crate::service::MessageInfo for $name {
            const TYPE_ID: u32 = $id;
        }
    };
}

macro_rules! ua_enum {
    ($(#[$attr:meta])* $name:ident { $($(#[$vattr:meta])* $variant:ident = $value:expr),+ $(,)? }) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(i32)]
        pub enum $name {
            $( $(#[$vattr])* $variant = $value, )+
        }

        impl TryFrom<i32> for $name {
            type Error = crate::encoding::Error;

            fn try_from(value: i32) -> Result<Self, Self::Error> {
                match value {
                    $( $value => Ok(Self::$variant), )+
                    _ => Err(crate::encoding::Error::decoding(format!(
                        concat!("Invalid ", stringify!($name), " value {}"), value
                    ))),
                }
            }
        }

        impl crate::encoding::BinaryEncodable for $name {
            fn byte_len(&self) -> usize {
                4
            }

            fn encode<S: std::io::Write + ?Sized>(
                &self,
                stream: &mut S,
            ) -> crate::encoding::EncodingResult<()> {
                crate::encoding::write_i32(stream, *self as i32)
            }
        }

        impl crate::encoding::BinaryDecodable for $name {
            fn decode<S: std::io::Read + ?Sized>(
                stream: &mut S,
                _: &crate::encoding::DecodingOptions,
            ) -> crate::encoding::EncodingResult<Self> {
                Self::try_from(crate::encoding::read_i32(stream)?)
            }
        }
    };
}

pub(crate) use binary_struct;
pub(crate) use message_info;
pub(crate) use ua_enum;

mod attributes;
mod discovery;
mod filter;
mod method;
mod secure_channel;
mod session;
mod subscription;
mod view;

pub use attributes::*;
pub use discovery::*;
pub use filter::*;
pub use method::*;
pub use secure_channel::*;
pub use session::*;
pub use subscription::*;
pub use view::*;
