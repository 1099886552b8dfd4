// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The [`RequestMessage`] and [`ResponseMessage`] unions over every service
//! message this stack sends or receives.

use std::io::Read;

use ualite_types::{
    encoding::BinaryEncodable, DecodingOptions, EncodingResult, NodeId,
};

use crate::comms::tcp_types::MessageType;

mod request;
mod response;

pub use request::RequestMessage;
pub use response::ResponseMessage;

/// Implemented by the message unions: everything the chunker needs to put a
/// message on the wire or take one off it.
pub trait Message: BinaryEncodable {
    /// The request handle in the message's header.
    fn request_handle(&self) -> u32;

    /// The transport message type the message travels in.
    fn message_type(&self) -> MessageType;

    /// The node id of the message's binary encoding.
    fn type_id(&self) -> NodeId;

    /// Decode the message variant selected by the numeric type id.
    fn decode_by_type_id<S: Read + ?Sized>(
        stream: &mut S,
        type_id: u32,
        options: &DecodingOptions,
    ) -> EncodingResult<Self>
    where
        Self: Sized;
}

macro_rules! message_enum {
    ($enum_name:ident, $handle:ident, $($name:ident: $value:ident),+ $(,)?) => {
        #[derive(Debug, Clone, PartialEq)]
        /// Union of service messages.
        pub enum $enum_name {
            $(
                #[doc = stringify!($name)]
                $name(Box<$value>),
            )+
        }

        $(
            impl From<$value> for $enum_name {
                fn from(value: $value) -> Self {
                    Self::$name(Box::new(value))
                }
            }
        )+

        impl ualite_types::encoding::BinaryEncodable for $enum_name {
            fn byte_len(&self) -> usize {
                match self {
                    $( Self::$name(value) => value.byte_len(), )+
                }
            }

            fn encode<S: std::io::Write + ?Sized>(
                &self,
                stream: &mut S,
            ) -> ualite_types::EncodingResult<()> {
                match self {
                    $( Self::$name(value) => value.encode(stream), )+
                }
            }
        }

        impl $enum_name {
            /// The request handle in the contained message's header.
            pub fn header_request_handle(&self) -> u32 {
                match self {
                    $( Self::$name(value) => value.$handle.request_handle, )+
                }
            }
        }

        impl crate::messages::Message for $enum_name {
            fn request_handle(&self) -> u32 {
                self.header_request_handle()
            }

            fn message_type(&self) -> crate::comms::tcp_types::MessageType {
                self.chunk_message_type()
            }

            fn type_id(&self) -> ualite_types::NodeId {
                use ualite_types::service::MessageInfo;
                match self {
                    $( Self::$name(value) => value.type_id(), )+
                }
            }

            fn decode_by_type_id<S: std::io::Read + ?Sized>(
                stream: &mut S,
                type_id: u32,
                options: &ualite_types::DecodingOptions,
            ) -> ualite_types::EncodingResult<Self> {
                use ualite_types::encoding::BinaryDecodable;
                use ualite_types::service::MessageInfo;
                match type_id {
                    $(
                        $value::TYPE_ID => Ok($value::decode(stream, options)?.into()),
                    )+
                    _ => Err(ualite_types::Error::decoding(format!(
                        "No decoder for message type id {}", type_id
                    ))),
                }
            }
        }
    };
}

pub(crate) use message_enum;
