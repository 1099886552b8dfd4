// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Built-in OPC UA types and their binary encodings.
//!
//! Everything on the wire goes through [`BinaryEncodable`] and [`BinaryDecodable`].
//! Decoding respects the limits in [`DecodingOptions`], which a client derives from
//! the values negotiated during the transport handshake.

#![warn(missing_docs)]

pub mod attribute;
pub mod byte_string;
pub mod constants;
pub mod data_value;
pub mod date_time;
pub mod diagnostic_info;
pub mod encoding;
pub mod expanded_node_id;
pub mod extension_object;
pub mod guid;
pub mod localized_text;
pub mod node_id;
pub mod qualified_name;
pub mod request_header;
pub mod response_header;
pub mod service;
pub mod status_code;
pub mod string;
pub mod variant;

pub use attribute::AttributeId;
pub use byte_string::ByteString;
pub use data_value::DataValue;
pub use date_time::DateTime;
pub use diagnostic_info::{DiagnosticBits, DiagnosticInfo};
pub use encoding::{
    BinaryDecodable, BinaryEncodable, DecodingOptions, DepthGauge, DepthLock, EncodingResult,
    Error,
};
pub use expanded_node_id::ExpandedNodeId;
pub use extension_object::{ExtensionObject, ExtensionObjectBody};
pub use guid::Guid;
pub use localized_text::LocalizedText;
pub use node_id::{Identifier, NodeId};
pub use qualified_name::QualifiedName;
pub use request_header::RequestHeader;
pub use response_header::ResponseHeader;
pub use service::*;
pub use status_code::StatusCode;
pub use string::{UaString, XmlElement};
pub use variant::{Array, Variant, VariantTypeId};

/// Numeric ids (namespace 0) of well known nodes this stack addresses directly.
pub mod node_ids {
    /// The Objects folder.
    pub const OBJECTS_FOLDER: u32 = 85;
    /// The Server object.
    pub const SERVER: u32 = 2253;
    /// The Server_ServerStatus_State variable, read as a session keep-alive.
    pub const SERVER_STATUS_STATE: u32 = 2259;
    /// OperationLimits_MaxNodesPerRead.
    pub const MAX_NODES_PER_READ: u32 = 11705;
    /// OperationLimits_MaxNodesPerWrite.
    pub const MAX_NODES_PER_WRITE: u32 = 11708;
    /// OperationLimits_MaxNodesPerMethodCall.
    pub const MAX_NODES_PER_METHOD_CALL: u32 = 11711;
    /// OperationLimits_MaxNodesPerBrowse.
    pub const MAX_NODES_PER_BROWSE: u32 = 11712;
    /// OperationLimits_MaxNodesPerRegisterNodes.
    pub const MAX_NODES_PER_REGISTER_NODES: u32 = 11713;
    /// OperationLimits_MaxMonitoredItemsPerCall.
    pub const MAX_MONITORED_ITEMS_PER_CALL: u32 = 11716;
}
