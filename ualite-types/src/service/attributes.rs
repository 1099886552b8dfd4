// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Read and Write of node attributes.

use crate::{
    data_value::DataValue,
    diagnostic_info::DiagnosticInfo,
    encoding::BinaryEncodable,
    node_id::NodeId,
    qualified_name::QualifiedName,
    request_header::RequestHeader,
    response_header::ResponseHeader,
    status_code::StatusCode,
    string::UaString,
};

use super::{binary_struct, message_info, ua_enum};

ua_enum! {
    /// Which timestamps the server should return with values.
    TimestampsToReturn {
        /// Source timestamps only.
        Source = 0,
        /// Server timestamps only.
        Server = 1,
        /// Both timestamps.
        Both = 2,
        /// No timestamps.
        Neither = 3,
        /// Invalid placeholder.
        Invalid = 4,
    }
}

impl Default for TimestampsToReturn {
    fn default() -> Self {
        TimestampsToReturn::Neither
    }
}

/// One attribute of one node to read. The index range selects a slice of an
/// array-valued attribute.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadValueId {
    /// The node to read from.
    pub node_id: NodeId,
    /// The attribute to read, see [`crate::attribute::AttributeId`].
    pub attribute_id: u32,
    /// Slice of an array value, e.g. "1:2", null for the whole value.
    pub index_range: UaString,
    /// Data encoding to use, null for the default binary encoding.
    pub data_encoding: QualifiedName,
}

binary_struct!(ReadValueId {
    node_id,
    attribute_id,
    index_range,
    data_encoding,
});

impl From<NodeId> for ReadValueId {
    /// Read the Value attribute of the node.
    fn from(node_id: NodeId) -> Self {
        ReadValueId {
            node_id,
            attribute_id: crate::attribute::AttributeId::Value as u32,
            index_range: UaString::null(),
            data_encoding: QualifiedName::null(),
        }
    }
}

/// Reads attributes from nodes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// Oldest acceptable cached value age in milliseconds, 0 to force a device read.
    pub max_age: f64,
    /// Which timestamps to return.
    pub timestamps_to_return: TimestampsToReturn,
    /// The attributes to read.
    pub nodes_to_read: Option<Vec<ReadValueId>>,
}

binary_struct!(ReadRequest {
    request_header,
    max_age,
    timestamps_to_return,
    nodes_to_read,
});
message_info!(ReadRequest, 631);

/// Response to [`ReadRequest`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReadResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// One value per read id, in request order.
    pub results: Option<Vec<DataValue>>,
    /// Operation diagnostics, if requested.
    pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
}

binary_struct!(ReadResponse {
    response_header,
    results,
    diagnostic_infos,
});
message_info!(ReadResponse, 634);

/// One attribute of one node to write.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WriteValue {
    /// The node to write to.
    pub node_id: NodeId,
    /// The attribute to write.
    pub attribute_id: u32,
    /// Slice of an array value to write, null for the whole value.
    pub index_range: UaString,
    /// The value. Status and timestamps may only be written where the server allows.
    pub value: DataValue,
}

binary_struct!(WriteValue {
    node_id,
    attribute_id,
    index_range,
    value,
});

/// Writes attributes of nodes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WriteRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// The writes to perform.
    pub nodes_to_write: Option<Vec<WriteValue>>,
}

binary_struct!(WriteRequest {
    request_header,
    nodes_to_write,
});
message_info!(WriteRequest, 673);

/// Response to [`WriteRequest`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WriteResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// One status per write, in request order.
    pub results: Option<Vec<StatusCode>>,
    /// Operation diagnostics, if requested.
    pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
}

binary_struct!(WriteResponse {
    response_header,
    results,
    diagnostic_infos,
});
message_info!(WriteResponse, 676);
