// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Browse, BrowseNext and node registration.

use bitflags::bitflags;

use crate::{
    byte_string::ByteString,
    date_time::DateTime,
    diagnostic_info::DiagnosticInfo,
    encoding::BinaryEncodable,
    expanded_node_id::ExpandedNodeId,
    localized_text::LocalizedText,
    node_id::NodeId,
    qualified_name::QualifiedName,
    request_header::RequestHeader,
    response_header::ResponseHeader,
    status_code::StatusCode,
};

use super::{binary_struct, message_info, ua_enum};

ua_enum! {
    /// Which direction of references to follow when browsing.
    BrowseDirection {
        /// Follow references from source to target.
        Forward = 0,
        /// Follow references from target to source.
        Inverse = 1,
        /// Follow references both ways.
        Both = 2,
    }
}

impl Default for BrowseDirection {
    fn default() -> Self {
        BrowseDirection::Forward
    }
}

ua_enum! {
    /// The class of a node.
    NodeClass {
        /// No class specified.
        Unspecified = 0,
        /// An object.
        Object = 1,
        /// A variable.
        Variable = 2,
        /// A method.
        Method = 4,
        /// An object type.
        ObjectType = 8,
        /// A variable type.
        VariableType = 16,
        /// A reference type.
        ReferenceType = 32,
        /// A data type.
        DataType = 64,
        /// A view.
        View = 128,
    }
}

impl Default for NodeClass {
    fn default() -> Self {
        NodeClass::Unspecified
    }
}

bitflags! {
    /// Mask of node classes to include in browse results. Zero means all.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct NodeClassMask: u32 {
        /// Objects.
        const OBJECT = 1;
        /// Variables.
        const VARIABLE = 2;
        /// Methods.
        const METHOD = 4;
        /// Object types.
        const OBJECT_TYPE = 8;
        /// Variable types.
        const VARIABLE_TYPE = 16;
        /// Reference types.
        const REFERENCE_TYPE = 32;
        /// Data types.
        const DATA_TYPE = 64;
        /// Views.
        const VIEW = 128;
    }
}

bitflags! {
    /// Mask of the fields to fill in returned reference descriptions.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct BrowseResultMask: u32 {
        /// The reference type id.
        const REFERENCE_TYPE = 1;
        /// The direction flag.
        const IS_FORWARD = 2;
        /// The target node class.
        const NODE_CLASS = 4;
        /// The target browse name.
        const BROWSE_NAME = 8;
        /// The target display name.
        const DISPLAY_NAME = 16;
        /// The target type definition.
        const TYPE_DEFINITION = 32;
        /// Everything.
        const ALL = 63;
    }
}

/// The view to browse in. The default null view is the whole address space.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ViewDescription {
    /// Node id of the view, null for the whole address space.
    pub view_id: NodeId,
    /// Timestamp selecting a historical view version.
    pub timestamp: DateTime,
    /// Version number selecting a view version, 0 for latest.
    pub view_version: u32,
}

binary_struct!(ViewDescription {
    view_id,
    timestamp,
    view_version,
});

/// One node to browse and how to filter the references found there.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BrowseDescription {
    /// The node whose references to return.
    pub node_id: NodeId,
    /// Direction of references to follow.
    pub browse_direction: BrowseDirection,
    /// Reference type to follow, null for all.
    pub reference_type_id: NodeId,
    /// Also follow subtypes of the reference type.
    pub include_subtypes: bool,
    /// Node classes to include, 0 for all.
    pub node_class_mask: u32,
    /// Which result fields to fill.
    pub result_mask: u32,
}

binary_struct!(BrowseDescription {
    node_id,
    browse_direction,
    reference_type_id,
    include_subtypes,
    node_class_mask,
    result_mask,
});

impl From<NodeId> for BrowseDescription {
    /// Browse everything reachable forward from the node.
    fn from(node_id: NodeId) -> Self {
        BrowseDescription {
            node_id,
            browse_direction: BrowseDirection::Forward,
            reference_type_id: NodeId::null(),
            include_subtypes: true,
            node_class_mask: NodeClassMask::empty().bits(),
            result_mask: BrowseResultMask::ALL.bits(),
        }
    }
}

/// One reference returned by Browse.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReferenceDescription {
    /// The type of the reference.
    pub reference_type_id: NodeId,
    /// `true` if the reference is in the forward direction.
    pub is_forward: bool,
    /// The target node.
    pub node_id: ExpandedNodeId,
    /// Browse name of the target.
    pub browse_name: QualifiedName,
    /// Display name of the target.
    pub display_name: LocalizedText,
    /// Class of the target.
    pub node_class: NodeClass,
    /// Type definition of the target, for objects and variables.
    pub type_definition: ExpandedNodeId,
}

binary_struct!(ReferenceDescription {
    reference_type_id,
    is_forward,
    node_id,
    browse_name,
    display_name,
    node_class,
    type_definition,
});

/// Result for one browsed node. A non-null continuation point means the server
/// has more references, to be fetched with BrowseNext.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BrowseResult {
    /// Outcome for this node.
    pub status_code: StatusCode,
    /// Opaque token to resume the browse, null when complete.
    pub continuation_point: ByteString,
    /// The references found.
    pub references: Option<Vec<ReferenceDescription>>,
}

binary_struct!(BrowseResult {
    status_code,
    continuation_point,
    references,
});

/// Discovers the references of one or more nodes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BrowseRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// The view to browse in.
    pub view: ViewDescription,
    /// Limit on references returned per node, 0 for server-chosen.
    pub requested_max_references_per_node: u32,
    /// The nodes to browse.
    pub nodes_to_browse: Option<Vec<BrowseDescription>>,
}

binary_struct!(BrowseRequest {
    request_header,
    view,
    requested_max_references_per_node,
    nodes_to_browse,
});
message_info!(BrowseRequest, 527);

/// Response to [`BrowseRequest`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BrowseResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// One result per browsed node, in request order.
    pub results: Option<Vec<BrowseResult>>,
    /// Operation diagnostics, if requested.
    pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
}

binary_struct!(BrowseResponse {
    response_header,
    results,
    diagnostic_infos,
});
message_info!(BrowseResponse, 530);

/// Continues a browse from continuation points, or releases them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BrowseNextRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// When `true` the server frees the continuation points without returning data.
    pub release_continuation_points: bool,
    /// The continuation points to continue or release.
    pub continuation_points: Option<Vec<ByteString>>,
}

binary_struct!(BrowseNextRequest {
    request_header,
    release_continuation_points,
    continuation_points,
});
message_info!(BrowseNextRequest, 533);

/// Response to [`BrowseNextRequest`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BrowseNextResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// One result per continuation point, in request order.
    pub results: Option<Vec<BrowseResult>>,
    /// Operation diagnostics, if requested.
    pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
}

binary_struct!(BrowseNextResponse {
    response_header,
    results,
    diagnostic_infos,
});
message_info!(BrowseNextResponse, 536);

/// Registers nodes the client will access repeatedly, letting the server return
/// cheaper aliases for them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RegisterNodesRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// The nodes to register.
    pub nodes_to_register: Option<Vec<NodeId>>,
}

binary_struct!(RegisterNodesRequest {
    request_header,
    nodes_to_register,
});
message_info!(RegisterNodesRequest, 560);

/// Response to [`RegisterNodesRequest`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RegisterNodesResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// Aliases in request order; may equal the input ids.
    pub registered_node_ids: Option<Vec<NodeId>>,
}

binary_struct!(RegisterNodesResponse {
    response_header,
    registered_node_ids,
});
message_info!(RegisterNodesResponse, 563);

/// Releases previously registered nodes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnregisterNodesRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// The nodes to unregister.
    pub nodes_to_unregister: Option<Vec<NodeId>>,
}

binary_struct!(UnregisterNodesRequest {
    request_header,
    nodes_to_unregister,
});
message_info!(UnregisterNodesRequest, 566);

/// Response to [`UnregisterNodesRequest`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnregisterNodesResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
}

binary_struct!(UnregisterNodesResponse { response_header });
message_info!(UnregisterNodesResponse, 569);
