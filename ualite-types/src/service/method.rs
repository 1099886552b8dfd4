// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The Call service for invoking methods.

use crate::{
    diagnostic_info::DiagnosticInfo,
    encoding::BinaryEncodable,
    node_id::NodeId,
    request_header::RequestHeader,
    response_header::ResponseHeader,
    status_code::StatusCode,
    variant::Variant,
};

use super::{binary_struct, message_info};

/// One method invocation: the object it belongs to, the method, and its inputs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallMethodRequest {
    /// The object or object type the method is invoked on.
    pub object_id: NodeId,
    /// The method to invoke.
    pub method_id: NodeId,
    /// Input arguments in declaration order.
    pub input_arguments: Option<Vec<Variant>>,
}

binary_struct!(CallMethodRequest {
    object_id,
    method_id,
    input_arguments,
});

/// The result of one method invocation. When the top-level status is good with
/// input errors, the per-argument results say which argument was at fault.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallMethodResult {
    /// Outcome of the invocation.
    pub status_code: StatusCode,
    /// One status per input argument.
    pub input_argument_results: Option<Vec<StatusCode>>,
    /// Diagnostics per input argument.
    pub input_argument_diagnostic_infos: Option<Vec<DiagnosticInfo>>,
    /// Output arguments in declaration order.
    pub output_arguments: Option<Vec<Variant>>,
}

binary_struct!(CallMethodResult {
    status_code,
    input_argument_results,
    input_argument_diagnostic_infos,
    output_arguments,
});

/// Invokes one or more methods.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// The invocations to perform.
    pub methods_to_call: Option<Vec<CallMethodRequest>>,
}

binary_struct!(CallRequest {
    request_header,
    methods_to_call,
});
message_info!(CallRequest, 712);

/// Response to [`CallRequest`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CallResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// One result per invocation, in request order.
    pub results: Option<Vec<CallMethodResult>>,
    /// Operation diagnostics, if requested.
    pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
}

binary_struct!(CallResponse {
    response_header,
    results,
    diagnostic_infos,
});
message_info!(CallResponse, 715);
