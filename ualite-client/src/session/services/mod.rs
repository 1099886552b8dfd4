// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Service call implementations grouped by service set.

pub mod attributes;
pub mod limits;
pub mod method;
pub mod session;
pub mod subscriptions;
pub mod view;

use log::error;

use ualite_core::ResponseMessage;
use ualite_types::{ResponseHeader, StatusCode};

/// Check the service result of a response header, turning `Bad_*` into an error.
/// Operation-level statuses live in the response body and are the caller's to
/// inspect.
pub(crate) fn process_service_result(response_header: &ResponseHeader) -> Result<(), StatusCode> {
    if response_header.service_result.is_bad() {
        error!(
            "Service call failed with {}",
            response_header.service_result
        );
        Err(response_header.service_result)
    } else {
        Ok(())
    }
}

/// A response of an unexpected type arrived for a request. Service faults carry
/// their own status; anything else is a protocol violation.
pub(crate) fn process_unexpected_response(response: ResponseMessage) -> StatusCode {
    match response {
        ResponseMessage::ServiceFault(fault) => {
            let status = fault.response_header.service_result;
            error!("Service fault: {}", status);
            status
        }
        other => {
            error!(
                "Expected a different response type, got {:?}",
                other.header_request_handle()
            );
            StatusCode::BadUnknownResponse
        }
    }
}
