// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The Call service.

use log::error;

use ualite_core::ResponseMessage;
use ualite_types::{CallMethodRequest, CallMethodResult, CallRequest, NodeId, StatusCode, Variant};

use crate::session::{
    services::{process_service_result, process_unexpected_response},
    Session,
};

impl Session {
    /// Invoke several methods in one call, returning one result per invocation in
    /// order.
    pub async fn call(
        &self,
        methods_to_call: &[CallMethodRequest],
    ) -> Result<Vec<CallMethodResult>, StatusCode> {
        if methods_to_call.is_empty() {
            return Err(StatusCode::BadNothingToDo);
        }
        let request = CallRequest {
            request_header: self.channel.make_request_header(self.operation_timeout()),
            methods_to_call: Some(methods_to_call.to_vec()),
        };
        let response = self
            .channel
            .send(request, self.operation_timeout())
            .await?;
        let ResponseMessage::Call(response) = response else {
            return Err(process_unexpected_response(response));
        };
        process_service_result(&response.response_header)?;
        Ok(response.results.unwrap_or_default())
    }

    /// Invoke one method, failing on its status code and returning its output
    /// arguments. When the method itself succeeded but arguments were at fault,
    /// the per-argument statuses are in the error path of [`Session::call`].
    pub async fn call_one(
        &self,
        object_id: NodeId,
        method_id: NodeId,
        input_arguments: Vec<Variant>,
    ) -> Result<Vec<Variant>, StatusCode> {
        let request = CallMethodRequest {
            object_id,
            method_id,
            input_arguments: if input_arguments.is_empty() {
                None
            } else {
                Some(input_arguments)
            },
        };
        let mut results = self.call(&[request]).await?;
        let Some(result) = results.pop() else {
            error!("Call returned no result");
            return Err(StatusCode::BadUnexpectedError);
        };
        if result.status_code.is_bad() {
            return Err(result.status_code);
        }
        Ok(result.output_arguments.unwrap_or_default())
    }
}
