// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Read and Write of node attributes.

use ualite_core::ResponseMessage;
use ualite_types::{
    DataValue, ReadRequest, ReadValueId, StatusCode, TimestampsToReturn, WriteRequest, WriteValue,
};

use crate::session::{
    services::{process_service_result, process_unexpected_response},
    Session,
};

use super::limits::OperationKind;

impl Session {
    /// Read attributes, returning one [`DataValue`] per input in order.
    pub async fn read(
        &self,
        nodes_to_read: &[ReadValueId],
        timestamps_to_return: TimestampsToReturn,
        max_age: f64,
    ) -> Result<Vec<DataValue>, StatusCode> {
        if nodes_to_read.is_empty() {
            return Err(StatusCode::BadNothingToDo);
        }
        let request = ReadRequest {
            request_header: self.channel.make_request_header(self.operation_timeout()),
            max_age,
            timestamps_to_return,
            nodes_to_read: Some(nodes_to_read.to_vec()),
        };
        let response = self
            .channel
            .send(request, self.operation_timeout())
            .await?;
        let ResponseMessage::Read(response) = response else {
            return Err(process_unexpected_response(response));
        };
        process_service_result(&response.response_header)?;
        Ok(response.results.unwrap_or_default())
    }

    /// Read many attributes, splitting against the server's MaxNodesPerRead
    /// limit. Results keep the input order; `progress` is told
    /// `(completed, total)` after each batch.
    pub async fn read_batched(
        &self,
        nodes_to_read: &[ReadValueId],
        timestamps_to_return: TimestampsToReturn,
        max_age: f64,
        progress: Option<&(dyn Fn(usize, usize) + Send + Sync)>,
    ) -> Result<Vec<DataValue>, StatusCode> {
        let batch_size = self.safe_batch_size(OperationKind::Read).await?;
        let mut results = Vec::with_capacity(nodes_to_read.len());
        for batch in Self::batches(nodes_to_read, batch_size) {
            results.extend(self.read(batch, timestamps_to_return, max_age).await?);
            if let Some(progress) = progress {
                progress(results.len(), nodes_to_read.len());
            }
        }
        Ok(results)
    }

    /// Write attributes, returning one status per input in order.
    pub async fn write(
        &self,
        nodes_to_write: &[WriteValue],
    ) -> Result<Vec<StatusCode>, StatusCode> {
        if nodes_to_write.is_empty() {
            return Err(StatusCode::BadNothingToDo);
        }
        let request = WriteRequest {
            request_header: self.channel.make_request_header(self.operation_timeout()),
            nodes_to_write: Some(nodes_to_write.to_vec()),
        };
        let response = self
            .channel
            .send(request, self.operation_timeout())
            .await?;
        let ResponseMessage::Write(response) = response else {
            return Err(process_unexpected_response(response));
        };
        process_service_result(&response.response_header)?;
        Ok(response.results.unwrap_or_default())
    }

    /// Write many attributes, batched against MaxNodesPerWrite.
    pub async fn write_batched(
        &self,
        nodes_to_write: &[WriteValue],
        progress: Option<&(dyn Fn(usize, usize) + Send + Sync)>,
    ) -> Result<Vec<StatusCode>, StatusCode> {
        let batch_size = self.safe_batch_size(OperationKind::Write).await?;
        let mut results = Vec::with_capacity(nodes_to_write.len());
        for batch in Self::batches(nodes_to_write, batch_size) {
            results.extend(self.write(batch).await?);
            if let Some(progress) = progress {
                progress(results.len(), nodes_to_write.len());
            }
        }
        Ok(results)
    }
}
