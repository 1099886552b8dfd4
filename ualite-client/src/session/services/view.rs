// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Browse, BrowseNext and node registration.

use log::debug;

use ualite_core::ResponseMessage;
use ualite_types::{
    BrowseDescription, BrowseNextRequest, BrowseRequest, BrowseResult, ByteString, NodeId,
    ReferenceDescription, RegisterNodesRequest, StatusCode, UnregisterNodesRequest,
    ViewDescription,
};

use crate::session::{
    services::{process_service_result, process_unexpected_response},
    Session,
};

use super::limits::OperationKind;

impl Session {
    /// Discover the references of `nodes_to_browse`. Each result may carry a
    /// continuation point for use with [`Session::browse_next`].
    pub async fn browse(
        &self,
        nodes_to_browse: &[BrowseDescription],
        max_references_per_node: u32,
        view: Option<ViewDescription>,
    ) -> Result<Vec<BrowseResult>, StatusCode> {
        if nodes_to_browse.is_empty() {
            return Err(StatusCode::BadNothingToDo);
        }
        let request = BrowseRequest {
            request_header: self.channel.make_request_header(self.operation_timeout()),
            view: view.unwrap_or_default(),
            requested_max_references_per_node: max_references_per_node,
            nodes_to_browse: Some(nodes_to_browse.to_vec()),
        };
        let response = self
            .channel
            .send(request, self.operation_timeout())
            .await?;
        let ResponseMessage::Browse(response) = response else {
            return Err(process_unexpected_response(response));
        };
        process_service_result(&response.response_header)?;
        Ok(response.results.unwrap_or_default())
    }

    /// Continue (or with `release_continuation_points` abandon) a browse from its
    /// continuation points.
    pub async fn browse_next(
        &self,
        release_continuation_points: bool,
        continuation_points: &[ByteString],
    ) -> Result<Vec<BrowseResult>, StatusCode> {
        if continuation_points.is_empty() {
            return Err(StatusCode::BadNothingToDo);
        }
        let request = BrowseNextRequest {
            request_header: self.channel.make_request_header(self.operation_timeout()),
            release_continuation_points,
            continuation_points: Some(continuation_points.to_vec()),
        };
        let response = self
            .channel
            .send(request, self.operation_timeout())
            .await?;
        let ResponseMessage::BrowseNext(response) = response else {
            return Err(process_unexpected_response(response));
        };
        process_service_result(&response.response_header)?;
        Ok(response.results.unwrap_or_default())
    }

    /// Browse one node to completion, following continuation points until the
    /// server has no more references, and return them all.
    pub async fn browse_all(
        &self,
        node_to_browse: BrowseDescription,
    ) -> Result<Vec<ReferenceDescription>, StatusCode> {
        let mut results = self.browse(&[node_to_browse], 0, None).await?;
        let Some(mut result) = results.pop() else {
            return Err(StatusCode::BadUnexpectedError);
        };
        if result.status_code.is_bad() {
            return Err(result.status_code);
        }
        let mut references = result.references.take().unwrap_or_default();
        while !result.continuation_point.is_null() {
            let mut next = self
                .browse_next(false, &[result.continuation_point.clone()])
                .await?;
            let Some(next) = next.pop() else {
                break;
            };
            result = next;
            if result.status_code.is_bad() {
                return Err(result.status_code);
            }
            if let Some(more) = &result.references {
                references.extend(more.iter().cloned());
            }
        }
        debug!("browse_all returned {} references", references.len());
        Ok(references)
    }

    /// Browse many nodes, splitting the request against the server's
    /// MaxNodesPerBrowse limit. Results keep the input order; `progress`, when
    /// given, is told `(completed, total)` after each batch.
    pub async fn browse_batched(
        &self,
        nodes_to_browse: &[BrowseDescription],
        max_references_per_node: u32,
        progress: Option<&(dyn Fn(usize, usize) + Send + Sync)>,
    ) -> Result<Vec<BrowseResult>, StatusCode> {
        let batch_size = self.safe_batch_size(OperationKind::Browse).await?;
        let mut results = Vec::with_capacity(nodes_to_browse.len());
        for batch in Self::batches(nodes_to_browse, batch_size) {
            let batch_results = self.browse(batch, max_references_per_node, None).await?;
            results.extend(batch_results);
            if let Some(progress) = progress {
                progress(results.len(), nodes_to_browse.len());
            }
        }
        Ok(results)
    }

    /// Register nodes the client will use repeatedly, returning the server's
    /// aliases in input order.
    pub async fn register_nodes(
        &self,
        nodes_to_register: &[NodeId],
    ) -> Result<Vec<NodeId>, StatusCode> {
        if nodes_to_register.is_empty() {
            return Err(StatusCode::BadNothingToDo);
        }
        let request = RegisterNodesRequest {
            request_header: self.channel.make_request_header(self.operation_timeout()),
            nodes_to_register: Some(nodes_to_register.to_vec()),
        };
        let response = self
            .channel
            .send(request, self.operation_timeout())
            .await?;
        let ResponseMessage::RegisterNodes(response) = response else {
            return Err(process_unexpected_response(response));
        };
        process_service_result(&response.response_header)?;
        Ok(response.registered_node_ids.unwrap_or_default())
    }

    /// Register many nodes, batched against MaxNodesPerRegisterNodes.
    pub async fn register_nodes_batched(
        &self,
        nodes_to_register: &[NodeId],
        progress: Option<&(dyn Fn(usize, usize) + Send + Sync)>,
    ) -> Result<Vec<NodeId>, StatusCode> {
        let batch_size = self.safe_batch_size(OperationKind::RegisterNodes).await?;
        let mut results = Vec::with_capacity(nodes_to_register.len());
        for batch in Self::batches(nodes_to_register, batch_size) {
            results.extend(self.register_nodes(batch).await?);
            if let Some(progress) = progress {
                progress(results.len(), nodes_to_register.len());
            }
        }
        Ok(results)
    }

    /// Tell the server the registered nodes are no longer needed.
    pub async fn unregister_nodes(&self, nodes_to_unregister: &[NodeId]) -> Result<(), StatusCode> {
        if nodes_to_unregister.is_empty() {
            return Err(StatusCode::BadNothingToDo);
        }
        let request = UnregisterNodesRequest {
            request_header: self.channel.make_request_header(self.operation_timeout()),
            nodes_to_unregister: Some(nodes_to_unregister.to_vec()),
        };
        let response = self
            .channel
            .send(request, self.operation_timeout())
            .await?;
        let ResponseMessage::UnregisterNodes(response) = response else {
            return Err(process_unexpected_response(response));
        };
        process_service_result(&response.response_header)?;
        Ok(())
    }
}
