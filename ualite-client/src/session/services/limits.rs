// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Server operational limits and the batch splitting they govern.

use log::debug;

use ualite_types::{node_ids, NodeId, ReadValueId, StatusCode, TimestampsToReturn};

use crate::session::Session;

/// The per-call operation ceilings a server advertises under
/// Server/ServerCapabilities/OperationLimits. `None` or zero means unlimited.
#[derive(Debug, Clone, Copy, Default)]
pub struct OperationalLimits {
    /// MaxNodesPerRead.
    pub max_nodes_per_read: Option<u32>,
    /// MaxNodesPerWrite.
    pub max_nodes_per_write: Option<u32>,
    /// MaxNodesPerBrowse.
    pub max_nodes_per_browse: Option<u32>,
    /// MaxNodesPerRegisterNodes.
    pub max_nodes_per_register_nodes: Option<u32>,
    /// MaxNodesPerMethodCall.
    pub max_nodes_per_method_call: Option<u32>,
    /// MaxMonitoredItemsPerCall.
    pub max_monitored_items_per_call: Option<u32>,
}

/// The kind of operation a batch is split for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Read attributes.
    Read,
    /// Write attributes.
    Write,
    /// Browse nodes.
    Browse,
    /// Register nodes.
    RegisterNodes,
    /// Call methods.
    MethodCall,
    /// Create/modify/delete monitored items.
    MonitoredItems,
}

impl OperationalLimits {
    /// The advertised ceiling for an operation, `None` for unlimited.
    pub fn limit(&self, kind: OperationKind) -> Option<u32> {
        let limit = match kind {
            OperationKind::Read => self.max_nodes_per_read,
            OperationKind::Write => self.max_nodes_per_write,
            OperationKind::Browse => self.max_nodes_per_browse,
            OperationKind::RegisterNodes => self.max_nodes_per_register_nodes,
            OperationKind::MethodCall => self.max_nodes_per_method_call,
            OperationKind::MonitoredItems => self.max_monitored_items_per_call,
        };
        // Zero advertises "unlimited" too
        limit.filter(|v| *v > 0)
    }
}

impl Session {
    /// The server's operational limits, read once and cached for the life of the
    /// session. Nodes the server does not expose read as unlimited.
    pub async fn operational_limits(&self) -> Result<OperationalLimits, StatusCode> {
        if let Some(limits) = *self.operational_limits.lock() {
            return Ok(limits);
        }
        let ids = [
            node_ids::MAX_NODES_PER_READ,
            node_ids::MAX_NODES_PER_WRITE,
            node_ids::MAX_NODES_PER_BROWSE,
            node_ids::MAX_NODES_PER_REGISTER_NODES,
            node_ids::MAX_NODES_PER_METHOD_CALL,
            node_ids::MAX_MONITORED_ITEMS_PER_CALL,
        ];
        let nodes: Vec<ReadValueId> = ids
            .iter()
            .map(|id| ReadValueId::from(NodeId::ns0(*id)))
            .collect();
        let results = self
            .read(&nodes, TimestampsToReturn::Neither, 0.0)
            .await?;

        let value_at = |i: usize| -> Option<u32> {
            results.get(i).and_then(|v: &ualite_types::DataValue| {
                if v.is_valid() {
                    v.value.as_ref().and_then(|v| v.as_u32())
                } else {
                    None
                }
            })
        };
        let limits = OperationalLimits {
            max_nodes_per_read: value_at(0),
            max_nodes_per_write: value_at(1),
            max_nodes_per_browse: value_at(2),
            max_nodes_per_register_nodes: value_at(3),
            max_nodes_per_method_call: value_at(4),
            max_monitored_items_per_call: value_at(5),
        };
        debug!("Server operational limits: {:?}", limits);
        *self.operational_limits.lock() = Some(limits);
        Ok(limits)
    }

    /// Forget the cached limits, e.g. after reconnecting to a different server.
    pub fn invalidate_operational_limits(&self) {
        *self.operational_limits.lock() = None;
    }

    /// The batch size safe for `kind`: the lesser of the configured maximum and
    /// the server's advertised limit.
    pub(crate) async fn safe_batch_size(
        &self,
        kind: OperationKind,
    ) -> Result<usize, StatusCode> {
        let limits = self.operational_limits().await?;
        let configured = self.config.max_batch_size.max(1);
        Ok(match limits.limit(kind) {
            Some(limit) => configured.min(limit as usize),
            None => configured,
        })
    }

    /// Split a slice into batches of at most `batch_size`, preserving order.
    pub(crate) fn batches<T>(items: &[T], batch_size: usize) -> impl Iterator<Item = &[T]> {
        items.chunks(batch_size.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_limit_means_unlimited() {
        let limits = OperationalLimits {
            max_nodes_per_read: Some(0),
            max_nodes_per_browse: Some(10),
            ..Default::default()
        };
        assert_eq!(limits.limit(OperationKind::Read), None);
        assert_eq!(limits.limit(OperationKind::Browse), Some(10));
        assert_eq!(limits.limit(OperationKind::Write), None);
    }

    #[test]
    fn batches_preserve_order_and_bound() {
        let items: Vec<u32> = (0..25).collect();
        let batches: Vec<&[u32]> = Session::batches(&items, 10).collect();
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| b.len() <= 10));
        let concatenated: Vec<u32> = batches.into_iter().flatten().copied().collect();
        assert_eq!(concatenated, items);
    }
}
