// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Subscription and monitored item service calls, plus the publish and republish
//! requests the event loop issues.

use std::time::Duration;

use log::{debug, error, warn};

use ualite_core::ResponseMessage;
use ualite_types::{
    AttributeId, CreateMonitoredItemsRequest, CreateSubscriptionRequest,
    DeleteMonitoredItemsRequest, DeleteSubscriptionsRequest, ModifyMonitoredItemsRequest,
    ModifySubscriptionRequest, MonitoredItemCreateRequest, MonitoredItemCreateResult,
    MonitoredItemFilter, MonitoredItemModifyRequest, MonitoringMode, MonitoringParameters,
    NodeId, PublishRequest, QualifiedName, ReadValueId,
    RepublishRequest, SetMonitoringModeRequest, SetPublishingModeRequest, StatusCode,
    TimestampsToReturn, UaString,
};

use crate::session::{
    services::{process_service_result, process_unexpected_response},
    Session,
};

use super::{state::NotificationOutcome, MonitoredItem, OnSubscriptionNotification, Subscription};

/// One monitored item to create: what to monitor and how.
#[derive(Debug, Clone)]
pub struct MonitoredItemCreate {
    /// The node and attribute to monitor.
    pub item_to_monitor: ReadValueId,
    /// Initial monitoring mode.
    pub monitoring_mode: MonitoringMode,
    /// Requested sampling interval in milliseconds, -1.0 for the publishing
    /// interval.
    pub sampling_interval: f64,
    /// Requested server-side queue depth.
    pub queue_size: u32,
    /// Drop oldest on server-side overflow.
    pub discard_oldest: bool,
    /// The filter to apply.
    pub filter: MonitoredItemFilter,
    /// Depth of the item's client-side value cache.
    pub value_cache_size: usize,
}

impl MonitoredItemCreate {
    /// Monitor the Value attribute of `node_id` with defaults.
    pub fn value(node_id: NodeId) -> MonitoredItemCreate {
        MonitoredItemCreate {
            item_to_monitor: ReadValueId::from(node_id),
            monitoring_mode: MonitoringMode::Reporting,
            sampling_interval: -1.0,
            queue_size: 1,
            discard_oldest: true,
            filter: MonitoredItemFilter::None,
            value_cache_size: super::DEFAULT_VALUE_CACHE_SIZE,
        }
    }

    /// Monitor the EventNotifier attribute of `node_id` with an event filter.
    pub fn event(node_id: NodeId, filter: MonitoredItemFilter) -> MonitoredItemCreate {
        MonitoredItemCreate {
            item_to_monitor: ReadValueId {
                node_id,
                attribute_id: AttributeId::EventNotifier as u32,
                index_range: UaString::null(),
                data_encoding: QualifiedName::null(),
            },
            monitoring_mode: MonitoringMode::Reporting,
            sampling_interval: 0.0,
            queue_size: 0,
            discard_oldest: true,
            filter,
            value_cache_size: super::DEFAULT_VALUE_CACHE_SIZE,
        }
    }
}

impl From<NodeId> for MonitoredItemCreate {
    fn from(node_id: NodeId) -> Self {
        MonitoredItemCreate::value(node_id)
    }
}

impl Session {
    /// Create a subscription, adopting the server's revised parameters, and
    /// register `callback` as its notification sink. Returns the subscription id.
    pub async fn create_subscription(
        &self,
        publishing_interval: Duration,
        lifetime_count: u32,
        max_keep_alive_count: u32,
        max_notifications_per_publish: u32,
        priority: u8,
        publishing_enabled: bool,
        callback: impl OnSubscriptionNotification + 'static,
    ) -> Result<u32, StatusCode> {
        let request = CreateSubscriptionRequest {
            request_header: self.channel.make_request_header(self.operation_timeout()),
            requested_publishing_interval: publishing_interval.as_millis() as f64,
            requested_lifetime_count: lifetime_count,
            requested_max_keep_alive_count: max_keep_alive_count,
            max_notifications_per_publish,
            publishing_enabled,
            priority,
        };
        let response = self
            .channel
            .send(request, self.operation_timeout())
            .await?;
        let ResponseMessage::CreateSubscription(response) = response else {
            return Err(process_unexpected_response(response));
        };
        process_service_result(&response.response_header)?;

        let subscription = Subscription::new(
            response.subscription_id,
            Duration::from_millis(response.revised_publishing_interval.max(0.0) as u64),
            response.revised_lifetime_count,
            response.revised_max_keep_alive_count,
            max_notifications_per_publish,
            publishing_enabled,
            priority,
            Box::new(callback),
        );
        self.subscriptions.lock().add_subscription(subscription);
        debug!(
            "Created subscription {} with interval {} ms",
            response.subscription_id, response.revised_publishing_interval
        );
        Ok(response.subscription_id)
    }

    /// Modify a subscription's negotiated parameters, adopting the revision.
    pub async fn modify_subscription(
        &self,
        subscription_id: u32,
        publishing_interval: Duration,
        lifetime_count: u32,
        max_keep_alive_count: u32,
        max_notifications_per_publish: u32,
        priority: u8,
    ) -> Result<(), StatusCode> {
        if self.subscriptions.lock().subscription(subscription_id).is_none() {
            return Err(StatusCode::BadSubscriptionIdInvalid);
        }
        let request = ModifySubscriptionRequest {
            request_header: self.channel.make_request_header(self.operation_timeout()),
            subscription_id,
            requested_publishing_interval: publishing_interval.as_millis() as f64,
            requested_lifetime_count: lifetime_count,
            requested_max_keep_alive_count: max_keep_alive_count,
            max_notifications_per_publish,
            priority,
        };
        let response = self
            .channel
            .send(request, self.operation_timeout())
            .await?;
        let ResponseMessage::ModifySubscription(response) = response else {
            return Err(process_unexpected_response(response));
        };
        process_service_result(&response.response_header)?;
        let mut subscriptions = self.subscriptions.lock();
        if let Some(subscription) = subscriptions.subscription_mut(subscription_id) {
            subscription.set_revised(
                Duration::from_millis(response.revised_publishing_interval.max(0.0) as u64),
                response.revised_lifetime_count,
                response.revised_max_keep_alive_count,
            );
        }
        Ok(())
    }

    /// Enable or disable publishing on a set of subscriptions.
    pub async fn set_publishing_mode(
        &self,
        subscription_ids: &[u32],
        publishing_enabled: bool,
    ) -> Result<Vec<StatusCode>, StatusCode> {
        if subscription_ids.is_empty() {
            return Err(StatusCode::BadNothingToDo);
        }
        let request = SetPublishingModeRequest {
            request_header: self.channel.make_request_header(self.operation_timeout()),
            publishing_enabled,
            subscription_ids: Some(subscription_ids.to_vec()),
        };
        let response = self
            .channel
            .send(request, self.operation_timeout())
            .await?;
        let ResponseMessage::SetPublishingMode(response) = response else {
            return Err(process_unexpected_response(response));
        };
        process_service_result(&response.response_header)?;
        let results = response.results.unwrap_or_default();
        let mut subscriptions = self.subscriptions.lock();
        for (id, status) in subscription_ids.iter().zip(results.iter()) {
            if status.is_good() {
                if let Some(subscription) = subscriptions.subscription_mut(*id) {
                    subscription.set_publishing_enabled(publishing_enabled);
                }
            }
        }
        Ok(results)
    }

    /// Delete a subscription and drop its client-side state.
    pub async fn delete_subscription(&self, subscription_id: u32) -> Result<(), StatusCode> {
        let request = DeleteSubscriptionsRequest {
            request_header: self.channel.make_request_header(self.operation_timeout()),
            subscription_ids: Some(vec![subscription_id]),
        };
        let response = self
            .channel
            .send(request, self.operation_timeout())
            .await?;
        let ResponseMessage::DeleteSubscriptions(response) = response else {
            return Err(process_unexpected_response(response));
        };
        process_service_result(&response.response_header)?;
        self.subscriptions.lock().remove_subscription(subscription_id);
        let status = response
            .results
            .and_then(|r| r.first().copied())
            .unwrap_or(StatusCode::Good);
        if status.is_bad() {
            Err(status)
        } else {
            Ok(())
        }
    }

    /// Create monitored items on a subscription. Client handles are assigned by
    /// the session; the returned pairs map each created handle to its result.
    pub async fn create_monitored_items(
        &self,
        subscription_id: u32,
        timestamps_to_return: TimestampsToReturn,
        items_to_create: Vec<MonitoredItemCreate>,
    ) -> Result<Vec<(u32, MonitoredItemCreateResult)>, StatusCode> {
        if items_to_create.is_empty() {
            return Err(StatusCode::BadNothingToDo);
        }
        if self.subscriptions.lock().subscription(subscription_id).is_none() {
            return Err(StatusCode::BadSubscriptionIdInvalid);
        }

        // Assign handles first so notifications arriving mid-call can resolve
        let items: Vec<(u32, MonitoredItemCreate)> = items_to_create
            .into_iter()
            .map(|item| (self.next_monitored_item_handle(), item))
            .collect();

        let requests: Vec<MonitoredItemCreateRequest> = items
            .iter()
            .map(|(client_handle, item)| MonitoredItemCreateRequest {
                item_to_monitor: item.item_to_monitor.clone(),
                monitoring_mode: item.monitoring_mode,
                requested_parameters: MonitoringParameters {
                    client_handle: *client_handle,
                    sampling_interval: item.sampling_interval,
                    filter: item.filter.to_extension_object(),
                    queue_size: item.queue_size,
                    discard_oldest: item.discard_oldest,
                },
            })
            .collect();

        let request = CreateMonitoredItemsRequest {
            request_header: self.channel.make_request_header(self.operation_timeout()),
            subscription_id,
            timestamps_to_return,
            items_to_create: Some(requests),
        };
        let response = self
            .channel
            .send(request, self.operation_timeout())
            .await?;
        let ResponseMessage::CreateMonitoredItems(response) = response else {
            return Err(process_unexpected_response(response));
        };
        process_service_result(&response.response_header)?;
        let results = response.results.unwrap_or_default();
        if results.len() != items.len() {
            error!(
                "CreateMonitoredItems returned {} results for {} items",
                results.len(),
                items.len()
            );
            return Err(StatusCode::BadUnexpectedError);
        }

        let mut subscriptions = self.subscriptions.lock();
        let Some(subscription) = subscriptions.subscription_mut(subscription_id) else {
            return Err(StatusCode::BadSubscriptionIdInvalid);
        };
        let mut created = Vec::with_capacity(items.len());
        for ((client_handle, item), result) in items.into_iter().zip(results.into_iter()) {
            if result.status_code.is_good() {
                let mut monitored_item = MonitoredItem::new(
                    client_handle,
                    item.item_to_monitor,
                    item.monitoring_mode,
                    result.revised_sampling_interval,
                    result.revised_queue_size,
                    item.discard_oldest,
                    item.filter,
                    item.value_cache_size,
                );
                monitored_item.set_id(result.monitored_item_id);
                subscription.insert_item(monitored_item);
            } else {
                warn!(
                    "Monitored item for handle {} failed: {}",
                    client_handle, result.status_code
                );
            }
            created.push((client_handle, result));
        }
        Ok(created)
    }

    /// Modify monitored items by client handle: new sampling interval, queue size
    /// and filter per item. Revised values are adopted into the shadow state.
    pub async fn modify_monitored_items(
        &self,
        subscription_id: u32,
        timestamps_to_return: TimestampsToReturn,
        items_to_modify: &[(u32, f64, u32, MonitoredItemFilter)],
    ) -> Result<Vec<StatusCode>, StatusCode> {
        if items_to_modify.is_empty() {
            return Err(StatusCode::BadNothingToDo);
        }
        let handles: Vec<u32> = items_to_modify.iter().map(|(h, _, _, _)| *h).collect();
        let ids = self.resolve_item_ids(subscription_id, &handles)?;
        let requests: Vec<MonitoredItemModifyRequest> = items_to_modify
            .iter()
            .zip(ids.iter())
            .map(
                |((client_handle, sampling_interval, queue_size, filter), id)| {
                    MonitoredItemModifyRequest {
                        monitored_item_id: *id,
                        requested_parameters: MonitoringParameters {
                            client_handle: *client_handle,
                            sampling_interval: *sampling_interval,
                            filter: filter.to_extension_object(),
                            queue_size: *queue_size,
                            discard_oldest: true,
                        },
                    }
                },
            )
            .collect();
        let request = ModifyMonitoredItemsRequest {
            request_header: self.channel.make_request_header(self.operation_timeout()),
            subscription_id,
            timestamps_to_return,
            items_to_modify: Some(requests),
        };
        let response = self
            .channel
            .send(request, self.operation_timeout())
            .await?;
        let ResponseMessage::ModifyMonitoredItems(response) = response else {
            return Err(process_unexpected_response(response));
        };
        process_service_result(&response.response_header)?;
        let results = response.results.unwrap_or_default();
        let mut subscriptions = self.subscriptions.lock();
        if let Some(subscription) = subscriptions.subscription_mut(subscription_id) {
            for ((client_handle, _, _, filter), result) in
                items_to_modify.iter().zip(results.iter())
            {
                if result.status_code.is_good() {
                    if let Some(item) = subscription.item_mut(*client_handle) {
                        item.set_revised(
                            result.revised_sampling_interval,
                            result.revised_queue_size,
                        );
                        item.set_filter(filter.clone());
                    }
                }
            }
        }
        Ok(results.iter().map(|r| r.status_code).collect())
    }

    /// Delete monitored items by client handle.
    pub async fn delete_monitored_items(
        &self,
        subscription_id: u32,
        client_handles: &[u32],
    ) -> Result<Vec<StatusCode>, StatusCode> {
        if client_handles.is_empty() {
            return Err(StatusCode::BadNothingToDo);
        }
        let monitored_item_ids = self.resolve_item_ids(subscription_id, client_handles)?;
        let request = DeleteMonitoredItemsRequest {
            request_header: self.channel.make_request_header(self.operation_timeout()),
            subscription_id,
            monitored_item_ids: Some(monitored_item_ids),
        };
        let response = self
            .channel
            .send(request, self.operation_timeout())
            .await?;
        let ResponseMessage::DeleteMonitoredItems(response) = response else {
            return Err(process_unexpected_response(response));
        };
        process_service_result(&response.response_header)?;
        let results = response.results.unwrap_or_default();
        let mut subscriptions = self.subscriptions.lock();
        if let Some(subscription) = subscriptions.subscription_mut(subscription_id) {
            for (client_handle, status) in client_handles.iter().zip(results.iter()) {
                if status.is_good() {
                    subscription.remove_item(*client_handle);
                }
            }
        }
        Ok(results)
    }

    /// Change the monitoring mode of items by client handle.
    pub async fn set_monitoring_mode(
        &self,
        subscription_id: u32,
        monitoring_mode: MonitoringMode,
        client_handles: &[u32],
    ) -> Result<Vec<StatusCode>, StatusCode> {
        if client_handles.is_empty() {
            return Err(StatusCode::BadNothingToDo);
        }
        let monitored_item_ids = self.resolve_item_ids(subscription_id, client_handles)?;
        let request = SetMonitoringModeRequest {
            request_header: self.channel.make_request_header(self.operation_timeout()),
            subscription_id,
            monitoring_mode,
            monitored_item_ids: Some(monitored_item_ids),
        };
        let response = self
            .channel
            .send(request, self.operation_timeout())
            .await?;
        let ResponseMessage::SetMonitoringMode(response) = response else {
            return Err(process_unexpected_response(response));
        };
        process_service_result(&response.response_header)?;
        let results = response.results.unwrap_or_default();
        let mut subscriptions = self.subscriptions.lock();
        if let Some(subscription) = subscriptions.subscription_mut(subscription_id) {
            for (client_handle, status) in client_handles.iter().zip(results.iter()) {
                if status.is_good() {
                    if let Some(item) = subscription.item_mut(*client_handle) {
                        item.set_monitoring_mode(monitoring_mode);
                    }
                }
            }
        }
        Ok(results)
    }

    fn resolve_item_ids(
        &self,
        subscription_id: u32,
        client_handles: &[u32],
    ) -> Result<Vec<u32>, StatusCode> {
        let subscriptions = self.subscriptions.lock();
        let Some(subscription) = subscriptions.subscription(subscription_id) else {
            return Err(StatusCode::BadSubscriptionIdInvalid);
        };
        client_handles
            .iter()
            .map(|handle| {
                subscription
                    .item(*handle)
                    .map(|item| item.id())
                    .ok_or(StatusCode::BadMonitoredItemIdInvalid)
            })
            .collect()
    }

    /// Issue one publish request carrying the queued acknowledgements, wait for
    /// the server's notification and process it. Driven by the event loop, which
    /// keeps several of these outstanding.
    pub(crate) async fn publish_once(&self) -> Result<NotificationOutcome, StatusCode> {
        let (acks, timeout) = {
            let mut subscriptions = self.subscriptions.lock();
            (subscriptions.take_acks(), subscriptions.publish_timeout())
        };
        let request = PublishRequest {
            request_header: self.channel.make_request_header(timeout),
            subscription_acknowledgements: acks.clone(),
        };
        let response = match self.channel.send(request, timeout).await {
            Ok(response) => response,
            Err(e) => {
                // The acks were never delivered; keep them for the next attempt
                if let Some(acks) = acks {
                    self.subscriptions.lock().return_acks(acks);
                }
                return Err(e);
            }
        };
        let ResponseMessage::Publish(response) = response else {
            return Err(process_unexpected_response(response));
        };
        if response.response_header.service_result.is_bad() {
            return Err(response.response_header.service_result);
        }

        let subscription_id = response.subscription_id;
        let outcome = {
            let options = {
                let channel = self.channel.secure_channel.read();
                channel.decoding_options()
            };
            let mut subscriptions = self.subscriptions.lock();
            subscriptions.handle_notification(
                subscription_id,
                response.notification_message,
                &options,
            )
        };
        if response.more_notifications {
            debug!(
                "Subscription {} has more notifications queued",
                subscription_id
            );
        }
        Ok(outcome)
    }

    /// Recover one missed notification message by sequence number.
    pub(crate) async fn republish(
        &self,
        subscription_id: u32,
        retransmit_sequence_number: u32,
    ) -> Result<(), StatusCode> {
        let request = RepublishRequest {
            request_header: self.channel.make_request_header(self.operation_timeout()),
            subscription_id,
            retransmit_sequence_number,
        };
        let response = self
            .channel
            .send(request, self.operation_timeout())
            .await?;
        let ResponseMessage::Republish(response) = response else {
            return Err(process_unexpected_response(response));
        };
        process_service_result(&response.response_header)?;
        let options = {
            let channel = self.channel.secure_channel.read();
            channel.decoding_options()
        };
        self.subscriptions.lock().handle_republished_notification(
            subscription_id,
            response.notification_message,
            &options,
        );
        Ok(())
    }

    /// Recreate a subscription the server has abandoned: create a fresh one with
    /// the stored parameters and reattach every monitored item under it.
    pub(crate) async fn recreate_subscription(
        &self,
        old_subscription_id: u32,
    ) -> Result<u32, StatusCode> {
        // Pull the dead shadow out, keeping items and callback
        let Some(old) = self
            .subscriptions
            .lock()
            .remove_subscription(old_subscription_id)
        else {
            return Err(StatusCode::BadSubscriptionIdInvalid);
        };

        let request = CreateSubscriptionRequest {
            request_header: self.channel.make_request_header(self.operation_timeout()),
            requested_publishing_interval: old.publishing_interval().as_millis() as f64,
            requested_lifetime_count: old.lifetime_count(),
            requested_max_keep_alive_count: old.max_keep_alive_count(),
            max_notifications_per_publish: old.max_notifications_per_publish(),
            publishing_enabled: old.publishing_enabled(),
            priority: old.priority(),
        };
        let response = self
            .channel
            .send(request, self.operation_timeout())
            .await?;
        let ResponseMessage::CreateSubscription(response) = response else {
            return Err(process_unexpected_response(response));
        };
        process_service_result(&response.response_header)?;

        let mut subscription = old;
        let subscription_id = response.subscription_id;
        subscription.set_subscription_id(subscription_id);
        subscription.set_revised(
            Duration::from_millis(response.revised_publishing_interval.max(0.0) as u64),
            response.revised_lifetime_count,
            response.revised_max_keep_alive_count,
        );
        subscription.set_last_sequence_number(0);
        subscription.touch();

        // Reattach the items on the server, keeping their client handles
        let requests: Vec<MonitoredItemCreateRequest> = subscription
            .items_mut()
            .values()
            .map(|item| MonitoredItemCreateRequest {
                item_to_monitor: item.item_to_monitor().clone(),
                monitoring_mode: item.monitoring_mode(),
                requested_parameters: MonitoringParameters {
                    client_handle: item.client_handle(),
                    sampling_interval: item.sampling_interval(),
                    filter: item.filter().to_extension_object(),
                    queue_size: item.queue_size(),
                    discard_oldest: item.discard_oldest(),
                },
            })
            .collect();

        if !requests.is_empty() {
            let request = CreateMonitoredItemsRequest {
                request_header: self.channel.make_request_header(self.operation_timeout()),
                subscription_id,
                timestamps_to_return: TimestampsToReturn::Both,
                items_to_create: Some(requests.clone()),
            };
            let response = self
                .channel
                .send(request, self.operation_timeout())
                .await?;
            let ResponseMessage::CreateMonitoredItems(response) = response else {
                self.subscriptions.lock().add_subscription(subscription);
                return Err(process_unexpected_response(response));
            };
            if let Some(results) = &response.results {
                for (request, result) in requests.iter().zip(results.iter()) {
                    let client_handle = request.requested_parameters.client_handle;
                    if let Some(item) =
                        subscription.items_mut().get_mut(&client_handle)
                    {
                        if result.status_code.is_good() {
                            item.set_id(result.monitored_item_id);
                            item.set_revised(
                                result.revised_sampling_interval,
                                result.revised_queue_size,
                            );
                        } else {
                            warn!(
                                "Reattaching item {} failed: {}",
                                client_handle, result.status_code
                            );
                        }
                    }
                }
            }
        }

        self.subscriptions.lock().add_subscription(subscription);
        debug!(
            "Recreated subscription {} as {}",
            old_subscription_id, subscription_id
        );
        Ok(subscription_id)
    }

    /// Recreate every subscription after a reconnect.
    pub(crate) async fn recreate_all_subscriptions(&self) -> Result<(), StatusCode> {
        let ids = self.subscriptions.lock().subscription_ids();
        for id in ids {
            self.recreate_subscription(id).await?;
        }
        Ok(())
    }
}
