// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Subscription and monitored item services, and the notification payload types.

use crate::{
    data_value::DataValue,
    date_time::DateTime,
    diagnostic_info::DiagnosticInfo,
    encoding::{BinaryEncodable, DecodingOptions, EncodingResult},
    extension_object::ExtensionObject,
    request_header::RequestHeader,
    response_header::ResponseHeader,
    status_code::StatusCode,
    variant::Variant,
};

use super::{binary_struct, message_info, ua_enum, MessageInfo, ReadValueId};

ua_enum! {
    /// How a monitored item samples and reports.
    MonitoringMode {
        /// Neither sampling nor reporting.
        Disabled = 0,
        /// Sampling but queueing only; values come with the next Reporting item.
        Sampling = 1,
        /// Sampling and reporting.
        Reporting = 2,
    }
}

impl Default for MonitoringMode {
    fn default() -> Self {
        MonitoringMode::Reporting
    }
}

/// Sampling parameters of a monitored item.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MonitoringParameters {
    /// Client-assigned handle carried in every notification for this item.
    pub client_handle: u32,
    /// Sampling interval in milliseconds. -1 means the publishing interval.
    pub sampling_interval: f64,
    /// The filter, as an extension object envelope.
    pub filter: ExtensionObject,
    /// Server-side queue depth between publishes.
    pub queue_size: u32,
    /// On queue overflow, drop the oldest value instead of the newest.
    pub discard_oldest: bool,
}

binary_struct!(MonitoringParameters {
    client_handle,
    sampling_interval,
    filter,
    queue_size,
    discard_oldest,
});

/// One monitored item to create.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MonitoredItemCreateRequest {
    /// The node and attribute to monitor.
    pub item_to_monitor: ReadValueId,
    /// Initial monitoring mode.
    pub monitoring_mode: MonitoringMode,
    /// Sampling parameters.
    pub requested_parameters: MonitoringParameters,
}

binary_struct!(MonitoredItemCreateRequest {
    item_to_monitor,
    monitoring_mode,
    requested_parameters,
});

/// Result for one created monitored item.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MonitoredItemCreateResult {
    /// Outcome of the creation.
    pub status_code: StatusCode,
    /// Server-assigned id of the item within its subscription.
    pub monitored_item_id: u32,
    /// The sampling interval the server granted.
    pub revised_sampling_interval: f64,
    /// The queue size the server granted.
    pub revised_queue_size: u32,
    /// Result of filter negotiation, empty when the filter was accepted as is.
    pub filter_result: ExtensionObject,
}

binary_struct!(MonitoredItemCreateResult {
    status_code,
    monitored_item_id,
    revised_sampling_interval,
    revised_queue_size,
    filter_result,
});

/// Creates monitored items on a subscription.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CreateMonitoredItemsRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// The subscription to add items to.
    pub subscription_id: u32,
    /// Which timestamps notifications should carry.
    pub timestamps_to_return: super::TimestampsToReturn,
    /// The items to create.
    pub items_to_create: Option<Vec<MonitoredItemCreateRequest>>,
}

binary_struct!(CreateMonitoredItemsRequest {
    request_header,
    subscription_id,
    timestamps_to_return,
    items_to_create,
});
message_info!(CreateMonitoredItemsRequest, 751);

/// Response to [`CreateMonitoredItemsRequest`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CreateMonitoredItemsResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// One result per item, in request order.
    pub results: Option<Vec<MonitoredItemCreateResult>>,
    /// Operation diagnostics, if requested.
    pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
}

binary_struct!(CreateMonitoredItemsResponse {
    response_header,
    results,
    diagnostic_infos,
});
message_info!(CreateMonitoredItemsResponse, 754);

/// One monitored item to modify.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MonitoredItemModifyRequest {
    /// Server-assigned id of the item.
    pub monitored_item_id: u32,
    /// The new sampling parameters.
    pub requested_parameters: MonitoringParameters,
}

binary_struct!(MonitoredItemModifyRequest {
    monitored_item_id,
    requested_parameters,
});

/// Result for one modified monitored item.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MonitoredItemModifyResult {
    /// Outcome of the modification.
    pub status_code: StatusCode,
    /// The sampling interval the server granted.
    pub revised_sampling_interval: f64,
    /// The queue size the server granted.
    pub revised_queue_size: u32,
    /// Result of filter negotiation.
    pub filter_result: ExtensionObject,
}

binary_struct!(MonitoredItemModifyResult {
    status_code,
    revised_sampling_interval,
    revised_queue_size,
    filter_result,
});

/// Modifies monitored items on a subscription.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModifyMonitoredItemsRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// The subscription the items belong to.
    pub subscription_id: u32,
    /// Which timestamps notifications should carry.
    pub timestamps_to_return: super::TimestampsToReturn,
    /// The modifications to perform.
    pub items_to_modify: Option<Vec<MonitoredItemModifyRequest>>,
}

binary_struct!(ModifyMonitoredItemsRequest {
    request_header,
    subscription_id,
    timestamps_to_return,
    items_to_modify,
});
message_info!(ModifyMonitoredItemsRequest, 763);

/// Response to [`ModifyMonitoredItemsRequest`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModifyMonitoredItemsResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// One result per item, in request order.
    pub results: Option<Vec<MonitoredItemModifyResult>>,
    /// Operation diagnostics, if requested.
    pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
}

binary_struct!(ModifyMonitoredItemsResponse {
    response_header,
    results,
    diagnostic_infos,
});
message_info!(ModifyMonitoredItemsResponse, 766);

/// Changes the monitoring mode of items on a subscription.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SetMonitoringModeRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// The subscription the items belong to.
    pub subscription_id: u32,
    /// The mode to set.
    pub monitoring_mode: MonitoringMode,
    /// Server-assigned ids of the items to change.
    pub monitored_item_ids: Option<Vec<u32>>,
}

binary_struct!(SetMonitoringModeRequest {
    request_header,
    subscription_id,
    monitoring_mode,
    monitored_item_ids,
});
message_info!(SetMonitoringModeRequest, 769);

/// Response to [`SetMonitoringModeRequest`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SetMonitoringModeResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// One status per item, in request order.
    pub results: Option<Vec<StatusCode>>,
    /// Operation diagnostics, if requested.
    pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
}

binary_struct!(SetMonitoringModeResponse {
    response_header,
    results,
    diagnostic_infos,
});
message_info!(SetMonitoringModeResponse, 772);

/// Deletes monitored items from a subscription.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeleteMonitoredItemsRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// The subscription the items belong to.
    pub subscription_id: u32,
    /// Server-assigned ids of the items to delete.
    pub monitored_item_ids: Option<Vec<u32>>,
}

binary_struct!(DeleteMonitoredItemsRequest {
    request_header,
    subscription_id,
    monitored_item_ids,
});
message_info!(DeleteMonitoredItemsRequest, 781);

/// Response to [`DeleteMonitoredItemsRequest`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeleteMonitoredItemsResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// One status per item, in request order.
    pub results: Option<Vec<StatusCode>>,
    /// Operation diagnostics, if requested.
    pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
}

binary_struct!(DeleteMonitoredItemsResponse {
    response_header,
    results,
    diagnostic_infos,
});
message_info!(DeleteMonitoredItemsResponse, 784);

/// Creates a subscription.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CreateSubscriptionRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// Requested publishing interval in milliseconds.
    pub requested_publishing_interval: f64,
    /// Publish periods without a Publish request before the server deletes the
    /// subscription. Must be at least three times the keep-alive count.
    pub requested_lifetime_count: u32,
    /// Publish periods without data before the server sends a keep-alive.
    pub requested_max_keep_alive_count: u32,
    /// Limit on notifications per publish, 0 for none.
    pub max_notifications_per_publish: u32,
    /// Whether publishing starts enabled.
    pub publishing_enabled: bool,
    /// Relative priority against the session's other subscriptions.
    pub priority: u8,
}

binary_struct!(CreateSubscriptionRequest {
    request_header,
    requested_publishing_interval,
    requested_lifetime_count,
    requested_max_keep_alive_count,
    max_notifications_per_publish,
    publishing_enabled,
    priority,
});
message_info!(CreateSubscriptionRequest, 787);

/// Response to [`CreateSubscriptionRequest`]. The client adopts the revised values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CreateSubscriptionResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// Server-assigned subscription id, unique per server.
    pub subscription_id: u32,
    /// The publishing interval the server granted.
    pub revised_publishing_interval: f64,
    /// The lifetime count the server granted.
    pub revised_lifetime_count: u32,
    /// The keep-alive count the server granted.
    pub revised_max_keep_alive_count: u32,
}

binary_struct!(CreateSubscriptionResponse {
    response_header,
    subscription_id,
    revised_publishing_interval,
    revised_lifetime_count,
    revised_max_keep_alive_count,
});
message_info!(CreateSubscriptionResponse, 790);

/// Modifies a subscription's negotiated parameters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModifySubscriptionRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// The subscription to modify.
    pub subscription_id: u32,
    /// Requested publishing interval in milliseconds.
    pub requested_publishing_interval: f64,
    /// Requested lifetime count.
    pub requested_lifetime_count: u32,
    /// Requested keep-alive count.
    pub requested_max_keep_alive_count: u32,
    /// Limit on notifications per publish, 0 for none.
    pub max_notifications_per_publish: u32,
    /// Relative priority.
    pub priority: u8,
}

binary_struct!(ModifySubscriptionRequest {
    request_header,
    subscription_id,
    requested_publishing_interval,
    requested_lifetime_count,
    requested_max_keep_alive_count,
    max_notifications_per_publish,
    priority,
});
message_info!(ModifySubscriptionRequest, 793);

/// Response to [`ModifySubscriptionRequest`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModifySubscriptionResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// The publishing interval the server granted.
    pub revised_publishing_interval: f64,
    /// The lifetime count the server granted.
    pub revised_lifetime_count: u32,
    /// The keep-alive count the server granted.
    pub revised_max_keep_alive_count: u32,
}

binary_struct!(ModifySubscriptionResponse {
    response_header,
    revised_publishing_interval,
    revised_lifetime_count,
    revised_max_keep_alive_count,
});
message_info!(ModifySubscriptionResponse, 796);

/// Enables or disables publishing on subscriptions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SetPublishingModeRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// The new publishing enabled state.
    pub publishing_enabled: bool,
    /// The subscriptions to change.
    pub subscription_ids: Option<Vec<u32>>,
}

binary_struct!(SetPublishingModeRequest {
    request_header,
    publishing_enabled,
    subscription_ids,
});
message_info!(SetPublishingModeRequest, 799);

/// Response to [`SetPublishingModeRequest`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SetPublishingModeResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// One status per subscription, in request order.
    pub results: Option<Vec<StatusCode>>,
    /// Operation diagnostics, if requested.
    pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
}

binary_struct!(SetPublishingModeResponse {
    response_header,
    results,
    diagnostic_infos,
});
message_info!(SetPublishingModeResponse, 802);

/// Deletes subscriptions and everything monitored under them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeleteSubscriptionsRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// The subscriptions to delete.
    pub subscription_ids: Option<Vec<u32>>,
}

binary_struct!(DeleteSubscriptionsRequest {
    request_header,
    subscription_ids,
});
message_info!(DeleteSubscriptionsRequest, 847);

/// Response to [`DeleteSubscriptionsRequest`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeleteSubscriptionsResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// One status per subscription, in request order.
    pub results: Option<Vec<StatusCode>>,
    /// Operation diagnostics, if requested.
    pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
}

binary_struct!(DeleteSubscriptionsResponse {
    response_header,
    results,
    diagnostic_infos,
});
message_info!(DeleteSubscriptionsResponse, 850);

/// Confirms receipt of a notification message so the server can free it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubscriptionAcknowledgement {
    /// The subscription the message belonged to.
    pub subscription_id: u32,
    /// Sequence number of the received message.
    pub sequence_number: u32,
}

binary_struct!(SubscriptionAcknowledgement {
    subscription_id,
    sequence_number,
});

/// Asks the server for the next notification from any subscription, carrying the
/// acknowledgements accumulated since the previous publish.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PublishRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// Acknowledgements for messages received so far.
    pub subscription_acknowledgements: Option<Vec<SubscriptionAcknowledgement>>,
}

binary_struct!(PublishRequest {
    request_header,
    subscription_acknowledgements,
});
message_info!(PublishRequest, 826);

/// Response to [`PublishRequest`], delivering one notification message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PublishResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// The subscription the notification belongs to.
    pub subscription_id: u32,
    /// Sequence numbers of messages the server still holds unacknowledged.
    pub available_sequence_numbers: Option<Vec<u32>>,
    /// More notifications are queued beyond this message.
    pub more_notifications: bool,
    /// The notification payload.
    pub notification_message: NotificationMessage,
    /// One status per acknowledgement sent in the request.
    pub results: Option<Vec<StatusCode>>,
    /// Diagnostics per acknowledgement.
    pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
}

binary_struct!(PublishResponse {
    response_header,
    subscription_id,
    available_sequence_numbers,
    more_notifications,
    notification_message,
    results,
    diagnostic_infos,
});
message_info!(PublishResponse, 829);

/// Requests retransmission of a missed notification message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RepublishRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// The subscription the message belonged to.
    pub subscription_id: u32,
    /// Sequence number of the message to retransmit.
    pub retransmit_sequence_number: u32,
}

binary_struct!(RepublishRequest {
    request_header,
    subscription_id,
    retransmit_sequence_number,
});
message_info!(RepublishRequest, 832);

/// Response to [`RepublishRequest`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RepublishResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// The retransmitted message.
    pub notification_message: NotificationMessage,
}

binary_struct!(RepublishResponse {
    response_header,
    notification_message,
});
message_info!(RepublishResponse, 835);

/// Result of transferring one subscription between sessions.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransferResult {
    /// Outcome of the transfer.
    pub status_code: StatusCode,
    /// Sequence numbers available for republish after the transfer.
    pub available_sequence_numbers: Option<Vec<u32>>,
}

binary_struct!(TransferResult {
    status_code,
    available_sequence_numbers,
});

/// Moves subscriptions from another session onto this one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransferSubscriptionsRequest {
    /// Common request header.
    pub request_header: RequestHeader,
    /// The subscriptions to transfer.
    pub subscription_ids: Option<Vec<u32>>,
    /// Resend all unacknowledged messages after the transfer.
    pub send_initial_values: bool,
}

binary_struct!(TransferSubscriptionsRequest {
    request_header,
    subscription_ids,
    send_initial_values,
});
message_info!(TransferSubscriptionsRequest, 841);

/// Response to [`TransferSubscriptionsRequest`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransferSubscriptionsResponse {
    /// Common response header.
    pub response_header: ResponseHeader,
    /// One result per subscription, in request order.
    pub results: Option<Vec<TransferResult>>,
    /// Operation diagnostics, if requested.
    pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
}

binary_struct!(TransferSubscriptionsResponse {
    response_header,
    results,
    diagnostic_infos,
});
message_info!(TransferSubscriptionsResponse, 844);

/// A notification message carried by a publish or republish response. The
/// notification data are extension objects holding [`DataChangeNotification`],
/// [`EventNotificationList`] or [`StatusChangeNotification`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NotificationMessage {
    /// Sequence number of this message within its subscription, starting at 1.
    pub sequence_number: u32,
    /// The time the message was prepared.
    pub publish_time: DateTime,
    /// The notifications, empty for a keep-alive.
    pub notification_data: Option<Vec<ExtensionObject>>,
}

binary_struct!(NotificationMessage {
    sequence_number,
    publish_time,
    notification_data,
});

impl NotificationMessage {
    /// `true` when this message carries no notifications, i.e. it is a keep-alive.
    pub fn is_keep_alive(&self) -> bool {
        self.notification_data
            .as_ref()
            .map(|d| d.is_empty())
            .unwrap_or(true)
    }

    /// Decode the typed notifications in this message, skipping unknown types.
    pub fn notifications(
        &self,
        options: &DecodingOptions,
    ) -> EncodingResult<Vec<Notification>> {
        let mut result = Vec::new();
        let Some(data) = &self.notification_data else {
            return Ok(result);
        };
        for object in data {
            match object.node_id.as_ns0_u32() {
                Some(DataChangeNotification::TYPE_ID) => {
                    result.push(Notification::DataChange(object.decode_inner(options)?));
                }
                Some(EventNotificationList::TYPE_ID) => {
                    result.push(Notification::Event(object.decode_inner(options)?));
                }
                Some(StatusChangeNotification::TYPE_ID) => {
                    result.push(Notification::StatusChange(object.decode_inner(options)?));
                }
                _ => {
                    log::warn!(
                        "Skipping notification with unknown type id {}",
                        object.node_id
                    );
                }
            }
        }
        Ok(result)
    }
}

/// A decoded notification payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Monitored item value changes.
    DataChange(DataChangeNotification),
    /// Events.
    Event(EventNotificationList),
    /// A status change of the subscription itself.
    StatusChange(StatusChangeNotification),
}

/// One changed value, keyed by the monitored item's client handle.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MonitoredItemNotification {
    /// The client handle of the monitored item.
    pub client_handle: u32,
    /// The new value.
    pub value: DataValue,
}

binary_struct!(MonitoredItemNotification {
    client_handle,
    value,
});

/// A batch of data change notifications.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataChangeNotification {
    /// The changed values.
    pub monitored_items: Option<Vec<MonitoredItemNotification>>,
    /// Operation diagnostics, if requested.
    pub diagnostic_infos: Option<Vec<DiagnosticInfo>>,
}

binary_struct!(DataChangeNotification {
    monitored_items,
    diagnostic_infos,
});
message_info!(DataChangeNotification, 811);

/// The selected fields of one event, keyed by the monitored item's client handle.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventFieldList {
    /// The client handle of the monitored item.
    pub client_handle: u32,
    /// Field values in select clause order.
    pub event_fields: Option<Vec<Variant>>,
}

binary_struct!(EventFieldList {
    client_handle,
    event_fields,
});

/// A batch of event notifications.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventNotificationList {
    /// The events.
    pub events: Option<Vec<EventFieldList>>,
}

binary_struct!(EventNotificationList { events });
message_info!(EventNotificationList, 916);

/// Tells the client the subscription changed state on the server, e.g. timed out.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatusChangeNotification {
    /// The new status, e.g. `BadTimeout`.
    pub status: StatusCode,
    /// Diagnostics for the change.
    pub diagnostic_info: DiagnosticInfo,
}

binary_struct!(StatusChangeNotification {
    status,
    diagnostic_info,
});
message_info!(StatusChangeNotification, 820);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::Variant;

    #[test]
    fn keep_alive_detection() {
        let msg = NotificationMessage {
            sequence_number: 4,
            publish_time: DateTime::now(),
            notification_data: None,
        };
        assert!(msg.is_keep_alive());
        let msg = NotificationMessage {
            notification_data: Some(vec![]),
            ..msg
        };
        assert!(msg.is_keep_alive());
    }

    #[test]
    fn typed_notification_round_trip() {
        let data_change = DataChangeNotification {
            monitored_items: Some(vec![MonitoredItemNotification {
                client_handle: 7,
                value: DataValue::new_now(Variant::from(3.25f64)),
            }]),
            diagnostic_infos: None,
        };
        let msg = NotificationMessage {
            sequence_number: 1,
            publish_time: DateTime::now(),
            notification_data: Some(vec![ExtensionObject::from_message(
                data_change.type_id(),
                &data_change,
            )]),
        };
        assert!(!msg.is_keep_alive());
        let decoded = msg.notifications(&DecodingOptions::default()).unwrap();
        assert_eq!(decoded, vec![Notification::DataChange(data_change)]);
    }
}
