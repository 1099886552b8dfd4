// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Bookkeeping shared by the publish loop and the subscription services: the
//! subscription map, the acknowledgement queue and gap tracking for republish.

use std::time::{Duration, Instant};

use hashbrown::HashMap;
use log::{debug, error, warn};

use ualite_types::{
    DecodingOptions, Notification, NotificationMessage, StatusCode,
    SubscriptionAcknowledgement,
};

use super::Subscription;

/// What the publish loop should do after a notification was processed.
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct NotificationOutcome {
    /// The subscription the notification belonged to.
    pub subscription_id: Option<u32>,
    /// Sequence numbers that were skipped and should be republished.
    pub missing: Vec<u32>,
    /// The subscription reported a fatal status and must be recreated.
    pub recreate: bool,
}

/// The session's set of subscriptions and the publish bookkeeping around them.
pub(crate) struct SubscriptionState {
    /// Subscriptions by server-assigned id.
    subscriptions: HashMap<u32, Subscription>,
    /// Acknowledgements to send with the next publish request.
    pending_acks: Vec<SubscriptionAcknowledgement>,
}

impl SubscriptionState {
    pub(crate) fn new() -> SubscriptionState {
        SubscriptionState {
            subscriptions: HashMap::new(),
            pending_acks: Vec::new(),
        }
    }

    pub(crate) fn add_subscription(&mut self, subscription: Subscription) {
        self.subscriptions
            .insert(subscription.subscription_id(), subscription);
    }

    pub(crate) fn remove_subscription(&mut self, subscription_id: u32) -> Option<Subscription> {
        self.pending_acks
            .retain(|ack| ack.subscription_id != subscription_id);
        self.subscriptions.remove(&subscription_id)
    }

    pub(crate) fn subscription(&self, subscription_id: u32) -> Option<&Subscription> {
        self.subscriptions.get(&subscription_id)
    }

    pub(crate) fn subscription_mut(&mut self, subscription_id: u32) -> Option<&mut Subscription> {
        self.subscriptions.get_mut(&subscription_id)
    }

    pub(crate) fn subscription_ids(&self) -> Vec<u32> {
        self.subscriptions.keys().copied().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// The shortest publishing interval across subscriptions, governing how the
    /// publish loop paces itself.
    pub(crate) fn min_publishing_interval(&self) -> Option<Duration> {
        self.subscriptions
            .values()
            .map(|s| s.publishing_interval())
            .min()
    }

    /// A publish response timeout spanning the longest keep-alive period plus
    /// slack, per the negotiated counts.
    pub(crate) fn publish_timeout(&self) -> Duration {
        let longest = self
            .subscriptions
            .values()
            .map(|s| s.publishing_interval() * s.max_keep_alive_count().max(1))
            .max()
            .unwrap_or(Duration::from_secs(30));
        longest + longest / 4 + Duration::from_secs(1)
    }

    /// Take every queued acknowledgement for the next publish request.
    pub(crate) fn take_acks(&mut self) -> Option<Vec<SubscriptionAcknowledgement>> {
        if self.pending_acks.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending_acks))
        }
    }

    /// Put unacknowledged acks back, e.g. when a publish request failed to send.
    pub(crate) fn return_acks(&mut self, acks: Vec<SubscriptionAcknowledgement>) {
        self.pending_acks.extend(acks);
    }

    /// Subscriptions that have been silent past their whole lifetime and must be
    /// recreated on the server.
    pub(crate) fn stale_subscriptions(&self, now: Instant) -> Vec<u32> {
        self.subscriptions
            .values()
            .filter(|s| now.duration_since(s.last_activity()) > s.lifetime())
            .map(|s| s.subscription_id())
            .collect()
    }

    /// Process one notification message: detect gaps, queue the acknowledgement,
    /// dispatch notifications to items, and report what the publish loop should
    /// do next.
    pub(crate) fn handle_notification(
        &mut self,
        subscription_id: u32,
        message: NotificationMessage,
        options: &DecodingOptions,
    ) -> NotificationOutcome {
        let mut outcome = NotificationOutcome {
            subscription_id: Some(subscription_id),
            ..Default::default()
        };
        let Some(subscription) = self.subscriptions.get_mut(&subscription_id) else {
            warn!(
                "Notification for unknown subscription {}, ignoring",
                subscription_id
            );
            return outcome;
        };
        subscription.touch();

        let sequence_number = message.sequence_number;
        let expected = subscription.last_sequence_number().wrapping_add(1);
        // Keep-alives repeat the next sequence number without consuming it, so
        // only flag gaps forward of the expectation
        if sequence_number > expected && subscription.last_sequence_number() != 0 {
            outcome.missing = (expected..sequence_number).collect();
            debug!(
                "Subscription {} jumped from {} to {}, republishing {} messages",
                subscription_id,
                expected.wrapping_sub(1),
                sequence_number,
                outcome.missing.len()
            );
        }

        if message.is_keep_alive() {
            // A keep-alive does not consume its sequence number, but it still
            // must be acknowledged so the server can drop retransmission state
            self.pending_acks.push(SubscriptionAcknowledgement {
                subscription_id,
                sequence_number,
            });
            return outcome;
        }

        subscription.set_last_sequence_number(sequence_number);
        self.pending_acks.push(SubscriptionAcknowledgement {
            subscription_id,
            sequence_number,
        });

        outcome.recreate |= Self::dispatch(subscription, &message, options);
        outcome
    }

    /// Dispatch a republished message without touching the ack queue.
    pub(crate) fn handle_republished_notification(
        &mut self,
        subscription_id: u32,
        message: NotificationMessage,
        options: &DecodingOptions,
    ) {
        let Some(subscription) = self.subscriptions.get_mut(&subscription_id) else {
            return;
        };
        Self::dispatch(subscription, &message, options);
    }

    // Returns true when a status change demands recreation.
    fn dispatch(
        subscription: &mut Subscription,
        message: &NotificationMessage,
        options: &DecodingOptions,
    ) -> bool {
        let notifications = match message.notifications(options) {
            Ok(notifications) => notifications,
            Err(e) => {
                error!(
                    "Could not decode notifications for subscription {}: {}",
                    subscription.subscription_id(),
                    e
                );
                return false;
            }
        };
        let mut recreate = false;
        for notification in notifications {
            match notification {
                Notification::DataChange(data_change) => {
                    for item_notification in data_change.monitored_items.unwrap_or_default() {
                        subscription.on_data_value(
                            item_notification.client_handle,
                            item_notification.value,
                        );
                    }
                }
                Notification::Event(events) => {
                    for event in events.events.unwrap_or_default() {
                        subscription.on_event(event.client_handle, event.event_fields);
                    }
                }
                Notification::StatusChange(status_change) => {
                    warn!(
                        "Subscription {} status changed to {}",
                        subscription.subscription_id(),
                        status_change.status
                    );
                    if status_change.status.sub_code() == StatusCode::BadTimeout {
                        recreate = true;
                    }
                    subscription.on_status_change(status_change);
                }
            }
        }
        recreate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::services::subscriptions::DataChangeCallback;
    use ualite_types::{
        DataChangeNotification, DataValue, DateTime, ExtensionObject, MessageInfo,
        MonitoredItemNotification, ReadValueId, Variant,
    };

    fn test_subscription(id: u32) -> Subscription {
        Subscription::new(
            id,
            Duration::from_millis(100),
            60,
            10,
            0,
            true,
            0,
            Box::new(DataChangeCallback::new(|_, _| {})),
        )
    }

    fn data_change_message(sequence_number: u32, client_handle: u32) -> NotificationMessage {
        let data_change = DataChangeNotification {
            monitored_items: Some(vec![MonitoredItemNotification {
                client_handle,
                value: DataValue::new_now(Variant::from(1i32)),
            }]),
            diagnostic_infos: None,
        };
        NotificationMessage {
            sequence_number,
            publish_time: DateTime::now(),
            notification_data: Some(vec![ExtensionObject::from_message(
                data_change.type_id(),
                &data_change,
            )]),
        }
    }

    fn keep_alive_message(sequence_number: u32) -> NotificationMessage {
        NotificationMessage {
            sequence_number,
            publish_time: DateTime::now(),
            notification_data: None,
        }
    }

    fn add_item(state: &mut SubscriptionState, subscription_id: u32, client_handle: u32) {
        let sub = state.subscription_mut(subscription_id).unwrap();
        sub.insert_item(crate::session::services::subscriptions::MonitoredItem::new(
            client_handle,
            ReadValueId::default(),
            ualite_types::MonitoringMode::Reporting,
            100.0,
            10,
            true,
            ualite_types::MonitoredItemFilter::None,
            10,
        ));
    }

    #[test]
    fn acks_accumulate_until_taken() {
        let options = DecodingOptions::default();
        let mut state = SubscriptionState::new();
        state.add_subscription(test_subscription(1));
        add_item(&mut state, 1, 7);

        state.handle_notification(1, data_change_message(1, 7), &options);
        state.handle_notification(1, data_change_message(2, 7), &options);

        let acks = state.take_acks().unwrap();
        assert_eq!(acks.len(), 2);
        assert_eq!(acks[0].sequence_number, 1);
        assert_eq!(acks[1].sequence_number, 2);
        // Taken means gone
        assert!(state.take_acks().is_none());
    }

    #[test]
    fn value_reaches_the_item_cache() {
        let options = DecodingOptions::default();
        let mut state = SubscriptionState::new();
        state.add_subscription(test_subscription(1));
        add_item(&mut state, 1, 7);

        state.handle_notification(1, data_change_message(1, 7), &options);
        let sub = state.subscription_mut(1).unwrap();
        let item = sub.item_mut(7).unwrap();
        assert!(item.last_value().is_some());
        assert_eq!(item.drain_values().len(), 1);
        assert!(item.last_value().is_none());
    }

    #[test]
    fn gap_triggers_republish_list() {
        let options = DecodingOptions::default();
        let mut state = SubscriptionState::new();
        state.add_subscription(test_subscription(1));
        add_item(&mut state, 1, 7);

        state.handle_notification(1, data_change_message(1, 7), &options);
        let outcome = state.handle_notification(1, data_change_message(4, 7), &options);
        assert_eq!(outcome.missing, vec![2, 3]);
    }

    #[test]
    fn keep_alive_is_acked_but_does_not_advance() {
        let options = DecodingOptions::default();
        let mut state = SubscriptionState::new();
        state.add_subscription(test_subscription(1));
        add_item(&mut state, 1, 7);

        state.handle_notification(1, data_change_message(1, 7), &options);
        // Keep-alive carries the next, unconsumed sequence number
        let outcome = state.handle_notification(1, keep_alive_message(2), &options);
        assert!(outcome.missing.is_empty());
        assert_eq!(state.subscription(1).unwrap().last_sequence_number(), 1);
        // The real message 2 arrives later without a gap
        let outcome = state.handle_notification(1, data_change_message(2, 7), &options);
        assert!(outcome.missing.is_empty());
        let acks = state.take_acks().unwrap();
        assert_eq!(acks.len(), 3);
    }

    #[test]
    fn first_message_of_a_fresh_subscription_is_never_a_gap() {
        let options = DecodingOptions::default();
        let mut state = SubscriptionState::new();
        state.add_subscription(test_subscription(1));
        add_item(&mut state, 1, 7);
        // Server starts at some sequence > 1, e.g. after a transfer
        let outcome = state.handle_notification(1, data_change_message(5, 7), &options);
        assert!(outcome.missing.is_empty());
    }
}
