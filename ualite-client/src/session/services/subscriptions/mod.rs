// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Client-side subscription state: the shadow of every server subscription and
//! monitored item, and the notification sink interface.

pub(crate) mod state;

mod service;
pub use service::MonitoredItemCreate;

use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use hashbrown::HashMap;

use ualite_types::{
    DataValue, MonitoredItemFilter, MonitoringMode, ReadValueId, StatusCode,
    StatusChangeNotification, Variant,
};

/// Default depth of a monitored item's local value cache.
pub const DEFAULT_VALUE_CACHE_SIZE: usize = 10;

/// Callbacks for everything a subscription delivers. Implement it directly or use
/// [`SubscriptionCallbacks`] / [`DataChangeCallback`] / [`EventCallback`] to wrap
/// closures. Calls arrive in notification order per subscription.
pub trait OnSubscriptionNotification: Send + Sync {
    /// The subscription changed state on the server, e.g. it timed out.
    #[allow(unused_variables)]
    fn on_subscription_status_change(&mut self, notification: StatusChangeNotification) {}

    /// A monitored item received a new value. Fires before the value enters the
    /// item's local cache.
    #[allow(unused_variables)]
    fn on_data_value(&mut self, notification: DataValue, item: &MonitoredItem) {}

    /// A monitored item received an event.
    #[allow(unused_variables)]
    fn on_event(&mut self, event_fields: Option<Vec<Variant>>, item: &MonitoredItem) {}
}

type StatusChangeCallbackFun = dyn FnMut(StatusChangeNotification) + Send + Sync;
type DataChangeCallbackFun = dyn FnMut(DataValue, &MonitoredItem) + Send + Sync;
type EventCallbackFun = dyn FnMut(Option<Vec<Variant>>, &MonitoredItem) + Send + Sync;

/// [`OnSubscriptionNotification`] from three closures.
pub struct SubscriptionCallbacks {
    status_change: Box<StatusChangeCallbackFun>,
    data_value: Box<DataChangeCallbackFun>,
    event: Box<EventCallbackFun>,
}

impl SubscriptionCallbacks {
    /// Wrap the three callbacks.
    pub fn new(
        status_change: impl FnMut(StatusChangeNotification) + Send + Sync + 'static,
        data_value: impl FnMut(DataValue, &MonitoredItem) + Send + Sync + 'static,
        event: impl FnMut(Option<Vec<Variant>>, &MonitoredItem) + Send + Sync + 'static,
    ) -> Self {
        Self {
            status_change: Box::new(status_change),
            data_value: Box::new(data_value),
            event: Box::new(event),
        }
    }
}

impl OnSubscriptionNotification for SubscriptionCallbacks {
    fn on_subscription_status_change(&mut self, notification: StatusChangeNotification) {
        (self.status_change)(notification);
    }

    fn on_data_value(&mut self, notification: DataValue, item: &MonitoredItem) {
        (self.data_value)(notification, item);
    }

    fn on_event(&mut self, event_fields: Option<Vec<Variant>>, item: &MonitoredItem) {
        (self.event)(event_fields, item);
    }
}

/// [`OnSubscriptionNotification`] from a single data change closure.
pub struct DataChangeCallback {
    data_value: Box<DataChangeCallbackFun>,
}

impl DataChangeCallback {
    /// Wrap the callback.
    pub fn new(data_value: impl FnMut(DataValue, &MonitoredItem) + Send + Sync + 'static) -> Self {
        Self {
            data_value: Box::new(data_value),
        }
    }
}

impl OnSubscriptionNotification for DataChangeCallback {
    fn on_data_value(&mut self, notification: DataValue, item: &MonitoredItem) {
        (self.data_value)(notification, item);
    }
}

/// [`OnSubscriptionNotification`] from a single event closure.
pub struct EventCallback {
    event: Box<EventCallbackFun>,
}

impl EventCallback {
    /// Wrap the callback.
    pub fn new(
        event: impl FnMut(Option<Vec<Variant>>, &MonitoredItem) + Send + Sync + 'static,
    ) -> Self {
        Self {
            event: Box::new(event),
        }
    }
}

impl OnSubscriptionNotification for EventCallback {
    fn on_event(&mut self, event_fields: Option<Vec<Variant>>, item: &MonitoredItem) {
        (self.event)(event_fields, item);
    }
}

/// The client-side shadow of a monitored item.
#[derive(Debug)]
pub struct MonitoredItem {
    /// Server-assigned id within the subscription.
    id: u32,
    /// Client-assigned handle, unique per session, carried in notifications.
    client_handle: u32,
    /// What is being monitored.
    item_to_monitor: ReadValueId,
    /// Monitoring mode.
    monitoring_mode: MonitoringMode,
    /// Sampling interval in milliseconds as revised by the server.
    sampling_interval: f64,
    /// Queue size as revised by the server.
    queue_size: u32,
    /// Whether the server discards oldest on overflow.
    discard_oldest: bool,
    /// The active filter.
    filter: MonitoredItemFilter,
    /// Status of the most recent value.
    last_status: StatusCode,
    /// The most recent values, newest last, bounded.
    values: VecDeque<DataValue>,
    value_cache_size: usize,
}

impl MonitoredItem {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        client_handle: u32,
        item_to_monitor: ReadValueId,
        monitoring_mode: MonitoringMode,
        sampling_interval: f64,
        queue_size: u32,
        discard_oldest: bool,
        filter: MonitoredItemFilter,
        value_cache_size: usize,
    ) -> MonitoredItem {
        let value_cache_size = value_cache_size.max(1);
        MonitoredItem {
            id: 0,
            client_handle,
            item_to_monitor,
            monitoring_mode,
            sampling_interval,
            queue_size,
            discard_oldest,
            filter,
            last_status: StatusCode::Good,
            values: VecDeque::with_capacity(value_cache_size),
            value_cache_size,
        }
    }

    /// Server-assigned id of the item.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Client handle of the item.
    pub fn client_handle(&self) -> u32 {
        self.client_handle
    }

    /// The monitored node and attribute.
    pub fn item_to_monitor(&self) -> &ReadValueId {
        &self.item_to_monitor
    }

    /// Monitoring mode.
    pub fn monitoring_mode(&self) -> MonitoringMode {
        self.monitoring_mode
    }

    /// Revised sampling interval in milliseconds.
    pub fn sampling_interval(&self) -> f64 {
        self.sampling_interval
    }

    /// Revised queue size.
    pub fn queue_size(&self) -> u32 {
        self.queue_size
    }

    /// Whether oldest values are dropped on server-side overflow.
    pub fn discard_oldest(&self) -> bool {
        self.discard_oldest
    }

    /// The active filter.
    pub fn filter(&self) -> &MonitoredItemFilter {
        &self.filter
    }

    /// Status of the most recently received value.
    pub fn last_status(&self) -> StatusCode {
        self.last_status
    }

    /// The most recent value still cached.
    pub fn last_value(&self) -> Option<&DataValue> {
        self.values.back()
    }

    /// Take every cached value, oldest first.
    pub fn drain_values(&mut self) -> Vec<DataValue> {
        self.values.drain(..).collect()
    }

    pub(crate) fn set_id(&mut self, id: u32) {
        self.id = id;
    }

    pub(crate) fn set_revised(&mut self, sampling_interval: f64, queue_size: u32) {
        self.sampling_interval = sampling_interval;
        self.queue_size = queue_size;
    }

    pub(crate) fn set_filter(&mut self, filter: MonitoredItemFilter) {
        self.filter = filter;
    }

    pub(crate) fn set_monitoring_mode(&mut self, monitoring_mode: MonitoringMode) {
        self.monitoring_mode = monitoring_mode;
    }

    pub(crate) fn push_value(&mut self, value: DataValue) {
        self.last_status = value.status();
        while self.values.len() >= self.value_cache_size {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }
}

/// The client-side shadow of a subscription: negotiated parameters, its items and
/// the notification sink.
pub struct Subscription {
    /// Server-assigned subscription id.
    subscription_id: u32,
    /// Revised publishing interval.
    publishing_interval: Duration,
    /// Revised lifetime count.
    lifetime_count: u32,
    /// Revised keep-alive count.
    max_keep_alive_count: u32,
    /// Requested cap on notifications per publish.
    max_notifications_per_publish: u32,
    /// Whether publishing is enabled.
    publishing_enabled: bool,
    /// Priority relative to the session's other subscriptions.
    priority: u8,
    /// Items keyed by client handle.
    items: HashMap<u32, MonitoredItem>,
    /// The notification sink.
    callback: Box<dyn OnSubscriptionNotification>,
    /// Sequence number of the last delivered notification message.
    last_sequence_number: u32,
    /// When the subscription last produced a notification or keep-alive.
    last_activity: Instant,
}

impl Subscription {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        subscription_id: u32,
        publishing_interval: Duration,
        lifetime_count: u32,
        max_keep_alive_count: u32,
        max_notifications_per_publish: u32,
        publishing_enabled: bool,
        priority: u8,
        callback: Box<dyn OnSubscriptionNotification>,
    ) -> Subscription {
        Subscription {
            subscription_id,
            publishing_interval,
            lifetime_count,
            max_keep_alive_count,
            max_notifications_per_publish,
            publishing_enabled,
            priority,
            items: HashMap::new(),
            callback,
            last_sequence_number: 0,
            last_activity: Instant::now(),
        }
    }

    /// Server-assigned id.
    pub fn subscription_id(&self) -> u32 {
        self.subscription_id
    }

    /// The revised publishing interval.
    pub fn publishing_interval(&self) -> Duration {
        self.publishing_interval
    }

    /// The revised lifetime count.
    pub fn lifetime_count(&self) -> u32 {
        self.lifetime_count
    }

    /// The revised keep-alive count.
    pub fn max_keep_alive_count(&self) -> u32 {
        self.max_keep_alive_count
    }

    /// The requested cap on notifications per publish.
    pub fn max_notifications_per_publish(&self) -> u32 {
        self.max_notifications_per_publish
    }

    /// Whether publishing is enabled.
    pub fn publishing_enabled(&self) -> bool {
        self.publishing_enabled
    }

    /// Priority relative to the session's other subscriptions.
    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// A monitored item by client handle.
    pub fn item(&self, client_handle: u32) -> Option<&MonitoredItem> {
        self.items.get(&client_handle)
    }

    /// A monitored item by client handle, mutable.
    pub fn item_mut(&mut self, client_handle: u32) -> Option<&mut MonitoredItem> {
        self.items.get_mut(&client_handle)
    }

    /// Every item's client handle.
    pub fn client_handles(&self) -> Vec<u32> {
        self.items.keys().copied().collect()
    }

    /// Time before which the server deletes an unheard-from subscription: the
    /// publishing interval times the lifetime count.
    pub fn lifetime(&self) -> Duration {
        self.publishing_interval * self.lifetime_count.max(1)
    }

    pub(crate) fn set_revised(
        &mut self,
        publishing_interval: Duration,
        lifetime_count: u32,
        max_keep_alive_count: u32,
    ) {
        self.publishing_interval = publishing_interval;
        self.lifetime_count = lifetime_count;
        self.max_keep_alive_count = max_keep_alive_count;
    }

    pub(crate) fn set_publishing_enabled(&mut self, enabled: bool) {
        self.publishing_enabled = enabled;
    }

    pub(crate) fn set_subscription_id(&mut self, subscription_id: u32) {
        self.subscription_id = subscription_id;
    }

    pub(crate) fn last_sequence_number(&self) -> u32 {
        self.last_sequence_number
    }

    pub(crate) fn set_last_sequence_number(&mut self, sequence_number: u32) {
        self.last_sequence_number = sequence_number;
    }

    pub(crate) fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub(crate) fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub(crate) fn insert_item(&mut self, item: MonitoredItem) {
        self.items.insert(item.client_handle(), item);
    }

    pub(crate) fn remove_item(&mut self, client_handle: u32) -> Option<MonitoredItem> {
        self.items.remove(&client_handle)
    }

    pub(crate) fn items_mut(&mut self) -> &mut HashMap<u32, MonitoredItem> {
        &mut self.items
    }

    pub(crate) fn on_data_value(&mut self, client_handle: u32, value: DataValue) {
        if let Some(item) = self.items.get_mut(&client_handle) {
            self.callback.on_data_value(value.clone(), item);
            item.push_value(value);
        } else {
            log::warn!(
                "Data change for unknown client handle {} on subscription {}",
                client_handle,
                self.subscription_id
            );
        }
    }

    pub(crate) fn on_event(&mut self, client_handle: u32, event_fields: Option<Vec<Variant>>) {
        if let Some(item) = self.items.get(&client_handle) {
            self.callback.on_event(event_fields, item);
        } else {
            log::warn!(
                "Event for unknown client handle {} on subscription {}",
                client_handle,
                self.subscription_id
            );
        }
    }

    pub(crate) fn on_status_change(&mut self, notification: StatusChangeNotification) {
        self.callback.on_subscription_status_change(notification);
    }
}
