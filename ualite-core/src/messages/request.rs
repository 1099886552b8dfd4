// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use ualite_types::service::*;

use super::message_enum;
use crate::comms::tcp_types::MessageType;

message_enum! {
    RequestMessage, request_header,
    OpenSecureChannel: OpenSecureChannelRequest,
    CloseSecureChannel: CloseSecureChannelRequest,
    GetEndpoints: GetEndpointsRequest,
    CreateSession: CreateSessionRequest,
    ActivateSession: ActivateSessionRequest,
    CloseSession: CloseSessionRequest,
    Browse: BrowseRequest,
    BrowseNext: BrowseNextRequest,
    RegisterNodes: RegisterNodesRequest,
    UnregisterNodes: UnregisterNodesRequest,
    Read: ReadRequest,
    Write: WriteRequest,
    Call: CallRequest,
    CreateMonitoredItems: CreateMonitoredItemsRequest,
    ModifyMonitoredItems: ModifyMonitoredItemsRequest,
    SetMonitoringMode: SetMonitoringModeRequest,
    DeleteMonitoredItems: DeleteMonitoredItemsRequest,
    CreateSubscription: CreateSubscriptionRequest,
    ModifySubscription: ModifySubscriptionRequest,
    SetPublishingMode: SetPublishingModeRequest,
    DeleteSubscriptions: DeleteSubscriptionsRequest,
    TransferSubscriptions: TransferSubscriptionsRequest,
    Publish: PublishRequest,
    Republish: RepublishRequest,
}

impl RequestMessage {
    /// The transport message type the request travels in.
    pub fn chunk_message_type(&self) -> MessageType {
        match self {
            Self::OpenSecureChannel(_) => MessageType::OpenSecureChannel,
            Self::CloseSecureChannel(_) => MessageType::CloseSecureChannel,
            _ => MessageType::Message,
        }
    }
}
