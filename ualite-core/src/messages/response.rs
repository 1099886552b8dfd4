// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use ualite_types::service::*;
use ualite_types::ResponseHeader;

use super::message_enum;
use crate::comms::tcp_types::MessageType;

message_enum! {
    ResponseMessage, response_header,
    OpenSecureChannel: OpenSecureChannelResponse,
    CloseSecureChannel: CloseSecureChannelResponse,
    GetEndpoints: GetEndpointsResponse,
    CreateSession: CreateSessionResponse,
    ActivateSession: ActivateSessionResponse,
    CloseSession: CloseSessionResponse,
    Browse: BrowseResponse,
    BrowseNext: BrowseNextResponse,
    RegisterNodes: RegisterNodesResponse,
    UnregisterNodes: UnregisterNodesResponse,
    Read: ReadResponse,
    Write: WriteResponse,
    Call: CallResponse,
    CreateMonitoredItems: CreateMonitoredItemsResponse,
    ModifyMonitoredItems: ModifyMonitoredItemsResponse,
    SetMonitoringMode: SetMonitoringModeResponse,
    DeleteMonitoredItems: DeleteMonitoredItemsResponse,
    CreateSubscription: CreateSubscriptionResponse,
    ModifySubscription: ModifySubscriptionResponse,
    SetPublishingMode: SetPublishingModeResponse,
    DeleteSubscriptions: DeleteSubscriptionsResponse,
    TransferSubscriptions: TransferSubscriptionsResponse,
    Publish: PublishResponse,
    Republish: RepublishResponse,
    ServiceFault: ServiceFault,
}

impl ResponseMessage {
    /// The transport message type the response travels in.
    pub fn chunk_message_type(&self) -> MessageType {
        match self {
            Self::OpenSecureChannel(_) => MessageType::OpenSecureChannel,
            Self::CloseSecureChannel(_) => MessageType::CloseSecureChannel,
            _ => MessageType::Message,
        }
    }

    /// The response header of whichever message this is.
    pub fn response_header(&self) -> &ResponseHeader {
        match self {
            Self::OpenSecureChannel(v) => &v.response_header,
            Self::CloseSecureChannel(v) => &v.response_header,
            Self::GetEndpoints(v) => &v.response_header,
            Self::CreateSession(v) => &v.response_header,
            Self::ActivateSession(v) => &v.response_header,
            Self::CloseSession(v) => &v.response_header,
            Self::Browse(v) => &v.response_header,
            Self::BrowseNext(v) => &v.response_header,
            Self::RegisterNodes(v) => &v.response_header,
            Self::UnregisterNodes(v) => &v.response_header,
            Self::Read(v) => &v.response_header,
            Self::Write(v) => &v.response_header,
            Self::Call(v) => &v.response_header,
            Self::CreateMonitoredItems(v) => &v.response_header,
            Self::ModifyMonitoredItems(v) => &v.response_header,
            Self::SetMonitoringMode(v) => &v.response_header,
            Self::DeleteMonitoredItems(v) => &v.response_header,
            Self::CreateSubscription(v) => &v.response_header,
            Self::ModifySubscription(v) => &v.response_header,
            Self::SetPublishingMode(v) => &v.response_header,
            Self::DeleteSubscriptions(v) => &v.response_header,
            Self::TransferSubscriptions(v) => &v.response_header,
            Self::Publish(v) => &v.response_header,
            Self::Republish(v) => &v.response_header,
            Self::ServiceFault(v) => &v.response_header,
        }
    }
}
