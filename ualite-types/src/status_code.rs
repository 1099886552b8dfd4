// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! OPC UA status codes. A status code is a `u32` whose top two bits encode severity
//! (Good / Uncertain / Bad), with the subcode in bits 16..28 and flag bits below.
//!
//! Only the codes this stack actually produces or inspects are named; any other
//! value decodes losslessly and displays as hex.

use std::{
    error::Error as StdError,
    fmt,
    io::{Read, Write},
};

use crate::encoding::{
    read_u32, write_u32, BinaryDecodable, BinaryEncodable, DecodingOptions, EncodingResult,
};

const SEVERITY_MASK: u32 = 0xC000_0000;
const SEVERITY_UNCERTAIN: u32 = 0x4000_0000;
const SEVERITY_BAD: u32 = 0x8000_0000;

macro_rules! status_codes {
    ($($name:ident = $value:expr),+ $(,)?) => {
        #[allow(non_upper_case_globals)]
        impl StatusCode {
            $(
                #[doc = stringify!($name)]
                pub const $name: StatusCode = StatusCode($value);
            )+

            /// Symbolic name of this status code, if it is one of the named codes.
            pub fn name(&self) -> Option<&'static str> {
                match self.0 {
                    $( $value => Some(stringify!($name)), )+
                    _ => None,
                }
            }
        }
    };
}

/// An OPC UA status code.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StatusCode(u32);

status_codes! {
    Good = 0x0000_0000,
    Uncertain = 0x4000_0000,
    Bad = 0x8000_0000,
    BadUnexpectedError = 0x8001_0000,
    BadInternalError = 0x8002_0000,
    BadOutOfMemory = 0x8003_0000,
    BadResourceUnavailable = 0x8004_0000,
    BadCommunicationError = 0x8005_0000,
    BadEncodingError = 0x8006_0000,
    BadDecodingError = 0x8007_0000,
    BadEncodingLimitsExceeded = 0x8008_0000,
    BadUnknownResponse = 0x8009_0000,
    BadTimeout = 0x800A_0000,
    BadServiceUnsupported = 0x800B_0000,
    BadShutdown = 0x800C_0000,
    BadServerNotConnected = 0x800D_0000,
    BadServerHalted = 0x800E_0000,
    BadNothingToDo = 0x800F_0000,
    BadTooManyOperations = 0x8010_0000,
    BadDataTypeIdUnknown = 0x8011_0000,
    BadCertificateInvalid = 0x8012_0000,
    BadSecurityChecksFailed = 0x8013_0000,
    BadCertificateTimeInvalid = 0x8014_0000,
    BadCertificateUriInvalid = 0x8017_0000,
    BadCertificateUntrusted = 0x801A_0000,
    BadUserAccessDenied = 0x801F_0000,
    BadIdentityTokenInvalid = 0x8020_0000,
    BadIdentityTokenRejected = 0x8021_0000,
    BadSecureChannelIdInvalid = 0x8022_0000,
    BadInvalidTimestamp = 0x8023_0000,
    BadNonceInvalid = 0x8024_0000,
    BadSessionIdInvalid = 0x8025_0000,
    BadSessionClosed = 0x8026_0000,
    BadSessionNotActivated = 0x8027_0000,
    BadSubscriptionIdInvalid = 0x8028_0000,
    BadRequestHeaderInvalid = 0x802A_0000,
    BadTimestampsToReturnInvalid = 0x802B_0000,
    BadRequestCancelledByClient = 0x802C_0000,
    BadNoCommunication = 0x8031_0000,
    BadNodeIdInvalid = 0x8033_0000,
    BadNodeIdUnknown = 0x8034_0000,
    BadAttributeIdInvalid = 0x8035_0000,
    BadIndexRangeInvalid = 0x8036_0000,
    BadDataEncodingInvalid = 0x8038_0000,
    BadNotReadable = 0x803A_0000,
    BadNotWritable = 0x803B_0000,
    BadOutOfRange = 0x803C_0000,
    BadNotSupported = 0x803D_0000,
    BadNotFound = 0x803E_0000,
    BadMonitoringModeInvalid = 0x8041_0000,
    BadMonitoredItemIdInvalid = 0x8042_0000,
    BadMonitoredItemFilterInvalid = 0x8043_0000,
    BadMonitoredItemFilterUnsupported = 0x8044_0000,
    BadFilterNotAllowed = 0x8045_0000,
    BadStructureMissing = 0x8046_0000,
    BadEventFilterInvalid = 0x8047_0000,
    BadContentFilterInvalid = 0x8048_0000,
    BadContinuationPointInvalid = 0x804A_0000,
    BadNoContinuationPoints = 0x804B_0000,
    BadReferenceTypeIdInvalid = 0x804C_0000,
    BadBrowseDirectionInvalid = 0x804D_0000,
    BadServerUriInvalid = 0x804F_0000,
    BadSecurityModeRejected = 0x8054_0000,
    BadSecurityPolicyRejected = 0x8055_0000,
    BadTooManySessions = 0x8056_0000,
    BadUserSignatureInvalid = 0x8057_0000,
    BadApplicationSignatureInvalid = 0x8058_0000,
    BadNoValidCertificates = 0x8059_0000,
    BadTypeMismatch = 0x8079_0000,
    BadMethodInvalid = 0x807A_0000,
    BadArgumentsMissing = 0x807B_0000,
    BadTooManySubscriptions = 0x807C_0000,
    BadTooManyPublishRequests = 0x807D_0000,
    BadNoSubscription = 0x807E_0000,
    BadSequenceNumberUnknown = 0x807F_0000,
    BadMessageNotAvailable = 0x8080_0000,
    BadTcpServerTooBusy = 0x8083_0000,
    BadTcpMessageTypeInvalid = 0x8084_0000,
    BadTcpSecureChannelUnknown = 0x8085_0000,
    BadTcpMessageTooLarge = 0x8086_0000,
    BadTcpNotEnoughResources = 0x8087_0000,
    BadTcpInternalError = 0x8088_0000,
    BadTcpEndpointUrlInvalid = 0x8089_0000,
    BadRequestInterrupted = 0x808A_0000,
    BadRequestTimeout = 0x808B_0000,
    BadSecureChannelClosed = 0x808C_0000,
    BadSecureChannelTokenUnknown = 0x808D_0000,
    BadSequenceNumberInvalid = 0x808E_0000,
    BadProtocolVersionUnsupported = 0x808F_0000,
    BadConfigurationError = 0x8090_0000,
    BadNotConnected = 0x8091_0000,
    BadConnectionClosed = 0x80AE_0000,
    BadInvalidState = 0x80AF_0000,
    BadEndOfStream = 0x80B0_0000,
    BadMaxConnectionsReached = 0x80B7_0000,
    BadRequestTooLarge = 0x80B8_0000,
    BadResponseTooLarge = 0x80B9_0000,
    BadDisconnect = 0x80AD_0000,
    GoodSubscriptionTransferred = 0x002D_0000,
    GoodOverload = 0x002F_0000,
    GoodClamped = 0x0030_0000,
    UncertainInitialValue = 0x4092_0000,
}

impl StatusCode {
    /// Construct a status code from its raw `u32` value.
    pub fn from_value(value: u32) -> Self {
        StatusCode(value)
    }

    /// Raw value of the status code.
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Subcode with flag bits stripped, for comparing against named codes.
    pub fn sub_code(&self) -> StatusCode {
        StatusCode(self.0 & 0xFFFF_0000)
    }

    /// `true` if the severity is Good.
    pub fn is_good(&self) -> bool {
        self.0 & SEVERITY_MASK == 0
    }

    /// `true` if the severity is Uncertain.
    pub fn is_uncertain(&self) -> bool {
        self.0 & SEVERITY_MASK == SEVERITY_UNCERTAIN
    }

    /// `true` if the severity is Bad.
    pub fn is_bad(&self) -> bool {
        self.0 & SEVERITY_MASK == SEVERITY_BAD
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sub_code().name() {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "StatusCode(0x{:08X})", self.0),
        }
    }
}

impl fmt::Debug for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl StdError for StatusCode {}

impl From<StatusCode> for std::io::Error {
    fn from(value: StatusCode) -> Self {
        std::io::Error::other(value)
    }
}

impl BinaryEncodable for StatusCode {
    fn byte_len(&self) -> usize {
        4
    }

    fn encode<S: Write + ?Sized>(&self, stream: &mut S) -> EncodingResult<()> {
        write_u32(stream, self.0)
    }
}

impl BinaryDecodable for StatusCode {
    fn decode<S: Read + ?Sized>(stream: &mut S, _: &DecodingOptions) -> EncodingResult<Self> {
        Ok(StatusCode(read_u32(stream)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity() {
        assert!(StatusCode::Good.is_good());
        assert!(StatusCode::GoodClamped.is_good());
        assert!(StatusCode::UncertainInitialValue.is_uncertain());
        assert!(StatusCode::BadTimeout.is_bad());
        assert!(!StatusCode::BadTimeout.is_good());
    }

    #[test]
    fn flag_bits_are_preserved() {
        // A code with info bits set still compares equal on sub_code
        let code = StatusCode::from_value(StatusCode::GoodClamped.value() | 0x400);
        assert_eq!(code.sub_code(), StatusCode::GoodClamped);
        assert_eq!(code.value() & 0x400, 0x400);
    }

    #[test]
    fn display_names() {
        assert_eq!(StatusCode::BadDecodingError.to_string(), "BadDecodingError");
        assert_eq!(
            StatusCode::from_value(0x8FFF_0000).to_string(),
            "StatusCode(0x8FFF0000)"
        );
    }
}
