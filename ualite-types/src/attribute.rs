// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Attribute ids addressable on a node.

use crate::{encoding::Error, status_code::StatusCode};

/// The attributes of a node, by numeric id as used in Read/Write/monitoring requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum AttributeId {
    /// The node's id.
    NodeId = 1,
    /// The node's class.
    NodeClass = 2,
    /// The browse name.
    BrowseName = 3,
    /// The display name.
    DisplayName = 4,
    /// The description.
    Description = 5,
    /// The write mask.
    WriteMask = 6,
    /// The user write mask.
    UserWriteMask = 7,
    /// Whether a type is abstract.
    IsAbstract = 8,
    /// Whether a reference type is symmetric.
    Symmetric = 9,
    /// Inverse name of a reference type.
    InverseName = 10,
    /// Whether a view contains no loops.
    ContainsNoLoops = 11,
    /// Event notifier bits of an object or view.
    EventNotifier = 12,
    /// The value of a variable.
    Value = 13,
    /// The data type of a variable.
    DataType = 14,
    /// The value rank of a variable.
    ValueRank = 15,
    /// Array dimensions of a variable.
    ArrayDimensions = 16,
    /// Access level bits.
    AccessLevel = 17,
    /// User access level bits.
    UserAccessLevel = 18,
    /// Minimum sampling interval of a variable.
    MinimumSamplingInterval = 19,
    /// Whether a variable is historizing.
    Historizing = 20,
    /// Whether a method is executable.
    Executable = 21,
    /// Whether a method is executable by the current user.
    UserExecutable = 22,
}

impl TryFrom<u32> for AttributeId {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        use AttributeId::*;
        Ok(match value {
            1 => NodeId,
            2 => NodeClass,
            3 => BrowseName,
            4 => DisplayName,
            5 => Description,
            6 => WriteMask,
            7 => UserWriteMask,
            8 => IsAbstract,
            9 => Symmetric,
            10 => InverseName,
            11 => ContainsNoLoops,
            12 => EventNotifier,
            13 => Value,
            14 => DataType,
            15 => ValueRank,
            16 => ArrayDimensions,
            17 => AccessLevel,
            18 => UserAccessLevel,
            19 => MinimumSamplingInterval,
            20 => Historizing,
            21 => Executable,
            22 => UserExecutable,
            _ => {
                return Err(Error::new(
                    StatusCode::BadAttributeIdInvalid,
                    format!("Attribute id {} is out of range", value),
                ))
            }
        })
    }
}
