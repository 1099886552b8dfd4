// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Monitored item filters: data change, event and aggregate filters, and the
//! [`MonitoredItemFilter`] union that selects between them by encoding id.

use crate::{
    date_time::DateTime,
    encoding::{BinaryEncodable, DecodingOptions, EncodingResult, Error},
    extension_object::{ExtensionObject, ExtensionObjectBody},
    node_id::NodeId,
    qualified_name::QualifiedName,
    status_code::StatusCode,
    string::UaString,
    variant::Variant,
};

use super::{binary_struct, message_info, ua_enum};

ua_enum! {
    /// What change in a value triggers a data change notification.
    DataChangeTrigger {
        /// Status changes only.
        Status = 0,
        /// Status or value changes.
        StatusValue = 1,
        /// Status, value or source timestamp changes.
        StatusValueTimestamp = 2,
    }
}

impl Default for DataChangeTrigger {
    fn default() -> Self {
        DataChangeTrigger::StatusValue
    }
}

ua_enum! {
    /// How the deadband value of a data change filter is interpreted.
    DeadbandType {
        /// No deadband.
        None = 0,
        /// Absolute difference.
        Absolute = 1,
        /// Percent of the EU range.
        Percent = 2,
    }
}

impl Default for DeadbandType {
    fn default() -> Self {
        DeadbandType::None
    }
}

/// Suppresses notifications for value changes below a deadband.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataChangeFilter {
    /// What kind of change triggers a notification.
    pub trigger: DataChangeTrigger,
    /// How to interpret the deadband value. On the wire this is a `u32`.
    pub deadband_type: u32,
    /// The deadband threshold.
    pub deadband_value: f64,
}

binary_struct!(DataChangeFilter {
    trigger,
    deadband_type,
    deadband_value,
});
message_info!(DataChangeFilter, 722);

ua_enum! {
    /// Operator of a content filter element.
    FilterOperator {
        /// Equality.
        Equals = 0,
        /// Null test.
        IsNull = 1,
        /// Greater than.
        GreaterThan = 2,
        /// Less than.
        LessThan = 3,
        /// Greater than or equal.
        GreaterThanOrEqual = 4,
        /// Less than or equal.
        LessThanOrEqual = 5,
        /// String pattern match.
        Like = 6,
        /// Logical not.
        Not = 7,
        /// Range test.
        Between = 8,
        /// Set membership.
        InList = 9,
        /// Logical and.
        And = 10,
        /// Logical or.
        Or = 11,
        /// Type cast.
        Cast = 12,
        /// In view test.
        InView = 13,
        /// Subtype test.
        OfType = 14,
        /// Hierarchical relation test.
        RelatedTo = 15,
        /// Bitwise and.
        BitwiseAnd = 16,
        /// Bitwise or.
        BitwiseOr = 17,
    }
}

/// Selects an attribute of nodes of some type by browse path, used in event
/// select clauses and filter operands.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimpleAttributeOperand {
    /// The type the path starts from.
    pub type_definition_id: NodeId,
    /// Browse path from the type to the attribute's node.
    pub browse_path: Option<Vec<QualifiedName>>,
    /// The attribute, usually Value.
    pub attribute_id: u32,
    /// Slice of an array value, null for all.
    pub index_range: UaString,
}

binary_struct!(SimpleAttributeOperand {
    type_definition_id,
    browse_path,
    attribute_id,
    index_range,
});
message_info!(SimpleAttributeOperand, 603);

/// Literal operand of a content filter element.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LiteralOperand {
    /// The literal value.
    pub value: Variant,
}

binary_struct!(LiteralOperand { value });
message_info!(LiteralOperand, 597);

/// References the result of another content filter element by index.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementOperand {
    /// Index of the referenced element.
    pub index: u32,
}

binary_struct!(ElementOperand { index });
message_info!(ElementOperand, 594);

/// One element of a content filter: an operator over extension object operands.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentFilterElement {
    /// The operator.
    pub filter_operator: FilterOperator,
    /// Operands, each a [`LiteralOperand`], [`ElementOperand`],
    /// [`SimpleAttributeOperand`] or AttributeOperand extension object.
    pub filter_operands: Option<Vec<ExtensionObject>>,
}

impl Default for ContentFilterElement {
    fn default() -> Self {
        ContentFilterElement {
            filter_operator: FilterOperator::Equals,
            filter_operands: None,
        }
    }
}

binary_struct!(ContentFilterElement {
    filter_operator,
    filter_operands,
});

/// A boolean expression tree over event fields, in postfix element order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContentFilter {
    /// The elements. Element 0 is the root of the expression.
    pub elements: Option<Vec<ContentFilterElement>>,
}

binary_struct!(ContentFilter { elements });

/// Selects and filters events delivered to a monitored item.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventFilter {
    /// The event fields to return with each notification.
    pub select_clauses: Option<Vec<SimpleAttributeOperand>>,
    /// Filter deciding which events are reported at all.
    pub where_clause: ContentFilter,
}

binary_struct!(EventFilter {
    select_clauses,
    where_clause,
});
message_info!(EventFilter, 725);

/// Tuning knobs for an aggregate calculation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregateConfiguration {
    /// Use the server's defaults instead of the fields below.
    pub use_server_capabilities_defaults: bool,
    /// Treat uncertain values as bad.
    pub treat_uncertain_as_bad: bool,
    /// Percent of bad values that makes an interval bad.
    pub percent_data_bad: u8,
    /// Percent of good values that makes an interval good.
    pub percent_data_good: u8,
    /// Use sloped extrapolation at interval bounds.
    pub use_sloped_extrapolation: bool,
}

binary_struct!(AggregateConfiguration {
    use_server_capabilities_defaults,
    treat_uncertain_as_bad,
    percent_data_bad,
    percent_data_good,
    use_sloped_extrapolation,
});

/// Asks the server to aggregate raw values over processing intervals.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregateFilter {
    /// Start of the first interval.
    pub start_time: DateTime,
    /// Node id of the aggregate function, e.g. Average.
    pub aggregate_type: NodeId,
    /// Width of each interval in milliseconds.
    pub processing_interval: f64,
    /// Calculation configuration.
    pub aggregate_configuration: AggregateConfiguration,
}

binary_struct!(AggregateFilter {
    start_time,
    aggregate_type,
    processing_interval,
    aggregate_configuration,
});
message_info!(AggregateFilter, 728);

/// The filter attached to a monitored item, as a typed union rather than a raw
/// extension object. Converts to and from the wire envelope by encoding id.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MonitoredItemFilter {
    /// No filtering; every sample is reported.
    #[default]
    None,
    /// Deadband filtering of value changes.
    DataChange(DataChangeFilter),
    /// Event selection and filtering.
    Event(EventFilter),
    /// Server-side aggregation.
    Aggregate(AggregateFilter),
}

impl MonitoredItemFilter {
    /// Wrap the filter in the extension object envelope sent on the wire.
    pub fn to_extension_object(&self) -> ExtensionObject {
        use super::MessageInfo;
        match self {
            MonitoredItemFilter::None => ExtensionObject::null(),
            MonitoredItemFilter::DataChange(f) => {
                ExtensionObject::from_message(f.type_id(), f)
            }
            MonitoredItemFilter::Event(f) => ExtensionObject::from_message(f.type_id(), f),
            MonitoredItemFilter::Aggregate(f) => ExtensionObject::from_message(f.type_id(), f),
        }
    }

    /// Recover the typed filter from an extension object, failing on any type id
    /// that is not a known filter.
    pub fn from_extension_object(
        value: &ExtensionObject,
        options: &DecodingOptions,
    ) -> EncodingResult<MonitoredItemFilter> {
        if value.is_null() || matches!(value.body, ExtensionObjectBody::None) {
            return Ok(MonitoredItemFilter::None);
        }
        match value.node_id.as_ns0_u32() {
            Some(DataChangeFilter::TYPE_ID) => {
                Ok(MonitoredItemFilter::DataChange(value.decode_inner(options)?))
            }
            Some(EventFilter::TYPE_ID) => {
                Ok(MonitoredItemFilter::Event(value.decode_inner(options)?))
            }
            Some(AggregateFilter::TYPE_ID) => {
                Ok(MonitoredItemFilter::Aggregate(value.decode_inner(options)?))
            }
            _ => Err(Error::new(
                StatusCode::BadMonitoredItemFilterInvalid,
                format!("Not a monitored item filter: {}", value.node_id),
            )),
        }
    }
}

use super::MessageInfo;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_union_round_trip() {
        let filters = vec![
            MonitoredItemFilter::None,
            MonitoredItemFilter::DataChange(DataChangeFilter {
                trigger: DataChangeTrigger::StatusValueTimestamp,
                deadband_type: DeadbandType::Absolute as u32,
                deadband_value: 0.5,
            }),
            MonitoredItemFilter::Event(EventFilter {
                select_clauses: Some(vec![SimpleAttributeOperand {
                    type_definition_id: NodeId::ns0(2041),
                    browse_path: Some(vec![QualifiedName::from("Message")]),
                    attribute_id: crate::attribute::AttributeId::Value as u32,
                    index_range: UaString::null(),
                }]),
                where_clause: ContentFilter { elements: None },
            }),
            MonitoredItemFilter::Aggregate(AggregateFilter {
                start_time: DateTime::now(),
                aggregate_type: NodeId::ns0(2342),
                processing_interval: 1000.0,
                aggregate_configuration: AggregateConfiguration::default(),
            }),
        ];
        let options = DecodingOptions::default();
        for filter in &filters {
            let wire = filter.to_extension_object();
            let back = MonitoredItemFilter::from_extension_object(&wire, &options).unwrap();
            assert_eq!(&back, filter);
        }
    }

    #[test]
    fn filter_ids_match_the_wire() {
        // Encoding ids of the three filter types
        let f = MonitoredItemFilter::DataChange(DataChangeFilter::default());
        assert_eq!(f.to_extension_object().node_id, NodeId::ns0(722));
        let f = MonitoredItemFilter::Event(EventFilter::default());
        assert_eq!(f.to_extension_object().node_id, NodeId::ns0(725));
        let f = MonitoredItemFilter::Aggregate(AggregateFilter::default());
        assert_eq!(f.to_extension_object().node_id, NodeId::ns0(728));
    }

    #[test]
    fn foreign_type_is_rejected() {
        let wire = ExtensionObject {
            node_id: NodeId::ns0(999),
            body: ExtensionObjectBody::ByteString(vec![0]),
        };
        assert!(
            MonitoredItemFilter::from_extension_object(&wire, &DecodingOptions::default())
                .is_err()
        );
    }
}
