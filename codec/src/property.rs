// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use crate::{
    BinaryData, BoolData, ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket,
    PubTopic, QoS, StringData, StringPairData, U16Data, U32Data, VarInt,
};

/// Property types which may legally appear more than once in one property
/// block.
pub const MULTIPLE_PROPERTIES: &[PropertyType] = &[
    PropertyType::UserProperty,
    PropertyType::SubscriptionIdentifier,
];

/// Check that every property in `properties` is one of `types`, and that no
/// property outside [`MULTIPLE_PROPERTIES`] repeats.
///
/// Packet decoders call this with their per-packet table.
///
/// # Errors
///
/// Returns the offending property type.
pub fn check_property_type_list(
    properties: &[Property],
    types: &[PropertyType],
) -> Result<(), PropertyType> {
    for property in properties {
        if !types.contains(&property.property_type()) {
            return Err(property.property_type());
        }
    }

    for property_type in types {
        if MULTIPLE_PROPERTIES.contains(property_type) {
            continue;
        }
        let count = properties
            .iter()
            .filter(|p| p.property_type() == *property_type)
            .count();
        if count > 1 {
            return Err(*property_type);
        }
    }

    Ok(())
}

/// Check that at most one `SubscriptionIdentifier` is present.
///
/// Repeats are legal in PUBLISH but not in CONNACK.
///
/// # Errors
///
/// Returns the offending property type.
pub fn check_multiple_subscription_identifiers(
    properties: &[Property],
) -> Result<(), PropertyType> {
    let count = properties
        .iter()
        .filter(|p| p.property_type() == PropertyType::SubscriptionIdentifier)
        .count();
    if count > 1 {
        return Err(PropertyType::SubscriptionIdentifier);
    }
    Ok(())
}

/// Property identifier byte.
///
/// The identifier selects both the property case and its value type; an
/// identifier outside this table is a malformed packet.
#[allow(clippy::module_name_repetitions)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    PayloadFormatIndicator = 0x01,
    MessageExpiryInterval = 0x02,
    ContentType = 0x03,
    ResponseTopic = 0x08,
    CorrelationData = 0x09,
    SubscriptionIdentifier = 0x0b,
    SessionExpiryInterval = 0x11,
    AssignedClientIdentifier = 0x12,
    ServerKeepAlive = 0x13,
    AuthenticationMethod = 0x15,
    AuthenticationData = 0x16,
    RequestProblemInformation = 0x17,
    WillDelayInterval = 0x18,
    RequestResponseInformation = 0x19,
    ResponseInformation = 0x1a,
    ServerReference = 0x1c,
    ReasonString = 0x1f,
    ReceiveMaximum = 0x21,
    TopicAliasMaximum = 0x22,
    TopicAlias = 0x23,
    MaximumQoS = 0x24,
    RetainAvailable = 0x25,
    UserProperty = 0x26,
    MaximumPacketSize = 0x27,
    WildcardSubscriptionAvailable = 0x28,
    SubscriptionIdentifierAvailable = 0x29,
    SharedSubscriptionAvailable = 0x2a,
}

impl PropertyType {
    /// Get byte length used in packet.
    #[must_use]
    pub const fn bytes() -> usize {
        1
    }
}

impl TryFrom<u8> for PropertyType {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0x01 => Ok(Self::PayloadFormatIndicator),
            0x02 => Ok(Self::MessageExpiryInterval),
            0x03 => Ok(Self::ContentType),
            0x08 => Ok(Self::ResponseTopic),
            0x09 => Ok(Self::CorrelationData),
            0x0b => Ok(Self::SubscriptionIdentifier),
            0x11 => Ok(Self::SessionExpiryInterval),
            0x12 => Ok(Self::AssignedClientIdentifier),
            0x13 => Ok(Self::ServerKeepAlive),
            0x15 => Ok(Self::AuthenticationMethod),
            0x16 => Ok(Self::AuthenticationData),
            0x17 => Ok(Self::RequestProblemInformation),
            0x18 => Ok(Self::WillDelayInterval),
            0x19 => Ok(Self::RequestResponseInformation),
            0x1a => Ok(Self::ResponseInformation),
            0x1c => Ok(Self::ServerReference),
            0x1f => Ok(Self::ReasonString),
            0x21 => Ok(Self::ReceiveMaximum),
            0x22 => Ok(Self::TopicAliasMaximum),
            0x23 => Ok(Self::TopicAlias),
            0x24 => Ok(Self::MaximumQoS),
            0x25 => Ok(Self::RetainAvailable),
            0x26 => Ok(Self::UserProperty),
            0x27 => Ok(Self::MaximumPacketSize),
            0x28 => Ok(Self::WildcardSubscriptionAvailable),
            0x29 => Ok(Self::SubscriptionIdentifierAvailable),
            0x2a => Ok(Self::SharedSubscriptionAvailable),
            _ => Err(DecodeError::InvalidPropertyType),
        }
    }
}

/// A typed MQTT 5.0 property.
///
/// Each case documents the packets it may appear in; the wire identifier is
/// the matching [`PropertyType`] value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Property {
    /// Byte, 0 or 1. PUBLISH, Will Properties.
    ///
    /// 1 indicates the payload is UTF-8 encoded character data.
    PayloadFormatIndicator(BoolData),

    /// Four Byte Integer, lifetime of the message in seconds.
    /// PUBLISH, Will Properties.
    MessageExpiryInterval(U32Data),

    /// UTF-8 String describing the payload content.
    /// PUBLISH, Will Properties.
    ContentType(StringData),

    /// Topic Name for a response message. PUBLISH, Will Properties.
    ResponseTopic(PubTopic),

    /// Binary Data used by the requester to correlate a response with its
    /// request. PUBLISH, Will Properties.
    CorrelationData(BinaryData),

    /// Variable Byte Integer, 1 to 268,435,455; zero is a Protocol Error.
    /// PUBLISH, SUBSCRIBE. May repeat in PUBLISH.
    SubscriptionIdentifier(VarInt),

    /// Four Byte Integer, session lifetime after the network connection
    /// closes, in seconds. CONNECT, CONNACK, DISCONNECT.
    SessionExpiryInterval(U32Data),

    /// UTF-8 String, the identifier the server assigned because the CONNECT
    /// carried a zero length one. CONNACK.
    AssignedClientIdentifier(StringData),

    /// Two Byte Integer. If present the client MUST use this value instead
    /// of the Keep Alive it sent on CONNECT [MQTT-3.2.2-21]. CONNACK.
    ServerKeepAlive(U16Data),

    /// UTF-8 String, name of the extended authentication method.
    /// CONNECT, CONNACK, AUTH.
    AuthenticationMethod(StringData),

    /// Binary Data defined by the authentication method.
    /// CONNECT, CONNACK, AUTH.
    AuthenticationData(BinaryData),

    /// Byte, 0 or 1. Whether reason strings may be sent on packets other
    /// than PUBLISH, CONNACK and DISCONNECT. CONNECT.
    RequestProblemInformation(BoolData),

    /// Four Byte Integer, delay before the server publishes the will
    /// message, in seconds. Will Properties.
    WillDelayInterval(U32Data),

    /// Byte, 0 or 1. Requests response information in CONNACK. CONNECT.
    RequestResponseInformation(BoolData),

    /// UTF-8 String, basis for creating a response topic. CONNACK.
    ResponseInformation(StringData),

    /// UTF-8 String identifying another server to use.
    /// CONNACK, DISCONNECT.
    ServerReference(StringData),

    /// UTF-8 String, human readable diagnostics. CONNACK, PUBACK, PUBREC,
    /// PUBREL, PUBCOMP, SUBACK, UNSUBACK, DISCONNECT, AUTH.
    ReasonString(StringData),

    /// Two Byte Integer, non-zero. Number of QoS 1 and QoS 2 publications
    /// the sender will process concurrently. CONNECT, CONNACK.
    ReceiveMaximum(U16Data),

    /// Two Byte Integer, highest topic alias the sender accepts.
    /// CONNECT, CONNACK.
    TopicAliasMaximum(U16Data),

    /// Two Byte Integer, non-zero, standing in for the topic name within one
    /// connection. PUBLISH.
    TopicAlias(U16Data),

    /// Byte, 0 or 1. The highest QoS the server supports. If absent, QoS 2
    /// is available. CONNACK.
    MaximumQoS(QoS),

    /// Byte, 0 or 1. Whether the server supports retained messages.
    /// If absent, retained messages are supported. CONNACK.
    RetainAvailable(BoolData),

    /// UTF-8 String Pair. May appear multiple times; order is preserved.
    /// All packets with properties.
    UserProperty(StringPairData),

    /// Four Byte Integer, non-zero. Largest packet size the sender accepts.
    /// CONNECT, CONNACK.
    MaximumPacketSize(U32Data),

    /// Byte, 0 or 1. Whether the server supports wildcard subscriptions.
    /// CONNACK.
    WildcardSubscriptionAvailable(BoolData),

    /// Byte, 0 or 1. Whether the server supports subscription identifiers.
    /// CONNACK.
    SubscriptionIdentifierAvailable(BoolData),

    /// Byte, 0 or 1. Whether the server supports shared subscriptions.
    /// CONNACK.
    SharedSubscriptionAvailable(BoolData),
}

impl Property {
    /// Get type of the property.
    #[must_use]
    pub const fn property_type(&self) -> PropertyType {
        match self {
            Self::PayloadFormatIndicator(_) => PropertyType::PayloadFormatIndicator,
            Self::MessageExpiryInterval(_) => PropertyType::MessageExpiryInterval,
            Self::ContentType(_) => PropertyType::ContentType,
            Self::ResponseTopic(_) => PropertyType::ResponseTopic,
            Self::CorrelationData(_) => PropertyType::CorrelationData,
            Self::SubscriptionIdentifier(_) => PropertyType::SubscriptionIdentifier,
            Self::SessionExpiryInterval(_) => PropertyType::SessionExpiryInterval,
            Self::AssignedClientIdentifier(_) => PropertyType::AssignedClientIdentifier,
            Self::ServerKeepAlive(_) => PropertyType::ServerKeepAlive,
            Self::AuthenticationMethod(_) => PropertyType::AuthenticationMethod,
            Self::AuthenticationData(_) => PropertyType::AuthenticationData,
            Self::RequestProblemInformation(_) => PropertyType::RequestProblemInformation,
            Self::WillDelayInterval(_) => PropertyType::WillDelayInterval,
            Self::RequestResponseInformation(_) => PropertyType::RequestResponseInformation,
            Self::ResponseInformation(_) => PropertyType::ResponseInformation,
            Self::ServerReference(_) => PropertyType::ServerReference,
            Self::ReasonString(_) => PropertyType::ReasonString,
            Self::ReceiveMaximum(_) => PropertyType::ReceiveMaximum,
            Self::TopicAliasMaximum(_) => PropertyType::TopicAliasMaximum,
            Self::TopicAlias(_) => PropertyType::TopicAlias,
            Self::MaximumQoS(_) => PropertyType::MaximumQoS,
            Self::RetainAvailable(_) => PropertyType::RetainAvailable,
            Self::UserProperty(_) => PropertyType::UserProperty,
            Self::MaximumPacketSize(_) => PropertyType::MaximumPacketSize,
            Self::WildcardSubscriptionAvailable(_) => PropertyType::WildcardSubscriptionAvailable,
            Self::SubscriptionIdentifierAvailable(_) => {
                PropertyType::SubscriptionIdentifierAvailable
            }
            Self::SharedSubscriptionAvailable(_) => PropertyType::SharedSubscriptionAvailable,
        }
    }

    /// Get byte length used in packet, identifier byte included.
    #[allow(clippy::match_same_arms)]
    #[must_use]
    pub fn bytes(&self) -> usize {
        let value_bytes = match self {
            Self::PayloadFormatIndicator(..) => BoolData::bytes(),
            Self::MessageExpiryInterval(..) => U32Data::bytes(),
            Self::ContentType(value) => value.bytes(),
            Self::ResponseTopic(value) => value.bytes(),
            Self::CorrelationData(value) => value.bytes(),
            Self::SubscriptionIdentifier(value) => value.bytes(),
            Self::SessionExpiryInterval(..) => U32Data::bytes(),
            Self::AssignedClientIdentifier(value) => value.bytes(),
            Self::ServerKeepAlive(..) => U16Data::bytes(),
            Self::AuthenticationMethod(value) => value.bytes(),
            Self::AuthenticationData(value) => value.bytes(),
            Self::RequestProblemInformation(..) => BoolData::bytes(),
            Self::WillDelayInterval(..) => U32Data::bytes(),
            Self::RequestResponseInformation(..) => BoolData::bytes(),
            Self::ResponseInformation(value) => value.bytes(),
            Self::ServerReference(value) => value.bytes(),
            Self::ReasonString(value) => value.bytes(),
            Self::ReceiveMaximum(..) => U16Data::bytes(),
            Self::TopicAliasMaximum(..) => U16Data::bytes(),
            Self::TopicAlias(..) => U16Data::bytes(),
            Self::MaximumQoS(..) => QoS::bytes(),
            Self::RetainAvailable(..) => BoolData::bytes(),
            Self::UserProperty(value) => value.bytes(),
            Self::MaximumPacketSize(..) => U32Data::bytes(),
            Self::WildcardSubscriptionAvailable(..) => BoolData::bytes(),
            Self::SubscriptionIdentifierAvailable(..) => BoolData::bytes(),
            Self::SharedSubscriptionAvailable(..) => BoolData::bytes(),
        };
        PropertyType::bytes() + value_bytes
    }
}

impl DecodePacket for Property {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let property_type_byte = ba.read_byte()?;
        let property_type = PropertyType::try_from(property_type_byte)?;
        match property_type {
            PropertyType::PayloadFormatIndicator => {
                Ok(Self::PayloadFormatIndicator(BoolData::decode(ba)?))
            }
            PropertyType::MessageExpiryInterval => {
                Ok(Self::MessageExpiryInterval(U32Data::decode(ba)?))
            }
            PropertyType::ContentType => Ok(Self::ContentType(StringData::decode(ba)?)),
            PropertyType::ResponseTopic => Ok(Self::ResponseTopic(PubTopic::decode(ba)?)),
            PropertyType::CorrelationData => Ok(Self::CorrelationData(BinaryData::decode(ba)?)),
            PropertyType::SubscriptionIdentifier => {
                let id = VarInt::decode(ba)?;
                if id.is_empty() {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::SubscriptionIdentifier(id))
            }
            PropertyType::SessionExpiryInterval => {
                Ok(Self::SessionExpiryInterval(U32Data::decode(ba)?))
            }
            PropertyType::AssignedClientIdentifier => {
                Ok(Self::AssignedClientIdentifier(StringData::decode(ba)?))
            }
            PropertyType::ServerKeepAlive => Ok(Self::ServerKeepAlive(U16Data::decode(ba)?)),
            PropertyType::AuthenticationMethod => {
                Ok(Self::AuthenticationMethod(StringData::decode(ba)?))
            }
            PropertyType::AuthenticationData => {
                Ok(Self::AuthenticationData(BinaryData::decode(ba)?))
            }
            PropertyType::RequestProblemInformation => {
                Ok(Self::RequestProblemInformation(BoolData::decode(ba)?))
            }
            PropertyType::WillDelayInterval => Ok(Self::WillDelayInterval(U32Data::decode(ba)?)),
            PropertyType::RequestResponseInformation => {
                Ok(Self::RequestResponseInformation(BoolData::decode(ba)?))
            }
            PropertyType::ResponseInformation => {
                Ok(Self::ResponseInformation(StringData::decode(ba)?))
            }
            PropertyType::ServerReference => Ok(Self::ServerReference(StringData::decode(ba)?)),
            PropertyType::ReasonString => Ok(Self::ReasonString(StringData::decode(ba)?)),
            PropertyType::ReceiveMaximum => {
                let max = U16Data::decode(ba)?;
                if max.value() == 0 {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::ReceiveMaximum(max))
            }
            PropertyType::TopicAliasMaximum => Ok(Self::TopicAliasMaximum(U16Data::decode(ba)?)),
            PropertyType::TopicAlias => {
                let alias = U16Data::decode(ba)?;
                if alias.value() == 0 {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::TopicAlias(alias))
            }
            PropertyType::MaximumQoS => {
                let qos = QoS::decode(ba)?;
                if qos == QoS::ExactOnce {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::MaximumQoS(qos))
            }
            PropertyType::RetainAvailable => Ok(Self::RetainAvailable(BoolData::decode(ba)?)),
            PropertyType::UserProperty => Ok(Self::UserProperty(StringPairData::decode(ba)?)),
            PropertyType::MaximumPacketSize => {
                let max = U32Data::decode(ba)?;
                if max.value() == 0 {
                    return Err(DecodeError::InvalidPropertyValue);
                }
                Ok(Self::MaximumPacketSize(max))
            }
            PropertyType::WildcardSubscriptionAvailable => {
                Ok(Self::WildcardSubscriptionAvailable(BoolData::decode(ba)?))
            }
            PropertyType::SubscriptionIdentifierAvailable => {
                Ok(Self::SubscriptionIdentifierAvailable(BoolData::decode(ba)?))
            }
            PropertyType::SharedSubscriptionAvailable => {
                Ok(Self::SharedSubscriptionAvailable(BoolData::decode(ba)?))
            }
        }
    }
}

impl EncodePacket for Property {
    #[allow(clippy::match_same_arms)]
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.push(self.property_type() as u8);
        let value_bytes = match self {
            Self::PayloadFormatIndicator(value) => value.encode(buf)?,
            Self::MessageExpiryInterval(value) => value.encode(buf)?,
            Self::ContentType(value) => value.encode(buf)?,
            Self::ResponseTopic(value) => value.encode(buf)?,
            Self::CorrelationData(value) => value.encode(buf)?,
            Self::SubscriptionIdentifier(value) => value.encode(buf)?,
            Self::SessionExpiryInterval(value) => value.encode(buf)?,
            Self::AssignedClientIdentifier(value) => value.encode(buf)?,
            Self::ServerKeepAlive(value) => value.encode(buf)?,
            Self::AuthenticationMethod(value) => value.encode(buf)?,
            Self::AuthenticationData(value) => value.encode(buf)?,
            Self::RequestProblemInformation(value) => value.encode(buf)?,
            Self::WillDelayInterval(value) => value.encode(buf)?,
            Self::RequestResponseInformation(value) => value.encode(buf)?,
            Self::ResponseInformation(value) => value.encode(buf)?,
            Self::ServerReference(value) => value.encode(buf)?,
            Self::ReasonString(value) => value.encode(buf)?,
            Self::ReceiveMaximum(value) => value.encode(buf)?,
            Self::TopicAliasMaximum(value) => value.encode(buf)?,
            Self::TopicAlias(value) => value.encode(buf)?,
            Self::MaximumQoS(value) => value.encode(buf)?,
            Self::RetainAvailable(value) => value.encode(buf)?,
            Self::UserProperty(value) => value.encode(buf)?,
            Self::MaximumPacketSize(value) => value.encode(buf)?,
            Self::WildcardSubscriptionAvailable(value) => value.encode(buf)?,
            Self::SubscriptionIdentifierAvailable(value) => value.encode(buf)?,
            Self::SharedSubscriptionAvailable(value) => value.encode(buf)?,
        };
        Ok(PropertyType::bytes() + value_bytes)
    }
}

/// An ordered property list, encoded as a Variable Byte Integer byte count
/// followed by that many bytes of (identifier, value) pairs.
///
/// Order is preserved so that repeated `UserProperty` entries round-trip
/// unchanged [MQTT-3.1.3-10].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Properties(Vec<Property>);

impl Properties {
    /// Create an empty property list.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Get byte length in packet, length prefix included.
    #[must_use]
    pub fn bytes(&self) -> usize {
        let data_bytes = self.data_bytes();
        // The prefix always fits: a packet cannot exceed the var int range.
        let len = VarInt::from(data_bytes).unwrap_or_default();
        len.bytes() + data_bytes
    }

    /// Get byte length of the encoded (identifier, value) pairs, without the
    /// length prefix.
    #[must_use]
    pub fn data_bytes(&self) -> usize {
        self.0.iter().map(Property::bytes).sum()
    }

    /// Get number of properties in the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get a reference to the property list.
    #[must_use]
    pub fn props(&self) -> &[Property] {
        &self.0
    }

    /// Append a property to the list.
    pub fn push(&mut self, property: Property) {
        self.0.push(property);
    }

    /// Clear the list.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Check whether a property of `property_type` is present.
    #[must_use]
    pub fn contains(&self, property_type: PropertyType) -> bool {
        self.0.iter().any(|p| p.property_type() == property_type)
    }

    fn find(&self, property_type: PropertyType) -> Option<&Property> {
        self.0.iter().find(|p| p.property_type() == property_type)
    }

    /// Get the assigned client identifier, if the server sent one.
    #[must_use]
    pub fn assigned_client_identifier(&self) -> Option<&str> {
        match self.find(PropertyType::AssignedClientIdentifier) {
            Some(Property::AssignedClientIdentifier(value)) => Some(value.as_ref()),
            _ => None,
        }
    }

    /// Get the maximum QoS the server accepts, if restricted.
    #[must_use]
    pub fn maximum_qos(&self) -> Option<QoS> {
        match self.find(PropertyType::MaximumQoS) {
            Some(Property::MaximumQoS(value)) => Some(*value),
            _ => None,
        }
    }

    /// Get the maximum packet size the peer accepts, if limited.
    #[must_use]
    pub fn maximum_packet_size(&self) -> Option<u32> {
        match self.find(PropertyType::MaximumPacketSize) {
            Some(Property::MaximumPacketSize(value)) => Some(value.value()),
            _ => None,
        }
    }

    /// Get the retain-available flag, if the server sent one.
    #[must_use]
    pub fn retain_available(&self) -> Option<bool> {
        match self.find(PropertyType::RetainAvailable) {
            Some(Property::RetainAvailable(value)) => Some(value.value()),
            _ => None,
        }
    }

    /// Get the topic alias maximum, if the peer sent one.
    #[must_use]
    pub fn topic_alias_maximum(&self) -> Option<u16> {
        match self.find(PropertyType::TopicAliasMaximum) {
            Some(Property::TopicAliasMaximum(value)) => Some(value.value()),
            _ => None,
        }
    }

    /// Get the topic alias of a publish, if set.
    #[must_use]
    pub fn topic_alias(&self) -> Option<u16> {
        match self.find(PropertyType::TopicAlias) {
            Some(Property::TopicAlias(value)) => Some(value.value()),
            _ => None,
        }
    }

    /// Get the keep alive value the server imposed, if any.
    #[must_use]
    pub fn server_keep_alive(&self) -> Option<u16> {
        match self.find(PropertyType::ServerKeepAlive) {
            Some(Property::ServerKeepAlive(value)) => Some(value.value()),
            _ => None,
        }
    }
}

impl AsRef<[Property]> for Properties {
    fn as_ref(&self) -> &[Property] {
        &self.0
    }
}

impl DecodePacket for Properties {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        // If the property length is absent from the variable header, the
        // default of an empty block is used.
        if ba.remaining_bytes() == 0 {
            return Ok(Self::new());
        }
        let block_bytes = VarInt::decode(ba)?;
        let mut remaining = block_bytes.value();
        let mut properties = Vec::new();
        while remaining > 0 {
            let property = Property::decode(ba)?;
            let bytes = property.bytes();
            if bytes > remaining {
                return Err(DecodeError::InvalidRemainingLength);
            }
            remaining -= bytes;
            properties.push(property);
        }
        Ok(Self(properties))
    }
}

impl EncodePacket for Properties {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let len = VarInt::from(self.data_bytes())?;
        let mut bytes_written = len.encode(buf)?;
        for property in &self.0 {
            bytes_written += property.encode(buf)?;
        }
        Ok(bytes_written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_properties_round_trip() {
        let mut properties = Properties::new();
        properties.push(Property::SessionExpiryInterval(U32Data::new(120)));
        properties.push(Property::UserProperty(
            StringPairData::new("region", "cn-north").unwrap(),
        ));
        properties.push(Property::UserProperty(
            StringPairData::new("region", "eu-west").unwrap(),
        ));

        let mut buf = Vec::new();
        let written = properties.encode(&mut buf).unwrap();
        assert_eq!(written, properties.bytes());
        // Length prefix counts bytes, not properties.
        assert_eq!(buf[0] as usize, properties.data_bytes());

        let mut ba = ByteArray::new(&buf);
        let decoded = Properties::decode(&mut ba).unwrap();
        // Repeated user properties keep their order.
        assert_eq!(decoded, properties);
    }

    #[test]
    fn test_properties_unknown_identifier() {
        let buf = [0x02, 0x7f, 0x00];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            Properties::decode(&mut ba),
            Err(DecodeError::InvalidPropertyType)
        );
    }

    #[test]
    fn test_check_property_type_list() {
        let mut properties = Properties::new();
        properties.push(Property::TopicAlias(U16Data::new(3)));
        assert!(check_property_type_list(
            properties.props(),
            &[PropertyType::TopicAlias, PropertyType::UserProperty]
        )
        .is_ok());
        assert_eq!(
            check_property_type_list(properties.props(), &[PropertyType::UserProperty]),
            Err(PropertyType::TopicAlias)
        );

        properties.push(Property::TopicAlias(U16Data::new(4)));
        assert_eq!(
            check_property_type_list(properties.props(), &[PropertyType::TopicAlias]),
            Err(PropertyType::TopicAlias)
        );
    }
}
