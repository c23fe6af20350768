// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use bytes::Bytes;
use std::io::Write;

use crate::property::check_property_type_list;
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, PacketId,
    PacketType, Properties, PropertyType, ProtocolVersion, PubTopic, QoS, VarIntError,
};

/// Properties available in PUBLISH packets.
pub const PUBLISH_PROPERTIES: &[PropertyType] = &[
    PropertyType::PayloadFormatIndicator,
    PropertyType::MessageExpiryInterval,
    PropertyType::TopicAlias,
    PropertyType::ResponseTopic,
    PropertyType::CorrelationData,
    PropertyType::UserProperty,
    PropertyType::SubscriptionIdentifier,
    PropertyType::ContentType,
];

/// PUBLISH transports an application message in either direction.
///
/// ```txt
///  7                     0
/// +-----------------------+
/// | Fixed header          |
/// |                       |
/// +-----------------------+
/// | Topic name            |
/// |                       |
/// +-----------------------+
/// | Packet id             |
/// |                       |
/// +-----------------------+
/// | Properties ...        |
/// +-----------------------+
/// | Payload ...           |
/// +-----------------------+
/// ```
///
/// The packet id is only present when QoS is 1 or 2, the property block only
/// in 5.0. The payload has no length prefix; it runs to the end of the
/// remaining length. Response: none for QoS 0, PUBACK for QoS 1, PUBREC for
/// QoS 2.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PublishPacket {
    /// False on the first delivery attempt of this packet, true on
    /// re-delivery. MUST be false when QoS is 0 [MQTT-3.3.1-2].
    dup: bool,

    /// Delivery guarantee level of this message.
    qos: QoS,

    /// Ask the server to keep the message and deliver it to future
    /// subscribers of the topic.
    retain: bool,

    /// Topic name. MUST NOT contain wildcard characters [MQTT-3.3.2-2].
    topic: PubTopic,

    /// Unused when QoS is 0.
    packet_id: PacketId,

    /// Property block, 5.0 only.
    properties: Properties,

    msg: Bytes,
}

impl PublishPacket {
    /// Create a new publish packet.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` is not a valid topic name.
    pub fn new(topic: &str, qos: QoS, msg: &[u8]) -> Result<Self, EncodeError> {
        let topic = PubTopic::new(topic)?;
        Ok(Self {
            qos,
            topic,
            msg: Bytes::copy_from_slice(msg),
            ..Self::default()
        })
    }

    /// Update `dup` flag.
    ///
    /// # Errors
    ///
    /// Returns error when setting `dup` on a QoS 0 packet [MQTT-3.3.1-2].
    pub fn set_dup(&mut self, dup: bool) -> Result<&mut Self, EncodeError> {
        if dup && self.qos == QoS::AtMostOnce {
            return Err(EncodeError::InvalidPacketType);
        }
        self.dup = dup;
        Ok(self)
    }

    #[must_use]
    pub const fn dup(&self) -> bool {
        self.dup
    }

    pub fn set_qos(&mut self, qos: QoS) -> &mut Self {
        if qos == QoS::AtMostOnce {
            self.packet_id = PacketId::new(0);
        }
        self.qos = qos;
        self
    }

    #[must_use]
    pub const fn qos(&self) -> QoS {
        self.qos
    }

    pub fn set_retain(&mut self, retain: bool) -> &mut Self {
        self.retain = retain;
        self
    }

    #[must_use]
    pub const fn retain(&self) -> bool {
        self.retain
    }

    /// The packet id field is only present when QoS is 1 or 2.
    pub fn set_packet_id(&mut self, packet_id: PacketId) -> &mut Self {
        self.packet_id = packet_id;
        self
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    /// Update topic.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` is not a valid topic name.
    pub fn set_topic(&mut self, topic: &str) -> Result<&mut Self, EncodeError> {
        self.topic = PubTopic::new(topic)?;
        Ok(self)
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        self.topic.as_ref()
    }

    #[must_use]
    pub fn message(&self) -> &[u8] {
        &self.msg
    }

    pub fn mut_properties(&mut self) -> &mut Properties {
        &mut self.properties
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    fn get_fixed_header(&self, version: ProtocolVersion) -> Result<FixedHeader, VarIntError> {
        let mut remaining_length = self.topic.bytes() + self.msg.len();
        if self.qos != QoS::AtMostOnce {
            remaining_length += PacketId::bytes();
        }
        if version == ProtocolVersion::V5 {
            remaining_length += self.properties.bytes();
        }
        let packet_type = PacketType::Publish {
            dup: self.dup,
            qos: self.qos,
            retain: self.retain,
        };
        FixedHeader::new(packet_type, remaining_length)
    }

    /// Serialize this packet to `buf`.
    ///
    /// # Errors
    ///
    /// Returns error if the packet exceeds the var int range.
    pub fn encode(&self, version: ProtocolVersion, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();
        let fixed_header = self.get_fixed_header(version)?;
        fixed_header.encode(buf)?;

        self.topic.encode(buf)?;
        if self.qos != QoS::AtMostOnce {
            self.packet_id.encode(buf)?;
        }
        if version == ProtocolVersion::V5 {
            self.properties.encode(buf)?;
        }
        buf.write_all(&self.msg)?;

        Ok(buf.len() - old_len)
    }

    /// Deserialize one packet from `ba`.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are malformed or incomplete.
    pub fn decode(ba: &mut ByteArray, version: ProtocolVersion) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        let PacketType::Publish { dup, qos, retain } = fixed_header.packet_type() else {
            return Err(DecodeError::InvalidPacketType);
        };
        // The DUP flag MUST be set to 0 for all QoS 0 messages
        // [MQTT-3.3.1-2].
        if dup && qos == QoS::AtMostOnce {
            return Err(DecodeError::InvalidPacketFlags);
        }

        let topic = PubTopic::decode(ba)?;
        let mut var_header_bytes = topic.bytes();

        let packet_id = if qos == QoS::AtMostOnce {
            PacketId::new(0)
        } else {
            let packet_id = PacketId::decode(ba)?;
            // PUBLISH packets with QoS > 0 MUST contain a non-zero packet
            // identifier [MQTT-2.3.1-1].
            if packet_id.value() == 0 {
                return Err(DecodeError::InvalidPacketId);
            }
            var_header_bytes += PacketId::bytes();
            packet_id
        };

        let properties = if version == ProtocolVersion::V5 {
            let properties = Properties::decode(ba)?;
            if let Err(property_type) =
                check_property_type_list(properties.props(), PUBLISH_PROPERTIES)
            {
                log::error!("publish: property {property_type:?} is not allowed");
                return Err(DecodeError::InvalidPropertyType);
            }
            var_header_bytes += properties.bytes();
            properties
        } else {
            Properties::new()
        };

        // It is valid for a PUBLISH packet to contain a zero length payload.
        let msg_len = fixed_header
            .remaining_length()
            .checked_sub(var_header_bytes)
            .ok_or(DecodeError::InvalidRemainingLength)?;
        let msg = Bytes::copy_from_slice(ba.read_bytes(msg_len)?);

        Ok(Self {
            dup,
            qos,
            retain,
            topic,
            packet_id,
            properties,
            msg,
        })
    }

    /// Get total byte length of the encoded packet.
    ///
    /// # Errors
    ///
    /// Returns error if packet size exceeds the var int range.
    pub fn bytes(&self, version: ProtocolVersion) -> Result<usize, VarIntError> {
        let fixed_header = self.get_fixed_header(version)?;
        Ok(fixed_header.bytes() + fixed_header.remaining_length())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_qos0() {
        let mut packet = PublishPacket::new("MyTopic", QoS::AtMostOnce, b"Test payload").unwrap();
        // Ignored because of QoS 0.
        packet.set_packet_id(PacketId::new(456));
        packet.set_qos(QoS::AtMostOnce);

        let mut buf = Vec::new();
        packet.encode(ProtocolVersion::V311, &mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = PublishPacket::decode(&mut ba, ProtocolVersion::V311).unwrap();
        assert_eq!(decoded.topic(), "MyTopic");
        assert_eq!(decoded.message(), b"Test payload");
        assert_eq!(decoded.packet_id().value(), 0);
    }

    #[test]
    fn test_round_trip_qos2_v5() {
        let mut packet = PublishPacket::new("a/b", QoS::ExactOnce, b"x").unwrap();
        packet.set_packet_id(PacketId::new(7));
        packet.set_dup(true).unwrap();
        packet
            .mut_properties()
            .push(crate::Property::MessageExpiryInterval(crate::U32Data::new(
                60,
            )));

        let mut buf = Vec::new();
        packet.encode(ProtocolVersion::V5, &mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = PublishPacket::decode(&mut ba, ProtocolVersion::V5).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_decode_zero_packet_id() {
        // QoS 1 publish with packet id 0.
        let buf = [0x32, 0x05, 0x00, 0x01, b'a', 0x00, 0x00];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            PublishPacket::decode(&mut ba, ProtocolVersion::V311),
            Err(DecodeError::InvalidPacketId)
        );
    }
}
