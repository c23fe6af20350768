// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::property::check_property_type_list;
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, PacketId,
    PacketType, Properties, PropertyType, ProtocolVersion, ReasonCode, VarIntError,
};

/// Reason codes available in 5.0 UNSUBACK payloads [MQTT-3.11.3-2].
pub const UNSUBSCRIBE_ACK_REASONS: &[ReasonCode] = &[
    ReasonCode::Success,
    ReasonCode::NoSubscriptionExisted,
    ReasonCode::UnspecifiedError,
    ReasonCode::ImplementationSpecificError,
    ReasonCode::NotAuthorized,
    ReasonCode::TopicFilterInvalid,
    ReasonCode::PacketIdentifierInUse,
];

/// Properties available in UNSUBACK packets.
pub const UNSUBSCRIBE_ACK_PROPERTIES: &[PropertyType] =
    &[PropertyType::ReasonString, PropertyType::UserProperty];

/// UNSUBACK is the response to an UNSUBSCRIBE packet.
///
/// In 5.0 the payload carries one reason code per requested topic filter,
/// in the same order [MQTT-3.11.3-1]. In 3.1.1 the packet has no payload;
/// the body is just the packet id.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UnsubscribeAckPacket {
    packet_id: PacketId,

    /// Property block, 5.0 only.
    properties: Properties,

    /// Per-topic results, 5.0 only.
    reasons: Vec<ReasonCode>,
}

impl UnsubscribeAckPacket {
    /// Create a new unsubscribe ack packet.
    #[must_use]
    pub fn new(packet_id: PacketId) -> Self {
        Self {
            packet_id,
            ..Self::default()
        }
    }

    /// Create a new unsubscribe ack packet with one reason code per topic.
    #[must_use]
    pub fn with_reasons(packet_id: PacketId, reasons: Vec<ReasonCode>) -> Self {
        Self {
            packet_id,
            properties: Properties::new(),
            reasons,
        }
    }

    pub fn set_packet_id(&mut self, packet_id: PacketId) -> &mut Self {
        self.packet_id = packet_id;
        self
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    pub fn mut_properties(&mut self) -> &mut Properties {
        &mut self.properties
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    #[must_use]
    pub fn reasons(&self) -> &[ReasonCode] {
        &self.reasons
    }

    fn get_fixed_header(&self, version: ProtocolVersion) -> Result<FixedHeader, VarIntError> {
        let mut remaining_length = PacketId::bytes();
        if version == ProtocolVersion::V5 {
            remaining_length += self.properties.bytes();
            remaining_length += self.reasons.len() * ReasonCode::bytes();
        }
        FixedHeader::new(PacketType::UnsubscribeAck, remaining_length)
    }

    /// Serialize this packet to `buf`.
    ///
    /// # Errors
    ///
    /// Returns error if the packet is too large.
    pub fn encode(&self, version: ProtocolVersion, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();
        let fixed_header = self.get_fixed_header(version)?;
        fixed_header.encode(buf)?;
        self.packet_id.encode(buf)?;
        if version == ProtocolVersion::V5 {
            self.properties.encode(buf)?;
            for reason in &self.reasons {
                reason.encode(buf)?;
            }
        }
        Ok(buf.len() - old_len)
    }

    /// Deserialize one packet from `ba`.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are malformed or incomplete.
    pub fn decode(ba: &mut ByteArray, version: ProtocolVersion) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::UnsubscribeAck {
            return Err(DecodeError::InvalidPacketType);
        }
        let packet_id = PacketId::decode(ba)?;

        let mut packet = Self::new(packet_id);
        if version == ProtocolVersion::V5 {
            let mut read_bytes = PacketId::bytes();
            let properties = Properties::decode(ba)?;
            if let Err(property_type) =
                check_property_type_list(properties.props(), UNSUBSCRIBE_ACK_PROPERTIES)
            {
                log::error!("unsubscribe_ack: property {property_type:?} is not allowed");
                return Err(DecodeError::InvalidPropertyType);
            }
            read_bytes += properties.bytes();
            packet.properties = properties;

            while read_bytes < fixed_header.remaining_length() {
                let reason = ReasonCode::decode(ba)?;
                if !UNSUBSCRIBE_ACK_REASONS.contains(&reason) {
                    log::error!("unsubscribe_ack: invalid reason code {reason:?}");
                    return Err(DecodeError::InvalidReasonCode);
                }
                read_bytes += ReasonCode::bytes();
                packet.reasons.push(reason);
            }
        }
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_v311() {
        let buf = [0xb0, 0x02, 0x00, 0x0b];
        let mut ba = ByteArray::new(&buf);
        let packet = UnsubscribeAckPacket::decode(&mut ba, ProtocolVersion::V311).unwrap();
        assert_eq!(packet.packet_id().value(), 11);
        assert!(packet.reasons().is_empty());
    }

    #[test]
    fn test_round_trip_v5() {
        let packet = UnsubscribeAckPacket::with_reasons(
            PacketId::new(5),
            vec![ReasonCode::Success, ReasonCode::NoSubscriptionExisted],
        );
        let mut buf = Vec::new();
        packet.encode(ProtocolVersion::V5, &mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = UnsubscribeAckPacket::decode(&mut ba, ProtocolVersion::V5).unwrap();
        assert_eq!(decoded, packet);
    }
}
