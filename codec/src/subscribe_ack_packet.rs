// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::property::check_property_type_list;
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, PacketId,
    PacketType, Properties, PropertyType, ProtocolVersion, ReasonCode, VarIntError,
};

/// Reason codes available in 5.0 SUBACK payloads [MQTT-3.9.3-2].
pub const SUBSCRIBE_ACK_REASONS: &[ReasonCode] = &[
    ReasonCode::Success,
    ReasonCode::GrantedQoS1,
    ReasonCode::GrantedQoS2,
    ReasonCode::UnspecifiedError,
    ReasonCode::ImplementationSpecificError,
    ReasonCode::NotAuthorized,
    ReasonCode::TopicFilterInvalid,
    ReasonCode::PacketIdentifierInUse,
    ReasonCode::QuotaExceeded,
    ReasonCode::SharedSubscriptionsNotSupported,
    ReasonCode::SubscriptionIdentifiersNotSupported,
    ReasonCode::WildcardSubscriptionsNotSupported,
];

/// Return codes available in 3.1.1 SUBACK payloads; same byte layout, a
/// smaller table [MQTT-3.9.3-2].
pub const SUBSCRIBE_ACK_REASONS_V3: &[ReasonCode] = &[
    ReasonCode::Success,
    ReasonCode::GrantedQoS1,
    ReasonCode::GrantedQoS2,
    ReasonCode::UnspecifiedError,
];

/// Properties available in SUBACK packets.
pub const SUBSCRIBE_ACK_PROPERTIES: &[PropertyType] =
    &[PropertyType::ReasonString, PropertyType::UserProperty];

/// SUBACK is the response to a SUBSCRIBE packet.
///
/// ```txt
/// +---------------------------+
/// | Fixed header              |
/// +---------------------------+
/// | Packet id                 |
/// +---------------------------+
/// | Properties ...            |
/// +---------------------------+
/// | Reason 0                  |
/// +---------------------------+
/// | Reason 1 ...              |
/// +---------------------------+
/// ```
///
/// The payload carries one reason code per requested topic filter, in the
/// same order [MQTT-3.9.3-1]. The property block exists in 5.0 only; the
/// payload byte layout is shared by both versions.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SubscribeAckPacket {
    packet_id: PacketId,

    /// Property block, 5.0 only.
    properties: Properties,

    reasons: Vec<ReasonCode>,
}

impl SubscribeAckPacket {
    /// Create a new subscribe ack packet with a single reason code.
    #[must_use]
    pub fn new(packet_id: PacketId, reason: ReasonCode) -> Self {
        Self {
            packet_id,
            properties: Properties::new(),
            reasons: vec![reason],
        }
    }

    /// Create a new subscribe ack packet with one reason code per topic.
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
        let mut remaining_length = PacketId::bytes() + self.reasons.len() * ReasonCode::bytes();
        if version == ProtocolVersion::V5 {
            remaining_length += self.properties.bytes();
        }
        FixedHeader::new(PacketType::SubscribeAck, remaining_length)
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
        }
        for reason in &self.reasons {
            reason.encode(buf)?;
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
        if fixed_header.packet_type() != PacketType::SubscribeAck {
            return Err(DecodeError::InvalidPacketType);
        }
        let packet_id = PacketId::decode(ba)?;
        let mut read_bytes = PacketId::bytes();

        let properties = if version == ProtocolVersion::V5 {
            let properties = Properties::decode(ba)?;
            if let Err(property_type) =
                check_property_type_list(properties.props(), SUBSCRIBE_ACK_PROPERTIES)
            {
                log::error!("subscribe_ack: property {property_type:?} is not allowed");
                return Err(DecodeError::InvalidPropertyType);
            }
            read_bytes += properties.bytes();
            properties
        } else {
            Properties::new()
        };

        let valid_reasons = match version {
            ProtocolVersion::V311 => SUBSCRIBE_ACK_REASONS_V3,
            ProtocolVersion::V5 => SUBSCRIBE_ACK_REASONS,
        };
        let mut reasons = Vec::new();
        while read_bytes < fixed_header.remaining_length() {
            let reason = ReasonCode::decode(ba)?;
            if !valid_reasons.contains(&reason) {
                log::error!("subscribe_ack: invalid reason code {reason:?}");
                return Err(DecodeError::InvalidReasonCode);
            }
            read_bytes += ReasonCode::bytes();
            reasons.push(reason);
        }
        if reasons.is_empty() {
            return Err(DecodeError::EmptyPayload);
        }

        Ok(Self {
            packet_id,
            properties,
            reasons,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_v311() {
        let buf = [0x90, 0x04, 0x01, 0xc8, 0x01, 0x80];
        let mut ba = ByteArray::new(&buf);
        let packet = SubscribeAckPacket::decode(&mut ba, ProtocolVersion::V311).unwrap();
        assert_eq!(packet.packet_id().value(), 456);
        assert_eq!(
            packet.reasons(),
            &[ReasonCode::GrantedQoS1, ReasonCode::UnspecifiedError]
        );
    }

    #[test]
    fn test_round_trip_v5() {
        let packet = SubscribeAckPacket::with_reasons(
            PacketId::new(9),
            vec![ReasonCode::GrantedQoS2, ReasonCode::QuotaExceeded],
        );
        let mut buf = Vec::new();
        packet.encode(ProtocolVersion::V5, &mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = SubscribeAckPacket::decode(&mut ba, ProtocolVersion::V5).unwrap();
        assert_eq!(decoded, packet);
    }
}
