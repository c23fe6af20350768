// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::property::check_property_type_list;
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, PacketId,
    PacketType, Properties, PropertyType, ProtocolVersion, ReasonCode, VarIntError,
};

/// Reason codes available in PUBACK packets [MQTT-3.4.2-1].
pub const PUBLISH_ACK_REASONS: &[ReasonCode] = &[
    ReasonCode::Success,
    ReasonCode::NoMatchingSubscribers,
    ReasonCode::UnspecifiedError,
    ReasonCode::ImplementationSpecificError,
    ReasonCode::NotAuthorized,
    ReasonCode::TopicNameInvalid,
    ReasonCode::PacketIdentifierInUse,
    ReasonCode::QuotaExceeded,
    ReasonCode::PayloadFormatInvalid,
];

/// Properties available in PUBACK packets.
pub const PUBLISH_ACK_PROPERTIES: &[PropertyType] =
    &[PropertyType::ReasonString, PropertyType::UserProperty];

/// PUBACK is the response to a PUBLISH packet with QoS 1, completing the
/// two step delivery ladder.
///
/// ```txt
///  7                  0
/// +--------------------+
/// | Fixed header       |
/// |                    |
/// +--------------------+
/// | Packet id          |
/// |                    |
/// +--------------------+
/// | Reason code        |
/// +--------------------+
/// | Properties ...     |
/// +--------------------+
/// ```
///
/// In 5.0 the reason code and property block may be omitted when the reason
/// is 0x00 (Success) and there are no properties; the remaining length is
/// then 2. In 3.1.1 the body is always just the packet id. No payload.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishAckPacket {
    packet_id: PacketId,

    reason_code: ReasonCode,

    properties: Properties,
}

impl PublishAckPacket {
    /// Create a new publish ack packet for `packet_id`.
    #[must_use]
    pub fn new(packet_id: PacketId) -> Self {
        Self {
            packet_id,
            ..Self::default()
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

    pub fn set_reason_code(&mut self, reason_code: ReasonCode) -> &mut Self {
        self.reason_code = reason_code;
        self
    }

    #[must_use]
    pub const fn reason_code(&self) -> ReasonCode {
        self.reason_code
    }

    pub fn mut_properties(&mut self) -> &mut Properties {
        &mut self.properties
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    fn get_fixed_header(&self, version: ProtocolVersion) -> Result<FixedHeader, VarIntError> {
        let mut remaining_length = PacketId::bytes();
        if version == ProtocolVersion::V5 {
            if self.reason_code != ReasonCode::Success || !self.properties.is_empty() {
                remaining_length += ReasonCode::bytes();
            }
            if !self.properties.is_empty() {
                remaining_length += self.properties.bytes();
            }
        }
        FixedHeader::new(PacketType::PublishAck, remaining_length)
    }

    /// Serialize this packet to `buf`.
    ///
    /// # Errors
    ///
    /// Returns error if the property block is too large.
    pub fn encode(&self, version: ProtocolVersion, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let old_len = buf.len();
        let fixed_header = self.get_fixed_header(version)?;
        fixed_header.encode(buf)?;
        self.packet_id.encode(buf)?;
        if version == ProtocolVersion::V5 {
            if self.reason_code != ReasonCode::Success || !self.properties.is_empty() {
                self.reason_code.encode(buf)?;
            }
            if !self.properties.is_empty() {
                self.properties.encode(buf)?;
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
        if fixed_header.packet_type() != PacketType::PublishAck {
            return Err(DecodeError::InvalidPacketType);
        }
        let remaining_length = fixed_header.remaining_length();
        if remaining_length < PacketId::bytes() {
            return Err(DecodeError::InvalidRemainingLength);
        }
        let packet_id = PacketId::decode(ba)?;

        let mut packet = Self::new(packet_id);
        if version == ProtocolVersion::V5 && remaining_length > PacketId::bytes() {
            let reason_code = ReasonCode::decode(ba)?;
            if !PUBLISH_ACK_REASONS.contains(&reason_code) {
                log::error!("publish_ack: invalid reason code {reason_code:?}");
                return Err(DecodeError::InvalidReasonCode);
            }
            packet.set_reason_code(reason_code);
            if remaining_length > PacketId::bytes() + ReasonCode::bytes() {
                let properties = Properties::decode(ba)?;
                if let Err(property_type) =
                    check_property_type_list(properties.props(), PUBLISH_ACK_PROPERTIES)
                {
                    log::error!("publish_ack: property {property_type:?} is not allowed");
                    return Err(DecodeError::InvalidPropertyType);
                }
                packet.properties = properties;
            }
        }
        Ok(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_v5_success_is_two_bytes() {
        let packet = PublishAckPacket::new(PacketId::new(17));
        let mut buf = Vec::new();
        assert_eq!(packet.encode(ProtocolVersion::V5, &mut buf).unwrap(), 4);
        assert_eq!(&buf, &[0x40, 0x02, 0x00, 0x11]);
    }

    #[test]
    fn test_round_trip_v5_with_reason() {
        let mut packet = PublishAckPacket::new(PacketId::new(42));
        packet.set_reason_code(ReasonCode::QuotaExceeded);
        let mut buf = Vec::new();
        packet.encode(ProtocolVersion::V5, &mut buf).unwrap();
        assert_eq!(buf[4], 0x97);

        let mut ba = ByteArray::new(&buf);
        let decoded = PublishAckPacket::decode(&mut ba, ProtocolVersion::V5).unwrap();
        assert_eq!(decoded.reason_code(), ReasonCode::QuotaExceeded);
        assert_eq!(decoded.packet_id().value(), 42);
    }

    #[test]
    fn test_decode_v311_ignores_extra() {
        let buf = [0x40, 0x02, 0x01, 0xc8];
        let mut ba = ByteArray::new(&buf);
        let decoded = PublishAckPacket::decode(&mut ba, ProtocolVersion::V311).unwrap();
        assert_eq!(decoded.packet_id().value(), 456);
        assert_eq!(decoded.reason_code(), ReasonCode::Success);
    }
}
