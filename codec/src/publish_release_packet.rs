// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::property::check_property_type_list;
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, PacketId,
    PacketType, Properties, PropertyType, ProtocolVersion, ReasonCode, VarIntError,
};

/// Reason codes available in PUBREL packets [MQTT-3.6.2-1].
pub const PUBLISH_RELEASE_REASONS: &[ReasonCode] =
    &[ReasonCode::Success, ReasonCode::PacketIdentifierNotFound];

/// Properties available in PUBREL packets.
pub const PUBLISH_RELEASE_PROPERTIES: &[PropertyType] =
    &[PropertyType::ReasonString, PropertyType::UserProperty];

/// PUBREL is the response to a PUBREC packet, the third packet of the QoS 2
/// delivery ladder. It is answered with PUBCOMP.
///
/// Bits 3,2,1,0 of its fixed header are reserved and MUST be 0,0,1,0
/// [MQTT-3.6.1-1]; the header codec enforces this. Body layout and the 5.0
/// reason/property omission rule are identical to PUBACK. No payload.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishReleasePacket {
    packet_id: PacketId,

    reason_code: ReasonCode,

    properties: Properties,
}

impl PublishReleasePacket {
    /// Create a new publish release packet for `packet_id`.
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
        FixedHeader::new(PacketType::PublishRelease, remaining_length)
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
        if fixed_header.packet_type() != PacketType::PublishRelease {
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
            if !PUBLISH_RELEASE_REASONS.contains(&reason_code) {
                log::error!("publish_release: invalid reason code {reason_code:?}");
                return Err(DecodeError::InvalidReasonCode);
            }
            packet.set_reason_code(reason_code);
            if remaining_length > PacketId::bytes() + ReasonCode::bytes() {
                let properties = Properties::decode(ba)?;
                if let Err(property_type) =
                    check_property_type_list(properties.props(), PUBLISH_RELEASE_PROPERTIES)
                {
                    log::error!("publish_release: property {property_type:?} is not allowed");
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
    fn test_fixed_header_flags() {
        let packet = PublishReleasePacket::new(PacketId::new(7));
        let mut buf = Vec::new();
        packet.encode(ProtocolVersion::V311, &mut buf).unwrap();
        assert_eq!(&buf, &[0x62, 0x02, 0x00, 0x07]);
    }

    #[test]
    fn test_round_trip_v5_not_found() {
        let mut packet = PublishReleasePacket::new(PacketId::new(9));
        packet.set_reason_code(ReasonCode::PacketIdentifierNotFound);
        let mut buf = Vec::new();
        packet.encode(ProtocolVersion::V5, &mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = PublishReleasePacket::decode(&mut ba, ProtocolVersion::V5).unwrap();
        assert_eq!(decoded, packet);
    }
}
