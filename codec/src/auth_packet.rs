// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::property::check_property_type_list;
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, PacketType,
    Properties, PropertyType, ProtocolVersion, ReasonCode, VarIntError,
};

/// Reason codes available in AUTH packets [MQTT-3.15.2-1].
pub const AUTH_REASONS: &[ReasonCode] = &[
    ReasonCode::Success,
    ReasonCode::ContinueAuthentication,
    ReasonCode::ReAuthenticate,
];

/// Properties available in AUTH packets.
pub const AUTH_PROPERTIES: &[PropertyType] = &[
    PropertyType::AuthenticationMethod,
    PropertyType::AuthenticationData,
    PropertyType::ReasonString,
    PropertyType::UserProperty,
];

/// AUTH carries one step of an extended authentication exchange between
/// client and server. MQTT 5.0 only.
///
/// The reason code and property block may be omitted when the reason is
/// 0x00 (Success) and there are no properties, giving a remaining length
/// of 0. No payload.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AuthPacket {
    reason_code: ReasonCode,

    properties: Properties,
}

impl AuthPacket {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
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

    fn get_fixed_header(&self) -> Result<FixedHeader, VarIntError> {
        let mut remaining_length = 0;
        if self.reason_code != ReasonCode::Success || !self.properties.is_empty() {
            remaining_length += ReasonCode::bytes();
        }
        if !self.properties.is_empty() {
            remaining_length += self.properties.bytes();
        }
        FixedHeader::new(PacketType::Auth, remaining_length)
    }

    /// Serialize this packet to `buf`.
    ///
    /// # Errors
    ///
    /// Returns error when encoding for a 3.1.1 connection.
    pub fn encode(&self, version: ProtocolVersion, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        if version != ProtocolVersion::V5 {
            return Err(EncodeError::UnsupportedVersion);
        }
        let old_len = buf.len();
        let fixed_header = self.get_fixed_header()?;
        fixed_header.encode(buf)?;
        if self.reason_code != ReasonCode::Success || !self.properties.is_empty() {
            self.reason_code.encode(buf)?;
        }
        if !self.properties.is_empty() {
            self.properties.encode(buf)?;
        }
        Ok(buf.len() - old_len)
    }

    /// Deserialize one packet from `ba`.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are malformed, incomplete, or decoded on
    /// a 3.1.1 connection.
    pub fn decode(ba: &mut ByteArray, version: ProtocolVersion) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::Auth {
            return Err(DecodeError::InvalidPacketType);
        }
        if version != ProtocolVersion::V5 {
            return Err(DecodeError::InvalidPacketType);
        }

        let mut packet = Self::new();
        let remaining_length = fixed_header.remaining_length();
        if remaining_length > 0 {
            let reason_code = ReasonCode::decode(ba)?;
            if !AUTH_REASONS.contains(&reason_code) {
                log::error!("auth: invalid reason code {reason_code:?}");
                return Err(DecodeError::InvalidReasonCode);
            }
            packet.set_reason_code(reason_code);
            if remaining_length > ReasonCode::bytes() {
                let properties = Properties::decode(ba)?;
                if let Err(property_type) =
                    check_property_type_list(properties.props(), AUTH_PROPERTIES)
                {
                    log::error!("auth: property {property_type:?} is not allowed");
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
    use crate::{Property, StringData};

    #[test]
    fn test_not_available_in_v311() {
        let packet = AuthPacket::new();
        let mut buf = Vec::new();
        assert_eq!(
            packet.encode(ProtocolVersion::V311, &mut buf),
            Err(EncodeError::UnsupportedVersion)
        );
    }

    #[test]
    fn test_round_trip() {
        let mut packet = AuthPacket::new();
        packet.set_reason_code(ReasonCode::ContinueAuthentication);
        packet.mut_properties().push(Property::AuthenticationMethod(
            StringData::from("SCRAM-SHA-1").unwrap(),
        ));

        let mut buf = Vec::new();
        packet.encode(ProtocolVersion::V5, &mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = AuthPacket::decode(&mut ba, ProtocolVersion::V5).unwrap();
        assert_eq!(decoded, packet);
    }
}
