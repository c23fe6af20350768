// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::property::check_property_type_list;
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, PacketType,
    Properties, PropertyType, ProtocolVersion, ReasonCode, VarIntError,
};

/// Reason codes available in DISCONNECT packets.
pub const DISCONNECT_REASONS: &[ReasonCode] = &[
    ReasonCode::Success,
    ReasonCode::DisconnectWithWillMessage,
    ReasonCode::UnspecifiedError,
    ReasonCode::MalformedPacket,
    ReasonCode::ProtocolError,
    ReasonCode::ImplementationSpecificError,
    ReasonCode::NotAuthorized,
    ReasonCode::ServerBusy,
    ReasonCode::ServerShuttingDown,
    ReasonCode::BadAuthenticationMethod,
    ReasonCode::KeepAliveTimeout,
    ReasonCode::SessionTakenOver,
    ReasonCode::TopicFilterInvalid,
    ReasonCode::TopicNameInvalid,
    ReasonCode::ReceiveMaximumExceeded,
    ReasonCode::TopicAliasInvalid,
    ReasonCode::PacketTooLarge,
    ReasonCode::MessageRateTooHigh,
    ReasonCode::QuotaExceeded,
    ReasonCode::AdministrativeAction,
    ReasonCode::PayloadFormatInvalid,
    ReasonCode::RetainNotSupported,
    ReasonCode::QoSNotSupported,
    ReasonCode::UseAnotherServer,
    ReasonCode::ServerMoved,
    ReasonCode::SharedSubscriptionsNotSupported,
    ReasonCode::ConnectionRateExceeded,
    ReasonCode::MaximumConnectTime,
    ReasonCode::SubscriptionIdentifiersNotSupported,
    ReasonCode::WildcardSubscriptionsNotSupported,
];

/// Properties available in DISCONNECT packets.
pub const DISCONNECT_PROPERTIES: &[PropertyType] = &[
    PropertyType::SessionExpiryInterval,
    PropertyType::ReasonString,
    PropertyType::UserProperty,
    PropertyType::ServerReference,
];

/// DISCONNECT is the final packet on a connection, sent by either side in
/// 5.0 and only by the client in 3.1.1.
///
/// In 3.1.1 the body is always empty. In 5.0 an optional reason code and
/// property block follow; both are omitted when the reason is 0x00 (Normal
/// disconnection) and there are no properties, giving a remaining length
/// of 0. No payload.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DisconnectPacket {
    reason_code: ReasonCode,

    properties: Properties,
}

impl DisconnectPacket {
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

    fn get_fixed_header(&self, version: ProtocolVersion) -> Result<FixedHeader, VarIntError> {
        let mut remaining_length = 0;
        if version == ProtocolVersion::V5 {
            if self.reason_code != ReasonCode::Success || !self.properties.is_empty() {
                remaining_length += ReasonCode::bytes();
            }
            if !self.properties.is_empty() {
                remaining_length += self.properties.bytes();
            }
        }
        FixedHeader::new(PacketType::Disconnect, remaining_length)
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
        if fixed_header.packet_type() != PacketType::Disconnect {
            return Err(DecodeError::InvalidPacketType);
        }
        let remaining_length = fixed_header.remaining_length();
        if version == ProtocolVersion::V311 && remaining_length != 0 {
            return Err(DecodeError::InvalidRemainingLength);
        }

        let mut packet = Self::new();
        if version == ProtocolVersion::V5 && remaining_length > 0 {
            let reason_code = ReasonCode::decode(ba)?;
            if !DISCONNECT_REASONS.contains(&reason_code) {
                log::error!("disconnect: invalid reason code {reason_code:?}");
                return Err(DecodeError::InvalidReasonCode);
            }
            packet.set_reason_code(reason_code);
            if remaining_length > ReasonCode::bytes() {
                let properties = Properties::decode(ba)?;
                if let Err(property_type) =
                    check_property_type_list(properties.props(), DISCONNECT_PROPERTIES)
                {
                    log::error!("disconnect: property {property_type:?} is not allowed");
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
    fn test_encode_v311_is_empty() {
        let mut packet = DisconnectPacket::new();
        packet.set_reason_code(ReasonCode::DisconnectWithWillMessage);
        let mut buf = Vec::new();
        packet.encode(ProtocolVersion::V311, &mut buf).unwrap();
        assert_eq!(&buf, &[0xe0, 0x00]);
    }

    #[test]
    fn test_round_trip_v5_with_reason() {
        let mut packet = DisconnectPacket::new();
        packet.set_reason_code(ReasonCode::DisconnectWithWillMessage);
        let mut buf = Vec::new();
        packet.encode(ProtocolVersion::V5, &mut buf).unwrap();
        assert_eq!(&buf, &[0xe0, 0x01, 0x04]);

        let mut ba = ByteArray::new(&buf);
        let decoded = DisconnectPacket::decode(&mut ba, ProtocolVersion::V5).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_decode_v5_default() {
        let buf = [0xe0, 0x00];
        let mut ba = ByteArray::new(&buf);
        let decoded = DisconnectPacket::decode(&mut ba, ProtocolVersion::V5).unwrap();
        assert_eq!(decoded.reason_code(), ReasonCode::Success);
    }
}
