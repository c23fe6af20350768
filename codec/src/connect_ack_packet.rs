// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::property::{check_multiple_subscription_identifiers, check_property_type_list};
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, PacketType,
    Properties, PropertyType, ProtocolVersion, ReasonCode, VarIntError,
};

/// Return code byte of a 3.1.1 CONNACK.
///
/// If the Server sends a CONNACK with a non-zero return code it MUST close
/// the network connection [MQTT-3.2.2-5].
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectReturnCode {
    /// Connection accepted.
    #[default]
    Accepted = 0,

    /// The server does not support the level of the MQTT protocol requested
    /// by the client.
    UnacceptedProtocol = 1,

    /// The client identifier is correct UTF-8 but not allowed by the server.
    IdentifierRejected = 2,

    /// The network connection has been made but the MQTT service is
    /// unavailable.
    ServerUnavailable = 3,

    /// The data in the username or password is malformed.
    MalformedUsernamePassword = 4,

    /// The client is not authorized to connect.
    Unauthorized = 5,
}

impl ConnectReturnCode {
    /// Get byte length used in packet.
    #[must_use]
    pub const fn bytes() -> usize {
        1
    }
}

impl TryFrom<u8> for ConnectReturnCode {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Accepted),
            1 => Ok(Self::UnacceptedProtocol),
            2 => Ok(Self::IdentifierRejected),
            3 => Ok(Self::ServerUnavailable),
            4 => Ok(Self::MalformedUsernamePassword),
            5 => Ok(Self::Unauthorized),
            // 6-255 are reserved.
            _ => Err(DecodeError::InvalidReturnCode),
        }
    }
}

/// Reason codes available in 5.0 CONNACK packets.
pub const CONNECT_ACK_REASONS: &[ReasonCode] = &[
    ReasonCode::Success,
    ReasonCode::UnspecifiedError,
    ReasonCode::MalformedPacket,
    ReasonCode::ProtocolError,
    ReasonCode::ImplementationSpecificError,
    ReasonCode::UnsupportedProtocolVersion,
    ReasonCode::ClientIdentifierNotValid,
    ReasonCode::BadUserNameOrPassword,
    ReasonCode::NotAuthorized,
    ReasonCode::ServerUnavailable,
    ReasonCode::ServerBusy,
    ReasonCode::Banned,
    ReasonCode::BadAuthenticationMethod,
    ReasonCode::TopicNameInvalid,
    ReasonCode::PacketTooLarge,
    ReasonCode::QuotaExceeded,
    ReasonCode::PayloadFormatInvalid,
    ReasonCode::RetainNotSupported,
    ReasonCode::QoSNotSupported,
    ReasonCode::UseAnotherServer,
    ReasonCode::ServerMoved,
    ReasonCode::ConnectionRateExceeded,
];

/// Properties available in CONNACK packets.
pub const CONNECT_ACK_PROPERTIES: &[PropertyType] = &[
    PropertyType::SessionExpiryInterval,
    PropertyType::ReceiveMaximum,
    PropertyType::MaximumQoS,
    PropertyType::RetainAvailable,
    PropertyType::MaximumPacketSize,
    PropertyType::AssignedClientIdentifier,
    PropertyType::TopicAliasMaximum,
    PropertyType::ReasonString,
    PropertyType::UserProperty,
    PropertyType::WildcardSubscriptionAvailable,
    PropertyType::SubscriptionIdentifierAvailable,
    PropertyType::SharedSubscriptionAvailable,
    PropertyType::ServerKeepAlive,
    PropertyType::ResponseInformation,
    PropertyType::ServerReference,
    PropertyType::AuthenticationMethod,
    PropertyType::AuthenticationData,
];

/// The first packet sent from the Server to the Client MUST be a CONNACK
/// packet [MQTT-3.2.0-1].
///
/// Variable header:
/// ```txt
///  7                       0
/// +-------------------------+
/// | Ack flags               |
/// +-------------------------+
/// | Return code / Reason    |
/// +-------------------------+
/// | Properties ...          |
/// +-------------------------+
/// ```
///
/// `session_present` is bit 0 of the acknowledge flags, bits 7-1 are
/// reserved. In 3.1.1 the second byte is a [`ConnectReturnCode`]; in 5.0 it
/// is a [`ReasonCode`] followed by a property block. This packet does not
/// contain a payload.
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectAckPacket {
    /// Whether the server is resuming a stored session for this client
    /// identifier. If the return code is non-zero this flag MUST be
    /// false [MQTT-3.2.2-4].
    session_present: bool,

    /// Result byte as seen by a 3.1.1 connection.
    return_code: ConnectReturnCode,

    /// Result byte as seen by a 5.0 connection.
    reason_code: ReasonCode,

    /// Property block, 5.0 only.
    properties: Properties,
}

impl ConnectAckPacket {
    #[must_use]
    pub fn new(session_present: bool) -> Self {
        Self {
            session_present,
            ..Self::default()
        }
    }

    pub fn set_session_present(&mut self, session_present: bool) -> &mut Self {
        self.session_present = session_present;
        self
    }

    #[must_use]
    pub const fn session_present(&self) -> bool {
        self.session_present
    }

    pub fn set_return_code(&mut self, return_code: ConnectReturnCode) -> &mut Self {
        self.return_code = return_code;
        self
    }

    /// Get result of the connect request on a 3.1.1 connection.
    #[must_use]
    pub const fn return_code(&self) -> ConnectReturnCode {
        self.return_code
    }

    pub fn set_reason_code(&mut self, reason_code: ReasonCode) -> &mut Self {
        self.reason_code = reason_code;
        self
    }

    /// Get result of the connect request on a 5.0 connection.
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
        let mut remaining_length = 1 + ConnectReturnCode::bytes();
        if version == ProtocolVersion::V5 {
            remaining_length += self.properties.bytes();
        }
        FixedHeader::new(PacketType::ConnectAck, remaining_length)
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

        buf.push(u8::from(self.session_present));
        match version {
            ProtocolVersion::V311 => buf.push(self.return_code as u8),
            ProtocolVersion::V5 => {
                buf.push(self.reason_code as u8);
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
        if fixed_header.packet_type() != PacketType::ConnectAck {
            return Err(DecodeError::InvalidPacketType);
        }
        if fixed_header.remaining_length() < 2 {
            return Err(DecodeError::InvalidRemainingLength);
        }

        let ack_flags = ba.read_byte()?;
        if ack_flags & 0b1111_1110 != 0 {
            return Err(DecodeError::InvalidPacketFlags);
        }
        let session_present = ack_flags & 0b0000_0001 == 0b0000_0001;

        let mut packet = Self::new(session_present);
        match version {
            ProtocolVersion::V311 => {
                packet.set_return_code(ConnectReturnCode::try_from(ba.read_byte()?)?);
            }
            ProtocolVersion::V5 => {
                let reason_code = ReasonCode::decode(ba)?;
                if !CONNECT_ACK_REASONS.contains(&reason_code) {
                    log::error!("connect_ack: invalid reason code {reason_code:?}");
                    return Err(DecodeError::InvalidReasonCode);
                }
                packet.set_reason_code(reason_code);
                let properties = Properties::decode(ba)?;
                if let Err(property_type) =
                    check_property_type_list(properties.props(), CONNECT_ACK_PROPERTIES)
                {
                    log::error!("connect_ack: property {property_type:?} is not allowed");
                    return Err(DecodeError::InvalidPropertyType);
                }
                if check_multiple_subscription_identifiers(properties.props()).is_err() {
                    return Err(DecodeError::InvalidPropertyType);
                }
                packet.properties = properties;
            }
        }
        Ok(packet)
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
    fn test_decode_v311() {
        let buf = [0x20, 0x02, 0x01, 0x00];
        let mut ba = ByteArray::new(&buf);
        let packet = ConnectAckPacket::decode(&mut ba, ProtocolVersion::V311).unwrap();
        assert!(packet.session_present());
        assert_eq!(packet.return_code(), ConnectReturnCode::Accepted);
    }

    #[test]
    fn test_round_trip_v5() {
        let mut packet = ConnectAckPacket::new(false);
        packet.set_reason_code(ReasonCode::Success);
        packet
            .mut_properties()
            .push(crate::Property::ServerKeepAlive(crate::U16Data::new(30)));

        let mut buf = Vec::new();
        packet.encode(ProtocolVersion::V5, &mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = ConnectAckPacket::decode(&mut ba, ProtocolVersion::V5).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.properties().server_keep_alive(), Some(30));
    }
}
