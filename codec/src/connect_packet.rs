// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::connect_flags::ConnectFlags;
use crate::property::check_property_type_list;
use crate::utils::validate_client_id;
use crate::{
    BinaryData, ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader,
    PacketType, Properties, PropertyType, ProtocolVersion, PubTopic, QoS, StringData, U16Data,
    VarIntError, PROTOCOL_NAME,
};

/// Properties available in CONNECT packets.
pub const CONNECT_PROPERTIES: &[PropertyType] = &[
    PropertyType::SessionExpiryInterval,
    PropertyType::ReceiveMaximum,
    PropertyType::MaximumPacketSize,
    PropertyType::TopicAliasMaximum,
    PropertyType::RequestResponseInformation,
    PropertyType::RequestProblemInformation,
    PropertyType::UserProperty,
    PropertyType::AuthenticationMethod,
    PropertyType::AuthenticationData,
];

/// Properties available in the will property block.
pub const WILL_PROPERTIES: &[PropertyType] = &[
    PropertyType::WillDelayInterval,
    PropertyType::PayloadFormatIndicator,
    PropertyType::MessageExpiryInterval,
    PropertyType::ContentType,
    PropertyType::ResponseTopic,
    PropertyType::CorrelationData,
    PropertyType::UserProperty,
];

/// CONNECT is the first packet sent from the Client to the Server.
///
/// A Client can only send the CONNECT packet once over a Network
/// Connection [MQTT-3.1.0-2].
///
/// Body layout (both versions, property blocks 5.0 only):
///
/// ```txt
/// +----------------------------+
/// | Fixed header               |
/// +----------------------------+
/// | Protocol name "MQTT"       |
/// +----------------------------+
/// | Protocol level             |
/// +----------------------------+
/// | Connect flags              |
/// +----------------------------+
/// | Keep alive                 |
/// +----------------------------+
/// | Properties ...             |
/// +----------------------------+
/// | Client id                  |
/// +----------------------------+
/// | Will properties ...        |
/// +----------------------------+
/// | Will topic                 |
/// +----------------------------+
/// | Will payload               |
/// +----------------------------+
/// | Username                   |
/// +----------------------------+
/// | Password                   |
/// +----------------------------+
/// ```
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectPacket {
    client_id: StringData,

    /// Time interval in seconds between two control packets. If no other
    /// packet is due, the client sends PINGREQ instead.
    keep_alive: U16Data,

    /// Discard any previous session state on both sides.
    clean_session: bool,

    /// Quality of service for the will message.
    will_qos: QoS,

    /// Whether the server shall retain the will message when publishing it.
    will_retain: bool,

    will_topic: Option<PubTopic>,

    will_message: BinaryData,

    /// Property block of the will message, 5.0 only.
    will_properties: Properties,

    username: Option<StringData>,

    password: Option<BinaryData>,

    /// Property block of the packet itself, 5.0 only.
    properties: Properties,
}

impl ConnectPacket {
    /// Create a new connect packet with `client_id`.
    ///
    /// # Errors
    ///
    /// Returns error if `client_id` contains invalid characters.
    pub fn new(client_id: &str) -> Result<Self, EncodeError> {
        validate_client_id(client_id).map_err(|_| EncodeError::InvalidString)?;
        Ok(Self {
            client_id: StringData::from(client_id)?,
            ..Self::default()
        })
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        self.client_id.as_ref()
    }

    pub fn set_keep_alive(&mut self, keep_alive: u16) -> &mut Self {
        self.keep_alive = U16Data::new(keep_alive);
        self
    }

    #[must_use]
    pub const fn keep_alive(&self) -> u16 {
        self.keep_alive.value()
    }

    pub fn set_clean_session(&mut self, clean_session: bool) -> &mut Self {
        self.clean_session = clean_session;
        self
    }

    #[must_use]
    pub const fn clean_session(&self) -> bool {
        self.clean_session
    }

    /// Set will topic and payload.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` is not a valid topic name or `message` is
    /// too long.
    pub fn set_will(&mut self, topic: &str, message: &[u8]) -> Result<&mut Self, EncodeError> {
        self.will_topic = Some(PubTopic::new(topic)?);
        self.will_message = BinaryData::from_slice(message)?;
        Ok(self)
    }

    #[must_use]
    pub fn will_topic(&self) -> Option<&PubTopic> {
        self.will_topic.as_ref()
    }

    #[must_use]
    pub fn will_message(&self) -> &[u8] {
        self.will_message.as_ref()
    }

    pub fn set_will_qos(&mut self, qos: QoS) -> &mut Self {
        self.will_qos = qos;
        self
    }

    #[must_use]
    pub const fn will_qos(&self) -> QoS {
        self.will_qos
    }

    pub fn set_will_retain(&mut self, retain: bool) -> &mut Self {
        self.will_retain = retain;
        self
    }

    #[must_use]
    pub const fn will_retain(&self) -> bool {
        self.will_retain
    }

    pub fn mut_will_properties(&mut self) -> &mut Properties {
        &mut self.will_properties
    }

    #[must_use]
    pub const fn will_properties(&self) -> &Properties {
        &self.will_properties
    }

    /// Set username field.
    ///
    /// # Errors
    ///
    /// Returns error if `username` is too long or ill-formed.
    pub fn set_username(&mut self, username: Option<&str>) -> Result<&mut Self, EncodeError> {
        self.username = match username {
            Some(username) => Some(StringData::from(username)?),
            None => None,
        };
        Ok(self)
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_ref().map(AsRef::as_ref)
    }

    /// Set password field.
    ///
    /// # Errors
    ///
    /// Returns error if `password` is too long.
    pub fn set_password(&mut self, password: Option<&[u8]>) -> Result<&mut Self, EncodeError> {
        self.password = match password {
            Some(password) => Some(BinaryData::from_slice(password)?),
            None => None,
        };
        Ok(self)
    }

    #[must_use]
    pub fn password(&self) -> Option<&[u8]> {
        self.password.as_ref().map(AsRef::as_ref)
    }

    pub fn mut_properties(&mut self) -> &mut Properties {
        &mut self.properties
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    const fn connect_flags(&self) -> ConnectFlags {
        ConnectFlags {
            has_username: self.username.is_some(),
            has_password: self.password.is_some(),
            will_retain: self.will_retain,
            will_qos: self.will_qos,
            has_will: self.will_topic.is_some(),
            clean_session: self.clean_session,
        }
    }

    fn get_fixed_header(&self, version: ProtocolVersion) -> Result<FixedHeader, VarIntError> {
        let mut remaining_length = 2
            + PROTOCOL_NAME.len()
            + ProtocolVersion::bytes()
            + ConnectFlags::bytes()
            + U16Data::bytes()
            + self.client_id.bytes();
        if version == ProtocolVersion::V5 {
            remaining_length += self.properties.bytes();
        }
        if let Some(will_topic) = &self.will_topic {
            if version == ProtocolVersion::V5 {
                remaining_length += self.will_properties.bytes();
            }
            remaining_length += will_topic.bytes();
            remaining_length += self.will_message.bytes();
        }
        if let Some(username) = &self.username {
            remaining_length += username.bytes();
        }
        if let Some(password) = &self.password {
            remaining_length += password.bytes();
        }
        FixedHeader::new(PacketType::Connect, remaining_length)
    }

    /// Serialize this packet to `buf`.
    ///
    /// # Errors
    ///
    /// Returns error if a field combination is not representable in
    /// `version`, e.g. a password without username in 3.1.1.
    pub fn encode(&self, version: ProtocolVersion, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        // If the User Name Flag is set to 0, the Password Flag MUST be
        // set to 0 [MQTT-3.1.2-22]. Lifted in 5.0.
        if version == ProtocolVersion::V311 && self.username.is_none() && self.password.is_some() {
            return Err(EncodeError::InvalidPacketType);
        }

        let old_len = buf.len();
        let fixed_header = self.get_fixed_header(version)?;
        fixed_header.encode(buf)?;

        StringData::from(PROTOCOL_NAME)?.encode(buf)?;
        version.encode(buf)?;
        self.connect_flags().encode(buf)?;
        self.keep_alive.encode(buf)?;
        if version == ProtocolVersion::V5 {
            self.properties.encode(buf)?;
        }

        self.client_id.encode(buf)?;
        if let Some(will_topic) = &self.will_topic {
            if version == ProtocolVersion::V5 {
                self.will_properties.encode(buf)?;
            }
            will_topic.encode(buf)?;
            self.will_message.encode(buf)?;
        }
        if let Some(username) = &self.username {
            username.encode(buf)?;
        }
        if let Some(password) = &self.password {
            password.encode(buf)?;
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
        if fixed_header.packet_type() != PacketType::Connect {
            return Err(DecodeError::InvalidPacketType);
        }

        let protocol_name = StringData::decode(ba)?;
        if protocol_name.as_ref() != PROTOCOL_NAME {
            log::error!("connect: invalid protocol name: {protocol_name}");
            return Err(DecodeError::InvalidProtocolName);
        }
        let protocol_version = ProtocolVersion::decode(ba)?;
        if protocol_version != version {
            return Err(DecodeError::InvalidProtocolVersion);
        }
        let connect_flags = ConnectFlags::decode(ba)?;
        if version == ProtocolVersion::V311 && !connect_flags.has_username && connect_flags.has_password
        {
            return Err(DecodeError::InvalidConnectFlags);
        }
        let keep_alive = U16Data::decode(ba)?;
        let properties = if version == ProtocolVersion::V5 {
            let properties = Properties::decode(ba)?;
            if let Err(property_type) = check_property_type_list(properties.props(), CONNECT_PROPERTIES)
            {
                log::error!("connect: property {property_type:?} is not allowed");
                return Err(DecodeError::InvalidPropertyType);
            }
            properties
        } else {
            Properties::new()
        };

        let client_id = StringData::decode(ba)?;
        validate_client_id(client_id.as_ref())?;

        let (will_properties, will_topic, will_message) = if connect_flags.has_will {
            let will_properties = if version == ProtocolVersion::V5 {
                let props = Properties::decode(ba)?;
                if let Err(property_type) = check_property_type_list(props.props(), WILL_PROPERTIES) {
                    log::error!("connect: will property {property_type:?} is not allowed");
                    return Err(DecodeError::InvalidPropertyType);
                }
                props
            } else {
                Properties::new()
            };
            let topic = PubTopic::decode(ba)?;
            let message = BinaryData::decode(ba)?;
            (will_properties, Some(topic), message)
        } else {
            (Properties::new(), None, BinaryData::new())
        };

        let username = if connect_flags.has_username {
            Some(StringData::decode(ba)?)
        } else {
            None
        };
        let password = if connect_flags.has_password {
            Some(BinaryData::decode(ba)?)
        } else {
            None
        };

        Ok(Self {
            client_id,
            keep_alive,
            clean_session: connect_flags.clean_session,
            will_qos: connect_flags.will_qos,
            will_retain: connect_flags.will_retain,
            will_topic,
            will_message,
            will_properties,
            username,
            password,
            properties,
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
    use std::convert::TryFrom;

    #[test]
    fn test_encode_v311_with_will() {
        let mut packet = ConnectPacket::new("MyClient").unwrap();
        packet.set_clean_session(true);
        packet.set_keep_alive(15);
        packet.set_will("MyTopic", b"Test payload").unwrap();

        let mut buf = Vec::new();
        let written = packet.encode(ProtocolVersion::V311, &mut buf).unwrap();
        assert_eq!(written, 45);
        assert_eq!(buf[0], 0x10);
        assert_eq!(buf[1], 0x2b);
        // Protocol name, level 4, flags with clean-session and will bits.
        assert_eq!(&buf[2..8], &[0x00, 0x04, b'M', b'Q', b'T', b'T']);
        assert_eq!(buf[8], 0x04);
        assert_eq!(buf[9], 0b0000_0110);
        // Keep alive 15s.
        assert_eq!(&buf[10..12], &[0x00, 0x0f]);
    }

    #[test]
    fn test_round_trip_v5() {
        let mut packet = ConnectPacket::new("fengbo-client").unwrap();
        packet.set_clean_session(true);
        packet.set_keep_alive(60);
        packet.set_username(Some("grandpa")).unwrap();
        packet.set_password(Some(b"secret")).unwrap();
        packet
            .mut_properties()
            .push(crate::Property::SessionExpiryInterval(crate::U32Data::new(
                300,
            )));

        let mut buf = Vec::new();
        packet.encode(ProtocolVersion::V5, &mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = ConnectPacket::decode(&mut ba, ProtocolVersion::V5).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_v311_password_requires_username() {
        let mut packet = ConnectPacket::new("MyClient").unwrap();
        packet.set_password(Some(b"secret")).unwrap();
        let mut buf = Vec::new();
        assert!(packet.encode(ProtocolVersion::V311, &mut buf).is_err());
        buf.clear();
        assert!(packet.encode(ProtocolVersion::V5, &mut buf).is_ok());
    }

    #[test]
    fn test_decode_rejects_wrong_first_packet() {
        let buf = [0xc0, 0x00];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            ConnectPacket::decode(&mut ba, ProtocolVersion::V311),
            Err(DecodeError::InvalidPacketType)
        );
        let _ = PacketType::try_from(0xc0u8).unwrap();
    }
}
