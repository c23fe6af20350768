// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, ProtocolVersion, QoS, VarInt,
    VarIntError,
};

/// Control packet type, parsed from the high nibble of the first byte.
///
/// The PUBLISH variant carries its flag bits; for all other types the flags
/// nibble has a fixed reserved value which is validated on decode
/// [MQTT-2.2.2-1], [MQTT-2.2.2-2].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PacketType {
    /// Request to connect to server
    #[default]
    Connect,

    /// Server reply to connect request
    ConnectAck,

    /// Publish message
    Publish { dup: bool, qos: QoS, retain: bool },

    /// Publish acknowledgement
    PublishAck,

    /// Publish received
    PublishReceived,

    /// Publish release
    PublishRelease,

    /// Publish complete
    PublishComplete,

    /// Client subscribe request
    Subscribe,

    /// Subscribe acknowledgement
    SubscribeAck,

    /// Unsubscribe request
    Unsubscribe,

    /// Unsubscribe acknowledgement
    UnsubscribeAck,

    /// Client ping request
    PingRequest,

    /// Server ping response
    PingResponse,

    /// Connection is being closed
    Disconnect,

    /// Authentication exchange, MQTT 5.0 only
    Auth,
}

impl PacketType {
    /// Get byte length used in packet.
    #[must_use]
    pub const fn bytes() -> usize {
        1
    }

    /// Check whether this packet type exists within `version`.
    ///
    /// The AUTH packet is only available in MQTT 5.0.
    #[must_use]
    pub fn is_valid_in(&self, version: ProtocolVersion) -> bool {
        !(*self == Self::Auth && version != ProtocolVersion::V5)
    }

    const fn type_bits(self) -> u8 {
        match self {
            Self::Connect => 1,
            Self::ConnectAck => 2,
            Self::Publish { .. } => 3,
            Self::PublishAck => 4,
            Self::PublishReceived => 5,
            Self::PublishRelease => 6,
            Self::PublishComplete => 7,
            Self::Subscribe => 8,
            Self::SubscribeAck => 9,
            Self::Unsubscribe => 10,
            Self::UnsubscribeAck => 11,
            Self::PingRequest => 12,
            Self::PingResponse => 13,
            Self::Disconnect => 14,
            Self::Auth => 15,
        }
    }

    const fn flags_bits(self) -> u8 {
        match self {
            Self::Publish { dup, qos, retain } => {
                let dup = if dup { 0b0000_1000 } else { 0 };
                let qos = (qos as u8) << 1;
                let retain = if retain { 0b0000_0001 } else { 0 };
                dup | qos | retain
            }
            // Bits 3,2,1 and 0 of the fixed header in the PUBREL, SUBSCRIBE
            // and UNSUBSCRIBE packets are reserved and MUST be set to
            // 0,0,1,0 [MQTT-3.6.1-1], [MQTT-3.8.1-1], [MQTT-3.10.1-1].
            Self::PublishRelease | Self::Subscribe | Self::Unsubscribe => 0b0000_0010,
            _ => 0b0000_0000,
        }
    }
}

impl From<PacketType> for u8 {
    fn from(packet_type: PacketType) -> Self {
        (packet_type.type_bits() << 4) | packet_type.flags_bits()
    }
}

impl TryFrom<u8> for PacketType {
    type Error = DecodeError;

    /// Parse packet type and flags from the first byte of a packet.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPacketFlags` if the reserved flag bits do not hold
    /// the value required for the packet type.
    fn try_from(v: u8) -> Result<Self, Self::Error> {
        let type_bits = (v & 0b1111_0000) >> 4;
        let flags = v & 0b0000_1111;
        let packet_type = match type_bits {
            1 => Self::Connect,
            2 => Self::ConnectAck,
            3 => {
                let dup = (flags & 0b0000_1000) != 0;
                let retain = (flags & 0b0000_0001) != 0;
                let qos = match flags & 0b0000_0110 {
                    0b0000_0000 => QoS::AtMostOnce,
                    0b0000_0010 => QoS::AtLeastOnce,
                    0b0000_0100 => QoS::ExactOnce,
                    _ => {
                        log::error!("header: both qos bits set in publish flags: {flags:#06b}");
                        return Err(DecodeError::InvalidPacketFlags);
                    }
                };
                return Ok(Self::Publish { dup, qos, retain });
            }
            4 => Self::PublishAck,
            5 => Self::PublishReceived,
            6 => Self::PublishRelease,
            7 => Self::PublishComplete,
            8 => Self::Subscribe,
            9 => Self::SubscribeAck,
            10 => Self::Unsubscribe,
            11 => Self::UnsubscribeAck,
            12 => Self::PingRequest,
            13 => Self::PingResponse,
            14 => Self::Disconnect,
            15 => Self::Auth,
            _ => {
                log::error!("header: invalid type bits: {type_bits:#b}");
                return Err(DecodeError::InvalidPacketType);
            }
        };

        if flags != packet_type.flags_bits() {
            log::error!("header: invalid flags {flags:#06b} for {packet_type:?}");
            return Err(DecodeError::InvalidPacketFlags);
        }
        Ok(packet_type)
    }
}

/// Fixed header part of a control packet, at least two bytes.
///
/// ```txt
///  7 6 5 4 3 2 1 0
/// +-------+-------+
/// | Type  | Flags |
/// +-------+-------+
/// | Remaining Len |
/// +-------+-------+
/// ```
#[allow(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FixedHeader {
    packet_type: PacketType,

    /// Number of bytes in the packet after the fixed header, encoded as a
    /// Variable Byte Integer.
    remaining_length: VarInt,
}

impl FixedHeader {
    /// Create a new fixed header.
    ///
    /// # Errors
    ///
    /// Returns error if `remaining_length` exceeds the var int range.
    pub fn new(packet_type: PacketType, remaining_length: usize) -> Result<Self, VarIntError> {
        let remaining_length = VarInt::from(remaining_length)?;
        Ok(Self {
            packet_type,
            remaining_length,
        })
    }

    #[must_use]
    pub const fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    #[must_use]
    pub const fn remaining_length(&self) -> usize {
        self.remaining_length.value()
    }

    /// Get byte length of the fixed header itself.
    #[must_use]
    pub const fn bytes(&self) -> usize {
        PacketType::bytes() + self.remaining_length.bytes()
    }
}

impl DecodePacket for FixedHeader {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let flags_byte = ba.read_byte()?;
        let packet_type = PacketType::try_from(flags_byte)?;
        let remaining_length = VarInt::decode(ba)?;
        Ok(Self {
            packet_type,
            remaining_length,
        })
    }
}

impl EncodePacket for FixedHeader {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.push(u8::from(self.packet_type));
        let len_bytes = self.remaining_length.encode(buf)?;
        Ok(PacketType::bytes() + len_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode() {
        let mut buf = Vec::new();
        let fixed_header = FixedHeader::new(PacketType::PingRequest, 0).unwrap();
        assert_eq!(fixed_header.encode(&mut buf).unwrap(), 2);
        assert_eq!(&buf, &[0xc0, 0x00]);
    }

    #[test]
    fn test_decode_publish() {
        let buf = [0x3d, 0x07, 0x00, 0x05, b'h', b'e', b'l', b'l', b'o'];
        let mut ba = ByteArray::new(&buf);
        let fixed_header = FixedHeader::decode(&mut ba).unwrap();
        assert_eq!(
            fixed_header.packet_type(),
            PacketType::Publish {
                dup: true,
                qos: QoS::ExactOnce,
                retain: true
            }
        );
        assert_eq!(fixed_header.remaining_length(), 7);
    }

    #[test]
    fn test_decode_invalid_flags() {
        // SUBSCRIBE with reserved flags 0 instead of 0b0010.
        let buf = [0x80, 0x00];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            FixedHeader::decode(&mut ba),
            Err(DecodeError::InvalidPacketFlags)
        );
    }
}
