// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use std::convert::TryFrom;

use crate::{
    AuthPacket, ByteArray, ConnectAckPacket, ConnectPacket, DecodeError, DisconnectPacket,
    EncodeError, PacketType, PingRequestPacket, PingResponsePacket, ProtocolVersion,
    PublishAckPacket, PublishCompletePacket, PublishPacket, PublishReceivedPacket,
    PublishReleasePacket, SubscribeAckPacket, SubscribePacket, UnsubscribeAckPacket,
    UnsubscribePacket,
};

/// Any MQTT control packet.
///
/// Inbound dispatch: the type nibble of the first byte selects the concrete
/// decoder. Outbound: forwards to the concrete packet's `encode`.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Connect(ConnectPacket),
    ConnectAck(ConnectAckPacket),
    Publish(PublishPacket),
    PublishAck(PublishAckPacket),
    PublishReceived(PublishReceivedPacket),
    PublishRelease(PublishReleasePacket),
    PublishComplete(PublishCompletePacket),
    Subscribe(SubscribePacket),
    SubscribeAck(SubscribeAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubscribeAck(UnsubscribeAckPacket),
    PingRequest(PingRequestPacket),
    PingResponse(PingResponsePacket),
    Disconnect(DisconnectPacket),
    Auth(AuthPacket),
}

impl Packet {
    /// Get the packet type, including publish flags.
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        match self {
            Self::Connect(..) => PacketType::Connect,
            Self::ConnectAck(..) => PacketType::ConnectAck,
            Self::Publish(packet) => PacketType::Publish {
                dup: packet.dup(),
                qos: packet.qos(),
                retain: packet.retain(),
            },
            Self::PublishAck(..) => PacketType::PublishAck,
            Self::PublishReceived(..) => PacketType::PublishReceived,
            Self::PublishRelease(..) => PacketType::PublishRelease,
            Self::PublishComplete(..) => PacketType::PublishComplete,
            Self::Subscribe(..) => PacketType::Subscribe,
            Self::SubscribeAck(..) => PacketType::SubscribeAck,
            Self::Unsubscribe(..) => PacketType::Unsubscribe,
            Self::UnsubscribeAck(..) => PacketType::UnsubscribeAck,
            Self::PingRequest(..) => PacketType::PingRequest,
            Self::PingResponse(..) => PacketType::PingResponse,
            Self::Disconnect(..) => PacketType::Disconnect,
            Self::Auth(..) => PacketType::Auth,
        }
    }

    /// Serialize this packet to `buf`.
    ///
    /// # Errors
    ///
    /// Returns error if the packet cannot be represented in `version`.
    pub fn encode(&self, version: ProtocolVersion, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        match self {
            Self::Connect(packet) => packet.encode(version, buf),
            Self::ConnectAck(packet) => packet.encode(version, buf),
            Self::Publish(packet) => packet.encode(version, buf),
            Self::PublishAck(packet) => packet.encode(version, buf),
            Self::PublishReceived(packet) => packet.encode(version, buf),
            Self::PublishRelease(packet) => packet.encode(version, buf),
            Self::PublishComplete(packet) => packet.encode(version, buf),
            Self::Subscribe(packet) => packet.encode(version, buf),
            Self::SubscribeAck(packet) => packet.encode(version, buf),
            Self::Unsubscribe(packet) => packet.encode(version, buf),
            Self::UnsubscribeAck(packet) => packet.encode(version, buf),
            Self::PingRequest(packet) => packet.encode(version, buf),
            Self::PingResponse(packet) => packet.encode(version, buf),
            Self::Disconnect(packet) => packet.encode(version, buf),
            Self::Auth(packet) => packet.encode(version, buf),
        }
    }

    /// Deserialize one packet of any type from `ba`.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes are malformed or incomplete.
    pub fn decode(ba: &mut ByteArray, version: ProtocolVersion) -> Result<Self, DecodeError> {
        let packet_type = PacketType::try_from(ba.peek_byte()?)?;
        if !packet_type.is_valid_in(version) {
            return Err(DecodeError::InvalidPacketType);
        }
        match packet_type {
            PacketType::Connect => ConnectPacket::decode(ba, version).map(Self::Connect),
            PacketType::ConnectAck => ConnectAckPacket::decode(ba, version).map(Self::ConnectAck),
            PacketType::Publish { .. } => PublishPacket::decode(ba, version).map(Self::Publish),
            PacketType::PublishAck => PublishAckPacket::decode(ba, version).map(Self::PublishAck),
            PacketType::PublishReceived => {
                PublishReceivedPacket::decode(ba, version).map(Self::PublishReceived)
            }
            PacketType::PublishRelease => {
                PublishReleasePacket::decode(ba, version).map(Self::PublishRelease)
            }
            PacketType::PublishComplete => {
                PublishCompletePacket::decode(ba, version).map(Self::PublishComplete)
            }
            PacketType::Subscribe => SubscribePacket::decode(ba, version).map(Self::Subscribe),
            PacketType::SubscribeAck => {
                SubscribeAckPacket::decode(ba, version).map(Self::SubscribeAck)
            }
            PacketType::Unsubscribe => {
                UnsubscribePacket::decode(ba, version).map(Self::Unsubscribe)
            }
            PacketType::UnsubscribeAck => {
                UnsubscribeAckPacket::decode(ba, version).map(Self::UnsubscribeAck)
            }
            PacketType::PingRequest => {
                PingRequestPacket::decode(ba, version).map(Self::PingRequest)
            }
            PacketType::PingResponse => {
                PingResponsePacket::decode(ba, version).map(Self::PingResponse)
            }
            PacketType::Disconnect => DisconnectPacket::decode(ba, version).map(Self::Disconnect),
            PacketType::Auth => AuthPacket::decode(ba, version).map(Self::Auth),
        }
    }
}

impl From<ConnectPacket> for Packet {
    fn from(packet: ConnectPacket) -> Self {
        Self::Connect(packet)
    }
}

impl From<ConnectAckPacket> for Packet {
    fn from(packet: ConnectAckPacket) -> Self {
        Self::ConnectAck(packet)
    }
}

impl From<PublishPacket> for Packet {
    fn from(packet: PublishPacket) -> Self {
        Self::Publish(packet)
    }
}

impl From<PublishAckPacket> for Packet {
    fn from(packet: PublishAckPacket) -> Self {
        Self::PublishAck(packet)
    }
}

impl From<PublishReceivedPacket> for Packet {
    fn from(packet: PublishReceivedPacket) -> Self {
        Self::PublishReceived(packet)
    }
}

impl From<PublishReleasePacket> for Packet {
    fn from(packet: PublishReleasePacket) -> Self {
        Self::PublishRelease(packet)
    }
}

impl From<PublishCompletePacket> for Packet {
    fn from(packet: PublishCompletePacket) -> Self {
        Self::PublishComplete(packet)
    }
}

impl From<SubscribePacket> for Packet {
    fn from(packet: SubscribePacket) -> Self {
        Self::Subscribe(packet)
    }
}

impl From<SubscribeAckPacket> for Packet {
    fn from(packet: SubscribeAckPacket) -> Self {
        Self::SubscribeAck(packet)
    }
}

impl From<UnsubscribePacket> for Packet {
    fn from(packet: UnsubscribePacket) -> Self {
        Self::Unsubscribe(packet)
    }
}

impl From<UnsubscribeAckPacket> for Packet {
    fn from(packet: UnsubscribeAckPacket) -> Self {
        Self::UnsubscribeAck(packet)
    }
}

impl From<PingRequestPacket> for Packet {
    fn from(packet: PingRequestPacket) -> Self {
        Self::PingRequest(packet)
    }
}

impl From<PingResponsePacket> for Packet {
    fn from(packet: PingResponsePacket) -> Self {
        Self::PingResponse(packet)
    }
}

impl From<DisconnectPacket> for Packet {
    fn from(packet: DisconnectPacket) -> Self {
        Self::Disconnect(packet)
    }
}

impl From<AuthPacket> for Packet {
    fn from(packet: AuthPacket) -> Self {
        Self::Auth(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PacketId, QoS};

    #[test]
    fn test_dispatch_by_type_nibble() {
        let mut buf = Vec::new();
        let publish = PublishPacket::new("a/b", QoS::AtMostOnce, b"hi").unwrap();
        publish.encode(ProtocolVersion::V311, &mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let packet = Packet::decode(&mut ba, ProtocolVersion::V311).unwrap();
        assert_eq!(packet, Packet::Publish(publish));
    }

    #[test]
    fn test_auth_rejected_in_v311() {
        let buf = [0xf0, 0x00];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            Packet::decode(&mut ba, ProtocolVersion::V311),
            Err(DecodeError::InvalidPacketType)
        );
    }

    #[test]
    fn test_round_trip_ack() {
        let ack = PublishAckPacket::new(PacketId::new(99));
        let mut buf = Vec::new();
        Packet::from(ack.clone())
            .encode(ProtocolVersion::V5, &mut buf)
            .unwrap();
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            Packet::decode(&mut ba, ProtocolVersion::V5).unwrap(),
            Packet::PublishAck(ack)
        );
    }
}
