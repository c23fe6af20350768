// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Bit-exact packet codec for MQTT 3.1.1 and 5.0.
//!
//! The protocol version is fixed when a connection is configured and passed
//! to every packet `encode()`/`decode()`; one set of packet structs covers
//! both revisions. [`FrameDecoder`] turns an arbitrarily chunked inbound
//! byte stream into whole [`Packet`]s.

mod auth_packet;
mod base;
mod binary_data;
mod bool_data;
mod byte_array;
mod connect_ack_packet;
mod connect_flags;
mod connect_packet;
mod disconnect_packet;
mod error;
mod frame;
mod header;
mod packet;
mod ping_request_packet;
mod ping_response_packet;
mod property;
mod publish_ack_packet;
mod publish_complete_packet;
mod publish_packet;
mod publish_received_packet;
mod publish_release_packet;
mod reason_code;
mod string_data;
mod string_pair_data;
mod subscribe_ack_packet;
mod subscribe_packet;
mod topic;
mod u16_data;
mod u32_data;
mod unsubscribe_ack_packet;
mod unsubscribe_packet;
pub mod utils;
mod var_int;

pub use auth_packet::{AuthPacket, AUTH_PROPERTIES, AUTH_REASONS};
pub use base::{DecodePacket, EncodePacket, PacketId, ProtocolVersion, QoS, PROTOCOL_NAME};
pub use binary_data::BinaryData;
pub use bool_data::BoolData;
pub use byte_array::{ByteArray, ByteArrayError};
pub use connect_ack_packet::{
    ConnectAckPacket, ConnectReturnCode, CONNECT_ACK_PROPERTIES, CONNECT_ACK_REASONS,
};
pub use connect_flags::ConnectFlags;
pub use connect_packet::{ConnectPacket, CONNECT_PROPERTIES, WILL_PROPERTIES};
pub use disconnect_packet::{DisconnectPacket, DISCONNECT_PROPERTIES, DISCONNECT_REASONS};
pub use error::{DecodeError, EncodeError};
pub use frame::FrameDecoder;
pub use header::{FixedHeader, PacketType};
pub use packet::Packet;
pub use ping_request_packet::PingRequestPacket;
pub use ping_response_packet::PingResponsePacket;
pub use property::{
    check_multiple_subscription_identifiers, check_property_type_list, Properties, Property,
    PropertyType, MULTIPLE_PROPERTIES,
};
pub use publish_ack_packet::{PublishAckPacket, PUBLISH_ACK_PROPERTIES, PUBLISH_ACK_REASONS};
pub use publish_complete_packet::{
    PublishCompletePacket, PUBLISH_COMPLETE_PROPERTIES, PUBLISH_COMPLETE_REASONS,
};
pub use publish_packet::{PublishPacket, PUBLISH_PROPERTIES};
pub use publish_received_packet::{
    PublishReceivedPacket, PUBLISH_RECEIVED_PROPERTIES, PUBLISH_RECEIVED_REASONS,
};
pub use publish_release_packet::{
    PublishReleasePacket, PUBLISH_RELEASE_PROPERTIES, PUBLISH_RELEASE_REASONS,
};
pub use reason_code::ReasonCode;
pub use string_data::StringData;
pub use string_pair_data::StringPairData;
pub use subscribe_ack_packet::{
    SubscribeAckPacket, SUBSCRIBE_ACK_PROPERTIES, SUBSCRIBE_ACK_REASONS, SUBSCRIBE_ACK_REASONS_V3,
};
pub use subscribe_packet::{RetainHandling, SubscribePacket, SubscribeTopic, SUBSCRIBE_PROPERTIES};
pub use topic::{
    validate_pub_topic, validate_sub_topic, PubTopic, SubTopic, TopicError,
};
pub use u16_data::U16Data;
pub use u32_data::U32Data;
pub use unsubscribe_ack_packet::{
    UnsubscribeAckPacket, UNSUBSCRIBE_ACK_PROPERTIES, UNSUBSCRIBE_ACK_REASONS,
};
pub use unsubscribe_packet::{UnsubscribePacket, UNSUBSCRIBE_PROPERTIES};
pub use var_int::{VarInt, VarIntError, VAR_INT_MAX};
