// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use bytes::{Buf, BytesMut};

use crate::{ByteArray, DecodeError, DecodePacket, FixedHeader, Packet, ProtocolVersion};

/// Incremental frame decoder turning an arbitrarily chunked byte stream into
/// whole control packets.
///
/// Inbound chunks are appended with [`feed`](Self::feed); each call to
/// [`next_packet`](Self::next_packet) removes exactly one complete packet
/// from the buffer, or leaves the buffer untouched when only part of a
/// packet has arrived. A single packet delivered across many chunks, or
/// many packets in one chunk, both work.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an inbound chunk to the internal buffer.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Get number of buffered bytes not yet decoded.
    #[must_use]
    pub fn buffered_bytes(&self) -> usize {
        self.buf.len()
    }

    /// Try to decode the next whole packet from the buffer.
    ///
    /// Returns `Ok(None)` when the buffer holds only part of a packet; the
    /// buffered bytes are kept for the next call.
    ///
    /// # Errors
    ///
    /// Returns error if the buffered bytes are malformed. The framing is
    /// lost at that point and the connection must be closed.
    pub fn next_packet(&mut self, version: ProtocolVersion) -> Result<Option<Packet>, DecodeError> {
        if self.buf.is_empty() {
            return Ok(None);
        }

        let mut ba = ByteArray::new(&self.buf);
        let fixed_header = match FixedHeader::decode(&mut ba) {
            Ok(fixed_header) => fixed_header,
            Err(DecodeError::InsufficientData) => return Ok(None),
            Err(err) => return Err(err),
        };
        let packet_bytes = fixed_header.bytes() + fixed_header.remaining_length();
        if self.buf.len() < packet_bytes {
            return Ok(None);
        }

        // The whole packet is buffered; decode from exactly its bytes so a
        // malformed length cannot run into the following packet.
        let mut ba = ByteArray::new(&self.buf[..packet_bytes]);
        let result = Packet::decode(&mut ba, version);
        match result {
            Ok(packet) => {
                self.buf.advance(packet_bytes);
                Ok(Some(packet))
            }
            // The body is complete, so running short here means the
            // remaining length lied about the field layout.
            Err(DecodeError::InsufficientData) => Err(DecodeError::InvalidRemainingLength),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PacketId, PublishAckPacket, PublishPacket, QoS};

    #[test]
    fn test_partial_then_complete() {
        let mut buf = Vec::new();
        let publish = PublishPacket::new("MyTopic", QoS::AtMostOnce, b"Test payload").unwrap();
        publish.encode(ProtocolVersion::V311, &mut buf).unwrap();

        let mut decoder = FrameDecoder::new();
        // Feed one byte at a time; no packet until the last byte arrives.
        for byte in &buf[..buf.len() - 1] {
            decoder.feed(&[*byte]);
            assert!(decoder
                .next_packet(ProtocolVersion::V311)
                .unwrap()
                .is_none());
        }
        decoder.feed(&buf[buf.len() - 1..]);
        let packet = decoder.next_packet(ProtocolVersion::V311).unwrap().unwrap();
        assert_eq!(packet, Packet::Publish(publish));
        assert_eq!(decoder.buffered_bytes(), 0);
    }

    #[test]
    fn test_two_packets_in_one_chunk() {
        let mut buf = Vec::new();
        PublishAckPacket::new(PacketId::new(1))
            .encode(ProtocolVersion::V311, &mut buf)
            .unwrap();
        PublishAckPacket::new(PacketId::new(2))
            .encode(ProtocolVersion::V311, &mut buf)
            .unwrap();

        let mut decoder = FrameDecoder::new();
        decoder.feed(&buf);
        let first = decoder.next_packet(ProtocolVersion::V311).unwrap().unwrap();
        let second = decoder.next_packet(ProtocolVersion::V311).unwrap().unwrap();
        assert!(decoder.next_packet(ProtocolVersion::V311).unwrap().is_none());

        let Packet::PublishAck(first) = first else {
            panic!("expected puback");
        };
        let Packet::PublishAck(second) = second else {
            panic!("expected puback");
        };
        assert_eq!(first.packet_id().value(), 1);
        assert_eq!(second.packet_id().value(), 2);
    }

    #[test]
    fn test_malformed_header_is_fatal() {
        let mut decoder = FrameDecoder::new();
        // Type nibble 0 is invalid.
        decoder.feed(&[0x00, 0x00]);
        assert_eq!(
            decoder.next_packet(ProtocolVersion::V311),
            Err(DecodeError::InvalidPacketType)
        );
    }
}
