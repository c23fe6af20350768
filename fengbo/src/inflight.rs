// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use codec::{PacketId, PublishPacket, PublishReleasePacket};

/// An unacknowledged outbound packet held for re-delivery.
///
/// A QoS 1 publish stays until PUBACK; a QoS 2 publish stays until PUBREC,
/// after which its PUBREL stays until PUBCOMP. At any moment exactly one of
/// the two is stored per packet identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredPacket {
    Publish(PublishPacket),
    Release(PublishReleasePacket),
}

impl StoredPacket {
    #[must_use]
    pub fn packet_id(&self) -> PacketId {
        match self {
            Self::Publish(packet) => packet.packet_id(),
            Self::Release(packet) => packet.packet_id(),
        }
    }
}

/// Ordered collection of inflight packets keyed by packet identifier.
///
/// Order is insertion order, which equals original send order, so that a
/// replay after reconnect puts packets on the wire in the sequence the
/// server first saw them.
#[derive(Debug, Default)]
pub struct InflightStore {
    entries: Vec<(PacketId, StoredPacket)>,
}

impl InflightStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a packet at the end of the store.
    pub fn append(&mut self, packet: StoredPacket) {
        self.entries.push((packet.packet_id(), packet));
    }

    /// Remove the entry with `packet_id`, returning it if present.
    pub fn remove(&mut self, packet_id: PacketId) -> Option<StoredPacket> {
        let index = self.entries.iter().position(|(id, _)| *id == packet_id)?;
        Some(self.entries.remove(index).1)
    }

    /// Check whether an entry with `packet_id` is stored.
    #[must_use]
    pub fn contains(&self, packet_id: PacketId) -> bool {
        self.entries.iter().any(|(id, _)| *id == packet_id)
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clone all entries in original send order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<StoredPacket> {
        self.entries.iter().map(|(_, packet)| packet.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::QoS;

    fn publish(id: u16) -> StoredPacket {
        let mut packet = PublishPacket::new("a/b", QoS::AtLeastOnce, b"x").unwrap();
        packet.set_packet_id(PacketId::new(id));
        StoredPacket::Publish(packet)
    }

    #[test]
    fn test_order_preserved() {
        let mut store = InflightStore::new();
        store.append(publish(3));
        store.append(publish(1));
        store.append(publish(2));

        let ids: Vec<u16> = store
            .snapshot()
            .iter()
            .map(|p| p.packet_id().value())
            .collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn test_remove_by_id() {
        let mut store = InflightStore::new();
        store.append(publish(1));
        store.append(publish(2));
        assert!(store.remove(PacketId::new(1)).is_some());
        assert!(store.remove(PacketId::new(1)).is_none());
        assert_eq!(store.len(), 1);
        assert!(store.contains(PacketId::new(2)));
    }

    #[test]
    fn test_publish_then_release_swap() {
        let mut store = InflightStore::new();
        store.append(publish(7));
        let removed = store.remove(PacketId::new(7)).unwrap();
        assert!(matches!(removed, StoredPacket::Publish(_)));

        store.append(StoredPacket::Release(PublishReleasePacket::new(
            PacketId::new(7),
        )));
        assert_eq!(store.len(), 1);
        assert!(matches!(
            store.remove(PacketId::new(7)),
            Some(StoredPacket::Release(_))
        ));
    }
}
