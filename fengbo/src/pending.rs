// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Correlation of inbound packets with outstanding operations.

use tokio::time::Instant;

use codec::{Packet, PacketId};

use crate::commands::TaskReply;
use crate::error::Error;

/// The acknowledgement shape a pending operation waits for.
///
/// Matching is a table lookup over this enum rather than a predicate
/// closure; every multiplexed operation on the connection is in exactly one
/// of these states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitKind {
    /// CONNECT sent; matches CONNACK and server AUTH steps.
    ConnectAck,

    /// QoS 1 publish sent; matches PUBACK with the same id.
    PublishAck(PacketId),

    /// QoS 2 publish sent; matches PUBREC with the same id.
    PublishReceived(PacketId),

    /// PUBREL sent; matches PUBCOMP with the same id.
    PublishComplete(PacketId),

    /// SUBSCRIBE sent; matches SUBACK with the same id.
    SubscribeAck(PacketId),

    /// UNSUBSCRIBE sent; matches UNSUBACK with the same id.
    UnsubscribeAck(PacketId),

    /// PINGREQ sent; matches PINGRESP.
    PingResponse,

    /// Re-authentication AUTH sent; matches server AUTH packets.
    AuthResponse,
}

impl WaitKind {
    /// Check whether `packet` is the acknowledgement this state waits for.
    #[must_use]
    pub fn matches(&self, packet: &Packet) -> bool {
        match (self, packet) {
            (Self::ConnectAck, Packet::ConnectAck(..) | Packet::Auth(..)) => true,
            (Self::PublishAck(id), Packet::PublishAck(p)) => p.packet_id() == *id,
            (Self::PublishReceived(id), Packet::PublishReceived(p)) => p.packet_id() == *id,
            (Self::PublishComplete(id), Packet::PublishComplete(p)) => p.packet_id() == *id,
            (Self::SubscribeAck(id), Packet::SubscribeAck(p)) => p.packet_id() == *id,
            (Self::UnsubscribeAck(id), Packet::UnsubscribeAck(p)) => p.packet_id() == *id,
            (Self::PingResponse, Packet::PingResponse(..)) => true,
            (Self::AuthResponse, Packet::Auth(..)) => true,
            _ => false,
        }
    }
}

/// One outstanding operation: a wait state, a completion slot, and an
/// optional deadline.
pub struct PendingTask {
    pub kind: WaitKind,
    pub reply: TaskReply,
    pub deadline: Option<Instant>,
}

/// Pending operations of one connection, in registration order.
///
/// Inbound packets are offered to tasks front to back; the first match is
/// removed and completed. Order matters when several operations of the same
/// shape are outstanding, e.g. two QoS 1 publishes racing their PUBACKs.
#[derive(Default)]
pub struct PendingTasks {
    tasks: Vec<PendingTask>,
}

impl PendingTasks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task at the end of the registration order.
    pub fn register(&mut self, kind: WaitKind, reply: TaskReply, deadline: Option<Instant>) {
        self.tasks.push(PendingTask {
            kind,
            reply,
            deadline,
        });
    }

    /// Remove and return the first task matching `packet`.
    pub fn take_matching(&mut self, packet: &Packet) -> Option<PendingTask> {
        let index = self.tasks.iter().position(|task| task.kind.matches(packet))?;
        Some(self.tasks.remove(index))
    }

    /// Fail every task with a clone of `err` and clear the registry.
    pub fn fail_all(&mut self, err: &Error) {
        for task in self.tasks.drain(..) {
            task.reply.fail(err.clone());
        }
    }

    /// Remove and return every task whose deadline is at or before `now`.
    pub fn take_expired(&mut self, now: Instant) -> Vec<PendingTask> {
        let mut expired = Vec::new();
        let mut index = 0;
        while index < self.tasks.len() {
            let is_expired = self.tasks[index]
                .deadline
                .map_or(false, |deadline| deadline <= now);
            if is_expired {
                expired.push(self.tasks.remove(index));
            } else {
                index += 1;
            }
        }
        expired
    }

    /// Get the earliest deadline of any task.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.tasks.iter().filter_map(|task| task.deadline).min()
    }

    /// Check whether a task in `kind` state is outstanding.
    #[must_use]
    pub fn contains(&self, kind: WaitKind) -> bool {
        self.tasks.iter().any(|task| task.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::{PublishAckPacket, PingResponsePacket};

    #[test]
    fn test_first_match_wins() {
        let mut pending = PendingTasks::new();
        pending.register(WaitKind::PingResponse, TaskReply::Internal, None);
        pending.register(WaitKind::PingResponse, TaskReply::Internal, None);

        let packet = Packet::PingResponse(PingResponsePacket::new());
        assert!(pending.take_matching(&packet).is_some());
        assert!(pending.take_matching(&packet).is_some());
        assert!(pending.take_matching(&packet).is_none());
    }

    #[test]
    fn test_match_by_packet_id() {
        let mut pending = PendingTasks::new();
        pending.register(
            WaitKind::PublishAck(PacketId::new(1)),
            TaskReply::Internal,
            None,
        );

        let wrong = Packet::PublishAck(PublishAckPacket::new(PacketId::new(2)));
        assert!(pending.take_matching(&wrong).is_none());

        let right = Packet::PublishAck(PublishAckPacket::new(PacketId::new(1)));
        assert!(pending.take_matching(&right).is_some());
    }

    #[test]
    fn test_expiry() {
        let now = Instant::now();
        let mut pending = PendingTasks::new();
        pending.register(WaitKind::PingResponse, TaskReply::Internal, Some(now));
        pending.register(WaitKind::ConnectAck, TaskReply::Internal, None);

        let expired = pending.take_expired(now);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].kind, WaitKind::PingResponse);
        assert!(pending.contains(WaitKind::ConnectAck));
        assert_eq!(pending.next_deadline(), None);
    }
}
