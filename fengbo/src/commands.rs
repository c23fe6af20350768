// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Commands from client handles to the connection task.

use tokio::sync::oneshot;

use codec::{
    AuthPacket, ConnectAckPacket, DisconnectPacket, Properties, PublishPacket, ReasonCode,
    SubscribeAckPacket, SubscribePacket, UnsubscribeAckPacket, UnsubscribePacket,
};

use crate::error::Error;

/// One-shot slot resolving a caller operation.
pub type ReplySender<T> = oneshot::Sender<Result<T, Error>>;

/// Caller-supplied workflow driving an extended AUTH exchange.
///
/// Invoked with the reason code and properties of each server AUTH packet;
/// returns the AUTH packet to send back.
pub type AuthCallback =
    Box<dyn FnMut(ReasonCode, &Properties) -> Result<AuthPacket, Error> + Send>;

/// Acknowledgement details of a QoS 1/2 publish.
///
/// On a 3.1.1 connection both fields hold their defaults; acks carry no
/// payload there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub reason_code: ReasonCode,
    pub properties: Properties,
}

/// Operations marshalled from caller threads onto the connection task.
///
/// Every command carries its completion slot; the connection task resolves
/// it once the protocol contract for the operation is met.
pub enum ClientToSessionCmd {
    /// Publish an application message. Resolves immediately after the write
    /// for QoS 0, on PUBACK for QoS 1, on PUBCOMP for QoS 2.
    Publish {
        packet: PublishPacket,
        reply: ReplySender<Option<PublishReceipt>>,
    },

    /// Register subscriptions; resolves with the SUBACK.
    Subscribe {
        packet: SubscribePacket,
        reply: ReplySender<SubscribeAckPacket>,
    },

    /// Remove subscriptions; resolves with the UNSUBACK.
    Unsubscribe {
        packet: UnsubscribePacket,
        reply: ReplySender<UnsubscribeAckPacket>,
    },

    /// Liveness probe; resolves on PINGRESP.
    Ping { reply: ReplySender<()> },

    /// Graceful shutdown; resolves once DISCONNECT is on the wire.
    Disconnect {
        packet: DisconnectPacket,
        reply: ReplySender<()>,
    },

    /// Start a re-authentication exchange, 5.0 only. Resolves with the
    /// final server AUTH packet.
    Authenticate {
        packet: AuthPacket,
        callback: AuthCallback,
        reply: ReplySender<AuthPacket>,
    },
}

/// Completion slot of a pending correlator task.
///
/// `Internal` marks protocol bookkeeping with no caller attached, e.g. an
/// inflight packet replayed on reconnect; its completion only updates the
/// session state.
pub enum TaskReply {
    Connect(ReplySender<ConnectAckPacket>),
    Publish(ReplySender<Option<PublishReceipt>>),
    Subscribe(ReplySender<SubscribeAckPacket>),
    Unsubscribe(ReplySender<UnsubscribeAckPacket>),
    Ping(ReplySender<()>),
    Auth(ReplySender<AuthPacket>),
    Internal,
}

impl TaskReply {
    /// Resolve the caller with `err`. Receivers of already abandoned
    /// operations are gone; those sends are ignored.
    pub fn fail(self, err: Error) {
        match self {
            Self::Connect(reply) => {
                let _ = reply.send(Err(err));
            }
            Self::Publish(reply) => {
                let _ = reply.send(Err(err));
            }
            Self::Subscribe(reply) => {
                let _ = reply.send(Err(err));
            }
            Self::Unsubscribe(reply) => {
                let _ = reply.send(Err(err));
            }
            Self::Ping(reply) => {
                let _ = reply.send(Err(err));
            }
            Self::Auth(reply) => {
                let _ = reply.send(Err(err));
            }
            Self::Internal => {}
        }
    }
}
