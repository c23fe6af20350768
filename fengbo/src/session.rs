// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! The per-connection event loop.
//!
//! One tokio task owns the transport, the frame decoder, the pending-task
//! registry and the keep-alive clock. Callers never touch the connection
//! directly; their operations arrive over an unbounded command channel and
//! resolve through oneshot slots, so all protocol state mutates on a single
//! task.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;

use codec::{
    ConnectAckPacket, ConnectPacket, ConnectReturnCode, FrameDecoder, Packet, PacketId,
    PingRequestPacket, ProtocolVersion, PublishAckPacket, PublishCompletePacket, PublishPacket,
    PublishReceivedPacket, PublishReleasePacket, QoS, ReasonCode,
};

use crate::commands::{AuthCallback, ClientToSessionCmd, PublishReceipt, ReplySender, TaskReply};
use crate::connect_options::ConnectOptions;
use crate::error::{Error, ErrorKind};
use crate::inflight::{InflightStore, StoredPacket};
use crate::listeners::Listeners;
use crate::pending::{PendingTask, PendingTasks, WaitKind};
use crate::status::ConnectionStatus;
use crate::stream::Stream;

/// Session state that outlives a single network connection.
///
/// Kept behind a shared mutex so a reconnecting client hands the same
/// inflight packets and identifier counter to its next connection task.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    /// Outbound QoS 1/2 packets awaiting acknowledgement.
    pub inflight: InflightStore,

    /// Inbound QoS 2 publishes held back until their PUBREL, keyed by
    /// packet identifier.
    pub pending_in: HashMap<u16, PublishPacket>,

    last_packet_id: u16,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the next free packet identifier.
    ///
    /// The counter wraps from 65535 to 1 and never returns 0. Identifiers
    /// still bound to an inflight or pending-inbound exchange are skipped.
    pub fn next_packet_id(&mut self) -> PacketId {
        loop {
            self.last_packet_id = if self.last_packet_id == u16::MAX {
                1
            } else {
                self.last_packet_id + 1
            };
            let packet_id = PacketId::new(self.last_packet_id);
            if !self.inflight.contains(packet_id)
                && !self.pending_in.contains_key(&self.last_packet_id)
            {
                return packet_id;
            }
        }
    }
}

/// Connection parameters granted by the server in CONNACK.
///
/// Starts at protocol defaults; a 5.0 CONNACK may restrict them.
#[derive(Debug, Clone)]
pub struct NegotiatedOptions {
    pub session_present: bool,
    pub maximum_qos: QoS,
    pub retain_available: bool,
    pub maximum_packet_size: Option<u32>,
    pub topic_alias_maximum: u16,
    pub assigned_client_id: Option<String>,
    pub server_keep_alive: Option<u16>,
}

impl Default for NegotiatedOptions {
    fn default() -> Self {
        Self {
            session_present: false,
            maximum_qos: QoS::ExactOnce,
            retain_available: true,
            maximum_packet_size: None,
            topic_alias_maximum: 0,
            assigned_client_id: None,
            server_keep_alive: None,
        }
    }
}

/// The connection task: sends CONNECT, then serves commands, inbound
/// packets and timers until the connection ends.
pub(crate) struct Session {
    version: ProtocolVersion,
    options: ConnectOptions,
    stream: Stream,
    decoder: FrameDecoder,
    cmd_rx: UnboundedReceiver<ClientToSessionCmd>,
    pending: PendingTasks,
    state: Arc<Mutex<SessionState>>,
    negotiated: Arc<Mutex<NegotiatedOptions>>,
    listeners: Listeners,
    status: ConnectionStatus,
    last_write: Instant,
    ping_interval: Option<Duration>,
    auth_callback: Option<AuthCallback>,
    connect_reply: Option<ReplySender<ConnectAckPacket>>,
    read_buf: Vec<u8>,
    encode_buf: Vec<u8>,
}

impl Session {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        options: ConnectOptions,
        stream: Stream,
        cmd_rx: UnboundedReceiver<ClientToSessionCmd>,
        state: Arc<Mutex<SessionState>>,
        negotiated: Arc<Mutex<NegotiatedOptions>>,
        listeners: Listeners,
        auth_callback: Option<AuthCallback>,
        connect_reply: ReplySender<ConnectAckPacket>,
    ) -> Self {
        let version = options.version();
        let ping_interval = options.derived_ping_interval(options.keep_alive());
        Self {
            version,
            options,
            stream,
            decoder: FrameDecoder::new(),
            cmd_rx,
            pending: PendingTasks::new(),
            state,
            negotiated,
            listeners,
            status: ConnectionStatus::Connecting,
            last_write: Instant::now(),
            ping_interval,
            auth_callback,
            connect_reply: Some(connect_reply),
            read_buf: Vec::with_capacity(4096),
            encode_buf: Vec::with_capacity(1024),
        }
    }

    pub async fn run(mut self) {
        let result = self.connect_and_serve().await;
        self.status = ConnectionStatus::Closed;
        // Whatever ended the loop also ends every outstanding operation.
        let err = match &result {
            Ok(()) => Error::server_closed_connection(),
            Err(err) => err.clone(),
        };
        self.pending.fail_all(&err);
        if let Err(err) = &result {
            log::warn!("session: connection closed: {err}");
        }
        self.listeners.notify_close(result);
    }

    async fn connect_and_serve(&mut self) -> Result<(), Error> {
        self.send_connect().await?;
        self.event_loop().await
    }

    /// CONNECT MUST be the first packet sent over the connection
    /// [MQTT-3.1.0-1].
    async fn send_connect(&mut self) -> Result<(), Error> {
        let packet = self.build_connect_packet()?;
        let reply = self
            .connect_reply
            .take()
            .ok_or_else(|| Error::new(ErrorKind::ChannelError, "Connect reply slot missing"))?;
        let deadline = Instant::now() + self.options.connect_timeout();
        self.pending
            .register(WaitKind::ConnectAck, TaskReply::Connect(reply), Some(deadline));
        self.send_packet(Packet::Connect(packet)).await
    }

    fn build_connect_packet(&self) -> Result<ConnectPacket, Error> {
        let mut packet = ConnectPacket::new(self.options.client_id())?;
        packet.set_clean_session(self.options.clean_session());
        #[allow(clippy::cast_possible_truncation)]
        let keep_alive = self.options.keep_alive().as_secs().min(u64::from(u16::MAX)) as u16;
        packet.set_keep_alive(keep_alive);
        if let Some(username) = self.options.username() {
            packet.set_username(Some(username))?;
        }
        if let Some(password) = self.options.password() {
            packet.set_password(Some(password))?;
        }
        if self.version == ProtocolVersion::V5 {
            *packet.mut_properties() = self.options.properties().clone();
        }
        if let Some(will) = self.options.will() {
            packet.set_will(&will.topic, &will.message)?;
            packet.set_will_qos(will.qos);
            packet.set_will_retain(will.retain);
            if self.version == ProtocolVersion::V5 {
                *packet.mut_will_properties() = will.properties.clone();
            }
        }
        Ok(packet)
    }

    async fn event_loop(&mut self) -> Result<(), Error> {
        loop {
            let timer_deadline = self.next_deadline();
            tokio::select! {
                Some(cmd) = self.cmd_rx.recv(), if self.status == ConnectionStatus::Active => {
                    if self.handle_command(cmd).await? {
                        return Ok(());
                    }
                }
                read_ret = self.stream.read_buf(&mut self.read_buf) => {
                    let n_recv = read_ret?;
                    if n_recv == 0 {
                        return Err(Error::server_closed_connection());
                    }
                    self.drain_inbound().await?;
                }
                () = sleep_until_deadline(timer_deadline), if timer_deadline.is_some() => {
                    self.on_timer().await?;
                }
            }
        }
    }

    async fn drain_inbound(&mut self) -> Result<(), Error> {
        self.decoder.feed(&self.read_buf);
        self.read_buf.clear();
        loop {
            match self.decoder.next_packet(self.version) {
                Ok(Some(packet)) => self.handle_packet(packet).await?,
                Ok(None) => return Ok(()),
                // Framing is lost; every pending operation dies with the
                // connection.
                Err(err) => return Err(Error::from(err)),
            }
        }
    }

    async fn send_packet(&mut self, packet: Packet) -> Result<(), Error> {
        log::debug!("session: send {:?}", packet.packet_type());
        self.encode_buf.clear();
        packet.encode(self.version, &mut self.encode_buf)?;
        self.stream.write_all(&self.encode_buf).await?;
        self.last_write = Instant::now();
        Ok(())
    }

    fn ack_deadline(&self) -> Option<Instant> {
        self.options.ack_timeout().map(|t| Instant::now() + t)
    }

    fn ping_deadline(&self) -> Option<Instant> {
        if self.status != ConnectionStatus::Active {
            return None;
        }
        let interval = self.ping_interval?;
        Some(self.last_write + interval)
    }

    fn next_deadline(&self) -> Option<Instant> {
        match (self.ping_deadline(), self.pending.next_deadline()) {
            (Some(ping), Some(task)) => Some(ping.min(task)),
            (ping, task) => ping.or(task),
        }
    }

    async fn on_timer(&mut self) -> Result<(), Error> {
        let now = Instant::now();
        if self.status == ConnectionStatus::Active {
            if let Some(interval) = self.ping_interval {
                if now >= self.last_write + interval
                    && !self.pending.contains(WaitKind::PingResponse)
                {
                    self.send_ping(TaskReply::Internal).await?;
                }
            }
        }

        for task in self.pending.take_expired(now) {
            let kind = task.kind;
            task.reply
                .fail(Error::new(ErrorKind::Timeout, "Operation timed out"));
            match kind {
                // A missed liveness probe or connect handshake takes the
                // connection down with it.
                WaitKind::PingResponse => {
                    return Err(Error::new(ErrorKind::Timeout, "PINGRESP timed out"));
                }
                WaitKind::ConnectAck => {
                    return Err(Error::new(ErrorKind::Timeout, "CONNACK timed out"));
                }
                // The inflight entry stays; it is settled when the late ack
                // arrives or cleared with the connection.
                _ => {}
            }
        }
        Ok(())
    }

    async fn send_ping(&mut self, reply: TaskReply) -> Result<(), Error> {
        let interval = self.ping_interval.unwrap_or(Duration::from_secs(30));
        let deadline = Instant::now() + self.options.ack_timeout().unwrap_or(interval);
        self.pending
            .register(WaitKind::PingResponse, reply, Some(deadline));
        self.send_packet(Packet::PingRequest(PingRequestPacket::new()))
            .await
    }

    /// Serve one caller command. Returns true when the connection should
    /// shut down gracefully.
    async fn handle_command(&mut self, cmd: ClientToSessionCmd) -> Result<bool, Error> {
        match cmd {
            ClientToSessionCmd::Publish { packet, reply } => {
                self.on_publish_cmd(packet, reply).await?;
            }
            ClientToSessionCmd::Subscribe { mut packet, reply } => {
                let packet_id = self.state.lock().unwrap().next_packet_id();
                packet.set_packet_id(packet_id);
                self.pending.register(
                    WaitKind::SubscribeAck(packet_id),
                    TaskReply::Subscribe(reply),
                    self.ack_deadline(),
                );
                self.send_packet(Packet::Subscribe(packet)).await?;
            }
            ClientToSessionCmd::Unsubscribe { mut packet, reply } => {
                let packet_id = self.state.lock().unwrap().next_packet_id();
                packet.set_packet_id(packet_id);
                self.pending.register(
                    WaitKind::UnsubscribeAck(packet_id),
                    TaskReply::Unsubscribe(reply),
                    self.ack_deadline(),
                );
                self.send_packet(Packet::Unsubscribe(packet)).await?;
            }
            ClientToSessionCmd::Ping { reply } => {
                self.send_ping(TaskReply::Ping(reply)).await?;
            }
            ClientToSessionCmd::Disconnect { packet, reply } => {
                self.status = ConnectionStatus::Disconnecting;
                self.send_packet(Packet::Disconnect(packet)).await?;
                let _ = reply.send(Ok(()));
                return Ok(true);
            }
            ClientToSessionCmd::Authenticate {
                packet,
                callback,
                reply,
            } => {
                self.auth_callback = Some(callback);
                self.pending.register(
                    WaitKind::AuthResponse,
                    TaskReply::Auth(reply),
                    self.ack_deadline(),
                );
                self.send_packet(Packet::Auth(packet)).await?;
            }
        }
        Ok(false)
    }

    async fn on_publish_cmd(
        &mut self,
        mut packet: PublishPacket,
        reply: ReplySender<Option<PublishReceipt>>,
    ) -> Result<(), Error> {
        match packet.qos() {
            QoS::AtMostOnce => {
                self.send_packet(Packet::Publish(packet)).await?;
                let _ = reply.send(Ok(None));
            }
            QoS::AtLeastOnce => {
                let packet_id = self.state.lock().unwrap().next_packet_id();
                packet.set_packet_id(packet_id);
                self.state
                    .lock()
                    .unwrap()
                    .inflight
                    .append(StoredPacket::Publish(packet.clone()));
                self.pending.register(
                    WaitKind::PublishAck(packet_id),
                    TaskReply::Publish(reply),
                    self.ack_deadline(),
                );
                self.send_packet(Packet::Publish(packet)).await?;
            }
            QoS::ExactOnce => {
                let packet_id = self.state.lock().unwrap().next_packet_id();
                packet.set_packet_id(packet_id);
                self.state
                    .lock()
                    .unwrap()
                    .inflight
                    .append(StoredPacket::Publish(packet.clone()));
                self.pending.register(
                    WaitKind::PublishReceived(packet_id),
                    TaskReply::Publish(reply),
                    self.ack_deadline(),
                );
                self.send_packet(Packet::Publish(packet)).await?;
            }
        }
        Ok(())
    }

    async fn handle_packet(&mut self, packet: Packet) -> Result<(), Error> {
        log::debug!("session: recv {:?}", packet.packet_type());
        match packet {
            Packet::Publish(publish) => self.on_publish_in(publish).await,
            Packet::PublishRelease(release) => self.on_publish_release_in(release).await,
            Packet::Disconnect(disconnect) => {
                Err(Error::server_disconnection(disconnect.reason_code()))
            }
            Packet::Connect(..)
            | Packet::Subscribe(..)
            | Packet::Unsubscribe(..)
            | Packet::PingRequest(..) => Err(Error::new(
                ErrorKind::UnexpectedMessage,
                "Got a client-to-server packet from the server",
            )),
            other => self.on_ack_in(other).await,
        }
    }

    #[allow(clippy::too_many_lines)]
    async fn on_ack_in(&mut self, packet: Packet) -> Result<(), Error> {
        let Some(task) = self.pending.take_matching(&packet) else {
            return self.on_unmatched(packet).await;
        };
        match (task.kind, packet) {
            (WaitKind::ConnectAck, Packet::ConnectAck(ack)) => {
                self.on_connect_ack(ack, task.reply).await
            }
            (WaitKind::ConnectAck, Packet::Auth(auth)) => self.on_connect_auth(auth, task).await,
            (WaitKind::PublishAck(packet_id), Packet::PublishAck(ack)) => {
                self.state.lock().unwrap().inflight.remove(packet_id);
                let result = if self.version == ProtocolVersion::V5 && ack.reason_code().is_error()
                {
                    Err(Error::reason_error(ack.reason_code()))
                } else {
                    Ok(Some(PublishReceipt {
                        reason_code: ack.reason_code(),
                        properties: ack.properties().clone(),
                    }))
                };
                complete_publish(task.reply, result);
                Ok(())
            }
            (WaitKind::PublishReceived(packet_id), Packet::PublishReceived(rec)) => {
                self.on_publish_received(packet_id, &rec, task.reply).await
            }
            (WaitKind::PublishComplete(packet_id), Packet::PublishComplete(comp)) => {
                self.state.lock().unwrap().inflight.remove(packet_id);
                let result = if self.version == ProtocolVersion::V5 && comp.reason_code().is_error()
                {
                    Err(Error::reason_error(comp.reason_code()))
                } else {
                    Ok(Some(PublishReceipt {
                        reason_code: comp.reason_code(),
                        properties: comp.properties().clone(),
                    }))
                };
                complete_publish(task.reply, result);
                Ok(())
            }
            (WaitKind::SubscribeAck(..), Packet::SubscribeAck(ack)) => {
                if let TaskReply::Subscribe(reply) = task.reply {
                    let _ = reply.send(Ok(ack));
                }
                Ok(())
            }
            (WaitKind::UnsubscribeAck(..), Packet::UnsubscribeAck(ack)) => {
                if let TaskReply::Unsubscribe(reply) = task.reply {
                    let _ = reply.send(Ok(ack));
                }
                Ok(())
            }
            (WaitKind::PingResponse, Packet::PingResponse(..)) => {
                if let TaskReply::Ping(reply) = task.reply {
                    let _ = reply.send(Ok(()));
                }
                Ok(())
            }
            (WaitKind::AuthResponse, Packet::Auth(auth)) => self.on_reauth(auth, task).await,
            (kind, packet) => {
                log::error!("session: task {kind:?} matched unrelated packet {packet:?}");
                Err(Error::new(ErrorKind::BadResponse, "Correlation mismatch"))
            }
        }
    }

    async fn on_connect_ack(
        &mut self,
        ack: ConnectAckPacket,
        reply: TaskReply,
    ) -> Result<(), Error> {
        let TaskReply::Connect(reply) = reply else {
            return Err(Error::new(ErrorKind::BadResponse, "Correlation mismatch"));
        };

        let failure = match self.version {
            ProtocolVersion::V311 => (ack.return_code() != ConnectReturnCode::Accepted)
                .then(|| Error::connection_error(ack.return_code())),
            ProtocolVersion::V5 => ack
                .reason_code()
                .is_error()
                .then(|| Error::reason_error(ack.reason_code())),
        };
        if let Some(err) = failure {
            let _ = reply.send(Err(err.clone()));
            return Err(err);
        }

        {
            let mut negotiated = self.negotiated.lock().unwrap();
            negotiated.session_present = ack.session_present();
            if self.version == ProtocolVersion::V5 {
                let props = ack.properties();
                if let Some(qos) = props.maximum_qos() {
                    negotiated.maximum_qos = qos;
                }
                if let Some(size) = props.maximum_packet_size() {
                    negotiated.maximum_packet_size = Some(size);
                }
                if let Some(available) = props.retain_available() {
                    negotiated.retain_available = available;
                }
                if let Some(maximum) = props.topic_alias_maximum() {
                    negotiated.topic_alias_maximum = maximum;
                }
                if let Some(client_id) = props.assigned_client_identifier() {
                    negotiated.assigned_client_id = Some(client_id.to_string());
                }
                if let Some(keep_alive) = props.server_keep_alive() {
                    negotiated.server_keep_alive = Some(keep_alive);
                }
            }
        }
        // The server-imposed keep alive replaces the configured one
        // [MQTT-3.2.2-21].
        if let Some(keep_alive) = self.negotiated.lock().unwrap().server_keep_alive {
            self.ping_interval = self
                .options
                .derived_ping_interval(Duration::from_secs(u64::from(keep_alive)));
        }

        self.status = ConnectionStatus::Active;
        if ack.session_present() {
            self.replay_inflight().await?;
        } else {
            let mut state = self.state.lock().unwrap();
            state.inflight.clear();
            state.pending_in.clear();
        }
        let _ = reply.send(Ok(ack));
        Ok(())
    }

    /// Re-issue every stored QoS 1/2 packet of a resumed session, in
    /// original send order, publishes marked as duplicates.
    async fn replay_inflight(&mut self) -> Result<(), Error> {
        let snapshot = self.state.lock().unwrap().inflight.snapshot();
        for stored in snapshot {
            let packet_id = stored.packet_id();
            match stored {
                StoredPacket::Publish(mut publish) => {
                    publish.set_dup(true)?;
                    let kind = if publish.qos() == QoS::AtLeastOnce {
                        WaitKind::PublishAck(packet_id)
                    } else {
                        WaitKind::PublishReceived(packet_id)
                    };
                    self.pending.register(kind, TaskReply::Internal, None);
                    self.send_packet(Packet::Publish(publish)).await?;
                }
                StoredPacket::Release(release) => {
                    self.pending
                        .register(WaitKind::PublishComplete(packet_id), TaskReply::Internal, None);
                    self.send_packet(Packet::PublishRelease(release)).await?;
                }
            }
        }
        Ok(())
    }

    /// Server AUTH step during the connect handshake.
    async fn on_connect_auth(&mut self, auth: codec::AuthPacket, task: PendingTask) -> Result<(), Error> {
        self.status = ConnectionStatus::Authenticating;
        let Some(callback) = self.auth_callback.as_mut() else {
            let err = Error::new(
                ErrorKind::AuthWorkflowRequired,
                "Server requested extended auth but no callback is set",
            );
            task.reply.fail(err.clone());
            return Err(err);
        };
        match callback(auth.reason_code(), auth.properties()) {
            Ok(response) => {
                // Still waiting for CONNACK or the next AUTH step.
                self.pending.register(task.kind, task.reply, task.deadline);
                self.send_packet(Packet::Auth(response)).await
            }
            Err(err) => {
                task.reply.fail(err.clone());
                Err(err)
            }
        }
    }

    /// Server AUTH step of a re-authentication started with
    /// `authenticate()`.
    async fn on_reauth(&mut self, auth: codec::AuthPacket, task: PendingTask) -> Result<(), Error> {
        if auth.reason_code() == ReasonCode::ContinueAuthentication {
            let Some(callback) = self.auth_callback.as_mut() else {
                task.reply.fail(Error::new(
                    ErrorKind::AuthWorkflowRequired,
                    "Server continued auth but no callback is set",
                ));
                return Ok(());
            };
            match callback(auth.reason_code(), auth.properties()) {
                Ok(response) => {
                    self.pending.register(task.kind, task.reply, task.deadline);
                    self.send_packet(Packet::Auth(response)).await
                }
                Err(err) => {
                    task.reply.fail(err);
                    Ok(())
                }
            }
        } else {
            if let TaskReply::Auth(reply) = task.reply {
                let _ = reply.send(Ok(auth));
            }
            Ok(())
        }
    }

    /// QoS 2 ladder step two: PUBREC consumes the stored publish and puts a
    /// PUBREL inflight in its place.
    async fn on_publish_received(
        &mut self,
        packet_id: PacketId,
        rec: &PublishReceivedPacket,
        reply: TaskReply,
    ) -> Result<(), Error> {
        self.state.lock().unwrap().inflight.remove(packet_id);
        if self.version == ProtocolVersion::V5 && rec.reason_code().is_error() {
            reply.fail(Error::reason_error(rec.reason_code()));
            return Ok(());
        }

        let release = PublishReleasePacket::new(packet_id);
        self.state
            .lock()
            .unwrap()
            .inflight
            .append(StoredPacket::Release(release.clone()));
        self.pending
            .register(WaitKind::PublishComplete(packet_id), reply, self.ack_deadline());
        self.send_packet(Packet::PublishRelease(release)).await
    }

    async fn on_publish_in(&mut self, publish: PublishPacket) -> Result<(), Error> {
        match publish.qos() {
            QoS::AtMostOnce => {
                self.listeners.notify_publish(Ok(publish));
                Ok(())
            }
            QoS::AtLeastOnce => {
                let ack = PublishAckPacket::new(publish.packet_id());
                self.send_packet(Packet::PublishAck(ack)).await?;
                self.listeners.notify_publish(Ok(publish));
                Ok(())
            }
            QoS::ExactOnce => {
                let packet_id = publish.packet_id();
                {
                    let mut state = self.state.lock().unwrap();
                    if state.pending_in.insert(packet_id.value(), publish).is_some() {
                        log::info!(
                            "session: duplicate qos2 publish {packet_id}, payload replaced"
                        );
                    }
                }
                // First arrival and duplicates both answer with PUBREC; the
                // message is delivered once, on PUBREL.
                let rec = PublishReceivedPacket::new(packet_id);
                self.send_packet(Packet::PublishReceived(rec)).await
            }
        }
    }

    async fn on_publish_release_in(
        &mut self,
        release: PublishReleasePacket,
    ) -> Result<(), Error> {
        let packet_id = release.packet_id();
        let stored = self
            .state
            .lock()
            .unwrap()
            .pending_in
            .remove(&packet_id.value());

        let mut comp = PublishCompletePacket::new(packet_id);
        if stored.is_none() && self.version == ProtocolVersion::V5 {
            comp.set_reason_code(ReasonCode::PacketIdentifierNotFound);
        }
        self.send_packet(Packet::PublishComplete(comp)).await?;

        if let Some(publish) = stored {
            self.listeners.notify_publish(Ok(publish));
        }
        Ok(())
    }

    /// Inbound packet that no pending task claimed.
    async fn on_unmatched(&mut self, packet: Packet) -> Result<(), Error> {
        match packet {
            // A CONNACK or AUTH outside the handshake breaks the protocol.
            Packet::ConnectAck(..) | Packet::Auth(..) => Err(Error::new(
                ErrorKind::UnexpectedMessage,
                "CONNACK/AUTH outside connect handshake",
            )),
            Packet::PublishReceived(rec) => {
                log::warn!("session: stray PUBREC {}", rec.packet_id());
                self.state.lock().unwrap().inflight.remove(rec.packet_id());
                let mut release = PublishReleasePacket::new(rec.packet_id());
                if self.version == ProtocolVersion::V5 {
                    release.set_reason_code(ReasonCode::PacketIdentifierNotFound);
                }
                self.send_packet(Packet::PublishRelease(release)).await
            }
            Packet::PublishAck(ack) => {
                // A late ack after its caller timed out still settles the
                // inflight entry.
                log::warn!("session: stray PUBACK {}", ack.packet_id());
                self.state.lock().unwrap().inflight.remove(ack.packet_id());
                Ok(())
            }
            Packet::PublishComplete(comp) => {
                log::warn!("session: stray PUBCOMP {}", comp.packet_id());
                self.state.lock().unwrap().inflight.remove(comp.packet_id());
                Ok(())
            }
            other => {
                log::warn!("session: unmatched packet {:?}", other.packet_type());
                Ok(())
            }
        }
    }
}

fn complete_publish(reply: TaskReply, result: Result<Option<PublishReceipt>, Error>) {
    match reply {
        TaskReply::Publish(reply) => {
            let _ = reply.send(result);
        }
        TaskReply::Internal => {}
        other => other.fail(Error::new(ErrorKind::BadResponse, "Correlation mismatch")),
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_id_wraps_and_skips_zero() {
        let mut state = SessionState::new();
        state.last_packet_id = u16::MAX - 1;
        assert_eq!(state.next_packet_id().value(), u16::MAX);
        assert_eq!(state.next_packet_id().value(), 1);
        assert_eq!(state.next_packet_id().value(), 2);
    }

    #[test]
    fn test_packet_id_skips_inflight() {
        let mut state = SessionState::new();
        let mut publish = PublishPacket::new("a", QoS::AtLeastOnce, b"x").unwrap();
        publish.set_packet_id(PacketId::new(2));
        state.inflight.append(StoredPacket::Publish(publish));

        assert_eq!(state.next_packet_id().value(), 1);
        // 2 is taken by the inflight entry.
        assert_eq!(state.next_packet_id().value(), 3);
    }

    #[test]
    fn test_negotiated_defaults() {
        let negotiated = NegotiatedOptions::default();
        assert_eq!(negotiated.maximum_qos, QoS::ExactOnce);
        assert!(negotiated.retain_available);
        assert_eq!(negotiated.topic_alias_maximum, 0);
        assert!(negotiated.maximum_packet_size.is_none());
    }
}
