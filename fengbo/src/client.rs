// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::oneshot;

use codec::{
    AuthPacket, ConnectAckPacket, DisconnectPacket, EncodeError, PacketId, Properties,
    PropertyType, ProtocolVersion, PublishPacket, QoS, ReasonCode, SubTopic, SubscribeAckPacket,
    SubscribePacket, SubscribeTopic, UnsubscribeAckPacket, UnsubscribePacket,
};

use crate::commands::{AuthCallback, ClientToSessionCmd, PublishReceipt};
use crate::connect_options::ConnectOptions;
use crate::error::{Error, ErrorKind};
use crate::listeners::Listeners;
use crate::session::{NegotiatedOptions, Session, SessionState};
use crate::stream::Stream;

/// Asynchronous MQTT client.
///
/// A client owns one session. The session survives the network connection:
/// connecting again with `clean_session` unset resumes unacknowledged
/// deliveries. Operations may be called from any task; they are marshalled
/// onto the connection task and suspend until the protocol contract of the
/// operation is met.
pub struct AsyncClient {
    options: ConnectOptions,
    state: Arc<Mutex<SessionState>>,
    negotiated: Arc<Mutex<NegotiatedOptions>>,
    listeners: Listeners,
    cmd_tx: Option<UnboundedSender<ClientToSessionCmd>>,
}

impl AsyncClient {
    #[must_use]
    pub fn new(options: ConnectOptions) -> Self {
        Self {
            options,
            state: Arc::new(Mutex::new(SessionState::new())),
            negotiated: Arc::new(Mutex::new(NegotiatedOptions::default())),
            listeners: Listeners::new(),
            cmd_tx: None,
        }
    }

    #[must_use]
    pub const fn options(&self) -> &ConnectOptions {
        &self.options
    }

    /// Get the connection parameters granted in the last CONNACK.
    #[must_use]
    pub fn negotiated(&self) -> NegotiatedOptions {
        self.negotiated.lock().unwrap().clone()
    }

    /// Check whether a connection task is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.cmd_tx.as_ref().map_or(false, |tx| !tx.is_closed())
    }

    /// Open the transport and perform the CONNECT handshake.
    ///
    /// # Errors
    ///
    /// Returns error if already connected, the transport cannot be opened,
    /// or the server refuses the session.
    pub async fn connect(&mut self) -> Result<ConnectAckPacket, Error> {
        self.connect_with_auth(None).await
    }

    /// Like [`connect`](Self::connect), with a callback driving a 5.0
    /// extended AUTH exchange should the server start one.
    ///
    /// # Errors
    ///
    /// Returns error if already connected, the transport cannot be opened,
    /// or the server refuses the session.
    pub async fn connect_with_auth(
        &mut self,
        auth_callback: Option<AuthCallback>,
    ) -> Result<ConnectAckPacket, Error> {
        if self.is_connected() {
            return Err(Error::new(ErrorKind::AlreadyConnected, "Already connected"));
        }
        let stream = tokio::time::timeout(
            self.options.connect_timeout(),
            Stream::connect(&self.options),
        )
        .await
        .map_err(|_| Error::new(ErrorKind::Timeout, "Transport connect timed out"))??;
        self.attach_stream(stream, auth_callback).await
    }

    /// Spawn the connection task on `stream` and wait for CONNACK.
    pub(crate) async fn attach_stream(
        &mut self,
        stream: Stream,
        auth_callback: Option<AuthCallback>,
    ) -> Result<ConnectAckPacket, Error> {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (connect_tx, connect_rx) = oneshot::channel();
        let session = Session::new(
            self.options.clone(),
            stream,
            cmd_rx,
            Arc::clone(&self.state),
            Arc::clone(&self.negotiated),
            self.listeners.clone(),
            auth_callback,
            connect_tx,
        );
        tokio::spawn(session.run());

        let ack = connect_rx
            .await
            .map_err(|_| Error::new(ErrorKind::ChannelError, "Connect reply dropped"))??;
        self.cmd_tx = Some(cmd_tx);
        Ok(ack)
    }

    /// Publish an application message.
    ///
    /// Suspends until the message is on the wire (QoS 0), acknowledged with
    /// PUBACK (QoS 1) or PUBCOMP (QoS 2). Returns `None` for QoS 0,
    /// otherwise the acknowledgement details.
    ///
    /// # Errors
    ///
    /// Returns error if validation fails, the connection is down, the
    /// server reports a failure reason, or the operation times out.
    pub async fn publish(
        &self,
        topic: &str,
        qos: QoS,
        payload: &[u8],
    ) -> Result<Option<PublishReceipt>, Error> {
        self.publish_with_options(topic, qos, false, payload, Properties::new())
            .await
    }

    /// Publish with retain flag and a 5.0 property block.
    ///
    /// # Errors
    ///
    /// Returns error if validation fails, the connection is down, the
    /// server reports a failure reason, or the operation times out.
    pub async fn publish_with_options(
        &self,
        topic: &str,
        qos: QoS,
        retain: bool,
        payload: &[u8],
        properties: Properties,
    ) -> Result<Option<PublishReceipt>, Error> {
        let mut packet = PublishPacket::new(topic, qos, payload).map_err(map_topic_err)?;
        packet.set_retain(retain);
        if self.options.version() == ProtocolVersion::V5 {
            *packet.mut_properties() = properties;
        }
        self.validate_publish(&packet)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_cmd(ClientToSessionCmd::Publish {
            packet,
            reply: reply_tx,
        })?;
        reply_rx.await.map_err(|_| Error::server_closed_connection())?
    }

    fn validate_publish(&self, packet: &PublishPacket) -> Result<(), Error> {
        let negotiated = self.negotiated.lock().unwrap();
        if packet.qos() > negotiated.maximum_qos {
            return Err(Error::new(
                ErrorKind::QosInvalid,
                "QoS exceeds the maximum the server granted",
            ));
        }
        if packet.retain() && !negotiated.retain_available {
            return Err(Error::new(
                ErrorKind::RetainUnavailable,
                "Server does not support retained messages",
            ));
        }
        if self.options.version() == ProtocolVersion::V5 {
            let props = packet.properties();
            if props.contains(PropertyType::SubscriptionIdentifier) {
                return Err(Error::new(
                    ErrorKind::PublishIncludesSubscription,
                    "PUBLISH must not carry a subscription identifier",
                ));
            }
            if let Some(alias) = props.topic_alias() {
                if alias == 0 || alias > negotiated.topic_alias_maximum {
                    return Err(Error::new(
                        ErrorKind::TopicAliasOutOfRange,
                        "Topic alias is zero or above the negotiated maximum",
                    ));
                }
            }
            if let Some(maximum) = negotiated.maximum_packet_size {
                let bytes = packet
                    .bytes(self.options.version())
                    .map_err(|_| Error::new(ErrorKind::BadParameter, "Packet too large"))?;
                if bytes > maximum as usize {
                    return Err(Error::new(
                        ErrorKind::BadParameter,
                        "Packet exceeds the maximum packet size",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Register subscriptions and wait for the SUBACK.
    ///
    /// # Errors
    ///
    /// Returns error if `topics` is empty, the connection is down, or the
    /// operation times out. Per-topic failure reasons are reported in the
    /// returned SUBACK, not as an error.
    pub async fn subscribe(
        &self,
        topics: Vec<SubscribeTopic>,
    ) -> Result<SubscribeAckPacket, Error> {
        self.subscribe_with_properties(topics, Properties::new()).await
    }

    /// Like [`subscribe`](Self::subscribe), with a 5.0 property block.
    ///
    /// # Errors
    ///
    /// Returns error if `topics` is empty, the connection is down, or the
    /// operation times out.
    pub async fn subscribe_with_properties(
        &self,
        topics: Vec<SubscribeTopic>,
        properties: Properties,
    ) -> Result<SubscribeAckPacket, Error> {
        if topics.is_empty() {
            return Err(Error::new(
                ErrorKind::AtLeastOneTopicRequired,
                "Subscribe requires at least one topic",
            ));
        }
        // The connection task assigns the packet identifier.
        let mut packet = SubscribePacket::with_topics(PacketId::new(0), topics);
        if self.options.version() == ProtocolVersion::V5 {
            *packet.mut_properties() = properties;
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_cmd(ClientToSessionCmd::Subscribe {
            packet,
            reply: reply_tx,
        })?;
        reply_rx.await.map_err(|_| Error::server_closed_connection())?
    }

    /// Remove subscriptions and wait for the UNSUBACK.
    ///
    /// # Errors
    ///
    /// Returns error if `topics` is empty or invalid, the connection is
    /// down, or the operation times out.
    pub async fn unsubscribe(&self, topics: &[&str]) -> Result<UnsubscribeAckPacket, Error> {
        self.unsubscribe_with_properties(topics, Properties::new())
            .await
    }

    /// Like [`unsubscribe`](Self::unsubscribe), with a 5.0 property block.
    ///
    /// # Errors
    ///
    /// Returns error if `topics` is empty or invalid, the connection is
    /// down, or the operation times out.
    pub async fn unsubscribe_with_properties(
        &self,
        topics: &[&str],
        properties: Properties,
    ) -> Result<UnsubscribeAckPacket, Error> {
        if topics.is_empty() {
            return Err(Error::new(
                ErrorKind::AtLeastOneTopicRequired,
                "Unsubscribe requires at least one topic",
            ));
        }
        let mut filters = Vec::with_capacity(topics.len());
        for topic in topics {
            filters.push(SubTopic::new(topic).map_err(|_| {
                Error::new(ErrorKind::InvalidTopicName, "Invalid topic filter")
            })?);
        }
        let mut packet = UnsubscribePacket::with_topics(PacketId::new(0), filters);
        if self.options.version() == ProtocolVersion::V5 {
            *packet.mut_properties() = properties;
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_cmd(ClientToSessionCmd::Unsubscribe {
            packet,
            reply: reply_tx,
        })?;
        reply_rx.await.map_err(|_| Error::server_closed_connection())?
    }

    /// Send a PINGREQ and wait for the PINGRESP.
    ///
    /// # Errors
    ///
    /// Returns error if the connection is down or the probe times out.
    pub async fn ping(&self) -> Result<(), Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_cmd(ClientToSessionCmd::Ping { reply: reply_tx })?;
        reply_rx.await.map_err(|_| Error::server_closed_connection())?
    }

    /// Send DISCONNECT and close the connection without waiting for a
    /// reply. Pending operations fail; the session state is kept unless
    /// the session was clean.
    ///
    /// # Errors
    ///
    /// Returns error if no connection is up.
    pub async fn disconnect(&mut self) -> Result<(), Error> {
        self.disconnect_with(DisconnectPacket::new()).await
    }

    /// Like [`disconnect`](Self::disconnect), with a caller supplied
    /// DISCONNECT packet carrying a 5.0 reason and properties.
    ///
    /// # Errors
    ///
    /// Returns error if no connection is up.
    pub async fn disconnect_with(&mut self, packet: DisconnectPacket) -> Result<(), Error> {
        let Some(cmd_tx) = self.cmd_tx.take() else {
            return Err(Error::new(ErrorKind::NoConnection, "Not connected"));
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        cmd_tx
            .send(ClientToSessionCmd::Disconnect {
                packet,
                reply: reply_tx,
            })
            .map_err(|_| Error::new(ErrorKind::NoConnection, "Connection task is gone"))?;
        reply_rx.await.map_err(|_| Error::server_closed_connection())?
    }

    /// Start a 5.0 re-authentication exchange and wait for its final
    /// server AUTH packet.
    ///
    /// # Errors
    ///
    /// Returns error on a 3.1.1 connection, if the connection is down, or
    /// if the exchange fails.
    pub async fn authenticate(
        &self,
        properties: Properties,
        callback: AuthCallback,
    ) -> Result<AuthPacket, Error> {
        if self.options.version() != ProtocolVersion::V5 {
            return Err(Error::new(
                ErrorKind::BadParameter,
                "AUTH requires protocol 5.0",
            ));
        }
        let mut packet = AuthPacket::new();
        packet.set_reason_code(ReasonCode::ReAuthenticate);
        *packet.mut_properties() = properties;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.send_cmd(ClientToSessionCmd::Authenticate {
            packet,
            callback,
            reply: reply_tx,
        })?;
        reply_rx.await.map_err(|_| Error::server_closed_connection())?
    }

    /// Register a publish listener under `name`, replacing any previous
    /// one with the same name.
    pub fn add_publish_listener<F>(&self, name: &str, listener: F)
    where
        F: Fn(Result<PublishPacket, Error>) + Send + Sync + 'static,
    {
        self.listeners.add_publish_listener(name, listener);
    }

    /// Remove the publish listener under `name`; returns false if absent.
    pub fn remove_publish_listener(&self, name: &str) -> bool {
        self.listeners.remove_publish_listener(name)
    }

    /// Register a close listener under `name`, replacing any previous one
    /// with the same name.
    pub fn add_close_listener<F>(&self, name: &str, listener: F)
    where
        F: Fn(Result<(), Error>) + Send + Sync + 'static,
    {
        self.listeners.add_close_listener(name, listener);
    }

    /// Remove the close listener under `name`; returns false if absent.
    pub fn remove_close_listener(&self, name: &str) -> bool {
        self.listeners.remove_close_listener(name)
    }

    fn send_cmd(&self, cmd: ClientToSessionCmd) -> Result<(), Error> {
        let Some(cmd_tx) = &self.cmd_tx else {
            return Err(Error::new(ErrorKind::NoConnection, "Not connected"));
        };
        if cmd_tx.is_closed() {
            return Err(Error::new(ErrorKind::NoConnection, "Connection is closed"));
        }
        cmd_tx
            .send(cmd)
            .map_err(|_| Error::new(ErrorKind::NoConnection, "Connection task is gone"))
    }
}

fn map_topic_err(err: EncodeError) -> Error {
    match err {
        EncodeError::InvalidTopic => {
            Error::new(ErrorKind::InvalidTopicName, "Invalid topic name")
        }
        _ => Error::from(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    use codec::{
        ConnectReturnCode, FrameDecoder, Packet, Property, PublishAckPacket,
        PublishReleasePacket, U16Data,
    };

    async fn read_packet(
        io: &mut DuplexStream,
        decoder: &mut FrameDecoder,
        version: ProtocolVersion,
    ) -> Packet {
        loop {
            if let Some(packet) = decoder.next_packet(version).unwrap() {
                return packet;
            }
            let mut chunk = [0u8; 1024];
            let n_recv = io.read(&mut chunk).await.unwrap();
            assert!(n_recv > 0, "stream closed while waiting for a packet");
            decoder.feed(&chunk[..n_recv]);
        }
    }

    async fn write_packet(io: &mut DuplexStream, packet: Packet, version: ProtocolVersion) {
        let mut buf = Vec::new();
        packet.encode(version, &mut buf).unwrap();
        io.write_all(&buf).await.unwrap();
    }

    fn test_options(version: ProtocolVersion) -> ConnectOptions {
        let mut options = ConnectOptions::default();
        options.set_version(version);
        options.set_client_id("MyClient");
        options
    }

    /// Drive the CONNECT handshake over an in-memory pipe. Returns the
    /// connected client and the server end of the pipe.
    async fn connected_client(
        options: ConnectOptions,
        session_present: bool,
    ) -> (AsyncClient, DuplexStream, FrameDecoder) {
        let version = options.version();
        let (client_io, mut broker_io) = tokio::io::duplex(4096);
        let mut client = AsyncClient::new(options);
        let mut decoder = FrameDecoder::new();

        let broker = async {
            let packet = read_packet(&mut broker_io, &mut decoder, version).await;
            assert!(matches!(packet, Packet::Connect(_)));
            let ack = ConnectAckPacket::new(session_present);
            write_packet(&mut broker_io, Packet::ConnectAck(ack), version).await;
        };
        let (ack, ()) = tokio::join!(
            client.attach_stream(Stream::Duplex(client_io), None),
            broker
        );
        let ack = ack.unwrap();
        assert_eq!(ack.session_present(), session_present);
        (client, broker_io, decoder)
    }

    async fn wait_until<F: Fn() -> bool>(cond: F) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !cond() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_connect_v311() {
        let (client, _broker_io, _decoder) =
            connected_client(test_options(ProtocolVersion::V311), false).await;
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_connect_rejected() {
        let version = ProtocolVersion::V311;
        let (client_io, mut broker_io) = tokio::io::duplex(4096);
        let mut client = AsyncClient::new(test_options(version));
        let mut decoder = FrameDecoder::new();

        let broker = async {
            let packet = read_packet(&mut broker_io, &mut decoder, version).await;
            assert!(matches!(packet, Packet::Connect(_)));
            let mut ack = ConnectAckPacket::new(false);
            ack.set_return_code(ConnectReturnCode::Unauthorized);
            write_packet(&mut broker_io, Packet::ConnectAck(ack), version).await;
        };
        let (result, ()) = tokio::join!(
            client.attach_stream(Stream::Duplex(client_io), None),
            broker
        );
        let err = result.unwrap_err();
        assert_eq!(
            err.kind(),
            &ErrorKind::ConnectionError(ConnectReturnCode::Unauthorized)
        );
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_publish_qos0_completes_on_send() {
        let (client, mut broker_io, mut decoder) =
            connected_client(test_options(ProtocolVersion::V311), false).await;

        let receipt = client.publish("MyTopic", QoS::AtMostOnce, b"Test payload").await;
        assert_eq!(receipt.unwrap(), None);

        let packet = read_packet(&mut broker_io, &mut decoder, ProtocolVersion::V311).await;
        let Packet::Publish(publish) = packet else {
            panic!("expected publish");
        };
        assert_eq!(publish.topic(), "MyTopic");
        assert_eq!(publish.packet_id().value(), 0);
    }

    #[tokio::test]
    async fn test_publish_qos1_acknowledged() {
        let version = ProtocolVersion::V311;
        let (client, mut broker_io, mut decoder) =
            connected_client(test_options(version), false).await;

        let broker = async {
            let packet = read_packet(&mut broker_io, &mut decoder, version).await;
            let Packet::Publish(publish) = packet else {
                panic!("expected publish");
            };
            assert!(!publish.dup());
            let packet_id = publish.packet_id();
            write_packet(
                &mut broker_io,
                Packet::PublishAck(PublishAckPacket::new(packet_id)),
                version,
            )
            .await;
        };
        let (receipt, ()) = tokio::join!(client.publish("a/b", QoS::AtLeastOnce, b"hello"), broker);
        let receipt = receipt.unwrap().unwrap();
        assert_eq!(receipt.reason_code, ReasonCode::Success);
        assert!(client.state.lock().unwrap().inflight.is_empty());
    }

    #[tokio::test]
    async fn test_publish_qos1_reason_error() {
        let version = ProtocolVersion::V5;
        let (client, mut broker_io, mut decoder) =
            connected_client(test_options(version), false).await;

        let broker = async {
            let packet = read_packet(&mut broker_io, &mut decoder, version).await;
            let Packet::Publish(publish) = packet else {
                panic!("expected publish");
            };
            let mut ack = PublishAckPacket::new(publish.packet_id());
            ack.set_reason_code(ReasonCode::QuotaExceeded);
            write_packet(&mut broker_io, Packet::PublishAck(ack), version).await;
        };
        let (result, ()) = tokio::join!(client.publish("a/b", QoS::AtLeastOnce, b"hello"), broker);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ReasonError(ReasonCode::QuotaExceeded));
        // The failed delivery does not stay inflight.
        assert!(client.state.lock().unwrap().inflight.is_empty());
    }

    #[tokio::test]
    async fn test_publish_qos2_ladder() {
        let version = ProtocolVersion::V311;
        let (client, mut broker_io, mut decoder) =
            connected_client(test_options(version), false).await;

        let broker = async {
            let packet = read_packet(&mut broker_io, &mut decoder, version).await;
            let Packet::Publish(publish) = packet else {
                panic!("expected publish");
            };
            let packet_id = publish.packet_id();
            write_packet(
                &mut broker_io,
                Packet::PublishReceived(codec::PublishReceivedPacket::new(packet_id)),
                version,
            )
            .await;

            let packet = read_packet(&mut broker_io, &mut decoder, version).await;
            let Packet::PublishRelease(release) = packet else {
                panic!("expected pubrel");
            };
            assert_eq!(release.packet_id(), packet_id);
            write_packet(
                &mut broker_io,
                Packet::PublishComplete(codec::PublishCompletePacket::new(packet_id)),
                version,
            )
            .await;
        };
        let (receipt, ()) = tokio::join!(client.publish("a/b", QoS::ExactOnce, b"exact"), broker);
        assert!(receipt.unwrap().is_some());
        assert!(client.state.lock().unwrap().inflight.is_empty());
    }

    #[tokio::test]
    async fn test_inbound_qos2_duplicate_single_delivery() {
        let version = ProtocolVersion::V311;
        let (client, mut broker_io, mut decoder) =
            connected_client(test_options(version), false).await;

        let deliveries = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&deliveries);
        client.add_publish_listener("sink", move |result| {
            sink.lock().unwrap().push(result.unwrap().message().to_vec());
        });

        let packet_id = PacketId::new(7);
        let mut first = PublishPacket::new("in/q2", QoS::ExactOnce, b"a").unwrap();
        first.set_packet_id(packet_id);
        write_packet(&mut broker_io, Packet::Publish(first), version).await;

        let packet = read_packet(&mut broker_io, &mut decoder, version).await;
        assert!(matches!(packet, Packet::PublishReceived(ref p) if p.packet_id() == packet_id));

        // The PUBREL got lost; the server re-delivers with a new payload.
        let mut second = PublishPacket::new("in/q2", QoS::ExactOnce, b"b").unwrap();
        second.set_packet_id(packet_id);
        second.set_dup(true).unwrap();
        write_packet(&mut broker_io, Packet::Publish(second), version).await;

        // The client answers the duplicate with another PUBREC.
        let packet = read_packet(&mut broker_io, &mut decoder, version).await;
        assert!(matches!(packet, Packet::PublishReceived(ref p) if p.packet_id() == packet_id));

        write_packet(
            &mut broker_io,
            Packet::PublishRelease(PublishReleasePacket::new(packet_id)),
            version,
        )
        .await;
        let packet = read_packet(&mut broker_io, &mut decoder, version).await;
        assert!(matches!(packet, Packet::PublishComplete(ref p) if p.packet_id() == packet_id));

        let seen = Arc::clone(&deliveries);
        wait_until(move || !seen.lock().unwrap().is_empty()).await;
        let seen = deliveries.lock().unwrap();
        assert_eq!(seen.as_slice(), &[b"b".to_vec()]);
        assert!(client.state.lock().unwrap().pending_in.is_empty());
    }

    #[tokio::test]
    async fn test_session_resume_replays_inflight() {
        let version = ProtocolVersion::V311;
        let mut options = test_options(version);
        options.set_clean_session(false);
        let (client, mut broker_io, mut decoder) = connected_client(options, false).await;

        // The broker reads the publish and dies before acknowledging it.
        let broker = async {
            let packet = read_packet(&mut broker_io, &mut decoder, version).await;
            let Packet::Publish(publish) = packet else {
                panic!("expected publish");
            };
            drop(broker_io);
            publish.packet_id()
        };
        let (result, packet_id) = tokio::join!(client.publish("a/b", QoS::AtLeastOnce, b"x"), broker);
        assert_eq!(
            result.unwrap_err().kind(),
            &ErrorKind::ServerClosedConnection
        );
        // The unacknowledged publish survives the connection.
        assert!(client.state.lock().unwrap().inflight.contains(packet_id));

        // Reconnect with a resumed session.
        let mut client = client;
        let (client_io, mut broker_io) = tokio::io::duplex(4096);
        let mut decoder = FrameDecoder::new();
        let broker = async {
            let packet = read_packet(&mut broker_io, &mut decoder, version).await;
            assert!(matches!(packet, Packet::Connect(_)));
            write_packet(
                &mut broker_io,
                Packet::ConnectAck(ConnectAckPacket::new(true)),
                version,
            )
            .await;

            let packet = read_packet(&mut broker_io, &mut decoder, version).await;
            let Packet::Publish(publish) = packet else {
                panic!("expected replayed publish");
            };
            assert!(publish.dup());
            assert_eq!(publish.packet_id(), packet_id);
            assert_eq!(publish.message(), b"x");
            write_packet(
                &mut broker_io,
                Packet::PublishAck(PublishAckPacket::new(packet_id)),
                version,
            )
            .await;
        };
        let (ack, ()) = tokio::join!(
            client.attach_stream(Stream::Duplex(client_io), None),
            broker
        );
        assert!(ack.unwrap().session_present());

        let state = Arc::clone(&client.state);
        wait_until(move || state.lock().unwrap().inflight.is_empty()).await;
    }

    #[tokio::test]
    async fn test_clean_session_clears_inflight() {
        let version = ProtocolVersion::V311;
        let mut options = test_options(version);
        options.set_clean_session(false);
        let (client, mut broker_io, mut decoder) = connected_client(options, false).await;

        let broker = async {
            let _publish = read_packet(&mut broker_io, &mut decoder, version).await;
            drop(broker_io);
        };
        let (result, ()) = tokio::join!(client.publish("a/b", QoS::AtLeastOnce, b"x"), broker);
        assert!(result.is_err());
        assert!(!client.state.lock().unwrap().inflight.is_empty());

        // The server reports no stored session; the inflight store is
        // dropped instead of replayed.
        let mut client = client;
        let (_client2, _broker_io2, _decoder2) = {
            let (client_io, mut broker_io) = tokio::io::duplex(4096);
            let mut decoder = FrameDecoder::new();
            let broker = async {
                let packet = read_packet(&mut broker_io, &mut decoder, version).await;
                assert!(matches!(packet, Packet::Connect(_)));
                write_packet(
                    &mut broker_io,
                    Packet::ConnectAck(ConnectAckPacket::new(false)),
                    version,
                )
                .await;
            };
            let (ack, ()) = tokio::join!(
                client.attach_stream(Stream::Duplex(client_io), None),
                broker
            );
            assert!(!ack.unwrap().session_present());
            (client, broker_io, decoder)
        };
        assert!(_client2.state.lock().unwrap().inflight.is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_returns_reason_codes() {
        let version = ProtocolVersion::V311;
        let (client, mut broker_io, mut decoder) =
            connected_client(test_options(version), false).await;

        let broker = async {
            let packet = read_packet(&mut broker_io, &mut decoder, version).await;
            let Packet::Subscribe(subscribe) = packet else {
                panic!("expected subscribe");
            };
            assert_eq!(subscribe.topics().len(), 2);
            let ack = SubscribeAckPacket::with_reasons(
                subscribe.packet_id(),
                vec![ReasonCode::GrantedQoS1, ReasonCode::UnspecifiedError],
            );
            write_packet(&mut broker_io, Packet::SubscribeAck(ack), version).await;
        };
        let topics = vec![
            SubscribeTopic::new("topic/cars", QoS::AtLeastOnce).unwrap(),
            SubscribeTopic::new("topic/buses", QoS::AtLeastOnce).unwrap(),
        ];
        let (ack, ()) = tokio::join!(client.subscribe(topics), broker);
        let ack = ack.unwrap();
        assert_eq!(
            ack.reasons(),
            &[ReasonCode::GrantedQoS1, ReasonCode::UnspecifiedError]
        );
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let version = ProtocolVersion::V5;
        let (client, mut broker_io, mut decoder) =
            connected_client(test_options(version), false).await;

        let broker = async {
            let packet = read_packet(&mut broker_io, &mut decoder, version).await;
            let Packet::Unsubscribe(unsubscribe) = packet else {
                panic!("expected unsubscribe");
            };
            let ack = codec::UnsubscribeAckPacket::with_reasons(
                unsubscribe.packet_id(),
                vec![ReasonCode::Success],
            );
            write_packet(&mut broker_io, Packet::UnsubscribeAck(ack), version).await;
        };
        let (ack, ()) = tokio::join!(client.unsubscribe(&["topic/cars"]), broker);
        assert_eq!(ack.unwrap().reasons(), &[ReasonCode::Success]);
    }

    #[tokio::test]
    async fn test_ping() {
        let version = ProtocolVersion::V311;
        let (client, mut broker_io, mut decoder) =
            connected_client(test_options(version), false).await;

        let broker = async {
            let packet = read_packet(&mut broker_io, &mut decoder, version).await;
            assert!(matches!(packet, Packet::PingRequest(_)));
            write_packet(
                &mut broker_io,
                Packet::PingResponse(codec::PingResponsePacket::new()),
                version,
            )
            .await;
        };
        let (result, ()) = tokio::join!(client.ping(), broker);
        result.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_sends_pingreq() {
        let version = ProtocolVersion::V311;
        let mut options = test_options(version);
        options.set_keep_alive(Duration::from_secs(10));
        let (_client, mut broker_io, mut decoder) = connected_client(options, false).await;

        // No writes for one ping interval (10 - 5 = 5 s); the scheduler
        // must probe on its own.
        let packet = read_packet(&mut broker_io, &mut decoder, version).await;
        assert!(matches!(packet, Packet::PingRequest(_)));
        write_packet(
            &mut broker_io,
            Packet::PingResponse(codec::PingResponsePacket::new()),
            version,
        )
        .await;

        // And again one interval later.
        let packet = read_packet(&mut broker_io, &mut decoder, version).await;
        assert!(matches!(packet, Packet::PingRequest(_)));
    }

    #[tokio::test]
    async fn test_server_disconnect_fails_pending() {
        let version = ProtocolVersion::V5;
        let (client, mut broker_io, mut decoder) =
            connected_client(test_options(version), false).await;

        let closed = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&closed);
        client.add_close_listener("watch", move |result| {
            *sink.lock().unwrap() = Some(result);
        });

        let broker = async {
            let packet = read_packet(&mut broker_io, &mut decoder, version).await;
            assert!(matches!(packet, Packet::Publish(_)));
            let mut disconnect = DisconnectPacket::new();
            disconnect.set_reason_code(ReasonCode::ServerShuttingDown);
            write_packet(&mut broker_io, Packet::Disconnect(disconnect), version).await;
        };
        let (result, ()) = tokio::join!(client.publish("a/b", QoS::AtLeastOnce, b"x"), broker);
        assert_eq!(
            result.unwrap_err().kind(),
            &ErrorKind::ServerDisconnection(ReasonCode::ServerShuttingDown)
        );

        let watched = Arc::clone(&closed);
        wait_until(move || watched.lock().unwrap().is_some()).await;
        let result = closed.lock().unwrap().take().unwrap();
        assert_eq!(
            result.unwrap_err().kind(),
            &ErrorKind::ServerDisconnection(ReasonCode::ServerShuttingDown)
        );
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_graceful() {
        let version = ProtocolVersion::V311;
        let (client, mut broker_io, mut decoder) =
            connected_client(test_options(version), false).await;

        let closed = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&closed);
        client.add_close_listener("watch", move |result| {
            assert!(result.is_ok());
            sink.fetch_add(1, Ordering::SeqCst);
        });

        let mut client = client;
        let broker = async {
            let packet = read_packet(&mut broker_io, &mut decoder, version).await;
            assert!(matches!(packet, Packet::Disconnect(_)));
        };
        let (result, ()) = tokio::join!(client.disconnect(), broker);
        result.unwrap();

        let watched = Arc::clone(&closed);
        wait_until(move || watched.load(Ordering::SeqCst) == 1).await;
        assert!(!client.is_connected());
        assert_eq!(
            client.ping().await.unwrap_err().kind(),
            &ErrorKind::NoConnection
        );
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let (client, _broker_io, _decoder) =
            connected_client(test_options(ProtocolVersion::V5), false).await;

        // Wildcards are not allowed in publish topics.
        let err = client.publish("a/#", QoS::AtMostOnce, b"x").await.unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InvalidTopicName);

        let err = client.subscribe(Vec::new()).await.unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::AtLeastOneTopicRequired);

        let err = client.unsubscribe(&[]).await.unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::AtLeastOneTopicRequired);

        // Server granted QoS 1 at most.
        client.negotiated.lock().unwrap().maximum_qos = QoS::AtLeastOnce;
        let err = client.publish("a/b", QoS::ExactOnce, b"x").await.unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::QosInvalid);

        // Server does not keep retained messages.
        client.negotiated.lock().unwrap().retain_available = false;
        let err = client
            .publish_with_options("a/b", QoS::AtMostOnce, true, b"x", Properties::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::RetainUnavailable);

        // Topic alias above the negotiated maximum.
        let mut properties = Properties::new();
        properties.push(Property::TopicAlias(U16Data::new(5)));
        let err = client
            .publish_with_options("a/b", QoS::AtMostOnce, false, b"x", properties)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::TopicAliasOutOfRange);

        // Subscription identifiers belong to SUBSCRIBE, not PUBLISH.
        let mut properties = Properties::new();
        properties.push(Property::SubscriptionIdentifier(
            codec::VarInt::from(3).unwrap(),
        ));
        let err = client
            .publish_with_options("a/b", QoS::AtMostOnce, false, b"x", properties)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::PublishIncludesSubscription);
    }

    #[tokio::test]
    async fn test_not_connected() {
        let client = AsyncClient::new(test_options(ProtocolVersion::V311));
        let err = client.publish("a/b", QoS::AtMostOnce, b"x").await.unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::NoConnection);
        let err = client.ping().await.unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::NoConnection);
    }
}
