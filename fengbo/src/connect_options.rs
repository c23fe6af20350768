// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use codec::utils::random_string;
use codec::{Properties, ProtocolVersion, QoS};

/// Default keep alive interval.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(90);

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default maximum WebSocket frame size.
pub const DEFAULT_WS_MAX_FRAME_SIZE: usize = 16 * 1024;

#[derive(Clone, Debug)]
pub struct SelfSignedTls {
    /// Path to the root CA file in PEM format.
    pub root_ca_pem: String,
}

#[derive(Clone, Debug)]
pub enum TlsType {
    /// Signed by a public root CA, like `Let's Encrypt`.
    CASigned,

    /// Self signed root CA generated with `openssl` or other tools.
    SelfSigned(SelfSignedTls),
}

#[derive(Clone, Debug)]
pub struct MqttsConnect {
    /// Server name sent in SNI and checked against the certificate.
    pub domain: String,
    pub tls_type: TlsType,
}

#[derive(Clone, Debug)]
pub struct WsConnect {
    /// Url path of the MQTT endpoint, like `/mqtt`.
    pub path: String,
}

#[derive(Clone, Debug)]
pub struct WssConnect {
    pub domain: String,
    pub tls_type: TlsType,
    pub path: String,
}

#[derive(Clone, Debug)]
pub struct UdsConnect {
    pub sock_path: String,
}

/// Transport used to reach the server.
#[derive(Clone, Debug)]
pub enum ConnectType {
    /// Plain TCP.
    Mqtt,

    /// TLS over TCP.
    Mqtts(MqttsConnect),

    /// WebSocket over TCP.
    Ws(WsConnect),

    /// WebSocket over TLS.
    Wss(WssConnect),

    /// Unix domain socket.
    #[cfg(unix)]
    Uds(UdsConnect),
}

/// Will message stored by the server and published if the client
/// disconnects ungracefully.
#[derive(Clone, Debug)]
pub struct WillOptions {
    pub topic: String,
    pub message: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,

    /// Will property block, 5.0 only.
    pub properties: Properties,
}

/// Client side configuration, fixed before `connect()`.
#[derive(Clone, Debug)]
pub struct ConnectOptions {
    address: SocketAddr,
    connect_type: ConnectType,
    version: ProtocolVersion,
    client_id: String,
    keep_alive: Duration,
    ping_interval: Option<Duration>,
    disable_ping: bool,
    connect_timeout: Duration,
    ack_timeout: Option<Duration>,
    username: Option<String>,
    password: Option<Vec<u8>>,
    clean_session: bool,
    will: Option<WillOptions>,
    properties: Properties,
    ws_max_frame_size: usize,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            address: SocketAddr::from(([127, 0, 0, 1], 1883)),
            connect_type: ConnectType::Mqtt,
            version: ProtocolVersion::default(),
            client_id: random_string(8),
            keep_alive: DEFAULT_KEEP_ALIVE,
            ping_interval: None,
            disable_ping: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            ack_timeout: None,
            username: None,
            password: None,
            clean_session: true,
            will: None,
            properties: Properties::new(),
            ws_max_frame_size: DEFAULT_WS_MAX_FRAME_SIZE,
        }
    }
}

impl ConnectOptions {
    /// Create connect options for `address` with everything else at its
    /// default.
    ///
    /// # Errors
    ///
    /// Returns error if `address` cannot be resolved.
    pub fn new<A: ToSocketAddrs>(address: A) -> io::Result<Self> {
        let mut addrs = address.to_socket_addrs()?;
        let address = addrs
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "No address resolved"))?;
        Ok(Self {
            address,
            ..Self::default()
        })
    }

    #[must_use]
    pub const fn address(&self) -> &SocketAddr {
        &self.address
    }

    pub fn set_connect_type(&mut self, connect_type: ConnectType) -> &mut Self {
        self.connect_type = connect_type;
        self
    }

    #[must_use]
    pub const fn connect_type(&self) -> &ConnectType {
        &self.connect_type
    }

    pub fn set_version(&mut self, version: ProtocolVersion) -> &mut Self {
        self.version = version;
        self
    }

    #[must_use]
    pub const fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn set_client_id(&mut self, client_id: &str) -> &mut Self {
        self.client_id = client_id.to_string();
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn set_keep_alive(&mut self, keep_alive: Duration) -> &mut Self {
        self.keep_alive = keep_alive;
        self
    }

    #[must_use]
    pub const fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    /// Override the derived ping interval.
    pub fn set_ping_interval(&mut self, ping_interval: Duration) -> &mut Self {
        self.ping_interval = Some(ping_interval);
        self
    }

    pub fn set_disable_ping(&mut self, disable_ping: bool) -> &mut Self {
        self.disable_ping = disable_ping;
        self
    }

    #[must_use]
    pub const fn disable_ping(&self) -> bool {
        self.disable_ping
    }

    pub fn set_connect_timeout(&mut self, connect_timeout: Duration) -> &mut Self {
        self.connect_timeout = connect_timeout;
        self
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Set how long to wait for an acknowledgement before the pending
    /// operation fails with a timeout error.
    pub fn set_ack_timeout(&mut self, ack_timeout: Duration) -> &mut Self {
        self.ack_timeout = Some(ack_timeout);
        self
    }

    #[must_use]
    pub const fn ack_timeout(&self) -> Option<Duration> {
        self.ack_timeout
    }

    pub fn set_username(&mut self, username: &str) -> &mut Self {
        self.username = Some(username.to_string());
        self
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn set_password(&mut self, password: &[u8]) -> &mut Self {
        self.password = Some(password.to_vec());
        self
    }

    #[must_use]
    pub fn password(&self) -> Option<&[u8]> {
        self.password.as_deref()
    }

    pub fn set_clean_session(&mut self, clean_session: bool) -> &mut Self {
        self.clean_session = clean_session;
        self
    }

    #[must_use]
    pub const fn clean_session(&self) -> bool {
        self.clean_session
    }

    pub fn set_will(&mut self, will: WillOptions) -> &mut Self {
        self.will = Some(will);
        self
    }

    #[must_use]
    pub const fn will(&self) -> Option<&WillOptions> {
        self.will.as_ref()
    }

    /// CONNECT property block, 5.0 only.
    pub fn mut_properties(&mut self) -> &mut Properties {
        &mut self.properties
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn set_ws_max_frame_size(&mut self, ws_max_frame_size: usize) -> &mut Self {
        self.ws_max_frame_size = ws_max_frame_size;
        self
    }

    #[must_use]
    pub const fn ws_max_frame_size(&self) -> usize {
        self.ws_max_frame_size
    }

    /// Derive the ping interval from the keep alive value.
    ///
    /// A zero keep alive disables the scheduler entirely. The interval runs
    /// 5 seconds ahead of the keep alive window so the PINGREQ is on the
    /// wire before the server gives up on the client, unless the window
    /// itself is 5 seconds or shorter.
    #[must_use]
    pub(crate) fn derived_ping_interval(&self, keep_alive: Duration) -> Option<Duration> {
        if self.disable_ping || keep_alive.is_zero() {
            return None;
        }
        if let Some(interval) = self.ping_interval {
            return Some(interval);
        }
        if keep_alive > Duration::from_secs(5) {
            Some(keep_alive - Duration::from_secs(5))
        } else {
            Some(keep_alive)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ConnectOptions::default();
        assert_eq!(options.keep_alive(), Duration::from_secs(90));
        assert_eq!(options.connect_timeout(), Duration::from_secs(10));
        assert_eq!(options.ws_max_frame_size(), 16384);
        assert_eq!(options.client_id().len(), 8);
        assert!(options.clean_session());
    }

    #[test]
    fn test_derived_ping_interval() {
        let mut options = ConnectOptions::default();
        assert_eq!(
            options.derived_ping_interval(Duration::from_secs(90)),
            Some(Duration::from_secs(85))
        );
        assert_eq!(
            options.derived_ping_interval(Duration::from_secs(4)),
            Some(Duration::from_secs(4))
        );
        // Zero keep alive turns the scheduler off.
        assert_eq!(options.derived_ping_interval(Duration::ZERO), None);

        options.set_ping_interval(Duration::from_secs(7));
        assert_eq!(
            options.derived_ping_interval(Duration::from_secs(90)),
            Some(Duration::from_secs(7))
        );

        options.set_disable_ping(true);
        assert_eq!(options.derived_ping_interval(Duration::from_secs(90)), None);
    }
}
