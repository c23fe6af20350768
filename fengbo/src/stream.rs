// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use futures_util::sink::SinkExt;
use futures_util::stream::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::{self, OwnedTrustAnchor, RootCertStore, ServerName};
use tokio_rustls::TlsConnector;
use tokio_tungstenite::tungstenite::protocol::{Message, WebSocketConfig};
use tokio_tungstenite::WebSocketStream;

use crate::connect_options::{ConnectOptions, ConnectType, MqttsConnect, TlsType, WsConnect, WssConnect};
use crate::error::{Error, ErrorKind};

/// The byte-stream transport under a session.
///
/// Every variant presents the same contract: an ordered, reliable,
/// bidirectional stream with `read_buf` delivering arbitrary chunks and
/// `write_all` flushing on return. The session never assumes one packet per
/// chunk.
pub enum Stream {
    /// Plain TCP.
    Mqtt(TcpStream),

    /// TLS over TCP.
    Mqtts(Box<TlsStream<TcpStream>>),

    /// WebSocket over TCP, binary frames.
    Ws(WebSocketStream<TcpStream>),

    /// WebSocket over TLS, binary frames.
    Wss(Box<WebSocketStream<TlsStream<TcpStream>>>),

    /// Unix domain socket.
    #[cfg(unix)]
    Uds(UnixStream),

    /// In-memory pipe used by session tests.
    #[cfg(test)]
    Duplex(tokio::io::DuplexStream),
}

impl Stream {
    /// Open a transport described by `options`.
    ///
    /// # Errors
    ///
    /// Returns error if the remote is unreachable or the TLS/WebSocket
    /// handshake fails.
    pub async fn connect(options: &ConnectOptions) -> Result<Self, Error> {
        match options.connect_type() {
            ConnectType::Mqtt => {
                let socket = TcpStream::connect(options.address()).await?;
                Ok(Self::Mqtt(socket))
            }
            ConnectType::Mqtts(mqtts) => Self::connect_mqtts(options, mqtts).await,
            ConnectType::Ws(ws) => Self::connect_ws(options, ws).await,
            ConnectType::Wss(wss) => Self::connect_wss(options, wss).await,
            #[cfg(unix)]
            ConnectType::Uds(uds) => {
                let socket = UnixStream::connect(&uds.sock_path).await?;
                Ok(Self::Uds(socket))
            }
        }
    }

    async fn connect_mqtts(options: &ConnectOptions, mqtts: &MqttsConnect) -> Result<Self, Error> {
        let socket = TcpStream::connect(options.address()).await?;
        let tls_socket = tls_handshake(socket, &mqtts.domain, &mqtts.tls_type).await?;
        Ok(Self::Mqtts(Box::new(tls_socket)))
    }

    async fn connect_ws(options: &ConnectOptions, ws: &WsConnect) -> Result<Self, Error> {
        let ws_url = format!("ws://{}{}", options.address(), &ws.path);
        let socket = TcpStream::connect(options.address()).await?;
        let config = ws_config(options);
        let (ws_stream, _response) =
            tokio_tungstenite::client_async_with_config(ws_url, socket, Some(config)).await?;
        Ok(Self::Ws(ws_stream))
    }

    async fn connect_wss(options: &ConnectOptions, wss: &WssConnect) -> Result<Self, Error> {
        let socket = TcpStream::connect(options.address()).await?;
        let tls_socket = tls_handshake(socket, &wss.domain, &wss.tls_type).await?;
        let ws_url = format!("wss://{}{}", &wss.domain, &wss.path);
        let config = ws_config(options);
        let (ws_stream, _response) =
            tokio_tungstenite::client_async_with_config(ws_url, tls_socket, Some(config)).await?;
        Ok(Self::Wss(Box::new(ws_stream)))
    }

    /// Read one chunk of bytes, appending to `buf`.
    ///
    /// Returns the number of bytes read; 0 means the peer closed the
    /// stream.
    ///
    /// # Errors
    ///
    /// Returns error if the underlying transport fails.
    pub async fn read_buf(&mut self, buf: &mut Vec<u8>) -> Result<usize, Error> {
        match self {
            Self::Mqtt(socket) => Ok(socket.read_buf(buf).await?),
            Self::Mqtts(tls_socket) => Ok(tls_socket.read_buf(buf).await?),
            Self::Ws(ws_stream) => ws_read(ws_stream, buf).await,
            Self::Wss(ws_stream) => ws_read(ws_stream, buf).await,
            #[cfg(unix)]
            Self::Uds(socket) => Ok(socket.read_buf(buf).await?),
            #[cfg(test)]
            Self::Duplex(pipe) => Ok(pipe.read_buf(buf).await?),
        }
    }

    /// Write all bytes in `buf` and flush.
    ///
    /// # Errors
    ///
    /// Returns error if the underlying transport fails.
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<(), Error> {
        match self {
            Self::Mqtt(socket) => {
                socket.write_all(buf).await?;
                Ok(socket.flush().await?)
            }
            Self::Mqtts(tls_socket) => {
                tls_socket.write_all(buf).await?;
                Ok(tls_socket.flush().await?)
            }
            Self::Ws(ws_stream) => Ok(ws_stream.send(Message::binary(buf)).await?),
            Self::Wss(ws_stream) => Ok(ws_stream.send(Message::binary(buf)).await?),
            #[cfg(unix)]
            Self::Uds(socket) => {
                socket.write_all(buf).await?;
                Ok(socket.flush().await?)
            }
            #[cfg(test)]
            Self::Duplex(pipe) => {
                pipe.write_all(buf).await?;
                Ok(pipe.flush().await?)
            }
        }
    }
}

fn ws_config(options: &ConnectOptions) -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_frame_size = Some(options.ws_max_frame_size());
    config
}

async fn ws_read<S>(ws_stream: &mut WebSocketStream<S>, buf: &mut Vec<u8>) -> Result<usize, Error>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    loop {
        let Some(msg) = ws_stream.next().await else {
            return Ok(0);
        };
        match msg? {
            Message::Binary(data) => {
                let data_len = data.len();
                buf.extend(data);
                return Ok(data_len);
            }
            Message::Close(_frame) => return Ok(0),
            // Control frames are transparent to the MQTT layer.
            _ => continue,
        }
    }
}

async fn tls_handshake(
    socket: TcpStream,
    domain: &str,
    tls_type: &TlsType,
) -> Result<TlsStream<TcpStream>, Error> {
    let mut root_store = RootCertStore::empty();
    match tls_type {
        TlsType::CASigned => {
            root_store.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|anchor| {
                OwnedTrustAnchor::from_subject_spki_name_constraints(
                    anchor.subject,
                    anchor.spki,
                    anchor.name_constraints,
                )
            }));
        }
        TlsType::SelfSigned(self_signed) => {
            let root_ca_fd = File::open(&self_signed.root_ca_pem)?;
            let mut reader = BufReader::new(root_ca_fd);
            for cert in rustls_pemfile::certs(&mut reader)? {
                root_store.add(&rustls::Certificate(cert))?;
            }
        }
    }

    let config = rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));
    let server_name = ServerName::try_from(domain)
        .map_err(|err| Error::from_string(ErrorKind::CertError, format!("Invalid SNI name: {err}")))?;
    Ok(connector.connect(server_name, socket).await?)
}
