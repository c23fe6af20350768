// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Asynchronous MQTT client supporting protocol 3.1.1 and 5.0.
//!
//! One [`AsyncClient`] owns one MQTT session. The session survives the
//! network connection; reconnecting with `clean_session` unset replays
//! unacknowledged QoS 1/2 deliveries. Transports: TCP, TLS, WebSocket and
//! Unix domain sockets.

mod client;
mod commands;
mod connect_options;
mod error;
mod inflight;
mod listeners;
mod pending;
mod session;
mod status;
mod stream;

pub use client::AsyncClient;
pub use commands::{AuthCallback, PublishReceipt};
pub use connect_options::{
    ConnectOptions, ConnectType, MqttsConnect, SelfSignedTls, TlsType, UdsConnect, WillOptions,
    WsConnect, WssConnect, DEFAULT_CONNECT_TIMEOUT, DEFAULT_KEEP_ALIVE, DEFAULT_WS_MAX_FRAME_SIZE,
};
pub use error::{Error, ErrorKind};
pub use listeners::{CloseListener, Listeners, PublishListener};
pub use session::NegotiatedOptions;
pub use status::ConnectionStatus;
pub use stream::Stream;
