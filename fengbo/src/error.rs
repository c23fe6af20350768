// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

use std::fmt::{self, Display};
use std::io;

use codec::{ConnectReturnCode, ReasonCode};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;

/// Represent the types of errors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// `connect()` called while a connection is already up.
    AlreadyConnected,

    /// Operation requires an active connection.
    NoConnection,

    /// The first packet from the server was not CONNACK or AUTH.
    FailedToConnect,

    /// Negative CONNACK return code on a 3.1.1 connection.
    ConnectionError(ConnectReturnCode),

    /// Failure reason code from the server on a 5.0 connection.
    ReasonError(ReasonCode),

    /// The server closed the session with a 5.0 DISCONNECT packet.
    ServerDisconnection(ReasonCode),

    /// Transport closed without a DISCONNECT packet.
    ServerClosedConnection,

    /// A wire-legal packet arrived in a context where it is not allowed.
    UnexpectedMessage,

    /// Malformed inbound packet.
    DecodeError,

    /// Packet encode error.
    EncodeError,

    /// Inbound packet is well-formed but contradicts the protocol state.
    BadResponse,

    /// Invalid argument to a client operation.
    BadParameter,

    /// Requested QoS exceeds what the server granted.
    QosInvalid,

    /// Retained messages are not available on this server.
    RetainUnavailable,

    /// Subscribe/unsubscribe called with an empty topic list.
    AtLeastOneTopicRequired,

    /// Topic alias is zero or above the negotiated maximum.
    TopicAliasOutOfRange,

    /// Topic name contains wildcard characters or is otherwise invalid.
    InvalidTopicName,

    /// PUBLISH properties must not carry a subscription identifier.
    PublishIncludesSubscription,

    /// Pending operation timed out.
    Timeout,

    /// Server started an AUTH exchange but no auth callback was supplied.
    AuthWorkflowRequired,

    /// Error occurred while performing I/O.
    IoError,

    /// Socket stream error.
    SocketError,

    /// Cert file error.
    CertError,

    /// mpsc/oneshot channel error.
    ChannelError,
}

/// Error type of this library, a kind plus a human readable message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Error {
    /// Type of current error.
    kind: ErrorKind,

    /// Detail message about this error.
    message: String,
}

impl Error {
    #[must_use]
    pub fn new(kind: ErrorKind, message: &str) -> Self {
        Self {
            kind,
            message: message.to_owned(),
        }
    }

    #[must_use]
    pub const fn from_string(kind: ErrorKind, message: String) -> Self {
        Self { kind, message }
    }

    #[must_use]
    pub const fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn connection_error(return_code: ConnectReturnCode) -> Self {
        Self::from_string(
            ErrorKind::ConnectionError(return_code),
            format!("Server refused connection: {return_code:?}"),
        )
    }

    #[must_use]
    pub fn reason_error(reason_code: ReasonCode) -> Self {
        Self::from_string(
            ErrorKind::ReasonError(reason_code),
            format!("Server returned failure reason: {reason_code:?}"),
        )
    }

    #[must_use]
    pub fn server_disconnection(reason_code: ReasonCode) -> Self {
        Self::from_string(
            ErrorKind::ServerDisconnection(reason_code),
            format!("Server closed session: {reason_code:?}"),
        )
    }

    #[must_use]
    pub fn server_closed_connection() -> Self {
        Self::new(
            ErrorKind::ServerClosedConnection,
            "Connection closed without DISCONNECT",
        )
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::from_string(ErrorKind::IoError, format!("IoError {err}"))
    }
}

impl From<tungstenite::Error> for Error {
    fn from(err: tungstenite::Error) -> Self {
        Self::from_string(ErrorKind::SocketError, format!("Websocket error: {err}"))
    }
}

impl From<tokio_rustls::rustls::Error> for Error {
    fn from(err: tokio_rustls::rustls::Error) -> Self {
        Self::from_string(ErrorKind::CertError, format!("Rustls error: {err}"))
    }
}

impl From<codec::EncodeError> for Error {
    fn from(err: codec::EncodeError) -> Self {
        Self::from_string(ErrorKind::EncodeError, format!("{err:?}"))
    }
}

impl From<codec::DecodeError> for Error {
    fn from(err: codec::DecodeError) -> Self {
        Self::from_string(ErrorKind::DecodeError, format!("{err:?}"))
    }
}

impl<T> From<mpsc::error::SendError<T>> for Error {
    fn from(err: mpsc::error::SendError<T>) -> Self {
        Self::from_string(ErrorKind::ChannelError, format!("Channel error: {err}"))
    }
}
