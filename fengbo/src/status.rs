// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

/// Lifecycle of one network connection.
///
/// ```txt
///             ┌──► Connecting ──CONNACK.fail──────► Closed
///  Closed ───►│         │
///             │         ├──CONNACK.ok─────► Active ──► Disconnecting ──► Closed
///             │         └──AUTH──► Authenticating ──┘
/// ```
///
/// Only `Active` admits publish/subscribe/ping operations.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// CONNECT sent, waiting for CONNACK.
    Connecting,

    /// In an extended AUTH exchange, 5.0 only.
    Authenticating,

    /// CONNACK accepted; the session serves operations.
    Active,

    /// DISCONNECT sent, tearing down.
    Disconnecting,

    /// No live transport.
    Closed,
}
