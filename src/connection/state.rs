//! Connection state types shared by the supervisor and the HTTP layer.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    QrReady,
    Connected,
    Authenticated,
    Error,
}

impl ConnectionStatus {
    /// Human-readable text used when a transition carries no explicit message.
    pub fn default_message(self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "not connected",
            ConnectionStatus::Connecting => "connecting...",
            ConnectionStatus::QrReady => "scan the QR code",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Authenticated => "authenticated",
            ConnectionStatus::Error => "an error occurred",
        }
    }

    /// Whether a session in this state can send.
    pub fn is_online(self) -> bool {
        matches!(
            self,
            ConnectionStatus::Connected | ConnectionStatus::Authenticated
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::QrReady => "qr_ready",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Authenticated => "authenticated",
            ConnectionStatus::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pairing code together with its rendered PNG data URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrPayload {
    pub raw: String,
    pub data_url: String,
}

/// Snapshot of the connection as seen by readers.
///
/// `qr` is only ever `Some` while `status` is [`ConnectionStatus::QrReady`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    message: Option<String>,
    pub qr: Option<QrPayload>,
    /// Logged out from the phone; nothing reconnects until an operator acts.
    terminal: bool,
}

impl ConnectionState {
    pub fn new(status: ConnectionStatus) -> Self {
        Self {
            status,
            message: None,
            qr: None,
            terminal: false,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn qr_ready(qr: QrPayload) -> Self {
        Self {
            status: ConnectionStatus::QrReady,
            message: None,
            qr: Some(qr),
            terminal: false,
        }
    }

    pub fn logged_out() -> Self {
        Self {
            terminal: true,
            ..Self::new(ConnectionStatus::Disconnected)
        }
        .with_message("logged out, scan a new QR code to pair again")
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn message(&self) -> &str {
        self.message
            .as_deref()
            .unwrap_or_else(|| self.status.default_message())
    }
}

/// Why a session closed, as reported by the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Account unlinked from the phone. Credentials are dead.
    LoggedOut,
    ConnectionClosed,
    ConnectionLost,
    /// Another client took over this session.
    ConnectionReplaced,
    BadSession,
    RestartRequired,
    Other(u16),
}

impl DisconnectReason {
    pub fn from_code(code: u16) -> Self {
        match code {
            401 => DisconnectReason::LoggedOut,
            428 => DisconnectReason::ConnectionClosed,
            408 => DisconnectReason::ConnectionLost,
            440 => DisconnectReason::ConnectionReplaced,
            500 => DisconnectReason::BadSession,
            515 => DisconnectReason::RestartRequired,
            other => DisconnectReason::Other(other),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            DisconnectReason::LoggedOut => 401,
            DisconnectReason::ConnectionClosed => 428,
            DisconnectReason::ConnectionLost => 408,
            DisconnectReason::ConnectionReplaced => 440,
            DisconnectReason::BadSession => 500,
            DisconnectReason::RestartRequired => 515,
            DisconnectReason::Other(code) => code,
        }
    }

    /// Only a logout is terminal; everything else is worth reconnecting for.
    pub fn is_logged_out(self) -> bool {
        self == DisconnectReason::LoggedOut
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DisconnectReason::LoggedOut => "logged out",
            DisconnectReason::ConnectionClosed => "connection closed",
            DisconnectReason::ConnectionLost => "connection lost",
            DisconnectReason::ConnectionReplaced => "connection replaced",
            DisconnectReason::BadSession => "bad session",
            DisconnectReason::RestartRequired => "restart required",
            DisconnectReason::Other(_) => "closed",
        };
        write!(f, "{} ({})", name, self.code())
    }
}
