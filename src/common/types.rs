//! Shared types used across the connection and strategy layers

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle state of the connection to the quote service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No transport handle; initial and terminal state
    Disconnected,
    /// Waiting for the transport to confirm it is open
    Connecting,
    /// Transport open, no credential accepted yet
    Connected,
    /// Authorize request in flight
    Authenticating,
    /// Credential accepted, balance stream running
    Authorized,
    /// Transport lost, waiting out the backoff before the next attempt
    Reconnecting,
}

impl ConnectionState {
    /// Whether a transport handle is currently open
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connected | ConnectionState::Authenticating | ConnectionState::Authorized
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Authorized => "authorized",
            ConnectionState::Reconnecting => "reconnecting",
        };
        write!(f, "{}", name)
    }
}

/// Event delivered by a transport's I/O task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One inbound text frame
    Message(String),
    /// The transport closed; emitted exactly once, as the last event
    Closed { reason: Option<String> },
}

/// One price observation for a traded instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// Instrument symbol (e.g. `R_100`)
    pub symbol: String,
    /// Quoted price
    pub quote: Decimal,
    /// Server timestamp of the quote
    pub epoch: DateTime<Utc>,
}

/// Consistent point-in-time view of the connection's shared state
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSnapshot {
    /// Lifecycle state at the time of the read
    pub state: ConnectionState,
    /// Latest account balance
    pub balance: Decimal,
    /// Whether a credential is currently accepted
    pub authorized: bool,
    /// Instrument the tick stream is (or was last) subscribed to
    pub symbol: String,
    /// Buffered prices, oldest first
    pub ticks: Vec<Decimal>,
    /// Whether the tick stream is subscribed on the current transport
    pub ticks_live: bool,
}
