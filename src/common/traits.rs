//! Trait definitions for the seams between the client and its collaborators

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::mpsc;

use super::errors::Result;
use super::types::{MarketSnapshot, TransportEvent};
use crate::strategy::types::{PatternSignal, Trade};

/// Both ends of an open transport as seen by its owner
#[derive(Debug)]
pub struct TransportChannels {
    /// Encoded frames to write to the remote endpoint
    pub outbound: mpsc::Sender<String>,
    /// Frames read from the remote endpoint, terminated by `TransportEvent::Closed`
    pub inbound: mpsc::Receiver<TransportEvent>,
}

/// Opens duplex message transports to a remote endpoint
///
/// Implementations spawn whatever I/O task they need and hand back a pair of
/// channels. Dropping the inbound receiver closes the transport.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new transport to `url`
    async fn open(&self, url: &str) -> Result<TransportChannels>;
}

/// Orchestrator-facing interface of the connection
///
/// This trait provides the read snapshot and the mutator trio the trading
/// loop needs, without exposing the transport.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketClient: Send + Sync {
    /// Open the transport (closing any existing one first)
    async fn connect(&self) -> Result<()>;

    /// Authorize with the given credential, connecting first if needed
    async fn authorize(&self, credential: &str) -> Result<()>;

    /// Stream ticks for `symbol` into the tick buffer, replacing any active stream
    async fn subscribe_to_ticks(&self, symbol: &str) -> Result<()>;

    /// Release the active tick stream; best effort
    async fn unsubscribe_from_ticks(&self);

    /// Close everything and suppress automatic reconnection
    async fn disconnect(&self);

    /// Consistent read of balance, authorization flag and buffered ticks
    async fn snapshot(&self) -> MarketSnapshot;
}

/// Turns a signal into a broker order
///
/// Returns `None` on any failure; callers treat that as "no trade occurred".
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradePlacer: Send + Sync {
    /// Place a trade for `signal` with the given stake
    async fn place_trade(&self, signal: &PatternSignal, stake: Decimal) -> Option<Trade>;
}
