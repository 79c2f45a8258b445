//! DerivWebsocket Library
//!
//! A Rust library for streaming Deriv synthetic index ticks over a websocket,
//! detecting last-digit patterns and placing trades on them.

pub mod common;
pub mod config;
pub mod deriv;
pub mod strategy;

// Re-export commonly used types
pub use common::errors::{ClientError, Result};
pub use common::traits::{Connector, MarketClient, TradePlacer, TransportChannels};
pub use common::types::{ConnectionState, MarketSnapshot, Tick, TransportEvent};
pub use config::types::AppConfig;
pub use deriv::{
    ConnectionConfig, DerivConnection, DerivTradePlacer, OrderSettings, ReconnectPolicy,
    WebSocketConnector,
};

// Strategy types
pub use strategy::{
    stake_amount, CycleOutcome, Direction, Orchestrator, OrchestratorConfig, PatternEngine,
    PatternSignal, PatternType, StakeSizer, TickBuffer, Trade,
};
