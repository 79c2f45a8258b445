//! Deriv module - Client implementation for the Deriv WebSocket API

pub mod codec;
pub mod connection;
pub mod correlator;
pub mod messages;
pub mod trading;
pub mod transport;

pub use connection::{ConnectionConfig, DerivConnection, ReconnectPolicy};
pub use trading::{DerivTradePlacer, OrderSettings};
pub use transport::WebSocketConnector;
