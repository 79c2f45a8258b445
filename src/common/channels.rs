//! Channel type definitions for inter-task communication

use tokio::sync::mpsc;

use super::types::TransportEvent;

/// Default channel buffer size
pub const DEFAULT_CHANNEL_SIZE: usize = 1000;

/// Create the channel carrying encoded frames to a transport's I/O task
pub fn create_outbound_channel() -> (mpsc::Sender<String>, mpsc::Receiver<String>) {
    mpsc::channel(DEFAULT_CHANNEL_SIZE)
}

/// Create a new transport event channel with the default buffer size
pub fn create_event_channel() -> (mpsc::Sender<TransportEvent>, mpsc::Receiver<TransportEvent>) {
    mpsc::channel(DEFAULT_CHANNEL_SIZE)
}

/// Create a new transport event channel with a custom buffer size
pub fn create_event_channel_with_size(
    size: usize,
) -> (mpsc::Sender<TransportEvent>, mpsc::Receiver<TransportEvent>) {
    mpsc::channel(size)
}
