//! Common module - types, errors and traits shared by every layer

pub mod channels;
pub mod errors;
pub mod traits;
pub mod types;
