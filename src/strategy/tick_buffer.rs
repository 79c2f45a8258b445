//! Bounded rolling window of the most recent prices

use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Number of prices kept by default
pub const DEFAULT_TICK_CAPACITY: usize = 20;

/// Insertion-ordered window of prices for the active instrument
///
/// Holds at most `capacity` entries; pushing onto a full buffer evicts the
/// oldest price.
#[derive(Debug, Clone)]
pub struct TickBuffer {
    prices: VecDeque<Decimal>,
    capacity: usize,
}

impl TickBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TICK_CAPACITY)
    }

    /// Create a buffer holding at most `capacity` prices (minimum 1)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            prices: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a price, evicting the oldest entry when full
    pub fn push(&mut self, price: Decimal) {
        if self.prices.len() == self.capacity {
            self.prices.pop_front();
        }
        self.prices.push_back(price);
    }

    /// Copy of the buffered prices, most recent last
    pub fn snapshot(&self) -> Vec<Decimal> {
        self.prices.iter().copied().collect()
    }

    pub fn latest(&self) -> Option<Decimal> {
        self.prices.back().copied()
    }

    pub fn clear(&mut self) {
        self.prices.clear();
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for TickBuffer {
    fn default() -> Self {
        Self::new()
    }
}
