//! Strategy module for trade decision making
//!
//! Turns the recent tick history into trade decisions.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 CONNECTION (push handler)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TickBuffer                                                 │
//! │    - Last N prices for the active symbol (N = 20)           │
//! │    - Oldest evicted first                                   │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  ORCHESTRATOR (interval)                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  MarketSnapshot                                             │
//! │       │                                                     │
//! │       ▼                                                     │
//! │  PatternEngine.analyze() → 0..3 PatternSignals              │
//! │       │                                                     │
//! │       ▼ (enabled && confidence > threshold)                 │
//! │  StakeSizer.stake(balance) → TradePlacer.place_trade()      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TickBuffer`]: Bounded FIFO of recent prices
//! - [`PatternDetector`]: Trait for one last-digit pattern
//! - [`PatternEngine`]: Runs every detector over a [`DigitWindow`]
//! - [`StakeSizer`]: Maps balance to stake
//! - [`Orchestrator`]: Periodic evaluate-and-trade loop

pub mod orchestrator;
pub mod patterns;
pub mod size_calculator;
pub mod tick_buffer;
pub mod traits;
pub mod types;

pub use orchestrator::{select_signals, CycleOutcome, Orchestrator, OrchestratorConfig, SkipReason};

pub use patterns::{
    last_digit, DigitWindow, MatchDifferDetector, OddEvenDetector, OverUnderDetector,
    PatternEngine,
};

pub use size_calculator::{stake_amount, BoxedStakeSizer, PercentOfBalance, StakeSizer};

pub use tick_buffer::{TickBuffer, DEFAULT_TICK_CAPACITY};

pub use traits::{BoxedDetector, PatternDetector};

pub use types::{
    Direction, PatternSignal, PatternStats, PatternType, SignalBatch, Trade, TradeStatus,
};
