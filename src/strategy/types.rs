use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Closed set of last-digit patterns the engine knows how to detect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PatternType {
    OddEven,
    MatchDiffer,
    OverUnder,
}

impl PatternType {
    /// All pattern types, in display order
    pub const ALL: [PatternType; 3] = [
        PatternType::OddEven,
        PatternType::MatchDiffer,
        PatternType::OverUnder,
    ];

    /// Human readable description of what the detector watches for
    pub fn description(&self) -> &'static str {
        match self {
            PatternType::OddEven => "Monitors even digits (2,4,6,8) occurring twice in sequence",
            PatternType::MatchDiffer => "Tracks repeating digits (e.g., 3-3-3) or alternating patterns",
            PatternType::OverUnder => "Analyzes digits falling under 5 (0-4) or over 5 (5-9)",
        }
    }
}

impl std::fmt::Display for PatternType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternType::OddEven => write!(f, "OddEven"),
            PatternType::MatchDiffer => write!(f, "MatchDiffer"),
            PatternType::OverUnder => write!(f, "OverUnder"),
        }
    }
}

impl std::str::FromStr for PatternType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['_', '-'], "").as_str() {
            "oddeven" => Ok(PatternType::OddEven),
            "matchdiffer" => Ok(PatternType::MatchDiffer),
            "overunder" => Ok(PatternType::OverUnder),
            other => Err(format!("unknown pattern type: {}", other)),
        }
    }
}

/// Predicted direction of the next move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "Up"),
            Direction::Down => write!(f, "Down"),
        }
    }
}

/// One detector firing on one evaluation
///
/// Immutable; produced fresh by every engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSignal {
    pub pattern: PatternType,
    /// Trailing digits the signal was reported against, oldest first
    pub last_digits: Vec<u8>,
    pub prediction: Direction,
    /// Confidence in [0, 1]
    pub confidence: f64,
}

impl PatternSignal {
    pub fn new(pattern: PatternType, last_digits: Vec<u8>, prediction: Direction, confidence: f64) -> Self {
        Self {
            pattern,
            last_digits,
            prediction,
            confidence,
        }
    }

    /// Label used on the resulting trade, e.g. `Up on OddEven`
    pub fn label(&self) -> String {
        format!("{} on {}", self.prediction, self.pattern)
    }
}

/// Signals produced by one engine run, stamped with the evaluation time
#[derive(Debug, Clone)]
pub struct SignalBatch {
    pub evaluated_at: DateTime<Utc>,
    pub signals: Vec<PatternSignal>,
}

/// Status of a placed trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    Open,
    Closed,
}

/// A trade accepted by the broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub pattern: PatternType,
    pub status: TradeStatus,
    pub entry_time: DateTime<Utc>,
    pub last_digits: Vec<u8>,
    pub prediction: String,
    pub stake: Decimal,
    pub profit_loss: Decimal,
}

impl Trade {
    /// Build an open trade for `signal`
    pub fn open(id: impl Into<String>, signal: &PatternSignal, stake: Decimal) -> Self {
        Self {
            id: id.into(),
            pattern: signal.pattern,
            status: TradeStatus::Open,
            entry_time: Utc::now(),
            last_digits: signal.last_digits.clone(),
            prediction: signal.label(),
            stake,
            profit_loss: Decimal::ZERO,
        }
    }
}

/// Running per-pattern statistics kept by the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct PatternStats {
    pub pattern: PatternType,
    pub active: bool,
    /// Number of trades placed off this pattern
    pub matches: u64,
    pub last_update: DateTime<Utc>,
}

impl PatternStats {
    pub fn new(pattern: PatternType, active: bool) -> Self {
        Self {
            pattern,
            active,
            matches: 0,
            last_update: Utc::now(),
        }
    }
}
