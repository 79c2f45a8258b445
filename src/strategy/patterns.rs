//! Last-digit pattern detection
//!
//! Prices are reduced to their least-significant decimal digit; the detectors
//! reason about the trailing five (`last5`) and three (`last3`) digits. All
//! three detectors bet on mean reversion of a short local run.

use rust_decimal::Decimal;

use crate::strategy::traits::{BoxedDetector, PatternDetector};
use crate::strategy::types::{Direction, PatternSignal, PatternType};

/// Fewest digits needed before any detector runs
pub const MIN_DIGITS: usize = 3;

/// Length of the wide trailing window
const WIDE_WINDOW: usize = 5;

/// OverUnder only fires above this trend strength
const TREND_THRESHOLD: f64 = 0.4;

const REPEAT_CONFIDENCE: f64 = 0.85;
const ALTERNATE_CONFIDENCE: f64 = 0.75;
const MATCH_FLOOR_CONFIDENCE: f64 = 0.70;

/// Least-significant decimal digit of a quoted price
///
/// Trailing zeros are not significant: `1234.50` reports `5`, as the quote
/// would be printed `1234.5`.
pub fn last_digit(price: Decimal) -> u8 {
    let normalized = price.normalize();
    (normalized.mantissa().unsigned_abs() % 10) as u8
}

/// Digit view over the tick buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigitWindow {
    digits: Vec<u8>,
}

impl DigitWindow {
    pub fn from_prices(prices: &[Decimal]) -> Self {
        Self {
            digits: prices.iter().copied().map(last_digit).collect(),
        }
    }

    pub fn from_digits(digits: impl Into<Vec<u8>>) -> Self {
        Self {
            digits: digits.into(),
        }
    }

    /// Every digit, same order as the prices
    pub fn digits(&self) -> &[u8] {
        &self.digits
    }

    /// Up to the last five digits
    pub fn last5(&self) -> &[u8] {
        let start = self.digits.len().saturating_sub(WIDE_WINDOW);
        &self.digits[start..]
    }

    /// Up to the last three digits
    pub fn last3(&self) -> &[u8] {
        let last5 = self.last5();
        let start = last5.len().saturating_sub(MIN_DIGITS);
        &last5[start..]
    }

    pub fn len(&self) -> usize {
        self.digits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digits.is_empty()
    }
}

/// Parity of the trailing three digits
///
/// Fires whenever one parity holds at least two of the three digits. An even
/// run predicts `Down`, an odd run predicts `Up`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OddEvenDetector;

impl PatternDetector for OddEvenDetector {
    fn pattern(&self) -> PatternType {
        PatternType::OddEven
    }

    fn detect(&self, window: &DigitWindow) -> Option<PatternSignal> {
        let last3 = window.last3();
        let even_count = last3.iter().filter(|d| *d % 2 == 0).count();
        let odd_count = last3.len() - even_count;

        if even_count < 2 && odd_count < 2 {
            return None;
        }

        let prediction = if even_count >= 2 {
            Direction::Down
        } else {
            Direction::Up
        };
        let confidence = even_count.max(odd_count) as f64 / 3.0;

        Some(PatternSignal::new(
            self.pattern(),
            last3.to_vec(),
            prediction,
            confidence,
        ))
    }
}

/// Repeating or alternating digit runs
///
/// A run of three equal digits anywhere in `last5` (or an all-equal `last3`)
/// predicts `Down` at 0.85; a `d, e, d` alternation predicts `Up` at 0.75.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchDifferDetector;

impl PatternDetector for MatchDifferDetector {
    fn pattern(&self) -> PatternType {
        PatternType::MatchDiffer
    }

    fn detect(&self, window: &DigitWindow) -> Option<PatternSignal> {
        let last5 = window.last5();
        let last3 = window.last3();

        let repeating = last5.windows(3).any(|w| w[0] == w[1] && w[0] == w[2]);
        let alternating = last5.windows(3).any(|w| w[0] == w[2] && w[0] != w[1]);
        let identical = last3.windows(2).all(|w| w[0] == w[1]) && !last3.is_empty();

        if !(repeating || alternating || identical) {
            return None;
        }

        let prediction = if repeating || identical {
            Direction::Down
        } else {
            Direction::Up
        };
        let confidence = if repeating || identical {
            REPEAT_CONFIDENCE
        } else if alternating {
            ALTERNATE_CONFIDENCE
        } else {
            MATCH_FLOOR_CONFIDENCE
        };

        Some(PatternSignal::new(
            self.pattern(),
            last3.to_vec(),
            prediction,
            confidence,
        ))
    }
}

/// High/low digit trend over `last5`
///
/// Trend strength is `|over - under| / 5` with digits `>= 5` counted as over.
/// Fires above 0.4 and predicts against the dominant side.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverUnderDetector;

impl PatternDetector for OverUnderDetector {
    fn pattern(&self) -> PatternType {
        PatternType::OverUnder
    }

    fn detect(&self, window: &DigitWindow) -> Option<PatternSignal> {
        let last5 = window.last5();
        let over_count = last5.iter().filter(|d| **d >= 5).count();
        let under_count = last5.len() - over_count;
        let strength = over_count.abs_diff(under_count) as f64 / WIDE_WINDOW as f64;

        if strength <= TREND_THRESHOLD {
            return None;
        }

        let prediction = if over_count > under_count {
            Direction::Down
        } else {
            Direction::Up
        };

        Some(PatternSignal::new(
            self.pattern(),
            window.last3().to_vec(),
            prediction,
            strength,
        ))
    }
}

/// Runs every detector over the current buffer contents
pub struct PatternEngine {
    detectors: Vec<BoxedDetector>,
}

impl PatternEngine {
    /// Engine with the three built-in detectors
    pub fn new() -> Self {
        Self {
            detectors: vec![
                Box::new(OddEvenDetector),
                Box::new(MatchDifferDetector),
                Box::new(OverUnderDetector),
            ],
        }
    }

    /// Evaluate a price history, oldest first
    pub fn analyze(&self, prices: &[Decimal]) -> Vec<PatternSignal> {
        self.analyze_window(&DigitWindow::from_prices(prices))
    }

    /// Evaluate an already-reduced digit window
    ///
    /// Returns nothing when fewer than three digits are available; otherwise
    /// zero to three signals in detector order.
    pub fn analyze_window(&self, window: &DigitWindow) -> Vec<PatternSignal> {
        if window.len() < MIN_DIGITS {
            return Vec::new();
        }

        self.detectors
            .iter()
            .filter_map(|detector| detector.detect(window))
            .collect()
    }
}

impl Default for PatternEngine {
    fn default() -> Self {
        Self::new()
    }
}
