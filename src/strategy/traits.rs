use crate::strategy::patterns::DigitWindow;
use crate::strategy::types::{PatternSignal, PatternType};

/// Core detector trait
///
/// A detector inspects the trailing digits of the tick buffer and either
/// fires a signal or stays silent. Detectors are pure: no interior state,
/// no randomness, so the same window always yields the same answer.
///
/// # Example
///
/// ```ignore
/// struct AlwaysUp;
///
/// impl PatternDetector for AlwaysUp {
///     fn pattern(&self) -> PatternType { PatternType::OddEven }
///
///     fn detect(&self, window: &DigitWindow) -> Option<PatternSignal> {
///         Some(PatternSignal::new(self.pattern(), window.last3().to_vec(), Direction::Up, 1.0))
///     }
/// }
/// ```
pub trait PatternDetector: Send + Sync {
    /// Pattern type this detector reports
    fn pattern(&self) -> PatternType;

    /// Evaluate the window
    ///
    /// Only called with windows holding at least three digits.
    fn detect(&self, window: &DigitWindow) -> Option<PatternSignal>;
}

/// Boxed detector for dynamic dispatch
pub type BoxedDetector = Box<dyn PatternDetector>;
