use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Default fraction of the balance staked per trade
pub const DEFAULT_STAKE_FRACTION: Decimal = dec!(0.01);

/// Default floor stake in account currency units
pub const DEFAULT_MIN_STAKE: Decimal = dec!(1);

/// Maps the current balance to a trade size
///
/// Sizers are pure and total: every balance, including zero or negative,
/// maps to a positive stake. Callers that must not trade on an empty account
/// check the balance themselves.
pub trait StakeSizer: Send + Sync {
    /// Stake for a trade given the current balance
    fn stake(&self, balance: Decimal) -> Decimal;
}

/// Fixed percentage of balance, rounded to cents, with a floor
#[derive(Debug, Clone)]
pub struct PercentOfBalance {
    /// Fraction of the balance (e.g., 0.01 = 1%)
    pub fraction: Decimal,
    /// Minimum stake returned regardless of balance
    pub min_stake: Decimal,
}

impl PercentOfBalance {
    pub fn new(fraction: Decimal, min_stake: Decimal) -> Self {
        Self {
            fraction,
            min_stake,
        }
    }
}

impl Default for PercentOfBalance {
    fn default() -> Self {
        Self::new(DEFAULT_STAKE_FRACTION, DEFAULT_MIN_STAKE)
    }
}

impl StakeSizer for PercentOfBalance {
    fn stake(&self, balance: Decimal) -> Decimal {
        let stake = (balance * self.fraction)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        stake.max(self.min_stake)
    }
}

/// `max(1, round(balance * 0.01, 2))`
pub fn stake_amount(balance: Decimal) -> Decimal {
    PercentOfBalance::default().stake(balance)
}

/// Boxed stake sizer for dynamic dispatch
pub type BoxedStakeSizer = Box<dyn StakeSizer>;
