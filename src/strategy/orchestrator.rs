//! Periodic evaluate-and-trade loop
//!
//! Every cycle reads one [`MarketSnapshot`](crate::common::types::MarketSnapshot),
//! runs the pattern engine over the buffered prices, sizes a stake from the
//! balance and hands qualifying signals to the trade placer. The loop only
//! ever reads connection state; the connection is mutated through its own
//! operations.

use chrono::Utc;
use futures_util::future::join_all;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use super::patterns::{PatternEngine, MIN_DIGITS};
use super::size_calculator::{BoxedStakeSizer, PercentOfBalance};
use super::types::{PatternSignal, PatternStats, PatternType, SignalBatch, Trade};
use crate::common::traits::{MarketClient, TradePlacer};
use crate::config::types::EngineConfig;

/// Orchestrator tuning
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub interval: Duration,
    /// Signals must be strictly more confident than this
    pub confidence_threshold: f64,
    pub enabled_patterns: Vec<PatternType>,
    pub max_trades_per_cycle: Option<usize>,
    pub skip_non_positive_balance: bool,
    /// Fraction of the balance staked per trade
    pub stake_fraction: Decimal,
    pub min_stake: Decimal,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_engine_config(&EngineConfig::default())
    }
}

impl OrchestratorConfig {
    pub fn from_engine_config(config: &EngineConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.evaluation_interval_ms),
            confidence_threshold: config.confidence_threshold,
            enabled_patterns: config.enabled_patterns.clone(),
            max_trades_per_cycle: config.max_trades_per_cycle,
            skip_non_positive_balance: config.skip_non_positive_balance,
            stake_fraction: config.stake_fraction,
            min_stake: config.min_stake,
        }
    }
}

/// Why a cycle did not evaluate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotAuthorized,
    TicksNotLive,
    NotEnoughTicks(usize),
    NonPositiveBalance,
}

/// Result of one cycle
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Skipped(SkipReason),
    Evaluated {
        signals: usize,
        accepted: usize,
        placed: Vec<Trade>,
    },
}

/// Keep enabled signals above the threshold, most confident first when capped
pub fn select_signals(
    signals: Vec<PatternSignal>,
    enabled: &HashSet<PatternType>,
    threshold: f64,
    cap: Option<usize>,
) -> Vec<PatternSignal> {
    let mut accepted: Vec<PatternSignal> = signals
        .into_iter()
        .filter(|s| enabled.contains(&s.pattern) && s.confidence > threshold)
        .collect();

    if let Some(cap) = cap {
        // Stable sort keeps detector order among equal confidences
        accepted.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        accepted.truncate(cap);
    }
    accepted
}

pub struct Orchestrator {
    client: Arc<dyn MarketClient>,
    placer: Arc<dyn TradePlacer>,
    engine: PatternEngine,
    sizer: BoxedStakeSizer,
    config: OrchestratorConfig,
    enabled: RwLock<HashSet<PatternType>>,
    trades: RwLock<Vec<Trade>>,
    stats: RwLock<HashMap<PatternType, PatternStats>>,
}

impl Orchestrator {
    pub fn new(
        client: Arc<dyn MarketClient>,
        placer: Arc<dyn TradePlacer>,
        config: OrchestratorConfig,
    ) -> Self {
        let sizer = PercentOfBalance::new(config.stake_fraction, config.min_stake);
        Self::with_parts(client, placer, PatternEngine::new(), Box::new(sizer), config)
    }

    pub fn with_parts(
        client: Arc<dyn MarketClient>,
        placer: Arc<dyn TradePlacer>,
        engine: PatternEngine,
        sizer: BoxedStakeSizer,
        config: OrchestratorConfig,
    ) -> Self {
        let enabled: HashSet<PatternType> = config.enabled_patterns.iter().copied().collect();
        let stats = PatternType::ALL
            .iter()
            .map(|p| (*p, PatternStats::new(*p, enabled.contains(p))))
            .collect();

        Self {
            client,
            placer,
            engine,
            sizer,
            config,
            enabled: RwLock::new(enabled),
            trades: RwLock::new(Vec::new()),
            stats: RwLock::new(stats),
        }
    }

    /// Run cycles until `shutdown` turns true or its sender is dropped
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_ms = self.config.interval.as_millis() as u64, "Trading loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_cycle().await {
                        CycleOutcome::Skipped(reason) => debug!(?reason, "Cycle skipped"),
                        CycleOutcome::Evaluated { signals, accepted, placed } => {
                            debug!(signals, accepted, placed = placed.len(), "Cycle complete");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Trading loop stopped");
    }

    /// Evaluate once and place whatever qualifies
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> CycleOutcome {
        let snapshot = self.client.snapshot().await;

        if !snapshot.authorized {
            return CycleOutcome::Skipped(SkipReason::NotAuthorized);
        }
        if !snapshot.ticks_live {
            return CycleOutcome::Skipped(SkipReason::TicksNotLive);
        }
        if snapshot.ticks.len() < MIN_DIGITS {
            return CycleOutcome::Skipped(SkipReason::NotEnoughTicks(snapshot.ticks.len()));
        }
        if self.config.skip_non_positive_balance && snapshot.balance <= Decimal::ZERO {
            return CycleOutcome::Skipped(SkipReason::NonPositiveBalance);
        }

        let batch = SignalBatch {
            evaluated_at: Utc::now(),
            signals: self.engine.analyze(&snapshot.ticks),
        };
        let signals = batch.signals.len();
        let stake = self.sizer.stake(snapshot.balance);

        let accepted = {
            let enabled = self.enabled.read().await;
            select_signals(
                batch.signals,
                &enabled,
                self.config.confidence_threshold,
                self.config.max_trades_per_cycle,
            )
        };
        let accepted_count = accepted.len();

        if accepted.is_empty() {
            return CycleOutcome::Evaluated {
                signals,
                accepted: 0,
                placed: Vec::new(),
            };
        }

        info!(
            symbol = %snapshot.symbol,
            %stake,
            accepted = accepted_count,
            "Placing trades"
        );

        let results = join_all(
            accepted
                .iter()
                .map(|signal| self.placer.place_trade(signal, stake)),
        )
        .await;

        let placed: Vec<Trade> = results.into_iter().flatten().collect();
        if placed.len() < accepted_count {
            warn!(
                failed = accepted_count - placed.len(),
                "Some trades were not placed"
            );
        }
        self.record(&placed, batch.evaluated_at).await;

        CycleOutcome::Evaluated {
            signals,
            accepted: accepted_count,
            placed,
        }
    }

    async fn record(&self, placed: &[Trade], at: chrono::DateTime<Utc>) {
        if placed.is_empty() {
            return;
        }

        let mut stats = self.stats.write().await;
        for trade in placed {
            if let Some(entry) = stats.get_mut(&trade.pattern) {
                entry.matches += 1;
                entry.last_update = at;
            }
        }
        drop(stats);

        self.trades.write().await.extend_from_slice(placed);
    }

    /// Enable or disable trading on a pattern type
    pub async fn set_pattern_enabled(&self, pattern: PatternType, enabled: bool) {
        {
            let mut set = self.enabled.write().await;
            if enabled {
                set.insert(pattern);
            } else {
                set.remove(&pattern);
            }
        }
        if let Some(entry) = self.stats.write().await.get_mut(&pattern) {
            entry.active = enabled;
            entry.last_update = Utc::now();
        }
        info!(%pattern, enabled, "Pattern toggled");
    }

    pub async fn enabled_patterns(&self) -> Vec<PatternType> {
        let enabled = self.enabled.read().await;
        PatternType::ALL
            .iter()
            .copied()
            .filter(|p| enabled.contains(p))
            .collect()
    }

    /// Trades placed so far, oldest first
    pub async fn trades(&self) -> Vec<Trade> {
        self.trades.read().await.clone()
    }

    /// Per-pattern statistics in display order
    pub async fn pattern_stats(&self) -> Vec<PatternStats> {
        let stats = self.stats.read().await;
        PatternType::ALL
            .iter()
            .filter_map(|p| stats.get(p).cloned())
            .collect()
    }
}
