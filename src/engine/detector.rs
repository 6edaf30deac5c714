//! Threshold and dedup policy applied to spread evaluations.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::DetectorConfig;
use crate::domain::{Opportunity, opportunity_id};

use super::evaluator::Evaluation;

/// Default minimum spread in percent.
const DEFAULT_MIN_SPREAD_PERCENT: f64 = 0.5;

/// Default notional used for potential profit.
const DEFAULT_REFERENCE_VOLUME: f64 = 0.1;

/// Default spread change (percentage points) that re-emits a known pair.
const DEFAULT_SPREAD_DELTA: f64 = 0.1;

/// Default id bucket width.
const DEFAULT_ID_BUCKET: Duration = Duration::from_secs(1);

/// Suppression rule for repeated signals of the same venue pair.
#[derive(Debug, Clone, PartialEq)]
pub struct DedupPolicy {
    /// Zero means "while the pair stays the extreme pair".
    pub window: Duration,
    /// Spread moves larger than this (in percentage points) are re-emitted.
    pub spread_delta: f64,
}

/// Resolved detector settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    pub min_spread_percent: f64,
    pub reference_volume: f64,
    pub dedup: DedupPolicy,
    pub id_bucket: Duration,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            min_spread_percent: DEFAULT_MIN_SPREAD_PERCENT,
            reference_volume: DEFAULT_REFERENCE_VOLUME,
            dedup: DedupPolicy {
                window: Duration::ZERO,
                spread_delta: DEFAULT_SPREAD_DELTA,
            },
            id_bucket: DEFAULT_ID_BUCKET,
        }
    }
}

impl DetectorSettings {
    /// Builds settings from the optional config section, filling defaults.
    pub fn from_config(config: Option<&DetectorConfig>) -> Self {
        let defaults = Self::default();
        let Some(config) = config else {
            return defaults;
        };

        Self {
            min_spread_percent: config
                .min_spread_percent
                .unwrap_or(defaults.min_spread_percent),
            reference_volume: config
                .reference_volume
                .unwrap_or(defaults.reference_volume),
            dedup: DedupPolicy {
                window: config.dedup_window,
                spread_delta: config
                    .spread_delta
                    .unwrap_or(defaults.dedup.spread_delta),
            },
            id_bucket: if config.id_bucket.is_zero() {
                defaults.id_bucket
            } else {
                config.id_bucket
            },
        }
    }
}

/// What the detector did with one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// A new opportunity should be appended and broadcast.
    Emit(Opportunity),
    /// Spread under the configured minimum.
    BelowThreshold,
    /// Same pair already emitted with a near-identical spread.
    Suppressed,
    /// Fewer than two venues quoted the instrument.
    InsufficientVenues,
}

/// (instrument, buy venue, sell venue)
type PairKey = (String, String, String);

/// Last emission of one venue pair, the dedup baseline.
#[derive(Debug, Clone)]
struct Emitted {
    spread_percent: f64,
    at: DateTime<Utc>,
}

/// Detector turns evaluations into opportunities.
#[derive(Debug)]
pub struct Detector {
    settings: DetectorSettings,
    last_emitted: HashMap<PairKey, Emitted>,
}

impl Detector {
    pub fn new(settings: DetectorSettings) -> Self {
        Self {
            settings,
            last_emitted: HashMap::new(),
        }
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    /// Applies threshold and dedup policy to the evaluation of `instrument`.
    ///
    /// `now` is the observation time of the quote that triggered the
    /// evaluation and becomes the opportunity's `detected_at`.
    pub fn on_evaluation(
        &mut self,
        instrument: &str,
        evaluation: Option<Evaluation>,
        now: DateTime<Utc>,
    ) -> Decision {
        let Some(eval) = evaluation else {
            return Decision::InsufficientVenues;
        };

        if eval.spread_percent < self.settings.min_spread_percent {
            // The episode is over; the next crossing is a fresh signal
            self.forget_instrument(instrument);
            return Decision::BelowThreshold;
        }

        let key = (
            instrument.to_string(),
            eval.buy_venue.clone(),
            eval.sell_venue.clone(),
        );

        if let Some(last) = self.last_emitted.get(&key) {
            if self.is_repeat(last, &eval, now) {
                debug!(
                    instrument = %instrument,
                    buy = %eval.buy_venue,
                    sell = %eval.sell_venue,
                    spread = eval.spread_percent,
                    "Suppressed repeated opportunity"
                );
                return Decision::Suppressed;
            }
        }

        let opportunity = Opportunity {
            id: opportunity_id(
                instrument,
                &eval.buy_venue,
                &eval.sell_venue,
                now,
                self.settings.id_bucket,
            ),
            instrument: instrument.to_string(),
            buy_venue: eval.buy_venue.clone(),
            sell_venue: eval.sell_venue.clone(),
            buy_price: eval.buy_price,
            sell_price: eval.sell_price,
            spread_percent: eval.spread_percent,
            potential_profit: eval.potential_profit,
            detected_at: now,
        };

        if self.settings.dedup.window.is_zero() {
            // Without a window the episode lasts while the pair stays extreme
            self.forget_instrument(instrument);
        }
        self.last_emitted.insert(
            key,
            Emitted {
                spread_percent: eval.spread_percent,
                at: now,
            },
        );

        Decision::Emit(opportunity)
    }

    fn forget_instrument(&mut self, instrument: &str) {
        self.last_emitted.retain(|(i, _, _), _| i != instrument);
    }

    fn is_repeat(&self, last: &Emitted, eval: &Evaluation, now: DateTime<Utc>) -> bool {
        let policy = &self.settings.dedup;

        if (eval.spread_percent - last.spread_percent).abs() > policy.spread_delta {
            return false;
        }

        if policy.window.is_zero() {
            return true;
        }

        // Clock going backwards across venues counts as inside the window
        match (now - last.at).to_std() {
            Ok(elapsed) => elapsed < policy.window,
            Err(_) => true,
        }
    }
}
