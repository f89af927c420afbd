//! Consensus module.
//!
//! - `calculator` - Pure weighted-mean / median / outlier / label rules
//! - `aggregator` - Concurrent per-symbol rounds over the source registry

mod aggregator;
pub mod calculator;

pub use aggregator::{ConsensusAggregator, RoundConfig, RoundOutcome, DEFAULT_ROUND_DEADLINE};
pub use calculator::{
    ConsensusConfig, OutlierPolicy, OutlierReference, WeightedReading,
    DEFAULT_MIN_SOURCES_FOR_HIGH_CONFIDENCE, DEFAULT_OUTLIER_THRESHOLD_PERCENT,
};
