//! Consensus aggregator: one concurrent round of guarded calls per symbol.
//!
//! Every enabled source gets its own task on a `JoinSet`, bounded by an
//! in-flight semaphore and a per-source deadline. Whatever completes before
//! the round deadline is reconciled by [`calculator::compute`]; anything
//! still running is aborted and recorded as cancelled. Cancellation drops the
//! source's circuit permit unsettled, so it never counts as a failure.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::calculator::{self, ConsensusConfig, WeightedReading};
use crate::errors::MarketDataError;
use crate::models::source::duration_secs;
use crate::models::ConsensusResult;
use crate::registry::{
    RetryExecutor, RetryOutcome, RoundDiagnostics, SourceOutcome, SourceRegistry,
};

/// Default overall deadline for one round.
pub const DEFAULT_ROUND_DEADLINE: Duration = Duration::from_secs(15);

/// Scheduling limits for a round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoundConfig {
    /// Overall deadline after which pending sources are abandoned.
    #[serde(rename = "roundDeadlineSecs", with = "duration_secs")]
    pub round_deadline: Duration,
    /// Maximum concurrent source calls; `None` means one per enabled source.
    pub max_in_flight: Option<usize>,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            round_deadline: DEFAULT_ROUND_DEADLINE,
            max_in_flight: None,
        }
    }
}

/// Result of one round plus what happened to each source.
#[derive(Debug)]
pub struct RoundOutcome {
    pub result: Result<ConsensusResult, MarketDataError>,
    pub diagnostics: RoundDiagnostics,
}

/// Fans a symbol out to every enabled source and reconciles the answers.
pub struct ConsensusAggregator {
    registry: Arc<SourceRegistry>,
    executor: Arc<RetryExecutor>,
    consensus: ConsensusConfig,
    round: RoundConfig,
}

impl ConsensusAggregator {
    pub fn new(
        registry: Arc<SourceRegistry>,
        executor: RetryExecutor,
        consensus: ConsensusConfig,
        round: RoundConfig,
    ) -> Self {
        Self {
            registry,
            executor: Arc::new(executor),
            consensus,
            round,
        }
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    /// Per-source budget: all attempts and backoffs, capped by the round.
    pub fn per_source_deadline(&self) -> Duration {
        self.executor
            .policy()
            .max_elapsed()
            .min(self.round.round_deadline)
    }

    /// Run one consensus round for an already-validated symbol.
    pub async fn run_round(&self, symbol: &str) -> RoundOutcome {
        let mut diagnostics = RoundDiagnostics::new();

        for entry in self.registry.entries().iter().filter(|e| !e.is_enabled()) {
            if let Some(reason) = entry.disabled_reason() {
                diagnostics.record_skip(entry.name().to_string(), reason.clone());
            }
        }

        let enabled = self.registry.enabled_sources();
        if enabled.is_empty() {
            warn!("No enabled sources for {}", symbol);
            diagnostics.sort();
            return RoundOutcome {
                result: Err(MarketDataError::ConsensusUnavailable {
                    symbol: symbol.to_string(),
                    detail: diagnostics.unavailable_summary(),
                }),
                diagnostics,
            };
        }

        let permits = self.round.max_in_flight.unwrap_or(enabled.len()).max(1);
        let semaphore = Arc::new(Semaphore::new(permits));
        let per_source_deadline = self.per_source_deadline();
        let now = Instant::now();
        let round_deadline = now
            .checked_add(self.round.round_deadline)
            .or_else(|| now.checked_add(per_source_deadline))
            .unwrap_or(now);

        let mut tasks: JoinSet<(String, f64, Option<RetryOutcome>)> = JoinSet::new();
        let mut task_sources: HashMap<tokio::task::Id, String> = HashMap::with_capacity(enabled.len());
        for entry in &enabled {
            let source_name = entry.name().to_string();
            let entry = Arc::clone(entry);
            let executor = Arc::clone(&self.executor);
            let semaphore = Arc::clone(&semaphore);
            let symbol = symbol.to_string();

            let handle = tasks.spawn(async move {
                let name = entry.name().to_string();
                let weight = entry.weight();
                // acquire only errs on a closed semaphore
                let Ok(_slot) = semaphore.acquire_owned().await else {
                    return (name, weight, None);
                };
                let outcome = tokio::time::timeout(per_source_deadline, executor.execute(&entry, &symbol))
                    .await
                    .ok();
                (name, weight, outcome)
            });
            task_sources.insert(handle.id(), source_name);
        }

        let mut readings: Vec<WeightedReading> = Vec::with_capacity(enabled.len());
        let mut finished: HashSet<String> = HashSet::with_capacity(enabled.len());
        let mut deadline_hit = false;

        loop {
            match tokio::time::timeout_at(round_deadline, tasks.join_next()).await {
                Ok(Some(Ok((name, weight, outcome)))) => {
                    finished.insert(name.clone());
                    self.collect(&name, weight, outcome, &mut readings, &mut diagnostics);
                }
                Ok(Some(Err(join_error))) => {
                    let Some(name) = task_sources.get(&join_error.id()).cloned() else {
                        warn!("Unknown source task for {} ended abnormally: {}", symbol, join_error);
                        continue;
                    };
                    warn!("Source task '{}' for {} ended abnormally: {}", name, symbol, join_error);
                    finished.insert(name.clone());
                    diagnostics.record(
                        name.clone(),
                        SourceOutcome::Failed {
                            error: MarketDataError::TaskFailed {
                                source_name: name,
                                message: join_error.to_string(),
                            },
                            attempts: 1,
                        },
                    );
                }
                Ok(None) => break,
                Err(_) => {
                    deadline_hit = true;
                    break;
                }
            }
        }

        if deadline_hit {
            debug!(
                "Round deadline reached for {}, aborting {} pending sources",
                symbol,
                tasks.len()
            );
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }

        for entry in &enabled {
            if !finished.contains(entry.name()) {
                diagnostics.record_cancelled(entry.name().to_string());
            }
        }
        diagnostics.sort();

        let result = calculator::compute(symbol, &readings, enabled.len(), &self.consensus, Utc::now())
            .map_err(|e| match e {
                MarketDataError::ConsensusUnavailable { symbol, .. } => {
                    MarketDataError::ConsensusUnavailable {
                        symbol,
                        detail: diagnostics.unavailable_summary(),
                    }
                }
                other => other,
            });

        match &result {
            Ok(consensus) => info!(
                "Consensus for {}: {:?} {:?} from {}/{} sources ({})",
                symbol,
                consensus.quality,
                consensus.confidence,
                consensus.sources_used.len(),
                enabled.len(),
                diagnostics.summary()
            ),
            Err(e) => warn!("Consensus round failed for {}: {}", symbol, e),
        }

        RoundOutcome { result, diagnostics }
    }

    fn collect(
        &self,
        name: &str,
        weight: f64,
        outcome: Option<RetryOutcome>,
        readings: &mut Vec<WeightedReading>,
        diagnostics: &mut RoundDiagnostics,
    ) {
        let Some(RetryOutcome { result, attempts, .. }) = outcome else {
            diagnostics.record(
                name.to_string(),
                SourceOutcome::Failed {
                    error: MarketDataError::Timeout {
                        source_name: name.to_string(),
                    },
                    attempts: 0,
                },
            );
            return;
        };

        match result {
            Ok(mut reading) => {
                reading.source_name = name.to_string();
                match WeightedReading::new(reading, weight) {
                    Ok(weighted) => {
                        readings.push(weighted);
                        diagnostics.record_success(name.to_string(), attempts);
                    }
                    Err(error) => diagnostics.record(name.to_string(), SourceOutcome::Failed { error, attempts }),
                }
            }
            Err(error) => {
                debug!("Source '{}' did not contribute: {}", name, error);
                diagnostics.record(name.to_string(), SourceOutcome::from_error(error, attempts));
            }
        }
    }
}
