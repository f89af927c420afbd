//! Scriptable adapters shared by the aggregator and service tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use crate::errors::MarketDataError;
use crate::models::{Reading, SourceConfig};
use crate::provider::SourceAdapter;
use crate::registry::{CircuitBreakerConfig, SourceRegistry};

/// Adapter returning a fixed answer after an optional delay.
pub struct MockAdapter {
    name: String,
    answer: Mutex<Result<(Decimal, Decimal), MarketDataError>>,
    delay: Duration,
    panics: bool,
    call_count: AtomicUsize,
}

impl MockAdapter {
    pub fn ok(name: &str, price: Decimal, change_percent: Decimal) -> Arc<Self> {
        Arc::new(Self::new(name, Ok((price, change_percent)), Duration::ZERO))
    }

    pub fn failing(name: &str, error: MarketDataError) -> Arc<Self> {
        Arc::new(Self::new(name, Err(error), Duration::ZERO))
    }

    pub fn slow(name: &str, price: Decimal, change_percent: Decimal, delay: Duration) -> Arc<Self> {
        Arc::new(Self::new(name, Ok((price, change_percent)), delay))
    }

    /// Adapter whose every call panics.
    pub fn panicking(name: &str) -> Arc<Self> {
        let mut adapter = Self::new(name, Ok((Decimal::ONE, Decimal::ZERO)), Duration::ZERO);
        adapter.panics = true;
        Arc::new(adapter)
    }

    fn new(name: &str, answer: Result<(Decimal, Decimal), MarketDataError>, delay: Duration) -> Self {
        Self {
            name: name.to_string(),
            answer: Mutex::new(answer),
            delay,
            panics: false,
            call_count: AtomicUsize::new(0),
        }
    }

    /// Change the answer for subsequent calls.
    pub fn set_answer(&self, answer: Result<(Decimal, Decimal), MarketDataError>) {
        *self.answer.lock().unwrap() = answer;
    }

    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, symbol: &str) -> Result<Reading, MarketDataError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.panics {
            panic!("adapter '{}' blew up", self.name);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let answer = self.answer.lock().unwrap().clone();
        answer.map(|(price, change)| Reading::new(symbol, price, change, Utc::now(), self.name.clone()))
    }
}

pub fn timeout_error(name: &str) -> MarketDataError {
    MarketDataError::Timeout {
        source_name: name.to_string(),
    }
}

pub fn not_found_error(name: &str) -> MarketDataError {
    MarketDataError::SymbolNotFound {
        source_name: name.to_string(),
        symbol: "TEST".to_string(),
    }
}

/// Registry of enabled, credential-free sources with the given weights.
pub fn registry_of(adapters: &[(Arc<MockAdapter>, f64)], breaker: CircuitBreakerConfig) -> SourceRegistry {
    let mut registry = SourceRegistry::new(breaker);
    for (adapter, weight) in adapters {
        registry
            .register_with(
                SourceConfig::new(adapter.name()).with_weight(*weight),
                adapter.clone(),
                |_| None,
            )
            .unwrap();
    }
    registry
}
