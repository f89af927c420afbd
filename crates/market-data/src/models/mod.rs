//! Market data models
//!
//! This module contains the core data types for consensus operations:
//! - `types` - Type aliases for common identifiers (SourceName)
//! - `cache_entry` - Last-known-good answer for a symbol (CacheEntry)
//! - `source` - Static per-source configuration (SourceConfig, RateLimitSpec)
//! - `reading` - One source's normalized answer (Reading)
//! - `consensus` - The reconciled answer and its labels (ConsensusResult, Confidence, Quality)
//! - `data_class` - Symbol classification used for cache TTLs (DataClass)
//! - `status` - Per-source introspection for dashboards (SourceStatus)

mod cache_entry;
mod consensus;
mod data_class;
mod reading;
pub(crate) mod source;
mod status;
mod types;

pub use cache_entry::CacheEntry;
pub use consensus::{Confidence, ConsensusResult, Quality};
pub use data_class::DataClass;
pub use reading::Reading;
pub use source::{RateLimitSpec, SourceConfig, DEFAULT_PRIORITY, DEFAULT_WEIGHT};
pub use status::SourceStatus;
pub use types::SourceName;
