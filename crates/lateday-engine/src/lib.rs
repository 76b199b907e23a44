//! The late-day cache engine.
//!
//! Ties a [`FactSource`](lateday_core::facts::FactSource) and a
//! [`CacheStore`](lateday_core::cache::CacheStore) together behind
//! [`LateDayEngine`]: synchronous invalidation on every upstream mutation,
//! single-flight bulk recompute with an observable running/idle status, and
//! the bulk summary read model.
//!
//! # Usage
//!
//! ```rust,ignore
//! let engine = LateDayEngine::new(ledger.clone(), MemoryCache::new(), EngineConfig::default());
//! engine.notify_mutation(&ledger.set_extension(student, gradeable, 2)).await?;
//! engine.recompute_all().await?;
//! let summary = engine.summary().await?;
//! ```

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod memory_cache;
pub mod report;
pub mod summary;

pub use config::EngineConfig;
pub use coordinator::{RecomputeJob, RecomputeOutcome, RecomputeStatus};
pub use engine::LateDayEngine;
pub use error::EngineError;
pub use memory_cache::MemoryCache;
pub use report::{DiagnosticKind, PairDiagnostic, RecomputeReport};
pub use summary::{BulkSummary, SummaryColumn, SummaryRow};
