//! Core types and trait definitions for the late-day cache engine.
//!
//! This crate is deliberately free of async runtime and database
//! dependencies. It holds the upstream fact model, the pure late-day
//! calculator, the cache and fact-source abstractions, and the invalidation
//! rule table. Storage backends and the recompute coordinator live in sibling
//! crates.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod cache;
pub mod calculator;
pub mod error;
pub mod facts;
pub mod fixture;
pub mod invalidation;
pub mod memory;
pub mod model;
pub mod timeline;

pub use error::{Error, Result};
