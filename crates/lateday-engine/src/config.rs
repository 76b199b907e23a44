//! Engine tuning knobs.

use serde::Deserialize;

/// Runtime engine configuration, usually deserialised from the `[engine]`
/// table of `config.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
  /// How many student timelines a recompute pass evaluates at once.
  #[serde(default = "default_max_concurrency")]
  pub max_concurrency: usize,
}

fn default_max_concurrency() -> usize { 8 }

impl Default for EngineConfig {
  fn default() -> Self { Self { max_concurrency: default_max_concurrency() } }
}
