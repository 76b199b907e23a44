//! Operator configuration, read from `config.toml` and `LATEDAY_*`
//! environment variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use lateday_engine::EngineConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
  /// SQLite cache file. The cache lives in memory for the run when unset.
  #[serde(default)]
  pub cache_path:      Option<PathBuf>,
  #[serde(default = "default_max_concurrency")]
  pub max_concurrency: usize,
}

fn default_max_concurrency() -> usize { EngineConfig::default().max_concurrency }

impl CliConfig {
  /// Layer the optional file at `path` under the environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("LATEDAY"))
      .build()
      .context("failed to read config file")?;

    let mut cfg: Self = settings
      .try_deserialize()
      .context("failed to deserialise CliConfig")?;
    cfg.cache_path = cfg.cache_path.as_deref().map(expand_tilde);
    Ok(cfg)
  }

  pub fn engine(&self) -> EngineConfig {
    EngineConfig { max_concurrency: self.max_concurrency }
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(raw: &str) -> CliConfig {
    config::Config::builder()
      .add_source(config::File::from_str(raw, config::FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }

  #[test]
  fn empty_file_uses_defaults() {
    let cfg = parse("");
    assert_eq!(cfg.cache_path, None);
    assert_eq!(cfg.engine().max_concurrency, 8);
  }

  #[test]
  fn reads_cache_path_and_concurrency() {
    let cfg = parse("cache_path = \"/var/lib/lateday/cache.db\"\nmax_concurrency = 2\n");
    assert_eq!(cfg.cache_path, Some(PathBuf::from("/var/lib/lateday/cache.db")));
    assert_eq!(cfg.engine().max_concurrency, 2);
  }

  #[test]
  fn missing_file_is_not_an_error() {
    let cfg = CliConfig::load(Path::new("/nonexistent/lateday.toml")).unwrap();
    assert!(cfg.max_concurrency > 0);
  }

  #[test]
  fn relative_paths_are_left_alone() {
    assert_eq!(expand_tilde(Path::new("cache.db")), PathBuf::from("cache.db"));
    assert_eq!(expand_tilde(Path::new("/tmp/~/x")), PathBuf::from("/tmp/~/x"));
  }
}
