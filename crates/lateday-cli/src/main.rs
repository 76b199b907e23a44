//! `lateday` operator binary.
//!
//! Loads a course's facts from a TOML fixture, runs the late-day engine over
//! them and prints the bulk late-days table. The cache is kept in SQLite
//! when `cache_path` is configured, otherwise in memory for the run.
//!
//! ```text
//! lateday --facts course.toml summary
//! lateday --facts course.toml status harbel late_allowed_homework
//! ```

mod render;
mod settings;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use lateday_core::{
  cache::CacheStore,
  fixture::FactFixture,
  memory::MemoryLedger,
  model::{GradeableId, StudentId},
};
use lateday_engine::{LateDayEngine, MemoryCache};
use lateday_store_sqlite::SqliteCache;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::settings::CliConfig;

#[derive(Parser)]
#[command(author, version, about = "Late-day cache engine")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Fact fixture describing students, gradeables and ledgers.
  #[arg(short, long)]
  facts: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Recompute every pair and print the pass report.
  Recompute,
  /// Print the bulk late-days table.
  Summary {
    /// Read the cache as it stands instead of recomputing first.
    #[arg(long)]
    cached: bool,
    /// Emit JSON instead of a text table.
    #[arg(long)]
    json:   bool,
  },
  /// Print the cached entry for one pair.
  Status { student: String, gradeable: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let cfg = CliConfig::load(&cli.config)?;

  let raw = std::fs::read_to_string(&cli.facts)
    .with_context(|| format!("failed to read facts from {:?}", cli.facts))?;
  let fixture = FactFixture::from_toml_str(&raw)
    .with_context(|| format!("failed to parse facts in {:?}", cli.facts))?;
  let ledger = MemoryLedger::from_fixture(fixture);

  match &cfg.cache_path {
    Some(path) => {
      if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
          .with_context(|| format!("failed to create cache directory {dir:?}"))?;
      }
      let cache = SqliteCache::open(path)
        .await
        .with_context(|| format!("failed to open cache at {path:?}"))?;
      run(LateDayEngine::new(ledger, cache, cfg.engine()), cli.command).await
    }
    None => run(LateDayEngine::new(ledger, MemoryCache::new(), cfg.engine()), cli.command).await,
  }
}

async fn run<C: CacheStore + 'static>(
  engine: LateDayEngine<MemoryLedger, C>,
  command: Command,
) -> anyhow::Result<()> {
  match command {
    Command::Recompute => {
      let report = refresh(&engine).await?;
      println!("{}", render::report_line(&report));
      for d in &report.diagnostics {
        println!("  {} / {}: {}", d.key.student, d.key.gradeable, d.message);
      }
    }
    Command::Summary { cached, json } => {
      if !cached {
        refresh(&engine).await?;
      }
      let summary = engine.summary().await.context("failed to build summary")?;
      if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
      } else {
        println!("{}", render::summary_table(&summary));
      }
    }
    Command::Status { student, gradeable } => {
      let entry = engine
        .get(StudentId::new(student), GradeableId::new(gradeable))
        .await
        .context("failed to read cache")?;
      match entry {
        Some(e) => println!(
          "{} ({} days late, {} charged, {} remaining before)",
          e.status, e.days_late, e.days_charged, e.days_remaining
        ),
        None => println!("not computed"),
      }
    }
  }
  Ok(())
}

/// Throw away whatever the cache holds and run a full pass. The fixture may
/// have changed since the cache was written.
async fn refresh<C: CacheStore + 'static>(
  engine: &LateDayEngine<MemoryLedger, C>,
) -> anyhow::Result<std::sync::Arc<lateday_engine::RecomputeReport>> {
  let dropped = engine
    .cache()
    .invalidate_all()
    .await
    .context("failed to clear cache")?;
  tracing::debug!(dropped, "cleared cache before recompute");

  let outcome = engine.recompute_all().await.context("recompute failed")?;
  Ok(outcome.report().clone())
}
