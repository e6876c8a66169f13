//! Bolão closure engine — entry point.
//!
//! Loads configuration, initialises structured logging, reads the
//! closure input document handed over by the surrounding service, and
//! runs the closure against the configured database.

use anyhow::{Context, Result};
use tracing::{info, warn};

use bolao::closure::{self, ClosureInput};
use bolao::config::AppConfig;
use bolao::storage::Storage;
use bolao::types::BolaoError;

const BANNER: &str = r#"
  ____   ___  _        _    ___
 | __ ) / _ \| |      / \  / _ \
 |  _ \| | | | |     / _ \| | | |
 | |_) | |_| | |___ / ___ \ |_| |
 |____/ \___/|_____/_/   \_\___/

  Pooled-lottery closure engine
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load("config.toml")?;
    init_logging();

    println!("{BANNER}");
    info!(
        pool_id = %cfg.pool.id,
        pool_name = %cfg.pool.name,
        quota = %cfg.pool.quota_value,
        "Closure engine starting"
    );

    let input_path = std::env::args()
        .nth(1)
        .context("Usage: bolao <closure-input.json>")?;
    let raw = std::fs::read_to_string(&input_path)
        .with_context(|| format!("Failed to read closure input: {input_path}"))?;
    let mut input: ClosureInput =
        serde_json::from_str(&raw).context("Failed to parse closure input")?;

    // The service layer may omit the level table; fall back to config.
    if input.levels.is_empty() {
        input.levels = cfg.ticket_levels();
    }

    let storage = Storage::connect(&cfg.database.url).await?;
    storage.migrate().await?;
    if let Err(BolaoError::PoolNotFound(_)) = storage.fetch_status(&input.pool_id).await {
        storage.create_pool(&input.pool_id, &cfg.pool.name).await?;
    }

    let mut rng = rand::thread_rng();
    match closure::close_pool(&storage, &input, &mut rng).await {
        Ok(outcome) => {
            println!("Allocation: {}", outcome.record.allocation);
            for (wager, report) in outcome.record.wagers.iter().zip(&outcome.quality) {
                println!("  {wager}  quality={}", report.score);
            }
            println!("Fingerprint: {}", outcome.fingerprint);
        }
        Err(e @ BolaoError::InsufficientFunds { .. }) => {
            // Non-fatal to the caller: surface the breakdown and leave
            // the pool open.
            warn!(error = %e, "Closure aborted");
            println!("{e}");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bolao=info"));

    let json_logging = std::env::var("BOLAO_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        fmt().with_env_filter(env_filter).with_target(true).init();
    }
}
