//! ARBSCAN: Cross-platform prediction market arbitrage scanner
//!
//! Entry point. Loads configuration, initialises structured logging,
//! wires the market sources and alert sinks, and runs either a single
//! scan or the periodic scan loop with graceful shutdown.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::time::Duration;
use tracing::{error, info};

use arbscan::config::AppConfig;
use arbscan::engine::scanner::{ArbitrageScanner, ScanReport};

const BANNER: &str = r#"
    _    ____  ____  ____   ____    _    _   _
   / \  |  _ \| __ )/ ___| / ___|  / \  | \ | |
  / _ \ | |_) |  _ \\___ \| |     / _ \ |  \| |
 / ___ \|  _ <| |_) |___) | |___ / ___ \| |\  |
/_/   \_\_| \_\____/|____/ \____/_/   \_\_| \_|

  Cross-platform prediction market arbitrage scanner
  v0.1.0
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Run one scan, print the summary and exit.
    Once,
    /// Scan every `scanner.scan_interval_secs` until Ctrl+C.
    Scheduled,
}

#[derive(Debug, Parser)]
#[command(name = "arbscan", version, about = "Cross-platform prediction market arbitrage scanner")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: String,

    #[arg(long, value_enum, default_value_t = Mode::Once)]
    mode: Mode,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    init_logging();

    let cfg = AppConfig::load(&cli.config)?;

    println!("{BANNER}");
    info!(
        name = %cfg.scanner.name,
        source_a = %cfg.scanner.source_a,
        source_b = %cfg.scanner.source_b,
        threshold = cfg.matching.threshold,
        budget = format!("${:.2}", cfg.arbitrage.total_budget_usd),
        min_profit = format!("${:.2}", cfg.arbitrage.min_profit_usd),
        mode = ?cli.mode,
        "ARBSCAN starting up"
    );

    let mut scanner = ArbitrageScanner::from_config(&cfg)?;

    match cli.mode {
        Mode::Once => {
            let report = scanner.scan().await?;
            print_report(&report);
        }
        Mode::Scheduled => run_scheduled(&mut scanner, cfg.scanner.scan_interval_secs).await,
    }

    info!("ARBSCAN shut down cleanly.");
    Ok(())
}

/// Scan on a fixed interval until Ctrl+C. A failed scan is logged and the
/// loop carries on.
async fn run_scheduled(scanner: &mut ArbitrageScanner, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(interval_secs, "Entering scan loop. Press Ctrl+C to stop.");

    let mut scans: u64 = 0;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                scans += 1;
                match scanner.scan().await {
                    Ok(report) => print_report(&report),
                    Err(e) => error!(scan = scans, error = %e, "Scan failed, continuing to next"),
                }
            }
            _ = &mut shutdown => {
                info!(scans, "Shutdown signal received.");
                break;
            }
        }
    }
}

fn print_report(report: &ScanReport) {
    println!("{report}");
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("arbscan=info"));

    let json_logging = std::env::var("ARBSCAN_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
