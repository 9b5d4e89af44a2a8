//! daogen - Main entry point.
//!
//! Connects to a MySQL or SQLite database, analyses its tables and views and
//! writes the resulting entity metadata as JSON.

use daogen::config::Config;
use daogen::db::ConnectionPool;
use daogen::generator::Analyser;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    // stdout carries the report, so logs go to stderr
    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse_args();
    init_tracing(&config);

    let db_config = config.database_config()?;
    info!(
        db_type = %db_config.db_type,
        url = %db_config.redacted(),
        "Starting daogen v{}",
        env!("CARGO_PKG_VERSION")
    );

    let pool = ConnectionPool::connect(&db_config).await?;
    let analyser = Analyser::new(pool.clone()).with_tables(config.tables.iter().cloned());
    let result = analyser.run().await;
    pool.close().await;

    let report = match result {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, suggestion = ?e.suggestion(), "Analysis failed");
            return Err(e.into());
        }
    };

    let json = serde_json::to_string_pretty(&report)?;
    match &config.output {
        Some(path) => {
            std::fs::write(path, json + "\n")?;
            info!(path = %path.display(), "Report written");
        }
        None => println!("{}", json),
    }

    if !report.failures.is_empty() {
        warn!(
            skipped = report.failures.len(),
            "Some entities could not be analysed, see `failures` in the report"
        );
    }
    Ok(())
}
