//! batch-export command-line tool
//!
//! Exports date-ranged reports to CSV in batches: the range is split into
//! windows, each window is fetched on its own, rows that straddle window
//! boundaries are merged back together, and the result is written as a
//! spreadsheet-ready CSV.
//!
//! # Usage
//!
//! ```bash
//! batch-export export --source daily.csv --data-source keyword_lab \
//!     --start 2024-01-01 --end 2024-03-31 --storefront 7,9
//! batch-export split --start 2024-01-01 --end 2024-03-31 --storefronts 3
//! ```

use tracing_subscriber::EnvFilter;

use batch_export::cli::CliInterface;
use batch_export::error::{ExportError, Result};

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if !matches!(e, ExportError::Stopped { .. }) {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments and load configuration
/// 2. Initialize logging
/// 3. Run the selected subcommand
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;
    initialize_logging(&cli);
    cli.run().await
}

/// Initialize tracing from the effective log level
///
/// `RUST_LOG` takes precedence over the configured level. Logs go to stderr
/// so stdout stays clean for tables and completion scripts.
fn initialize_logging(cli: &CliInterface) {
    let level = cli.config().logging.level.to_tracing_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if cli.config().logging.timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}
