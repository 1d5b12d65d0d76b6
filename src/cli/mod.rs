//! Command-line interface for batch-export
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and command-line overrides
//! - Dispatch of the `export`, `split`, `products`, `config`, `completion`
//!   and `version` subcommands

pub mod completion;

use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::config::{Config, LogLevel};
use crate::error::{ConfigError, ExportError, Result};
use crate::executor::{CachedExecutor, CsvSourceExecutor, QueryExecutor, QueryParams};
use crate::export::csv::{default_filename, CsvWriter};
use crate::export::{
    ExportOrchestrator, ExportRequest, ExportSession, ExportStage, MessageLevel,
};
use crate::formatter::{Formatter, TableFormatter, TableStyle};
use crate::range::{split_by_days, split_by_month, DateRange};
use crate::table::Value;

/// Batched CSV export of date-ranged reports
#[derive(Parser, Debug)]
#[command(
    name = "batch-export",
    version,
    about = "Batched CSV export of date-ranged reports",
    long_about = "Splits a report's date range into batches, fetches each batch, merges rows
that straddle batch boundaries and writes a spreadsheet-ready CSV."
)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Disable colored output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Quiet mode (minimal output)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Very verbose mode (debug logging)
    #[arg(long = "vv", global = true)]
    pub very_verbose: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands for batch-export
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check size, preview and export a report to CSV
    Export(ExportArgs),

    /// Show how a date range would be split into batches
    Split {
        #[command(flatten)]
        range: RangeArgs,

        /// Batch length in days
        #[arg(long, value_name = "DAYS", conflicts_with = "by_month")]
        batch_days: Option<u32>,

        /// Split on calendar months
        #[arg(long)]
        by_month: bool,

        /// Storefront count used to pick the batch length
        #[arg(long, value_name = "N", default_value_t = 1)]
        storefronts: usize,
    },

    /// List products with a merge configuration
    Products {
        /// Print product names only, one per line
        #[arg(long)]
        names: bool,
    },

    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate configuration file
        #[arg(long)]
        validate: bool,
    },

    /// Generate shell completion script
    Completion {
        /// Shell type (bash, zsh, fish, powershell)
        #[arg(value_name = "SHELL")]
        shell: String,
    },

    /// Show version information
    Version,
}

/// Inclusive date range arguments
#[derive(Args, Debug, Clone)]
pub struct RangeArgs {
    /// First day (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub start: String,

    /// Last day, inclusive (YYYY-MM-DD)
    #[arg(long, value_name = "DATE")]
    pub end: String,
}

/// Arguments of the `export` subcommand
#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Day-level CSV file to read report rows from
    #[arg(long, value_name = "FILE")]
    pub source: PathBuf,

    /// Report to export
    #[arg(long, value_name = "NAME")]
    pub data_source: String,

    /// Merge configuration to use (defaults to the report name)
    #[arg(long, value_name = "NAME")]
    pub product: Option<String>,

    #[command(flatten)]
    pub range: RangeArgs,

    /// Storefront identifiers (repeat or comma-separate)
    #[arg(long = "storefront", value_name = "ID", value_delimiter = ',')]
    pub storefronts: Vec<i64>,

    /// Equality filter on a column (repeatable)
    #[arg(long = "filter", value_name = "COLUMN=VALUE", value_parser = parse_filter)]
    pub filters: Vec<(String, String)>,

    /// Output file (defaults to <data-source>-<timestamp>.csv)
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Rows shown in the preview
    #[arg(long, value_name = "N")]
    pub preview_rows: Option<usize>,

    /// Preview rows printed to the terminal
    #[arg(long, value_name = "N")]
    pub show_rows: Option<usize>,

    /// Export without asking for confirmation
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Bypass the query cache
    #[arg(long)]
    pub no_cache: bool,
}

impl RangeArgs {
    pub fn date_range(&self) -> Result<DateRange> {
        DateRange::parse(&self.start, &self.end)
    }
}

impl ExportArgs {
    /// Query parameters described by the arguments
    pub fn query_params(&self) -> Result<QueryParams> {
        let filters: BTreeMap<String, Value> = self
            .filters
            .iter()
            .map(|(k, v)| (k.clone(), Value::infer(v)))
            .collect();
        Ok(QueryParams {
            range: self.range.date_range()?,
            storefront_ids: self.storefronts.clone(),
            filters,
        })
    }

    pub fn request(&self) -> Result<ExportRequest> {
        let mut request = ExportRequest::new(&self.data_source, self.query_params()?);
        request.product = self.product.clone();
        Ok(request)
    }
}

fn parse_filter(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected COLUMN=VALUE, got '{raw}'")),
    }
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration
    config: Config,
}

impl CliInterface {
    /// Parse arguments and load configuration
    ///
    /// # Returns
    /// * `Result<Self>` - New CLI interface or error
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Build from already parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Self::load_config(&args)?;
        Ok(Self { args, config })
    }

    /// Load configuration from file and merge with arguments
    ///
    /// A file that loads but fails validation is replaced by defaults with
    /// a warning; a file that cannot be loaded is an error.
    fn load_config(args: &CliArgs) -> Result<Config> {
        let mut config = Config::load_from_file(args.config_file.as_deref())?;

        if let Err(e) = config.validate() {
            eprintln!("Warning: Configuration validation failed: {}", e);
            eprintln!("Using default configuration instead.");
            config = Config::default();
        }

        Self::apply_args_to_config(&mut config, args);
        Ok(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Apply CLI arguments to configuration
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };

        if args.quiet {
            config.export.show_progress = false;
        }

        if let Commands::Export(export) = &args.command {
            if let Some(rows) = export.preview_rows {
                config.export.preview_rows = rows;
            }
            if export.no_cache {
                config.cache.enabled = false;
            }
        }
    }

    fn use_colors(&self) -> bool {
        !self.args.no_color && io::stdout().is_terminal()
    }

    /// Box-drawing tables on a terminal, plain ASCII otherwise
    fn table_formatter(&self) -> TableFormatter {
        let colors = self.use_colors();
        let style = if colors {
            TableStyle::Modern
        } else {
            TableStyle::Ascii
        };
        TableFormatter::with_colors(colors).with_style(style)
    }

    fn formatter(&self) -> Formatter {
        Formatter::new(self.use_colors()).with_table(self.table_formatter())
    }

    /// Run the selected subcommand
    pub async fn run(&self) -> Result<()> {
        match &self.args.command {
            Commands::Export(export) => self.run_export(export).await,
            Commands::Split {
                range,
                batch_days,
                by_month,
                storefronts,
            } => self.show_split(range, *batch_days, *by_month, *storefronts),
            Commands::Products { names } => {
                self.show_products(*names);
                Ok(())
            }
            Commands::Config { show, validate } => self.handle_config_command(*show, *validate),
            Commands::Completion { shell } => completion::generate_completion(shell),
            Commands::Version => {
                self.show_version();
                Ok(())
            }
        }
    }

    /// Size check, preview, confirmation, export and file write
    async fn run_export(&self, args: &ExportArgs) -> Result<()> {
        let mut table = self.table_formatter();
        if let Some(rows) = args.show_rows {
            table = table.with_max_rows(rows);
        }
        let formatter = Formatter::new(self.use_colors()).with_table(table);
        let registry = self.config.merge_registry();
        let request = args.request()?;

        let source = CsvSourceExecutor::new(
            &args.source,
            self.config.source.clone(),
            registry.clone(),
        );
        let executor: Arc<dyn QueryExecutor> = if self.config.cache.enabled {
            Arc::new(CachedExecutor::new(source, self.config.cache_ttl()))
        } else {
            Arc::new(source)
        };

        let orchestrator =
            ExportOrchestrator::new(executor, registry, self.config.export.clone());
        let mut session = ExportSession::new();

        orchestrator.request_export(&mut session, request).await?;
        if session.stage() == ExportStage::LoadingPreview {
            orchestrator.load_preview(&mut session).await?;
        }
        if session.stage() != ExportStage::Ready {
            return report_stop(&session, &formatter);
        }

        if !self.args.quiet {
            if let Some(preview) = session.preview() {
                println!("{}", formatter.preview(preview, session.row_count()));
            }
        }

        if !args.yes {
            let rows = session.row_count().unwrap_or_default();
            if !prompt_confirmation(&format!("Export about {rows} rows to CSV?"))? {
                println!("Export cancelled.");
                orchestrator.reset(&mut session);
                return Ok(());
            }
        }

        orchestrator.confirm_export(&mut session).await?;
        if session.stage() != ExportStage::Done {
            return report_stop(&session, &formatter);
        }

        let path = args
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(default_filename(&args.data_source)));
        let Some(artifact) = session.take_artifact() else {
            return report_stop(&session, &formatter);
        };

        let mut writer = CsvWriter::new(&path).await?;
        writer.write_bytes(&artifact.csv).await?;
        writer.finalize().await?;
        debug!("Wrote export to {}", path.display());

        if let Some(message) = session.message() {
            eprintln!("{}", formatter.message(message));
        }
        if !self.args.quiet {
            println!("{}", formatter.export_summary(&artifact, &path));
        }
        Ok(())
    }

    fn show_split(
        &self,
        range: &RangeArgs,
        batch_days: Option<u32>,
        by_month: bool,
        storefronts: usize,
    ) -> Result<()> {
        let range = range.date_range()?;
        let batches = if by_month {
            split_by_month(range)
        } else {
            let days = batch_days
                .unwrap_or_else(|| self.config.export.sizing.batch_days_for(storefronts));
            split_by_days(range, days)?
        };
        println!("{}", self.formatter().batches(&batches));
        Ok(())
    }

    fn show_products(&self, names_only: bool) {
        let registry = self.config.merge_registry();
        if names_only {
            for product in registry.products() {
                println!("{product}");
            }
        } else {
            println!("{}", self.formatter().products(&registry));
        }
    }

    /// Show version information
    fn show_version(&self) {
        println!("batch-export version {}", env!("CARGO_PKG_VERSION"));
        println!("Rust version: {}", env!("CARGO_PKG_RUST_VERSION"));
    }

    /// Handle config subcommand
    fn handle_config_command(&self, show: bool, validate: bool) -> Result<()> {
        if validate {
            self.validate_config_file()?;
        }
        if show || !validate {
            self.show_config()?;
        }
        Ok(())
    }

    /// Validate configuration file
    fn validate_config_file(&self) -> Result<()> {
        let path = self.get_config_path();
        println!("Validating configuration file: {}", path.display());

        if !path.exists() {
            println!("Configuration file does not exist, defaults apply");
            return Ok(());
        }

        match Config::from_file(&path).and_then(|config| config.validate()) {
            Ok(()) => println!("Configuration is valid"),
            Err(e) => {
                return Err(ConfigError::InvalidFormat(format!(
                    "{}: {}",
                    path.display(),
                    e
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Show effective configuration
    fn show_config(&self) -> Result<()> {
        println!("# Configuration file: {}", self.get_config_path().display());
        println!("{}", self.config.to_toml()?);
        Ok(())
    }

    /// Get configuration file path (from args or default)
    fn get_config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_config_path)
    }
}

/// Show why an export stopped early and decide the command's outcome
///
/// Only a warning left in `initial` (nothing to export) succeeds; blocked,
/// failed and connection-lost sessions fail the command.
fn report_stop(session: &ExportSession, formatter: &Formatter) -> Result<()> {
    if let Some(message) = session.message() {
        eprintln!("{}", formatter.message(message));
    }
    if is_quiet_stop(session) {
        Ok(())
    } else {
        Err(ExportError::Stopped {
            stage: session.stage().to_string(),
        })
    }
}

fn is_quiet_stop(session: &ExportSession) -> bool {
    session.stage() == ExportStage::Initial
        && session
            .message()
            .is_some_and(|m| m.level == MessageLevel::Warning)
}

/// Ask the user to confirm on stdin
///
/// # Returns
/// * `Result<bool>` - True if confirmed, false if declined
pub fn prompt_confirmation(question: &str) -> Result<bool> {
    print!("{question} (yes/no): ");
    io::stdout()
        .flush()
        .map_err(|e| ExportError::Generic(format!("Failed to flush stdout: {}", e)))?;

    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .map_err(|e| ExportError::Generic(format!("Failed to read input: {}", e)))?;

    let input = input.trim().to_lowercase();
    Ok(matches!(input.as_str(), "yes" | "y"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{MergeRegistry, UserMessage};

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(args).unwrap()
    }

    fn export_args(cli: &CliArgs) -> &ExportArgs {
        match &cli.command {
            Commands::Export(args) => args,
            other => panic!("expected export, got {other:?}"),
        }
    }

    #[test]
    fn test_export_args_parsing() {
        let cli = parse(&[
            "batch-export",
            "export",
            "--source",
            "daily.csv",
            "--data-source",
            "keyword_lab",
            "--start",
            "2024-01-01",
            "--end",
            "2024-01-31",
            "--storefront",
            "1,2",
            "--storefront",
            "3",
            "--filter",
            "device_type=mobile",
            "-y",
        ]);
        let args = export_args(&cli);
        assert_eq!(args.storefronts, vec![1, 2, 3]);
        assert!(args.yes);

        let request = args.request().unwrap();
        assert_eq!(request.product(), "keyword_lab");
        assert_eq!(request.params.range.days(), 31);
        assert_eq!(
            request.params.filters.get("device_type"),
            Some(&Value::Text("mobile".into()))
        );
    }

    #[test]
    fn test_reversed_range_rejected() {
        let cli = parse(&[
            "batch-export",
            "export",
            "--source",
            "daily.csv",
            "--data-source",
            "keyword_lab",
            "--start",
            "2024-02-01",
            "--end",
            "2024-01-01",
        ]);
        assert!(matches!(
            export_args(&cli).request(),
            Err(ExportError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_bad_filter_rejected() {
        let result = CliArgs::try_parse_from([
            "batch-export",
            "export",
            "--source",
            "x.csv",
            "--data-source",
            "r",
            "--start",
            "2024-01-01",
            "--end",
            "2024-01-02",
            "--filter",
            "novalue",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = parse(&["batch-export", "products", "--no-color", "-q"]);
        assert!(cli.no_color);
        assert!(cli.quiet);
    }

    #[test]
    fn test_split_flags_conflict() {
        let result = CliArgs::try_parse_from([
            "batch-export",
            "split",
            "--start",
            "2024-01-01",
            "--end",
            "2024-01-31",
            "--batch-days",
            "7",
            "--by-month",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_args_override_config() {
        let cli = parse(&[
            "batch-export",
            "-v",
            "export",
            "--source",
            "daily.csv",
            "--data-source",
            "keyword_lab",
            "--start",
            "2024-01-01",
            "--end",
            "2024-01-31",
            "--preview-rows",
            "10",
            "--show-rows",
            "5",
            "--no-cache",
        ]);
        assert_eq!(export_args(&cli).show_rows, Some(5));
        let mut config = Config::default();
        CliInterface::apply_args_to_config(&mut config, &cli);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.export.preview_rows, 10);
        assert!(!config.cache.enabled);
    }

    async fn stop_after_size_check(source: PathBuf) -> Result<()> {
        let orchestrator = ExportOrchestrator::new(
            CsvSourceExecutor::new(source, Default::default(), MergeRegistry::empty()),
            MergeRegistry::empty(),
            crate::config::ExportConfig {
                show_progress: false,
                ..Default::default()
            },
        );
        let params = QueryParams::new(DateRange::parse("2025-01-01", "2025-01-10")?);
        let mut session = ExportSession::new();
        orchestrator
            .request_export(&mut session, ExportRequest::new("daily", params))
            .await?;
        assert_eq!(session.stage(), ExportStage::Initial);
        report_stop(&session, &Formatter::new(false))
    }

    #[tokio::test]
    async fn test_empty_selection_is_not_a_failure() {
        let path = std::env::temp_dir().join("batch_export_cli_empty_selection.csv");
        std::fs::write(&path, "date,impression\n2024-01-01,5\n").unwrap();

        assert!(stop_after_size_check(path.clone()).await.is_ok());
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_failed_size_check_fails_the_command() {
        let path = std::env::temp_dir().join("batch_export_cli_missing_source.csv");
        let _ = std::fs::remove_file(&path);

        let err = stop_after_size_check(path).await.unwrap_err();
        assert!(matches!(err, ExportError::Stopped { ref stage } if stage == "initial"));
    }

    #[test]
    fn test_blocked_session_fails_the_command() {
        let mut session = ExportSession::new();
        session.set_stage(ExportStage::Blocked);
        session.set_message(Some(UserMessage::error("Data is too large to export")));
        assert!(!is_quiet_stop(&session));

        session.set_stage(ExportStage::Initial);
        session.set_message(Some(UserMessage::warning("No data found")));
        assert!(is_quiet_stop(&session));
    }

    #[test]
    fn test_parse_filter() {
        assert_eq!(
            parse_filter("display_type = banner").unwrap(),
            ("display_type".to_string(), "banner".to_string())
        );
        assert!(parse_filter("=x").is_err());
    }
}
