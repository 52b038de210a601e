//! fitscore CLI - Command-line interface for the fitscore engine
//!
//! Commands:
//! - score: Score every roster participant from a directory of exports
//! - discover: List participants, time ranges and stream coverage
//! - config: Print the effective scoring configuration

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use fitscore::logging::init_subscriber;
use fitscore::types::StreamKind;
use fitscore::{
    ExportCatalog, Roster, ScoreError, ScoreRecord, ScoringConfig, ScoringProcessor,
    FITSCORE_VERSION,
};

/// fitscore - Score per-minute wearable exports for longitudinal studies
#[derive(Parser)]
#[command(name = "fitscore")]
#[command(version = FITSCORE_VERSION)]
#[command(about = "Score per-minute wearable exports", long_about = None)]
struct Cli {
    /// Scoring configuration file (JSON); defaults apply without it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, overriding the configuration (RUST_LOG wins over both)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every roster participant that has exports
    Score {
        /// Directory holding the export CSV files
        #[arg(short, long)]
        input: PathBuf,

        /// Roster JSON (id_redcap, redcap_event_name, fitc_device_dte)
        #[arg(short, long)]
        roster: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long, default_value = "-")]
        output: PathBuf,

        /// Output format
        #[arg(long, default_value = "json")]
        output_format: OutputFormat,
    },

    /// List participants, time ranges and which streams each range has
    Discover {
        /// Directory holding the export CSV files
        #[arg(short, long)]
        input: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as JSON
    Config,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// JSON array of score records
    Json,
    /// Pretty-printed JSON
    JsonPretty,
    /// Newline-delimited JSON (one record per line)
    Ndjson,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let error = CliError::from(e);
            eprintln!(
                "{}",
                serde_json::to_string(&error).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), FitscoreCliError> {
    let config = match &cli.config {
        Some(path) => ScoringConfig::from_path(path)?,
        None => ScoringConfig::default(),
    };

    match cli.command {
        Commands::Score {
            input,
            roster,
            output,
            output_format,
        } => {
            init_logging(&config, cli.log_level.as_deref())?;
            cmd_score(config, &input, &roster, &output, output_format)
        }

        Commands::Discover { input, json } => {
            init_logging(&config, cli.log_level.as_deref())?;
            cmd_discover(&config, &input, json)
        }

        Commands::Config => cmd_config(&config),
    }
}

fn init_logging(config: &ScoringConfig, level: Option<&str>) -> Result<(), FitscoreCliError> {
    init_subscriber(level.unwrap_or(&config.log_level), config.log_format)?;
    Ok(())
}

fn cmd_score(
    config: ScoringConfig,
    input: &Path,
    roster: &Path,
    output: &Path,
    output_format: OutputFormat,
) -> Result<(), FitscoreCliError> {
    let catalog = ExportCatalog::discover(input)?;
    if catalog.is_empty() {
        return Err(FitscoreCliError::NoExports(input.to_path_buf()));
    }

    let roster = Roster::from_path(roster)?;
    let processor = ScoringProcessor::new(config)?;
    let outcome = processor.score_batch(&roster, &catalog);

    let to_stdout = output.to_string_lossy() == "-";

    // Pretty-print plain JSON for a human at a terminal
    let output_format = match output_format {
        OutputFormat::Json if to_stdout && atty::is(atty::Stream::Stdout) => {
            OutputFormat::JsonPretty
        }
        other => other,
    };
    let output_data = format_output(&outcome.records, &output_format)?;

    if to_stdout {
        println!("{}", output_data);
    } else {
        fs::write(output, output_data)?;
    }

    Ok(())
}

fn cmd_discover(config: &ScoringConfig, input: &Path, json: bool) -> Result<(), FitscoreCliError> {
    let catalog = ExportCatalog::discover(input)?;

    let report = DiscoveryReport {
        root: input.display().to_string(),
        participants: catalog
            .participant_ids()
            .map(|id| ParticipantExports {
                participant_id: id.to_string(),
                time_ranges: catalog
                    .time_ranges(id)
                    .iter()
                    .map(|range| RangeCoverage {
                        token: range.token.clone(),
                        streams: StreamKind::ALL
                            .into_iter()
                            .filter(|kind| range.file_for(*kind).is_some())
                            .collect(),
                        missing: range.missing_streams(&config.required_streams),
                    })
                    .collect(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Export Discovery Report");
        println!("=======================");
        println!("Root:         {}", report.root);
        println!("Participants: {}", report.participants.len());

        for participant in &report.participants {
            println!("\n{}", participant.participant_id);
            for range in &participant.time_ranges {
                let status = if range.missing.is_empty() { "[OK]" } else { "[MISSING]" };
                let missing: Vec<String> = range.missing.iter().map(|k| k.to_string()).collect();
                if missing.is_empty() {
                    println!("  {} {}", status, range.token);
                } else {
                    println!("  {} {}: {}", status, range.token, missing.join(", "));
                }
            }
        }
    }

    Ok(())
}

fn cmd_config(config: &ScoringConfig) -> Result<(), FitscoreCliError> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

// Helper functions

fn format_output(
    records: &[ScoreRecord],
    format: &OutputFormat,
) -> Result<String, FitscoreCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for record in records {
                lines.push(serde_json::to_string(record)?);
            }
            Ok(lines.join("\n"))
        }
        OutputFormat::Json => Ok(serde_json::to_string(records)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(records)?),
    }
}

// Error types

#[derive(Debug)]
enum FitscoreCliError {
    Io(io::Error),
    Score(ScoreError),
    Json(serde_json::Error),
    NoExports(PathBuf),
}

impl From<io::Error> for FitscoreCliError {
    fn from(e: io::Error) -> Self {
        FitscoreCliError::Io(e)
    }
}

impl From<ScoreError> for FitscoreCliError {
    fn from(e: ScoreError) -> Self {
        FitscoreCliError::Score(e)
    }
}

impl From<serde_json::Error> for FitscoreCliError {
    fn from(e: serde_json::Error) -> Self {
        FitscoreCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FitscoreCliError> for CliError {
    fn from(e: FitscoreCliError) -> Self {
        match e {
            FitscoreCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            FitscoreCliError::Score(ScoreError::Configuration(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Run 'fitscore config' to see the effective configuration".to_string()),
            },
            FitscoreCliError::Score(ScoreError::Json(e)) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check the roster and configuration JSON syntax".to_string()),
            },
            FitscoreCliError::Score(e) => CliError {
                code: "SCORE_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            FitscoreCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: None,
            },
            FitscoreCliError::NoExports(path) => CliError {
                code: "NO_EXPORTS".to_string(),
                message: format!("No export files found under {}", path.display()),
                hint: Some("Run 'fitscore discover' to check file naming".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DiscoveryReport {
    root: String,
    participants: Vec<ParticipantExports>,
}

#[derive(serde::Serialize)]
struct ParticipantExports {
    participant_id: String,
    time_ranges: Vec<RangeCoverage>,
}

#[derive(serde::Serialize)]
struct RangeCoverage {
    token: String,
    streams: Vec<StreamKind>,
    missing: Vec<StreamKind>,
}
