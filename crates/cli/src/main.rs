//! Mapfile command-line tool.
//!
//! Loads canonicalization and user maps, either from a TOML configuration
//! file or from paths given on the command line, and answers lookups
//! against them. Also renders the loaded tables and their memory usage for
//! debugging.

mod style;

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use mapfile_core::config::MapConfig;
use mapfile_core::mapfile::{LoadReport, MapFile};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Mapfile command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "mapfile",
    version,
    about = "Canonicalize principals and resolve local users from mapfiles"
)]
struct Cli {
    /// Path to the TOML configuration file. Ignored when --map or
    /// --usermap is given.
    #[arg(short, long, global = true, default_value = "/etc/mapfile/config.toml")]
    config: PathBuf,

    /// Canonicalization file to load (repeatable).
    #[arg(short, long, global = true)]
    map: Vec<PathBuf>,

    /// User map file to load (repeatable).
    #[arg(short, long, global = true)]
    usermap: Vec<PathBuf>,

    /// Compile every principal as a regex instead of treating bare words
    /// as literals.
    #[arg(long, global = true)]
    legacy: bool,

    /// Reject @include directives in --map files.
    #[arg(long, global = true)]
    no_include: bool,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Map a principal authenticated by METHOD to its canonical name.
    Canonicalize { method: String, principal: String },

    /// Map a canonical name to a local account.
    Resolve { canonical: String },

    /// Canonicalize, then resolve the result to a local account.
    Map { method: String, principal: String },

    /// Print every loaded table.
    Dump,

    /// Show rule counts and memory usage.
    Usage {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Load every source and report problems.
    Validate,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let config = build_config(&cli)?;
    init_tracing(cli.log_level.as_deref().unwrap_or(&config.log_level));

    let (map, report) = MapFile::from_config(&config).context("failed to load mapfiles")?;
    debug!(?report, "mapfiles loaded");

    match cli.command {
        Commands::Canonicalize { method, principal } => {
            Ok(print_lookup(map.canonicalize(&method, &principal)))
        }
        Commands::Resolve { canonical } => Ok(print_lookup(map.resolve_user(&canonical))),
        Commands::Map { method, principal } => {
            let user = map
                .canonicalize(&method, &principal)
                .and_then(|canonical| map.resolve_user(&canonical));
            Ok(print_lookup(user))
        }
        Commands::Dump => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            map.dump(&mut out).context("failed to write dump")?;
            out.flush()?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Usage { json } => cmd_usage(&map, json),
        Commands::Validate => Ok(cmd_validate(&config, &report)),
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn build_config(cli: &Cli) -> Result<MapConfig> {
    if cli.map.is_empty() && cli.usermap.is_empty() {
        return MapConfig::load_and_validate(&cli.config)
            .context("failed to load configuration file");
    }

    let mut config = MapConfig::default();
    config.canonical.files = cli.map.clone();
    config.canonical.assume_literal = !cli.legacy;
    config.canonical.allow_include = !cli.no_include;
    config.usermap.files = cli.usermap.clone();
    config.usermap.assume_literal = !cli.legacy;
    Ok(config)
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(io::stderr)
        .init();
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn print_lookup(result: Option<String>) -> ExitCode {
    match result {
        Some(value) => {
            println!("{}", value);
            ExitCode::SUCCESS
        }
        None => {
            eprintln!("{}", style::dim("not found"));
            ExitCode::FAILURE
        }
    }
}

fn cmd_usage(map: &MapFile, json: bool) -> Result<ExitCode> {
    let usage = map.usage();
    let stats = map.regex_stats();

    if json {
        let value = serde_json::json!({ "usage": usage, "regex": stats });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(ExitCode::SUCCESS);
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Metric", "Value"]);

    let rows = [
        ("methods", usage.methods),
        ("rule list entries", usage.entries),
        ("regex rules", usage.regex),
        ("literal keys", usage.hash),
        ("string bytes", usage.string_bytes),
        ("wasted bytes", usage.wasted_bytes),
        ("allocations", usage.allocations),
        ("regex compile failures", stats.failed),
        ("shortest pattern", stats.min_pattern_len),
        ("longest pattern", stats.max_pattern_len),
    ];
    for (name, value) in rows {
        table.add_row(vec![name.to_string(), value.to_string()]);
    }

    println!("{}", style::header("Mapfile usage"));
    println!("{table}");
    Ok(ExitCode::SUCCESS)
}

fn cmd_validate(config: &MapConfig, report: &LoadReport) -> ExitCode {
    println!("{}", style::header("Validating mapfiles"));
    println!();
    for path in &config.canonical.files {
        println!("  canonical : {}", path.display());
    }
    for path in &config.usermap.files {
        println!("  usermap   : {}", path.display());
    }
    println!();
    println!("  Lines read        : {}", report.lines);
    println!("  Rules added       : {}", report.rules_added);
    println!("  Files included    : {}", report.files_included);

    if report.duplicate_keys > 0 {
        println!(
            "{}",
            style::warn(&format!(
                "{} duplicate literal key(s) ignored (first wins)",
                report.duplicate_keys
            ))
        );
    }

    let problems = [
        ("malformed line(s)", report.malformed_lines),
        ("invalid pattern(s)", report.invalid_patterns),
        ("rejected @include(s)", report.rejected_includes),
        ("source(s) failed", report.sources_failed),
    ];
    for (what, count) in problems {
        if count > 0 {
            println!("{}", style::error(&format!("{} {}", count, what)));
        }
    }

    if report.has_problems() {
        ExitCode::FAILURE
    } else {
        println!("{}", style::success("All mapfiles are valid."));
        ExitCode::SUCCESS
    }
}
