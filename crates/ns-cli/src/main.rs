//! NextStat renormalisation CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ns_ntuple::ParquetAccessor;
use ns_renorm::{RenormConfig, RunOptions, Systematic, read_config, report};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "nextstat-renorm")]
#[command(about = "NextStat - renormalisation factors for systematic templates")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute yields and renormalisation factors
    Compute {
        /// Run configuration (YAML, or JSON by extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Output CSV table. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Also write the full result as pretty JSON.
        #[arg(long)]
        json: Option<PathBuf>,

        /// Process flavours concurrently.
        #[arg(long)]
        parallel: bool,

        /// Worker threads with `--parallel` (0 = auto).
        #[arg(long, default_value = "0")]
        threads: usize,

        /// Only compute these flavours (repeatable).
        #[arg(long = "flavour")]
        flavours: Vec<String>,

        /// Only evaluate these systematics (repeatable).
        #[arg(long = "systematic")]
        systematics: Vec<String>,

        /// Write output even if some flavours failed (exit status stays non-zero).
        #[arg(long)]
        allow_partial: bool,
    },

    /// Check a configuration without reading any data
    Validate {
        /// Run configuration (YAML, or JSON by extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Also require every referenced data file to exist.
        #[arg(long)]
        check_files: bool,

        /// Output file for the summary (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Compute {
            config,
            output,
            json,
            parallel,
            threads,
            flavours,
            systematics,
            allow_partial,
        } => cmd_compute(
            &config,
            output.as_ref(),
            json.as_ref(),
            RunOptions { parallel, threads },
            &flavours,
            &systematics,
            allow_partial,
        ),
        Commands::Validate { config, check_files, output } => {
            cmd_validate(&config, check_files, output.as_ref())
        }
        Commands::Version => {
            println!("nextstat-renorm {}", ns_core::VERSION);
            Ok(())
        }
    }
}

fn load_config(path: &Path, flavours: &[String], systematics: &[String]) -> Result<RenormConfig> {
    tracing::info!(path = %path.display(), "loading configuration");
    let mut config = read_config(path)?;
    config.retain_flavours(flavours)?;
    config.retain_systematics(systematics)?;
    Ok(config)
}

fn cmd_compute(
    config_path: &Path,
    output: Option<&PathBuf>,
    json: Option<&PathBuf>,
    options: RunOptions,
    flavours: &[String],
    systematics: &[String],
    allow_partial: bool,
) -> Result<()> {
    let config = load_config(config_path, flavours, systematics)?;
    let result = ns_renorm::run(&ParquetAccessor::new(), &config, options)?;

    if !result.is_complete() && !allow_partial {
        anyhow::bail!(
            "{} of {} flavours failed; no output written (use --allow-partial to keep the rest)",
            result.failures.len(),
            result.failures.len() + result.flavours.len()
        );
    }

    // JSON first: the CSV may go to stdout and cannot be taken back
    if let Some(path) = json {
        write_file(path, &report::to_json(&result)?)?;
        tracing::info!(path = %path.display(), "wrote JSON result");
    }
    match output {
        Some(path) => {
            report::write_csv_file(path, &result)
                .with_context(|| format!("writing {}", path.display()))?;
            tracing::info!(path = %path.display(), "wrote CSV table");
        }
        None => report::write_csv(std::io::stdout().lock(), &result)?,
    }

    if !result.is_complete() {
        anyhow::bail!("{} flavours failed: {:?}", result.failures.len(), result.failures.keys());
    }
    Ok(())
}

fn cmd_validate(config_path: &Path, check_files: bool, output: Option<&PathBuf>) -> Result<()> {
    let config = load_config(config_path, &[], &[])?;
    let columns = config.check_expressions()?;

    let missing: Vec<String> = if check_files {
        config
            .data_files()
            .into_iter()
            .filter(|p| !p.is_file())
            .map(|p| p.display().to_string())
            .collect()
    } else {
        Vec::new()
    };

    let flavours: serde_json::Map<String, serde_json::Value> = config
        .flavours
        .iter()
        .map(|(name, spec)| {
            let of_kind = |kind: &str| -> Vec<&str> {
                spec.systematics.iter().filter(|s| s.kind() == kind).map(Systematic::name).collect()
            };
            let summary = serde_json::json!({
                "selection": spec.selection,
                "files": spec.files,
                "weight_systematics": of_kind("weight"),
                "sample_systematics": of_kind("sample"),
            });
            (name.clone(), summary)
        })
        .collect();

    let summary = serde_json::json!({
        "valid": missing.is_empty(),
        "base_path": config.base_path,
        "partitions": config.folders,
        "sample_selection": config.sample_selection,
        "flavours": flavours,
        "columns": columns,
        "missing_files": missing,
    });
    write_json(output, summary)?;

    if !missing.is_empty() {
        anyhow::bail!("{} data files not found", missing.len());
    }
    Ok(())
}

/// Write `contents` to `path`, creating missing parent directories.
fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("writing {}", path.display()))
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        write_file(path, &serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
