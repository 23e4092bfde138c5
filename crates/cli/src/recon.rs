//! `crossmatch run` and `crossmatch validate`: config-driven reconciliation.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use crossmatch_recon::model::{DiscrepancyCause, ReconResult, SideQuality};
use crossmatch_recon::{ReconConfig, ReconError};

use crate::exit_codes::{EXIT_RECON_INVALID_CONFIG, EXIT_RECON_RUNTIME, EXIT_RECON_UNEXPLAINED};
use crate::CliError;

#[derive(Subcommand)]
pub enum ReconCommands {
    /// Run reconciliation from a TOML config file
    #[command(after_help = "\
Examples:
  crossmatch run ga4-salesforce.recon.toml
  crossmatch run ga4-salesforce.recon.toml --json
  crossmatch run ga4-salesforce.recon.toml --output result.json --no-records
  crossmatch run ga4-salesforce.recon.toml --as-of 2025-10-09T23:59:59 --fail-on-unexplained")]
    Run {
        /// Path to the .recon.toml config file
        config: PathBuf,

        /// Also print JSON to stdout (the human summary stays on stderr)
        #[arg(long)]
        json: bool,

        /// Write JSON output to file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Snapshot time for the quick-cancellation age check (overrides classify.as_of)
        #[arg(long, value_name = "TIMESTAMP")]
        as_of: Option<String>,

        /// Omit per-record rows from JSON output
        #[arg(long)]
        no_records: bool,

        /// Exit 62 when any record is left unexplained
        #[arg(long)]
        fail_on_unexplained: bool,
    },

    /// Validate a recon config without running
    #[command(after_help = "\
Examples:
  crossmatch validate ga4-salesforce.recon.toml")]
    Validate {
        /// Path to the .recon.toml config file
        config: PathBuf,
    },
}

pub fn cmd_recon(cmd: ReconCommands) -> Result<(), CliError> {
    match cmd {
        ReconCommands::Run {
            config,
            json,
            output,
            as_of,
            no_records,
            fail_on_unexplained,
        } => cmd_run(RunOptions {
            config_path: config,
            json_output: json,
            output_file: output,
            as_of,
            no_records,
            fail_on_unexplained,
        }),
        ReconCommands::Validate { config } => cmd_validate(config),
    }
}

struct RunOptions {
    config_path: PathBuf,
    json_output: bool,
    output_file: Option<PathBuf>,
    as_of: Option<String>,
    no_records: bool,
    fail_on_unexplained: bool,
}

fn recon_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError::new(code, msg)
}

/// Engine errors split into config problems and everything else.
fn engine_err(err: ReconError) -> CliError {
    match err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => {
            recon_err(EXIT_RECON_INVALID_CONFIG, err.to_string())
        }
        ReconError::MissingColumn { .. } => recon_err(EXIT_RECON_RUNTIME, err.to_string())
            .with_hint("map the header under [sources.<side>.columns] in the config"),
        ReconError::DuplicateKey { .. } => recon_err(EXIT_RECON_RUNTIME, err.to_string())
            .with_hint("set quality.duplicate_policy = \"keep_first\" to keep the earliest row"),
        _ => recon_err(EXIT_RECON_RUNTIME, err.to_string()),
    }
}

fn read_config(config_path: &Path) -> Result<ReconConfig, CliError> {
    let config_str = std::fs::read_to_string(config_path)
        .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("cannot read config: {e}")))?;
    ReconConfig::from_toml(&config_str).map_err(engine_err)
}

/// Resolve an input file relative to the config file's directory.
fn input_path(config_path: &Path, side: &str, file: Option<&str>) -> Result<PathBuf, CliError> {
    let Some(file) = file else {
        return Err(recon_err(
            EXIT_RECON_INVALID_CONFIG,
            format!("sources.{side}.file is not set"),
        )
        .with_hint(format!("add `file = \"...\"` under [sources.{side}]")));
    };
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    Ok(base_dir.join(file))
}

fn read_input(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path)
        .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("cannot read {}: {e}", path.display())))
}

fn cmd_run(opts: RunOptions) -> Result<(), CliError> {
    let mut config = read_config(&opts.config_path)?;

    if let Some(raw) = opts.as_of.as_deref() {
        let as_of = crossmatch_recon::load::parse_timestamp(raw).ok_or_else(|| {
            CliError::usage(format!("--as-of: cannot parse timestamp '{raw}'"))
                .with_hint("use e.g. 2025-10-09T23:59:59 or 2025-10-09")
        })?;
        config.classify.as_of = Some(as_of);
    }

    let source_path = input_path(&opts.config_path, "source", config.sources.source.file.as_deref())?;
    let opportunity_path = input_path(
        &opts.config_path,
        "opportunity",
        config.sources.opportunity.file.as_deref(),
    )?;
    tracing::info!(
        source = %source_path.display(),
        opportunity = %opportunity_path.display(),
        "loading inputs"
    );

    let source_csv = read_input(&source_path)?;
    let opportunity_csv = read_input(&opportunity_path)?;

    let input = crossmatch_recon::load::load_input(&config, &source_csv, &opportunity_csv)
        .map_err(engine_err)?;
    let mut result = crossmatch_recon::run(&config, &input).map_err(engine_err)?;

    let unexplained = result
        .summary
        .cause_count(DiscrepancyCause::UnexplainedNeedsInvestigation);

    if opts.no_records {
        result.records.clear();
    }

    // Output
    if opts.json_output || opts.output_file.is_some() {
        let json_str = serde_json::to_string_pretty(&result)
            .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("JSON serialization error: {e}")))?;

        if let Some(ref path) = opts.output_file {
            std::fs::write(path, &json_str)
                .map_err(|e| recon_err(EXIT_RECON_RUNTIME, format!("cannot write output: {e}")))?;
            eprintln!("wrote {}", path.display());
        }

        if opts.json_output {
            println!("{json_str}");
        }
    }

    // Human summary to stderr
    print_summary(&result);

    if opts.fail_on_unexplained && unexplained > 0 {
        return Err(recon_err(
            EXIT_RECON_UNEXPLAINED,
            format!("{unexplained} record(s) need investigation"),
        ));
    }

    Ok(())
}

fn print_summary(result: &ReconResult) {
    let s = &result.summary;
    let m = &s.match_breakdown;

    eprintln!(
        "recon '{}': {} records, {} matched, {} source-only, {} opportunity-only",
        result.meta.config_name,
        s.total_records,
        m.count("matched"),
        m.count("source_only"),
        m.count("opportunity_only"),
    );
    eprintln!("quality: {}", quality_line("source", &result.quality.source));
    eprintln!("quality: {}", quality_line("opportunity", &result.quality.opportunity));

    if let Some(pct) = s.attribution_coverage_pct {
        eprintln!(
            "attribution: {:.1}% coverage ({} attributed, {} token mismatch)",
            pct,
            s.attribution_breakdown.count("attributed"),
            s.attribution_breakdown.count("token_mismatch"),
        );
    }

    for cause in &s.discrepancy_breakdown {
        let total = cause.counts.total();
        if total > 0 {
            eprintln!(
                "  {:<32} {:>5}  (source-only {}, opportunity-only {})",
                cause.cause.to_string(),
                total,
                cause.counts.source_only,
                cause.counts.opportunity_only,
            );
        }
    }

    let rev = &s.revenue;
    if rev.matched_records > 0 {
        eprintln!(
            "revenue: {} within tolerance, {} outside, net difference {}",
            rev.within_tolerance,
            rev.outside_tolerance,
            format_cents(rev.net_difference_cents),
        );
    }
}

fn quality_line(side: &str, q: &SideQuality) -> String {
    format!(
        "{side} {} rows, {} eligible ({} unkeyed, {} test, {} cancelled, {} duplicate)",
        q.raw_rows, q.eligible, q.unkeyed, q.test_actor, q.cancelled, q.duplicates,
    )
}

fn format_cents(cents: i128) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let config = read_config(&config_path)?;
    let source = input_path(&config_path, "source", config.sources.source.file.as_deref())?;
    let opportunity = input_path(
        &config_path,
        "opportunity",
        config.sources.opportunity.file.as_deref(),
    )?;

    eprintln!(
        "valid: recon '{}' ({} vs {}), {} non-web channel(s), duplicate policy {}",
        config.name,
        source.display(),
        opportunity.display(),
        config.classify.non_web_channels.len(),
        config.quality.duplicate_policy,
    );
    Ok(())
}
