use crate::aggregate::compute_summary;
use crate::classify::{classify_records, default_rules, Rule, RuleContext};
use crate::config::ReconConfig;
use crate::error::ReconError;
use crate::matcher::match_exact_key;
use crate::model::{QualityReport, ReconInput, ReconMeta, ReconResult};
use crate::quality::{gate_events, gate_opportunities};

/// Run reconciliation per config with the standard rule order.
pub fn run(config: &ReconConfig, input: &ReconInput) -> Result<ReconResult, ReconError> {
    run_with_rules(config, input, &default_rules())
}

/// Run reconciliation with a caller-supplied rule list.
///
/// Stages run strictly in sequence: quality gate (both sides), exact-key
/// join, classification, aggregation. Nothing is partially returned on error.
pub fn run_with_rules(
    config: &ReconConfig,
    input: &ReconInput,
    rules: &[Rule],
) -> Result<ReconResult, ReconError> {
    let events = gate_events(&input.events, &config.quality)?;
    let opportunities = gate_opportunities(&input.opportunities, &config.quality)?;

    let mut records = match_exact_key(
        &events.rows,
        &opportunities.rows,
        &config.classify.variance_tolerance,
    );

    let ctx = RuleContext {
        config: &config.classify,
        cancelled: &opportunities.cancelled,
    };
    classify_records(&mut records, rules, &ctx);

    let summary = compute_summary(&records);

    tracing::info!(
        config = %config.name,
        records = summary.total_records,
        matched = summary.match_breakdown.count("matched"),
        source_only = summary.match_breakdown.count("source_only"),
        opportunity_only = summary.match_breakdown.count("opportunity_only"),
        "reconciliation complete"
    );

    Ok(ReconResult {
        meta: ReconMeta {
            config_name: config.name.clone(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
        },
        quality: QualityReport {
            source: events.quality,
            opportunity: opportunities.quality,
        },
        summary,
        records,
    })
}
