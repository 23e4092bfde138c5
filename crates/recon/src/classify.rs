//! Discrepancy classification.
//!
//! Causes are assigned by an ordered list of rules, first match wins. Any
//! non-matched record that no rule claims falls through to
//! `UnexplainedNeedsInvestigation`, so every discrepancy gets exactly one
//! cause. Matched records never get one.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use rayon::prelude::*;

use crate::config::ClassifyConfig;
use crate::model::{DiscrepancyCause, MatchStatus, ReconRecord};

/// Everything a rule may consult besides the record itself.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub config: &'a ClassifyConfig,
    /// Cancelled-stage opportunity timestamps by key, from the quality gate.
    pub cancelled: &'a BTreeMap<String, NaiveDateTime>,
}

/// A (predicate, cause) pair.
#[derive(Clone, Copy)]
pub struct Rule {
    pub cause: DiscrepancyCause,
    pub applies: fn(&ReconRecord, &RuleContext<'_>) -> bool,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule").field("cause", &self.cause).finish()
    }
}

/// The standard rule order.
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule {
            cause: DiscrepancyCause::PossibleTestOrFraud,
            applies: is_low_value_source_only,
        },
        Rule {
            cause: DiscrepancyCause::LikelyQuickCancellation,
            applies: is_quick_cancellation,
        },
        Rule {
            cause: DiscrepancyCause::ExpectedNonWebChannel,
            applies: is_non_web_opportunity,
        },
    ]
}

/// Cause for one record, or `None` when it matched.
pub fn classify_one(
    record: &ReconRecord,
    rules: &[Rule],
    ctx: &RuleContext<'_>,
) -> Option<DiscrepancyCause> {
    if record.match_status == MatchStatus::Matched {
        return None;
    }
    let cause = rules
        .iter()
        .find(|rule| (rule.applies)(record, ctx))
        .map(|rule| rule.cause)
        .unwrap_or(DiscrepancyCause::UnexplainedNeedsInvestigation);
    Some(cause)
}

/// Classify every record in place. Rows are independent, so this runs in parallel.
pub fn classify_records(records: &mut [ReconRecord], rules: &[Rule], ctx: &RuleContext<'_>) {
    records
        .par_iter_mut()
        .for_each(|r| r.discrepancy_cause = classify_one(r, rules, ctx));

    let unexplained = records
        .iter()
        .filter(|r| r.discrepancy_cause == Some(DiscrepancyCause::UnexplainedNeedsInvestigation))
        .count();
    tracing::debug!(records = records.len(), unexplained, "classified discrepancies");
}

// ---------------------------------------------------------------------------
// Predicates
// ---------------------------------------------------------------------------

fn is_low_value_source_only(record: &ReconRecord, ctx: &RuleContext<'_>) -> bool {
    record.match_status == MatchStatus::SourceOnly
        && record
            .amount_source_cents
            .is_some_and(|amt| amt < ctx.config.low_value_threshold_cents)
}

/// A source-only booking that was cancelled (or simply not yet synced)
/// within the processing delay plus cancellation window.
fn is_quick_cancellation(record: &ReconRecord, ctx: &RuleContext<'_>) -> bool {
    if record.match_status != MatchStatus::SourceOnly {
        return false;
    }
    let Some(booked_at) = record.source_time else {
        return false;
    };
    let Some(horizon) = ctx.config.cancellation_horizon().map(|h| h.num_seconds()) else {
        return false;
    };

    let cancelled_in_window = ctx
        .cancelled
        .get(&record.transaction_id)
        .is_some_and(|cancelled_at| (*cancelled_at - booked_at).num_seconds().abs() <= horizon);

    let too_recent = ctx.config.as_of.is_some_and(|as_of| {
        let age = (as_of - booked_at).num_seconds();
        (0..=horizon).contains(&age)
    });

    cancelled_in_window || too_recent
}

fn is_non_web_opportunity(record: &ReconRecord, ctx: &RuleContext<'_>) -> bool {
    record.match_status == MatchStatus::OpportunityOnly
        && record
            .channel
            .as_deref()
            .is_some_and(|ch| ctx.config.is_non_web_channel(ch))
}
