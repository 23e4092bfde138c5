//! Roll record-level outcomes up into the summary report.
//!
//! Every percentage in a breakdown family is taken against the total record
//! count, so each family sums to 100 (or is all zeros for an empty run).

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::model::{
    AttributionStatus, Breakdown, CauseCounts, ChannelCount, DailyMatchRate, DiscrepancyCause,
    MatchStatus, ReconRecord, ReconSummary, RevenueSummary, Share, SideCounts,
};

/// Compute summary statistics from classified records.
pub fn compute_summary(records: &[ReconRecord]) -> ReconSummary {
    let total = records.len();

    let match_breakdown = breakdown(
        total,
        MatchStatus::ALL
            .iter()
            .map(|s| (s.to_string(), records.iter().filter(|r| r.match_status == *s).count())),
    );

    let attribution_breakdown = breakdown(
        total,
        AttributionStatus::ALL.iter().map(|s| {
            (
                s.to_string(),
                records.iter().filter(|r| r.attribution_status == *s).count(),
            )
        }),
    );

    let tokened = records.iter().filter(|r| r.has_any_token()).count();
    let attribution_coverage_pct = (tokened > 0).then(|| {
        pct(
            attribution_breakdown.count(&AttributionStatus::Attributed.to_string()),
            tokened,
        )
    });

    ReconSummary {
        total_records: total,
        match_breakdown,
        attribution_breakdown,
        attribution_coverage_pct,
        discrepancy_breakdown: discrepancy_breakdown(records),
        opportunity_only_by_channel: channel_breakdown(records),
        revenue: revenue_summary(records),
        daily: daily_match_rate(records),
    }
}

fn pct(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 * 100.0 / total as f64
    }
}

fn breakdown(total: usize, counts: impl Iterator<Item = (String, usize)>) -> Breakdown {
    Breakdown(
        counts
            .map(|(label, count)| Share {
                label,
                count,
                pct: pct(count, total),
            })
            .collect(),
    )
}

fn discrepancy_breakdown(records: &[ReconRecord]) -> Vec<CauseCounts> {
    DiscrepancyCause::ALL
        .iter()
        .map(|cause| {
            let mut counts = SideCounts::default();
            for r in records.iter().filter(|r| r.discrepancy_cause == Some(*cause)) {
                match r.match_status {
                    MatchStatus::SourceOnly => counts.source_only += 1,
                    MatchStatus::OpportunityOnly => counts.opportunity_only += 1,
                    MatchStatus::Matched => {}
                }
            }
            CauseCounts {
                cause: *cause,
                counts,
            }
        })
        .collect()
}

/// Opportunity-only records per booking channel, most frequent first.
fn channel_breakdown(records: &[ReconRecord]) -> Vec<ChannelCount> {
    let mut by_channel: BTreeMap<String, usize> = BTreeMap::new();
    for r in records
        .iter()
        .filter(|r| r.match_status == MatchStatus::OpportunityOnly)
    {
        let channel = match r.channel.as_deref().map(str::trim) {
            Some(ch) if !ch.is_empty() => ch.to_string(),
            _ => "(none)".to_string(),
        };
        *by_channel.entry(channel).or_insert(0) += 1;
    }

    let mut out: Vec<ChannelCount> = by_channel
        .into_iter()
        .map(|(channel, count)| ChannelCount { channel, count })
        .collect();
    // Stable sort keeps the BTreeMap's alphabetical order among ties.
    out.sort_by(|a, b| b.count.cmp(&a.count));
    out
}

fn revenue_summary(records: &[ReconRecord]) -> RevenueSummary {
    let mut rev = RevenueSummary::default();

    for r in records
        .iter()
        .filter(|r| r.match_status == MatchStatus::Matched)
    {
        let (Some(src), Some(opp)) = (r.amount_source_cents, r.amount_opportunity_cents) else {
            continue;
        };
        rev.matched_records += 1;
        let (src, opp) = (i128::from(src), i128::from(opp));
        rev.source_total_cents += src;
        rev.opportunity_total_cents += opp;
        rev.abs_variance_cents += (src - opp).abs();
        if r.within_tolerance.unwrap_or(true) {
            rev.within_tolerance += 1;
        } else {
            rev.outside_tolerance += 1;
        }
    }

    rev.net_difference_cents = rev.source_total_cents - rev.opportunity_total_cents;
    if rev.source_total_cents != 0 {
        let base = rev.source_total_cents as f64;
        rev.net_difference_pct = Some(rev.net_difference_cents as f64 * 100.0 / base);
        rev.accuracy_pct = Some(100.0 * (1.0 - rev.abs_variance_cents as f64 / base.abs()));
    }
    rev
}

fn daily_match_rate(records: &[ReconRecord]) -> Vec<DailyMatchRate> {
    let mut days: BTreeMap<NaiveDate, (usize, usize)> = BTreeMap::new();
    for r in records {
        let Some(date) = r.date() else {
            continue;
        };
        let entry = days.entry(date).or_insert((0, 0));
        entry.0 += 1;
        if r.match_status == MatchStatus::Matched {
            entry.1 += 1;
        }
    }

    days.into_iter()
        .map(|(date, (total, matched))| DailyMatchRate {
            date,
            total,
            matched,
            match_rate_pct: pct(matched, total),
        })
        .collect()
}
