use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;

use crate::config::VarianceTolerance;
use crate::model::{AttributionStatus, MatchStatus, ReconRecord, SourceEvent, SourceOpportunity};

/// Full outer join of gated events and opportunities on exact transaction id.
///
/// Emits one record per distinct key across both sides, ordered by key.
/// Keys compare byte-for-byte. Rows without a key are skipped; the quality
/// gate has already counted them. If a key repeats on one side the first row
/// wins, matching the gate's keep-first rule.
pub fn match_exact_key(
    events: &[SourceEvent],
    opportunities: &[SourceOpportunity],
    tolerance: &VarianceTolerance,
) -> Vec<ReconRecord> {
    let mut source_map: BTreeMap<&str, &SourceEvent> = BTreeMap::new();
    for e in events {
        if let Some(key) = e.transaction_id.as_deref() {
            source_map.entry(key).or_insert(e);
        }
    }

    let mut opp_map: BTreeMap<&str, &SourceOpportunity> = BTreeMap::new();
    for o in opportunities {
        if let Some(key) = o.transaction_id.as_deref() {
            opp_map.entry(key).or_insert(o);
        }
    }

    let keys: BTreeSet<&str> = source_map.keys().chain(opp_map.keys()).copied().collect();

    let records: Vec<ReconRecord> = keys
        .into_iter()
        .map(|key| {
            build_record(
                key,
                source_map.get(key).copied(),
                opp_map.get(key).copied(),
                tolerance,
            )
        })
        .collect();

    tracing::debug!(
        source_keys = source_map.len(),
        opportunity_keys = opp_map.len(),
        records = records.len(),
        "exact-key join"
    );

    records
}

fn build_record(
    key: &str,
    source: Option<&SourceEvent>,
    opp: Option<&SourceOpportunity>,
    tolerance: &VarianceTolerance,
) -> ReconRecord {
    let match_status = match (source, opp) {
        (Some(_), Some(_)) => MatchStatus::Matched,
        (Some(_), None) => MatchStatus::SourceOnly,
        (None, Some(_)) => MatchStatus::OpportunityOnly,
        (None, None) => unreachable!("key '{key}' came from one of the two maps"),
    };

    let token_source = source.and_then(|s| s.attribution_token.clone());
    let token_opportunity = opp.and_then(|o| o.attribution_token.clone());
    let attribution_status =
        attribution_status(token_source.as_deref(), token_opportunity.as_deref());

    let amount_source_cents = source.map(|s| s.amount_cents);
    let amount_opportunity_cents = opp.map(|o| o.amount_cents);

    let (variance_cents, within_tolerance, time_diff_minutes) = match (source, opp) {
        (Some(s), Some(o)) => {
            let variance = s.amount_cents.saturating_sub(o.amount_cents);
            (
                Some(variance),
                Some(tolerance.allows(variance, s.amount_cents)),
                Some(minute_boundaries(s.event_time, o.event_time)),
            )
        }
        _ => (None, None, None),
    };

    ReconRecord {
        transaction_id: key.to_string(),
        match_status,
        attribution_status,
        amount_source_cents,
        amount_opportunity_cents,
        variance_cents,
        within_tolerance,
        discrepancy_cause: None,
        token_source,
        token_opportunity,
        channel: opp.map(|o| o.channel.clone()),
        source_time: source.map(|s| s.event_time),
        opportunity_time: opp.map(|o| o.event_time),
        time_diff_minutes,
    }
}

/// Attribution sub-match. An absent side contributes a null token.
pub fn attribution_status(source: Option<&str>, opportunity: Option<&str>) -> AttributionStatus {
    match (source, opportunity) {
        (Some(s), Some(o)) if s == o => AttributionStatus::Attributed,
        (Some(_), Some(_)) => AttributionStatus::TokenMismatch,
        (Some(_), None) => AttributionStatus::LostInOpportunity,
        (None, Some(_)) => AttributionStatus::LostInSource,
        (None, None) => AttributionStatus::NoToken,
    }
}

/// Signed count of minute boundaries crossed going from `from` to `to`.
/// Seconds inside a minute are ignored, so 10:00:59 to 10:01:00 counts one.
pub fn minute_boundaries(from: NaiveDateTime, to: NaiveDateTime) -> i64 {
    let minute = |t: NaiveDateTime| t.and_utc().timestamp().div_euclid(60);
    minute(to) - minute(from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 10, 5)
            .unwrap()
            .and_hms_opt(10, minute, 0)
            .unwrap()
    }

    fn event(key: &str, cents: i64, token: Option<&str>) -> SourceEvent {
        SourceEvent {
            transaction_id: Some(key.into()),
            amount_cents: cents,
            attribution_token: token.map(Into::into),
            actor_id: "user_1".into(),
            event_time: at(0),
        }
    }

    fn opp(key: &str, cents: i64, token: Option<&str>) -> SourceOpportunity {
        SourceOpportunity {
            transaction_id: Some(key.into()),
            amount_cents: cents,
            attribution_token: token.map(Into::into),
            stage: "Confirmed".into(),
            channel: "google".into(),
            event_time: at(12),
        }
    }

    const EXACT: VarianceTolerance = VarianceTolerance::AmountCents(0);

    #[test]
    fn full_outer_join() {
        let events = vec![event("A", 10000, Some("tokenX")), event("B", 5000, None)];
        let opps = vec![opp("A", 10000, Some("tokenX")), opp("C", 7500, None)];
        let records = match_exact_key(&events, &opps, &EXACT);

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].transaction_id, "A");
        assert_eq!(records[0].match_status, MatchStatus::Matched);
        assert_eq!(records[0].attribution_status, AttributionStatus::Attributed);
        assert_eq!(records[0].variance_cents, Some(0));
        assert_eq!(records[0].within_tolerance, Some(true));
        assert_eq!(records[0].time_diff_minutes, Some(12));

        assert_eq!(records[1].transaction_id, "B");
        assert_eq!(records[1].match_status, MatchStatus::SourceOnly);
        assert_eq!(records[1].amount_source_cents, Some(5000));
        assert_eq!(records[1].amount_opportunity_cents, None);
        assert_eq!(records[1].variance_cents, None);
        assert_eq!(records[1].attribution_status, AttributionStatus::NoToken);

        assert_eq!(records[2].transaction_id, "C");
        assert_eq!(records[2].match_status, MatchStatus::OpportunityOnly);
        assert_eq!(records[2].channel.as_deref(), Some("google"));
        assert!(records.iter().all(|r| r.discrepancy_cause.is_none()));
    }

    #[test]
    fn keys_are_case_sensitive() {
        let events = vec![event("bk1", 100, None)];
        let opps = vec![opp("BK1", 100, None)];
        let records = match_exact_key(&events, &opps, &EXACT);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.match_status != MatchStatus::Matched));
    }

    #[test]
    fn variance_outside_tolerance_still_matched() {
        let events = vec![event("A", 10000, None)];
        let opps = vec![opp("A", 9900, None)];

        let records = match_exact_key(&events, &opps, &EXACT);
        assert_eq!(records[0].match_status, MatchStatus::Matched);
        assert_eq!(records[0].variance_cents, Some(100));
        assert_eq!(records[0].within_tolerance, Some(false));

        let loose = VarianceTolerance::Percent(1.0);
        let records = match_exact_key(&events, &opps, &loose);
        assert_eq!(records[0].within_tolerance, Some(true));
    }

    #[test]
    fn attribution_on_one_sided_records() {
        let events = vec![event("A", 100, Some("tok"))];
        let opps = vec![opp("B", 100, Some("tok"))];
        let records = match_exact_key(&events, &opps, &EXACT);
        assert_eq!(records[0].attribution_status, AttributionStatus::LostInOpportunity);
        assert_eq!(records[1].attribution_status, AttributionStatus::LostInSource);
    }

    #[test]
    fn attribution_table() {
        assert_eq!(attribution_status(Some("x"), Some("x")), AttributionStatus::Attributed);
        assert_eq!(attribution_status(Some("x"), Some("y")), AttributionStatus::TokenMismatch);
        assert_eq!(attribution_status(Some("x"), None), AttributionStatus::LostInOpportunity);
        assert_eq!(attribution_status(None, Some("y")), AttributionStatus::LostInSource);
        assert_eq!(attribution_status(None, None), AttributionStatus::NoToken);
    }

    #[test]
    fn repeated_key_uses_first_row() {
        let events = vec![event("A", 10000, None), event("A", 11000, None)];
        let opps = vec![opp("A", 10000, None)];
        let records = match_exact_key(&events, &opps, &EXACT);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].amount_source_cents, Some(10000));
    }

    #[test]
    fn time_diff_counts_minute_boundaries() {
        let t = |m: u32, sec: u32| {
            NaiveDate::from_ymd_opt(2025, 10, 5)
                .unwrap()
                .and_hms_opt(10, m, sec)
                .unwrap()
        };
        assert_eq!(minute_boundaries(t(0, 59), t(1, 0)), 1);
        assert_eq!(minute_boundaries(t(0, 0), t(0, 59)), 0);
        assert_eq!(minute_boundaries(t(1, 0), t(0, 59)), -1);
        assert_eq!(minute_boundaries(t(0, 30), t(12, 10)), 12);

        let mut late = opp("A", 10000, None);
        late.event_time = t(1, 0);
        let mut early = event("A", 10000, None);
        early.event_time = t(0, 59);
        let records = match_exact_key(&[early], &[late], &EXACT);
        assert_eq!(records[0].time_diff_minutes, Some(1));
    }
}
