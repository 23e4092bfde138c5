use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Which relation a row or finding came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Source,
    Opportunity,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Opportunity => write!(f, "opportunity"),
        }
    }
}

/// A staged web-analytics purchase event.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceEvent {
    pub transaction_id: Option<String>,
    pub amount_cents: i64,
    pub attribution_token: Option<String>,
    pub actor_id: String,
    pub event_time: NaiveDateTime,
}

/// A staged CRM opportunity.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceOpportunity {
    pub transaction_id: Option<String>,
    pub amount_cents: i64,
    pub attribution_token: Option<String>,
    pub stage: String,
    pub channel: String,
    pub event_time: NaiveDateTime,
}

/// Both staged relations, in input order.
#[derive(Debug, Clone, Default)]
pub struct ReconInput {
    pub events: Vec<SourceEvent>,
    pub opportunities: Vec<SourceOpportunity>,
}

// ---------------------------------------------------------------------------
// Record-level outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Matched,
    SourceOnly,
    OpportunityOnly,
}

impl MatchStatus {
    pub const ALL: [MatchStatus; 3] = [Self::Matched, Self::SourceOnly, Self::OpportunityOnly];
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Matched => write!(f, "matched"),
            Self::SourceOnly => write!(f, "source_only"),
            Self::OpportunityOnly => write!(f, "opportunity_only"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionStatus {
    Attributed,
    LostInOpportunity,
    LostInSource,
    /// Both sides carry a token and they differ.
    TokenMismatch,
    NoToken,
}

impl AttributionStatus {
    pub const ALL: [AttributionStatus; 5] = [
        Self::Attributed,
        Self::LostInOpportunity,
        Self::LostInSource,
        Self::TokenMismatch,
        Self::NoToken,
    ];
}

impl std::fmt::Display for AttributionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Attributed => write!(f, "attributed"),
            Self::LostInOpportunity => write!(f, "lost_in_opportunity"),
            Self::LostInSource => write!(f, "lost_in_source"),
            Self::TokenMismatch => write!(f, "token_mismatch"),
            Self::NoToken => write!(f, "no_token"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyCause {
    PossibleTestOrFraud,
    LikelyQuickCancellation,
    ExpectedNonWebChannel,
    UnexplainedNeedsInvestigation,
}

impl DiscrepancyCause {
    pub const ALL: [DiscrepancyCause; 4] = [
        Self::PossibleTestOrFraud,
        Self::LikelyQuickCancellation,
        Self::ExpectedNonWebChannel,
        Self::UnexplainedNeedsInvestigation,
    ];
}

impl std::fmt::Display for DiscrepancyCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PossibleTestOrFraud => write!(f, "possible_test_or_fraud"),
            Self::LikelyQuickCancellation => write!(f, "likely_quick_cancellation"),
            Self::ExpectedNonWebChannel => write!(f, "expected_non_web_channel"),
            Self::UnexplainedNeedsInvestigation => write!(f, "unexplained_needs_investigation"),
        }
    }
}

/// One record per distinct transaction id seen on either cleaned side.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconRecord {
    pub transaction_id: String,
    pub match_status: MatchStatus,
    pub attribution_status: AttributionStatus,
    pub amount_source_cents: Option<i64>,
    pub amount_opportunity_cents: Option<i64>,
    /// `amount_source - amount_opportunity`, matched records only.
    pub variance_cents: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub within_tolerance: Option<bool>,
    pub discrepancy_cause: Option<DiscrepancyCause>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_opportunity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_time: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opportunity_time: Option<NaiveDateTime>,
    /// Minutes from source event to opportunity creation, matched records only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_diff_minutes: Option<i64>,
}

impl ReconRecord {
    /// Reporting date: source event date, else opportunity date.
    pub fn date(&self) -> Option<NaiveDate> {
        self.source_time
            .or(self.opportunity_time)
            .map(|t| t.date())
    }

    pub fn has_any_token(&self) -> bool {
        self.token_source.is_some() || self.token_opportunity.is_some()
    }
}

// ---------------------------------------------------------------------------
// Quality gate
// ---------------------------------------------------------------------------

/// Row accounting for one relation. `raw_rows = excluded() + eligible`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SideQuality {
    pub raw_rows: usize,
    pub unkeyed: usize,
    pub test_actor: usize,
    pub cancelled: usize,
    pub duplicates: usize,
    pub eligible: usize,
}

impl SideQuality {
    pub fn excluded(&self) -> usize {
        self.unkeyed + self.test_actor + self.cancelled + self.duplicates
    }

    pub fn accounts_for_all_rows(&self) -> bool {
        self.excluded() + self.eligible == self.raw_rows
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QualityReport {
    pub source: SideQuality,
    pub opportunity: SideQuality,
}

// ---------------------------------------------------------------------------
// Summary + Output
// ---------------------------------------------------------------------------

/// Count and percentage of one label within a breakdown family.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Share {
    pub label: String,
    pub count: usize,
    pub pct: f64,
}

/// Ordered label → share list. Percentages are of the total record count.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Breakdown(pub Vec<Share>);

impl Breakdown {
    pub fn get(&self, label: &str) -> Option<&Share> {
        self.0.iter().find(|s| s.label == label)
    }

    pub fn count(&self, label: &str) -> usize {
        self.get(label).map(|s| s.count).unwrap_or(0)
    }

    pub fn total_count(&self) -> usize {
        self.0.iter().map(|s| s.count).sum()
    }

    pub fn total_pct(&self) -> f64 {
        self.0.iter().map(|s| s.pct).sum()
    }
}

/// Discrepancy counts for one cause, by the side the record came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SideCounts {
    pub source_only: usize,
    pub opportunity_only: usize,
}

impl SideCounts {
    pub fn total(&self) -> usize {
        self.source_only + self.opportunity_only
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CauseCounts {
    pub cause: DiscrepancyCause,
    #[serde(flatten)]
    pub counts: SideCounts,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelCount {
    pub channel: String,
    pub count: usize,
}

/// Totals are `i128` so sums of many large `i64` amounts cannot overflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RevenueSummary {
    pub matched_records: usize,
    pub within_tolerance: usize,
    pub outside_tolerance: usize,
    pub source_total_cents: i128,
    pub opportunity_total_cents: i128,
    /// `source_total - opportunity_total`.
    pub net_difference_cents: i128,
    pub net_difference_pct: Option<f64>,
    pub abs_variance_cents: i128,
    /// `100 * (1 - abs_variance / source_total)`.
    pub accuracy_pct: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyMatchRate {
    pub date: NaiveDate,
    pub total: usize,
    pub matched: usize,
    pub match_rate_pct: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconSummary {
    pub total_records: usize,
    pub match_breakdown: Breakdown,
    pub attribution_breakdown: Breakdown,
    /// Attributed records among those where either side carries a token.
    pub attribution_coverage_pct: Option<f64>,
    pub discrepancy_breakdown: Vec<CauseCounts>,
    pub opportunity_only_by_channel: Vec<ChannelCount>,
    pub revenue: RevenueSummary,
    pub daily: Vec<DailyMatchRate>,
}

impl ReconSummary {
    pub fn cause_count(&self, cause: DiscrepancyCause) -> usize {
        self.discrepancy_breakdown
            .iter()
            .find(|c| c.cause == cause)
            .map(|c| c.counts.total())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconMeta {
    pub config_name: String,
    pub engine_version: String,
    pub run_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconResult {
    pub meta: ReconMeta,
    pub quality: QualityReport,
    pub summary: ReconSummary,
    pub records: Vec<ReconRecord>,
}
