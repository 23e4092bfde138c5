use std::collections::HashSet;

use chrono::{NaiveDateTime, TimeDelta};
use serde::Deserialize;

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ReconConfig {
    pub name: String,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub quality: QualityConfig,
    pub classify: ClassifyConfig,
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub source: EventSourceConfig,
    #[serde(default)]
    pub opportunity: OpportunitySourceConfig,
}

/// Web-analytics side. `file` is only needed when the CLI loads the relation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventSourceConfig {
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub columns: EventColumns,
}

/// CRM side.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpportunitySourceConfig {
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub columns: OpportunityColumns,
}

// ---------------------------------------------------------------------------
// Column mapping
// ---------------------------------------------------------------------------

/// Logical column → physical CSV header. Unmapped columns use their canonical name.
#[derive(Debug, Clone, Deserialize)]
pub struct EventColumns {
    #[serde(default = "col_transaction_id")]
    pub transaction_id: String,
    #[serde(default = "col_amount")]
    pub amount: String,
    #[serde(default = "col_attribution_token")]
    pub attribution_token: String,
    #[serde(default = "col_actor_id")]
    pub actor_id: String,
    #[serde(default = "col_event_time")]
    pub event_time: String,
}

impl Default for EventColumns {
    fn default() -> Self {
        Self {
            transaction_id: col_transaction_id(),
            amount: col_amount(),
            attribution_token: col_attribution_token(),
            actor_id: col_actor_id(),
            event_time: col_event_time(),
        }
    }
}

impl EventColumns {
    fn headers(&self) -> [&str; 5] {
        [
            &self.transaction_id,
            &self.amount,
            &self.attribution_token,
            &self.actor_id,
            &self.event_time,
        ]
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpportunityColumns {
    #[serde(default = "col_transaction_id")]
    pub transaction_id: String,
    #[serde(default = "col_amount")]
    pub amount: String,
    #[serde(default = "col_attribution_token")]
    pub attribution_token: String,
    #[serde(default = "col_stage")]
    pub stage: String,
    #[serde(default = "col_channel")]
    pub channel: String,
    #[serde(default = "col_event_time")]
    pub event_time: String,
}

impl Default for OpportunityColumns {
    fn default() -> Self {
        Self {
            transaction_id: col_transaction_id(),
            amount: col_amount(),
            attribution_token: col_attribution_token(),
            stage: col_stage(),
            channel: col_channel(),
            event_time: col_event_time(),
        }
    }
}

impl OpportunityColumns {
    fn headers(&self) -> [&str; 6] {
        [
            &self.transaction_id,
            &self.amount,
            &self.attribution_token,
            &self.stage,
            &self.channel,
            &self.event_time,
        ]
    }
}

fn col_transaction_id() -> String {
    "transaction_id".into()
}
fn col_amount() -> String {
    "amount".into()
}
fn col_attribution_token() -> String {
    "attribution_token".into()
}
fn col_actor_id() -> String {
    "actor_id".into()
}
fn col_stage() -> String {
    "stage".into()
}
fn col_channel() -> String {
    "channel".into()
}
fn col_event_time() -> String {
    "event_time".into()
}

// ---------------------------------------------------------------------------
// Quality gate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct QualityConfig {
    /// Actor ids that mark internal test traffic (exact match).
    #[serde(default = "default_test_actors")]
    pub test_actors: Vec<String>,
    /// Actor id prefixes that mark internal test traffic.
    #[serde(default)]
    pub test_actor_prefixes: Vec<String>,
    /// Terminal stages excluded before matching. Compared case-insensitively.
    #[serde(default = "default_cancelled_stages")]
    pub cancelled_stages: Vec<String>,
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            test_actors: default_test_actors(),
            test_actor_prefixes: Vec::new(),
            cancelled_stages: default_cancelled_stages(),
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

impl QualityConfig {
    pub fn is_test_actor(&self, actor_id: &str) -> bool {
        self.test_actors.iter().any(|a| a == actor_id)
            || self
                .test_actor_prefixes
                .iter()
                .any(|p| actor_id.starts_with(p.as_str()))
    }

    pub fn is_cancelled(&self, stage: &str) -> bool {
        let stage = stage.trim();
        self.cancelled_stages
            .iter()
            .any(|s| s.eq_ignore_ascii_case(stage))
    }
}

fn default_test_actors() -> Vec<String> {
    vec!["test_user_internal".into()]
}

fn default_cancelled_stages() -> Vec<String> {
    vec!["Cancelled".into()]
}

/// What to do when a transaction id repeats within one relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Keep the first occurrence by input order, count and drop the rest.
    #[default]
    KeepFirst,
    /// Abort the run on the first repeated id.
    Reject,
}

impl std::fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeepFirst => write!(f, "keep_first"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

// ---------------------------------------------------------------------------
// Classification thresholds
// ---------------------------------------------------------------------------

/// Every threshold is required; a missing one fails deserialization.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifyConfig {
    pub low_value_threshold_cents: i64,
    pub cancellation_window_minutes: i64,
    /// Typical lag between a web booking and its CRM record.
    #[serde(default)]
    pub processing_delay_minutes: i64,
    pub variance_tolerance: VarianceTolerance,
    pub non_web_channels: Vec<String>,
    /// Snapshot time. Enables the age-based quick-cancellation signal.
    #[serde(default)]
    pub as_of: Option<NaiveDateTime>,
}

impl ClassifyConfig {
    /// Quick-cancellation horizon: processing delay plus cancellation window.
    /// `None` when the sum does not fit a `TimeDelta`.
    pub fn cancellation_horizon(&self) -> Option<TimeDelta> {
        self.processing_delay_minutes
            .checked_add(self.cancellation_window_minutes)
            .and_then(TimeDelta::try_minutes)
    }

    pub fn is_non_web_channel(&self, channel: &str) -> bool {
        let channel = channel.trim();
        self.non_web_channels
            .iter()
            .any(|c| c.eq_ignore_ascii_case(channel))
    }
}

/// Acceptable amount variance on a matched record.
///
/// `{ amount_cents = 50 }` or `{ percent = 0.5 }` (percent of the source amount).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceTolerance {
    AmountCents(i64),
    Percent(f64),
}

impl VarianceTolerance {
    pub fn allows(&self, variance_cents: i64, reference_cents: i64) -> bool {
        match *self {
            Self::AmountCents(limit) => variance_cents.checked_abs().is_some_and(|v| v <= limit),
            Self::Percent(pct) => {
                if reference_cents == 0 {
                    return variance_cents == 0;
                }
                variance_cents.unsigned_abs() as f64 <= reference_cents.unsigned_abs() as f64 * pct / 100.0
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.name.trim().is_empty() {
            return Err(ReconError::ConfigValidation("name must not be empty".into()));
        }

        let c = &self.classify;
        if c.low_value_threshold_cents < 0 {
            return Err(ReconError::ConfigValidation(format!(
                "low_value_threshold_cents must be >= 0, got {}",
                c.low_value_threshold_cents
            )));
        }
        if c.cancellation_window_minutes < 0 {
            return Err(ReconError::ConfigValidation(format!(
                "cancellation_window_minutes must be >= 0, got {}",
                c.cancellation_window_minutes
            )));
        }
        if c.processing_delay_minutes < 0 {
            return Err(ReconError::ConfigValidation(format!(
                "processing_delay_minutes must be >= 0, got {}",
                c.processing_delay_minutes
            )));
        }
        if c.cancellation_horizon().is_none() {
            return Err(ReconError::ConfigValidation(format!(
                "processing_delay_minutes + cancellation_window_minutes is out of range ({} + {})",
                c.processing_delay_minutes, c.cancellation_window_minutes
            )));
        }
        match c.variance_tolerance {
            VarianceTolerance::AmountCents(v) if v < 0 => {
                return Err(ReconError::ConfigValidation(format!(
                    "variance_tolerance.amount_cents must be >= 0, got {v}"
                )));
            }
            VarianceTolerance::Percent(p) if !(p >= 0.0 && p.is_finite()) => {
                return Err(ReconError::ConfigValidation(format!(
                    "variance_tolerance.percent must be a finite value >= 0, got {p}"
                )));
            }
            _ => {}
        }
        if c.non_web_channels.iter().all(|ch| ch.trim().is_empty()) {
            return Err(ReconError::ConfigValidation(
                "non_web_channels must list at least one channel".into(),
            ));
        }

        if self.quality.cancelled_stages.is_empty() {
            return Err(ReconError::ConfigValidation(
                "quality.cancelled_stages must not be empty".into(),
            ));
        }

        check_distinct("sources.source.columns", &self.sources.source.columns.headers())?;
        check_distinct(
            "sources.opportunity.columns",
            &self.sources.opportunity.columns.headers(),
        )?;

        Ok(())
    }
}

/// Each physical header may back at most one logical column.
fn check_distinct(section: &str, headers: &[&str]) -> Result<(), ReconError> {
    let mut seen = HashSet::new();
    for h in headers {
        if !seen.insert(*h) {
            return Err(ReconError::ConfigValidation(format!(
                "{section}: header '{h}' is mapped to more than one column"
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
