//! Quality gate: per-relation filtering before matching.
//!
//! Exclusions are applied in a fixed order and each excluded row is counted
//! exactly once, under the first reason that applies:
//! 1. unkeyed (null/empty transaction id)
//! 2. test actor (source side) / cancelled stage (opportunity side)
//! 3. duplicate key (keep first by input order)
//!
//! Stage and actor filters run before duplicate detection so that a cancelled
//! row never shadows a later live row with the same key.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDateTime;

use crate::config::{DuplicatePolicy, QualityConfig};
use crate::error::ReconError;
use crate::model::{Side, SideQuality, SourceEvent, SourceOpportunity};

/// Source rows eligible for matching.
#[derive(Debug, Clone)]
pub struct GatedEvents {
    pub rows: Vec<SourceEvent>,
    pub quality: SideQuality,
}

/// Opportunity rows eligible for matching, plus cancellation evidence.
#[derive(Debug, Clone)]
pub struct GatedOpportunities {
    pub rows: Vec<SourceOpportunity>,
    /// First cancelled-stage timestamp per key. Never matched, only consulted
    /// by the classifier.
    pub cancelled: BTreeMap<String, NaiveDateTime>,
    pub quality: SideQuality,
}

pub fn gate_events(rows: &[SourceEvent], config: &QualityConfig) -> Result<GatedEvents, ReconError> {
    let mut quality = SideQuality {
        raw_rows: rows.len(),
        ..SideQuality::default()
    };
    let mut keys = KeyTracker::new(Side::Source, config.duplicate_policy);
    let mut eligible = Vec::with_capacity(rows.len());

    for row in rows {
        let Some(key) = row.transaction_id.as_deref() else {
            quality.unkeyed += 1;
            continue;
        };
        if config.is_test_actor(&row.actor_id) {
            quality.test_actor += 1;
            continue;
        }
        if !keys.admit(key)? {
            quality.duplicates += 1;
            continue;
        }
        eligible.push(row.clone());
    }

    quality.eligible = eligible.len();
    log_quality(Side::Source, &quality);

    Ok(GatedEvents {
        rows: eligible,
        quality,
    })
}

pub fn gate_opportunities(
    rows: &[SourceOpportunity],
    config: &QualityConfig,
) -> Result<GatedOpportunities, ReconError> {
    let mut quality = SideQuality {
        raw_rows: rows.len(),
        ..SideQuality::default()
    };
    let mut keys = KeyTracker::new(Side::Opportunity, config.duplicate_policy);
    let mut cancelled = BTreeMap::new();
    let mut eligible = Vec::with_capacity(rows.len());

    for row in rows {
        let Some(key) = row.transaction_id.as_deref() else {
            quality.unkeyed += 1;
            continue;
        };
        if config.is_cancelled(&row.stage) {
            quality.cancelled += 1;
            cancelled.entry(key.to_string()).or_insert(row.event_time);
            continue;
        }
        if !keys.admit(key)? {
            quality.duplicates += 1;
            continue;
        }
        eligible.push(row.clone());
    }

    quality.eligible = eligible.len();
    log_quality(Side::Opportunity, &quality);

    Ok(GatedOpportunities {
        rows: eligible,
        cancelled,
        quality,
    })
}

/// Tracks keys already admitted from one relation.
struct KeyTracker {
    side: Side,
    policy: DuplicatePolicy,
    seen: HashSet<String>,
}

impl KeyTracker {
    fn new(side: Side, policy: DuplicatePolicy) -> Self {
        Self {
            side,
            policy,
            seen: HashSet::new(),
        }
    }

    /// `Ok(true)` for the first occurrence of a key, `Ok(false)` for a repeat.
    fn admit(&mut self, key: &str) -> Result<bool, ReconError> {
        if self.seen.insert(key.to_string()) {
            return Ok(true);
        }
        match self.policy {
            DuplicatePolicy::KeepFirst => Ok(false),
            DuplicatePolicy::Reject => Err(ReconError::DuplicateKey {
                side: self.side,
                transaction_id: key.to_string(),
            }),
        }
    }
}

fn log_quality(side: Side, q: &SideQuality) {
    tracing::debug!(
        %side,
        raw = q.raw_rows,
        eligible = q.eligible,
        unkeyed = q.unkeyed,
        test_actor = q.test_actor,
        cancelled = q.cancelled,
        duplicates = q.duplicates,
        "quality gate"
    );
    if q.unkeyed > 0 {
        tracing::warn!(%side, count = q.unkeyed, "rows without a transaction id are unrecoverable");
    }
    if q.duplicates > 0 {
        tracing::warn!(%side, count = q.duplicates, "duplicate transaction ids dropped (kept first)");
    }
}
