//! CSV loading for the two staged relations.
//!
//! Column names come from the config's column mapping; a missing header is a
//! fatal schema error. Values are parsed into typed rows but otherwise left
//! untouched: keys keep their exact case and spacing, since matching is
//! format-sensitive.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::config::{EventColumns, OpportunityColumns, ReconConfig};
use crate::error::ReconError;
use crate::model::{ReconInput, Side, SourceEvent, SourceOpportunity};

/// Load both relations using the config's column mappings.
pub fn load_input(
    config: &ReconConfig,
    source_csv: &str,
    opportunity_csv: &str,
) -> Result<ReconInput, ReconError> {
    Ok(ReconInput {
        events: load_events(source_csv, &config.sources.source.columns)?,
        opportunities: load_opportunities(opportunity_csv, &config.sources.opportunity.columns)?,
    })
}

/// Load web-analytics events in input order.
pub fn load_events(csv_data: &str, columns: &EventColumns) -> Result<Vec<SourceEvent>, ReconError> {
    let side = Side::Source;
    let mut reader = reader(csv_data);
    let [key_idx, amount_idx, token_idx, actor_idx, time_idx] = resolve(
        side,
        &mut reader,
        [
            &columns.transaction_id,
            &columns.amount,
            &columns.attribution_token,
            &columns.actor_id,
            &columns.event_time,
        ],
    )?;

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row = i + 1;
        let transaction_id = nullable(field(&record, key_idx));
        let keyed = transaction_id.is_some();

        rows.push(SourceEvent {
            amount_cents: amount(side, row, field(&record, amount_idx), keyed)?,
            event_time: timestamp(side, row, field(&record, time_idx), keyed)?,
            attribution_token: nullable(field(&record, token_idx)),
            actor_id: field(&record, actor_idx).to_string(),
            transaction_id,
        });
    }

    Ok(rows)
}

/// Load CRM opportunities in input order.
pub fn load_opportunities(
    csv_data: &str,
    columns: &OpportunityColumns,
) -> Result<Vec<SourceOpportunity>, ReconError> {
    let side = Side::Opportunity;
    let mut reader = reader(csv_data);
    let [key_idx, amount_idx, token_idx, stage_idx, channel_idx, time_idx] = resolve(
        side,
        &mut reader,
        [
            &columns.transaction_id,
            &columns.amount,
            &columns.attribution_token,
            &columns.stage,
            &columns.channel,
            &columns.event_time,
        ],
    )?;

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row = i + 1;
        let transaction_id = nullable(field(&record, key_idx));
        let keyed = transaction_id.is_some();

        rows.push(SourceOpportunity {
            amount_cents: amount(side, row, field(&record, amount_idx), keyed)?,
            event_time: timestamp(side, row, field(&record, time_idx), keyed)?,
            attribution_token: nullable(field(&record, token_idx)),
            stage: field(&record, stage_idx).to_string(),
            channel: field(&record, channel_idx).to_string(),
            transaction_id,
        });
    }

    Ok(rows)
}

fn reader(csv_data: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(csv_data.as_bytes())
}

/// Header positions for the required columns, in the order given.
fn resolve<const N: usize>(
    side: Side,
    reader: &mut csv::Reader<&[u8]>,
    names: [&String; N],
) -> Result<[usize; N], ReconError> {
    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let mut out = [0usize; N];
    for (slot, name) in out.iter_mut().zip(names) {
        *slot = headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| ReconError::MissingColumn {
                side,
                column: name.clone(),
            })?;
    }
    Ok(out)
}

fn field(record: &csv::StringRecord, idx: usize) -> &str {
    record.get(idx).unwrap_or("")
}

/// Empty or whitespace-only values are null.
fn nullable(value: &str) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

// Unkeyed rows never reach the matcher, so their value fields are not
// validated; they only need to be counted by the quality gate.

fn amount(side: Side, row: usize, value: &str, keyed: bool) -> Result<i64, ReconError> {
    match parse_amount_cents(value) {
        Some(cents) => Ok(cents),
        None if !keyed => Ok(0),
        None => Err(ReconError::AmountParse {
            side,
            row,
            value: value.into(),
        }),
    }
}

fn timestamp(side: Side, row: usize, value: &str, keyed: bool) -> Result<NaiveDateTime, ReconError> {
    match parse_timestamp(value) {
        Some(ts) => Ok(ts),
        None if !keyed => Ok(NaiveDateTime::default()),
        None => Err(ReconError::TimestampParse {
            side,
            row,
            value: value.into(),
        }),
    }
}

/// Largest accepted amount magnitude, 10^15 currency units in cents.
pub const MAX_AMOUNT_CENTS: i64 = 100_000_000_000_000_000;

/// Parse a decimal amount into integer cents.
///
/// Accepts an optional sign, an integer part, and any number of fractional
/// digits; fractions finer than a cent round half away from zero. Amounts
/// beyond `MAX_AMOUNT_CENTS` are rejected.
pub fn parse_amount_cents(input: &str) -> Option<i64> {
    let s = input.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));

    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit()) || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let whole: i64 = if int_part.is_empty() { 0 } else { int_part.parse().ok()? };
    let mut frac = frac_part.bytes().map(|b| i64::from(b - b'0'));
    let tenths = frac.next().unwrap_or(0);
    let hundredths = frac.next().unwrap_or(0);
    let round_up = frac.next().is_some_and(|d| d >= 5);

    let cents = whole
        .checked_mul(100)?
        .checked_add(tenths * 10 + hundredths + i64::from(round_up))?;
    if cents > MAX_AMOUNT_CENTS {
        return None;
    }
    Some(if negative { -cents } else { cents })
}

/// Parse a timestamp into a UTC-naive datetime.
///
/// Tries RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]` (space or `T`), `YYYY-MM-DD`,
/// `YYYYMMDD`, then an integer epoch: >= 10^14 is microseconds, >= 10^11 is
/// milliseconds, anything smaller is seconds.
pub fn parse_timestamp(input: &str) -> Option<NaiveDateTime> {
    let s = input.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0);
    }
    if s.len() == 8 {
        if let Ok(d) = NaiveDate::parse_from_str(s, "%Y%m%d") {
            return d.and_hms_opt(0, 0, 0);
        }
    }

    let epoch: i64 = s.parse().ok()?;
    let micros = if epoch.abs() >= 100_000_000_000_000 {
        epoch
    } else if epoch.abs() >= 100_000_000_000 {
        epoch.checked_mul(1_000)?
    } else {
        epoch.checked_mul(1_000_000)?
    };
    DateTime::from_timestamp_micros(micros).map(|dt| dt.naive_utc())
}
