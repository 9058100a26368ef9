//! Record normalization
//!
//! Turns raw rows into [`MessageRecord`]s: timestamps become ISO-8601 strings,
//! binary values become text, and every column lands either in a role field or
//! in the passthrough map.

use std::fmt::Write as _;

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, SecondsFormat};
use serde_json::{Number, Value};

use crate::models::{DatabaseDescriptor, FieldValue, MessageRecord, RawRow};
use crate::resolver::SelectPlan;
use crate::schema::Role;

/// Values above this are millisecond epochs.
pub const MILLIS_THRESHOLD: f64 = 1e12;
/// Values above this (and not above [`MILLIS_THRESHOLD`]) are second epochs.
pub const SECONDS_THRESHOLD: f64 = 1e9;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Normalize a time-like value to an ISO-8601 string.
///
/// Numbers are read as epoch milliseconds or seconds depending on magnitude;
/// numbers too small to be either give `None`. Strings that parse as ISO-8601
/// are re-rendered, other strings come back unchanged.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn normalize_timestamp(value: &FieldValue) -> Option<String> {
    match value {
        FieldValue::Null => None,
        FieldValue::Integer(i) => epoch_to_iso(*i as f64),
        FieldValue::Real(f) => epoch_to_iso(*f),
        FieldValue::Text(text) => Some(normalize_time_text(text)),
        FieldValue::Blob(bytes) => Some(normalize_time_text(&decode_bytes(bytes))),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn epoch_to_iso(value: f64) -> Option<String> {
    if !value.is_finite() {
        return None;
    }
    let millis = if value > MILLIS_THRESHOLD {
        value
    } else if value > SECONDS_THRESHOLD {
        value * 1000.0
    } else {
        return None;
    };

    DateTime::from_timestamp_millis(millis.round() as i64)
        .map(|utc| utc.with_timezone(&Local).to_rfc3339_opts(SecondsFormat::AutoSi, false))
}

fn normalize_time_text(text: &str) -> String {
    let trimmed = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return dt.to_rfc3339_opts(SecondsFormat::AutoSi, false);
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return naive.format("%Y-%m-%dT%H:%M:%S%.f").to_string();
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return format!("{}T00:00:00", date.format("%Y-%m-%d"));
    }

    text.to_string()
}

/// Bytes as UTF-8 text, or lowercase hex when they are not valid UTF-8.
#[must_use]
pub fn decode_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut hex, byte| {
            let _ = write!(hex, "{byte:02x}");
            hex
        }),
    }
}

/// Convert a field to JSON without ever failing or dropping it.
#[must_use]
pub fn decode_field(value: &FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::Null,
        FieldValue::Integer(i) => Value::from(*i),
        FieldValue::Real(f) => Number::from_f64(*f).map_or_else(|| Value::String(f.to_string()), Value::Number),
        FieldValue::Text(text) => Value::String(text.clone()),
        FieldValue::Blob(bytes) => Value::String(decode_bytes(bytes)),
    }
}

/// Assemble the record for one row fetched with `plan`.
///
/// `extracted_at` is stamped here, per row.
#[must_use]
pub fn build_record(descriptor: &DatabaseDescriptor, table: &str, plan: &SelectPlan, row: &RawRow) -> MessageRecord {
    let mut record = MessageRecord::new(descriptor, table);

    for (column, value) in plan.columns.iter().zip(row) {
        let decoded = decode_field(value);

        if !plan.roles.claims(column) {
            record.insert_passthrough(column, decoded);
            continue;
        }
        if value.is_null() {
            continue;
        }

        for role in plan.roles.record_roles_for(column) {
            match role {
                Role::Time => {
                    record.timestamp = normalize_timestamp(value);
                    record.timestamp_raw = Some(decoded.clone());
                },
                Role::Sender => record.sender = Some(decoded.clone()),
                Role::Content => record.content = Some(decoded.clone()),
                Role::Msgid => record.message_id = Some(decoded.clone()),
                Role::Type => record.message_type = Some(decoded.clone()),
                Role::Status | Role::Source => {},
            }
        }
    }

    record
}
