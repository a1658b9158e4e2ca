use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::ValueFormat;
use crate::model::attachment::AttachmentRef;
use crate::model::task::{FieldKind, RemoteField};
use crate::providers::TaskSystem;

/// Timestamps above this are taken to be milliseconds.
const MILLIS_THRESHOLD: u64 = 100_000_000_000;

/// Anything the converters accept as a point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DateInput<'a> {
    Unix(i64),
    Text(&'a str),
    Native(DateTime<Utc>),
}

impl<'a> DateInput<'a> {
    pub fn from_json(value: &'a Value) -> Option<Self> {
        match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().and_then(whole_number))
                .map(DateInput::Unix),
            Value::String(s) => Some(DateInput::Text(s)),
            _ => None,
        }
    }
}

impl From<DateTime<Utc>> for DateInput<'_> {
    fn from(value: DateTime<Utc>) -> Self {
        DateInput::Native(value)
    }
}

pub fn fixed_zone(utc_offset_hours: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(utc_offset_hours.checked_mul(3600)?)
}

/// Float timestamps outside the i64 range are rejected rather than saturated.
fn whole_number(f: f64) -> Option<i64> {
    (f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f.trunc() as i64)
}

fn from_unix(value: i64) -> Option<DateTime<Utc>> {
    if value.unsigned_abs() >= MILLIS_THRESHOLD {
        DateTime::<Utc>::from_timestamp_millis(value)
    } else {
        DateTime::<Utc>::from_timestamp(value, 0)
    }
}

enum Parsed {
    Instant(DateTime<Utc>),
    Day(NaiveDate),
}

fn parse(input: DateInput<'_>) -> Option<Parsed> {
    match input {
        DateInput::Unix(secs) => from_unix(secs).map(Parsed::Instant),
        DateInput::Native(dt) => Some(Parsed::Instant(dt)),
        DateInput::Text(text) => {
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            if let Ok(secs) = text.parse::<i64>() {
                return from_unix(secs).map(Parsed::Instant);
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
                return Some(Parsed::Instant(dt.with_timezone(&Utc)));
            }
            for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(text, pattern) {
                    return Some(Parsed::Instant(Utc.from_utc_datetime(&naive)));
                }
            }
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .map(Parsed::Day)
        }
    }
}

/// `M/D/YYYY, h:mm AM/PM` in the given fixed zone, never the server's zone.
pub fn to_date_text(input: DateInput<'_>, zone: &FixedOffset) -> Option<String> {
    let local = match parse(input)? {
        Parsed::Instant(dt) => dt.with_timezone(zone),
        Parsed::Day(day) => zone
            .from_local_datetime(&day.and_hms_opt(0, 0, 0)?)
            .single()?,
    };
    Some(local.format("%-m/%-d/%Y, %-I:%M %p").to_string())
}

/// `YYYY-MM-DD`, the calendar date in the given fixed zone.
pub fn to_date_only(input: DateInput<'_>, zone: &FixedOffset) -> Option<String> {
    let day = match parse(input)? {
        Parsed::Instant(dt) => dt.with_timezone(zone).date_naive(),
        Parsed::Day(day) => day,
    };
    Some(day.format("%Y-%m-%d").to_string())
}

/// Option id whose name matches `label` exactly. Options are fetched live.
pub async fn to_enum_option_id(tasks: &dyn TaskSystem, field_id: &str, label: &str) -> Option<String> {
    if label.is_empty() {
        return None;
    }
    let options = match tasks.enum_options(field_id).await {
        Ok(options) => options,
        Err(e) => {
            debug!(field_id, error = %e, "enum options unavailable");
            return None;
        }
    };
    options
        .into_iter()
        .find(|o| o.enabled && o.name == label)
        .map(|o| o.id)
}

pub fn is_http_url(text: &str) -> bool {
    reqwest::Url::parse(text.trim())
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

fn first_text<'a>(obj: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
}

fn file_object_ref(obj: &serde_json::Map<String, Value>) -> Option<AttachmentRef> {
    let url = first_text(obj, &["url", "download_url", "src"])?;
    Some(AttachmentRef {
        url: url.to_string(),
        filename: first_text(obj, &["name", "filename", "file_name"]).map(String::from),
        content_type: first_text(obj, &["content_type", "mime_type", "type"]).map(String::from),
    })
}

/// Attachment references in a URL, a file object or a list of either.
pub fn extract_attachment_refs(value: &Value) -> Vec<AttachmentRef> {
    match value {
        Value::String(s) if is_http_url(s) => vec![AttachmentRef::from_url(s.trim())],
        Value::Object(obj) => file_object_ref(obj).into_iter().collect(),
        Value::Array(items) => items
            .iter()
            .flat_map(|item| match item {
                Value::Object(_) | Value::String(_) => extract_attachment_refs(item),
                _ => Vec::new(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Scalar rendering of an attribute value.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(scalar_text).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
        _ => None,
    }
}

/// Converts a ticket attribute into the value a task field of `field.kind` expects.
pub async fn convert_attribute(
    tasks: &dyn TaskSystem,
    field: &RemoteField,
    value: &Value,
    format: ValueFormat,
    zone: &FixedOffset,
) -> Option<Value> {
    match &field.kind {
        FieldKind::EnumChoice => {
            let label = scalar_text(value)?;
            to_enum_option_id(tasks, &field.id, &label)
                .await
                .map(Value::String)
        }
        FieldKind::Date => {
            let day = to_date_only(DateInput::from_json(value)?, zone)?;
            Some(json!({ "date": day }))
        }
        FieldKind::Number => match value {
            Value::Number(n) => Some(Value::Number(n.clone())),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            _ => None,
        },
        FieldKind::ShortText => match format {
            ValueFormat::Plain => scalar_text(value).map(Value::String),
            ValueFormat::DateTime => {
                to_date_text(DateInput::from_json(value)?, zone).map(Value::String)
            }
            ValueFormat::Date => to_date_only(DateInput::from_json(value)?, zone).map(Value::String),
        },
        FieldKind::File | FieldKind::Other(_) => None,
    }
}
