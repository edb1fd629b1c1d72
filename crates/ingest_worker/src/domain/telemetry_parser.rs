use crate::domain::TelemetryRejection;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use common::domain::TelemetryReading;
use common::mqtt::topic_bin_id;
use serde_json::{Map, Value};

// Extended and basic ISO-8601 clock forms, with or without seconds
const CLOCK_FORMATS: [&str; 4] = ["%H:%M:%S%.f", "%H:%M", "%H%M%S%.f", "%H%M"];

/// Validate and normalize one inbound telemetry message
///
/// Pure: no I/O, no clock. The payload `bin_id` wins over the topic segment when both are
/// present and non-empty.
pub fn parse_telemetry(topic: &str, payload: &[u8]) -> Result<TelemetryReading, TelemetryRejection> {
    let fallback_bin_id = topic_bin_id(topic);

    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| TelemetryRejection::InvalidPayload(e.to_string()))?;
    let fields = match value {
        Value::Object(fields) => fields,
        other => {
            return Err(TelemetryRejection::InvalidPayload(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            )))
        }
    };

    let bin_id = payload_bin_id(&fields)
        .or_else(|| fallback_bin_id.map(str::to_string))
        .ok_or(TelemetryRejection::MissingBinId)?;

    let ts = present(&fields, "ts").ok_or(TelemetryRejection::MissingTimestamp)?;
    let fill_pct = present(&fields, "fill_pct").ok_or(TelemetryRejection::MissingFillPct)?;

    let fill_pct = fill_pct.as_f64().ok_or_else(|| {
        TelemetryRejection::InvalidPayload(format!("fill_pct is not a number: {}", fill_pct))
    })?;
    if !(0.0..=100.0).contains(&fill_pct) {
        return Err(TelemetryRejection::FillPctOutOfRange(fill_pct));
    }

    let ts = match ts {
        Value::String(raw) => parse_timestamp(raw)
            .ok_or_else(|| TelemetryRejection::InvalidTimestamp(raw.clone()))?,
        other => return Err(TelemetryRejection::InvalidTimestamp(other.to_string())),
    };

    // A position is only meaningful as a pair; half of one is dropped
    let (lat, lon) = match (optional_f64(&fields, "lat"), optional_f64(&fields, "lon")) {
        (Some(lat), Some(lon)) => (Some(lat), Some(lon)),
        _ => (None, None),
    };

    Ok(TelemetryReading {
        bin_id,
        ts,
        fill_pct,
        batt_v: optional_f64(&fields, "batt_v"),
        temp_c: optional_f64(&fields, "temp_c"),
        emptied: emptied_flag(&fields),
        lat,
        lon,
    })
}

/// Parse an ISO-8601 instant
///
/// Accepts extended and basic forms, minute precision, `Z`/`+HH:MM`/`+HHMM`/`+HH` offsets
/// and a bare date (midnight). Values without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    let (date, time) = match raw.find(&['T', 't', ' '][..]) {
        Some(idx) => (&raw[..idx], Some(&raw[idx + 1..])),
        None => (raw, None),
    };
    let date = parse_date(date)?;

    let Some(time) = time else {
        return Some(date.and_time(NaiveTime::MIN).and_utc());
    };

    let (clock, offset) = split_offset(time.trim())?;
    let clock = CLOCK_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(clock, format).ok())?;
    let naive = date.and_time(clock);

    match offset {
        None => Some(naive.and_utc()),
        Some(offset) => offset
            .from_local_datetime(&naive)
            .single()
            .map(|ts| ts.with_timezone(&Utc)),
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    // Basic form: YYYYMMDD
    if raw.len() == 8 && raw.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::from_ymd_opt(
            raw[0..4].parse().ok()?,
            raw[4..6].parse().ok()?,
            raw[6..8].parse().ok()?,
        );
    }
    None
}

/// Split a time-of-day from its UTC offset, if any
fn split_offset(time: &str) -> Option<(&str, Option<FixedOffset>)> {
    if let Some(clock) = time.strip_suffix(&['Z', 'z'][..]) {
        return Some((clock, FixedOffset::east_opt(0)));
    }

    let Some(idx) = time.rfind(&['+', '-'][..]) else {
        return Some((time, None));
    };
    let sign = if time[idx..].starts_with('-') { -1 } else { 1 };
    let digits: String = time[idx + 1..].chars().filter(|c| *c != ':').collect();
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let (hours, minutes): (i32, i32) = match digits.len() {
        2 => (digits.parse().ok()?, 0),
        4 => (digits[..2].parse().ok()?, digits[2..].parse().ok()?),
        _ => return None,
    };
    if minutes >= 60 {
        return None;
    }

    let offset = FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))?;
    Some((&time[..idx], Some(offset)))
}

fn present<'a>(fields: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    fields.get(key).filter(|v| !v.is_null())
}

fn payload_bin_id(fields: &Map<String, Value>) -> Option<String> {
    match present(fields, "bin_id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn optional_f64(fields: &Map<String, Value>, key: &str) -> Option<f64> {
    present(fields, key).and_then(Value::as_f64)
}

// Firmware sends 0/1; newer builds send booleans
fn emptied_flag(fields: &Map<String, Value>) -> bool {
    match present(fields, "emptied") {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        _ => false,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
