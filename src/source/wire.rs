//! Boundary adapter: raw backend messages in, validated [`MonitorEvent`]s out.
//!
//! Messages are JSON, either socket.io style `["ecg_update", {...}]` or an
//! envelope object `{"event": "ecg_update", "data": {...}}`. Anything that
//! does not fit is rejected here so the session only ever sees typed events.
//!
//! Numeric policy:
//! - non-finite sample values are dropped from the batch
//! - confidences and probabilities are clamped into [0, 1]
//! - a negative heart rate or inference time counts as absent
//! - numeric timestamps below 1e11 are taken as seconds, otherwise milliseconds
//! - timestamps beyond year 9999 on either side of the epoch are rejected
use std::collections::BTreeMap;
use chrono::{DateTime, NaiveDateTime};
use log::debug;
use serde::Deserialize;
use serde_json::Value;
use crate::error::MonitorError;
use crate::types::{
    clamp_unit, AlertEvent, CardiacClass, Classification, MonitorEvent, Reading, Sample,
    SampleBatch, Severity, StatusUpdate,
};
const SECONDS_CUTOFF: f64 = 1e11;
// 9999-12-31T23:59:59.999Z
const MAX_TIMESTAMP_MS: i64 = 253_402_300_799_999;
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Integer(i64),
    Fractional(f64),
    Text(String),
}
impl RawTimestamp {
    fn to_millis(&self) -> Result<i64, MonitorError> {
        let millis = match self {
            RawTimestamp::Integer(value) => scale_numeric(*value as f64)?,
            RawTimestamp::Fractional(value) => scale_numeric(*value)?,
            RawTimestamp::Text(text) => parse_text_timestamp(text)?,
        };
        if millis.unsigned_abs() > MAX_TIMESTAMP_MS.unsigned_abs() {
            return Err(MonitorError::invalid(
                "timestamp",
                format!("{millis} ms is out of range"),
            ));
        }
        Ok(millis)
    }
}
fn scale_numeric(value: f64) -> Result<i64, MonitorError> {
    let millis = if value.abs() < SECONDS_CUTOFF {
        (value * 1000.0).round()
    } else {
        value.round()
    };
    // checked here so the cast below never saturates
    if !millis.is_finite() || millis.abs() > MAX_TIMESTAMP_MS as f64 {
        return Err(MonitorError::invalid(
            "timestamp",
            format!("{value} is out of range"),
        ));
    }
    Ok(millis as i64)
}
fn parse_text_timestamp(text: &str) -> Result<i64, MonitorError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.timestamp_millis());
    }
    // Python's isoformat() leaves the offset off; read those as UTC.
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc().timestamp_millis())
        .map_err(|err| MonitorError::invalid("timestamp", format!("`{text}`: {err}")))
}
fn timestamp_or(raw: Option<&RawTimestamp>, fallback: i64) -> Result<i64, MonitorError> {
    raw.map(RawTimestamp::to_millis)
        .transpose()
        .map(|ts| ts.unwrap_or(fallback))
}
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSample {
    Point {
        value: f64,
        #[serde(default)]
        timestamp: Option<RawTimestamp>,
    },
    Bare(f64),
}
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBatch {
    Bare(Vec<RawSample>),
    Wrapped {
        samples: Vec<RawSample>,
        #[serde(default)]
        timestamp: Option<RawTimestamp>,
    },
}
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawClassification {
    class: Option<String>,
    class_code: Option<String>,
    confidence: Option<f64>,
    probabilities: BTreeMap<String, f64>,
    high_confidence: Option<bool>,
}
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAlert {
    triggered: bool,
    severity: Option<String>,
    message: Option<String>,
    confidence: Option<f64>,
    timestamp: Option<RawTimestamp>,
}
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawReading {
    ecg_samples: Vec<RawSample>,
    classification: Option<RawClassification>,
    heart_rate: Option<f64>,
    device_id: Option<String>,
    timestamp: Option<RawTimestamp>,
    alert: Option<RawAlert>,
    inference_time_ms: Option<f64>,
}
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawStatus {
    device_id: Option<String>,
    status: Option<String>,
    message: Option<String>,
}
/// Decodes one transport message. `sample_period_ms` spaces bare sample
/// values; `now_ms` stands in for a missing message timestamp.
pub fn decode(
    message: &str,
    sample_period_ms: f64,
    now_ms: i64,
) -> Result<MonitorEvent, MonitorError> {
    let value: Value = serde_json::from_str(message)?;
    let (name, payload) = split_envelope(value)?;
    decode_event(&name, payload, sample_period_ms, now_ms)
}
fn split_envelope(value: Value) -> Result<(String, Value), MonitorError> {
    match value {
        Value::Array(items) => {
            let mut items = items.into_iter();
            let name = items.next().ok_or(MonitorError::MissingField("event"))?;
            let payload = items.next().unwrap_or(Value::Null);
            match name {
                Value::String(name) => Ok((name, payload)),
                _ => Err(MonitorError::invalid("event", "event name must be a string")),
            }
        }
        Value::Object(mut fields) => {
            let payload = fields.remove("data").unwrap_or(Value::Null);
            match fields.remove("event") {
                Some(Value::String(name)) => Ok((name, payload)),
                Some(_) => Err(MonitorError::invalid("event", "event name must be a string")),
                None => Err(MonitorError::MissingField("event")),
            }
        }
        _ => Err(MonitorError::invalid(
            "event",
            "expected an [event, payload] array or an envelope object",
        )),
    }
}
pub fn decode_event(
    name: &str,
    payload: Value,
    sample_period_ms: f64,
    now_ms: i64,
) -> Result<MonitorEvent, MonitorError> {
    let event = match name {
        "connect" | "connection_established" => MonitorEvent::Connected,
        "connecting" | "reconnecting" | "reconnect_attempt" => MonitorEvent::Connecting,
        "disconnect" | "connection_lost" | "reconnect_failed" => MonitorEvent::Disconnected,
        "ecg_update" | "ecg_data" => MonitorEvent::Reading(Box::new(decode_reading(
            payload,
            sample_period_ms,
            now_ms,
        )?)),
        "ecg_samples" => MonitorEvent::Samples(decode_batch(payload, sample_period_ms, now_ms)?),
        "connection_status" | "status_update" | "system_status" => {
            MonitorEvent::Status(decode_status(payload)?)
        }
        other => return Err(MonitorError::UnknownEvent(other.to_string())),
    };
    Ok(event)
}
fn decode_reading(
    payload: Value,
    sample_period_ms: f64,
    now_ms: i64,
) -> Result<Reading, MonitorError> {
    let raw: RawReading = serde_json::from_value(payload)?;
    let timestamp = timestamp_or(raw.timestamp.as_ref(), now_ms)?;
    let samples = decode_samples(raw.ecg_samples, timestamp, sample_period_ms)?;
    let classification = raw
        .classification
        .map(|c| decode_classification(c, timestamp))
        .transpose()?;
    let alert = raw.alert.map(|a| decode_alert(a, timestamp)).transpose()?;
    Ok(Reading {
        samples,
        classification,
        alert,
        heart_rate: non_negative("heart_rate", raw.heart_rate),
        device_id: raw.device_id,
        timestamp,
        // an inference time of zero means the backend did not measure one
        inference_time_ms: non_negative("inference_time_ms", raw.inference_time_ms)
            .filter(|ms| *ms > 0.0),
    })
}
fn non_negative(field: &str, value: Option<f64>) -> Option<f64> {
    match value {
        Some(v) if v.is_finite() && v >= 0.0 => Some(v),
        Some(v) => {
            debug!("ignoring {field} = {v}");
            None
        }
        None => None,
    }
}
fn decode_batch(
    payload: Value,
    sample_period_ms: f64,
    now_ms: i64,
) -> Result<SampleBatch, MonitorError> {
    match serde_json::from_value::<RawBatch>(payload)? {
        RawBatch::Bare(samples) => decode_samples(samples, now_ms, sample_period_ms),
        RawBatch::Wrapped { samples, timestamp } => {
            let end = timestamp_or(timestamp.as_ref(), now_ms)?;
            decode_samples(samples, end, sample_period_ms)
        }
    }
}
/// Bare values get timestamps spaced one sample period apart, the last one
/// landing on `end_ms`.
fn decode_samples(
    raw: Vec<RawSample>,
    end_ms: i64,
    sample_period_ms: f64,
) -> Result<SampleBatch, MonitorError> {
    let count = raw.len();
    let mut samples = Vec::with_capacity(count);
    let mut dropped = 0usize;
    for (index, sample) in raw.into_iter().enumerate() {
        let (timestamp, value) = match sample {
            RawSample::Point {
                value,
                timestamp: Some(timestamp),
            } => (timestamp.to_millis()?, value),
            RawSample::Point {
                value,
                timestamp: None,
            }
            | RawSample::Bare(value) => {
                let back = ((count - 1 - index) as f64 * sample_period_ms).round() as i64;
                (end_ms.saturating_sub(back), value)
            }
        };
        if !value.is_finite() {
            dropped += 1;
            continue;
        }
        samples.push(Sample::new(timestamp, value));
    }
    if dropped > 0 {
        debug!("dropped {dropped} non-finite samples");
    }
    Ok(SampleBatch::new(samples))
}
fn decode_classification(
    raw: RawClassification,
    timestamp: i64,
) -> Result<Classification, MonitorError> {
    let class: CardiacClass = raw
        .class
        .ok_or(MonitorError::MissingField("classification.class"))?
        .parse()?;
    let mut probabilities = BTreeMap::new();
    for (label, probability) in raw.probabilities {
        match (
            label.parse::<CardiacClass>(),
            clamp_unit("classification.probabilities", probability),
        ) {
            (Ok(entry), Ok(probability)) => {
                probabilities.insert(entry, probability);
            }
            _ => debug!("ignoring probability entry `{label}` = {probability}"),
        }
    }
    let confidence = match raw.confidence {
        Some(confidence) => clamp_unit("classification.confidence", confidence)?,
        None => probabilities.get(&class).copied().unwrap_or(0.0),
    };
    Ok(Classification {
        class,
        class_code: raw.class_code.unwrap_or_default(),
        confidence,
        probabilities,
        high_confidence: raw.high_confidence.unwrap_or(false),
        timestamp,
    })
}
fn decode_alert(raw: RawAlert, reading_ts: i64) -> Result<AlertEvent, MonitorError> {
    if !raw.triggered {
        return Ok(AlertEvent::idle(reading_ts));
    }
    let severity = match raw.severity.as_deref() {
        Some(severity) => severity.parse()?,
        None => Severity::Warning,
    };
    let confidence = raw
        .confidence
        .map(|c| clamp_unit("alert.confidence", c))
        .transpose()?
        .unwrap_or(0.0);
    Ok(AlertEvent {
        triggered: true,
        severity,
        message: raw.message.unwrap_or_default(),
        confidence,
        timestamp: timestamp_or(raw.timestamp.as_ref(), reading_ts)?,
    })
}
fn decode_status(payload: Value) -> Result<StatusUpdate, MonitorError> {
    if payload.is_null() {
        return Ok(StatusUpdate::default());
    }
    let raw: RawStatus = serde_json::from_value(payload)?;
    Ok(StatusUpdate {
        device_id: raw.device_id,
        status: raw.status.or(raw.message),
    })
}
