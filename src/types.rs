// src/types.rs
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MonitorError;

// 单个 ECG 采样点 (时间戳为 Unix 毫秒)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: i64,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

// 一条网络消息携带的采样，按到达顺序排列，可以为空
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleBatch {
    samples: Vec<Sample>,
}

impl SampleBatch {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }
}

impl From<Vec<Sample>> for SampleBatch {
    fn from(samples: Vec<Sample>) -> Self {
        Self::new(samples)
    }
}

impl FromIterator<Sample> for SampleBatch {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

// 心律分类结果
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CardiacClass {
    Normal,
    Tachycardia,
    Bradycardia,
    Arrhythmia,
}

impl CardiacClass {
    pub const ALL: [CardiacClass; 4] = [
        CardiacClass::Normal,
        CardiacClass::Tachycardia,
        CardiacClass::Bradycardia,
        CardiacClass::Arrhythmia,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CardiacClass::Normal => "Normal",
            CardiacClass::Tachycardia => "Tachycardia",
            CardiacClass::Bradycardia => "Bradycardia",
            CardiacClass::Arrhythmia => "Arrhythmia",
        }
    }

    pub fn is_abnormal(&self) -> bool {
        *self != CardiacClass::Normal
    }

    pub fn description(&self) -> &'static str {
        match self {
            CardiacClass::Normal => "Normal Sinus Rhythm",
            CardiacClass::Tachycardia => "Fast heart rate (>100 BPM)",
            CardiacClass::Bradycardia => "Slow heart rate (<60 BPM)",
            CardiacClass::Arrhythmia => "Irregular heart rhythm",
        }
    }
}

impl fmt::Display for CardiacClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardiacClass {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        CardiacClass::ALL
            .into_iter()
            .find(|class| class.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| MonitorError::invalid("class", format!("unknown class `{wanted}`")))
    }
}

/// Verdict from the inference backend. Replaced wholesale by the next one.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Classification {
    pub class: CardiacClass,
    pub class_code: String,
    pub confidence: f64,
    pub probabilities: BTreeMap<CardiacClass, f64>,
    pub high_confidence: bool,
    pub timestamp: i64,
}

impl Classification {
    /// Class with the highest probability, falling back to the reported class.
    pub fn dominant(&self) -> CardiacClass {
        self.probabilities
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(class, _)| *class)
            .unwrap_or(self.class)
    }
}

// 报警等级，排序：critical > warning > info
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl FromStr for Severity {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            // the dashboard simulation labels arrhythmia alerts "danger"
            "critical" | "danger" | "error" => Ok(Severity::Critical),
            other => Err(MonitorError::invalid(
                "alert.severity",
                format!("unknown severity `{other}`"),
            )),
        }
    }
}

/// Abnormality notification as reported alongside a reading.
#[derive(Clone, Debug, PartialEq)]
pub struct AlertEvent {
    pub triggered: bool,
    pub severity: Severity,
    pub message: String,
    pub confidence: f64,
    pub timestamp: i64,
}

impl AlertEvent {
    pub fn idle(timestamp: i64) -> Self {
        Self {
            triggered: false,
            severity: Severity::Info,
            message: String::new(),
            confidence: 0.0,
            timestamp,
        }
    }
}

// 连接状态，仅由数据源通知驱动
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// One `ecg_update` from the backend, already validated.
#[derive(Clone, Debug, PartialEq)]
pub struct Reading {
    pub samples: SampleBatch,
    pub classification: Option<Classification>,
    pub alert: Option<AlertEvent>,
    pub heart_rate: Option<f64>,
    pub device_id: Option<String>,
    pub timestamp: i64,
    pub inference_time_ms: Option<f64>,
}

impl Reading {
    pub fn new(timestamp: i64) -> Self {
        Self {
            samples: SampleBatch::default(),
            classification: None,
            alert: None,
            heart_rate: None,
            device_id: None,
            timestamp,
            inference_time_ms: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatusUpdate {
    pub device_id: Option<String>,
    pub status: Option<String>,
}

// 数据源发给会话状态的事件 (封闭集合)
#[derive(Clone, Debug, PartialEq)]
pub enum MonitorEvent {
    Connecting,
    Connected,
    Disconnected,
    Samples(SampleBatch),
    Reading(Box<Reading>),
    Status(StatusUpdate),
}

impl MonitorEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            MonitorEvent::Connecting => "connecting",
            MonitorEvent::Connected => "connected",
            MonitorEvent::Disconnected => "disconnected",
            MonitorEvent::Samples(_) => "samples",
            MonitorEvent::Reading(_) => "reading",
            MonitorEvent::Status(_) => "status",
        }
    }
}

/// Clamp a probability-like value into [0, 1]; non-finite values are rejected.
pub fn clamp_unit(field: &'static str, value: f64) -> Result<f64, MonitorError> {
    if !value.is_finite() {
        return Err(MonitorError::invalid(field, format!("non-finite value {value}")));
    }
    Ok(value.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_names_parse_case_insensitively() {
        assert_eq!("arrhythmia".parse::<CardiacClass>().unwrap(), CardiacClass::Arrhythmia);
        assert_eq!(" Normal ".parse::<CardiacClass>().unwrap(), CardiacClass::Normal);
        assert!("Flutter".parse::<CardiacClass>().is_err());
    }

    #[test]
    fn severity_orders_critical_first() {
        assert!(Severity::Critical > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        assert_eq!("danger".parse::<Severity>().unwrap(), Severity::Critical);
    }

    #[test]
    fn clamp_unit_rejects_nan() {
        assert_eq!(clamp_unit("confidence", 1.4).unwrap(), 1.0);
        assert_eq!(clamp_unit("confidence", -0.2).unwrap(), 0.0);
        assert!(clamp_unit("confidence", f64::NAN).is_err());
    }

    #[test]
    fn dominant_prefers_highest_probability() {
        let classification = Classification {
            class: CardiacClass::Normal,
            class_code: "N".into(),
            confidence: 0.4,
            probabilities: BTreeMap::from([
                (CardiacClass::Normal, 0.4),
                (CardiacClass::Arrhythmia, 0.6),
            ]),
            high_confidence: false,
            timestamp: 0,
        };
        assert_eq!(classification.dominant(), CardiacClass::Arrhythmia);
    }
}
