use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::error::MonitorError;
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub seconds: f32,
}
impl TimeWindow {
    pub fn new(seconds: f32) -> Self {
        Self {
            seconds: seconds.max(0.1),
        }
    }
    pub fn samples(&self, sample_rate_hz: f32) -> usize {
        ((self.seconds * sample_rate_hz).ceil() as usize).max(1)
    }
}
impl Default for TimeWindow {
    fn default() -> Self {
        // The dashboard plots the last 5 seconds of the feed.
        TimeWindow { seconds: 5.0 }
    }
}
/// Tunables for one monitoring session. Every field has a default so a
/// partial JSON document only needs to name what it overrides.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Rate of the incoming ECG feed.
    pub sample_rate_hz: f32,
    /// Span of the waveform window; fixes the buffer capacity once.
    pub window: TimeWindow,
    /// How many alert records the ledger keeps.
    pub alert_retention: usize,
    /// Delay before a non-critical banner clears itself.
    pub banner_timeout_ms: i64,
    /// Records younger than this count as active.
    pub active_window_ms: i64,
    /// Delay before the first status request is sent upstream.
    pub status_poll_delay_ms: u64,
}
impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 100.0,
            window: TimeWindow::default(),
            alert_retention: 10,
            banner_timeout_ms: 10_000,
            active_window_ms: 60_000,
            status_poll_delay_ms: 1_000,
        }
    }
}
impl MonitorConfig {
    pub fn from_json_str(text: &str) -> Result<Self, MonitorError> {
        let config: MonitorConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, MonitorError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
    pub fn validate(&self) -> Result<(), MonitorError> {
        if !self.sample_rate_hz.is_finite() || self.sample_rate_hz <= 0.0 {
            return Err(MonitorError::InvalidSampleRate);
        }
        if self.alert_retention == 0 {
            return Err(MonitorError::ZeroCapacity {
                what: "alert retention",
            });
        }
        if self.banner_timeout_ms <= 0 {
            return Err(MonitorError::ZeroCapacity {
                what: "banner timeout",
            });
        }
        if self.active_window_ms <= 0 {
            return Err(MonitorError::ZeroCapacity {
                what: "active alert window",
            });
        }
        Ok(())
    }
    /// Capacity C of the waveform window.
    pub fn waveform_capacity(&self) -> usize {
        self.window.samples(self.sample_rate_hz)
    }
    pub fn sample_period_ms(&self) -> f64 {
        1000.0 / self.sample_rate_hz as f64
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn default_capacity_is_five_seconds_of_feed() {
        let config = MonitorConfig::default();
        assert_eq!(config.waveform_capacity(), 500);
        assert!(config.validate().is_ok());
    }
    #[test]
    fn partial_json_overrides_defaults() {
        let config =
            MonitorConfig::from_json_str(r#"{"sample_rate_hz": 250.0, "alert_retention": 4}"#)
                .unwrap();
        assert_eq!(config.sample_rate_hz, 250.0);
        assert_eq!(config.alert_retention, 4);
        assert_eq!(config.banner_timeout_ms, 10_000);
        assert_eq!(config.waveform_capacity(), 1250);
    }
    #[test]
    fn rejects_zero_rate_and_retention() {
        assert!(matches!(
            MonitorConfig::from_json_str(r#"{"sample_rate_hz": 0.0}"#),
            Err(MonitorError::InvalidSampleRate)
        ));
        assert!(matches!(
            MonitorConfig::from_json_str(r#"{"alert_retention": 0}"#),
            Err(MonitorError::ZeroCapacity { .. })
        ));
    }
    #[test]
    fn time_window_never_collapses() {
        assert_eq!(TimeWindow::new(0.0).seconds, 0.1);
        assert_eq!(TimeWindow::new(1.0).samples(0.5), 1);
    }
}
