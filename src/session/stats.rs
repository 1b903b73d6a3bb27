use serde::Serialize;
use crate::types::{CardiacClass, Classification};
/// Running aggregates for the whole session. `total_readings` never decreases.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SessionStats {
    pub total_readings: u64,
    pub avg_heart_rate: f64,
    pub avg_confidence: f64,
    pub avg_inference_time: f64,
    pub normal_count: u64,
    pub abnormal_count: u64,
    pub last_update: Option<i64>,
}
/// `avg_n = avg_{n-1} + (x_n - avg_{n-1}) / n`
fn incremental_mean(previous: f64, value: f64, n: u64) -> f64 {
    previous + (value - previous) / n as f64
}
fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}
#[derive(Debug, Default)]
pub struct StatisticsAccumulator {
    stats: SessionStats,
    // inference time is reported only sometimes, so it keeps its own count
    inference_samples: u64,
}
impl StatisticsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }
    pub fn inference_samples(&self) -> u64 {
        self.inference_samples
    }
    /// Folds one reading into the running stats. Nothing changes unless both a
    /// classification and a heart rate are present and finite.
    pub fn update(
        &mut self,
        classification: Option<&Classification>,
        heart_rate: Option<f64>,
        inference_time_ms: Option<f64>,
        now_ms: i64,
    ) -> &SessionStats {
        let classification = classification.filter(|c| c.confidence.is_finite());
        let (Some(classification), Some(heart_rate)) = (classification, finite(heart_rate)) else {
            return &self.stats;
        };
        let stats = &mut self.stats;
        stats.total_readings += 1;
        let n = stats.total_readings;
        stats.avg_heart_rate = incremental_mean(stats.avg_heart_rate, heart_rate, n);
        stats.avg_confidence = incremental_mean(
            stats.avg_confidence,
            classification.confidence.clamp(0.0, 1.0),
            n,
        );
        if let Some(inference_ms) = finite(inference_time_ms) {
            self.inference_samples += 1;
            stats.avg_inference_time =
                incremental_mean(stats.avg_inference_time, inference_ms, self.inference_samples);
        }
        if classification.class == CardiacClass::Normal {
            stats.normal_count += 1;
        } else {
            stats.abnormal_count += 1;
        }
        stats.last_update = Some(now_ms);
        &self.stats
    }
}
