use std::collections::BTreeMap;
use std::thread;
use std::time::{Duration, Instant};
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use crate::clock::{Clock, SharedClock};
use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::source::{EventSource, Inbound, SourcePoll};
use crate::types::{
    AlertEvent, CardiacClass, Classification, MonitorEvent, Reading, Sample, SampleBatch,
    Severity, StatusUpdate,
};
const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_millis(100);
const CLASSIFY_EVERY_MS: f64 = 5_000.0;
fn gaussian(x: f64, mu: f64, sigma: f64) -> f64 {
    (-((x - mu) / sigma).powi(2) / 2.0).exp()
}
/// Synthetic backend: a PQRST trace at the configured rate with a
/// classification (and, for abnormal rhythms, an alert) every five seconds.
pub struct SimulatedSource {
    clock: SharedClock,
    rng: StdRng,
    device_id: String,
    sample_period_ms: f64,
    samples_per_batch: usize,
    batch_interval: Duration,
    next_batch_at: Option<Instant>,
    cursor_ms: Option<f64>,
    next_classification_ms: f64,
    class: CardiacClass,
    heart_rate: f64,
    connected: bool,
    status_pending: bool,
}
impl SimulatedSource {
    pub fn new(config: &MonitorConfig, clock: SharedClock) -> Self {
        Self::with_rng(config, clock, StdRng::from_entropy())
    }
    pub fn seeded(config: &MonitorConfig, clock: SharedClock, seed: u64) -> Self {
        Self::with_rng(config, clock, StdRng::seed_from_u64(seed))
    }
    fn with_rng(config: &MonitorConfig, clock: SharedClock, rng: StdRng) -> Self {
        let sample_period_ms = config.sample_period_ms();
        let batch_ms = DEFAULT_BATCH_INTERVAL.as_millis() as f64;
        let samples_per_batch = ((batch_ms / sample_period_ms).round() as usize).max(1);
        Self {
            clock,
            rng,
            device_id: "sim-ecg-01".to_owned(),
            sample_period_ms,
            samples_per_batch,
            batch_interval: DEFAULT_BATCH_INTERVAL,
            next_batch_at: None,
            cursor_ms: None,
            next_classification_ms: f64::NEG_INFINITY,
            class: CardiacClass::Normal,
            heart_rate: 72.0,
            connected: false,
            status_pending: false,
        }
    }
    /// Pacing between batches; zero emits as fast as the caller polls.
    pub fn with_batch_interval(mut self, interval: Duration) -> Self {
        self.batch_interval = interval;
        self
    }
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = device_id.into();
        self
    }
    fn ecg_value(&mut self, t_ms: f64) -> f64 {
        let beat_ms = 60_000.0 / self.heart_rate.max(1.0);
        let phase = t_ms.rem_euclid(beat_ms) / beat_ms;
        let p = 0.12 * gaussian(phase, 0.15, 0.025);
        let qrs = gaussian(phase, 0.30, 0.012)
            - 0.15 * gaussian(phase, 0.27, 0.010)
            - 0.20 * gaussian(phase, 0.33, 0.010);
        let t = 0.30 * gaussian(phase, 0.55, 0.050);
        p + qrs + t + self.rng.gen_range(-0.03..0.03)
    }
    fn next_batch(&mut self) -> SampleBatch {
        let start = self
            .cursor_ms
            .unwrap_or_else(|| self.clock.now_ms() as f64);
        if self.class == CardiacClass::Arrhythmia {
            let drift = self.rng.gen_range(-12.0..12.0);
            self.heart_rate = (self.heart_rate + drift).clamp(55.0, 120.0);
        }
        let period = self.sample_period_ms;
        let count = self.samples_per_batch;
        let samples = (0..count)
            .map(|i| {
                let t = start + i as f64 * period;
                Sample::new(t.round() as i64, self.ecg_value(t))
            })
            .collect();
        self.cursor_ms = Some(start + count as f64 * period);
        samples
    }
    fn classify(&mut self, samples: SampleBatch, timestamp: i64) -> Reading {
        let class = CardiacClass::ALL[self.rng.gen_range(0..CardiacClass::ALL.len())];
        self.class = class;
        self.heart_rate = match class {
            CardiacClass::Normal => self.rng.gen_range(60.0..80.0),
            CardiacClass::Tachycardia => self.rng.gen_range(100.0..140.0),
            CardiacClass::Bradycardia => self.rng.gen_range(40.0..60.0),
            CardiacClass::Arrhythmia => self.rng.gen_range(70.0..100.0),
        };
        let confidence: f64 = self.rng.gen_range(0.6..0.99);
        let remainder = (1.0 - confidence) / (CardiacClass::ALL.len() - 1) as f64;
        let probabilities: BTreeMap<CardiacClass, f64> = CardiacClass::ALL
            .into_iter()
            .map(|c| (c, if c == class { confidence } else { remainder }))
            .collect();
        let alert = match class {
            CardiacClass::Normal => None,
            CardiacClass::Tachycardia => Some((Severity::Warning, "High heart rate detected!")),
            CardiacClass::Bradycardia => Some((Severity::Warning, "Low heart rate detected!")),
            CardiacClass::Arrhythmia => Some((Severity::Critical, "Irregular rhythm detected!")),
        }
        .map(|(severity, message)| AlertEvent {
            triggered: true,
            severity,
            message: message.to_owned(),
            confidence,
            timestamp,
        })
        .unwrap_or_else(|| AlertEvent::idle(timestamp));
        // the backend only reports timing on some frames
        let inference_time_ms = self
            .rng
            .gen_bool(0.5)
            .then(|| self.rng.gen_range(5.0..25.0));
        debug!("simulated {class} at {:.0} bpm", self.heart_rate);
        Reading {
            samples,
            classification: Some(Classification {
                class,
                class_code: class.as_str()[..1].to_owned(),
                confidence,
                probabilities,
                high_confidence: confidence >= 0.85,
                timestamp,
            }),
            alert: Some(alert),
            heart_rate: Some(self.heart_rate.round()),
            device_id: Some(self.device_id.clone()),
            timestamp,
            inference_time_ms,
        }
    }
}
impl EventSource for SimulatedSource {
    fn poll_event(&mut self, timeout: Duration) -> Result<SourcePoll, MonitorError> {
        if !self.connected {
            self.connected = true;
            return Ok(SourcePoll::Ready(Inbound::Event(MonitorEvent::Connected)));
        }
        if self.status_pending {
            self.status_pending = false;
            return Ok(SourcePoll::Ready(Inbound::Event(MonitorEvent::Status(
                StatusUpdate {
                    device_id: Some(self.device_id.clone()),
                    status: Some("simulated".to_owned()),
                },
            ))));
        }
        let due = *self.next_batch_at.get_or_insert_with(Instant::now);
        let now = Instant::now();
        if now < due {
            thread::sleep((due - now).min(timeout));
            if Instant::now() < due {
                return Ok(SourcePoll::Idle);
            }
        }
        self.next_batch_at = Some(due + self.batch_interval);
        let samples = self.next_batch();
        let timestamp = samples
            .as_slice()
            .last()
            .map(|s| s.timestamp)
            .unwrap_or_else(|| self.clock.now_ms());
        let event = if timestamp as f64 >= self.next_classification_ms {
            self.next_classification_ms = timestamp as f64 + CLASSIFY_EVERY_MS;
            MonitorEvent::Reading(Box::new(self.classify(samples, timestamp)))
        } else {
            MonitorEvent::Samples(samples)
        };
        Ok(SourcePoll::Ready(Inbound::Event(event)))
    }
    fn request_status(&mut self) {
        self.status_pending = true;
    }
}
