use std::sync::Arc;
use log::{debug, info, warn};
use serde::Serialize;
use crate::clock::{Clock, SharedClock};
use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::session::alerts::{active_subset, display_order, AlertLedger, AlertRecord};
use crate::session::stats::{SessionStats, StatisticsAccumulator};
use crate::session::waveform::WaveformBuffer;
use crate::source::wire;
use crate::types::{
    CardiacClass, Classification, ConnectionState, MonitorEvent, Reading, Sample, SampleBatch,
    StatusUpdate,
};
/// Immutable view of the session published after each applied event.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub sequence: u64,
    pub connection: ConnectionState,
    pub device_id: String,
    pub backend_status: Option<String>,
    pub waveform: Arc<[Sample]>,
    pub classification: Option<Classification>,
    pub heart_rate: f64,
    pub reading_timestamp: Option<i64>,
    pub inference_time_ms: Option<f64>,
    pub banner: Option<AlertRecord>,
    /// Alert history, most recent first.
    pub alerts: Vec<AlertRecord>,
    pub stats: SessionStats,
    pub active_window_ms: i64,
}
impl SessionSnapshot {
    pub fn active_alerts(&self, now_ms: i64) -> Vec<AlertRecord> {
        active_subset(self.alerts.iter(), now_ms, self.active_window_ms)
    }
    pub fn alerts_by_severity(&self) -> Vec<AlertRecord> {
        display_order(self.alerts.iter())
    }
    pub fn current_class(&self) -> Option<CardiacClass> {
        self.classification.as_ref().map(|c| c.class)
    }
    pub fn waveform_span_ms(&self) -> i64 {
        match (self.waveform.first(), self.waveform.last()) {
            (Some(first), Some(last)) => last.timestamp.saturating_sub(first.timestamp),
            _ => 0,
        }
    }
}
/// Single-writer owner of all derived state. Events go in through
/// [`SessionState::dispatch`]; readers only ever see whole snapshots.
pub struct SessionState {
    clock: SharedClock,
    sample_period_ms: f64,
    waveform: WaveformBuffer,
    waveform_dirty: bool,
    waveform_view: Arc<[Sample]>,
    ledger: AlertLedger,
    stats: StatisticsAccumulator,
    connection: ConnectionState,
    device_id: String,
    backend_status: Option<String>,
    classification: Option<Classification>,
    heart_rate: f64,
    reading_timestamp: Option<i64>,
    inference_time_ms: Option<f64>,
    dropped_events: u64,
    snapshot: Arc<SessionSnapshot>,
}
impl SessionState {
    pub fn new(config: &MonitorConfig, clock: SharedClock) -> Result<Self, MonitorError> {
        config.validate()?;
        let waveform = WaveformBuffer::with_capacity(config.waveform_capacity())?;
        let ledger = AlertLedger::from_config(config)?;
        let waveform_view: Arc<[Sample]> = Arc::from(Vec::new());
        let snapshot = Arc::new(SessionSnapshot {
            sequence: 0,
            connection: ConnectionState::Disconnected,
            device_id: String::new(),
            backend_status: None,
            waveform: Arc::clone(&waveform_view),
            classification: None,
            heart_rate: 0.0,
            reading_timestamp: None,
            inference_time_ms: None,
            banner: None,
            alerts: Vec::new(),
            stats: SessionStats::default(),
            active_window_ms: ledger.active_window_ms(),
        });
        Ok(Self {
            clock,
            sample_period_ms: config.sample_period_ms(),
            waveform,
            waveform_dirty: false,
            waveform_view,
            ledger,
            stats: StatisticsAccumulator::new(),
            connection: ConnectionState::Disconnected,
            device_id: String::new(),
            backend_status: None,
            classification: None,
            heart_rate: 0.0,
            reading_timestamp: None,
            inference_time_ms: None,
            dropped_events: 0,
            snapshot,
        })
    }
    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        Arc::clone(&self.snapshot)
    }
    pub fn connection(&self) -> ConnectionState {
        self.connection
    }
    /// Events rejected at the boundary since the session started.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events
    }
    pub fn waveform(&self) -> &WaveformBuffer {
        &self.waveform
    }
    pub fn ledger(&self) -> &AlertLedger {
        &self.ledger
    }
    /// Applies one event and publishes a new snapshot if anything changed.
    /// Returns whether a snapshot was published.
    pub fn dispatch(&mut self, event: MonitorEvent) -> bool {
        debug!("dispatching {} event", event.kind());
        let changed = match event {
            MonitorEvent::Connecting => self.transition(ConnectionState::Connecting),
            MonitorEvent::Connected => self.transition(ConnectionState::Connected),
            MonitorEvent::Disconnected => self.transition(ConnectionState::Disconnected),
            MonitorEvent::Samples(batch) => self.push_samples(&batch),
            MonitorEvent::Reading(reading) => {
                self.apply_reading(*reading);
                true
            }
            MonitorEvent::Status(status) => {
                self.apply_status(status);
                true
            }
        };
        if changed {
            self.publish();
        }
        changed
    }
    /// Decodes a raw transport message and dispatches it. Malformed messages
    /// are logged and dropped without touching the session.
    pub fn dispatch_message(&mut self, message: &str) -> bool {
        match wire::decode(message, self.sample_period_ms, self.clock.now_ms()) {
            Ok(event) => self.dispatch(event),
            Err(err) => {
                self.dropped_events += 1;
                warn!("dropping malformed event: {err}");
                false
            }
        }
    }
    pub fn dismiss_banner(&mut self) -> bool {
        let dismissed = self.ledger.dismiss_banner().is_some();
        if dismissed {
            self.publish();
        }
        dismissed
    }
    pub fn clear_alert(&mut self, id: u64) -> bool {
        let cleared = self.ledger.clear(id);
        if cleared {
            self.publish();
        }
        cleared
    }
    pub fn acknowledge_alert(&mut self, id: u64) -> bool {
        let acknowledged = self.ledger.acknowledge(id);
        if acknowledged {
            self.publish();
        }
        acknowledged
    }
    /// Clears a non-critical banner whose timer has come due.
    pub fn expire_banner(&mut self) -> bool {
        let expired = self.ledger.expire_banner(self.clock.now_ms());
        if expired {
            debug!("banner auto-cleared");
            self.publish();
        }
        expired
    }
    pub fn next_deadline(&self) -> Option<i64> {
        self.ledger.next_deadline()
    }
    fn transition(&mut self, next: ConnectionState) -> bool {
        if self.connection == next {
            return false;
        }
        // Reconnecting keeps waveform, alerts and stats: it is the same session.
        info!("connection {:?} -> {:?}", self.connection, next);
        self.connection = next;
        true
    }
    fn push_samples(&mut self, batch: &SampleBatch) -> bool {
        if batch.is_empty() {
            return false;
        }
        self.waveform.push(batch);
        self.waveform_dirty = true;
        true
    }
    fn apply_reading(&mut self, reading: Reading) {
        let now_ms = self.clock.now_ms();
        self.push_samples(&reading.samples);
        let class = reading.classification.as_ref().map(|c| c.class);
        if let Some(classification) = &reading.classification {
            self.classification = Some(classification.clone());
        }
        self.heart_rate = reading.heart_rate.unwrap_or(0.0);
        if let Some(device_id) = reading.device_id.filter(|id| !id.is_empty()) {
            self.device_id = device_id;
        }
        self.reading_timestamp = Some(reading.timestamp);
        if reading.inference_time_ms.is_some() {
            self.inference_time_ms = reading.inference_time_ms;
        }
        if let Some(alert) = &reading.alert {
            if let Some(record) = self.ledger.ingest(alert, class, now_ms) {
                info!(
                    "alert #{} [{}] {}",
                    record.id,
                    record.severity.as_str(),
                    record.message
                );
            }
        }
        // a zero heart rate means the backend had no estimate
        let heart_rate = reading.heart_rate.filter(|hr| *hr > 0.0);
        self.stats.update(
            reading.classification.as_ref(),
            heart_rate,
            reading.inference_time_ms,
            now_ms,
        );
    }
    fn apply_status(&mut self, status: StatusUpdate) {
        if let Some(device_id) = status.device_id.filter(|id| !id.is_empty()) {
            self.device_id = device_id;
        }
        if status.status.is_some() {
            self.backend_status = status.status;
        }
    }
    fn publish(&mut self) {
        if self.waveform_dirty {
            self.waveform_view = Arc::from(self.waveform.current());
            self.waveform_dirty = false;
        }
        self.snapshot = Arc::new(SessionSnapshot {
            sequence: self.snapshot.sequence + 1,
            connection: self.connection,
            device_id: self.device_id.clone(),
            backend_status: self.backend_status.clone(),
            waveform: Arc::clone(&self.waveform_view),
            classification: self.classification.clone(),
            heart_rate: self.heart_rate,
            reading_timestamp: self.reading_timestamp,
            inference_time_ms: self.inference_time_ms,
            banner: self.ledger.banner().cloned(),
            alerts: self.ledger.history().cloned().collect(),
            stats: self.stats.stats().clone(),
            active_window_ms: self.ledger.active_window_ms(),
        });
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::{AlertEvent, Severity};
    use std::collections::BTreeMap;
    fn session(clock: &Arc<ManualClock>) -> SessionState {
        SessionState::new(&MonitorConfig::default(), clock.clone()).unwrap()
    }
    fn reading(class: CardiacClass, heart_rate: f64, ts: i64) -> MonitorEvent {
        let mut reading = Reading::new(ts);
        reading.samples = (0..10).map(|i| Sample::new(ts + i * 10, 0.1)).collect();
        reading.classification = Some(Classification {
            class,
            class_code: class.as_str()[..1].to_string(),
            confidence: 0.9,
            probabilities: BTreeMap::from([(class, 0.9)]),
            high_confidence: true,
            timestamp: ts,
        });
        reading.heart_rate = Some(heart_rate);
        reading.device_id = Some("esp32-01".into());
        MonitorEvent::Reading(Box::new(reading))
    }
    #[test]
    fn reading_updates_every_view_in_one_snapshot() {
        let clock = ManualClock::new(1_000);
        let mut state = session(&clock);
        let mut event = reading(CardiacClass::Arrhythmia, 95.0, 1_000);
        if let MonitorEvent::Reading(r) = &mut event {
            r.alert = Some(AlertEvent {
                triggered: true,
                severity: Severity::Critical,
                message: "Irregular rhythm".into(),
                confidence: 0.9,
                timestamp: 1_000,
            });
        }
        assert!(state.dispatch(event));
        let snap = state.snapshot();
        assert_eq!(snap.sequence, 1);
        assert_eq!(snap.waveform.len(), 10);
        assert_eq!(snap.current_class(), Some(CardiacClass::Arrhythmia));
        assert_eq!(snap.heart_rate, 95.0);
        assert_eq!(snap.device_id, "esp32-01");
        assert_eq!(snap.alerts.len(), 1);
        assert_eq!(snap.alerts[0].classification, Some(CardiacClass::Arrhythmia));
        assert_eq!(snap.banner.as_ref().map(|b| b.severity), Some(Severity::Critical));
        assert_eq!(snap.stats.total_readings, 1);
        assert_eq!(snap.stats.abnormal_count, 1);
        assert_eq!(snap.stats.last_update, Some(1_000));
    }
    #[test]
    fn three_readings_update_stats_and_ledger() {
        let clock = ManualClock::new(0);
        let mut state = session(&clock);
        state.dispatch(reading(CardiacClass::Normal, 60.0, 0));
        state.dispatch(reading(CardiacClass::Normal, 80.0, 1_000));
        state.dispatch(reading(CardiacClass::Arrhythmia, 100.0, 2_000));
        let snap = state.snapshot();
        let stats = &snap.stats;
        assert!((stats.avg_heart_rate - 80.0).abs() < 1e-9);
        assert_eq!(stats.normal_count, 2);
        assert_eq!(stats.abnormal_count, 1);
        assert_eq!(stats.total_readings, 3);
    }
    #[test]
    fn duplicate_connected_is_a_no_op() {
        let clock = ManualClock::new(0);
        let mut state = session(&clock);
        assert!(state.dispatch(MonitorEvent::Connecting));
        assert!(state.dispatch(MonitorEvent::Connected));
        state.dispatch(reading(CardiacClass::Normal, 72.0, 0));
        let before = state.snapshot();
        assert!(!state.dispatch(MonitorEvent::Connected));
        let after = state.snapshot();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(
            serde_json::to_string(&*before).unwrap(),
            serde_json::to_string(&*after).unwrap()
        );
    }
    #[test]
    fn reconnect_preserves_history() {
        let clock = ManualClock::new(0);
        let mut state = session(&clock);
        state.dispatch(MonitorEvent::Connected);
        state.dispatch(reading(CardiacClass::Normal, 70.0, 0));
        let before = state.snapshot();
        state.dispatch(MonitorEvent::Disconnected);
        state.dispatch(MonitorEvent::Connecting);
        state.dispatch(MonitorEvent::Connected);
        let after = state.snapshot();
        assert_eq!(after.connection, ConnectionState::Connected);
        assert_eq!(after.waveform, before.waveform);
        assert_eq!(after.stats, before.stats);
        assert_eq!(after.alerts, before.alerts);
        assert_eq!(after.sequence, before.sequence + 3);
    }
    #[test]
    fn malformed_message_leaves_snapshot_untouched() {
        let clock = ManualClock::new(0);
        let mut state = session(&clock);
        state.dispatch(reading(CardiacClass::Normal, 70.0, 0));
        let before = state.snapshot();
        let published = state.dispatch_message(
            r#"["ecg_update", {"classification": {"confidence": 0.8},
                 "alert": {"triggered": true, "severity": "critical", "message": "x"}}]"#,
        );
        assert!(!published);
        assert!(Arc::ptr_eq(&before, &state.snapshot()));
        assert_eq!(state.ledger().len(), 0);
        assert_eq!(state.dropped_events(), 1);
        assert!(state.dispatch_message(
            r#"["ecg_update", {"classification": {"class": "Normal"}, "heart_rate": 65}]"#
        ));
        assert_eq!(state.snapshot().stats.total_readings, 2);
    }
    #[test]
    fn hostile_numbers_are_dropped_and_the_pipeline_keeps_going() {
        let clock = ManualClock::new(1_000);
        let mut state = session(&clock);
        state.dispatch(reading(CardiacClass::Normal, 70.0, 0));
        let before = state.snapshot();
        let hostile = [
            r#"["ecg_update", {"timestamp": -1e30, "ecg_samples": [0.1, 0.2]}]"#,
            r#"["ecg_update", {"classification": {"class": "Normal"}, "heart_rate": 60,
                "alert": {"triggered": true, "severity": "critical",
                          "timestamp": -9223372036854775808}}]"#,
            r#"["ecg_samples", {"samples": [0.1], "timestamp": 1e300}]"#,
            r#"["ecg_update", {"ecg_samples": null, "heart_rate": 60}]"#,
            r#"["ecg_update", {"alert": {"triggered": true, "confidence": 1e999}}]"#,
        ];
        for message in hostile {
            assert!(!state.dispatch_message(message), "{message}");
        }
        assert_eq!(state.dropped_events(), hostile.len() as u64);
        assert!(Arc::ptr_eq(&before, &state.snapshot()));
        assert!(state.snapshot().active_alerts(1_000).is_empty());
        assert!(state.dispatch_message(
            r#"["ecg_update", {"ecg_samples": [0.5], "classification": {"class": "Normal"},
                "heart_rate": 66, "timestamp": 2}]"#
        ));
        let snap = state.snapshot();
        assert_eq!(snap.stats.total_readings, 2);
        assert_eq!(snap.waveform.last().map(|s| s.timestamp), Some(2_000));
        assert!(snap.alerts.is_empty());
    }
    #[test]
    fn status_update_touches_only_metadata() {
        let clock = ManualClock::new(0);
        let mut state = session(&clock);
        state.dispatch(reading(CardiacClass::Normal, 70.0, 0));
        let before = state.snapshot();
        assert!(state.dispatch(MonitorEvent::Status(StatusUpdate {
            device_id: Some("esp32-02".into()),
            status: Some("streaming".into()),
        })));
        let after = state.snapshot();
        assert_eq!(after.device_id, "esp32-02");
        assert_eq!(after.backend_status.as_deref(), Some("streaming"));
        assert!(Arc::ptr_eq(&before.waveform, &after.waveform));
        assert_eq!(before.stats, after.stats);
        assert_eq!(before.alerts, after.alerts);
    }
    #[test]
    fn warning_banner_expires_on_clock() {
        let clock = ManualClock::new(0);
        let mut state = session(&clock);
        let mut event = reading(CardiacClass::Tachycardia, 130.0, 0);
        if let MonitorEvent::Reading(r) = &mut event {
            r.alert = Some(AlertEvent {
                triggered: true,
                severity: Severity::Warning,
                message: "High heart rate detected!".into(),
                confidence: 0.8,
                timestamp: 0,
            });
        }
        state.dispatch(event);
        assert_eq!(state.next_deadline(), Some(10_000));
        clock.advance(9_000);
        assert!(!state.expire_banner());
        clock.advance(1_000);
        assert!(state.expire_banner());
        let snap = state.snapshot();
        assert!(snap.banner.is_none());
        assert_eq!(snap.alerts.len(), 1);
        assert_eq!(snap.active_alerts(clock.now_ms()).len(), 1);
        assert!(snap.active_alerts(60_000).is_empty());
    }
    #[test]
    fn reading_without_heart_rate_skips_stats_but_shows_zero() {
        let clock = ManualClock::new(0);
        let mut state = session(&clock);
        state.dispatch(reading(CardiacClass::Normal, 70.0, 0));
        state.dispatch_message(
            r#"["ecg_update", {"classification": {"class": "Bradycardia", "confidence": 0.7}}]"#,
        );
        let snap = state.snapshot();
        assert_eq!(snap.heart_rate, 0.0);
        assert_eq!(snap.current_class(), Some(CardiacClass::Bradycardia));
        assert_eq!(snap.stats.total_readings, 1);
    }
}
