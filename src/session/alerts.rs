use std::collections::VecDeque;
use log::debug;
use serde::Serialize;
use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::types::{AlertEvent, CardiacClass, Severity};
/// Retained copy of a triggered alert. Only the ledger creates or mutates these.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AlertRecord {
    pub id: u64,
    pub severity: Severity,
    pub message: String,
    pub confidence: f64,
    pub classification: Option<CardiacClass>,
    pub timestamp: i64,
    pub acknowledged: bool,
}
impl AlertRecord {
    pub fn is_active(&self, now_ms: i64, window_ms: i64) -> bool {
        now_ms.saturating_sub(self.timestamp) < window_ms
    }
}
/// Deferred auto-clear of the banner. A timer only fires while its
/// generation is still the ledger's current one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BannerTimer {
    pub generation: u64,
    pub deadline_ms: i64,
}
#[derive(Clone, Debug)]
struct Banner {
    record: AlertRecord,
    timer: Option<BannerTimer>,
}
/// Most-recent-first alert history with a single highlighted banner.
pub struct AlertLedger {
    history: VecDeque<AlertRecord>,
    retention: usize,
    banner_timeout_ms: i64,
    active_window_ms: i64,
    next_id: u64,
    generation: u64,
    banner: Option<Banner>,
}
impl AlertLedger {
    pub fn new(
        retention: usize,
        banner_timeout_ms: i64,
        active_window_ms: i64,
    ) -> Result<Self, MonitorError> {
        if retention == 0 {
            return Err(MonitorError::ZeroCapacity {
                what: "alert retention",
            });
        }
        Ok(Self {
            history: VecDeque::with_capacity(retention + 1),
            retention,
            banner_timeout_ms,
            active_window_ms,
            next_id: 0,
            generation: 0,
            banner: None,
        })
    }
    pub fn from_config(config: &MonitorConfig) -> Result<Self, MonitorError> {
        Self::new(
            config.alert_retention,
            config.banner_timeout_ms,
            config.active_window_ms,
        )
    }
    pub fn retention(&self) -> usize {
        self.retention
    }
    pub fn active_window_ms(&self) -> i64 {
        self.active_window_ms
    }
    pub fn len(&self) -> usize {
        self.history.len()
    }
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
    /// Records a triggered alert and makes it the banner. Non-triggered
    /// events leave the ledger untouched.
    pub fn ingest(
        &mut self,
        event: &AlertEvent,
        classification: Option<CardiacClass>,
        now_ms: i64,
    ) -> Option<AlertRecord> {
        if !event.triggered {
            return None;
        }
        self.next_id += 1;
        let confidence = if event.confidence.is_finite() {
            event.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let record = AlertRecord {
            id: self.next_id,
            severity: event.severity,
            message: event.message.clone(),
            confidence,
            classification,
            timestamp: event.timestamp,
            acknowledged: false,
        };
        self.history.push_front(record.clone());
        while self.history.len() > self.retention {
            if let Some(evicted) = self.history.pop_back() {
                debug!("alert #{} evicted from history", evicted.id);
            }
        }
        self.arm_banner(record.clone(), now_ms);
        Some(record)
    }
    fn arm_banner(&mut self, record: AlertRecord, now_ms: i64) {
        self.generation += 1;
        // Critical banners stay up until someone dismisses them.
        let timer = (record.severity != Severity::Critical).then(|| BannerTimer {
            generation: self.generation,
            deadline_ms: now_ms.saturating_add(self.banner_timeout_ms),
        });
        let superseded = self.banner.replace(Banner { record, timer });
        if let Some(Banner {
            record: previous,
            timer: Some(_),
        }) = superseded
        {
            debug!("banner for alert #{} superseded, timer cancelled", previous.id);
        }
    }
    /// Hides the banner and marks its record acknowledged. History is kept.
    pub fn dismiss_banner(&mut self) -> Option<AlertRecord> {
        let banner = self.banner.take()?;
        self.generation += 1;
        self.acknowledge(banner.record.id);
        Some(banner.record)
    }
    pub fn pending_timer(&self) -> Option<BannerTimer> {
        self.banner.as_ref().and_then(|banner| banner.timer)
    }
    pub fn next_deadline(&self) -> Option<i64> {
        self.pending_timer().map(|timer| timer.deadline_ms)
    }
    /// Fires `timer` if it is still armed and due. Stale timers are ignored.
    pub fn fire(&mut self, timer: BannerTimer, now_ms: i64) -> bool {
        if timer.generation != self.generation || now_ms < timer.deadline_ms {
            return false;
        }
        match self.pending_timer() {
            Some(pending) if pending == timer => {
                self.banner = None;
                self.generation += 1;
                true
            }
            _ => false,
        }
    }
    pub fn expire_banner(&mut self, now_ms: i64) -> bool {
        match self.pending_timer() {
            Some(timer) => self.fire(timer, now_ms),
            None => false,
        }
    }
    /// Removes one record from history. The banner is left alone.
    pub fn clear(&mut self, id: u64) -> bool {
        match self.history.iter().position(|record| record.id == id) {
            Some(index) => {
                self.history.remove(index);
                true
            }
            None => false,
        }
    }
    pub fn acknowledge(&mut self, id: u64) -> bool {
        match self.history.iter_mut().find(|record| record.id == id) {
            Some(record) => {
                record.acknowledged = true;
                true
            }
            None => false,
        }
    }
    pub fn banner(&self) -> Option<&AlertRecord> {
        self.banner.as_ref().map(|banner| &banner.record)
    }
    pub fn history(&self) -> impl Iterator<Item = &AlertRecord> {
        self.history.iter()
    }
    /// Records younger than the active window, recomputed on every call.
    pub fn active_alerts(&self, now_ms: i64) -> Vec<AlertRecord> {
        active_subset(self.history.iter(), now_ms, self.active_window_ms)
    }
    /// History ordered for display: severity first, then recency.
    pub fn by_severity(&self) -> Vec<AlertRecord> {
        display_order(self.history.iter())
    }
}
pub(crate) fn active_subset<'a>(
    records: impl Iterator<Item = &'a AlertRecord>,
    now_ms: i64,
    window_ms: i64,
) -> Vec<AlertRecord> {
    records
        .filter(|record| record.is_active(now_ms, window_ms))
        .cloned()
        .collect()
}
pub(crate) fn display_order<'a>(
    records: impl Iterator<Item = &'a AlertRecord>,
) -> Vec<AlertRecord> {
    let mut ordered: Vec<AlertRecord> = records.cloned().collect();
    // stable sort keeps most-recent-first within one severity
    ordered.sort_by(|a, b| b.severity.cmp(&a.severity));
    ordered
}
#[cfg(test)]
mod tests {
    use super::*;
    fn alert(severity: Severity, message: &str, timestamp: i64) -> AlertEvent {
        AlertEvent {
            triggered: true,
            severity,
            message: message.into(),
            confidence: 0.9,
            timestamp,
        }
    }
    fn ledger() -> AlertLedger {
        AlertLedger::new(10, 10_000, 60_000).unwrap()
    }
    #[test]
    fn critical_alert_is_recorded_and_banner_persists() {
        let mut ledger = ledger();
        let record = ledger
            .ingest(
                &alert(Severity::Critical, "Irregular rhythm", 1_000),
                Some(CardiacClass::Arrhythmia),
                1_000,
            )
            .unwrap();
        let first = ledger.history().next().unwrap();
        assert_eq!(first, &record);
        assert_eq!(first.severity, Severity::Critical);
        assert_eq!(first.message, "Irregular rhythm");
        assert_eq!(first.confidence, 0.9);
        assert_eq!(first.classification, Some(CardiacClass::Arrhythmia));
        assert!(ledger.pending_timer().is_none());
        assert!(!ledger.expire_banner(1_000_000));
        assert_eq!(ledger.banner().map(|b| b.id), Some(record.id));
        let dismissed = ledger.dismiss_banner().unwrap();
        assert_eq!(dismissed.id, record.id);
        assert!(ledger.banner().is_none());
        assert_eq!(ledger.len(), 1);
        assert!(ledger.history().next().unwrap().acknowledged);
    }
    #[test]
    fn non_triggered_event_creates_nothing() {
        let mut ledger = ledger();
        assert!(ledger.ingest(&AlertEvent::idle(5), None, 5).is_none());
        assert!(ledger.is_empty());
        assert!(ledger.banner().is_none());
    }
    #[test]
    fn retention_evicts_oldest_regardless_of_severity() {
        let mut ledger = AlertLedger::new(3, 10_000, 60_000).unwrap();
        ledger.ingest(&alert(Severity::Critical, "a", 1), None, 1);
        ledger.ingest(&alert(Severity::Info, "b", 2), None, 2);
        ledger.ingest(&alert(Severity::Info, "c", 3), None, 3);
        ledger.ingest(&alert(Severity::Warning, "d", 4), None, 4);
        let messages: Vec<&str> = ledger.history().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["d", "c", "b"]);
        let ids: Vec<u64> = ledger.history().map(|r| r.id).collect();
        assert_eq!(ids, vec![4, 3, 2]);
    }
    #[test]
    fn warning_banner_expires_after_timeout() {
        let mut ledger = ledger();
        ledger.ingest(&alert(Severity::Warning, "High heart rate", 0), None, 0);
        assert_eq!(ledger.next_deadline(), Some(10_000));
        assert!(!ledger.expire_banner(9_999));
        assert!(ledger.banner().is_some());
        assert!(ledger.expire_banner(10_000));
        assert!(ledger.banner().is_none());
        assert_eq!(ledger.len(), 1);
        assert!(!ledger.history().next().unwrap().acknowledged);
    }
    #[test]
    fn superseded_timer_cannot_clear_newer_banner() {
        let mut ledger = ledger();
        ledger.ingest(&alert(Severity::Warning, "first", 0), None, 0);
        let stale = ledger.pending_timer().unwrap();
        ledger.ingest(&alert(Severity::Critical, "second", 5_000), None, 5_000);
        assert!(!ledger.fire(stale, 20_000));
        assert_eq!(ledger.banner().map(|b| b.message.as_str()), Some("second"));
    }
    #[test]
    fn dismiss_cancels_pending_timer() {
        let mut ledger = ledger();
        ledger.ingest(&alert(Severity::Info, "note", 0), None, 0);
        let timer = ledger.pending_timer().unwrap();
        ledger.dismiss_banner();
        ledger.ingest(&alert(Severity::Critical, "later", 1_000), None, 1_000);
        assert!(!ledger.fire(timer, 50_000));
        assert!(ledger.banner().is_some());
    }
    #[test]
    fn clear_removes_only_the_named_record() {
        let mut ledger = ledger();
        let a = ledger.ingest(&alert(Severity::Info, "a", 1), None, 1).unwrap();
        ledger.ingest(&alert(Severity::Info, "b", 2), None, 2);
        assert!(ledger.clear(a.id));
        assert!(!ledger.clear(a.id));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.banner().map(|b| b.message.as_str()), Some("b"));
    }
    #[test]
    fn active_alerts_use_strict_recency_window() {
        let mut ledger = ledger();
        for ts in [0, 30_000, 59_999, 60_000] {
            ledger.ingest(&alert(Severity::Info, "x", ts), None, ts);
        }
        for now in [0, 60_000, 90_000, 119_999, 120_000, 200_000] {
            let active: Vec<i64> = ledger
                .active_alerts(now)
                .iter()
                .map(|r| r.timestamp)
                .collect();
            let expected: Vec<i64> = ledger
                .history()
                .map(|r| r.timestamp)
                .filter(|ts| now - ts < 60_000)
                .collect();
            assert_eq!(active, expected, "now = {now}");
        }
        let at_sixty: Vec<i64> = ledger
            .active_alerts(60_000)
            .iter()
            .map(|r| r.timestamp)
            .collect();
        assert_eq!(at_sixty, vec![60_000, 59_999, 30_000]);
    }
    #[test]
    fn extreme_timestamps_do_not_overflow() {
        let mut ledger = ledger();
        ledger.ingest(&alert(Severity::Info, "old", i64::MIN), None, i64::MAX);
        ledger.ingest(&alert(Severity::Info, "future", i64::MAX), None, 0);
        assert_eq!(ledger.next_deadline(), Some(10_000));
        let active_records = ledger.active_alerts(1_000);
        let active: Vec<&str> = active_records
            .iter()
            .map(|r| r.message.as_str())
            .collect();
        assert_eq!(active, vec!["future"]);
        assert_eq!(ledger.active_alerts(i64::MIN).len(), 2);
    }
    #[test]
    fn display_order_puts_critical_first() {
        let mut ledger = ledger();
        ledger.ingest(&alert(Severity::Info, "i", 1), None, 1);
        ledger.ingest(&alert(Severity::Critical, "c", 2), None, 2);
        ledger.ingest(&alert(Severity::Warning, "w1", 3), None, 3);
        ledger.ingest(&alert(Severity::Warning, "w2", 4), None, 4);
        let order: Vec<String> = ledger.by_severity().into_iter().map(|r| r.message).collect();
        assert_eq!(order, vec!["c", "w2", "w1", "i"]);
    }
}
