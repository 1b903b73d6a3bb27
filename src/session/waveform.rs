use std::collections::VecDeque;
use crate::error::MonitorError;
use crate::types::{Sample, SampleBatch};
/// Sliding window over the most recent `capacity` samples, oldest first.
pub struct WaveformBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
}
impl WaveformBuffer {
    pub fn with_capacity(capacity: usize) -> Result<Self, MonitorError> {
        if capacity == 0 {
            return Err(MonitorError::ZeroCapacity {
                what: "waveform capacity",
            });
        }
        Ok(Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        })
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    pub fn len(&self) -> usize {
        self.samples.len()
    }
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
    /// Appends a batch in arrival order. Only the batch's own last `capacity`
    /// samples are ever copied, so the cost is bounded by the batch size.
    pub fn push(&mut self, batch: &SampleBatch) {
        if batch.is_empty() {
            return;
        }
        let incoming = batch.as_slice();
        let kept = &incoming[incoming.len().saturating_sub(self.capacity)..];
        let overflow = (self.samples.len() + kept.len()).saturating_sub(self.capacity);
        self.samples.drain(..overflow);
        self.samples.extend(kept.iter().copied());
    }
    pub fn current(&self) -> Vec<Sample> {
        self.samples.iter().copied().collect()
    }
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }
    /// Time covered by the buffered samples, newest minus oldest.
    pub fn span_ms(&self) -> i64 {
        match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) => last.timestamp.saturating_sub(first.timestamp),
            _ => 0,
        }
    }
}
