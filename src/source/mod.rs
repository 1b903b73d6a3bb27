// src/source/mod.rs
pub mod simulated;
pub mod wire;
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;
use crate::error::MonitorError;
use crate::types::MonitorEvent;
pub use simulated::SimulatedSource;
/// What a transport hands to the monitor: a typed event, or a raw backend
/// message still to be validated by [`wire::decode`].
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    Event(MonitorEvent),
    Raw(String),
}
impl From<MonitorEvent> for Inbound {
    fn from(event: MonitorEvent) -> Self {
        Inbound::Event(event)
    }
}
impl From<String> for Inbound {
    fn from(message: String) -> Self {
        Inbound::Raw(message)
    }
}
impl From<&str> for Inbound {
    fn from(message: &str) -> Self {
        Inbound::Raw(message.to_owned())
    }
}
#[derive(Debug, PartialEq)]
pub enum SourcePoll {
    Ready(Inbound),
    /// Nothing arrived within the timeout.
    Idle,
    /// The source will never deliver again.
    Closed,
}
/// Anything that can feed the monitor. Reconnect and backoff live behind
/// this trait; the monitor only sees the resulting notifications.
pub trait EventSource {
    /// Waits at most `timeout` for the next delivery.
    fn poll_event(&mut self, timeout: Duration) -> Result<SourcePoll, MonitorError>;
    /// Asks the upstream for a fresh status update.
    fn request_status(&mut self) {}
}
/// In-memory source useful for tests and deterministic playback.
#[derive(Debug, Default)]
pub struct ManualSource {
    queue: VecDeque<Inbound>,
    status_requests: usize,
}
impl ManualSource {
    pub fn new<I>(items: impl IntoIterator<Item = I>) -> Self
    where
        I: Into<Inbound>,
    {
        Self {
            queue: items.into_iter().map(Into::into).collect(),
            status_requests: 0,
        }
    }
    pub fn push(&mut self, item: impl Into<Inbound>) {
        self.queue.push_back(item.into());
    }
    pub fn status_requests(&self) -> usize {
        self.status_requests
    }
}
impl EventSource for ManualSource {
    fn poll_event(&mut self, _timeout: Duration) -> Result<SourcePoll, MonitorError> {
        Ok(self
            .queue
            .pop_front()
            .map_or(SourcePoll::Closed, SourcePoll::Ready))
    }
    fn request_status(&mut self) {
        self.status_requests += 1;
    }
}
type StatusHook = Box<dyn FnMut() + Send>;
/// Receiving end of a transport thread.
pub struct ChannelSource {
    rx: Receiver<Inbound>,
    on_status_request: Option<StatusHook>,
}
impl ChannelSource {
    pub fn new(rx: Receiver<Inbound>) -> Self {
        Self {
            rx,
            on_status_request: None,
        }
    }
    pub fn with_status_hook(mut self, hook: impl FnMut() + Send + 'static) -> Self {
        self.on_status_request = Some(Box::new(hook));
        self
    }
}
impl EventSource for ChannelSource {
    fn poll_event(&mut self, timeout: Duration) -> Result<SourcePoll, MonitorError> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Ok(SourcePoll::Ready(item)),
            Err(RecvTimeoutError::Timeout) => Ok(SourcePoll::Idle),
            Err(RecvTimeoutError::Disconnected) => Ok(SourcePoll::Closed),
        }
    }
    fn request_status(&mut self) {
        if let Some(hook) = self.on_status_request.as_mut() {
            hook();
        }
    }
}
/// Sender/source pair, the way `mpsc::channel` hands out both halves.
pub fn channel() -> (Sender<Inbound>, ChannelSource) {
    let (tx, rx) = mpsc::channel();
    (tx, ChannelSource::new(rx))
}
