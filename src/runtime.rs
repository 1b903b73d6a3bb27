// src/runtime.rs
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use parking_lot::RwLock;

use crate::clock::{Clock, SharedClock};
use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::session::{SessionSnapshot, SessionState};
use crate::source::{EventSource, Inbound, SourcePoll};
use crate::types::MonitorEvent;

// 没有事件也没有定时器时的最长等待
const IDLE_POLL: Duration = Duration::from_millis(50);

// 前端发给监护线程的命令
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MonitorCommand {
    DismissBanner,
    ClearAlert(u64),
    AcknowledgeAlert(u64),
    RequestStatus,
    Shutdown,
}

/// Read side of the published snapshot. Cloning is cheap; `get` never waits
/// on the dispatcher beyond swapping one pointer.
#[derive(Clone)]
pub struct SnapshotHandle {
    current: Arc<RwLock<Arc<SessionSnapshot>>>,
}

impl SnapshotHandle {
    fn new(initial: Arc<SessionSnapshot>) -> Self {
        Self {
            current: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn get(&self) -> Arc<SessionSnapshot> {
        Arc::clone(&self.current.read())
    }

    fn publish(&self, snapshot: Arc<SessionSnapshot>) {
        *self.current.write() = snapshot;
    }
}

struct Worker<S> {
    state: SessionState,
    source: S,
    commands: Receiver<MonitorCommand>,
    snapshots: SnapshotHandle,
    clock: SharedClock,
    status_delay: Duration,
    published: u64,
}

impl<S: EventSource> Worker<S> {
    fn run(mut self) {
        info!("monitor worker started");
        let started = Instant::now();
        let mut status_requested = false;
        self.state.dispatch(MonitorEvent::Connecting);
        self.publish_if_changed();

        loop {
            // 1. 处理前端命令
            if !self.drain_commands() {
                break;
            }

            // 2. 首次状态查询
            if !status_requested && started.elapsed() >= self.status_delay {
                debug!("requesting backend status");
                self.source.request_status();
                status_requested = true;
            }

            // 3. 横幅定时器
            self.state.expire_banner();
            self.publish_if_changed();

            // 4. 数据源
            match self.source.poll_event(self.poll_timeout()) {
                Ok(SourcePoll::Ready(Inbound::Event(event))) => {
                    self.state.dispatch(event);
                }
                Ok(SourcePoll::Ready(Inbound::Raw(message))) => {
                    self.state.dispatch_message(&message);
                }
                Ok(SourcePoll::Idle) => {}
                Ok(SourcePoll::Closed) => {
                    info!("event source closed");
                    self.state.dispatch(MonitorEvent::Disconnected);
                    self.publish_if_changed();
                    break;
                }
                Err(err) => {
                    warn!("event source failed: {err}");
                    self.state.dispatch(MonitorEvent::Disconnected);
                    self.publish_if_changed();
                    // back off before polling a failing source again
                    thread::sleep(IDLE_POLL);
                }
            }
            self.publish_if_changed();
        }

        let snapshot = self.state.snapshot();
        info!(
            "monitor worker stopped after {} readings ({} events dropped)",
            snapshot.stats.total_readings,
            self.state.dropped_events()
        );
    }

    /// Returns false once the worker should stop.
    fn drain_commands(&mut self) -> bool {
        loop {
            let command = match self.commands.try_recv() {
                Ok(command) => command,
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            };
            debug!("command {command:?}");
            match command {
                MonitorCommand::DismissBanner => {
                    self.state.dismiss_banner();
                }
                MonitorCommand::ClearAlert(id) => {
                    self.state.clear_alert(id);
                }
                MonitorCommand::AcknowledgeAlert(id) => {
                    self.state.acknowledge_alert(id);
                }
                MonitorCommand::RequestStatus => self.source.request_status(),
                MonitorCommand::Shutdown => return false,
            }
            self.publish_if_changed();
        }
    }

    fn poll_timeout(&self) -> Duration {
        match self.state.next_deadline() {
            Some(deadline) => {
                let wait_ms = deadline.saturating_sub(self.clock.now_ms()).max(0) as u64;
                IDLE_POLL.min(Duration::from_millis(wait_ms))
            }
            None => IDLE_POLL,
        }
    }

    fn publish_if_changed(&mut self) {
        let snapshot = self.state.snapshot();
        if snapshot.sequence != self.published {
            self.published = snapshot.sequence;
            self.snapshots.publish(snapshot);
        }
    }
}

/// Owns the dispatcher thread. Dropping it stops the thread.
pub struct Monitor {
    commands: Sender<MonitorCommand>,
    snapshots: SnapshotHandle,
    worker: Option<JoinHandle<()>>,
}

impl Monitor {
    pub fn spawn<S>(
        source: S,
        config: &MonitorConfig,
        clock: SharedClock,
    ) -> Result<Self, MonitorError>
    where
        S: EventSource + Send + 'static,
    {
        let state = SessionState::new(config, clock.clone())?;
        let snapshots = SnapshotHandle::new(state.snapshot());
        let (tx, rx) = channel();
        let worker = Worker {
            state,
            source,
            commands: rx,
            snapshots: snapshots.clone(),
            clock,
            status_delay: Duration::from_millis(config.status_poll_delay_ms),
            published: 0,
        };
        let handle = thread::Builder::new()
            .name("ecg-monitor".to_owned())
            .spawn(move || worker.run())?;
        Ok(Self {
            commands: tx,
            snapshots,
            worker: Some(handle),
        })
    }

    pub fn snapshot(&self) -> Arc<SessionSnapshot> {
        self.snapshots.get()
    }

    pub fn snapshots(&self) -> SnapshotHandle {
        self.snapshots.clone()
    }

    pub fn send(&self, command: MonitorCommand) -> Result<(), MonitorError> {
        self.commands
            .send(command)
            .map_err(|_| MonitorError::WorkerStopped)
    }

    pub fn dismiss_banner(&self) -> Result<(), MonitorError> {
        self.send(MonitorCommand::DismissBanner)
    }

    pub fn clear_alert(&self, id: u64) -> Result<(), MonitorError> {
        self.send(MonitorCommand::ClearAlert(id))
    }

    pub fn acknowledge_alert(&self, id: u64) -> Result<(), MonitorError> {
        self.send(MonitorCommand::AcknowledgeAlert(id))
    }

    pub fn request_status(&self) -> Result<(), MonitorError> {
        self.send(MonitorCommand::RequestStatus)
    }

    /// Blocks until the source closes on its own, then returns the last snapshot.
    pub fn join(mut self) -> Arc<SessionSnapshot> {
        self.join_worker();
        self.snapshots.get()
    }

    pub fn shutdown(mut self) -> Arc<SessionSnapshot> {
        self.commands.send(MonitorCommand::Shutdown).ok();
        self.join_worker();
        self.snapshots.get()
    }

    fn join_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("monitor worker panicked");
            }
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.commands.send(MonitorCommand::Shutdown).ok();
            self.join_worker();
        }
    }
}
