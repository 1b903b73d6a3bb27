// src/lib.rs
//! Client side of a real-time ECG monitor: ingests streaming samples and
//! classification readings, and publishes a consistent session snapshot
//! (waveform window, alert ledger, running statistics) to any presenter.
pub mod clock;
pub mod config;
pub mod error;
pub mod plot;
pub mod profile;
pub mod runtime;
pub mod session;
pub mod source;
pub mod types;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::MonitorConfig;
pub use error::MonitorError;
pub use runtime::{Monitor, MonitorCommand, SnapshotHandle};
pub use session::{SessionSnapshot, SessionState};
pub use source::{EventSource, Inbound, SourcePoll};
pub use types::{CardiacClass, MonitorEvent, Severity};
