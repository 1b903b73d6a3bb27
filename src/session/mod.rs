// src/session/mod.rs
pub mod alerts;
pub mod state;
pub mod stats;
pub mod waveform;
pub use alerts::{AlertLedger, AlertRecord, BannerTimer};
pub use state::{SessionSnapshot, SessionState};
pub use stats::{SessionStats, StatisticsAccumulator};
pub use waveform::WaveformBuffer;
