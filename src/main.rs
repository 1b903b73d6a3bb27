// src/main.rs
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{info, warn};

use ecg_monitor::plot::{render_waveform_png, PlotStyle};
use ecg_monitor::source::SimulatedSource;
use ecg_monitor::{Monitor, MonitorConfig, SessionSnapshot, SharedClock, SystemClock};

const DEFAULT_RUN_SECONDS: u64 = 15;

fn load_config() -> Result<MonitorConfig> {
    match std::env::var("ECG_MONITOR_CONFIG") {
        Ok(path) => MonitorConfig::from_json_file(&path)
            .with_context(|| format!("failed to load config from {path}")),
        Err(_) => Ok(MonitorConfig::default()),
    }
}

fn run_seconds() -> u64 {
    match std::env::var("ECG_MONITOR_SECONDS") {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("ignoring ECG_MONITOR_SECONDS={raw}, using {DEFAULT_RUN_SECONDS}");
            DEFAULT_RUN_SECONDS
        }),
        Err(_) => DEFAULT_RUN_SECONDS,
    }
}

fn log_summary(snapshot: &SessionSnapshot) {
    let class = snapshot
        .classification
        .as_ref()
        .map(|c| format!("{} ({:.0}%)", c.class, c.confidence * 100.0))
        .unwrap_or_else(|| "--".to_owned());
    info!(
        "#{} {:?} | {} samples | {} | {:.0} bpm | readings={} avg_hr={:.1} alerts={}",
        snapshot.sequence,
        snapshot.connection,
        snapshot.waveform.len(),
        class,
        snapshot.heart_rate,
        snapshot.stats.total_readings,
        snapshot.stats.avg_heart_rate,
        snapshot.alerts.len(),
    );
    if let Some(banner) = &snapshot.banner {
        info!("[{:?}] {}", banner.severity, banner.message);
    }
}

fn main() -> Result<()> {
    // 默认 info 级别，可用 RUST_LOG 覆盖
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = load_config()?;
    let seconds = run_seconds();
    let clock: SharedClock = Arc::new(SystemClock);
    let source = SimulatedSource::new(&config, clock.clone());
    let monitor = Monitor::spawn(source, &config, clock).context("failed to start monitor")?;
    info!("monitor running for {seconds}s");

    let deadline = Instant::now() + Duration::from_secs(seconds);
    while Instant::now() < deadline {
        thread::sleep(Duration::from_secs(1));
        log_summary(&monitor.snapshot());
    }

    let last = monitor.shutdown();
    info!(
        "session done: {} readings, {} normal / {} abnormal",
        last.stats.total_readings, last.stats.normal_count, last.stats.abnormal_count
    );

    // 可选：把最后的波形窗口导出为 PNG
    if let Ok(path) = std::env::var("ECG_MONITOR_PNG") {
        let png = render_waveform_png(&last, PlotStyle::default())
            .context("failed to render waveform")?;
        std::fs::write(&path, png).with_context(|| format!("failed to write {path}"))?;
        info!("waveform written to {path}");
    }
    Ok(())
}
