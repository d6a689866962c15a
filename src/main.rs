// src/main.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use chrono::Local;
use crossbeam::channel;
use log::{error, info, warn};

use framelift::api;
use framelift::capture::{CycleContext, DateTreeRetention, FfmpegFetcher, LocalStore};
use framelift::config::{self, Config};
use framelift::core::SystemClock;
use framelift::discovery;
use framelift::registry::{MemoryRegistry, StaticCredentials};
use framelift::relay::FtpRelay;
use framelift::scheduler::{CaptureScheduler, SchedulerConfig};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut args = std::env::args().skip(1);
    let first = args.next();

    if first.as_deref() == Some("discover") {
        let secs = args.next().and_then(|s| s.parse().ok()).unwrap_or(10);
        return run_discovery(Duration::from_secs(secs));
    }

    // ------------------------------------------------------------
    // Config
    // ------------------------------------------------------------
    let cfg_path = first.unwrap_or_else(|| "framelift.toml".into());
    let cfg: Config = config::load(&cfg_path)?;
    info!(
        "[framelift] loaded {} ({} sources, relay {})",
        cfg_path,
        cfg.sources.len(),
        if cfg.relay.is_some() { "on" } else { "off" }
    );

    // ------------------------------------------------------------
    // Graceful shutdown
    // ------------------------------------------------------------
    let running = Arc::new(AtomicBool::new(true));
    {
        let r = running.clone();
        ctrlc::set_handler(move || {
            info!("[framelift] shutdown requested");
            r.store(false, Ordering::SeqCst);
        })?;
    }

    // ------------------------------------------------------------
    // Scheduler
    // ------------------------------------------------------------
    let scheduler = Arc::new(build_scheduler(&cfg)?);

    start_api(&cfg, scheduler.clone())?;
    start_retention(&cfg, running.clone())?;

    if cfg.capture.autostart {
        scheduler.start()?;
    } else {
        info!("[framelift] autostart off, waiting for control request");
    }

    info!("[framelift] running – Ctrl+C to stop");
    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));
    }

    // ------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------
    info!("[framelift] shutting down…");
    scheduler.shutdown();
    info!("[framelift] shutdown complete");

    Ok(())
}

fn build_scheduler(cfg: &Config) -> anyhow::Result<CaptureScheduler> {
    let registry = Arc::new(MemoryRegistry::with_sources(cfg.sources.iter().cloned()));

    let ctx = CycleContext {
        fetcher: Arc::new(FfmpegFetcher::new(
            &cfg.capture.ffmpeg,
            &cfg.capture.stream_path,
            cfg.capture.fetch_timeout(),
        )),
        store: LocalStore::new(cfg.capture.root_dir.clone()),
        relay: Arc::new(FtpRelay::new(cfg.relay_timeout())),
        credentials: Arc::new(StaticCredentials::new(cfg.relay_credentials())),
        clock: Arc::new(SystemClock),
    };

    CaptureScheduler::new(
        registry,
        ctx,
        SchedulerConfig {
            tick_interval: cfg.capture.tick_interval(),
            workers: cfg.capture.workers,
        },
    )
}

//
// ============================================================
// START_* HELPERS
// ============================================================
//

fn start_api(cfg: &Config, scheduler: Arc<CaptureScheduler>) -> anyhow::Result<()> {
    match &cfg.api {
        Some(api_cfg) if api_cfg.enabled => api::start_api_server(&api_cfg.bind, scheduler),
        _ => {
            info!("[framelift] api disabled");
            Ok(())
        }
    }
}

fn start_retention(cfg: &Config, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let Some(retention_cfg) = cfg.retention.clone() else {
        return Ok(());
    };
    let retention = DateTreeRetention::new(cfg.capture.root_dir.clone(), retention_cfg.days);
    let ticker = channel::tick(Duration::from_secs(retention_cfg.interval_secs.max(60)));

    thread::Builder::new()
        .name("retention".into())
        .spawn(move || {
            info!(
                "[retention] keeping {} days, sweep every {}s",
                retention_cfg.days, retention_cfg.interval_secs
            );
            loop {
                match retention.run(Local::now().date_naive()) {
                    Ok(removed) if !removed.is_empty() => {
                        info!("[retention] removed {} day directories", removed.len())
                    }
                    Ok(_) => {}
                    Err(e) => warn!("[retention] sweep failed: {}", e),
                }
                if ticker.recv().is_err() || !running.load(Ordering::Relaxed) {
                    break;
                }
            }
        })?;

    Ok(())
}

fn run_discovery(timeout: Duration) -> anyhow::Result<()> {
    let devices = match discovery::discover_onvif(timeout) {
        Ok(devices) => devices,
        Err(e) => {
            error!("[discovery] {:#}", e);
            return Err(e);
        }
    };

    if devices.is_empty() {
        println!("# no ONVIF devices found");
        return Ok(());
    }

    for (i, device) in devices.iter().enumerate() {
        println!("{}", discovery::source_snippet(i as u32 + 1, device));
    }
    println!("# {} device(s) discovered", devices.len());
    Ok(())
}
