// src/main.rs
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};

use auscult_node::broker::client::spawn_broker_client;
use auscult_node::config::Config;
use auscult_node::inference::InferenceEngine;
use auscult_node::persist::rest::RestStore;
use auscult_node::service::AuscultService;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // ------------------------------------------------------------
    // Config
    // ------------------------------------------------------------
    let cfg = Config::from_env()?;
    info!(
        "[auscult] configured: broker {}:{}, timeout {}s, metrics {} Hz",
        cfg.mqtt.broker, cfg.mqtt.port, cfg.stream.timeout_sec, cfg.stream.metrics_update_hz
    );

    // ------------------------------------------------------------
    // Store / models
    // ------------------------------------------------------------
    let store = Arc::new(RestStore::new(&cfg.store));
    let engine = InferenceEngine::new(&cfg.model)?;
    info!("[auscult] demo mode active: {}", engine.demo_mode_active());

    // ------------------------------------------------------------
    // Service
    // ------------------------------------------------------------
    let mut service = AuscultService::new(cfg.clone(), store, engine);
    service.start();

    let running = service.running_flag();
    {
        let r = running.clone();
        ctrlc::set_handler(move || {
            info!("[auscult] shutdown requested");
            r.store(false, Ordering::SeqCst);
        })?;
    }

    // ------------------------------------------------------------
    // Broker feed
    // ------------------------------------------------------------
    let _broker = spawn_broker_client(
        &cfg.mqtt,
        service.sender(),
        service.broker_connected_flag(),
        service.running_flag(),
    )?;

    // ------------------------------------------------------------
    // Main loop
    // ------------------------------------------------------------
    info!("[auscult] running – Ctrl+C to stop");
    let mut last_stats = Instant::now();
    while running.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(100));

        if last_stats.elapsed() >= Duration::from_secs(5) {
            let status = service.status();
            debug!(
                "[auscult] buffers={} broker_connected={}",
                status.active_buffers, status.broker_connected
            );
            last_stats = Instant::now();
        }
    }

    // ------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------
    info!("[auscult] shutting down…");
    service.shutdown(SHUTDOWN_GRACE);
    Ok(())
}
