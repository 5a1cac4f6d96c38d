// src/session/tasks.rs
//! Background workers: the timeout sweeper and the live-metrics publisher.
//! Both are thin tick loops over re-entrant orchestrator passes, so tests
//! drive the same code paths directly without any clock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::tick;
use log::{info, warn};

use crate::config::StreamConfig;
use crate::session::orchestrator::Orchestrator;

const STOP_POLL: Duration = Duration::from_millis(200);

pub fn spawn_background_tasks(
    orchestrator: Arc<Orchestrator>,
    cfg: &StreamConfig,
    running: Arc<AtomicBool>,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    {
        let orchestrator = Arc::clone(&orchestrator);
        let running = Arc::clone(&running);
        let interval = Duration::from_secs(cfg.sweep_interval_sec.max(1));
        handles.push(thread::spawn(move || {
            info!("[sweeper] started (every {:?})", interval);
            let ticker = tick(interval);
            while running.load(Ordering::Relaxed) {
                if ticker.recv_timeout(STOP_POLL).is_ok() {
                    orchestrator.sweep_timeouts(Instant::now());
                }
            }
            info!("[sweeper] stopped");
        }));
    }

    if cfg.metrics_update_hz > 0.0 {
        let orchestrator = Arc::clone(&orchestrator);
        let running = Arc::clone(&running);
        let interval = Duration::from_secs_f64(1.0 / cfg.metrics_update_hz);
        handles.push(thread::spawn(move || {
            info!("[metrics] started (every {:?})", interval);
            let ticker = tick(interval);
            while running.load(Ordering::Relaxed) {
                if ticker.recv_timeout(STOP_POLL).is_ok() {
                    orchestrator.publish_live_metrics();
                }
            }
            info!("[metrics] stopped");
        }));
    } else {
        warn!("[metrics] disabled (METRICS_UPDATE_HZ <= 0)");
    }

    handles
}
