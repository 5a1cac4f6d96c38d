// src/service.rs
//! Explicitly constructed service value: wiring between the broker feed,
//! the orchestrator, and the background workers, with a defined
//! startup/shutdown contract.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{info, warn};

use crate::broker::client::InboundMessage;
use crate::config::Config;
use crate::inference::InferenceEngine;
use crate::persist::store::PersistStore;
use crate::session::orchestrator::{BufferStat, Orchestrator};
use crate::session::tasks::spawn_background_tasks;

const DISPATCH_POLL: Duration = Duration::from_millis(200);

/// Read-only snapshot for the operational surface.
#[derive(Debug, Clone)]
pub struct ServiceStatus {
    pub active_buffers: usize,
    pub buffer_stats: Vec<BufferStat>,
    pub demo_mode: bool,
    pub broker_connected: bool,
}

pub struct AuscultService {
    engine: Arc<InferenceEngine>,
    orchestrator: Arc<Orchestrator>,
    running: Arc<AtomicBool>,
    broker_connected: Arc<AtomicBool>,
    msg_tx: Sender<InboundMessage>,
    msg_rx: Option<Receiver<InboundMessage>>,
    workers: Vec<JoinHandle<()>>,
    stream_cfg: crate::config::StreamConfig,
}

impl AuscultService {
    pub fn new(cfg: Config, store: Arc<dyn PersistStore>, engine: InferenceEngine) -> Self {
        let engine = Arc::new(engine);
        let stream_cfg = cfg.stream.clone();
        let orchestrator = Arc::new(Orchestrator::new(cfg, store, Arc::clone(&engine)));
        let (msg_tx, msg_rx) = unbounded();
        Self {
            engine,
            orchestrator,
            running: Arc::new(AtomicBool::new(false)),
            broker_connected: Arc::new(AtomicBool::new(false)),
            msg_tx,
            msg_rx: Some(msg_rx),
            workers: Vec::new(),
            stream_cfg,
        }
    }

    /// Channel the broker client feeds raw messages into.
    pub fn sender(&self) -> Sender<InboundMessage> {
        self.msg_tx.clone()
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn broker_connected_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.broker_connected)
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        Arc::clone(&self.orchestrator)
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            active_buffers: self.orchestrator.active_buffers(),
            buffer_stats: self.orchestrator.buffer_stats(),
            demo_mode: self.engine.demo_mode_active(),
            broker_connected: self.broker_connected.load(Ordering::Relaxed),
        }
    }

    /// Spawn the dispatcher and the background workers. Idempotent.
    pub fn start(&mut self) {
        let Some(rx) = self.msg_rx.take() else {
            warn!("[service] start called twice, ignoring");
            return;
        };
        self.running.store(true, Ordering::SeqCst);

        let orchestrator = Arc::clone(&self.orchestrator);
        let running = Arc::clone(&self.running);
        self.workers.push(thread::spawn(move || {
            info!("[service] dispatcher started");
            while running.load(Ordering::Relaxed) {
                match rx.recv_timeout(DISPATCH_POLL) {
                    Ok(message) => {
                        orchestrator.dispatch(&message.topic, &message.payload, Instant::now())
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            info!("[service] dispatcher stopped");
        }));

        self.workers.extend(spawn_background_tasks(
            Arc::clone(&self.orchestrator),
            &self.stream_cfg,
            Arc::clone(&self.running),
        ));
    }

    /// Stop the workers and give in-flight finalizations a bounded grace
    /// period before abandoning them.
    pub fn shutdown(mut self, grace: Duration) {
        self.running.store(false, Ordering::SeqCst);
        self.orchestrator.drain(grace);
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("[service] worker thread panicked");
            }
        }
        info!("[service] shutdown complete");
    }
}
