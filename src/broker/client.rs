// src/broker/client.rs
//! Broker client: connects, subscribes to the device topic tree, and feeds
//! raw messages into the dispatcher channel. Runs on its own thread; the
//! core never blocks on it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{bounded, Sender};
use log::{error, info, warn};
use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS};

use crate::config::MqttConfig;
use crate::core::error::StartupError;
use crate::broker::topic::SUBSCRIPTIONS;

const CLIENT_ID: &str = "auscult-inference";
const STARTUP_ATTEMPTS: u32 = 5;
const STARTUP_WAIT: Duration = Duration::from_secs(30);
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

fn qos_level(raw: u8) -> QoS {
    match raw {
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}

/// Connect and start the dispatch thread. Returns once the broker has
/// acknowledged the connection, or fails startup after bounded retries.
pub fn spawn_broker_client(
    cfg: &MqttConfig,
    tx: Sender<InboundMessage>,
    connected: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
) -> Result<thread::JoinHandle<()>, StartupError> {
    let mut options = MqttOptions::new(CLIENT_ID, &cfg.broker, cfg.port);
    options.set_credentials(&cfg.username, &cfg.password);
    options.set_keep_alive(Duration::from_secs(cfg.keepalive_sec));

    let (client, connection) = Client::new(options, 128);
    for (pattern, qos) in SUBSCRIPTIONS {
        client
            .subscribe(pattern, qos_level(qos))
            .map_err(|e| StartupError::BrokerConnect {
                attempts: 0,
                reason: e.to_string(),
            })?;
    }
    info!(
        "[broker] connecting to {}:{} as {CLIENT_ID}",
        cfg.broker, cfg.port
    );

    let (ready_tx, ready_rx) = bounded(1);
    let handle = thread::spawn(move || dispatch_loop(connection, tx, connected, running, ready_tx));

    match ready_rx.recv_timeout(STARTUP_WAIT) {
        Ok(Ok(())) => Ok(handle),
        Ok(Err(reason)) => Err(StartupError::BrokerConnect {
            attempts: STARTUP_ATTEMPTS,
            reason,
        }),
        Err(_) => Err(StartupError::BrokerConnect {
            attempts: 0,
            reason: "timed out waiting for broker acknowledgment".into(),
        }),
    }
}

fn dispatch_loop(
    mut connection: Connection,
    tx: Sender<InboundMessage>,
    connected: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    ready_tx: Sender<Result<(), String>>,
) {
    let mut acknowledged = false;
    let mut failures = 0u32;

    for event in connection.iter() {
        if !running.load(Ordering::Relaxed) {
            break;
        }
        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("[broker] connected");
                connected.store(true, Ordering::SeqCst);
                failures = 0;
                if !acknowledged {
                    acknowledged = true;
                    let _ = ready_tx.send(Ok(()));
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                };
                if tx.send(message).is_err() {
                    // Dispatcher is gone; nothing left to feed.
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                connected.store(false, Ordering::SeqCst);
                failures += 1;
                if !acknowledged && failures >= STARTUP_ATTEMPTS {
                    let _ = ready_tx.send(Err(e.to_string()));
                    error!("[broker] giving up initial connect: {e}");
                    break;
                }
                warn!("[broker] connection error ({failures}): {e}");
                thread::sleep(RECONNECT_BACKOFF);
            }
        }
    }
    connected.store(false, Ordering::SeqCst);
    info!("[broker] dispatch loop stopped");
}
