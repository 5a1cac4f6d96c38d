// src/config.rs
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::core::error::StartupError;

// ---------- Broker ----------
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub keepalive_sec: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            broker: "mosquitto".into(),
            port: 1883,
            username: "cardiosense".into(),
            password: "cardiosense123".into(),
            keepalive_sec: 60,
        }
    }
}

// ---------- PCG ----------
#[derive(Debug, Clone)]
pub struct PcgConfig {
    pub sample_rate: u32,
    pub target_duration_sec: f64,
    pub max_duration_sec: f64,
}

impl Default for PcgConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22_050,
            target_duration_sec: 10.0,
            max_duration_sec: 15.0,
        }
    }
}

// ---------- ECG ----------
#[derive(Debug, Clone)]
pub struct EcgConfig {
    pub sample_rate: u32,
    pub window_size: usize,
    pub max_duration_sec: f64,
}

impl Default for EcgConfig {
    fn default() -> Self {
        Self {
            sample_rate: 500,
            window_size: 500,
            max_duration_sec: 60.0,
        }
    }
}

// ---------- Streaming ----------
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub timeout_sec: u64,
    pub sweep_interval_sec: u64,
    pub metrics_update_hz: f64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            timeout_sec: 10,
            sweep_interval_sec: 5,
            metrics_update_hz: 2.0,
        }
    }
}

// ---------- Backing store ----------
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub url: String,
    pub service_key: String,
    pub recordings_bucket: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            service_key: String::new(),
            recordings_bucket: "recordings".into(),
        }
    }
}

// ---------- Models ----------
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub models_dir: PathBuf,
    pub enable_demo_mode: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            enable_demo_mode: true,
        }
    }
}

// ---------- Root ----------
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub pcg: PcgConfig,
    pub ecg: EcgConfig,
    pub stream: StreamConfig,
    pub store: StoreConfig,
    pub model: ModelConfig,
}

impl Config {
    /// Build the configuration from the process environment. Unset keys fall
    /// back to the documented defaults; unparsable values are a fatal
    /// startup error rather than a silent default.
    pub fn from_env() -> Result<Self, StartupError> {
        let mut cfg = Config::default();

        cfg.mqtt.broker = env_string("MQTT_BROKER", &cfg.mqtt.broker);
        cfg.mqtt.port = env_parse("MQTT_PORT", cfg.mqtt.port)?;
        cfg.mqtt.username = env_string("MQTT_USERNAME", &cfg.mqtt.username);
        cfg.mqtt.password = env_string("MQTT_PASSWORD", &cfg.mqtt.password);
        cfg.mqtt.keepalive_sec = env_parse("MQTT_KEEPALIVE", cfg.mqtt.keepalive_sec)?;

        cfg.pcg.sample_rate = env_parse("PCG_SAMPLE_RATE", cfg.pcg.sample_rate)?;
        cfg.pcg.target_duration_sec =
            env_parse("PCG_TARGET_DURATION", cfg.pcg.target_duration_sec)?;
        cfg.pcg.max_duration_sec = env_parse("PCG_MAX_DURATION", cfg.pcg.max_duration_sec)?;

        cfg.ecg.sample_rate = env_parse("ECG_SAMPLE_RATE", cfg.ecg.sample_rate)?;
        cfg.ecg.window_size = env_parse("ECG_WINDOW_SIZE", cfg.ecg.window_size)?;
        cfg.ecg.max_duration_sec = env_parse("ECG_MAX_DURATION", cfg.ecg.max_duration_sec)?;

        cfg.stream.timeout_sec = env_parse("STREAM_TIMEOUT_SEC", cfg.stream.timeout_sec)?;
        cfg.stream.sweep_interval_sec =
            env_parse("SWEEP_INTERVAL_SEC", cfg.stream.sweep_interval_sec)?;
        cfg.stream.metrics_update_hz =
            env_parse("METRICS_UPDATE_HZ", cfg.stream.metrics_update_hz)?;

        cfg.store.url = env_string("STORE_URL", &cfg.store.url);
        cfg.store.service_key = env_string("STORE_SERVICE_KEY", &cfg.store.service_key);

        let models_dir = env_string("MODELS_DIR", &cfg.model.models_dir.to_string_lossy());
        cfg.model.models_dir = PathBuf::from(models_dir);
        cfg.model.enable_demo_mode = env_bool("ENABLE_DEMO_MODE", cfg.model.enable_demo_mode)?;

        Ok(cfg)
    }

    pub fn max_duration_sec(&self, modality: crate::session::buffer::Modality) -> f64 {
        match modality {
            crate::session::buffer::Modality::Pcg => self.pcg.max_duration_sec,
            crate::session::buffer::Modality::Ecg => self.ecg.max_duration_sec,
        }
    }
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> Result<T, StartupError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| StartupError::InvalidEnv {
            key: key.to_string(),
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool, StartupError> {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(StartupError::InvalidEnv {
                key: key.to_string(),
                value: raw,
            }),
        },
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.pcg.sample_rate, 22_050);
        assert_eq!(cfg.pcg.max_duration_sec, 15.0);
        assert_eq!(cfg.ecg.sample_rate, 500);
        assert_eq!(cfg.ecg.max_duration_sec, 60.0);
        assert_eq!(cfg.stream.timeout_sec, 10);
        assert_eq!(cfg.stream.metrics_update_hz, 2.0);
        assert!(cfg.model.enable_demo_mode);
    }
}
