// src/broker/meta.rs
//! Control-message payloads carried on the `meta` topic.

use serde::Deserialize;

use crate::session::buffer::ValvePosition;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum MetaMessage {
    #[serde(rename = "start_pcg")]
    StartPcg(PcgStart),
    #[serde(rename = "end_pcg")]
    EndPcg(SessionEnd),
    #[serde(rename = "start_ecg")]
    StartEcg(EcgStart),
    #[serde(rename = "end_ecg")]
    EndEcg(SessionEnd),
}

#[derive(Debug, Clone, Deserialize)]
pub struct PcgStart {
    pub session_id: Option<String>,
    pub valve_position: Option<ValvePosition>,
    pub sample_rate_hz: Option<u32>,
    pub format: Option<String>,
    pub channels: Option<u8>,
    pub chunk_ms: Option<u32>,
    pub target_duration_sec: Option<u32>,
    pub timestamp_ms: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EcgStart {
    pub session_id: Option<String>,
    pub sample_rate_hz: Option<u32>,
    pub format: Option<String>,
    pub lead: Option<String>,
    pub chunk_samples: Option<u32>,
    pub window_size: Option<u32>,
    pub timestamp_ms: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionEnd {
    pub session_id: Option<String>,
    pub timestamp_ms: Option<i64>,
}

impl MetaMessage {
    pub fn parse(payload: &[u8]) -> Result<Self, crate::core::error::ProtocolError> {
        serde_json::from_slice(payload).map_err(|e| {
            crate::core::error::ProtocolError::MalformedMeta {
                reason: e.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_pcg() {
        let payload = br#"{
            "type": "start_pcg",
            "session_id": "sess-1",
            "valve_position": "AV",
            "sample_rate_hz": 22050,
            "format": "pcm_s16le",
            "channels": 1,
            "chunk_ms": 200,
            "target_duration_sec": 10,
            "timestamp_ms": 1700000000000
        }"#;
        match MetaMessage::parse(payload).expect("parse") {
            MetaMessage::StartPcg(start) => {
                assert_eq!(start.valve_position, Some(ValvePosition::Av));
                assert_eq!(start.sample_rate_hz, Some(22_050));
                assert_eq!(start.format.as_deref(), Some("pcm_s16le"));
            }
            other => panic!("unexpected variant {other:?}"),
        }
    }

    #[test]
    fn parses_end_ecg() {
        let payload = br#"{ "type": "end_ecg", "session_id": "sess-1", "timestamp_ms": 1 }"#;
        assert!(matches!(
            MetaMessage::parse(payload).expect("parse"),
            MetaMessage::EndEcg(_)
        ));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let payload = br#"{ "type": "start_emg", "session_id": "sess-1" }"#;
        assert!(MetaMessage::parse(payload).is_err());
    }

    #[test]
    fn non_json_is_rejected() {
        assert!(MetaMessage::parse(b"\x01\x02\x03").is_err());
    }
}
