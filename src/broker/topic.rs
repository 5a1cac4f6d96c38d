// src/broker/topic.rs
//! Topic grammar: `org/{org}/device/{dev}/session/{sid}/{kind}`.

use crate::core::error::ProtocolError;

/// Subscription patterns with their QoS levels. Control messages are
/// delivered at least once; data and heartbeats are fire-and-forget.
pub const SUBSCRIPTIONS: [(&str, u8); 4] = [
    ("org/+/device/+/session/+/meta", 1),
    ("org/+/device/+/session/+/pcg", 0),
    ("org/+/device/+/session/+/ecg", 0),
    ("org/+/device/+/session/+/heartbeat", 0),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    Meta,
    Pcg,
    Ecg,
    Heartbeat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTopic {
    pub org_id: String,
    pub device_id: String,
    pub session_id: String,
    pub kind: TopicKind,
}

pub fn parse_topic(topic: &str) -> Result<ParsedTopic, ProtocolError> {
    let parts: Vec<&str> = topic.split('/').collect();
    if parts.len() != 7 || parts[0] != "org" || parts[2] != "device" || parts[4] != "session" {
        return Err(ProtocolError::InvalidTopic {
            topic: topic.to_string(),
        });
    }

    let (org_id, device_id, session_id) = (parts[1], parts[3], parts[5]);
    if org_id.is_empty() || device_id.is_empty() || session_id.is_empty() {
        return Err(ProtocolError::EmptyId {
            topic: topic.to_string(),
        });
    }

    let kind = match parts[6] {
        "meta" => TopicKind::Meta,
        "pcg" => TopicKind::Pcg,
        "ecg" => TopicKind::Ecg,
        "heartbeat" => TopicKind::Heartbeat,
        _ => {
            return Err(ProtocolError::InvalidTopic {
                topic: topic.to_string(),
            })
        }
    };

    Ok(ParsedTopic {
        org_id: org_id.to_string(),
        device_id: device_id.to_string(),
        session_id: session_id.to_string(),
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_topics() {
        let parsed = parse_topic("org/org-1/device/dev-2/session/sess-3/pcg").expect("parse");
        assert_eq!(parsed.org_id, "org-1");
        assert_eq!(parsed.device_id, "dev-2");
        assert_eq!(parsed.session_id, "sess-3");
        assert_eq!(parsed.kind, TopicKind::Pcg);
    }

    #[test]
    fn rejects_wrong_segment_count() {
        assert!(parse_topic("org/a/device/b/session/c").is_err());
        assert!(parse_topic("org/a/device/b/session/c/pcg/extra").is_err());
    }

    #[test]
    fn rejects_empty_ids() {
        assert!(matches!(
            parse_topic("org//device/b/session/c/meta"),
            Err(ProtocolError::EmptyId { .. })
        ));
    }

    #[test]
    fn rejects_unknown_kind() {
        assert!(parse_topic("org/a/device/b/session/c/video").is_err());
    }

    #[test]
    fn rejects_wrong_literals() {
        assert!(parse_topic("house/a/device/b/session/c/meta").is_err());
        assert!(parse_topic("org/a/gadget/b/session/c/meta").is_err());
    }

    #[test]
    fn wildcard_segments_line_up_with_the_grammar() {
        for (pattern, _) in SUBSCRIPTIONS {
            assert_eq!(pattern.split('/').count(), 7);
        }
    }
}
