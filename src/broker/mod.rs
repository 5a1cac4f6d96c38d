// src/broker/mod.rs
pub mod client;
pub mod meta;
pub mod topic;

pub use client::{spawn_broker_client, InboundMessage};
pub use meta::{EcgStart, MetaMessage, PcgStart, SessionEnd};
pub use topic::{parse_topic, ParsedTopic, TopicKind, SUBSCRIPTIONS};
