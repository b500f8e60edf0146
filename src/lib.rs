//! DSMR P1 telegram to MQTT bridge
//!
//! Telegrams read from the smart meter's P1 port are turned into one message
//! per configured output and published on MQTT.

pub mod bridge;
pub mod codec;
pub mod config;
pub mod models;
pub mod mqtt;
pub mod obis_utils;
pub mod p1;
pub mod pipeline;

// Re-export common types for easier access
pub use bridge::{Bridge, BridgeStats};
pub use codec::Encoding;
pub use config::{Config, ConfigError};
pub use models::{Message, ReadingSet, Value};
pub use mqtt::{MqttPublisher, Publication, Publisher};
pub use p1::{Telegram, TelegramReader};
pub use pipeline::Pipeline;
