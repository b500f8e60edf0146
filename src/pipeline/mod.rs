//! Telegram to message transformation.
//!
//! The pipeline owns the per-output runtime state (delta baselines and the
//! last published timestamp) apart from the immutable configuration. State
//! is addressed by output index and key index.

use crate::config::{Config, ConfigError, OutputConfig};
use crate::models::{Message, ReadingSet, Value};
use crate::mqtt::Publication;
use crate::p1::utils;
use chrono::{DateTime, FixedOffset};
use log::{debug, error, warn};
use rumqttc::QoS;

pub mod delta;
pub mod extract;
pub mod timestamp;

use delta::DeltaState;
use extract::Extracted;
use timestamp::MonotonicGate;

/// Runtime state of one output
#[derive(Debug, Clone, Default)]
pub struct OutputState {
    pub gate: MonotonicGate,
    pub keys: Vec<DeltaState>,
}

impl OutputState {
    fn for_output(output: &OutputConfig) -> Self {
        OutputState {
            gate: MonotonicGate::new(),
            keys: vec![DeltaState::new(); output.keys.len()],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    pub outputs: Vec<OutputState>,
}

impl PipelineState {
    pub fn for_config(config: &Config) -> Self {
        PipelineState { outputs: config.outputs.iter().map(OutputState::for_output).collect() }
    }
}

pub struct Pipeline {
    config: Config,
    qos: QoS,
    state: PipelineState,
}

impl Pipeline {
    /// Takes a loaded configuration. The checks run again, without the
    /// load time warnings.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let qos = config.qos();
        let state = PipelineState::for_config(&config);
        Ok(Pipeline { config, qos, state })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Turn one telegram into the publications it triggers, in output order.
    /// A telegram without a usable timestamp yields nothing.
    pub fn process(&mut self, readings: &ReadingSet) -> Vec<Publication> {
        let base = match timestamp::telegram_timestamp(readings, &self.config.timestamp.obis) {
            Ok(ts) => ts,
            Err(e) => {
                error!("Error parsing timestamp, dropping telegram: {}", e);
                return Vec::new();
            }
        };

        let mut publications = Vec::new();
        for (output, state) in self.config.outputs.iter().zip(self.state.outputs.iter_mut()) {
            let Some(message) = state.assemble(output, readings, base) else {
                continue;
            };
            if let Some(publication) = state.finish(output, message, &self.config, self.qos) {
                publications.push(publication);
            }
        }
        publications
    }
}

/// A complete message and the timestamp it belongs to
struct Assembled {
    message: Message,
    timestamp: DateTime<FixedOffset>,
}

impl OutputState {
    /// Extract every key of the output. Returns `None` while a delta key is
    /// still priming.
    fn assemble(&mut self, output: &OutputConfig, readings: &ReadingSet, base: DateTime<FixedOffset>) -> Option<Assembled> {
        let mut message = Message::new();
        let mut effective = base;
        let mut incomplete = false;

        for (key, delta) in output.keys.iter().zip(self.keys.iter_mut()) {
            if let Some(token) = extract::field_timestamp(readings, key) {
                match utils::parse_timestamp(token) {
                    Ok(ts) => effective = ts,
                    Err(e) => warn!("{}: ignoring timestamp of {}: {}", output.topic, key.identifier, e),
                }
            }

            let extracted = match extract::extract(readings, key) {
                Ok(extracted) => extracted,
                Err(e) => {
                    warn!("{}: skipping {}: {}", output.topic, key.name, e);
                    continue;
                }
            };

            match extracted {
                Extracted::Verbatim(raw) => message.insert(&key.name, Value::Raw(raw)),
                Extracted::Measured { value, unit } => {
                    let value = if key.delta {
                        match delta.observe(value) {
                            Some(difference) => difference,
                            None => {
                                incomplete = true;
                                continue;
                            }
                        }
                    } else {
                        value
                    };

                    message.insert(&key.name, Value::Float(value));
                    if let Some(unit) = unit {
                        message.insert(&key.unit_name, Value::Text(unit));
                    }
                }
            }
        }

        if incomplete {
            debug!("{}: delta keys primed, nothing to publish yet", output.topic);
            return None;
        }

        Some(Assembled { message, timestamp: effective })
    }

    /// Gate, stamp and encode an assembled message
    fn finish(&mut self, output: &OutputConfig, assembled: Assembled, config: &Config, qos: QoS) -> Option<Publication> {
        let Assembled { mut message, timestamp: effective } = assembled;

        if !self.gate.is_newer(&effective) {
            debug!("{}: timestamp {} not newer than {}, skipping", output.topic, effective, self.gate.last_accepted());
            return None;
        }

        let stamp = match timestamp::format_timestamp(&effective, &config.timestamp.format) {
            Ok(stamp) => stamp,
            Err(e) => {
                error!("{}: {}", output.topic, e);
                return None;
            }
        };
        message.insert(&config.timestamp.key, stamp);

        let payload = match config.encoding.encode(&message) {
            Ok(payload) => payload,
            Err(e) => {
                error!("{}: {}", output.topic, e);
                return None;
            }
        };

        self.gate.advance(effective);
        debug!("{}: {:?}", output.topic, message);
        Some(Publication {
            topic: output.topic.clone(),
            payload,
            qos,
            retain: config.mqtt.retain,
        })
    }
}
