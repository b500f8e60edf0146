use chrono::format::{Item, StrftimeItems};
use log::{debug, info, warn};
use rumqttc::QoS;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::codec::Encoding;
use crate::mqtt::qos_from_u8;
use crate::obis_utils;

const CONFIG_LOCATIONS: [&str; 2] = ["config/p1mqtt.yaml", "p1mqtt.yaml"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read the config file {path}: {source}")]
    Read { path: String, #[source] source: std::io::Error },
    #[error("Unable to find a config file, tried {0}")]
    NotFound(String),
    #[error("Unable to parse config file: {0}")]
    Parse(#[from] serde_yml::Error),
    #[error("Invalid QoS value specified in configuration file: {0}")]
    InvalidQos(u8),
    #[error("Invalid timestamp format specified in configuration file: {0}")]
    InvalidTimestampFormat(String),
    #[error("Unsupported encoding specified in configuration file: {0} (not compiled in)")]
    EncodingNotAvailable(Encoding),
}

fn p1_device_default() -> String { return "/dev/ttyUSB0".to_string() }
fn p1_baudrate_default() -> u32 { return 115200 }
fn p1_verify_checksum_default() -> bool { return true }

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct P1Config {
    #[serde(default="p1_device_default")]
    pub device: String,
    #[serde(default="p1_baudrate_default")]
    pub baudrate: u32,
    #[serde(default="p1_verify_checksum_default")]
    pub verify_checksum: bool,
}

fn mqtt_port_default() -> u16 { return 1883 }
fn mqtt_client_id_default() -> String { return "p1mqtt".to_string() }
fn mqtt_keep_alive_default() -> u64 { return 5 }
fn mqtt_publish_retries_default() -> u32 { return 3 }
fn mqtt_retry_backoff_default() -> u64 { return 500 }

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MqttConfig {
    #[serde(default)]
    pub base_topic: String,
    pub host: String,
    #[serde(default="mqtt_port_default")]
    pub port: u16,
    #[serde(default="mqtt_client_id_default")]
    pub client_id: String,
    #[serde(default)]
    pub qos: u8,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub pass: Option<String>,
    #[serde(default)]
    pub retain: bool,
    /// Seconds
    #[serde(default="mqtt_keep_alive_default")]
    pub keep_alive: u64,
    #[serde(default="mqtt_publish_retries_default")]
    pub publish_retries: u32,
    #[serde(default="mqtt_retry_backoff_default")]
    pub retry_backoff_ms: u64,
}

/// How the effective timestamp is rendered into a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TimestampFormat {
    /// Integer seconds since the epoch
    Unix,
    /// Integer nanoseconds since the epoch
    UnixNano,
    /// strftime layout, rendered as a string
    Layout(String),
}

impl From<String> for TimestampFormat {
    fn from(s: String) -> Self {
        match s.as_str() {
            "unix" => TimestampFormat::Unix,
            "unixnano" => TimestampFormat::UnixNano,
            _ => TimestampFormat::Layout(s),
        }
    }
}

impl From<TimestampFormat> for String {
    fn from(format: TimestampFormat) -> Self {
        match format {
            TimestampFormat::Unix => "unix".to_string(),
            TimestampFormat::UnixNano => "unixnano".to_string(),
            TimestampFormat::Layout(layout) => layout,
        }
    }
}

fn timestamp_obis_default() -> String { return "0-0:1.0.0".to_string() }
fn timestamp_key_default() -> String { return "timestamp".to_string() }
fn timestamp_format_default() -> TimestampFormat { return TimestampFormat::Unix }

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct TimestampConfig {
    #[serde(default="timestamp_obis_default")]
    pub obis: String,
    #[serde(default="timestamp_key_default")]
    pub key: String,
    #[serde(default="timestamp_format_default")]
    pub format: TimestampFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum KeyKind {
    /// First token copied as is
    Verbatim,
    /// Last token parsed as a number
    Measured,
}

impl From<String> for KeyKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "verbatim" => KeyKind::Verbatim,
            _ => KeyKind::Measured,
        }
    }
}

impl From<KeyKind> for String {
    fn from(kind: KeyKind) -> Self {
        match kind {
            KeyKind::Verbatim => "verbatim".to_string(),
            KeyKind::Measured => "measured".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueParser {
    /// `000123.456*kWh`
    ValueWithUnit,
    /// `0.95`, no unit field is emitted
    Value,
}

fn key_kind_default() -> KeyKind { return KeyKind::Measured }
fn key_parser_default() -> ValueParser { return ValueParser::ValueWithUnit }

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct KeyConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub unit_name: String,
    pub identifier: String,
    #[serde(rename = "type", default="key_kind_default")]
    pub kind: KeyKind,
    #[serde(default="key_parser_default")]
    pub parser: ValueParser,
    #[serde(default)]
    pub delta: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct OutputConfig {
    pub topic: String,
    #[serde(default)]
    pub keys: Vec<KeyConfig>,
    #[serde(skip)]
    topic_resolved: bool,
}

impl OutputConfig {
    pub fn new(topic: &str, keys: Vec<KeyConfig>) -> Self {
        OutputConfig { topic: topic.to_string(), keys, topic_resolved: false }
    }
}

fn encoding_default() -> Encoding { return Encoding::Json }
fn default_key_default() -> String { return "value".to_string() }
fn default_unit_key_default() -> String { return "unit".to_string() }
fn p1_default() -> P1Config {
    return P1Config {
        device: p1_device_default(),
        baudrate: p1_baudrate_default(),
        verify_checksum: p1_verify_checksum_default(),
    }
}
fn timestamp_default() -> TimestampConfig {
    return TimestampConfig {
        obis: timestamp_obis_default(),
        key: timestamp_key_default(),
        format: timestamp_format_default(),
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default="encoding_default")]
    pub encoding: Encoding,
    #[serde(default="default_key_default")]
    pub default_key: String,
    #[serde(default="default_unit_key_default")]
    pub default_unit_key: String,
    #[serde(default="p1_default")]
    pub p1: P1Config,
    pub mqtt: MqttConfig,
    #[serde(default="timestamp_default")]
    pub timestamp: TimestampConfig,
    #[serde(default)]
    pub outputs: Vec<OutputConfig>,
}

impl Config {
    /// Pick the explicit path or the first default location that exists
    pub fn locate(explicit: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
        if let Some(path) = explicit {
            return Ok(path);
        }

        CONFIG_LOCATIONS
            .iter()
            .map(|p| Path::new(p).to_path_buf())
            .find(|p| p.exists())
            .ok_or_else(|| ConfigError::NotFound(CONFIG_LOCATIONS.join(", ")))
    }

    /// Read, default and validate the configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let read_error = |source| ConfigError::Read { path: path.display().to_string(), source };

        let mut file = File::open(path).map_err(read_error)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).map_err(read_error)?;

        info!("Configuration file: {}", path.display());
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yml::from_str(contents)?;
        config.apply_defaults();
        config.validate()?;
        config.report_identifiers();
        Ok(config)
    }

    /// Resolve topics and fill in default field names. Safe to call twice.
    pub fn apply_defaults(&mut self) {
        for output in self.outputs.iter_mut() {
            if !output.topic_resolved {
                output.topic = format!("{}{}", self.mqtt.base_topic, output.topic);
                output.topic_resolved = true;
            }

            for key in output.keys.iter_mut() {
                if key.name.is_empty() {
                    key.name = self.default_key.clone();
                }
                if key.unit_name.is_empty() {
                    key.unit_name = self.default_unit_key.clone();
                }
            }
        }
    }

    /// Checks only, logs nothing
    pub fn validate(&self) -> Result<(), ConfigError> {
        if qos_from_u8(self.mqtt.qos).is_none() {
            return Err(ConfigError::InvalidQos(self.mqtt.qos));
        }

        if !self.encoding.is_available() {
            return Err(ConfigError::EncodingNotAvailable(self.encoding));
        }

        if let TimestampFormat::Layout(layout) = &self.timestamp.format {
            if StrftimeItems::new(layout).any(|item| matches!(item, Item::Error)) {
                return Err(ConfigError::InvalidTimestampFormat(layout.clone()));
            }
        }

        Ok(())
    }

    /// Warn about identifiers that are not OBIS codes, once at load time
    fn report_identifiers(&self) {
        if !obis_utils::validate_obis_code(&self.timestamp.obis) {
            warn!("Timestamp identifier {} does not look like an OBIS code", self.timestamp.obis);
        }

        for output in &self.outputs {
            if output.keys.is_empty() {
                warn!("Output {} has no keys and will only carry a timestamp", output.topic);
            }
            for key in &output.keys {
                if !obis_utils::validate_obis_code(&key.identifier) {
                    warn!("Identifier {} on {} does not look like an OBIS code", key.identifier, output.topic);
                }
                debug!("{} <- {} ({})", output.topic, key.identifier,
                       obis_utils::get_obis_description(&key.identifier).unwrap_or("unknown"));
            }
        }
    }

    /// Only valid after `validate`
    pub fn qos(&self) -> QoS {
        qos_from_u8(self.mqtt.qos).unwrap_or(QoS::AtMostOnce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
encoding: json
defaultKey: value
defaultUnitKey: unit
p1:
  device: /dev/ttyUSB1
  baudrate: 115200
mqtt:
  baseTopic: home/p1/
  host: localhost
  clientId: p1mqtt-test
  qos: 1
timestamp:
  obis: "0-0:1.0.0"
  key: ts
  format: unix
outputs:
  - topic: power
    keys:
      - identifier: "1-0:1.7.0"
      - name: id
        identifier: "0-0:96.1.1"
        type: verbatim
  - topic: gas
    keys:
      - name: used
        unitName: gasunit
        identifier: "0-1:24.2.1"
        delta: true
"#;

    #[test]
    fn test_parse_sample_config() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.encoding, Encoding::Json);
        assert_eq!(config.p1.device, "/dev/ttyUSB1");
        assert!(config.p1.verify_checksum);
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.qos(), QoS::AtLeastOnce);
        assert_eq!(config.timestamp.format, TimestampFormat::Unix);
        assert_eq!(config.outputs.len(), 2);

        let power = &config.outputs[0];
        assert_eq!(power.topic, "home/p1/power");
        assert_eq!(power.keys[0].name, "value");
        assert_eq!(power.keys[0].unit_name, "unit");
        assert_eq!(power.keys[0].kind, KeyKind::Measured);
        assert_eq!(power.keys[0].parser, ValueParser::ValueWithUnit);
        assert_eq!(power.keys[1].kind, KeyKind::Verbatim);

        let gas = &config.outputs[1];
        assert_eq!(gas.topic, "home/p1/gas");
        assert_eq!(gas.keys[0].unit_name, "gasunit");
        assert!(gas.keys[0].delta);
    }

    #[test]
    fn test_apply_defaults_is_idempotent() {
        let mut config = Config::from_yaml(SAMPLE).unwrap();
        let topics: Vec<String> = config.outputs.iter().map(|o| o.topic.clone()).collect();
        let names: Vec<String> = config.outputs.iter()
            .flat_map(|o| o.keys.iter().map(|k| format!("{}/{}", k.name, k.unit_name)))
            .collect();

        config.apply_defaults();
        config.apply_defaults();

        let topics_after: Vec<String> = config.outputs.iter().map(|o| o.topic.clone()).collect();
        let names_after: Vec<String> = config.outputs.iter()
            .flat_map(|o| o.keys.iter().map(|k| format!("{}/{}", k.name, k.unit_name)))
            .collect();
        assert_eq!(topics, topics_after);
        assert_eq!(names, names_after);
    }

    #[test]
    fn test_invalid_qos_is_rejected() {
        let yaml = SAMPLE.replace("qos: 1", "qos: 3");
        assert!(matches!(Config::from_yaml(&yaml), Err(ConfigError::InvalidQos(3))));
    }

    #[test]
    fn test_unknown_encoding_is_rejected() {
        let yaml = SAMPLE.replace("encoding: json", "encoding: xml");
        assert!(matches!(Config::from_yaml(&yaml), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_timestamp_formats() {
        let yaml = SAMPLE.replace("format: unix", "format: unixnano");
        assert_eq!(Config::from_yaml(&yaml).unwrap().timestamp.format, TimestampFormat::UnixNano);

        let yaml = SAMPLE.replace("format: unix", "format: \"%Y-%m-%d %H:%M:%S\"");
        assert_eq!(Config::from_yaml(&yaml).unwrap().timestamp.format,
                   TimestampFormat::Layout("%Y-%m-%d %H:%M:%S".to_string()));

        let yaml = SAMPLE.replace("format: unix", "format: \"%Q\"");
        assert!(matches!(Config::from_yaml(&yaml), Err(ConfigError::InvalidTimestampFormat(_))));
    }

    #[test]
    fn test_value_parser_selection() {
        let yaml = SAMPLE.replace("identifier: \"1-0:1.7.0\"", "identifier: \"1-0:1.7.0\"\n        parser: value");
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.outputs[0].keys[0].parser, ValueParser::Value);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.mqtt.client_id, "p1mqtt-test");

        let missing = Config::load(Path::new("/nonexistent/p1mqtt.yaml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_locate_prefers_explicit_path() {
        let path = Config::locate(Some(PathBuf::from("custom.yaml"))).unwrap();
        assert_eq!(path, PathBuf::from("custom.yaml"));
    }
}
