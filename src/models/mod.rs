use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;

/// All readings of one telegram, keyed by OBIS identifier
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingSet {
    readings: HashMap<String, Vec<String>>,
}

impl ReadingSet {
    pub fn new() -> Self {
        ReadingSet { readings: HashMap::new() }
    }

    /// Append tokens to an identifier, creating it if needed
    pub fn push(&mut self, identifier: &str, token: String) {
        self.readings.entry(identifier.to_string()).or_default().push(token);
    }

    pub fn insert(&mut self, identifier: &str, tokens: Vec<String>) {
        self.readings.insert(identifier.to_string(), tokens);
    }

    pub fn get(&self, identifier: &str) -> Option<&[String]> {
        self.readings.get(identifier).map(|tokens| tokens.as_slice())
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.readings.contains_key(identifier)
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// A single value inside an outgoing message
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Token copied from the telegram without interpretation
    Raw(String),
    Text(String),
    Float(f64),
    Integer(i64),
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Raw(s) | Value::Text(s) => serializer.serialize_str(s),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Integer(i) => serializer.serialize_i64(*i),
        }
    }
}

/// Ordered field name to value mapping, encoded as a flat map
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    entries: Vec<(String, Value)>,
}

impl Message {
    pub fn new() -> Self {
        Message { entries: Vec::new() }
    }

    /// Insert a field. An existing field of the same name keeps its
    /// position and gets the new value.
    pub fn insert(&mut self, name: &str, value: Value) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_insert_replaces_in_place() {
        let mut message = Message::new();
        message.insert("value", Value::Float(1.0));
        message.insert("unit", Value::Text("kWh".to_string()));
        message.insert("value", Value::Float(2.0));

        assert_eq!(message.len(), 2);
        assert_eq!(message.names(), vec!["value", "unit"]);
        assert_eq!(message.get("value"), Some(&Value::Float(2.0)));
    }

    #[test]
    fn test_message_serializes_as_flat_map() {
        let mut message = Message::new();
        message.insert("id", Value::Raw("4530303034".to_string()));
        message.insert("power", Value::Float(0.5));
        message.insert("timestamp", Value::Integer(1_600_000_000));

        let json = serde_json::to_string(&message).unwrap();
        assert_eq!(json, r#"{"id":"4530303034","power":0.5,"timestamp":1600000000}"#);
    }

    #[test]
    fn test_reading_set_push_appends() {
        let mut readings = ReadingSet::new();
        readings.push("0-1:24.2.1", "101209112500W".to_string());
        readings.push("0-1:24.2.1", "12785.123*m3".to_string());

        assert_eq!(readings.len(), 1);
        assert_eq!(readings.get("0-1:24.2.1").unwrap().len(), 2);
        assert!(readings.get("1-0:1.8.1").is_none());
    }
}
