use crate::config::{KeyConfig, KeyKind, ValueParser};
use crate::models::ReadingSet;
use crate::p1::{utils, P1Error};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("identifier {0} not present in telegram")]
    MissingIdentifier(String),
    #[error("identifier {0} carries no value")]
    EmptyReading(String),
    #[error("identifier {identifier}: {source}")]
    Parse { identifier: String, #[source] source: P1Error },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    Verbatim(String),
    Measured {
        value: f64,
        unit: Option<String>,
    },
}

/// First token of a multi-token reading of a measured key, still unparsed.
/// Available even when the value itself does not parse.
pub fn field_timestamp<'a>(readings: &'a ReadingSet, key: &KeyConfig) -> Option<&'a str> {
    if key.kind == KeyKind::Verbatim {
        return None;
    }
    match readings.get(&key.identifier) {
        Some(tokens) if tokens.len() > 1 => tokens.first().map(String::as_str),
        _ => None,
    }
}

pub fn extract(readings: &ReadingSet, key: &KeyConfig) -> Result<Extracted, ExtractError> {
    let tokens = readings
        .get(&key.identifier)
        .ok_or_else(|| ExtractError::MissingIdentifier(key.identifier.clone()))?;

    let (first, last) = match (tokens.first(), tokens.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(ExtractError::EmptyReading(key.identifier.clone())),
    };

    if key.kind == KeyKind::Verbatim {
        return Ok(Extracted::Verbatim(first.clone()));
    }

    let parse_error = |source| ExtractError::Parse { identifier: key.identifier.clone(), source };
    let (value, unit) = match key.parser {
        ValueParser::ValueWithUnit => {
            let (value, unit) = utils::parse_value_with_unit(last).map_err(parse_error)?;
            (value, Some(unit))
        }
        ValueParser::Value => (utils::parse_value(last).map_err(parse_error)?, None),
    };

    Ok(Extracted::Measured { value, unit })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(identifier: &str, kind: KeyKind, parser: ValueParser) -> KeyConfig {
        KeyConfig {
            name: "value".to_string(),
            unit_name: "unit".to_string(),
            identifier: identifier.to_string(),
            kind,
            parser,
            delta: false,
        }
    }

    fn readings() -> ReadingSet {
        let mut readings = ReadingSet::new();
        readings.insert("0-0:96.1.1", vec!["4B384547303034303436333935353037".to_string()]);
        readings.insert("1-0:1.7.0", vec!["01.193*kW".to_string()]);
        readings.insert("0-1:24.2.1", vec!["101209110000W".to_string(), "12785.123*m3".to_string()]);
        readings.insert("0-0:96.14.0", vec!["0002".to_string()]);
        readings.insert("1-0:99.99.0", Vec::new());
        readings
    }

    #[test]
    fn test_verbatim_passthrough() {
        let extracted = extract(&readings(), &key("0-0:96.1.1", KeyKind::Verbatim, ValueParser::ValueWithUnit)).unwrap();
        assert_eq!(extracted, Extracted::Verbatim("4B384547303034303436333935353037".to_string()));
    }

    #[test]
    fn test_verbatim_takes_first_token() {
        let extracted = extract(&readings(), &key("0-1:24.2.1", KeyKind::Verbatim, ValueParser::ValueWithUnit)).unwrap();
        assert_eq!(extracted, Extracted::Verbatim("101209110000W".to_string()));
    }

    #[test]
    fn test_measured_value_with_unit() {
        let extracted = extract(&readings(), &key("1-0:1.7.0", KeyKind::Measured, ValueParser::ValueWithUnit)).unwrap();
        assert_eq!(extracted, Extracted::Measured { value: 1.193, unit: Some("kW".to_string()) });
    }

    #[test]
    fn test_measured_with_own_timestamp() {
        let extracted = extract(&readings(), &key("0-1:24.2.1", KeyKind::Measured, ValueParser::ValueWithUnit)).unwrap();
        assert_eq!(extracted, Extracted::Measured { value: 12785.123, unit: Some("m3".to_string()) });
        assert_eq!(field_timestamp(&readings(), &key("0-1:24.2.1", KeyKind::Measured, ValueParser::ValueWithUnit)),
                   Some("101209110000W"));
    }

    #[test]
    fn test_field_timestamp_survives_bad_value() {
        let mut readings = readings();
        readings.insert("0-1:24.2.1", vec!["161110130000W".to_string(), "garbage".to_string()]);
        let gas = key("0-1:24.2.1", KeyKind::Measured, ValueParser::ValueWithUnit);

        assert!(matches!(extract(&readings, &gas), Err(ExtractError::Parse { .. })));
        assert_eq!(field_timestamp(&readings, &gas), Some("161110130000W"));
    }

    #[test]
    fn test_field_timestamp_only_for_measured_multi_token() {
        let readings = readings();
        assert_eq!(field_timestamp(&readings, &key("0-1:24.2.1", KeyKind::Verbatim, ValueParser::ValueWithUnit)), None);
        assert_eq!(field_timestamp(&readings, &key("1-0:1.7.0", KeyKind::Measured, ValueParser::ValueWithUnit)), None);
        assert_eq!(field_timestamp(&readings, &key("1-0:2.7.0", KeyKind::Measured, ValueParser::ValueWithUnit)), None);
    }

    #[test]
    fn test_plain_value_parser() {
        let extracted = extract(&readings(), &key("0-0:96.14.0", KeyKind::Measured, ValueParser::Value)).unwrap();
        assert_eq!(extracted, Extracted::Measured { value: 2.0, unit: None });

        let unitless = extract(&readings(), &key("0-0:96.14.0", KeyKind::Measured, ValueParser::ValueWithUnit));
        assert!(matches!(unitless, Err(ExtractError::Parse { .. })));
    }

    #[test]
    fn test_missing_and_empty_identifiers() {
        let missing = extract(&readings(), &key("1-0:2.7.0", KeyKind::Measured, ValueParser::ValueWithUnit));
        assert!(matches!(missing, Err(ExtractError::MissingIdentifier(id)) if id == "1-0:2.7.0"));

        let empty = extract(&readings(), &key("1-0:99.99.0", KeyKind::Verbatim, ValueParser::ValueWithUnit));
        assert!(matches!(empty, Err(ExtractError::EmptyReading(_))));
    }
}
