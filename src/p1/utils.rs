use super::P1Error;
use chrono::{DateTime, FixedOffset, NaiveDateTime};

const SUMMER_OFFSET_SECS: i32 = 2 * 3600;
const WINTER_OFFSET_SECS: i32 = 3600;

/// Parse a P1 timestamp like `101209113020W`.
///
/// The trailing letter marks daylight saving: `S` is summer time (+02:00),
/// `W` is winter time (+01:00).
pub fn parse_timestamp(token: &str) -> Result<DateTime<FixedOffset>, P1Error> {
    let invalid = || P1Error::InvalidTimestamp(token.to_string());

    let token = token.trim();
    if token.len() != 13 || !token.is_ascii() {
        return Err(invalid());
    }

    let (digits, dst) = token.split_at(12);
    let offset_secs = match dst {
        "S" => SUMMER_OFFSET_SECS,
        "W" => WINTER_OFFSET_SECS,
        _ => return Err(invalid()),
    };

    let naive = NaiveDateTime::parse_from_str(digits, "%y%m%d%H%M%S").map_err(|_| invalid())?;
    let offset = FixedOffset::east_opt(offset_secs).ok_or_else(invalid)?;
    naive.and_local_timezone(offset).single().ok_or_else(invalid)
}

/// Parse `000123.456*kWh` into its number and unit
pub fn parse_value_with_unit(token: &str) -> Result<(f64, String), P1Error> {
    let (value, unit) = token
        .trim()
        .split_once('*')
        .ok_or_else(|| P1Error::MissingUnit(token.to_string()))?;

    if unit.is_empty() {
        return Err(P1Error::MissingUnit(token.to_string()));
    }

    Ok((parse_value(value)?, unit.to_string()))
}

/// Parse a plain number such as `0.95` or `00004`
pub fn parse_value(token: &str) -> Result<f64, P1Error> {
    token
        .trim()
        .parse::<f64>()
        .map_err(|_| P1Error::InvalidValue(token.to_string()))
}

/// CRC16/ARC over everything from `/` up to and including `!`
pub fn calculate_checksum(data: &[u8]) -> u16 {
    crc16::State::<crc16::ARC>::calculate(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_winter_timestamp() {
        let ts = parse_timestamp("101209113020W").unwrap();
        assert_eq!(ts.timestamp(), 1_291_890_620);
        assert_eq!(ts.offset().local_minus_utc(), 3600);
    }

    #[test]
    fn test_parse_summer_timestamp() {
        let ts = parse_timestamp("160701120000S").unwrap();
        assert_eq!(ts.timestamp(), 1_467_367_200);
        assert_eq!(ts.offset().local_minus_utc(), 7200);
    }

    #[test]
    fn test_parse_invalid_timestamps() {
        assert!(parse_timestamp("").is_err());
        assert!(parse_timestamp("101209113020").is_err());
        assert!(parse_timestamp("101209113020X").is_err());
        assert!(parse_timestamp("101309113020W").is_err());
        assert!(parse_timestamp("12785.123*m3").is_err());
    }

    #[test]
    fn test_parse_value_with_unit() {
        assert_eq!(parse_value_with_unit("000123.456*kWh").unwrap(), (123.456, "kWh".to_string()));
        assert_eq!(parse_value_with_unit("01.193*kW").unwrap(), (1.193, "kW".to_string()));
        assert_eq!(parse_value_with_unit("12785.123*m3").unwrap(), (12785.123, "m3".to_string()));
        assert!(matches!(parse_value_with_unit("0002"), Err(P1Error::MissingUnit(_))));
        assert!(matches!(parse_value_with_unit("12*"), Err(P1Error::MissingUnit(_))));
        assert!(matches!(parse_value_with_unit("abc*kWh"), Err(P1Error::InvalidValue(_))));
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("00004").unwrap(), 4.0);
        assert_eq!(parse_value("0.95").unwrap(), 0.95);
        assert!(parse_value("4B38").is_err());
    }

    #[test]
    fn test_checksum_reference_vector() {
        assert_eq!(calculate_checksum(b"123456789"), 0xBB3D);
    }
}
