use super::P1Error;
use crate::models::ReadingSet;
use crate::obis_utils;
use log::{debug, warn};

/// Turn the text of one telegram into its reading set.
///
/// Lines that cannot be parsed are logged and skipped. Lines starting with
/// `(` continue the previous identifier, which older meters use for the gas
/// reading.
pub fn parse_telegram(text: &str) -> Result<ReadingSet, P1Error> {
    let mut lines = text.lines();

    let identification = lines.next().ok_or(P1Error::MissingIdentification)?;
    if !identification.starts_with('/') {
        return Err(P1Error::MissingIdentification);
    }
    debug!("Telegram from {}", &identification[1..]);

    let mut readings = ReadingSet::new();
    let mut last_identifier: Option<String> = None;

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with('!') {
            break;
        }

        if line.starts_with('(') {
            match (&last_identifier, parse_tokens(line)) {
                (Some(identifier), Ok(tokens)) => {
                    for token in tokens {
                        readings.push(identifier, token);
                    }
                }
                (None, _) => warn!("Continuation line without identifier: '{}'", line),
                (_, Err(e)) => warn!("Failed to parse P1 line '{}': {}", line, e),
            }
            continue;
        }

        match parse_obis_line(line) {
            Ok((identifier, tokens)) => {
                readings.insert(&identifier, tokens);
                last_identifier = Some(identifier);
            }
            Err(e) => {
                warn!("Failed to parse P1 line '{}': {}", line, e);
            }
        }
    }

    Ok(readings)
}

pub fn parse_obis_line(line: &str) -> Result<(String, Vec<String>), P1Error> {
    // Example formats:
    // 1-0:1.8.1(000123.456*kWh)
    // 0-1:24.2.1(101209112500W)(12785.123*m3)

    let paren_start = line.find('(')
        .ok_or_else(|| P1Error::InvalidDataLine(line.to_string()))?;

    let identifier = obis_utils::normalize_obis_code(&line[..paren_start]);
    if identifier.is_empty() {
        return Err(P1Error::InvalidDataLine(line.to_string()));
    }

    let tokens = parse_tokens(&line[paren_start..])?;
    Ok((identifier, tokens))
}

fn parse_tokens(content: &str) -> Result<Vec<String>, P1Error> {
    let invalid = || P1Error::InvalidDataLine(content.to_string());

    let mut tokens = Vec::new();
    let mut rest = content.trim();
    while !rest.is_empty() {
        let inner = rest.strip_prefix('(').ok_or_else(invalid)?;
        let end = inner.find(')').ok_or_else(invalid)?;
        tokens.push(inner[..end].to_string());
        rest = inner[end + 1..].trim_start();
    }

    if tokens.is_empty() {
        return Err(invalid());
    }
    Ok(tokens)
}
