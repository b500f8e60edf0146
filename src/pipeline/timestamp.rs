use crate::config::TimestampFormat;
use crate::models::{ReadingSet, Value};
use crate::p1::{utils, P1Error};
use chrono::{DateTime, FixedOffset};
use std::fmt::Write;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TimestampError {
    #[error("timestamp identifier {0} not present in telegram")]
    Missing(String),
    #[error("{0}")]
    Parse(#[from] P1Error),
    #[error("timestamp {0} cannot be expressed in nanoseconds")]
    OutOfRange(DateTime<FixedOffset>),
    #[error("timestamp layout {0:?} cannot be rendered")]
    Layout(String),
}

/// The telegram wide timestamp, from the first token of `identifier`
pub fn telegram_timestamp(readings: &ReadingSet, identifier: &str) -> Result<DateTime<FixedOffset>, TimestampError> {
    let token = readings
        .get(identifier)
        .and_then(|tokens| tokens.first())
        .ok_or_else(|| TimestampError::Missing(identifier.to_string()))?;
    Ok(utils::parse_timestamp(token)?)
}

/// Tracks the last published timestamp of one output. Starts at the epoch
/// and only moves forward.
#[derive(Debug, Clone, PartialEq)]
pub struct MonotonicGate {
    last_accepted: DateTime<FixedOffset>,
}

impl MonotonicGate {
    pub fn new() -> Self {
        // Default is the Unix epoch
        MonotonicGate { last_accepted: DateTime::<FixedOffset>::default() }
    }

    pub fn is_newer(&self, timestamp: &DateTime<FixedOffset>) -> bool {
        *timestamp > self.last_accepted
    }

    pub fn advance(&mut self, timestamp: DateTime<FixedOffset>) {
        if timestamp > self.last_accepted {
            self.last_accepted = timestamp;
        }
    }

    pub fn last_accepted(&self) -> DateTime<FixedOffset> {
        self.last_accepted
    }
}

impl Default for MonotonicGate {
    fn default() -> Self {
        Self::new()
    }
}

pub fn format_timestamp(timestamp: &DateTime<FixedOffset>, format: &TimestampFormat) -> Result<Value, TimestampError> {
    match format {
        TimestampFormat::Unix => Ok(Value::Integer(timestamp.timestamp())),
        TimestampFormat::UnixNano => timestamp
            .timestamp_nanos_opt()
            .map(Value::Integer)
            .ok_or(TimestampError::OutOfRange(*timestamp)),
        TimestampFormat::Layout(layout) => {
            let mut rendered = String::new();
            write!(rendered, "{}", timestamp.format(layout))
                .map_err(|_| TimestampError::Layout(layout.clone()))?;
            Ok(Value::Text(rendered))
        }
    }
}
