use crate::config::P1Config;
use crate::models::ReadingSet;
use log::{debug, error, info, warn};
use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind};
use std::path::Path;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc::Receiver;

pub mod parser;
pub mod utils;

/// Telegrams buffered between the reader thread and the pipeline
const TELEGRAM_QUEUE: usize = 10;

pub type TelegramSource = Box<dyn Iterator<Item = Result<Telegram, P1Error>> + Send>;

#[derive(Error, Debug)]
pub enum P1Error {
    #[error("Invalid timestamp {0:?}")]
    InvalidTimestamp(String),
    #[error("Invalid value {0:?}")]
    InvalidValue(String),
    #[error("Missing unit in {0:?}")]
    MissingUnit(String),
    #[error("Missing identification line")]
    MissingIdentification,
    #[error("Invalid data line {0:?}")]
    InvalidDataLine(String),
    #[error("Invalid checksum field {0:?}")]
    InvalidChecksum(String),
    #[error("Checksum mismatch: telegram carries {expected:04X}, calculated {calculated:04X}")]
    ChecksumMismatch { expected: u16, calculated: u16 },
    #[error("Unable to open {path}: {source}")]
    Open { path: String, #[source] source: std::io::Error },
    #[error("Reading telegrams failed: {0}")]
    Io(#[from] std::io::Error),
}

/// One raw telegram, from the `/` of the identification line through the
/// `!` line carrying the checksum
#[derive(Debug, Clone, PartialEq)]
pub struct Telegram {
    raw: Vec<u8>,
}

impl Telegram {
    pub fn from_bytes(raw: Vec<u8>) -> Self {
        Telegram { raw }
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.raw)
    }

    /// The checksum written after `!`, if the meter sends one
    pub fn checksum(&self) -> Result<Option<u16>, P1Error> {
        let Some(end) = self.raw.iter().rposition(|&b| b == b'!') else {
            return Ok(None);
        };

        let field = String::from_utf8_lossy(&self.raw[end + 1..]);
        let field = field.trim();
        if field.is_empty() {
            return Ok(None);
        }

        u16::from_str_radix(field, 16)
            .map(Some)
            .map_err(|_| P1Error::InvalidChecksum(field.to_string()))
    }

    /// Telegrams without a checksum (protocol versions before 4) pass
    pub fn verify_checksum(&self) -> Result<(), P1Error> {
        let Some(expected) = self.checksum()? else {
            return Ok(());
        };

        // checksum() found the '!' already
        let end = self.raw.iter().rposition(|&b| b == b'!').unwrap_or(0);
        let calculated = utils::calculate_checksum(&self.raw[..=end]);
        if calculated != expected {
            return Err(P1Error::ChecksumMismatch { expected, calculated });
        }
        Ok(())
    }

    pub fn parse(&self) -> Result<ReadingSet, P1Error> {
        parser::parse_telegram(&self.text())
    }
}

/// Frames a byte stream into telegrams. Noise before the first `/` and
/// truncated telegrams are dropped.
pub struct TelegramReader<R: BufRead> {
    input: R,
}

impl<R: BufRead> TelegramReader<R> {
    pub fn new(input: R) -> Self {
        TelegramReader { input }
    }
}

impl<R: BufRead> Iterator for TelegramReader<R> {
    type Item = Result<Telegram, P1Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut raw: Vec<u8> = Vec::new();
        let mut line: Vec<u8> = Vec::new();

        loop {
            line.clear();
            match self.input.read_until(b'\n', &mut line) {
                Ok(0) => {
                    if !raw.is_empty() {
                        debug!("Dropping incomplete telegram of {} bytes at end of input", raw.len());
                    }
                    return None;
                }
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Some(Err(e.into())),
            }

            if raw.is_empty() {
                match line.iter().position(|&b| b == b'/') {
                    Some(start) => raw.extend_from_slice(&line[start..]),
                    None => continue,
                }
                continue;
            }

            if line.first() == Some(&b'/') {
                warn!("Telegram started before the previous one ended, dropping {} bytes", raw.len());
                raw.clear();
                raw.extend_from_slice(&line);
                continue;
            }

            raw.extend_from_slice(&line);
            if line.first() == Some(&b'!') {
                return Some(Ok(Telegram::from_bytes(raw)));
            }
        }
    }
}

/// Release at most one telegram per interval, for replaying capture files
pub struct RateLimited<I> {
    inner: I,
    interval: Duration,
    last: Option<Instant>,
}

impl<I> RateLimited<I> {
    pub fn new(inner: I, interval: Duration) -> Self {
        RateLimited { inner, interval, last: None }
    }
}

impl<I: Iterator> Iterator for RateLimited<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(last) = self.last {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                std::thread::sleep(self.interval - elapsed);
            }
        }
        let item = self.inner.next();
        self.last = Some(Instant::now());
        item
    }
}

/// Open the test file if given, the configured device otherwise
pub fn open_source(config: &P1Config, testfile: Option<&Path>, rate_limit: Option<Duration>) -> Result<TelegramSource, P1Error> {
    match testfile {
        Some(path) => {
            info!("Reading telegrams from test file {}", path.display());
            let file = File::open(path).map_err(|source| P1Error::Open { path: path.display().to_string(), source })?;
            let reader = TelegramReader::new(BufReader::new(file));
            match rate_limit {
                Some(interval) => Ok(Box::new(RateLimited::new(reader, interval))),
                None => Ok(Box::new(reader)),
            }
        }
        None => {
            // Line settings are left to the tty configuration
            info!("Reading telegrams from {} ({} baud expected)", config.device, config.baudrate);
            let device = OpenOptions::new()
                .read(true)
                .open(&config.device)
                .map_err(|source| P1Error::Open { path: config.device.clone(), source })?;
            Ok(Box::new(TelegramReader::new(BufReader::new(device))))
        }
    }
}

/// Run the blocking source on its own thread and hand telegrams over a
/// bounded channel. The channel closes when the source is exhausted.
pub fn spawn_reader(source: TelegramSource) -> (Receiver<Telegram>, JoinHandle<()>) {
    let (tx, rx) = tokio::sync::mpsc::channel(TELEGRAM_QUEUE);

    let handle = std::thread::spawn(move || {
        for telegram in source {
            match telegram {
                Ok(telegram) => {
                    if tx.blocking_send(telegram).is_err() {
                        debug!("Telegram receiver gone, reader exits");
                        return;
                    }
                }
                Err(e) => {
                    error!("{e}");
                    return;
                }
            }
        }
        info!("Telegram source exhausted");
    });

    (rx, handle)
}
