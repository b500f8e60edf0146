use crate::models::Message;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Payload encodings selectable in the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Json,
    Msgpack,
    /// bincode. Not self describing: field names, order and value types
    /// must be known to decode a payload.
    Binc,
    Cbor,
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[cfg(feature = "msgpack")]
    #[error("MessagePack encoding failed: {0}")]
    Msgpack(#[from] rmp_serde::encode::Error),
    #[cfg(feature = "binc")]
    #[error("Binary encoding failed: {0}")]
    Binc(#[from] bincode::Error),
    #[error("CBOR encoding failed: {0}")]
    Cbor(String),
    #[error("Encoding {0} is not compiled into this binary")]
    NotAvailable(Encoding),
}

impl Encoding {
    pub fn is_available(&self) -> bool {
        match self {
            Encoding::Json => true,
            Encoding::Msgpack => cfg!(feature = "msgpack"),
            Encoding::Binc => cfg!(feature = "binc"),
            Encoding::Cbor => cfg!(feature = "cbor"),
        }
    }

    pub fn encode(&self, message: &Message) -> Result<Vec<u8>, EncodeError> {
        match self {
            Encoding::Json => Ok(serde_json::to_vec(message)?),
            #[cfg(feature = "msgpack")]
            Encoding::Msgpack => Ok(rmp_serde::to_vec(message)?),
            #[cfg(feature = "binc")]
            Encoding::Binc => Ok(bincode::serialize(message)?),
            #[cfg(feature = "cbor")]
            Encoding::Cbor => {
                let mut buf = Vec::with_capacity(256);
                ciborium::into_writer(message, &mut buf)
                    .map_err(|e| EncodeError::Cbor(format!("{e:?}")))?;
                Ok(buf)
            }
            #[allow(unreachable_patterns)]
            other => Err(EncodeError::NotAvailable(*other)),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Encoding::Json => "json",
            Encoding::Msgpack => "msgpack",
            Encoding::Binc => "binc",
            Encoding::Cbor => "cbor",
        };
        write!(f, "{name}")
    }
}
