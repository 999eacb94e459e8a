//! Message protocol: what travels inside one link frame.
//!
//! The payload format is plain text so a frame can be read in a packet dump:
//!
//! | kind          | payload                          |
//! |---------------|----------------------------------|
//! | SOS           | `IMMEDIATE EMERGENCY !!!`        |
//! | safe check-in | `SAFE:` followed by the name     |
//! | location      | `{"lat":<f64>,"lng":<f64>}`      |
//! | chat          | the text, no prefix              |
//!
//! Decoding tries the kinds in the order above and falls back to chat, so it
//! never fails. A chat line that happens to look like a check-in or a
//! location is classified as one.

use serde::{Deserialize, Serialize};

/// Exact payload of an SOS broadcast.
pub const SOS_TEXT: &str = "IMMEDIATE EMERGENCY !!!";

/// Prefix of a safe check-in payload. The rest of the payload is the name.
pub const SAFE_PREFIX: &str = "SAFE:";

/// Message kind discriminator, as reported to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Chat,
    Sos,
    SafeCheckIn,
    Location,
}

/// A position report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum LocationError {
    #[error("coordinates must be finite (lat {lat}, lng {lng})")]
    NotFinite { lat: f64, lng: f64 },
    #[error("latitude {0} outside [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("longitude {0} outside [-180, 180]")]
    LongitudeOutOfRange(f64),
}

impl Location {
    /// Validated constructor for locally produced reports.
    pub fn new(lat: f64, lng: f64) -> Result<Self, LocationError> {
        if !lat.is_finite() || !lng.is_finite() {
            return Err(LocationError::NotFinite { lat, lng });
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(LocationError::LatitudeOutOfRange(lat));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(LocationError::LongitudeOutOfRange(lng));
        }
        Ok(Self { lat, lng })
    }
}

/// One peer-to-peer message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Chat(String),
    Sos,
    SafeCheckIn(String),
    Location(Location),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Chat(_) => MessageKind::Chat,
            Self::Sos => MessageKind::Sos,
            Self::SafeCheckIn(_) => MessageKind::SafeCheckIn,
            Self::Location(_) => MessageKind::Location,
        }
    }

    /// Serialize to the payload bytes of one frame.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Chat(text) => text.as_bytes().to_vec(),
            Self::Sos => SOS_TEXT.as_bytes().to_vec(),
            Self::SafeCheckIn(name) => {
                let mut out = Vec::with_capacity(SAFE_PREFIX.len() + name.len());
                out.extend_from_slice(SAFE_PREFIX.as_bytes());
                out.extend_from_slice(name.as_bytes());
                out
            }
            // Two f64 fields cannot fail to serialize; non-finite values
            // become `null`, which decodes back as chat.
            Self::Location(loc) => serde_json::to_vec(loc).unwrap_or_default(),
        }
    }

    /// Classify a received payload. Never fails: unrecognised bytes are chat.
    pub fn decode(data: &[u8]) -> Self {
        if data == SOS_TEXT.as_bytes() {
            return Self::Sos;
        }
        if let Some(name) = data.strip_prefix(SAFE_PREFIX.as_bytes()) {
            return Self::SafeCheckIn(String::from_utf8_lossy(name).into_owned());
        }
        if let Ok(loc) = serde_json::from_slice::<Location>(data) {
            return Self::Location(loc);
        }
        Self::Chat(String::from_utf8_lossy(data).into_owned())
    }
}
