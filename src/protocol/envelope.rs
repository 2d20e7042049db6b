//! # Tagged Envelopes
//!
//! Every frame exchanged with the dispatcher or a job sender is a
//! `(tag, payload)` pair. The byte layout belongs to an [`EnvelopeCodec`];
//! [`FramedCodec`] is the default and writes `TAG:::payload`.

use std::fmt;
use std::str::FromStr;

use crate::constants::{tags, FRAME_SEPARATOR};
use crate::error::CodecError;

/// Envelope tag vocabulary
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    Ping,
    Pong,
    Remove,
    Removed,
    Job,
    JobResult,
    Error,
    /// Any tag outside the vocabulary, kept verbatim
    Other(String),
}

impl Tag {
    pub fn as_str(&self) -> &str {
        match self {
            Tag::Ping => tags::PING,
            Tag::Pong => tags::PONG,
            Tag::Remove => tags::REMOVE,
            Tag::Removed => tags::REMOVED,
            Tag::Job => tags::JOB,
            Tag::JobResult => tags::JOBRES,
            Tag::Error => tags::ERROR,
            Tag::Other(tag) => tag,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tag {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            tags::PING => Tag::Ping,
            tags::PONG => Tag::Pong,
            tags::REMOVE => Tag::Remove,
            tags::REMOVED => Tag::Removed,
            tags::JOB => Tag::Job,
            tags::JOBRES => Tag::JobResult,
            tags::ERROR => Tag::Error,
            other => Tag::Other(other.to_string()),
        })
    }
}

/// A tagged message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub tag: Tag,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn new(tag: Tag, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            tag,
            payload: payload.into(),
        }
    }

    /// `(ERROR, ∅)` acknowledgement for requests the worker does not understand
    pub fn error() -> Self {
        Self::new(Tag::Error, Vec::new())
    }
}

/// Serializer/deserializer pair for envelopes
pub trait EnvelopeCodec: Send + Sync {
    fn encode(&self, envelope: &Envelope) -> Vec<u8>;

    fn decode(&self, frame: &[u8]) -> Result<Envelope, CodecError>;
}

/// `TAG:::payload` framing. A frame without a separator is a bare tag with an
/// empty payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct FramedCodec;

impl EnvelopeCodec for FramedCodec {
    fn encode(&self, envelope: &Envelope) -> Vec<u8> {
        let tag = envelope.tag.as_str().as_bytes();
        let mut frame = Vec::with_capacity(tag.len() + FRAME_SEPARATOR.len() + envelope.payload.len());
        frame.extend_from_slice(tag);
        frame.extend_from_slice(FRAME_SEPARATOR);
        frame.extend_from_slice(&envelope.payload);
        frame
    }

    fn decode(&self, frame: &[u8]) -> Result<Envelope, CodecError> {
        if frame.is_empty() {
            return Err(CodecError::EmptyFrame);
        }

        let (tag, payload) = match find_separator(frame) {
            Some(at) => (&frame[..at], &frame[at + FRAME_SEPARATOR.len()..]),
            None => (frame, &[][..]),
        };

        let tag = std::str::from_utf8(tag).map_err(|_| CodecError::InvalidTag)?;
        let tag = match Tag::from_str(tag) {
            Ok(tag) => tag,
            Err(never) => match never {},
        };

        Ok(Envelope::new(tag, payload))
    }
}

fn find_separator(frame: &[u8]) -> Option<usize> {
    frame
        .windows(FRAME_SEPARATOR.len())
        .position(|window| window == FRAME_SEPARATOR)
}
