//! Dispatcher wire protocol: tagged envelopes and the registration round trip.

pub mod envelope;
pub mod registration;

pub use envelope::{Envelope, EnvelopeCodec, FramedCodec, Tag};
pub use registration::RegistrationProtocol;
