//! # tether-events
//!
//! Wire envelope and payload normalization for the Tether streaming client.
//!
//! The backend speaks JSON text frames wrapped in a `{type, payload,
//! timestamp, id}` envelope, but payload field naming is inconsistent across
//! producers (camelCase vs snake_case, several raw enum spellings). This
//! crate owns the canonical in-memory shapes and the deterministic transform
//! from raw wire payloads into them.

#![deny(unsafe_code)]

pub mod envelope;
pub mod errors;
pub mod normalize;
pub mod outbound;
pub mod types;

pub use envelope::{MessageEnvelope, generate_message_id};
pub use errors::EventError;
pub use normalize::{InboundEvent, NormalizedPayload, normalize_payload};
