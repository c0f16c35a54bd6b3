//! # Shared Types Crate
//!
//! This crate contains the wire-level types every pipeline subsystem agrees
//! on: envelopes, message hashes, topics and peer identifiers.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: An envelope's identity is its
//!   [`MessageHash`], computed once in [`Envelope::new`].
//! - **Opaque Payloads**: Payload bytes are never interpreted here;
//!   encryption and application decoding live above the pipeline.

pub mod entities;
pub mod envelope;
pub mod errors;

pub use entities::*;
pub use envelope::{compute_message_hash, now_nanos, Envelope, WakuMessage};
pub use errors::*;
