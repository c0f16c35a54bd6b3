//! # WK-04 Message Sender
//!
//! The outbound half of the pipeline. A sent message is dispatched to the
//! node's own filters immediately, then broadcast through relay (full node)
//! or lightpush (light client).
//!
//! ```text
//! send ──→ on_new_envelope(LocalSend, immediate) ──→ send queue
//!                                                        │
//!                                              broadcast loop (task per envelope)
//!                                                        │
//!                                  relay (peer_count ≥ min) │ lightpush
//!                                                        │
//!                                      EnvelopeSent / EnvelopeSendFailed (bus)
//! ```

pub mod config;
pub mod error;
pub mod ports;
pub mod service;

pub use config::SenderConfig;
pub use error::{PublishError, SendError};
pub use ports::{
    LightpushPublisher, MessageSenderApi, MockLightpush, MockRelay, PublishTransport,
    RelayPublisher,
};
pub use service::MessageSender;
