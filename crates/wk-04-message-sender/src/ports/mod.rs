//! Ports layer

pub mod inbound;
pub mod outbound;

pub use inbound::MessageSenderApi;
pub use outbound::{
    LightpushPublisher, MockLightpush, MockRelay, PublishTransport, RelayPublisher,
};
