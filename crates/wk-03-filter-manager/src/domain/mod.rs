//! Domain layer: the subscription state machine and its value objects.

pub mod backoff;
pub mod events;
pub mod slots;
pub mod state;
pub mod value_objects;

pub use backoff::BackoffPolicy;
pub use events::{Command, FilterEvent, PingTarget};
pub use slots::{FilterSlots, SubscriptionSlot};
pub use state::FilterSubscriptions;
pub use value_objects::{
    FilterHealth, FilterStats, PeerSelection, SlotId, SubscriptionHandle, SubscriptionId,
};
