//! Network adapters injected into a node.

use std::sync::Arc;
use wk_03_filter_manager::FilterProtocol;
use wk_04_message_sender::{LightpushPublisher, RelayPublisher};
use wk_05_store_query::StoreProtocol;

/// Protocol clients the node talks through.
///
/// A light client needs `filter` and `lightpush`; a full node needs
/// `relay`. `store` is used in both modes.
#[derive(Clone)]
pub struct NodeTransports {
    pub filter: Option<Arc<dyn FilterProtocol>>,
    pub relay: Option<Arc<dyn RelayPublisher>>,
    pub lightpush: Option<Arc<dyn LightpushPublisher>>,
    pub store: Arc<dyn StoreProtocol>,
}

impl NodeTransports {
    pub fn light(
        filter: Arc<dyn FilterProtocol>,
        lightpush: Arc<dyn LightpushPublisher>,
        store: Arc<dyn StoreProtocol>,
    ) -> Self {
        Self {
            filter: Some(filter),
            relay: None,
            lightpush: Some(lightpush),
            store,
        }
    }

    pub fn relay(relay: Arc<dyn RelayPublisher>, store: Arc<dyn StoreProtocol>) -> Self {
        Self {
            filter: None,
            relay: Some(relay),
            lightpush: None,
            store,
        }
    }
}
