//! Inbound port for historical queries.

use async_trait::async_trait;
use shared_types::PeerId;

use crate::domain::{QueryPage, StoreRequest};
use crate::error::StoreQueryError;

#[async_trait]
pub trait StoreQueryApi: Send + Sync {
    /// Fetch one page from `peer` and feed it to the envelope pipeline.
    ///
    /// With `process_envelopes` the messages are dispatched inline;
    /// otherwise they go through the dispatch queue. A failure is reported
    /// once and never retried.
    async fn query(
        &self,
        peer: &PeerId,
        request: StoreRequest,
        process_envelopes: bool,
    ) -> Result<QueryPage, StoreQueryError>;
}
