//! Store query client
//!
//! Every historical message becomes an envelope with source `Store` and goes
//! through the same pipeline as live traffic, so duplicates of messages
//! already seen over relay or filter are dropped there.

use async_trait::async_trait;
use shared_bus::{EventPublisher, PipelineEvent};
use shared_types::{now_nanos, Envelope, MessageSource, PeerId};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use waku_telemetry::{metric_inc, time_histogram, STORE_QUERIES, STORE_QUERY_DURATION};
use wk_02_envelope_pipeline::EnvelopeSink;

use crate::config::StoreConfig;
use crate::domain::{QueryPage, StoreRequest, StoreResponse};
use crate::error::StoreQueryError;
use crate::ports::{StoreProtocol, StoreQueryApi};

const SUBSYSTEM: &str = "store-query";

/// Invoked with `(request_id, peer_id, error)` whenever a query fails.
pub type QueryFailureCallback = Arc<dyn Fn(&str, &PeerId, &StoreQueryError) + Send + Sync>;

pub struct StoreQueryClient {
    config: StoreConfig,
    protocol: Arc<dyn StoreProtocol>,
    pipeline: Arc<dyn EnvelopeSink>,
    bus: Arc<dyn EventPublisher>,
    on_failure: Option<QueryFailureCallback>,
}

impl StoreQueryClient {
    pub fn new(
        config: StoreConfig,
        protocol: Arc<dyn StoreProtocol>,
        pipeline: Arc<dyn EnvelopeSink>,
        bus: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            config,
            protocol,
            pipeline,
            bus,
            on_failure: None,
        }
    }

    pub fn with_failure_callback(mut self, callback: QueryFailureCallback) -> Self {
        self.on_failure = Some(callback);
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Follow cursors from `request` until the peer reports completion.
    ///
    /// Fails with `PageLimit` after `max_pages` pages; the pages fetched so
    /// far have already been handed to the pipeline.
    pub async fn query_all(
        &self,
        peer: &PeerId,
        request: StoreRequest,
        process_envelopes: bool,
    ) -> Result<Vec<QueryPage>, StoreQueryError> {
        let mut pages = Vec::new();
        let mut request = request;
        loop {
            if pages.len() >= self.config.max_pages {
                warn!(
                    subsystem = SUBSYSTEM,
                    peer_id = %peer,
                    pages = pages.len(),
                    "Store query page limit reached"
                );
                return Err(StoreQueryError::PageLimit(self.config.max_pages));
            }
            let page = self.query(peer, request.clone(), process_envelopes).await?;
            let next = page.next_cursor;
            pages.push(page);
            match next {
                Some(cursor) => request.cursor = Some(cursor),
                None => return Ok(pages),
            }
        }
    }

    async fn fetch(
        &self,
        peer: &PeerId,
        request: &StoreRequest,
    ) -> Result<StoreResponse, StoreQueryError> {
        if request.content_topics.is_empty() && request.pubsub_topic.is_none() {
            return Err(StoreQueryError::InvalidRequest(
                "a pubsub topic or content topics are required".to_string(),
            ));
        }
        if !request.content_topics.is_empty() && request.pubsub_topic.is_none() {
            return Err(StoreQueryError::InvalidRequest(
                "content topics require a pubsub topic".to_string(),
            ));
        }
        if !request.time_range.is_valid() {
            return Err(StoreQueryError::InvalidRequest(
                "time range start is after end".to_string(),
            ));
        }

        let _timer = time_histogram!(STORE_QUERY_DURATION);
        tokio::time::timeout(self.config.query_timeout, self.protocol.query(peer, request))
            .await
            .unwrap_or(Err(StoreQueryError::Timeout))
    }

    async fn report_failure(&self, request_id: &str, peer: &PeerId, error: &StoreQueryError) {
        metric_inc!(STORE_QUERIES, &["failure"]);
        warn!(
            subsystem = SUBSYSTEM,
            request_id,
            peer_id = %peer,
            error = %error,
            "Store query failed"
        );
        if let Some(callback) = &self.on_failure {
            callback(request_id, peer, error);
        }
        self.bus
            .publish(PipelineEvent::StoreQueryFailed {
                request_id: request_id.to_string(),
                peer_id: peer.clone(),
                error: error.to_string(),
            })
            .await;
    }
}

#[async_trait]
impl StoreQueryApi for StoreQueryClient {
    async fn query(
        &self,
        peer: &PeerId,
        request: StoreRequest,
        process_envelopes: bool,
    ) -> Result<QueryPage, StoreQueryError> {
        let request_id = Uuid::new_v4().to_string();
        let mut request = request;
        request.page_size = self.config.page_size(request.page_size);

        debug!(
            subsystem = SUBSYSTEM,
            request_id = %request_id,
            peer_id = %peer,
            page_size = request.page_size,
            resumed = request.cursor.is_some(),
            "Querying store"
        );

        let response = match self.fetch(peer, &request).await {
            Ok(response) => response,
            Err(e) => {
                self.report_failure(&request_id, peer, &e).await;
                return Err(e);
            }
        };
        metric_inc!(STORE_QUERIES, &["success"]);

        let mut count = 0;
        for stored in response.messages {
            let envelope = Envelope::new(stored.message, now_nanos(), stored.pubsub_topic);
            let hash = envelope.hash();
            match self
                .pipeline
                .on_new_envelope(envelope, MessageSource::Store, process_envelopes)
                .await
            {
                Ok(()) => count += 1,
                Err(e) => debug!(
                    subsystem = SUBSYSTEM,
                    request_id = %request_id,
                    hash = %hash,
                    error = %e,
                    "Historical message rejected"
                ),
            }
        }

        info!(
            subsystem = SUBSYSTEM,
            request_id = %request_id,
            peer_id = %peer,
            count,
            complete = response.next_cursor.is_none(),
            "Store page received"
        );

        Ok(QueryPage {
            request_id,
            next_cursor: response.next_cursor,
            count,
        })
    }
}
