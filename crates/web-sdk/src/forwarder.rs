//! Server event forwarder — mirrors funnel events to the store's first-party
//! tracking endpoint for server-side conversion APIs.
//!
//! The forwarder builds the envelope synchronously and hands it to an
//! [`EventSink`] immediately; [`HttpEventSink`] then posts it on a detached
//! task that is not tied to the tracker's lifetime. Delivery is best-effort:
//! failures are logged and counted, never retried, never surfaced.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use storefront_core::config::ForwarderConfig;
use storefront_core::event_bus::EventSink;
use storefront_core::types::{IdentityData, ServerEventEnvelope, TrackedEvent, UserData};
use storefront_core::{TrackingError, TrackingResult};

use crate::context::{PageContext, FBC_COOKIE, FBP_COOKIE};

/// `{api_base_url}/api/tracking/{store_slug}/event`.
pub fn endpoint_url(api_base_url: &str, store_slug: &str) -> TrackingResult<String> {
    let mut url = Url::parse(api_base_url).map_err(|e| {
        TrackingError::Config(format!("invalid api_base_url '{}': {}", api_base_url, e))
    })?;
    url.path_segments_mut()
        .map_err(|_| {
            TrackingError::Config(format!("api_base_url '{}' cannot be a base", api_base_url))
        })?
        .pop_if_empty()
        .extend(["api", "tracking", store_slug, "event"]);
    Ok(url.to_string())
}

/// Builds server envelopes and hands them to a sink.
pub struct ServerEventForwarder {
    sink: Arc<dyn EventSink>,
    context: Arc<dyn PageContext>,
}

impl ServerEventForwarder {
    pub fn new(sink: Arc<dyn EventSink>, context: Arc<dyn PageContext>) -> Self {
        Self { sink, context }
    }

    /// Assemble the envelope for one event. Correlation cookies are included
    /// only when present.
    pub fn envelope(
        &self,
        event: &TrackedEvent,
        event_id: &str,
        identity: &IdentityData,
    ) -> ServerEventEnvelope {
        let user_data = UserData {
            email: identity.email.clone(),
            phone: identity.phone.clone(),
            external_id: identity.external_id.clone(),
            fbp: self.context.cookie(FBP_COOKIE),
            fbc: self.context.cookie(FBC_COOKIE),
        };
        ServerEventEnvelope::new(event, event_id, user_data, self.context.page_url(), Utc::now())
    }

    pub fn send(
        &self,
        endpoint: &str,
        event: &TrackedEvent,
        event_id: &str,
        identity: &IdentityData,
    ) {
        let envelope = self.envelope(event, event_id, identity);
        debug!(
            event_name = %envelope.event_name,
            event_id = %envelope.event_id,
            endpoint,
            "mirroring event to server"
        );
        metrics::counter!("tracking.server_forwarded").increment(1);
        self.sink.emit(endpoint, envelope);
    }
}

/// Posts envelopes as JSON with reqwest on detached tokio tasks.
pub struct HttpEventSink {
    client: reqwest::Client,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl HttpEventSink {
    pub fn new(config: &ForwarderConfig) -> TrackingResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| TrackingError::Forwarding(e.to_string()))?;
        Ok(Self {
            client,
            in_flight: Mutex::new(Vec::new()),
        })
    }

    /// Wait for posts still in flight, e.g. before process exit.
    pub async fn drain(&self) {
        let handles = std::mem::take(&mut *self.in_flight.lock());
        for handle in handles {
            let _ = handle.await;
        }
    }
}

impl EventSink for HttpEventSink {
    fn emit(&self, endpoint: &str, envelope: ServerEventEnvelope) {
        let Ok(runtime) = Handle::try_current() else {
            metrics::counter!("tracking.server_failed").increment(1);
            warn!(event_id = %envelope.event_id, "no async runtime, server event dropped");
            return;
        };

        let handle = runtime.spawn(post_envelope(
            self.client.clone(),
            endpoint.to_string(),
            envelope,
        ));

        let mut in_flight = self.in_flight.lock();
        in_flight.retain(|h| !h.is_finished());
        in_flight.push(handle);
    }
}

async fn post_envelope(client: reqwest::Client, endpoint: String, envelope: ServerEventEnvelope) {
    match client.post(&endpoint).json(&envelope).send().await {
        Ok(response) if response.status().is_success() => {
            debug!(
                event_id = %envelope.event_id,
                status = response.status().as_u16(),
                "server event delivered"
            );
        }
        Ok(response) => {
            metrics::counter!("tracking.server_failed").increment(1);
            warn!(
                event_id = %envelope.event_id,
                status = response.status().as_u16(),
                endpoint = %endpoint,
                "server event rejected"
            );
        }
        Err(e) => {
            metrics::counter!("tracking.server_failed").increment(1);
            warn!(
                error = %e,
                event_id = %envelope.event_id,
                endpoint = %endpoint,
                "server event failed"
            );
        }
    }
}
