//! Tracker — the orchestrator callers talk to.
//!
//! ```text
//!  caller ──► track(event) ──┬─ Uninitialized ──► pending queue (FIFO)
//!                            │                         │ drained once by init()
//!                            └─ Initialized ◄──────────┘
//!                                 │
//!                                 ├─► mirrored kind && server side on
//!                                 │      └─► ServerEventForwarder::send   (immediate)
//!                                 │
//!                                 └─► per enabled destination
//!                                        └─► IdleScheduler ──► adaptor.translate
//!                                                                └─► registry.dispatch
//! ```
//!
//! Nothing here returns an error to the caller: tracking must never break the
//! action it is attached to.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use storefront_core::config::{ForwarderConfig, SchedulerConfig, TrackingConfig};
use storefront_core::event_bus::{noop_sink, EventSink};
use storefront_core::types::{
    CartPayload, CategoryPayload, CheckoutPayload, ContactPayload, DestinationId, IdentityData,
    PagePayload, PaymentInfoPayload, Product, PurchasePayload, RegistrationPayload,
    SearchPayload, ShippingInfoPayload, TrackedEvent,
};
use storefront_core::TrackingError;

use crate::adaptors::{default_adaptors, DestinationAdaptor};
use crate::context::{EmptyPageContext, PageContext};
use crate::dedup::generate_event_id;
use crate::destination::{DispatchContext, ScriptLoader};
use crate::forwarder::{endpoint_url, ServerEventForwarder};
use crate::registry::DestinationRegistry;
use crate::scheduler::IdleScheduler;

/// An event raised before `init`, with the identity supplied at call time.
struct QueuedEvent {
    event: TrackedEvent,
    identity: Option<IdentityData>,
}

/// Configuration resolved at `init`, fixed for the tracker's lifetime.
struct ActiveConfig {
    config: TrackingConfig,
    destinations: Vec<Arc<dyn DestinationAdaptor>>,
    /// Set only when server mirroring is on and the endpoint resolved.
    endpoint: Option<String>,
}

enum Lifecycle {
    Uninitialized(Vec<QueuedEvent>),
    Initialized(Arc<ActiveConfig>),
}

struct TrackerInner {
    lifecycle: Mutex<Lifecycle>,
    identity: Mutex<IdentityData>,
    scheduler: IdleScheduler,
    registry: DestinationRegistry,
    loader: Arc<dyn ScriptLoader>,
    forwarder: ServerEventForwarder,
    adaptors: Vec<Arc<dyn DestinationAdaptor>>,
    api_base_url: String,
}

/// Builder for [`Tracker`].
pub struct TrackerBuilder {
    loader: Arc<dyn ScriptLoader>,
    sink: Arc<dyn EventSink>,
    context: Arc<dyn PageContext>,
    scheduler: SchedulerConfig,
    api_base_url: String,
    adaptors: Vec<Arc<dyn DestinationAdaptor>>,
}

impl TrackerBuilder {
    pub fn new(loader: Arc<dyn ScriptLoader>) -> Self {
        Self {
            loader,
            sink: noop_sink(),
            context: Arc::new(EmptyPageContext),
            scheduler: SchedulerConfig::default(),
            api_base_url: ForwarderConfig::default().api_base_url,
            adaptors: default_adaptors(),
        }
    }

    /// Sink receiving server-mirrored envelopes.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_page_context(mut self, context: Arc<dyn PageContext>) -> Self {
        self.context = context;
        self
    }

    pub fn with_scheduler_config(mut self, config: SchedulerConfig) -> Self {
        self.scheduler = config;
        self
    }

    pub fn with_max_buffered_calls(mut self, max: usize) -> Self {
        self.scheduler.max_buffered_calls = max;
        self
    }

    pub fn with_forwarder_config(mut self, config: &ForwarderConfig) -> Self {
        self.api_base_url = config.api_base_url.clone();
        self
    }

    /// Replace the adaptor set, e.g. to customise GA4 or GTM options.
    pub fn with_adaptors(mut self, adaptors: Vec<Arc<dyn DestinationAdaptor>>) -> Self {
        self.adaptors = adaptors;
        self
    }

    pub fn build(self) -> Tracker {
        Tracker {
            inner: Arc::new(TrackerInner {
                lifecycle: Mutex::new(Lifecycle::Uninitialized(Vec::new())),
                identity: Mutex::new(IdentityData::default()),
                scheduler: IdleScheduler::new(&self.scheduler),
                registry: DestinationRegistry::new(self.scheduler.max_buffered_calls),
                loader: self.loader,
                forwarder: ServerEventForwarder::new(self.sink, self.context),
                adaptors: self.adaptors,
                api_base_url: self.api_base_url,
            }),
        }
    }
}

/// Cheap-clone tracker handle.
#[derive(Clone)]
pub struct Tracker {
    inner: Arc<TrackerInner>,
}

impl Tracker {
    pub fn builder(loader: Arc<dyn ScriptLoader>) -> TrackerBuilder {
        TrackerBuilder::new(loader)
    }

    /// Apply the store configuration. Only the first call has any effect.
    pub fn init(&self, config: TrackingConfig) {
        let mut lifecycle = self.inner.lifecycle.lock();
        let pending = match &mut *lifecycle {
            Lifecycle::Initialized(_) => {
                debug!("tracker already initialized, ignoring init");
                return;
            }
            Lifecycle::Uninitialized(queue) => std::mem::take(queue),
        };
        let active = Arc::new(self.activate(config));
        *lifecycle = Lifecycle::Initialized(Arc::clone(&active));
        drop(lifecycle);

        info!(
            destinations = ?active.destinations.iter().map(|a| a.destination()).collect::<Vec<_>>(),
            server_side = active.endpoint.is_some(),
            queued = pending.len(),
            "tracker initialized"
        );

        // Handles exist before any queued dispatch can run; only the script
        // load is deferred.
        for adaptor in &active.destinations {
            let credential = &active.config.destinations.get(adaptor.destination()).id;
            if !self.inner.registry.install(adaptor.as_ref(), credential) {
                continue;
            }
            let destination = adaptor.destination();
            let script_url = adaptor.script_url(credential);
            let registry = self.inner.registry.clone();
            let loader = Arc::clone(&self.inner.loader);
            self.inner
                .scheduler
                .schedule(move || registry.load(destination, script_url, loader));
        }

        for queued in pending {
            let tracker = self.clone();
            let active = Arc::clone(&active);
            self.inner
                .scheduler
                .schedule(move || tracker.dispatch(&active, queued.event, queued.identity));
        }
    }

    fn activate(&self, config: TrackingConfig) -> ActiveConfig {
        let destinations = self
            .inner
            .adaptors
            .iter()
            .filter(|adaptor| {
                let destination = adaptor.destination();
                let settings = config.destinations.get(destination);
                if !settings.enabled {
                    return false;
                }
                match adaptor.validate_config(&settings.id) {
                    Ok(()) => true,
                    Err(e) => {
                        let err = TrackingError::InvalidCredential {
                            destination,
                            reason: e.to_string(),
                        };
                        warn!(error = %err, "destination disabled");
                        false
                    }
                }
            })
            .cloned()
            .collect();

        let endpoint = if config.server_side_enabled {
            match endpoint_url(&self.inner.api_base_url, &config.store_slug) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!(error = %e, "server mirroring disabled");
                    None
                }
            }
        } else {
            None
        };

        ActiveConfig {
            config,
            destinations,
            endpoint,
        }
    }

    /// Record an event. Queued until `init`, then fanned out.
    pub fn track(&self, event: TrackedEvent, identity: Option<IdentityData>) {
        let active = {
            let mut lifecycle = self.inner.lifecycle.lock();
            match &mut *lifecycle {
                Lifecycle::Uninitialized(queue) => {
                    debug!(event = %event.kind(), "tracker not initialized, event queued");
                    metrics::counter!("tracking.queued").increment(1);
                    queue.push(QueuedEvent { event, identity });
                    return;
                }
                Lifecycle::Initialized(active) => Arc::clone(active),
            }
        };
        self.dispatch(&active, event, identity);
    }

    fn dispatch(&self, active: &ActiveConfig, event: TrackedEvent, identity: Option<IdentityData>) {
        let event_id = generate_event_id();

        if let Some(ref endpoint) = active.endpoint {
            if event.kind().is_server_mirrored() {
                let identity = self.inner.identity.lock().merged(identity.as_ref());
                self.inner
                    .forwarder
                    .send(endpoint, &event, &event_id, &identity);
            }
        }

        if active.destinations.is_empty() {
            return;
        }

        let ctx = DispatchContext::new(active.config.currency.clone(), event_id);
        let event = Arc::new(event);
        for adaptor in &active.destinations {
            let adaptor = Arc::clone(adaptor);
            let registry = self.inner.registry.clone();
            let event = Arc::clone(&event);
            let ctx = ctx.clone();
            self.inner.scheduler.schedule(move || {
                if let Some(call) = adaptor.translate(&event, &ctx) {
                    registry.dispatch(call);
                }
            });
        }
    }

    /// Merge identity fields into the state attached to later server events.
    pub fn set_user(&self, identity: IdentityData) {
        self.inner.identity.lock().merge(&identity);
    }

    pub fn identity(&self) -> IdentityData {
        self.inner.identity.lock().clone()
    }

    pub fn is_initialized(&self) -> bool {
        matches!(*self.inner.lifecycle.lock(), Lifecycle::Initialized(_))
    }

    /// Events waiting for `init`.
    pub fn queued_events(&self) -> usize {
        match &*self.inner.lifecycle.lock() {
            Lifecycle::Uninitialized(queue) => queue.len(),
            Lifecycle::Initialized(_) => 0,
        }
    }

    /// Destinations active after `init`.
    pub fn enabled_destinations(&self) -> Vec<DestinationId> {
        match &*self.inner.lifecycle.lock() {
            Lifecycle::Initialized(active) => active
                .destinations
                .iter()
                .map(|a| a.destination())
                .collect(),
            Lifecycle::Uninitialized(_) => Vec::new(),
        }
    }

    pub fn registry(&self) -> &DestinationRegistry {
        &self.inner.registry
    }

    /// Wait until all scheduled work has run and no script is loading.
    pub async fn flush(&self) {
        loop {
            self.inner.scheduler.flush().await;
            self.inner.registry.settle().await;
            if self.inner.scheduler.outstanding() == 0 && self.inner.registry.loading() == 0 {
                return;
            }
        }
    }

    // ─── Convenience methods ────────────────────────────────────────────────

    pub fn page_view(&self, page: PagePayload) {
        self.track(TrackedEvent::PageView(page), None);
    }

    pub fn home_page_view(&self, page: PagePayload) {
        self.track(TrackedEvent::HomePageView(page), None);
    }

    pub fn search(&self, query: impl Into<String>) {
        self.track(
            TrackedEvent::Search(SearchPayload {
                query: query.into(),
            }),
            None,
        );
    }

    pub fn view_category(&self, name: impl Into<String>, id: Option<String>) {
        self.track(
            TrackedEvent::ViewCategory(CategoryPayload {
                id,
                name: name.into(),
            }),
            None,
        );
    }

    pub fn view_product(&self, product: Product) {
        self.track(TrackedEvent::ViewProduct(product), None);
    }

    pub fn add_to_cart(&self, product: Product) {
        self.track(TrackedEvent::AddToCart(product), None);
    }

    pub fn remove_from_cart(&self, product: Product) {
        self.track(TrackedEvent::RemoveFromCart(product), None);
    }

    pub fn update_cart(&self, items: Vec<Product>) {
        self.track(
            TrackedEvent::UpdateCart(CartPayload {
                items,
                currency: None,
            }),
            None,
        );
    }

    pub fn begin_checkout(&self, checkout: CheckoutPayload) {
        self.track(TrackedEvent::BeginCheckout(checkout), None);
    }

    pub fn add_shipping_info(&self, checkout: CheckoutPayload, shipping_tier: Option<String>) {
        self.track(
            TrackedEvent::AddShippingInfo(ShippingInfoPayload {
                checkout,
                shipping_tier,
            }),
            None,
        );
    }

    pub fn add_payment_info(&self, checkout: CheckoutPayload, payment_type: Option<String>) {
        self.track(
            TrackedEvent::AddPaymentInfo(PaymentInfoPayload {
                checkout,
                payment_type,
            }),
            None,
        );
    }

    pub fn purchase(&self, purchase: PurchasePayload, identity: Option<IdentityData>) {
        self.track(TrackedEvent::Purchase(purchase), identity);
    }

    pub fn complete_registration(&self, method: Option<String>, identity: Option<IdentityData>) {
        self.track(
            TrackedEvent::CompleteRegistration(RegistrationPayload { method }),
            identity,
        );
    }

    pub fn contact(&self, method: Option<String>, identity: Option<IdentityData>) {
        self.track(TrackedEvent::Contact(ContactPayload { method }), identity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingLoader;
    use storefront_core::config::DestinationConfig;
    use storefront_core::event_bus::capture_sink;

    #[tokio::test]
    async fn test_invalid_credential_disables_destination() {
        let loader = RecordingLoader::new();
        let tracker = Tracker::builder(loader.clone()).build();

        let mut config = TrackingConfig::default();
        config.destinations.meta = DestinationConfig::enabled("not-numeric");
        config.destinations.google_analytics = DestinationConfig::enabled("G-OK123");
        tracker.init(config);
        tracker.flush().await;

        assert_eq!(
            tracker.enabled_destinations(),
            vec![DestinationId::GoogleAnalytics]
        );
        assert_eq!(loader.load_count(DestinationId::Meta), 0);
        assert_eq!(loader.load_count(DestinationId::GoogleAnalytics), 1);
    }

    #[tokio::test]
    async fn test_unresolvable_endpoint_disables_mirroring() {
        let sink = capture_sink();
        let tracker = Tracker::builder(RecordingLoader::new())
            .with_event_sink(sink.clone())
            .with_forwarder_config(&ForwarderConfig {
                api_base_url: "not a url".into(),
                timeout_ms: 100,
            })
            .build();
        tracker.init(TrackingConfig::default());
        tracker.search("boots");
        tracker.flush().await;

        assert_eq!(sink.count(), 0);
    }

    #[tokio::test]
    async fn test_queue_reports_pending_events() {
        let tracker = Tracker::builder(RecordingLoader::new()).build();
        tracker.page_view(PagePayload::default());
        tracker.search("boots");
        assert!(!tracker.is_initialized());
        assert_eq!(tracker.queued_events(), 2);

        tracker.init(TrackingConfig::default());
        assert!(tracker.is_initialized());
        assert_eq!(tracker.queued_events(), 0);
        tracker.flush().await;
    }
}
