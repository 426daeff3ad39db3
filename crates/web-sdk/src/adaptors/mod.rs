//! Adaptors for translating canonical storefront events into each
//! destination's call shape.
//!
//! Each adaptor implements [`DestinationAdaptor`]: it knows where its
//! platform's script lives, which calls the platform stub issues at install,
//! and how every [`TrackedEvent`] maps onto the platform's schema. The
//! mapping is an exhaustive `match`, so adding an event kind fails to compile
//! until every adaptor handles it.

pub mod ga;
pub mod gtm;
pub mod meta;
pub mod tiktok;

use std::sync::Arc;

use anyhow::Result;

use storefront_core::types::{DestinationId, TrackedEvent};

use crate::destination::{DestinationCall, DispatchContext};

pub use ga::GaAdaptor;
pub use gtm::GtmAdaptor;
pub use meta::MetaPixelAdaptor;
pub use tiktok::TikTokPixelAdaptor;

/// Adaptor trait — one external platform's install and translation logic.
pub trait DestinationAdaptor: Send + Sync {
    /// Platform this adaptor feeds.
    fn destination(&self) -> DestinationId;

    /// URL of the platform's client script for the given credential.
    fn script_url(&self, credential: &str) -> String;

    /// Calls the platform stub queues at install, replayed before any event.
    fn bootstrap(&self, credential: &str) -> Vec<DestinationCall>;

    /// Translate an event into the platform's call. `None` means the platform
    /// has no equivalent and the event is skipped for it.
    fn translate(&self, event: &TrackedEvent, ctx: &DispatchContext) -> Option<DestinationCall>;

    /// Validate the credential shape before the destination is installed.
    fn validate_config(&self, credential: &str) -> Result<()>;
}

/// One adaptor per known destination, in [`DestinationId::ALL`] order.
pub fn default_adaptors() -> Vec<Arc<dyn DestinationAdaptor>> {
    DestinationId::ALL.into_iter().map(adaptor_for).collect()
}

pub fn adaptor_for(destination: DestinationId) -> Arc<dyn DestinationAdaptor> {
    match destination {
        DestinationId::Meta => Arc::new(MetaPixelAdaptor),
        DestinationId::TikTok => Arc::new(TikTokPixelAdaptor),
        DestinationId::GoogleAnalytics => Arc::new(GaAdaptor::default()),
        DestinationId::GoogleTagManager => Arc::new(GtmAdaptor::default()),
    }
}

/// Payload currency if present, else the store currency.
pub(crate) fn resolve_currency<'a>(event: &'a TrackedEvent, ctx: &'a DispatchContext) -> &'a str {
    event.currency().unwrap_or(ctx.currency.as_str())
}
