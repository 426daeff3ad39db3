//! Storefront tracking SDK — fans canonical funnel events out to marketing
//! pixels (Meta, TikTok) and tag platforms (GA4, GTM), and mirrors
//! conversion events to the store's first-party endpoint.
//!
//! # Modules
//!
//! - [`tracker`] — Orchestrator: init lifecycle, pre-init queue, identity, fan-out
//! - [`adaptors`] — Per-destination translation of events into platform calls
//! - [`registry`] — Client handles per destination, buffering until scripts load
//! - [`scheduler`] — Idle-time deferral of non-critical work
//! - [`forwarder`] — Server envelope assembly and HTTP delivery
//! - [`context`] — Page URL and correlation cookie access
//! - [`dedup`] — Event ids shared between pixel and server events
//! - [`destination`] — Call, client and loader types at the host boundary
//! - [`testing`] — Recording loader for tests

pub mod adaptors;
pub mod context;
pub mod dedup;
pub mod destination;
pub mod forwarder;
pub mod registry;
pub mod scheduler;
pub mod testing;
pub mod tracker;

pub use adaptors::{
    DestinationAdaptor, GaAdaptor, GtmAdaptor, MetaPixelAdaptor, TikTokPixelAdaptor,
};
pub use context::{PageContext, StaticPageContext};
pub use destination::{CallCommand, DestinationCall, DestinationClient, LogLoader, ScriptLoader};
pub use forwarder::{HttpEventSink, ServerEventForwarder};
pub use registry::{DestinationRegistry, HandlePhase};
pub use scheduler::IdleScheduler;
pub use tracker::{Tracker, TrackerBuilder};
