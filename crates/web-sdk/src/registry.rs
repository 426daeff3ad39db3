//! Destination registry — owns one handle per installed destination.
//!
//! ```text
//! install ──► Buffering(bootstrap calls) ──load ok──► Ready(client)
//!                  │   dispatch() appends          dispatch() sends
//!                  └──load err──► Failed           dispatch() skips
//! ```
//!
//! A handle is installed at most once; calls made while the script is still
//! loading are held in order and replayed as soon as the client is ready.
//! Client calls never run while a map entry is locked.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use storefront_core::types::DestinationId;
use storefront_core::TrackingError;

use crate::adaptors::DestinationAdaptor;
use crate::destination::{DestinationCall, DestinationClient, ScriptLoader};

/// Lifecycle of one destination's client handle.
enum HandleState {
    Buffering(VecDeque<DestinationCall>),
    Ready(Arc<dyn DestinationClient>),
    Failed,
}

/// Coarse view of a handle, for callers that only need the phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlePhase {
    Buffering,
    Ready,
    Failed,
}

struct RegistryInner {
    handles: DashMap<DestinationId, HandleState>,
    max_buffered: usize,
    loading: AtomicUsize,
    settled: Notify,
}

#[derive(Clone)]
pub struct DestinationRegistry {
    inner: Arc<RegistryInner>,
}

impl DestinationRegistry {
    pub fn new(max_buffered: usize) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                handles: DashMap::new(),
                max_buffered,
                loading: AtomicUsize::new(0),
                settled: Notify::new(),
            }),
        }
    }

    /// Install and start loading in one step.
    pub fn initialize(
        &self,
        adaptor: Arc<dyn DestinationAdaptor>,
        credential: &str,
        loader: Arc<dyn ScriptLoader>,
    ) {
        if self.install(adaptor.as_ref(), credential) {
            self.load(adaptor.destination(), adaptor.script_url(credential), loader);
        }
    }

    /// Create the Buffering handle for `adaptor`'s destination, seeded with
    /// its bootstrap calls. Returns false when a handle already exists.
    pub fn install(&self, adaptor: &dyn DestinationAdaptor, credential: &str) -> bool {
        let destination = adaptor.destination();
        match self.inner.handles.entry(destination) {
            Entry::Occupied(_) => {
                debug!(%destination, "destination already installed");
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(HandleState::Buffering(adaptor.bootstrap(credential).into()));
                true
            }
        }
    }

    /// Load the destination's script in the background; the handle flips to
    /// Ready or Failed when the loader finishes.
    pub fn load(
        &self,
        destination: DestinationId,
        script_url: String,
        loader: Arc<dyn ScriptLoader>,
    ) {
        self.inner.loading.fetch_add(1, Ordering::SeqCst);
        let registry = self.clone();
        let load = async move {
            let result = loader.load(destination, &script_url).await.map_err(|e| {
                TrackingError::ScriptLoad {
                    destination,
                    reason: e.to_string(),
                }
            });
            registry.complete(destination, result);
        };

        match Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(load);
            }
            Err(_) => {
                std::thread::spawn(move || {
                    match tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                    {
                        Ok(runtime) => runtime.block_on(load),
                        Err(e) => warn!(error = %e, "failed to start loader runtime"),
                    }
                });
            }
        }
    }

    fn complete(
        &self,
        destination: DestinationId,
        result: Result<Arc<dyn DestinationClient>, TrackingError>,
    ) {
        match result {
            Ok(client) => {
                let replayed = self.replay(destination, &client);
                info!(%destination, replayed, "destination ready");
            }
            Err(e) => {
                if let Some(mut state) = self.inner.handles.get_mut(&destination) {
                    *state = HandleState::Failed;
                }
                warn!(%destination, error = %e, "destination unavailable");
            }
        }

        if self.inner.loading.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.settled.notify_waiters();
        }
    }

    /// Drain the buffer batch by batch outside the entry lock. The handle
    /// stays Buffering until a drain finds it empty, so calls dispatched
    /// meanwhile queue up behind the replay instead of overtaking it.
    fn replay(&self, destination: DestinationId, client: &Arc<dyn DestinationClient>) -> usize {
        let mut replayed = 0;
        loop {
            let batch = {
                let Some(mut state) = self.inner.handles.get_mut(&destination) else {
                    break;
                };
                let batch = match &mut *state {
                    HandleState::Buffering(queue) => std::mem::take(queue),
                    _ => break,
                };
                if batch.is_empty() {
                    *state = HandleState::Ready(Arc::clone(client));
                    break;
                }
                batch
            };
            replayed += batch.len();
            for call in &batch {
                deliver(client.as_ref(), call);
            }
        }
        replayed
    }

    /// Route a translated call to its destination's handle. Calls for
    /// destinations without a handle, or whose load failed, are dropped.
    pub fn dispatch(&self, call: DestinationCall) {
        let client = {
            let Some(mut state) = self.inner.handles.get_mut(&call.destination) else {
                return;
            };
            match &mut *state {
                HandleState::Buffering(queue) => {
                    if queue.len() >= self.inner.max_buffered {
                        queue.pop_front();
                        metrics::counter!("tracking.buffer_dropped").increment(1);
                        debug!(
                            destination = %call.destination,
                            "destination buffer full, oldest call dropped"
                        );
                    }
                    queue.push_back(call);
                    return;
                }
                HandleState::Ready(client) => Arc::clone(client),
                HandleState::Failed => return,
            }
        };
        deliver(client.as_ref(), &call);
    }

    pub fn phase(&self, destination: DestinationId) -> Option<HandlePhase> {
        self.inner.handles.get(&destination).map(|state| match *state {
            HandleState::Buffering(_) => HandlePhase::Buffering,
            HandleState::Ready(_) => HandlePhase::Ready,
            HandleState::Failed => HandlePhase::Failed,
        })
    }

    pub fn is_installed(&self, destination: DestinationId) -> bool {
        self.inner.handles.contains_key(&destination)
    }

    /// Calls currently held for a destination still loading.
    pub fn buffered(&self, destination: DestinationId) -> usize {
        match self.inner.handles.get(&destination).as_deref() {
            Some(HandleState::Buffering(queue)) => queue.len(),
            _ => 0,
        }
    }

    /// Wait until no script load is in flight.
    pub async fn settle(&self) {
        loop {
            let notified = self.inner.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inner.loading.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn loading(&self) -> usize {
        self.inner.loading.load(Ordering::SeqCst)
    }
}

fn deliver(client: &dyn DestinationClient, call: &DestinationCall) {
    match client.send(call) {
        Ok(()) => {
            metrics::counter!("tracking.destination_calls").increment(1);
        }
        Err(e) => {
            let err = TrackingError::Destination {
                destination: call.destination,
                reason: e.to_string(),
            };
            debug!(event_name = %call.event_name, error = %err, "destination call failed");
        }
    }
}
