//! In-memory destination loader that records every call, for tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use storefront_core::types::DestinationId;

use crate::destination::{CallCommand, DestinationCall, DestinationClient, ScriptLoader};

type CallLog = Arc<Mutex<Vec<DestinationCall>>>;

/// Loader whose clients append every call to a shared log.
///
/// Loads can be held back with a gate to observe the buffering phase, made
/// to fail per destination, or yield clients that reject every call.
pub struct RecordingLoader {
    calls: CallLog,
    loads: Mutex<HashMap<DestinationId, usize>>,
    failing: Mutex<HashSet<DestinationId>>,
    rejecting: Mutex<HashSet<DestinationId>>,
    gate: watch::Sender<bool>,
}

impl RecordingLoader {
    pub fn new() -> Arc<Self> {
        let (gate, _) = watch::channel(true);
        Arc::new(Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            loads: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            rejecting: Mutex::new(HashSet::new()),
            gate,
        })
    }

    /// Hold every load until [`Self::open_gate`].
    pub fn with_gate(self: Arc<Self>) -> Arc<Self> {
        self.gate.send_replace(false);
        self
    }

    pub fn failing(self: Arc<Self>, destination: DestinationId) -> Arc<Self> {
        self.failing.lock().insert(destination);
        self
    }

    pub fn rejecting_calls(self: Arc<Self>, destination: DestinationId) -> Arc<Self> {
        self.rejecting.lock().insert(destination);
        self
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    pub fn calls(&self) -> Vec<DestinationCall> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, destination: DestinationId) -> Vec<DestinationCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.destination == destination)
            .cloned()
            .collect()
    }

    /// Calls for `destination` excluding install-time bootstrap calls.
    pub fn event_calls_for(&self, destination: DestinationId) -> Vec<DestinationCall> {
        self.calls_for(destination)
            .into_iter()
            .filter(|c| !is_bootstrap(c))
            .collect()
    }

    pub fn load_count(&self, destination: DestinationId) -> usize {
        self.loads.lock().get(&destination).copied().unwrap_or(0)
    }
}

fn is_bootstrap(call: &DestinationCall) -> bool {
    matches!(call.command, CallCommand::Init | CallCommand::Config)
        || call.event_name == "gtm.js"
}

#[async_trait]
impl ScriptLoader for RecordingLoader {
    async fn load(
        &self,
        destination: DestinationId,
        _script_url: &str,
    ) -> anyhow::Result<Arc<dyn DestinationClient>> {
        *self.loads.lock().entry(destination).or_insert(0) += 1;

        let mut gate = self.gate.subscribe();
        gate.wait_for(|open| *open)
            .await
            .map_err(|_| anyhow!("loader gate closed"))?;

        if self.failing.lock().contains(&destination) {
            return Err(anyhow!("script for {} failed to load", destination));
        }
        Ok(Arc::new(RecordingClient {
            calls: Arc::clone(&self.calls),
            reject: self.rejecting.lock().contains(&destination),
        }))
    }
}

struct RecordingClient {
    calls: CallLog,
    reject: bool,
}

impl DestinationClient for RecordingClient {
    fn send(&self, call: &DestinationCall) -> anyhow::Result<()> {
        if self.reject {
            return Err(anyhow!("client rejected {}", call.event_name));
        }
        self.calls.lock().push(call.clone());
        Ok(())
    }
}
