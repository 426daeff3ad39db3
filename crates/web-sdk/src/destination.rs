//! Host-facing destination types: the translated call, the loaded client
//! handle, and the loader that installs a platform's script.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use storefront_core::types::DestinationId;

/// Which entry point of the platform client a call goes through.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CallCommand {
    /// One-time client setup issued at install (`fbq('init')`, `ttq.load`).
    Init,
    /// `gtag('config', ...)` / `gtag('js', ...)`.
    Config,
    /// Platform standard event.
    Track,
    /// Platform custom event, for kinds without a standard equivalent.
    TrackCustom,
    /// TikTok `ttq.page()`.
    Page,
    /// `gtag('event', ...)`.
    Event,
    /// `dataLayer.push(...)`.
    Push,
}

/// One translated invocation of a destination's client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DestinationCall {
    pub destination: DestinationId,
    pub command: CallCommand,
    pub event_name: String,
    pub params: serde_json::Value,
    /// Dedup id forwarded to platforms that accept one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl DestinationCall {
    pub fn new(
        destination: DestinationId,
        command: CallCommand,
        event_name: impl Into<String>,
        params: serde_json::Value,
    ) -> Self {
        Self {
            destination,
            command,
            event_name: event_name.into(),
            params,
            event_id: None,
        }
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }
}

/// Per-call inputs for translation besides the event itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchContext {
    /// Store display currency, used when the payload carries none.
    pub currency: String,
    pub event_id: String,
}

impl DispatchContext {
    pub fn new(currency: impl Into<String>, event_id: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            event_id: event_id.into(),
        }
    }
}

/// A loaded platform client. Obtained once per destination and then called
/// for every translated event.
pub trait DestinationClient: Send + Sync {
    fn send(&self, call: &DestinationCall) -> anyhow::Result<()>;
}

/// Installs a platform's script and yields its client once loaded.
#[async_trait]
pub trait ScriptLoader: Send + Sync {
    async fn load(
        &self,
        destination: DestinationId,
        script_url: &str,
    ) -> anyhow::Result<Arc<dyn DestinationClient>>;
}

/// Loader for hosts without a real page: every destination "loads" at once
/// and its client writes each call to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogLoader;

#[async_trait]
impl ScriptLoader for LogLoader {
    async fn load(
        &self,
        destination: DestinationId,
        script_url: &str,
    ) -> anyhow::Result<Arc<dyn DestinationClient>> {
        info!(%destination, script_url, "destination script loaded");
        Ok(Arc::new(LogClient))
    }
}

struct LogClient;

impl DestinationClient for LogClient {
    fn send(&self, call: &DestinationCall) -> anyhow::Result<()> {
        info!(
            destination = %call.destination,
            command = ?call.command,
            event_name = %call.event_name,
            event_id = call.event_id.as_deref().unwrap_or(""),
            params = %serde_json::to_string(&call.params)?,
            "destination call"
        );
        Ok(())
    }
}
