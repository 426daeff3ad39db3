//! Google Tag Manager adaptor — transforms canonical events into dataLayer
//! pushes. E-commerce events carry their data under an `ecommerce` key in
//! the GA4 schema so GTM's built-in GA4 tags can read it unchanged.

use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use url::Url;

use storefront_core::types::{DestinationId, EventKind, TrackedEvent};

use super::{DestinationAdaptor, GaAdaptor};
use crate::destination::{CallCommand, DestinationCall, DispatchContext};

const SCRIPT_BASE: &str = "https://www.googletagmanager.com/gtm.js";
const DEFAULT_DATA_LAYER: &str = "dataLayer";

/// Configuration for the GTM adaptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GtmConfig {
    /// Custom dataLayer variable name (default: "dataLayer").
    pub data_layer_name: String,
}

impl Default for GtmConfig {
    fn default() -> Self {
        Self {
            data_layer_name: DEFAULT_DATA_LAYER.into(),
        }
    }
}

/// Google Tag Manager adaptor.
#[derive(Debug, Clone, Default)]
pub struct GtmAdaptor {
    config: GtmConfig,
}

impl GtmAdaptor {
    pub fn new(config: GtmConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GtmConfig {
        &self.config
    }

    fn is_ecommerce(kind: EventKind) -> bool {
        match kind {
            EventKind::ViewCategory
            | EventKind::ViewProduct
            | EventKind::AddToCart
            | EventKind::RemoveFromCart
            | EventKind::UpdateCart
            | EventKind::BeginCheckout
            | EventKind::AddShippingInfo
            | EventKind::AddPaymentInfo
            | EventKind::Purchase => true,
            EventKind::PageView
            | EventKind::HomePageView
            | EventKind::Search
            | EventKind::CompleteRegistration
            | EventKind::Contact => false,
        }
    }
}

impl DestinationAdaptor for GtmAdaptor {
    fn destination(&self) -> DestinationId {
        DestinationId::GoogleTagManager
    }

    fn script_url(&self, credential: &str) -> String {
        let mut params = vec![("id", credential)];
        if self.config.data_layer_name != DEFAULT_DATA_LAYER {
            params.push(("l", self.config.data_layer_name.as_str()));
        }
        match Url::parse_with_params(SCRIPT_BASE, &params) {
            Ok(url) => url.to_string(),
            Err(_) => SCRIPT_BASE.to_string(),
        }
    }

    fn bootstrap(&self, _credential: &str) -> Vec<DestinationCall> {
        vec![DestinationCall::new(
            DestinationId::GoogleTagManager,
            CallCommand::Push,
            "gtm.js",
            json!({
                "gtm.start": Utc::now().timestamp_millis(),
                "event": "gtm.js",
            }),
        )]
    }

    fn translate(&self, event: &TrackedEvent, ctx: &DispatchContext) -> Option<DestinationCall> {
        let (event_name, params) = GaAdaptor::ga4_event(event, ctx);

        let mut push = json!({
            "event": event_name,
            "event_id": ctx.event_id,
        });

        if Self::is_ecommerce(event.kind()) {
            push["ecommerce"] = params;
        } else if let Some(fields) = params.as_object() {
            for (key, value) in fields {
                push[key] = value.clone();
            }
        }

        debug!(
            event_name,
            data_layer = %self.config.data_layer_name,
            "GTM dataLayer push transformed"
        );

        Some(
            DestinationCall::new(
                DestinationId::GoogleTagManager,
                CallCommand::Push,
                event_name,
                push,
            )
            .with_event_id(ctx.event_id.clone()),
        )
    }

    fn validate_config(&self, credential: &str) -> Result<()> {
        if credential.is_empty() {
            return Err(anyhow!("GTM container_id must not be empty"));
        }
        if !credential.starts_with("GTM-") {
            return Err(anyhow!(
                "GTM container_id must start with 'GTM-', got '{}'",
                credential
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptors::fixtures;
    use storefront_core::types::{PagePayload, RegistrationPayload};

    fn ctx() -> DispatchContext {
        DispatchContext::new("USD", "1700000000000-m5n6b7v8c")
    }

    #[test]
    fn test_page_view_transform() {
        let event = TrackedEvent::PageView(PagePayload {
            url: Some("https://shop.example.com/".into()),
            title: None,
        });
        let call = GtmAdaptor::default().translate(&event, &ctx()).unwrap();
        assert_eq!(call.command, CallCommand::Push);
        assert_eq!(call.params["event"], "page_view");
        assert_eq!(call.params["page_location"], "https://shop.example.com/");
        assert_eq!(call.params["event_id"], "1700000000000-m5n6b7v8c");
        assert!(call.params.get("ecommerce").is_none());
    }

    #[test]
    fn test_purchase_uses_ecommerce_object() {
        let call = GtmAdaptor::default()
            .translate(&fixtures::purchase(), &ctx())
            .unwrap();
        assert_eq!(call.params["event"], "purchase");
        let ecommerce = &call.params["ecommerce"];
        assert_eq!(ecommerce["transaction_id"], "1001");
        assert_eq!(ecommerce["value"], 250.0);
        assert_eq!(ecommerce["items"].as_array().unwrap().len(), 2);
        assert_eq!(ecommerce["items"][1]["price"], 50.0);
    }

    #[test]
    fn test_registration_is_flat() {
        let event = TrackedEvent::CompleteRegistration(RegistrationPayload {
            method: Some("google".into()),
        });
        let call = GtmAdaptor::default().translate(&event, &ctx()).unwrap();
        assert_eq!(call.params["event"], "sign_up");
        assert_eq!(call.params["method"], "google");
    }

    #[test]
    fn test_script_url_with_custom_data_layer() {
        let adaptor = GtmAdaptor::default();
        assert_eq!(
            adaptor.script_url("GTM-ABC1234"),
            "https://www.googletagmanager.com/gtm.js?id=GTM-ABC1234"
        );

        let custom = GtmAdaptor::new(GtmConfig {
            data_layer_name: "storeLayer".into(),
        });
        assert!(custom.script_url("GTM-ABC1234").ends_with("&l=storeLayer"));
    }

    #[test]
    fn test_bootstrap() {
        let calls = GtmAdaptor::default().bootstrap("GTM-ABC1234");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].params["event"], "gtm.js");
        assert!(calls[0].params["gtm.start"].as_i64().is_some());
    }

    #[test]
    fn test_validate_config() {
        let adaptor = GtmAdaptor::default();
        assert!(adaptor.validate_config("GTM-ABC1234").is_ok());
        assert!(adaptor.validate_config("").is_err());
        assert!(adaptor.validate_config("XYZ-123").is_err());
    }
}
