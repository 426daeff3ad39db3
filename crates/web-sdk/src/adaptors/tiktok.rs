//! TikTok Pixel adaptor — translates canonical events into `ttq.track` /
//! `ttq.page` calls. TikTok has no equivalent for category views, cart
//! removals, cart updates, or shipping info; those are skipped.

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use storefront_core::types::{DestinationId, Product, TrackedEvent};

use super::{resolve_currency, DestinationAdaptor};
use crate::destination::{CallCommand, DestinationCall, DispatchContext};

const SCRIPT_BASE: &str = "https://analytics.tiktok.com/i18n/pixel/events.js";

/// TikTok Pixel adaptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct TikTokPixelAdaptor;

impl TikTokPixelAdaptor {
    fn contents(items: &[Product]) -> Value {
        Value::Array(
            items
                .iter()
                .map(|item| {
                    let mut content = json!({
                        "content_id": item.id,
                        "quantity": item.quantity,
                        "price": item.price,
                    });
                    if let Some(ref name) = item.name {
                        content["content_name"] = json!(name);
                    }
                    if let Some(ref category) = item.category {
                        content["content_category"] = json!(category);
                    }
                    content
                })
                .collect(),
        )
    }

    fn commerce_params(event: &TrackedEvent, ctx: &DispatchContext) -> Value {
        json!({
            "contents": Self::contents(event.items()),
            "content_type": "product",
            "value": event.value().unwrap_or_default(),
            "currency": resolve_currency(event, ctx),
        })
    }
}

impl DestinationAdaptor for TikTokPixelAdaptor {
    fn destination(&self) -> DestinationId {
        DestinationId::TikTok
    }

    fn script_url(&self, credential: &str) -> String {
        match Url::parse_with_params(SCRIPT_BASE, &[("sdkid", credential), ("lib", "ttq")]) {
            Ok(url) => url.to_string(),
            Err(_) => SCRIPT_BASE.to_string(),
        }
    }

    fn bootstrap(&self, credential: &str) -> Vec<DestinationCall> {
        vec![DestinationCall::new(
            DestinationId::TikTok,
            CallCommand::Init,
            "load",
            json!({ "pixel_id": credential }),
        )]
    }

    fn translate(&self, event: &TrackedEvent, ctx: &DispatchContext) -> Option<DestinationCall> {
        let (command, name, params) = match event {
            TrackedEvent::PageView(_) | TrackedEvent::HomePageView(_) => {
                (CallCommand::Page, "page", json!({}))
            }
            TrackedEvent::Search(search) => {
                (CallCommand::Track, "Search", json!({ "query": search.query }))
            }
            TrackedEvent::ViewProduct(_) => (
                CallCommand::Track,
                "ViewContent",
                Self::commerce_params(event, ctx),
            ),
            TrackedEvent::AddToCart(_) => (
                CallCommand::Track,
                "AddToCart",
                Self::commerce_params(event, ctx),
            ),
            TrackedEvent::BeginCheckout(_) => (
                CallCommand::Track,
                "InitiateCheckout",
                Self::commerce_params(event, ctx),
            ),
            TrackedEvent::AddPaymentInfo(_) => (
                CallCommand::Track,
                "AddPaymentInfo",
                Self::commerce_params(event, ctx),
            ),
            TrackedEvent::Purchase(_) => (
                CallCommand::Track,
                "CompletePayment",
                Self::commerce_params(event, ctx),
            ),
            TrackedEvent::CompleteRegistration(_) => {
                (CallCommand::Track, "CompleteRegistration", json!({}))
            }
            TrackedEvent::Contact(_) => (CallCommand::Track, "Contact", json!({})),
            TrackedEvent::ViewCategory(_)
            | TrackedEvent::RemoveFromCart(_)
            | TrackedEvent::UpdateCart(_)
            | TrackedEvent::AddShippingInfo(_) => return None,
        };

        debug!(event_name = name, "TikTok pixel call translated");

        let call = DestinationCall::new(DestinationId::TikTok, command, name, params);
        Some(match command {
            CallCommand::Page => call,
            _ => call.with_event_id(ctx.event_id.clone()),
        })
    }

    fn validate_config(&self, credential: &str) -> Result<()> {
        if credential.is_empty() {
            return Err(anyhow!("TikTok pixel id must not be empty"));
        }
        if !credential.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(anyhow!(
                "TikTok pixel id must be alphanumeric, got '{}'",
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
    use storefront_core::types::EventKind;

    fn ctx() -> DispatchContext {
        DispatchContext::new("EUR", "1700000000000-q1w2e3r4t")
    }

    #[test]
    fn test_purchase_maps_to_complete_payment() {
        let call = TikTokPixelAdaptor
            .translate(&fixtures::purchase(), &ctx())
            .unwrap();
        assert_eq!(call.event_name, "CompletePayment");
        assert_eq!(call.event_id.as_deref(), Some("1700000000000-q1w2e3r4t"));
        assert_eq!(call.params["value"], 250.0);
        assert_eq!(call.params["currency"], "ILS");
        let contents = call.params["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0]["price"], 100.0);
        assert_eq!(contents[0]["quantity"], 2);
    }

    #[test]
    fn test_unsupported_kinds_are_skipped() {
        let skipped: Vec<EventKind> = fixtures::every_kind()
            .iter()
            .filter(|e| TikTokPixelAdaptor.translate(e, &ctx()).is_none())
            .map(|e| e.kind())
            .collect();
        assert_eq!(
            skipped,
            vec![
                EventKind::ViewCategory,
                EventKind::RemoveFromCart,
                EventKind::UpdateCart,
                EventKind::AddShippingInfo,
            ]
        );
    }

    #[test]
    fn test_page_view_uses_page_command() {
        let event = TrackedEvent::PageView(Default::default());
        let call = TikTokPixelAdaptor.translate(&event, &ctx()).unwrap();
        assert_eq!(call.command, CallCommand::Page);
        assert!(call.event_id.is_none());
    }

    #[test]
    fn test_view_product_uses_store_currency() {
        let event = TrackedEvent::ViewProduct(fixtures::product());
        let call = TikTokPixelAdaptor.translate(&event, &ctx()).unwrap();
        assert_eq!(call.params["currency"], "EUR");
        assert_eq!(call.params["contents"][0]["content_name"], "Linen Shirt");
    }

    #[test]
    fn test_script_url() {
        let url = TikTokPixelAdaptor.script_url("C4A1B2C3D4");
        assert!(url.starts_with(SCRIPT_BASE));
        assert!(url.contains("sdkid=C4A1B2C3D4"));
        assert!(url.contains("lib=ttq"));
    }

    #[test]
    fn test_validate_config() {
        assert!(TikTokPixelAdaptor.validate_config("C4A1B2C3D4").is_ok());
        assert!(TikTokPixelAdaptor.validate_config("").is_err());
        assert!(TikTokPixelAdaptor.validate_config("bad id!").is_err());
    }
}
