//! Meta (Facebook) Pixel adaptor — translates canonical events into
//! `fbq('track' | 'trackCustom', name, params, { eventID })` calls.

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use tracing::debug;

use storefront_core::types::{DestinationId, Product, TrackedEvent};

use super::{resolve_currency, DestinationAdaptor};
use crate::destination::{CallCommand, DestinationCall, DispatchContext};

const SCRIPT_URL: &str = "https://connect.facebook.net/en_US/fbevents.js";

/// Meta Pixel adaptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetaPixelAdaptor;

impl MetaPixelAdaptor {
    fn contents(items: &[Product]) -> Value {
        Value::Array(
            items
                .iter()
                .map(|item| {
                    json!({
                        "id": item.id,
                        "quantity": item.quantity,
                        "item_price": item.price,
                    })
                })
                .collect(),
        )
    }

    fn content_ids(items: &[Product]) -> Value {
        Value::Array(items.iter().map(|item| json!(item.id)).collect())
    }

    /// Parameters shared by every event that carries line items.
    fn commerce_params(event: &TrackedEvent, ctx: &DispatchContext) -> Value {
        let items = event.items();
        json!({
            "content_ids": Self::content_ids(items),
            "contents": Self::contents(items),
            "content_type": "product",
            "num_items": items.iter().map(|i| i.quantity).sum::<u32>(),
            "value": event.value().unwrap_or_default(),
            "currency": resolve_currency(event, ctx),
        })
    }

    fn product_params(product: &Product, event: &TrackedEvent, ctx: &DispatchContext) -> Value {
        let mut params = Self::commerce_params(event, ctx);
        if let Some(ref name) = product.name {
            params["content_name"] = json!(name);
        }
        if let Some(ref category) = product.category {
            params["content_category"] = json!(category);
        }
        params
    }
}

impl DestinationAdaptor for MetaPixelAdaptor {
    fn destination(&self) -> DestinationId {
        DestinationId::Meta
    }

    fn script_url(&self, _credential: &str) -> String {
        SCRIPT_URL.to_string()
    }

    fn bootstrap(&self, credential: &str) -> Vec<DestinationCall> {
        vec![DestinationCall::new(
            DestinationId::Meta,
            CallCommand::Init,
            "init",
            json!({ "pixel_id": credential }),
        )]
    }

    fn translate(&self, event: &TrackedEvent, ctx: &DispatchContext) -> Option<DestinationCall> {
        let (command, name, params) = match event {
            TrackedEvent::PageView(_) | TrackedEvent::HomePageView(_) => {
                (CallCommand::Track, "PageView", json!({}))
            }
            TrackedEvent::Search(search) => (
                CallCommand::Track,
                "Search",
                json!({ "search_string": search.query }),
            ),
            TrackedEvent::ViewCategory(category) => {
                let mut params = json!({ "content_category": category.name });
                if let Some(ref id) = category.id {
                    params["content_ids"] = json!([id]);
                }
                (CallCommand::TrackCustom, "ViewCategory", params)
            }
            TrackedEvent::ViewProduct(product) => (
                CallCommand::Track,
                "ViewContent",
                Self::product_params(product, event, ctx),
            ),
            TrackedEvent::AddToCart(product) => (
                CallCommand::Track,
                "AddToCart",
                Self::product_params(product, event, ctx),
            ),
            TrackedEvent::RemoveFromCart(product) => (
                CallCommand::TrackCustom,
                "RemoveFromCart",
                Self::product_params(product, event, ctx),
            ),
            TrackedEvent::UpdateCart(_) => (
                CallCommand::TrackCustom,
                "UpdateCart",
                Self::commerce_params(event, ctx),
            ),
            TrackedEvent::BeginCheckout(_) => (
                CallCommand::Track,
                "InitiateCheckout",
                Self::commerce_params(event, ctx),
            ),
            TrackedEvent::AddShippingInfo(shipping) => {
                let mut params = Self::commerce_params(event, ctx);
                if let Some(ref tier) = shipping.shipping_tier {
                    params["shipping_tier"] = json!(tier);
                }
                (CallCommand::TrackCustom, "AddShippingInfo", params)
            }
            TrackedEvent::AddPaymentInfo(_) => (
                CallCommand::Track,
                "AddPaymentInfo",
                Self::commerce_params(event, ctx),
            ),
            TrackedEvent::Purchase(purchase) => {
                let mut params = Self::commerce_params(event, ctx);
                params["order_id"] = json!(purchase.order_number);
                (CallCommand::Track, "Purchase", params)
            }
            TrackedEvent::CompleteRegistration(registration) => {
                let mut params = json!({ "status": true });
                if let Some(ref method) = registration.method {
                    params["registration_method"] = json!(method);
                }
                (CallCommand::Track, "CompleteRegistration", params)
            }
            TrackedEvent::Contact(contact) => {
                let mut params = json!({});
                if let Some(ref method) = contact.method {
                    params["contact_method"] = json!(method);
                }
                (CallCommand::Track, "Contact", params)
            }
        };

        debug!(
            event_name = name,
            custom = command == CallCommand::TrackCustom,
            "Meta pixel call translated"
        );

        Some(
            DestinationCall::new(DestinationId::Meta, command, name, params)
                .with_event_id(ctx.event_id.clone()),
        )
    }

    fn validate_config(&self, credential: &str) -> Result<()> {
        if credential.is_empty() {
            return Err(anyhow!("Meta pixel id must not be empty"));
        }
        if !credential.chars().all(|c| c.is_ascii_digit()) {
            return Err(anyhow!(
                "Meta pixel id must be numeric, got '{}'",
                credential
            ));
        }
        Ok(())
    }
}
