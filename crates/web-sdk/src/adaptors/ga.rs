//! Google Analytics 4 (gtag.js) adaptor — transforms canonical events into
//! `gtag('event', name, params)` calls using GA4's recommended e-commerce
//! event names and item schema.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

use storefront_core::types::{DestinationId, Product, TrackedEvent};

use super::{resolve_currency, DestinationAdaptor};
use crate::destination::{CallCommand, DestinationCall, DispatchContext};

const SCRIPT_BASE: &str = "https://www.googletagmanager.com/gtag/js";

/// Configuration for the GA4 adaptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GaConfig {
    /// Let gtag send its own page_view on config (default: false, page views
    /// are tracked explicitly).
    pub send_page_view: bool,
    /// Enable debug mode for GA4 DebugView (default: false).
    pub debug_mode: bool,
}

/// Google Analytics 4 adaptor.
#[derive(Debug, Clone, Default)]
pub struct GaAdaptor {
    config: GaConfig,
}

impl GaAdaptor {
    pub fn new(config: GaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GaConfig {
        &self.config
    }

    /// GA4 `items[]` entries; `price` is the unit price.
    pub(crate) fn items(items: &[Product]) -> Value {
        Value::Array(
            items
                .iter()
                .map(|item| {
                    let mut entry = json!({
                        "item_id": item.id,
                        "price": item.price,
                        "quantity": item.quantity,
                    });
                    if let Some(ref name) = item.name {
                        entry["item_name"] = json!(name);
                    }
                    if let Some(ref category) = item.category {
                        entry["item_category"] = json!(category);
                    }
                    if let Some(ref variant) = item.variant {
                        entry["item_variant"] = json!(variant);
                    }
                    entry
                })
                .collect(),
        )
    }

    fn commerce(event: &TrackedEvent, ctx: &DispatchContext) -> Value {
        json!({
            "currency": resolve_currency(event, ctx),
            "value": event.value().unwrap_or_default(),
            "items": Self::items(event.items()),
        })
    }

    /// Map an event to its GA4 recommended name and parameters. Shared with
    /// the GTM adaptor, whose ecommerce object follows the same schema.
    pub(crate) fn ga4_event(event: &TrackedEvent, ctx: &DispatchContext) -> (&'static str, Value) {
        match event {
            TrackedEvent::PageView(page) | TrackedEvent::HomePageView(page) => {
                let mut params = json!({});
                if let Some(ref url) = page.url {
                    params["page_location"] = json!(url);
                }
                if let Some(ref title) = page.title {
                    params["page_title"] = json!(title);
                }
                ("page_view", params)
            }
            TrackedEvent::Search(search) => ("search", json!({ "search_term": search.query })),
            TrackedEvent::ViewCategory(category) => {
                let mut params = json!({ "item_list_name": category.name });
                if let Some(ref id) = category.id {
                    params["item_list_id"] = json!(id);
                }
                ("view_item_list", params)
            }
            TrackedEvent::ViewProduct(_) => ("view_item", Self::commerce(event, ctx)),
            TrackedEvent::AddToCart(_) => ("add_to_cart", Self::commerce(event, ctx)),
            TrackedEvent::RemoveFromCart(_) => ("remove_from_cart", Self::commerce(event, ctx)),
            TrackedEvent::UpdateCart(_) => ("update_cart", Self::commerce(event, ctx)),
            TrackedEvent::BeginCheckout(checkout) => {
                let mut params = Self::commerce(event, ctx);
                if let Some(ref coupon) = checkout.coupon {
                    params["coupon"] = json!(coupon);
                }
                ("begin_checkout", params)
            }
            TrackedEvent::AddShippingInfo(shipping) => {
                let mut params = Self::commerce(event, ctx);
                if let Some(ref tier) = shipping.shipping_tier {
                    params["shipping_tier"] = json!(tier);
                }
                if let Some(ref coupon) = shipping.checkout.coupon {
                    params["coupon"] = json!(coupon);
                }
                ("add_shipping_info", params)
            }
            TrackedEvent::AddPaymentInfo(payment) => {
                let mut params = Self::commerce(event, ctx);
                if let Some(ref payment_type) = payment.payment_type {
                    params["payment_type"] = json!(payment_type);
                }
                if let Some(ref coupon) = payment.checkout.coupon {
                    params["coupon"] = json!(coupon);
                }
                ("add_payment_info", params)
            }
            TrackedEvent::Purchase(purchase) => {
                let mut params = Self::commerce(event, ctx);
                params["transaction_id"] = json!(purchase.order_number);
                if let Some(tax) = purchase.tax {
                    params["tax"] = json!(tax);
                }
                if let Some(shipping) = purchase.shipping {
                    params["shipping"] = json!(shipping);
                }
                if let Some(ref coupon) = purchase.coupon {
                    params["coupon"] = json!(coupon);
                }
                ("purchase", params)
            }
            TrackedEvent::CompleteRegistration(registration) => {
                let mut params = json!({});
                if let Some(ref method) = registration.method {
                    params["method"] = json!(method);
                }
                ("sign_up", params)
            }
            TrackedEvent::Contact(contact) => {
                let mut params = json!({});
                if let Some(ref method) = contact.method {
                    params["method"] = json!(method);
                }
                ("generate_lead", params)
            }
        }
    }
}

impl DestinationAdaptor for GaAdaptor {
    fn destination(&self) -> DestinationId {
        DestinationId::GoogleAnalytics
    }

    fn script_url(&self, credential: &str) -> String {
        match Url::parse_with_params(SCRIPT_BASE, &[("id", credential)]) {
            Ok(url) => url.to_string(),
            Err(_) => SCRIPT_BASE.to_string(),
        }
    }

    fn bootstrap(&self, credential: &str) -> Vec<DestinationCall> {
        let mut config = json!({
            "send_page_view": self.config.send_page_view,
        });
        if self.config.debug_mode {
            config["debug_mode"] = json!(true);
        }
        vec![
            DestinationCall::new(
                DestinationId::GoogleAnalytics,
                CallCommand::Config,
                "js",
                json!({}),
            ),
            DestinationCall::new(
                DestinationId::GoogleAnalytics,
                CallCommand::Config,
                credential,
                config,
            ),
        ]
    }

    fn translate(&self, event: &TrackedEvent, ctx: &DispatchContext) -> Option<DestinationCall> {
        let (event_name, mut params) = Self::ga4_event(event, ctx);

        if self.config.debug_mode {
            params["debug_mode"] = json!(true);
        }

        debug!(event_name, "GA4 event transformed");

        Some(DestinationCall::new(
            DestinationId::GoogleAnalytics,
            CallCommand::Event,
            event_name,
            params,
        ))
    }

    fn validate_config(&self, credential: &str) -> Result<()> {
        if credential.is_empty() {
            return Err(anyhow!("GA4 measurement_id must not be empty"));
        }
        if !credential.starts_with("G-") {
            return Err(anyhow!(
                "GA4 measurement_id must start with 'G-', got '{}'",
                credential
            ));
        }
        Ok(())
    }
}
