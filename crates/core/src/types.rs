//! Canonical storefront event model shared by every destination adaptor and
//! the server forwarder.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Closed set of funnel events the tracker understands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventKind {
    PageView,
    HomePageView,
    Search,
    ViewCategory,
    #[serde(rename = "ViewContent")]
    ViewProduct,
    AddToCart,
    RemoveFromCart,
    UpdateCart,
    #[serde(rename = "InitiateCheckout")]
    BeginCheckout,
    AddShippingInfo,
    AddPaymentInfo,
    Purchase,
    CompleteRegistration,
    Contact,
}

impl EventKind {
    pub const ALL: [EventKind; 14] = [
        EventKind::PageView,
        EventKind::HomePageView,
        EventKind::Search,
        EventKind::ViewCategory,
        EventKind::ViewProduct,
        EventKind::AddToCart,
        EventKind::RemoveFromCart,
        EventKind::UpdateCart,
        EventKind::BeginCheckout,
        EventKind::AddShippingInfo,
        EventKind::AddPaymentInfo,
        EventKind::Purchase,
        EventKind::CompleteRegistration,
        EventKind::Contact,
    ];

    /// Wire name used as `eventName` on the server envelope.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PageView => "PageView",
            EventKind::HomePageView => "HomePageView",
            EventKind::Search => "Search",
            EventKind::ViewCategory => "ViewCategory",
            EventKind::ViewProduct => "ViewContent",
            EventKind::AddToCart => "AddToCart",
            EventKind::RemoveFromCart => "RemoveFromCart",
            EventKind::UpdateCart => "UpdateCart",
            EventKind::BeginCheckout => "InitiateCheckout",
            EventKind::AddShippingInfo => "AddShippingInfo",
            EventKind::AddPaymentInfo => "AddPaymentInfo",
            EventKind::Purchase => "Purchase",
            EventKind::CompleteRegistration => "CompleteRegistration",
            EventKind::Contact => "Contact",
        }
    }

    /// Whether events of this kind are mirrored to the first-party endpoint.
    ///
    /// Traffic-volume kinds are counted by the endpoint as aggregates and
    /// must never be forwarded as discrete rows.
    pub fn is_server_mirrored(&self) -> bool {
        match self {
            EventKind::ViewProduct
            | EventKind::AddToCart
            | EventKind::RemoveFromCart
            | EventKind::BeginCheckout
            | EventKind::AddPaymentInfo
            | EventKind::Purchase
            | EventKind::CompleteRegistration
            | EventKind::Search => true,
            EventKind::PageView
            | EventKind::HomePageView
            | EventKind::ViewCategory
            | EventKind::UpdateCart
            | EventKind::AddShippingInfo
            | EventKind::Contact => false,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_quantity() -> u32 {
    1
}

/// A product or cart line. `price` is always the unit price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub price: f64,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl Product {
    pub fn new(id: impl Into<String>, price: f64) -> Self {
        Self {
            id: id.into(),
            name: None,
            price,
            quantity: 1,
            category: None,
            variant: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    /// Unit price × quantity.
    pub fn line_total(&self) -> f64 {
        self.price * f64::from(self.quantity)
    }
}

/// Σ unit price × quantity over a set of lines.
pub fn items_total(items: &[Product]) -> f64 {
    items.iter().map(Product::line_total).sum()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPayload {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartPayload {
    pub items: Vec<Product>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutPayload {
    pub items: Vec<Product>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon: Option<String>,
}

impl CheckoutPayload {
    pub fn new(items: Vec<Product>) -> Self {
        Self {
            items,
            currency: None,
            coupon: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingInfoPayload {
    #[serde(flatten)]
    pub checkout: CheckoutPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_tier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfoPayload {
    #[serde(flatten)]
    pub checkout: CheckoutPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchasePayload {
    pub order_number: String,
    pub items: Vec<Product>,
    /// Order total as charged.
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

/// A canonical event: exactly one payload shape per [`EventKind`].
///
/// Serialized adjacently tagged, e.g.
/// `{"event":"AddToCart","data":{"id":"p1","price":10.0,"quantity":2}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum TrackedEvent {
    PageView(PagePayload),
    HomePageView(PagePayload),
    Search(SearchPayload),
    ViewCategory(CategoryPayload),
    #[serde(rename = "ViewContent")]
    ViewProduct(Product),
    AddToCart(Product),
    RemoveFromCart(Product),
    UpdateCart(CartPayload),
    #[serde(rename = "InitiateCheckout")]
    BeginCheckout(CheckoutPayload),
    AddShippingInfo(ShippingInfoPayload),
    AddPaymentInfo(PaymentInfoPayload),
    Purchase(PurchasePayload),
    CompleteRegistration(RegistrationPayload),
    Contact(ContactPayload),
}

impl TrackedEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            TrackedEvent::PageView(_) => EventKind::PageView,
            TrackedEvent::HomePageView(_) => EventKind::HomePageView,
            TrackedEvent::Search(_) => EventKind::Search,
            TrackedEvent::ViewCategory(_) => EventKind::ViewCategory,
            TrackedEvent::ViewProduct(_) => EventKind::ViewProduct,
            TrackedEvent::AddToCart(_) => EventKind::AddToCart,
            TrackedEvent::RemoveFromCart(_) => EventKind::RemoveFromCart,
            TrackedEvent::UpdateCart(_) => EventKind::UpdateCart,
            TrackedEvent::BeginCheckout(_) => EventKind::BeginCheckout,
            TrackedEvent::AddShippingInfo(_) => EventKind::AddShippingInfo,
            TrackedEvent::AddPaymentInfo(_) => EventKind::AddPaymentInfo,
            TrackedEvent::Purchase(_) => EventKind::Purchase,
            TrackedEvent::CompleteRegistration(_) => EventKind::CompleteRegistration,
            TrackedEvent::Contact(_) => EventKind::Contact,
        }
    }

    /// Line items carried by the event. Single-product kinds yield one line.
    pub fn items(&self) -> &[Product] {
        match self {
            TrackedEvent::ViewProduct(p)
            | TrackedEvent::AddToCart(p)
            | TrackedEvent::RemoveFromCart(p) => std::slice::from_ref(p),
            TrackedEvent::UpdateCart(c) => &c.items,
            TrackedEvent::BeginCheckout(c) => &c.items,
            TrackedEvent::AddShippingInfo(s) => &s.checkout.items,
            TrackedEvent::AddPaymentInfo(p) => &p.checkout.items,
            TrackedEvent::Purchase(p) => &p.items,
            TrackedEvent::PageView(_)
            | TrackedEvent::HomePageView(_)
            | TrackedEvent::Search(_)
            | TrackedEvent::ViewCategory(_)
            | TrackedEvent::CompleteRegistration(_)
            | TrackedEvent::Contact(_) => &[],
        }
    }

    /// Monetary value: the explicit order total for purchases, otherwise
    /// Σ unit price × quantity for kinds that carry line items.
    pub fn value(&self) -> Option<f64> {
        match self {
            TrackedEvent::Purchase(p) => Some(p.value),
            TrackedEvent::ViewProduct(_)
            | TrackedEvent::AddToCart(_)
            | TrackedEvent::RemoveFromCart(_)
            | TrackedEvent::UpdateCart(_)
            | TrackedEvent::BeginCheckout(_)
            | TrackedEvent::AddShippingInfo(_)
            | TrackedEvent::AddPaymentInfo(_) => Some(items_total(self.items())),
            TrackedEvent::PageView(_)
            | TrackedEvent::HomePageView(_)
            | TrackedEvent::Search(_)
            | TrackedEvent::ViewCategory(_)
            | TrackedEvent::CompleteRegistration(_)
            | TrackedEvent::Contact(_) => None,
        }
    }

    /// Currency carried by the payload itself, if any.
    pub fn currency(&self) -> Option<&str> {
        match self {
            TrackedEvent::UpdateCart(c) => c.currency.as_deref(),
            TrackedEvent::BeginCheckout(c) => c.currency.as_deref(),
            TrackedEvent::AddShippingInfo(s) => s.checkout.currency.as_deref(),
            TrackedEvent::AddPaymentInfo(p) => p.checkout.currency.as_deref(),
            TrackedEvent::Purchase(p) => p.currency.as_deref(),
            _ => None,
        }
    }

    /// The raw payload as JSON, without the kind tag.
    pub fn payload_json(&self) -> serde_json::Value {
        let result = match self {
            TrackedEvent::PageView(p) | TrackedEvent::HomePageView(p) => serde_json::to_value(p),
            TrackedEvent::Search(p) => serde_json::to_value(p),
            TrackedEvent::ViewCategory(p) => serde_json::to_value(p),
            TrackedEvent::ViewProduct(p)
            | TrackedEvent::AddToCart(p)
            | TrackedEvent::RemoveFromCart(p) => serde_json::to_value(p),
            TrackedEvent::UpdateCart(p) => serde_json::to_value(p),
            TrackedEvent::BeginCheckout(p) => serde_json::to_value(p),
            TrackedEvent::AddShippingInfo(p) => serde_json::to_value(p),
            TrackedEvent::AddPaymentInfo(p) => serde_json::to_value(p),
            TrackedEvent::Purchase(p) => serde_json::to_value(p),
            TrackedEvent::CompleteRegistration(p) => serde_json::to_value(p),
            TrackedEvent::Contact(p) => serde_json::to_value(p),
        };
        // Plain data structs with string keys always serialize.
        result.unwrap_or(serde_json::Value::Null)
    }
}

/// External analytics/advertising platforms the tracker can feed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DestinationId {
    Meta,
    #[serde(rename = "tiktok")]
    TikTok,
    #[serde(rename = "ga4")]
    GoogleAnalytics,
    #[serde(rename = "gtm")]
    GoogleTagManager,
}

impl DestinationId {
    pub const ALL: [DestinationId; 4] = [
        DestinationId::Meta,
        DestinationId::TikTok,
        DestinationId::GoogleAnalytics,
        DestinationId::GoogleTagManager,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DestinationId::Meta => "meta",
            DestinationId::TikTok => "tiktok",
            DestinationId::GoogleAnalytics => "ga4",
            DestinationId::GoogleTagManager => "gtm",
        }
    }
}

impl std::fmt::Display for DestinationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity fields attached to server-mirrored events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
}

impl IdentityData {
    pub fn email(email: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            ..Default::default()
        }
    }

    pub fn phone(phone: impl Into<String>) -> Self {
        Self {
            phone: Some(phone.into()),
            ..Default::default()
        }
    }

    /// Overlay `other` onto `self`; fields absent in `other` are kept.
    pub fn merge(&mut self, other: &IdentityData) {
        if other.email.is_some() {
            self.email.clone_from(&other.email);
        }
        if other.phone.is_some() {
            self.phone.clone_from(&other.phone);
        }
        if other.external_id.is_some() {
            self.external_id.clone_from(&other.external_id);
        }
    }

    pub fn merged(&self, other: Option<&IdentityData>) -> IdentityData {
        let mut out = self.clone();
        if let Some(other) = other {
            out.merge(other);
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.phone.is_none() && self.external_id.is_none()
    }
}

/// `userData` block of the server envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Browser id correlation cookie.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fbp: Option<String>,
    /// Click id correlation cookie.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fbc: Option<String>,
}

pub const ACTION_SOURCE_WEBSITE: &str = "website";

/// Body posted to `/api/tracking/{storeSlug}/event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEventEnvelope {
    pub event_name: String,
    /// Epoch seconds.
    pub event_time: i64,
    pub event_id: String,
    pub user_data: UserData,
    pub custom_data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_source_url: Option<String>,
    pub action_source: String,
}

impl ServerEventEnvelope {
    pub fn new(
        event: &TrackedEvent,
        event_id: impl Into<String>,
        user_data: UserData,
        event_source_url: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_name: event.kind().as_str().to_string(),
            event_time: at.timestamp(),
            event_id: event_id.into(),
            user_data,
            custom_data: event.payload_json(),
            event_source_url,
            action_source: ACTION_SOURCE_WEBSITE.to_string(),
        }
    }
}
