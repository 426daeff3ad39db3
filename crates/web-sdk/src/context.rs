//! Ambient page context: the current page URL and the read-only correlation
//! cookies used to enrich server envelopes.

use dashmap::DashMap;
use parking_lot::RwLock;

/// Browser id cookie set by the Meta pixel.
pub const FBP_COOKIE: &str = "_fbp";
/// Click id cookie set by the Meta pixel on ad landings.
pub const FBC_COOKIE: &str = "_fbc";

/// Read-only view of the page the tracker runs in.
pub trait PageContext: Send + Sync {
    fn page_url(&self) -> Option<String>;
    fn cookie(&self, name: &str) -> Option<String>;
}

/// Page context with no URL and no cookies.
pub struct EmptyPageContext;

impl PageContext for EmptyPageContext {
    fn page_url(&self) -> Option<String> {
        None
    }

    fn cookie(&self, _name: &str) -> Option<String> {
        None
    }
}

/// Host-updated page context.
#[derive(Default)]
pub struct StaticPageContext {
    page_url: RwLock<Option<String>>,
    cookies: DashMap<String, String>,
}

impl StaticPageContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page_url(self, url: impl Into<String>) -> Self {
        self.set_page_url(url);
        self
    }

    pub fn with_cookie(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn set_page_url(&self, url: impl Into<String>) {
        *self.page_url.write() = Some(url.into());
    }

    /// Parse a `Cookie` header (`a=1; b=2`), replacing known cookies.
    pub fn set_cookie_header(&self, header: &str) {
        for pair in header.split(';') {
            if let Some((name, value)) = pair.trim().split_once('=') {
                if !name.is_empty() {
                    self.cookies.insert(name.to_string(), value.to_string());
                }
            }
        }
    }
}

impl PageContext for StaticPageContext {
    fn page_url(&self) -> Option<String> {
        self.page_url.read().clone()
    }

    fn cookie(&self, name: &str) -> Option<String> {
        self.cookies
            .get(name)
            .map(|v| v.value().clone())
            .filter(|v| !v.is_empty())
    }
}
