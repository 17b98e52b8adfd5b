//! Current page context, supplied by the hosting page.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// What the host reports about the page being viewed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub referrer: Option<String>,
    /// Locale the page is rendered in (e.g. "en", "de")
    pub locale: Option<String>,
}

impl PageSnapshot {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            referrer: None,
            locale: None,
        }
    }

    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// URL path of the page. Bare paths are returned as given.
    pub fn path(&self) -> String {
        extract_path(&self.url)
    }
}

/// Source of the current page.
pub trait PageContext: Send + Sync {
    fn current(&self) -> PageSnapshot;
}

/// Page context the host updates on navigation.
#[derive(Debug, Default)]
pub struct StaticPageContext {
    page: RwLock<PageSnapshot>,
}

impl StaticPageContext {
    pub fn new(page: PageSnapshot) -> Self {
        Self {
            page: RwLock::new(page),
        }
    }

    /// Replaces the current page.
    pub fn navigate(&self, page: PageSnapshot) {
        *self.page.write() = page;
    }
}

impl PageContext for StaticPageContext {
    fn current(&self) -> PageSnapshot {
        self.page.read().clone()
    }
}

/// Extract path from URL.
fn extract_path(url: &str) -> String {
    if url.starts_with('/') {
        return url
            .split(['?', '#'])
            .next()
            .unwrap_or("/")
            .to_string();
    }
    url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| "/".to_string())
}
