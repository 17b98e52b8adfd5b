//! Device, browser, and location context.
//!
//! The host environment reports raw signals through a [`DeviceProbe`].
//! [`DeviceContext::snapshot`] turns them into a [`DeviceInfo`], parsing the
//! user agent with woothee. Every field falls back to `"unknown"`.

use serde::{Deserialize, Serialize};
use woothee::parser::Parser;

const UNKNOWN: &str = "unknown";

/// Raw signals reported by the host environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSignals {
    pub user_agent: Option<String>,
    pub language: Option<String>,
    pub screen_width: Option<u32>,
    pub screen_height: Option<u32>,
    pub color_depth: Option<u32>,
    /// IANA timezone name
    pub timezone: Option<String>,
    /// Minutes behind UTC, as browsers report it
    pub timezone_offset_minutes: Option<i32>,
    /// Network connection type (4g, wifi, ...)
    pub connection_type: Option<String>,
    /// Signature of a rendered canvas, when the host can produce one
    pub canvas_signature: Option<String>,
}

/// Source of raw device signals.
pub trait DeviceProbe: Send + Sync {
    fn signals(&self) -> DeviceSignals;
}

/// Probe returning a fixed set of signals.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe(pub DeviceSignals);

impl DeviceProbe for StaticProbe {
    fn signals(&self) -> DeviceSignals {
        self.0.clone()
    }
}

/// Device snapshot attached to every delivered event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_type: String,
    pub browser: String,
    pub browser_version: String,
    pub os: String,
    pub connection_type: String,
    pub screen_resolution: String,
    pub timezone: String,
    pub language: String,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            device_type: UNKNOWN.into(),
            browser: UNKNOWN.into(),
            browser_version: UNKNOWN.into(),
            os: UNKNOWN.into(),
            connection_type: UNKNOWN.into(),
            screen_resolution: UNKNOWN.into(),
            timezone: UNKNOWN.into(),
            language: UNKNOWN.into(),
        }
    }
}

/// Location information from an external geo lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationInfo {
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
}

/// External geo lookup.
pub trait GeoProvider: Send + Sync {
    fn location(&self) -> LocationInfo;
}

/// Geo provider that knows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGeo;

impl GeoProvider for NoGeo {
    fn location(&self) -> LocationInfo {
        LocationInfo::default()
    }
}

/// Builds device snapshots from a probe.
pub struct DeviceContext {
    parser: Parser,
}

impl DeviceContext {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
        }
    }

    /// Takes a snapshot of the current environment.
    pub fn snapshot(&self, probe: &dyn DeviceProbe) -> DeviceInfo {
        let signals = probe.signals();
        let mut info = DeviceInfo::default();

        if let Some(ua) = signals.user_agent.as_deref().filter(|ua| !ua.is_empty()) {
            self.apply_user_agent(ua, &mut info);
        }

        if let (Some(w), Some(h)) = (signals.screen_width, signals.screen_height) {
            info.screen_resolution = format!("{}x{}", w, h);
        }
        if let Some(connection) = signals.connection_type {
            info.connection_type = connection;
        }
        if let Some(tz) = signals.timezone {
            info.timezone = tz;
        }
        if let Some(lang) = signals.language {
            info.language = lang;
        }

        info
    }

    fn apply_user_agent(&self, user_agent: &str, info: &mut DeviceInfo) {
        let Some(result) = self.parser.parse(user_agent) else {
            return;
        };

        if !result.name.is_empty() && result.name != "UNKNOWN" {
            info.browser = result.name.to_string();
        }
        if !result.version.is_empty() && result.version != "UNKNOWN" {
            info.browser_version = result.version.to_string();
        }
        if !result.os.is_empty() && result.os != "UNKNOWN" {
            info.os = result.os.to_string();
        }

        // woothee categories: pc, smartphone, mobilephone, crawler, appliance, misc
        info.device_type = match result.category {
            "pc" => "desktop",
            "smartphone" | "mobilephone" => "mobile",
            "crawler" => "bot",
            "appliance" => "other",
            _ => UNKNOWN,
        }
        .to_string();
    }
}

impl Default for DeviceContext {
    fn default() -> Self {
        Self::new()
    }
}
