//! User-agent classification for session listings.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    Mobile,
    Tablet,
    Desktop,
    ApiClient,
    Unknown,
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceClass::Mobile => "Mobile",
            DeviceClass::Tablet => "Tablet",
            DeviceClass::Desktop => "Desktop",
            DeviceClass::ApiClient => "API Client",
            DeviceClass::Unknown => "Unknown Device",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Browser {
    Edge,
    Chrome,
    Firefox,
    Safari,
    Postman,
    Unknown,
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Browser::Edge => "Edge",
            Browser::Chrome => "Chrome",
            Browser::Firefox => "Firefox",
            Browser::Safari => "Safari",
            Browser::Postman => "Postman",
            Browser::Unknown => "Unknown Browser",
        })
    }
}

/// Structured device description stored alongside a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_class: DeviceClass,
    pub browser: Browser,
    pub user_agent: String,
}

impl DeviceInfo {
    /// Fallback for requests without a user agent.
    pub fn unknown() -> Self {
        Self {
            device_class: DeviceClass::Unknown,
            browser: Browser::Unknown,
            user_agent: String::new(),
        }
    }

    /// Classify a raw `User-Agent` header value.
    pub fn parse(user_agent: &str) -> Self {
        let raw = user_agent.trim();
        if raw.is_empty() {
            return Self::unknown();
        }
        let ua = raw.to_ascii_lowercase();

        let device_class = if ua.contains("ipad") || ua.contains("tablet") {
            DeviceClass::Tablet
        } else if ua.contains("mobile") || ua.contains("android") || ua.contains("iphone") {
            DeviceClass::Mobile
        } else if ua.contains("postman") || ua.starts_with("curl/") || ua.contains("httpie") {
            DeviceClass::ApiClient
        } else if ua.contains("windows") || ua.contains("macintosh") || ua.contains("linux") || ua.contains("x11") {
            DeviceClass::Desktop
        } else {
            DeviceClass::Unknown
        };

        // Edge and Chrome both advertise "chrome"; Chrome and Safari both "safari".
        let browser = if ua.contains("edg/") || ua.contains("edge/") {
            Browser::Edge
        } else if ua.contains("firefox") {
            Browser::Firefox
        } else if ua.contains("chrome") || ua.contains("crios") {
            Browser::Chrome
        } else if ua.contains("safari") {
            Browser::Safari
        } else if ua.contains("postman") {
            Browser::Postman
        } else {
            Browser::Unknown
        };

        Self {
            device_class,
            browser,
            user_agent: raw.to_string(),
        }
    }

    /// Human-readable label, e.g. "Chrome on Desktop".
    pub fn label(&self) -> String {
        format!("{} on {}", self.browser, self.device_class)
    }
}
