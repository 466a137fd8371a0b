//! User-agent classification into coarse browser / device / OS buckets.
//!
//! Pure substring matching on the lower-cased string. Several vendors embed
//! each other's tokens (every Chromium UA says "Safari", Edge and Opera
//! say "Chrome", iOS says "like Mac OS X", Android says "Linux"), so the
//! checks run from most to least specific.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Browser {
    Chrome,
    Safari,
    Firefox,
    Edge,
    Opera,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceClass {
    Desktop,
    Mobile,
    Tablet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatingSystem {
    Windows,
    #[serde(rename = "macOS")]
    MacOs,
    Linux,
    Android,
    #[serde(rename = "iOS")]
    Ios,
    Unknown,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chrome => "Chrome",
            Self::Safari => "Safari",
            Self::Firefox => "Firefox",
            Self::Edge => "Edge",
            Self::Opera => "Opera",
            Self::Unknown => "Unknown",
        }
    }
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Desktop => "Desktop",
            Self::Mobile => "Mobile",
            Self::Tablet => "Tablet",
        }
    }
}

impl OperatingSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Windows => "Windows",
            Self::MacOs => "macOS",
            Self::Linux => "Linux",
            Self::Android => "Android",
            Self::Ios => "iOS",
            Self::Unknown => "Unknown",
        }
    }
}

impl Browser {
    /// Inverse of `as_str`; anything unrecognised is `Unknown`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "Chrome" => Self::Chrome,
            "Safari" => Self::Safari,
            "Firefox" => Self::Firefox,
            "Edge" => Self::Edge,
            "Opera" => Self::Opera,
            _ => Self::Unknown,
        }
    }
}

impl DeviceClass {
    /// Inverse of `as_str`; anything unrecognised is `Desktop`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "Mobile" => Self::Mobile,
            "Tablet" => Self::Tablet,
            _ => Self::Desktop,
        }
    }
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for OperatingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentInfo {
    pub browser: Browser,
    pub device: DeviceClass,
    pub os: OperatingSystem,
}

impl Default for AgentInfo {
    fn default() -> Self {
        Self {
            browser: Browser::Unknown,
            device: DeviceClass::Desktop,
            os: OperatingSystem::Unknown,
        }
    }
}

/// Classify a raw user-agent string. An empty string yields
/// `Unknown / Desktop / Unknown`.
pub fn classify(user_agent: &str) -> AgentInfo {
    let ua = user_agent.to_lowercase();
    let has = |needle: &str| ua.contains(needle);

    let browser = if has("edg") {
        Browser::Edge
    } else if has("opr") || has("opera") {
        Browser::Opera
    } else if has("chrome") {
        Browser::Chrome
    } else if has("safari") {
        Browser::Safari
    } else if has("firefox") {
        Browser::Firefox
    } else {
        Browser::Unknown
    };

    let device = if has("ipad") || has("tablet") {
        DeviceClass::Tablet
    } else if has("mobile") || has("android") || has("iphone") {
        DeviceClass::Mobile
    } else {
        DeviceClass::Desktop
    };

    let os = if has("windows") {
        OperatingSystem::Windows
    } else if has("iphone") || has("ipad") {
        OperatingSystem::Ios
    } else if has("android") {
        OperatingSystem::Android
    } else if has("mac") {
        OperatingSystem::MacOs
    } else if has("linux") {
        OperatingSystem::Linux
    } else {
        OperatingSystem::Unknown
    };

    AgentInfo {
        browser,
        device,
        os,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHROME_WIN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const EDGE_WIN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.2210.91";
    const SAFARI_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1";
    const SAFARI_IPAD: &str = "Mozilla/5.0 (iPad; CPU OS 17_1 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Mobile/15E148 Safari/604.1";
    const FIREFOX_LINUX: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0";
    const CHROME_ANDROID: &str = "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36";
    const OPERA_WIN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 OPR/106.0.0.0";

    #[test]
    fn test_empty_is_unknown_desktop() {
        let info = classify("");
        assert_eq!(info, AgentInfo::default());
        assert_eq!(info.browser, Browser::Unknown);
        assert_eq!(info.device, DeviceClass::Desktop);
        assert_eq!(info.os, OperatingSystem::Unknown);
    }

    #[test]
    fn test_edge_wins_over_chrome() {
        let info = classify(EDGE_WIN);
        assert_eq!(info.browser, Browser::Edge);
        assert_eq!(info.os, OperatingSystem::Windows);
    }

    #[test]
    fn test_safari_without_chrome() {
        let info = classify(SAFARI_MAC);
        assert_eq!(info.browser, Browser::Safari);
        assert_eq!(info.device, DeviceClass::Desktop);
        assert_eq!(info.os, OperatingSystem::MacOs);
    }

    #[test]
    fn test_chrome_is_not_safari() {
        let info = classify(CHROME_WIN);
        assert_eq!(info.browser, Browser::Chrome);
        assert_eq!(info.device, DeviceClass::Desktop);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(classify("FIREFOX").browser, Browser::Firefox);
        assert_eq!(classify("some chrome thing").browser, Browser::Chrome);
    }

    #[test]
    fn test_mobile_platforms() {
        let iphone = classify(SAFARI_IPHONE);
        assert_eq!(iphone.device, DeviceClass::Mobile);
        assert_eq!(iphone.os, OperatingSystem::Ios);

        let ipad = classify(SAFARI_IPAD);
        assert_eq!(ipad.device, DeviceClass::Tablet);
        assert_eq!(ipad.os, OperatingSystem::Ios);

        let android = classify(CHROME_ANDROID);
        assert_eq!(android.browser, Browser::Chrome);
        assert_eq!(android.device, DeviceClass::Mobile);
        assert_eq!(android.os, OperatingSystem::Android);
    }

    #[test]
    fn test_firefox_and_opera() {
        let ff = classify(FIREFOX_LINUX);
        assert_eq!(ff.browser, Browser::Firefox);
        assert_eq!(ff.os, OperatingSystem::Linux);

        assert_eq!(classify(OPERA_WIN).browser, Browser::Opera);
    }

    #[test]
    fn test_serialized_names() {
        assert_eq!(serde_json::to_string(&OperatingSystem::MacOs).unwrap(), "\"macOS\"");
        assert_eq!(serde_json::to_string(&Browser::Edge).unwrap(), "\"Edge\"");
        assert_eq!(DeviceClass::Tablet.to_string(), "Tablet");
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Browser::from_name(Browser::Edge.as_str()), Browser::Edge);
        assert_eq!(Browser::from_name("Netscape"), Browser::Unknown);
        assert_eq!(DeviceClass::from_name("Tablet"), DeviceClass::Tablet);
        assert_eq!(DeviceClass::from_name(""), DeviceClass::Desktop);
    }
}
