// Platform profiles - naming and directory conventions keyed by source domain

use serde::Serialize;
use url::Url;

use super::models::Quality;

/// How a profile assembles the output filename
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilenamePattern {
    /// `{title} - {uploader}.mp4`
    TitleUploader,
    /// `{prefix}{title}.mp4`
    PrefixTitle,
    /// `{prefix}{title} - {uploader}.mp4`
    PrefixTitleUploader,
    /// `{title}.mp4`
    TitleOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformProfile {
    pub name: &'static str,
    pub display_name: &'static str,
    pub directory_segment: &'static str,
    pub filename_prefix: &'static str,
    /// Hostname substrings, checked in order
    pub domain_matchers: &'static [&'static str],
    pub filename_pattern: FilenamePattern,
    pub default_quality: Quality,
}

impl PlatformProfile {
    pub fn is_fallback(&self) -> bool {
        self.name == UNKNOWN_PROFILE.name
    }

    fn matches_host(&self, host: &str) -> bool {
        self.domain_matchers.iter().any(|m| host.contains(m))
    }
}

/// Declaration order is match order.
static PROFILES: &[PlatformProfile] = &[
    PlatformProfile {
        name: "youtube",
        display_name: "YouTube",
        directory_segment: "youtube",
        filename_prefix: "",
        domain_matchers: &["youtube.com", "youtu.be", "youtube-nocookie.com"],
        filename_pattern: FilenamePattern::TitleUploader,
        default_quality: Quality::P1080,
    },
    PlatformProfile {
        name: "vimeo",
        display_name: "Vimeo",
        directory_segment: "vimeo",
        filename_prefix: "",
        domain_matchers: &["vimeo.com"],
        filename_pattern: FilenamePattern::TitleOnly,
        default_quality: Quality::Best,
    },
    PlatformProfile {
        name: "twitter",
        display_name: "Twitter / X",
        directory_segment: "twitter",
        filename_prefix: "[X] ",
        domain_matchers: &["twitter.com", "x.com"],
        filename_pattern: FilenamePattern::PrefixTitleUploader,
        default_quality: Quality::Best,
    },
    PlatformProfile {
        name: "tiktok",
        display_name: "TikTok",
        directory_segment: "tiktok",
        filename_prefix: "[TikTok] ",
        domain_matchers: &["tiktok.com"],
        filename_pattern: FilenamePattern::PrefixTitle,
        default_quality: Quality::Best,
    },
    PlatformProfile {
        name: "twitch",
        display_name: "Twitch",
        directory_segment: "twitch",
        filename_prefix: "",
        domain_matchers: &["twitch.tv"],
        filename_pattern: FilenamePattern::TitleUploader,
        default_quality: Quality::P720,
    },
    PlatformProfile {
        name: "dailymotion",
        display_name: "Dailymotion",
        directory_segment: "dailymotion",
        filename_prefix: "",
        domain_matchers: &["dailymotion.com", "dai.ly"],
        filename_pattern: FilenamePattern::TitleUploader,
        default_quality: Quality::Best,
    },
];

pub static UNKNOWN_PROFILE: PlatformProfile = PlatformProfile {
    name: "unknown",
    display_name: "Unknown",
    directory_segment: "downloads",
    filename_prefix: "",
    domain_matchers: &[],
    filename_pattern: FilenamePattern::TitleUploader,
    default_quality: Quality::Best,
};

/// Resolve a URL to its profile. Never fails.
pub fn resolve(url: &str) -> &'static PlatformProfile {
    resolve_host(url).0
}

/// Resolve a URL to its profile together with the cleaned host that was matched.
///
/// Malformed input yields the fallback profile with the domain `"invalid"`.
pub fn resolve_host(url: &str) -> (&'static PlatformProfile, String) {
    let host = match clean_host(url) {
        Some(host) => host,
        None => return (&UNKNOWN_PROFILE, "invalid".to_string()),
    };

    let profile = PROFILES
        .iter()
        .find(|p| p.matches_host(&host))
        .unwrap_or(&UNKNOWN_PROFILE);

    (profile, host)
}

pub fn is_supported(url: &str) -> bool {
    !resolve(url).is_fallback()
}

/// Supported profiles, fallback excluded
pub fn list_profiles() -> &'static [PlatformProfile] {
    PROFILES
}

fn clean_host(url: &str) -> Option<String> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parsed = match Url::parse(trimmed) {
        Ok(u) if u.host_str().is_some() => u,
        // Bare hosts such as "youtu.be/abc" parse as relative or opaque URLs
        _ => Url::parse(&format!("https://{}", trimmed)).ok()?,
    };

    let host = parsed.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}
