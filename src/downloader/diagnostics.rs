// Failure diagnostics - classifies yt-dlp stderr into a known failure reason
//
// Only used to enrich error messages; never changes whether a job succeeded.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// HTTP 403 Forbidden
    Forbidden,

    /// 429 or similar throttling by the platform
    RateLimited,

    GeoBlocked,

    /// Private video requiring authorization
    PrivateVideo,

    /// Deleted, removed or otherwise gone
    VideoUnavailable,

    /// Requires login to confirm age
    AgeRestricted,

    /// DRM, paid or premium content. Permanent, no workaround.
    DrmProtected,

    /// Timeouts, refused connections, DNS failures
    Network,

    UnsupportedUrl,

    Unknown,
}

impl FailureReason {
    /// Whether retrying the same request later could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Forbidden | Self::RateLimited | Self::Network)
    }

    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::DrmProtected | Self::VideoUnavailable | Self::UnsupportedUrl
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Forbidden => "access denied (HTTP 403)",
            Self::RateLimited => "rate limited by the platform",
            Self::GeoBlocked => "not available in this region",
            Self::PrivateVideo => "private video",
            Self::VideoUnavailable => "video unavailable",
            Self::AgeRestricted => "age-restricted content",
            Self::DrmProtected => "DRM-protected content",
            Self::Network => "network error",
            Self::UnsupportedUrl => "unsupported URL",
            Self::Unknown => "unknown failure",
        }
    }
}

/// Classify an error text. `None` for empty input.
pub fn diagnose(stderr: &str) -> Option<FailureReason> {
    if stderr.trim().is_empty() {
        return None;
    }
    let lower = stderr.to_lowercase();
    let any = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    // Order matters: most specific first
    let reason = if any(&[
        "drm",
        "widevine",
        "playready",
        "fairplay",
        "requires purchase",
        "this video requires payment",
    ]) {
        FailureReason::DrmProtected
    } else if any(&["unsupported url"]) {
        FailureReason::UnsupportedUrl
    } else if any(&["sign in to confirm your age", "age-restricted", "age_verification"]) {
        FailureReason::AgeRestricted
    } else if any(&["private video", "video is private"]) {
        FailureReason::PrivateVideo
    } else if any(&[
        "video unavailable",
        "video has been removed",
        "no longer available",
        "http error 404",
    ]) {
        FailureReason::VideoUnavailable
    } else if any(&[
        "not available in your country",
        "blocked in your country",
        "geo restricted",
        "geo-restricted",
    ]) {
        FailureReason::GeoBlocked
    } else if any(&["429", "rate limit", "too many requests"]) {
        FailureReason::RateLimited
    } else if any(&["403", "forbidden"]) {
        FailureReason::Forbidden
    } else if any(&[
        "timed out",
        "timeout",
        "connection refused",
        "connection reset",
        "network is unreachable",
        "name or service not known",
        "temporary failure in name resolution",
    ]) {
        FailureReason::Network
    } else {
        FailureReason::Unknown
    };
    Some(reason)
}

/// First `ERROR:` line of the output, or the last non-empty line
pub fn primary_error_line(stderr: &str) -> Option<&str> {
    let mut lines = stderr.lines().map(str::trim).filter(|l| !l.is_empty());
    let last = lines.clone().last();
    lines
        .find(|l| l.to_lowercase().starts_with("error:"))
        .or(last)
}

/// Human-readable detail for a failed run: the key stderr line, tagged with
/// the classified reason and whether retrying can help.
pub fn failure_detail(stderr: &str) -> String {
    let line = primary_error_line(stderr).unwrap_or_default();
    let reason = match diagnose(stderr) {
        Some(FailureReason::Unknown) | None => return line.to_string(),
        Some(reason) => reason,
    };
    if reason.is_retryable() {
        format!("{} ({}, may succeed on retry)", line, reason.description())
    } else if reason.is_permanent() {
        format!("{} ({}, permanent)", line, reason.description())
    } else {
        format!("{} ({})", line, reason.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_403_detection() {
        let error = "ERROR: HTTP Error 403: Forbidden";
        assert_eq!(diagnose(error), Some(FailureReason::Forbidden));
    }

    #[test]
    fn test_rate_limit_detection() {
        let error = "ERROR: HTTP Error 429: Too Many Requests";
        assert_eq!(diagnose(error), Some(FailureReason::RateLimited));
    }

    #[test]
    fn test_geo_detection() {
        let error = "Video not available in your country";
        assert_eq!(diagnose(error), Some(FailureReason::GeoBlocked));
    }

    #[test]
    fn test_age_detection() {
        let error = "ERROR: Sign in to confirm your age";
        assert_eq!(diagnose(error), Some(FailureReason::AgeRestricted));
    }

    #[test]
    fn test_drm_detection() {
        assert_eq!(
            diagnose("This video is DRM protected"),
            Some(FailureReason::DrmProtected)
        );
        assert!(FailureReason::DrmProtected.is_permanent());
        assert!(!FailureReason::DrmProtected.is_retryable());
    }

    #[test]
    fn test_network_detection() {
        let error = "ERROR: Unable to download webpage: <urlopen error timed out>";
        assert_eq!(diagnose(error), Some(FailureReason::Network));
        assert!(FailureReason::Network.is_retryable());
    }

    #[test]
    fn test_empty_and_unknown() {
        assert_eq!(diagnose("   "), None);
        assert_eq!(diagnose("something odd"), Some(FailureReason::Unknown));
    }

    #[test]
    fn test_failure_detail() {
        let stderr = "[youtube] abc: Downloading webpage\nERROR: [youtube] abc: Private video\nmore";
        assert_eq!(
            failure_detail(stderr),
            "ERROR: [youtube] abc: Private video (private video)"
        );
        assert_eq!(
            failure_detail("ERROR: HTTP Error 429: Too Many Requests"),
            "ERROR: HTTP Error 429: Too Many Requests (rate limited by the platform, may succeed on retry)"
        );
        assert_eq!(
            failure_detail("ERROR: [generic] Unsupported URL: https://x.test/"),
            "ERROR: [generic] Unsupported URL: https://x.test/ (unsupported URL, permanent)"
        );
        assert_eq!(failure_detail("just noise"), "just noise");
        assert_eq!(failure_detail(""), "");
    }
}
