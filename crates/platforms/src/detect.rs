//! Platform detection from meeting URLs.

use url::Url;

use cs_domain::error::{Error, Result};
use cs_domain::types::Platform;

/// Detect the platform from a meeting URL's domain.
///
/// Fails synchronously on an unrecognized domain before any state is
/// mutated.
pub fn detect_platform(meeting_url: &str) -> Result<Platform> {
    let parsed = Url::parse(meeting_url)
        .map_err(|e| Error::Validation(format!("invalid meeting URL {meeting_url}: {e}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| Error::Validation(format!("meeting URL {meeting_url} has no host")))?
        .to_lowercase();

    if host == "meet.google.com" {
        Ok(Platform::Meet)
    } else if host == "teams.microsoft.com" || host == "teams.live.com" {
        Ok(Platform::Teams)
    } else if host == "zoom.us" || host == "zoom.com" || host.ends_with(".zoom.us") {
        Ok(Platform::Zoom)
    } else {
        Err(Error::Validation(format!(
            "unsupported meeting platform: {host}"
        )))
    }
}

/// Resolve the effective platform: an explicit override wins over the URL.
pub fn resolve_platform(meeting_url: &str, platform: Option<Platform>) -> Result<Platform> {
    match platform {
        Some(p) => Ok(p),
        None => detect_platform(meeting_url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_known_domains() {
        assert_eq!(
            detect_platform("https://meet.google.com/abc-defg-hij").unwrap(),
            Platform::Meet
        );
        assert_eq!(
            detect_platform("https://teams.microsoft.com/l/meetup-join/xyz").unwrap(),
            Platform::Teams
        );
        assert_eq!(
            detect_platform("https://teams.live.com/meet/123").unwrap(),
            Platform::Teams
        );
        assert_eq!(
            detect_platform("https://zoom.us/j/5551112222").unwrap(),
            Platform::Zoom
        );
        assert_eq!(
            detect_platform("https://us02web.zoom.us/j/5551112222").unwrap(),
            Platform::Zoom
        );
    }

    #[test]
    fn rejects_unknown_domains() {
        let err = detect_platform("https://webex.com/meet/x").unwrap_err();
        assert!(err.to_string().contains("unsupported meeting platform"));
        assert!(detect_platform("not a url").is_err());
    }

    #[test]
    fn override_wins_over_url() {
        let resolved =
            resolve_platform("https://meet.google.com/abc", Some(Platform::Zoom)).unwrap();
        assert_eq!(resolved, Platform::Zoom);
    }
}
