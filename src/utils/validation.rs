//! URL and input validation utilities

use anyhow::{anyhow, Result};
use url::Url;

/// Check if URL is an http(s) URL
pub fn is_valid_video_url(url: &str) -> bool {
    if let Ok(parsed) = Url::parse(url) {
        let scheme = parsed.scheme();
        scheme == "http" || scheme == "https"
    } else {
        false
    }
}

/// A playlist locator is either an http(s) URL or a bare playlist id
pub fn validate_playlist_locator(locator: &str) -> Result<()> {
    let locator = locator.trim();
    if locator.is_empty() {
        return Err(anyhow!("Playlist locator must not be empty"));
    }
    if is_valid_video_url(locator) {
        return Ok(());
    }
    if locator.contains("://") {
        return Err(anyhow!("Unsupported playlist URL: {}", locator));
    }
    if !locator
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(anyhow!("Invalid playlist id: {}", locator));
    }
    Ok(())
}

/// URL handed to the listing tool for a locator
pub fn playlist_url(locator: &str) -> String {
    let locator = locator.trim();
    if is_valid_video_url(locator) {
        locator.to_string()
    } else {
        format!("https://www.youtube.com/playlist?list={}", locator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_urls() {
        assert!(is_valid_video_url("https://www.youtube.com/watch?v=abc"));
        assert!(!is_valid_video_url("ftp://host/file"));
        assert!(!is_valid_video_url("not a url"));
    }

    #[test]
    fn test_playlist_locators() {
        assert!(validate_playlist_locator("PLrAXtmErZgOeiKm4sgNOknGvNjby9efdf").is_ok());
        assert!(validate_playlist_locator("https://www.youtube.com/playlist?list=PL1").is_ok());
        assert!(validate_playlist_locator("  ").is_err());
        assert!(validate_playlist_locator("ftp://x/y").is_err());
        assert!(validate_playlist_locator("has spaces").is_err());

        assert_eq!(
            playlist_url("PL1"),
            "https://www.youtube.com/playlist?list=PL1"
        );
        assert_eq!(playlist_url("https://x.test/list"), "https://x.test/list");
    }
}
