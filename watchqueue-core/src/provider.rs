//! Seam to the external media catalog.
//!
//! The core never resolves titles, durations or aspect ratios itself; it
//! stores and forwards whatever the configured provider returns.

use async_trait::async_trait;

use crate::models::ResolvedMedia;
use crate::Result;

/// External media metadata collaborator.
///
/// `canonicalize` runs inside the accepting request and must be fast;
/// `resolve` may hit the network and is only ever called from the detached
/// add task.
#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Normalize a user-supplied reference to its canonical URL
    async fn canonicalize(&self, url: &str) -> Result<String>;

    /// Look up display metadata for a canonical URL
    async fn resolve(&self, url: &str) -> Result<ResolvedMedia>;
}

/// Pass-through provider: the URL is the media.
///
/// Deployments are expected to plug in a real catalog client; this default
/// keeps a bare installation functional.
#[derive(Debug, Default, Clone)]
pub struct DirectUrlProvider;

#[async_trait]
impl MediaProvider for DirectUrlProvider {
    async fn canonicalize(&self, url: &str) -> Result<String> {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(crate::Error::InvalidInput(
                "Media URL must not be empty".to_string(),
            ));
        }
        Ok(trimmed.to_string())
    }

    async fn resolve(&self, url: &str) -> Result<ResolvedMedia> {
        Ok(ResolvedMedia {
            title: url.to_string(),
            artist: String::new(),
            duration_seconds: 0,
            aspect_ratio: "16/9".to_string(),
            kind: "video".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_direct_url_provider() {
        let provider = DirectUrlProvider;
        let url = provider.canonicalize("  https://example.com/a.mp4 ").await.unwrap();
        assert_eq!(url, "https://example.com/a.mp4");

        let resolved = provider.resolve(&url).await.unwrap();
        assert_eq!(resolved.title, url);

        assert!(provider.canonicalize("   ").await.is_err());
    }
}
