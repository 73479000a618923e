//! Image lookup.
//!
//! Template images are never pulled by the deployer; they must already be present on
//! the runtime. Resolution happens against the local image listing.

use crate::container::{ContainerRuntime, Result};
use tracing::debug;

/// Image information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    /// Image ID
    pub id: String,
    /// Repository tags
    pub repo_tags: Vec<String>,
    /// Size in bytes
    pub size: i64,
    /// Creation timestamp
    pub created: i64,
}

impl ImageInfo {
    /// Whether one of the image's repository tags is exactly `tag`.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.repo_tags.iter().any(|t| t == tag)
    }
}

/// Resolve a repository tag (`name:tag`) to a local image.
///
/// Returns `Ok(None)` when no local image carries the tag.
///
/// # Errors
///
/// Returns error if the image listing fails.
pub async fn resolve_image(runtime: &dyn ContainerRuntime, tag: &str) -> Result<Option<ImageInfo>> {
    let images = runtime.list_images().await?;
    debug!("Searching {} images for tag {}", images.len(), tag);

    Ok(images.into_iter().find(|image| image.has_tag(tag)))
}
