//! The async extraction boundary trait

use async_trait::async_trait;

use crate::descriptor::MediaDescriptor;
use crate::error::Result;

/// How an extraction should be performed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractOpts {
    /// Fetch the media itself, not only its metadata
    pub download: bool,
    /// Fully process the result (resolve collection members, pick formats);
    /// lazy extraction keeps collections skeletal and is much cheaper
    pub eager: bool,
}

impl ExtractOpts {
    /// Metadata only, collections left skeletal
    pub fn lazy() -> Self {
        Self {
            download: false,
            eager: false,
        }
    }

    /// Metadata only, collections fully processed
    pub fn eager() -> Self {
        Self {
            download: false,
            eager: true,
        }
    }

    /// Fetch the media to local storage as part of the extraction
    pub fn downloading() -> Self {
        Self {
            download: true,
            eager: true,
        }
    }
}

/// The extraction collaborator the pipeline depends on
///
/// Implementations must be safe to share across tasks; the pipeline stores
/// them as `Arc<dyn MediaExtractor>` and calls them concurrently (several
/// entries may be materializing at once).
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Extract metadata (and optionally the media itself) for a locator or
    /// free-text query
    async fn extract(&self, locator: &str, opts: ExtractOpts) -> Result<MediaDescriptor>;

    /// Stem (no extension) of the cache filename a downloading extraction
    /// of this descriptor would produce, when the implementation can
    /// predict it; used for cache-reuse checks before downloading
    fn expected_stem(&self, _descriptor: &MediaDescriptor) -> Option<String> {
        None
    }
}
