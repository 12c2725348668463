//! Outils partagés des tests unitaires

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use voxextract::{ExtractOpts, MediaDescriptor, MediaExtractor};

use crate::entry::EntryDeps;

/// Extracteur factice: répond toujours, compte ses appels
#[derive(Default)]
pub(crate) struct StubExtractor {
    pub calls: AtomicUsize,
}

#[async_trait]
impl MediaExtractor for StubExtractor {
    async fn extract(
        &self,
        locator: &str,
        _opts: ExtractOpts,
    ) -> voxextract::Result<MediaDescriptor> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(MediaDescriptor {
            title: Some(locator.to_string()),
            webpage_url: Some(locator.to_string()),
            ..Default::default()
        })
    }
}

pub(crate) fn deps_with(extractor: impl MediaExtractor + 'static) -> EntryDeps {
    EntryDeps::new(Arc::new(extractor), std::env::temp_dir())
}
