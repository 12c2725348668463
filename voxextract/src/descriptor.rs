//! Structured descriptor model for extraction results
//!
//! The extraction service answers every request with a loosely-typed JSON
//! document. This module pins down the fields the pipeline actually
//! consumes and isolates the string-sniffing needed to tell search
//! redirects, collections and single items apart ([`classify`]) so nothing
//! else in the workspace ever pattern-matches descriptor strings directly.

use serde::{Deserialize, Serialize};

/// Prefix of the search pseudo-scheme the extraction service reports when
/// it was handed free text instead of a locator (`ytsearch:piano medley`)
pub const SEARCH_SCHEME_PREFIX: &str = "ytsearch";

/// Collection marker used in skeletal playlist descriptors
pub const COLLECTION_TYPE: &str = "playlist";

/// Title used when the source reports none
pub const UNTITLED: &str = "Untitled";

/// One chapter as reported natively by the extraction service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChapter {
    #[serde(default)]
    pub start_time: f64,
    #[serde(default)]
    pub end_time: Option<f64>,
    #[serde(default)]
    pub title: Option<String>,
}

/// Download record attached by a downloading extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestedDownload {
    /// Final on-disk path after post-processing
    #[serde(default)]
    pub filepath: Option<String>,
    #[serde(default, alias = "_filename")]
    pub filename: Option<String>,
}

/// Structured metadata for one extraction result
///
/// Unknown fields in the service's JSON are ignored; everything here is
/// optional because the service fills fields on a best-effort basis
/// (skeletal collection members carry little more than a locator).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaDescriptor {
    pub id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub webpage_url: Option<String>,
    /// Duration in seconds; absent for live streams and skeletal members
    pub duration: Option<f64>,
    /// Direct-playable hint; may carry the search pseudo-scheme
    pub url: Option<String>,
    /// Member descriptors, present iff this describes a collection
    pub entries: Option<Vec<MediaDescriptor>>,
    /// Source-site identifier (e.g. "youtube", "generic")
    pub extractor: Option<String>,
    /// Result type marker; `"playlist"` on skeletal collection results
    #[serde(rename = "_type")]
    pub entry_type: Option<String>,
    /// Native chapter list, when the source provides one
    pub chapters: Option<Vec<RawChapter>>,
    /// Filename recorded by a downloading extraction (legacy key)
    #[serde(alias = "_filename")]
    pub filename: Option<String>,
    /// Download records from a downloading extraction
    pub requested_downloads: Option<Vec<RequestedDownload>>,
}

impl MediaDescriptor {
    /// Display title, falling back to [`UNTITLED`]
    pub fn display_title(&self) -> String {
        match self.title.as_deref() {
            Some(t) if !t.trim().is_empty() => t.to_string(),
            _ => UNTITLED.to_string(),
        }
    }

    /// Canonical locator for re-resolution: the page URL when known,
    /// else the direct URL, else the bare id
    pub fn canonical_locator(&self) -> Option<&str> {
        self.webpage_url
            .as_deref()
            .or(self.url.as_deref())
            .or(self.id.as_deref())
    }

    /// Duration in seconds, `0.0` when unknown
    pub fn duration_seconds(&self) -> f64 {
        self.duration.unwrap_or(0.0)
    }

    /// Whether this result came from the catch-all "generic" extractor
    /// (direct file URLs with no site-specific handling)
    pub fn is_generic(&self) -> bool {
        self.extractor
            .as_deref()
            .is_some_and(|e| e.eq_ignore_ascii_case("generic"))
    }

    /// Locators of all collection members that carry one
    pub fn member_locators(&self) -> Vec<String> {
        let Some(entries) = &self.entries else {
            return Vec::new();
        };
        entries
            .iter()
            .filter_map(|member| member.canonical_locator())
            .filter(|locator| !locator.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// On-disk path recorded by a downloading extraction, if any
    pub fn local_path(&self) -> Option<&str> {
        if let Some(downloads) = &self.requested_downloads {
            for record in downloads {
                if let Some(path) = record.filepath.as_deref().or(record.filename.as_deref()) {
                    return Some(path);
                }
            }
        }
        self.filename.as_deref()
    }
}

/// What a descriptor turned out to be, from the resolver's point of view
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    /// The input was free text; `query` is the search pseudo-locator to
    /// re-run in eager mode
    Search { query: String },
    /// A collection with materialized member locators
    Collection { members: Vec<String> },
    /// A collection marker without members; re-extract eagerly at the
    /// corrected locator (when one is known)
    CollectionSkeleton { corrected: Option<String> },
    /// A plain single item
    Single,
}

/// Classify a descriptor
///
/// This is the only function in the workspace allowed to sniff the
/// descriptor's opaque string fields.
pub fn classify(descriptor: &MediaDescriptor) -> Classified {
    if let Some(url) = descriptor.url.as_deref() {
        if url.starts_with(SEARCH_SCHEME_PREFIX) {
            return Classified::Search {
                query: url.to_string(),
            };
        }
    }
    if descriptor.entries.is_some() {
        return Classified::Collection {
            members: descriptor.member_locators(),
        };
    }
    if descriptor.entry_type.as_deref() == Some(COLLECTION_TYPE) {
        return Classified::CollectionSkeleton {
            corrected: descriptor.canonical_locator().map(str::to_owned),
        };
    }
    Classified::Single
}
