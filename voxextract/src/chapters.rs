//! Chapter discovery for single media items
//!
//! Long uploads (albums, mixes, compilations) often carry a track listing:
//! either as a native chapter array in the descriptor, or as timestamp
//! lines inside the free-text description ("03:12 Second Song"). Both are
//! turned into the same [`Chapter`] shape here; the entry layer uses them
//! to expose a derived sub-queue on a single download unit.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::descriptor::{MediaDescriptor, UNTITLED};

/// One chapter of a larger media item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub title: String,
    pub start_seconds: f64,
    /// End of the chapter; `None` for the last one when the total duration
    /// is unknown
    pub end_seconds: Option<f64>,
}

/// A listing is only trusted once it names at least this many chapters
const MIN_CHAPTERS: usize = 2;

/// Detect chapters on a descriptor
///
/// The native chapter array wins when present; otherwise the description
/// text is scanned for a timestamp listing. Returns `None` when neither
/// yields a usable listing.
pub fn detect_chapters(descriptor: &MediaDescriptor) -> Option<Vec<Chapter>> {
    if let Some(raw) = &descriptor.chapters {
        if raw.len() >= MIN_CHAPTERS {
            let chapters = raw
                .iter()
                .map(|chapter| Chapter {
                    title: chapter
                        .title
                        .clone()
                        .filter(|t| !t.trim().is_empty())
                        .unwrap_or_else(|| UNTITLED.to_string()),
                    start_seconds: chapter.start_time,
                    end_seconds: chapter.end_time,
                })
                .collect();
            return Some(chapters);
        }
    }
    let description = descriptor.description.as_deref()?;
    parse_timestamp_listing(description, descriptor.duration)
}

/// Parse a timestamp listing out of free text
///
/// Supports the two common layouts: timestamp first ("00:00 Intro",
/// "[1:02:03] - Finale") and timestamp last ("Intro 0:00"). Lines that
/// match neither are ignored. The listing is accepted only if it yields at
/// least [`MIN_CHAPTERS`] chapters with strictly increasing start times
/// inside the total duration (when known).
pub fn parse_timestamp_listing(text: &str, total_duration: Option<f64>) -> Option<Vec<Chapter>> {
    let leading = Regex::new(r"^[\s\[\(]*((?:\d{1,2}:)?\d{1,2}:\d{2})[\]\)]*[\s\-–—:.·|]*(\S.*?)\s*$").ok()?;
    let trailing = Regex::new(r"^\s*(\S.*?)[\s\-–—:.·|\[\(]*((?:\d{1,2}:)?\d{1,2}:\d{2})[\]\)\s]*$").ok()?;

    let mut stamps: Vec<(f64, String)> = Vec::new();
    for line in text.lines() {
        if let Some(caps) = leading.captures(line) {
            if let Some(seconds) = parse_clock(&caps[1]) {
                stamps.push((seconds, caps[2].trim().to_string()));
            }
        }
    }
    if stamps.is_empty() {
        for line in text.lines() {
            if let Some(caps) = trailing.captures(line) {
                if let Some(seconds) = parse_clock(&caps[2]) {
                    stamps.push((seconds, caps[1].trim().to_string()));
                }
            }
        }
    }

    stamps.retain(|(_, title)| !title.is_empty() && parse_clock(title).is_none());
    if let Some(total) = total_duration {
        if total > 0.0 {
            stamps.retain(|(start, _)| *start < total);
        }
    }
    stamps.sort_by(|a, b| a.0.total_cmp(&b.0));
    stamps.dedup_by(|a, b| a.0 == b.0);
    if stamps.len() < MIN_CHAPTERS {
        return None;
    }

    let mut chapters = Vec::with_capacity(stamps.len());
    for (index, (start, title)) in stamps.iter().enumerate() {
        let end = match stamps.get(index + 1) {
            Some((next_start, _)) => Some(*next_start),
            None => total_duration.filter(|total| total > start),
        };
        chapters.push(Chapter {
            title: title.clone(),
            start_seconds: *start,
            end_seconds: end,
        });
    }
    Some(chapters)
}

/// Parse `mm:ss` / `hh:mm:ss` into seconds
fn parse_clock(text: &str) -> Option<f64> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return None;
    }
    let mut seconds = 0u64;
    for (index, part) in parts.iter().enumerate() {
        let value: u64 = part.parse().ok()?;
        if index > 0 && value >= 60 {
            return None;
        }
        seconds = seconds * 60 + value;
    }
    Some(seconds as f64)
}
