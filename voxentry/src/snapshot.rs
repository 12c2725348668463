//! Représentation persistée des entrées
//!
//! Un instantané conserve tout ce qu'il faut pour reconstruire une entrée
//! équivalente: localisateur, titre, durée, fenêtre de découpe, chapitres,
//! catalogue et métadonnées applicatives. La ressource locale n'est jamais
//! persistée; elle est re-dérivée à la prochaine préparation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use voxextract::Chapter;

use crate::entry::{CatalogueInfo, Entry, EntryDeps, EntryKind, EntryMeta, EntrySeed, TrimWindow};

/// Genre d'entrée, côté persistance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    Standard,
    Stream,
    Chaptered,
}

/// Forme sérialisable d'une entrée
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntrySnapshot {
    pub kind: SnapshotKind,
    pub locator: String,
    pub title: String,
    #[serde(default)]
    pub duration: f64,
    #[serde(default, skip_serializing_if = "TrimWindow::is_whole")]
    pub trim: TrimWindow,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chapters: Vec<Chapter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalogue: Option<CatalogueInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    #[serde(default, skip_serializing_if = "EntryMeta::is_empty")]
    pub meta: EntryMeta,
}

impl Entry {
    /// Capture l'état sérialisable de l'entrée
    pub fn snapshot(&self) -> EntrySnapshot {
        let (kind, chapters, fallback) = match self.kind() {
            EntryKind::Standard { .. } => (SnapshotKind::Standard, Vec::new(), None),
            EntryKind::Chaptered { chapters, .. } => {
                (SnapshotKind::Chaptered, chapters.clone(), None)
            }
            EntryKind::Stream { fallback } => (SnapshotKind::Stream, Vec::new(), fallback.clone()),
        };
        EntrySnapshot {
            kind,
            locator: self.locator().to_string(),
            title: self.title(),
            duration: self.duration(),
            trim: self.trim(),
            chapters,
            catalogue: self.catalogue().cloned(),
            fallback,
            meta: self.meta().clone(),
        }
    }
}

impl EntrySnapshot {
    /// Reconstruit une entrée non préparée
    ///
    /// Le radical de cache n'étant pas persisté, la première préparation
    /// retélécharge le média au lieu de chercher une copie locale.
    pub fn into_entry(self, deps: EntryDeps) -> Arc<Entry> {
        let seed = EntrySeed {
            locator: self.locator,
            title: self.title,
            duration: self.duration,
            meta: self.meta,
            catalogue: self.catalogue,
        };
        let entry = match self.kind {
            SnapshotKind::Standard => Entry::standard(seed, None, false, deps),
            SnapshotKind::Chaptered => Entry::chaptered(seed, None, false, self.chapters, deps),
            SnapshotKind::Stream => Entry::stream(seed, self.fallback, deps),
        };
        entry.restore_trim(self.trim);
        entry
    }
}
