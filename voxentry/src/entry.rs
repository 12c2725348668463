//! Modèle d'entrée de lecture
//!
//! Une [`Entry`] décrit un média jouable: son localisateur stable, son titre,
//! sa durée, une fenêtre de lecture optionnelle et une ressource locale
//! peuplée paresseusement (fichier téléchargé, ou URL directe pour les flux).
//! Les variantes sont portées par [`EntryKind`]; la ressource locale par
//! [`LocalResource`], car sa propriété diffère selon la variante (chemin de
//! fichier pour un téléchargement, URL résolue pour un flux).
//!
//! Deux entrées sont égales si et seulement si elles sont la même instance:
//! l'identité est un [`EntryId`] unique, jamais le contenu.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use voxextract::{Chapter, MediaExtractor};

use crate::error::{EntryError, Result};
use crate::ready::ReadySignal;

/// Longueur maximale d'un titre de remplacement
pub const MAX_TITLE_LEN: usize = 300;

/// Contexte libre attaché à une entrée à sa création (playlist d'origine,
/// demandeur, canal d'origine). Jamais modifié par le pipeline.
pub type EntryMeta = serde_json::Map<String, serde_json::Value>;

/// Identité d'une entrée (identité de référence, pas de contenu)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(pub Uuid);

impl EntryId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Fenêtre de lecture `[start, end)` en secondes
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TrimWindow {
    pub start: Option<f64>,
    pub end: Option<f64>,
}

impl TrimWindow {
    /// Aucune borne posée
    pub fn is_whole(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Variante d'une entrée
#[derive(Debug, Clone)]
pub enum EntryKind {
    /// Fichier média ordinaire, téléchargé une fois
    Standard {
        /// Radical attendu du fichier en cache (sans extension), quand
        /// l'extracteur sait le prédire
        expected_stem: Option<String>,
        /// Vérifier la taille distante avant de réutiliser le cache
        /// (origines sans garantie de stabilité de taille)
        verify_size: bool,
    },
    /// Fichier ordinaire dont le média contient des chapitres nommés;
    /// reste une seule unité de téléchargement
    Chaptered {
        expected_stem: Option<String>,
        verify_size: bool,
        chapters: Vec<Chapter>,
    },
    /// Flux continu sans durée; « télécharger » signifie résoudre une URL
    /// directe valide
    Stream {
        /// Destination de repli fournie à la construction
        fallback: Option<String>,
    },
}

/// Ressource locale d'une entrée prête
#[derive(Debug, Clone, PartialEq)]
pub enum LocalResource {
    /// Fichier téléchargé
    File(PathBuf),
    /// URL directe résolue d'un flux
    StreamUrl(String),
}

impl LocalResource {
    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path),
            Self::StreamUrl(_) => None,
        }
    }

    pub fn as_url(&self) -> Option<&str> {
        match self {
            Self::File(_) => None,
            Self::StreamUrl(url) => Some(url),
        }
    }
}

/// Métadonnées de catalogue externes, purement décoratives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogueInfo {
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
    /// Confiance de l'appariement, dans `[0, 1]`
    #[serde(default)]
    pub confidence: f64,
}

/// Données communes de construction d'une entrée
#[derive(Debug, Clone, Default)]
pub struct EntrySeed {
    pub locator: String,
    pub title: String,
    pub duration: f64,
    pub meta: EntryMeta,
    pub catalogue: Option<CatalogueInfo>,
}

/// Collaborateurs injectés dans chaque entrée
#[derive(Clone)]
pub struct EntryDeps {
    pub extractor: Arc<dyn MediaExtractor>,
    pub downloads_dir: PathBuf,
}

impl EntryDeps {
    pub fn new(extractor: Arc<dyn MediaExtractor>, downloads_dir: impl Into<PathBuf>) -> Self {
        Self {
            extractor,
            downloads_dir: downloads_dir.into(),
        }
    }
}

/// Une entrée de lecture
pub struct Entry {
    id: EntryId,
    locator: String,
    kind: EntryKind,
    catalogue: Option<CatalogueInfo>,
    meta: EntryMeta,
    duration: f64,
    title: RwLock<String>,
    trim: RwLock<TrimWindow>,
    resource: RwLock<Option<LocalResource>>,
    pub(crate) ready: ReadySignal,
    pub(crate) extractor: Arc<dyn MediaExtractor>,
    pub(crate) downloads_dir: PathBuf,
}

impl Entry {
    fn new(seed: EntrySeed, kind: EntryKind, deps: EntryDeps) -> Arc<Self> {
        Arc::new(Self {
            id: EntryId::new(),
            locator: seed.locator,
            kind,
            catalogue: seed.catalogue,
            meta: seed.meta,
            duration: seed.duration,
            title: RwLock::new(seed.title),
            trim: RwLock::new(TrimWindow::default()),
            resource: RwLock::new(None),
            ready: ReadySignal::new(),
            extractor: deps.extractor,
            downloads_dir: deps.downloads_dir,
        })
    }

    /// Entrée standard (un fichier téléchargeable)
    pub fn standard(
        seed: EntrySeed,
        expected_stem: Option<String>,
        verify_size: bool,
        deps: EntryDeps,
    ) -> Arc<Self> {
        Self::new(
            seed,
            EntryKind::Standard {
                expected_stem,
                verify_size,
            },
            deps,
        )
    }

    /// Entrée chapitrée (un fichier, plusieurs chapitres affichables)
    pub fn chaptered(
        seed: EntrySeed,
        expected_stem: Option<String>,
        verify_size: bool,
        chapters: Vec<Chapter>,
        deps: EntryDeps,
    ) -> Arc<Self> {
        Self::new(
            seed,
            EntryKind::Chaptered {
                expected_stem,
                verify_size,
                chapters,
            },
            deps,
        )
    }

    /// Entrée de flux continu
    pub fn stream(seed: EntrySeed, fallback: Option<String>, deps: EntryDeps) -> Arc<Self> {
        Self::new(seed, EntryKind::Stream { fallback }, deps)
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn kind(&self) -> &EntryKind {
        &self.kind
    }

    pub fn is_stream(&self) -> bool {
        matches!(self.kind, EntryKind::Stream { .. })
    }

    /// Chapitres dérivés, pour l'affichage d'une sous-file
    pub fn chapters(&self) -> Option<&[Chapter]> {
        match &self.kind {
            EntryKind::Chaptered { chapters, .. } => Some(chapters),
            _ => None,
        }
    }

    /// Chapitre couvrant la position donnée (en secondes)
    pub fn chapter_at(&self, seconds: f64) -> Option<&Chapter> {
        let chapters = self.chapters()?;
        chapters
            .iter()
            .rev()
            .find(|chapter| {
                chapter.start_seconds <= seconds
                    && chapter.end_seconds.is_none_or(|end| seconds < end)
            })
    }

    pub fn catalogue(&self) -> Option<&CatalogueInfo> {
        self.catalogue.as_ref()
    }

    pub fn meta(&self) -> &EntryMeta {
        &self.meta
    }

    /// Titre affiché (le catalogue, purement décoratif, ne le remplace pas)
    pub fn title(&self) -> String {
        self.title.read().unwrap().clone()
    }

    /// Remplace le titre affiché
    pub fn set_title(&self, title: impl Into<String>) -> Result<()> {
        let title = title.into();
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Err(EntryError::invalid_title("empty title"));
        }
        if trimmed.chars().count() > MAX_TITLE_LEN {
            return Err(EntryError::invalid_title(format!(
                "longer than {MAX_TITLE_LEN} characters"
            )));
        }
        *self.title.write().unwrap() = trimmed.to_string();
        Ok(())
    }

    /// Durée en secondes, 0 si inconnue (flux)
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn trim(&self) -> TrimWindow {
        *self.trim.read().unwrap()
    }

    pub fn start_seconds(&self) -> Option<f64> {
        self.trim().start
    }

    pub fn end_seconds(&self) -> Option<f64> {
        self.trim().end
    }

    /// Fin effective de lecture: la borne de fenêtre, sinon la durée
    pub fn effective_end(&self) -> f64 {
        let trim = self.trim();
        trim.end.unwrap_or(self.duration)
    }

    /// Longueur effectivement jouée, fenêtre appliquée
    pub fn effective_length(&self) -> f64 {
        let trim = self.trim();
        (trim.end.unwrap_or(self.duration) - trim.start.unwrap_or(0.0)).max(0.0)
    }

    /// Déplace le début de la fenêtre de lecture
    ///
    /// Refusé si la nouvelle borne atteint ou dépasse la fin effective;
    /// dans ce cas la fenêtre reste inchangée.
    pub fn set_start(&self, seconds: f64) -> Result<()> {
        if seconds < 0.0 {
            return Err(EntryError::invalid_trim("negative start"));
        }
        let mut trim = self.trim.write().unwrap();
        let bound = trim.end.unwrap_or(self.duration);
        if seconds >= bound {
            return Err(EntryError::invalid_trim(format!(
                "start {seconds}s is not before end {bound}s"
            )));
        }
        trim.start = Some(seconds);
        Ok(())
    }

    /// Déplace la fin de la fenêtre de lecture
    pub fn set_end(&self, seconds: f64) -> Result<()> {
        let mut trim = self.trim.write().unwrap();
        let start = trim.start.unwrap_or(0.0);
        if seconds <= start {
            return Err(EntryError::invalid_trim(format!(
                "end {seconds}s is not after start {start}s"
            )));
        }
        trim.end = Some(seconds);
        Ok(())
    }

    pub(crate) fn restore_trim(&self, trim: TrimWindow) {
        *self.trim.write().unwrap() = trim;
    }

    /// Ressource locale, si l'entrée est prête
    pub fn resource(&self) -> Option<LocalResource> {
        self.resource.read().unwrap().clone()
    }

    /// Chemin du fichier téléchargé, le cas échéant
    pub fn filename(&self) -> Option<PathBuf> {
        match self.resource() {
            Some(LocalResource::File(path)) => Some(path),
            _ => None,
        }
    }

    /// URL directe résolue, pour les flux prêts
    pub fn stream_url(&self) -> Option<String> {
        match self.resource() {
            Some(LocalResource::StreamUrl(url)) => Some(url),
            _ => None,
        }
    }

    pub(crate) fn install_resource(&self, resource: LocalResource) {
        *self.resource.write().unwrap() = Some(resource);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.is_ready()
    }

    pub fn is_failed(&self) -> bool {
        self.ready.is_failed()
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Entry {}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("id", &self.id)
            .field("locator", &self.locator)
            .field("title", &self.title())
            .field("duration", &self.duration)
            .field("kind", &self.kind)
            .field("ready", &self.ready.phase())
            .finish_non_exhaustive()
    }
}
