//! Résolution des requêtes utilisateur en entrées
//!
//! Le résolveur transforme un localisateur brut (URL, recherche en texte
//! libre) en entrées prêtes à entrer dans la file. La classification du
//! descripteur est entièrement déléguée à [`classify`]; ce module ne fait
//! qu'orchestrer les réextractions qu'elle réclame:
//!
//! - recherche: ré-interrogation complète, puis résolution du premier
//!   résultat (une seule redirection par appel);
//! - collection aplatie: la liste des localisateurs membres est rendue à
//!   l'appelant, qui décide combien en résoudre;
//! - squelette de collection: ré-extraction complète en interne;
//! - élément simple: construction d'une entrée standard ou chapitrée.

use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info, warn};

use voxextract::{
    classify, detect_chapters, Classified, ExtractError, ExtractOpts, MediaDescriptor,
    MediaExtractor,
};

use crate::entry::{CatalogueInfo, Entry, EntryDeps, EntryMeta, EntrySeed};
use crate::error::{EntryError, Result};

/// Confiance minimale pour retenir une correspondance de catalogue
pub const MIN_CATALOGUE_CONFIDENCE: f64 = 0.6;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Source facultative de métadonnées de catalogue (titre, artiste, album,
/// pochette), interrogée à la construction des entrées standard
#[async_trait]
pub trait CatalogueProvider: Send + Sync {
    /// Cherche la correspondance la plus plausible pour un titre brut
    async fn lookup(&self, title: &str) -> Option<CatalogueInfo>;
}

/// Résultat d'une résolution: une entrée unique, ou la liste des membres
/// d'une collection que l'appelant résoudra un par un
#[derive(Debug)]
pub enum Resolved {
    Entry(Arc<Entry>),
    Playlist(Vec<String>),
}

/// Bilan d'une résolution en lot
#[derive(Default)]
pub struct ResolvedBatch {
    pub entries: Vec<Arc<Entry>>,
    pub failures: Vec<(String, EntryError)>,
}

impl ResolvedBatch {
    pub fn added(&self) -> usize {
        self.entries.len()
    }

    pub fn skipped(&self) -> usize {
        self.failures.len()
    }
}

pub struct EntryResolver {
    extractor: Arc<dyn MediaExtractor>,
    downloads_dir: PathBuf,
    http: reqwest::Client,
    catalogue: Option<Arc<dyn CatalogueProvider>>,
}

impl EntryResolver {
    pub fn new(extractor: Arc<dyn MediaExtractor>, downloads_dir: impl Into<PathBuf>) -> Self {
        Self {
            extractor,
            downloads_dir: downloads_dir.into(),
            http: reqwest::Client::new(),
            catalogue: None,
        }
    }

    /// Branche une source de métadonnées de catalogue
    pub fn with_catalogue(mut self, provider: Arc<dyn CatalogueProvider>) -> Self {
        self.catalogue = Some(provider);
        self
    }

    /// Résout un localisateur ou une recherche en texte libre
    pub async fn resolve(&self, input: &str, meta: EntryMeta) -> Result<Resolved> {
        let locator = normalize_locator(input).into_owned();
        let descriptor = self.extract_checked(&locator, ExtractOpts::lazy()).await?;
        match classify(&descriptor) {
            Classified::Search { query } => {
                let redirected = self.search_redirect(&query).await?;
                debug!(%query, %redirected, "search redirected");
                let descriptor = self
                    .extract_checked(&redirected, ExtractOpts::lazy())
                    .await?;
                match classify(&descriptor) {
                    Classified::Collection { members } => playlist_from(members),
                    Classified::CollectionSkeleton { corrected } => {
                        self.expand_skeleton(corrected.unwrap_or(redirected), meta)
                            .await
                    }
                    // une seule redirection de recherche par appel
                    Classified::Search { .. } => {
                        Err(ExtractError::extraction("search redirected to another search").into())
                    }
                    Classified::Single => Ok(Resolved::Entry(
                        self.build_entry(&redirected, descriptor, meta).await,
                    )),
                }
            }
            Classified::Collection { members } => playlist_from(members),
            Classified::CollectionSkeleton { corrected } => {
                self.expand_skeleton(corrected.unwrap_or(locator), meta)
                    .await
            }
            Classified::Single => Ok(Resolved::Entry(
                self.build_entry(&locator, descriptor, meta).await,
            )),
        }
    }

    /// Résout en exigeant une entrée unique
    ///
    /// Un localisateur de collection est refusé avec l'erreur de mauvais
    /// genre, qui transporte le localisateur corrigé à réessayer en tant
    /// que collection.
    pub async fn resolve_entry(&self, input: &str, meta: EntryMeta) -> Result<Arc<Entry>> {
        match self.resolve(input, meta).await? {
            Resolved::Entry(entry) => Ok(entry),
            Resolved::Playlist(_) => {
                let corrected = normalize_locator(input).into_owned();
                Err(ExtractError::wrong_kind(Some(corrected)).into())
            }
        }
    }

    /// Résout une liste de localisateurs membres, un par un
    ///
    /// Les membres en échec sont sautés et consignés; un lot ne s'arrête
    /// jamais sur la première erreur.
    pub async fn resolve_many(&self, locators: &[String], meta: &EntryMeta) -> ResolvedBatch {
        let mut batch = ResolvedBatch::default();
        for locator in locators {
            match self.resolve_entry(locator, meta.clone()).await {
                Ok(entry) => batch.entries.push(entry),
                Err(error) => {
                    debug!(%locator, "skipping member: {error}");
                    batch.failures.push((locator.clone(), error));
                }
            }
        }
        info!(
            added = batch.added(),
            skipped = batch.skipped(),
            "batch resolution finished"
        );
        batch
    }

    /// Construit une entrée de flux, au mieux
    ///
    /// L'extraction sert uniquement à récupérer un titre et une destination
    /// de repli; si elle échoue, l'entrée est créée telle quelle avec le
    /// localisateur brut et la résolution d'URL directe est reportée à la
    /// lecture. Cet appel ne propage jamais l'échec d'extraction.
    pub async fn resolve_stream(&self, input: &str, meta: EntryMeta) -> Arc<Entry> {
        let locator = normalize_locator(input).into_owned();
        let (title, fallback) = match self
            .extractor
            .extract(&locator, ExtractOpts::eager())
            .await
        {
            Ok(descriptor) => (descriptor.display_title(), descriptor.url.clone()),
            Err(error) => {
                warn!(%locator, "stream extraction failed, keeping raw locator: {error}");
                (locator.clone(), Some(locator.clone()))
            }
        };
        let seed = EntrySeed {
            locator,
            title,
            duration: 0.0,
            meta,
            catalogue: None,
        };
        Entry::stream(seed, fallback, self.deps())
    }

    async fn extract_checked(&self, locator: &str, opts: ExtractOpts) -> Result<MediaDescriptor> {
        let descriptor = self.extractor.extract(locator, opts).await?;
        if descriptor.is_generic() {
            self.probe_content_type(locator).await?;
        }
        Ok(descriptor)
    }

    /// Ré-interroge la recherche en mode complet et retourne le
    /// localisateur du premier résultat
    async fn search_redirect(&self, query: &str) -> Result<String> {
        let descriptor = self.extractor.extract(query, ExtractOpts::eager()).await?;
        descriptor
            .member_locators()
            .into_iter()
            .next()
            .ok_or_else(|| ExtractError::extraction(format!("no search results for {query}")).into())
    }

    async fn expand_skeleton(&self, locator: String, meta: EntryMeta) -> Result<Resolved> {
        let descriptor = self.extract_checked(&locator, ExtractOpts::eager()).await?;
        match classify(&descriptor) {
            Classified::Collection { members } => playlist_from(members),
            Classified::Single => Ok(Resolved::Entry(
                self.build_entry(&locator, descriptor, meta).await,
            )),
            Classified::CollectionSkeleton { .. } | Classified::Search { .. } => Err(
                ExtractError::extraction(format!("collection did not materialize: {locator}"))
                    .into(),
            ),
        }
    }

    /// Vérifie qu'un localisateur générique pointe bien vers un média
    ///
    /// Les types `application/*` et `image/*` sont refusés, sauf ogg et
    /// octet-stream; `text/*` passe avec un avertissement, le serveur
    /// mentant parfois sur des fichiers valides. Une sonde injoignable
    /// n'est pas bloquante: l'extraction a déjà réussi sur cette cible.
    async fn probe_content_type(&self, url: &str) -> Result<()> {
        let response = match self.http.head(url).timeout(PROBE_TIMEOUT).send().await {
            Ok(response) => response,
            Err(error) => {
                warn!(%url, "content type probe failed: {error}");
                return Ok(());
            }
        };
        let Some(content_type) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        else {
            return Ok(());
        };
        if (content_type.starts_with("application/") || content_type.starts_with("image/"))
            && !content_type.contains("/ogg")
            && !content_type.contains("/octet-stream")
        {
            return Err(ExtractError::unsupported_content(content_type).into());
        }
        if content_type.starts_with("text/") {
            warn!(%url, content_type, "questionable content type for direct media");
        }
        Ok(())
    }

    async fn build_entry(
        &self,
        locator: &str,
        descriptor: MediaDescriptor,
        meta: EntryMeta,
    ) -> Arc<Entry> {
        let catalogue = self.catalogue_lookup(&descriptor).await;
        let seed = EntrySeed {
            locator: descriptor
                .canonical_locator()
                .unwrap_or(locator)
                .to_string(),
            title: descriptor.display_title(),
            duration: descriptor.duration_seconds(),
            meta,
            catalogue,
        };
        let expected_stem = self.extractor.expected_stem(&descriptor);
        let verify_size = descriptor.is_generic();
        match detect_chapters(&descriptor) {
            Some(chapters) => {
                debug!(locator = %seed.locator, count = chapters.len(), "chaptered entry");
                Entry::chaptered(seed, expected_stem, verify_size, chapters, self.deps())
            }
            None => Entry::standard(seed, expected_stem, verify_size, self.deps()),
        }
    }

    async fn catalogue_lookup(&self, descriptor: &MediaDescriptor) -> Option<CatalogueInfo> {
        let provider = self.catalogue.as_ref()?;
        let info = provider.lookup(&descriptor.display_title()).await?;
        if info.confidence >= MIN_CATALOGUE_CONFIDENCE {
            Some(info)
        } else {
            debug!(confidence = info.confidence, "catalogue match discarded");
            None
        }
    }

    fn deps(&self) -> EntryDeps {
        EntryDeps::new(Arc::clone(&self.extractor), self.downloads_dir.clone())
    }
}

fn playlist_from(members: Vec<String>) -> Result<Resolved> {
    if members.is_empty() {
        return Err(ExtractError::extraction("collection has no resolvable members").into());
    }
    Ok(Resolved::Playlist(members))
}

/// Normalise un localisateur avant extraction
///
/// Les liens de partage Dropbox (`dl=0`) sont réécrits vers leur forme
/// téléchargeable (`dl=1`).
pub fn normalize_locator(input: &str) -> Cow<'_, str> {
    let trimmed = input.trim();
    if trimmed.contains("dropbox.com") && trimmed.contains("dl=0") {
        return Cow::Owned(trimmed.replace("dl=0", "dl=1"));
    }
    Cow::Borrowed(trimmed)
}
