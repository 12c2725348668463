//! # VoxEntry - Modèle d'entrées de lecture
//!
//! Cette crate définit les entrées qui circulent dans le pipeline de
//! lecture: leur résolution depuis un localisateur brut, leur
//! matérialisation en ressource locale et leur forme persistée.
//!
//! ## Fonctionnalités
//!
//! - **Modèle d'entrée**: [`Entry`] porte un genre ([`EntryKind`]), un
//!   titre modifiable, une fenêtre de découpe et, pour les médias longs,
//!   des chapitres
//! - **Résolution**: [`EntryResolver`] transforme URL, recherches en texte
//!   libre et collections en entrées, redirections comprises
//! - **Préparation**: [`Entry::ready`] télécharge chaque média au plus une
//!   fois, réutilise le cache local et résout les URL directes des flux
//! - **Persistance**: [`EntrySnapshot`] fait l'aller-retour JSON sans
//!   jamais embarquer la ressource locale
//!
//! ## Exemple
//!
//! ```no_run
//! use std::sync::Arc;
//! use voxentry::{EntryMeta, EntryResolver, Resolved};
//! use voxextract::YtDlpExtractor;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let extractor = Arc::new(YtDlpExtractor::new("./downloads"));
//! let resolver = EntryResolver::new(extractor, "./downloads");
//!
//! match resolver.resolve("never gonna give you up", EntryMeta::new()).await? {
//!     Resolved::Entry(entry) => {
//!         entry.ready().await?;
//!         println!("prêt: {}", entry.title());
//!     }
//!     Resolved::Playlist(members) => {
//!         println!("{} membres à résoudre", members.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod cache;
mod entry;
mod error;
mod ready;
mod resolver;
mod snapshot;

#[cfg(test)]
pub(crate) mod test_support;

pub use entry::{
    CatalogueInfo, Entry, EntryDeps, EntryId, EntryKind, EntryMeta, EntrySeed, LocalResource,
    TrimWindow, MAX_TITLE_LEN,
};
pub use error::{EntryError, Result};
pub use ready::ReadyPhase;
pub use resolver::{
    normalize_locator, CatalogueProvider, EntryResolver, Resolved, ResolvedBatch,
    MIN_CATALOGUE_CONFIDENCE,
};
pub use snapshot::{EntrySnapshot, SnapshotKind};
