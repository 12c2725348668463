//! Types d'erreur de la couche entrée

use std::sync::Arc;

use voxextract::ExtractError;

/// Alias de Result pour les opérations sur les entrées
pub type Result<T> = std::result::Result<T, EntryError>;

/// Erreurs pouvant survenir pendant la vie d'une entrée
#[derive(Debug, thiserror::Error)]
pub enum EntryError {
    /// Le collaborateur d'extraction a échoué ou renvoyé des données inutilisables
    #[error(transparent)]
    Extraction(#[from] ExtractError),

    /// Échec réseau ou fichier pendant la matérialisation d'une entrée
    #[error("download failed: {0}")]
    Download(String),

    /// Échec déjà publié vers tous les waiters de l'entrée
    #[error("{0}")]
    Shared(Arc<EntryError>),

    /// Fenêtre de lecture invalide (start >= end)
    #[error("invalid trim window: {0}")]
    InvalidTrim(String),

    /// Titre de remplacement invalide
    #[error("invalid title: {0}")]
    InvalidTitle(String),

    /// Erreur d'entrée/sortie locale
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EntryError {
    /// Erreur de téléchargement à partir d'un message
    pub fn download(msg: impl Into<String>) -> Self {
        Self::Download(msg.into())
    }

    /// Erreur de fenêtre de lecture
    pub fn invalid_trim(msg: impl Into<String>) -> Self {
        Self::InvalidTrim(msg.into())
    }

    /// Erreur de titre
    pub fn invalid_title(msg: impl Into<String>) -> Self {
        Self::InvalidTitle(msg.into())
    }

    /// Clone partageable d'une erreur déjà publiée
    pub fn shared(error: &Arc<EntryError>) -> Self {
        Self::Shared(Arc::clone(error))
    }
}
