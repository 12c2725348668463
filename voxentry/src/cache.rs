//! Réutilisation du cache de téléchargements
//!
//! L'extracteur nomme ses fichiers d'après un radical prévisible
//! (`extracteur-id-titre`). Avant tout téléchargement on cherche dans le
//! dossier un fichier portant ce radical, quelle que soit l'extension.
//! Quand une copie périmée doit être remplacée, la nouvelle reçoit un
//! suffixe dérivé du SHA-256 de son contenu (`radical-a1b2c3d4.ext`) pour
//! ne pas écraser l'ancienne; ces variantes suffixées comptent aussi comme
//! des correspondances de cache.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::{EntryError, Result};

/// Longueur du suffixe de hachage, en caractères hexadécimaux
pub(crate) const HASH_SUFFIX_LEN: usize = 8;

const HEAD_TIMEOUT: Duration = Duration::from_secs(10);

/// Cherche un fichier en cache pour le radical donné
///
/// Retourne la première correspondance dans l'ordre lexicographique, pour
/// rester déterministe quand plusieurs extensions ou variantes coexistent.
pub(crate) async fn find_cached(dir: &Path, stem: &str) -> Result<Option<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        // dossier absent: pas encore de cache
        Err(_) => return Ok(None),
    };
    let mut matches = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let path = entry.path();
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        if name == stem || is_hash_variant(name, stem) {
            matches.push(path);
        }
    }
    matches.sort();
    Ok(matches.into_iter().next())
}

/// Un nom `radical-xxxxxxxx` où le suffixe est du hex de la bonne longueur
fn is_hash_variant(name: &str, stem: &str) -> bool {
    let name = name.as_bytes();
    let stem = stem.as_bytes();
    name.len() == stem.len() + 1 + HASH_SUFFIX_LEN
        && name.starts_with(stem)
        && name[stem.len()] == b'-'
        && name[stem.len() + 1..].iter().all(|b| b.is_ascii_hexdigit())
}

/// Taille annoncée par l'origine, si elle est joignable
pub(crate) async fn remote_content_length(url: &str) -> Option<u64> {
    let client = reqwest::Client::new();
    let response = match client.head(url).timeout(HEAD_TIMEOUT).send().await {
        Ok(response) => response,
        Err(error) => {
            warn!(%url, "content length probe failed: {error}");
            return None;
        }
    };
    if !response.status().is_success() {
        warn!(%url, status = %response.status(), "content length probe refused");
        return None;
    }
    response.content_length()
}

/// Renomme un fichier fraîchement téléchargé avec son suffixe de hachage
pub(crate) async fn disambiguate(path: &Path) -> Result<PathBuf> {
    let digest = hash_prefix(path).await?;
    let renamed = suffixed_path(path, &digest);
    if renamed != path {
        tokio::fs::rename(path, &renamed).await?;
    }
    Ok(renamed)
}

fn suffixed_path(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("media");
    let name = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}-{suffix}.{ext}"),
        None => format!("{stem}-{suffix}"),
    };
    path.with_file_name(name)
}

/// Premiers caractères hexadécimaux du SHA-256 du contenu du fichier
async fn hash_prefix(path: &Path) -> Result<String> {
    let path = path.to_path_buf();
    let digest = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        std::io::copy(&mut file, &mut hasher)?;
        Ok(hex::encode(hasher.finalize()))
    })
    .await
    .map_err(|e| EntryError::download(format!("hash task failed: {e}")))??;
    Ok(digest[..HASH_SUFFIX_LEN].to_string())
}
