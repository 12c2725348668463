//! Matérialisation asynchrone des entrées
//!
//! Chaque entrée est téléchargée au plus une fois. Le premier appelant de
//! [`Entry::ready`] devient le téléchargeur (transition `Pending` →
//! `Downloading` par compare-and-set); tous les appelants, premier compris,
//! attendent ensuite la même phase terminale publiée sur un canal
//! [`watch`]. Un appel après complétion se résout immédiatement, sans
//! retéléchargement.
//!
//! La phase terminale est mémorisée: `Ready` une fois la ressource locale
//! en place, `Failed` sinon, l'erreur d'origine étant partagée entre tous
//! les waiters. L'entrée en échec n'est jamais réessayée ici; c'est à la
//! file de la sauter.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use voxextract::ExtractOpts;

use crate::cache;
use crate::entry::{Entry, EntryKind, LocalResource};
use crate::error::{EntryError, Result};

/// Phase de préparation d'une entrée
#[derive(Debug, Clone, Default)]
pub enum ReadyPhase {
    /// Aucune matérialisation demandée
    #[default]
    Pending,
    /// Un téléchargement est en vol
    Downloading,
    /// Ressource locale en place
    Ready,
    /// Matérialisation échouée; l'erreur est partagée entre les waiters
    Failed(Arc<EntryError>),
}

/// Signal de préparation mono-producteur / multi-consommateurs
pub(crate) struct ReadySignal {
    tx: watch::Sender<ReadyPhase>,
}

impl ReadySignal {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(ReadyPhase::Pending);
        Self { tx }
    }

    pub(crate) fn phase(&self) -> ReadyPhase {
        self.tx.borrow().clone()
    }

    pub(crate) fn is_ready(&self) -> bool {
        matches!(*self.tx.borrow(), ReadyPhase::Ready)
    }

    pub(crate) fn is_failed(&self) -> bool {
        matches!(*self.tx.borrow(), ReadyPhase::Failed(_))
    }

    /// Tente de devenir le téléchargeur; un seul appelant y parvient
    fn claim(&self) -> bool {
        let mut claimed = false;
        self.tx.send_if_modified(|phase| {
            if matches!(phase, ReadyPhase::Pending) {
                *phase = ReadyPhase::Downloading;
                claimed = true;
                true
            } else {
                false
            }
        });
        claimed
    }

    fn publish_ready(&self) {
        self.tx.send_replace(ReadyPhase::Ready);
    }

    fn publish_failure(&self, error: Arc<EntryError>) {
        self.tx.send_replace(ReadyPhase::Failed(error));
    }

    /// Attend une phase terminale
    async fn wait(&self) -> Result<()> {
        let mut rx = self.tx.subscribe();
        loop {
            let phase = rx.borrow_and_update().clone();
            match phase {
                ReadyPhase::Ready => return Ok(()),
                ReadyPhase::Failed(error) => return Err(EntryError::shared(&error)),
                ReadyPhase::Pending | ReadyPhase::Downloading => {}
            }
            if rx.changed().await.is_err() {
                return Err(EntryError::download("readiness signal dropped"));
            }
        }
    }
}

impl Entry {
    /// Future de préparation de l'entrée
    ///
    /// Idempotent: plusieurs appels avant complétion se résolvent tous
    /// ensemble avec le même résultat, sans jamais démarrer un second
    /// téléchargement; un appel après complétion se résout immédiatement.
    pub async fn ready(self: &Arc<Self>) -> Result<()> {
        if self.ready.claim() {
            let entry = Arc::clone(self);
            tokio::spawn(async move {
                entry.run_download().await;
            });
        }
        self.ready.wait().await
    }

    /// Déclenche la préparation sans attendre (pré-chargement de tête)
    ///
    /// Un échec n'est observé que plus tard, quand la file saute l'entrée.
    pub fn prefetch(self: &Arc<Self>) {
        if self.is_ready() || self.is_failed() {
            return;
        }
        let entry = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(error) = entry.ready().await {
                debug!(entry = %entry.id(), "prefetch failed: {error}");
            }
        });
    }

    async fn run_download(self: Arc<Self>) {
        let outcome = match self.kind() {
            EntryKind::Standard {
                expected_stem,
                verify_size,
            } => self
                .materialize_file(expected_stem.clone(), *verify_size)
                .await
                .map(LocalResource::File),
            EntryKind::Chaptered {
                expected_stem,
                verify_size,
                ..
            } => self
                .materialize_file(expected_stem.clone(), *verify_size)
                .await
                .map(LocalResource::File),
            EntryKind::Stream { fallback } => self
                .resolve_stream_source(fallback.clone())
                .await
                .map(LocalResource::StreamUrl),
        };
        match outcome {
            Ok(resource) => {
                debug!(entry = %self.id(), ?resource, "entry ready");
                self.install_resource(resource);
                self.ready.publish_ready();
            }
            Err(error) => {
                let error = Arc::new(error);
                warn!(entry = %self.id(), locator = self.locator(), "materialization failed: {error}");
                self.ready.publish_failure(error);
            }
        }
    }

    /// Télécharge le fichier de l'entrée, en réutilisant le cache local
    /// quand c'est possible
    async fn materialize_file(
        &self,
        expected_stem: Option<String>,
        verify_size: bool,
    ) -> Result<PathBuf> {
        if let Some(stem) = expected_stem.as_deref() {
            if let Some(cached) = cache::find_cached(&self.downloads_dir, stem).await? {
                if !verify_size {
                    debug!(entry = %self.id(), path = %cached.display(), "cache hit");
                    return Ok(cached);
                }
                // Origine sans garantie de stabilité: comparer la taille
                // locale à la taille distante avant de réutiliser.
                let local_size = tokio::fs::metadata(&cached).await?.len();
                match cache::remote_content_length(self.locator()).await {
                    Some(remote) if remote == local_size => {
                        debug!(entry = %self.id(), path = %cached.display(), "cache hit (size verified)");
                        return Ok(cached);
                    }
                    remote => {
                        debug!(
                            entry = %self.id(),
                            local_size,
                            ?remote,
                            "cache stale, downloading a disambiguated copy"
                        );
                        return self.download_fresh(true).await;
                    }
                }
            }
        }
        self.download_fresh(false).await
    }

    async fn download_fresh(&self, disambiguate: bool) -> Result<PathBuf> {
        let descriptor = self
            .extractor
            .extract(self.locator(), ExtractOpts::downloading())
            .await?;
        let path = descriptor
            .local_path()
            .map(PathBuf::from)
            .ok_or_else(|| EntryError::download("extractor reported no local file"))?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| EntryError::download(format!("downloaded file missing: {e}")))?;
        if !metadata.is_file() {
            return Err(EntryError::download(format!(
                "downloaded path is not a file: {}",
                path.display()
            )));
        }
        if disambiguate {
            return cache::disambiguate(&path).await;
        }
        Ok(path)
    }

    /// Résout une URL directe valide pour un flux; en cas d'échec, la
    /// destination de repli est réessayée exactement une fois
    async fn resolve_stream_source(&self, fallback: Option<String>) -> Result<String> {
        match self.probe_stream(self.locator()).await {
            Ok(url) => Ok(url),
            Err(primary) => {
                let Some(fallback) = fallback else {
                    return Err(primary);
                };
                debug!(entry = %self.id(), %fallback, "stream resolution failed, trying fallback: {primary}");
                self.probe_stream(&fallback).await
            }
        }
    }

    async fn probe_stream(&self, locator: &str) -> Result<String> {
        let descriptor = self
            .extractor
            .extract(locator, ExtractOpts::eager())
            .await?;
        descriptor
            .url
            .clone()
            .ok_or_else(|| EntryError::download(format!("no direct stream url for {locator}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryDeps, EntrySeed};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use voxextract::{ExtractError, MediaDescriptor, MediaExtractor, RequestedDownload};

    fn seed(locator: &str) -> EntrySeed {
        EntrySeed {
            locator: locator.to_string(),
            title: locator.to_string(),
            duration: 60.0,
            ..Default::default()
        }
    }

    /// Extracteur qui écrit réellement un fichier à chaque téléchargement
    struct CountingExtractor {
        dir: std::path::PathBuf,
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingExtractor {
        fn new(dir: &tempfile::TempDir, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                dir: dir.path().to_path_buf(),
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    #[async_trait::async_trait]
    impl MediaExtractor for CountingExtractor {
        async fn extract(
            &self,
            locator: &str,
            opts: ExtractOpts,
        ) -> voxextract::Result<MediaDescriptor> {
            assert!(opts.download, "seul le téléchargement est scripté ici");
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ExtractError::extraction("scripted failure"));
            }
            let path = self.dir.join(format!("media-{call}.opus"));
            std::fs::write(&path, b"audio").unwrap();
            Ok(MediaDescriptor {
                title: Some(locator.to_string()),
                requested_downloads: Some(vec![RequestedDownload {
                    filepath: Some(path.to_string_lossy().into_owned()),
                    filename: None,
                }]),
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn concurrent_waiters_share_one_download() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = CountingExtractor::new(&dir, false);
        let deps = EntryDeps::new(extractor.clone(), dir.path());
        let entry = Entry::standard(seed("https://example.com/a"), None, false, deps);

        let (a, b) = tokio::join!(entry.ready(), entry.ready());
        a.unwrap();
        b.unwrap();
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
        assert!(entry.is_ready());
        assert!(entry.filename().is_some());

        // après complétion: résolution immédiate, toujours un seul appel
        entry.ready().await.unwrap();
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_settles_every_waiter() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = CountingExtractor::new(&dir, true);
        let deps = EntryDeps::new(extractor.clone(), dir.path());
        let entry = Entry::standard(seed("https://example.com/broken"), None, false, deps);

        let (a, b) = tokio::join!(entry.ready(), entry.ready());
        assert!(a.is_err());
        assert!(b.is_err());
        assert!(entry.is_failed());
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
    }

    /// Serveur minimal qui répond aux sondes HEAD avec une taille fixe
    async fn head_server(content_length: u64) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut request = [0u8; 1024];
                let _ = stream.read(&mut request).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-length: {content_length}\r\nconnection: close\r\n\r\n"
                );
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });
        format!("http://{addr}/track")
    }

    #[tokio::test]
    async fn matching_remote_size_reuses_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cached = dir.path().join("generic-track.mp3");
        std::fs::write(&cached, b"0123456789").unwrap();
        let locator = head_server(10).await;

        let extractor = CountingExtractor::new(&dir, false);
        let deps = EntryDeps::new(extractor.clone(), dir.path());
        let entry = Entry::standard(seed(&locator), Some("generic-track".into()), true, deps);

        entry.ready().await.unwrap();
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(entry.filename(), Some(cached));
    }

    #[tokio::test]
    async fn stale_remote_size_downloads_a_suffixed_copy() {
        let dir = tempfile::tempdir().unwrap();
        let cached = dir.path().join("generic-track.mp3");
        std::fs::write(&cached, b"0123456789").unwrap();
        let locator = head_server(999).await;

        let extractor = CountingExtractor::new(&dir, false);
        let deps = EntryDeps::new(extractor.clone(), dir.path());
        let entry = Entry::standard(seed(&locator), Some("generic-track".into()), true, deps);

        entry.ready().await.unwrap();
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
        let fresh = entry.filename().unwrap();
        let name = fresh.file_name().unwrap().to_str().unwrap();
        assert!(
            name.starts_with("media-0-") && name.ends_with(".opus"),
            "expected a hash-suffixed copy, got {name}"
        );
        // l'ancienne copie n'est pas écrasée
        assert!(cached.exists());
    }

    /// Extracteur de flux: la première cible échoue, le repli répond
    struct StreamExtractor {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl MediaExtractor for StreamExtractor {
        async fn extract(
            &self,
            locator: &str,
            _opts: ExtractOpts,
        ) -> voxextract::Result<MediaDescriptor> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if locator.contains("primary") {
                return Err(ExtractError::extraction("primary unreachable"));
            }
            Ok(MediaDescriptor {
                url: Some(format!("{locator}/direct.m3u8")),
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn stream_fallback_is_tried_exactly_once() {
        let extractor = Arc::new(StreamExtractor {
            calls: AtomicUsize::new(0),
        });
        let deps = EntryDeps::new(extractor.clone(), std::env::temp_dir());
        let entry = Entry::stream(
            seed("https://example.com/primary"),
            Some("https://example.com/backup".into()),
            deps,
        );

        entry.ready().await.unwrap();
        assert_eq!(
            entry.stream_url().as_deref(),
            Some("https://example.com/backup/direct.m3u8")
        );
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stream_without_fallback_fails_after_one_attempt() {
        let extractor = Arc::new(StreamExtractor {
            calls: AtomicUsize::new(0),
        });
        let deps = EntryDeps::new(extractor.clone(), std::env::temp_dir());
        let entry = Entry::stream(seed("https://example.com/primary"), None, deps);

        assert!(entry.ready().await.is_err());
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
    }
}
