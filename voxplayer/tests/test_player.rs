use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use voxentry::{Entry, EntryDeps, EntrySeed};
use voxextract::{ExtractOpts, MediaDescriptor, MediaExtractor, RequestedDownload};
use voxplayer::{
    OutputProcess, PlaybackRequest, Player, PlayerError, PlayerOptions, PlayerRegistry,
    PlayerState, RepeatMode, SimulatedSink, VoiceSink,
};
use voxqueue::{EventBus, EventKind, PipelineEvent, Placement, Queue};

/// Extracteur de test: chaque téléchargement écrit un fichier local.
/// Les localisateurs contenant "shared" réutilisent tous le même fichier.
struct TestExtractor {
    dir: PathBuf,
    downloads: AtomicUsize,
}

impl TestExtractor {
    fn new(dir: &tempfile::TempDir) -> Arc<Self> {
        Arc::new(Self {
            dir: dir.path().to_path_buf(),
            downloads: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl MediaExtractor for TestExtractor {
    async fn extract(
        &self,
        locator: &str,
        _opts: ExtractOpts,
    ) -> voxextract::Result<MediaDescriptor> {
        let call = self.downloads.fetch_add(1, Ordering::SeqCst);
        let path = if locator.contains("shared") {
            self.dir.join("shared.opus")
        } else {
            self.dir.join(format!("media-{call}.opus"))
        };
        std::fs::write(&path, b"audio").unwrap();
        Ok(MediaDescriptor {
            title: Some(locator.to_string()),
            url: Some(format!("{locator}/direct.m3u8")),
            requested_downloads: Some(vec![RequestedDownload {
                filepath: Some(path.to_string_lossy().into_owned()),
                filename: None,
            }]),
            ..Default::default()
        })
    }
}

/// Sortie qui refuse toute lecture
struct RefusingSink;

#[async_trait]
impl VoiceSink for RefusingSink {
    async fn spawn(&self, _request: PlaybackRequest) -> voxplayer::Result<Arc<dyn OutputProcess>> {
        Err(PlayerError::sink("no voice connection"))
    }

    fn describe(&self) -> String {
        "refusing".to_string()
    }
}

struct TestRig {
    _dir: tempfile::TempDir,
    extractor: Arc<TestExtractor>,
    bus: Arc<EventBus>,
    queue: Arc<Queue>,
    sink: Arc<SimulatedSink>,
    player: Arc<Player>,
}

fn rig() -> TestRig {
    rig_with(PlayerOptions::default())
}

fn rig_with(options: PlayerOptions) -> TestRig {
    let dir = tempfile::tempdir().unwrap();
    let extractor = TestExtractor::new(&dir);
    let bus = Arc::new(EventBus::new());
    let queue = Arc::new(Queue::new(Arc::clone(&bus)));
    let sink = Arc::new(SimulatedSink::new("test-room"));
    let player = Player::new(
        Arc::clone(&queue),
        Arc::clone(&bus),
        Arc::clone(&sink) as Arc<dyn VoiceSink>,
        options,
    );
    TestRig {
        _dir: dir,
        extractor,
        bus,
        queue,
        sink,
        player,
    }
}

impl TestRig {
    fn entry(&self, locator: &str, duration: f64) -> Arc<Entry> {
        let seed = EntrySeed {
            locator: locator.to_string(),
            title: locator.to_string(),
            duration,
            ..Default::default()
        };
        Entry::standard(
            seed,
            None,
            false,
            EntryDeps::new(self.extractor.clone(), self.extractor.dir.clone()),
        )
    }

    fn stream(&self, locator: &str) -> Arc<Entry> {
        let seed = EntrySeed {
            locator: locator.to_string(),
            title: locator.to_string(),
            ..Default::default()
        };
        Entry::stream(
            seed,
            None,
            EntryDeps::new(self.extractor.clone(), self.extractor.dir.clone()),
        )
    }

    fn current_title(&self) -> Option<String> {
        self.player.current_entry().map(|entry| entry.title())
    }

    fn history_titles(&self) -> Vec<String> {
        self.queue
            .history()
            .iter()
            .map(|record| record.entry.title())
            .collect()
    }
}

/// Journal d'événements: les écouteurs synchrones tournent en ligne,
/// l'ordre du journal est donc l'ordre d'émission.
fn record_events(bus: &EventBus) -> Arc<Mutex<Vec<String>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for kind in [
        EventKind::Play,
        EventKind::Pause,
        EventKind::Resume,
        EventKind::Stop,
        EventKind::FinishedPlaying,
    ] {
        let log = Arc::clone(&seen);
        bus.on(kind, move |event| {
            let label = match event {
                PipelineEvent::EntryAdded { entry, .. } => format!("added:{}", entry.title()),
                PipelineEvent::Play { entry } => format!("play:{}", entry.title()),
                PipelineEvent::Pause { entry } => format!("pause:{}", entry.title()),
                PipelineEvent::Resume { entry } => format!("resume:{}", entry.title()),
                PipelineEvent::Stop => "stop".to_string(),
                PipelineEvent::FinishedPlaying { entry } => format!("finished:{}", entry.title()),
            };
            log.lock().unwrap().push(label);
            Ok(())
        });
    }
    seen
}

async fn wait_until(what: &str, check: impl Fn() -> bool) {
    for _ in 0..600 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("délai dépassé: {what}");
}

#[tokio::test]
async fn test_play_starts_the_first_entry() {
    let rig = rig();
    rig.queue.push(rig.entry("https://a", 600.0), Placement::End);
    rig.queue.push(rig.entry("https://b", 600.0), Placement::End);

    rig.player.play().await.unwrap();
    wait_until("lecture démarrée", || rig.player.is_playing()).await;

    assert_eq!(rig.current_title().as_deref(), Some("https://a"));
    assert_eq!(rig.queue.len(), 1);
    let records = rig.sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].title, "https://a");
    assert!((records[0].volume - 0.3).abs() < f32::EPSILON);
    assert!(!records[0].stream);
    rig.player.stop().await;
}

#[tokio::test]
async fn test_play_with_empty_queue_stays_stopped() {
    let rig = rig();
    let events = record_events(&rig.bus);

    rig.player.play().await.unwrap();

    assert_eq!(rig.player.state(), PlayerState::Stopped);
    assert!(rig.player.current_entry().is_none());
    // pas d'événement stop pour un play à vide
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_play_while_playing_is_a_noop() {
    let rig = rig();
    rig.queue.push(rig.entry("https://a", 600.0), Placement::End);
    rig.queue.push(rig.entry("https://b", 600.0), Placement::End);

    rig.player.play().await.unwrap();
    wait_until("lecture démarrée", || rig.player.is_playing()).await;
    rig.player.play().await.unwrap();

    assert_eq!(rig.sink.spawn_count(), 1);
    assert_eq!(rig.current_title().as_deref(), Some("https://a"));
    rig.player.stop().await;
}

#[tokio::test]
async fn test_pause_freezes_position_and_resume_continues() {
    let rig = rig();
    let events = record_events(&rig.bus);
    rig.queue.push(rig.entry("https://a", 600.0), Placement::End);

    rig.player.play().await.unwrap();
    wait_until("un peu de lecture", || rig.player.progress() > 1.0).await;

    rig.player.pause().await.unwrap();
    assert_eq!(rig.player.state(), PlayerState::Paused);
    let held = rig.player.progress();
    tokio::time::sleep(Duration::from_millis(20)).await;
    // l'horloge est gelée pendant la pause
    assert_eq!(rig.player.progress(), held);

    rig.player.resume().await.unwrap();
    assert_eq!(rig.player.state(), PlayerState::Playing);
    wait_until("la position repart", || rig.player.progress() > held).await;

    assert_eq!(
        events.lock().unwrap().as_slice(),
        [
            "play:https://a".to_string(),
            "pause:https://a".to_string(),
            "resume:https://a".to_string(),
        ]
    );
    rig.player.stop().await;
}

#[tokio::test]
async fn test_pause_and_resume_are_ignored_while_stopped() {
    let rig = rig();

    rig.player.pause().await.unwrap();
    assert_eq!(rig.player.state(), PlayerState::Stopped);
    rig.player.resume().await.unwrap();
    assert_eq!(rig.player.state(), PlayerState::Stopped);
}

#[tokio::test]
async fn test_resume_while_playing_is_refused() {
    let rig = rig();
    rig.queue.push(rig.entry("https://a", 600.0), Placement::End);
    rig.player.play().await.unwrap();
    wait_until("lecture démarrée", || rig.player.is_playing()).await;

    let error = rig.player.resume().await.unwrap_err();
    assert!(matches!(error, PlayerError::InvalidTransition { .. }));
    assert_eq!(rig.player.state(), PlayerState::Playing);
    rig.player.stop().await;
}

#[tokio::test]
async fn test_pausing_a_stream_stops_the_player() {
    let rig = rig();
    let events = record_events(&rig.bus);
    rig.queue.push(rig.stream("https://radio"), Placement::End);

    rig.player.play().await.unwrap();
    wait_until("flux démarré", || rig.player.is_playing()).await;
    assert!(rig.sink.records()[0].stream);
    assert!(rig.player.remaining().is_none());

    rig.player.pause().await.unwrap();

    assert_eq!(rig.player.state(), PlayerState::Stopped);
    assert!(rig.player.current_entry().is_none());
    assert!(events.lock().unwrap().contains(&"stop".to_string()));
}

#[tokio::test]
async fn test_natural_completion_advances_then_announces() {
    let rig = rig();
    let events = record_events(&rig.bus);
    rig.queue.push(rig.entry("https://a", 1.0), Placement::End);
    rig.queue.push(rig.entry("https://b", 1.0), Placement::End);

    rig.player.play().await.unwrap();
    wait_until("tout est joué", || {
        rig.player.is_stopped() && rig.queue.history().len() == 2
    })
    .await;

    assert_eq!(rig.history_titles(), ["https://b", "https://a"]);
    assert!(rig.player.current_entry().is_none());
    // l'annonce de fin suit l'avancement, l'arrêt précède la dernière
    assert_eq!(
        events.lock().unwrap().as_slice(),
        [
            "play:https://a".to_string(),
            "play:https://b".to_string(),
            "finished:https://a".to_string(),
            "stop".to_string(),
            "finished:https://b".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_skip_advances_through_the_queue() {
    let rig = rig();
    rig.queue.push(rig.entry("https://a", 600.0), Placement::End);
    rig.queue.push(rig.entry("https://b", 600.0), Placement::End);
    rig.queue.push(rig.entry("https://c", 600.0), Placement::End);

    rig.player.play().await.unwrap();
    wait_until("lecture de a", || {
        rig.current_title().as_deref() == Some("https://a")
    })
    .await;

    rig.player.skip().await.unwrap();
    wait_until("lecture de b", || {
        rig.current_title().as_deref() == Some("https://b")
    })
    .await;
    assert_eq!(rig.player.state(), PlayerState::Playing);
    assert_eq!(rig.history_titles(), ["https://a"]);

    rig.queue.promote_last_to_front();

    rig.player.skip().await.unwrap();
    wait_until("lecture de c", || {
        rig.current_title().as_deref() == Some("https://c")
    })
    .await;
    assert_eq!(rig.history_titles(), ["https://b", "https://a"]);
    rig.player.stop().await;
}

#[tokio::test]
async fn test_skip_on_the_last_entry_stops() {
    let rig = rig();
    let events = record_events(&rig.bus);
    rig.queue.push(rig.entry("https://a", 600.0), Placement::End);

    rig.player.play().await.unwrap();
    wait_until("lecture démarrée", || rig.player.is_playing()).await;
    rig.player.skip().await.unwrap();
    wait_until("arrêt après le dernier", || rig.player.is_stopped()).await;

    // jamais en pause après un saut
    assert_eq!(rig.player.state(), PlayerState::Stopped);
    assert_eq!(rig.history_titles(), ["https://a"]);
    assert!(events.lock().unwrap().contains(&"stop".to_string()));
}

#[tokio::test]
async fn test_repeat_single_loops_the_same_entry() {
    let rig = rig();
    rig.player.set_repeat(RepeatMode::Single);
    rig.queue.push(rig.entry("https://loop", 1.0), Placement::End);

    rig.player.play().await.unwrap();
    wait_until("l'entrée a bouclé", || rig.sink.spawn_count() >= 3).await;
    rig.player.stop().await;

    for record in rig.sink.records() {
        assert_eq!(record.title, "https://loop");
    }
    // l'historique ne grossit pas à chaque tour
    assert_eq!(rig.history_titles(), ["https://loop"]);
}

#[tokio::test]
async fn test_skip_bypasses_single_repeat_once() {
    let rig = rig();
    rig.player.set_repeat(RepeatMode::Single);
    rig.queue.push(rig.entry("https://a", 600.0), Placement::End);
    rig.queue.push(rig.entry("https://b", 600.0), Placement::End);

    rig.player.play().await.unwrap();
    wait_until("lecture de a", || {
        rig.current_title().as_deref() == Some("https://a")
    })
    .await;

    // sans le contournement, a serait remise en tête et rejouée
    rig.player.skip().await.unwrap();
    wait_until("lecture de b", || {
        rig.current_title().as_deref() == Some("https://b")
    })
    .await;

    let titles: Vec<String> = rig.sink.records().iter().map(|r| r.title.clone()).collect();
    assert_eq!(titles, ["https://a", "https://b"]);

    rig.player.skip().await.unwrap();
    wait_until("plus rien à jouer", || rig.player.is_stopped()).await;
    assert_eq!(rig.history_titles(), ["https://b", "https://a"]);
}

#[tokio::test]
async fn test_volume_bounds() {
    let rig = rig();

    assert!(matches!(
        rig.player.set_volume(0.0).await.unwrap_err(),
        PlayerError::InvalidVolume(_)
    ));
    assert!(matches!(
        rig.player.set_volume(1.5).await.unwrap_err(),
        PlayerError::InvalidVolume(_)
    ));
    rig.player.set_volume(1.0).await.unwrap();
    assert!((rig.player.volume() - 1.0).abs() < f32::EPSILON);
}

#[tokio::test]
async fn test_configured_volume_reaches_the_sink() {
    let rig = rig_with(PlayerOptions {
        volume: 0.5,
        ..PlayerOptions::default()
    });
    rig.queue.push(rig.entry("https://a", 600.0), Placement::End);

    rig.player.play().await.unwrap();
    wait_until("lecture démarrée", || rig.player.is_playing()).await;

    assert!((rig.sink.records()[0].volume - 0.5).abs() < f32::EPSILON);
    rig.player.stop().await;
}

#[tokio::test]
async fn test_seek_restarts_at_the_offset() {
    let rig = rig();
    rig.queue.push(rig.entry("https://a", 600.0), Placement::End);

    rig.player.play().await.unwrap();
    wait_until("lecture démarrée", || rig.player.is_playing()).await;

    rig.player.seek(120.0).await.unwrap();
    wait_until("processus relancé", || rig.sink.spawn_count() == 2).await;

    let records = rig.sink.records();
    assert_eq!(records[1].start, 120.0);
    assert_eq!(rig.player.state(), PlayerState::Playing);
    let entry = rig.player.current_entry().unwrap();
    assert_eq!(entry.start_seconds(), Some(120.0));
    rig.player.stop().await;
}

#[tokio::test]
async fn test_seek_past_the_end_skips() {
    let rig = rig();
    rig.queue.push(rig.entry("https://a", 60.0), Placement::End);
    rig.queue.push(rig.entry("https://b", 600.0), Placement::End);

    rig.player.play().await.unwrap();
    wait_until("lecture de a", || {
        rig.current_title().as_deref() == Some("https://a")
    })
    .await;

    rig.player.seek(60.0).await.unwrap();
    wait_until("a sautée", || {
        rig.current_title().as_deref() == Some("https://b")
    })
    .await;
    assert_eq!(rig.history_titles(), ["https://a"]);
    rig.player.stop().await;
}

#[tokio::test]
async fn test_seek_with_nothing_loaded_is_ignored() {
    let rig = rig();
    rig.player.seek(10.0).await.unwrap();
    assert_eq!(rig.player.state(), PlayerState::Stopped);
}

#[tokio::test]
async fn test_process_fault_advances_to_the_next_entry() {
    let rig = rig();
    let events = record_events(&rig.bus);
    rig.queue.push(rig.entry("https://a", 600.0), Placement::End);
    rig.queue.push(rig.entry("https://b", 600.0), Placement::End);

    rig.player.play().await.unwrap();
    wait_until("lecture de a", || rig.player.is_playing()).await;

    // une panne du processus vaut une fin de lecture
    rig.sink.fault_current("simulated crash");
    wait_until("lecture de b", || {
        rig.current_title().as_deref() == Some("https://b")
    })
    .await;

    assert_eq!(rig.history_titles(), ["https://a"]);
    assert!(events
        .lock()
        .unwrap()
        .contains(&"finished:https://a".to_string()));
    rig.player.stop().await;
}

#[tokio::test]
async fn test_refused_entries_are_burned_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = TestExtractor::new(&dir);
    let bus = Arc::new(EventBus::new());
    let events = record_events(&bus);
    let queue = Arc::new(Queue::new(Arc::clone(&bus)));
    let player = Player::new(
        Arc::clone(&queue),
        Arc::clone(&bus),
        Arc::new(RefusingSink) as Arc<dyn VoiceSink>,
        PlayerOptions::default(),
    );
    let seed = |locator: &str| EntrySeed {
        locator: locator.to_string(),
        title: locator.to_string(),
        duration: 60.0,
        ..Default::default()
    };
    queue.push(
        Entry::standard(
            seed("https://a"),
            None,
            false,
            EntryDeps::new(extractor.clone(), dir.path()),
        ),
        Placement::End,
    );
    queue.push(
        Entry::standard(
            seed("https://b"),
            None,
            false,
            EntryDeps::new(extractor.clone(), dir.path()),
        ),
        Placement::End,
    );

    player.play().await.unwrap();

    assert_eq!(player.state(), PlayerState::Stopped);
    assert!(queue.is_empty());
    let history: Vec<String> = queue
        .history()
        .iter()
        .map(|record| record.entry.title())
        .collect();
    assert_eq!(history, ["https://b", "https://a"]);
    let seen = events.lock().unwrap();
    assert!(seen.contains(&"finished:https://a".to_string()));
    assert!(seen.contains(&"finished:https://b".to_string()));
}

#[tokio::test]
async fn test_kill_is_terminal() {
    let rig = rig();
    let added = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&added);
    rig.bus.on(EventKind::EntryAdded, move |_event| {
        *counter.lock().unwrap() += 1;
        Ok(())
    });
    rig.queue.push(rig.entry("https://a", 600.0), Placement::End);
    rig.queue.push(rig.entry("https://b", 600.0), Placement::End);
    assert_eq!(*added.lock().unwrap(), 2);

    rig.player.play().await.unwrap();
    wait_until("lecture démarrée", || rig.player.is_playing()).await;

    rig.player.kill().await;
    assert_eq!(rig.player.state(), PlayerState::Dead);
    assert!(rig.queue.is_empty());

    // tout appel de transport suivant est ignoré
    let spawns = rig.sink.spawn_count();
    rig.player.play().await.unwrap();
    rig.player.pause().await.unwrap();
    rig.player.resume().await.unwrap();
    rig.player.skip().await.unwrap();
    rig.player.seek(5.0).await.unwrap();
    rig.player.stop().await;
    assert_eq!(rig.player.state(), PlayerState::Dead);
    assert_eq!(rig.sink.spawn_count(), spawns);

    let entry = rig.entry("https://x", 60.0);
    assert!(matches!(
        rig.player.play_entry(entry).await.unwrap_err(),
        PlayerError::Dead
    ));

    // les écouteurs enregistrés avant la mise à mort sont détachés
    rig.queue.push(rig.entry("https://c", 600.0), Placement::End);
    assert_eq!(*added.lock().unwrap(), 2);
}

#[tokio::test]
async fn test_reload_voice_respawns_at_the_recorded_position() {
    let rig = rig();
    rig.queue.push(rig.entry("https://a", 600.0), Placement::End);

    rig.player.play().await.unwrap();
    wait_until("un peu de lecture", || rig.player.progress() > 5.0).await;

    let replacement = Arc::new(SimulatedSink::new("replacement"));
    rig.player
        .reload_voice(Arc::clone(&replacement) as Arc<dyn VoiceSink>)
        .await
        .unwrap();

    wait_until("relance sur la nouvelle sortie", || {
        replacement.spawn_count() == 1
    })
    .await;
    let record = &replacement.records()[0];
    assert_eq!(record.title, "https://a");
    assert!(record.start > 0.0);
    assert_eq!(rig.player.state(), PlayerState::Playing);
    assert!(rig.player.sink_description().contains("replacement"));
    rig.player.stop().await;
}

#[tokio::test]
async fn test_play_entry_replaces_current_without_touching_the_queue() {
    let rig = rig();
    let events = record_events(&rig.bus);
    rig.queue.push(rig.entry("https://a", 600.0), Placement::End);
    rig.queue.push(rig.entry("https://b", 600.0), Placement::End);

    rig.player.play().await.unwrap();
    wait_until("lecture de a", || {
        rig.current_title().as_deref() == Some("https://a")
    })
    .await;

    let jingle = rig.entry("https://jingle", 600.0);
    rig.player.play_entry(jingle).await.unwrap();

    assert_eq!(rig.current_title().as_deref(), Some("https://jingle"));
    // b attend toujours, a n'est pas passée par la fin de lecture
    assert_eq!(rig.queue.len(), 1);
    tokio::time::sleep(Duration::from_millis(20)).await;
    let seen = events.lock().unwrap().clone();
    assert!(!seen.iter().any(|label| label.starts_with("finished:")));
    assert!(rig.queue.history().is_empty());
    rig.player.stop().await;
}

#[tokio::test]
async fn test_autoplay_starts_on_entry_added() {
    let rig = rig_with(PlayerOptions {
        autoplay_delay: Duration::ZERO,
        ..PlayerOptions::default()
    });
    rig.player.connect_autoplay();

    rig.queue.push(rig.entry("https://a", 600.0), Placement::End);

    wait_until("démarrage automatique", || rig.player.is_playing()).await;
    assert_eq!(rig.current_title().as_deref(), Some("https://a"));
    rig.player.stop().await;
}

#[tokio::test]
async fn test_cleanup_deletes_an_unreferenced_file() {
    let rig = rig_with(PlayerOptions {
        cleanup_finished: true,
        ..PlayerOptions::default()
    });
    let entry = rig.entry("https://a", 1.0);
    rig.queue.push(Arc::clone(&entry), Placement::End);

    rig.player.play().await.unwrap();
    wait_until("lecture terminée", || rig.player.is_stopped()).await;

    let path = entry.filename().unwrap();
    wait_until("fichier supprimé", || !path.exists()).await;
}

#[tokio::test]
async fn test_cleanup_keeps_a_file_still_referenced() {
    let rig = rig_with(PlayerOptions {
        cleanup_finished: true,
        ..PlayerOptions::default()
    });
    // deux entrées distinctes, un seul fichier sur disque
    let first = rig.entry("https://shared/1", 1.0);
    let second = rig.entry("https://shared/2", 1.0);
    rig.queue.push(Arc::clone(&first), Placement::End);
    rig.queue.push(second, Placement::End);

    rig.player.play().await.unwrap();
    wait_until("tout est joué", || {
        rig.player.is_stopped() && rig.queue.history().len() == 2
    })
    .await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    // l'autre entrée de l'historique référence encore le fichier
    assert!(first.filename().unwrap().exists());
}

#[tokio::test]
async fn test_registry_keeps_one_player_per_connection() {
    let rig = rig();
    let registry = PlayerRegistry::new();

    let player = registry.get_or_create("guild-1", || Arc::clone(&rig.player));
    let same = registry.get_or_create("guild-1", || panic!("déjà créé"));
    assert!(Arc::ptr_eq(&player, &same));
    assert_eq!(registry.len(), 1);

    assert!(registry.get("guild-2").is_none());
    assert!(registry.remove("guild-1").await);
    assert!(registry.get("guild-1").is_none());
    assert!(!registry.remove("guild-1").await);
    // la dépose tue le lecteur
    assert_eq!(rig.player.state(), PlayerState::Dead);
}

#[tokio::test]
async fn test_cycle_repeat_walks_the_modes() {
    let rig = rig();
    assert_eq!(rig.player.repeat_mode(), RepeatMode::None);
    assert_eq!(rig.player.cycle_repeat(), RepeatMode::All);
    assert_eq!(rig.player.cycle_repeat(), RepeatMode::Single);
    assert_eq!(rig.player.cycle_repeat(), RepeatMode::None);
}
