//! Jukebox console local.
//!
//! Câble le pipeline complet (extracteur → résolveur → file → lecteur) et
//! l'expose comme une petite console interactive sur stdin. C'est de la
//! colle de démonstration: la logique de lecture vit dans les crates
//! `vox*`, ce binaire ne fait que traduire des lignes de commande en
//! appels de pipeline.

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use voxconfig::Config;
use voxentry::{EntryDeps, EntryMeta, EntryResolver, Resolved};
use voxextract::{MediaExtractor, YtDlpExtractor};
use voxplayer::{CommandSink, Player, PlayerOptions, PlayerRegistry, VoiceSink};
use voxqueue::{EventBus, PipelineEvent, Placement, Queue, QueueSnapshot};

/// Identifiant de l'unique "connexion vocale" de la console
const CONSOLE_CONNECTION: &str = "console";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ========== PHASE 1 : Infrastructure ==========

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::load()?;
    tokio::fs::create_dir_all(&config.downloads.directory)
        .await
        .with_context(|| {
            format!(
                "could not create downloads directory {}",
                config.downloads.directory.display()
            )
        })?;
    info!(directory = %config.downloads.directory.display(), "📁 Downloads directory ready");

    // ========== PHASE 2 : Pipeline de lecture ==========

    info!("🎛️ Wiring the playback pipeline...");
    let extractor: Arc<dyn MediaExtractor> = Arc::new(
        YtDlpExtractor::new(&config.downloads.directory)
            .with_binary(&config.extractor.binary)
            .with_format(&config.extractor.format),
    );
    let deps = EntryDeps::new(Arc::clone(&extractor), &config.downloads.directory);
    let resolver = EntryResolver::new(Arc::clone(&extractor), &config.downloads.directory);

    let bus = Arc::new(EventBus::new());
    let queue = Arc::new(
        Queue::new(Arc::clone(&bus)).with_history_limit(config.queue.history_limit),
    );

    let sink: Arc<dyn VoiceSink> =
        Arc::new(CommandSink::new(CONSOLE_CONNECTION).with_binary(&config.player.binary));
    let registry = PlayerRegistry::default();
    let player = registry.get_or_create(CONSOLE_CONNECTION, || {
        Player::new(
            Arc::clone(&queue),
            Arc::clone(&bus),
            Arc::clone(&sink),
            PlayerOptions {
                volume: config.player.volume,
                autoplay_delay: config.player.autoplay_delay(),
                cleanup_finished: config.downloads.cleanup_finished,
            },
        )
    });
    player.connect_autoplay();

    // Fil d'annonces: chaque événement du pipeline devient une ligne de log
    let mut feed = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match feed.recv().await {
                Ok(event) => announce(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event feed lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    info!(sink = %player.sink_description(), "✅ VoxMusic is ready!");

    // ========== PHASE 3 : Console ==========

    let jukebox = Jukebox {
        resolver,
        deps,
        queue: Arc::clone(&queue),
        player: Arc::clone(&player),
    };
    println!("VoxMusic. Tapez `help` pour la liste des commandes.");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                println!();
                info!("⏹️ Interrupted");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break; // stdin fermé
                };
                match jukebox.dispatch(line.trim()).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(error) => println!("⚠️ {error:#}"),
                }
            }
        }
    }

    // ========== PHASE 4 : Arrêt ==========

    registry.remove(CONSOLE_CONNECTION).await;
    info!("👋 VoxMusic stopped");
    Ok(())
}

/// Traduit les lignes de la console en appels de pipeline
struct Jukebox {
    resolver: EntryResolver,
    deps: EntryDeps,
    queue: Arc<Queue>,
    player: Arc<Player>,
}

impl Jukebox {
    /// Exécute une ligne de commande. Renvoie `false` pour quitter.
    async fn dispatch(&self, line: &str) -> anyhow::Result<bool> {
        if line.is_empty() {
            return Ok(true);
        }
        let (command, rest) = match line.split_once(' ') {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };
        match command {
            "add" => self.add(rest).await?,
            "stream" => self.add_stream(rest).await?,
            "play" => self.player.play().await?,
            "pause" => self.player.pause().await?,
            "resume" => self.player.resume().await?,
            "skip" => self.player.skip().await?,
            "stop" => self.player.stop().await,
            "seek" => {
                let seconds: f64 = rest.parse().context("usage: seek <secondes>")?;
                self.player.seek(seconds).await?;
            }
            "vol" => {
                let volume: f32 = rest.parse().context("usage: vol <0..1]")?;
                self.player.set_volume(volume).await?;
                println!("🔊 volume {volume}");
            }
            "repeat" => println!("🔁 repeat: {}", self.player.cycle_repeat()),
            "np" => self.now_playing(),
            "list" => self.list(),
            "history" => self.history(),
            "move" => {
                let (from, to) = parse_pair(rest).context("usage: move <de> <vers>")?;
                match self.queue.move_entry(from, to) {
                    Some(entry) => println!("↔️ {} → position {to}", entry.title()),
                    None => println!("rien à déplacer"),
                }
            }
            "drop" => {
                anyhow::ensure!(!rest.is_empty(), "usage: drop <position|url|titre>");
                let removed = match rest.parse::<usize>() {
                    Ok(position) => self.queue.remove_at(position),
                    Err(_) => self.queue.remove_by_locator(rest),
                };
                match removed {
                    Some(entry) => println!("🗑️ retiré: {}", entry.title()),
                    None => println!("rien ne correspond"),
                }
            }
            "shuffle" => {
                self.queue.shuffle();
                println!("🔀 file mélangée");
            }
            "clear" => println!("🧹 {} entrée(s) retirée(s)", self.queue.clear()),
            "replay" => {
                let index: usize = if rest.is_empty() {
                    0
                } else {
                    rest.parse().context("usage: replay [index]")?
                };
                match self.queue.replay(index) {
                    Some(entry) => println!("↩️ rejoue: {}", entry.title()),
                    None => println!("pas d'entrée d'historique {index}"),
                }
            }
            "save" => self.save(rest).await?,
            "load" => self.load(rest).await?,
            "help" => print_help(),
            "quit" | "exit" => return Ok(false),
            other => println!("commande inconnue: {other} (voir `help`)"),
        }
        Ok(true)
    }

    /// Résout un localisateur ou une recherche et l'ajoute à la file
    async fn add(&self, input: &str) -> anyhow::Result<()> {
        anyhow::ensure!(!input.is_empty(), "usage: add <url|recherche>");
        match self.resolver.resolve(input, console_meta()).await? {
            Resolved::Entry(entry) => {
                let position = self.queue.push(entry, Placement::End);
                match self.queue.estimate_wait(position, self.player.remaining()) {
                    Some(wait) => {
                        println!("➕ position {position}, lecture dans ~{}", clock(wait));
                    }
                    None => println!("➕ position {position}"),
                }
            }
            Resolved::Playlist(members) => {
                println!("📜 collection de {} membres, résolution...", members.len());
                let batch = self.resolver.resolve_many(&members, &console_meta()).await;
                let (added, skipped) = (batch.added(), batch.skipped());
                for entry in batch.entries {
                    self.queue.push(entry, Placement::End);
                }
                println!("➕ {added} ajoutée(s), {skipped} ignorée(s)");
            }
        }
        Ok(())
    }

    /// Ajoute un flux en direct, sans jamais échouer sur l'extraction
    async fn add_stream(&self, input: &str) -> anyhow::Result<()> {
        anyhow::ensure!(!input.is_empty(), "usage: stream <url>");
        let entry = self.resolver.resolve_stream(input, console_meta()).await;
        let position = self.queue.push(entry, Placement::End);
        println!("📡 flux ajouté en position {position}");
        Ok(())
    }

    fn now_playing(&self) {
        let Some(entry) = self.player.current_entry() else {
            println!("rien en cours ({})", self.player.state());
            return;
        };
        let progress = self.player.progress();
        let position = if entry.is_stream() {
            format!("{} (flux)", clock(progress))
        } else {
            format!("{} / {}", clock(progress), clock(entry.duration()))
        };
        println!("♪ [{}] {} | {position}", self.player.state(), entry.title());
        if let Some(chapter) = entry.chapter_at(progress) {
            println!("   chapitre: {}", chapter.title);
        }
    }

    fn list(&self) {
        let entries = self.queue.entries();
        if entries.is_empty() {
            println!("file vide");
            return;
        }
        let remaining = self.player.remaining();
        for (position, entry) in entries.iter().enumerate() {
            let wait = match self.queue.estimate_wait(position, remaining) {
                Some(wait) => format!(" (dans ~{})", clock(wait)),
                None => String::new(),
            };
            println!("{position:3}. {}{wait}", entry.title());
        }
    }

    fn history(&self) {
        let history = self.queue.history();
        if history.is_empty() {
            println!("historique vide");
            return;
        }
        for (index, record) in history.iter().enumerate() {
            println!(
                "{index:3}. {} (fini à {})",
                record.entry.title(),
                record.finished_at.format("%H:%M:%S")
            );
        }
    }

    /// Sérialise la file (entrées en attente + historique) vers un fichier
    async fn save(&self, path: &str) -> anyhow::Result<()> {
        anyhow::ensure!(!path.is_empty(), "usage: save <fichier>");
        let snapshot = self.queue.snapshot();
        let json = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("could not write {path}"))?;
        println!("💾 file sauvegardée dans {path}");
        Ok(())
    }

    /// Recharge la file depuis un fichier; les entrées restaurées sont
    /// non résolues et se matérialiseront à la lecture
    async fn load(&self, path: &str) -> anyhow::Result<()> {
        anyhow::ensure!(!path.is_empty(), "usage: load <fichier>");
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("could not read {path}"))?;
        let snapshot: QueueSnapshot = serde_json::from_str(&json)?;
        self.queue.restore(snapshot, &self.deps);
        println!("📂 file rechargée: {} entrée(s)", self.queue.len());
        Ok(())
    }
}

/// Métadonnées attachées aux entrées créées depuis la console
fn console_meta() -> EntryMeta {
    let mut meta = EntryMeta::new();
    meta.insert(
        "requested_by".to_string(),
        serde_json::Value::String(CONSOLE_CONNECTION.to_string()),
    );
    meta
}

fn announce(event: &PipelineEvent) {
    match event {
        PipelineEvent::EntryAdded { entry, position } => {
            info!(position, "➕ {}", entry.title());
        }
        PipelineEvent::Play { entry } => info!("▶️ {}", entry.title()),
        PipelineEvent::Pause { entry } => info!("⏸️ {}", entry.title()),
        PipelineEvent::Resume { entry } => info!("⏯️ {}", entry.title()),
        PipelineEvent::Stop => info!("⏹️ playback stopped"),
        PipelineEvent::FinishedPlaying { entry } => info!("🏁 {}", entry.title()),
    }
}

/// `mm:ss`, ou `hh:mm:ss` au-delà de l'heure
fn clock(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let (hours, minutes, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}

fn parse_pair(input: &str) -> Option<(usize, usize)> {
    let (first, second) = input.split_once(' ')?;
    Some((first.trim().parse().ok()?, second.trim().parse().ok()?))
}

fn print_help() {
    println!(
        "\
commandes:
  add <url|recherche>   résout et ajoute à la file
  stream <url>          ajoute un flux en direct
  play / pause / resume / skip / stop
  seek <secondes>       saute à la position donnée
  vol <0..1]            change le volume
  repeat                fait défiler le mode de répétition
  np                    entrée en cours, position et chapitre
  list                  file d'attente et temps d'attente estimés
  history               entrées déjà jouées
  move <de> <vers>      déplace une entrée dans la file
  drop <pos|url|titre>  retire une entrée de la file
  shuffle / clear       mélange / vide la file
  replay [index]        remet une entrée de l'historique en tête
  save <fichier>        sauvegarde la file en JSON
  load <fichier>        recharge une file sauvegardée
  quit                  quitte"
    );
}
