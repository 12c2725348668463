//! # Configuration VoxMusic
//!
//! Chargement de la configuration du pipeline depuis un fichier YAML,
//! avec surcharge par variables d'environnement:
//! - le fichier est cherché via `VOXMUSIC_CONFIG`, puis `voxmusic.yaml`
//!   dans le répertoire courant, puis `~/.voxmusic/voxmusic.yaml`
//! - un fichier absent n'est pas une erreur: les valeurs par défaut
//!   s'appliquent
//! - toute valeur peut être écrasée par une variable
//!   `VOXMUSIC_CONFIG__SECTION__CLE` (ex. `VOXMUSIC_CONFIG__PLAYER__VOLUME=0.5`)
//!
//! Le chargeur renvoie une valeur possédée, à injecter dans les
//! constructeurs des autres crates. Il n'y a pas de singleton global.
//!
//! ## Exemple
//!
//! ```no_run
//! let config = voxconfig::Config::load()?;
//! println!("downloads: {}", config.downloads.directory.display());
//! # Ok::<(), voxconfig::ConfigError>(())
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use tracing::{debug, info};

/// Variable d'environnement donnant le chemin du fichier de configuration
pub const ENV_CONFIG_FILE: &str = "VOXMUSIC_CONFIG";

/// Préfixe des variables d'environnement de surcharge
pub const ENV_PREFIX: &str = "VOXMUSIC_CONFIG__";

/// Nom de fichier cherché quand `VOXMUSIC_CONFIG` n'est pas définie
pub const DEFAULT_CONFIG_FILE: &str = "voxmusic.yaml";

// Valeurs par défaut, alignées sur les constantes des crates du pipeline
const DEFAULT_DOWNLOADS_DIR: &str = "audio_cache";
const DEFAULT_HISTORY_LIMIT: usize = 200;
const DEFAULT_VOLUME: f32 = 0.3;
const DEFAULT_AUTOPLAY_DELAY_SECS: u64 = 2;
const DEFAULT_PLAYER_BINARY: &str = "ffplay";
const DEFAULT_EXTRACTOR_BINARY: &str = "yt-dlp";
const DEFAULT_AUDIO_FORMAT: &str = "bestaudio/best";

/// Alias de Result pour le chargement de configuration
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Erreurs de chargement de la configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Le fichier existe mais n'a pas pu être lu
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML invalide ou types incompatibles avec le schéma
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Configuration complète du pipeline
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub downloads: DownloadsConfig,
    pub queue: QueueConfig,
    pub player: PlayerConfig,
    pub extractor: ExtractorConfig,
}

/// Section `downloads`: cache local des fichiers téléchargés
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadsConfig {
    /// Répertoire des fichiers téléchargés, absolu ou relatif au
    /// répertoire courant
    pub directory: PathBuf,
    /// Supprimer le fichier d'une entrée une fois sa lecture terminée
    pub cleanup_finished: bool,
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_DOWNLOADS_DIR),
            cleanup_finished: false,
        }
    }
}

/// Section `queue`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Nombre maximal d'entrées conservées dans l'historique
    pub history_limit: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

/// Section `player`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Volume initial, dans `(0, 1]`
    pub volume: f32,
    /// Délai en secondes avant que le démarrage automatique ne réagisse
    /// à une entrée ajoutée
    pub autoplay_delay_secs: u64,
    /// Binaire de sortie audio lancé pour chaque lecture
    pub binary: String,
}

impl PlayerConfig {
    /// Délai de démarrage automatique sous forme de [`Duration`]
    pub fn autoplay_delay(&self) -> Duration {
        Duration::from_secs(self.autoplay_delay_secs)
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            volume: DEFAULT_VOLUME,
            autoplay_delay_secs: DEFAULT_AUTOPLAY_DELAY_SECS,
            binary: DEFAULT_PLAYER_BINARY.to_string(),
        }
    }
}

/// Section `extractor`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Binaire d'extraction de métadonnées et de téléchargement
    pub binary: String,
    /// Chaîne de sélection de format passée à l'extracteur
    pub format: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            binary: DEFAULT_EXTRACTOR_BINARY.to_string(),
            format: DEFAULT_AUDIO_FORMAT.to_string(),
        }
    }
}

impl Config {
    /// Charge la configuration depuis l'emplacement standard.
    ///
    /// Le fichier est cherché dans l'ordre suivant:
    /// 1. le chemin donné par la variable `VOXMUSIC_CONFIG`
    /// 2. `voxmusic.yaml` dans le répertoire courant
    /// 3. `~/.voxmusic/voxmusic.yaml`
    ///
    /// Sans fichier, les valeurs par défaut s'appliquent. Les variables
    /// `VOXMUSIC_CONFIG__SECTION__CLE` sont appliquées dans tous les cas.
    pub fn load() -> Result<Self> {
        match Self::find_config_file() {
            Some(path) => Self::load_from(&path),
            None => {
                info!("no config file found, using defaults");
                Self::from_value(Value::Mapping(Mapping::new()), env::vars())
            }
        }
    }

    /// Charge la configuration depuis un fichier YAML donné, puis applique
    /// les surcharges d'environnement.
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "loaded config file");
        let value: Value = serde_yaml::from_str(&text)?;
        Self::from_value(value, env::vars())
    }

    fn find_config_file() -> Option<PathBuf> {
        if let Ok(path) = env::var(ENV_CONFIG_FILE) {
            info!(env_var = ENV_CONFIG_FILE, path = %path, "config file from environment");
            return Some(PathBuf::from(path));
        }
        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }
        if let Some(home) = dirs::home_dir() {
            let candidate = home.join(".voxmusic").join(DEFAULT_CONFIG_FILE);
            if candidate.exists() {
                return Some(candidate);
            }
        }
        None
    }

    /// Point de passage unique: normalise les clés, applique les
    /// surcharges, puis désérialise vers les structures typées.
    fn from_value<I>(value: Value, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut value = lower_keys(value);
        apply_overrides(&mut value, vars);
        Ok(serde_yaml::from_value(value)?)
    }
}

/// Applique les surcharges `VOXMUSIC_CONFIG__SECTION__CLE=valeur` sur
/// l'arbre YAML. Les segments de clé sont séparés par `__` et mis en
/// minuscules; la valeur est interprétée comme du YAML (nombres et
/// booléens typés), sinon gardée comme chaîne.
fn apply_overrides<I>(config: &mut Value, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, raw) in vars {
        let Some(rest) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let path: Vec<String> = rest.split("__").map(str::to_lowercase).collect();
        debug!(key = %key, "environment override");
        set_path(config, &path, parse_scalar(&raw));
    }
}

fn parse_scalar(raw: &str) -> Value {
    match serde_yaml::from_str::<Value>(raw) {
        Ok(parsed) => parsed,
        Err(_) => Value::String(raw.to_string()),
    }
}

/// Écrit `value` au chemin `path`, en créant les mappings intermédiaires.
/// Un scalaire rencontré en chemin est remplacé par un mapping.
fn set_path(node: &mut Value, path: &[String], value: Value) {
    match path.split_first() {
        None => *node = value,
        Some((head, rest)) => {
            if !matches!(node, Value::Mapping(_)) {
                *node = Value::Mapping(Mapping::new());
            }
            if let Value::Mapping(map) = node {
                let entry = map
                    .entry(Value::String(head.clone()))
                    .or_insert(Value::Mapping(Mapping::new()));
                set_path(entry, rest, value);
            }
        }
    }
}

/// Met toutes les clés de mapping en minuscules, récursivement, pour que
/// `Player:`/`PLAYER:` et `player:` désignent la même section.
fn lower_keys(value: Value) -> Value {
    match value {
        Value::Mapping(map) => {
            let mut lowered = Mapping::new();
            for (key, val) in map {
                let key = match key {
                    Value::String(s) => Value::String(s.to_lowercase()),
                    other => other,
                };
                lowered.insert(key, lower_keys(val));
            }
            Value::Mapping(lowered)
        }
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lower_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_vars() -> Vec<(String, String)> {
        Vec::new()
    }

    fn var(key: &str, value: &str) -> (String, String) {
        (key.to_string(), value.to_string())
    }

    #[test]
    fn defaults_cover_every_section() {
        let config = Config::default();
        assert_eq!(config.downloads.directory, PathBuf::from("audio_cache"));
        assert!(!config.downloads.cleanup_finished);
        assert_eq!(config.queue.history_limit, 200);
        assert_eq!(config.player.volume, 0.3);
        assert_eq!(config.player.autoplay_delay(), Duration::from_secs(2));
        assert_eq!(config.player.binary, "ffplay");
        assert_eq!(config.extractor.binary, "yt-dlp");
        assert_eq!(config.extractor.format, "bestaudio/best");
    }

    #[test]
    fn partial_yaml_keeps_defaults_elsewhere() {
        let value: Value = serde_yaml::from_str(
            "player:\n  volume: 0.5\nqueue:\n  history_limit: 50\n",
        )
        .unwrap();
        let config = Config::from_value(value, no_vars()).unwrap();
        assert_eq!(config.player.volume, 0.5);
        assert_eq!(config.queue.history_limit, 50);
        // Les sections non mentionnées gardent leurs valeurs par défaut
        assert_eq!(config.player.binary, "ffplay");
        assert_eq!(config.downloads.directory, PathBuf::from("audio_cache"));
    }

    #[test]
    fn uppercase_section_names_are_normalized() {
        let value: Value =
            serde_yaml::from_str("Player:\n  Volume: 0.9\nEXTRACTOR:\n  Binary: youtube-dl\n")
                .unwrap();
        let config = Config::from_value(value, no_vars()).unwrap();
        assert_eq!(config.player.volume, 0.9);
        assert_eq!(config.extractor.binary, "youtube-dl");
    }

    #[test]
    fn environment_overrides_win_over_the_file() {
        let value: Value = serde_yaml::from_str("player:\n  volume: 0.5\n").unwrap();
        let vars = vec![
            var("VOXMUSIC_CONFIG__PLAYER__VOLUME", "0.8"),
            var("VOXMUSIC_CONFIG__QUEUE__HISTORY_LIMIT", "10"),
            var("VOXMUSIC_CONFIG__DOWNLOADS__CLEANUP_FINISHED", "true"),
            var("VOXMUSIC_CONFIG__EXTRACTOR__BINARY", "yt-dlp-nightly"),
        ];
        let config = Config::from_value(value, vars).unwrap();
        assert_eq!(config.player.volume, 0.8);
        assert_eq!(config.queue.history_limit, 10);
        assert!(config.downloads.cleanup_finished);
        assert_eq!(config.extractor.binary, "yt-dlp-nightly");
    }

    #[test]
    fn unrelated_variables_are_ignored() {
        let vars = vec![
            var("PATH", "/usr/bin"),
            var("VOXMUSIC_CONFIGURATION", "oops"),
            var("VOXMUSIC_CONFIG", "/etc/voxmusic.yaml"),
        ];
        let config = Config::from_value(Value::Mapping(Mapping::new()), vars).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn override_creates_missing_sections() {
        let vars = vec![var("VOXMUSIC_CONFIG__PLAYER__AUTOPLAY_DELAY_SECS", "0")];
        let config = Config::from_value(Value::Mapping(Mapping::new()), vars).unwrap();
        assert_eq!(config.player.autoplay_delay(), Duration::ZERO);
    }

    #[test]
    fn load_from_reads_a_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voxmusic.yaml");
        fs::write(&path, "downloads:\n  directory: /tmp/vox\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.downloads.directory, PathBuf::from("/tmp/vox"));
        assert_eq!(config.queue.history_limit, 200);
    }

    #[test]
    fn load_from_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        let error = Config::load_from(&path).unwrap_err();
        assert!(matches!(error, ConfigError::Read { .. }));
    }

    #[test]
    fn mistyped_values_are_rejected() {
        let value: Value = serde_yaml::from_str("player:\n  volume: loud\n").unwrap();
        let error = Config::from_value(value, no_vars()).unwrap_err();
        assert!(matches!(error, ConfigError::Parse(_)));
    }
}
