//! File de lecture
//!
//! La file conserve les entrées à venir dans l'ordre de passage et les
//! entrées terminées dans un historique borné, la plus récente en tête.
//! Toute mutation qui change la tête déclenche le pré-chargement de la
//! nouvelle tête, pour que le média suivant soit prêt au moment d'être
//! joué.
//!
//! [`Queue::pop_next`] prépare l'entrée qu'elle rend: une entrée dont la
//! matérialisation échoue est sautée, jamais rendue, et la suivante prend
//! sa place.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::RwLock as StdRwLock;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use voxentry::{Entry, EntryDeps, EntrySnapshot};

use crate::events::{EventBus, PipelineEvent};

/// Taille maximale de l'historique par défaut
pub const DEFAULT_HISTORY_LIMIT: usize = 200;

/// Où insérer une nouvelle entrée
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Placement {
    /// En queue de file
    #[default]
    End,
    /// À une position tirée au hasard
    Random,
    /// À une position donnée (bornée à la fin de la file)
    Index(usize),
}

/// Entrée terminée, datée
#[derive(Debug, Clone)]
pub struct FinishedEntry {
    pub entry: Arc<Entry>,
    pub finished_at: DateTime<Utc>,
}

/// Forme sérialisable de la file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub entries: Vec<EntrySnapshot>,
    #[serde(default)]
    pub history: Vec<FinishedSnapshot>,
}

/// Entrée d'historique persistée
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinishedSnapshot {
    #[serde(flatten)]
    pub entry: EntrySnapshot,
    pub finished_at: DateTime<Utc>,
}

pub struct Queue {
    entries: StdRwLock<VecDeque<Arc<Entry>>>,
    history: StdRwLock<Vec<FinishedEntry>>,
    history_limit: usize,
    bus: Arc<EventBus>,
}

impl Queue {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            entries: StdRwLock::new(VecDeque::new()),
            history: StdRwLock::new(Vec::new()),
            history_limit: DEFAULT_HISTORY_LIMIT,
            bus,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }

    /// Copie de travail des entrées à venir
    pub fn entries(&self) -> Vec<Arc<Entry>> {
        self.entries.read().unwrap().iter().cloned().collect()
    }

    /// Prochaine entrée à jouer, sans la retirer
    pub fn peek(&self) -> Option<Arc<Entry>> {
        self.entries.read().unwrap().front().cloned()
    }

    /// Insère une entrée et retourne sa position
    ///
    /// Si l'entrée devient la tête de file, son pré-chargement démarre
    /// immédiatement.
    pub fn push(&self, entry: Arc<Entry>, placement: Placement) -> usize {
        let position = {
            let mut entries = self.entries.write().unwrap();
            let position = match placement {
                Placement::End => entries.len(),
                Placement::Index(index) => index.min(entries.len()),
                Placement::Random => {
                    if entries.is_empty() {
                        0
                    } else {
                        rand::rng().random_range(0..entries.len())
                    }
                }
            };
            entries.insert(position, Arc::clone(&entry));
            position
        };
        if position == 0 {
            entry.prefetch();
        }
        debug!(entry = %entry.id(), position, "entry queued");
        self.bus.emit(PipelineEvent::EntryAdded {
            entry,
            position,
        });
        position
    }

    /// Retire et prépare la prochaine entrée jouable
    ///
    /// Le pré-chargement de la nouvelle tête démarre pendant que l'entrée
    /// retirée finit de se préparer. Une entrée en échec est sautée et la
    /// suivante est essayée, jusqu'à épuisement de la file.
    pub async fn pop_next(&self) -> Option<Arc<Entry>> {
        loop {
            let entry = self.entries.write().unwrap().pop_front()?;
            if let Some(next) = self.peek() {
                next.prefetch();
            }
            match entry.ready().await {
                Ok(()) => return Some(entry),
                Err(error) => {
                    warn!(entry = %entry.id(), title = %entry.title(), "skipping broken entry: {error}");
                }
            }
        }
    }

    /// Retire l'entrée à la position donnée
    pub fn remove_at(&self, position: usize) -> Option<Arc<Entry>> {
        let removed = self.entries.write().unwrap().remove(position);
        if position == 0 {
            if let Some(next) = self.peek() {
                next.prefetch();
            }
        }
        removed
    }

    /// Retire la première entrée dont le localisateur ou le titre
    /// correspond (le titre est comparé sans tenir compte de la casse)
    pub fn remove_by_locator(&self, url_or_title: &str) -> Option<Arc<Entry>> {
        let needle = url_or_title.trim();
        let (removed, was_head) = {
            let mut entries = self.entries.write().unwrap();
            let position = entries.iter().position(|entry| {
                entry.locator() == needle || entry.title().eq_ignore_ascii_case(needle)
            })?;
            (entries.remove(position)?, position == 0)
        };
        if was_head {
            if let Some(next) = self.peek() {
                next.prefetch();
            }
        }
        Some(removed)
    }

    /// Fait passer une entrée en tête de file
    pub fn promote_to_front(&self, position: usize) -> Option<Arc<Entry>> {
        let entry = {
            let mut entries = self.entries.write().unwrap();
            let entry = entries.remove(position)?;
            entries.push_front(Arc::clone(&entry));
            entry
        };
        entry.prefetch();
        self.bus.emit(PipelineEvent::EntryAdded {
            entry: Arc::clone(&entry),
            position: 0,
        });
        Some(entry)
    }

    /// Fait passer la dernière entrée en tête de file
    ///
    /// Sans objet quand la file compte moins de deux entrées.
    pub fn promote_last_to_front(&self) -> Option<Arc<Entry>> {
        {
            let entries = self.entries.read().unwrap();
            if entries.len() < 2 {
                return None;
            }
        }
        let last = self.len().checked_sub(1)?;
        self.promote_to_front(last)
    }

    /// Déplace une entrée d'une position à une autre; la destination est
    /// ramenée dans les bornes, comme [`Placement::Index`]
    pub fn move_entry(&self, from: usize, to: usize) -> Option<Arc<Entry>> {
        let (entry, to) = {
            let mut entries = self.entries.write().unwrap();
            let entry = entries.remove(from)?;
            let to = to.min(entries.len());
            entries.insert(to, Arc::clone(&entry));
            (entry, to)
        };
        if to == 0 {
            entry.prefetch();
        }
        Some(entry)
    }

    /// Mélange les entrées à venir
    pub fn shuffle(&self) {
        {
            let mut entries = self.entries.write().unwrap();
            entries.make_contiguous().shuffle(&mut rand::rng());
        }
        if let Some(head) = self.peek() {
            head.prefetch();
        }
    }

    /// Vide la file; l'historique reste intact
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write().unwrap();
        let drained = entries.len();
        entries.clear();
        drained
    }

    /// Consigne une entrée terminée, la plus récente en tête
    ///
    /// Une entrée qui boucle (répétition) ne crée pas de doublons
    /// consécutifs: seule la date de fin est rafraîchie.
    pub fn record_finished(&self, entry: Arc<Entry>) {
        let mut history = self.history.write().unwrap();
        if let Some(latest) = history.first_mut() {
            if latest.entry.id() == entry.id() {
                latest.finished_at = Utc::now();
                return;
            }
        }
        history.insert(
            0,
            FinishedEntry {
                entry,
                finished_at: Utc::now(),
            },
        );
        history.truncate(self.history_limit);
    }

    /// Historique, du plus récent au plus ancien
    pub fn history(&self) -> Vec<FinishedEntry> {
        self.history.read().unwrap().clone()
    }

    /// Rejoue une entrée de l'historique en tête de file
    ///
    /// L'entrée reste dans l'historique. Sa préparation étant mémorisée,
    /// une entrée déjà prête se rejoue sans retéléchargement.
    pub fn replay(&self, history_index: usize) -> Option<Arc<Entry>> {
        let entry = {
            let history = self.history.read().unwrap();
            Arc::clone(&history.get(history_index)?.entry)
        };
        self.push(Arc::clone(&entry), Placement::Index(0));
        Some(entry)
    }

    /// Estimation du temps d'attente, en secondes, avant que l'entrée à
    /// la position donnée ne joue
    ///
    /// Somme des longueurs effectives des entrées qui précèdent, plus le
    /// temps restant de l'entrée en cours fourni par l'appelant. `None`
    /// au-delà de la fin de la file.
    pub fn estimate_wait(&self, position: usize, current_remaining: Option<f64>) -> Option<f64> {
        let entries = self.entries.read().unwrap();
        if position > entries.len() {
            return None;
        }
        let ahead: f64 = entries
            .iter()
            .take(position)
            .map(|entry| entry.effective_length())
            .sum();
        Some(ahead + current_remaining.unwrap_or(0.0))
    }

    /// Capture la file et son historique
    pub fn snapshot(&self) -> QueueSnapshot {
        let entries = self
            .entries
            .read()
            .unwrap()
            .iter()
            .map(|entry| entry.snapshot())
            .collect();
        let history = self
            .history
            .read()
            .unwrap()
            .iter()
            .map(|finished| FinishedSnapshot {
                entry: finished.entry.snapshot(),
                finished_at: finished.finished_at,
            })
            .collect();
        QueueSnapshot { entries, history }
    }

    /// Recharge la file depuis un instantané, silencieusement
    ///
    /// Les entrées reconstruites ne sont pas préparées; seule la nouvelle
    /// tête est pré-chargée.
    pub fn restore(&self, snapshot: QueueSnapshot, deps: &EntryDeps) {
        {
            let mut entries = self.entries.write().unwrap();
            entries.clear();
            for entry in snapshot.entries {
                entries.push_back(entry.into_entry(deps.clone()));
            }
        }
        {
            let mut history = self.history.write().unwrap();
            history.clear();
            for finished in snapshot.history {
                history.push(FinishedEntry {
                    entry: finished.entry.into_entry(deps.clone()),
                    finished_at: finished.finished_at,
                });
            }
            history.truncate(self.history_limit);
        }
        if let Some(head) = self.peek() {
            head.prefetch();
        }
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("len", &self.len())
            .field("history", &self.history.read().unwrap().len())
            .finish_non_exhaustive()
    }
}
