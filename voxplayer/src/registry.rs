//! One player per voice connection.

use std::collections::HashMap;
use std::sync::{Arc, RwLock as StdRwLock};

use tracing::{debug, info};

use crate::player::Player;

/// Keeps at most one [`Player`] per voice-connection id.
///
/// Lookups are cheap clones of the shared handle. Removal kills the player
/// so its process and queue do not outlive the connection.
#[derive(Default)]
pub struct PlayerRegistry {
    players: StdRwLock<HashMap<String, Arc<Player>>>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the player bound to `connection_id`, creating it with `build`
    /// on first use.
    pub fn get_or_create(
        &self,
        connection_id: &str,
        build: impl FnOnce() -> Arc<Player>,
    ) -> Arc<Player> {
        if let Some(player) = self.get(connection_id) {
            return player;
        }
        let mut players = self.players.write().unwrap();
        // A racing caller may have created it between the two locks.
        if let Some(player) = players.get(connection_id) {
            return Arc::clone(player);
        }
        let player = build();
        debug!(connection_id, "player created");
        players.insert(connection_id.to_string(), Arc::clone(&player));
        player
    }

    pub fn get(&self, connection_id: &str) -> Option<Arc<Player>> {
        self.players.read().unwrap().get(connection_id).cloned()
    }

    /// Drop the player for `connection_id` and kill it.
    pub async fn remove(&self, connection_id: &str) -> bool {
        let removed = self.players.write().unwrap().remove(connection_id);
        let Some(player) = removed else {
            return false;
        };
        player.kill().await;
        info!(connection_id, "player removed");
        true
    }

    pub fn connection_ids(&self) -> Vec<String> {
        self.players.read().unwrap().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.players.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.read().unwrap().is_empty()
    }
}

impl std::fmt::Debug for PlayerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerRegistry")
            .field("players", &self.len())
            .finish()
    }
}
