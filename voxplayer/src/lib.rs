//! Playback engine for VoxMusic
//!
//! This crate turns a queue of entries into actual audio output:
//!
//! - [`Player`]: the playback state machine. One per voice connection, it
//!   pops entries off its [`voxqueue::Queue`], hands them to a sink, and
//!   reacts to completions, faults, skips and seeks.
//! - [`VoiceSink`] / [`OutputProcess`]: the output boundary. A sink spawns
//!   one process per playback attempt; the process reports its phase over a
//!   `watch` channel and measures its own position. [`CommandSink`] shells
//!   out to an external player binary (`ffplay` by default) and
//!   [`SimulatedSink`] fakes the whole thing for tests.
//! - [`PlayerRegistry`]: one player per voice-connection id, with kill on
//!   removal.
//!
//! The player never talks to the network and never blocks on downloads
//! itself: entries arrive ready (or get readied through the queue), and the
//! only async waits are on the sink and the play lock.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use voxplayer::{CommandSink, Player, PlayerOptions};
//! use voxqueue::{EventBus, Queue};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = Arc::new(EventBus::new());
//!     let queue = Arc::new(Queue::new(Arc::clone(&bus)));
//!     let sink = Arc::new(CommandSink::new("main-room"));
//!     let player = Player::new(queue, bus, sink, PlayerOptions::default());
//!     player.connect_autoplay();
//!     player.play().await?;
//!     Ok(())
//! }
//! ```

mod error;
mod player;
mod registry;
mod sink;
mod state;

pub use error::{PlayerError, Result};
pub use player::{Player, PlayerOptions, DEFAULT_AUTOPLAY_DELAY, DEFAULT_VOLUME};
pub use registry::PlayerRegistry;
pub use sink::{
    CommandSink, OutputProcess, PlaybackRequest, ProcessOutcome, ProcessPhase, SimulatedSink,
    SpawnRecord, VoiceSink, DEFAULT_PLAYER_BINARY,
};
pub use state::{PlayerState, RepeatMode};
