//! # VoxQueue - File de lecture et bus d'événements
//!
//! La file ordonne les entrées à venir, conserve un historique borné des
//! entrées terminées et pré-charge la tête pour enchaîner sans temps
//! mort. Le bus d'événements typés ([`EventBus`]) relie la file, le
//! lecteur et les surfaces de commande sans couplage direct: chacun émet,
//! les autres écoutent.

mod events;
mod queue;

pub use events::{EventBus, EventKind, ListenerId, PipelineEvent};
pub use queue::{
    FinishedEntry, FinishedSnapshot, Placement, Queue, QueueSnapshot, DEFAULT_HISTORY_LIMIT,
};
