//! Typed event bus for the playback pipeline
//!
//! Components announce what happened; listeners react. Registration is
//! per event kind and listeners fire in registration order. A failing
//! listener is logged and never prevents the remaining ones from running.
//!
//! Two listener flavors are supported: synchronous closures, invoked
//! inline during [`EventBus::emit`], and async closures, spawned on the
//! runtime fire-and-forget. A `broadcast` feed is also exposed for
//! consumers that prefer pulling events from a channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock as StdRwLock;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::broadcast;
use tracing::warn;

use voxentry::Entry;

/// Everything the pipeline announces
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// An entry joined the queue at `position`
    EntryAdded { entry: Arc<Entry>, position: usize },
    /// Playback of `entry` started
    Play { entry: Arc<Entry> },
    /// Playback of `entry` was paused
    Pause { entry: Arc<Entry> },
    /// Playback of `entry` resumed
    Resume { entry: Arc<Entry> },
    /// Playback stopped without a current entry remaining
    Stop,
    /// `entry` finished playing (naturally or skipped)
    FinishedPlaying { entry: Arc<Entry> },
}

impl PipelineEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            PipelineEvent::EntryAdded { .. } => EventKind::EntryAdded,
            PipelineEvent::Play { .. } => EventKind::Play,
            PipelineEvent::Pause { .. } => EventKind::Pause,
            PipelineEvent::Resume { .. } => EventKind::Resume,
            PipelineEvent::Stop => EventKind::Stop,
            PipelineEvent::FinishedPlaying { .. } => EventKind::FinishedPlaying,
        }
    }

    /// The entry the event is about, when there is one
    pub fn entry(&self) -> Option<&Arc<Entry>> {
        match self {
            PipelineEvent::EntryAdded { entry, .. }
            | PipelineEvent::Play { entry }
            | PipelineEvent::Pause { entry }
            | PipelineEvent::Resume { entry }
            | PipelineEvent::FinishedPlaying { entry } => Some(entry),
            PipelineEvent::Stop => None,
        }
    }
}

/// Discriminant used for listener registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    EntryAdded,
    Play,
    Pause,
    Resume,
    Stop,
    FinishedPlaying,
}

/// Token returned by registration, used to unregister later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type SyncListener = Arc<dyn Fn(&PipelineEvent) -> anyhow::Result<()> + Send + Sync>;
type AsyncListener =
    Arc<dyn Fn(PipelineEvent) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

struct Registered<L> {
    id: ListenerId,
    listener: L,
}

pub struct EventBus {
    counter: AtomicU64,
    sync_listeners: StdRwLock<HashMap<EventKind, Vec<Registered<SyncListener>>>>,
    async_listeners: StdRwLock<HashMap<EventKind, Vec<Registered<AsyncListener>>>>,
    feed: broadcast::Sender<PipelineEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(1),
            sync_listeners: StdRwLock::new(HashMap::new()),
            async_listeners: StdRwLock::new(HashMap::new()),
            feed: broadcast::channel(256).0,
        }
    }

    /// Registers a synchronous listener for one event kind
    ///
    /// Returns a token for [`EventBus::off`].
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&PipelineEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.next_id();
        let mut guard = self.sync_listeners.write().unwrap();
        guard.entry(kind).or_default().push(Registered {
            id,
            listener: Arc::new(listener),
        });
        id
    }

    /// Registers an async listener for one event kind
    ///
    /// The future is spawned on the runtime at emission time; emitters
    /// never wait for it.
    pub fn on_async<F, Fut>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(PipelineEvent) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id = self.next_id();
        let boxed: AsyncListener = Arc::new(move |event| Box::pin(listener(event)));
        let mut guard = self.async_listeners.write().unwrap();
        guard
            .entry(kind)
            .or_default()
            .push(Registered { id, listener: boxed });
        id
    }

    /// Drops every registered listener, both flavors
    ///
    /// Used when the owning player is torn down. Broadcast subscribers
    /// keep their receiver but will simply see no further events from
    /// this bus.
    pub fn clear(&self) {
        self.sync_listeners.write().unwrap().clear();
        self.async_listeners.write().unwrap().clear();
    }

    /// Unregisters a listener; returns whether it was still registered
    pub fn off(&self, id: ListenerId) -> bool {
        let mut removed = false;
        {
            let mut guard = self.sync_listeners.write().unwrap();
            for listeners in guard.values_mut() {
                let before = listeners.len();
                listeners.retain(|registered| registered.id != id);
                removed |= listeners.len() != before;
            }
        }
        {
            let mut guard = self.async_listeners.write().unwrap();
            for listeners in guard.values_mut() {
                let before = listeners.len();
                listeners.retain(|registered| registered.id != id);
                removed |= listeners.len() != before;
            }
        }
        removed
    }

    /// Emits an event to every listener registered for its kind
    ///
    /// Synchronous listeners run inline, in registration order; a failure
    /// is logged and the iteration continues. Async listeners are then
    /// spawned, and the event is finally pushed on the broadcast feed
    /// (ignored when nobody subscribed).
    pub fn emit(&self, event: PipelineEvent) {
        let kind = event.kind();
        let sync: Vec<SyncListener> = {
            let guard = self.sync_listeners.read().unwrap();
            guard
                .get(&kind)
                .map(|listeners| {
                    listeners
                        .iter()
                        .map(|registered| Arc::clone(&registered.listener))
                        .collect()
                })
                .unwrap_or_default()
        };
        for listener in &sync {
            if let Err(error) = listener(&event) {
                warn!(?kind, "event listener failed: {error:#}");
            }
        }

        let asynchronous: Vec<AsyncListener> = {
            let guard = self.async_listeners.read().unwrap();
            guard
                .get(&kind)
                .map(|listeners| {
                    listeners
                        .iter()
                        .map(|registered| Arc::clone(&registered.listener))
                        .collect()
                })
                .unwrap_or_default()
        };
        for listener in asynchronous {
            let event = event.clone();
            tokio::spawn(async move {
                if let Err(error) = listener(event).await {
                    warn!(?kind, "async event listener failed: {error:#}");
                }
            });
        }

        let _ = self.feed.send(event);
    }

    /// Channel view of the bus, all kinds mixed
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.feed.subscribe()
    }

    fn next_id(&self) -> ListenerId {
        ListenerId(self.counter.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}
