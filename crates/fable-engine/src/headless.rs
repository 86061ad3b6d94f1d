//! Collaborators for running without a display: everything is logged.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::backend::{MediaBackend, Placement, Renderer, SceneParams};
use crate::media::MediaClock;
use crate::signal::SignalBus;
use fable_core::Duration;
use fable_ir::{Message, Node, NodeId, ResourceHandle};

/// Logs placements and acknowledges instant nodes as seen right away,
/// through the context the controller gave them.
#[derive(Debug, Default)]
pub struct HeadlessRenderer;

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Renderer for HeadlessRenderer {
    fn place(&self, node: &Node, placement: &Placement) {
        match placement.relative_to {
            Some(parent) => tracing::info!("+ {} (relative to {})", node.description, parent),
            None => tracing::info!("+ {}", node.description),
        }
        if node.lifetime.is_instant() {
            match &node.context {
                Some(context) => context.appeared(node.id),
                None => tracing::trace!("{} has no context to acknowledge through", node.id),
            }
        }
    }

    fn remove(&self, node: NodeId) {
        tracing::info!("- {}", node);
    }

    fn apply_scene(&self, params: &SceneParams) {
        tracing::info!(
            "scene: dimming {:.0}%, overlay {}",
            params.dimming * 100.0,
            params.overlay.as_deref().unwrap_or("<none>")
        );
    }
}

/// Media backend that only logs transport changes.
///
/// Nothing is decoded, so a resource's real length is unknown. With
/// [`NullMedia::ending_after`], media whose handle carries no duration
/// reports `MediaEnded` once it has played for the given length.
#[derive(Default)]
pub struct NullMedia {
    ending: Option<Ending>,
}

struct Ending {
    bus: Arc<SignalBus>,
    length: Duration,
    playing: Mutex<HashMap<NodeId, Playback>>,
}

struct Playback {
    clock: MediaClock,
    task: JoinHandle<()>,
}

impl NullMedia {
    /// Never ends media on its own.
    pub fn new() -> Self {
        Self::default()
    }

    /// Posts `MediaEnded` on `bus` after `length` of playback, pauses
    /// excluded.
    pub fn ending_after(bus: Arc<SignalBus>, length: Duration) -> Self {
        Self {
            ending: Some(Ending {
                bus,
                length,
                playing: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn with_playback(&self, node: NodeId, f: impl FnOnce(&Playback)) {
        if let Some(ending) = &self.ending {
            if let Some(playback) = ending.playing.lock().get(&node) {
                f(playback);
            }
        }
    }
}

impl MediaBackend for NullMedia {
    fn start(&self, node: NodeId, handle: &ResourceHandle) {
        tracing::info!("media {} playing {}", node, handle.name);
        let Some(ending) = &self.ending else {
            return;
        };
        // A known length is already tracked by the controller.
        if handle.duration.is_some() {
            return;
        }

        let clock = MediaClock::started();
        let waiting = clock.clone();
        let bus = Arc::clone(&ending.bus);
        let length = ending.length;
        let task = tokio::spawn(async move {
            waiting.wait_until(length).await;
            tracing::debug!("media {} played its assumed {}", node, length);
            bus.broadcast(Message::MediaEnded(node));
        });
        if let Some(previous) = ending.playing.lock().insert(node, Playback { clock, task }) {
            previous.task.abort();
        }
    }

    fn pause(&self, node: NodeId) {
        tracing::info!("media {} paused", node);
        self.with_playback(node, |playback| playback.clock.pause());
    }

    fn resume(&self, node: NodeId) {
        tracing::info!("media {} resumed", node);
        self.with_playback(node, |playback| playback.clock.resume());
    }

    fn stop(&self, node: NodeId) {
        tracing::info!("media {} stopped", node);
        if let Some(ending) = &self.ending {
            if let Some(playback) = ending.playing.lock().remove(&node) {
                playback.task.abort();
            }
        }
    }
}

impl Drop for NullMedia {
    fn drop(&mut self) {
        if let Some(ending) = &self.ending {
            for (_, playback) in ending.playing.lock().drain() {
                playback.task.abort();
            }
        }
    }
}
