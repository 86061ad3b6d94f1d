//! Asynchronous teardown of renderer-owned resources.
//!
//! Reaping happens on the controller's critical path, but the renderer may
//! not be able to let go of a scene resource until its next update. Reaped
//! resources are handed to a background task that polls at a fixed interval
//! and removes each one as soon as the renderer reports it detachable.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::backend::Renderer;
use fable_core::Duration;
use fable_ir::NodeId;

pub struct ResourceCollector {
    tx: mpsc::UnboundedSender<NodeId>,
    task: JoinHandle<()>,
}

impl ResourceCollector {
    /// Spawn the collector task. Must be called inside a Tokio runtime.
    pub fn spawn(renderer: Arc<dyn Renderer>, interval: Duration) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<NodeId>();
        let period = interval.to_std().max(std::time::Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut pending: Vec<NodeId> = Vec::new();
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        pending.retain(|id| !try_detach(renderer.as_ref(), *id));
                    }
                    received = rx.recv() => match received {
                        Some(id) => pending.push(id),
                        None => break,
                    }
                }
            }
            // Channel closed: one last sweep, then give up on the rest.
            pending.retain(|id| !try_detach(renderer.as_ref(), *id));
            if !pending.is_empty() {
                tracing::warn!("{} scene resources were never detachable", pending.len());
            }
        });

        Self { tx, task }
    }

    /// Queue a node's scene resource for removal.
    pub fn collect(&self, node: NodeId) {
        if self.tx.send(node).is_err() {
            tracing::warn!("resource collector stopped; {} not removed", node);
        }
    }

    /// Stop accepting work and let the task finish its final sweep.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.task.await {
            tracing::warn!("resource collector ended abnormally: {}", e);
        }
    }
}

fn try_detach(renderer: &dyn Renderer, id: NodeId) -> bool {
    if renderer.is_detachable(id) {
        renderer.remove(id);
        tracing::trace!("detached scene resource of {}", id);
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Placement;
    use fable_ir::Node;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct Sticky {
        detachable: AtomicBool,
        removed: Mutex<Vec<NodeId>>,
    }

    impl Renderer for Sticky {
        fn place(&self, _node: &Node, _placement: &Placement) {}
        fn remove(&self, node: NodeId) {
            self.removed.lock().push(node);
        }
        fn is_detachable(&self, _node: NodeId) -> bool {
            self.detachable.load(Ordering::SeqCst)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_until_detachable() {
        let renderer = Arc::new(Sticky::default());
        let collector = ResourceCollector::spawn(renderer.clone(), Duration::from_millis(50.0));
        let id = NodeId::new();
        collector.collect(id);

        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        assert!(renderer.removed.lock().is_empty());

        renderer.detachable.store(true, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(*renderer.removed.lock(), vec![id]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_sweeps_once_more() {
        let renderer = Arc::new(Sticky::default());
        renderer.detachable.store(true, Ordering::SeqCst);
        let collector = ResourceCollector::spawn(renderer.clone(), Duration::from_millis(50.0));
        let id = NodeId::new();
        collector.collect(id);
        collector.shutdown().await;
        assert_eq!(*renderer.removed.lock(), vec![id]);
    }
}
