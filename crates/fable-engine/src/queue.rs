//! Cancellable deferred work, grouped by owning node.
//!
//! Each scheduled task sleeps on its own Tokio task and then reports back
//! through a channel. The owner of the queue decides whether the report still
//! counts by calling [`TimedTaskQueue::claim`], so a task cancelled after its
//! delay elapsed, but before its report was handled, never takes effect.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::media::MediaClock;
use fable_core::Duration;
use fable_ir::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

/// When a task fires.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// After a delay on the logical clock.
    After(Duration),
    /// When a media clock reaches a position.
    AtMediaTime { clock: MediaClock, at: Duration },
}

/// A task whose trigger has been reached.
#[derive(Debug)]
pub struct Fired<A> {
    pub owner: NodeId,
    pub task: TaskId,
    pub action: A,
}

struct Scheduled {
    id: TaskId,
    handle: JoinHandle<()>,
}

pub struct TimedTaskQueue<A> {
    tasks: HashMap<NodeId, Vec<Scheduled>>,
    next_id: u64,
    tx: mpsc::UnboundedSender<Fired<A>>,
}

impl<A: Send + 'static> TimedTaskQueue<A> {
    /// Create a queue and the receiver its fired tasks are reported on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Fired<A>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Self {
            tasks: HashMap::new(),
            next_id: 0,
            tx,
        };
        (queue, rx)
    }

    /// Schedule `action` under `owner`. Must be called inside a Tokio runtime.
    pub fn schedule(&mut self, trigger: Trigger, owner: NodeId, action: A) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;

        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            match trigger {
                Trigger::After(delay) => tokio::time::sleep(delay.to_std()).await,
                Trigger::AtMediaTime { clock, at } => clock.wait_until(at).await,
            }
            let fired = Fired {
                owner,
                task: id,
                action,
            };
            if tx.send(fired).is_err() {
                tracing::trace!("task for {} fired after its queue was dropped", owner);
            }
        });

        self.tasks
            .entry(owner)
            .or_default()
            .push(Scheduled { id, handle });
        id
    }

    /// Cancel and forget every outstanding task under `owner`.
    /// Returns how many were cancelled; cancelling nothing is fine.
    pub fn cancel_all(&mut self, owner: &NodeId) -> usize {
        let Some(tasks) = self.tasks.remove(owner) else {
            return 0;
        };
        for task in &tasks {
            task.handle.abort();
        }
        tracing::trace!("cancelled {} tasks for {}", tasks.len(), owner);
        tasks.len()
    }

    /// Accept a fired task. Returns false when it was cancelled in the
    /// meantime, in which case its action must not run.
    pub fn claim(&mut self, fired: &Fired<A>) -> bool {
        let Some(tasks) = self.tasks.get_mut(&fired.owner) else {
            return false;
        };
        let Some(pos) = tasks.iter().position(|t| t.id == fired.task) else {
            return false;
        };
        tasks.remove(pos);
        if tasks.is_empty() {
            self.tasks.remove(&fired.owner);
        }
        true
    }

    pub fn pending(&self, owner: &NodeId) -> usize {
        self.tasks.get(owner).map_or(0, Vec::len)
    }

    pub fn total_pending(&self) -> usize {
        self.tasks.values().map(Vec::len).sum()
    }

    /// Cancel everything, for teardown.
    pub fn clear(&mut self) {
        for (_, tasks) in self.tasks.drain() {
            for task in tasks {
                task.handle.abort();
            }
        }
    }
}

impl<A> Drop for TimedTaskQueue<A> {
    fn drop(&mut self) {
        for tasks in self.tasks.values() {
            for task in tasks {
                task.handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: f64) -> Duration {
        Duration::from_seconds(s)
    }

    async fn sleep_secs(s: u64) {
        tokio::time::sleep(std::time::Duration::from_secs(s)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let (mut queue, mut rx) = TimedTaskQueue::new();
        let owner = NodeId::new();
        queue.schedule(Trigger::After(secs(2.0)), owner, "reveal");

        sleep_secs(1).await;
        assert!(rx.try_recv().is_err());

        sleep_secs(2).await;
        let fired = rx.try_recv().unwrap();
        assert_eq!(fired.action, "reveal");
        assert!(queue.claim(&fired));
        assert_eq!(queue.pending(&owner), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_delay_prevents_firing() {
        let (mut queue, mut rx) = TimedTaskQueue::new();
        let owner = NodeId::new();
        queue.schedule(Trigger::After(secs(2.0)), owner, 1);
        queue.schedule(Trigger::After(secs(3.0)), owner, 2);
        assert_eq!(queue.pending(&owner), 2);

        sleep_secs(1).await;
        assert_eq!(queue.cancel_all(&owner), 2);

        sleep_secs(5).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_elapse_but_before_claim() {
        let (mut queue, mut rx) = TimedTaskQueue::new();
        let owner = NodeId::new();
        queue.schedule(Trigger::After(secs(1.0)), owner, ());

        sleep_secs(2).await;
        queue.cancel_all(&owner);
        let fired = rx.try_recv().unwrap();
        assert!(!queue.claim(&fired));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_is_idempotent() {
        let (mut queue, mut rx) = TimedTaskQueue::new();
        let owner = NodeId::new();
        queue.schedule(Trigger::After(secs(1.0)), owner, ());
        sleep_secs(2).await;
        let fired = rx.try_recv().unwrap();
        assert!(queue.claim(&fired));
        assert_eq!(queue.cancel_all(&owner), 0);
        assert_eq!(queue.cancel_all(&owner), 0);
        assert!(!queue.claim(&fired));
    }

    #[tokio::test(start_paused = true)]
    async fn test_owners_are_independent() {
        let (mut queue, mut rx) = TimedTaskQueue::new();
        let a = NodeId::new();
        let b = NodeId::new();
        queue.schedule(Trigger::After(secs(1.0)), a, 'a');
        queue.schedule(Trigger::After(secs(1.0)), b, 'b');
        queue.cancel_all(&a);
        sleep_secs(2).await;
        let fired = rx.try_recv().unwrap();
        assert_eq!(fired.action, 'b');
        assert!(queue.claim(&fired));
        assert_eq!(queue.total_pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_media_trigger_follows_clock() {
        let (mut queue, mut rx) = TimedTaskQueue::new();
        let clock = MediaClock::started();
        queue.schedule(
            Trigger::AtMediaTime {
                clock: clock.clone(),
                at: secs(2.0),
            },
            NodeId::new(),
            (),
        );
        sleep_secs(1).await;
        clock.pause();
        sleep_secs(5).await;
        assert!(rx.try_recv().is_err());
        clock.resume();
        sleep_secs(2).await;
        assert!(rx.try_recv().is_ok());
    }
}
