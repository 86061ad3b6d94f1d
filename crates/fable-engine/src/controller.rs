//! The presentation controller: cursor, active set, and every transition
//! between them.
//!
//! All mutation happens on whichever task owns the [`Controller`]. Timers,
//! media cues and bus messages only ever enqueue work; the owner drains it
//! with [`Controller::pump`], [`Controller::next_event`] or [`Controller::run`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::backend::{MediaBackend, Placement, Renderer, ResourceLoader, SceneParams};
use crate::collector::ResourceCollector;
use crate::media::{classify_cue, removal_time, CueBucket, MediaClock};
use crate::preload::{inject_context, preload};
use crate::queue::{Fired, TimedTaskQueue, Trigger};
use crate::signal::{ChannelReceiver, SignalBus, SubscriberId};
use fable_core::{Duration, EngineConfig, FableError, FableResult};
use fable_ir::{
    validate_presentation, ContextHandle, Effect, Message, Node, NodeId, NodeKind, Presentation,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    /// Preload has not completed.
    NotReady,
    /// Inside a single `advance()` call.
    Advancing,
    /// Waiting for the next advance trigger.
    Idle,
    /// The cursor sits on the last node; further advances are no-ops.
    Finished,
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerState::NotReady => write!(f, "not-ready"),
            ControllerState::Advancing => write!(f, "advancing"),
            ControllerState::Idle => write!(f, "idle"),
            ControllerState::Finished => write!(f, "finished"),
        }
    }
}

/// Result of an `advance()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The cursor moved and the node there was activated.
    Advanced { page: usize, index: usize },
    /// Nothing left to advance to; nothing changed.
    Finished,
    /// Called before `start()` completed; nothing changed.
    NotReady,
}

/// Work deferred through the timed task queue.
#[derive(Debug)]
pub enum Deferred {
    /// Reveal a group child.
    Activate {
        node: Node,
        ignore_lifetime: bool,
        /// The media group whose clock governs this child.
        media: Option<NodeId>,
        /// Media time at which the child is taken down again.
        remove_at: Option<Duration>,
        /// Keep the child until an observer acknowledged it.
        hold: bool,
    },
    /// A time-based lifetime ran out.
    Expire(NodeId),
    /// Scheduled removal.
    Deactivate(NodeId),
    /// A media group's clock reached the end of its resource.
    MediaEnded(NodeId),
    /// A held instant child waited long enough.
    AppearanceTimeout(NodeId),
    Proceed,
}

struct ActiveNode {
    node: Node,
    /// Activation order, for deterministic teardown.
    seq: u64,
}

/// An instant media child kept alive until it has been seen.
struct HeldInstant {
    media: NodeId,
    acknowledged: bool,
    timed_out: bool,
}

enum Event {
    Fired(Fired<Deferred>),
    Message(Message),
}

pub struct Controller {
    presentation: Presentation,
    config: EngineConfig,
    state: ControllerState,
    page_index: usize,
    /// None before the first advance.
    node_index: Option<usize>,
    active: HashMap<NodeId, ActiveNode>,
    next_seq: u64,
    queue: TimedTaskQueue<Deferred>,
    fired: mpsc::UnboundedReceiver<Fired<Deferred>>,
    inbox_tx: mpsc::UnboundedSender<Message>,
    inbox: mpsc::UnboundedReceiver<Message>,
    bus: Arc<SignalBus>,
    subscription: Option<SubscriberId>,
    renderer: Arc<dyn Renderer>,
    media: Arc<dyn MediaBackend>,
    clocks: HashMap<NodeId, MediaClock>,
    held: HashMap<NodeId, HeldInstant>,
    collector: Option<ResourceCollector>,
    params: SceneParams,
    /// Queue key for controller-level tasks that no node owns.
    own_key: NodeId,
}

impl Controller {
    /// Create a controller and subscribe it to `bus`.
    pub fn new(
        presentation: Presentation,
        config: EngineConfig,
        bus: Arc<SignalBus>,
        renderer: Arc<dyn Renderer>,
        media: Arc<dyn MediaBackend>,
    ) -> Self {
        let (queue, fired) = TimedTaskQueue::new();
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let subscription = bus.subscribe(Arc::new(ChannelReceiver::new(inbox_tx.clone())));
        Self {
            presentation,
            config,
            state: ControllerState::NotReady,
            page_index: 0,
            node_index: None,
            active: HashMap::new(),
            next_seq: 0,
            queue,
            fired,
            inbox_tx,
            inbox,
            bus,
            subscription: Some(subscription),
            renderer,
            media,
            clocks: HashMap::new(),
            held: HashMap::new(),
            collector: None,
            params: SceneParams::default(),
            own_key: NodeId::new(),
        }
    }

    /// Validate, preload and contextualize the presentation, then become idle.
    ///
    /// Any failure here is fatal: the controller stays not-ready and keeps the
    /// presentation it was created with.
    pub async fn start(&mut self, loader: &dyn ResourceLoader) -> FableResult<()> {
        if self.state != ControllerState::NotReady {
            return Ok(());
        }
        if let Err(errors) = validate_presentation(&self.presentation) {
            let joined = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(FableError::Validation(joined));
        }

        let loaded = preload(&self.presentation, loader).await?;
        self.presentation = inject_context(&loaded, &self.context_handle())?;

        self.collector = Some(ResourceCollector::spawn(
            Arc::clone(&self.renderer),
            self.config.gc_interval(),
        ));
        self.state = if self.next_cursor().is_some() {
            ControllerState::Idle
        } else {
            ControllerState::Finished
        };
        tracing::info!(
            "presentation '{}' ready: {} pages, {} steps",
            self.presentation.title,
            self.presentation.pages.len(),
            self.presentation.step_count()
        );

        if self.config.auto_start && self.state == ControllerState::Idle {
            self.queue.schedule(
                Trigger::After(self.config.start_delay()),
                self.own_key,
                Deferred::Proceed,
            );
        }
        Ok(())
    }

    /// Move to the next beat.
    pub fn advance(&mut self) -> AdvanceOutcome {
        match self.state {
            ControllerState::NotReady => {
                tracing::warn!("advance requested before the presentation was ready");
                return AdvanceOutcome::NotReady;
            }
            ControllerState::Finished => {
                tracing::debug!("advance requested after the last node; ignoring");
                return AdvanceOutcome::Finished;
            }
            ControllerState::Idle | ControllerState::Advancing => {}
        }
        let Some((page, index)) = self.next_cursor() else {
            self.state = ControllerState::Finished;
            return AdvanceOutcome::Finished;
        };
        self.state = ControllerState::Advancing;

        // Only step-counted lifetimes decay.
        for entry in self.active.values_mut() {
            if entry.node.lifetime.is_count_based() {
                entry.node = entry.node.decayed();
            }
        }
        self.refresh_group_lifetimes();

        let reapable: Vec<NodeId> = self
            .active_ids()
            .into_iter()
            .filter(|id| !self.held.contains_key(id))
            .filter(|id| self.active[id].node.lifetime.is_over())
            .collect();

        if page != self.page_index {
            tracing::info!("page {} of {}", page + 1, self.presentation.pages.len());
        }
        self.page_index = page;
        self.node_index = Some(index);

        // The new node appears before expiring nodes are torn down.
        match self.presentation.node_at(page, index).cloned() {
            Some(node) => {
                tracing::debug!("step {}:{} -> {}", page, index, node.description);
                self.activate(node, false);
            }
            None => tracing::warn!("page {} slot {} has no node", page, index),
        }

        for id in reapable {
            self.deactivate(id);
        }

        self.state = if self.next_cursor().is_some() {
            ControllerState::Idle
        } else {
            tracing::info!("reached the end of '{}'", self.presentation.title);
            ControllerState::Finished
        };
        AdvanceOutcome::Advanced { page, index }
    }

    /// Activate a node: add it to the active set, surface its children, fire
    /// its activation effects, and arm its own expiry timer unless
    /// `ignore_lifetime` is set.
    pub fn activate(&mut self, node: Node, ignore_lifetime: bool) {
        let id = node.id;
        if self.active.contains_key(&id) {
            tracing::debug!("{} is already active", id);
            return;
        }
        if node.needs_context && node.context.is_none() {
            tracing::warn!("{} activated without a controller context", id);
        }
        tracing::debug!("activate {} ({})", node.description, node.content_kind());
        self.insert_active(node.clone());

        match &node.kind {
            NodeKind::Concurrent { children } => {
                self.fire_effects(&node.on_activate);
                for child in children {
                    match self.presentation.node(child).cloned() {
                        Some(child) => self.activate(child, false),
                        None => tracing::warn!("concurrent {} lost child {}", id, child),
                    }
                }
            }
            NodeKind::Timelined { children, offsets } => {
                self.fire_effects(&node.on_activate);
                for (child, offset) in children.iter().zip(offsets) {
                    let Some(child) = self.presentation.node(child).cloned() else {
                        tracing::warn!("timeline {} lost child {}", id, child);
                        continue;
                    };
                    let child = tag_parent(child, id);
                    if offset.is_zero() {
                        self.activate(child, false);
                    } else {
                        self.queue.schedule(
                            Trigger::After(*offset),
                            id,
                            Deferred::Activate {
                                node: child,
                                ignore_lifetime: false,
                                media: None,
                                remove_at: None,
                                hold: false,
                            },
                        );
                    }
                }
            }
            NodeKind::Media { .. } => self.activate_media(&node),
            NodeKind::Text { .. } | NodeKind::Image { .. } | NodeKind::Entity { .. } => {
                self.renderer.place(&node, &Placement::for_node(&node));
                self.fire_effects(&node.on_activate);
            }
            NodeKind::Event => {
                if self.held.contains_key(&id) {
                    // Held events are shown so an observer can acknowledge them.
                    self.renderer.place(&node, &Placement::for_node(&node));
                }
                self.fire_effects(&node.on_activate);
            }
        }

        if !ignore_lifetime && !node.lifetime.is_over() {
            if let Some(duration) = node.lifetime.time_limit() {
                self.queue
                    .schedule(Trigger::After(duration), id, Deferred::Expire(id));
            }
        }
    }

    fn activate_media(&mut self, node: &Node) {
        let id = node.id;
        let NodeKind::Media { resource, cues, .. } = &node.kind else {
            return;
        };

        let clock = MediaClock::started();
        self.clocks.insert(id, clock.clone());
        match resource.handle() {
            Some(handle) => {
                self.media.start(id, handle);
                if let Some(length) = handle.duration {
                    self.queue.schedule(
                        Trigger::AtMediaTime {
                            clock: clock.clone(),
                            at: length,
                        },
                        id,
                        Deferred::MediaEnded(id),
                    );
                }
            }
            None => tracing::warn!("media {} activated before its resource loaded", id),
        }
        self.renderer.place(node, &Placement::for_node(node));
        self.fire_effects(&node.on_activate);

        let tick = self.config.media_tick();
        for cue in cues {
            let Some(child) = self.presentation.node(&cue.child).cloned() else {
                tracing::warn!("media {} lost child {}", id, cue.child);
                continue;
            };
            let remove_at = removal_time(cue.offset, &child.lifetime);
            match classify_cue(cue.offset, &child.lifetime, tick) {
                CueBucket::Immediate => {
                    let child = tag_parent(child, id);
                    let child_id = child.id;
                    self.activate(child, true);
                    if let Some(at) = remove_at {
                        self.queue.schedule(
                            Trigger::AtMediaTime {
                                clock: clock.clone(),
                                at,
                            },
                            id,
                            Deferred::Deactivate(child_id),
                        );
                    }
                }
                CueBucket::DeferredDurable => {
                    let child = tag_parent(child, id);
                    self.queue.schedule(
                        Trigger::AtMediaTime {
                            clock: clock.clone(),
                            at: cue.offset,
                        },
                        id,
                        Deferred::Activate {
                            node: child,
                            ignore_lifetime: true,
                            media: Some(id),
                            remove_at,
                            hold: false,
                        },
                    );
                }
                CueBucket::DeferredInstant => {
                    let child = tag_parent(child, id);
                    self.queue.schedule(
                        Trigger::AtMediaTime {
                            clock: clock.clone(),
                            at: cue.offset,
                        },
                        id,
                        Deferred::Activate {
                            node: child,
                            ignore_lifetime: true,
                            media: Some(id),
                            remove_at: None,
                            hold: true,
                        },
                    );
                }
            }
        }
    }

    /// Remove an active node by id. A missing id is logged and ignored.
    pub fn remove(&mut self, id: NodeId) -> bool {
        if !self.active.contains_key(&id) {
            tracing::warn!("{}", FableError::lookup_miss(id));
            return false;
        }
        self.deactivate(id)
    }

    /// Children first, then pending work and resources, then the node's own
    /// effects, then the active set entry.
    fn deactivate(&mut self, id: NodeId) -> bool {
        let Some(node) = self.active.get(&id).map(|e| e.node.clone()) else {
            return false;
        };
        for child in node.children() {
            self.deactivate(child);
        }

        self.queue.cancel_all(&id);
        let was_held = self.held.remove(&id).is_some();
        if let NodeKind::Media { .. } = node.kind {
            if let Some(clock) = self.clocks.remove(&id) {
                clock.pause();
            }
            self.media.stop(id);
        }
        if node.owns_rendered_resource() {
            self.collect_resource(id);
        } else if was_held
            || matches!(node.kind, NodeKind::Text { .. } | NodeKind::Image { .. })
        {
            self.renderer.remove(id);
        }
        self.fire_effects(&node.on_deactivate);
        self.active.remove(&id);
        tracing::debug!("deactivate {} ({})", node.description, id);
        true
    }

    fn collect_resource(&mut self, id: NodeId) {
        match &self.collector {
            Some(collector) => collector.collect(id),
            None => self.renderer.remove(id),
        }
    }

    fn fire_effects(&mut self, effects: &[Effect]) {
        for effect in effects {
            match effect {
                Effect::Proceed => {
                    // Queued so advancement never re-enters itself.
                    let _ = self.inbox_tx.send(Message::Proceed);
                }
                Effect::ProceedAfter { delay } => {
                    self.queue
                        .schedule(Trigger::After(*delay), self.own_key, Deferred::Proceed);
                }
                Effect::SetDimming { level } => {
                    self.params.dimming = level.clamp(0.0, 1.0);
                    self.renderer.apply_scene(&self.params);
                }
                Effect::SetOverlay { text } => {
                    self.params.overlay = text.clone();
                    self.renderer.apply_scene(&self.params);
                }
                Effect::Remove { node } => {
                    self.remove(*node);
                }
                Effect::Signal { message } => self.bus.broadcast(message.clone()),
            }
        }
    }

    /// Handle a control message as if it arrived on the bus.
    pub fn handle_message(&mut self, message: Message) {
        tracing::trace!("message {}", message);
        match message {
            Message::Proceed => {
                self.advance();
            }
            Message::PauseMedia => {
                for (id, clock) in &self.clocks {
                    clock.pause();
                    self.media.pause(*id);
                }
            }
            Message::ResumeMedia => {
                for (id, clock) in &self.clocks {
                    clock.resume();
                    self.media.resume(*id);
                }
                let held: Vec<NodeId> = self.held.keys().copied().collect();
                for id in held {
                    self.release_held(id);
                }
            }
            Message::MediaEnded(id) => self.end_media(id),
            Message::Appeared(id) => match self.held.get_mut(&id) {
                Some(held) => {
                    held.acknowledged = true;
                    self.release_held(id);
                }
                None => tracing::trace!("{} appeared (not held)", id),
            },
        }
    }

    fn handle_fired(&mut self, fired: Fired<Deferred>) {
        if !self.queue.claim(&fired) {
            tracing::trace!("dropping cancelled task of {}", fired.owner);
            return;
        }
        match fired.action {
            Deferred::Activate {
                mut node,
                ignore_lifetime,
                media,
                remove_at,
                hold,
            } => {
                let id = node.id;
                if hold {
                    if let Some(media) = media {
                        // Acknowledgement comes back through the node's context.
                        if node.context.is_none() {
                            node = node.with_context(self.context_handle());
                        }
                        self.held.insert(
                            id,
                            HeldInstant {
                                media,
                                acknowledged: false,
                                timed_out: false,
                            },
                        );
                        self.queue.schedule(
                            Trigger::After(self.config.appearance_timeout()),
                            media,
                            Deferred::AppearanceTimeout(id),
                        );
                    }
                }
                self.activate(node, ignore_lifetime);
                if let (Some(media), Some(at)) = (media, remove_at) {
                    if let Some(clock) = self.clocks.get(&media).cloned() {
                        self.queue.schedule(
                            Trigger::AtMediaTime { clock, at },
                            media,
                            Deferred::Deactivate(id),
                        );
                    }
                }
            }
            Deferred::Expire(id) => match self.active.get_mut(&id) {
                Some(entry) => {
                    entry.node = entry.node.expired();
                    self.deactivate(id);
                }
                None => tracing::warn!("{}", FableError::lookup_miss(id)),
            },
            Deferred::Deactivate(id) => {
                self.remove(id);
            }
            Deferred::MediaEnded(id) => self.end_media(id),
            Deferred::AppearanceTimeout(id) => {
                if let Some(held) = self.held.get_mut(&id) {
                    tracing::debug!("{} was never acknowledged; releasing", id);
                    held.timed_out = true;
                    self.release_held(id);
                }
            }
            Deferred::Proceed => {
                self.advance();
            }
        }
    }

    // Remove a held instant once it was seen (or timed out) and its media is playing.
    fn release_held(&mut self, id: NodeId) {
        let Some(held) = self.held.get(&id) else {
            return;
        };
        let paused = self
            .clocks
            .get(&held.media)
            .map_or(false, MediaClock::is_paused);
        if paused || !(held.acknowledged || held.timed_out) {
            return;
        }
        self.remove(id);
    }

    fn end_media(&mut self, id: NodeId) {
        tracing::info!("media {} ended", id);
        if let Some(entry) = self.active.get_mut(&id) {
            entry.node.lifetime = entry.node.lifetime.with_over(true);
        }
        self.remove(id);
    }

    /// Handle everything already queued, without waiting. Returns how many
    /// events were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        loop {
            if let Ok(fired) = self.fired.try_recv() {
                self.handle_fired(fired);
            } else if let Ok(message) = self.inbox.try_recv() {
                self.handle_message(message);
            } else {
                return handled;
            }
            handled += 1;
        }
    }

    /// Wait for the next timer or message and handle it.
    pub async fn next_event(&mut self) {
        let event = tokio::select! {
            biased;
            Some(fired) = self.fired.recv() => Event::Fired(fired),
            Some(message) = self.inbox.recv() => Event::Message(message),
        };
        match event {
            Event::Fired(fired) => self.handle_fired(fired),
            Event::Message(message) => self.handle_message(message),
        }
    }

    /// Handle events until the surrounding task is cancelled.
    pub async fn run(&mut self) {
        loop {
            self.next_event().await;
        }
    }

    /// Cancel all pending work, deactivate everything, and leave the bus.
    pub async fn shutdown(mut self) {
        if let Some(id) = self.subscription.take() {
            self.bus.unsubscribe(id);
        }
        self.queue.clear();
        for id in self.active_ids() {
            self.deactivate(id);
        }
        if let Some(collector) = self.collector.take() {
            collector.shutdown().await;
        }
        tracing::info!("controller for '{}' shut down", self.presentation.title);
    }

    /// A handle nodes and collaborators can use to post messages back.
    pub fn context_handle(&self) -> ContextHandle {
        ContextHandle::new(Arc::clone(&self.bus) as Arc<dyn fable_ir::ControlSink>)
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// `(page, node)` of the current node, or None before the first advance.
    pub fn cursor(&self) -> Option<(usize, usize)> {
        self.node_index.map(|i| (self.page_index, i))
    }

    pub fn presentation(&self) -> &Presentation {
        &self.presentation
    }

    pub fn is_active(&self, id: &NodeId) -> bool {
        self.active.contains_key(id)
    }

    pub fn active_node(&self, id: &NodeId) -> Option<&Node> {
        self.active.get(id).map(|e| &e.node)
    }

    /// Active ids in activation order.
    pub fn active_ids(&self) -> Vec<NodeId> {
        let mut entries: Vec<(&NodeId, u64)> =
            self.active.iter().map(|(id, e)| (id, e.seq)).collect();
        entries.sort_by_key(|(_, seq)| *seq);
        entries.into_iter().map(|(id, _)| *id).collect()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn scene_params(&self) -> &SceneParams {
        &self.params
    }

    pub fn pending_tasks(&self, owner: &NodeId) -> usize {
        self.queue.pending(owner)
    }

    pub fn media_clock(&self, id: &NodeId) -> Option<&MediaClock> {
        self.clocks.get(id)
    }

    fn insert_active(&mut self, node: Node) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.active.insert(node.id, ActiveNode { node, seq });
    }

    fn next_cursor(&self) -> Option<(usize, usize)> {
        let pages = &self.presentation.pages;
        let (mut page, mut index) = match self.node_index {
            None => (self.page_index, 0),
            Some(i) => (self.page_index, i + 1),
        };
        // Empty pages are skipped.
        while page < pages.len() {
            if index < pages[page].len() {
                return Some((page, index));
            }
            page += 1;
            index = 0;
        }
        None
    }

    /// Recompute the indefinite flag of every active concurrent or timeline
    /// group from its children. Media groups only end with their media.
    fn refresh_group_lifetimes(&mut self) {
        let updates: Vec<(NodeId, bool)> = self
            .active
            .values()
            .filter(|e| e.node.lifetime.is_indefinite())
            .filter(|e| {
                matches!(
                    e.node.kind,
                    NodeKind::Concurrent { .. } | NodeKind::Timelined { .. }
                )
            })
            .map(|e| (e.node.id, self.derived_over(&e.node.id, 0)))
            .collect();
        for (id, over) in updates {
            if let Some(entry) = self.active.get_mut(&id) {
                entry.node.lifetime = entry.node.lifetime.with_over(over);
            }
        }
    }

    fn derived_over(&self, id: &NodeId, depth: usize) -> bool {
        let Some(entry) = self.active.get(id) else {
            // Already reaped.
            return true;
        };
        let node = &entry.node;
        let derived = node.lifetime.is_indefinite()
            && matches!(
                node.kind,
                NodeKind::Concurrent { .. } | NodeKind::Timelined { .. }
            );
        if !derived || depth > self.active.len() {
            return node.lifetime.is_over();
        }
        if matches!(node.kind, NodeKind::Timelined { .. }) && self.queue.pending(id) > 0 {
            return false;
        }
        node.children()
            .iter()
            .all(|child| self.derived_over(child, depth + 1))
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.bus.unsubscribe(id);
        }
    }
}

fn tag_parent(node: Node, parent: NodeId) -> Node {
    if node.references_parent {
        node.with_parent(parent)
    } else {
        node
    }
}
