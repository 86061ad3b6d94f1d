//! End-to-end playback scenarios against recording collaborators.
//!
//! All tests run on a paused Tokio clock, so sleeps are instant and timers
//! fire in deadline order.

use std::sync::Arc;

use parking_lot::Mutex;

use fable_core::{Duration, EngineConfig, FableError, Lifetime, ResourceKind};
use fable_engine::{
    AdvanceOutcome, Controller, ControllerState, MediaBackend, MemoryLoader, Placement, Renderer,
    SceneParams, SignalBus,
};
use fable_ir::{
    Effect, Message, Node, NodeId, Presentation, PresentationBuilder, ResourceHandle,
    TimelineBuilder,
};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Place(NodeId, Option<NodeId>),
    Remove(NodeId),
    Scene(SceneParams),
}

/// Records every renderer call. Optionally acknowledges instant nodes
/// through the context the controller handed them.
struct Recorder {
    calls: Mutex<Vec<Call>>,
    ack: bool,
}

impl Recorder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            ack: false,
        })
    }

    fn acknowledging() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            ack: true,
        })
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn position(&self, call: &Call) -> Option<usize> {
        self.calls.lock().iter().position(|c| c == call)
    }

    fn removed(&self, id: NodeId) -> bool {
        self.position(&Call::Remove(id)).is_some()
    }
}

impl Renderer for Recorder {
    fn place(&self, node: &Node, placement: &Placement) {
        self.calls
            .lock()
            .push(Call::Place(node.id, placement.relative_to));
        if self.ack && node.lifetime.is_instant() {
            if let Some(context) = &node.context {
                context.appeared(node.id);
            }
        }
    }

    fn remove(&self, node: NodeId) {
        self.calls.lock().push(Call::Remove(node));
    }

    fn apply_scene(&self, params: &SceneParams) {
        self.calls.lock().push(Call::Scene(params.clone()));
    }
}

/// Stands in for a "tap to continue" surface: placing a node that carries a
/// context proceeds through it.
struct Tapper;

impl Renderer for Tapper {
    fn place(&self, node: &Node, _placement: &Placement) {
        if let Some(context) = &node.context {
            context.proceed();
        }
    }

    fn remove(&self, _node: NodeId) {}
}

#[derive(Default)]
struct Transport {
    log: Mutex<Vec<String>>,
}

impl Transport {
    fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

impl MediaBackend for Transport {
    fn start(&self, _node: NodeId, handle: &ResourceHandle) {
        self.log.lock().push(format!("start {}", handle.name));
    }
    fn pause(&self, _node: NodeId) {
        self.log.lock().push("pause".into());
    }
    fn resume(&self, _node: NodeId) {
        self.log.lock().push("resume".into());
    }
    fn stop(&self, _node: NodeId) {
        self.log.lock().push("stop".into());
    }
}

fn config() -> EngineConfig {
    EngineConfig {
        auto_start: false,
        ..EngineConfig::default()
    }
}

fn loader() -> MemoryLoader {
    MemoryLoader::new()
        .with(ResourceHandle::new("globe.usdz", ResourceKind::Model))
        .with(
            ResourceHandle::new("clip.mp4", ResourceKind::Video)
                .with_duration(Duration::from_seconds(10.0)),
        )
}

async fn started(
    presentation: Presentation,
    bus: &Arc<SignalBus>,
    renderer: Arc<Recorder>,
    media: Arc<Transport>,
) -> Controller {
    let mut controller = Controller::new(presentation, config(), Arc::clone(bus), renderer, media);
    controller.start(&loader()).await.unwrap();
    controller
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
}

/// Let timers due within `ms` fire, then handle everything they queued.
async fn settle(controller: &mut Controller, ms: u64) {
    sleep_ms(ms).await;
    controller.pump();
}

#[tokio::test(start_paused = true)]
async fn test_second_advance_replaces_single_step_node() {
    let mut b = PresentationBuilder::new("two leaves");
    let a = b.add(Node::text("A"));
    let c = b.add(Node::text("B"));
    b.add_page(vec![a, c]);

    let bus = Arc::new(SignalBus::new());
    let renderer = Recorder::new();
    let mut controller = started(
        b.build(),
        &bus,
        renderer.clone(),
        Arc::new(Transport::default()),
    )
    .await;
    assert_eq!(controller.state(), ControllerState::Idle);

    assert_eq!(
        controller.advance(),
        AdvanceOutcome::Advanced { page: 0, index: 0 }
    );
    assert_eq!(controller.active_ids(), vec![a]);

    controller.advance();
    assert_eq!(controller.active_ids(), vec![c]);

    // The next node is shown before the expired one is taken down.
    let placed = renderer.position(&Call::Place(c, None)).unwrap();
    let removed = renderer.position(&Call::Remove(a)).unwrap();
    assert!(placed < removed);
}

#[tokio::test(start_paused = true)]
async fn test_advancing_past_the_end_changes_nothing() {
    let mut b = PresentationBuilder::new("three");
    let first = b.add(Node::text("1"));
    let second = b.add(Node::text("2").with_lifetime(Lifetime::steps(3)));
    let third = b.add(Node::text("3"));
    b.add_page(vec![first, second]);
    b.add_page(vec![]);
    b.add_page(vec![third]);

    let bus = Arc::new(SignalBus::new());
    let mut controller = started(
        b.build(),
        &bus,
        Recorder::new(),
        Arc::new(Transport::default()),
    )
    .await;

    assert_eq!(controller.presentation().step_count(), 3);
    for _ in 0..3 {
        assert!(matches!(
            controller.advance(),
            AdvanceOutcome::Advanced { .. }
        ));
    }
    // The empty page was skipped.
    assert_eq!(controller.cursor(), Some((2, 0)));
    assert_eq!(controller.state(), ControllerState::Finished);

    let before = controller.active_ids();
    let remaining = controller.active_node(&second).unwrap().lifetime.clone();
    assert_eq!(controller.advance(), AdvanceOutcome::Finished);
    assert_eq!(controller.cursor(), Some((2, 0)));
    assert_eq!(controller.active_ids(), before);
    assert_eq!(controller.active_node(&second).unwrap().lifetime, remaining);
}

#[tokio::test(start_paused = true)]
async fn test_timeline_reveals_children_at_their_offsets() {
    let mut b = PresentationBuilder::new("timeline");
    let now = b.add(Node::text("now").with_lifetime(Lifetime::Infinite));
    let later = b.add(Node::text("later").with_lifetime(Lifetime::Infinite));
    let mut t = TimelineBuilder::new();
    t.at(0.0, now).at(2.0, later);
    let group = b.timeline(t);
    b.add_page(vec![group]);

    let bus = Arc::new(SignalBus::new());
    let mut controller = started(
        b.build(),
        &bus,
        Recorder::new(),
        Arc::new(Transport::default()),
    )
    .await;

    controller.advance();
    assert!(controller.is_active(&now));
    assert!(!controller.is_active(&later));
    assert_eq!(controller.pending_tasks(&group), 1);

    settle(&mut controller, 2500).await;
    assert!(controller.is_active(&later));
    assert_eq!(controller.pending_tasks(&group), 0);
}

#[tokio::test(start_paused = true)]
async fn test_removing_timeline_cancels_pending_reveal() {
    let mut b = PresentationBuilder::new("timeline");
    let now = b.add(Node::text("now").with_lifetime(Lifetime::Infinite));
    let later = b.add(Node::text("later").with_lifetime(Lifetime::Infinite));
    let mut t = TimelineBuilder::new();
    t.at(0.0, now).at(2.0, later);
    let group = b.timeline(t);
    b.add_page(vec![group]);

    let bus = Arc::new(SignalBus::new());
    let renderer = Recorder::new();
    let mut controller = started(
        b.build(),
        &bus,
        renderer.clone(),
        Arc::new(Transport::default()),
    )
    .await;

    controller.advance();
    settle(&mut controller, 1000).await;
    assert!(controller.remove(group));
    assert!(!controller.is_active(&now));
    assert!(renderer.removed(now));

    settle(&mut controller, 5000).await;
    assert!(!controller.is_active(&later));
    assert!(renderer.position(&Call::Place(later, Some(group))).is_none());
    assert!(renderer.position(&Call::Place(later, None)).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_group_ends_with_its_last_child() {
    let mut b = PresentationBuilder::new("concurrent");
    let short = b.add(Node::text("short"));
    let long = b.add(Node::text("long").with_lifetime(Lifetime::steps(2)));
    let group = b.concurrent(vec![short, long]);
    let n1 = b.add(Node::text("n1"));
    let n2 = b.add(Node::text("n2"));
    let n3 = b.add(Node::text("n3"));
    b.add_page(vec![group, n1, n2, n3]);

    let bus = Arc::new(SignalBus::new());
    let mut controller = started(
        b.build(),
        &bus,
        Recorder::new(),
        Arc::new(Transport::default()),
    )
    .await;

    controller.advance();
    assert_eq!(controller.active_ids(), vec![group, short, long]);

    controller.advance();
    assert!(!controller.is_active(&short));
    assert!(controller.is_active(&long));
    assert!(controller.is_active(&group));

    controller.advance();
    assert!(!controller.is_active(&long));
    assert!(!controller.is_active(&group));
    assert_eq!(controller.active_ids(), vec![n2]);
}

#[tokio::test(start_paused = true)]
async fn test_missing_resource_fails_start() {
    let mut b = PresentationBuilder::new("broken");
    let ok = b.add(Node::entity("globe.usdz"));
    let missing = b.add(Node::entity("nowhere.usdz"));
    b.add_page(vec![ok, missing]);
    let original = b.build();

    let bus = Arc::new(SignalBus::new());
    let mut controller = Controller::new(
        original,
        config(),
        Arc::clone(&bus),
        Recorder::new(),
        Arc::new(Transport::default()),
    );
    let err = controller.start(&loader()).await.unwrap_err();
    assert!(matches!(err, FableError::ResourceNotFound { ref name } if name == "nowhere.usdz"));
    assert!(err.is_fatal());
    assert_eq!(controller.state(), ControllerState::NotReady);
    assert!(!controller.presentation().node(&ok).unwrap().is_loaded());
    assert_eq!(controller.advance(), AdvanceOutcome::NotReady);
    assert_eq!(controller.cursor(), None);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_script_fails_start() {
    let mut p = Presentation::new("dangling");
    p.add_page(fable_ir::Page::new(vec![NodeId::new()]));

    let bus = Arc::new(SignalBus::new());
    let mut controller = Controller::new(
        p,
        config(),
        bus,
        Recorder::new(),
        Arc::new(Transport::default()),
    );
    let err = controller.start(&loader()).await.unwrap_err();
    assert!(matches!(err, FableError::Validation(_)));
}

#[tokio::test(start_paused = true)]
async fn test_activation_effects_precede_deactivation_effects() {
    let mut b = PresentationBuilder::new("effects");
    let first = b.add(Node::text("first").on_deactivate(Effect::SetOverlay {
        text: Some("bye".into()),
    }));
    let second = b.add(Node::text("second").on_activate(Effect::SetDimming { level: 0.4 }));
    b.add_page(vec![first, second]);

    let bus = Arc::new(SignalBus::new());
    let renderer = Recorder::new();
    let mut controller = started(
        b.build(),
        &bus,
        renderer.clone(),
        Arc::new(Transport::default()),
    )
    .await;
    controller.advance();
    controller.advance();

    let scenes: Vec<SceneParams> = renderer
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::Scene(params) => Some(params),
            _ => None,
        })
        .collect();
    assert_eq!(scenes.len(), 2);
    assert_eq!(scenes[0].dimming, 0.4);
    assert_eq!(scenes[0].overlay, None);
    assert_eq!(scenes[1].overlay.as_deref(), Some("bye"));
    assert_eq!(controller.scene_params().dimming, 0.4);
}

#[tokio::test(start_paused = true)]
async fn test_proceed_effect_is_queued_not_reentrant() {
    let mut b = PresentationBuilder::new("auto");
    let go = b.add(Node::event("go", vec![Effect::Proceed]));
    let next = b.add(Node::text("next"));
    b.add_page(vec![go, next]);

    let bus = Arc::new(SignalBus::new());
    let mut controller = started(
        b.build(),
        &bus,
        Recorder::new(),
        Arc::new(Transport::default()),
    )
    .await;

    controller.advance();
    assert_eq!(controller.cursor(), Some((0, 0)));
    assert_eq!(controller.pump(), 1);
    assert_eq!(controller.cursor(), Some((0, 1)));
    assert!(controller.is_active(&next));
    // The instant event was reaped by the second advance.
    assert!(!controller.is_active(&go));
}

#[tokio::test(start_paused = true)]
async fn test_wait_and_proceed() {
    let mut b = PresentationBuilder::new("wait");
    let wait = b.add(Node::wait_and_proceed(Duration::from_seconds(2.0)));
    let next = b.add(Node::text("next"));
    b.add_page(vec![wait, next]);

    let bus = Arc::new(SignalBus::new());
    let mut controller = started(
        b.build(),
        &bus,
        Recorder::new(),
        Arc::new(Transport::default()),
    )
    .await;

    controller.advance();
    settle(&mut controller, 1000).await;
    assert_eq!(controller.cursor(), Some((0, 0)));
    settle(&mut controller, 1500).await;
    assert_eq!(controller.cursor(), Some((0, 1)));
}

#[tokio::test(start_paused = true)]
async fn test_bus_proceed_advances() {
    let mut b = PresentationBuilder::new("bus");
    let a = b.add(Node::text("a"));
    let c = b.add(Node::text("b"));
    b.add_page(vec![a, c]);

    let bus = Arc::new(SignalBus::new());
    let mut controller = started(
        b.build(),
        &bus,
        Recorder::new(),
        Arc::new(Transport::default()),
    )
    .await;

    bus.broadcast(Message::Proceed);
    controller.pump();
    assert_eq!(controller.cursor(), Some((0, 0)));

    controller.context_handle().proceed();
    controller.next_event().await;
    assert_eq!(controller.cursor(), Some((0, 1)));
}

#[tokio::test(start_paused = true)]
async fn test_auto_start_advances_after_delay() {
    let mut b = PresentationBuilder::new("auto start");
    let a = b.add(Node::text("a"));
    b.add_page(vec![a]);

    let bus = Arc::new(SignalBus::new());
    let mut controller = Controller::new(
        b.build(),
        EngineConfig::default(),
        bus,
        Recorder::new(),
        Arc::new(Transport::default()),
    );
    controller.start(&loader()).await.unwrap();
    assert_eq!(controller.cursor(), None);

    settle(&mut controller, 1500).await;
    assert_eq!(controller.cursor(), Some((0, 0)));
    assert_eq!(controller.state(), ControllerState::Finished);
}

#[tokio::test(start_paused = true)]
async fn test_timed_lifetime_expires_on_its_own() {
    let mut b = PresentationBuilder::new("timed");
    let flash = b.add(Node::text("flash").with_lifetime(Lifetime::timed(Duration::from_seconds(3.0))));
    let next = b.add(Node::text("next"));
    b.add_page(vec![flash, next]);

    let bus = Arc::new(SignalBus::new());
    let renderer = Recorder::new();
    let mut controller = started(
        b.build(),
        &bus,
        renderer.clone(),
        Arc::new(Transport::default()),
    )
    .await;

    controller.advance();
    // Not step-counted: advancing does not end it.
    controller.advance();
    assert!(controller.is_active(&flash));

    settle(&mut controller, 3500).await;
    assert!(!controller.is_active(&flash));
    assert!(renderer.removed(flash));
}

#[tokio::test(start_paused = true)]
async fn test_entity_teardown_goes_through_collector() {
    let mut b = PresentationBuilder::new("entities");
    let globe = b.add(Node::entity("globe.usdz"));
    let next = b.add(Node::text("next"));
    b.add_page(vec![globe, next]);

    let bus = Arc::new(SignalBus::new());
    let renderer = Recorder::new();
    let mut controller = started(
        b.build(),
        &bus,
        renderer.clone(),
        Arc::new(Transport::default()),
    )
    .await;

    controller.advance();
    controller.advance();
    assert!(!controller.is_active(&globe));

    sleep_ms(200).await;
    assert!(renderer.removed(globe));
}

#[tokio::test(start_paused = true)]
async fn test_removing_unknown_node_is_harmless() {
    let mut b = PresentationBuilder::new("miss");
    let a = b.add(Node::text("a"));
    b.add_page(vec![a]);

    let bus = Arc::new(SignalBus::new());
    let mut controller = started(
        b.build(),
        &bus,
        Recorder::new(),
        Arc::new(Transport::default()),
    )
    .await;
    controller.advance();

    assert!(!controller.remove(NodeId::new()));
    assert!(controller.remove(a));
    assert!(!controller.remove(a));
    assert_eq!(controller.active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_leaves_bus() {
    let mut b = PresentationBuilder::new("bye");
    let globe = b.add(Node::entity("globe.usdz"));
    b.add_page(vec![globe]);

    let bus = Arc::new(SignalBus::new());
    let renderer = Recorder::new();
    let mut controller = started(
        b.build(),
        &bus,
        renderer.clone(),
        Arc::new(Transport::default()),
    )
    .await;
    assert_eq!(bus.subscriber_count(), 1);
    controller.advance();

    controller.shutdown().await;
    assert_eq!(bus.subscriber_count(), 0);
    assert!(renderer.removed(globe));
}

// Media: caption at 0s for 3s, globe from 2s to 5s, an instant flash at 4s.
struct MediaScript {
    presentation: Presentation,
    media: NodeId,
    caption: NodeId,
    globe: NodeId,
    flash: NodeId,
    after: NodeId,
}

fn media_script() -> MediaScript {
    media_script_with(Node::dim(0.2))
}

fn media_script_with(flash: Node) -> MediaScript {
    let mut b = PresentationBuilder::new("media");
    let caption = b.add(Node::subtitle("Hello", Lifetime::Infinite).referencing_parent());
    let globe = b.add(Node::entity("globe.usdz").referencing_parent());
    let flash = b.add(flash);
    let mut t = TimelineBuilder::new();
    t.lasting(0.0, 3.0, caption)
        .span(2.0, 5.0, globe)
        .at(4.0, flash);
    let media = b.media("clip.mp4", t);
    let after = b.add(Node::text("after"));
    b.add_page(vec![media, after]);
    MediaScript {
        presentation: b.build(),
        media,
        caption,
        globe,
        flash,
        after,
    }
}

#[tokio::test(start_paused = true)]
async fn test_media_cues_follow_the_media_clock() {
    let s = media_script();
    let bus = Arc::new(SignalBus::new());
    let renderer = Recorder::new();
    let transport = Arc::new(Transport::default());
    let mut controller = started(s.presentation, &bus, renderer.clone(), transport.clone()).await;

    controller.advance();
    assert_eq!(transport.log(), vec!["start clip.mp4".to_string()]);
    // Immediate bucket: revealed synchronously, tagged with its group.
    assert!(controller.is_active(&s.caption));
    assert!(renderer
        .position(&Call::Place(s.caption, Some(s.media)))
        .is_some());
    assert!(!controller.is_active(&s.globe));

    settle(&mut controller, 2500).await;
    assert!(controller.is_active(&s.globe));
    assert_eq!(
        controller.active_node(&s.globe).unwrap().parent,
        Some(s.media)
    );

    settle(&mut controller, 1000).await;
    assert!(!controller.is_active(&s.caption));

    settle(&mut controller, 2000).await;
    assert!(!controller.is_active(&s.globe));
}

#[tokio::test(start_paused = true)]
async fn test_pause_holds_cues_until_resume() {
    let s = media_script();
    let bus = Arc::new(SignalBus::new());
    let transport = Arc::new(Transport::default());
    let mut controller = started(s.presentation, &bus, Recorder::new(), transport.clone()).await;

    controller.advance();
    settle(&mut controller, 1000).await;
    bus.broadcast(Message::PauseMedia);
    controller.pump();
    assert!(controller.media_clock(&s.media).unwrap().is_paused());

    settle(&mut controller, 10_000).await;
    assert!(!controller.is_active(&s.globe));
    assert!(controller.is_active(&s.media));

    bus.broadcast(Message::ResumeMedia);
    controller.pump();
    settle(&mut controller, 1500).await;
    assert!(controller.is_active(&s.globe));
    assert_eq!(
        transport.log(),
        vec!["start clip.mp4", "pause", "resume"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_acknowledged_instant_cue_is_released() {
    let s = media_script();
    let bus = Arc::new(SignalBus::new());
    let renderer = Recorder::acknowledging();
    let mut controller = started(
        s.presentation,
        &bus,
        renderer.clone(),
        Arc::new(Transport::default()),
    )
    .await;

    controller.advance();
    settle(&mut controller, 4500).await;
    assert!(renderer.position(&Call::Place(s.flash, None)).is_some());
    assert!(!controller.is_active(&s.flash));
    assert!(renderer.removed(s.flash));
    assert_eq!(controller.scene_params().dimming, 0.2);
}

#[tokio::test(start_paused = true)]
async fn test_context_bound_instant_cue_is_released_through_its_injected_context() {
    let s = media_script_with(Node::dim(0.2).requiring_context());
    let bus = Arc::new(SignalBus::new());
    let renderer = Recorder::acknowledging();
    let mut controller = started(
        s.presentation,
        &bus,
        renderer.clone(),
        Arc::new(Transport::default()),
    )
    .await;
    assert!(controller
        .presentation()
        .node(&s.flash)
        .unwrap()
        .context
        .is_some());

    controller.advance();
    settle(&mut controller, 4100).await;
    assert!(renderer.position(&Call::Place(s.flash, None)).is_some());
    // Released long before the appearance timeout.
    assert!(!controller.is_active(&s.flash));
    assert!(renderer.removed(s.flash));
}

#[tokio::test(start_paused = true)]
async fn test_context_bound_node_proceeds_through_its_context() {
    let mut b = PresentationBuilder::new("tap");
    let plain = b.add(Node::text("plain"));
    let tap = b.add(Node::text("tap to continue").requiring_context());
    let next = b.add(Node::text("next"));
    b.add_page(vec![plain, tap, next]);

    let bus = Arc::new(SignalBus::new());
    let mut controller = Controller::new(
        b.build(),
        config(),
        Arc::clone(&bus),
        Arc::new(Tapper),
        Arc::new(Transport::default()),
    );
    controller.start(&loader()).await.unwrap();

    controller.advance();
    assert_eq!(controller.pump(), 0);
    assert_eq!(controller.cursor(), Some((0, 0)));

    controller.advance();
    assert_eq!(controller.cursor(), Some((0, 1)));
    assert_eq!(controller.pump(), 1);
    assert_eq!(controller.cursor(), Some((0, 2)));
    assert_eq!(controller.active_ids(), vec![next]);
}

#[tokio::test(start_paused = true)]
async fn test_negative_offset_in_script_reveals_at_once() {
    let mut b = PresentationBuilder::new("timeline");
    let child = b.add(Node::text("child"));
    let mut t = TimelineBuilder::new();
    t.at(2.0, child);
    let group = b.timeline(t);
    let after = b.add(Node::text("after"));
    b.add_page(vec![group, after]);
    let json = b
        .build()
        .to_json()
        .unwrap()
        .replace(r#""seconds": 2.0"#, r#""seconds": -2.0"#);

    let bus = Arc::new(SignalBus::new());
    let mut controller = started(
        Presentation::from_json(&json).unwrap(),
        &bus,
        Recorder::new(),
        Arc::new(Transport::default()),
    )
    .await;

    controller.advance();
    assert!(controller.is_active(&child));
    assert_eq!(controller.pending_tasks(&group), 0);

    controller.advance();
    assert!(!controller.is_active(&group));
    assert_eq!(controller.active_ids(), vec![after]);
}

#[tokio::test(start_paused = true)]
async fn test_unwaitable_timeline_offset_fails_start() {
    let mut b = PresentationBuilder::new("forever");
    let child = b.add(Node::text("child"));
    let mut t = TimelineBuilder::new();
    t.at(1e300, child);
    let group = b.timeline(t);
    b.add_page(vec![group]);

    let bus = Arc::new(SignalBus::new());
    let mut controller = Controller::new(
        b.build(),
        config(),
        bus,
        Recorder::new(),
        Arc::new(Transport::default()),
    );
    let err = controller.start(&loader()).await.unwrap_err();
    assert!(
        matches!(err, FableError::Validation(ref reason) if reason.contains("timeline offset"))
    );
}

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_instant_cue_waits_for_timeout_and_playback() {
    let s = media_script();
    let bus = Arc::new(SignalBus::new());
    let mut controller = started(
        s.presentation,
        &bus,
        Recorder::new(),
        Arc::new(Transport::default()),
    )
    .await;

    controller.advance();
    settle(&mut controller, 4500).await;
    assert!(controller.is_active(&s.flash));

    // Held nodes survive advancement even though instant lifetimes are over.
    controller.advance();
    assert!(controller.is_active(&s.after));
    assert!(controller.is_active(&s.flash));

    controller.handle_message(Message::PauseMedia);
    settle(&mut controller, 3000).await;
    assert!(controller.is_active(&s.flash));

    controller.handle_message(Message::ResumeMedia);
    assert!(!controller.is_active(&s.flash));
}

#[tokio::test(start_paused = true)]
async fn test_media_end_retires_group() {
    let s = media_script();
    let bus = Arc::new(SignalBus::new());
    let transport = Arc::new(Transport::default());
    let mut controller = started(
        s.presentation,
        &bus,
        Recorder::acknowledging(),
        transport.clone(),
    )
    .await;

    controller.advance();
    settle(&mut controller, 9000).await;
    assert!(controller.is_active(&s.media));

    settle(&mut controller, 2000).await;
    assert!(!controller.is_active(&s.media));
    assert!(controller.media_clock(&s.media).is_none());
    assert_eq!(transport.log().last().map(String::as_str), Some("stop"));
    assert_eq!(controller.pending_tasks(&s.media), 0);
}

#[tokio::test(start_paused = true)]
async fn test_media_ended_message_stops_early() {
    let s = media_script();
    let bus = Arc::new(SignalBus::new());
    let mut controller = started(
        s.presentation,
        &bus,
        Recorder::new(),
        Arc::new(Transport::default()),
    )
    .await;

    controller.advance();
    bus.broadcast(Message::MediaEnded(s.media));
    controller.pump();
    assert!(!controller.is_active(&s.media));
    assert!(!controller.is_active(&s.caption));

    // Cancelled cues never come back.
    settle(&mut controller, 6000).await;
    assert!(!controller.is_active(&s.globe));
}
