//! # fable-engine
//!
//! Plays a [`fable_ir::Presentation`]: preloads its resources, then steps
//! through it one node at a time while timers, media clocks and bus messages
//! activate and retire content in between.
//!
//! The renderer, media player and resource loader are traits in [`backend`];
//! [`headless`] provides logging implementations for running without a display.

pub mod backend;
pub mod collector;
pub mod controller;
pub mod headless;
pub mod loader;
pub mod media;
pub mod preload;
pub mod queue;
pub mod signal;

pub use backend::{MediaBackend, Placement, Renderer, ResourceLoader, SceneParams};
pub use collector::ResourceCollector;
pub use controller::{AdvanceOutcome, Controller, ControllerState};
pub use headless::{HeadlessRenderer, NullMedia};
pub use loader::{BundleLoader, MemoryLoader};
pub use media::{classify_cue, removal_time, CueBucket, MediaClock};
pub use preload::{inject_context, load_node, preload};
pub use queue::{Fired, TaskId, TimedTaskQueue, Trigger};
pub use signal::{ChannelReceiver, SignalBus, SignalReceiver, SubscriberId};
