//! # fable-ir
//!
//! The authored script of a Fable presentation: pages of nodes, stored in a
//! flat arena keyed by id. Every authoring path (builder, JSON script)
//! produces this representation before the engine plays it.

pub mod arena;
pub mod builder;
pub mod effect;
pub mod node;
pub mod presentation;
pub mod validate;

pub use arena::NodeArena;
pub use builder::{PresentationBuilder, TimelineBuilder};
pub use effect::{ContextHandle, ControlSink, Effect, Message};
pub use node::{Cue, EntityPlacement, Node, NodeId, NodeKind, Resource, ResourceHandle};
pub use presentation::{Page, Presentation};
pub use validate::validate_presentation;
