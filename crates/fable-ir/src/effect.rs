//! Effects and control messages.
//!
//! Nodes never hold callbacks into the controller. Their activation and
//! deactivation behavior is a list of [`Effect`] values the controller
//! interprets, and anything that needs to talk back to a running controller
//! does so by posting a [`Message`] through a [`ContextHandle`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use fable_core::Duration;

use crate::node::NodeId;

/// Inbound control messages carried by the signal bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message", content = "node", rename_all = "snake_case")]
pub enum Message {
    /// Advance to the next node.
    Proceed,
    /// Pause every active media group.
    PauseMedia,
    /// Resume every active media group.
    ResumeMedia,
    /// The media of the given group played to its end.
    MediaEnded(NodeId),
    /// An observer has seen the given node appear.
    Appeared(NodeId),
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Message::Proceed => write!(f, "proceed"),
            Message::PauseMedia => write!(f, "pause-media"),
            Message::ResumeMedia => write!(f, "resume-media"),
            Message::MediaEnded(id) => write!(f, "media-ended({})", id),
            Message::Appeared(id) => write!(f, "appeared({})", id),
        }
    }
}

/// A side effect fired when a node is activated or deactivated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum Effect {
    /// Request advancement once the current step has finished.
    Proceed,
    /// Request advancement after a delay on the logical clock.
    ProceedAfter { delay: Duration },
    /// Set the shared surroundings dimming level (1.0 = no dimming).
    SetDimming { level: f64 },
    /// Show or clear the overlay caption.
    SetOverlay { text: Option<String> },
    /// Deactivate another node by id.
    Remove { node: NodeId },
    /// Broadcast a message on the signal bus.
    Signal { message: Message },
}

/// Anything that accepts control messages on behalf of a controller.
pub trait ControlSink: Send + Sync {
    fn post(&self, message: Message);
}

/// Back-reference injected into nodes that need to drive the controller.
#[derive(Clone)]
pub struct ContextHandle {
    sink: Arc<dyn ControlSink>,
}

impl ContextHandle {
    pub fn new(sink: Arc<dyn ControlSink>) -> Self {
        Self { sink }
    }

    pub fn post(&self, message: Message) {
        self.sink.post(message);
    }

    pub fn proceed(&self) {
        self.post(Message::Proceed);
    }

    pub fn pause_media(&self) {
        self.post(Message::PauseMedia);
    }

    pub fn resume_media(&self) {
        self.post(Message::ResumeMedia);
    }

    /// Report that `node` has been observed on screen.
    pub fn appeared(&self, node: NodeId) {
        self.post(Message::Appeared(node));
    }
}

impl std::fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextHandle").finish_non_exhaustive()
    }
}
