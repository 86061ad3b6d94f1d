//! Collaborator interfaces the engine drives but does not implement:
//! the renderer, the media player, and the resource loader.

use async_trait::async_trait;
use fable_core::FableResult;
use fable_ir::{Node, NodeId, ResourceHandle};

/// Where to put a node relative to other content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Placement {
    /// Position relative to this group instead of the scene origin.
    pub relative_to: Option<NodeId>,
}

impl Placement {
    pub fn for_node(node: &Node) -> Self {
        Self {
            relative_to: node.parent,
        }
    }
}

/// Shared parameters effects may change while playing.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneParams {
    /// Surroundings dimming, 1.0 = undimmed.
    pub dimming: f64,
    /// Overlay caption, if any.
    pub overlay: Option<String>,
}

impl Default for SceneParams {
    fn default() -> Self {
        Self {
            dimming: 1.0,
            overlay: None,
        }
    }
}

/// Places and removes node content in the scene.
pub trait Renderer: Send + Sync {
    /// Make `node` visible.
    fn place(&self, node: &Node, placement: &Placement);

    /// Take a node's content out of the scene.
    fn remove(&self, node: NodeId);

    /// Whether a scene resource can be detached right now. The resource
    /// collector retries until this returns true.
    fn is_detachable(&self, _node: NodeId) -> bool {
        true
    }

    fn apply_scene(&self, _params: &SceneParams) {}
}

/// Plays media resources. The engine keeps its own media clock per group and
/// mirrors transport changes here.
pub trait MediaBackend: Send + Sync {
    fn start(&self, node: NodeId, handle: &ResourceHandle);
    fn pause(&self, node: NodeId);
    fn resume(&self, node: NodeId);
    fn stop(&self, node: NodeId);
}

/// Resolves resource names to loaded handles.
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    /// Fails with `FableError::ResourceNotFound` when the name does not resolve.
    async fn load_resource(&self, name: &str) -> FableResult<ResourceHandle>;
}
