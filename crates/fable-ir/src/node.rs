use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::effect::{ContextHandle, Effect};
use fable_core::{ContentKind, Duration, Lifetime, ResourceKind};

/// Unique identifier for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A loaded resource, as returned by the resource loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub name: String,
    pub kind: ResourceKind,
    /// Playback length, when the loader knows it (media only).
    pub duration: Option<Duration>,
}

impl ResourceHandle {
    pub fn new(name: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// A bundle resource reference, before or after loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Resource {
    Unloaded { name: String },
    Loaded { handle: ResourceHandle },
}

impl Resource {
    pub fn named(name: impl Into<String>) -> Self {
        Resource::Unloaded { name: name.into() }
    }

    pub fn name(&self) -> &str {
        match self {
            Resource::Unloaded { name } => name,
            Resource::Loaded { handle } => &handle.name,
        }
    }

    pub fn handle(&self) -> Option<&ResourceHandle> {
        match self {
            Resource::Loaded { handle } => Some(handle),
            Resource::Unloaded { .. } => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Resource::Loaded { .. })
    }
}

/// Where the renderer should put an entity when it first appears.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityPlacement {
    pub position: [f64; 3],
    /// Position is relative to the viewer rather than the world origin.
    pub relative_to_viewer: bool,
}

/// A media cue: reveal `child` when the media clock crosses `offset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    pub offset: Duration,
    pub child: NodeId,
}

/// What a node is, and which capabilities it has.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    /// Overlay text.
    Text { content: String },
    /// Overlay image looked up by name at render time.
    Image { name: String },
    /// A renderer-placed scene resource. Loadable.
    Entity {
        resource: Resource,
        #[serde(default)]
        placement: EntityPlacement,
        #[serde(default)]
        interactable: bool,
    },
    /// A one-shot event; all behavior lives in its effects.
    Event,
    /// Children are activated together.
    Concurrent { children: Vec<NodeId> },
    /// Children are revealed at offsets from the group's activation.
    Timelined {
        children: Vec<NodeId>,
        offsets: Vec<Duration>,
    },
    /// Children are revealed against the clock of a media resource. Loadable.
    Media {
        resource: Resource,
        cues: Vec<Cue>,
        #[serde(default)]
        placement: EntityPlacement,
    },
}

/// A schedulable unit of presentation content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub description: String,
    pub kind: NodeKind,
    pub lifetime: Lifetime,
    #[serde(default)]
    pub on_activate: Vec<Effect>,
    #[serde(default)]
    pub on_deactivate: Vec<Effect>,
    /// The node wants a [`ContextHandle`] injected before activation.
    #[serde(default)]
    pub needs_context: bool,
    #[serde(skip)]
    pub context: Option<ContextHandle>,
    /// The node is positioned relative to the group that reveals it.
    #[serde(default)]
    pub references_parent: bool,
    #[serde(default)]
    pub parent: Option<NodeId>,
}

impl Node {
    /// Create a node with the default lifetime for its kind.
    pub fn new(kind: NodeKind, description: impl Into<String>) -> Self {
        let lifetime = match &kind {
            NodeKind::Event => Lifetime::Instant,
            NodeKind::Concurrent { .. } | NodeKind::Timelined { .. } | NodeKind::Media { .. } => {
                Lifetime::indefinite()
            }
            _ => Lifetime::default(),
        };
        Self {
            id: NodeId::new(),
            description: description.into(),
            kind,
            lifetime,
            on_activate: Vec::new(),
            on_deactivate: Vec::new(),
            needs_context: false,
            context: None,
            references_parent: false,
            parent: None,
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        let content = content.into();
        let description = format!("Text: {}", content);
        Self::new(NodeKind::Text { content }, description)
    }

    /// Overlay subtitle with an explicit lifetime.
    pub fn subtitle(content: impl Into<String>, lifetime: Lifetime) -> Self {
        let content = content.into();
        let description = format!("Subtitle: {}", content);
        Self::new(NodeKind::Text { content }, description).with_lifetime(lifetime)
    }

    pub fn image(name: impl Into<String>) -> Self {
        let name = name.into();
        let description = format!("Image: {}", name);
        Self::new(NodeKind::Image { name }, description)
    }

    /// A loadable scene resource from the bundle.
    pub fn entity(resource_name: impl Into<String>) -> Self {
        let resource_name = resource_name.into();
        let description = format!("<Entity {}>", resource_name);
        Self::new(
            NodeKind::Entity {
                resource: Resource::named(resource_name),
                placement: EntityPlacement::default(),
                interactable: false,
            },
            description,
        )
    }

    /// A one-shot event firing `effects` on activation.
    pub fn event(description: impl Into<String>, effects: Vec<Effect>) -> Self {
        let mut node = Self::new(NodeKind::Event, description);
        node.on_activate = effects;
        node
    }

    /// One-shot dimming of the surroundings.
    pub fn dim(level: f64) -> Self {
        Self::event(
            format!("<Dimming to {:.0}%>", level * 100.0),
            vec![Effect::SetDimming { level }],
        )
    }

    /// One-shot: wait, then proceed.
    pub fn wait_and_proceed(delay: Duration) -> Self {
        Self::event(
            format!("<Wait {} and proceed>", delay),
            vec![Effect::ProceedAfter { delay }],
        )
    }

    pub fn concurrent(children: Vec<NodeId>) -> Self {
        Self::new(NodeKind::Concurrent { children }, "<Concurrent>")
    }

    /// A sub-timeline from `(offset, child)` pairs.
    pub fn timelined(cues: Vec<(Duration, NodeId)>) -> Self {
        let (offsets, children) = cues.into_iter().unzip();
        Self::new(NodeKind::Timelined { children, offsets }, "<Timeline>")
    }

    /// A media-driven sub-timeline over a bundle resource.
    pub fn media(resource_name: impl Into<String>, cues: Vec<Cue>) -> Self {
        let resource_name = resource_name.into();
        let description = format!("<Media {}>", resource_name);
        Self::new(
            NodeKind::Media {
                resource: Resource::named(resource_name),
                cues,
                placement: EntityPlacement::default(),
            },
            description,
        )
    }

    /// Builder: set the lifetime.
    pub fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Builder: set the id.
    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = id;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder: add an activation effect.
    pub fn on_activate(mut self, effect: Effect) -> Self {
        self.on_activate.push(effect);
        self
    }

    /// Builder: add a deactivation effect.
    pub fn on_deactivate(mut self, effect: Effect) -> Self {
        self.on_deactivate.push(effect);
        self
    }

    /// Builder: require a controller handle.
    pub fn requiring_context(mut self) -> Self {
        self.needs_context = true;
        self
    }

    /// Builder: position relative to the revealing group.
    pub fn referencing_parent(mut self) -> Self {
        self.references_parent = true;
        self
    }

    /// Builder: set entity or media placement. Ignored for other kinds.
    pub fn placed_at(mut self, position: [f64; 3], relative_to_viewer: bool) -> Self {
        match &mut self.kind {
            NodeKind::Entity { placement, .. } | NodeKind::Media { placement, .. } => {
                *placement = EntityPlacement {
                    position,
                    relative_to_viewer,
                };
            }
            _ => {}
        }
        self
    }

    /// Builder: mark an entity interactable. Ignored for other kinds.
    pub fn interactable(mut self) -> Self {
        if let NodeKind::Entity { interactable, .. } = &mut self.kind {
            *interactable = true;
        }
        self
    }

    pub fn content_kind(&self) -> ContentKind {
        match &self.kind {
            NodeKind::Text { .. } => ContentKind::Text,
            NodeKind::Image { .. } => ContentKind::Image,
            NodeKind::Entity { .. } => ContentKind::Entity,
            NodeKind::Event => ContentKind::Event,
            NodeKind::Concurrent { .. } => ContentKind::Concurrent,
            NodeKind::Timelined { .. } => ContentKind::Timelined,
            NodeKind::Media { .. } => ContentKind::Media,
        }
    }

    pub fn is_group(&self) -> bool {
        self.content_kind().is_group()
    }

    /// Child ids in authored order. Empty for leaves.
    pub fn children(&self) -> Vec<NodeId> {
        match &self.kind {
            NodeKind::Concurrent { children } | NodeKind::Timelined { children, .. } => {
                children.clone()
            }
            NodeKind::Media { cues, .. } => cues.iter().map(|c| c.child).collect(),
            _ => Vec::new(),
        }
    }

    /// A copy of this group with a replacement child sequence. Identity,
    /// effects, lifetime, and offsets are preserved; leaves come back unchanged.
    pub fn with_children(&self, new_children: Vec<NodeId>) -> Self {
        let mut copy = self.clone();
        match &mut copy.kind {
            NodeKind::Concurrent { children } | NodeKind::Timelined { children, .. } => {
                *children = new_children;
            }
            NodeKind::Media { cues, .. } => {
                for (cue, child) in cues.iter_mut().zip(new_children) {
                    cue.child = child;
                }
            }
            _ => {}
        }
        copy
    }

    /// The bundle resource behind a loadable node.
    pub fn resource(&self) -> Option<&Resource> {
        match &self.kind {
            NodeKind::Entity { resource, .. } | NodeKind::Media { resource, .. } => Some(resource),
            _ => None,
        }
    }

    pub fn is_loadable(&self) -> bool {
        self.resource().is_some()
    }

    /// Loaded, or nothing to load.
    pub fn is_loaded(&self) -> bool {
        self.resource().map_or(true, Resource::is_loaded)
    }

    /// Whether the renderer owns a scene resource for this node.
    pub fn owns_rendered_resource(&self) -> bool {
        matches!(self.kind, NodeKind::Entity { .. } | NodeKind::Media { .. })
    }

    /// A loaded copy carrying `handle`. Leaves non-loadable nodes unchanged.
    pub fn loaded_with(&self, handle: ResourceHandle) -> Self {
        let mut copy = self.clone();
        match &mut copy.kind {
            NodeKind::Entity { resource, .. } | NodeKind::Media { resource, .. } => {
                *resource = Resource::Loaded { handle };
            }
            _ => {}
        }
        copy
    }

    /// A copy carrying the controller back-reference.
    pub fn with_context(&self, context: ContextHandle) -> Self {
        let mut copy = self.clone();
        copy.context = Some(context);
        copy
    }

    /// A copy tagged with the id of the group that revealed it.
    pub fn with_parent(&self, parent: NodeId) -> Self {
        let mut copy = self.clone();
        copy.parent = Some(parent);
        copy
    }

    /// A copy one advancement step older.
    pub fn decayed(&self) -> Self {
        let mut copy = self.clone();
        copy.lifetime = copy.lifetime.decreased();
        copy
    }

    /// A copy whose time-based lifetime has run out.
    pub fn expired(&self) -> Self {
        let mut copy = self.clone();
        copy.lifetime = copy.lifetime.expired();
        copy
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description)
    }
}
