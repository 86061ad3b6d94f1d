use crate::node::{Cue, Node, NodeId};
use crate::presentation::{Page, Presentation};
use crate::validate::validate_presentation;

use fable_core::{Duration, FableError, Lifetime};

/// A builder for constructing a Presentation programmatically.
/// Nodes are added first, then referenced by id from groups and pages.
pub struct PresentationBuilder {
    presentation: Presentation,
}

impl PresentationBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            presentation: Presentation::new(title),
        }
    }

    /// Add a node to the arena. Returns its id.
    pub fn add(&mut self, node: Node) -> NodeId {
        self.presentation.nodes.insert(node)
    }

    /// Add a concurrent group over already-added children.
    pub fn concurrent(&mut self, children: Vec<NodeId>) -> NodeId {
        self.add(Node::concurrent(children))
    }

    /// Add a time-indexed sub-timeline.
    pub fn timeline(&mut self, timeline: TimelineBuilder) -> NodeId {
        let cues = self.apply_spans(timeline);
        self.add(Node::timelined(cues))
    }

    /// Add a media-driven sub-timeline over a bundle resource.
    pub fn media(&mut self, resource_name: impl Into<String>, timeline: TimelineBuilder) -> NodeId {
        let cues = self
            .apply_spans(timeline)
            .into_iter()
            .map(|(offset, child)| Cue { offset, child })
            .collect();
        self.add(Node::media(resource_name, cues))
    }

    /// Append a page of top-level nodes.
    pub fn add_page(&mut self, nodes: Vec<NodeId>) -> &mut Self {
        self.presentation.add_page(Page::new(nodes));
        self
    }

    pub fn add_titled_page(&mut self, title: impl Into<String>, nodes: Vec<NodeId>) -> &mut Self {
        self.presentation.add_page(Page::new(nodes).with_title(title));
        self
    }

    /// Build and return the presentation.
    pub fn build(self) -> Presentation {
        self.presentation
    }

    /// Build, rejecting structurally invalid scripts.
    pub fn build_validated(self) -> Result<Presentation, Vec<FableError>> {
        validate_presentation(&self.presentation)?;
        Ok(self.presentation)
    }

    // Cue spans become time-based lifetimes on the children.
    fn apply_spans(&mut self, timeline: TimelineBuilder) -> Vec<(Duration, NodeId)> {
        timeline
            .cues
            .into_iter()
            .map(|(offset, child, lifetime)| {
                if let (Some(lifetime), Some(node)) =
                    (lifetime, self.presentation.nodes.get_mut(&child))
                {
                    node.lifetime = lifetime;
                }
                (offset, child)
            })
            .collect()
    }
}

/// Collects `(offset, child)` cues for timelines and media groups.
#[derive(Debug, Default)]
pub struct TimelineBuilder {
    cues: Vec<(Duration, NodeId, Option<Lifetime>)>,
}

impl TimelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reveal `child` at `offset` seconds, keeping its own lifetime.
    pub fn at(&mut self, offset: f64, child: NodeId) -> &mut Self {
        self.cues.push((Duration::from_seconds(offset), child, None));
        self
    }

    /// Reveal `child` at `offset` and remove it at `end` (seconds).
    pub fn span(&mut self, offset: f64, end: f64, child: NodeId) -> &mut Self {
        let start = Duration::from_seconds(offset);
        let lifetime = Lifetime::timed(Duration::from_seconds(end) - start);
        self.cues.push((start, child, Some(lifetime)));
        self
    }

    /// Reveal `child` at `offset` for `duration` seconds.
    pub fn lasting(&mut self, offset: f64, duration: f64, child: NodeId) -> &mut Self {
        let lifetime = Lifetime::timed(Duration::from_seconds(duration));
        self.cues
            .push((Duration::from_seconds(offset), child, Some(lifetime)));
        self
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }
}
