use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::arena::NodeArena;
use crate::node::{Node, NodeId, NodeKind};

/// One page of the script: an ordered sequence of top-level nodes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub title: Option<String>,
    pub nodes: Vec<NodeId>,
}

impl Page {
    pub fn new(nodes: Vec<NodeId>) -> Self {
        Self { title: None, nodes }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// The authored script, root of the Fable IR tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Presentation {
    /// Unique presentation identifier.
    pub id: String,
    pub title: String,
    /// Ordered pages.
    pub pages: Vec<Page>,
    /// Every node reachable from the pages.
    pub nodes: NodeArena,
}

impl Presentation {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            pages: Vec::new(),
            nodes: NodeArena::new(),
        }
    }

    pub fn add_page(&mut self, page: Page) {
        self.pages.push(page);
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// The top-level node at a cursor position.
    pub fn node_at(&self, page: usize, index: usize) -> Option<&Node> {
        let id = self.pages.get(page)?.nodes.get(index)?;
        self.nodes.get(id)
    }

    /// Number of top-level nodes across all pages (the number of valid advances).
    pub fn step_count(&self) -> usize {
        self.pages.iter().map(Page::len).sum()
    }

    /// Top-level node ids of every page, in order.
    pub fn roots(&self) -> Vec<NodeId> {
        self.pages
            .iter()
            .flat_map(|p| p.nodes.iter().copied())
            .collect()
    }

    /// Load a presentation from its JSON form.
    pub fn from_json(json: &str) -> fable_core::FableResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> fable_core::FableResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Indented tree listing for diagnostics.
    pub fn describe(&self) -> String {
        let mut out = format!("{} ({} pages)\n", self.title, self.pages.len());
        for (i, page) in self.pages.iter().enumerate() {
            match &page.title {
                Some(title) => out.push_str(&format!("page {}: {}\n", i, title)),
                None => out.push_str(&format!("page {}\n", i)),
            }
            for id in &page.nodes {
                self.describe_node(*id, None, 1, &mut out);
            }
        }
        out
    }

    fn describe_node(&self, id: NodeId, offset: Option<String>, depth: usize, out: &mut String) {
        let indent = "  ".repeat(depth);
        let Some(node) = self.nodes.get(&id) else {
            out.push_str(&format!("{}- <missing {}>\n", indent, id));
            return;
        };
        let at = offset.map(|o| format!("{}: ", o)).unwrap_or_default();
        let state = if node.lifetime.is_over() { "over" } else { "alive" };
        let loaded = match node.resource() {
            Some(r) if r.is_loaded() => " [loaded]",
            Some(_) => " [not loaded]",
            None => "",
        };
        out.push_str(&format!(
            "{}- {}{} ({}, {}, {}){}\n",
            indent,
            at,
            node.description,
            node.content_kind(),
            node.lifetime,
            state,
            loaded
        ));
        if depth > self.nodes.len() {
            return;
        }
        match &node.kind {
            NodeKind::Timelined { children, offsets } => {
                for (i, child) in children.iter().enumerate() {
                    let offset = offsets.get(i).map(|o| format!("{:.2}s", o.as_seconds()));
                    self.describe_node(*child, offset, depth + 1, out);
                }
            }
            NodeKind::Media { cues, .. } => {
                for cue in cues {
                    let offset = Some(format!("{:.2}s", cue.offset.as_seconds()));
                    self.describe_node(cue.child, offset, depth + 1, out);
                }
            }
            _ => {
                for child in node.children() {
                    self.describe_node(child, None, depth + 1, out);
                }
            }
        }
    }
}
