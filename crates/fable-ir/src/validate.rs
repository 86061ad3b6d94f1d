use std::collections::{HashMap, HashSet};

use crate::effect::Effect;
use crate::node::{Node, NodeId, NodeKind};
use crate::presentation::Presentation;
use fable_core::{Duration, FableError};

/// Validate a Presentation for structural correctness.
pub fn validate_presentation(presentation: &Presentation) -> Result<(), Vec<FableError>> {
    let mut errors = Vec::new();

    // Every node has exactly one owner: a page slot or a group.
    let mut owners: HashMap<NodeId, String> = HashMap::new();
    let mut claim = |child: NodeId, owner: String, errors: &mut Vec<FableError>| {
        if let Some(previous) = owners.insert(child, owner.clone()) {
            errors.push(FableError::Validation(format!(
                "node {} is owned by both {} and {}",
                child, previous, owner
            )));
        }
    };

    for (i, page) in presentation.pages.iter().enumerate() {
        for id in &page.nodes {
            if !presentation.nodes.contains(id) {
                errors.push(FableError::Validation(format!(
                    "page {} references missing node {}",
                    i, id
                )));
            }
            claim(*id, format!("page {}", i), &mut errors);
        }
    }

    for node in presentation.nodes.iter() {
        for child in node.children() {
            if !presentation.nodes.contains(&child) {
                errors.push(FableError::Validation(format!(
                    "group {} references missing child {}",
                    node.id, child
                )));
            }
            claim(child, format!("group {}", node.id), &mut errors);
        }

        if let NodeKind::Timelined { children, offsets } = &node.kind {
            if children.len() != offsets.len() {
                errors.push(FableError::Validation(format!(
                    "timeline {} has {} children but {} offsets",
                    node.id,
                    children.len(),
                    offsets.len()
                )));
            }
        }

        for (what, duration) in timed_values(node) {
            if !duration.is_representable() {
                errors.push(FableError::Validation(format!(
                    "node {} has a {} of {} seconds, longer than any timer can wait",
                    node.id,
                    what,
                    duration.as_seconds()
                )));
            }
        }

        for effect in node.on_activate.iter().chain(&node.on_deactivate) {
            if let Effect::SetDimming { level } = effect {
                if !(0.0..=1.0).contains(level) {
                    errors.push(FableError::Validation(format!(
                        "node {} dims to {} (must be within 0..=1)",
                        node.id, level
                    )));
                }
            }
        }
    }

    // Groups must form a tree.
    for node in presentation.nodes.iter() {
        if reaches(presentation, node.id, node.id, &mut HashSet::new()) {
            errors.push(FableError::Validation(format!(
                "node {} contains itself",
                node.id
            )));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// Every duration a timer will be armed with for this node.
fn timed_values(node: &Node) -> Vec<(&'static str, Duration)> {
    let mut values = Vec::new();
    match &node.kind {
        NodeKind::Timelined { offsets, .. } => {
            values.extend(offsets.iter().map(|offset| ("timeline offset", *offset)));
        }
        NodeKind::Media { cues, .. } => {
            values.extend(cues.iter().map(|cue| ("cue offset", cue.offset)));
        }
        _ => {}
    }
    if let Some(duration) = node.lifetime.time_limit() {
        values.push(("lifetime", duration));
    }
    for effect in node.on_activate.iter().chain(&node.on_deactivate) {
        if let Effect::ProceedAfter { delay } = effect {
            values.push(("proceed delay", *delay));
        }
    }
    values
}

fn reaches(
    presentation: &Presentation,
    from: NodeId,
    target: NodeId,
    seen: &mut HashSet<NodeId>,
) -> bool {
    let Some(node) = presentation.nodes.get(&from) else {
        return false;
    };
    for child in node.children() {
        if child == target {
            return true;
        }
        if seen.insert(child) && reaches(presentation, child, target, seen) {
            return true;
        }
    }
    false
}
