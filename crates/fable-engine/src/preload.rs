//! One-time tree rewrite run before playback: resolve every loadable
//! resource, then hand controller handles to nodes that asked for one.
//!
//! Both passes take the presentation by reference and build a new one, so a
//! failed preload leaves the caller's tree exactly as it was.

use futures::future::try_join_all;

use crate::backend::ResourceLoader;
use fable_core::FableResult;
use fable_ir::{ContextHandle, Node, Presentation};

/// Load a node's resource. Already-loaded and non-loadable nodes come back unchanged.
pub async fn load_node(node: &Node, loader: &dyn ResourceLoader) -> FableResult<Node> {
    match node.resource() {
        Some(resource) if !resource.is_loaded() => {
            let handle = loader.load_resource(resource.name()).await?;
            tracing::debug!("loaded {} for {}", handle.name, node.id);
            Ok(node.loaded_with(handle))
        }
        _ => Ok(node.clone()),
    }
}

/// Resolve every unloaded resource reachable from the pages.
///
/// Loads run concurrently; any failure (typically `ResourceNotFound`) fails
/// the whole pass and nothing is returned.
pub async fn preload(
    presentation: &Presentation,
    loader: &dyn ResourceLoader,
) -> FableResult<Presentation> {
    let order = presentation.nodes.post_order(&presentation.roots());

    let pending: Vec<&Node> = order
        .iter()
        .filter_map(|id| presentation.node(id))
        .filter(|node| !node.is_loaded())
        .collect();
    let loaded = try_join_all(pending.iter().map(|node| load_node(node, loader))).await?;

    let mut resolved = presentation.clone();
    let count = loaded.len();
    for node in loaded {
        resolved.nodes.replace(node)?;
    }
    rebuild_groups(&mut resolved, &order)?;

    tracing::info!(
        "preloaded {} resources across {} nodes",
        count,
        order.len()
    );
    Ok(resolved)
}

/// Give every node that needs one a controller handle.
pub fn inject_context(presentation: &Presentation, context: &ContextHandle) -> FableResult<Presentation> {
    let order = presentation.nodes.post_order(&presentation.roots());
    let mut bound = presentation.clone();
    let mut count = 0;
    for id in &order {
        let Some(node) = presentation.node(id) else {
            continue;
        };
        if node.needs_context {
            bound.nodes.replace(node.with_context(context.clone()))?;
            count += 1;
        }
    }
    rebuild_groups(&mut bound, &order)?;
    tracing::debug!("injected controller context into {} nodes", count);
    Ok(bound)
}

// Children precede parents in `order`, so each group is rebuilt after its
// children were substituted.
fn rebuild_groups(presentation: &mut Presentation, order: &[fable_ir::NodeId]) -> FableResult<()> {
    for id in order {
        let children = match presentation.node(id) {
            Some(node) if node.is_group() => node.children(),
            _ => continue,
        };
        presentation.nodes.rebuild_group(id, children)?;
    }
    Ok(())
}
