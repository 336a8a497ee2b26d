//! Scene graph and window visibility
//!
//! Every window attached to the scene gets a [`NodeKind::Window`] node, with
//! optional surface, decoration and shadow sub-nodes. A node's effective
//! visibility is
//!
//! ```text
//! (not explicitly hidden OR held) AND every ancestor visible
//! ```
//!
//! where *held* means at least one [`VisibilityReason`] refcount on the node
//! or on one of its descendants is non-zero. Holding a node therefore also
//! forces its ancestors visible; a hidden ancestor would otherwise hide the
//! node whatever its own state is.
//!
//! Reasons are independent: a minimized window that is also being closed
//! stays on screen until both the minimize hold and the delete hold are
//! released. A window node outlives the window itself while any hold is
//! active, which is what keeps a closing animation alive; it is reaped when
//! the last hold is released.

mod node;

pub use node::{ChildSlot, NodeId, NodeKind, SceneNode, VisibilityReason, VisibilityRefs, WindowId};

use log::{debug, trace, warn};
use std::collections::HashMap;

use crate::error::{Imbalance, PacingError, Result};

/// Arena of scene nodes
#[derive(Debug, Default)]
pub struct SceneGraph {
    nodes: HashMap<NodeId, SceneNode>,
    /// Top-level nodes in stacking order, bottom first
    roots: Vec<NodeId>,
    next_id: u64,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self) -> NodeId {
        let id = NodeId::new(self.next_id);
        self.next_id += 1;
        id
    }

    fn node(&self, id: NodeId) -> Result<&SceneNode> {
        self.nodes.get(&id).ok_or(PacingError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut SceneNode> {
        self.nodes.get_mut(&id).ok_or(PacingError::UnknownNode(id))
    }

    fn insert(
        &mut self,
        kind: NodeKind,
        window: Option<WindowId>,
        parent: Option<NodeId>,
    ) -> Result<NodeId> {
        if let Some(parent) = parent {
            self.node(parent)?;
        }

        let id = self.allocate();
        self.nodes.insert(id, SceneNode::new(id, kind, window, parent));
        match parent {
            Some(parent) => self.node_mut(parent)?.children.push(id),
            None => self.roots.push(id),
        }
        self.update_subtree(id);
        Ok(id)
    }

    /// Adds a grouping node such as a desktop or layer
    pub fn add_container(&mut self, parent: Option<NodeId>) -> Result<NodeId> {
        self.insert(NodeKind::Container, None, parent)
    }

    /// Creates the node of a window that just attached to the scene
    pub fn attach_window(&mut self, window: WindowId, parent: Option<NodeId>) -> Result<NodeId> {
        let id = self.insert(NodeKind::Window, Some(window), parent)?;
        debug!("Window {} attached as scene node {}", window, id);
        Ok(id)
    }

    /// Creates or destroys one of a window node's optional sub-nodes.
    /// Returns the sub-node now occupying the slot.
    pub fn set_child(
        &mut self,
        window_node: NodeId,
        slot: ChildSlot,
        present: bool,
    ) -> Result<Option<NodeId>> {
        let node = self.node(window_node)?;
        if node.kind != NodeKind::Window {
            return Err(PacingError::Configuration(format!(
                "scene node {} is not a window node",
                window_node
            )));
        }

        match (node.child(slot), present) {
            (Some(existing), true) => Ok(Some(existing)),
            (None, false) => Ok(None),
            (None, true) => {
                let window = node.window;
                let child = self.insert(slot.kind(), window, Some(window_node))?;
                *self.node_mut(window_node)?.child_slot_mut(slot) = Some(child);
                Ok(Some(child))
            }
            (Some(existing), false) => {
                self.remove_subtree(existing)?;
                Ok(None)
            }
        }
    }

    pub fn set_surface(&mut self, window_node: NodeId, present: bool) -> Result<Option<NodeId>> {
        self.set_child(window_node, ChildSlot::Surface, present)
    }

    pub fn set_decoration(&mut self, window_node: NodeId, present: bool) -> Result<Option<NodeId>> {
        self.set_child(window_node, ChildSlot::Decoration, present)
    }

    pub fn set_shadow(&mut self, window_node: NodeId, present: bool) -> Result<Option<NodeId>> {
        self.set_child(window_node, ChildSlot::Shadow, present)
    }

    /// Sets the explicit hidden flag
    pub fn set_hidden(&mut self, id: NodeId, hidden: bool) -> Result<()> {
        let node = self.node_mut(id)?;
        if node.explicit_hidden == hidden {
            return Ok(());
        }
        node.explicit_hidden = hidden;
        self.update_subtree(id);
        Ok(())
    }

    /// Acquires a visibility reference on `id`
    pub fn ref_visible(&mut self, id: NodeId, reason: VisibilityReason) -> Result<()> {
        let node = self.node_mut(id)?;
        let was_held = node.refs.any();
        node.refs.acquire(reason);
        let parent = node.parent;
        trace!("Node {}: ref {:?} -> {}", id, reason, node.refs.get(reason));

        if !was_held && node.refs.any() {
            self.adjust_ancestor_holds(parent, 1);
        }
        self.update_subtree(self.root_of(id));
        Ok(())
    }

    /// Releases a visibility reference on `id`
    ///
    /// Releasing a reason that is not held is reported as
    /// [`PacingError::ResourceImbalance`] and changes nothing. Releasing the
    /// last hold of a closed window, whether taken on the window node itself
    /// or on one of its sub-nodes, destroys the window node.
    pub fn unref_visible(&mut self, id: NodeId, reason: VisibilityReason) -> Result<()> {
        let node = self.node_mut(id)?;
        let was_held = node.refs.any();
        if !node.refs.release(reason) {
            warn!("⚠️ Node {}: unref {:?} without matching ref", id, reason);
            return Err(PacingError::ResourceImbalance {
                what: Imbalance::Visibility { node: id, reason },
            });
        }
        let parent = node.parent;
        let released = was_held && !node.refs.any();
        trace!("Node {}: unref {:?} -> {}", id, reason, node.refs.get(reason));

        if released {
            self.adjust_ancestor_holds(parent, -1);
        }
        self.update_subtree(self.root_of(id));
        self.reap_closed(id)?;
        if released {
            self.reap_released_ancestors(parent)?;
        }
        Ok(())
    }

    /// Marks the window of `id` as closed
    ///
    /// The node is hidden and destroyed immediately unless something still
    /// holds it, in which case it lives on until the last hold is released.
    /// Returns whether the node was destroyed. Only window nodes can be
    /// closed.
    pub fn handle_window_closed(&mut self, id: NodeId) -> Result<bool> {
        let node = self.node_mut(id)?;
        if node.kind != NodeKind::Window {
            return Err(PacingError::Configuration(format!(
                "scene node {} is not a window node",
                id
            )));
        }
        node.closed = true;
        node.explicit_hidden = true;
        let window = node.window;
        self.update_subtree(id);

        let destroyed = self.reap_closed(id)?;
        if !destroyed {
            debug!("Window {:?} closed, node {} kept alive by holds", window, id);
        }
        Ok(destroyed)
    }

    fn reap_closed(&mut self, id: NodeId) -> Result<bool> {
        let node = self.node(id)?;
        if node.closed && !node.is_held() {
            debug!("Reaping closed scene node {}", id);
            self.remove_subtree(id)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Reaps the closed ancestors of a node that just stopped holding
    fn reap_released_ancestors(&mut self, mut next: Option<NodeId>) -> Result<()> {
        while let Some(id) = next {
            let Some(node) = self.nodes.get(&id) else {
                break;
            };
            if node.is_held() {
                // Everything further up is held through this node
                break;
            }
            next = node.parent;
            if node.closed {
                debug!("Reaping closed scene node {}", id);
                self.remove_subtree(id)?;
            }
        }
        Ok(())
    }

    /// Detaches and destroys `id` together with all its descendants
    ///
    /// Closed ancestors that were only held through the removed subtree are
    /// destroyed as well.
    pub fn remove_subtree(&mut self, id: NodeId) -> Result<()> {
        let node = self.node(id)?;
        let parent = node.parent;

        let mut doomed = vec![id];
        let mut held = 0i64;
        let mut i = 0;
        while i < doomed.len() {
            let current = self.node(doomed[i])?;
            if current.refs.any() {
                held += 1;
            }
            doomed.extend_from_slice(&current.children);
            i += 1;
        }

        if held > 0 {
            self.adjust_ancestor_holds(parent, -held);
        }

        match parent {
            Some(parent_id) => {
                let parent = self.node_mut(parent_id)?;
                parent.children.retain(|&child| child != id);
                for slot in [ChildSlot::Surface, ChildSlot::Decoration, ChildSlot::Shadow] {
                    let entry = parent.child_slot_mut(slot);
                    if *entry == Some(id) {
                        *entry = None;
                    }
                }
                self.update_subtree(self.root_of(parent_id));
            }
            None => self.roots.retain(|&root| root != id),
        }

        for node in doomed {
            self.nodes.remove(&node);
        }

        if held > 0 {
            self.reap_released_ancestors(parent)?;
        }
        Ok(())
    }

    fn adjust_ancestor_holds(&mut self, mut next: Option<NodeId>, delta: i64) {
        while let Some(id) = next {
            let Some(node) = self.nodes.get_mut(&id) else {
                break;
            };
            let holds = i64::from(node.descendant_holds) + delta;
            debug_assert!(holds >= 0, "descendant holds underflow on node {}", id);
            node.descendant_holds = holds.clamp(0, i64::from(u32::MAX)) as u32;
            next = node.parent;
        }
    }

    fn root_of(&self, mut id: NodeId) -> NodeId {
        while let Some(parent) = self.nodes.get(&id).and_then(|node| node.parent) {
            id = parent;
        }
        id
    }

    /// Recomputes cached visibility of `id` and everything below it
    fn update_subtree(&mut self, id: NodeId) {
        let parent_visible = self
            .nodes
            .get(&id)
            .and_then(|node| node.parent)
            .map(|parent| self.nodes.get(&parent).map_or(false, |p| p.visible))
            .unwrap_or(true);

        let mut stack = vec![(id, parent_visible)];
        while let Some((current, parent_visible)) = stack.pop() {
            let Some(node) = self.nodes.get_mut(&current) else {
                continue;
            };
            node.visible = parent_visible && node.locally_visible();
            let visible = node.visible;
            stack.extend(node.children.iter().map(|&child| (child, visible)));
        }
    }

    /// Computes the effective visibility of `id` from scratch
    ///
    /// Walks the ancestor chain and re-derives every hold from the refcounts
    /// in the subtree instead of trusting any cached counter. Always agrees
    /// with [`is_visible`](Self::is_visible).
    pub fn compute_visibility(&self, id: NodeId) -> Result<bool> {
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.node(node_id)?;
            let held = self.subtree_has_refs(node_id)?;
            if node.explicit_hidden && !held {
                return Ok(false);
            }
            current = node.parent;
        }
        Ok(true)
    }

    fn subtree_has_refs(&self, id: NodeId) -> Result<bool> {
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = self.node(current)?;
            if node.refs.any() {
                return Ok(true);
            }
            stack.extend_from_slice(&node.children);
        }
        Ok(false)
    }

    /// Cached effective visibility. Unknown nodes are not visible.
    pub fn is_visible(&self, id: NodeId) -> bool {
        self.nodes.get(&id).map_or(false, |node| node.visible)
    }

    pub fn refcount(&self, id: NodeId, reason: VisibilityReason) -> Option<u32> {
        self.nodes.get(&id).map(|node| node.refs.get(reason))
    }

    pub fn get(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Visible nodes in paint order (parents before children, bottom first)
    pub fn paint_list(&self) -> Vec<NodeId> {
        let mut list = Vec::new();
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            if !node.visible {
                continue;
            }
            list.push(id);
            stack.extend(node.children.iter().rev().copied());
        }
        list
    }

    /// Windows the compositor has to paint this pass
    pub fn visible_windows(&self) -> Vec<WindowId> {
        self.paint_list()
            .into_iter()
            .filter_map(|id| self.nodes.get(&id))
            .filter(|node| node.kind == NodeKind::Window)
            .filter_map(|node| node.window)
            .collect()
    }
}

#[cfg(test)]
mod tests;
