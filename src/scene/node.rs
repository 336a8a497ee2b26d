//! Scene nodes and the reasons that keep them visible

use log::warn;
use serde::{Deserialize, Serialize};

/// Window identifier as used by the window manager
pub type WindowId = u64;

/// Identifier of a node in a [`super::SceneGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transient conditions that force a node to stay visible
///
/// Each reason is acquired and released independently by the subsystem that
/// owns the condition: the minimize animation, the close animation, a
/// desktop or activity switch, or the initial show of a hidden window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum VisibilityReason {
    Hidden,
    Deleting,
    OnOtherDesktop,
    Minimized,
    OnOtherActivity,
}

impl VisibilityReason {
    pub const ALL: [VisibilityReason; 5] = [
        VisibilityReason::Hidden,
        VisibilityReason::Deleting,
        VisibilityReason::OnOtherDesktop,
        VisibilityReason::Minimized,
        VisibilityReason::OnOtherActivity,
    ];

    const fn index(self) -> usize {
        match self {
            VisibilityReason::Hidden => 0,
            VisibilityReason::Deleting => 1,
            VisibilityReason::OnOtherDesktop => 2,
            VisibilityReason::Minimized => 3,
            VisibilityReason::OnOtherActivity => 4,
        }
    }
}

/// Per-reason reference counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VisibilityRefs([u32; 5]);

impl VisibilityRefs {
    pub fn get(&self, reason: VisibilityReason) -> u32 {
        self.0[reason.index()]
    }

    /// Whether any reason currently holds the node
    pub fn any(&self) -> bool {
        self.0.iter().any(|&count| count > 0)
    }

    pub fn total(&self) -> u64 {
        self.0.iter().map(|&count| u64::from(count)).sum()
    }

    pub(crate) fn acquire(&mut self, reason: VisibilityReason) {
        let slot = &mut self.0[reason.index()];
        match slot.checked_add(1) {
            Some(count) => *slot = count,
            None => warn!("⚠️ Visibility refcount for {:?} saturated", reason),
        }
    }

    /// Returns `false` and leaves the count at zero when nothing was held
    pub(crate) fn release(&mut self, reason: VisibilityReason) -> bool {
        let slot = &mut self.0[reason.index()];
        match slot.checked_sub(1) {
            Some(count) => {
                *slot = count;
                true
            }
            None => false,
        }
    }
}

/// What a node represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Grouping node, e.g. a desktop or a layer
    Container,
    /// A window; owns the optional sub-nodes below
    Window,
    /// Client contents of a window
    Surface,
    /// Server-side frame
    Decoration,
    /// Drop shadow
    Shadow,
}

/// Which optional sub-node of a window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildSlot {
    Surface,
    Decoration,
    Shadow,
}

impl ChildSlot {
    pub(crate) fn kind(self) -> NodeKind {
        match self {
            ChildSlot::Surface => NodeKind::Surface,
            ChildSlot::Decoration => NodeKind::Decoration,
            ChildSlot::Shadow => NodeKind::Shadow,
        }
    }
}

/// A visual node in the scene
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub(crate) id: NodeId,
    pub(crate) kind: NodeKind,
    pub(crate) window: Option<WindowId>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) surface: Option<NodeId>,
    pub(crate) decoration: Option<NodeId>,
    pub(crate) shadow: Option<NodeId>,
    pub(crate) explicit_hidden: bool,
    pub(crate) refs: VisibilityRefs,
    /// Descendants that currently hold at least one visibility reference
    pub(crate) descendant_holds: u32,
    pub(crate) closed: bool,
    pub(crate) visible: bool,
}

impl SceneNode {
    pub(crate) fn new(
        id: NodeId,
        kind: NodeKind,
        window: Option<WindowId>,
        parent: Option<NodeId>,
    ) -> Self {
        Self {
            id,
            kind,
            window,
            parent,
            children: Vec::new(),
            surface: None,
            decoration: None,
            shadow: None,
            explicit_hidden: false,
            refs: VisibilityRefs::default(),
            descendant_holds: 0,
            closed: false,
            visible: false,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn window(&self) -> Option<WindowId> {
        self.window
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn child(&self, slot: ChildSlot) -> Option<NodeId> {
        match slot {
            ChildSlot::Surface => self.surface,
            ChildSlot::Decoration => self.decoration,
            ChildSlot::Shadow => self.shadow,
        }
    }

    pub(crate) fn child_slot_mut(&mut self, slot: ChildSlot) -> &mut Option<NodeId> {
        match slot {
            ChildSlot::Surface => &mut self.surface,
            ChildSlot::Decoration => &mut self.decoration,
            ChildSlot::Shadow => &mut self.shadow,
        }
    }

    pub fn is_explicitly_hidden(&self) -> bool {
        self.explicit_hidden
    }

    pub fn refs(&self) -> &VisibilityRefs {
        &self.refs
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Cached effective visibility
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Held by one of its own references or by a descendant's
    pub fn is_held(&self) -> bool {
        self.refs.any() || self.descendant_holds > 0
    }

    pub(crate) fn locally_visible(&self) -> bool {
        !self.explicit_hidden || self.is_held()
    }
}
