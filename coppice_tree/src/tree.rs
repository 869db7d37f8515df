// Copyright 2026 the Coppice Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core tree implementation: arena storage, state machine, cascades, loading.

use core::cmp::Ordering;
use core::fmt;
use core::mem;

use coppice_loader::{DataSource, LoadError};
use futures::future::LocalBoxFuture;
use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;

use crate::config::TreeConfig;
use crate::error::TreeError;
use crate::events::{EventKind, NodeVerb, Notifier, TreeEvent};
use crate::query::Predicate;
use crate::render::Renderer;
use crate::types::{NodeFlags, NodeId, Record, StateFlag};
use crate::util::text_matches;

/// Closure shape for per-tree lazy child loaders.
///
/// Invoked with the parent node's payload; may return any of the three
/// [`DataSource`] shapes.
pub type ChildLoaderFn = Box<dyn FnMut(&Record) -> DataSource<Record>>;

/// Tree lifecycle: `Idle → Loading → Ready`, re-entering `Loading` on each
/// subsequent [`Tree::load`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// Constructed, never loaded.
    Idle,
    /// A model-level load is in flight.
    Loading,
    /// A model is present and queryable.
    Ready,
}

/// Total-order key for a node's structural position: its index within each
/// ancestor collection, root first.
///
/// Paths compare as numeric sequences, so position `10` orders after `9`.
/// Always computed from current structure, never cached.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexPath(pub(crate) SmallVec<[usize; 8]>);

impl IndexPath {
    /// The path segments, root first.
    pub fn segments(&self) -> &[usize] {
        &self.0
    }
}

impl fmt::Display for IndexPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for seg in &self.0 {
            if !first {
                f.write_str(".")?;
            }
            write!(f, "{seg}")?;
            first = false;
        }
        Ok(())
    }
}

/// A string or predicate query for [`Tree::search`].
pub enum SearchQuery {
    /// Case-insensitive substring match on display text (or the configured
    /// matcher). Blank text clears the search.
    Text(String),
    /// Arbitrary predicate over a node.
    Func(Box<dyn Fn(&Tree, NodeId) -> bool>),
}

impl SearchQuery {
    /// Wrap a predicate query.
    pub fn func(f: impl Fn(&Tree, NodeId) -> bool + 'static) -> Self {
        Self::Func(Box::new(f))
    }
}

impl From<&str> for SearchQuery {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for SearchQuery {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl fmt::Debug for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Self::Func(_) => f.write_str("Func(..)"),
        }
    }
}

/// An in-flight model load, detached from the tree borrow.
///
/// Produced by [`Tree::begin_load`]; [`PendingLoad::resolve`] suspends until
/// the data source completes, and [`Tree::complete_load`] applies the outcome.
/// A later `begin_load` supersedes earlier pending loads: their outcomes are
/// rejected with [`LoadError::Superseded`] and mutate nothing.
pub struct PendingLoad {
    generation: u64,
    future: LocalBoxFuture<'static, Result<Vec<Record>, LoadError>>,
}

impl PendingLoad {
    /// Suspend until the data source completes.
    pub async fn resolve(self) -> LoadOutcome {
        LoadOutcome {
            generation: self.generation,
            result: self.future.await,
        }
    }
}

impl fmt::Debug for PendingLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingLoad")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Completion of a model load, to hand back to [`Tree::complete_load`].
#[derive(Debug)]
pub struct LoadOutcome {
    generation: u64,
    result: Result<Vec<Record>, LoadError>,
}

/// An in-flight lazy child load for one node.
pub struct PendingChildLoad {
    parent: NodeId,
    generation: u64,
    future: LocalBoxFuture<'static, Result<Vec<Record>, LoadError>>,
}

impl PendingChildLoad {
    /// The node whose children are loading.
    pub fn parent(&self) -> NodeId {
        self.parent
    }

    /// Suspend until the loader completes.
    pub async fn resolve(self) -> ChildLoadOutcome {
        ChildLoadOutcome {
            parent: self.parent,
            generation: self.generation,
            result: self.future.await,
        }
    }
}

impl fmt::Debug for PendingChildLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingChildLoad")
            .field("parent", &self.parent)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Completion of a lazy child load, to hand back to
/// [`Tree::complete_load_children`].
#[derive(Debug)]
pub struct ChildLoadOutcome {
    parent: NodeId,
    generation: u64,
    result: Result<Vec<Record>, LoadError>,
}

#[derive(Clone, Debug)]
pub(crate) struct Node {
    generation: u32,
    pub(crate) record: Record,
    pub(crate) flags: NodeFlags,
    pub(crate) parent: Option<NodeId>,
    /// `None` = children never loaded (lazy-load candidate).
    pub(crate) children: Option<Vec<NodeId>>,
    dirty: bool,
    load_generation: u64,
}

/// The state-management core behind a hierarchical list widget.
///
/// Owns an arena of nodes (slot vector, per-slot generation, free list), a
/// tree-global id index, the selection/visibility policy, the event notifier,
/// and the optional renderer. All mutation is synchronous; the only suspension
/// points are [`Tree::load`] and [`Tree::load_children`].
///
/// ## Example
///
/// ```
/// use coppice_tree::{Record, StateFlag, Tree};
///
/// let mut tree = Tree::new();
/// futures::executor::block_on(tree.load(vec![
///     Record::with_id("1", "A").child(Record::with_id("2", "B")),
/// ]))
/// .unwrap();
///
/// let b = tree.by_id("2").unwrap();
/// tree.select(b);
/// let a = tree.by_id("1").unwrap();
/// // Selecting the only child leaves the parent partially selected.
/// assert_eq!(tree.state(a, StateFlag::Indeterminate), Some(true));
/// assert_eq!(tree.state(a, StateFlag::Selected), Some(false));
/// ```
pub struct Tree {
    /// slots
    pub(crate) nodes: Vec<Option<Node>>,
    /// last generation per slot (persists across frees)
    generations: Vec<u32>,
    free_list: Vec<usize>,
    /// root collection, in display order
    pub(crate) roots: Vec<NodeId>,
    /// tree-global id index
    ids: HashMap<String, NodeId>,
    pub(crate) config: TreeConfig,
    notifier: Notifier,
    renderer: Option<Box<dyn Renderer>>,
    child_loader: Option<ChildLoaderFn>,
    last_selected: Option<NodeId>,
    lifecycle: Lifecycle,
    load_generation: u64,
    batch_depth: u32,
    dirty: Vec<NodeId>,
    next_generated_id: u64,
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.nodes.len();
        let alive = self.nodes.iter().filter(|n| n.is_some()).count();
        f.debug_struct("Tree")
            .field("nodes_total", &total)
            .field("nodes_alive", &alive)
            .field("roots", &self.roots.len())
            .field("lifecycle", &self.lifecycle)
            .field("load_generation", &self.load_generation)
            .field("batch_depth", &self.batch_depth)
            .finish_non_exhaustive()
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// Create an empty tree with default configuration.
    pub fn new() -> Self {
        Self::with_config(TreeConfig::default())
    }

    /// Create an empty tree with the given configuration.
    pub fn with_config(config: TreeConfig) -> Self {
        Self {
            nodes: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            roots: Vec::new(),
            ids: HashMap::new(),
            config,
            notifier: Notifier::default(),
            renderer: None,
            child_loader: None,
            last_selected: None,
            lifecycle: Lifecycle::Idle,
            load_generation: 0,
            batch_depth: 0,
            dirty: Vec::new(),
            next_generated_id: 0,
        }
    }

    // --- collaborators ---

    /// Attach the external renderer. Without one, all paint notifications are
    /// no-ops (headless usage).
    pub fn attach(&mut self, renderer: impl Renderer + 'static) {
        self.renderer = Some(Box::new(renderer));
    }

    /// Configure the lazy child loader consumed by [`Tree::load_children`].
    pub fn set_child_loader(
        &mut self,
        loader: impl FnMut(&Record) -> DataSource<Record> + 'static,
    ) {
        self.child_loader = Some(Box::new(loader));
    }

    /// Subscribe a listener to lifecycle events.
    pub fn on(&mut self, listener: impl FnMut(&TreeEvent) + 'static) {
        self.notifier.subscribe(listener);
    }

    /// The tree's notifier (mute state inspection).
    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    /// Suppress the given event kinds.
    pub fn mute(&mut self, kinds: impl IntoIterator<Item = EventKind>) {
        self.notifier.mute(kinds);
    }

    /// Suppress every event.
    pub fn mute_all(&mut self) {
        self.notifier.mute_all();
    }

    /// Stop suppressing the given event kinds.
    pub fn unmute(&mut self, kinds: impl IntoIterator<Item = EventKind>) {
        self.notifier.unmute(kinds);
    }

    /// Stop suppressing everything.
    pub fn unmute_all(&mut self) {
        self.notifier.unmute_all();
    }

    /// Whether events of `kind` are currently suppressed.
    pub fn is_muted(&self, kind: EventKind) -> bool {
        self.notifier.is_muted(kind)
    }

    /// Toggle the direct-deselection guard (the one runtime-mutable policy).
    pub fn set_prevent_direct_deselection(&mut self, prevent: bool) {
        self.config.selection.prevent_direct_deselection = prevent;
    }

    /// Current lifecycle phase.
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    // --- batching ---

    /// Open a coalescing window. Windows nest; only the outermost
    /// [`Tree::end`] flushes.
    pub fn batch(&mut self) {
        self.batch_depth += 1;
    }

    /// Close a coalescing window, flushing once when the outermost closes.
    pub fn end(&mut self) {
        if self.batch_depth > 0 {
            self.batch_depth -= 1;
            if self.batch_depth == 0 {
                self.apply_changes();
            }
        }
    }

    /// Run `f` inside a coalescing window.
    pub fn with_batch<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.batch();
        let out = f(self);
        self.end();
        out
    }

    /// Flush dirty nodes to the renderer immediately (normally called
    /// implicitly at the end of each logical operation).
    pub fn apply_changes(&mut self) {
        let changed = mem::take(&mut self.dirty);
        for &id in &changed {
            if let Some(node) = self.node_opt_mut(id) {
                node.dirty = false;
            }
        }
        if changed.is_empty() {
            return;
        }
        if let Some(renderer) = &mut self.renderer {
            renderer.apply_changes(&changed);
        }
    }

    /// Ask the renderer to bring the selected node into view.
    pub fn scroll_selected_into_view(&mut self) {
        if let Some(renderer) = &mut self.renderer {
            renderer.scroll_selected_into_view();
        }
    }

    fn flush(&mut self) {
        if self.batch_depth == 0 {
            self.apply_changes();
        }
    }

    pub(crate) fn mark_dirty(&mut self, id: NodeId) {
        let Some(node) = self.node_opt_mut(id) else {
            return;
        };
        if node.dirty {
            return;
        }
        node.dirty = true;
        self.dirty.push(id);
    }

    // --- storage ---

    /// Returns true if `id` refers to a live node of this tree.
    pub fn is_alive(&self, id: NodeId) -> bool {
        self.nodes
            .get(id.idx())
            .and_then(|n| n.as_ref())
            .map(|n| n.generation == id.1)
            .unwrap_or(false)
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    /// Whether the tree holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Access a node; panics if `id` is stale.
    pub(crate) fn node(&self, id: NodeId) -> &Node {
        self.nodes[id.idx()].as_ref().expect("dangling NodeId")
    }

    /// Access a node mutably; panics if `id` is stale.
    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes[id.idx()].as_mut().expect("dangling NodeId")
    }

    pub(crate) fn node_opt(&self, id: NodeId) -> Option<&Node> {
        let n = self.nodes.get(id.idx())?.as_ref()?;
        (n.generation == id.1).then_some(n)
    }

    fn node_opt_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        let n = self.nodes.get_mut(id.idx())?.as_mut()?;
        (n.generation == id.1).then_some(n)
    }

    fn alloc(&mut self, mut node: Node) -> NodeId {
        if let Some(idx) = self.free_list.pop() {
            let generation = self.generations[idx].saturating_add(1);
            self.generations[idx] = generation;
            node.generation = generation;
            self.nodes[idx] = Some(node);
            #[allow(
                clippy::cast_possible_truncation,
                reason = "NodeId uses 32-bit indices by design."
            )]
            NodeId::new(idx as u32, generation)
        } else {
            let generation = 1_u32;
            node.generation = generation;
            self.nodes.push(Some(node));
            self.generations.push(generation);
            #[allow(
                clippy::cast_possible_truncation,
                reason = "NodeId uses 32-bit indices by design."
            )]
            NodeId::new((self.nodes.len() - 1) as u32, generation)
        }
    }

    // --- lookups ---

    /// Look a node up by its tree-global id.
    pub fn by_id(&self, id: &str) -> Option<NodeId> {
        self.ids.get(id).copied().filter(|&n| self.is_alive(n))
    }

    /// The node's stable string id.
    pub fn id_of(&self, id: NodeId) -> Option<&str> {
        self.node_opt(id).and_then(|n| n.record.id.as_deref())
    }

    /// The node's display text.
    pub fn text_of(&self, id: NodeId) -> Option<&str> {
        self.node_opt(id).map(|n| n.record.text.as_str())
    }

    /// The node's payload record (children list empty; structure lives in the
    /// arena).
    pub fn record_of(&self, id: NodeId) -> Option<&Record> {
        self.node_opt(id).map(|n| &n.record)
    }

    /// All state flags of a live node.
    pub fn flags_of(&self, id: NodeId) -> Option<NodeFlags> {
        self.node_opt(id).map(|n| n.flags)
    }

    /// One state flag of a live node.
    pub fn state(&self, id: NodeId, flag: StateFlag) -> Option<bool> {
        self.node_opt(id).map(|n| n.flags.contains(flag.mask()))
    }

    /// Root nodes in display order.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Children of a live node, or empty for leaves/unloaded/stale nodes.
    pub fn children_of(&self, id: NodeId) -> &[NodeId] {
        self.node_opt(id)
            .and_then(|n| n.children.as_deref())
            .unwrap_or(&[])
    }

    /// Whether the node's children have never been loaded (lazy candidate).
    pub fn children_unloaded(&self, id: NodeId) -> bool {
        self.node_opt(id).is_some_and(|n| n.children.is_none())
    }

    /// Parent of a live node, or `None` for roots and stale ids.
    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.node_opt(id).and_then(|n| n.parent)
    }

    /// Ancestors of a node, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = self.parent_of(id);
        while let Some(p) = cur {
            out.push(p);
            cur = self.parent_of(p);
        }
        out
    }

    /// The most recently selected node, if it is still alive.
    pub fn last_selected(&self) -> Option<NodeId> {
        self.last_selected.filter(|&n| self.is_alive(n))
    }

    // --- visibility and ordering ---

    /// Whether the node would currently be rendered: not hidden, not removed,
    /// and no collapsed ancestor. A collapsed node is itself visible; its
    /// descendants are not.
    pub fn is_visible(&self, id: NodeId) -> bool {
        let Some(node) = self.node_opt(id) else {
            return false;
        };
        if node.flags.intersects(NodeFlags::HIDDEN | NodeFlags::REMOVED) {
            return false;
        }
        let mut cur = node.parent;
        while let Some(p) = cur {
            let parent = self.node(p);
            if parent.flags.contains(NodeFlags::COLLAPSED) {
                return false;
            }
            cur = parent.parent;
        }
        true
    }

    /// Next node in document order (children before siblings), or `None` at
    /// the end of the tree or for stale ids.
    pub fn next_in_order(&self, id: NodeId) -> Option<NodeId> {
        if !self.is_alive(id) {
            return None;
        }
        if let Some(&first) = self.children_of(id).first() {
            return Some(first);
        }
        let mut node = id;
        loop {
            if let Some(sibling) = self.next_sibling(node) {
                return Some(sibling);
            }
            node = self.parent_of(node)?;
        }
    }

    /// Next *visible* node in document order, used for contiguous range
    /// selection.
    pub fn next_visible(&self, id: NodeId) -> Option<NodeId> {
        let mut cur = self.next_in_order(id)?;
        loop {
            if self.is_visible(cur) {
                return Some(cur);
            }
            cur = self.next_in_order(cur)?;
        }
    }

    fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let siblings = match self.parent_of(id) {
            Some(p) => self.children_of(p),
            None => &self.roots,
        };
        let pos = siblings.iter().position(|&s| s == id)?;
        siblings.get(pos + 1).copied()
    }

    /// Total-order key for the node's structural position (root first).
    pub fn index_path(&self, id: NodeId) -> Option<IndexPath> {
        if !self.is_alive(id) {
            return None;
        }
        let mut segments: SmallVec<[usize; 8]> = SmallVec::new();
        let mut cur = id;
        loop {
            let siblings = match self.parent_of(cur) {
                Some(p) => self.children_of(p),
                None => &self.roots,
            };
            let pos = siblings.iter().position(|&s| s == cur)?;
            segments.push(pos);
            match self.parent_of(cur) {
                Some(p) => cur = p,
                None => break,
            }
        }
        segments.reverse();
        Some(IndexPath(segments))
    }

    /// The `[min, max]` pair of the given nodes by document order, regardless
    /// of argument order. Stale ids are ignored.
    pub fn bounding_nodes(&self, nodes: &[NodeId]) -> Option<(NodeId, NodeId)> {
        let mut keyed: Vec<(IndexPath, NodeId)> = nodes
            .iter()
            .filter_map(|&n| self.index_path(n).map(|p| (p, n)))
            .collect();
        if keyed.is_empty() {
            return None;
        }
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        let first = keyed.first()?.1;
        let last = keyed.last()?.1;
        Some((first, last))
    }

    /// Select every visible node after `start` through `end` inclusive, in
    /// one render batch. `start` must precede `end` in document order; use
    /// [`Tree::bounding_nodes`] to order arbitrary endpoints.
    pub fn select_between(&mut self, start: NodeId, end: NodeId) {
        self.with_batch(|tree| {
            let mut cur = tree.next_visible(start);
            while let Some(id) = cur {
                tree.select(id);
                if id == end {
                    break;
                }
                cur = tree.next_visible(id);
            }
        });
    }

    // --- state machine ---

    /// Set one state flag without cascade policy. Idempotent: setting the
    /// current value is a no-op. Returns whether anything changed.
    ///
    /// This is the raw entry point; the verb operations ([`Tree::select`],
    /// [`Tree::expand`], …) layer cascading policy on top of it.
    pub fn set_state(&mut self, id: NodeId, flag: StateFlag, value: bool) -> bool {
        let changed = self.set_flag(id, flag, value);
        if changed {
            self.flush();
        }
        changed
    }

    /// The one shared state-change routine: idempotence check, flag set,
    /// event emission, dirty mark.
    fn set_flag(&mut self, id: NodeId, flag: StateFlag, value: bool) -> bool {
        let mask = flag.mask();
        let Some(node) = self.node_opt_mut(id) else {
            return false;
        };
        if node.flags.contains(mask) == value {
            return false;
        }
        node.flags.set(mask, value);
        if let Some(verb) = verb_for(flag, value) {
            self.notifier.emit(TreeEvent::Node { verb, node: id });
        }
        self.mark_dirty(id);
        true
    }

    /// Select a node, applying the configured cascade policy.
    ///
    /// No-op on stale, unselectable, removed, or already-selected nodes.
    /// In exclusive mode every other selected node is cascade-deselected
    /// first. With `auto_select_children`, descendants are deep-selected and
    /// ancestor selected/indeterminate status is recomputed.
    pub fn select(&mut self, id: NodeId) -> bool {
        let Some(node) = self.node_opt(id) else {
            return false;
        };
        if !node.flags.contains(NodeFlags::SELECTABLE)
            || node.flags.contains(NodeFlags::REMOVED)
            || node.flags.contains(NodeFlags::SELECTED)
        {
            return false;
        }
        self.with_batch(|tree| {
            if !tree.config.selection.multiple {
                tree.deselect_others(id);
            }
            tree.set_flag(id, StateFlag::Selected, true);
            if tree.config.selection.auto_select_children {
                tree.cascade_select(id, true);
            } else {
                tree.recompute_branch(id);
            }
            tree.refresh_ancestors(id);
            tree.last_selected = Some(id);
        });
        true
    }

    /// Directly deselect a node. Refused while the direct-deselection guard
    /// is on; cascading deselection ([`Tree::deselect_cascading`]) is not.
    pub fn deselect(&mut self, id: NodeId) -> bool {
        if self.config.selection.prevent_direct_deselection {
            return false;
        }
        self.deselect_cascading(id)
    }

    /// Cascading/programmatic deselection entry point; ignores the
    /// direct-deselection guard.
    pub fn deselect_cascading(&mut self, id: NodeId) -> bool {
        let Some(node) = self.node_opt(id) else {
            return false;
        };
        if !node.flags.contains(NodeFlags::SELECTED) {
            return false;
        }
        self.with_batch(|tree| {
            tree.set_flag(id, StateFlag::Selected, false);
            if tree.config.selection.auto_select_children {
                tree.cascade_select(id, false);
            } else {
                tree.recompute_branch(id);
            }
            tree.refresh_ancestors(id);
        });
        true
    }

    fn deselect_others(&mut self, keep: NodeId) {
        let selected = self.flatten(StateFlag::Selected);
        for id in selected {
            if id == keep {
                continue;
            }
            self.set_flag(id, StateFlag::Selected, false);
            self.refresh_ancestors(id);
        }
    }

    /// Deep-set the selected flag on every non-removed descendant.
    fn cascade_select(&mut self, id: NodeId, value: bool) {
        for descendant in self.descendants(id) {
            let flags = self.node(descendant).flags;
            if flags.contains(NodeFlags::REMOVED) {
                continue;
            }
            if value && !flags.contains(NodeFlags::SELECTABLE) {
                continue;
            }
            self.set_flag(descendant, StateFlag::Selected, value);
            self.set_flag(descendant, StateFlag::Indeterminate, false);
        }
        self.set_flag(id, StateFlag::Indeterminate, false);
    }

    /// Recompute selected/indeterminate status up the ancestor chain after a
    /// selection mutation, eagerly, so invariants hold when the call returns.
    fn refresh_ancestors(&mut self, id: NodeId) {
        let mut cur = self.parent_of(id);
        while let Some(p) = cur {
            self.recompute_branch(p);
            cur = self.parent_of(p);
        }
    }

    /// Derive one node's selected/indeterminate status from its (non-removed)
    /// children. A child that is selected or itself indeterminate counts as
    /// partially selected.
    fn recompute_branch(&mut self, id: NodeId) {
        let Some(node) = self.node_opt(id) else {
            return;
        };
        let kids: Vec<NodeId> = node
            .children
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .copied()
            .filter(|&c| !self.node(c).flags.contains(NodeFlags::REMOVED))
            .collect();
        if kids.is_empty() {
            self.set_flag(id, StateFlag::Indeterminate, false);
            return;
        }
        let total = kids.len();
        let selected = kids
            .iter()
            .filter(|&&c| self.node(c).flags.contains(NodeFlags::SELECTED))
            .count();
        let partial = kids.iter().any(|&c| {
            self.node(c)
                .flags
                .intersects(NodeFlags::SELECTED | NodeFlags::INDETERMINATE)
        });
        let all = selected == total;
        if self.config.selection.auto_select_children {
            // Checkbox semantics: the parent mirrors its children.
            let selectable = self.node(id).flags.contains(NodeFlags::SELECTABLE);
            self.set_flag(id, StateFlag::Selected, all && selectable);
            self.set_flag(id, StateFlag::Indeterminate, !all && partial);
        } else {
            // A non-selected parent over any selected descendant is partially
            // selected, even when every child is.
            let self_selected = self.node(id).flags.contains(NodeFlags::SELECTED);
            self.set_flag(id, StateFlag::Indeterminate, partial && !self_selected);
        }
    }

    /// Expand the node (show its children).
    pub fn expand(&mut self, id: NodeId) -> bool {
        self.set_state(id, StateFlag::Collapsed, false)
    }

    /// Collapse the node (hide its descendants without touching their flags).
    pub fn collapse(&mut self, id: NodeId) -> bool {
        self.set_state(id, StateFlag::Collapsed, true)
    }

    /// Expand every ancestor so this node is reachable.
    pub fn expand_parents(&mut self, id: NodeId) {
        let ancestors = self.ancestors(id);
        self.with_batch(|tree| {
            for p in ancestors {
                tree.set_flag(p, StateFlag::Collapsed, false);
            }
        });
    }

    /// Clear the hidden flag.
    pub fn show(&mut self, id: NodeId) -> bool {
        self.set_state(id, StateFlag::Hidden, false)
    }

    /// Set the hidden flag.
    pub fn hide(&mut self, id: NodeId) -> bool {
        self.set_state(id, StateFlag::Hidden, true)
    }

    /// Soft-remove: flag the node removed without destroying it. Removed
    /// nodes drop out of available queries and ancestor selection counts.
    pub fn soft_remove(&mut self, id: NodeId) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        self.with_batch(|tree| {
            let changed = tree.set_flag(id, StateFlag::Removed, true);
            if changed {
                tree.refresh_ancestors(id);
            }
            changed
        })
    }

    /// Restore a soft-removed node. With `reset_state_on_restore`, every flag
    /// goes back to the tree defaults first.
    pub fn restore(&mut self, id: NodeId) -> bool {
        let Some(node) = self.node_opt(id) else {
            return false;
        };
        if !node.flags.contains(NodeFlags::REMOVED) {
            return false;
        }
        self.with_batch(|tree| {
            if tree.config.reset_state_on_restore {
                let defaults = tree.config.default_flags & !NodeFlags::REMOVED;
                tree.node_mut(id).flags = defaults;
                tree.mark_dirty(id);
                tree.notifier.emit(TreeEvent::Node {
                    verb: NodeVerb::Restored,
                    node: id,
                });
            } else {
                tree.set_flag(id, StateFlag::Removed, false);
            }
            tree.refresh_ancestors(id);
        });
        true
    }

    /// Focus the node, blurring whichever node held focus before.
    pub fn focus(&mut self, id: NodeId) -> bool {
        let Some(node) = self.node_opt(id) else {
            return false;
        };
        if node.flags.contains(NodeFlags::FOCUSED) {
            return false;
        }
        self.with_batch(|tree| {
            let focused = tree.flatten(StateFlag::Focused);
            for f in focused {
                tree.set_flag(f, StateFlag::Focused, false);
            }
            tree.set_flag(id, StateFlag::Focused, true);
        });
        true
    }

    /// Clear focus from the node.
    pub fn blur(&mut self, id: NodeId) -> bool {
        self.set_state(id, StateFlag::Focused, false)
    }

    /// Set or clear the loading flag (no lifecycle event).
    pub fn set_loading(&mut self, id: NodeId, loading: bool) -> bool {
        self.set_state(id, StateFlag::Loading, loading)
    }

    // --- model building ---

    /// Next free generated id, skipping live ids and ids reserved by the
    /// batch currently being parsed.
    fn generate_id(&mut self, reserved: &HashSet<String>) -> String {
        loop {
            let id = format!("node-{}", self.next_generated_id);
            self.next_generated_id += 1;
            if !self.ids.contains_key(&id) && !reserved.contains(&id) {
                return id;
            }
        }
    }

    /// Check incoming records against live ids and against each other.
    fn validate_new_ids(&self, records: &[Record]) -> Result<(), TreeError> {
        fn walk(
            tree: &Tree,
            records: &[Record],
            seen: &mut HashSet<String>,
        ) -> Result<(), TreeError> {
            for record in records {
                if let Some(id) = &record.id
                    && (tree.ids.contains_key(id) || !seen.insert(id.clone()))
                {
                    return Err(TreeError::DuplicateId(id.clone()));
                }
                walk(tree, &record.children, seen)?;
            }
            Ok(())
        }
        walk(self, records, &mut HashSet::new())
    }

    fn parse_into(
        &mut self,
        records: Vec<Record>,
        parent: Option<NodeId>,
        reserved: &HashSet<String>,
    ) -> Result<Vec<NodeId>, TreeError> {
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            out.push(self.parse_record(record, parent, None, reserved)?);
        }
        Ok(out)
    }

    /// Materialize one raw record (and its subtree) into the arena.
    fn parse_record(
        &mut self,
        mut record: Record,
        parent: Option<NodeId>,
        index: Option<usize>,
        reserved: &HashSet<String>,
    ) -> Result<NodeId, TreeError> {
        let children = mem::take(&mut record.children);
        let key = match record.id.take() {
            Some(id) => {
                if self.ids.contains_key(&id) {
                    return Err(TreeError::DuplicateId(id));
                }
                id
            }
            None => self.generate_id(reserved),
        };
        let overrides = record.state.take();
        let mut flags = self.config.default_flags;
        if let Some(o) = &overrides {
            flags = o.apply(flags);
        }
        record.id = Some(key.clone());
        let id = self.alloc(Node {
            generation: 0,
            record,
            flags,
            parent: None,
            children: None,
            dirty: false,
            load_generation: 0,
        });
        self.ids.insert(key.clone(), id);
        if let Err(err) = self.link_into(id, parent, index) {
            self.ids.remove(&key);
            self.nodes[id.idx()] = None;
            self.free_list.push(id.idx());
            return Err(err);
        }
        self.mark_dirty(id);
        if !children.is_empty() {
            self.node_mut(id).children = Some(Vec::new());
            for child in children {
                self.parse_record(child, Some(id), None, reserved)?;
            }
        }
        Ok(id)
    }

    /// Link a node into its sibling collection. A configured sort comparator
    /// wins over the requested index.
    fn link_into(
        &mut self,
        id: NodeId,
        parent: Option<NodeId>,
        index: Option<usize>,
    ) -> Result<(), TreeError> {
        let pos = {
            let siblings: &[NodeId] = match parent {
                Some(p) => self.node(p).children.as_deref().unwrap_or(&[]),
                None => &self.roots,
            };
            match (&self.config.sort, index) {
                (Some(cmp), _) => {
                    let record = &self.node(id).record;
                    siblings
                        .iter()
                        .position(|&s| cmp(record, &self.node(s).record) == Ordering::Less)
                        .unwrap_or(siblings.len())
                }
                (None, Some(i)) => {
                    if i > siblings.len() {
                        return Err(TreeError::IndexOutOfBounds {
                            index: i,
                            len: siblings.len(),
                        });
                    }
                    i
                }
                (None, None) => siblings.len(),
            }
        };
        match parent {
            Some(p) => {
                self.node_mut(p)
                    .children
                    .get_or_insert_with(Vec::new)
                    .insert(pos, id);
            }
            None => self.roots.insert(pos, id),
        }
        self.node_mut(id).parent = parent;
        Ok(())
    }

    fn detach(&mut self, id: NodeId) {
        match self.node(id).parent {
            Some(p) => {
                if let Some(kids) = &mut self.node_mut(p).children {
                    kids.retain(|&c| c != id);
                }
            }
            None => self.roots.retain(|&r| r != id),
        }
        self.node_mut(id).parent = None;
    }

    fn free_subtree(&mut self, id: NodeId) {
        let kids = self.node(id).children.clone().unwrap_or_default();
        for k in kids {
            self.free_subtree(k);
        }
        if let Some(key) = self.node(id).record.id.clone() {
            self.ids.remove(&key);
        }
        if self.last_selected == Some(id) {
            self.last_selected = None;
        }
        self.dirty.retain(|&d| d != id);
        self.nodes[id.idx()] = None;
        self.free_list.push(id.idx());
    }

    fn clear_model(&mut self) {
        for (idx, slot) in self.nodes.iter_mut().enumerate() {
            if slot.take().is_some() {
                self.free_list.push(idx);
            }
        }
        self.roots.clear();
        self.ids.clear();
        self.last_selected = None;
        self.dirty.clear();
    }

    /// Add a record at the end of the root collection.
    pub fn add_root(&mut self, record: Record) -> Result<NodeId, TreeError> {
        self.insert(None, None, record)
    }

    /// Add a record at the end of a node's children.
    pub fn add_child(&mut self, parent: NodeId, record: Record) -> Result<NodeId, TreeError> {
        self.insert(Some(parent), None, record)
    }

    /// Insert a record at `index` within the given collection (`None` parent
    /// = root collection). With a configured sort comparator the index is
    /// advisory: the sorted position wins.
    pub fn insert_at(
        &mut self,
        parent: Option<NodeId>,
        index: usize,
        record: Record,
    ) -> Result<NodeId, TreeError> {
        self.insert(parent, Some(index), record)
    }

    fn insert(
        &mut self,
        parent: Option<NodeId>,
        index: Option<usize>,
        record: Record,
    ) -> Result<NodeId, TreeError> {
        if let Some(p) = parent
            && !self.is_alive(p)
        {
            return Err(TreeError::StaleNode);
        }
        self.validate_new_ids(core::slice::from_ref(&record))?;
        if self.config.sort.is_none()
            && let Some(i) = index
        {
            let len = match parent {
                Some(p) => self.children_of(p).len(),
                None => self.roots.len(),
            };
            if i > len {
                return Err(TreeError::IndexOutOfBounds { index: i, len });
            }
        }
        let reserved = explicit_ids(core::slice::from_ref(&record));
        self.with_batch(|tree| {
            let id = tree.parse_record(record, parent, index, &reserved)?;
            tree.refresh_ancestors(id);
            Ok(id)
        })
    }

    /// Destroy a node and its subtree: slots freed, ids dropped, handles
    /// stale. For reversible removal use [`Tree::soft_remove`].
    pub fn remove(&mut self, id: NodeId) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        let parent = self.node(id).parent;
        self.detach(id);
        self.free_subtree(id);
        if let Some(p) = parent {
            self.mark_dirty(p);
            self.recompute_branch(p);
            self.refresh_ancestors(p);
        }
        self.flush();
        true
    }

    /// Discard children so the node becomes a lazy-load candidate again.
    pub fn unload_children(&mut self, id: NodeId) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        let Some(kids) = self.node(id).children.clone() else {
            return false;
        };
        for k in kids {
            self.free_subtree(k);
        }
        self.node_mut(id).children = None;
        self.with_batch(|tree| {
            tree.mark_dirty(id);
            tree.set_flag(id, StateFlag::Indeterminate, false);
            tree.refresh_ancestors(id);
        });
        true
    }

    /// Discard the whole model (`Ready → Ready` swap, observed through the
    /// model lifecycle event).
    pub fn remove_all(&mut self) {
        self.clear_model();
        self.notifier.emit(TreeEvent::ModelLoaded { roots: Vec::new() });
        if let Some(renderer) = &mut self.renderer {
            renderer.apply_changes(&[]);
        }
    }

    // --- loading ---

    /// Begin a model-level load. The returned [`PendingLoad`] does not borrow
    /// the tree; resolve it, then apply with [`Tree::complete_load`]. Each
    /// call supersedes earlier pending loads.
    pub fn begin_load(&mut self, source: impl Into<DataSource<Record>>) -> PendingLoad {
        self.load_generation += 1;
        let generation = self.load_generation;
        self.lifecycle = Lifecycle::Loading;
        log::debug!("model load started (generation {generation})");
        PendingLoad {
            generation,
            future: Box::pin(source.into().resolve()),
        }
    }

    /// Apply a completed model load.
    ///
    /// Success event order is fixed: `data.loaded`, model swap, required
    /// selection, `model.loaded`. Failures emit `data.loaderror` and leave
    /// the previous model untouched. A superseded completion is rejected
    /// without touching anything.
    pub fn complete_load(&mut self, outcome: LoadOutcome) -> Result<Vec<NodeId>, TreeError> {
        if outcome.generation != self.load_generation {
            log::warn!(
                "ignoring superseded model load (generation {} != {})",
                outcome.generation,
                self.load_generation
            );
            return Err(TreeError::Load(LoadError::Superseded));
        }
        let records = match outcome.result {
            Ok(records) => records,
            Err(err) => {
                self.settle_after_failed_load();
                self.emit_failed_load(&err);
                return Err(err.into());
            }
        };
        if let Err(err) = validate_batch_ids(&records) {
            self.settle_after_failed_load();
            self.emit_failed_load(&err);
            return Err(err);
        }
        self.notifier.emit(TreeEvent::DataLoaded {
            count: records.len(),
        });
        // With batch ids validated and generated ids steering clear of the
        // reserved set, the build below cannot fail with a duplicate id.
        let reserved = explicit_ids(&records);
        self.clear_model();
        let built = self.with_batch(|tree| {
            let _roots = tree.parse_into(records, None, &reserved)?;
            tree.refresh_all();
            if tree.config.selection.require
                && tree.flatten(StateFlag::Selected).is_empty()
                && let Some(first) = tree.first_available_root()
            {
                tree.select(first);
            }
            Ok::<_, TreeError>(())
        });
        if let Err(err) = built {
            // Unreachable after the validation above; never present a
            // half-built model.
            self.clear_model();
            self.lifecycle = Lifecycle::Idle;
            self.emit_failed_load(&err);
            return Err(err);
        }
        self.refire_load_events();
        if self.last_selected.is_none() {
            self.last_selected = self.flatten(StateFlag::Selected).first().copied();
        }
        self.lifecycle = Lifecycle::Ready;
        let roots = self.roots.clone();
        log::debug!("model loaded: {} roots", roots.len());
        self.notifier.emit(TreeEvent::ModelLoaded {
            roots: roots.clone(),
        });
        Ok(roots)
    }

    /// Load (or reload) the model from any data-supply shape.
    pub async fn load(
        &mut self,
        source: impl Into<DataSource<Record>>,
    ) -> Result<Vec<NodeId>, TreeError> {
        let pending = self.begin_load(source);
        let outcome = pending.resolve().await;
        self.complete_load(outcome)
    }

    /// Failed model loads surface on both the data and tree channels.
    fn emit_failed_load(&mut self, err: &dyn fmt::Display) {
        let error = err.to_string();
        self.notifier.emit(TreeEvent::DataLoadError {
            error: error.clone(),
        });
        self.notifier.emit(TreeEvent::TreeLoadError { error });
    }

    fn settle_after_failed_load(&mut self) {
        self.lifecycle = if self.roots.is_empty() {
            Lifecycle::Idle
        } else {
            Lifecycle::Ready
        };
    }

    fn first_available_root(&self) -> Option<NodeId> {
        self.roots
            .iter()
            .copied()
            .find(|&r| !self.node(r).flags.contains(NodeFlags::REMOVED))
    }

    /// Re-derive indeterminate/selected status for every branch, children
    /// before parents.
    fn refresh_all(&mut self) {
        let order = self.all_ids();
        for &id in order.iter().rev() {
            if self.node(id).children.is_some() {
                self.recompute_branch(id);
            }
        }
    }

    /// Re-fire lifecycle events for flags that were pre-set in the loaded
    /// data, so listeners attached before the load still observe them.
    fn refire_load_events(&mut self) {
        let verbs = self.config.load_events.clone();
        for verb in verbs {
            let Some((flag, when)) = flag_for_verb(verb) else {
                continue;
            };
            let targets = self.flatten(Predicate::func(move |tree, id| {
                tree.node(id).flags.contains(flag.mask()) == when
            }));
            for id in targets {
                self.notifier.emit(TreeEvent::Node { verb, node: id });
            }
        }
    }

    /// Begin a lazy child load for `id`. Requires a configured child loader
    /// and unloaded children. Sets the loading flag; each call supersedes
    /// earlier pending loads for the same node.
    pub fn begin_load_children(&mut self, id: NodeId) -> Result<PendingChildLoad, TreeError> {
        let Some(node) = self.node_opt(id) else {
            return Err(TreeError::StaleNode);
        };
        if node.children.is_some() {
            return Err(TreeError::ChildrenAlreadyLoaded);
        }
        let record = node.record.clone();
        let Some(loader) = self.child_loader.as_mut() else {
            return Err(TreeError::NoChildLoader);
        };
        let source = loader(&record);
        let generation = {
            let node = self.node_mut(id);
            node.load_generation += 1;
            node.load_generation
        };
        self.set_flag(id, StateFlag::Loading, true);
        self.flush();
        log::debug!("child load started for {:?} (generation {generation})", id);
        Ok(PendingChildLoad {
            parent: id,
            generation,
            future: Box::pin(source.resolve()),
        })
    }

    /// Apply a completed lazy child load. Failure emits `children.loaderror`,
    /// clears the loading flag, and leaves children unloaded; a superseded or
    /// stale completion mutates nothing.
    pub fn complete_load_children(
        &mut self,
        outcome: ChildLoadOutcome,
    ) -> Result<Vec<NodeId>, TreeError> {
        let ChildLoadOutcome {
            parent,
            generation,
            result,
        } = outcome;
        let Some(node) = self.node_opt(parent) else {
            return Err(TreeError::StaleNode);
        };
        if node.load_generation != generation {
            log::warn!("ignoring superseded child load for {:?}", parent);
            return Err(TreeError::Load(LoadError::Superseded));
        }
        let records = match result {
            Ok(records) => records,
            Err(err) => {
                self.set_state(parent, StateFlag::Loading, false);
                self.notifier.emit(TreeEvent::ChildrenLoadError {
                    parent,
                    error: err.to_string(),
                });
                return Err(err.into());
            }
        };
        if let Err(err) = self.validate_new_ids(&records) {
            self.set_state(parent, StateFlag::Loading, false);
            self.notifier.emit(TreeEvent::ChildrenLoadError {
                parent,
                error: err.to_string(),
            });
            return Err(err);
        }
        let reserved = explicit_ids(&records);
        let built = self.with_batch(|tree| {
            tree.node_mut(parent).children = Some(Vec::new());
            let children = tree.parse_into(records, Some(parent), &reserved)?;
            tree.set_flag(parent, StateFlag::Loading, false);
            if tree.config.selection.auto_select_children
                && tree.node(parent).flags.contains(NodeFlags::SELECTED)
            {
                tree.cascade_select(parent, true);
            }
            tree.recompute_branch(parent);
            tree.refresh_ancestors(parent);
            Ok::<_, TreeError>(children)
        });
        let children = match built {
            Ok(children) => children,
            Err(err) => {
                // Roll the children back to unloaded so a retry is possible.
                let kids = self.node(parent).children.clone().unwrap_or_default();
                for k in kids {
                    self.free_subtree(k);
                }
                self.node_mut(parent).children = None;
                self.set_state(parent, StateFlag::Loading, false);
                return Err(err);
            }
        };
        self.notifier.emit(TreeEvent::ChildrenLoaded {
            parent,
            children: children.clone(),
        });
        Ok(children)
    }

    /// Lazily load a node's children through the configured child loader.
    pub async fn load_children(&mut self, id: NodeId) -> Result<Vec<NodeId>, TreeError> {
        let pending = self.begin_load_children(id)?;
        let outcome = pending.resolve().await;
        self.complete_load_children(outcome)
    }

    // --- search ---

    /// Run a search across the tree in one render batch.
    ///
    /// Every non-removed node is hidden unless it matches; ancestors of
    /// matches are un-hidden and expanded so matches stay reachable. Returns
    /// the matches in document order. Blank text queries clear the search.
    pub fn search(&mut self, query: impl Into<SearchQuery>) -> Vec<NodeId> {
        use crate::query::Walk;
        let query = query.into();
        if let SearchQuery::Text(text) = &query
            && text.trim().is_empty()
        {
            self.clear_search();
            return Vec::new();
        }
        let mut matches = Vec::new();
        self.recurse_down(|tree, id| {
            let node = tree.node(id);
            if !node.flags.contains(NodeFlags::REMOVED) {
                let hit = match &query {
                    SearchQuery::Text(text) => match &tree.config.matcher {
                        Some(matcher) => matcher(text, &node.record),
                        None => text_matches(text, &node.record.text),
                    },
                    SearchQuery::Func(f) => f(tree, id),
                };
                if hit {
                    matches.push(id);
                }
            }
            Walk::Continue
        });
        let match_set: HashSet<NodeId> = matches.iter().copied().collect();
        let all = self.all_ids();
        self.with_batch(|tree| {
            for id in all {
                if tree.node(id).flags.contains(NodeFlags::REMOVED) {
                    continue;
                }
                tree.set_flag(id, StateFlag::Hidden, !match_set.contains(&id));
            }
            for &m in &matches {
                for ancestor in tree.ancestors(m) {
                    tree.set_flag(ancestor, StateFlag::Hidden, false);
                    tree.set_flag(ancestor, StateFlag::Collapsed, false);
                }
            }
        });
        log::debug!("search matched {} nodes", matches.len());
        matches
    }

    /// Clear any active search: every node shown, every node collapsed.
    pub fn clear_search(&mut self) {
        let all = self.all_ids();
        self.with_batch(|tree| {
            for id in all {
                tree.set_flag(id, StateFlag::Hidden, false);
                tree.set_flag(id, StateFlag::Collapsed, true);
            }
        });
    }
}

const fn verb_for(flag: StateFlag, value: bool) -> Option<NodeVerb> {
    match (flag, value) {
        (StateFlag::Selected, true) => Some(NodeVerb::Selected),
        (StateFlag::Selected, false) => Some(NodeVerb::Deselected),
        (StateFlag::Collapsed, true) => Some(NodeVerb::Collapsed),
        (StateFlag::Collapsed, false) => Some(NodeVerb::Expanded),
        (StateFlag::Hidden, true) => Some(NodeVerb::Hidden),
        (StateFlag::Hidden, false) => Some(NodeVerb::Shown),
        (StateFlag::Focused, true) => Some(NodeVerb::Focused),
        (StateFlag::Focused, false) => Some(NodeVerb::Blurred),
        (StateFlag::Removed, true) => Some(NodeVerb::Removed),
        (StateFlag::Removed, false) => Some(NodeVerb::Restored),
        (StateFlag::Indeterminate, true) => Some(NodeVerb::Indeterminate),
        (StateFlag::Indeterminate, false) => None,
        (StateFlag::Loading | StateFlag::Selectable, _) => None,
    }
}

const fn flag_for_verb(verb: NodeVerb) -> Option<(StateFlag, bool)> {
    match verb {
        NodeVerb::Selected => Some((StateFlag::Selected, true)),
        NodeVerb::Collapsed => Some((StateFlag::Collapsed, true)),
        NodeVerb::Expanded => Some((StateFlag::Collapsed, false)),
        NodeVerb::Hidden => Some((StateFlag::Hidden, true)),
        NodeVerb::Focused => Some((StateFlag::Focused, true)),
        NodeVerb::Removed => Some((StateFlag::Removed, true)),
        NodeVerb::Indeterminate => Some((StateFlag::Indeterminate, true)),
        _ => None,
    }
}

/// Every explicit id carried by a batch of records, at any depth.
fn explicit_ids(records: &[Record]) -> HashSet<String> {
    fn walk(records: &[Record], out: &mut HashSet<String>) {
        for record in records {
            if let Some(id) = &record.id {
                out.insert(id.clone());
            }
            walk(&record.children, out);
        }
    }
    let mut out = HashSet::new();
    walk(records, &mut out);
    out
}

fn validate_batch_ids(records: &[Record]) -> Result<(), TreeError> {
    fn walk(records: &[Record], seen: &mut HashSet<String>) -> Result<(), TreeError> {
        for record in records {
            if let Some(id) = &record.id
                && !seen.insert(id.clone())
            {
                return Err(TreeError::DuplicateId(id.clone()));
            }
            walk(&record.children, seen)?;
        }
        Ok(())
    }
    walk(records, &mut HashSet::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::test_support::RecordingRenderer;
    use crate::types::StateOverrides;
    use futures::executor::block_on;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn sample() -> Vec<Record> {
        vec![
            Record::with_id("1", "A").child(Record::with_id("2", "B")),
            Record::with_id("3", "C")
                .child(Record::with_id("4", "D"))
                .child(Record::with_id("5", "E")),
        ]
    }

    fn make(records: Vec<Record>) -> Tree {
        let mut tree = Tree::new();
        block_on(tree.load(records)).unwrap();
        tree
    }

    fn make_with(config: TreeConfig, records: Vec<Record>) -> Tree {
        let mut tree = Tree::with_config(config);
        block_on(tree.load(records)).unwrap();
        tree
    }

    fn record_events(tree: &mut Tree) -> Rc<RefCell<Vec<TreeEvent>>> {
        let seen: Rc<RefCell<Vec<TreeEvent>>> = Rc::default();
        let sink = Rc::clone(&seen);
        tree.on(move |ev| sink.borrow_mut().push(ev.clone()));
        seen
    }

    #[test]
    fn load_builds_the_model_and_reaches_ready() {
        let tree = make(sample());
        assert_eq!(tree.lifecycle(), Lifecycle::Ready);
        assert_eq!(tree.roots().len(), 2);
        assert_eq!(tree.len(), 5);
        let b = tree.by_id("2").unwrap();
        assert_eq!(tree.text_of(b), Some("B"));
        assert_eq!(tree.parent_of(b), tree.by_id("1"));
    }

    #[test]
    fn load_event_order_is_fixed() {
        let mut tree = Tree::new();
        let seen = record_events(&mut tree);
        block_on(tree.load(vec![Record::with_id("1", "A")])).unwrap();
        let kinds: Vec<EventKind> = seen.borrow().iter().map(TreeEvent::kind).collect();
        assert_eq!(kinds, vec![EventKind::DataLoaded, EventKind::ModelLoaded]);
    }

    #[test]
    fn second_load_fully_replaces_the_model() {
        let mut tree = make(vec![Record::with_id("1", "A")]);
        let old = tree.by_id("1").unwrap();
        block_on(tree.load(vec![Record::with_id("9", "Z")])).unwrap();
        assert_eq!(tree.by_id("1"), None);
        assert!(!tree.is_alive(old));
        let new = tree.by_id("9").unwrap();
        assert_eq!(tree.text_of(new), Some("Z"));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn failed_load_leaves_previous_model_untouched() {
        let mut tree = make(vec![Record::with_id("1", "A")]);
        let seen = record_events(&mut tree);
        let err = block_on(tree.load(DataSource::func(|| Err(LoadError::loader("boom")))))
            .unwrap_err();
        assert!(matches!(err, TreeError::Load(LoadError::Loader(_))));
        assert_eq!(tree.lifecycle(), Lifecycle::Ready);
        assert!(tree.by_id("1").is_some());
        let kinds: Vec<EventKind> = seen.borrow().iter().map(TreeEvent::kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::DataLoadError, EventKind::TreeLoadError]
        );
    }

    #[test]
    fn superseded_load_completion_is_ignored() {
        let mut tree = Tree::new();
        let first = tree.begin_load(vec![Record::with_id("old", "stale")]);
        let second = tree.begin_load(vec![Record::with_id("new", "fresh")]);
        let second_outcome = block_on(second.resolve());
        tree.complete_load(second_outcome).unwrap();
        assert!(tree.by_id("new").is_some());

        let first_outcome = block_on(first.resolve());
        let err = tree.complete_load(first_outcome).unwrap_err();
        assert_eq!(err, TreeError::Load(LoadError::Superseded));
        // The stale completion resurrected nothing.
        assert!(tree.by_id("old").is_none());
        assert!(tree.by_id("new").is_some());
    }

    #[test]
    fn duplicate_ids_in_a_load_are_rejected_and_previous_model_kept() {
        let mut tree = make(vec![Record::with_id("1", "A")]);
        let err = block_on(tree.load(vec![
            Record::with_id("x", "X"),
            Record::with_id("x", "X again"),
        ]))
        .unwrap_err();
        assert_eq!(err, TreeError::DuplicateId("x".into()));
        assert!(tree.by_id("1").is_some());
        assert!(tree.by_id("x").is_none());
    }

    #[test]
    fn duplicate_ids_in_a_load_surface_on_both_error_channels() {
        let mut tree = Tree::new();
        let seen = record_events(&mut tree);
        block_on(tree.load(vec![
            Record::with_id("x", "X"),
            Record::with_id("x", "X again"),
        ]))
        .unwrap_err();
        let kinds: Vec<EventKind> = seen.borrow().iter().map(TreeEvent::kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::DataLoadError, EventKind::TreeLoadError]
        );
    }

    #[test]
    fn omitted_ids_are_generated_and_unique() {
        let tree = make(vec![Record::new("A"), Record::new("B")]);
        let a = tree.roots()[0];
        let b = tree.roots()[1];
        let ida = tree.id_of(a).unwrap().to_owned();
        let idb = tree.id_of(b).unwrap().to_owned();
        assert_ne!(ida, idb);
        assert_eq!(tree.by_id(&ida), Some(a));
    }

    #[test]
    fn generated_ids_avoid_explicit_ids_in_the_same_batch() {
        let mut tree = make(vec![Record::with_id("keep", "old")]);
        // The id-less record would otherwise generate "node-0" and collide
        // with the explicit id mid-build, after the old model was cleared.
        block_on(tree.load(vec![
            Record::new("anon"),
            Record::with_id("node-0", "explicit"),
        ]))
        .unwrap();
        assert_eq!(tree.lifecycle(), Lifecycle::Ready);
        assert_eq!(tree.len(), 2);
        let explicit = tree.by_id("node-0").unwrap();
        assert_eq!(tree.text_of(explicit), Some("explicit"));
        let anon = tree.roots()[0];
        assert_eq!(tree.text_of(anon), Some("anon"));
        assert_ne!(tree.id_of(anon), Some("node-0"));
    }

    #[test]
    fn exclusive_selection_keeps_exactly_one_node_selected() {
        let mut tree = make(sample());
        let b = tree.by_id("2").unwrap();
        let d = tree.by_id("4").unwrap();
        tree.select(b);
        tree.select(d);
        assert_eq!(tree.flatten(StateFlag::Selected), vec![d]);
        assert_eq!(tree.last_selected(), Some(d));
    }

    #[test]
    fn multiple_mode_allows_many_selections() {
        let mut tree = make_with(TreeConfig::default().multiple(true), sample());
        let b = tree.by_id("2").unwrap();
        let d = tree.by_id("4").unwrap();
        tree.select(b);
        tree.select(d);
        assert_eq!(tree.flatten(StateFlag::Selected).len(), 2);
    }

    #[test]
    fn selecting_a_child_marks_ancestors_indeterminate() {
        let mut tree = make(sample());
        let a = tree.by_id("1").unwrap();
        let b = tree.by_id("2").unwrap();
        tree.select(b);
        assert_eq!(tree.state(a, StateFlag::Indeterminate), Some(true));
        assert_eq!(tree.state(a, StateFlag::Selected), Some(false));
    }

    #[test]
    fn selecting_a_parent_clears_its_own_indeterminate_status() {
        let mut tree = make_with(TreeConfig::default().multiple(true), sample());
        let a = tree.by_id("1").unwrap();
        let b = tree.by_id("2").unwrap();
        tree.select(b);
        assert_eq!(tree.state(a, StateFlag::Indeterminate), Some(true));
        // A node is never selected and indeterminate at the same time.
        tree.select(a);
        assert_eq!(tree.state(a, StateFlag::Selected), Some(true));
        assert_eq!(tree.state(a, StateFlag::Indeterminate), Some(false));
        // Deselecting it with B still selected reinstates partial status.
        tree.deselect(a);
        assert_eq!(tree.state(a, StateFlag::Indeterminate), Some(true));
    }

    #[test]
    fn auto_select_children_cascades_down_and_settles_ancestors() {
        let mut tree = make_with(
            TreeConfig::default().multiple(true).auto_select_children(true),
            sample(),
        );
        let a = tree.by_id("1").unwrap();
        let b = tree.by_id("2").unwrap();
        tree.select(a);
        assert_eq!(tree.state(a, StateFlag::Selected), Some(true));
        assert_eq!(tree.state(b, StateFlag::Selected), Some(true));
        assert_eq!(tree.state(a, StateFlag::Indeterminate), Some(false));
    }

    #[test]
    fn auto_mode_partial_deselection_unselects_the_parent() {
        let mut tree = make_with(
            TreeConfig::default().multiple(true).auto_select_children(true),
            sample(),
        );
        let c = tree.by_id("3").unwrap();
        let d = tree.by_id("4").unwrap();
        let e = tree.by_id("5").unwrap();
        tree.select(c);
        assert_eq!(tree.state(c, StateFlag::Selected), Some(true));
        tree.deselect(d);
        assert_eq!(tree.state(c, StateFlag::Selected), Some(false));
        assert_eq!(tree.state(c, StateFlag::Indeterminate), Some(true));
        assert_eq!(tree.state(e, StateFlag::Selected), Some(true));
    }

    #[test]
    fn unselectable_nodes_refuse_selection() {
        let mut tree = make(vec![Record::with_id("1", "A").state(StateOverrides {
            selectable: Some(false),
            ..StateOverrides::default()
        })]);
        let a = tree.by_id("1").unwrap();
        assert!(!tree.select(a));
        assert_eq!(tree.state(a, StateFlag::Selected), Some(false));
    }

    #[test]
    fn removed_nodes_cannot_be_selected_until_restored() {
        let mut tree = make(vec![Record::with_id("1", "A")]);
        let a = tree.by_id("1").unwrap();
        tree.soft_remove(a);
        assert!(!tree.select(a));
        tree.restore(a);
        assert!(tree.select(a));
    }

    #[test]
    fn prevent_direct_deselection_blocks_only_the_direct_path() {
        let mut tree = make(vec![Record::with_id("1", "A")]);
        tree.set_prevent_direct_deselection(true);
        let a = tree.by_id("1").unwrap();
        tree.select(a);
        assert!(!tree.deselect(a));
        assert_eq!(tree.state(a, StateFlag::Selected), Some(true));
        assert!(tree.deselect_cascading(a));
        assert_eq!(tree.state(a, StateFlag::Selected), Some(false));
    }

    #[test]
    fn restore_resets_every_flag_to_tree_defaults() {
        let mut tree = make(vec![Record::with_id("1", "A")]);
        let a = tree.by_id("1").unwrap();
        tree.select(a);
        tree.expand(a);
        tree.hide(a);
        tree.soft_remove(a);
        tree.restore(a);
        assert_eq!(tree.flags_of(a), Some(NodeFlags::default()));
    }

    #[test]
    fn restore_without_reset_only_clears_the_removed_flag() {
        let mut tree = make_with(
            TreeConfig::default().reset_state_on_restore(false),
            vec![Record::with_id("1", "A")],
        );
        let a = tree.by_id("1").unwrap();
        tree.select(a);
        tree.soft_remove(a);
        tree.restore(a);
        assert_eq!(tree.state(a, StateFlag::Removed), Some(false));
        assert_eq!(tree.state(a, StateFlag::Selected), Some(true));
    }

    #[test]
    fn soft_removed_child_drops_out_of_ancestor_selection_counts() {
        let mut tree = make_with(TreeConfig::default().multiple(true), sample());
        let c = tree.by_id("3").unwrap();
        let d = tree.by_id("4").unwrap();
        tree.select(d);
        assert_eq!(tree.state(c, StateFlag::Indeterminate), Some(true));
        tree.soft_remove(d);
        assert_eq!(tree.state(c, StateFlag::Indeterminate), Some(false));
    }

    #[test]
    fn focus_is_exclusive() {
        let mut tree = make(sample());
        let a = tree.by_id("1").unwrap();
        let c = tree.by_id("3").unwrap();
        tree.focus(a);
        tree.focus(c);
        assert_eq!(tree.state(a, StateFlag::Focused), Some(false));
        assert_eq!(tree.state(c, StateFlag::Focused), Some(true));
        assert_eq!(tree.flatten(StateFlag::Focused), vec![c]);
    }

    #[test]
    fn visibility_requires_expanded_ancestors() {
        let mut tree = make(sample());
        let a = tree.by_id("1").unwrap();
        let b = tree.by_id("2").unwrap();
        // Default state is collapsed, so children start invisible.
        assert!(tree.is_visible(a));
        assert!(!tree.is_visible(b));
        tree.expand(a);
        assert!(tree.is_visible(b));
        tree.hide(b);
        assert!(!tree.is_visible(b));
    }

    #[test]
    fn next_visible_walks_document_order_skipping_invisible_subtrees() {
        let mut tree = make(sample());
        let a = tree.by_id("1").unwrap();
        let b = tree.by_id("2").unwrap();
        let c = tree.by_id("3").unwrap();
        // Collapsed: next visible after A is C, skipping hidden B.
        assert_eq!(tree.next_visible(a), Some(c));
        tree.expand(a);
        assert_eq!(tree.next_visible(a), Some(b));
        assert_eq!(tree.next_visible(b), Some(c));
        assert_eq!(tree.next_visible(c), None);
    }

    #[test]
    fn index_paths_order_numerically_not_textually() {
        let records: Vec<Record> = (0..11)
            .map(|i| Record::with_id(i.to_string(), format!("N{i}")))
            .collect();
        let tree = make(records);
        let ninth = tree.by_id("9").unwrap();
        let tenth = tree.by_id("10").unwrap();
        let p9 = tree.index_path(ninth).unwrap();
        let p10 = tree.index_path(tenth).unwrap();
        // "10" < "9" as strings; positions compare numerically.
        assert!(p9 < p10);
        assert_eq!(p10.to_string(), "10");
    }

    #[test]
    fn bounding_nodes_sorts_endpoints_by_document_order() {
        let mut tree = make(sample());
        tree.expand(tree.by_id("1").unwrap());
        let b = tree.by_id("2").unwrap();
        let d = tree.by_id("4").unwrap();
        assert_eq!(tree.bounding_nodes(&[d, b]), Some((b, d)));
    }

    #[test]
    fn select_between_selects_the_visible_range() {
        let mut tree = make_with(TreeConfig::default().multiple(true), sample());
        let a = tree.by_id("1").unwrap();
        let b = tree.by_id("2").unwrap();
        let c = tree.by_id("3").unwrap();
        let d = tree.by_id("4").unwrap();
        tree.expand(a);
        tree.expand(c);
        tree.select(a);
        let (start, end) = tree.bounding_nodes(&[d, a]).unwrap();
        assert_eq!((start, end), (a, d));
        tree.select_between(start, end);
        // Everything visible from A (exclusive) through D (inclusive).
        for id in [b, c, d] {
            assert_eq!(tree.state(id, StateFlag::Selected), Some(true), "{id:?}");
        }
        let e = tree.by_id("5").unwrap();
        assert_eq!(tree.state(e, StateFlag::Selected), Some(false));
    }

    #[test]
    fn search_hides_non_matches_and_exposes_matches() {
        let mut tree = make(sample());
        let a = tree.by_id("1").unwrap();
        let b = tree.by_id("2").unwrap();
        let c = tree.by_id("3").unwrap();
        let matches = tree.search("B");
        assert_eq!(matches, vec![b]);
        // The ancestor of a match is shown and expanded; the match is visible.
        assert_eq!(tree.state(a, StateFlag::Hidden), Some(false));
        assert_eq!(tree.state(a, StateFlag::Collapsed), Some(false));
        assert!(tree.is_visible(b));
        // Unrelated subtrees are hidden.
        assert_eq!(tree.state(c, StateFlag::Hidden), Some(true));
    }

    #[test]
    fn blank_search_equals_clear_search() {
        let mut tree = make(sample());
        tree.search("B");
        let matches = tree.search("  ");
        assert!(matches.is_empty());
        for id in tree.all_ids() {
            assert_eq!(tree.state(id, StateFlag::Hidden), Some(false));
            assert_eq!(tree.state(id, StateFlag::Collapsed), Some(true));
        }
    }

    #[test]
    fn search_accepts_predicate_queries() {
        let mut tree = make(sample());
        let d = tree.by_id("4").unwrap();
        let matches = tree.search(SearchQuery::func(|tree, id| {
            tree.text_of(id) == Some("D")
        }));
        assert_eq!(matches, vec![d]);
    }

    #[test]
    fn search_uses_the_configured_matcher() {
        let mut tree = make_with(
            TreeConfig::default().matcher(|query, record| record.text.starts_with(query)),
            sample(),
        );
        let matches = tree.search("C");
        assert_eq!(matches, vec![tree.by_id("3").unwrap()]);
    }

    #[test]
    fn require_selection_selects_the_first_available_root() {
        let tree = make_with(TreeConfig::default().require_selection(true), sample());
        let a = tree.by_id("1").unwrap();
        assert_eq!(tree.state(a, StateFlag::Selected), Some(true));
        assert_eq!(tree.last_selected(), Some(a));
    }

    #[test]
    fn preselected_records_refire_their_event_after_load() {
        let mut tree = Tree::new();
        let seen = record_events(&mut tree);
        block_on(tree.load(vec![Record::with_id("1", "A").state(StateOverrides {
            selected: Some(true),
            ..StateOverrides::default()
        })]))
        .unwrap();
        let a = tree.by_id("1").unwrap();
        assert_eq!(tree.state(a, StateFlag::Selected), Some(true));
        let refired = seen
            .borrow()
            .iter()
            .any(|ev| matches!(ev, TreeEvent::Node { verb: NodeVerb::Selected, node } if *node == a));
        assert!(refired, "pre-set selection should re-fire after load");
    }

    #[test]
    fn muted_events_are_not_observed() {
        let mut tree = make(vec![Record::with_id("1", "A")]);
        let seen = record_events(&mut tree);
        tree.mute([EventKind::Node(NodeVerb::Selected)]);
        let a = tree.by_id("1").unwrap();
        tree.select(a);
        assert!(seen.borrow().is_empty());
        tree.unmute([EventKind::Node(NodeVerb::Selected)]);
        tree.deselect(a);
        tree.select(a);
        assert!(!seen.borrow().is_empty());
    }

    #[test]
    fn one_flush_per_logical_operation() {
        let mut tree = make_with(
            TreeConfig::default().multiple(true).auto_select_children(true),
            sample(),
        );
        let renderer = RecordingRenderer::default();
        let flushes = Rc::clone(&renderer.flushes);
        tree.attach(renderer);
        let c = tree.by_id("3").unwrap();
        // Selecting C cascades into D and E, but flushes exactly once.
        tree.select(c);
        assert_eq!(flushes.borrow().len(), 1);
        assert_eq!(flushes.borrow()[0].len(), 3);
    }

    #[test]
    fn explicit_batches_coalesce_across_operations() {
        let mut tree = make(sample());
        let renderer = RecordingRenderer::default();
        let flushes = Rc::clone(&renderer.flushes);
        tree.attach(renderer);
        let a = tree.by_id("1").unwrap();
        let c = tree.by_id("3").unwrap();
        tree.batch();
        tree.expand(a);
        tree.expand(c);
        tree.hide(c);
        assert!(flushes.borrow().is_empty());
        tree.end();
        assert_eq!(flushes.borrow().len(), 1);
        assert_eq!(flushes.borrow()[0], vec![a, c]);
    }

    #[test]
    fn add_and_insert_preserve_order() {
        let mut tree = make(vec![Record::with_id("1", "A"), Record::with_id("3", "C")]);
        tree.insert_at(None, 1, Record::with_id("2", "B")).unwrap();
        let texts: Vec<&str> = tree.roots().iter().map(|&r| tree.text_of(r).unwrap()).collect();
        assert_eq!(texts, vec!["A", "B", "C"]);
        let err = tree
            .insert_at(None, 9, Record::with_id("9", "Z"))
            .unwrap_err();
        assert_eq!(err, TreeError::IndexOutOfBounds { index: 9, len: 3 });
    }

    #[test]
    fn sort_mode_makes_insertion_indices_advisory() {
        let mut tree = make_with(
            TreeConfig::default().sort_by_text(),
            vec![Record::with_id("c", "C"), Record::with_id("a", "A")],
        );
        // Loaded records are already sorted.
        let texts: Vec<&str> = tree.roots().iter().map(|&r| tree.text_of(r).unwrap()).collect();
        assert_eq!(texts, vec!["A", "C"]);
        // The index is ignored; sorted position wins.
        tree.insert_at(None, 0, Record::with_id("b", "B")).unwrap();
        let texts: Vec<&str> = tree.roots().iter().map(|&r| tree.text_of(r).unwrap()).collect();
        assert_eq!(texts, vec!["A", "B", "C"]);
    }

    #[test]
    fn duplicate_id_on_insert_is_rejected() {
        let mut tree = make(vec![Record::with_id("1", "A")]);
        let err = tree.add_root(Record::with_id("1", "again")).unwrap_err();
        assert_eq!(err, TreeError::DuplicateId("1".into()));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn hard_removal_frees_the_subtree_and_stales_handles() {
        let mut tree = make(sample());
        let c = tree.by_id("3").unwrap();
        let d = tree.by_id("4").unwrap();
        assert!(tree.remove(c));
        assert!(!tree.is_alive(c));
        assert!(!tree.is_alive(d));
        assert_eq!(tree.by_id("3"), None);
        assert_eq!(tree.by_id("4"), None);
        assert_eq!(tree.roots().len(), 1);
        // Stale handles are inert everywhere.
        assert!(!tree.select(c));
        assert_eq!(tree.state(c, StateFlag::Selected), None);
        assert_eq!(tree.index_path(c), None);
    }

    #[test]
    fn remove_all_swaps_in_an_empty_model() {
        let mut tree = make(sample());
        let seen = record_events(&mut tree);
        tree.remove_all();
        assert!(tree.is_empty());
        assert_eq!(tree.lifecycle(), Lifecycle::Ready);
        let kinds: Vec<EventKind> = seen.borrow().iter().map(TreeEvent::kind).collect();
        assert_eq!(kinds, vec![EventKind::ModelLoaded]);
    }

    #[test]
    fn slot_reuse_bumps_generations() {
        let mut tree = make(vec![Record::with_id("1", "A")]);
        let a = tree.by_id("1").unwrap();
        tree.remove(a);
        let b = tree.add_root(Record::with_id("2", "B")).unwrap();
        assert!(!tree.is_alive(a));
        assert!(tree.is_alive(b));
        if a.0 == b.0 {
            assert!(b.1 > a.1, "generation must increase on reuse");
        }
    }

    #[test]
    fn lazy_children_load_through_the_configured_loader() {
        let mut tree = Tree::new();
        tree.set_child_loader(|parent| {
            let id = parent.id.clone().unwrap_or_default();
            DataSource::from(vec![Record::with_id(format!("{id}-1"), "kid")])
        });
        block_on(tree.load(vec![Record::with_id("p", "parent")])).unwrap();
        let p = tree.by_id("p").unwrap();
        assert!(tree.children_unloaded(p));
        let seen = record_events(&mut tree);
        let kids = block_on(tree.load_children(p)).unwrap();
        assert_eq!(kids.len(), 1);
        assert_eq!(tree.children_of(p), kids.as_slice());
        assert_eq!(tree.by_id("p-1"), Some(kids[0]));
        assert_eq!(tree.state(p, StateFlag::Loading), Some(false));
        let kinds: Vec<EventKind> = seen.borrow().iter().map(TreeEvent::kind).collect();
        assert!(kinds.contains(&EventKind::ChildrenLoaded));
        // A second load on the same node is refused.
        let err = block_on(tree.load_children(p)).unwrap_err();
        assert_eq!(err, TreeError::ChildrenAlreadyLoaded);
    }

    #[test]
    fn failed_child_load_reports_and_leaves_children_unloaded() {
        let mut tree = Tree::new();
        tree.set_child_loader(|_| DataSource::func(|| Err(LoadError::loader("offline"))));
        block_on(tree.load(vec![Record::with_id("p", "parent")])).unwrap();
        let p = tree.by_id("p").unwrap();
        let seen = record_events(&mut tree);
        let err = block_on(tree.load_children(p)).unwrap_err();
        assert!(matches!(err, TreeError::Load(LoadError::Loader(_))));
        assert!(tree.children_unloaded(p));
        assert_eq!(tree.state(p, StateFlag::Loading), Some(false));
        let kinds: Vec<EventKind> = seen.borrow().iter().map(TreeEvent::kind).collect();
        assert_eq!(kinds, vec![EventKind::ChildrenLoadError]);
    }

    #[test]
    fn superseded_child_load_is_ignored() {
        let mut tree = Tree::new();
        let mut batch = 0_u32;
        tree.set_child_loader(move |_| {
            batch += 1;
            let n = batch;
            DataSource::func(move || Ok(vec![Record::with_id(format!("kid-{n}"), "kid")]))
        });
        block_on(tree.load(vec![Record::with_id("p", "parent")])).unwrap();
        let p = tree.by_id("p").unwrap();
        let first = tree.begin_load_children(p).unwrap();
        let second = tree.begin_load_children(p).unwrap();
        let second_outcome = block_on(second.resolve());
        tree.complete_load_children(second_outcome).unwrap();
        let first_outcome = block_on(first.resolve());
        let err = tree.complete_load_children(first_outcome).unwrap_err();
        assert_eq!(err, TreeError::Load(LoadError::Superseded));
        assert_eq!(tree.children_of(p).len(), 1);
        assert!(tree.by_id("kid-2").is_some());
        assert!(tree.by_id("kid-1").is_none());
    }

    #[test]
    fn load_children_without_a_loader_is_an_error() {
        let mut tree = make(vec![Record::with_id("p", "parent")]);
        let p = tree.by_id("p").unwrap();
        let err = tree.begin_load_children(p).unwrap_err();
        assert_eq!(err, TreeError::NoChildLoader);
    }

    #[test]
    fn auto_selected_parent_selects_freshly_loaded_children() {
        let mut tree = Tree::with_config(
            TreeConfig::default().multiple(true).auto_select_children(true),
        );
        tree.set_child_loader(|_| DataSource::from(vec![Record::with_id("kid", "kid")]));
        block_on(tree.load(vec![Record::with_id("p", "parent")])).unwrap();
        let p = tree.by_id("p").unwrap();
        tree.select(p);
        block_on(tree.load_children(p)).unwrap();
        let kid = tree.by_id("kid").unwrap();
        assert_eq!(tree.state(kid, StateFlag::Selected), Some(true));
        assert_eq!(tree.state(p, StateFlag::Selected), Some(true));
        assert_eq!(tree.state(p, StateFlag::Indeterminate), Some(false));
    }

    #[test]
    fn unload_children_makes_the_node_lazy_again() {
        let mut tree = Tree::new();
        tree.set_child_loader(|_| DataSource::from(vec![Record::with_id("kid", "kid")]));
        block_on(tree.load(vec![Record::with_id("p", "parent")])).unwrap();
        let p = tree.by_id("p").unwrap();
        block_on(tree.load_children(p)).unwrap();
        assert!(tree.unload_children(p));
        assert!(tree.children_unloaded(p));
        assert_eq!(tree.by_id("kid"), None);
        // Loadable again after unload.
        let kids = block_on(tree.load_children(p)).unwrap();
        assert_eq!(kids.len(), 1);
    }

    #[test]
    fn index_path_renders_dot_joined() {
        let mut tree = make(sample());
        tree.expand(tree.by_id("3").unwrap());
        let e = tree.by_id("5").unwrap();
        assert_eq!(tree.index_path(e).unwrap().to_string(), "1.1");
    }
}
