// Copyright 2026 the Coppice Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Traversal, querying, and bulk operations over a [`Tree`].

use core::cmp::Ordering;
use core::fmt;

use hashbrown::HashSet;

use crate::tree::Tree;
use crate::types::{NodeFlags, NodeId, Record, StateFlag, StateOverrides};

/// Sentinel controlling tree walks: continue descending or stop at the
/// current node.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Walk {
    /// Continue the walk.
    #[default]
    Continue,
    /// Stop the walk at this node.
    Stop,
}

/// A node predicate: a single state flag, or an arbitrary closure.
pub enum Predicate {
    /// Matches nodes with the flag set.
    Flag(StateFlag),
    /// Matches nodes the closure accepts.
    Func(Box<dyn Fn(&Tree, NodeId) -> bool>),
}

impl Predicate {
    /// Wrap a closure predicate.
    pub fn func(f: impl Fn(&Tree, NodeId) -> bool + 'static) -> Self {
        Self::Func(Box::new(f))
    }

    pub(crate) fn matches(&self, tree: &Tree, id: NodeId) -> bool {
        match self {
            Self::Flag(flag) => tree.state(id, *flag).unwrap_or(false),
            Self::Func(f) => f(tree, id),
        }
    }
}

impl From<StateFlag> for Predicate {
    fn from(flag: StateFlag) -> Self {
        Self::Flag(flag)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(flag) => f.debug_tuple("Flag").field(flag).finish(),
            Self::Func(_) => f.write_str("Func(..)"),
        }
    }
}

/// Result of [`Tree::filter`]: matching nodes plus the ancestors needed to
/// reach them, in document order, with O(1) membership checks.
#[derive(Clone, Debug, Default)]
pub struct NodeSet {
    ids: Vec<NodeId>,
    members: HashSet<NodeId>,
}

impl NodeSet {
    /// Nodes in document order.
    pub fn ids(&self) -> &[NodeId] {
        &self.ids
    }

    /// Whether the set retains this node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.members.contains(&id)
    }

    /// Number of retained nodes.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether nothing matched.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterate the retained nodes in document order.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.ids.iter().copied()
    }
}

/// A state mutation applied through [`Tree::invoke`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// [`Tree::select`]
    Select,
    /// [`Tree::deselect`]
    Deselect,
    /// [`Tree::expand`]
    Expand,
    /// [`Tree::collapse`]
    Collapse,
    /// [`Tree::show`]
    Show,
    /// [`Tree::hide`]
    Hide,
    /// [`Tree::soft_remove`]
    SoftRemove,
    /// [`Tree::restore`]
    Restore,
    /// [`Tree::focus`]
    Focus,
    /// [`Tree::blur`]
    Blur,
}

#[derive(Copy, Clone)]
struct Materialize {
    keep_ids: bool,
    keep_state: bool,
}

impl Tree {
    // --- traversal ---

    /// Depth-first pre-order walk over the whole tree. Returns the node the
    /// walk stopped at, if any.
    pub fn recurse_down(
        &self,
        mut f: impl FnMut(&Self, NodeId) -> Walk,
    ) -> Option<NodeId> {
        let roots = self.roots.clone();
        self.recurse_slice(&roots, &mut f)
    }

    /// Depth-first pre-order walk over one subtree, `from` included.
    pub fn recurse_down_from(
        &self,
        from: NodeId,
        mut f: impl FnMut(&Self, NodeId) -> Walk,
    ) -> Option<NodeId> {
        if !self.is_alive(from) {
            return None;
        }
        self.recurse_slice(&[from], &mut f)
    }

    fn recurse_slice(
        &self,
        ids: &[NodeId],
        f: &mut impl FnMut(&Self, NodeId) -> Walk,
    ) -> Option<NodeId> {
        for &id in ids {
            if f(self, id) == Walk::Stop {
                return Some(id);
            }
            let kids = self.node(id).children.clone().unwrap_or_default();
            if let Some(hit) = self.recurse_slice(&kids, f) {
                return Some(hit);
            }
        }
        None
    }

    /// Every descendant of a node, in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.recurse_down_from(id, |_, n| {
            if n != id {
                out.push(n);
            }
            Walk::Continue
        });
        out
    }

    pub(crate) fn all_ids(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.len());
        self.recurse_down(|_, id| {
            out.push(id);
            Walk::Continue
        });
        out
    }

    // --- queries ---

    /// Collect matching nodes from the whole tree into a flat list, in
    /// document order.
    pub fn flatten(&self, predicate: impl Into<Predicate>) -> Vec<NodeId> {
        let predicate = predicate.into();
        let mut out = Vec::new();
        self.recurse_down(|tree, id| {
            if predicate.matches(tree, id) {
                out.push(id);
            }
            Walk::Continue
        });
        out
    }

    /// Matching nodes plus the ancestor chains needed to reach them.
    pub fn filter(&self, predicate: impl Into<Predicate>) -> NodeSet {
        let matches = self.flatten(predicate);
        let mut members: HashSet<NodeId> = HashSet::new();
        for &m in &matches {
            members.insert(m);
            for ancestor in self.ancestors(m) {
                members.insert(ancestor);
            }
        }
        let mut ids = Vec::with_capacity(members.len());
        self.recurse_down(|_, id| {
            if members.contains(&id) {
                ids.push(id);
            }
            Walk::Continue
        });
        NodeSet { ids, members }
    }

    /// Selected nodes.
    pub fn selected(&self) -> Vec<NodeId> {
        self.flatten(StateFlag::Selected)
    }

    /// Nodes that are not soft-removed.
    pub fn available(&self) -> Vec<NodeId> {
        self.flatten(Predicate::func(|tree, id| {
            tree.state(id, StateFlag::Removed) == Some(false)
        }))
    }

    /// Nodes that would currently render.
    pub fn visible(&self) -> Vec<NodeId> {
        self.flatten(Predicate::func(|tree, id| tree.is_visible(id)))
    }

    /// Hidden nodes.
    pub fn hidden(&self) -> Vec<NodeId> {
        self.flatten(StateFlag::Hidden)
    }

    /// Collapsed nodes.
    pub fn collapsed(&self) -> Vec<NodeId> {
        self.flatten(StateFlag::Collapsed)
    }

    /// Expanded (non-collapsed) nodes.
    pub fn expanded(&self) -> Vec<NodeId> {
        self.flatten(Predicate::func(|tree, id| {
            tree.state(id, StateFlag::Collapsed) == Some(false)
        }))
    }

    /// The focused node, if any.
    pub fn focused(&self) -> Option<NodeId> {
        self.flatten(StateFlag::Focused).first().copied()
    }

    /// Partially selected branch nodes.
    pub fn indeterminate(&self) -> Vec<NodeId> {
        self.flatten(StateFlag::Indeterminate)
    }

    /// Nodes with a child load in flight.
    pub fn loading(&self) -> Vec<NodeId> {
        self.flatten(StateFlag::Loading)
    }

    /// Soft-removed nodes.
    pub fn removed(&self) -> Vec<NodeId> {
        self.flatten(StateFlag::Removed)
    }

    /// Nodes that accept selection.
    pub fn selectable(&self) -> Vec<NodeId> {
        self.flatten(StateFlag::Selectable)
    }

    // --- extraction ---

    /// Deep-clone the matching nodes (with the ancestors needed to reach
    /// them) into detached records, severing shared identity with the tree.
    pub fn extract(&self, predicate: impl Into<Predicate>) -> Vec<Record> {
        let set = self.filter(predicate);
        self.materialize(
            &self.roots,
            &|id| set.contains(id),
            Materialize {
                keep_ids: true,
                keep_state: true,
            },
        )
    }

    /// Deep-clone the entire model into detached records, state included.
    pub fn clone_records(&self) -> Vec<Record> {
        self.materialize(
            &self.roots,
            &|_| true,
            Materialize {
                keep_ids: true,
                keep_state: true,
            },
        )
    }

    /// Export the model as plain records with all runtime state stripped,
    /// optionally keeping ids. The result reloads into a tree in default
    /// state.
    pub fn export(&self, keep_ids: bool) -> Vec<Record> {
        self.materialize(
            &self.roots,
            &|_| true,
            Materialize {
                keep_ids,
                keep_state: false,
            },
        )
    }

    /// Copy the given nodes into detached records. With `with_hierarchy`,
    /// the copies keep the minimal ancestor chain above each node; without
    /// it, each node becomes a root of its own copied subtree.
    pub fn copy_nodes(&self, nodes: &[NodeId], with_hierarchy: bool) -> Vec<Record> {
        let opts = Materialize {
            keep_ids: true,
            keep_state: true,
        };
        if !with_hierarchy {
            let mut out = Vec::new();
            for &id in nodes {
                if self.is_alive(id) {
                    out.extend(self.materialize(&[id], &|_| true, opts));
                }
            }
            return out;
        }
        let mut members: HashSet<NodeId> = HashSet::new();
        for &id in nodes {
            if !self.is_alive(id) {
                continue;
            }
            members.insert(id);
            for ancestor in self.ancestors(id) {
                members.insert(ancestor);
            }
            for descendant in self.descendants(id) {
                members.insert(descendant);
            }
        }
        self.materialize(&self.roots, &|id| members.contains(&id), opts)
    }

    fn materialize(
        &self,
        ids: &[NodeId],
        keep: &dyn Fn(NodeId) -> bool,
        opts: Materialize,
    ) -> Vec<Record> {
        let mut out = Vec::new();
        for &id in ids {
            if !keep(id) {
                continue;
            }
            let node = self.node(id);
            let mut record = node.record.clone();
            if !opts.keep_ids {
                record.id = None;
            }
            record.state = opts
                .keep_state
                .then(|| StateOverrides::capture(node.flags))
                .filter(|s| !s.is_empty());
            record.children = self.materialize(
                node.children.as_deref().unwrap_or(&[]),
                keep,
                opts,
            );
            out.push(record);
        }
        out
    }

    // --- bulk mutation ---

    /// Re-sort a node's children (or the roots, for `None`) with the
    /// configured comparator, falling back to display-text order.
    pub fn sort(&mut self, parent: Option<NodeId>) {
        let by_text =
            |a: &Record, b: &Record| -> Ordering { a.text.cmp(&b.text) };
        match &self.config.sort {
            Some(_) => self.sort_collection(parent, None),
            None => self.sort_collection(parent, Some(&by_text)),
        }
    }

    /// Re-sort a node's children (or the roots) with an explicit comparator.
    pub fn sort_with(
        &mut self,
        parent: Option<NodeId>,
        cmp: impl Fn(&Record, &Record) -> Ordering,
    ) {
        self.sort_collection(parent, Some(&cmp));
    }

    fn sort_collection(
        &mut self,
        parent: Option<NodeId>,
        cmp: Option<&dyn Fn(&Record, &Record) -> Ordering>,
    ) {
        if let Some(p) = parent
            && (!self.is_alive(p) || self.children_unloaded(p))
        {
            return;
        }
        let mut ids: Vec<NodeId> = match parent {
            Some(p) => self.children_of(p).to_vec(),
            None => self.roots.clone(),
        };
        ids.sort_by(|&a, &b| {
            let (ra, rb) = (&self.node(a).record, &self.node(b).record);
            match (cmp, &self.config.sort) {
                (Some(f), _) => f(ra, rb),
                (None, Some(f)) => f(ra, rb),
                (None, None) => Ordering::Equal,
            }
        });
        match parent {
            Some(p) => {
                if let Some(n) = self.nodes[p.idx()].as_mut() {
                    n.children = Some(ids.clone());
                }
            }
            None => self.roots = ids.clone(),
        }
        self.with_batch(|tree| {
            for id in ids {
                tree.mark_dirty(id);
            }
        });
    }

    /// Apply a series of actions to the given nodes (and, with `deep`, their
    /// descendants) in one render batch.
    pub fn invoke(&mut self, targets: &[NodeId], actions: &[Action], deep: bool) {
        let mut all: Vec<NodeId> = targets.to_vec();
        if deep {
            for &id in targets {
                all.extend(self.descendants(id));
            }
        }
        self.with_batch(|tree| {
            for id in all {
                for &action in actions {
                    tree.apply_action(id, action);
                }
            }
        });
    }

    fn apply_action(&mut self, id: NodeId, action: Action) {
        match action {
            Action::Select => {
                self.select(id);
            }
            Action::Deselect => {
                self.deselect(id);
            }
            Action::Expand => {
                self.expand(id);
            }
            Action::Collapse => {
                self.collapse(id);
            }
            Action::Show => {
                self.show(id);
            }
            Action::Hide => {
                self.hide(id);
            }
            Action::SoftRemove => {
                self.soft_remove(id);
            }
            Action::Restore => {
                self.restore(id);
            }
            Action::Focus => {
                self.focus(id);
            }
            Action::Blur => {
                self.blur(id);
            }
        }
    }

    /// Whether every non-removed node in the tree is selected.
    pub fn all_selected(&self) -> bool {
        let available = self.available();
        !available.is_empty()
            && available
                .iter()
                .all(|&id| self.state(id, StateFlag::Selected) == Some(true))
    }

    /// Whether the node's subtree contains any selected node.
    pub fn subtree_has_selection(&self, id: NodeId) -> bool {
        self.recurse_down_from(id, |tree, n| {
            if tree.node(n).flags.contains(NodeFlags::SELECTED) {
                Walk::Stop
            } else {
                Walk::Continue
            }
        })
        .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Tree;
    use futures::executor::block_on;

    fn sample() -> Vec<Record> {
        vec![
            Record::with_id("1", "A").child(Record::with_id("2", "B")),
            Record::with_id("3", "C")
                .child(Record::with_id("4", "D"))
                .child(Record::with_id("5", "E").child(Record::with_id("6", "F"))),
        ]
    }

    fn make(records: Vec<Record>) -> Tree {
        let mut tree = Tree::new();
        block_on(tree.load(records)).unwrap();
        tree
    }

    #[test]
    fn recurse_down_visits_document_order_and_stops() {
        let tree = make(sample());
        let mut seen = Vec::new();
        tree.recurse_down(|t, id| {
            seen.push(t.text_of(id).unwrap().to_owned());
            Walk::Continue
        });
        assert_eq!(seen, vec!["A", "B", "C", "D", "E", "F"]);

        let stopped = tree.recurse_down(|t, id| {
            if t.text_of(id) == Some("D") {
                Walk::Stop
            } else {
                Walk::Continue
            }
        });
        assert_eq!(stopped, tree.by_id("4"));
    }

    #[test]
    fn descendants_exclude_the_node_itself() {
        let tree = make(sample());
        let c = tree.by_id("3").unwrap();
        let names: Vec<&str> = tree
            .descendants(c)
            .into_iter()
            .map(|id| tree.text_of(id).unwrap())
            .collect();
        assert_eq!(names, vec!["D", "E", "F"]);
    }

    #[test]
    fn flatten_accepts_flags_and_closures() {
        let mut tree = make(sample());
        let b = tree.by_id("2").unwrap();
        tree.select(b);
        assert_eq!(tree.flatten(StateFlag::Selected), vec![b]);
        assert_eq!(tree.selected(), vec![b]);

        let leaves = tree.flatten(Predicate::func(|t, id| t.children_of(id).is_empty()));
        assert_eq!(leaves.len(), 3);
    }

    #[test]
    fn filter_retains_ancestor_chains_in_document_order() {
        let tree = make(sample());
        let set = tree.filter(Predicate::func(|t, id| t.text_of(id) == Some("F")));
        let names: Vec<&str> = set.iter().map(|id| tree.text_of(id).unwrap()).collect();
        assert_eq!(names, vec!["C", "E", "F"]);
        assert!(set.contains(tree.by_id("5").unwrap()));
        assert!(!set.contains(tree.by_id("4").unwrap()));
    }

    #[test]
    fn query_family_reflects_flag_state() {
        let mut tree = make(sample());
        let a = tree.by_id("1").unwrap();
        let b = tree.by_id("2").unwrap();
        tree.expand(a);
        tree.soft_remove(b);
        tree.focus(a);
        assert_eq!(tree.expanded(), vec![a]);
        assert_eq!(tree.removed(), vec![b]);
        assert_eq!(tree.focused(), Some(a));
        assert_eq!(tree.available().len(), 5);
        assert!(tree.visible().contains(&a));
        assert!(!tree.visible().contains(&b));
    }

    #[test]
    fn export_strips_state_and_reloads_to_defaults() {
        let mut tree = make(sample());
        let b = tree.by_id("2").unwrap();
        tree.select(b);
        tree.expand(tree.by_id("1").unwrap());

        let records = tree.export(true);
        let rebuilt = make(records);
        assert_eq!(rebuilt.len(), tree.len());
        for id in rebuilt.all_ids() {
            assert_eq!(rebuilt.flags_of(id), Some(NodeFlags::default()));
        }
        // Structure and ids survive.
        let b2 = rebuilt.by_id("2").unwrap();
        assert_eq!(rebuilt.text_of(b2), Some("B"));
        assert_eq!(rebuilt.parent_of(b2), rebuilt.by_id("1"));
    }

    #[test]
    fn export_can_drop_ids() {
        let tree = make(sample());
        let records = tree.export(false);
        assert!(records.iter().all(|r| r.id.is_none()));
    }

    #[test]
    fn clone_records_keeps_state() {
        let mut tree = make(sample());
        tree.select(tree.by_id("2").unwrap());
        let records = tree.clone_records();
        let child_state = records[0].children[0].state.as_ref().unwrap();
        assert_eq!(child_state.selected, Some(true));
    }

    #[test]
    fn extract_deep_clones_matches_with_their_ancestors() {
        let tree = make(sample());
        let records = tree.extract(Predicate::func(|t, id| t.text_of(id) == Some("F")));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "C");
        assert_eq!(records[0].children.len(), 1);
        assert_eq!(records[0].children[0].text, "E");
        assert_eq!(records[0].children[0].children[0].text, "F");
    }

    #[test]
    fn copy_nodes_without_hierarchy_detaches_subtrees() {
        let tree = make(sample());
        let e = tree.by_id("5").unwrap();
        let records = tree.copy_nodes(&[e], false);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "E");
        assert_eq!(records[0].children[0].text, "F");
    }

    #[test]
    fn copy_nodes_with_hierarchy_keeps_the_ancestor_chain() {
        let tree = make(sample());
        let f = tree.by_id("6").unwrap();
        let records = tree.copy_nodes(&[f], true);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text, "C");
        // D is not part of the minimal chain to F.
        let c_children: Vec<&str> =
            records[0].children.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(c_children, vec!["E"]);
    }

    #[test]
    fn sort_reorders_a_collection_by_text() {
        let mut tree = make(vec![
            Record::with_id("c", "C"),
            Record::with_id("a", "A"),
            Record::with_id("b", "B"),
        ]);
        tree.sort(None);
        let texts: Vec<&str> = tree
            .roots()
            .iter()
            .map(|&r| tree.text_of(r).unwrap())
            .collect();
        assert_eq!(texts, vec!["A", "B", "C"]);
    }

    #[test]
    fn sort_with_uses_the_given_comparator() {
        let mut tree = make(vec![
            Record::with_id("a", "A"),
            Record::with_id("b", "B"),
        ]);
        tree.sort_with(None, |x, y| y.text.cmp(&x.text));
        let texts: Vec<&str> = tree
            .roots()
            .iter()
            .map(|&r| tree.text_of(r).unwrap())
            .collect();
        assert_eq!(texts, vec!["B", "A"]);
    }

    #[test]
    fn invoke_applies_actions_deeply_in_one_batch() {
        let mut tree = make(sample());
        let c = tree.by_id("3").unwrap();
        tree.invoke(&[c], &[Action::Expand, Action::Hide], true);
        for id in tree.descendants(c) {
            assert_eq!(tree.state(id, StateFlag::Hidden), Some(true));
            assert_eq!(tree.state(id, StateFlag::Collapsed), Some(false));
        }
        assert_eq!(tree.state(c, StateFlag::Hidden), Some(true));
    }

    #[test]
    fn subtree_selection_probe() {
        let mut tree = make(sample());
        let c = tree.by_id("3").unwrap();
        let f = tree.by_id("6").unwrap();
        assert!(!tree.subtree_has_selection(c));
        tree.select(f);
        assert!(tree.subtree_has_selection(c));
        assert!(!tree.subtree_has_selection(tree.by_id("1").unwrap()));
    }
}
