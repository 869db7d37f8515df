// Copyright 2026 the Coppice Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree construction-time policy.
//!
//! A [`TreeConfig`] is consumed read-only after construction, with one
//! exception: the direct-deselection guard can be toggled at runtime via
//! [`Tree::set_prevent_direct_deselection`](crate::Tree::set_prevent_direct_deselection).

use core::cmp::Ordering;
use core::fmt;

use crate::events::NodeVerb;
use crate::types::{NodeFlags, Record};

/// Comparator used to order sibling records.
pub type SortFn = Box<dyn Fn(&Record, &Record) -> Ordering>;

/// Custom string-query matcher for [`Tree::search`](crate::Tree::search).
pub type MatcherFn = Box<dyn Fn(&str, &Record) -> bool>;

/// Selection policy.
#[derive(Clone, Copy, Debug)]
pub struct SelectionConfig {
    /// Allow more than one selected node at a time. When `false`, selecting a
    /// node first cascade-deselects every other selected node.
    pub multiple: bool,
    /// Selecting a node deep-selects its descendants, and ancestor
    /// selected/indeterminate status is kept in sync (checkbox-tree behavior).
    pub auto_select_children: bool,
    /// After a model load with nothing selected, auto-select the first
    /// available root.
    pub require: bool,
    /// Refuse direct deselection; cascading deselection still works.
    /// Runtime-togglable.
    pub prevent_direct_deselection: bool,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            multiple: false,
            auto_select_children: false,
            require: false,
            prevent_direct_deselection: false,
        }
    }
}

/// Construction-time tree policy.
pub struct TreeConfig {
    /// Selection policy.
    pub selection: SelectionConfig,
    /// Default flags given to freshly parsed nodes, before per-record
    /// overrides.
    pub default_flags: NodeFlags,
    /// `restore` resets all flags back to `default_flags` instead of only
    /// clearing the removed flag.
    pub reset_state_on_restore: bool,
    /// Sibling comparator. When set, insertion indices are advisory: sorted
    /// position wins.
    pub sort: Option<SortFn>,
    /// Custom string-query matcher for search; defaults to case-insensitive
    /// substring on display text.
    pub matcher: Option<MatcherFn>,
    /// Node verbs whose pre-set flags re-fire their lifecycle event after a
    /// completed load, so late listeners still observe e.g. "already selected
    /// on load".
    pub load_events: Vec<NodeVerb>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            selection: SelectionConfig::default(),
            default_flags: NodeFlags::default(),
            reset_state_on_restore: true,
            sort: None,
            matcher: None,
            load_events: vec![NodeVerb::Selected],
        }
    }
}

impl fmt::Debug for TreeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeConfig")
            .field("selection", &self.selection)
            .field("default_flags", &self.default_flags)
            .field("reset_state_on_restore", &self.reset_state_on_restore)
            .field("sort", &self.sort.is_some())
            .field("matcher", &self.matcher.is_some())
            .field("load_events", &self.load_events)
            .finish()
    }
}

impl TreeConfig {
    /// Allow multiple simultaneous selections.
    pub fn multiple(mut self, multiple: bool) -> Self {
        self.selection.multiple = multiple;
        self
    }

    /// Enable checkbox-tree cascading selection.
    pub fn auto_select_children(mut self, auto: bool) -> Self {
        self.selection.auto_select_children = auto;
        self
    }

    /// Require a selection after every model load.
    pub fn require_selection(mut self, require: bool) -> Self {
        self.selection.require = require;
        self
    }

    /// Refuse direct deselection.
    pub fn prevent_direct_deselection(mut self, prevent: bool) -> Self {
        self.selection.prevent_direct_deselection = prevent;
        self
    }

    /// Default flags for freshly parsed nodes.
    pub fn default_flags(mut self, flags: NodeFlags) -> Self {
        self.default_flags = flags;
        self
    }

    /// Whether `restore` resets every flag to the defaults.
    pub fn reset_state_on_restore(mut self, reset: bool) -> Self {
        self.reset_state_on_restore = reset;
        self
    }

    /// Order siblings with this comparator.
    pub fn sort(mut self, cmp: impl Fn(&Record, &Record) -> Ordering + 'static) -> Self {
        self.sort = Some(Box::new(cmp));
        self
    }

    /// Order siblings by display text.
    pub fn sort_by_text(self) -> Self {
        self.sort(|a, b| a.text.cmp(&b.text))
    }

    /// Custom matcher for string search queries.
    pub fn matcher(mut self, matcher: impl Fn(&str, &Record) -> bool + 'static) -> Self {
        self.matcher = Some(Box::new(matcher));
        self
    }

    /// Verbs re-fired for pre-set flags after a completed load.
    pub fn load_events(mut self, verbs: impl IntoIterator<Item = NodeVerb>) -> Self {
        self.load_events = verbs.into_iter().collect();
        self
    }
}
