// Copyright 2026 the Coppice Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Public types for the tree core: node identifiers, state flags, and the raw record boundary.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TreeError;
use crate::util::deserialize_id;

/// Identifier for a node in the tree (generational).
///
/// Handles stay cheap and copyable; a removed slot invalidates every old
/// handle to it because the generation bumps on reuse. Stale handles are
/// rejected by accessors rather than observed as another node.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct NodeId(pub(crate) u32, pub(crate) u32);

impl NodeId {
    pub(crate) const fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }
}

bitflags::bitflags! {
    /// Per-node state flags.
    ///
    /// `INDETERMINATE` is derived from descendant selection and is never set
    /// directly by callers; every other flag is driven by the verb operations
    /// on [`Tree`](crate::Tree).
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct NodeFlags: u8 {
        /// Children are not shown; the node itself stays visible.
        const COLLAPSED     = 0b0000_0001;
        /// Node currently holds focus.
        const FOCUSED       = 0b0000_0010;
        /// Node is hidden from rendering and visible-order traversal.
        const HIDDEN        = 0b0000_0100;
        /// Some but not all descendants are selected (derived).
        const INDETERMINATE = 0b0000_1000;
        /// A child load is in flight for this node.
        const LOADING       = 0b0001_0000;
        /// Soft-removed: excluded from available queries until restored.
        const REMOVED       = 0b0010_0000;
        /// Node may be selected.
        const SELECTABLE    = 0b0100_0000;
        /// Node is selected.
        const SELECTED      = 0b1000_0000;
    }
}

impl Default for NodeFlags {
    fn default() -> Self {
        Self::COLLAPSED | Self::SELECTABLE
    }
}

/// A state flag addressed by name.
///
/// This is the by-name face of [`NodeFlags`], used by predicate queries and by
/// hosts that receive flag names from configuration or scripting. Parsing an
/// unknown name is an error ([`TreeError::UnknownStateFlag`]), never a silent
/// no-op.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateFlag {
    /// [`NodeFlags::COLLAPSED`]
    Collapsed,
    /// [`NodeFlags::FOCUSED`]
    Focused,
    /// [`NodeFlags::HIDDEN`]
    Hidden,
    /// [`NodeFlags::INDETERMINATE`]
    Indeterminate,
    /// [`NodeFlags::LOADING`]
    Loading,
    /// [`NodeFlags::REMOVED`]
    Removed,
    /// [`NodeFlags::SELECTABLE`]
    Selectable,
    /// [`NodeFlags::SELECTED`]
    Selected,
}

impl StateFlag {
    /// The bit this flag addresses.
    pub const fn mask(self) -> NodeFlags {
        match self {
            Self::Collapsed => NodeFlags::COLLAPSED,
            Self::Focused => NodeFlags::FOCUSED,
            Self::Hidden => NodeFlags::HIDDEN,
            Self::Indeterminate => NodeFlags::INDETERMINATE,
            Self::Loading => NodeFlags::LOADING,
            Self::Removed => NodeFlags::REMOVED,
            Self::Selectable => NodeFlags::SELECTABLE,
            Self::Selected => NodeFlags::SELECTED,
        }
    }

    /// Lowercase name, matching the raw-record state key.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Collapsed => "collapsed",
            Self::Focused => "focused",
            Self::Hidden => "hidden",
            Self::Indeterminate => "indeterminate",
            Self::Loading => "loading",
            Self::Removed => "removed",
            Self::Selectable => "selectable",
            Self::Selected => "selected",
        }
    }
}

impl fmt::Display for StateFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StateFlag {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "collapsed" => Ok(Self::Collapsed),
            "focused" => Ok(Self::Focused),
            "hidden" => Ok(Self::Hidden),
            "indeterminate" => Ok(Self::Indeterminate),
            "loading" => Ok(Self::Loading),
            "removed" => Ok(Self::Removed),
            "selectable" => Ok(Self::Selectable),
            "selected" => Ok(Self::Selected),
            other => Err(TreeError::UnknownStateFlag(other.to_string())),
        }
    }
}

/// Partial state overrides carried on a raw record.
///
/// Unset fields fall back to the tree's default flags at parse time.
/// `indeterminate` is intentionally absent: it is derived after parsing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateOverrides {
    /// Override for [`NodeFlags::COLLAPSED`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collapsed: Option<bool>,
    /// Override for [`NodeFlags::FOCUSED`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focused: Option<bool>,
    /// Override for [`NodeFlags::HIDDEN`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
    /// Override for [`NodeFlags::REMOVED`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<bool>,
    /// Override for [`NodeFlags::SELECTABLE`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selectable: Option<bool>,
    /// Override for [`NodeFlags::SELECTED`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected: Option<bool>,
}

impl StateOverrides {
    /// Apply these overrides on top of `base`.
    pub fn apply(&self, base: NodeFlags) -> NodeFlags {
        let mut flags = base;
        let mut set = |mask: NodeFlags, value: Option<bool>| {
            if let Some(v) = value {
                flags.set(mask, v);
            }
        };
        set(NodeFlags::COLLAPSED, self.collapsed);
        set(NodeFlags::FOCUSED, self.focused);
        set(NodeFlags::HIDDEN, self.hidden);
        set(NodeFlags::REMOVED, self.removed);
        set(NodeFlags::SELECTABLE, self.selectable);
        set(NodeFlags::SELECTED, self.selected);
        flags
    }

    /// Capture the overridable portion of `flags` as explicit overrides.
    pub fn capture(flags: NodeFlags) -> Self {
        Self {
            collapsed: Some(flags.contains(NodeFlags::COLLAPSED)),
            focused: Some(flags.contains(NodeFlags::FOCUSED)),
            hidden: Some(flags.contains(NodeFlags::HIDDEN)),
            removed: Some(flags.contains(NodeFlags::REMOVED)),
            selectable: Some(flags.contains(NodeFlags::SELECTABLE)),
            selected: Some(flags.contains(NodeFlags::SELECTED)),
        }
    }

    /// Whether no field overrides anything.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Raw record shape at the input/output boundary.
///
/// This is what hosts feed into [`Tree::load`](crate::Tree::load) and what
/// export/copy operations produce. `id` may be omitted (one is generated) and
/// numeric ids are coerced to strings on deserialize. Caller-specific fields
/// round-trip through the flattened `extra` map.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Caller-supplied id; generated when absent.
    #[serde(default, deserialize_with = "deserialize_id")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Display text; the default search target.
    #[serde(default)]
    pub text: String,
    /// Child records. An absent/empty list on a tree with a child loader marks
    /// the node as a lazy-load candidate.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Record>,
    /// Partial state overrides applied over the tree defaults at parse time.
    #[serde(default, skip_serializing_if = "state_is_empty")]
    pub state: Option<StateOverrides>,
    /// Caller-specific payload fields, preserved verbatim.
    #[serde(flatten, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn state_is_empty(state: &Option<StateOverrides>) -> bool {
    state.as_ref().is_none_or(StateOverrides::is_empty)
}

impl Record {
    /// A record with display text only.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// A record with an explicit id and display text.
    pub fn with_id(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            text: text.into(),
            ..Self::default()
        }
    }

    /// Append a child record (builder style).
    pub fn child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }

    /// Set the state overrides (builder style).
    pub fn state(mut self, state: StateOverrides) -> Self {
        self.state = Some(state);
        self
    }
}
