// Copyright 2026 the Coppice Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=coppice_tree --heading-base-level=0

//! Coppice Tree: the state-management core of a hierarchical list widget.
//!
//! Coppice Tree is a reusable building block for file explorers, taxonomy
//! pickers, and other interactive tree UIs.
//!
//! - Owns a forest of nodes with stable string ids and generational handles.
//! - Tracks per-node state (collapsed, focused, hidden, indeterminate,
//!   loading, removed, selectable, selected) through one shared, idempotent
//!   state-change routine that emits lifecycle events.
//! - Applies cascading selection policy: exclusive or multiple selection,
//!   deep child selection, derived indeterminate status on ancestors, and a
//!   guard against direct deselection.
//! - Loads data eagerly or lazily from plain records, closures, or futures,
//!   with superseded completions rejected by generation counters.
//! - Coalesces repaints: every logical operation reaches the attached
//!   [`Renderer`] as a single batched change set.
//!
//! Rendering, DOM-like concerns, and input handling live elsewhere; this
//! crate is the model those layers observe.
//!
//! ## Example
//!
//! ```rust
//! use coppice_tree::{Record, StateFlag, Tree, TreeConfig};
//!
//! let mut tree = Tree::with_config(TreeConfig::default().multiple(true));
//! futures::executor::block_on(tree.load(vec![
//!     Record::with_id("docs", "Documents")
//!         .child(Record::with_id("a", "notes.txt"))
//!         .child(Record::with_id("b", "todo.txt")),
//! ]))
//! .unwrap();
//!
//! let docs = tree.by_id("docs").unwrap();
//! tree.expand(docs);
//! let a = tree.by_id("a").unwrap();
//! tree.select(a);
//! assert_eq!(tree.state(docs, StateFlag::Indeterminate), Some(true));
//! assert_eq!(tree.selected(), vec![a]);
//! ```
//!
//! ## Loading
//!
//! Data arrives through [`DataSource`]: eager record vectors, synchronous
//! closures, or futures. Lazy per-node loading goes through a configured
//! child loader and [`Tree::load_children`]. Overlapping loads for the same
//! target resolve last-writer-wins: stale completions are rejected with
//! [`LoadError::Superseded`] and mutate nothing.

mod config;
mod error;
mod events;
mod query;
mod render;
mod tree;
mod types;
mod util;

pub use coppice_loader::{DataSource, LoadError, LoaderFn};

pub use config::{MatcherFn, SelectionConfig, SortFn, TreeConfig};
pub use error::TreeError;
pub use events::{EventKind, Muted, NodeVerb, Notifier, TreeEvent};
pub use query::{Action, NodeSet, Predicate, Walk};
pub use render::Renderer;
pub use tree::{
    ChildLoadOutcome, ChildLoaderFn, IndexPath, Lifecycle, LoadOutcome, PendingChildLoad,
    PendingLoad, SearchQuery, Tree,
};
pub use types::{NodeFlags, NodeId, Record, StateFlag, StateOverrides};
