// Copyright 2026 the Coppice Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Renderer contract consumed by the tree core.
//!
//! The core never paints. It batches mutations and hands the external renderer
//! a deduplicated list of changed nodes, in first-mutation order: exactly one
//! [`Renderer::apply_changes`] call per logical operation, however many nodes
//! that operation touched. A tree without an attached renderer is fully
//! functional (headless/model-only usage); every notification is a no-op.
//!
//! Batching itself lives on [`Tree`](crate::Tree): [`Tree::batch`](crate::Tree::batch)
//! opens a coalescing window, [`Tree::end`](crate::Tree::end) closes it and
//! flushes once. Outside a window, each mutating operation flushes itself.

use crate::types::NodeId;

/// External paint surface driven by the tree core.
pub trait Renderer {
    /// Apply one batch of changes. `changed` is deduplicated, in
    /// first-mutation order; the per-node dirty markers were cleared just
    /// before this call.
    fn apply_changes(&mut self, changed: &[NodeId]);

    /// Bring the selected node into view, if the surface supports scrolling.
    fn scroll_selected_into_view(&mut self) {}
}
