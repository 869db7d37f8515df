// Copyright 2026 the Coppice Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Lifecycle events and the per-tree notifier.
//!
//! Each [`Tree`](crate::Tree) owns one [`Notifier`]: an explicit object with
//! `emit`/`mute`/`unmute` semantics, instead of a shared global emitter whose
//! dispatch gets patched at runtime. Mute state is consulted on every emission
//! path, so suppressed events are never observed by any listener.

use core::fmt;

use hashbrown::HashSet;

use crate::types::NodeId;

/// The verb of a per-node lifecycle event (`node.<verb>` in the event surface).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeVerb {
    /// Node became selected.
    Selected,
    /// Node became deselected.
    Deselected,
    /// Node expanded.
    Expanded,
    /// Node collapsed.
    Collapsed,
    /// Node became visible (hidden flag cleared).
    Shown,
    /// Node became hidden.
    Hidden,
    /// Node received focus.
    Focused,
    /// Node lost focus.
    Blurred,
    /// Node was soft-removed.
    Removed,
    /// Node was restored from soft removal.
    Restored,
    /// Node entered the derived indeterminate state.
    Indeterminate,
}

/// Event name used for mute matching and subscriptions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Raw data arrived and parsed successfully.
    DataLoaded,
    /// A model-level load failed.
    DataLoadError,
    /// The model was (re)built and is ready to query.
    ModelLoaded,
    /// A node's lazy children finished loading.
    ChildrenLoaded,
    /// A node's lazy child load failed.
    ChildrenLoadError,
    /// The tree failed to produce a model from a load.
    TreeLoadError,
    /// A per-node state verb fired.
    Node(NodeVerb),
}

/// A lifecycle event with its payload.
#[derive(Clone, Debug, PartialEq)]
pub enum TreeEvent {
    /// Raw records were obtained and parsed; the model swap is about to happen.
    DataLoaded {
        /// Number of root records parsed.
        count: usize,
    },
    /// A model-level load failed; the previous model is untouched.
    DataLoadError {
        /// Loader failure text.
        error: String,
    },
    /// The model was replaced; these are the new roots.
    ModelLoaded {
        /// Root nodes of the new model, in display order.
        roots: Vec<NodeId>,
    },
    /// Lazy children finished loading for `parent`.
    ChildrenLoaded {
        /// The node whose children loaded.
        parent: NodeId,
        /// The freshly created children, in display order.
        children: Vec<NodeId>,
    },
    /// A lazy child load failed for `parent`; its children remain unloaded.
    ChildrenLoadError {
        /// The node whose load failed.
        parent: NodeId,
        /// Loader failure text.
        error: String,
    },
    /// The tree failed to produce a model from a load. Fired after the
    /// data-level error for any failed model load, so tree-level listeners
    /// need not distinguish the failure stage.
    TreeLoadError {
        /// Failure text.
        error: String,
    },
    /// A per-node state change.
    Node {
        /// What happened.
        verb: NodeVerb,
        /// The affected node.
        node: NodeId,
    },
}

impl TreeEvent {
    /// The name of this event, for mute matching.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::DataLoaded { .. } => EventKind::DataLoaded,
            Self::DataLoadError { .. } => EventKind::DataLoadError,
            Self::ModelLoaded { .. } => EventKind::ModelLoaded,
            Self::ChildrenLoaded { .. } => EventKind::ChildrenLoaded,
            Self::ChildrenLoadError { .. } => EventKind::ChildrenLoadError,
            Self::TreeLoadError { .. } => EventKind::TreeLoadError,
            Self::Node { verb, .. } => EventKind::Node(*verb),
        }
    }
}

/// Which emissions are currently suppressed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Muted {
    /// Nothing muted.
    #[default]
    None,
    /// Everything muted.
    All,
    /// Only the named kinds muted.
    Kinds(HashSet<EventKind>),
}

impl Muted {
    fn suppresses(&self, kind: EventKind) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Kinds(kinds) => kinds.contains(&kind),
        }
    }
}

type Listener = Box<dyn FnMut(&TreeEvent)>;

/// Per-tree event dispatcher with mute support.
#[derive(Default)]
pub struct Notifier {
    listeners: Vec<Listener>,
    muted: Muted,
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("listeners", &self.listeners.len())
            .field("muted", &self.muted)
            .finish()
    }
}

impl Notifier {
    /// Register a listener for every (non-muted) event.
    pub fn subscribe(&mut self, listener: impl FnMut(&TreeEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Emit an event unless its kind is currently muted.
    pub fn emit(&mut self, event: TreeEvent) {
        if self.muted.suppresses(event.kind()) {
            return;
        }
        log::trace!("emit {:?}", event.kind());
        for listener in &mut self.listeners {
            listener(&event);
        }
    }

    /// Suppress the given event kinds (additive with previous mutes).
    pub fn mute(&mut self, kinds: impl IntoIterator<Item = EventKind>) {
        match &mut self.muted {
            Muted::All => {}
            Muted::Kinds(set) => set.extend(kinds),
            Muted::None => {
                let set: HashSet<EventKind> = kinds.into_iter().collect();
                if !set.is_empty() {
                    self.muted = Muted::Kinds(set);
                }
            }
        }
    }

    /// Suppress every event.
    pub fn mute_all(&mut self) {
        self.muted = Muted::All;
    }

    /// Stop suppressing the given kinds; reverts to not-muted once empty.
    ///
    /// Has no effect while everything is muted: a blanket mute is only lifted
    /// by [`Notifier::unmute_all`].
    pub fn unmute(&mut self, kinds: impl IntoIterator<Item = EventKind>) {
        if let Muted::Kinds(set) = &mut self.muted {
            for kind in kinds {
                set.remove(&kind);
            }
            if set.is_empty() {
                self.muted = Muted::None;
            }
        }
    }

    /// Stop suppressing everything.
    pub fn unmute_all(&mut self) {
        self.muted = Muted::None;
    }

    /// Current mute state.
    pub fn muted(&self) -> &Muted {
        &self.muted
    }

    /// Whether an event of `kind` would currently be suppressed.
    pub fn is_muted(&self, kind: EventKind) -> bool {
        self.muted.suppresses(kind)
    }
}
