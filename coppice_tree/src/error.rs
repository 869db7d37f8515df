// Copyright 2026 the Coppice Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error taxonomy for tree operations.

use coppice_loader::LoadError;

/// Errors reported by tree construction, mutation, and loading.
///
/// Load-time failures ([`TreeError::Load`]) are non-fatal: they are also
/// surfaced as `data.loaderror`/`children.loaderror` events and leave the
/// model in its last-known-good state. The structural variants
/// ([`TreeError::DuplicateId`], [`TreeError::UnknownStateFlag`]) indicate
/// caller programming errors and are detected defensively rather than
/// silently tolerated.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// A record carried an id that already exists in this tree.
    #[error("duplicate node id `{0}`")]
    DuplicateId(String),
    /// A state flag was addressed by a name the tree does not know.
    #[error("unknown state flag `{0}`")]
    UnknownStateFlag(String),
    /// The node handle is stale or belongs to another tree.
    #[error("node handle is stale or not part of this tree")]
    StaleNode,
    /// An insertion index fell outside the target collection.
    #[error("index {index} out of bounds for collection of length {len}")]
    IndexOutOfBounds {
        /// Requested index.
        index: usize,
        /// Length of the target collection.
        len: usize,
    },
    /// `load_children` was called on a tree without a configured child loader.
    #[error("no child loader configured")]
    NoChildLoader,
    /// `load_children` was called on a node whose children are already loaded.
    #[error("children already loaded for this node")]
    ChildrenAlreadyLoaded,
    /// The underlying loader failed or was superseded.
    #[error(transparent)]
    Load(#[from] LoadError),
}
