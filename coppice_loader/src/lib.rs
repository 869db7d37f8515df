// Copyright 2026 the Coppice Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Coppice Loader: one asynchronous completion contract over three data-supply shapes.
//!
//! Tree data can arrive in three shapes:
//!
//! - a finite ordered sequence of records, already in memory;
//! - a callback-style loader: a closure that produces records (or fails) when invoked;
//! - a future that resolves to records.
//!
//! [`DataSource`] is the tagged union over those shapes. It is resolved exactly once, at
//! the loading boundary, into a single `Result<Vec<R>, LoadError>` — callers never branch
//! on the supply shape again. The consuming tree is a single logical thread of control, so
//! futures are boxed locally ([`LocalBoxFuture`]) and no `Send` bounds are imposed.
//!
//! ## Minimal example
//!
//! ```
//! use coppice_loader::{DataSource, LoadError};
//!
//! let records = futures::executor::block_on(async {
//!     // All three shapes normalize through the same call.
//!     let a: DataSource<u32> = DataSource::from(vec![1, 2, 3]);
//!     let b: DataSource<u32> = DataSource::func(|| Ok(vec![4]));
//!     let c: DataSource<u32> = DataSource::future(async { Ok(vec![5]) });
//!
//!     let mut out = a.resolve().await?;
//!     out.extend(b.resolve().await?);
//!     out.extend(c.resolve().await?);
//!     Ok::<_, LoadError>(out)
//! }).unwrap();
//!
//! assert_eq!(records, vec![1, 2, 3, 4, 5]);
//! ```
//!
//! Failures never cross this boundary as panics: a failing loader yields a
//! [`LoadError`] through the same completion channel as success.

use core::fmt;

use futures::FutureExt;
use futures::future::LocalBoxFuture;

/// Error produced while resolving a [`DataSource`] or completing a load.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// The underlying loader reported a failure.
    #[error("loader failed: {0}")]
    Loader(String),
    /// A newer load was issued for the same target before this one completed.
    ///
    /// The later call wins; the superseded completion must not mutate the model.
    #[error("load superseded by a newer request for the same target")]
    Superseded,
}

impl LoadError {
    /// Shorthand for [`LoadError::Loader`] from any displayable message.
    pub fn loader(message: impl fmt::Display) -> Self {
        Self::Loader(message.to_string())
    }
}

/// Closure shape for callback-style loaders.
pub type LoaderFn<R> = Box<dyn FnOnce() -> Result<Vec<R>, LoadError>>;

/// A supply of records in one of the three supported shapes.
///
/// Construct with [`DataSource::from`] (a record vector), [`DataSource::func`]
/// (a callback-style loader), or [`DataSource::future`] (an async loader), then
/// normalize with [`DataSource::resolve`].
pub enum DataSource<R> {
    /// Records already in memory.
    Records(Vec<R>),
    /// A synchronous callback-style loader, invoked once on resolve.
    Func(LoaderFn<R>),
    /// An asynchronous loader, awaited on resolve.
    Future(LocalBoxFuture<'static, Result<Vec<R>, LoadError>>),
}

impl<R> DataSource<R> {
    /// Wrap a callback-style loader.
    pub fn func(f: impl FnOnce() -> Result<Vec<R>, LoadError> + 'static) -> Self {
        Self::Func(Box::new(f))
    }

    /// Wrap an asynchronous loader.
    pub fn future(fut: impl Future<Output = Result<Vec<R>, LoadError>> + 'static) -> Self {
        Self::Future(fut.boxed_local())
    }

    /// Resolve this source into records, whatever its shape.
    ///
    /// Record vectors resolve immediately, callback loaders are invoked once,
    /// futures are awaited. This consumes the source: resolution happens once
    /// per supply, at the loading boundary.
    pub async fn resolve(self) -> Result<Vec<R>, LoadError> {
        match self {
            Self::Records(records) => Ok(records),
            Self::Func(f) => f(),
            Self::Future(fut) => fut.await,
        }
    }
}

impl<R> From<Vec<R>> for DataSource<R> {
    fn from(records: Vec<R>) -> Self {
        Self::Records(records)
    }
}

impl<R> fmt::Debug for DataSource<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Records(records) => f
                .debug_tuple("Records")
                .field(&format_args!("len = {}", records.len()))
                .finish(),
            Self::Func(_) => f.write_str("Func(..)"),
            Self::Future(_) => f.write_str("Future(..)"),
        }
    }
}
