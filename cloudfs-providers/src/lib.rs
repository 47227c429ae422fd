// SPDX-License-Identifier: AGPL-3.0-or-later
//! Object store adapters for cloudfs
//!
//! Each adapter implements [`cloudfs_core::ObjectStore`] over a vendor REST
//! API and is registered with a [`cloudfs_core::Resolver`] for its scheme:
//!
//! ```no_run
//! # #[cfg(all(feature = "s3", feature = "gcs"))]
//! # fn demo() -> cloudfs_core::CloudFsResult<()> {
//! use std::sync::Arc;
//! use cloudfs_core::{Resolver, Scheme};
//! use cloudfs_providers::{GcsConfig, GcsStore, S3Config, S3Store};
//!
//! let resolver = Resolver::new()
//!     .with_store(Scheme::S3, Arc::new(S3Store::new("s3", S3Config::from_env()?)))
//!     .with_store(Scheme::Gcs, Arc::new(GcsStore::new("gcs", GcsConfig::from_env())));
//! let path = resolver.resolve("s3://bucket/key")?;
//! # let _ = path;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "s3")]
pub mod s3;

#[cfg(feature = "gcs")]
pub mod gcs;

#[cfg(feature = "s3")]
pub use s3::{S3Config, S3Store};

#[cfg(feature = "gcs")]
pub use gcs::{GcsConfig, GcsStore};
