// SPDX-License-Identifier: AGPL-3.0-or-later
//! cloudfs core
//!
//! One path type over local files and object stores, addressed by URL
//! (`file://`, `gs://`, `s3://`, `azure://`). Object stores only offer a
//! flat, prefix-listable key space; directories, `is_dir`, `rmdir` and glob
//! are emulated on top of it with zero-byte marker objects and
//! prefix/delimiter listings.
//!
//! ```no_run
//! use std::sync::Arc;
//! use cloudfs_core::{MemoryStore, Resolver, Scheme};
//!
//! # async fn demo() -> cloudfs_core::CloudFsResult<()> {
//! let resolver = Resolver::new().with_store(Scheme::Gcs, Arc::new(MemoryStore::default()));
//! let dir = resolver.resolve("gs://bucket/reports/")?;
//! dir.mkdir(false, true).await?;
//! dir.join("q3.csv")?.write_text("a,b\n").await?;
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod dirs;
pub mod dispatch;
pub mod entry;
pub mod error;
pub mod glob;
pub mod local;
pub mod memory;
pub mod metadata;
pub mod object;
pub mod operations;
pub mod path;
pub mod store;

pub use address::{Address, Scheme};
pub use dispatch::Resolver;
pub use entry::{ListingPage, ObjectSummary};
pub use error::{CloudFsError, CloudFsResult, RenameStage};
pub use glob::GlobStream;
pub use local::LocalPath;
pub use memory::MemoryStore;
pub use metadata::{Metadata, Permissions};
pub use object::ObjectPath;
pub use operations::{DeleteOptions, GlobOptions, ListOptions, PathSettings, RequestOptions, EMPTY_MARKER};
pub use path::{CloudPath, PathStream};
pub use store::{ListStream, ObjectStore, StoreCapabilities};
