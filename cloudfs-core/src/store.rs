// SPDX-License-Identifier: AGPL-3.0-or-later
//! Object store capability trait
//!
//! This is the only boundary the core depends on. Vendor SDK bindings,
//! credential discovery and retry policy live in implementations of
//! [`ObjectStore`], never in the engines.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;

use crate::{
    entry::ListingPage,
    error::{CloudFsError, CloudFsResult},
    metadata::Metadata,
    operations::{DeleteOptions, ListOptions, RequestOptions},
};

/// Lazy sequence of listing pages.
///
/// Nothing is requested until the stream is polled, and dropping it early
/// releases whatever the adapter holds for the listing.
pub type ListStream = Pin<Box<dyn Stream<Item = CloudFsResult<ListingPage>> + Send>>;

/// Object store capabilities
#[derive(Debug, Clone, Default)]
pub struct StoreCapabilities {
    /// `copy` runs server side instead of download + upload
    pub server_side_copy: bool,
    /// `stat` reports a content fingerprint
    pub content_hashing: bool,
    pub owner_metadata: bool,
}

/// Minimal storage capability set over a flat, prefix-listable key space
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn id(&self) -> &str;
    fn display_name(&self) -> &str;
    fn capabilities(&self) -> &StoreCapabilities;

    /// List keys under `prefix`, partitioned at `options.delimiter`.
    fn list(&self, bucket: &str, prefix: &str, options: &ListOptions) -> ListStream;

    /// Fails with `NotFound` if the key is absent.
    async fn get(&self, bucket: &str, key: &str, options: &RequestOptions) -> CloudFsResult<Bytes>;

    /// Overwrites unconditionally; returns the number of bytes written.
    async fn put(&self, bucket: &str, key: &str, data: Bytes, options: &RequestOptions) -> CloudFsResult<u64>;

    /// Fails with `NotFound` if the key is absent unless `options.missing_ok`.
    async fn delete(&self, bucket: &str, key: &str, options: &DeleteOptions) -> CloudFsResult<()>;

    /// Fails with `NotFound` if the key is absent.
    async fn stat(&self, bucket: &str, key: &str, options: &RequestOptions) -> CloudFsResult<Metadata>;

    /// Never fails; transport errors read as "absent".
    async fn exists(&self, bucket: &str, key: &str, options: &RequestOptions) -> bool {
        self.stat(bucket, key, options).await.is_ok()
    }

    /// Copy one object. The default downloads and re-uploads.
    async fn copy(
        &self,
        bucket: &str,
        from: &str,
        to_bucket: &str,
        to: &str,
        options: &RequestOptions,
    ) -> CloudFsResult<u64> {
        let data = self.get(bucket, from, options).await?;
        self.put(to_bucket, to, data, options).await
    }

    /// Whether the bucket is reachable
    async fn ping(&self, bucket: &str, options: &RequestOptions) -> bool {
        let list_options = ListOptions {
            delimiter: Some("/".into()),
            page_size: Some(1),
            request: options.clone(),
        };
        matches!(self.list(bucket, "", &list_options).next().await, Some(Ok(_)) | None)
    }
}

/// Turn a transport failure into the caller-visible kind used by the engines.
pub fn unavailable(store: &str, err: impl std::fmt::Display) -> CloudFsError {
    CloudFsError::BackendUnavailable(format!("{}: {}", store, err))
}
