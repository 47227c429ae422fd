// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory object store
//!
//! Keeps every bucket as a sorted key map and serves listings page by page
//! with the same prefix/delimiter roll-up an object store performs.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{
    entry::{ListingPage, ObjectSummary},
    error::{CloudFsError, CloudFsResult},
    metadata::Metadata,
    operations::{DeleteOptions, ListOptions, RequestOptions},
    store::{ListStream, ObjectStore, StoreCapabilities},
};

const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_hash: String,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
}

type Buckets = HashMap<String, BTreeMap<String, StoredObject>>;

/// Object store held entirely in process memory
#[derive(Clone)]
pub struct MemoryStore {
    id: String,
    buckets: Arc<RwLock<Buckets>>,
    page_size: usize,
    capabilities: StoreCapabilities,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl MemoryStore {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            buckets: Arc::new(RwLock::new(HashMap::new())),
            page_size: DEFAULT_PAGE_SIZE,
            capabilities: StoreCapabilities {
                server_side_copy: true,
                content_hashing: true,
                owner_metadata: false,
            },
        }
    }

    /// Cap every listing page at `page_size` entries unless the caller asks
    /// for something smaller.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// All keys in a bucket, sorted
    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn not_found(&self, bucket: &str, key: &str) -> CloudFsError {
        CloudFsError::NotFound(format!("{}://{}/{}", self.id, bucket, key))
    }
}

/// Where the next page starts
#[derive(Debug, Clone, Default)]
struct Cursor {
    start_after: Option<String>,
    /// Common prefix already reported on an earlier page
    skip_prefix: Option<String>,
}

fn list_page(
    objects: &BTreeMap<String, StoredObject>,
    prefix: &str,
    delimiter: Option<&str>,
    page_size: usize,
    cursor: &Cursor,
) -> (ListingPage, Option<Cursor>) {
    let lower = match cursor.start_after.as_deref() {
        Some(key) => Bound::Excluded(key),
        None => Bound::Included(prefix),
    };
    let mut page = ListingPage::default();
    let mut skip_prefix = cursor.skip_prefix.clone();
    let mut last_key: Option<&str> = None;

    for (key, object) in objects.range::<str, _>((lower, Bound::Unbounded)) {
        if !key.starts_with(prefix) {
            break;
        }
        if skip_prefix.as_deref().is_some_and(|p| key.starts_with(p)) {
            last_key = Some(key.as_str());
            continue;
        }
        if page.len() >= page_size {
            let next = Cursor {
                start_after: last_key.map(String::from),
                skip_prefix,
            };
            return (page, Some(next));
        }

        let rest = &key[prefix.len()..];
        let rolled_up = delimiter
            .filter(|d| !d.is_empty())
            .and_then(|d| rest.find(d).map(|pos| format!("{}{}", prefix, &rest[..pos + d.len()])));

        match rolled_up {
            Some(common) => {
                page.common_prefixes.push(common.clone());
                skip_prefix = Some(common);
            }
            None => page.items.push(ObjectSummary {
                key: key.clone(),
                size: object.data.len() as u64,
                modified: Some(object.modified),
                content_hash: Some(object.content_hash.clone()),
            }),
        }
        last_key = Some(key.as_str());
    }

    (page, None)
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        "In-memory store"
    }

    fn capabilities(&self) -> &StoreCapabilities {
        &self.capabilities
    }

    fn list(&self, bucket: &str, prefix: &str, options: &ListOptions) -> ListStream {
        let buckets = Arc::clone(&self.buckets);
        let bucket = bucket.to_string();
        let prefix = prefix.to_string();
        let delimiter = options.delimiter.clone();
        let page_size = options.page_size.map_or(self.page_size, |n| n.clamp(1, self.page_size));

        let pages = stream::unfold(Some(Cursor::default()), move |cursor| {
            let buckets = Arc::clone(&buckets);
            let bucket = bucket.clone();
            let prefix = prefix.clone();
            let delimiter = delimiter.clone();
            async move {
                let cursor = cursor?;
                let guard = buckets.read().await;
                let (page, next) = match guard.get(&bucket) {
                    Some(objects) => list_page(objects, &prefix, delimiter.as_deref(), page_size, &cursor),
                    None => (ListingPage::default(), None),
                };
                tracing::trace!(bucket = %bucket, prefix = %prefix, entries = page.len(), "memory listing page");
                Some((Ok(page), next))
            }
        });
        Box::pin(pages)
    }

    async fn get(&self, bucket: &str, key: &str, _options: &RequestOptions) -> CloudFsResult<Bytes> {
        let buckets = self.buckets.read().await;
        buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|object| object.data.clone())
            .ok_or_else(|| self.not_found(bucket, key))
    }

    async fn put(&self, bucket: &str, key: &str, data: Bytes, _options: &RequestOptions) -> CloudFsResult<u64> {
        let now = Utc::now();
        let written = data.len() as u64;
        let content_hash = blake3::hash(&data).to_hex().to_string();

        let mut buckets = self.buckets.write().await;
        let objects = buckets.entry(bucket.to_string()).or_default();
        let created = objects.get(key).map_or(now, |old| old.created);
        objects.insert(
            key.to_string(),
            StoredObject { data, content_hash, created, modified: now },
        );
        Ok(written)
    }

    async fn delete(&self, bucket: &str, key: &str, options: &DeleteOptions) -> CloudFsResult<()> {
        let mut buckets = self.buckets.write().await;
        let removed = buckets.get_mut(bucket).and_then(|objects| objects.remove(key));
        if removed.is_none() && !options.missing_ok {
            return Err(self.not_found(bucket, key));
        }
        Ok(())
    }

    async fn stat(&self, bucket: &str, key: &str, _options: &RequestOptions) -> CloudFsResult<Metadata> {
        let buckets = self.buckets.read().await;
        let object = buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .ok_or_else(|| self.not_found(bucket, key))?;
        Ok(Metadata {
            size: object.data.len() as u64,
            modified: Some(object.modified),
            created: Some(object.created),
            content_hash: Some(object.content_hash.clone()),
            ..Default::default()
        })
    }

    async fn exists(&self, bucket: &str, key: &str, _options: &RequestOptions) -> bool {
        let buckets = self.buckets.read().await;
        buckets.get(bucket).is_some_and(|objects| objects.contains_key(key))
    }

    async fn ping(&self, bucket: &str, _options: &RequestOptions) -> bool {
        self.buckets.read().await.contains_key(bucket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    async fn store_with(keys: &[&str]) -> MemoryStore {
        let store = MemoryStore::default();
        for key in keys {
            store.put("b", key, Bytes::from_static(b"x"), &RequestOptions::default()).await.unwrap();
        }
        store
    }

    async fn collect(store: &MemoryStore, prefix: &str, options: ListOptions) -> Vec<ListingPage> {
        store.list("b", prefix, &options).try_collect().await.unwrap()
    }

    fn item_keys(pages: &[ListingPage]) -> Vec<String> {
        pages.iter().flat_map(|p| p.items.iter().map(|i| i.key.clone())).collect()
    }

    fn prefixes(pages: &[ListingPage]) -> Vec<String> {
        pages.iter().flat_map(|p| p.common_prefixes.clone()).collect()
    }

    #[tokio::test]
    async fn test_delimited_listing() {
        let store = store_with(&["a/1.txt", "a/2.txt", "a/sub/x", "a/sub/y", "a/sub2/z", "b/other"]).await;
        let pages = collect(&store, "a/", ListOptions::delimited("/")).await;

        assert_eq!(item_keys(&pages), vec!["a/1.txt", "a/2.txt"]);
        assert_eq!(prefixes(&pages), vec!["a/sub/", "a/sub2/"]);
    }

    #[tokio::test]
    async fn test_undelimited_listing() {
        let store = store_with(&["a/1", "a/sub/x", "ab"]).await;
        let pages = collect(&store, "a/", ListOptions::default()).await;
        assert_eq!(item_keys(&pages), vec!["a/1", "a/sub/x"]);
        assert!(prefixes(&pages).is_empty());
    }

    #[tokio::test]
    async fn test_paging_does_not_repeat_prefixes() {
        let store = store_with(&["d/a", "d/b", "d/sub/1", "d/sub/2", "d/sub/3", "d/z"]).await;
        let options = ListOptions {
            delimiter: Some("/".into()),
            page_size: Some(2),
            ..Default::default()
        };
        let pages = collect(&store, "d/", options).await;

        assert!(pages.len() >= 2);
        assert!(pages.iter().all(|p| p.len() <= 2));
        assert_eq!(item_keys(&pages), vec!["d/a", "d/b", "d/z"]);
        assert_eq!(prefixes(&pages), vec!["d/sub/"]);
    }

    #[tokio::test]
    async fn test_missing_bucket_lists_empty() {
        let store = MemoryStore::default();
        let pages = collect(&store, "", ListOptions::delimited("/")).await;
        assert_eq!(pages, vec![ListingPage::default()]);
    }

    #[tokio::test]
    async fn test_get_put_delete_stat() {
        let store = MemoryStore::default();
        let opts = RequestOptions::default();

        assert!(store.get("b", "k", &opts).await.unwrap_err().is_not_found());
        assert_eq!(store.put("b", "k", Bytes::from_static(b"a\0\nb"), &opts).await.unwrap(), 4);
        assert_eq!(store.get("b", "k", &opts).await.unwrap(), Bytes::from_static(b"a\0\nb"));
        assert!(store.exists("b", "k", &opts).await);

        let meta = store.stat("b", "k", &opts).await.unwrap();
        assert_eq!(meta.size, 4);
        assert!(meta.content_hash.is_some());

        store.delete("b", "k", &DeleteOptions::default()).await.unwrap();
        assert!(!store.exists("b", "k", &opts).await);
        assert!(store.delete("b", "k", &DeleteOptions::default()).await.unwrap_err().is_not_found());
        store
            .delete("b", "k", &DeleteOptions { missing_ok: true, ..Default::default() })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_copy_and_ping() {
        let store = store_with(&["src"]).await;
        let opts = RequestOptions::default();
        store.copy("b", "src", "other", "dst", &opts).await.unwrap();
        assert_eq!(store.keys("other").await, vec!["dst"]);
        assert!(store.ping("b", &opts).await);
        assert!(!store.ping("nope", &opts).await);
    }
}
