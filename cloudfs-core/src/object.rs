// SPDX-License-Identifier: AGPL-3.0-or-later
//! Paths into object stores (`gs://`, `s3://`, `azure://`)

use bytes::Bytes;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use crate::{
    address::Address,
    dirs,
    error::{CloudFsError, CloudFsResult, RenameStage},
    glob::{self, GlobStream},
    metadata::Metadata,
    operations::{GlobOptions, PathSettings},
    store::ObjectStore,
};

/// An address bound to a shared store client.
///
/// Cloning is cheap; the client and settings are reference counted, so every
/// path derived from this one talks through the same client.
#[derive(Clone)]
pub struct ObjectPath {
    address: Address,
    store: Arc<dyn ObjectStore>,
    settings: Arc<PathSettings>,
}

impl ObjectPath {
    pub fn new(address: Address, store: Arc<dyn ObjectStore>, settings: Arc<PathSettings>) -> CloudFsResult<Self> {
        if !address.scheme().is_object_store() {
            return Err(CloudFsError::Unsupported(format!(
                "{} is not an object store address",
                address
            )));
        }
        Ok(Self { address, store, settings })
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn bucket(&self) -> &str {
        self.address.bucket()
    }

    pub fn key(&self) -> &str {
        self.address.key()
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn settings(&self) -> &PathSettings {
        &self.settings
    }

    /// Both paths talk through the same client instance. Store ids are
    /// caller-chosen labels and say nothing about where the data lives.
    pub fn same_store(&self, other: &ObjectPath) -> bool {
        Arc::ptr_eq(&self.store, &other.store)
    }

    /// Name of the directory marker object
    pub fn marker(&self) -> &str {
        &self.settings.empty_marker
    }

    /// Same path with a per-request timeout handed to the store
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let settings = PathSettings::clone(&self.settings).with_timeout(timeout);
        Self {
            address: self.address.clone(),
            store: Arc::clone(&self.store),
            settings: Arc::new(settings),
        }
    }

    pub(crate) fn with_address(&self, address: Address) -> Self {
        Self {
            address,
            store: Arc::clone(&self.store),
            settings: Arc::clone(&self.settings),
        }
    }

    pub(crate) fn with_key(&self, key: &str) -> Self {
        self.with_address(self.address.with_key(key))
    }

    pub(crate) fn marker_path(&self) -> Self {
        let key = format!("{}{}", self.address.dir_prefix(), self.marker());
        self.with_key(&key)
    }

    pub fn as_dir(&self) -> Self {
        self.with_address(self.address.as_dir())
    }

    pub fn as_file(&self) -> Self {
        self.with_address(self.address.as_file())
    }

    pub fn join(&self, name: &str) -> CloudFsResult<Self> {
        Ok(self.with_address(self.address.join(name)?))
    }

    pub fn parent(&self) -> Option<Self> {
        self.address.parent().map(|a| self.with_address(a))
    }

    pub fn name(&self) -> Option<&str> {
        self.address.name()
    }

    pub fn extension(&self) -> Option<&str> {
        self.address.extension()
    }

    pub fn is_root(&self) -> bool {
        self.address.is_root()
    }

    /// Whether the bucket is reachable
    pub async fn ping(&self) -> bool {
        self.store.ping(self.bucket(), &self.settings.request).await
    }

    pub async fn exists(&self) -> CloudFsResult<bool> {
        dirs::exists(self, &self.settings.request).await
    }

    pub async fn is_dir(&self) -> CloudFsResult<bool> {
        dirs::is_dir(self, &self.settings.request).await
    }

    pub async fn is_file(&self) -> bool {
        dirs::is_file(self, &self.settings.request).await
    }

    pub async fn mkdir(&self, parents: bool, exist_ok: bool) -> CloudFsResult<()> {
        dirs::mkdir(self, parents, exist_ok, &self.settings.request).await
    }

    pub async fn rmdir(&self) -> CloudFsResult<()> {
        dirs::rmdir(self, &self.settings.request).await
    }

    pub async fn touch(&self, exist_ok: bool) -> CloudFsResult<()> {
        dirs::touch(self, exist_ok, &self.settings.request).await
    }

    pub async fn unlink(&self, missing_ok: bool) -> CloudFsResult<()> {
        dirs::unlink(self, missing_ok, &self.settings.request).await
    }

    pub fn glob(&self, pattern: &str, options: GlobOptions) -> CloudFsResult<GlobStream> {
        glob::glob(self, pattern, options)
    }

    fn file_key(&self) -> CloudFsResult<&str> {
        if self.address.is_dir_like() {
            return Err(CloudFsError::IsADirectory(self.to_string()));
        }
        Ok(self.key())
    }

    pub async fn read_bytes(&self) -> CloudFsResult<Bytes> {
        let key = self.file_key()?;
        self.store.get(self.bucket(), key, &self.settings.request).await
    }

    pub async fn read_text(&self) -> CloudFsResult<String> {
        let data = self.read_bytes().await?;
        String::from_utf8(data.to_vec()).map_err(|_| CloudFsError::Decode(self.to_string()))
    }

    /// Upload `data`, replacing any existing object; returns the byte count.
    pub async fn write_bytes(&self, data: impl Into<Bytes>) -> CloudFsResult<u64> {
        let key = self.file_key()?;
        self.store.put(self.bucket(), key, data.into(), &self.settings.request).await
    }

    pub async fn write_text(&self, text: &str) -> CloudFsResult<u64> {
        self.write_bytes(Bytes::copy_from_slice(text.as_bytes())).await
    }

    /// Object metadata. Directories report their marker, or zeroes when
    /// they only exist through their contents.
    pub async fn stat(&self) -> CloudFsResult<Metadata> {
        if !self.address.is_dir_like() {
            return self.store.stat(self.bucket(), self.key(), &self.settings.request).await;
        }
        if !self.is_dir().await? {
            return Err(CloudFsError::NotFound(self.to_string()));
        }
        let marker = self.marker_path();
        match self.store.stat(marker.bucket(), marker.key(), &self.settings.request).await {
            Ok(meta) => Ok(meta),
            Err(err) if err.is_not_found() => Ok(Metadata::default()),
            Err(err) => Err(err),
        }
    }

    /// Best-effort owner as reported by the store
    pub async fn owner(&self) -> CloudFsResult<Option<String>> {
        Ok(self.stat().await?.owner)
    }

    /// Object stores have no groups; this reports the owner.
    pub async fn group(&self) -> CloudFsResult<Option<String>> {
        let meta = self.stat().await?;
        Ok(meta.group.or(meta.owner))
    }

    /// Content fingerprint: the store's hash when it reports one, otherwise
    /// a BLAKE3 digest of the content.
    pub async fn content_hash(&self) -> CloudFsResult<String> {
        let key = self.file_key()?;
        let meta = self.store.stat(self.bucket(), key, &self.settings.request).await?;
        match meta.content_hash {
            Some(hash) => Ok(hash),
            None => self.content_digest().await,
        }
    }

    async fn content_digest(&self) -> CloudFsResult<String> {
        let data = self.read_bytes().await?;
        Ok(blake3::hash(&data).to_hex().to_string())
    }

    /// Content identity: two keys holding the same bytes are the same file.
    pub async fn samefile(&self, other: &ObjectPath) -> CloudFsResult<bool> {
        if self.same_store(other) {
            return Ok(self.content_hash().await? == other.content_hash().await?);
        }
        // Different stores may hash differently
        Ok(self.content_digest().await? == other.content_digest().await?)
    }

    /// Move to `target`, failing if it already exists.
    ///
    /// Not atomic: the object is copied and then the source deleted. A crash
    /// between the halves leaves both present; a failed delete is reported as
    /// `RenamePartialFailure` with stage `Copied`.
    pub async fn rename(&self, target: &ObjectPath) -> CloudFsResult<ObjectPath> {
        self.move_to(target, false).await
    }

    /// Like [`rename`](Self::rename) but overwrites an existing target.
    pub async fn replace(&self, target: &ObjectPath) -> CloudFsResult<ObjectPath> {
        self.move_to(target, true).await
    }

    async fn move_to(&self, target: &ObjectPath, overwrite: bool) -> CloudFsResult<ObjectPath> {
        let source_key = self.file_key()?;
        let target_key = target.file_key()?;
        let request = &self.settings.request;

        if !self.is_file().await {
            return Err(CloudFsError::NotFound(self.to_string()));
        }
        if !overwrite && target.is_file().await {
            return Err(CloudFsError::AlreadyExists(target.to_string()));
        }

        tracing::debug!("Copying {} -> {}", self, target);
        let copied = if self.same_store(target) && self.store.capabilities().server_side_copy {
            self.store
                .copy(self.bucket(), source_key, target.bucket(), target_key, request)
                .await
        } else {
            match self.read_bytes().await {
                Ok(data) => target.write_bytes(data).await,
                Err(err) => Err(err),
            }
        };
        if let Err(err) = copied {
            return Err(self.partial_failure(target, RenameStage::NotStarted, err));
        }

        let options = self.settings.delete_options(false);
        if let Err(err) = self.store.delete(self.bucket(), source_key, &options).await {
            tracing::warn!("Rename {} -> {} left both objects in place: {}", self, target, err);
            return Err(self.partial_failure(target, RenameStage::Copied, err));
        }
        Ok(target.clone())
    }

    fn partial_failure(&self, target: &ObjectPath, stage: RenameStage, cause: CloudFsError) -> CloudFsError {
        CloudFsError::RenamePartialFailure {
            source_path: self.to_string(),
            target_path: target.to_string(),
            stage,
            cause: Box::new(cause),
        }
    }
}

impl PartialEq for ObjectPath {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for ObjectPath {}

impl Hash for ObjectPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl fmt::Debug for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPath")
            .field("address", &self.address)
            .field("store", &self.store.id())
            .finish()
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dispatch::Resolver,
        memory::MemoryStore,
        operations::{DeleteOptions, ListOptions, RequestOptions},
        store::{ListStream, StoreCapabilities},
        Scheme,
    };
    use async_trait::async_trait;

    fn resolver(store: MemoryStore) -> Resolver {
        Resolver::new().with_store(Scheme::Gcs, Arc::new(store))
    }

    #[tokio::test]
    async fn test_write_then_read_bytes() {
        let resolver = resolver(MemoryStore::default());
        let file = resolver.resolve_object("gs://b/data.bin").unwrap();

        for data in [&b""[..], b"line1\nline2\n", b"nul\0inside\0", b"plain"] {
            assert_eq!(file.write_bytes(Bytes::copy_from_slice(data)).await.unwrap(), data.len() as u64);
            assert_eq!(file.read_bytes().await.unwrap(), Bytes::copy_from_slice(data));
        }

        assert_eq!(file.write_text("héllo").await.unwrap(), 6);
        assert_eq!(file.read_text().await.unwrap(), "héllo");
    }

    #[tokio::test]
    async fn test_read_errors() {
        let resolver = resolver(MemoryStore::default());
        let missing = resolver.resolve_object("gs://b/missing").unwrap();
        assert!(missing.read_bytes().await.unwrap_err().is_not_found());

        let dir = resolver.resolve_object("gs://b/dir/").unwrap();
        assert!(matches!(dir.read_bytes().await, Err(CloudFsError::IsADirectory(_))));
        assert!(matches!(dir.write_bytes(&b"x"[..]).await, Err(CloudFsError::IsADirectory(_))));

        let binary = resolver.resolve_object("gs://b/bin").unwrap();
        binary.write_bytes(vec![0xff, 0xfe]).await.unwrap();
        assert!(matches!(binary.read_text().await, Err(CloudFsError::Decode(_))));
    }

    #[tokio::test]
    async fn test_stat_file_and_dir() {
        let resolver = resolver(MemoryStore::default());
        let file = resolver.resolve_object("gs://b/d/f.txt").unwrap();
        file.write_text("abc").await.unwrap();

        let meta = file.stat().await.unwrap();
        assert_eq!(meta.size, 3);
        assert!(meta.mtime().is_some());
        assert!(meta.ctime().is_some());

        let dir = resolver.resolve_object("gs://b/d/").unwrap();
        assert_eq!(dir.stat().await.unwrap().size, 0);
        let missing = resolver.resolve_object("gs://b/nope/").unwrap();
        assert!(missing.stat().await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_samefile_compares_content() {
        let resolver = resolver(MemoryStore::default());
        let a = resolver.resolve_object("gs://b/a").unwrap();
        let b = resolver.resolve_object("gs://b/b").unwrap();
        let c = resolver.resolve_object("gs://b/c").unwrap();
        a.write_text("same").await.unwrap();
        b.write_text("same").await.unwrap();
        c.write_text("different").await.unwrap();

        assert!(a.samefile(&b).await.unwrap());
        assert!(!a.samefile(&c).await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_and_replace() {
        let store = MemoryStore::default();
        let resolver = resolver(store.clone());
        let src = resolver.resolve_object("gs://b/src").unwrap();
        let dst = resolver.resolve_object("gs://b/dst").unwrap();
        src.write_text("payload").await.unwrap();

        assert_eq!(src.rename(&dst).await.unwrap(), dst);
        assert!(!src.is_file().await);
        assert_eq!(dst.read_text().await.unwrap(), "payload");

        src.write_text("newer").await.unwrap();
        assert!(matches!(src.rename(&dst).await, Err(CloudFsError::AlreadyExists(_))));
        assert_eq!(src.replace(&dst).await.unwrap(), dst);
        assert_eq!(dst.read_text().await.unwrap(), "newer");
        assert_eq!(store.keys("b").await, vec!["dst"]);

        assert!(src.rename(&dst).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_rename_between_distinct_stores() {
        let gcs = MemoryStore::default();
        let s3 = MemoryStore::default();
        let resolver = Resolver::new()
            .with_store(Scheme::Gcs, Arc::new(gcs.clone()))
            .with_store(Scheme::S3, Arc::new(s3.clone()));
        let src = resolver.resolve_object("gs://src/a").unwrap();
        let dst = resolver.resolve_object("s3://dst/b").unwrap();
        src.write_text("moved").await.unwrap();

        assert!(!src.same_store(&dst));
        assert_eq!(src.rename(&dst).await.unwrap(), dst);
        assert_eq!(dst.read_text().await.unwrap(), "moved");
        assert!(gcs.keys("src").await.is_empty());
        assert!(gcs.keys("dst").await.is_empty());
        assert_eq!(s3.keys("dst").await, vec!["b"]);
    }

    #[tokio::test]
    async fn test_samefile_across_distinct_stores() {
        let resolver = Resolver::new()
            .with_store(Scheme::Gcs, Arc::new(MemoryStore::default()))
            .with_store(Scheme::S3, Arc::new(MemoryStore::default()));
        let a = resolver.resolve_object("gs://b/k").unwrap();
        let b = resolver.resolve_object("s3://b/k").unwrap();
        a.write_text("one").await.unwrap();

        assert!(b.read_bytes().await.unwrap_err().is_not_found());
        assert!(b.samefile(&a).await.unwrap_err().is_not_found());
        b.write_text("one").await.unwrap();
        assert!(a.samefile(&b).await.unwrap());
        b.write_text("two").await.unwrap();
        assert!(!a.samefile(&b).await.unwrap());
    }

    #[tokio::test]
    async fn test_join_shares_client() {
        let resolver = resolver(MemoryStore::default());
        let root = resolver.resolve_object("gs://b").unwrap();
        let child = root.join("dir/").unwrap().join("f.txt").unwrap();
        assert_eq!(child.to_string(), "gs://b/dir/f.txt");
        assert!(Arc::ptr_eq(root.store(), child.store()));
        assert!(matches!(root.join("a/b"), Err(CloudFsError::InvalidName(_))));
        assert_eq!(child.parent().unwrap().key(), "dir/");
    }

    #[tokio::test]
    async fn test_with_timeout_keeps_address() {
        let resolver = resolver(MemoryStore::default());
        let path = resolver.resolve_object("gs://b/k").unwrap();
        let timed = path.with_timeout(Duration::from_secs(3));
        assert_eq!(timed, path);
        assert_eq!(timed.settings().request.timeout, Some(Duration::from_secs(3)));
        assert!(path.settings().request.timeout.is_none());
    }

    /// Memory store whose deletes always fail
    struct StickyStore {
        inner: MemoryStore,
    }

    #[async_trait]
    impl ObjectStore for StickyStore {
        fn id(&self) -> &str {
            "sticky"
        }

        fn display_name(&self) -> &str {
            "Sticky"
        }

        fn capabilities(&self) -> &StoreCapabilities {
            self.inner.capabilities()
        }

        fn list(&self, bucket: &str, prefix: &str, options: &ListOptions) -> ListStream {
            self.inner.list(bucket, prefix, options)
        }

        async fn get(&self, bucket: &str, key: &str, options: &RequestOptions) -> CloudFsResult<Bytes> {
            self.inner.get(bucket, key, options).await
        }

        async fn put(&self, bucket: &str, key: &str, data: Bytes, options: &RequestOptions) -> CloudFsResult<u64> {
            self.inner.put(bucket, key, data, options).await
        }

        async fn delete(&self, _bucket: &str, _key: &str, _options: &DeleteOptions) -> CloudFsResult<()> {
            Err(CloudFsError::BackendUnavailable("delete refused".into()))
        }

        async fn stat(&self, bucket: &str, key: &str, options: &RequestOptions) -> CloudFsResult<Metadata> {
            self.inner.stat(bucket, key, options).await
        }
    }

    #[tokio::test]
    async fn test_rename_partial_failure_reports_copied() {
        let inner = MemoryStore::default();
        let resolver = Resolver::new().with_store(Scheme::S3, Arc::new(StickyStore { inner: inner.clone() }));
        let src = resolver.resolve_object("s3://b/a").unwrap();
        let dst = resolver.resolve_object("s3://b/c").unwrap();
        src.write_text("x").await.unwrap();

        match src.rename(&dst).await {
            Err(CloudFsError::RenamePartialFailure { stage, .. }) => assert_eq!(stage, RenameStage::Copied),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(inner.keys("b").await, vec!["a", "c"]);
    }
}
