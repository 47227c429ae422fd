// SPDX-License-Identifier: AGPL-3.0-or-later
//! Backend-independent path

use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use std::fmt;
use std::pin::Pin;

use crate::{
    address::{Address, Scheme},
    error::{CloudFsError, CloudFsResult},
    local::LocalPath,
    metadata::Metadata,
    object::ObjectPath,
    operations::GlobOptions,
};

/// Lazy sequence of glob hits
pub type PathStream = Pin<Box<dyn Stream<Item = CloudFsResult<CloudPath>> + Send>>;

/// A path on any supported backend.
///
/// Two paths compare equal only when they are the same variant with the same
/// address; a `gs://` path never equals an `s3://` one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CloudPath {
    Local(LocalPath),
    Gcs(ObjectPath),
    S3(ObjectPath),
    Azure(ObjectPath),
}

macro_rules! forward {
    ($self:ident, $path:ident => $body:expr) => {
        match $self {
            CloudPath::Local($path) => $body,
            CloudPath::Gcs($path) | CloudPath::S3($path) | CloudPath::Azure($path) => $body,
        }
    };
}

macro_rules! rewrap {
    ($self:ident, $path:ident => $body:expr) => {
        match $self {
            CloudPath::Local($path) => CloudPath::Local($body),
            CloudPath::Gcs($path) => CloudPath::Gcs($body),
            CloudPath::S3($path) => CloudPath::S3($body),
            CloudPath::Azure($path) => CloudPath::Azure($body),
        }
    };
}

impl From<ObjectPath> for CloudPath {
    fn from(path: ObjectPath) -> Self {
        match path.address().scheme() {
            Scheme::S3 => CloudPath::S3(path),
            Scheme::Azure => CloudPath::Azure(path),
            // ObjectPath never holds a local address
            Scheme::Gcs | Scheme::Local => CloudPath::Gcs(path),
        }
    }
}

impl From<LocalPath> for CloudPath {
    fn from(path: LocalPath) -> Self {
        CloudPath::Local(path)
    }
}

impl CloudPath {
    pub fn address(&self) -> &Address {
        forward!(self, p => p.address())
    }

    pub fn scheme(&self) -> Scheme {
        self.address().scheme()
    }

    pub fn as_object(&self) -> Option<&ObjectPath> {
        match self {
            CloudPath::Local(_) => None,
            CloudPath::Gcs(p) | CloudPath::S3(p) | CloudPath::Azure(p) => Some(p),
        }
    }

    pub fn as_local(&self) -> Option<&LocalPath> {
        match self {
            CloudPath::Local(p) => Some(p),
            _ => None,
        }
    }

    pub fn join(&self, name: &str) -> CloudFsResult<Self> {
        Ok(rewrap!(self, p => p.join(name)?))
    }

    pub fn parent(&self) -> Option<Self> {
        Some(rewrap!(self, p => p.parent()?))
    }

    pub fn as_dir(&self) -> Self {
        rewrap!(self, p => p.as_dir())
    }

    pub fn as_file(&self) -> Self {
        rewrap!(self, p => p.as_file())
    }

    pub fn name(&self) -> Option<&str> {
        self.address().name()
    }

    pub fn extension(&self) -> Option<&str> {
        self.address().extension()
    }

    pub fn is_root(&self) -> bool {
        self.address().is_root()
    }

    pub async fn ping(&self) -> bool {
        forward!(self, p => p.ping().await)
    }

    pub async fn exists(&self) -> CloudFsResult<bool> {
        forward!(self, p => p.exists().await)
    }

    pub async fn is_dir(&self) -> CloudFsResult<bool> {
        forward!(self, p => p.is_dir().await)
    }

    pub async fn is_file(&self) -> bool {
        forward!(self, p => p.is_file().await)
    }

    pub async fn mkdir(&self, parents: bool, exist_ok: bool) -> CloudFsResult<()> {
        forward!(self, p => p.mkdir(parents, exist_ok).await)
    }

    pub async fn rmdir(&self) -> CloudFsResult<()> {
        forward!(self, p => p.rmdir().await)
    }

    pub async fn touch(&self, exist_ok: bool) -> CloudFsResult<()> {
        forward!(self, p => p.touch(exist_ok).await)
    }

    pub async fn unlink(&self, missing_ok: bool) -> CloudFsResult<()> {
        forward!(self, p => p.unlink(missing_ok).await)
    }

    pub async fn read_bytes(&self) -> CloudFsResult<Bytes> {
        forward!(self, p => p.read_bytes().await)
    }

    pub async fn read_text(&self) -> CloudFsResult<String> {
        forward!(self, p => p.read_text().await)
    }

    pub async fn write_bytes(&self, data: impl Into<Bytes>) -> CloudFsResult<u64> {
        let data: Bytes = data.into();
        forward!(self, p => p.write_bytes(data).await)
    }

    pub async fn write_text(&self, text: &str) -> CloudFsResult<u64> {
        forward!(self, p => p.write_text(text).await)
    }

    pub async fn stat(&self) -> CloudFsResult<Metadata> {
        forward!(self, p => p.stat().await)
    }

    pub async fn owner(&self) -> CloudFsResult<Option<String>> {
        forward!(self, p => p.owner().await)
    }

    pub async fn group(&self) -> CloudFsResult<Option<String>> {
        forward!(self, p => p.group().await)
    }

    pub async fn content_hash(&self) -> CloudFsResult<String> {
        forward!(self, p => p.content_hash().await)
    }

    /// Same file on the same kind of backend. Paths on different backends
    /// are never the same file.
    pub async fn samefile(&self, other: &CloudPath) -> CloudFsResult<bool> {
        match (self, other) {
            (CloudPath::Local(a), CloudPath::Local(b)) => a.samefile(b).await,
            (CloudPath::Gcs(a), CloudPath::Gcs(b))
            | (CloudPath::S3(a), CloudPath::S3(b))
            | (CloudPath::Azure(a), CloudPath::Azure(b)) => a.samefile(b).await,
            _ => Ok(false),
        }
    }

    /// Move to `target`, failing if it exists. See [`ObjectPath::rename`]
    /// for the non-atomic object-store behavior.
    pub async fn rename(&self, target: &CloudPath) -> CloudFsResult<CloudPath> {
        self.move_to(target, false).await
    }

    pub async fn replace(&self, target: &CloudPath) -> CloudFsResult<CloudPath> {
        self.move_to(target, true).await
    }

    async fn move_to(&self, target: &CloudPath, overwrite: bool) -> CloudFsResult<CloudPath> {
        match (self, target) {
            (CloudPath::Local(a), CloudPath::Local(b)) => {
                let moved = if overwrite { a.replace(b).await? } else { a.rename(b).await? };
                Ok(CloudPath::Local(moved))
            }
            (CloudPath::Local(_), _) | (_, CloudPath::Local(_)) => Err(CloudFsError::Unsupported(format!(
                "rename between {} and {}",
                self.scheme(),
                target.scheme()
            ))),
            _ => {
                let (Some(a), Some(b)) = (self.as_object(), target.as_object()) else {
                    return Err(CloudFsError::Unsupported(format!("rename {} -> {}", self, target)));
                };
                let moved = if overwrite { a.replace(b).await? } else { a.rename(b).await? };
                Ok(CloudPath::from(moved))
            }
        }
    }

    pub fn glob(&self, pattern: &str, options: GlobOptions) -> CloudFsResult<PathStream> {
        match self {
            CloudPath::Local(p) => Ok(Box::pin(p.glob(pattern, options)?.map_ok(CloudPath::Local))),
            CloudPath::Gcs(p) | CloudPath::S3(p) | CloudPath::Azure(p) => {
                Ok(Box::pin(p.glob(pattern, options)?.map_ok(CloudPath::from)))
            }
        }
    }
}

impl fmt::Display for CloudPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        forward!(self, p => fmt::Display::fmt(p, f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dispatch::Resolver, memory::MemoryStore};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn resolver() -> Resolver {
        let shared = Arc::new(MemoryStore::new("shared"));
        Resolver::new()
            .with_store(Scheme::Gcs, shared.clone())
            .with_store(Scheme::S3, shared)
            .with_store(Scheme::Azure, Arc::new(MemoryStore::new("azure")))
    }

    #[test]
    fn test_cross_backend_equality() {
        let resolver = resolver();
        let gcs = resolver.resolve("gs://b/k").unwrap();
        let s3 = resolver.resolve("s3://b/k").unwrap();
        assert_ne!(gcs, s3);
        assert_eq!(gcs, resolver.resolve("gs://b//k").unwrap());
        assert_eq!(gcs.to_string(), "gs://b/k");
    }

    #[tokio::test]
    async fn test_cross_backend_samefile_is_false() {
        let resolver = resolver();
        let gcs = resolver.resolve("gs://b/k").unwrap();
        let s3 = resolver.resolve("s3://b/k").unwrap();
        gcs.write_text("same").await.unwrap();
        s3.write_text("same").await.unwrap();
        assert!(!gcs.samefile(&s3).await.unwrap());
        assert!(gcs.samefile(&gcs).await.unwrap());
    }

    #[tokio::test]
    async fn test_forwarding_object_ops() {
        let resolver = resolver();
        let dir = resolver.resolve("azure://c/docs/").unwrap();
        dir.mkdir(false, false).await.unwrap();
        let file = dir.join("a.md").unwrap();
        file.write_text("# hi").await.unwrap();

        assert!(dir.is_dir().await.unwrap());
        assert!(file.is_file().await);
        assert_eq!(file.parent().unwrap(), dir);
        assert!(matches!(file, CloudPath::Azure(_)));

        let hits: Vec<CloudPath> = dir.glob("*.md", GlobOptions::default()).unwrap().try_collect().await.unwrap();
        assert_eq!(hits, vec![file.clone()]);

        let moved = file.rename(&dir.join("b.md").unwrap()).await.unwrap();
        assert_eq!(moved.read_text().await.unwrap(), "# hi");
        assert!(!file.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_across_object_stores() {
        let resolver = resolver();
        let src = resolver.resolve("gs://b/src").unwrap();
        let dst = resolver.resolve("azure://c/dst").unwrap();
        src.write_text("moving").await.unwrap();

        let moved = src.rename(&dst).await.unwrap();
        assert!(matches!(moved, CloudPath::Azure(_)));
        assert_eq!(dst.read_text().await.unwrap(), "moving");
        assert!(!src.is_file().await);
    }

    #[tokio::test]
    async fn test_local_forwarding() {
        let dir = TempDir::new().unwrap();
        let root = CloudPath::from(LocalPath::from_path(dir.path()).unwrap().as_dir());
        let file = root.join("f.txt").unwrap();
        assert_eq!(file.write_bytes(&b"abc"[..]).await.unwrap(), 3);
        assert_eq!(file.stat().await.unwrap().size, 3);

        let remote = resolver().resolve("gs://b/f.txt").unwrap();
        assert!(matches!(file.rename(&remote).await, Err(CloudFsError::Unsupported(_))));
        assert!(!file.samefile(&remote).await.unwrap());
    }
}
