// SPDX-License-Identifier: AGPL-3.0-or-later
//! Local filesystem paths (`file://`)
//!
//! A thin pass-through to the operating system. Directories are real, so
//! none of the marker bookkeeping of object stores applies, and `rename`
//! uses the native rename, which is atomic within one filesystem. Object
//! store renames are copy-then-delete and can be observed half done; local
//! ones cannot.

use bytes::Bytes;
use futures::{stream, Stream, TryStreamExt};
use glob::{MatchOptions, Pattern};
use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::SystemTime;
use tokio::fs;

use crate::{
    address::{Address, Scheme},
    error::{CloudFsError, CloudFsResult},
    metadata::{Metadata, Permissions},
    operations::GlobOptions,
};

/// Lazy sequence of local glob hits
pub type LocalGlobStream = Pin<Box<dyn Stream<Item = CloudFsResult<LocalPath>> + Send>>;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalPath {
    address: Address,
}

impl LocalPath {
    pub fn new(address: Address) -> CloudFsResult<Self> {
        if address.scheme() != Scheme::Local {
            return Err(CloudFsError::Unsupported(format!("{} is not a local address", address)));
        }
        Ok(Self { address })
    }

    /// Wrap a native path. Relative paths are taken from the current directory.
    pub fn from_path(path: impl AsRef<Path>) -> CloudFsResult<Self> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        let raw = absolute
            .to_str()
            .ok_or_else(|| CloudFsError::InvalidAddress(absolute.display().to_string()))?;
        Self::new(Address::new(Scheme::Local, "", raw)?)
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    /// Native path on this machine
    pub fn path(&self) -> PathBuf {
        self.address.local_path()
    }

    fn with_address(&self, address: Address) -> Self {
        Self { address }
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

    fn io_error(&self, err: std::io::Error) -> CloudFsError {
        CloudFsError::from_io(err, self)
    }

    pub async fn ping(&self) -> bool {
        fs::try_exists(self.path()).await.unwrap_or(false)
    }

    /// Directory-like addresses check `is_dir`, everything else the path itself.
    pub async fn exists(&self) -> CloudFsResult<bool> {
        if self.address.is_dir_like() {
            return self.is_dir().await;
        }
        match fs::try_exists(self.path()).await {
            Ok(found) => Ok(found),
            Err(err) => self.absent_or(err),
        }
    }

    pub async fn is_dir(&self) -> CloudFsResult<bool> {
        match fs::metadata(self.path()).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(err) => self.absent_or(err),
        }
    }

    /// A missing path, or a file where a directory was expected, reads as absent.
    fn absent_or(&self, err: std::io::Error) -> CloudFsResult<bool> {
        match self.io_error(err) {
            CloudFsError::NotFound(_) | CloudFsError::NotADirectory(_) => Ok(false),
            other => Err(other),
        }
    }

    pub async fn is_file(&self) -> bool {
        if self.address.is_dir_like() {
            return false;
        }
        fs::metadata(self.path()).await.map(|m| m.is_file()).unwrap_or(false)
    }

    pub async fn mkdir(&self, parents: bool, exist_ok: bool) -> CloudFsResult<()> {
        let path = self.path();
        tracing::debug!("Creating directory {}", path.display());
        if parents {
            if !exist_ok && self.exists().await? {
                return Err(CloudFsError::AlreadyExists(self.to_string()));
            }
            return fs::create_dir_all(&path).await.map_err(|e| self.io_error(e));
        }
        let Err(err) = fs::create_dir(&path).await else {
            return Ok(());
        };
        if err.kind() == std::io::ErrorKind::AlreadyExists && exist_ok && self.is_dir().await? {
            return Ok(());
        }
        Err(self.io_error(err))
    }

    pub async fn rmdir(&self) -> CloudFsResult<()> {
        tracing::debug!("Removing directory {}", self.path().display());
        fs::remove_dir(self.path()).await.map_err(|e| self.io_error(e))
    }

    /// Create the file, or bump its modification time when `exist_ok`.
    pub async fn touch(&self, exist_ok: bool) -> CloudFsResult<()> {
        let mut options = fs::OpenOptions::new();
        if exist_ok {
            options.create(true).append(true);
        } else {
            options.create_new(true).write(true);
        }
        let file = options.open(self.path()).await.map_err(|e| self.io_error(e))?;
        let file = file.into_std().await;
        file.set_modified(SystemTime::now()).map_err(|e| self.io_error(e))
    }

    pub async fn unlink(&self, missing_ok: bool) -> CloudFsResult<()> {
        if self.is_dir().await? {
            return Err(CloudFsError::IsADirectory(self.to_string()));
        }
        tracing::debug!("Deleting {}", self.path().display());
        match fs::remove_file(self.path()).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound && missing_ok => Ok(()),
            Err(err) => Err(self.io_error(err)),
        }
    }

    pub async fn read_bytes(&self) -> CloudFsResult<Bytes> {
        let data = fs::read(self.path()).await.map_err(|e| self.io_error(e))?;
        Ok(Bytes::from(data))
    }

    pub async fn read_text(&self) -> CloudFsResult<String> {
        let data = self.read_bytes().await?;
        String::from_utf8(data.to_vec()).map_err(|_| CloudFsError::Decode(self.to_string()))
    }

    pub async fn write_bytes(&self, data: impl Into<Bytes>) -> CloudFsResult<u64> {
        let data = data.into();
        fs::write(self.path(), &data).await.map_err(|e| self.io_error(e))?;
        Ok(data.len() as u64)
    }

    pub async fn write_text(&self, text: &str) -> CloudFsResult<u64> {
        self.write_bytes(Bytes::copy_from_slice(text.as_bytes())).await
    }

    pub async fn stat(&self) -> CloudFsResult<Metadata> {
        let meta = fs::metadata(self.path()).await.map_err(|e| self.io_error(e))?;

        let mut metadata = Metadata::new().with_size(meta.len());
        if let Ok(modified) = meta.modified() {
            metadata.modified = Some(modified.into());
        }
        if let Ok(created) = meta.created() {
            metadata.created = Some(created.into());
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            metadata.permissions = Some(Permissions::new(meta.mode()));
            metadata.owner = Some(meta.uid().to_string());
            metadata.group = Some(meta.gid().to_string());
        }
        #[cfg(not(unix))]
        {
            let mode = if meta.permissions().readonly() { 0o444 } else { 0o666 };
            metadata.permissions = Some(Permissions::new(mode));
        }

        Ok(metadata)
    }

    /// Numeric owner id where the platform has one
    pub async fn owner(&self) -> CloudFsResult<Option<String>> {
        Ok(self.stat().await?.owner)
    }

    pub async fn group(&self) -> CloudFsResult<Option<String>> {
        Ok(self.stat().await?.group)
    }

    /// BLAKE3 digest of the file content
    pub async fn content_hash(&self) -> CloudFsResult<String> {
        let data = self.read_bytes().await?;
        Ok(blake3::hash(&data).to_hex().to_string())
    }

    /// Same filesystem entity (device + inode on unix)
    pub async fn samefile(&self, other: &LocalPath) -> CloudFsResult<bool> {
        let ours = fs::metadata(self.path()).await.map_err(|e| self.io_error(e))?;
        let theirs = fs::metadata(other.path()).await.map_err(|e| other.io_error(e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            Ok(ours.dev() == theirs.dev() && ours.ino() == theirs.ino())
        }
        #[cfg(not(unix))]
        {
            let _ = (ours, theirs);
            let a = fs::canonicalize(self.path()).await.map_err(|e| self.io_error(e))?;
            let b = fs::canonicalize(other.path()).await.map_err(|e| other.io_error(e))?;
            Ok(a == b)
        }
    }

    /// Native rename; fails if `target` exists.
    pub async fn rename(&self, target: &LocalPath) -> CloudFsResult<LocalPath> {
        if target.exists().await? {
            return Err(CloudFsError::AlreadyExists(target.to_string()));
        }
        self.replace(target).await
    }

    /// Native rename, overwriting `target`.
    pub async fn replace(&self, target: &LocalPath) -> CloudFsResult<LocalPath> {
        tracing::debug!("Renaming {} -> {}", self, target);
        fs::rename(self.path(), target.path())
            .await
            .map_err(|e| self.io_error(e))?;
        Ok(target.clone())
    }

    /// Expand `pattern` relative to this path. Absolute patterns (`/...` or
    /// `file://...`) ignore the base.
    pub fn glob(&self, pattern: &str, options: GlobOptions) -> CloudFsResult<LocalGlobStream> {
        let pattern = pattern.trim();
        let dirs_only = pattern.ends_with('/');
        let full = self.absolute_pattern(pattern.trim_end_matches('/'))?;
        Pattern::new(&full).map_err(|e| CloudFsError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.msg.to_string(),
        })?;

        let return_file = options.return_file && !dirs_only;
        let return_dir = options.return_dir;
        let hits = stream::once(async move {
            tokio::task::spawn_blocking(move || expand(&full, return_file, return_dir))
                .await
                .map_err(|e| CloudFsError::Io(std::io::Error::other(e)))?
        });
        Ok(Box::pin(
            hits.map_ok(|found| stream::iter(found.into_iter().map(Ok)))
                .try_flatten(),
        ))
    }

    fn absolute_pattern(&self, pattern: &str) -> CloudFsResult<String> {
        if pattern.starts_with("file://") {
            let address = Address::parse(pattern)?;
            return Ok(address.local_path().display().to_string());
        }
        if pattern.starts_with('/') {
            return Ok(pattern.to_string());
        }
        let base = self.path().display().to_string();
        Ok(format!("{}/{}", Pattern::escape(base.trim_end_matches('/')), pattern))
    }
}

fn expand(pattern: &str, return_file: bool, return_dir: bool) -> CloudFsResult<Vec<LocalPath>> {
    let paths = glob::glob_with(pattern, MATCH_OPTIONS).map_err(|e| CloudFsError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.msg.to_string(),
    })?;

    let mut found = Vec::new();
    for entry in paths {
        let path = entry.map_err(|e| CloudFsError::Io(e.into()))?;
        let is_dir = path.is_dir();
        if (is_dir && return_dir) || (!is_dir && return_file) {
            let hit = LocalPath::from_path(&path)?;
            found.push(if is_dir { hit.as_dir() } else { hit });
        }
    }
    Ok(found)
}

impl fmt::Display for LocalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}
