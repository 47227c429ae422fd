// SPDX-License-Identifier: AGPL-3.0-or-later
//! URL-style addresses
//!
//! An [`Address`] is the parsed form of `<scheme>://<bucket>/<key>`. Keys are
//! forward-slash separated and never start with `/`; a trailing `/` marks a
//! directory-like address and is preserved through normalization.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CloudFsError, CloudFsResult};

/// Supported address schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scheme {
    Local,
    Gcs,
    S3,
    Azure,
}

impl Scheme {
    /// URL scheme string (`file`, `gs`, `s3`, `azure`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Local => "file",
            Scheme::Gcs => "gs",
            Scheme::S3 => "s3",
            Scheme::Azure => "azure",
        }
    }

    pub fn is_object_store(&self) -> bool {
        !matches!(self, Scheme::Local)
    }
}

impl FromStr for Scheme {
    type Err = CloudFsError;

    fn from_str(s: &str) -> CloudFsResult<Self> {
        match s {
            "file" => Ok(Scheme::Local),
            "gs" => Ok(Scheme::Gcs),
            "s3" => Ok(Scheme::S3),
            "azure" => Ok(Scheme::Azure),
            other => Err(CloudFsError::UnsupportedScheme(other.to_string())),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed scheme + bucket + key triple
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    scheme: Scheme,
    bucket: String,
    key: String,
}

impl Address {
    /// Parse and normalize a raw address string.
    pub fn parse(raw: &str) -> CloudFsResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(CloudFsError::InvalidAddress("empty address".into()));
        }

        let (scheme, rest) = raw
            .split_once("://")
            .ok_or_else(|| CloudFsError::InvalidAddress(raw.to_string()))?;
        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c)) {
            return Err(CloudFsError::InvalidAddress(raw.to_string()));
        }
        let scheme: Scheme = scheme.to_ascii_lowercase().parse()?;

        let (bucket, path) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.contains(['?', '#']) || path.contains(['?', '#']) {
            return Err(CloudFsError::InvalidAddress(raw.to_string()));
        }
        if scheme.is_object_store() && bucket.is_empty() {
            return Err(CloudFsError::MissingBucket(raw.to_string()));
        }

        Ok(Self {
            scheme,
            bucket: bucket.to_string(),
            key: normalize_key(path),
        })
    }

    /// Build an address from already-split parts. The key is normalized.
    pub fn new(scheme: Scheme, bucket: impl Into<String>, key: impl AsRef<str>) -> CloudFsResult<Self> {
        let bucket = bucket.into();
        if scheme.is_object_store() && bucket.is_empty() {
            return Err(CloudFsError::MissingBucket(format!("{}://", scheme)));
        }
        Ok(Self {
            scheme,
            bucket,
            key: normalize_key(key.as_ref()),
        })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Full key, including a trailing `/` for directory-like addresses
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Key without the directory marker slash
    pub fn trimmed_key(&self) -> &str {
        self.key.trim_end_matches('/')
    }

    /// Key as a listing prefix: empty for the root, otherwise ending in `/`
    pub fn dir_prefix(&self) -> String {
        let key = self.trimmed_key();
        if key.is_empty() {
            String::new()
        } else {
            format!("{}/", key)
        }
    }

    pub fn is_dir_like(&self) -> bool {
        self.key.is_empty() || self.key.ends_with('/')
    }

    pub fn is_root(&self) -> bool {
        self.key.is_empty()
    }

    /// Same location with a trailing `/`
    pub fn as_dir(&self) -> Self {
        Self {
            scheme: self.scheme,
            bucket: self.bucket.clone(),
            key: self.dir_prefix(),
        }
    }

    /// Same location without a trailing `/`
    pub fn as_file(&self) -> Self {
        Self {
            scheme: self.scheme,
            bucket: self.bucket.clone(),
            key: self.trimmed_key().to_string(),
        }
    }

    /// Replace the key, keeping scheme and bucket
    pub fn with_key(&self, key: impl AsRef<str>) -> Self {
        Self {
            scheme: self.scheme,
            bucket: self.bucket.clone(),
            key: normalize_key(key.as_ref()),
        }
    }

    /// Append one name below this address.
    ///
    /// The name must be a single segment; a single trailing `/` is allowed
    /// and makes the result directory-like.
    pub fn join(&self, name: &str) -> CloudFsResult<Self> {
        let segment = name.strip_suffix('/').unwrap_or(name);
        if segment.is_empty() || segment == "." || segment == ".." || segment.contains('/') {
            return Err(CloudFsError::InvalidName(name.to_string()));
        }
        let mut key = self.dir_prefix();
        key.push_str(name);
        Ok(Self {
            scheme: self.scheme,
            bucket: self.bucket.clone(),
            key,
        })
    }

    /// Parent directory (always directory-like), `None` at the root
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        let key = self.trimmed_key();
        let parent = match key.rsplit_once('/') {
            Some((parent, _)) => format!("{}/", parent),
            None => String::new(),
        };
        Some(Self {
            scheme: self.scheme,
            bucket: self.bucket.clone(),
            key: parent,
        })
    }

    /// Final path segment
    pub fn name(&self) -> Option<&str> {
        let key = self.trimmed_key();
        if key.is_empty() {
            return None;
        }
        Some(key.rsplit('/').next().unwrap_or(key))
    }

    pub fn extension(&self) -> Option<&str> {
        self.name()
            .and_then(|n| n.rsplit_once('.'))
            .filter(|(stem, _)| !stem.is_empty())
            .map(|(_, ext)| ext)
    }

    /// Native filesystem path for `file://` addresses
    pub fn local_path(&self) -> std::path::PathBuf {
        if self.bucket.is_empty() {
            std::path::PathBuf::from(format!("/{}", self.key))
        } else {
            std::path::PathBuf::from(format!("{}/{}", self.bucket, self.key))
        }
    }

    pub fn to_uri(&self) -> String {
        format!("{}://{}/{}", self.scheme, self.bucket, self.key)
    }
}

impl FromStr for Address {
    type Err = CloudFsError;

    fn from_str(s: &str) -> CloudFsResult<Self> {
        Address::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}

/// Collapse empty and `.` segments, resolve `..` lexically, keep a trailing `/`.
fn normalize_key(path: &str) -> String {
    let trailing = path.ends_with('/') || path.ends_with("/.") || path == ".";
    let mut segments: Vec<&str> = Vec::new();
    for part in path.split('/').filter(|s| !s.is_empty()) {
        match part {
            "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(part),
        }
    }
    let mut key = segments.join("/");
    if !key.is_empty() && (trailing || path.ends_with("/..") || path == "..") {
        key.push('/');
    }
    key
}
