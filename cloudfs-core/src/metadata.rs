// SPDX-License-Identifier: AGPL-3.0-or-later
//! File and object metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of `stat`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
    /// Backend content fingerprint (hex), e.g. an MD5 or ETag
    pub content_hash: Option<String>,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub permissions: Option<Permissions>,
}

/// Unix-style permissions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub mode: u32,
}

impl Permissions {
    pub fn new(mode: u32) -> Self {
        Self { mode }
    }

    pub fn is_readable(&self) -> bool {
        self.mode & 0o444 != 0
    }

    pub fn is_writable(&self) -> bool {
        self.mode & 0o222 != 0
    }
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }

    /// Modification time as fractional seconds since the epoch
    pub fn mtime(&self) -> Option<f64> {
        self.modified.map(timestamp)
    }

    /// Creation time as fractional seconds since the epoch
    pub fn ctime(&self) -> Option<f64> {
        self.created.map(timestamp)
    }
}

fn timestamp(t: DateTime<Utc>) -> f64 {
    t.timestamp() as f64 + f64::from(t.timestamp_subsec_nanos()) / 1e9
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamps() {
        let t = Utc.timestamp_opt(1_700_000_000, 500_000_000).unwrap();
        let meta = Metadata::new().with_size(3).with_modified(t);
        assert_eq!(meta.size, 3);
        assert_eq!(meta.mtime(), Some(1_700_000_000.5));
        assert_eq!(meta.ctime(), None);
    }

    #[test]
    fn test_permissions() {
        let perms = Permissions::new(0o644);
        assert!(perms.is_readable());
        assert!(perms.is_writable());
        assert!(!Permissions::new(0o444).is_writable());
    }
}
