// SPDX-License-Identifier: AGPL-3.0-or-later
//! Operation options and path settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default name of the zero-byte object that keeps an empty directory visible
pub const EMPTY_MARKER: &str = "__empty__";

/// Per-call options passed to every store request.
///
/// Honouring `timeout` is the store adapter's job; the engines only thread
/// it through.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOptions {
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout: Some(timeout) }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    /// Roll keys up at this delimiter; `None` lists every key under the prefix
    pub delimiter: Option<String>,
    /// Upper bound on entries (items + prefixes) per page
    pub page_size: Option<usize>,
    pub request: RequestOptions,
}

impl ListOptions {
    pub fn delimited(delimiter: impl Into<String>) -> Self {
        Self { delimiter: Some(delimiter.into()), ..Default::default() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOptions {
    /// Succeed silently when the key is absent
    pub missing_ok: bool,
    pub request: RequestOptions,
}

/// What a glob call should yield
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobOptions {
    pub return_file: bool,
    pub return_dir: bool,
    pub(crate) include_markers: bool,
}

impl Default for GlobOptions {
    fn default() -> Self {
        Self { return_file: true, return_dir: true, include_markers: false }
    }
}

impl GlobOptions {
    pub fn new(return_file: bool, return_dir: bool) -> Self {
        Self { return_file, return_dir, include_markers: false }
    }

    pub fn files_only() -> Self {
        Self::new(true, false)
    }

    pub fn dirs_only() -> Self {
        Self::new(false, true)
    }

    /// Also yield directory marker objects as files
    pub(crate) fn with_markers(mut self) -> Self {
        self.include_markers = true;
        self
    }
}

/// Settings shared by every path a resolver produces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub empty_marker: String,
    pub request: RequestOptions,
    pub list_page_size: Option<usize>,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            empty_marker: EMPTY_MARKER.to_string(),
            request: RequestOptions::default(),
            list_page_size: None,
        }
    }
}

impl PathSettings {
    pub fn with_marker(mut self, name: impl Into<String>) -> Self {
        self.empty_marker = name.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request.timeout = Some(timeout);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.list_page_size = Some(page_size);
        self
    }

    pub(crate) fn list_options(&self, delimiter: Option<&str>) -> ListOptions {
        ListOptions {
            delimiter: delimiter.map(String::from),
            page_size: self.list_page_size,
            request: self.request.clone(),
        }
    }

    pub(crate) fn delete_options(&self, missing_ok: bool) -> DeleteOptions {
        DeleteOptions { missing_ok, request: self.request.clone() }
    }
}
