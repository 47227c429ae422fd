// SPDX-License-Identifier: AGPL-3.0-or-later
//! Listing pages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One object returned by a listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub content_hash: Option<String>,
}

impl ObjectSummary {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self { key: key.into(), size, ..Default::default() }
    }
}

/// One response unit of a prefix/delimiter listing.
///
/// `common_prefixes` are the keys that were rolled up at the delimiter
/// (each ends with the delimiter); `items` are the objects directly under the
/// prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingPage {
    pub common_prefixes: Vec<String>,
    pub items: Vec<ObjectSummary>,
}

impl ListingPage {
    pub fn new(common_prefixes: Vec<String>, items: Vec<ObjectSummary>) -> Self {
        Self { common_prefixes, items }
    }

    pub fn is_empty(&self) -> bool {
        self.common_prefixes.is_empty() && self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.common_prefixes.len() + self.items.len()
    }
}
