// SPDX-License-Identifier: AGPL-3.0-or-later
//! Glob engine over prefix/delimiter listings
//!
//! A pattern is split on `/` and expanded one level at a time. Each wildcard
//! segment costs one delimited listing per matched parent, bounded by the
//! literal characters in front of the segment's first wildcard. `*`, `?` and
//! `[...]` never match `/`; a segment that is exactly `**` matches zero or
//! more directory levels. A trailing `/` restricts the results to
//! directories. Results are deduplicated by key within one call.

use futures::{stream, Stream, StreamExt, TryStreamExt};
use glob::{MatchOptions, Pattern};
use std::collections::{HashSet, VecDeque};
use std::pin::Pin;

use crate::{
    dirs,
    entry::ListingPage,
    error::{CloudFsError, CloudFsResult},
    object::ObjectPath,
    operations::{GlobOptions, ListOptions, RequestOptions},
    store::ListStream,
};

/// Lazy sequence of glob hits. Dropping it stops the listing.
pub type GlobStream = Pin<Box<dyn Stream<Item = CloudFsResult<ObjectPath>> + Send>>;

/// Matched keys exactly as the store listed them
pub(crate) type KeyStream = Pin<Box<dyn Stream<Item = CloudFsResult<String>> + Send>>;

const WILDCARDS: [char; 3] = ['*', '?', '['];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Wild { pattern: Pattern, head: String },
    /// Every name at one level
    Any,
    Recursive,
}

impl Segment {
    fn parse(raw: &str, full: &str) -> CloudFsResult<Self> {
        if raw == "**" {
            return Ok(Segment::Recursive);
        }
        match raw.find(WILDCARDS) {
            None => Ok(Segment::Literal(raw.to_string())),
            Some(pos) => {
                let pattern = Pattern::new(raw).map_err(|e| CloudFsError::InvalidPattern {
                    pattern: full.to_string(),
                    reason: e.msg.to_string(),
                })?;
                Ok(Segment::Wild { pattern, head: raw[..pos].to_string() })
            }
        }
    }

    /// Literal text every match starts with
    fn head(&self) -> &str {
        match self {
            Segment::Literal(name) => name,
            Segment::Wild { head, .. } => head,
            Segment::Any | Segment::Recursive => "",
        }
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            Segment::Literal(literal) => literal == name,
            Segment::Wild { pattern, .. } => pattern.matches_with(name, MATCH_OPTIONS),
            Segment::Any | Segment::Recursive => true,
        }
    }
}

/// Compiled, bucket-absolute glob pattern
#[derive(Debug, Clone)]
pub(crate) struct GlobPattern {
    segments: Vec<Segment>,
    dirs_only: bool,
}

impl GlobPattern {
    /// Compile a pattern already expressed in bucket key space.
    pub(crate) fn compile(pattern: &str) -> CloudFsResult<Self> {
        let segments = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| Segment::parse(s, pattern))
            .collect::<CloudFsResult<Vec<_>>>()?;
        if segments.is_empty() {
            return Err(CloudFsError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "empty pattern".into(),
            });
        }
        Ok(Self { segments, dirs_only: pattern.ends_with('/') })
    }

    /// Direct children of a directory key, taken literally. The scan also
    /// reports the folder placeholder `D/` and keys below `D//`, which no
    /// wildcard can name.
    pub(crate) fn children_of(dir_key: &str) -> Self {
        let mut segments: Vec<Segment> = dir_key
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| Segment::Literal(s.to_string()))
            .collect();
        segments.push(Segment::Any);
        Self { segments, dirs_only: false }
    }

    /// Number of leading segments without wildcards
    fn literal_depth(&self) -> usize {
        self.segments
            .iter()
            .take_while(|s| matches!(s, Segment::Literal(_)))
            .count()
    }

    fn literal_key(&self, depth: usize) -> String {
        self.segments[..depth]
            .iter()
            .map(|s| s.head())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// The caller named a marker object explicitly
    fn names_marker(&self, marker: &str) -> bool {
        matches!(self.segments.last(), Some(Segment::Literal(name)) if name == marker)
    }
}

/// Resolve `pattern` against `base` into bucket key space.
///
/// Patterns starting with `/` or with the base's `scheme://bucket` are
/// absolute; anything else is taken relative to the base key.
pub(crate) fn absolute_pattern(base: &ObjectPath, pattern: &str) -> String {
    let pattern = pattern.trim();
    let address = base.address();
    let url_prefix = format!("{}://{}", address.scheme(), address.bucket());

    if let Some(rest) = pattern.strip_prefix(url_prefix.as_str()) {
        if rest.is_empty() || rest.starts_with('/') {
            return rest.trim_start_matches('/').to_string();
        }
    }
    if let Some(rest) = pattern.strip_prefix('/') {
        return rest.trim_start_matches('/').to_string();
    }
    format!("{}{}", address.dir_prefix(), pattern)
}

/// Expand `pattern` below `base`.
pub fn glob(base: &ObjectPath, pattern: &str, options: GlobOptions) -> CloudFsResult<GlobStream> {
    let absolute = absolute_pattern(base, pattern);
    let compiled = GlobPattern::compile(&absolute)?;
    tracing::debug!(base = %base, pattern = %absolute, "glob");
    let request = base.settings().request.clone();
    Ok(run(base.clone(), compiled, options, &request))
}

pub(crate) fn run(
    base: ObjectPath,
    pattern: GlobPattern,
    options: GlobOptions,
    request: &RequestOptions,
) -> GlobStream {
    let root = base.clone();
    Box::pin(keys(base, pattern, options, request).map_ok(move |key| root.with_key(&key)))
}

pub(crate) fn keys(
    base: ObjectPath,
    pattern: GlobPattern,
    options: GlobOptions,
    request: &RequestOptions,
) -> KeyStream {
    let state = GlobState::new(base, pattern, options, request);
    Box::pin(stream::unfold(state, |mut state| async move {
        let hit = state.next_hit().await?;
        Some((hit, state))
    }))
}

#[derive(Debug, Clone)]
enum Task {
    /// Wildcard-free pattern: check one key and one directory
    Probe(String),
    /// Match segment `index` against the entries directly below `prefix`
    Expand { prefix: String, index: usize },
}

struct GlobState {
    base: ObjectPath,
    pattern: GlobPattern,
    options: GlobOptions,
    show_markers: bool,
    list_options: ListOptions,
    queue: VecDeque<Task>,
    listing: Option<(ListStream, String, usize)>,
    ready: VecDeque<String>,
    seen: HashSet<String>,
    done: bool,
}

impl GlobState {
    fn new(base: ObjectPath, pattern: GlobPattern, options: GlobOptions, request: &RequestOptions) -> Self {
        let depth = pattern.literal_depth();
        let first = if depth == pattern.segments.len() {
            Task::Probe(pattern.literal_key(depth))
        } else {
            let mut prefix = pattern.literal_key(depth);
            if !prefix.is_empty() {
                prefix.push('/');
            }
            Task::Expand { prefix, index: depth }
        };
        let show_markers = options.include_markers || pattern.names_marker(base.marker());
        let list_options = ListOptions {
            request: request.clone(),
            ..base.settings().list_options(Some("/"))
        };

        Self {
            base,
            pattern,
            options,
            show_markers,
            list_options,
            queue: VecDeque::from([first]),
            listing: None,
            ready: VecDeque::new(),
            seen: HashSet::new(),
            done: false,
        }
    }

    async fn next_hit(&mut self) -> Option<CloudFsResult<String>> {
        loop {
            if let Some(hit) = self.ready.pop_front() {
                return Some(Ok(hit));
            }
            if self.done {
                return None;
            }

            if let Some((pages, prefix, index)) = self.listing.as_mut() {
                let (prefix, index) = (prefix.clone(), *index);
                let polled = pages.next().await;
                match polled {
                    Some(Ok(page)) => self.consume(&prefix, index, page),
                    Some(Err(err)) => {
                        self.done = true;
                        self.listing = None;
                        return Some(Err(listing_error(err)));
                    }
                    None => self.listing = None,
                }
                continue;
            }

            match self.queue.pop_front() {
                Some(Task::Probe(key)) => {
                    if let Err(err) = self.probe(&key).await {
                        self.done = true;
                        return Some(Err(err));
                    }
                }
                Some(Task::Expand { prefix, index }) => self.open(prefix, index),
                None => self.done = true,
            }
        }
    }

    fn open(&mut self, prefix: String, index: usize) {
        let segment = &self.pattern.segments[index];
        if matches!(segment, Segment::Recursive) && index + 1 < self.pattern.segments.len() {
            // zero levels
            self.queue.push_back(Task::Expand { prefix: prefix.clone(), index: index + 1 });
        }
        let list_prefix = format!("{}{}", prefix, segment.head());
        let address = self.base.address();
        tracing::trace!(bucket = address.bucket(), prefix = %list_prefix, "glob listing");
        let pages = self
            .base
            .store()
            .list(address.bucket(), &list_prefix, &self.list_options);
        self.listing = Some((pages, prefix, index));
    }

    fn consume(&mut self, prefix: &str, index: usize, page: ListingPage) {
        let segment = self.pattern.segments[index].clone();
        let last = index + 1 == self.pattern.segments.len();
        let any = matches!(segment, Segment::Any);

        for common in page.common_prefixes {
            let Some(name) = common
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_suffix('/'))
                .filter(|name| !name.contains('/'))
            else {
                continue;
            };
            if name.is_empty() {
                // `D//x` still occupies `D/`
                if any {
                    self.emit(common);
                }
                continue;
            }
            if !segment.matches(name) {
                continue;
            }
            if matches!(segment, Segment::Recursive) {
                self.queue.push_back(Task::Expand { prefix: common.clone(), index });
            } else if !last {
                self.queue.push_back(Task::Expand { prefix: common.clone(), index: index + 1 });
            }
            if last && self.options.return_dir {
                self.emit(common);
            }
        }

        if !last || !self.options.return_file || self.pattern.dirs_only {
            return;
        }
        for item in page.items {
            let Some(name) = item.key.strip_prefix(prefix).filter(|n| !n.contains('/')) else {
                continue;
            };
            if name.is_empty() {
                // zero-byte folder placeholder `D/`
                if any {
                    self.emit(item.key);
                }
                continue;
            }
            if !segment.matches(name) || (!self.show_markers && name == self.base.marker()) {
                continue;
            }
            self.emit(item.key);
        }
    }

    async fn probe(&mut self, key: &str) -> CloudFsResult<()> {
        let request = self.list_options.request.clone();
        let file = self.base.with_key(key);

        if self.options.return_file && !self.pattern.dirs_only {
            let is_marker = file.name() == Some(self.base.marker());
            if (!is_marker || self.show_markers) && dirs::is_file(&file, &request).await {
                self.emit(key.to_string());
            }
        }
        if self.options.return_dir {
            let dir = file.as_dir();
            if dirs::is_dir(&dir, &request).await? {
                self.emit(dir.key().to_string());
            }
        }
        Ok(())
    }

    fn emit(&mut self, key: String) {
        if self.seen.insert(key.clone()) {
            self.ready.push_back(key);
        }
    }
}

fn listing_error(err: CloudFsError) -> CloudFsError {
    match err {
        CloudFsError::BackendUnavailable(_) => err,
        other => CloudFsError::BackendUnavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dispatch::Resolver,
        error::CloudFsResult,
        memory::MemoryStore,
        metadata::Metadata,
        operations::{DeleteOptions, PathSettings},
        store::{ObjectStore, StoreCapabilities},
    };
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::TryStreamExt;
    use std::sync::Arc;

    async fn seeded(page_size: usize, keys: &[&str]) -> ObjectPath {
        let store = MemoryStore::default();
        for key in keys {
            store.put("b", key, Bytes::from_static(b"data"), &RequestOptions::default()).await.unwrap();
        }
        let resolver = Resolver::new()
            .with_store(crate::Scheme::Gcs, Arc::new(store))
            .with_settings(PathSettings::default().with_page_size(page_size));
        resolver.resolve_object("gs://b/").unwrap()
    }

    async fn keys(base: &ObjectPath, pattern: &str, options: GlobOptions) -> Vec<String> {
        let mut keys: Vec<String> = glob(base, pattern, options)
            .unwrap()
            .map_ok(|p| p.key().to_string())
            .try_collect()
            .await
            .unwrap();
        keys.sort();
        keys
    }

    #[test]
    fn test_compile_segments() {
        let pattern = GlobPattern::compile("logs/2024-*/app?.txt").unwrap();
        assert_eq!(pattern.literal_depth(), 1);
        assert_eq!(pattern.literal_key(1), "logs");
        assert!(!pattern.dirs_only);
        assert!(GlobPattern::compile("a/*/").unwrap().dirs_only);
    }

    #[test]
    fn test_children_of_is_literal() {
        let pattern = GlobPattern::compile("a*b/").unwrap();
        assert_eq!(pattern.literal_depth(), 0);
        let children = GlobPattern::children_of("a*b/");
        assert_eq!(children.literal_depth(), 1);
        assert_eq!(children.literal_key(1), "a*b");
    }

    #[test]
    fn test_compile_rejects_invalid() {
        for bad in ["a/[", "a/b**c", "", "///"] {
            assert!(
                matches!(GlobPattern::compile(bad), Err(CloudFsError::InvalidPattern { .. })),
                "{bad:?} should be invalid"
            );
        }
    }

    #[test]
    fn test_segment_matching() {
        let seg = Segment::parse("*.txt", "*.txt").unwrap();
        assert_eq!(seg.head(), "");
        assert!(seg.matches("a.txt"));
        assert!(!seg.matches("a.log"));

        let seg = Segment::parse("rep[0-9]", "rep[0-9]").unwrap();
        assert_eq!(seg.head(), "rep");
        assert!(seg.matches("rep7"));
        assert!(!seg.matches("rep"));
    }

    #[tokio::test]
    async fn test_absolute_pattern() {
        let base = seeded(10, &[]).await.join("dir/").unwrap();
        assert_eq!(absolute_pattern(&base, "*.txt"), "dir/*.txt");
        assert_eq!(absolute_pattern(&base, "/x/*"), "x/*");
        assert_eq!(absolute_pattern(&base, "gs://b/x/*"), "x/*");
        assert_eq!(absolute_pattern(&base, " gs://b//y "), "y");
        assert_eq!(absolute_pattern(&base, "gs://bb/*"), "dir/gs://bb/*");
    }

    #[tokio::test]
    async fn test_glob_counts_across_pages() {
        let mut names = Vec::new();
        for i in 0..7 {
            names.push(format!("prefix/file{i}.txt"));
        }
        for i in 0..4 {
            names.push(format!("prefix/file{i}.log"));
        }
        names.push("prefix/__empty__".into());
        names.push("prefix/nested/deep.txt".into());
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let base = seeded(3, &refs).await;

        let hits: Vec<ObjectPath> = glob(&base, "prefix/*.txt", GlobOptions::default())
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(hits.len(), 7);
        assert!(hits.iter().all(|p| !p.address().is_dir_like()));
        assert!(hits.iter().all(|p| p.name() != Some("__empty__")));
    }

    #[tokio::test]
    async fn test_glob_files_and_dirs() {
        let base = seeded(2, &["a/x.txt", "a/sub/y.txt", "a/sub2/__empty__", "b/z.txt"]).await;

        assert_eq!(
            keys(&base, "a/*", GlobOptions::default()).await,
            vec!["a/sub/", "a/sub2/", "a/x.txt"]
        );
        assert_eq!(keys(&base, "a/*", GlobOptions::files_only()).await, vec!["a/x.txt"]);
        assert_eq!(keys(&base, "a/*", GlobOptions::dirs_only()).await, vec!["a/sub/", "a/sub2/"]);
        assert_eq!(keys(&base, "a/*/", GlobOptions::default()).await, vec!["a/sub/", "a/sub2/"]);
    }

    #[tokio::test]
    async fn test_glob_multi_level() {
        let base = seeded(2, &["r/2023/a.csv", "r/2024/b.csv", "r/2024/c.txt", "r/x.csv"]).await;
        assert_eq!(
            keys(&base, "r/*/*.csv", GlobOptions::default()).await,
            vec!["r/2023/a.csv", "r/2024/b.csv"]
        );
        assert_eq!(keys(&base, "*/2024/c.txt", GlobOptions::default()).await, vec!["r/2024/c.txt"]);
    }

    #[tokio::test]
    async fn test_glob_recursive() {
        let base = seeded(2, &["t/a.rs", "t/m/b.rs", "t/m/n/c.rs", "t/m/n/d.txt"]).await;
        assert_eq!(
            keys(&base, "t/**/*.rs", GlobOptions::files_only()).await,
            vec!["t/a.rs", "t/m/b.rs", "t/m/n/c.rs"]
        );
        assert_eq!(
            keys(&base, "t/**", GlobOptions::default()).await,
            vec!["t/a.rs", "t/m/", "t/m/b.rs", "t/m/n/", "t/m/n/c.rs", "t/m/n/d.txt"]
        );
    }

    #[tokio::test]
    async fn test_glob_relative_to_base() {
        let base = seeded(10, &["d/one.txt", "d/two.txt", "one.txt"]).await;
        let dir = base.join("d/").unwrap();
        assert_eq!(keys(&dir, "one.*", GlobOptions::default()).await, vec!["d/one.txt"]);
    }

    #[tokio::test]
    async fn test_glob_marker_only_when_named() {
        let base = seeded(10, &["d/__empty__", "d/f"]).await;
        assert_eq!(keys(&base, "d/*", GlobOptions::files_only()).await, vec!["d/f"]);
        assert_eq!(keys(&base, "d/__empty__", GlobOptions::files_only()).await, vec!["d/__empty__"]);
        assert_eq!(
            keys(&base, "d/*", GlobOptions::files_only().with_markers()).await,
            vec!["d/__empty__", "d/f"]
        );
    }

    #[tokio::test]
    async fn test_children_scan_sees_placeholders() {
        let base = seeded(1, &["d/", "d//x", "d/f"]).await;
        let request = RequestOptions::default();
        let mut found: Vec<String> = super::keys(
            base.clone(),
            GlobPattern::children_of("d/"),
            GlobOptions::default().with_markers(),
            &request,
        )
        .try_collect()
        .await
        .unwrap();
        found.sort();
        assert_eq!(found, vec!["d/", "d//", "d/f"]);

        // no wildcard matches an empty name
        assert_eq!(keys(&base, "d/*", GlobOptions::default()).await, vec!["d/f"]);
    }

    #[tokio::test]
    async fn test_glob_literal_probe() {
        let base = seeded(10, &["k/file", "k/dir/__empty__"]).await;
        assert_eq!(keys(&base, "k/file", GlobOptions::default()).await, vec!["k/file"]);
        assert_eq!(keys(&base, "k/dir", GlobOptions::default()).await, vec!["k/dir/"]);
        assert!(keys(&base, "k/missing", GlobOptions::default()).await.is_empty());
    }

    #[tokio::test]
    async fn test_glob_restartable_and_early_drop() {
        let base = seeded(1, &["s/1", "s/2", "s/3"]).await;
        let mut first = glob(&base, "s/*", GlobOptions::default()).unwrap();
        assert!(first.next().await.is_some());
        drop(first);
        assert_eq!(keys(&base, "s/*", GlobOptions::default()).await.len(), 3);
    }

    #[tokio::test]
    async fn test_glob_invalid_pattern() {
        let base = seeded(10, &[]).await;
        assert!(matches!(
            glob(&base, "a/[b", GlobOptions::default()),
            Err(CloudFsError::InvalidPattern { .. })
        ));
    }

    /// Store that replays fixed pages, optionally failing after them
    struct ScriptedStore {
        pages: Vec<ListingPage>,
        fail: bool,
        capabilities: StoreCapabilities,
    }

    #[async_trait]
    impl ObjectStore for ScriptedStore {
        fn id(&self) -> &str {
            "scripted"
        }

        fn display_name(&self) -> &str {
            "Scripted"
        }

        fn capabilities(&self) -> &StoreCapabilities {
            &self.capabilities
        }

        fn list(&self, _bucket: &str, _prefix: &str, _options: &ListOptions) -> ListStream {
            let mut pages: Vec<CloudFsResult<ListingPage>> = self.pages.iter().cloned().map(Ok).collect();
            if self.fail {
                pages.push(Err(CloudFsError::ProviderApi {
                    provider: "scripted".into(),
                    message: "503".into(),
                }));
            }
            Box::pin(stream::iter(pages))
        }

        async fn get(&self, _: &str, key: &str, _: &RequestOptions) -> CloudFsResult<Bytes> {
            Err(CloudFsError::NotFound(key.into()))
        }

        async fn put(&self, _: &str, _: &str, data: Bytes, _: &RequestOptions) -> CloudFsResult<u64> {
            Ok(data.len() as u64)
        }

        async fn delete(&self, _: &str, _: &str, _: &DeleteOptions) -> CloudFsResult<()> {
            Ok(())
        }

        async fn stat(&self, _: &str, key: &str, _: &RequestOptions) -> CloudFsResult<Metadata> {
            Err(CloudFsError::NotFound(key.into()))
        }
    }

    fn scripted_base(pages: Vec<ListingPage>, fail: bool) -> ObjectPath {
        let store = ScriptedStore { pages, fail, capabilities: StoreCapabilities::default() };
        Resolver::new()
            .with_store(crate::Scheme::S3, Arc::new(store))
            .resolve_object("s3://b/")
            .unwrap()
    }

    #[tokio::test]
    async fn test_glob_dedups_overlapping_pages() {
        use crate::entry::ObjectSummary;
        let page = ListingPage::new(vec!["p/d/".into()], vec![ObjectSummary::new("p/a.txt", 1)]);
        let base = scripted_base(vec![page.clone(), page], false);
        assert_eq!(keys(&base, "p/*", GlobOptions::default()).await, vec!["p/a.txt", "p/d/"]);
    }

    #[tokio::test]
    async fn test_glob_listing_failure_is_backend_unavailable() {
        let base = scripted_base(vec![], true);
        let result: CloudFsResult<Vec<ObjectPath>> =
            glob(&base, "p/*", GlobOptions::default()).unwrap().try_collect().await;
        assert!(matches!(result, Err(CloudFsError::BackendUnavailable(_))));
    }
}
