// SPDX-License-Identifier: AGPL-3.0-or-later
//! Google Cloud Storage over the JSON API
//!
//! Authenticates with a ready-made OAuth bearer token; obtaining and
//! refreshing it is left to the caller. Point `endpoint` at a local
//! emulator (fake-gcs-server) to run without credentials.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use cloudfs_core::{
    store::unavailable, CloudFsError, CloudFsResult, DeleteOptions, ListOptions, ListStream, ListingPage,
    Metadata, ObjectStore, ObjectSummary, RequestOptions, StoreCapabilities,
};
use futures::stream;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;

const GCS_ENDPOINT: &str = "https://storage.googleapis.com";

#[derive(Debug, Clone)]
pub struct GcsConfig {
    pub endpoint: String,
    pub access_token: Option<String>,
}

impl Default for GcsConfig {
    fn default() -> Self {
        Self { endpoint: GCS_ENDPOINT.to_string(), access_token: None }
    }
}

impl GcsConfig {
    pub fn with_token(access_token: impl Into<String>) -> Self {
        Self { access_token: Some(access_token.into()), ..Default::default() }
    }

    /// Emulator at `endpoint`, no credentials
    pub fn emulator(endpoint: &str) -> Self {
        Self { endpoint: endpoint.trim_end_matches('/').to_string(), access_token: None }
    }

    /// `STORAGE_EMULATOR_HOST` selects an emulator, otherwise
    /// `GOOGLE_OAUTH_ACCESS_TOKEN` supplies the bearer token.
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        if let Some(host) = var("STORAGE_EMULATOR_HOST") {
            let endpoint = if host.contains("://") { host } else { format!("http://{}", host) };
            return Self::emulator(&endpoint);
        }
        Self { access_token: var("GOOGLE_OAUTH_ACCESS_TOKEN"), ..Default::default() }
    }
}

/// Object resource as returned by the JSON API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GcsObject {
    name: String,
    #[serde(default)]
    size: Option<String>,
    updated: Option<String>,
    time_created: Option<String>,
    md5_hash: Option<String>,
    owner: Option<GcsOwner>,
}

#[derive(Debug, Clone, Deserialize)]
struct GcsOwner {
    entity: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<GcsObject>,
    #[serde(default)]
    prefixes: Vec<String>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

fn parse_time(value: Option<&String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

impl GcsObject {
    fn size(&self) -> u64 {
        self.size.as_ref().and_then(|s| s.parse().ok()).unwrap_or(0)
    }

    fn summary(self) -> ObjectSummary {
        let size = self.size();
        let modified = parse_time(self.updated.as_ref());
        ObjectSummary { key: self.name, size, modified, content_hash: self.md5_hash }
    }

    fn metadata(self) -> Metadata {
        let owner = self.owner.and_then(|o| o.entity);
        Metadata {
            size: self.size.as_ref().and_then(|s| s.parse().ok()).unwrap_or(0),
            modified: parse_time(self.updated.as_ref()),
            created: parse_time(self.time_created.as_ref()),
            content_hash: self.md5_hash,
            group: owner.clone(),
            owner,
            permissions: None,
        }
    }
}

impl ObjectList {
    fn into_page(self) -> (ListingPage, Option<String>) {
        let page = ListingPage::new(self.prefixes, self.items.into_iter().map(GcsObject::summary).collect());
        (page, self.next_page_token.filter(|t| !t.is_empty()))
    }
}

/// Google Cloud Storage client
#[derive(Clone)]
pub struct GcsStore {
    id: String,
    config: GcsConfig,
    http: Client,
    capabilities: StoreCapabilities,
}

impl GcsStore {
    pub fn new(id: impl Into<String>, config: GcsConfig) -> Self {
        Self {
            id: id.into(),
            config,
            http: Client::new(),
            capabilities: StoreCapabilities {
                server_side_copy: true,
                content_hashing: true,
                owner_metadata: true,
            },
        }
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.config.endpoint,
            urlencoding::encode(bucket),
            urlencoding::encode(key)
        )
    }

    fn request(&self, method: Method, url: &str, options: &RequestOptions) -> RequestBuilder {
        let mut request = self.http.request(method, url);
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token);
        }
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }
        request
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> CloudFsResult<Response> {
        let response = request.send().await.map_err(|e| transport_error(&self.id, e))?;
        check(response, what).await
    }

    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        options: &ListOptions,
        token: Option<String>,
    ) -> CloudFsResult<(ListingPage, Option<String>)> {
        let url = format!("{}/storage/v1/b/{}/o", self.config.endpoint, urlencoding::encode(bucket));
        let mut request = self
            .request(Method::GET, &url, &options.request)
            .query(&[("prefix", prefix)]);
        if let Some(delimiter) = &options.delimiter {
            request = request.query(&[("delimiter", delimiter.as_str())]);
        }
        if let Some(max) = options.page_size {
            request = request.query(&[("maxResults", max.max(1).to_string())]);
        }
        if let Some(token) = &token {
            request = request.query(&[("pageToken", token.as_str())]);
        }

        let response = self.send(request, &format!("gs://{}/{}", bucket, prefix)).await?;
        let list: ObjectList = response
            .json()
            .await
            .map_err(|e| CloudFsError::Decode(e.to_string()))?;
        let (page, next) = list.into_page();
        tracing::trace!(bucket, prefix, entries = page.len(), more = next.is_some(), "gcs listing page");
        Ok((page, next))
    }

    fn uri(bucket: &str, key: &str) -> String {
        format!("gs://{}/{}", bucket, key)
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    fn id(&self) -> &str {
        &self.id
    }

    fn display_name(&self) -> &str {
        "Google Cloud Storage"
    }

    fn capabilities(&self) -> &StoreCapabilities {
        &self.capabilities
    }

    fn list(&self, bucket: &str, prefix: &str, options: &ListOptions) -> ListStream {
        let store = self.clone();
        let bucket = bucket.to_string();
        let prefix = prefix.to_string();
        let options = options.clone();

        let pages = stream::unfold(Some(None::<String>), move |state| {
            let store = store.clone();
            let bucket = bucket.clone();
            let prefix = prefix.clone();
            let options = options.clone();
            async move {
                let token = state?;
                match store.list_page(&bucket, &prefix, &options, token).await {
                    Ok((page, next)) => Some((Ok(page), next.map(Some))),
                    Err(err) => Some((Err(err), None)),
                }
            }
        });
        Box::pin(pages)
    }

    async fn get(&self, bucket: &str, key: &str, options: &RequestOptions) -> CloudFsResult<Bytes> {
        let request = self
            .request(Method::GET, &self.object_url(bucket, key), options)
            .query(&[("alt", "media")]);
        let response = self.send(request, &Self::uri(bucket, key)).await?;
        response.bytes().await.map_err(|e| transport_error(&self.id, e))
    }

    async fn put(&self, bucket: &str, key: &str, data: Bytes, options: &RequestOptions) -> CloudFsResult<u64> {
        let written = data.len() as u64;
        let url = format!("{}/upload/storage/v1/b/{}/o", self.config.endpoint, urlencoding::encode(bucket));
        let request = self
            .request(Method::POST, &url, options)
            .query(&[("uploadType", "media"), ("name", key)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data);
        self.send(request, &Self::uri(bucket, key)).await?;
        tracing::debug!("Uploaded {} bytes to {}", written, Self::uri(bucket, key));
        Ok(written)
    }

    async fn delete(&self, bucket: &str, key: &str, options: &DeleteOptions) -> CloudFsResult<()> {
        let request = self.request(Method::DELETE, &self.object_url(bucket, key), &options.request);
        match self.send(request, &Self::uri(bucket, key)).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_not_found() && options.missing_ok => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn stat(&self, bucket: &str, key: &str, options: &RequestOptions) -> CloudFsResult<Metadata> {
        let request = self
            .request(Method::GET, &self.object_url(bucket, key), options)
            .query(&[("projection", "full")]);
        let response = self.send(request, &Self::uri(bucket, key)).await?;
        let object: GcsObject = response
            .json()
            .await
            .map_err(|e| CloudFsError::Decode(e.to_string()))?;
        Ok(object.metadata())
    }

    async fn copy(
        &self,
        bucket: &str,
        from: &str,
        to_bucket: &str,
        to: &str,
        options: &RequestOptions,
    ) -> CloudFsResult<u64> {
        let url = format!(
            "{}/copyTo/b/{}/o/{}",
            self.object_url(bucket, from),
            urlencoding::encode(to_bucket),
            urlencoding::encode(to)
        );
        let response = self
            .send(self.request(Method::POST, &url, options), &Self::uri(bucket, from))
            .await?;
        let object: GcsObject = response
            .json()
            .await
            .map_err(|e| CloudFsError::Decode(e.to_string()))?;
        Ok(object.size())
    }
}

fn transport_error(store: &str, err: reqwest::Error) -> CloudFsError {
    if err.is_timeout() {
        CloudFsError::Timeout
    } else {
        unavailable(store, err)
    }
}

async fn check(response: Response, what: &str) -> CloudFsResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(CloudFsError::NotFound(what.to_string()));
    }
    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body);
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return Err(CloudFsError::BackendUnavailable(format!("{} {}: {}", what, status, message)));
    }
    Err(CloudFsError::ProviderApi {
        provider: "gcs".into(),
        message: format!("{} {}: {}", what, status, message),
    })
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string())
}
