//! Graph Client
//!
//! Facade combining settings, the token capability and the HTTP executor,
//! and exposing the verbs every generated operation funnels through.

use super::auth::AuthContext;
use super::content::Content;
use super::http::{GraphHttpClient, RawResponse};
use super::paginator::{self, Paginator};
use super::query::QueryOptions;
use super::request::{Method, RequestSpec};
use super::response::{self, CallKind, CollectionPage, Output};
use crate::config::GraphSettings;
use crate::error::{GraphError, Result};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Shared, replaceable environment settings.
///
/// Each call takes a snapshot when it starts; a replacement only affects
/// calls that start afterwards.
#[derive(Clone, Debug)]
pub struct SettingsHandle {
    inner: Arc<RwLock<GraphSettings>>,
}

impl SettingsHandle {
    pub fn new(settings: GraphSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub async fn snapshot(&self) -> GraphSettings {
        self.inner.read().await.clone()
    }

    /// Swap the settings in place for every clone of this handle
    pub async fn replace(&self, settings: GraphSettings) {
        let mut guard = self.inner.write().await;
        tracing::info!(
            "Switching environment: {} -> {}",
            guard.base_address(),
            settings.base_address()
        );
        *guard = settings;
    }
}

/// Main Graph client
#[derive(Clone)]
pub struct GraphClient {
    pub http: GraphHttpClient,
    pub auth: AuthContext,
    settings: SettingsHandle,
    cancel: CancellationToken,
}

impl GraphClient {
    /// Create a client for the given environment and token capability
    pub fn new(settings: GraphSettings, auth: AuthContext) -> Result<Self> {
        Ok(Self {
            http: GraphHttpClient::new()?,
            auth,
            settings: SettingsHandle::new(settings),
            cancel: CancellationToken::new(),
        })
    }

    /// Same client, but every call made through it fails with `Cancelled`
    /// once `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn settings_handle(&self) -> &SettingsHandle {
        &self.settings
    }

    pub async fn settings(&self) -> GraphSettings {
        self.settings.snapshot().await
    }

    /// Point this client and all of its clones at another environment
    pub async fn replace_settings(&self, settings: GraphSettings) {
        self.settings.replace(settings).await;
    }

    /// One raw exchange: status and body, no interpretation
    pub async fn execute(&self, spec: &RequestSpec) -> Result<RawResponse> {
        let settings = self.settings.snapshot().await;
        self.http
            .execute(spec, &settings, &self.auth, &self.cancel)
            .await
    }

    /// Execute, classify and shape
    pub async fn invoke(&self, spec: &RequestSpec, kind: CallKind) -> Result<Output> {
        let raw = self.execute(spec).await?;
        let envelope = response::interpret(&raw.body)?;
        Ok(response::shape(envelope, kind))
    }

    // =========================================================================
    // Verbs
    // =========================================================================

    /// Read a resource or collection; collection envelopes are kept
    pub async fn get(&self, path: &str, options: QueryOptions) -> Result<Output> {
        let spec = RequestSpec::get(path).with_query(options);
        self.invoke(&spec, CallKind::Get).await
    }

    /// Query a collection; a single-page result collapses to bare items
    pub async fn search(&self, path: &str, options: QueryOptions) -> Result<Output> {
        let spec = RequestSpec::get(path).with_query(options);
        self.invoke(&spec, CallKind::Search).await
    }

    /// POST `content` to a collection
    pub async fn create(&self, path: &str, content: Content) -> Result<Output> {
        self.write(Method::Post, path, content).await
    }

    /// PATCH the resource at `path`
    pub async fn update(&self, path: &str, content: Content) -> Result<Output> {
        self.write(Method::Patch, path, content).await
    }

    /// PUT the full resource at `path`
    pub async fn replace(&self, path: &str, content: Content) -> Result<Output> {
        self.write(Method::Put, path, content).await
    }

    /// DELETE the resource at `path`
    pub async fn delete(&self, path: &str) -> Result<Output> {
        let spec = RequestSpec::new(Method::Delete, path);
        self.invoke(&spec, CallKind::Get).await
    }

    async fn write(&self, method: Method, path: &str, content: Content) -> Result<Output> {
        let spec = RequestSpec::new(method, path).with_body(content);
        self.invoke(&spec, CallKind::Get).await
    }

    // =========================================================================
    // Pagination
    // =========================================================================

    /// Fetch the page after `page`, or `None` when `page` is the last one
    pub async fn next_page(&self, page: &CollectionPage) -> Result<Option<CollectionPage>> {
        match page.next_link.as_deref() {
            Some(link) => paginator::fetch_page(self, link).await.map(Some),
            None => Ok(None),
        }
    }

    /// Lazy cursor over the pages following `page`
    pub fn pages(&self, page: &CollectionPage) -> Paginator<'_> {
        Paginator::after(self, page)
    }

    /// Drive pagination to the end and concatenate items in fetch order.
    /// All or nothing: any failing page fails the whole call.
    pub async fn fetch_all(&self, first: CollectionPage) -> Result<Vec<Value>> {
        paginator::collect_all(self, first).await
    }

    /// `get` followed by `fetch_all`
    pub async fn list_all(&self, path: &str, options: QueryOptions) -> Result<Vec<Value>> {
        let spec = RequestSpec::get(path).with_query(options);
        self.invoke_all(&spec).await
    }

    /// Send `spec` as the first page, then follow next-links to the end.
    ///
    /// Caller headers and options apply to the first request only; later
    /// pages replay their next-link as is.
    pub async fn invoke_all(&self, spec: &RequestSpec) -> Result<Vec<Value>> {
        if spec.method() != Method::Get {
            return Err(GraphError::invalid_argument(format!(
                "only GET collections can be paged, not {}",
                spec.method()
            )));
        }

        let kind = CallKind::for_options(spec.query());
        let output = self.invoke(spec, kind).await?;
        paginator::collect_output(self, output).await
    }
}
