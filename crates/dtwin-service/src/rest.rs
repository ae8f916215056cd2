//! REST twin-graph client
//!
//! Talks to a twin-graph endpoint over HTTPS. Listings follow `nextLink`,
//! queries follow `continuationToken`; error bodies are decoded into
//! [`ServiceError`]. There is no retry layer.

use crate::error::{ServiceError, ServiceResult};
use crate::service::{ServiceStream, TwinGraphService};
use crate::types::{
    BasicRelationship, BasicTwin, IncomingRelationship, ModelData, PatchOperation, TwinFilter,
};
use async_trait::async_trait;
use dtwin_model::ModelId;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::header::{CONTENT_TYPE, IF_MATCH};
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// API version sent when none is configured
pub const DEFAULT_API_VERSION: &str = "2023-10-31";

const JSON_PATCH: &str = "application/json-patch+json";

/// Connection settings for [`RestTwinGraph`]
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Service base URL
    pub endpoint: Url,
    /// `api-version` query value
    pub api_version: String,
    /// Bearer token
    pub access_token: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
}

impl RestConfig {
    /// Settings for `endpoint` with defaults
    ///
    /// # Errors
    /// - `InvalidEndpoint` (400) if `endpoint` is not an http(s) URL
    pub fn new(endpoint: &str) -> ServiceResult<Self> {
        let url = Url::parse(endpoint).map_err(|e| {
            ServiceError::bad_request("InvalidEndpoint", format!("{endpoint}: {e}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
            return Err(ServiceError::bad_request(
                "InvalidEndpoint",
                format!("{endpoint}: expected an http(s) URL"),
            ));
        }
        Ok(Self {
            endpoint: url,
            api_version: DEFAULT_API_VERSION.to_string(),
            access_token: None,
            timeout: Duration::from_secs(30),
        })
    }

    /// With API version
    #[must_use]
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// With bearer token
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// With request timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Deserialize)]
struct Page<T> {
    value: Vec<T>,
    #[serde(rename = "nextLink", default)]
    next_link: Option<String>,
}

#[derive(Deserialize)]
struct QueryPage {
    value: Vec<Value>,
    #[serde(rename = "continuationToken", default)]
    continuation_token: Option<String>,
}

/// Twin graph reached over HTTP
#[derive(Debug, Clone)]
pub struct RestTwinGraph {
    client: reqwest::Client,
    config: Arc<RestConfig>,
}

impl RestTwinGraph {
    /// Build client for `config`
    ///
    /// # Errors
    /// - transport error if the HTTP client cannot be built
    pub fn new(config: RestConfig) -> ServiceResult<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    /// Settings in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    fn url(&self, segments: &[&str]) -> ServiceResult<Url> {
        let mut url = self.config.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| ServiceError::bad_request("InvalidEndpoint", self.config.endpoint.to_string()))?
            .pop_if_empty()
            .extend(segments);
        url.query_pairs_mut()
            .append_pair("api-version", &self.config.api_version);
        Ok(url)
    }

    fn ensure_api_version(&self, mut url: Url) -> Url {
        if !url.query_pairs().any(|(key, _)| key == "api-version") {
            url.query_pairs_mut()
                .append_pair("api-version", &self.config.api_version);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        tracing::debug!(%method, %url, "twin-graph request");
        let builder = self.client.request(method, url);
        match &self.config.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(builder: RequestBuilder) -> ServiceResult<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let err = ServiceError::from_response(status.as_u16(), &body);
        tracing::debug!(status = err.status, error_code = %err.error_code, "twin-graph call failed");
        Err(err)
    }

    async fn send_json<T: DeserializeOwned>(builder: RequestBuilder) -> ServiceResult<T> {
        Ok(Self::send(builder).await?.json().await?)
    }

    fn paged<T>(&self, first: ServiceResult<Url>) -> ServiceStream<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let first = match first {
            Ok(url) => url,
            Err(err) => return stream::iter(vec![Err(err)]).boxed(),
        };
        let this = self.clone();
        stream::try_unfold(Some(first), move |next| {
            let this = this.clone();
            async move {
                let Some(url) = next else {
                    return Ok(None);
                };
                let page: Page<T> = Self::send_json(this.request(Method::GET, url)).await?;
                let next = page
                    .next_link
                    .map(|link| {
                        Url::parse(&link)
                            .map(|url| this.ensure_api_version(url))
                            .map_err(|e| ServiceError::transport(format!("bad nextLink {link}: {e}")))
                    })
                    .transpose()?;
                let items = stream::iter(page.value.into_iter().map(Ok::<T, ServiceError>));
                Ok::<_, ServiceError>(Some((items, next)))
            }
        })
        .try_flatten()
        .boxed()
    }

    fn query_rows(&self, query: String) -> ServiceStream<Value> {
        let url = match self.url(&["query"]) {
            Ok(url) => url,
            Err(err) => return stream::iter(vec![Err(err)]).boxed(),
        };
        let this = self.clone();
        // None = finished, Some(None) = first page, Some(Some(token)) = continuation
        stream::try_unfold(Some(None::<String>), move |state| {
            let this = this.clone();
            let url = url.clone();
            let query = query.clone();
            async move {
                let Some(token) = state else {
                    return Ok(None);
                };
                let mut body = json!({ "query": query });
                if let Some(token) = token {
                    body["continuationToken"] = Value::String(token);
                }
                let page: QueryPage =
                    Self::send_json(this.request(Method::POST, url).json(&body)).await?;
                let next = page.continuation_token.map(Some);
                let rows = stream::iter(page.value.into_iter().map(Ok::<Value, ServiceError>));
                Ok::<_, ServiceError>(Some((rows, next)))
            }
        })
        .try_flatten()
        .boxed()
    }
}

/// Twin id from a query row (`{"$dtId": ..}` or `{"T": {"$dtId": ..}}`)
fn twin_id(row: &Value) -> ServiceResult<String> {
    row.get("$dtId")
        .or_else(|| row.get("T").and_then(|t| t.get("$dtId")))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ServiceError::transport(format!("query row without $dtId: {row}")))
}

#[async_trait]
impl TwinGraphService for RestTwinGraph {
    fn list_models(&self, include_definitions: bool) -> ServiceStream<ModelData> {
        let url = self.url(&["models"]).map(|mut url| {
            url.query_pairs_mut()
                .append_pair("includeModelDefinition", &include_definitions.to_string());
            url
        });
        self.paged(url)
    }

    async fn get_model(&self, id: &ModelId) -> ServiceResult<ModelData> {
        let mut url = self.url(&["models", id.as_str()])?;
        url.query_pairs_mut()
            .append_pair("includeModelDefinition", "true");
        Self::send_json(self.request(Method::GET, url)).await
    }

    async fn create_models(&self, definitions: Vec<Value>) -> ServiceResult<Vec<ModelData>> {
        let url = self.url(&["models"])?;
        Self::send_json(self.request(Method::POST, url).json(&definitions)).await
    }

    async fn decommission_model(&self, id: &ModelId) -> ServiceResult<()> {
        let url = self.url(&["models", id.as_str()])?;
        let patch = json!([{ "op": "replace", "path": "/decommissioned", "value": true }]);
        Self::send(
            self.request(Method::PATCH, url)
                .header(CONTENT_TYPE, JSON_PATCH)
                .json(&patch),
        )
        .await?;
        Ok(())
    }

    async fn delete_model(&self, id: &ModelId) -> ServiceResult<()> {
        let url = self.url(&["models", id.as_str()])?;
        Self::send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    async fn get_twin(&self, twin_id: &str) -> ServiceResult<BasicTwin> {
        let url = self.url(&["digitaltwins", twin_id])?;
        Self::send_json(self.request(Method::GET, url)).await
    }

    async fn upsert_twin(&self, twin: &BasicTwin) -> ServiceResult<BasicTwin> {
        let url = self.url(&["digitaltwins", &twin.id])?;
        Self::send_json(self.request(Method::PUT, url).json(twin)).await
    }

    async fn update_twin(
        &self,
        twin_id: &str,
        patch: &[PatchOperation],
        if_match: Option<&str>,
    ) -> ServiceResult<()> {
        let url = self.url(&["digitaltwins", twin_id])?;
        let mut builder = self
            .request(Method::PATCH, url)
            .header(CONTENT_TYPE, JSON_PATCH);
        if let Some(etag) = if_match {
            builder = builder.header(IF_MATCH, etag);
        }
        Self::send(builder.json(patch)).await?;
        Ok(())
    }

    async fn delete_twin(&self, twin_id: &str) -> ServiceResult<()> {
        let url = self.url(&["digitaltwins", twin_id])?;
        Self::send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    fn query_twin_ids(&self, filter: &TwinFilter) -> ServiceStream<String> {
        self.query_rows(filter.to_query())
            .and_then(|row| async move { twin_id(&row) })
            .boxed()
    }

    fn get_relationships(&self, twin_id: &str) -> ServiceStream<BasicRelationship> {
        self.paged(self.url(&["digitaltwins", twin_id, "relationships"]))
    }

    fn get_incoming_relationships(&self, twin_id: &str) -> ServiceStream<IncomingRelationship> {
        self.paged(self.url(&["digitaltwins", twin_id, "incomingrelationships"]))
    }

    async fn get_relationship(
        &self,
        twin_id: &str,
        relationship_id: &str,
    ) -> ServiceResult<BasicRelationship> {
        let url = self.url(&["digitaltwins", twin_id, "relationships", relationship_id])?;
        Self::send_json(self.request(Method::GET, url)).await
    }

    async fn upsert_relationship(
        &self,
        relationship: &BasicRelationship,
    ) -> ServiceResult<BasicRelationship> {
        let url = self.url(&[
            "digitaltwins",
            &relationship.source_id,
            "relationships",
            &relationship.id,
        ])?;
        Self::send_json(self.request(Method::PUT, url).json(relationship)).await
    }

    async fn delete_relationship(&self, twin_id: &str, relationship_id: &str) -> ServiceResult<()> {
        let url = self.url(&["digitaltwins", twin_id, "relationships", relationship_id])?;
        Self::send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }
}
