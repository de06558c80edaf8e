//! Digital Twins model REST calls

use async_trait::async_trait;
use iotops_core::{
    ListModelsOptions, ModelApi, ModelData, PatchOperation, ServiceError, TwinsSession,
};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Url};
use serde_json::Value;
use tracing::debug;

use crate::client::RestClient;
use crate::paging::{parse_page, Page};

/// Digital Twins data-plane API version
pub const TWINS_API_VERSION: &str = "2020-10-31";

const MAX_ITEMS_PER_PAGE_HEADER: &str = "max-items-per-page";

impl RestClient {
    fn twins_request(
        &self,
        method: Method,
        dt: &TwinsSession,
        segments: &[&str],
    ) -> Result<reqwest::RequestBuilder, ServiceError> {
        self.request(
            method,
            &dt.host_name,
            segments,
            TWINS_API_VERSION,
            dt.authorization(),
        )
    }
}

/// Query pairs for the first page of a model listing
fn list_query(options: &ListModelsOptions) -> Vec<(&'static str, String)> {
    let mut query = vec![(
        "includeModelDefinition",
        options.include_definition.to_string(),
    )];
    for id in &options.dependencies_for {
        query.push(("dependenciesFor", id.clone()));
    }
    query
}

#[async_trait]
impl ModelApi for RestClient {
    async fn add_models(&self, dt: &TwinsSession, models: &[Value]) -> Result<Value, ServiceError> {
        let request = self.twins_request(Method::POST, dt, &["models"])?.json(models);
        self.send_json(request).await
    }

    async fn get_model(
        &self,
        dt: &TwinsSession,
        id: &str,
        include_definition: bool,
    ) -> Result<ModelData, ServiceError> {
        let request = self
            .twins_request(Method::GET, dt, &["models", id])?
            .query(&[("includeModelDefinition", include_definition)]);
        self.send_json(request).await
    }

    async fn list_models(
        &self,
        dt: &TwinsSession,
        options: &ListModelsOptions,
    ) -> Result<Vec<ModelData>, ServiceError> {
        let mut models = Vec::new();
        let mut request = self
            .twins_request(Method::GET, dt, &["models"])?
            .query(&list_query(options));
        let mut pages = 0usize;

        loop {
            if let Some(max) = options.max_items_per_page {
                request = request.header(MAX_ITEMS_PER_PAGE_HEADER, max.to_string());
            }

            let body = self.send_text(request).await?;
            let page: Page<ModelData> = parse_page(&body)?;
            pages += 1;
            debug!(dt = %dt.name, page = pages, count = page.value.len(), "Fetched model page");
            models.extend(page.value);

            let Some(next_link) = page.next_link else {
                return Ok(models);
            };
            let url = Url::parse(&next_link)
                .map_err(|e| ServiceError::Decode(format!("Invalid nextLink '{}': {}", next_link, e)))?;
            request = self.request_url(Method::GET, url, dt.authorization());
        }
    }

    async fn update_model(
        &self,
        dt: &TwinsSession,
        id: &str,
        patch: &[PatchOperation],
    ) -> Result<(), ServiceError> {
        let body =
            serde_json::to_vec(patch).map_err(|e| ServiceError::Decode(e.to_string()))?;
        let request = self
            .twins_request(Method::PATCH, dt, &["models", id])?
            .header(CONTENT_TYPE, "application/json-patch+json")
            .body(body);
        self.send_empty(request).await
    }

    async fn delete_model(&self, dt: &TwinsSession, id: &str) -> Result<(), ServiceError> {
        let request = self.twins_request(Method::DELETE, dt, &["models", id])?;
        self.send_empty(request).await
    }
}
