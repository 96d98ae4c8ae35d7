//! NGSI-LD context broker over HTTP.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | `get` | `GET /ngsi-ld/v1/entities/{urn}` |
//! | `query` / `list` | `GET /ngsi-ld/v1/entities?type=..&q=..` |
//! | `create` | `POST /ngsi-ld/v1/entityOperations/create` |
//! | `update` | `POST /ngsi-ld/v1/entityOperations/update` (overwrite) |
//!
//! Every request carries the configured timeout. Transport failures surface
//! as `StoreConnectivity`. Non-success answers and bodies that do not decode
//! surface as `StoreRejected`.
//!
//! The broker's batch create is not transactional: a `207 Multi-Status`
//! answer means some entities were created. It is reported as a rejection
//! and the ids that went through are logged.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, LINK};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::Value as Json;

use super::{ngsi, AttrFilter, ContextStore, StoreConfig};
use crate::model::{Entity, EntityType};
use crate::{Error, Result};

const ENTITIES: &str = "/ngsi-ld/v1/entities";
const BATCH_CREATE: &str = "/ngsi-ld/v1/entityOperations/create";
const BATCH_UPDATE: &str = "/ngsi-ld/v1/entityOperations/update";
const TENANT_HEADER: &str = "NGSILD-Tenant";
const PAGE_SIZE: usize = 1000;

/// Client for an NGSI-LD broker (Orion-LD, Scorpio, Stellio).
pub struct NgsiLdStore {
    client: Client,
    base_url: String,
    tenant: Option<String>,
    context_url: String,
}

impl NgsiLdStore {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .ok_or_else(|| Error::Config("store.base_url is required for the http store".into()))?
            .trim_end_matches('/')
            .to_string();
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            tenant: config.tenant.clone(),
            context_url: config.context_url.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn link_header(&self) -> String {
        format!(
            "<{}>; rel=\"http://www.w3.org/ns/json-ld#context\"; type=\"application/ld+json\"",
            self.context_url
        )
    }

    fn with_headers(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.tenant {
            Some(tenant) => req.header(TENANT_HEADER, tenant),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response> {
        self.with_headers(req).send().await.map_err(transport_error)
    }

    async fn post_batch(&self, path: &str, entities: &[Entity]) -> Result<Response> {
        let body: Vec<Json> = entities
            .iter()
            .map(|e| ngsi::encode(e, Some(&self.context_url)))
            .collect();
        let payload = serde_json::to_vec(&body)
            .map_err(|e| Error::StoreRejected(format!("encode batch: {e}")))?;
        self.send(
            self.client
                .post(self.url(path))
                .header(CONTENT_TYPE, "application/ld+json")
                .body(payload),
        )
        .await
    }

    async fn fetch_page(
        &self,
        entity_type: EntityType,
        q: Option<&str>,
        offset: usize,
    ) -> Result<Vec<Entity>> {
        let mut params: Vec<(&str, String)> = vec![
            ("type", entity_type.name().to_string()),
            ("limit", PAGE_SIZE.to_string()),
            ("offset", offset.to_string()),
        ];
        if let Some(q) = q {
            params.push(("q", q.to_string()));
        }
        let resp = self
            .send(
                self.client
                    .get(self.url(ENTITIES))
                    .header(LINK, self.link_header())
                    .query(&params),
            )
            .await?;
        let resp = ensure_success(resp, "query").await?;
        let body: Vec<Json> = resp.json().await.map_err(body_error)?;
        body.iter().map(ngsi::decode).collect()
    }

    async fn fetch_all(&self, entity_type: EntityType, q: Option<&str>) -> Result<Vec<Entity>> {
        let mut out = Vec::new();
        loop {
            let page = self.fetch_page(entity_type, q, out.len()).await?;
            let last = page.len() < PAGE_SIZE;
            out.extend(page);
            if last {
                return Ok(out);
            }
        }
    }
}

#[async_trait]
impl ContextStore for NgsiLdStore {
    async fn get(&self, id: &str) -> Result<Option<Entity>> {
        let target = ngsi::to_urn(id);
        let resp = self
            .send(
                self.client
                    .get(self.url(&format!("{ENTITIES}/{target}")))
                    .header(LINK, self.link_header()),
            )
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = ensure_success(resp, "get").await?;
        let body: Json = resp.json().await.map_err(body_error)?;
        ngsi::decode(&body).map(Some)
    }

    async fn query(&self, entity_type: EntityType, filter: &AttrFilter) -> Result<Vec<Entity>> {
        let q = ngsi::query_expr(filter);
        self.fetch_all(entity_type, Some(&q)).await
    }

    async fn list(&self, entity_type: EntityType) -> Result<Vec<Entity>> {
        self.fetch_all(entity_type, None).await
    }

    async fn create(&self, entities: Vec<Entity>) -> Result<()> {
        let resp = self.post_batch(BATCH_CREATE, &entities).await?;
        if resp.status() == StatusCode::MULTI_STATUS {
            let detail = resp.text().await.unwrap_or_default();
            tracing::warn!(detail = %detail, "batch create partially applied");
            return Err(Error::StoreRejected(format!("batch create partially applied: {detail}")));
        }
        ensure_success(resp, "create").await?;
        Ok(())
    }

    async fn update(&self, entity: &Entity) -> Result<()> {
        let resp = self.post_batch(BATCH_UPDATE, std::slice::from_ref(entity)).await?;
        if resp.status() == StatusCode::MULTI_STATUS {
            let detail = resp.text().await.unwrap_or_default();
            return Err(Error::StoreRejected(format!("update of {} failed: {detail}", entity.id)));
        }
        ensure_success(resp, "update").await?;
        Ok(())
    }
}

async fn ensure_success(resp: Response, op: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let detail = resp.text().await.unwrap_or_default();
    Err(Error::StoreRejected(format!("{op}: {status} {detail}")))
}

/// The broker answered, but not with JSON we can read.
fn body_error(e: reqwest::Error) -> Error {
    if e.is_decode() {
        Error::StoreRejected(format!("undecodable response body: {e}"))
    } else {
        transport_error(e)
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::StoreConnectivity(format!("timeout: {e}"))
    } else {
        Error::StoreConnectivity(e.to_string())
    }
}
