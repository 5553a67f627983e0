use async_trait::async_trait;
use fleet_core::{
    BatchEvent, BundleRecord, DeploymentEvent, EventChannel, EventStream, EventSubscriber,
    SnapshotFetcher, WaitError,
};
use futures::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::{Auth, ServerConfig};
use crate::error::ClientError;
use crate::events::SseStream;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeployResponse {
    deployment_batch_id: String,
}

/// Authenticated HTTP client bound to one orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorClient {
    http: reqwest::Client,
    config: ServerConfig,
}

impl OrchestratorClient {
    pub fn new(config: ServerConfig) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder();
        if let Some(path) = &config.tls.ca_cert {
            let pem = std::fs::read(path).map_err(|source| ClientError::CaCert {
                path: path.clone(),
                source,
            })?;
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
        }
        if config.tls.insecure {
            warn!(url = %config.url, "TLS certificate verification disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }
        Ok(Self {
            http: builder.build()?,
            config,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let req = self.http.request(method, self.config.endpoint(path));
        match &self.config.auth {
            Some(Auth::Basic { username, password }) => req.basic_auth(username, password.as_ref()),
            Some(Auth::Bearer { token }) => req.bearer_auth(token),
            None => req,
        }
    }

    /// GETs a JSON snapshot. A 404 means the resource does not exist yet.
    async fn snapshot<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, ClientError> {
        let resp = self.request(Method::GET, path).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            debug!(path, "snapshot not found");
            return Ok(None);
        }
        let resp = check_status("GET", resp).await?;
        let url = resp.url().to_string();
        let body = resp.bytes().await?;
        debug!(path, bytes = body.len(), "snapshot fetched");
        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|source| ClientError::Decode { url, source })
    }

    /// Opens one of the orchestrator's event streams.
    pub async fn open_stream(&self, channel: EventChannel) -> Result<SseStream, ClientError> {
        let resp = self
            .request(Method::GET, channel.path())
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await?;
        let resp = check_status("GET", resp).await?;
        debug!(path = channel.path(), "event stream open");
        Ok(SseStream::new(resp))
    }

    /// Requests `scale` running instances of a bundle; 0 stops it.
    pub async fn scale_bundle(&self, bundle_id: &str, scale: u32) -> Result<(), ClientError> {
        let path = format!("/bundles/{bundle_id}?scale={scale}");
        let resp = self.request(Method::PUT, &path).send().await?;
        check_status("PUT", resp).await?;
        Ok(())
    }

    pub async fn unload_bundle(&self, bundle_id: &str) -> Result<(), ClientError> {
        let resp = self
            .request(Method::DELETE, &format!("/bundles/{bundle_id}"))
            .send()
            .await?;
        check_status("DELETE", resp).await?;
        Ok(())
    }

    /// Requests a deployment and returns the batch id to wait on.
    pub async fn deploy_bundle(&self, bundle_id: &str) -> Result<String, ClientError> {
        let resp = self
            .request(Method::POST, &format!("/deployments/{bundle_id}"))
            .send()
            .await?;
        let parsed: DeployResponse = check_status("POST", resp).await?.json().await?;
        Ok(parsed.deployment_batch_id)
    }
}

async fn check_status(method: &'static str, resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let url = resp.url().to_string();
    let body = resp.text().await.unwrap_or_default();
    Err(ClientError::Status {
        method,
        url,
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl SnapshotFetcher for OrchestratorClient {
    async fn bundles(&self) -> Result<Option<Vec<BundleRecord>>, WaitError> {
        Ok(self.snapshot("/bundles").await?)
    }

    async fn deployment_events(
        &self,
        deployment_id: &str,
    ) -> Result<Option<Vec<DeploymentEvent>>, WaitError> {
        Ok(self.snapshot(&format!("/deployments/{deployment_id}")).await?)
    }

    async fn batch_events(&self, batch_id: &str) -> Result<Option<Vec<BatchEvent>>, WaitError> {
        Ok(self
            .snapshot(&format!("/deployments/batch/{batch_id}"))
            .await?)
    }
}

#[async_trait]
impl EventSubscriber for OrchestratorClient {
    async fn subscribe(&self, channel: EventChannel) -> Result<EventStream, WaitError> {
        Ok(self.open_stream(channel).await?.boxed())
    }
}
