use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::http::uri::InvalidUri;
use hyper::{Body, Client, Method, Request, StatusCode, Uri};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use log::*;
use serde::Deserialize;

use super::{MetadataClient, MetadataError};

pub const COMPUTE_API_ENDPOINT: &str = "https://compute.googleapis.com/compute/v1";

const TOKEN_KEY: &str = "instance/service-accounts/default/token";

#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    #[error("invalid compute API endpoint {endpoint:?}: {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: InvalidUri,
    },

    #[error("compute API endpoint {0:?} must be an absolute URL")]
    RelativeEndpoint(String),

    #[error("could not get an access token: {0}")]
    Token(#[source] MetadataError),

    #[error("could not parse access token: {0}")]
    BadToken(#[source] serde_json::Error),

    #[error("compute API returned {0}")]
    Status(StatusCode),

    #[error("compute API request timed out")]
    Timeout,

    #[error("compute API: bad request: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("compute API: {0}")]
    Transport(#[from] hyper::Error),

    #[error("compute API: could not decode instance: {0}")]
    Decode(#[source] serde_json::Error),
}

/// The subset of the compute#instance resource we care about.
#[derive(Debug, Default, Deserialize)]
pub struct Instance {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[async_trait]
pub trait ComputeService: Send + Sync {
    async fn get_instance(
        &self,
        project: &str,
        zone: &str,
        instance: &str,
    ) -> Result<Instance, ComputeError>;
}

/// Builds compute API sessions. Connecting only sets the client up; nothing
/// goes over the network until `get_instance`.
pub trait ComputeConnector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn ComputeService>, ComputeError>;
}

pub struct HttpComputeConnector {
    endpoint: String,
    metadata: Arc<dyn MetadataClient>,
    timeout: Duration,
}

impl HttpComputeConnector {
    pub fn new(endpoint: &str, metadata: Arc<dyn MetadataClient>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            metadata,
            timeout,
        }
    }
}

impl ComputeConnector for HttpComputeConnector {
    fn connect(&self) -> Result<Box<dyn ComputeService>, ComputeError> {
        let svc = HttpComputeService::new(&self.endpoint, self.metadata.clone(), self.timeout)?;
        Ok(Box::new(svc))
    }
}

#[derive(Deserialize)]
struct AccessToken {
    access_token: String,
}

pub struct HttpComputeService {
    client: Client<HttpsConnector<HttpConnector>>,
    endpoint: String,
    metadata: Arc<dyn MetadataClient>,
    timeout: Duration,
}

impl HttpComputeService {
    pub fn new(
        endpoint: &str,
        metadata: Arc<dyn MetadataClient>,
        timeout: Duration,
    ) -> Result<Self, ComputeError> {
        let uri: Uri = endpoint
            .parse()
            .map_err(|source| ComputeError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                source,
            })?;

        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(ComputeError::RelativeEndpoint(endpoint.to_string()));
        }

        let connector = HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();

        Ok(Self {
            client: Client::builder().build(connector),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            metadata,
            timeout,
        })
    }

    fn instance_url(&self, project: &str, zone: &str, instance: &str) -> String {
        format!(
            "{}/projects/{}/zones/{}/instances/{}",
            self.endpoint,
            urlencoding::encode(project),
            urlencoding::encode(zone),
            urlencoding::encode(instance)
        )
    }

    async fn fetch(&self, req: Request<Body>) -> Result<Instance, ComputeError> {
        let resp = self.client.request(req).await?;
        match resp.status() {
            StatusCode::OK => {
                let bytes = hyper::body::to_bytes(resp.into_body()).await?;
                serde_json::from_slice(&bytes).map_err(ComputeError::Decode)
            }
            code => Err(ComputeError::Status(code)),
        }
    }

    async fn access_token(&self) -> Result<String, ComputeError> {
        let raw = self.metadata.get(TOKEN_KEY).await.map_err(ComputeError::Token)?;
        let token: AccessToken = serde_json::from_str(&raw).map_err(ComputeError::BadToken)?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl ComputeService for HttpComputeService {
    async fn get_instance(
        &self,
        project: &str,
        zone: &str,
        instance: &str,
    ) -> Result<Instance, ComputeError> {
        let token = self.access_token().await?;

        let url = self.instance_url(project, zone, instance);
        debug!("GET {url}");

        let req = Request::builder()
            .method(Method::GET)
            .header("Authorization", format!("Bearer {token}"))
            .uri(url)
            .body(Body::empty())?;

        tokio::time::timeout(self.timeout, self.fetch(req))
            .await
            .map_err(|_| ComputeError::Timeout)?
    }
}
