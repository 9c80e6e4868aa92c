pub mod compute;
pub mod gce;
pub mod kube;

use async_trait::async_trait;
use hyper::StatusCode;
use lazy_static::lazy_static;
use regex::Regex;

pub use compute::{ComputeConnector, ComputeError, HttpComputeConnector};
pub use gce::HttpMetadataClient;
pub use kube::{HostEnvironment, ProcessEnvironment};

lazy_static! {
    // instance/zone comes back as projects/<numeric-id>/zones/<zone>
    static ref ZONE_RE: Regex = Regex::new(r".*/zones/(.*)").unwrap();
}

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("metadata: {0:?} not defined")]
    NotDefined(String),

    #[error("metadata: GET {key:?} returned {status}")]
    Status { key: String, status: StatusCode },

    #[error("metadata: GET {0:?} timed out")]
    Timeout(String),

    #[error("metadata: bad request: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("metadata: {0}")]
    Transport(#[from] hyper::Error),

    #[error("metadata: response is not valid UTF-8")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Access to the instance-local GCE metadata server.
///
/// Only `on_gce` and `get` need implementing; the field accessors mirror the
/// well-known metadata paths on top of `get`.
#[async_trait]
pub trait MetadataClient: Send + Sync {
    async fn on_gce(&self) -> bool;

    /// Raw value of a key relative to `/computeMetadata/v1/`.
    async fn get(&self, key: &str) -> Result<String, MetadataError>;

    async fn project_id(&self) -> Result<String, MetadataError> {
        self.get_trimmed("project/project-id").await
    }

    async fn numeric_project_id(&self) -> Result<String, MetadataError> {
        self.get_trimmed("project/numeric-project-id").await
    }

    async fn instance_id(&self) -> Result<String, MetadataError> {
        self.get_trimmed("instance/id").await
    }

    async fn instance_name(&self) -> Result<String, MetadataError> {
        self.get_trimmed("instance/name").await
    }

    async fn zone(&self) -> Result<String, MetadataError> {
        let zone = self.get_trimmed("instance/zone").await?;
        Ok(parse_zone(&zone).to_string())
    }

    async fn internal_ip(&self) -> Result<String, MetadataError> {
        self.get_trimmed("instance/network-interfaces/0/ip").await
    }

    async fn external_ip(&self) -> Result<String, MetadataError> {
        self.get_trimmed("instance/network-interfaces/0/access-configs/0/external-ip")
            .await
    }

    async fn instance_attribute_value(&self, attr: &str) -> Result<String, MetadataError> {
        self.get(&format!("instance/attributes/{attr}")).await
    }

    async fn get_trimmed(&self, key: &str) -> Result<String, MetadataError> {
        Ok(self.get(key).await?.trim().to_string())
    }
}

fn parse_zone(val: &str) -> &str {
    match ZONE_RE.captures(val).and_then(|groups| groups.get(1)) {
        Some(zone) => zone.as_str(),
        None => val.rsplit('/').next().unwrap_or(val),
    }
}
