use std::time::Duration;

use async_trait::async_trait;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Method, Request, StatusCode};
use log::*;

use super::{MetadataClient, MetadataError};

pub const METADATA_SERVICE_HOST: &str = "169.254.169.254";
pub const METADATA_HOST_ENV: &str = "GCE_METADATA_HOST";

const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";
const METADATA_FLAVOR: &str = "Google";

pub struct HttpMetadataClient {
    client: Client<HttpConnector>,
    host: String,
    timeout: Duration,

    // set when the host was given explicitly instead of probed for
    assume_on_gce: bool,
}

impl HttpMetadataClient {
    pub fn new(host: &str, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            host: host.to_string(),
            timeout,
            assume_on_gce: false,
        }
    }

    /// Client for an explicitly configured metadata server. `on_gce` is
    /// always true for these, same as when `GCE_METADATA_HOST` is set.
    pub fn with_host_override(host: &str, timeout: Duration) -> Self {
        Self {
            assume_on_gce: true,
            ..Self::new(host, timeout)
        }
    }

    #[cfg(test)]
    pub fn host(&self) -> &str {
        &self.host
    }

    fn url(&self, key: &str) -> String {
        format!(
            "http://{}/computeMetadata/v1/{}",
            self.host,
            key.trim_start_matches('/')
        )
    }

    async fn send(&self, key: &str, url: String) -> Result<hyper::Response<Body>, MetadataError> {
        let req = Request::builder()
            .method(Method::GET)
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR)
            .uri(url)
            .body(Body::empty())?;

        match tokio::time::timeout(self.timeout, self.client.request(req)).await {
            Ok(resp) => Ok(resp?),
            Err(_) => Err(MetadataError::Timeout(key.to_string())),
        }
    }
}

#[async_trait]
impl MetadataClient for HttpMetadataClient {
    async fn on_gce(&self) -> bool {
        if self.assume_on_gce {
            return true;
        }

        let url = format!("http://{}", self.host);
        match self.send("/", url).await {
            Ok(resp) => resp
                .headers()
                .get(METADATA_FLAVOR_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(|v| v == METADATA_FLAVOR)
                .unwrap_or(false),
            Err(err) => {
                debug!("GCE metadata server not reachable at {}: {err}", self.host);
                false
            }
        }
    }

    async fn get(&self, key: &str) -> Result<String, MetadataError> {
        let resp = self.send(key, self.url(key)).await?;
        match resp.status() {
            StatusCode::OK => {
                let bytes = hyper::body::to_bytes(resp.into_body()).await?;
                let val = String::from_utf8(bytes.to_vec())?;
                trace!("Loaded metadata {key}: {val}");
                Ok(val)
            }
            StatusCode::NOT_FOUND => Err(MetadataError::NotDefined(key.to_string())),
            status => Err(MetadataError::Status {
                key: key.to_string(),
                status,
            }),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::Arc;

    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Response, Server};
    use tokio::task::JoinHandle;

    use super::*;

    /// Per-path deviations from a well behaved metadata server.
    #[derive(Default)]
    pub struct MockOptions {
        /// answer without the Metadata-Flavor header
        pub no_flavor: bool,

        /// path -> delay before answering
        pub delays: HashMap<String, Duration>,

        /// path -> status to answer with instead of the route
        pub statuses: HashMap<String, StatusCode>,
    }

    /// Serves `routes` (full request path -> body) on an ephemeral localhost
    /// port. Requests must carry the metadata flavor header unless they hit
    /// the compute API prefix.
    pub struct MockServer {
        pub addr: SocketAddr,
        task: JoinHandle<()>,
    }

    impl MockServer {
        pub fn start(routes: HashMap<String, String>) -> Self {
            Self::start_with(routes, MockOptions::default())
        }

        pub fn start_with(routes: HashMap<String, String>, opts: MockOptions) -> Self {
            let routes = Arc::new(routes);
            let opts = Arc::new(opts);

            let make_svc = make_service_fn(move |_| {
                let routes = routes.clone();
                let opts = opts.clone();
                async move {
                    Ok::<_, hyper::Error>(service_fn(move |req: Request<Body>| {
                        let routes = routes.clone();
                        let opts = opts.clone();
                        async move {
                            if let Some(delay) = opts.delays.get(req.uri().path()) {
                                tokio::time::sleep(*delay).await;
                            }
                            Ok::<_, hyper::Error>(respond(&routes, &opts, req))
                        }
                    }))
                }
            });

            let addr = SocketAddr::V4("127.0.0.1:0".parse().unwrap());
            let server = Server::bind(&addr).serve(make_svc);
            let addr = server.local_addr();
            let task = tokio::task::spawn(async move {
                _ = server.await;
            });

            Self { addr, task }
        }

        pub fn host(&self) -> String {
            format!("localhost:{}", self.addr.port())
        }

        pub async fn stop(self) {
            self.task.abort();
            _ = self.task.await;
        }
    }

    fn respond(
        routes: &HashMap<String, String>,
        opts: &MockOptions,
        req: Request<Body>,
    ) -> Response<Body> {
        let path = req.uri().path().to_string();

        if path.starts_with("/computeMetadata/") || path == "/" {
            let flavor = req
                .headers()
                .get(METADATA_FLAVOR_HEADER)
                .and_then(|v| v.to_str().ok());
            if flavor != Some(METADATA_FLAVOR) {
                return Response::builder()
                    .status(StatusCode::FORBIDDEN)
                    .body(Body::empty())
                    .unwrap();
            }
        }

        let mut resp = Response::builder();
        if !opts.no_flavor {
            resp = resp.header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR);
        }

        if let Some(status) = opts.statuses.get(&path) {
            return resp.status(*status).body(Body::empty()).unwrap();
        }

        if path == "/" {
            return resp.status(StatusCode::OK).body(Body::empty()).unwrap();
        }

        match routes.get(&path) {
            Some(body) => resp
                .status(StatusCode::OK)
                .body(Body::from(body.clone()))
                .unwrap(),
            None => resp
                .status(StatusCode::NOT_FOUND)
                .body(Body::empty())
                .unwrap(),
        }
    }
}
