//! Docker Engine HTTP API client.
//!
//! Speaks the Engine API over the daemon's Unix socket. Only the handful of
//! container and image endpoints the fleet manager needs are covered.
//!
//! Reference: https://docs.docker.com/engine/api/v1.43/

use std::collections::BTreeMap;
use std::path::Path;

use hyper::body::Bytes;
use hyper::{Body, Client, Method, Request};
use hyperlocal::{UnixClientExt, UnixConnector, Uri};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

/// Engine API version prefix. 1.43 ships with Docker 24.
const API_VERSION: &str = "/v1.43";

/// Errors from the Engine API.
#[derive(Debug, Error)]
pub enum DockerApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("request error: {0}")]
    Request(#[from] hyper::http::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("image pull failed: {0}")]
    Pull(String),
}

impl DockerApiError {
    /// HTTP status of an API error response, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            DockerApiError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Body of `POST /containers/create`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateContainerRequest {
    pub image: String,
    pub env: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub exposed_ports: BTreeMap<String, EmptyObject>,
    pub host_config: HostConfig,
}

/// Serializes as `{}`, which is how the API spells set membership.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EmptyObject {}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    pub port_bindings: BTreeMap<String, Vec<PortBinding>>,
    pub restart_policy: RestartPolicy,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortBinding {
    pub host_ip: String,
    pub host_port: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RestartPolicy {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateContainerResponse {
    pub id: String,
    #[serde(default)]
    pub warnings: Option<Vec<String>>,
}

/// Subset of `GET /containers/{name}/json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerInspect {
    pub state: ContainerState,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerState {
    pub running: bool,
    #[serde(default)]
    pub status: String,
}

/// One entry of `GET /containers/json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerListEntry {
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub ports: Vec<ListedPort>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListedPort {
    pub private_port: u16,
    #[serde(default)]
    pub public_port: Option<u16>,
    #[serde(rename = "Type", default)]
    pub protocol: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Line of the `POST /images/create` progress stream.
#[derive(Debug, Deserialize)]
struct PullProgress {
    #[serde(default)]
    error: Option<String>,
}

/// Split `repo[:tag]` into repository and tag. A colon before the last `/`
/// belongs to a registry port, not a tag. Digest references (`repo@sha256:<hex>`)
/// are returned whole with no tag.
pub(crate) fn split_image_reference(image: &str) -> (&str, Option<&str>) {
    let name_start = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    let name = &image[name_start..];
    if name.contains('@') {
        return (image, None);
    }
    match name.rfind(':') {
        Some(i) => (&image[..name_start + i], Some(&image[name_start + i + 1..])),
        None => (image, Some("latest")),
    }
}

fn pull_path(image: &str) -> String {
    match split_image_reference(image) {
        (repo, Some(tag)) => format!("/images/create?fromImage={repo}&tag={tag}"),
        (reference, None) => format!("/images/create?fromImage={reference}"),
    }
}

fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<ErrorBody>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string())
}

// =============================================================================
// Client
// =============================================================================

/// Engine API client for Unix socket communication.
pub struct DockerClient {
    socket_path: String,
    client: Client<UnixConnector>,
}

impl DockerClient {
    /// Create a new client for the given socket path.
    pub fn new<P: AsRef<Path>>(socket_path: P) -> Self {
        let socket_path = socket_path.as_ref().to_string_lossy().to_string();
        let client = Client::unix();
        Self {
            socket_path,
            client,
        }
    }

    /// Check if the socket exists.
    pub fn socket_exists(&self) -> bool {
        Path::new(&self.socket_path).exists()
    }

    pub async fn ping(&self) -> Result<(), DockerApiError> {
        self.send(Method::GET, "/_ping", None).await.map(drop)
    }

    pub async fn create_container(
        &self,
        name: &str,
        body: &CreateContainerRequest,
    ) -> Result<CreateContainerResponse, DockerApiError> {
        let path = format!("/containers/create?name={name}");
        let body = self
            .send(Method::POST, &path, Some(serde_json::to_vec(body)?))
            .await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn start_container(&self, name: &str) -> Result<(), DockerApiError> {
        let path = format!("/containers/{name}/start");
        self.send(Method::POST, &path, None).await.map(drop)
    }

    pub async fn stop_container(&self, name: &str, timeout_secs: u64) -> Result<(), DockerApiError> {
        let path = format!("/containers/{name}/stop?t={timeout_secs}");
        self.send(Method::POST, &path, None).await.map(drop)
    }

    pub async fn restart_container(
        &self,
        name: &str,
        timeout_secs: u64,
    ) -> Result<(), DockerApiError> {
        let path = format!("/containers/{name}/restart?t={timeout_secs}");
        self.send(Method::POST, &path, None).await.map(drop)
    }

    /// Force-remove a container and its anonymous volumes.
    pub async fn remove_container(&self, name: &str) -> Result<(), DockerApiError> {
        let path = format!("/containers/{name}?force=true&v=true");
        self.send(Method::DELETE, &path, None).await.map(drop)
    }

    pub async fn inspect_container(&self, name: &str) -> Result<ContainerInspect, DockerApiError> {
        let path = format!("/containers/{name}/json");
        let body = self.send(Method::GET, &path, None).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// List running containers.
    pub async fn list_containers(&self) -> Result<Vec<ContainerListEntry>, DockerApiError> {
        let body = self.send(Method::GET, "/containers/json", None).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Raw (possibly multiplexed) log output.
    pub async fn container_logs(&self, name: &str, tail: u32) -> Result<Bytes, DockerApiError> {
        let path = format!("/containers/{name}/logs?stdout=true&stderr=true&tail={tail}");
        self.send(Method::GET, &path, None).await
    }

    /// Pull an image.
    ///
    /// The API answers 200 as soon as the pull starts and reports failures
    /// in-band, so the whole progress stream is read and checked.
    pub async fn pull_image(&self, image: &str) -> Result<(), DockerApiError> {
        let body = self.send(Method::POST, &pull_path(image), None).await?;

        for line in body.split(|b| *b == b'\n').filter(|l| !l.is_empty()) {
            if let Ok(PullProgress { error: Some(message) }) = serde_json::from_slice(line) {
                return Err(DockerApiError::Pull(message));
            }
        }
        Ok(())
    }

    /// Perform a request and return the body of a 2xx response.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Bytes, DockerApiError> {
        let uri = Uri::new(&self.socket_path, &format!("{API_VERSION}{path}"));

        debug!(method = %method, path = path, "Request to Docker Engine API");

        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Accept", "application/json");
        let request = match body {
            Some(bytes) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(bytes))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.client.request(request).await?;
        let status = response.status();
        let body = hyper::body::to_bytes(response.into_body()).await?;

        if status.is_success() {
            Ok(body)
        } else {
            let message = error_message(&body);
            if status.is_server_error() {
                error!(status = %status, message = %message, "Docker Engine API error");
            }
            Err(DockerApiError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}
