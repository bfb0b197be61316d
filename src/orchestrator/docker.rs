//! Docker Swarm binding of the orchestrator interface.
//!
//! Talks to the Docker Engine API over a unix socket or plain TCP using
//! one short-lived HTTP/1 connection per call.

use anyhow::{anyhow, Context};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{header, Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use super::api::{Orchestrator, ServiceDescriptor, ServiceMode};
use super::error::ScaleError;

pub const DEFAULT_DOCKER_SOCKET: &str = "unix:///var/run/docker.sock";
pub const DOCKER_HOST_ENV: &str = "DOCKER_HOST";
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

const TASK_STATE_RUNNING: &str = "running";

/// Where the Docker Engine API listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Unix(PathBuf),
    Tcp(String),
}

impl Endpoint {
    /// Parses `unix:///path`, `tcp://host:port` or `http://host:port`.
    pub fn parse(raw: &str) -> Result<Self, ScaleError> {
        let raw = raw.trim();
        if let Some(path) = raw.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(ScaleError::Config(format!("empty unix socket path in {raw:?}")));
            }
            return Ok(Endpoint::Unix(PathBuf::from(path)));
        }
        if let Some(addr) = raw
            .strip_prefix("tcp://")
            .or_else(|| raw.strip_prefix("http://"))
        {
            let addr = addr.trim_end_matches('/');
            if addr.is_empty() {
                return Err(ScaleError::Config(format!("empty tcp address in {raw:?}")));
            }
            return Ok(Endpoint::Tcp(addr.to_string()));
        }
        Err(ScaleError::Config(format!(
            "unsupported orchestrator endpoint {raw:?} (expected unix://, tcp:// or http://)"
        )))
    }

    /// Resolves the endpoint: explicit value, then `DOCKER_HOST`, then the default socket.
    pub fn resolve(explicit: Option<&str>) -> Result<Self, ScaleError> {
        match explicit {
            Some(raw) => Self::parse(raw),
            None => match std::env::var(DOCKER_HOST_ENV) {
                Ok(raw) if !raw.trim().is_empty() => Self::parse(&raw),
                _ => Self::parse(DEFAULT_DOCKER_SOCKET),
            },
        }
    }

    fn host_header(&self) -> &str {
        match self {
            Endpoint::Unix(_) => "docker",
            Endpoint::Tcp(addr) => addr,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct SwarmService {
    #[serde(rename = "ID")]
    pub id: String,
    pub version: SwarmVersion,
    pub spec: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct SwarmVersion {
    #[serde(default)]
    pub index: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct SwarmTask {
    #[serde(default)]
    pub desired_state: String,
    pub status: Option<SwarmTaskStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct SwarmTaskStatus {
    #[serde(default)]
    pub state: String,
}

/// Counts tasks that are running and not being shut down.
pub(crate) fn count_running(tasks: &[SwarmTask]) -> usize {
    tasks
        .iter()
        .filter(|t| {
            t.desired_state == TASK_STATE_RUNNING
                && t.status.as_ref().is_some_and(|s| s.state == TASK_STATE_RUNNING)
        })
        .count()
}

/// Builds a descriptor from a service object returned by the engine.
pub(crate) fn describe(service: &SwarmService, running_count: usize) -> ServiceDescriptor {
    let mode = &service.spec["Mode"];
    let (mode, desired_replicas) = if mode.get("Replicated").is_some() {
        (
            ServiceMode::Replicated,
            mode["Replicated"]["Replicas"].as_u64().unwrap_or(0),
        )
    } else {
        (ServiceMode::Global, 0)
    };

    ServiceDescriptor {
        id: service.id.clone(),
        name: service.spec["Name"].as_str().unwrap_or_default().to_string(),
        mode,
        desired_replicas,
        running_count,
        version: service.version.index,
    }
}

/// Returns the spec with its replica count replaced.
pub(crate) fn with_replicas(mut spec: Value, replicas: u64) -> Result<Value, ScaleError> {
    let name = spec_name(&spec);
    let replicated = spec
        .get_mut("Mode")
        .and_then(|m| m.get_mut("Replicated"))
        .and_then(Value::as_object_mut)
        .ok_or(ScaleError::InvalidMode(name))?;
    replicated.insert("Replicas".to_string(), Value::from(replicas));
    Ok(spec)
}

fn spec_name(spec: &Value) -> String {
    spec["Name"].as_str().unwrap_or_default().to_string()
}

/// Extracts the `message` field of an engine error body.
pub(crate) fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| String::from_utf8_lossy(body).trim().to_string())
}

/// Maps a failed update response onto the scaling error kinds.
pub(crate) fn update_error(status: StatusCode, body: &[u8], name: String) -> ScaleError {
    let message = error_message(body);
    if status == StatusCode::NOT_FOUND {
        ScaleError::NotFound(name)
    } else if status == StatusCode::CONFLICT || message.contains("out of sequence") {
        ScaleError::Conflict(name)
    } else {
        ScaleError::orchestrator(anyhow!("update service {name}: status {status}: {message}"))
    }
}

/// Docker Swarm orchestrator client.
pub struct DockerOrchestrator {
    endpoint: Endpoint,
    call_timeout: Duration,
}

impl DockerOrchestrator {
    pub fn new(endpoint: Endpoint, call_timeout: Duration) -> Self {
        Self {
            endpoint,
            call_timeout: if call_timeout.is_zero() {
                DEFAULT_CALL_TIMEOUT
            } else {
                call_timeout
            },
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
    ) -> Result<(StatusCode, Bytes), ScaleError> {
        let req = Request::builder()
            .method(method.clone())
            .uri(path)
            .header(header::HOST, self.endpoint.host_header())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Full::new(body.unwrap_or_default()))
            .map_err(ScaleError::orchestrator)?;

        let exchange = async {
            match &self.endpoint {
                Endpoint::Tcp(addr) => {
                    let stream = TcpStream::connect(addr)
                        .await
                        .with_context(|| format!("connect to docker at {addr}"))?;
                    roundtrip(TokioIo::new(stream), req).await
                }
                #[cfg(unix)]
                Endpoint::Unix(path) => {
                    let stream = tokio::net::UnixStream::connect(path)
                        .await
                        .with_context(|| format!("connect to docker socket {}", path.display()))?;
                    roundtrip(TokioIo::new(stream), req).await
                }
                #[cfg(not(unix))]
                Endpoint::Unix(path) => Err(anyhow!(
                    "unix sockets are not supported on this platform ({})",
                    path.display()
                )),
            }
        };

        match timeout(self.call_timeout, exchange).await {
            Ok(Ok(resp)) => {
                debug!(
                    component = "docker",
                    event = "api_call",
                    method = %method,
                    path = path,
                    status = resp.0.as_u16(),
                    "docker api call"
                );
                Ok(resp)
            }
            Ok(Err(err)) => Err(ScaleError::Orchestrator(err)),
            Err(_) => Err(ScaleError::orchestrator(anyhow!(
                "docker api call {method} {path} timed out after {:?}",
                self.call_timeout
            ))),
        }
    }

    async fn get_json<T>(&self, path: &str) -> Result<(StatusCode, Option<T>), ScaleError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let (status, body) = self.call(Method::GET, path, None).await?;
        if !status.is_success() {
            return Ok((status, None));
        }
        let parsed = serde_json::from_slice(&body)
            .with_context(|| format!("decode docker response of {path}"))
            .map_err(ScaleError::Orchestrator)?;
        Ok((status, Some(parsed)))
    }

    async fn inspect(&self, service_id: &str) -> Result<SwarmService, ScaleError> {
        let path = format!("/services/{}", urlencoding::encode(service_id));
        match self.get_json::<SwarmService>(&path).await? {
            (_, Some(service)) => Ok(service),
            (status, None) if status == StatusCode::NOT_FOUND => {
                Err(ScaleError::NotFound(service_id.to_string()))
            }
            (status, None) => Err(ScaleError::orchestrator(anyhow!(
                "inspect service {service_id}: unexpected status {status}"
            ))),
        }
    }
}

async fn roundtrip<T>(io: T, req: Request<Full<Bytes>>) -> anyhow::Result<(StatusCode, Bytes)>
where
    T: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .context("docker api handshake")?;
    tokio::task::spawn(async move {
        if let Err(err) = conn.await {
            debug!(component = "docker", event = "conn_closed", error = %err, "connection error");
        }
    });

    let resp = sender.send_request(req).await.context("send docker api request")?;
    let status = resp.status();
    let body = resp
        .into_body()
        .collect()
        .await
        .context("read docker api response")?
        .to_bytes();
    Ok((status, body))
}

#[async_trait::async_trait]
impl Orchestrator for DockerOrchestrator {
    async fn describe_service(&self, name: &str) -> Result<ServiceDescriptor, ScaleError> {
        let filters = serde_json::json!({ "name": [name] }).to_string();
        let path = format!("/services?filters={}", urlencoding::encode(&filters));
        let services = match self.get_json::<Vec<SwarmService>>(&path).await? {
            (_, Some(services)) => services,
            (status, None) => {
                return Err(ScaleError::orchestrator(anyhow!(
                    "list services: unexpected status {status}"
                )))
            }
        };

        // The name filter matches prefixes, keep the exact one.
        let service = services
            .into_iter()
            .find(|s| s.spec["Name"].as_str() == Some(name))
            .ok_or_else(|| ScaleError::NotFound(name.to_string()))?;

        let running = self.list_running_tasks(&service.id).await?;
        Ok(describe(&service, running))
    }

    async fn list_running_tasks(&self, service_id: &str) -> Result<usize, ScaleError> {
        let filters = serde_json::json!({ "service": [service_id] }).to_string();
        let path = format!("/tasks?filters={}", urlencoding::encode(&filters));
        match self.get_json::<Vec<SwarmTask>>(&path).await? {
            (_, Some(tasks)) => Ok(count_running(&tasks)),
            (status, None) if status == StatusCode::NOT_FOUND => {
                Err(ScaleError::NotFound(service_id.to_string()))
            }
            (status, None) => Err(ScaleError::orchestrator(anyhow!(
                "list tasks of {service_id}: unexpected status {status}"
            ))),
        }
    }

    async fn update_replicas(
        &self,
        service_id: &str,
        version: u64,
        desired: u64,
    ) -> Result<(), ScaleError> {
        let current = self.inspect(service_id).await?;
        if current.version.index != version {
            return Err(ScaleError::Conflict(spec_name(&current.spec)));
        }
        let name = spec_name(&current.spec);
        let spec = with_replicas(current.spec, desired)?;
        let body = serde_json::to_vec(&spec).map_err(ScaleError::orchestrator)?;

        let path = format!(
            "/services/{}/update?version={}",
            urlencoding::encode(service_id),
            version
        );
        let (status, body) = self.call(Method::POST, &path, Some(Bytes::from(body))).await?;
        if status.is_success() {
            return Ok(());
        }

        Err(update_error(status, &body, name))
    }
}
