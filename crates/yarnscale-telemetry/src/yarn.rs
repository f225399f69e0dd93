//! YARN ResourceManager REST client.
//!
//! Reads the cluster-wide counters from `/ws/v1/cluster/metrics` and the
//! per-node utilisation from `/ws/v1/cluster/nodes`. Each request opens a
//! fresh HTTP/1.1 connection and is bounded by the client's timeout.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use yarnscale_core::{BoxFuture, Counter, TelemetrySource};

const METRICS_PATH: &str = "/ws/v1/cluster/metrics";
const NODES_PATH: &str = "/ws/v1/cluster/nodes";

/// Errors returned by the ResourceManager client.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid resource manager url '{0}'")]
    Url(String),

    #[error("connection to {address} failed: {reason}")]
    Connect { address: String, reason: String },

    #[error("http error on {uri}: {reason}")]
    Http { uri: String, reason: String },

    #[error("{uri} returned status {status}")]
    Status { uri: String, status: u16 },

    #[error("request to {0} timed out")]
    Timeout(String),

    #[error("malformed response: {0}")]
    Parse(String),

    #[error("counter '{0}' missing from cluster metrics")]
    MissingCounter(&'static str),
}

/// Snapshot of `clusterMetrics`, kept as raw JSON fields.
#[derive(Debug, Clone)]
pub struct ClusterMetrics {
    fields: Map<String, Value>,
}

impl ClusterMetrics {
    /// Parse the body of `/ws/v1/cluster/metrics`.
    pub fn parse(body: &[u8]) -> Result<Self, TelemetryError> {
        #[derive(Deserialize)]
        struct Envelope {
            #[serde(rename = "clusterMetrics")]
            cluster_metrics: Map<String, Value>,
        }

        let envelope: Envelope =
            serde_json::from_slice(body).map_err(|e| TelemetryError::Parse(e.to_string()))?;
        Ok(Self {
            fields: envelope.cluster_metrics,
        })
    }

    pub fn get(&self, counter: Counter) -> Result<f64, TelemetryError> {
        self.fields
            .get(counter.field())
            .and_then(Value::as_f64)
            .ok_or(TelemetryError::MissingCounter(counter.field()))
    }
}

#[derive(Debug, Deserialize)]
struct NodesEnvelope {
    nodes: Option<NodeList>,
}

#[derive(Debug, Deserialize)]
struct NodeList {
    #[serde(default)]
    node: Vec<NodeReport>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeReport {
    #[serde(default)]
    state: String,
    #[serde(default)]
    used_virtual_cores: f64,
    #[serde(default)]
    available_virtual_cores: f64,
    resource_utilization: Option<NodeUtilization>,
}

impl NodeReport {
    /// CPU load in percent of the node's vcore capacity.
    ///
    /// `nodeCPUUsage` counts vcores in use, so it is divided by the node's
    /// vcores. `None` without utilisation or a known capacity.
    fn cpu_load(&self) -> Option<f64> {
        let usage = self.resource_utilization.as_ref()?.node_cpu_usage;
        let vcores = self.used_virtual_cores + self.available_virtual_cores;
        if !usage.is_finite() || vcores <= 0.0 {
            return None;
        }
        Some((usage / vcores * 100.0).clamp(0.0, 100.0))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NodeUtilization {
    #[serde(rename = "nodeCPUUsage")]
    node_cpu_usage: f64,
}

/// Mean CPU load in percent over RUNNING nodes reporting utilisation.
///
/// `None` when no running node reports it together with its vcores.
pub fn parse_node_cpu_load(body: &[u8]) -> Result<Option<f64>, TelemetryError> {
    let envelope: NodesEnvelope =
        serde_json::from_slice(body).map_err(|e| TelemetryError::Parse(e.to_string()))?;
    let loads: Vec<f64> = envelope
        .nodes
        .map(|list| list.node)
        .unwrap_or_default()
        .into_iter()
        .filter(|n| n.state == "RUNNING")
        .filter_map(|n| n.cpu_load())
        .collect();

    if loads.is_empty() {
        return Ok(None);
    }
    Ok(Some(loads.iter().sum::<f64>() / loads.len() as f64))
}

/// HTTP client for one ResourceManager.
#[derive(Debug, Clone)]
pub struct YarnClient {
    /// `host:port` of the ResourceManager.
    address: String,
    timeout: Duration,
}

impl YarnClient {
    /// Create a client for a base url such as `http://rm-host:8088`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TelemetryError> {
        let uri: http::Uri = base_url
            .parse()
            .map_err(|_| TelemetryError::Url(base_url.to_string()))?;
        if uri.scheme_str().is_some_and(|s| s != "http") {
            return Err(TelemetryError::Url(base_url.to_string()));
        }
        let authority = uri
            .authority()
            .ok_or_else(|| TelemetryError::Url(base_url.to_string()))?;
        let address = match authority.port_u16() {
            Some(_) => authority.as_str().to_string(),
            None => format!("{}:80", authority.host()),
        };
        Ok(Self { address, timeout })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Fetch and parse the cluster-wide counters.
    pub async fn cluster_metrics(&self) -> Result<ClusterMetrics, TelemetryError> {
        let body = self.get(METRICS_PATH).await?;
        ClusterMetrics::parse(&body)
    }

    /// Fetch the node list and compute the mean running-node CPU load.
    pub async fn node_cpu_load(&self) -> Result<Option<f64>, TelemetryError> {
        let body = self.get(NODES_PATH).await?;
        parse_node_cpu_load(&body)
    }

    async fn get(&self, path: &str) -> Result<Bytes, TelemetryError> {
        let uri = format!("http://{}{path}", self.address);
        match tokio::time::timeout(self.timeout, self.fetch(&uri)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(%uri, "resource manager request timed out");
                Err(TelemetryError::Timeout(uri))
            }
        }
    }

    async fn fetch(&self, uri: &str) -> Result<Bytes, TelemetryError> {
        let stream = tokio::net::TcpStream::connect(&self.address)
            .await
            .map_err(|e| TelemetryError::Connect {
                address: self.address.clone(),
                reason: e.to_string(),
            })?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| http_error(uri, e))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(uri)
            .header("host", &self.address)
            .header("accept", "application/json")
            .header("user-agent", "yarnscale/0.1")
            .body(Empty::<Bytes>::new())
            .map_err(|e| http_error(uri, e))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| http_error(uri, e))?;
        if !resp.status().is_success() {
            debug!(status = %resp.status(), %uri, "resource manager non-2xx");
            return Err(TelemetryError::Status {
                uri: uri.to_string(),
                status: resp.status().as_u16(),
            });
        }

        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| http_error(uri, e))?
            .to_bytes();
        debug!(%uri, bytes = body.len(), "resource manager response");
        Ok(body)
    }
}

fn http_error(uri: &str, e: impl std::fmt::Display) -> TelemetryError {
    TelemetryError::Http {
        uri: uri.to_string(),
        reason: e.to_string(),
    }
}

impl TelemetrySource for YarnClient {
    fn counter(&self, counter: Counter) -> BoxFuture<'_, f64> {
        Box::pin(async move { Ok(self.cluster_metrics().await?.get(counter)?) })
    }

    fn counters<'a>(&'a self, counters: &'a [Counter]) -> BoxFuture<'a, Vec<f64>> {
        Box::pin(async move {
            let metrics = self.cluster_metrics().await?;
            let values = counters
                .iter()
                .map(|&c| metrics.get(c))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(values)
        })
    }

    fn task_node_cpu_load(&self) -> BoxFuture<'_, Option<f64>> {
        Box::pin(async move { Ok(self.node_cpu_load().await?) })
    }
}
