//! Port reachability checks.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;
use tokio::net::{lookup_host, TcpStream, UdpSocket};

use crate::params::{optional_str, optional_timeout, require_port, require_str};
use crate::plugin::{
    CheckError, CheckOutcome, CheckPlugin, CheckTypeConfiguration, ExecutionContext,
    ParameterDefinition,
};

pub const PORT_CHECK: &str = "network_port_check";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Protocol {
    Tcp,
    Udp,
}

pub struct NetworkPlugin;

#[async_trait]
impl CheckPlugin for NetworkPlugin {
    fn id(&self) -> &str {
        "network"
    }

    fn name(&self) -> &str {
        "Network checks"
    }

    fn check_types(&self) -> Vec<CheckTypeConfiguration> {
        vec![CheckTypeConfiguration {
            check_type: PORT_CHECK.to_string(),
            name: "Port reachability".to_string(),
            description: "Verifies that a host accepts connections on a port".to_string(),
            target_type: "network_host".to_string(),
            parameters: vec![
                ParameterDefinition::required("host", "string", "Host name or IP address"),
                ParameterDefinition::required("port", "integer", "Port number"),
                ParameterDefinition::optional(
                    "protocol",
                    "string",
                    Some(json!("tcp")),
                    "tcp or udp",
                ),
                ParameterDefinition::optional(
                    "timeout_secs",
                    "integer",
                    Some(json!(DEFAULT_TIMEOUT.as_secs())),
                    "Connect timeout, at most 10 seconds",
                ),
            ],
        }]
    }

    async fn execute_check(&self, ctx: &ExecutionContext, check_type: &str) -> CheckOutcome {
        if check_type != PORT_CHECK {
            return CheckOutcome::error(CheckError::UnsupportedCheckType(check_type.to_string()));
        }
        let target = match PortTarget::from_context(ctx) {
            Ok(target) => target,
            Err(e) => return CheckOutcome::error(e),
        };
        target.probe().await
    }
}

#[derive(Debug)]
struct PortTarget {
    host: String,
    port: u16,
    protocol: Protocol,
    timeout: Duration,
}

impl PortTarget {
    fn from_context(ctx: &ExecutionContext) -> Result<Self, CheckError> {
        let host = require_str(ctx, "host")?.to_string();
        let port = require_port(ctx, "port")?;
        let protocol = match optional_str(ctx, "protocol")?.map(str::to_ascii_lowercase).as_deref() {
            None | Some("tcp") => Protocol::Tcp,
            Some("udp") => Protocol::Udp,
            Some(other) => {
                return Err(CheckError::invalid_parameter(
                    "protocol",
                    format!("expected tcp or udp, got {other}"),
                ))
            }
        };
        let timeout = optional_timeout(ctx, "timeout_secs", DEFAULT_TIMEOUT, MAX_TIMEOUT)?;
        Ok(Self {
            host,
            port,
            protocol,
            timeout: ctx.budget(timeout),
        })
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    async fn probe(&self) -> CheckOutcome {
        let started = Instant::now();
        let result = match self.protocol {
            Protocol::Tcp => self.dial_tcp().await,
            Protocol::Udp => self.dial_udp().await,
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let protocol = match self.protocol {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        };

        match result {
            Ok(()) => {
                tracing::debug!(address = %self.address(), protocol, "Port reachable");
                CheckOutcome::success(json!({
                    "host": self.host,
                    "port": self.port,
                    "protocol": protocol,
                    "reachable": true,
                    "elapsed_ms": elapsed_ms,
                }))
            }
            Err(e) => CheckOutcome::failed(json!({
                "host": self.host,
                "port": self.port,
                "protocol": protocol,
                "reachable": false,
                "elapsed_ms": elapsed_ms,
                "error": e.to_string(),
            }))
            .with_error(e),
        }
    }

    async fn dial_tcp(&self) -> Result<(), CheckError> {
        match tokio::time::timeout(self.timeout, TcpStream::connect(self.address())).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(CheckError::Transport(format!(
                "connect to {} failed: {e}",
                self.address()
            ))),
            Err(_) => Err(CheckError::Timeout(self.timeout)),
        }
    }

    /// UDP is connectionless; this only proves the name resolves and a
    /// route to it exists.
    async fn dial_udp(&self) -> Result<(), CheckError> {
        let address = self.address();
        let attempt = async {
            let remote = lookup_host(&address)
                .await?
                .next()
                .ok_or_else(|| std::io::Error::other("no addresses resolved"))?;
            let local = if remote.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
            let socket = UdpSocket::bind(local).await?;
            socket.connect(remote).await
        };
        match tokio::time::timeout(self.timeout, attempt).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(CheckError::Transport(format!("udp {address} failed: {e}"))),
            Err(_) => Err(CheckError::Timeout(self.timeout)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
