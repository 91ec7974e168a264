//! TLS certificate expiry check.
//!
//! The handshake accepts any certificate chain: the point is to read the
//! leaf certificate, including one that is already expired or self-signed.
//! Nothing is sent over the connection after the handshake.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use serde_json::json;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use vigil_core::check_status::CheckStatus;

use crate::params::{optional_str, optional_u64, require_port, require_str};
use crate::plugin::{
    CheckError, CheckOutcome, CheckPlugin, CheckTypeConfiguration, ExecutionContext,
    ParameterDefinition,
};

pub const CERTIFICATE_EXPIRY: &str = "tls_certificate_expiry";

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_PORT: u16 = 443;
const DEFAULT_WARNING_DAYS: u64 = 30;

pub struct TlsPlugin;

#[async_trait]
impl CheckPlugin for TlsPlugin {
    fn id(&self) -> &str {
        "tls"
    }

    fn name(&self) -> &str {
        "TLS checks"
    }

    fn check_types(&self) -> Vec<CheckTypeConfiguration> {
        vec![CheckTypeConfiguration {
            check_type: CERTIFICATE_EXPIRY.to_string(),
            name: "Certificate expiry".to_string(),
            description: "Fails when the served certificate is expired or expires soon"
                .to_string(),
            target_type: "network_host".to_string(),
            parameters: vec![
                ParameterDefinition::required("host", "string", "Host name to connect to"),
                ParameterDefinition::optional("port", "integer", Some(json!(DEFAULT_PORT)), "TLS port"),
                ParameterDefinition::optional(
                    "warning_days",
                    "integer",
                    Some(json!(DEFAULT_WARNING_DAYS)),
                    "Fail when fewer days than this remain",
                ),
                ParameterDefinition::optional(
                    "server_name",
                    "string",
                    None,
                    "SNI name, if different from host",
                ),
            ],
        }]
    }

    async fn execute_check(&self, ctx: &ExecutionContext, check_type: &str) -> CheckOutcome {
        if check_type != CERTIFICATE_EXPIRY {
            return CheckOutcome::error(CheckError::UnsupportedCheckType(check_type.to_string()));
        }
        let request = match ExpiryRequest::from_context(ctx) {
            Ok(request) => request,
            Err(e) => return CheckOutcome::error(e),
        };

        match fetch_leaf_certificate(&request, ctx.budget(HANDSHAKE_TIMEOUT)).await {
            Ok(facts) => assess(&facts, Utc::now(), request.warning_days),
            Err(e @ (CheckError::Transport(_) | CheckError::Timeout(_))) => {
                CheckOutcome::failed(json!({
                    "host": request.host,
                    "port": request.port,
                    "error": e.to_string(),
                }))
                .with_error(e)
            }
            Err(e) => CheckOutcome::error(e),
        }
    }
}

#[derive(Debug)]
struct ExpiryRequest {
    host: String,
    port: u16,
    server_name: ServerName<'static>,
    warning_days: i64,
}

impl ExpiryRequest {
    fn from_context(ctx: &ExecutionContext) -> Result<Self, CheckError> {
        let host = require_str(ctx, "host")?.to_string();
        let port = match ctx.lookup("port") {
            Some(_) => require_port(ctx, "port")?,
            None => DEFAULT_PORT,
        };
        let sni = optional_str(ctx, "server_name")?.unwrap_or(&host).to_string();
        let server_name = ServerName::try_from(sni.clone()).map_err(|e| {
            CheckError::invalid_parameter("server_name", format!("{sni}: {e}"))
        })?;
        let warning_days = optional_u64(ctx, "warning_days")?.unwrap_or(DEFAULT_WARNING_DAYS);
        Ok(Self {
            host,
            port,
            server_name,
            warning_days: i64::try_from(warning_days)
                .map_err(|_| CheckError::invalid_parameter("warning_days", "out of range"))?,
        })
    }
}

/// What the leaf certificate says about itself.
#[derive(Debug, Clone)]
pub struct CertificateFacts {
    pub subject: String,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

/// Grade a certificate against `now`.
///
/// Expired, or `days_left <= warning_days`, is `Failed`.
pub fn assess(facts: &CertificateFacts, now: DateTime<Utc>, warning_days: i64) -> CheckOutcome {
    let days_left = (facts.not_after - now).num_days();
    let expired = facts.not_after <= now;
    let expiring_soon = !expired && days_left <= warning_days;
    let status = if expired || expiring_soon {
        CheckStatus::Failed
    } else {
        CheckStatus::Success
    };

    CheckOutcome::new(
        status,
        &json!({
            "subject": facts.subject,
            "issuer": facts.issuer,
            "not_before": facts.not_before.to_rfc3339(),
            "not_after": facts.not_after.to_rfc3339(),
            "days_left": days_left,
            "warning_days": warning_days,
            "expiring_soon": expiring_soon,
            "expired": expired,
        }),
    )
}

async fn fetch_leaf_certificate(
    request: &ExpiryRequest,
    timeout: Duration,
) -> Result<CertificateFacts, CheckError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| CheckError::Internal(format!("TLS setup failed: {e}")))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));

    let server_name = request.server_name.clone();
    let address = format!("{}:{}", request.host, request.port);

    let handshake = async {
        let tcp = TcpStream::connect(&address).await?;
        connector.connect(server_name, tcp).await
    };
    let stream = match tokio::time::timeout(timeout, handshake).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            return Err(CheckError::Transport(format!(
                "TLS handshake with {address} failed: {e}"
            )))
        }
        Err(_) => return Err(CheckError::Timeout(timeout)),
    };

    let (_, connection) = stream.get_ref();
    let leaf = connection
        .peer_certificates()
        .and_then(|chain| chain.first())
        .ok_or_else(|| CheckError::Transport(format!("{address} presented no certificate")))?;
    parse_certificate(leaf.as_ref())
}

fn parse_certificate(der: &[u8]) -> Result<CertificateFacts, CheckError> {
    let (_, cert) = x509_parser::parse_x509_certificate(der)
        .map_err(|e| CheckError::Internal(format!("unparseable certificate: {e}")))?;
    let validity = cert.validity();
    let timestamp = |seconds: i64| {
        DateTime::from_timestamp(seconds, 0)
            .ok_or_else(|| CheckError::Internal(format!("certificate date out of range: {seconds}")))
    };
    Ok(CertificateFacts {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        not_before: timestamp(validity.not_before.timestamp())?,
        not_after: timestamp(validity.not_after.timestamp())?,
    })
}

/// Skips chain validation; handshake signatures are still verified.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
