//! Google Cloud KMS transport.
//!
//! The private key never leaves KMS: the transport builds the CMS signed
//! attributes locally, hashes them and asks KMS to sign the digest via
//! `asymmetricSign`. Exactly one request per call; retries are up to the
//! caller (see [`Error::is_retryable`]).

use super::SignatureTransport;
use crate::config::GcloudHsmConfig;
use crate::error::{Error, Result};
use crate::signatures::cms::{parse_certificates, CmsBuilder};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::fmt;
use x509_cert::Certificate;

const BACKEND: &str = "gcloud-hsm";

const METADATA_TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

#[derive(Debug, Serialize)]
struct AsymmetricSignRequest {
    digest: DigestPayload,
}

#[derive(Debug, Serialize)]
struct DigestPayload {
    sha256: String,
}

#[derive(Debug, Deserialize)]
struct AsymmetricSignResponse {
    signature: String,
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
}

/// Signs through a Cloud KMS asymmetric RSA key.
pub struct CloudHsmTransport {
    config: GcloudHsmConfig,
    client: Client,
}

impl fmt::Debug for CloudHsmTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudHsmTransport").field("config", &self.config).finish_non_exhaustive()
    }
}

impl CloudHsmTransport {
    /// Create a transport. Nothing is fetched until the first call.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if no key path is configured.
    pub fn new(config: GcloudHsmConfig) -> Result<Self> {
        if config.key_path.as_deref().map_or(true, str::is_empty) {
            return Err(Error::Config(format!("{} transport requires a KMS key path", BACKEND)));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::backend(BACKEND, format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn key_path(&self) -> &str {
        self.config.key_path.as_deref().unwrap_or_default().trim_start_matches('/')
    }

    fn load_certificates(&self) -> Result<Vec<Certificate>> {
        let bytes = match &self.config.certificate_contents {
            Some(contents) => Cow::Borrowed(contents.as_slice()),
            None => {
                let path = self
                    .config
                    .certificate_path
                    .as_ref()
                    .ok_or_else(|| Error::Config(format!("{} transport requires a public certificate", BACKEND)))?;
                let data = std::fs::read(path)
                    .map_err(|e| Error::backend(BACKEND, format!("failed to read {}: {}", path.display(), e)))?;
                Cow::Owned(data)
            },
        };
        parse_certificates(&bytes).map_err(|reason| Error::backend(BACKEND, reason))
    }

    fn access_token(&self) -> Result<Cow<'_, str>> {
        if let Some(token) = &self.config.access_token {
            return Ok(Cow::Borrowed(token));
        }

        let url = format!("http://{}{}", self.config.metadata_host.trim_end_matches('/'), METADATA_TOKEN_PATH);
        log::debug!("Fetching access token from metadata server");
        let response = self
            .client
            .get(url)
            .header("Metadata-Flavor", "Google")
            .send()
            .map_err(request_error)?;
        let response = check_status(response, "metadata token")?;
        let token: MetadataToken = parse_body(response, "metadata token")?;
        Ok(Cow::Owned(token.access_token))
    }

    /// Ask KMS to sign a SHA-256 digest.
    fn sign_digest(&self, digest: &[u8]) -> Result<Vec<u8>> {
        let token = self.access_token()?;
        let url = format!(
            "{}/v1/{}:asymmetricSign",
            self.config.endpoint.trim_end_matches('/'),
            self.key_path()
        );
        let payload = AsymmetricSignRequest {
            digest: DigestPayload {
                sha256: BASE64.encode(digest),
            },
        };

        log::debug!("Requesting KMS signature from {}", self.key_path());
        let response = self
            .client
            .post(url)
            .bearer_auth(token.as_ref())
            .json(&payload)
            .send()
            .map_err(request_error)?;
        let response = check_status(response, "asymmetricSign")?;

        let body: AsymmetricSignResponse = parse_body(response, "asymmetricSign")?;
        BASE64
            .decode(body.signature)
            .map_err(|e| Error::backend(BACKEND, format!("signature is not valid base64: {}", e)))
    }
}

fn request_error(error: reqwest::Error) -> Error {
    if error.is_connect() || error.is_timeout() {
        Error::transient(BACKEND, format!("request failed: {}", error))
    } else if error.is_request() || error.is_body() {
        Error::transient(BACKEND, format!("request interrupted: {}", error))
    } else {
        Error::backend(BACKEND, format!("request failed: {}", error))
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(response: Response, call: &str) -> Result<T> {
    let body = response.bytes().map_err(request_error)?;
    serde_json::from_slice(&body).map_err(|e| Error::backend(BACKEND, format!("malformed {} response: {}", call, e)))
}

fn check_status(response: Response, call: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .text()
        .unwrap_or_else(|_| "unable to read response body".to_string());
    let reason = format!("{} returned {}: {}", call, status, message.trim());
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(Error::transient(BACKEND, reason))
    } else {
        Err(Error::backend(BACKEND, reason))
    }
}

impl SignatureTransport for CloudHsmTransport {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn sign(&self, content: &[u8]) -> Result<Vec<u8>> {
        let mut certificates = self.load_certificates()?.into_iter();
        let certificate = certificates
            .next()
            .ok_or_else(|| Error::backend(BACKEND, "no public certificate"))?;

        let cms = CmsBuilder::new(BACKEND, certificate)
            .with_chain(certificates.collect())
            .build(content, |attrs| self.sign_digest(&Sha256::digest(attrs)))?;

        log::info!("Signed {} bytes with KMS key", content.len());
        Ok(cms)
    }
}
