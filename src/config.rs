//! Signing configuration.
//!
//! Values come from the process environment (`NEXT_PRIVATE_SIGNING_*`) or
//! are set directly with the builder methods.

use crate::error::{Error, Result};
use crate::signatures::{DEFAULT_SIGNATURE_CAPACITY, MAX_SIGNATURE_CAPACITY};
use base64::Engine;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Transport selector.
pub const ENV_TRANSPORT: &str = "NEXT_PRIVATE_SIGNING_TRANSPORT";
/// Base64 PKCS#12 bundle.
pub const ENV_LOCAL_FILE_CONTENTS: &str = "NEXT_PRIVATE_SIGNING_LOCAL_FILE_CONTENTS";
/// PKCS#12 bundle path.
pub const ENV_LOCAL_FILE_PATH: &str = "NEXT_PRIVATE_SIGNING_LOCAL_FILE_PATH";
/// PKCS#12 passphrase.
pub const ENV_PASSPHRASE: &str = "NEXT_PRIVATE_SIGNING_PASSPHRASE";
/// Deployment environment; `production` changes the default bundle path.
pub const ENV_NODE_ENV: &str = "NODE_ENV";
/// KMS key version resource name.
pub const ENV_GCLOUD_HSM_KEY_PATH: &str = "NEXT_PRIVATE_SIGNING_GCLOUD_HSM_KEY_PATH";
/// Base64 public certificate for the KMS key.
pub const ENV_GCLOUD_HSM_CERT_CONTENTS: &str = "NEXT_PRIVATE_SIGNING_GCLOUD_HSM_PUBLIC_CRT_FILE_CONTENTS";
/// Public certificate path for the KMS key.
pub const ENV_GCLOUD_HSM_CERT_PATH: &str = "NEXT_PRIVATE_SIGNING_GCLOUD_HSM_PUBLIC_CRT_FILE_PATH";
/// Static bearer token for the KMS API.
pub const ENV_GCLOUD_ACCESS_TOKEN: &str = "NEXT_PRIVATE_SIGNING_GCLOUD_ACCESS_TOKEN";
/// KMS API base URL.
pub const ENV_GCLOUD_KMS_ENDPOINT: &str = "NEXT_PRIVATE_SIGNING_GCLOUD_KMS_ENDPOINT";
/// KMS request timeout in seconds.
pub const ENV_GCLOUD_TIMEOUT_SECS: &str = "NEXT_PRIVATE_SIGNING_GCLOUD_TIMEOUT_SECS";
/// Metadata server host override (same variable the Google client libraries read).
pub const ENV_GCE_METADATA_HOST: &str = "GCE_METADATA_HOST";
/// IANA zone for signer timestamps in the reason text.
pub const ENV_DISPLAY_TIMEZONE: &str = "NEXT_PRIVATE_SIGNING_DISPLAY_TIMEZONE";
/// Reserved raw signature bytes.
pub const ENV_SIGNATURE_CAPACITY: &str = "NEXT_PRIVATE_SIGNING_SIGNATURE_CAPACITY";

/// Default transport identifier.
pub const DEFAULT_TRANSPORT: &str = "local";
/// Bundle path used when `NODE_ENV=production` and no path is configured.
pub const PRODUCTION_CERT_PATH: &str = "/opt/documenso/cert.p12";
/// Bundle path used outside production when no path is configured.
pub const DEVELOPMENT_CERT_PATH: &str = "./example/cert.p12";
/// Default KMS API base URL.
pub const DEFAULT_KMS_ENDPOINT: &str = "https://cloudkms.googleapis.com";
/// Default metadata server host.
pub const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";
/// Default KMS request timeout.
pub const DEFAULT_KMS_TIMEOUT: Duration = Duration::from_secs(30);

/// Local PKCS#12 settings.
#[derive(Clone, Default)]
pub struct LocalConfig {
    /// Bundle bytes, preferred over `file_path`
    pub file_contents: Option<Vec<u8>>,
    /// Bundle path
    pub file_path: Option<PathBuf>,
    /// Bundle passphrase; `None` means no passphrase
    pub passphrase: Option<String>,
    /// Whether the process runs in production (selects the default path)
    pub production: bool,
}

impl LocalConfig {
    /// Path the bundle is read from when no inline contents are set.
    pub fn resolved_path(&self) -> PathBuf {
        match &self.file_path {
            Some(path) => path.clone(),
            None if self.production => PathBuf::from(PRODUCTION_CERT_PATH),
            None => PathBuf::from(DEVELOPMENT_CERT_PATH),
        }
    }
}

impl fmt::Debug for LocalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalConfig")
            .field("file_contents", &self.file_contents.as_ref().map(|c| format!("<{} bytes>", c.len())))
            .field("file_path", &self.file_path)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("production", &self.production)
            .finish()
    }
}

/// Google Cloud KMS settings.
#[derive(Clone)]
pub struct GcloudHsmConfig {
    /// Key version resource name,
    /// `projects/../locations/../keyRings/../cryptoKeys/../cryptoKeyVersions/N`
    pub key_path: Option<String>,
    /// Public certificate bytes (PEM or DER), preferred over `certificate_path`
    pub certificate_contents: Option<Vec<u8>>,
    /// Public certificate path
    pub certificate_path: Option<PathBuf>,
    /// Static bearer token; fetched from the metadata server when unset
    pub access_token: Option<String>,
    /// KMS API base URL
    pub endpoint: String,
    /// Metadata server host (with optional port)
    pub metadata_host: String,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for GcloudHsmConfig {
    fn default() -> Self {
        Self {
            key_path: None,
            certificate_contents: None,
            certificate_path: None,
            access_token: None,
            endpoint: DEFAULT_KMS_ENDPOINT.to_string(),
            metadata_host: DEFAULT_METADATA_HOST.to_string(),
            timeout: DEFAULT_KMS_TIMEOUT,
        }
    }
}

impl fmt::Debug for GcloudHsmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcloudHsmConfig")
            .field("key_path", &self.key_path)
            .field(
                "certificate_contents",
                &self.certificate_contents.as_ref().map(|c| format!("<{} bytes>", c.len())),
            )
            .field("certificate_path", &self.certificate_path)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("metadata_host", &self.metadata_host)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Signing configuration.
#[derive(Debug, Clone)]
pub struct SigningConfig {
    /// Raw transport identifier, parsed when the transport is built
    pub transport: String,
    /// Local transport settings
    pub local: LocalConfig,
    /// Cloud HSM transport settings
    pub gcloud_hsm: GcloudHsmConfig,
    /// IANA zone for reason timestamps; UTC when unset
    pub display_timezone: Option<String>,
    /// Reserved raw signature bytes
    pub signature_capacity: usize,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl SigningConfig {
    /// Local transport, default capacity, UTC display zone.
    pub fn new() -> Self {
        Self {
            transport: DEFAULT_TRANSPORT.to_string(),
            local: LocalConfig::default(),
            gcloud_hsm: GcloudHsmConfig::default(),
            display_timezone: None,
            signature_capacity: DEFAULT_SIGNATURE_CAPACITY,
        }
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary variable source.
    ///
    /// Empty values count as unset.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] for invalid base64 or a malformed number.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::new();

        if let Some(transport) = get(ENV_TRANSPORT) {
            config.transport = transport.trim().to_string();
        }

        config.local = LocalConfig {
            file_contents: get(ENV_LOCAL_FILE_CONTENTS)
                .map(|v| decode_base64(ENV_LOCAL_FILE_CONTENTS, &v))
                .transpose()?,
            file_path: get(ENV_LOCAL_FILE_PATH).map(PathBuf::from),
            passphrase: get(ENV_PASSPHRASE),
            production: get(ENV_NODE_ENV).is_some_and(|v| v == "production"),
        };

        let gcloud = &mut config.gcloud_hsm;
        gcloud.key_path = get(ENV_GCLOUD_HSM_KEY_PATH);
        gcloud.certificate_contents = get(ENV_GCLOUD_HSM_CERT_CONTENTS)
            .map(|v| decode_base64(ENV_GCLOUD_HSM_CERT_CONTENTS, &v))
            .transpose()?;
        gcloud.certificate_path = get(ENV_GCLOUD_HSM_CERT_PATH).map(PathBuf::from);
        gcloud.access_token = get(ENV_GCLOUD_ACCESS_TOKEN);
        if let Some(endpoint) = get(ENV_GCLOUD_KMS_ENDPOINT) {
            gcloud.endpoint = endpoint.trim_end_matches('/').to_string();
        }
        if let Some(host) = get(ENV_GCE_METADATA_HOST) {
            gcloud.metadata_host = host;
        }
        if let Some(secs) = get(ENV_GCLOUD_TIMEOUT_SECS) {
            gcloud.timeout = Duration::from_secs(parse_number(ENV_GCLOUD_TIMEOUT_SECS, &secs)?);
        }

        config.display_timezone = get(ENV_DISPLAY_TIMEZONE);
        if let Some(capacity) = get(ENV_SIGNATURE_CAPACITY) {
            let capacity: usize = parse_number(ENV_SIGNATURE_CAPACITY, &capacity)?;
            if capacity == 0 || capacity > MAX_SIGNATURE_CAPACITY {
                return Err(Error::Config(format!(
                    "{} must be between 1 and {}, got {}",
                    ENV_SIGNATURE_CAPACITY, MAX_SIGNATURE_CAPACITY, capacity
                )));
            }
            config.signature_capacity = capacity;
        }

        log::debug!("Loaded signing configuration: transport={}", config.transport);
        Ok(config)
    }

    /// Set the transport identifier.
    pub fn with_transport(mut self, transport: impl Into<String>) -> Self {
        self.transport = transport.into();
        self
    }

    /// Use an in-memory PKCS#12 bundle.
    pub fn with_local_contents(mut self, contents: Vec<u8>) -> Self {
        self.local.file_contents = Some(contents);
        self
    }

    /// Read the PKCS#12 bundle from `path`.
    pub fn with_local_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local.file_path = Some(path.into());
        self
    }

    /// Set the PKCS#12 passphrase.
    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.local.passphrase = Some(passphrase.into());
        self
    }

    /// Replace the Cloud HSM settings.
    pub fn with_gcloud_hsm(mut self, gcloud_hsm: GcloudHsmConfig) -> Self {
        self.gcloud_hsm = gcloud_hsm;
        self
    }

    /// Set the display timezone.
    pub fn with_display_timezone(mut self, zone: impl Into<String>) -> Self {
        self.display_timezone = Some(zone.into());
        self
    }

    /// Set the reserved signature capacity in bytes.
    pub fn with_signature_capacity(mut self, capacity: usize) -> Self {
        self.signature_capacity = capacity;
        self
    }
}

fn decode_base64(key: &str, value: &str) -> Result<Vec<u8>> {
    let cleaned: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(cleaned)
        .map_err(|e| Error::Config(format!("{} is not valid base64: {}", key, e)))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a non-negative integer, got '{}'", key, value)))
}
