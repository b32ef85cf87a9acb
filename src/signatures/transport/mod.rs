//! Signing transports.
//!
//! A transport turns the signed byte spans of a prepared PDF into a DER
//! detached CMS signature. The private key lives behind the transport:
//! either a PKCS#12 bundle read from disk/config ([`LocalCertificateTransport`])
//! or a Google Cloud KMS key ([`CloudHsmTransport`]).

mod local;

#[cfg(feature = "gcloud-hsm")]
mod gcloud_hsm;

#[cfg(feature = "gcloud-hsm")]
pub use gcloud_hsm::CloudHsmTransport;
pub use local::LocalCertificateTransport;

use crate::config::SigningConfig;
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// The signing capability.
pub trait SignatureTransport {
    /// Short backend identifier used in logs and errors.
    fn name(&self) -> &'static str;

    /// Produce a detached CMS signature (DER) over `content`.
    fn sign(&self, content: &[u8]) -> Result<Vec<u8>>;
}

impl<T: SignatureTransport + ?Sized> SignatureTransport for Box<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn sign(&self, content: &[u8]) -> Result<Vec<u8>> {
        (**self).sign(content)
    }
}

/// Known transport identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// `local`
    Local,
    /// `gcloud-hsm`
    GcloudHsm,
}

impl TransportKind {
    /// Configuration identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Local => "local",
            TransportKind::GcloudHsm => "gcloud-hsm",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" | "local" => Ok(TransportKind::Local),
            "gcloud-hsm" => Ok(TransportKind::GcloudHsm),
            other => Err(Error::UnsupportedTransport(other.to_string())),
        }
    }
}

/// A configured transport.
#[derive(Debug)]
pub enum Transport {
    /// PKCS#12 bundle
    Local(LocalCertificateTransport),
    /// Google Cloud KMS
    #[cfg(feature = "gcloud-hsm")]
    GcloudHsm(CloudHsmTransport),
}

impl Transport {
    /// Build the transport named by `config.transport`.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedTransport`] for an unknown identifier, or for
    /// `gcloud-hsm` when the crate is built without that feature.
    pub fn from_config(config: &SigningConfig) -> Result<Self> {
        let kind: TransportKind = config.transport.parse()?;
        log::debug!("Using signing transport '{}'", kind);

        match kind {
            TransportKind::Local => Ok(Transport::Local(LocalCertificateTransport::new(config.local.clone()))),
            #[cfg(feature = "gcloud-hsm")]
            TransportKind::GcloudHsm => Ok(Transport::GcloudHsm(CloudHsmTransport::new(config.gcloud_hsm.clone())?)),
            #[cfg(not(feature = "gcloud-hsm"))]
            TransportKind::GcloudHsm => Err(Error::UnsupportedTransport(format!(
                "{} (built without the gcloud-hsm feature)",
                kind
            ))),
        }
    }

    /// Which variant this is.
    pub fn kind(&self) -> TransportKind {
        match self {
            Transport::Local(_) => TransportKind::Local,
            #[cfg(feature = "gcloud-hsm")]
            Transport::GcloudHsm(_) => TransportKind::GcloudHsm,
        }
    }
}

impl SignatureTransport for Transport {
    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    fn sign(&self, content: &[u8]) -> Result<Vec<u8>> {
        match self {
            Transport::Local(transport) => transport.sign(content),
            #[cfg(feature = "gcloud-hsm")]
            Transport::GcloudHsm(transport) => transport.sign(content),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_kind_parse() {
        assert_eq!("local".parse::<TransportKind>().unwrap(), TransportKind::Local);
        assert_eq!("".parse::<TransportKind>().unwrap(), TransportKind::Local);
        assert_eq!(" gcloud-hsm ".parse::<TransportKind>().unwrap(), TransportKind::GcloudHsm);

        let err = "aws-kms".parse::<TransportKind>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedTransport(ref id) if id == "aws-kms"));
        assert_eq!(err.to_string(), "Unsupported signing transport: aws-kms");
    }

    #[test]
    fn test_transport_from_config() {
        let transport = Transport::from_config(&SigningConfig::new()).unwrap();
        assert_eq!(transport.kind(), TransportKind::Local);
        assert_eq!(transport.name(), "local");

        let err = Transport::from_config(&SigningConfig::new().with_transport("magic")).unwrap_err();
        assert!(matches!(err, Error::UnsupportedTransport(_)));
    }
}
