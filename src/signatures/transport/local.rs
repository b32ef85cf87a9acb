//! PKCS#12 bundle transport.

use super::SignatureTransport;
use crate::config::LocalConfig;
use crate::error::{Error, Result};
use crate::signatures::cms::CmsBuilder;
use der::Decode;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::Id;
use pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1v15::SigningKey;
use rsa::RsaPrivateKey;
use sha2::Sha256;
use signature::{SignatureEncoding, Signer};
use std::borrow::Cow;
use x509_cert::Certificate;

const BACKEND: &str = "local";

/// Key material unpacked from a bundle.
struct SigningMaterial {
    key: RsaPrivateKey,
    certificate: Certificate,
    chain: Vec<Certificate>,
}

/// Signs with an RSA key from a PKCS#12 bundle.
///
/// The bundle is read and unpacked on every call, so a rotated file is
/// picked up without restarting.
#[derive(Debug, Clone)]
pub struct LocalCertificateTransport {
    config: LocalConfig,
}

impl LocalCertificateTransport {
    /// Create a transport from local settings.
    pub fn new(config: LocalConfig) -> Self {
        Self { config }
    }

    fn read_bundle(&self) -> Result<Cow<'_, [u8]>> {
        if let Some(contents) = &self.config.file_contents {
            return Ok(Cow::Borrowed(contents));
        }

        let path = self.config.resolved_path();
        log::debug!("Reading signing bundle from {}", path.display());
        std::fs::read(&path)
            .map(Cow::Owned)
            .map_err(|e| Error::backend(BACKEND, format!("failed to read {}: {}", path.display(), e)))
    }

    fn load_material(&self) -> Result<SigningMaterial> {
        let bundle = self.read_bundle()?;
        let passphrase = self.config.passphrase.as_deref().unwrap_or("");

        let parsed = Pkcs12::from_der(&bundle)
            .and_then(|p12| p12.parse2(passphrase))
            .map_err(|e| Error::backend(BACKEND, format!("failed to unpack PKCS#12 bundle: {}", e)))?;

        let pkey = parsed
            .pkey
            .ok_or_else(|| Error::backend(BACKEND, "PKCS#12 bundle has no private key"))?;
        if pkey.id() != Id::RSA {
            return Err(Error::backend(
                BACKEND,
                format!("unsupported key type {:?}, only RSA keys can sign", pkey.id()),
            ));
        }
        let pkcs1 = pkey
            .rsa()
            .and_then(|rsa| rsa.private_key_to_der())
            .map_err(|e| Error::backend(BACKEND, format!("failed to export private key: {}", e)))?;
        let key = RsaPrivateKey::from_pkcs1_der(&pkcs1)
            .map_err(|e| Error::backend(BACKEND, format!("invalid RSA private key: {}", e)))?;

        let cert = parsed
            .cert
            .ok_or_else(|| Error::backend(BACKEND, "PKCS#12 bundle has no certificate"))?;
        let certificate = to_certificate(&cert)?;

        let mut chain = Vec::new();
        if let Some(ca) = parsed.ca {
            for extra in ca.iter() {
                chain.push(to_certificate(extra)?);
            }
        }

        Ok(SigningMaterial {
            key,
            certificate,
            chain,
        })
    }
}

fn to_certificate(cert: &openssl::x509::X509Ref) -> Result<Certificate> {
    let der = cert
        .to_der()
        .map_err(|e| Error::backend(BACKEND, format!("failed to encode certificate: {}", e)))?;
    Certificate::from_der(&der).map_err(|e| Error::backend(BACKEND, format!("invalid certificate: {}", e)))
}

impl SignatureTransport for LocalCertificateTransport {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn sign(&self, content: &[u8]) -> Result<Vec<u8>> {
        let material = self.load_material()?;
        let signing_key = SigningKey::<Sha256>::new(material.key);

        let cms = CmsBuilder::new(BACKEND, material.certificate)
            .with_chain(material.chain)
            .build(content, |attrs| {
                signing_key
                    .try_sign(attrs)
                    .map(|sig| sig.to_vec())
                    .map_err(|e| Error::backend(BACKEND, format!("RSA signing failed: {}", e)))
            })?;

        log::info!("Signed {} bytes with local certificate", content.len());
        Ok(cms)
    }
}
