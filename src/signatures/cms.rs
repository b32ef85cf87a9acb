//! Detached CMS (PKCS#7) SignedData assembly.
//!
//! Both transports produce the same structure:
//!
//! ```text
//! ContentInfo { id-signedData, SignedData {
//!     version 1, digestAlgorithms { sha-256 },
//!     encapContentInfo { id-data } (detached),
//!     certificates [0] { signer, chain... },
//!     signerInfos { SignerInfo {
//!         issuerAndSerialNumber, sha-256,
//!         signedAttrs [0] { content-type, signing-time, message-digest },
//!         rsaEncryption, signature
//!     } } } }
//! ```
//!
//! The RSA signature covers the DER encoding of the signed attributes as a
//! SET; producing it is left to the caller so the private key can live
//! anywhere.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use cms::cert::{CertificateChoices, IssuerAndSerialNumber};
use cms::content_info::{CmsVersion, ContentInfo};
use cms::signed_data::{
    CertificateSet, EncapsulatedContentInfo, SignedAttributes, SignedData, SignerIdentifier, SignerInfo,
    SignerInfos,
};
use der::asn1::{ObjectIdentifier, OctetString, SetOfVec, UtcTime};
use der::{Any, Decode, Encode};
use sha2::{Digest, Sha256};
use spki::AlgorithmIdentifierOwned;
use std::time::Duration;
use x509_cert::attr::Attribute;
use x509_cert::Certificate;

/// id-data (1.2.840.113549.1.7.1)
pub const OID_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.1");
/// id-signedData (1.2.840.113549.1.7.2)
pub const OID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");
/// content-type attribute (1.2.840.113549.1.9.3)
pub const OID_CONTENT_TYPE: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.3");
/// message-digest attribute (1.2.840.113549.1.9.4)
pub const OID_MESSAGE_DIGEST: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");
/// signing-time attribute (1.2.840.113549.1.9.5)
pub const OID_SIGNING_TIME: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.5");
/// SHA-256 (2.16.840.1.101.3.4.2.1)
pub const OID_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");
/// rsaEncryption (1.2.840.113549.1.1.1)
pub const OID_RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

/// Parse one or more certificates from PEM or DER bytes.
///
/// The first certificate is the signer; any others form the chain.
pub fn parse_certificates(data: &[u8]) -> std::result::Result<Vec<Certificate>, String> {
    let trimmed = data.trim_ascii_start();
    let certs = if trimmed.starts_with(b"-----BEGIN") {
        Certificate::load_pem_chain(trimmed).map_err(|e| format!("invalid PEM certificate: {}", e))?
    } else {
        vec![Certificate::from_der(data).map_err(|e| format!("invalid DER certificate: {}", e))?]
    };
    if certs.is_empty() {
        return Err("no certificate found".to_string());
    }
    Ok(certs)
}

/// Builds detached CMS signatures for one signer certificate.
#[derive(Debug, Clone)]
pub struct CmsBuilder {
    backend: &'static str,
    certificate: Certificate,
    chain: Vec<Certificate>,
    signing_time: Option<DateTime<Utc>>,
}

impl CmsBuilder {
    /// Create a builder for `certificate`. `backend` labels errors.
    pub fn new(backend: &'static str, certificate: Certificate) -> Self {
        Self {
            backend,
            certificate,
            chain: Vec::new(),
            signing_time: None,
        }
    }

    /// Embed additional (intermediate) certificates.
    pub fn with_chain(mut self, chain: Vec<Certificate>) -> Self {
        self.chain = chain;
        self
    }

    /// Use a fixed signing-time attribute instead of the current time.
    pub fn with_signing_time(mut self, time: DateTime<Utc>) -> Self {
        self.signing_time = Some(time);
        self
    }

    /// Build the signed attributes for `content`.
    pub fn signed_attributes(&self, content: &[u8]) -> Result<SignedAttributes> {
        let digest = Sha256::digest(content);
        let signing_time = self.signing_time.unwrap_or_else(Utc::now);
        let seconds = u64::try_from(signing_time.timestamp())
            .map_err(|_| self.error(format!("signing time {} before 1970", signing_time)))?;
        let utc_time = UtcTime::from_unix_duration(Duration::from_secs(seconds)).map_err(|e| self.error(e))?;

        let content_type = self.attribute(OID_CONTENT_TYPE, Any::encode_from(&OID_DATA))?;
        let time = self.attribute(OID_SIGNING_TIME, Any::encode_from(&utc_time))?;
        let message_digest = self.attribute(
            OID_MESSAGE_DIGEST,
            OctetString::new(digest.to_vec()).and_then(|os| Any::encode_from(&os)),
        )?;

        SetOfVec::try_from(vec![content_type, time, message_digest]).map_err(|e| self.error(e))
    }

    /// Sign `content` and return the DER `ContentInfo`.
    ///
    /// `sign` receives the DER encoding of the signed attributes and must
    /// return an RSA PKCS#1 v1.5 SHA-256 signature over it.
    pub fn build<F>(&self, content: &[u8], sign: F) -> Result<Vec<u8>>
    where
        F: FnOnce(&[u8]) -> Result<Vec<u8>>,
    {
        let signed_attrs = self.signed_attributes(content)?;
        let attrs_der = signed_attrs.to_der().map_err(|e| self.error(e))?;
        let signature = sign(&attrs_der)?;

        let tbs = &self.certificate.tbs_certificate;
        let signer_info = SignerInfo {
            version: CmsVersion::V1,
            sid: SignerIdentifier::IssuerAndSerialNumber(IssuerAndSerialNumber {
                issuer: tbs.issuer.clone(),
                serial_number: tbs.serial_number.clone(),
            }),
            digest_alg: sha256_algorithm(),
            signed_attrs: Some(signed_attrs),
            signature_algorithm: AlgorithmIdentifierOwned {
                oid: OID_RSA_ENCRYPTION,
                parameters: Some(Any::null()),
            },
            signature: OctetString::new(signature).map_err(|e| self.error(e))?,
            unsigned_attrs: None,
        };

        let mut certificates = SetOfVec::new();
        for cert in std::iter::once(&self.certificate).chain(&self.chain) {
            certificates
                .insert(CertificateChoices::Certificate(cert.clone()))
                .map_err(|e| self.error(e))?;
        }

        let signed_data = SignedData {
            version: CmsVersion::V1,
            digest_algorithms: SetOfVec::try_from(vec![sha256_algorithm()]).map_err(|e| self.error(e))?,
            encap_content_info: EncapsulatedContentInfo {
                econtent_type: OID_DATA,
                econtent: None,
            },
            certificates: Some(CertificateSet(certificates)),
            crls: None,
            signer_infos: SignerInfos(SetOfVec::try_from(vec![signer_info]).map_err(|e| self.error(e))?),
        };

        let content_info = ContentInfo {
            content_type: OID_SIGNED_DATA,
            content: Any::encode_from(&signed_data).map_err(|e| self.error(e))?,
        };
        let der = content_info.to_der().map_err(|e| self.error(e))?;

        log::debug!(
            "Built CMS SignedData ({} bytes, {} certificates)",
            der.len(),
            1 + self.chain.len()
        );
        Ok(der)
    }

    fn attribute(&self, oid: ObjectIdentifier, value: der::Result<Any>) -> Result<Attribute> {
        let value = value.map_err(|e| self.error(e))?;
        Ok(Attribute {
            oid,
            values: SetOfVec::try_from(vec![value]).map_err(|e| self.error(e))?,
        })
    }

    fn error(&self, reason: impl std::fmt::Display) -> Error {
        Error::backend(self.backend, format!("CMS encoding failed: {}", reason))
    }
}

fn sha256_algorithm() -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: OID_SHA256,
        parameters: Some(Any::null()),
    }
}
