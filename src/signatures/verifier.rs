//! PDF signature verification.
//!
//! Reads signed documents back and checks each detached CMS signature
//! against the bytes its ByteRange covers. Certificate trust is not
//! evaluated; a signature is valid when the embedded certificate's key
//! verifies it and the message digest matches.

use super::byterange::ByteRange;
use super::cms::{OID_MESSAGE_DIGEST, OID_SIGNED_DATA};
use super::types::{SignatureInfo, VerificationResult, VerificationStatus};
use crate::document::PdfDocument;
use crate::error::{Error, Result};
use crate::object::{decode_text_string, Object};
use cms::cert::CertificateChoices;
use cms::content_info::ContentInfo;
use cms::signed_data::{SignedData, SignerIdentifier, SignerInfo};
use der::asn1::OctetString;
use der::{Decode, Encode, SliceReader};
use pkcs8::DecodePublicKey;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::RsaPublicKey;
use sha2::{Digest, Sha256};
use signature::Verifier;
use x509_cert::Certificate;

/// Verifier for PDF digital signatures.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureVerifier;

impl SignatureVerifier {
    /// Verify every signature in `pdf`.
    ///
    /// Malformed signatures are reported as
    /// [`VerificationStatus::Invalid`]; only an unloadable document is an
    /// error.
    pub fn verify(pdf: &[u8]) -> Result<Vec<VerificationResult>> {
        let doc = PdfDocument::load(pdf)?;
        let results: Vec<_> = signature_dictionaries(&doc)
            .into_iter()
            .map(|sig_dict| {
                let signature_info = Self::extract_signature_info(sig_dict);
                let status = match check_signature(pdf, sig_dict) {
                    Ok(()) => VerificationStatus::Valid,
                    Err(reason) => VerificationStatus::Invalid(reason),
                };
                VerificationResult {
                    status,
                    signature_info: SignatureInfo {
                        signer_name: signer_common_name(sig_dict),
                        ..signature_info
                    },
                }
            })
            .collect();

        log::debug!(
            "Verified {} signature(s), {} valid",
            results.len(),
            results.iter().filter(|r| r.status.is_valid()).count()
        );
        Ok(results)
    }

    /// Whether `pdf` contains at least one signature dictionary.
    pub fn quick_check(pdf: &[u8]) -> bool {
        PdfDocument::load(pdf).is_ok_and(|doc| !signature_dictionaries(&doc).is_empty())
    }

    /// Read the descriptive entries of a signature dictionary.
    pub fn extract_signature_info(sig_dict: &Object) -> SignatureInfo {
        let text = |key: &str| sig_dict.get(key).and_then(Object::as_string).map(decode_text_string);

        SignatureInfo {
            signer_name: text("Name"),
            signing_time: text("M"),
            reason: text("Reason"),
            sub_filter: sig_dict.get("SubFilter").and_then(Object::as_name).map(String::from),
            byte_range: byte_range_values(sig_dict),
        }
    }
}

fn signature_dictionaries(doc: &PdfDocument) -> Vec<&Object> {
    let mut found = Vec::new();
    for (_, obj) in doc.objects() {
        if obj.has_type("Sig") {
            found.push(obj);
        } else if obj.get("FT").and_then(Object::as_name) == Some("Sig") {
            // Field with an inline signature value
            if let Some(value @ Object::Dictionary(_)) = obj.get("V") {
                found.push(value);
            }
        }
    }
    found
}

fn byte_range_values(sig_dict: &Object) -> Vec<i64> {
    sig_dict
        .get("ByteRange")
        .and_then(Object::as_array)
        .map(|values| values.iter().filter_map(Object::as_integer).collect())
        .unwrap_or_default()
}

/// Run every check, returning the first failure as text.
fn check_signature(pdf: &[u8], sig_dict: &Object) -> std::result::Result<(), String> {
    let byte_range = ByteRange::from_values(&byte_range_values(sig_dict)).map_err(|e| e.to_string())?;
    byte_range.validate(pdf.len()).map_err(|e| e.to_string())?;

    let field = &pdf[byte_range.contents_span()];
    let well_formed = field.len() >= 2
        && field[0] == b'<'
        && field[field.len() - 1] == b'>'
        && field[1..field.len() - 1].iter().all(u8::is_ascii_hexdigit);
    if !well_formed {
        return Err("ByteRange gap is not the Contents hex string".to_string());
    }

    let contents = sig_dict
        .get("Contents")
        .and_then(Object::as_string)
        .ok_or("signature dictionary has no Contents")?;
    let signed_data = decode_signed_data(contents).map_err(|e| e.to_string())?;

    let signer = signed_data
        .signer_infos
        .0
        .get(0)
        .ok_or("SignedData has no SignerInfo")?;
    let certificate = signer_certificate(&signed_data, signer).ok_or("signer certificate not embedded")?;

    let signed_content = byte_range.signed_content(pdf).map_err(|e| e.to_string())?;
    let signed_attrs = signer.signed_attrs.as_ref().ok_or("SignerInfo has no signed attributes")?;

    let digest = signed_attrs
        .iter()
        .find(|attr| attr.oid == OID_MESSAGE_DIGEST)
        .and_then(|attr| attr.values.get(0))
        .and_then(|value| value.decode_as::<OctetString>().ok())
        .ok_or("missing message-digest attribute")?;
    if digest.as_bytes() != Sha256::digest(&signed_content).as_slice() {
        return Err("message digest does not match signed content".to_string());
    }

    let attrs_der = signed_attrs.to_der().map_err(|e| e.to_string())?;
    let spki_der = certificate
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| e.to_string())?;
    let public_key = RsaPublicKey::from_public_key_der(&spki_der).map_err(|e| format!("unsupported public key: {}", e))?;
    let signature = Signature::try_from(signer.signature.as_bytes()).map_err(|e| e.to_string())?;

    VerifyingKey::<Sha256>::new(public_key)
        .verify(&attrs_der, &signature)
        .map_err(|_| "RSA signature does not verify".to_string())
}

/// Decode the CMS blob, ignoring the zero padding after it.
fn decode_signed_data(contents: &[u8]) -> Result<SignedData> {
    let decode_error = |e: der::Error| Error::Decode(format!("invalid CMS signature: {}", e));

    let mut reader = SliceReader::new(contents).map_err(decode_error)?;
    let content_info = ContentInfo::decode(&mut reader).map_err(decode_error)?;
    if content_info.content_type != OID_SIGNED_DATA {
        return Err(Error::Decode(format!(
            "CMS content type {} is not signedData",
            content_info.content_type
        )));
    }
    content_info.content.decode_as().map_err(decode_error)
}

fn signer_certificate<'a>(signed_data: &'a SignedData, signer: &SignerInfo) -> Option<&'a Certificate> {
    let certificates: Vec<&Certificate> = signed_data
        .certificates
        .as_ref()?
        .0
        .iter()
        .filter_map(|choice| match choice {
            CertificateChoices::Certificate(cert) => Some(cert),
            _ => None,
        })
        .collect();

    let matched = match &signer.sid {
        SignerIdentifier::IssuerAndSerialNumber(id) => certificates.iter().find(|cert| {
            cert.tbs_certificate.issuer == id.issuer && cert.tbs_certificate.serial_number == id.serial_number
        }),
        SignerIdentifier::SubjectKeyIdentifier(_) => None,
    };
    matched.or(certificates.first()).copied()
}

/// Common name of the signer certificate, if the CMS blob decodes.
fn signer_common_name(sig_dict: &Object) -> Option<String> {
    let contents = sig_dict.get("Contents").and_then(Object::as_string)?;
    let signed_data = decode_signed_data(contents).ok()?;
    let signer = signed_data.signer_infos.0.get(0)?;
    let der = signer_certificate(&signed_data, signer)?.to_der().ok()?;

    let (_, cert) = x509_parser::parse_x509_certificate(&der).ok()?;
    let cn = cert.subject().iter_common_name().next()?.as_str().ok()?.to_string();
    Some(cn)
}
