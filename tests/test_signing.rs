//! End-to-end signing tests: local PKCS#12 transport, mocked Cloud KMS,
//! capacity limits and reason resolution through the audit log.

mod common;

use chrono::{TimeZone, Utc};
use common::*;
use pdf_signing::config::{GcloudHsmConfig, LocalConfig};
use pdf_signing::signatures::{
    CompletionEvent, LocalCertificateTransport, SignatureTransport, Transport, TransportKind, VerificationStatus,
};
use pdf_signing::{Error, PdfSigner, SignOptions, SignatureVerifier, SigningConfig};
use std::time::Duration;

fn verify_single(pdf: &[u8]) -> pdf_signing::signatures::VerificationResult {
    let mut results = SignatureVerifier::verify(pdf).unwrap();
    assert_eq!(results.len(), 1);
    results.remove(0)
}

#[test]
fn test_local_sign_and_verify() {
    let input = simple_pdf(2);
    let signer = PdfSigner::new(local_transport());
    let signed = signer
        .sign(&input, &SignOptions::default().with_signers(["Jane Doe"]))
        .unwrap();

    let result = verify_single(&signed);
    assert_eq!(result.status, VerificationStatus::Valid);
    assert_eq!(result.signature_info.signer_name.as_deref(), Some(SIGNER_CN));
    assert_eq!(result.signature_info.reason.as_deref(), Some("Signed by: Jane Doe"));
    assert_eq!(result.signature_info.sub_filter.as_deref(), Some("adbe.pkcs7.detached"));

    let text = String::from_utf8_lossy(&signed);
    assert_eq!(text.matches("/Filter /Adobe.PPKLite").count(), 1);
    assert!(!text.contains("/**********"));
}

#[test]
fn test_signed_length_matches_prepared_length() {
    let input = simple_pdf(1);
    let time = Utc.with_ymd_and_hms(2025, 7, 29, 14, 30, 0).unwrap();

    let prepared = pdf_signing::signatures::PlaceholderInserter::new()
        .with_signing_time(time)
        .insert(&input, &[], None)
        .unwrap();
    let signed = PdfSigner::new(local_transport())
        .with_signing_time(time)
        .sign(&input, &SignOptions::default())
        .unwrap();

    assert_eq!(signed.len(), prepared.bytes.len());
    assert!(String::from_utf8_lossy(&signed).contains("/M (D:20250729143000Z)"));
}

#[test]
fn test_local_bundle_from_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cert.p12");
    std::fs::write(&path, BUNDLE_NOPASS).unwrap();

    let config = SigningConfig::new().with_local_path(&path);
    let signer = PdfSigner::from_config(&config).unwrap();
    assert_eq!(signer.transport().kind(), TransportKind::Local);

    let signed = signer.sign(&simple_pdf(1), &SignOptions::default()).unwrap();
    let result = verify_single(&signed);
    assert!(result.status.is_valid(), "{:?}", result.status);
    assert_eq!(result.signature_info.reason.as_deref(), Some("Signed by Documenso"));
}

#[test]
fn test_local_bundle_is_reread_per_call() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cert.p12");
    let transport = LocalCertificateTransport::new(LocalConfig {
        file_path: Some(path.clone()),
        ..Default::default()
    });

    assert!(transport.sign(b"content").is_err());
    std::fs::write(&path, BUNDLE_NOPASS).unwrap();
    assert!(transport.sign(b"content").is_ok());
}

#[test]
fn test_tampering_outside_contents_invalidates() {
    let signed = PdfSigner::new(local_transport())
        .sign(&simple_pdf(1), &SignOptions::default().with_signers(["A", "B"]))
        .unwrap();
    let (a, b) = contents_span(&signed);

    // Binary comment on line two: covered by the first span.
    let mut before = signed.clone();
    before[10] ^= 0x01;
    let result = verify_single(&before);
    assert!(matches!(result.status, VerificationStatus::Invalid(_)));

    // A digit of the /M date after the Contents field: covered by the second span.
    let mut after = signed.clone();
    let date = b + String::from_utf8_lossy(&signed[b..]).find("(D:").unwrap() + 3;
    after[date] = if after[date] == b'9' { b'8' } else { after[date] + 1 };
    assert!(date > b && a < b);
    let result = verify_single(&after);
    assert!(matches!(result.status, VerificationStatus::Invalid(ref r) if r.contains("digest")));
}

#[test]
fn test_flipping_padding_keeps_signature_valid() {
    let signed = PdfSigner::new(local_transport())
        .sign(&simple_pdf(1), &SignOptions::default())
        .unwrap();
    let (_, b) = contents_span(&signed);

    let mut padded = signed.clone();
    assert_eq!(padded[b - 2], b'0');
    padded[b - 2] = b'f';
    padded[b - 3] = b'e';
    assert!(verify_single(&padded).status.is_valid());
}

#[test]
fn test_signature_too_large() {
    let err = PdfSigner::new(local_transport())
        .with_signature_capacity(64)
        .sign(&simple_pdf(1), &SignOptions::default())
        .unwrap_err();
    match err {
        Error::SignatureTooLarge { size, capacity } => {
            assert_eq!(capacity, 128);
            assert!(size > capacity);
        },
        other => panic!("expected SignatureTooLarge, got {:?}", other),
    }
}

#[test]
fn test_unknown_transport_fails_before_signing() {
    let config = SigningConfig::from_lookup(|key| {
        (key == "NEXT_PRIVATE_SIGNING_TRANSPORT").then(|| "yubikey".to_string())
    })
    .unwrap();
    let err = PdfSigner::from_config(&config).unwrap_err();
    assert!(matches!(err, Error::UnsupportedTransport(ref id) if id == "yubikey"));
    assert!(!err.is_retryable());
}

#[test]
fn test_audit_log_signers_in_completion_order() {
    let t1 = Utc.with_ymd_and_hms(2025, 7, 29, 9, 15, 0).unwrap();
    let t2 = Utc.with_ymd_and_hms(2025, 7, 29, 16, 45, 0).unwrap();
    let signer = PdfSigner::new(local_transport()).with_audit_log(move |document_id: i64| {
        assert_eq!(document_id, 99);
        Ok::<_, Error>(vec![
            CompletionEvent {
                recipient_name: Some("Second Person".to_string()),
                email: Some("second@example.com".to_string()),
                completed_at: t2,
            },
            CompletionEvent {
                recipient_name: Some("First Person".to_string()),
                email: None,
                completed_at: t1,
            },
            CompletionEvent {
                recipient_name: Some("First Person".to_string()),
                email: None,
                completed_at: t2,
            },
        ])
    });

    let signed = signer.sign(&simple_pdf(1), &SignOptions::default().with_document_id(99)).unwrap();
    let result = verify_single(&signed);
    assert!(result.status.is_valid());
    assert_eq!(
        result.signature_info.reason.as_deref(),
        Some("Signed by: 1. First Person - 07/29/2025, 09:15 AM UTC || 2. Second Person - 07/29/2025, 04:45 PM UTC")
    );
}

#[test]
fn test_audit_log_failure_still_signs() {
    let signer = PdfSigner::new(local_transport())
        .with_audit_log(|_: i64| Err::<Vec<CompletionEvent>, _>(Error::AuditLog("connection reset".to_string())));
    let signed = signer.sign(&simple_pdf(1), &SignOptions::default().with_document_id(5)).unwrap();

    let result = verify_single(&signed);
    assert!(result.status.is_valid());
    assert_eq!(result.signature_info.reason.as_deref(), Some("Signed by Documenso"));
}

#[test]
fn test_custom_transport() {
    struct Failing;
    impl SignatureTransport for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn sign(&self, _content: &[u8]) -> pdf_signing::Result<Vec<u8>> {
            Err(Error::AuditLog("unused".to_string()))
        }
    }

    assert!(PdfSigner::new(Failing).sign(&simple_pdf(1), &SignOptions::default()).is_err());
    assert!(PdfSigner::new(Box::new(local_transport()) as Box<dyn SignatureTransport>)
        .sign(&simple_pdf(1), &SignOptions::default())
        .is_ok());
}

#[cfg(feature = "gcloud-hsm")]
mod gcloud_hsm {
    use super::*;

    const KEY_PATH: &str = "projects/test/locations/global/keyRings/ring/cryptoKeys/signing/cryptoKeyVersions/1";

    fn hsm_config(server: &MockServer, token: Option<&str>) -> SigningConfig {
        SigningConfig::new().with_transport("gcloud-hsm").with_gcloud_hsm(GcloudHsmConfig {
            key_path: Some(KEY_PATH.to_string()),
            certificate_contents: Some(CERT_PEM.to_vec()),
            access_token: token.map(String::from),
            endpoint: server.url.clone(),
            metadata_host: server.host.clone(),
            timeout: Duration::from_secs(10),
            ..Default::default()
        })
    }

    #[test]
    fn test_hsm_sign_and_verify() {
        let server = MockServer::start(1, kms_sign);
        let signer = PdfSigner::from_config(&hsm_config(&server, Some("static-token"))).unwrap();
        assert!(matches!(signer.transport(), Transport::GcloudHsm(_)));

        let signed = signer
            .sign(&simple_pdf(1), &SignOptions::default().with_signers(["Jane Doe"]))
            .unwrap();
        let requests = server.finish();

        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path, format!("/v1/{}:asymmetricSign", KEY_PATH));
        assert_eq!(requests[0].headers["authorization"], "Bearer static-token");

        let result = verify_single(&signed);
        assert_eq!(result.status, VerificationStatus::Valid);
        assert_eq!(result.signature_info.signer_name.as_deref(), Some(SIGNER_CN));
    }

    #[test]
    fn test_hsm_token_from_metadata_server() {
        let server = MockServer::start(2, |request| {
            if request.method == "GET" {
                MockResponse::json(
                    200,
                    serde_json::json!({"access_token": "meta-token", "expires_in": 3599, "token_type": "Bearer"}),
                )
            } else {
                kms_sign(request)
            }
        });
        let signer = PdfSigner::from_config(&hsm_config(&server, None)).unwrap();
        let signed = signer.sign(&simple_pdf(1), &SignOptions::default()).unwrap();
        let requests = server.finish();

        assert_eq!(
            requests[0].path,
            "/computeMetadata/v1/instance/service-accounts/default/token"
        );
        assert_eq!(requests[0].headers["metadata-flavor"], "Google");
        assert_eq!(requests[1].headers["authorization"], "Bearer meta-token");
        assert!(verify_single(&signed).status.is_valid());
    }

    #[test]
    fn test_hsm_server_error_is_retryable() {
        let server = MockServer::start(1, |_| {
            MockResponse::json(503, serde_json::json!({"error": {"code": 503, "status": "UNAVAILABLE"}}))
        });
        let signer = PdfSigner::from_config(&hsm_config(&server, Some("t"))).unwrap();
        let err = signer.sign(&simple_pdf(1), &SignOptions::default()).unwrap_err();
        server.finish();

        assert!(err.is_retryable(), "{}", err);
        assert!(matches!(err, Error::SigningBackend { backend: "gcloud-hsm", .. }));
    }

    #[test]
    fn test_hsm_permission_denied_is_not_retryable() {
        let server = MockServer::start(1, |_| {
            MockResponse::json(403, serde_json::json!({"error": {"code": 403, "status": "PERMISSION_DENIED"}}))
        });
        let signer = PdfSigner::from_config(&hsm_config(&server, Some("t"))).unwrap();
        let err = signer.sign(&simple_pdf(1), &SignOptions::default()).unwrap_err();
        server.finish();

        assert!(!err.is_retryable());
        assert!(err.to_string().contains("403"), "{}", err);
    }

    #[test]
    fn test_hsm_malformed_response() {
        let server = MockServer::start(1, |_| MockResponse::json(200, serde_json::json!({"name": "x"})));
        let signer = PdfSigner::from_config(&hsm_config(&server, Some("t"))).unwrap();
        let err = signer.sign(&simple_pdf(1), &SignOptions::default()).unwrap_err();
        server.finish();

        assert!(!err.is_retryable());
    }
}
