//! PDF signing orchestration.
//!
//! [`PdfSigner::sign`] runs one complete signing pass:
//!
//! 1. pick the reason text (caller strings, else the audit log)
//! 2. insert the placeholder and rewrite the document
//! 3. resolve the ByteRange in place
//! 4. sign `bytes[0..a] ++ bytes[b..]` through the transport
//! 5. hex-encode, pad and splice the signature into `bytes[a..b]`
//!
//! Every pass builds its buffers from scratch; nothing is shared between
//! calls.

use super::audit::AuditLog;
use super::byterange::ByteRangeResolver;
use super::placeholder::{reason_for_signers, PlaceholderInserter};
use super::reason::{display_timezone, format_signers, signers_from_events};
use super::transport::{SignatureTransport, Transport};
use super::types::{SignOptions, DEFAULT_REASON, DEFAULT_SIGNATURE_CAPACITY};
use crate::config::SigningConfig;
use crate::error::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::fmt;

/// Signs PDF documents with a [`SignatureTransport`].
pub struct PdfSigner<T = Transport> {
    transport: T,
    audit_log: Option<Box<dyn AuditLog + Send + Sync>>,
    display_timezone: Tz,
    signature_capacity: usize,
    signing_time: Option<DateTime<Utc>>,
}

impl<T: fmt::Debug> fmt::Debug for PdfSigner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PdfSigner")
            .field("transport", &self.transport)
            .field("audit_log", &self.audit_log.is_some())
            .field("display_timezone", &self.display_timezone)
            .field("signature_capacity", &self.signature_capacity)
            .finish()
    }
}

impl PdfSigner<Transport> {
    /// Build a signer from configuration.
    ///
    /// The transport identifier is checked here, before any document is
    /// touched.
    ///
    /// # Errors
    ///
    /// [`Error::UnsupportedTransport`](crate::Error::UnsupportedTransport)
    /// for an unknown identifier, or a configuration error from the
    /// transport constructor.
    pub fn from_config(config: &SigningConfig) -> Result<Self> {
        let transport = Transport::from_config(config)?;
        Ok(Self::new(transport)
            .with_display_timezone(display_timezone(config.display_timezone.as_deref()))
            .with_signature_capacity(config.signature_capacity))
    }
}

impl<T: SignatureTransport> PdfSigner<T> {
    /// Create a signer around `transport` with default settings.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            audit_log: None,
            display_timezone: Tz::UTC,
            signature_capacity: DEFAULT_SIGNATURE_CAPACITY,
            signing_time: None,
        }
    }

    /// Resolve signers from `audit_log` when only a document id is given.
    pub fn with_audit_log(mut self, audit_log: impl AuditLog + Send + Sync + 'static) -> Self {
        self.audit_log = Some(Box::new(audit_log));
        self
    }

    /// Zone used for signer timestamps in the reason text.
    pub fn with_display_timezone(mut self, tz: Tz) -> Self {
        self.display_timezone = tz;
        self
    }

    /// Raw signature bytes reserved in `/Contents`.
    pub fn with_signature_capacity(mut self, capacity: usize) -> Self {
        self.signature_capacity = capacity;
        self
    }

    /// Fix the `/M` timestamp (tests, reproducible output).
    pub fn with_signing_time(mut self, time: DateTime<Utc>) -> Self {
        self.signing_time = Some(time);
        self
    }

    /// The transport in use.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sign `pdf` and return the signed document.
    ///
    /// # Errors
    ///
    /// - parse errors if `pdf` cannot be loaded
    /// - [`Error::SigningBackend`](crate::Error::SigningBackend) from the transport
    /// - [`Error::SignatureTooLarge`](crate::Error::SignatureTooLarge) if the
    ///   signature does not fit the reserved capacity
    ///
    /// Audit-log failures are logged and fall back to the default reason.
    pub fn sign(&self, pdf: &[u8], options: &SignOptions) -> Result<Vec<u8>> {
        let reason = self.resolve_reason(options);

        let mut inserter = PlaceholderInserter::new().with_capacity(self.signature_capacity);
        if let Some(time) = self.signing_time {
            inserter = inserter.with_signing_time(time);
        }
        let prepared = inserter.insert_with_reason(pdf, &reason, options.document_id)?;
        let resolved = ByteRangeResolver::resolve_with_layout(prepared.bytes, &prepared.layout)?;

        let content = resolved.signed_content()?;
        let signature = self.transport.sign(&content)?;
        log::debug!(
            "{} transport returned {} signature bytes (capacity {})",
            self.transport.name(),
            signature.len(),
            self.signature_capacity
        );

        let signed = resolved.embed_signature(&signature)?;
        log::info!(
            "Signed document{} ({} bytes)",
            options
                .document_id
                .map(|id| format!(" {}", id))
                .unwrap_or_default(),
            signed.len()
        );
        Ok(signed)
    }

    /// The `/Reason` text a call with `options` would embed.
    pub fn resolve_reason(&self, options: &SignOptions) -> String {
        if let Some(signers) = &options.signers {
            return reason_for_signers(signers);
        }

        let (Some(document_id), Some(audit_log)) = (options.document_id, &self.audit_log) else {
            return DEFAULT_REASON.to_string();
        };

        match audit_log.recipient_completions(document_id) {
            Ok(events) => {
                let signers = signers_from_events(events);
                if signers.is_empty() {
                    DEFAULT_REASON.to_string()
                } else {
                    format!("Signed by: {}", format_signers(&signers, self.display_timezone))
                }
            },
            Err(e) => {
                log::warn!(
                    "Audit log lookup for document {} failed, using default reason: {}",
                    document_id,
                    e
                );
                DEFAULT_REASON.to_string()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::signatures::types::CompletionEvent;
    use chrono::TimeZone;

    struct FixedTransport(usize);

    impl SignatureTransport for FixedTransport {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn sign(&self, _content: &[u8]) -> Result<Vec<u8>> {
            Ok(vec![0x5A; self.0])
        }
    }

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 29, h, 0, 0).unwrap()
    }

    #[test]
    fn test_reason_from_caller_signers() {
        let signer = PdfSigner::new(FixedTransport(1));
        let options = SignOptions::default().with_signers(["A", "B"]).with_document_id(1);
        assert_eq!(signer.resolve_reason(&options), "Signed by: A || B");
        assert_eq!(signer.resolve_reason(&SignOptions::default()), "Signed by Documenso");
    }

    #[test]
    fn test_reason_without_audit_log() {
        let signer = PdfSigner::new(FixedTransport(1));
        let options = SignOptions::default().with_document_id(42);
        assert_eq!(signer.resolve_reason(&options), DEFAULT_REASON);
    }

    #[test]
    fn test_reason_from_audit_log() {
        let signer = PdfSigner::new(FixedTransport(1)).with_audit_log(|id: i64| -> Result<Vec<CompletionEvent>> {
            assert_eq!(id, 42);
            Ok(vec![
                CompletionEvent {
                    recipient_name: Some("Bea".to_string()),
                    email: None,
                    completed_at: at(15),
                },
                CompletionEvent {
                    recipient_name: Some("Al".to_string()),
                    email: None,
                    completed_at: at(9),
                },
            ])
        });
        let options = SignOptions::default().with_document_id(42);
        assert_eq!(
            signer.resolve_reason(&options),
            "Signed by: 1. Al - 07/29/2025, 09:00 AM UTC || 2. Bea - 07/29/2025, 03:00 PM UTC"
        );
    }

    #[test]
    fn test_reason_audit_log_failure_degrades() {
        let signer = PdfSigner::new(FixedTransport(1))
            .with_audit_log(|_: i64| -> Result<Vec<CompletionEvent>> { Err(Error::AuditLog("db down".into())) });
        let options = SignOptions::default().with_document_id(7);
        assert_eq!(signer.resolve_reason(&options), DEFAULT_REASON);
    }

    #[test]
    fn test_reason_audit_log_empty() {
        let signer = PdfSigner::new(FixedTransport(1)).with_audit_log(|_: i64| -> Result<Vec<CompletionEvent>> { Ok(Vec::new()) });
        assert_eq!(signer.resolve_reason(&SignOptions::default().with_document_id(7)), DEFAULT_REASON);
    }

    #[test]
    fn test_from_config_rejects_unknown_transport() {
        let err = PdfSigner::from_config(&SigningConfig::new().with_transport("pkcs11")).unwrap_err();
        assert!(matches!(err, Error::UnsupportedTransport(_)));
    }

    #[test]
    fn test_from_config_applies_settings() {
        let config = SigningConfig::new()
            .with_display_timezone("America/New_York")
            .with_signature_capacity(2048);
        let signer = PdfSigner::from_config(&config).unwrap();
        assert_eq!(signer.display_timezone, chrono_tz::America::New_York);
        assert_eq!(signer.signature_capacity, 2048);
    }
}
