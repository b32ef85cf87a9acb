//! Digital signature types and data structures.

use chrono::{DateTime, Utc};

/// Default number of raw signature bytes reserved in `/Contents`.
pub const DEFAULT_SIGNATURE_CAPACITY: usize = 4096;

/// Largest accepted `/Contents` reservation (1 MiB of raw signature bytes).
pub const MAX_SIGNATURE_CAPACITY: usize = 1 << 20;

/// Reason text used when no signer is known.
pub const DEFAULT_REASON: &str = "Signed by Documenso";

/// Signature filter written into every signature dictionary.
pub const SIGNATURE_FILTER: &str = "Adobe.PPKLite";

/// Signature sub-filter (detached PKCS#7).
pub const SIGNATURE_SUB_FILTER: &str = "adbe.pkcs7.detached";

/// Per-call signing options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignOptions {
    /// Display strings for the signers, used verbatim for the reason text
    pub signers: Option<Vec<String>>,
    /// Document identifier, used to look up signers in the audit log
    pub document_id: Option<i64>,
}

impl SignOptions {
    /// Set explicit signer display strings.
    pub fn with_signers<I, S>(mut self, signers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.signers = Some(signers.into_iter().map(Into::into).collect());
        self
    }

    /// Set the document identifier.
    pub fn with_document_id(mut self, document_id: i64) -> Self {
        self.document_id = Some(document_id);
        self
    }
}

/// A recipient-completion record as stored by the audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionEvent {
    /// Recipient display name, if recorded
    pub recipient_name: Option<String>,
    /// Recipient email, used when the name is missing
    pub email: Option<String>,
    /// When the recipient completed signing
    pub completed_at: DateTime<Utc>,
}

/// A signer resolved from the audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignerInfo {
    /// Display name
    pub name: String,
    /// Completion time
    pub signed_at: DateTime<Utc>,
}

/// Information read back from a signature dictionary.
#[derive(Debug, Clone, Default)]
pub struct SignatureInfo {
    /// Common name of the signing certificate
    pub signer_name: Option<String>,
    /// Raw `/M` value, e.g. `D:20250729143000Z`
    pub signing_time: Option<String>,
    /// `/Reason` text
    pub reason: Option<String>,
    /// `/SubFilter` name
    pub sub_filter: Option<String>,
    /// `/ByteRange` values as found in the file
    pub byte_range: Vec<i64>,
}

/// Result of verifying one signature.
#[derive(Debug, Clone)]
pub struct VerificationResult {
    /// Overall verification status
    pub status: VerificationStatus,
    /// Signature information
    pub signature_info: SignatureInfo,
}

/// Verification status of a signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationStatus {
    /// Digest and signature both check out
    Valid,
    /// Verification failed for the given reason
    Invalid(String),
}

impl VerificationStatus {
    /// Check if the status indicates a valid signature.
    pub fn is_valid(&self) -> bool {
        matches!(self, VerificationStatus::Valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_options_builder() {
        let opts = SignOptions::default()
            .with_signers(["Jane Doe", "John Roe"])
            .with_document_id(42);
        assert_eq!(
            opts.signers,
            Some(vec!["Jane Doe".to_string(), "John Roe".to_string()])
        );
        assert_eq!(opts.document_id, Some(42));
    }

    #[test]
    fn test_verification_status() {
        assert!(VerificationStatus::Valid.is_valid());
        assert!(!VerificationStatus::Invalid("digest mismatch".to_string()).is_valid());
    }
}
