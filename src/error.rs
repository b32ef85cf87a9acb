//! Error types for the signing engine.
//!
//! Every fallible operation in the crate returns [`Result`]. Parsing failures,
//! placeholder invariant violations, transport selection, signing backends and
//! capacity overflows each get their own variant so callers can decide what to
//! retry (see [`Error::is_retryable`]).

/// Result type alias for signing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while preparing, signing or verifying a PDF.
#[derive(Debug, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// Invalid PDF header (expected '%PDF-')
    #[error("Invalid PDF header: {0}")]
    InvalidHeader(String),

    /// Parse error at specific byte offset
    #[error("Failed to parse object at byte {offset}: {reason}")]
    ParseError {
        /// Byte offset where error occurred
        offset: usize,
        /// Reason for parse failure
        reason: String,
    },

    /// Invalid cross-reference table
    #[error("Invalid cross-reference table")]
    InvalidXref,

    /// Referenced object not found in the document
    #[error("Object not found: {0} {1} R")]
    ObjectNotFound(u32, u16),

    /// Object has wrong type
    #[error("Invalid object type: expected {expected}, found {found}")]
    InvalidObjectType {
        /// Expected object type
        expected: String,
        /// Actual object type found
        found: String,
    },

    /// Invalid PDF structure (generic)
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    /// Stream decoding error
    #[error("Stream decoding error: {0}")]
    Decode(String),

    /// Unsupported feature
    #[error("Unsupported feature: {0}")]
    Unsupported(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The signature placeholder does not have the expected shape.
    ///
    /// Raised between placeholder insertion and byte-range resolution; it
    /// always indicates a bug in the writer rather than bad input.
    #[error("Malformed signature placeholder: {0}")]
    MalformedPlaceholder(String),

    /// Transport identifier is not one of the known backends
    #[error("Unsupported signing transport: {0}")]
    UnsupportedTransport(String),

    /// Key material could not be loaded or the signing call failed
    #[error("Signing backend '{backend}' failed: {reason}")]
    SigningBackend {
        /// Backend identifier (`local`, `gcloud-hsm`)
        backend: &'static str,
        /// What went wrong
        reason: String,
        /// Whether the caller may retry the same request
        retryable: bool,
    },

    /// Encoded signature does not fit the reserved Contents field
    #[error("Signature too large: {size} hex characters exceed reserved capacity of {capacity}")]
    SignatureTooLarge {
        /// Length of the hex-encoded signature
        size: usize,
        /// Hex characters available between the delimiters
        capacity: usize,
    },

    /// Audit-log collaborator failed
    #[error("Audit log query failed: {0}")]
    AuditLog(String),

    /// Invalid signing configuration
    #[error("Invalid signing configuration: {0}")]
    Config(String),
}

impl Error {
    /// Build a non-retryable backend error.
    pub(crate) fn backend(backend: &'static str, reason: impl Into<String>) -> Self {
        Error::SigningBackend {
            backend,
            reason: reason.into(),
            retryable: false,
        }
    }

    /// Build a retryable backend error (network or service-side failure).
    pub(crate) fn transient(backend: &'static str, reason: impl Into<String>) -> Self {
        Error::SigningBackend {
            backend,
            reason: reason.into(),
            retryable: true,
        }
    }

    /// Whether retrying the same call could succeed.
    ///
    /// Only remote signing failures (connection errors, timeouts, 5xx and 429
    /// responses) are retryable. Certificate, parse and configuration failures
    /// need an operator fix first.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::SigningBackend {
                retryable: true,
                ..
            }
        )
    }
}
