//! PDF digital signatures.
//!
//! Signing a document is a single pass through these pieces:
//!
//! - [`PlaceholderInserter`] adds the signature dictionary, an invisible
//!   widget on page one and the AcroForm entry, then rewrites the file
//! - [`ByteRangeResolver`] writes the real offsets over the ByteRange
//!   sentinels without changing the file length
//! - a [`SignatureTransport`] signs the covered bytes (local PKCS#12 bundle
//!   or Cloud KMS) and returns a detached CMS blob
//! - [`PdfSigner`] drives the above and splices the signature into
//!   `/Contents`
//!
//! ## Example
//!
//! ```no_run
//! use pdf_signing::signatures::{PdfSigner, SignOptions};
//! use pdf_signing::SigningConfig;
//!
//! # fn main() -> pdf_signing::Result<()> {
//! let config = SigningConfig::from_env()?;
//! let signer = PdfSigner::from_config(&config)?;
//!
//! let input = std::fs::read("document.pdf")?;
//! let signed = signer.sign(&input, &SignOptions::default().with_signers(["Jane Doe"]))?;
//! std::fs::write("signed.pdf", signed)?;
//! # Ok(())
//! # }
//! ```
//!
//! [`SignatureVerifier`] reads signatures back for checking.
//!
//! ## PDF Specification Reference
//!
//! - ISO 32000-1:2008 Section 12.8 - Digital Signatures
//! - RFC 5652 - Cryptographic Message Syntax

mod audit;
mod byterange;
pub mod cms;
mod placeholder;
mod reason;
mod signer;
pub mod transport;
mod types;
mod verifier;

pub use audit::AuditLog;
pub use byterange::{ByteRange, ByteRangeResolver, ResolvedPlaceholder};
pub use placeholder::{pdf_date, reason_for_signers, PlaceholderInserter, PlaceholderLayout, PreparedPdf};
pub use reason::{display_timezone, format_signers, format_timestamp, signers_from_events, SIGNER_SEPARATOR};
pub use signer::PdfSigner;
pub use transport::{LocalCertificateTransport, SignatureTransport, Transport, TransportKind};
#[cfg(feature = "gcloud-hsm")]
pub use transport::CloudHsmTransport;
pub use types::{
    CompletionEvent, SignOptions, SignatureInfo, SignerInfo, VerificationResult, VerificationStatus,
    DEFAULT_REASON, DEFAULT_SIGNATURE_CAPACITY, MAX_SIGNATURE_CAPACITY, SIGNATURE_FILTER, SIGNATURE_SUB_FILTER,
};
pub use verifier::SignatureVerifier;
