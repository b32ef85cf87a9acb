// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::type_complexity)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::enum_variant_names)]
#![allow(clippy::should_implement_trait)]
// Allow unused for tests
#![cfg_attr(test, allow(dead_code))]

//! # pdf_signing
//!
//! Detached PKCS#7 signing for PDF documents.
//!
//! ## Core Features
//!
//! - **Placeholder insertion**: signature dictionary, invisible widget on
//!   page one, AcroForm registration (`SigFlags 3`)
//! - **ByteRange resolution**: fixed-width sentinels rewritten in place, file
//!   length preserved
//! - **Transports**: local PKCS#12 bundle or Google Cloud KMS
//!   (`gcloud-hsm` feature, on by default)
//! - **Reason text**: signer lists from caller strings or an audit log,
//!   timestamps in a configurable zone
//! - **Verification**: ByteRange geometry, message digest and RSA signature
//!   checks for signed output
//!
//! The crate carries its own small PDF object model: a lexer/parser, classic
//! and stream cross-reference tables (with reconstruction for broken files),
//! object streams, FlateDecode with PNG predictors, and a writer that reports
//! where reserved fields landed.
//!
//! ## Quick Start
//!
//! ```no_run
//! use pdf_signing::{PdfSigner, SignOptions, SigningConfig};
//!
//! # fn main() -> pdf_signing::Result<()> {
//! let signer = PdfSigner::from_config(&SigningConfig::from_env()?)?;
//! let pdf = std::fs::read("contract.pdf")?;
//! let options = SignOptions::default().with_signers(["Jane Doe", "John Roe"]);
//! std::fs::write("contract-signed.pdf", signer.sign(&pdf, &options)?)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## License
//!
//! Licensed under either of:
//!
//! * Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or <http://www.apache.org/licenses/LICENSE-2.0>)
//! * MIT license ([LICENSE-MIT](LICENSE-MIT) or <http://opensource.org/licenses/MIT>)
//!
//! at your option.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Error handling
pub mod error;

// Configuration
pub mod config;

// Core PDF parsing
pub mod document;
pub mod lexer;
pub mod object;
pub mod objstm;
pub mod parser;
pub mod xref;
pub mod xref_reconstruction;

// Stream decoders
pub mod decoders;

// PDF writing
pub mod writer;

// Signing
pub mod signatures;

pub use config::SigningConfig;
pub use document::PdfDocument;
pub use error::{Error, Result};
pub use signatures::{PdfSigner, SignOptions, SignatureVerifier};
