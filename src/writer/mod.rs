//! PDF writing.
//!
//! ```text
//! PdfDocument
//!     ↓
//! [PdfWriter] (header, objects, classic xref, trailer)
//!     ↓
//! [ObjectSerializer] (objects → bytes, reserved-field spans)
//!     ↓
//! WrittenPdf { bytes, reserved }
//! ```

mod object_serializer;
mod pdf_writer;

pub use object_serializer::{ObjectSerializer, ReservedSpan};
pub use pdf_writer::{PdfWriter, WrittenPdf};
