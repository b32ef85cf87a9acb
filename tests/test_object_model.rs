//! Tests for loading and rewriting documents: xref streams, object
//! streams, incremental updates and damaged cross-reference data.

mod common;

use common::{append_update, build_pdf, local_transport, simple_pdf, xref_stream_pdf};
use pdf_signing::object::{Object, ObjectRef};
use pdf_signing::signatures::PlaceholderInserter;
use pdf_signing::writer::PdfWriter;
use pdf_signing::{Error, PdfDocument, PdfSigner, SignOptions, SignatureVerifier};

#[test]
fn test_load_xref_stream_with_object_stream() {
    let doc = PdfDocument::load(&xref_stream_pdf()).unwrap();
    assert_eq!(doc.version(), (1, 5));

    let catalog = doc.get(doc.catalog_ref().unwrap()).unwrap();
    assert!(catalog.has_type("Catalog"));
    assert_eq!(doc.first_page_ref().unwrap(), ObjectRef::new(3, 0));

    // Container objects are not part of the rewritten graph.
    assert!(doc.get(ObjectRef::new(5, 0)).is_none());
    assert!(doc.get(ObjectRef::new(6, 0)).is_none());
    assert!(!doc.trailer().contains_key("W"));
}

#[test]
fn test_rewrite_flattens_to_classic_xref() {
    let doc = PdfDocument::load(&xref_stream_pdf()).unwrap();
    let written = PdfWriter::new().write(&doc).unwrap();
    assert!(written.reserved.is_empty());

    let text = String::from_utf8_lossy(&written.bytes);
    assert!(text.starts_with("%PDF-1.5\n"));
    assert!(text.contains("trailer\n"));
    assert!(text.ends_with("%%EOF\n"));

    let reloaded = PdfDocument::load(&written.bytes).unwrap();
    assert_eq!(reloaded.len(), doc.len());
    let pages = reloaded.get(ObjectRef::new(2, 0)).unwrap();
    assert_eq!(pages.get("Count").and_then(Object::as_integer), Some(1));
}

#[test]
fn test_incremental_update_wins() {
    let base = simple_pdf(1);
    let updated = append_update(
        &base,
        3,
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Rotate 90 /Contents 4 0 R >>",
    );

    let doc = PdfDocument::load(&updated).unwrap();
    let page = doc.get(doc.first_page_ref().unwrap()).unwrap();
    assert_eq!(page.get("Rotate").and_then(Object::as_integer), Some(90));
    assert!(!doc.trailer().contains_key("Prev"));
}

#[test]
fn test_broken_startxref_is_reconstructed() {
    let mut pdf = simple_pdf(1);
    let text = String::from_utf8_lossy(&pdf).into_owned();
    let pos = text.rfind("startxref\n").unwrap() + "startxref\n".len();
    pdf[pos] = b'9';

    let doc = PdfDocument::load(&pdf).unwrap();
    assert!(doc.get(doc.first_page_ref().unwrap()).unwrap().has_type("Page"));
}

#[test]
fn test_stale_xref_offsets_are_relocated() {
    // Shift every object by padding the header comment without fixing the table.
    let pdf = simple_pdf(1);
    let mut shifted = b"%PDF-1.7\n% padding padding\n".to_vec();
    shifted.extend_from_slice(&pdf[b"%PDF-1.7\n".len()..]);

    let doc = PdfDocument::load(&shifted).unwrap();
    assert!(doc.catalog_ref().is_ok());
    assert!(doc.first_page_ref().is_ok());
}

#[test]
fn test_encrypted_documents_are_rejected() {
    let pdf = build_pdf(
        &[
            (1, "<< /Type /Catalog /Pages 2 0 R >>".to_string()),
            (2, "<< /Type /Pages /Kids [] /Count 0 >>".to_string()),
            (3, "<< /Filter /Standard /V 2 /R 3 >>".to_string()),
        ],
        " /Encrypt 3 0 R",
    );
    assert!(matches!(PdfDocument::load(&pdf), Err(Error::Unsupported(_))));
}

#[test]
fn test_sign_xref_stream_document() {
    let signed = PdfSigner::new(local_transport())
        .sign(&xref_stream_pdf(), &SignOptions::default())
        .unwrap();
    let results = SignatureVerifier::verify(&signed).unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].status.is_valid(), "{:?}", results[0].status);
}

#[test]
fn test_add_object_numbering() {
    let mut doc = PdfDocument::load(&simple_pdf(1)).unwrap();
    let max = doc.max_object_number();
    let added = doc.add_object(Object::Integer(7));
    assert_eq!(added, ObjectRef::new(max + 1, 0));
    assert_eq!(doc.get(added), Some(&Object::Integer(7)));
    assert_eq!(doc.resolve(&Object::Reference(added)), &Object::Integer(7));
}

fn pdf_with_escaped_names() -> Vec<u8> {
    build_pdf(
        &[
            (1, "<< /Type /Catalog /Pages 2 0 R >>".to_string()),
            (2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string()),
            (
                3,
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
                 /Resources << /Font << /F#28a#29 4 0 R /G#25x 4 0 R /Caf#E9 4 0 R >> >> >>"
                    .to_string(),
            ),
            (4, "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string()),
        ],
        "",
    )
}

#[test]
fn test_escaped_names_survive_rewrite() {
    let prepared = PlaceholderInserter::new()
        .insert(&pdf_with_escaped_names(), &[], None)
        .unwrap();
    let text = String::from_utf8_lossy(&prepared.bytes);
    assert!(text.contains("/F#28a#29 4 0 R"), "{}", text);
    assert!(text.contains("/G#25x 4 0 R"));
    assert!(text.contains("/Caf#E9 4 0 R"));

    let doc = PdfDocument::load(&prepared.bytes).unwrap();
    let page = doc.get(ObjectRef::new(3, 0)).unwrap();
    let fonts = page
        .get("Resources")
        .and_then(|r| r.get("Font"))
        .and_then(Object::as_dict)
        .unwrap();
    let mut keys: Vec<&str> = fonts.keys().map(String::as_str).collect();
    keys.sort();
    assert_eq!(keys, vec!["Caf\u{e9}", "F(a)", "G%x"]);
}

#[test]
fn test_sign_sparse_object_numbers() {
    let pdf = build_pdf(
        &[
            (1, "<< /Type /Catalog /Pages 2 0 R >>".to_string()),
            (2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string()),
            (3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] >>".to_string()),
        ],
        "",
    );
    let mut doc = PdfDocument::load(&pdf).unwrap();
    doc.set_object(ObjectRef::new(200_000, 0), Object::Integer(1));
    let sparse = PdfWriter::new().write(&doc).unwrap().bytes;
    assert!(sparse.len() < 4096);

    let signed = PdfSigner::new(local_transport())
        .sign(&sparse, &SignOptions::default())
        .unwrap();
    let results = SignatureVerifier::verify(&signed).unwrap();
    assert!(results[0].status.is_valid(), "{:?}", results[0].status);
}
