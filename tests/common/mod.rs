//! Shared helpers for integration tests: small PDF builders, fixture
//! material and a one-thread mock of the Cloud KMS / metadata endpoints.

#![allow(dead_code)]

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use pdf_signing::config::LocalConfig;
use pdf_signing::signatures::LocalCertificateTransport;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha2::Sha256;
use std::collections::{BTreeMap, HashMap};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread::JoinHandle;

pub const BUNDLE: &[u8] = include_bytes!("../fixtures/signer.p12");
pub const BUNDLE_NOPASS: &[u8] = include_bytes!("../fixtures/signer-nopass.p12");
pub const BUNDLE_PASSPHRASE: &str = "test-passphrase";
pub const CERT_PEM: &[u8] = include_bytes!("../fixtures/signer-cert.pem");
pub const KEY_PEM: &str = include_str!("../fixtures/signer-key.pem");
pub const SIGNER_CN: &str = "Test Signer";

/// Assemble a PDF with a classic xref table from `(id, body)` pairs.
///
/// Object 1 must be the catalog. `trailer_extra` is spliced into the
/// trailer dictionary.
pub fn build_pdf(objects: &[(u32, String)], trailer_extra: &str) -> Vec<u8> {
    let mut out = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = BTreeMap::new();
    for (id, body) in objects {
        offsets.insert(*id, out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", id, body).as_bytes());
    }

    let size = offsets.keys().max().copied().unwrap_or(0) + 1;
    let xref_offset = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", size).as_bytes());
    for id in 1..size {
        let entry = match offsets.get(&id) {
            Some(offset) => format!("{:010} 00000 n \n", offset),
            None => "0000000000 00000 f \n".to_string(),
        };
        out.extend_from_slice(entry.as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R{} >>\nstartxref\n{}\n%%EOF\n",
            size, trailer_extra, xref_offset
        )
        .as_bytes(),
    );
    out
}

/// A document with `pages` pages; page one has a text content stream.
pub fn simple_pdf(pages: usize) -> Vec<u8> {
    let first_page = 3;
    let content_id = first_page + pages as u32;
    let kids: Vec<String> = (0..pages).map(|i| format!("{} 0 R", first_page + i as u32)).collect();

    let mut objects = vec![
        (1, "<< /Type /Catalog /Pages 2 0 R >>".to_string()),
        (2, format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids.join(" "), pages)),
    ];
    for i in 0..pages {
        let contents = if i == 0 {
            format!(" /Contents {} 0 R", content_id)
        } else {
            String::new()
        };
        objects.push((
            first_page + i as u32,
            format!("<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792]{} >>", contents),
        ));
    }
    let text = "BT /F1 12 Tf 72 720 Td (Hello) Tj ET";
    objects.push((content_id, format!("<< /Length {} >>\nstream\n{}\nendstream", text.len(), text)));

    build_pdf(&objects, " /Info << /Producer (test) >>")
}

/// Append an incremental update that replaces object `id`.
pub fn append_update(base: &[u8], id: u32, body: &str) -> Vec<u8> {
    let prev = last_startxref(base);
    let mut out = base.to_vec();
    let offset = out.len();
    out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", id, body).as_bytes());
    let xref_offset = out.len();
    out.extend_from_slice(
        format!(
            "xref\n{} 1\n{:010} 00000 n \ntrailer\n<< /Size {} /Root 1 0 R /Prev {} >>\nstartxref\n{}\n%%EOF\n",
            id,
            offset,
            id + 1,
            prev,
            xref_offset
        )
        .as_bytes(),
    );
    out
}

fn last_startxref(pdf: &[u8]) -> usize {
    let text = String::from_utf8_lossy(pdf);
    let pos = text.rfind("startxref").expect("startxref");
    text[pos + "startxref".len()..]
        .split_whitespace()
        .next()
        .and_then(|n| n.parse().ok())
        .expect("startxref offset")
}

pub fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// PDF 1.5 document: catalog and page tree inside a compressed object
/// stream, cross-references in a compressed xref stream.
pub fn xref_stream_pdf() -> Vec<u8> {
    let mut out = b"%PDF-1.5\n%\xE2\xE3\xCF\xD3\n".to_vec();

    let catalog = "<< /Type /Catalog /Pages 2 0 R >>";
    let pages = "<< /Type /Pages /Kids [3 0 R] /Count 1 >>";
    let header = format!("1 0 2 {} ", catalog.len() + 1);
    let objstm = zlib(format!("{}{} {}", header, catalog, pages).as_bytes());

    let page_offset = out.len();
    out.extend_from_slice(b"3 0 obj\n<< /Type /Page /Parent 2 0 R /MediaBox [0 0 595 842] >>\nendobj\n");

    let objstm_offset = out.len();
    out.extend_from_slice(
        format!(
            "5 0 obj\n<< /Type /ObjStm /N 2 /First {} /Filter /FlateDecode /Length {} >>\nstream\n",
            header.len(),
            objstm.len()
        )
        .as_bytes(),
    );
    out.extend_from_slice(&objstm);
    out.extend_from_slice(b"\nendstream\nendobj\n");

    let xref_offset = out.len();
    let entries: [(u8, u32, u16); 7] = [
        (0, 0, 65535),
        (2, 5, 0),
        (2, 5, 1),
        (1, page_offset as u32, 0),
        (0, 0, 0),
        (1, objstm_offset as u32, 0),
        (1, xref_offset as u32, 0),
    ];
    let mut rows = Vec::new();
    for (kind, field2, field3) in entries {
        rows.push(kind);
        rows.extend_from_slice(&field2.to_be_bytes());
        rows.extend_from_slice(&field3.to_be_bytes());
    }
    let rows = zlib(&rows);

    out.extend_from_slice(
        format!(
            "6 0 obj\n<< /Type /XRef /Size 7 /W [1 4 2] /Root 1 0 R /Filter /FlateDecode /Length {} >>\nstream\n",
            rows.len()
        )
        .as_bytes(),
    );
    out.extend_from_slice(&rows);
    out.extend_from_slice(format!("\nendstream\nendobj\nstartxref\n{}\n%%EOF\n", xref_offset).as_bytes());
    out
}

pub fn local_transport() -> LocalCertificateTransport {
    LocalCertificateTransport::new(LocalConfig {
        file_contents: Some(BUNDLE.to_vec()),
        passphrase: Some(BUNDLE_PASSPHRASE.to_string()),
        ..Default::default()
    })
}

pub fn signing_key() -> RsaPrivateKey {
    RsaPrivateKey::from_pkcs8_pem(KEY_PEM).unwrap()
}

/// Byte offsets `[a, b]` of the first signature's Contents field.
pub fn contents_span(pdf: &[u8]) -> (usize, usize) {
    let text = String::from_utf8_lossy(pdf);
    let start = text.find("/ByteRange [").unwrap() + "/ByteRange [".len();
    let values: Vec<usize> = text[start..]
        .split(']')
        .next()
        .unwrap()
        .split_whitespace()
        .map(|v| v.parse().unwrap())
        .collect();
    (values[1], values[2])
}

/// A request received by [`MockServer`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Response returned by a mock handler.
pub struct MockResponse {
    pub status: u16,
    pub body: String,
}

impl MockResponse {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }
}

/// Minimal HTTP/1.1 server answering a fixed number of requests.
pub struct MockServer {
    pub url: String,
    pub host: String,
    handle: JoinHandle<Vec<RecordedRequest>>,
}

impl MockServer {
    pub fn start<F>(requests: usize, handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> MockResponse + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let host = listener.local_addr().unwrap().to_string();
        let handle = std::thread::spawn(move || {
            let mut seen = Vec::new();
            for _ in 0..requests {
                let (stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream);

                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                let mut parts = request_line.split_whitespace();
                let method = parts.next().unwrap_or_default().to_string();
                let path = parts.next().unwrap_or_default().to_string();

                let mut headers = HashMap::new();
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    let line = line.trim_end();
                    if line.is_empty() {
                        break;
                    }
                    if let Some((name, value)) = line.split_once(':') {
                        headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
                    }
                }

                let length = headers
                    .get("content-length")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0);
                let mut body = vec![0; length];
                reader.read_exact(&mut body).unwrap();

                let request = RecordedRequest {
                    method,
                    path,
                    headers,
                    body,
                };
                let response = handler(&request);
                let mut stream = reader.into_inner();
                write!(
                    stream,
                    "HTTP/1.1 {} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    response.status,
                    response.body.len(),
                    response.body
                )
                .unwrap();
                stream.flush().unwrap();
                seen.push(request);
            }
            seen
        });

        Self {
            url: format!("http://{}", host),
            host,
            handle,
        }
    }

    /// Wait for all expected requests and return them.
    pub fn finish(self) -> Vec<RecordedRequest> {
        self.handle.join().unwrap()
    }
}

/// Handler that behaves like `asymmetricSign`, signing with the fixture key.
pub fn kms_sign(request: &RecordedRequest) -> MockResponse {
    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    let digest = BASE64
        .decode(body["digest"]["sha256"].as_str().unwrap())
        .unwrap();
    let signature = signing_key()
        .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
        .unwrap();
    MockResponse::json(
        200,
        serde_json::json!({
            "signature": BASE64.encode(signature),
            "name": request.path.trim_start_matches("/v1/").trim_end_matches(":asymmetricSign"),
        }),
    )
}
