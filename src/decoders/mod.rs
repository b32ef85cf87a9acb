//! Stream decoders.
//!
//! Signing only needs to look inside two kinds of streams: cross-reference
//! streams and object streams. Both are FlateDecode in practice, usually with
//! a PNG predictor, so that is the pipeline supported here. Content streams
//! and images are carried through the writer untouched and never decoded.

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};

mod flate;
mod predictor;

pub use flate::FlateDecoder;
pub use predictor::{decode_predictor, DecodeParams};

/// Upper bound on a single decoded stream (decompression bomb guard).
const MAX_DECODED_SIZE: usize = 256 * 1024 * 1024;

/// Trait for PDF stream decoders.
pub trait StreamDecoder {
    /// Decode the input data.
    fn decode(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Filter name as it appears in `/Filter` (e.g. "FlateDecode").
    fn name(&self) -> &str;
}

/// Decode a stream's data according to its `/Filter` and `/DecodeParms`.
///
/// # Errors
///
/// Returns [`Error::Unsupported`] for filters other than FlateDecode and
/// [`Error::Decode`] when the data is corrupt or too large.
pub fn decode_stream(dict: &Dictionary, data: &[u8]) -> Result<Vec<u8>> {
    let filters = filter_names(dict.get("Filter"));
    let params = decode_params(dict.get("DecodeParms"));

    let mut current = data.to_vec();
    for (index, filter) in filters.iter().enumerate() {
        current = match filter.as_str() {
            "FlateDecode" | "Fl" => FlateDecoder.decode(&current)?,
            other => return Err(Error::Unsupported(format!("stream filter {}", other))),
        };

        if current.len() > MAX_DECODED_SIZE {
            return Err(Error::Decode(format!(
                "decoded stream exceeds {} bytes",
                MAX_DECODED_SIZE
            )));
        }

        if let Some(Some(params)) = params.get(index) {
            current = decode_predictor(&current, params)?;
        }
    }

    Ok(current)
}

/// Normalise `/Filter` (a name or an array of names) into a list.
fn filter_names(filter: Option<&Object>) -> Vec<String> {
    match filter {
        Some(Object::Name(name)) => vec![name.clone()],
        Some(Object::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_name().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Normalise `/DecodeParms` into one optional entry per filter.
fn decode_params(params: Option<&Object>) -> Vec<Option<DecodeParams>> {
    match params {
        Some(Object::Dictionary(dict)) => vec![DecodeParams::from_dict(dict)],
        Some(Object::Array(items)) => items
            .iter()
            .map(|item| item.as_dict().and_then(DecodeParams::from_dict))
            .collect(),
        _ => Vec::new(),
    }
}
