use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod images;
pub mod markup;
pub mod parser;
pub mod pipeline;
pub mod reconstruct;
pub mod spans;
pub mod types;
pub mod writer;

pub use markup::{TextTransform, Uppercase};
pub use parser::table::TableStrategy;
pub use pipeline::{ConversionReport, ConvertOptions};
pub use reconstruct::PlacementPolicy;
pub use spans::ColorPolicy;
pub use types::*;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("Input file not found: {0}")]
    InputNotFound(PathBuf),
    #[error("PDF parsing error: {0}")]
    Parse(String),
    #[error("Document is encrypted")]
    Encrypted,
    #[error("Image not found: {0}")]
    ImageNotFound(String),
    #[error("Cannot decode image {xref}: {reason}")]
    ImageDecode { xref: u32, reason: String },
    #[error("Cannot decode color: {0}")]
    ColorDecode(String),
    #[error("PDF writing error: {0}")]
    Write(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Rebuild `source` under `output_dir` with the default options.
pub fn convert(source: &Path, output_dir: &Path) -> Result<ConversionReport, PdfError> {
    pipeline::convert(source, output_dir, &ConvertOptions::default())
}

/// Span record of a PDF, without writing anything.
pub fn extract_spans(bytes: &[u8]) -> Result<FormattingRecord, PdfError> {
    pipeline::extract_record(bytes, ColorPolicy::default())
}

/// Number of pages in a PDF.
pub fn page_count(bytes: &[u8]) -> Result<usize, PdfError> {
    Ok(parser::backend::LopdfBackend::load_bytes(bytes)?.page_count())
}
