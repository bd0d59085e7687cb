//! Whole-document conversion.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::images::locate_images;
use crate::markup::{TextTransform, Uppercase};
use crate::parser::backend::{LopdfBackend, PageId, PdfBackend};
use crate::parser::layout::interpret_page;
use crate::parser::table::{find_tables, TableStrategy};
use crate::reconstruct::{reconstruct_page, PlacementPolicy};
use crate::spans::{page_spans, ColorPolicy};
use crate::types::{FormattingRecord, ImageRecord, Rect, Span, TableGeometry};
use crate::writer::PdfWriter;
use crate::PdfError;

/// A document that yields its text per page.
pub trait TextLayoutSource {
    fn page_count(&self) -> usize;

    /// MediaBox of the page at `page_index`.
    fn page_box(&self, page_index: usize) -> Result<Rect, PdfError>;

    /// Spans of the page in reading order.
    fn spans(&self, page_index: usize, policy: ColorPolicy) -> Result<Vec<Span>, PdfError>;

    /// Table regions of the page.
    fn tables(&self, page_index: usize, strategy: TableStrategy) -> Vec<TableGeometry>;
}

/// A document that yields its images per page.
pub trait ImageSource {
    /// Write every image to `image_dir` and return the records keyed by
    /// 0-based page index.
    fn images(&self, image_dir: &Path) -> Result<BTreeMap<usize, Vec<ImageRecord>>, PdfError>;
}

/// A source PDF opened for conversion.
pub struct PdfSource {
    backend: LopdfBackend,
    page_ids: Vec<PageId>,
}

impl PdfSource {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PdfError> {
        let backend = LopdfBackend::load_bytes(bytes)?;
        let page_ids = backend.pages().into_values().collect();
        Ok(PdfSource { backend, page_ids })
    }

    pub fn open(path: &Path) -> Result<Self, PdfError> {
        if !path.is_file() {
            return Err(PdfError::InputNotFound(path.to_path_buf()));
        }
        Self::from_bytes(&std::fs::read(path)?)
    }

    fn page_id(&self, page_index: usize) -> Result<PageId, PdfError> {
        self.page_ids
            .get(page_index)
            .copied()
            .ok_or_else(|| PdfError::Parse(format!("page {} out of range", page_index)))
    }
}

impl TextLayoutSource for PdfSource {
    fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    fn page_box(&self, page_index: usize) -> Result<Rect, PdfError> {
        self.backend.page_box(self.page_id(page_index)?)
    }

    fn spans(&self, page_index: usize, policy: ColorPolicy) -> Result<Vec<Span>, PdfError> {
        page_spans(&self.backend, self.page_id(page_index)?, page_index, policy).collect()
    }

    fn tables(&self, page_index: usize, strategy: TableStrategy) -> Vec<TableGeometry> {
        if strategy == TableStrategy::None {
            return Vec::new();
        }
        let marks = self
            .page_id(page_index)
            .and_then(|id| interpret_page(&self.backend, id));
        match marks {
            Ok(marks) => find_tables(strategy, &marks),
            Err(e) => {
                log::warn!("page {}: no tables ({})", page_index, e);
                Vec::new()
            }
        }
    }
}

impl ImageSource for PdfSource {
    fn images(&self, image_dir: &Path) -> Result<BTreeMap<usize, Vec<ImageRecord>>, PdfError> {
        locate_images(&self.backend, image_dir)
    }
}

/// Knobs of a conversion run.
#[derive(Debug)]
pub struct ConvertOptions {
    pub color_policy: ColorPolicy,
    pub placement_policy: PlacementPolicy,
    pub table_strategy: TableStrategy,
    /// Applied to span text on the way into the output document. Its label
    /// names the output file.
    pub transform: Box<dyn TextTransform>,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        ConvertOptions {
            color_policy: ColorPolicy::default(),
            placement_policy: PlacementPolicy::default(),
            table_strategy: TableStrategy::default(),
            transform: Box::new(Uppercase),
        }
    }
}

/// What a conversion produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionReport {
    pub pdf_path: PathBuf,
    pub json_path: PathBuf,
    pub image_dir: PathBuf,
    pub pages: usize,
    pub spans: usize,
    /// Image files written.
    pub images: usize,
    pub tables: usize,
}

/// Output locations for one source file.
struct OutputPaths {
    image_dir: PathBuf,
    json_path: PathBuf,
    pdf_path: PathBuf,
}

impl OutputPaths {
    fn new(source: &Path, output_dir: &Path, label: &str) -> Self {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let root = output_dir.join(&stem);
        OutputPaths {
            image_dir: root.join("images"),
            json_path: root.join(format!("{}.json", stem)),
            pdf_path: root.join(format!("{}_{}.pdf", stem, label)),
        }
    }
}

/// Convert one PDF.
///
/// Writes `<output_dir>/<stem>/images/`, the `<stem>.json` span record and
/// the rebuilt `<stem>_<label>.pdf`. Any error aborts the run; files already
/// written are left in place.
pub fn convert(
    source: &Path,
    output_dir: &Path,
    options: &ConvertOptions,
) -> Result<ConversionReport, PdfError> {
    let document = PdfSource::open(source)?;
    log::info!(
        "converting {} ({} pages)",
        source.display(),
        document.page_count()
    );

    let paths = OutputPaths::new(source, output_dir, options.transform.label());
    std::fs::create_dir_all(&paths.image_dir)?;

    let mut report = convert_document(&document, &document, &paths.image_dir, options, |writer| {
        writer.save(&paths.pdf_path)
    })
    .and_then(|(record, report)| {
        std::fs::write(&paths.json_path, record.to_json()?)?;
        Ok(report)
    })?;

    report.pdf_path = paths.pdf_path;
    report.json_path = paths.json_path;
    report.image_dir = paths.image_dir;
    log::info!(
        "wrote {} ({} spans, {} images, {} tables)",
        report.pdf_path.display(),
        report.spans,
        report.images,
        report.tables
    );
    Ok(report)
}

/// Run extraction and reconstruction over any source, handing the finished
/// writer to `persist`.
///
/// The sidecar record is returned for the caller to write once the output
/// document is persisted.
pub fn convert_document<F>(
    text: &dyn TextLayoutSource,
    images: &dyn ImageSource,
    image_dir: &Path,
    options: &ConvertOptions,
    persist: F,
) -> Result<(FormattingRecord, ConversionReport), PdfError>
where
    F: FnOnce(PdfWriter) -> Result<(), PdfError>,
{
    let mut located = images.images(image_dir)?;
    let image_files = located.values().map(Vec::len).sum();

    let mut record = FormattingRecord::new();
    let mut writer = PdfWriter::new();
    let mut tables_found = 0;

    for page_index in 0..text.page_count() {
        let media_box = text.page_box(page_index)?;
        let spans = text.spans(page_index, options.color_policy)?;
        let tables = text.tables(page_index, options.table_strategy);
        let page_images = located.remove(&page_index).unwrap_or_default();

        let mut page = writer.begin_page(media_box);
        let summary = reconstruct_page(
            &mut page,
            &spans,
            &page_images,
            &tables,
            options.placement_policy,
            options.transform.as_ref(),
        )?;
        page.finish()?;

        log::debug!(
            "page {}: {} text regions, {} image placements, {} outlines",
            page_index,
            summary.text_regions,
            summary.image_placements,
            summary.outlines
        );
        tables_found += tables.len();
        record.extend(spans);
    }

    let report = ConversionReport {
        pdf_path: PathBuf::new(),
        json_path: PathBuf::new(),
        image_dir: image_dir.to_path_buf(),
        pages: writer.page_count(),
        spans: record.len(),
        images: image_files,
        tables: tables_found,
    };
    persist(writer)?;
    Ok((record, report))
}

/// Extract the span record of a PDF without writing anything.
pub fn extract_record(bytes: &[u8], policy: ColorPolicy) -> Result<FormattingRecord, PdfError> {
    let document = PdfSource::from_bytes(bytes)?;
    let mut record = FormattingRecord::new();
    for page_index in 0..document.page_count() {
        record.extend(document.spans(page_index, policy)?);
    }
    Ok(record)
}
