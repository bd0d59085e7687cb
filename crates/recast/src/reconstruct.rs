//! Page reconstruction.

use crate::markup::{render_markup, TextTransform};
use crate::types::{ImageRecord, Rect, Span, TableGeometry};
use crate::PdfError;

/// Line width of a table's outer outline.
pub const TABLE_OUTLINE_WIDTH: f32 = 1.0;
/// Line width of a cell outline.
pub const CELL_OUTLINE_WIDTH: f32 = 0.5;

/// Where reconstructed content is written to.
pub trait PageSink {
    /// Insert a styled text fragment so that it occupies `rect`.
    fn insert_markup(&mut self, rect: Rect, markup: &str) -> Result<(), PdfError>;

    /// Paint an image so that it fills `rect`.
    fn insert_image(&mut self, rect: Rect, image: &ImageRecord) -> Result<(), PdfError>;

    /// Stroke the outline of `rect`.
    fn draw_outline(&mut self, rect: Rect, line_width: f32) -> Result<(), PdfError>;
}

/// Which recorded placements of an image are restored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlacementPolicy {
    /// Every rect the image was painted at.
    #[default]
    All,
    /// Only the first rect.
    FirstOnly,
}

impl PlacementPolicy {
    fn rects<'a>(&self, image: &'a ImageRecord) -> &'a [Rect] {
        match self {
            PlacementPolicy::All => &image.placement_rects,
            PlacementPolicy::FirstOnly => {
                &image.placement_rects[..image.placement_rects.len().min(1)]
            }
        }
    }
}

/// What a reconstructed page received.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageSummary {
    pub text_regions: usize,
    pub image_placements: usize,
    pub outlines: usize,
}

/// Fill `sink` from one source page's extracted content.
///
/// Text goes in first, then images, then table and cell outlines. Absent
/// cells are skipped.
pub fn reconstruct_page(
    sink: &mut dyn PageSink,
    spans: &[Span],
    images: &[ImageRecord],
    tables: &[TableGeometry],
    placement: PlacementPolicy,
    transform: &dyn TextTransform,
) -> Result<PageSummary, PdfError> {
    let mut summary = PageSummary::default();

    for span in spans {
        sink.insert_markup(span.bbox, &render_markup(span, transform))?;
        summary.text_regions += 1;
    }

    for image in images {
        for rect in placement.rects(image) {
            sink.insert_image(*rect, image)?;
            summary.image_placements += 1;
        }
    }

    for table in tables {
        sink.draw_outline(table.table_bbox, TABLE_OUTLINE_WIDTH)?;
        summary.outlines += 1;
        for cell in table.cell_bboxes.iter().flatten() {
            sink.draw_outline(*cell, CELL_OUTLINE_WIDTH)?;
            summary.outlines += 1;
        }
    }

    Ok(summary)
}
