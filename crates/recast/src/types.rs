use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Axis-aligned rectangle in a page's native PDF user space (origin at the
/// bottom-left, y growing upwards).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub const fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Rect { x0, y0, x1, y1 }
    }

    /// Build a normalized rect from two arbitrary corners.
    pub fn from_corners(ax: f32, ay: f32, bx: f32, by: f32) -> Self {
        Rect {
            x0: ax.min(bx),
            y0: ay.min(by),
            x1: ax.max(bx),
            y1: ay.max(by),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Smallest rect containing both `self` and `other`.
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.x0, self.y0, self.x1, self.y1]
    }
}

impl From<[f32; 4]> for Rect {
    fn from(v: [f32; 4]) -> Self {
        Rect::new(v[0], v[1], v[2], v[3])
    }
}

impl From<Rect> for [f32; 4] {
    fn from(r: Rect) -> Self {
        r.to_array()
    }
}

/// An 8-bit RGB triple, rendered as `rgb(r,g,b)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }

    /// Components scaled to the `0.0..=1.0` range used by PDF color operators.
    pub fn to_unit(self) -> (f32, f32, f32) {
        (
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
        )
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({},{},{})", self.r, self.g, self.b)
    }
}

impl FromStr for Rgb {
    type Err = InvalidRgb;

    /// Accepts `rgb(r,g,b)` (whitespace tolerated) or a bare `r,g,b`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let inner = s
            .strip_prefix("rgb(")
            .and_then(|rest| rest.strip_suffix(')'))
            .unwrap_or(s);
        let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(InvalidRgb(s.to_string()));
        }
        let channel = |p: &str| p.parse::<u8>().map_err(|_| InvalidRgb(s.to_string()));
        Ok(Rgb::new(
            channel(parts[0])?,
            channel(parts[1])?,
            channel(parts[2])?,
        ))
    }
}

impl From<Rgb> for String {
    fn from(c: Rgb) -> Self {
        c.to_string()
    }
}

impl TryFrom<String> for Rgb {
    type Error = InvalidRgb;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Error)]
#[error("Invalid color (expected 'rgb(r,g,b)'): {0}")]
pub struct InvalidRgb(pub String);

/// A contiguous run of text sharing one font, size, color and style.
///
/// This is also the record shape of the sidecar JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub content: String,
    #[serde(rename = "font")]
    pub font_name: String,
    pub font_size: f32,
    pub color: Rgb,
    pub bold: bool,
    pub italic: bool,
    pub bbox: Rect,
}

/// One image resource as placed on one page.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    /// 0-based page index.
    pub page_index: usize,
    /// Object number of the image XObject in the source document.
    pub cross_reference_id: u32,
    pub raw_bytes: Vec<u8>,
    pub extension: String,
    /// Every rectangle the image is painted at on this page, in paint order.
    pub placement_rects: Vec<Rect>,
}

/// A detected table region.
#[derive(Debug, Clone, PartialEq)]
pub struct TableGeometry {
    pub table_bbox: Rect,
    /// Row-major cell slots. `None` marks a merged or void slot.
    pub cell_bboxes: Vec<Option<Rect>>,
}

/// Every span of a document in page order, then reading order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormattingRecord(Vec<Span>);

impl FormattingRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, spans: impl IntoIterator<Item = Span>) {
        self.0.extend(spans);
    }

    pub fn spans(&self) -> &[Span] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// File format of an extracted image. Payloads that are not JPEG are
/// re-encoded as PNG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    /// File extension used when the image is written to disk.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Png => "png",
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Extracted payload of an image XObject and its file format.
#[derive(Debug, Clone)]
pub struct ImageData {
    pub id: u32,
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
}
