//! Content-stream interpretation and text layout.
//!
//! This module turns a page's content stream into the structured text
//! description every other extractor reads from:
//!
//! ```text
//! content ops  ->  PageMarks            ->  TextPage
//!   (per page)      interpret_page           build_text_page
//!                   (runs, image             (block -> line -> span tree,
//!                    placements, rulings)     image blocks interleaved)
//! ```
//!
//! Coordinates are kept in the page's PDF user space (origin bottom-left).

use super::backend::{
    get_number_from_value, BackendFontInfo, ContentOp, ObjectId, PageId, PdfBackend, PdfValue,
    XObjectInfo, XObjectKind,
};
use crate::types::Rect;
use crate::PdfError;

// ---------------------------------------------------------------------------
// Style flags
// ---------------------------------------------------------------------------

/// Raised text (positive text rise).
pub const FLAG_SUPERSCRIPT: u32 = 1 << 0;
pub const FLAG_ITALIC: u32 = 1 << 1;
pub const FLAG_SERIF: u32 = 1 << 2;
pub const FLAG_MONOSPACE: u32 = 1 << 3;
pub const FLAG_BOLD: u32 = 1 << 4;

// FontDescriptor `Flags` bits (PDF 32000-1, table 123).
const DESCRIPTOR_FIXED_PITCH: i64 = 1 << 0;
const DESCRIPTOR_SERIF: i64 = 1 << 1;
const DESCRIPTOR_ITALIC: i64 = 1 << 6;
const DESCRIPTOR_FORCE_BOLD: i64 = 1 << 18;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Affine matrix `[a, b, c, d, e, f]` in PDF row-vector convention.
pub type Matrix = [f32; 6];

/// The identity matrix.
pub const IDENTITY_MATRIX: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// A fill color as the content stream set it.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeColor {
    Gray(f32),
    Rgb(f32, f32, f32),
    Cmyk(f32, f32, f32, f32),
    /// `sc`/`scn` components in a color space the engine does not resolve.
    Components(Vec<f32>),
    /// A pattern fill, identified by its resource name.
    Pattern(Vec<u8>),
}

impl Default for NativeColor {
    fn default() -> Self {
        NativeColor::Gray(0.0)
    }
}

/// A single run of text sharing font, size, flags and color.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub text: String,
    pub font_name: String,
    pub font_size: f32,
    pub flags: u32,
    pub color: NativeColor,
    pub bbox: Rect,
    /// Baseline height in user space, used to group spans into lines.
    pub baseline: f32,
}

impl TextSpan {
    fn same_style(&self, other: &TextSpan) -> bool {
        self.font_name == other.font_name
            && (self.font_size - other.font_size).abs() < 0.01
            && self.flags == other.flags
            && self.color == other.color
    }
}

/// A horizontal line of text assembled from one or more [`TextSpan`]s that
/// share (approximately) the same baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub spans: Vec<TextSpan>,
    pub bbox: Rect,
}

impl TextLine {
    /// Concatenate all span texts with a single space separator.
    pub fn text(&self) -> String {
        self.spans
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn font_size(&self) -> f32 {
        self.spans
            .iter()
            .map(|s| s.font_size)
            .fold(0.0_f32, f32::max)
    }
}

/// A node of the page's block list.
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutBlock {
    Text { bbox: Rect, lines: Vec<TextLine> },
    Image { bbox: Rect, name: Vec<u8> },
}

impl LayoutBlock {
    pub fn bbox(&self) -> Rect {
        match self {
            LayoutBlock::Text { bbox, .. } | LayoutBlock::Image { bbox, .. } => *bbox,
        }
    }
}

/// The structured text description of one page.
#[derive(Debug, Clone, PartialEq)]
pub struct TextPage {
    pub page_box: Rect,
    pub blocks: Vec<LayoutBlock>,
}

/// One painting of an image XObject.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePlacement {
    pub name: Vec<u8>,
    pub id: Option<ObjectId>,
    pub rect: Rect,
}

/// An axis-aligned painted segment. Horizontal segments have `y0 == y1`,
/// vertical ones `x0 == x1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Segment {
    pub fn is_horizontal(&self) -> bool {
        self.y0 == self.y1
    }
}

/// Everything the interpreter recorded for one page, in paint order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMarks {
    pub spans: Vec<TextSpan>,
    pub images: Vec<ImagePlacement>,
    pub rulings: Vec<Segment>,
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Two spans whose baselines differ by less than this are treated as
/// belonging to the same line.
const Y_TOLERANCE: f32 = 1.0;

/// Approximate glyph advance as a fraction of the em when the font carries
/// no `Widths` entry.
const APPROX_CHAR_WIDTH_RATIO: f32 = 0.5;

/// Minimum gap (in points) between adjacent spans before we insert a space.
const MIN_WORD_GAP: f32 = 1.5;

/// When grouping lines into blocks, a vertical gap larger than this multiple
/// of the line's font size starts a new block.
const BLOCK_GAP_FACTOR: f32 = 1.4;

/// Defaults used when the font descriptor has no ascent/descent.
const DEFAULT_ASCENT: f32 = 0.8;
const DEFAULT_DESCENT: f32 = -0.2;

/// Segments shorter than this many points are ignored.
const MIN_SEGMENT_LENGTH: f32 = 1.0;

/// Slack allowed when deciding whether a segment is axis-aligned.
const AXIS_TOLERANCE: f32 = 0.5;

/// Form XObjects nested deeper than this are not followed.
const MAX_FORM_DEPTH: usize = 8;

// ---------------------------------------------------------------------------
// CJK / spaceless-script helper
// ---------------------------------------------------------------------------

/// Returns `true` if `c` belongs to a script that does not use inter-word
/// spaces (CJK Unified Ideographs, Hiragana, Katakana, Hangul, Thai, etc.).
pub fn is_spaceless_script_char(c: char) -> bool {
    matches!(
        c as u32,
        0x4E00..=0x9FFF
            | 0x3400..=0x4DBF
            | 0x20000..=0x2A6DF
            | 0xF900..=0xFAFF
            | 0x3040..=0x309F
            | 0x30A0..=0x30FF
            | 0x31F0..=0x31FF
            | 0xAC00..=0xD7AF
            | 0x1100..=0x11FF
            | 0x3130..=0x318F
            | 0x3000..=0x303F
            | 0xFF00..=0xFFEF
            | 0x0E00..=0x0E7F
            | 0x0E80..=0x0EFF
            | 0x1000..=0x109F
            | 0x1780..=0x17FF
            | 0x0F00..=0x0FFF
    )
}

// ---------------------------------------------------------------------------
// Matrix helpers
// ---------------------------------------------------------------------------

/// `a` followed by `b`: a point is first transformed by `a`, then by `b`.
pub fn multiply(a: &Matrix, b: &Matrix) -> Matrix {
    [
        a[0] * b[0] + a[1] * b[2],
        a[0] * b[1] + a[1] * b[3],
        a[2] * b[0] + a[3] * b[2],
        a[2] * b[1] + a[3] * b[3],
        a[4] * b[0] + a[5] * b[2] + b[4],
        a[4] * b[1] + a[5] * b[3] + b[5],
    ]
}

pub fn transform_point(m: &Matrix, x: f32, y: f32) -> (f32, f32) {
    (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
}

/// Bounding box of a rectangle given in the coordinate space of `m`.
pub fn transform_rect(m: &Matrix, x0: f32, y0: f32, x1: f32, y1: f32) -> Rect {
    let corners = [
        transform_point(m, x0, y0),
        transform_point(m, x1, y0),
        transform_point(m, x0, y1),
        transform_point(m, x1, y1),
    ];
    let (mut rx0, mut ry0) = corners[0];
    let (mut rx1, mut ry1) = corners[0];
    for (x, y) in &corners[1..] {
        rx0 = rx0.min(*x);
        ry0 = ry0.min(*y);
        rx1 = rx1.max(*x);
        ry1 = ry1.max(*y);
    }
    Rect::new(rx0, ry0, rx1, ry1)
}

fn matrix_from_operands(operands: &[PdfValue]) -> Option<Matrix> {
    if operands.len() < 6 {
        return None;
    }
    let vals: Vec<f32> = operands
        .iter()
        .take(6)
        .filter_map(get_number_from_value)
        .collect();
    (vals.len() == 6).then(|| [vals[0], vals[1], vals[2], vals[3], vals[4], vals[5]])
}

// ---------------------------------------------------------------------------
// Font helpers
// ---------------------------------------------------------------------------

/// Strip a subset tag (`ABCDEF+`) from a base font name.
pub fn strip_subset_tag(name: &str) -> &str {
    match name.split_once('+') {
        Some((tag, rest))
            if tag.len() == 6 && tag.bytes().all(|b| b.is_ascii_uppercase()) =>
        {
            rest
        }
        _ => name,
    }
}

/// Derive the style-flags integer for a font.
pub fn font_flags(font: Option<&BackendFontInfo>, font_name: &str) -> u32 {
    let mut flags = 0;
    let upper = font_name.to_uppercase();

    if upper.contains("BOLD") || upper.contains("BLACK") || upper.contains("HEAVY") {
        flags |= FLAG_BOLD;
    }
    if upper.contains("ITALIC") || upper.contains("OBLIQUE") {
        flags |= FLAG_ITALIC;
    }

    if let Some(font) = font {
        if let Some(desc) = font.descriptor_flags {
            if desc & DESCRIPTOR_FIXED_PITCH != 0 {
                flags |= FLAG_MONOSPACE;
            }
            if desc & DESCRIPTOR_SERIF != 0 {
                flags |= FLAG_SERIF;
            }
            if desc & DESCRIPTOR_ITALIC != 0 {
                flags |= FLAG_ITALIC;
            }
            if desc & DESCRIPTOR_FORCE_BOLD != 0 {
                flags |= FLAG_BOLD;
            }
        }
        if font.font_weight.is_some_and(|w| w >= 600.0) {
            flags |= FLAG_BOLD;
        }
    }

    flags
}

// ---------------------------------------------------------------------------
// Internal: PDF graphics/text state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FillSpace {
    Gray,
    Rgb,
    Cmyk,
    Pattern,
    Other,
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    fill: NativeColor,
    fill_space: FillSpace,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: IDENTITY_MATRIX,
            fill: NativeColor::default(),
            fill_space: FillSpace::Gray,
        }
    }
}

/// Mutable text state tracked while walking a content stream.
#[derive(Debug, Clone)]
struct TextState {
    /// Current font resource name (the `/F1`-style key, not the full name).
    font_key: Vec<u8>,
    /// Resolved font for the current key, when the resources declare it.
    font: Option<BackendFontInfo>,
    /// Base font name without subset tag.
    font_name: String,
    font_size: f32,
    text_matrix: Matrix,
    line_matrix: Matrix,
    /// Horizontal scaling factor (percent / 100).  Default 1.0.
    horiz_scale: f32,
    char_spacing: f32,
    word_spacing: f32,
    text_rise: f32,
    leading: f32,
    flags: u32,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            font_key: Vec::new(),
            font: None,
            font_name: String::new(),
            font_size: 0.0,
            text_matrix: IDENTITY_MATRIX,
            line_matrix: IDENTITY_MATRIX,
            horiz_scale: 1.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            text_rise: 0.0,
            leading: 0.0,
            flags: 0,
        }
    }
}

impl TextState {
    /// Effective font size accounting for the text and graphics matrices.
    fn effective_font_size(&self, ctm: &Matrix) -> f32 {
        let m = multiply(&self.text_matrix, ctm);
        let scale = (m[2].powi(2) + m[3].powi(2)).sqrt();
        (self.font_size * scale).abs()
    }

    /// Advance the text matrix horizontally by `dx` text-space units.
    fn advance_x(&mut self, dx: f32) {
        self.text_matrix[4] += dx * self.text_matrix[0];
        self.text_matrix[5] += dx * self.text_matrix[1];
    }

    /// Multiply the text line matrix by a translation (used by Td / TD).
    fn translate_line(&mut self, tx: f32, ty: f32) {
        let new_tx = self.line_matrix[0] * tx + self.line_matrix[2] * ty + self.line_matrix[4];
        let new_ty = self.line_matrix[1] * tx + self.line_matrix[3] * ty + self.line_matrix[5];
        self.line_matrix[4] = new_tx;
        self.line_matrix[5] = new_ty;
        self.text_matrix = self.line_matrix;
    }

    /// Apply the `Tf` operator.
    fn set_font(&mut self, key: Vec<u8>, font: Option<BackendFontInfo>, size: f32) {
        let base = font
            .as_ref()
            .and_then(|f| f.base_font.clone())
            .unwrap_or_else(|| String::from_utf8_lossy(&key).into_owned());
        self.font_name = strip_subset_tag(&base).to_string();
        self.flags = font_flags(font.as_ref(), &self.font_name);
        self.font_key = key;
        self.font = font;
        self.font_size = size;
    }

    /// Advance (in unscaled text space) of one shown string.
    fn string_advance(&self, bytes: &[u8], decoded: &str) -> f32 {
        let em = |w: f32| (w * self.font_size + self.char_spacing) * self.horiz_scale;

        match &self.font {
            Some(font) if !font.is_composite() => bytes
                .iter()
                .map(|&b| {
                    let w = font
                        .width_of(b)
                        .map(|w| w / 1000.0)
                        .unwrap_or(APPROX_CHAR_WIDTH_RATIO);
                    let space = if b == b' ' { self.word_spacing } else { 0.0 };
                    em(w) + space * self.horiz_scale
                })
                .sum(),
            _ => decoded
                .chars()
                .map(|c| {
                    let space = if c == ' ' { self.word_spacing } else { 0.0 };
                    em(APPROX_CHAR_WIDTH_RATIO) + space * self.horiz_scale
                })
                .sum(),
        }
    }

    fn ascent(&self) -> f32 {
        self.font
            .as_ref()
            .and_then(|f| f.ascent)
            .filter(|a| *a > 0.0)
            .map(|a| a / 1000.0)
            .unwrap_or(DEFAULT_ASCENT)
    }

    fn descent(&self) -> f32 {
        self.font
            .as_ref()
            .and_then(|f| f.descent)
            .filter(|d| *d < 0.0)
            .map(|d| d / 1000.0)
            .unwrap_or(DEFAULT_DESCENT)
    }
}

/// Resource lookup context for the content stream being interpreted.
struct Scope {
    id: ObjectId,
    fonts: Vec<BackendFontInfo>,
    xobjects: Vec<XObjectInfo>,
}

impl Scope {
    fn load(backend: &dyn PdfBackend, id: ObjectId, parent: Option<&Scope>) -> Self {
        let mut fonts = backend.page_fonts(id).unwrap_or_default();
        let mut xobjects = backend.page_xobjects(id).unwrap_or_default();
        // Forms without their own resources inherit the enclosing ones.
        if let Some(parent) = parent {
            if fonts.is_empty() {
                fonts = parent.fonts.clone();
            }
            if xobjects.is_empty() {
                xobjects = parent.xobjects.clone();
            }
        }
        Scope {
            id,
            fonts,
            xobjects,
        }
    }

    fn font(&self, key: &[u8]) -> Option<&BackendFontInfo> {
        self.fonts.iter().find(|info| info.name == key)
    }

    fn xobject(&self, name: &[u8]) -> Option<&XObjectInfo> {
        self.xobjects.iter().find(|x| x.name == name)
    }
}

/// Path under construction, already in user space.
#[derive(Debug, Default)]
struct PathBuilder {
    segments: Vec<((f32, f32), (f32, f32))>,
    current: Option<(f32, f32)>,
    start: Option<(f32, f32)>,
}

impl PathBuilder {
    fn move_to(&mut self, p: (f32, f32)) {
        self.current = Some(p);
        self.start = Some(p);
    }

    fn line_to(&mut self, p: (f32, f32)) {
        if let Some(cur) = self.current {
            self.segments.push((cur, p));
        }
        self.current = Some(p);
    }

    fn close(&mut self) {
        if let (Some(cur), Some(start)) = (self.current, self.start) {
            if cur != start {
                self.segments.push((cur, start));
            }
            self.current = Some(start);
        }
    }

    fn rect(&mut self, ctm: &Matrix, x: f32, y: f32, w: f32, h: f32) {
        let p0 = transform_point(ctm, x, y);
        let p1 = transform_point(ctm, x + w, y);
        let p2 = transform_point(ctm, x + w, y + h);
        let p3 = transform_point(ctm, x, y + h);
        self.segments.extend([(p0, p1), (p1, p2), (p2, p3), (p3, p0)]);
        self.current = Some(p0);
        self.start = Some(p0);
    }

    /// Flush the path, keeping its axis-aligned segments.
    fn take_rulings(&mut self) -> Vec<Segment> {
        let segments = std::mem::take(&mut self.segments);
        self.current = None;
        self.start = None;
        segments
            .into_iter()
            .filter_map(|((ax, ay), (bx, by))| axis_aligned(ax, ay, bx, by))
            .collect()
    }

    fn discard(&mut self) {
        self.segments.clear();
        self.current = None;
        self.start = None;
    }
}

fn axis_aligned(ax: f32, ay: f32, bx: f32, by: f32) -> Option<Segment> {
    if (ay - by).abs() <= AXIS_TOLERANCE && (ax - bx).abs() >= MIN_SEGMENT_LENGTH {
        let y = (ay + by) / 2.0;
        return Some(Segment {
            x0: ax.min(bx),
            y0: y,
            x1: ax.max(bx),
            y1: y,
        });
    }
    if (ax - bx).abs() <= AXIS_TOLERANCE && (ay - by).abs() >= MIN_SEGMENT_LENGTH {
        let x = (ax + bx) / 2.0;
        return Some(Segment {
            x0: x,
            y0: ay.min(by),
            x1: x,
            y1: ay.max(by),
        });
    }
    None
}

fn numbers(operands: &[PdfValue]) -> Vec<f32> {
    operands.iter().filter_map(get_number_from_value).collect()
}

fn point_operand(operands: &[PdfValue], ctm: &Matrix) -> Option<(f32, f32)> {
    let vals = numbers(operands);
    (vals.len() >= 2).then(|| transform_point(ctm, vals[0], vals[1]))
}

struct Interpreter<'a> {
    backend: &'a dyn PdfBackend,
    marks: PageMarks,
}

impl<'a> Interpreter<'a> {
    /// Walk one content stream.
    ///
    /// | Operator group | Operators |
    /// |----------------|-----------|
    /// | graphics state | `q` `Q` `cm` |
    /// | fill color     | `g` `rg` `k` `cs` `sc` `scn` |
    /// | text objects   | `BT` `ET` `Tf` `Tm` `Td` `TD` `T*` `TL` `Tc` `Tw` `Tz` `Ts` |
    /// | text showing   | `Tj` `TJ` `'` `"` |
    /// | paths          | `m` `l` `re` `h` and every painting operator, `n` |
    /// | XObjects       | `Do` |
    fn run(&mut self, scope: &Scope, ops: &[ContentOp], base_ctm: Matrix, depth: usize) {
        let mut gs = GraphicsState {
            ctm: base_ctm,
            ..Default::default()
        };
        let mut stack: Vec<GraphicsState> = Vec::new();
        let mut ts = TextState::default();
        let mut path = PathBuilder::default();

        for op in ops {
            let operands = op.operands.as_slice();
            match op.operator.as_str() {
                // -- Graphics state -----------------------------------------
                "q" => stack.push(gs.clone()),
                "Q" => {
                    if let Some(saved) = stack.pop() {
                        gs = saved;
                    }
                }
                "cm" => {
                    if let Some(m) = matrix_from_operands(operands) {
                        gs.ctm = multiply(&m, &gs.ctm);
                    }
                }

                // -- Fill color ---------------------------------------------
                "g" => {
                    if let Some(v) = operands.first().and_then(get_number_from_value) {
                        gs.fill = NativeColor::Gray(v);
                        gs.fill_space = FillSpace::Gray;
                    }
                }
                "rg" => {
                    let v = numbers(operands);
                    if v.len() >= 3 {
                        gs.fill = NativeColor::Rgb(v[0], v[1], v[2]);
                        gs.fill_space = FillSpace::Rgb;
                    }
                }
                "k" => {
                    let v = numbers(operands);
                    if v.len() >= 4 {
                        gs.fill = NativeColor::Cmyk(v[0], v[1], v[2], v[3]);
                        gs.fill_space = FillSpace::Cmyk;
                    }
                }
                "cs" => {
                    gs.fill_space = match operands.first() {
                        Some(PdfValue::Name(n)) => match n.as_slice() {
                            b"DeviceGray" | b"CalGray" | b"G" => FillSpace::Gray,
                            b"DeviceRGB" | b"CalRGB" | b"RGB" => FillSpace::Rgb,
                            b"DeviceCMYK" | b"CMYK" => FillSpace::Cmyk,
                            b"Pattern" => FillSpace::Pattern,
                            _ => FillSpace::Other,
                        },
                        _ => FillSpace::Other,
                    };
                    gs.fill = match gs.fill_space {
                        FillSpace::Cmyk => NativeColor::Cmyk(0.0, 0.0, 0.0, 1.0),
                        FillSpace::Rgb => NativeColor::Rgb(0.0, 0.0, 0.0),
                        _ => NativeColor::Gray(0.0),
                    };
                }
                "sc" | "scn" => gs.fill = fill_from_components(gs.fill_space, operands),

                // -- Text object delimiters ---------------------------------
                "BT" => {
                    ts.text_matrix = IDENTITY_MATRIX;
                    ts.line_matrix = IDENTITY_MATRIX;
                }
                "ET" => {}

                // -- Font ---------------------------------------------------
                "Tf" => {
                    if operands.len() >= 2 {
                        let key = match &operands[0] {
                            PdfValue::Name(n) | PdfValue::Str(n) => Some(n.clone()),
                            _ => None,
                        };
                        if let Some(key) = key {
                            let size = get_number_from_value(&operands[1]).unwrap_or(0.0);
                            let font = scope.font(&key).cloned();
                            ts.set_font(key, font, size);
                        }
                    }
                }

                // -- Text matrix / position ---------------------------------
                "Tm" => {
                    if let Some(m) = matrix_from_operands(operands) {
                        ts.text_matrix = m;
                        ts.line_matrix = m;
                    }
                }
                "Td" => {
                    let v = numbers(operands);
                    if v.len() >= 2 {
                        ts.translate_line(v[0], v[1]);
                    }
                }
                "TD" => {
                    let v = numbers(operands);
                    if v.len() >= 2 {
                        ts.leading = -v[1];
                        ts.translate_line(v[0], v[1]);
                    }
                }
                "T*" => ts.translate_line(0.0, -ts.leading),
                "TL" => {
                    if let Some(v) = operands.first().and_then(get_number_from_value) {
                        ts.leading = v;
                    }
                }
                "Tc" => {
                    if let Some(v) = operands.first().and_then(get_number_from_value) {
                        ts.char_spacing = v;
                    }
                }
                "Tw" => {
                    if let Some(v) = operands.first().and_then(get_number_from_value) {
                        ts.word_spacing = v;
                    }
                }
                "Tz" => {
                    if let Some(v) = operands.first().and_then(get_number_from_value) {
                        ts.horiz_scale = v / 100.0;
                    }
                }
                "Ts" => {
                    if let Some(v) = operands.first().and_then(get_number_from_value) {
                        ts.text_rise = v;
                    }
                }

                // -- Show text ----------------------------------------------
                "Tj" => {
                    if let Some(first) = operands.first() {
                        self.show_string(scope, first, &gs, &mut ts);
                    }
                }
                "TJ" => {
                    if let Some(PdfValue::Array(arr)) = operands.first() {
                        self.show_array(scope, arr, &gs, &mut ts);
                    }
                }
                "'" => {
                    ts.translate_line(0.0, -ts.leading);
                    if let Some(first) = operands.first() {
                        self.show_string(scope, first, &gs, &mut ts);
                    }
                }
                "\"" => {
                    if operands.len() >= 3 {
                        if let Some(aw) = get_number_from_value(&operands[0]) {
                            ts.word_spacing = aw;
                        }
                        if let Some(ac) = get_number_from_value(&operands[1]) {
                            ts.char_spacing = ac;
                        }
                        ts.translate_line(0.0, -ts.leading);
                        self.show_string(scope, &operands[2], &gs, &mut ts);
                    }
                }

                // -- Path construction --------------------------------------
                "m" => {
                    if let Some(p) = point_operand(operands, &gs.ctm) {
                        path.move_to(p);
                    }
                }
                "l" => {
                    if let Some(p) = point_operand(operands, &gs.ctm) {
                        path.line_to(p);
                    }
                }
                "re" => {
                    let v = numbers(operands);
                    if v.len() >= 4 {
                        path.rect(&gs.ctm, v[0], v[1], v[2], v[3]);
                    }
                }
                "h" => path.close(),
                "S" | "f" | "F" | "f*" | "B" | "B*" => {
                    let rulings = path.take_rulings();
                    self.marks.rulings.extend(rulings);
                }
                "s" | "b" | "b*" => {
                    path.close();
                    let rulings = path.take_rulings();
                    self.marks.rulings.extend(rulings);
                }
                "n" => path.discard(),

                // -- XObjects -----------------------------------------------
                "Do" => {
                    if let Some(PdfValue::Name(name)) = operands.first() {
                        self.paint_xobject(scope, name, &gs, depth);
                    }
                }

                _ => {}
            }
        }
    }

    fn paint_xobject(&mut self, scope: &Scope, name: &[u8], gs: &GraphicsState, depth: usize) {
        let Some(info) = scope.xobject(name) else {
            log::debug!(
                "XObject /{} not found in resources",
                String::from_utf8_lossy(name)
            );
            return;
        };

        match &info.kind {
            XObjectKind::Image => {
                let rect = transform_rect(&gs.ctm, 0.0, 0.0, 1.0, 1.0);
                self.marks.images.push(ImagePlacement {
                    name: name.to_vec(),
                    id: info.id,
                    rect,
                });
            }
            XObjectKind::Form { matrix } => {
                let Some(form_id) = info.id else {
                    return;
                };
                if depth >= MAX_FORM_DEPTH {
                    log::warn!("form XObject nesting deeper than {MAX_FORM_DEPTH}, skipping");
                    return;
                }
                let ops = match self
                    .backend
                    .page_content(form_id)
                    .and_then(|raw| self.backend.decode_content(&raw))
                {
                    Ok(ops) => ops,
                    Err(e) => {
                        log::warn!("skipping unreadable form XObject {:?}: {}", form_id, e);
                        return;
                    }
                };
                let form_scope = Scope::load(self.backend, form_id, Some(scope));
                let ctm = multiply(matrix, &gs.ctm);
                self.run(&form_scope, &ops, ctm, depth + 1);
            }
            XObjectKind::Other => {}
        }
    }

    fn decode(&self, scope: &Scope, val: &PdfValue, ts: &TextState) -> Option<(Vec<u8>, String)> {
        match val {
            PdfValue::Str(bytes) => {
                let decoded = self.backend.decode_text(scope.id, &ts.font_key, bytes);
                let text = if decoded.is_empty() {
                    super::backend::decode_text_simple(bytes)
                } else {
                    decoded
                };
                Some((bytes.clone(), text))
            }
            _ => None,
        }
    }

    /// Decode an operand as a string, record a span and advance the text
    /// position.  Shared by `Tj`, `'`, and `"`.
    fn show_string(
        &mut self,
        scope: &Scope,
        operand: &PdfValue,
        gs: &GraphicsState,
        ts: &mut TextState,
    ) {
        let Some((bytes, text)) = self.decode(scope, operand, ts) else {
            return;
        };
        if text.is_empty() {
            return;
        }
        let advance = ts.string_advance(&bytes, &text);
        self.push_span(text, advance, gs, ts);
        ts.advance_x(advance);
    }

    /// Process a `TJ` array: elements are either strings to render or numeric
    /// kerning adjustments (in thousandths of a unit of text space).
    fn show_array(
        &mut self,
        scope: &Scope,
        arr: &[PdfValue],
        gs: &GraphicsState,
        ts: &mut TextState,
    ) {
        let start = ts.clone();
        let mut buf = String::new();
        let mut advance: f32 = 0.0;

        for elem in arr {
            match elem {
                PdfValue::Str(_) => {
                    if let Some((bytes, fragment)) = self.decode(scope, elem, ts) {
                        let dx = ts.string_advance(&bytes, &fragment);
                        buf.push_str(&fragment);
                        ts.advance_x(dx);
                        advance += dx;
                    }
                }
                val => {
                    if let Some(adj) = get_number_from_value(val) {
                        let dx = -adj / 1000.0 * ts.font_size * ts.horiz_scale;
                        // A displacement this large reads as a word gap.
                        let gap_threshold =
                            ts.font_size * APPROX_CHAR_WIDTH_RATIO * ts.horiz_scale * 0.3;
                        if dx > gap_threshold && !buf.is_empty() && !buf.ends_with(' ') {
                            buf.push(' ');
                        }
                        ts.advance_x(dx);
                        advance += dx;
                    }
                }
            }
        }

        let trimmed = buf.trim_end();
        if !trimmed.is_empty() {
            self.push_span(trimmed.to_string(), advance, gs, &start);
        }
    }

    fn push_span(&mut self, text: String, advance: f32, gs: &GraphicsState, ts: &TextState) {
        let m = multiply(&ts.text_matrix, &gs.ctm);
        let bottom = ts.descent() * ts.font_size + ts.text_rise;
        let top = ts.ascent() * ts.font_size + ts.text_rise;
        let bbox = transform_rect(&m, 0.0, bottom, advance, top);
        let (_, baseline) = transform_point(&m, 0.0, ts.text_rise);

        let mut flags = ts.flags;
        if ts.text_rise > 0.0 {
            flags |= FLAG_SUPERSCRIPT;
        }

        self.marks.spans.push(TextSpan {
            text,
            font_name: ts.font_name.clone(),
            font_size: ts.effective_font_size(&gs.ctm),
            flags,
            color: gs.fill.clone(),
            bbox,
            baseline,
        });
    }
}

fn fill_from_components(space: FillSpace, operands: &[PdfValue]) -> NativeColor {
    if let Some(PdfValue::Name(pattern)) = operands.last() {
        return NativeColor::Pattern(pattern.clone());
    }
    let v = numbers(operands);
    match (space, v.len()) {
        (FillSpace::Gray, 1) => NativeColor::Gray(v[0]),
        (FillSpace::Rgb, 3) => NativeColor::Rgb(v[0], v[1], v[2]),
        (FillSpace::Cmyk, 4) => NativeColor::Cmyk(v[0], v[1], v[2], v[3]),
        _ => NativeColor::Components(v),
    }
}

// ---------------------------------------------------------------------------
// Public API: interpretation
// ---------------------------------------------------------------------------

/// Interpret a page's content stream, following form XObjects.
///
/// Returns an error when the page content is missing or cannot be decoded;
/// unreadable nested forms are skipped with a warning.
pub fn interpret_page(backend: &dyn PdfBackend, page_id: PageId) -> Result<PageMarks, PdfError> {
    let raw_content = backend.page_content(page_id)?;
    let ops = backend.decode_content(&raw_content)?;
    let scope = Scope::load(backend, page_id, None);

    let mut interpreter = Interpreter {
        backend,
        marks: PageMarks::default(),
    };
    interpreter.run(&scope, &ops, IDENTITY_MATRIX, 0);
    Ok(interpreter.marks)
}

// ---------------------------------------------------------------------------
// Public API: span -> line grouping
// ---------------------------------------------------------------------------

/// Group a flat list of [`TextSpan`]s into [`TextLine`]s.
///
/// Spans whose baselines are within [`Y_TOLERANCE`] points of each other
/// are placed on the same line.  Lines are ordered top of page first, spans
/// within a line left to right.
pub fn group_spans_into_lines(mut spans: Vec<TextSpan>) -> Vec<TextLine> {
    if spans.is_empty() {
        return Vec::new();
    }

    spans.sort_by(|a, b| {
        b.baseline
            .partial_cmp(&a.baseline)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                a.bbox
                    .x0
                    .partial_cmp(&b.bbox.x0)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    });

    let mut lines: Vec<TextLine> = Vec::new();
    let mut current_spans: Vec<TextSpan> = Vec::new();
    let mut current_y = spans[0].baseline;

    for span in spans {
        if (span.baseline - current_y).abs() > Y_TOLERANCE && !current_spans.is_empty() {
            lines.push(assemble_line(std::mem::take(&mut current_spans)));
            current_y = span.baseline;
        }
        current_spans.push(span);
    }

    if !current_spans.is_empty() {
        lines.push(assemble_line(current_spans));
    }

    lines
}

/// Build a [`TextLine`] from spans known to share the same baseline.
///
/// Neighbouring spans of identical style are merged into one run; a space is
/// inserted when the gap between them exceeds [`MIN_WORD_GAP`] and neither
/// boundary character belongs to a spaceless script.
fn assemble_line(mut spans: Vec<TextSpan>) -> TextLine {
    spans.sort_by(|a, b| {
        a.bbox
            .x0
            .partial_cmp(&b.bbox.x0)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut merged: Vec<TextSpan> = Vec::with_capacity(spans.len());

    for span in spans {
        if let Some(prev) = merged.last_mut() {
            let gap = span.bbox.x0 - prev.bbox.x1;

            if prev.same_style(&span) && gap > -prev.font_size && gap < prev.font_size * 2.0 {
                let needs_space = gap >= MIN_WORD_GAP
                    && !prev.text.ends_with(' ')
                    && !span.text.starts_with(' ')
                    && !boundary_is_spaceless(prev, &span);
                if needs_space {
                    prev.text.push(' ');
                }
                prev.text.push_str(&span.text);
                prev.bbox = prev.bbox.union(&span.bbox);
                continue;
            }
        }

        merged.push(span);
    }

    let bbox = merged
        .iter()
        .skip(1)
        .fold(merged[0].bbox, |acc, s| acc.union(&s.bbox));

    TextLine {
        spans: merged,
        bbox,
    }
}

/// Check whether the boundary between two adjacent spans is between
/// spaceless-script characters (no space needed).
fn boundary_is_spaceless(prev: &TextSpan, next: &TextSpan) -> bool {
    let last_char = prev.text.chars().next_back();
    let first_char = next.text.chars().next();
    match (last_char, first_char) {
        (Some(l), Some(f)) => is_spaceless_script_char(l) && is_spaceless_script_char(f),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Public API: line -> block grouping
// ---------------------------------------------------------------------------

/// Group consecutive [`TextLine`]s into text blocks.
///
/// A new block starts when the vertical gap between consecutive lines
/// exceeds [`BLOCK_GAP_FACTOR`] times the previous line's font size.
pub fn group_lines_into_blocks(lines: Vec<TextLine>) -> Vec<LayoutBlock> {
    let mut blocks: Vec<LayoutBlock> = Vec::new();
    let mut current: Vec<TextLine> = Vec::new();

    for line in lines {
        let gap_break = current.last().is_some_and(|prev| {
            let gap = prev.bbox.y0 - line.bbox.y1;
            gap > prev.font_size() * BLOCK_GAP_FACTOR
        });
        if gap_break {
            blocks.push(text_block(std::mem::take(&mut current)));
        }
        current.push(line);
    }

    if !current.is_empty() {
        blocks.push(text_block(current));
    }

    blocks
}

fn text_block(lines: Vec<TextLine>) -> LayoutBlock {
    let bbox = lines
        .iter()
        .skip(1)
        .fold(lines[0].bbox, |acc, l| acc.union(&l.bbox));
    LayoutBlock::Text { bbox, lines }
}

// ---------------------------------------------------------------------------
// Public API: full layout
// ---------------------------------------------------------------------------

/// Assemble the block -> line -> span tree of a page.
///
/// Image placements become image blocks; all blocks are ordered by their top
/// edge, top of page first.
pub fn build_text_page(page_box: Rect, marks: &PageMarks) -> TextPage {
    let lines = group_spans_into_lines(marks.spans.clone());
    let mut blocks = group_lines_into_blocks(lines);

    blocks.extend(marks.images.iter().map(|img| LayoutBlock::Image {
        bbox: img.rect,
        name: img.name.clone(),
    }));
    blocks.sort_by(|a, b| {
        b.bbox()
            .y1
            .partial_cmp(&a.bbox().y1)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    TextPage { page_box, blocks }
}

/// Interpret a page and build its text tree in one step.
pub fn extract_text_page(backend: &dyn PdfBackend, page_id: PageId) -> Result<TextPage, PdfError> {
    let page_box = backend.page_box(page_id)?;
    let marks = interpret_page(backend, page_id)?;
    Ok(build_text_page(page_box, &marks))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
