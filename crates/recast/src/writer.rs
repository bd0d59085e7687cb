//! Output document assembly on top of `lopdf`.
//!
//! [`PdfWriter`] owns the output document; [`PdfPage`] is the in-progress
//! page handed to the reconstructor and committed with [`PdfPage::finish`].

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};

use crate::markup::StyledFragment;
use crate::reconstruct::PageSink;
use crate::types::{ImageRecord, Rect};
use crate::PdfError;

/// Baseline offset below the top of a text region, as a fraction of the
/// font size.
const ASCENT_RATIO: f32 = 0.8;

fn real(v: f32) -> Object {
    Object::Real(v)
}

fn rect_array(rect: Rect) -> Object {
    Object::Array(rect.to_array().into_iter().map(real).collect())
}

/// Pick the standard-14 font closest to a font family name.
pub fn standard_font(family: &str, bold: bool, italic: bool) -> &'static str {
    let lower = family.to_lowercase();
    let is_mono = ["courier", "mono", "consol"]
        .iter()
        .any(|k| lower.contains(k));
    let is_serif = !lower.contains("sans")
        && ["times", "serif", "georgia", "garamond", "roman", "cambria"]
            .iter()
            .any(|k| lower.contains(k));

    match (is_mono, is_serif, bold, italic) {
        (true, _, false, false) => "Courier",
        (true, _, true, false) => "Courier-Bold",
        (true, _, false, true) => "Courier-Oblique",
        (true, _, true, true) => "Courier-BoldOblique",
        (false, true, false, false) => "Times-Roman",
        (false, true, true, false) => "Times-Bold",
        (false, true, false, true) => "Times-Italic",
        (false, true, true, true) => "Times-BoldItalic",
        (false, false, false, false) => "Helvetica",
        (false, false, true, false) => "Helvetica-Bold",
        (false, false, false, true) => "Helvetica-Oblique",
        (false, false, true, true) => "Helvetica-BoldOblique",
    }
}

/// Encode text for a `WinAnsiEncoding` simple font. Characters outside the
/// encoding become `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0x20..=0x7E | 0xA0..=0xFF => c as u8,
            _ => match c {
                '\u{20AC}' => 0x80,
                '\u{201A}' => 0x82,
                '\u{0192}' => 0x83,
                '\u{201E}' => 0x84,
                '\u{2026}' => 0x85,
                '\u{2020}' => 0x86,
                '\u{2021}' => 0x87,
                '\u{02C6}' => 0x88,
                '\u{2030}' => 0x89,
                '\u{0160}' => 0x8A,
                '\u{2039}' => 0x8B,
                '\u{0152}' => 0x8C,
                '\u{017D}' => 0x8E,
                '\u{2018}' => 0x91,
                '\u{2019}' => 0x92,
                '\u{201C}' => 0x93,
                '\u{201D}' => 0x94,
                '\u{2022}' => 0x95,
                '\u{2013}' => 0x96,
                '\u{2014}' => 0x97,
                '\u{02DC}' => 0x98,
                '\u{2122}' => 0x99,
                '\u{0161}' => 0x9A,
                '\u{203A}' => 0x9B,
                '\u{0153}' => 0x9C,
                '\u{017E}' => 0x9E,
                '\u{0178}' => 0x9F,
                _ => b'?',
            },
        })
        .collect()
}

/// The output document under construction.
pub struct PdfWriter {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
    /// Base font name to font dictionary.
    fonts: HashMap<&'static str, ObjectId>,
    /// Source cross-reference id to embedded image XObject.
    images: HashMap<u32, ObjectId>,
}

impl Default for PdfWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfWriter {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        PdfWriter {
            doc,
            pages_id,
            kids: Vec::new(),
            fonts: HashMap::new(),
            images: HashMap::new(),
        }
    }

    /// Start a page with the given MediaBox.
    pub fn begin_page(&mut self, media_box: Rect) -> PdfPage<'_> {
        PdfPage {
            writer: self,
            media_box,
            operations: Vec::new(),
            fonts: BTreeMap::new(),
            xobjects: BTreeMap::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    fn font(&mut self, base_font: &'static str) -> ObjectId {
        if let Some(id) = self.fonts.get(base_font) {
            return *id;
        }
        let id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => base_font,
            "Encoding" => "WinAnsiEncoding",
        });
        self.fonts.insert(base_font, id);
        id
    }

    /// Embed an image once per source cross-reference id.
    fn image(&mut self, image: &ImageRecord) -> Result<ObjectId, PdfError> {
        if let Some(id) = self.images.get(&image.cross_reference_id) {
            return Ok(*id);
        }

        let decoded = image::load_from_memory(&image.raw_bytes).map_err(|e| {
            PdfError::ImageDecode {
                xref: image.cross_reference_id,
                reason: e.to_string(),
            }
        })?;
        let (width, height) = (decoded.width() as i64, decoded.height() as i64);

        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width,
            "Height" => height,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        };

        if decoded.color().has_alpha() {
            let alpha: Vec<u8> = decoded.to_rgba8().pixels().map(|p| p.0[3]).collect();
            let mut mask = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => width,
                    "Height" => height,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                },
                alpha,
            );
            compress(&mut mask)?;
            let mask_id = self.doc.add_object(mask);
            dict.set("SMask", mask_id);
        }

        let mut stream = Stream::new(dict, decoded.to_rgb8().into_raw());
        compress(&mut stream)?;
        let id = self.doc.add_object(stream);
        self.images.insert(image.cross_reference_id, id);
        log::debug!(
            "embedded image {} ({}x{})",
            image.cross_reference_id,
            width,
            height
        );
        Ok(id)
    }

    fn finish_document(&mut self) {
        let count = self.kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids.clone(),
                "Count" => count,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
    }

    /// Write the document to `path`.
    pub fn save(mut self, path: &Path) -> Result<(), PdfError> {
        self.finish_document();
        self.doc
            .save(path)
            .map_err(|e| PdfError::Write(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }

    /// Serialize the document into memory.
    pub fn to_bytes(mut self) -> Result<Vec<u8>, PdfError> {
        self.finish_document();
        let mut bytes = Vec::new();
        self.doc
            .save_to(&mut bytes)
            .map_err(|e| PdfError::Write(e.to_string()))?;
        Ok(bytes)
    }
}

fn compress(stream: &mut Stream) -> Result<(), PdfError> {
    stream
        .compress()
        .map_err(|e| PdfError::Write(format!("cannot compress stream: {}", e)))
}

/// A page being filled. Nothing reaches the document until
/// [`PdfPage::finish`] is called.
pub struct PdfPage<'w> {
    writer: &'w mut PdfWriter,
    media_box: Rect,
    operations: Vec<Operation>,
    /// Resource name to font object.
    fonts: BTreeMap<String, ObjectId>,
    /// Resource name to image object.
    xobjects: BTreeMap<String, ObjectId>,
}

impl PdfPage<'_> {
    fn op(&mut self, operator: &str, operands: Vec<Object>) {
        self.operations.push(Operation::new(operator, operands));
    }

    fn font_resource(&mut self, base_font: &'static str) -> String {
        let id = self.writer.font(base_font);
        if let Some((name, _)) = self.fonts.iter().find(|(_, v)| **v == id) {
            return name.clone();
        }
        let name = format!("F{}", self.fonts.len() + 1);
        self.fonts.insert(name.clone(), id);
        name
    }

    /// Append the page to the document.
    pub fn finish(self) -> Result<(), PdfError> {
        let content = Content {
            operations: self.operations,
        }
        .encode()
        .map_err(|e| PdfError::Write(format!("cannot encode page content: {}", e)))?;

        let mut content_stream = Stream::new(dictionary! {}, content);
        compress(&mut content_stream)?;
        let content_id = self.writer.doc.add_object(content_stream);

        let to_dict = |entries: BTreeMap<String, ObjectId>| {
            let mut dict = Dictionary::new();
            for (name, id) in entries {
                dict.set(name.into_bytes(), id);
            }
            dict
        };

        let page_id = self.writer.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.writer.pages_id,
            "MediaBox" => rect_array(self.media_box),
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => to_dict(self.fonts),
                "XObject" => to_dict(self.xobjects),
            },
        });
        self.writer.kids.push(page_id.into());
        Ok(())
    }
}

impl PageSink for PdfPage<'_> {
    /// Paint the fragment as a single line whose top edge sits on the top of
    /// `rect`, inside a `/Span` marked-content sequence carrying `rect` as its
    /// `/BBox`.
    fn insert_markup(&mut self, rect: Rect, markup: &str) -> Result<(), PdfError> {
        let fragment = StyledFragment::parse(markup)
            .ok_or_else(|| PdfError::Write(format!("unrecognised markup: {}", markup)))?;
        let font = self.font_resource(standard_font(
            &fragment.font_family,
            fragment.bold,
            fragment.italic,
        ));
        let (r, g, b) = fragment.color.to_unit();
        let size = fragment.font_size;

        self.op(
            "BDC",
            vec![
                Object::Name(b"Span".to_vec()),
                Object::Dictionary(dictionary! { "BBox" => rect_array(rect) }),
            ],
        );
        self.op("BT", vec![]);
        self.op("Tf", vec![Object::Name(font.into_bytes()), real(size)]);
        self.op("rg", vec![real(r), real(g), real(b)]);
        self.op(
            "Tm",
            vec![
                real(1.0),
                real(0.0),
                real(0.0),
                real(1.0),
                real(rect.x0),
                real(rect.y1 - ASCENT_RATIO * size),
            ],
        );
        self.op(
            "Tj",
            vec![Object::String(
                encode_win_ansi(&fragment.text),
                StringFormat::Literal,
            )],
        );
        self.op("ET", vec![]);
        self.op("EMC", vec![]);
        Ok(())
    }

    fn insert_image(&mut self, rect: Rect, image: &ImageRecord) -> Result<(), PdfError> {
        let id = self.writer.image(image)?;
        let name = format!("Im{}", image.cross_reference_id);
        self.xobjects.insert(name.clone(), id);

        self.op("q", vec![]);
        self.op(
            "cm",
            vec![
                real(rect.width()),
                real(0.0),
                real(0.0),
                real(rect.height()),
                real(rect.x0),
                real(rect.y0),
            ],
        );
        self.op("Do", vec![Object::Name(name.into_bytes())]);
        self.op("Q", vec![]);
        Ok(())
    }

    fn draw_outline(&mut self, rect: Rect, line_width: f32) -> Result<(), PdfError> {
        self.op("q", vec![]);
        self.op("w", vec![real(line_width)]);
        self.op("G", vec![real(0.0)]);
        self.op(
            "re",
            vec![
                real(rect.x0),
                real(rect.y0),
                real(rect.width()),
                real(rect.height()),
            ],
        );
        self.op("S", vec![]);
        self.op("Q", vec![]);
        Ok(())
    }
}
