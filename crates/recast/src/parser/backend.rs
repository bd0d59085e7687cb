use std::collections::BTreeMap;

use lopdf::{self, content::Content};

use crate::types::Rect;
use crate::PdfError;

// ---------------------------------------------------------------------------
// Type aliases
// ---------------------------------------------------------------------------

/// An indirect object identifier mirroring `lopdf::ObjectId`:
/// (object number, generation number).
pub type ObjectId = (u32, u16);

/// A page identifier. Pages are ordinary indirect objects.
pub type PageId = ObjectId;

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// Font information extracted from a resource dictionary.
#[derive(Debug, Clone, Default)]
pub struct BackendFontInfo {
    /// The font name key as it appears in the resource dictionary (e.g. `b"F1"`).
    pub name: Vec<u8>,
    /// Base font name from the font dictionary, if present.
    pub base_font: Option<String>,
    /// Font subtype (e.g. `Type1`, `TrueType`, `Type0`).
    pub subtype: Option<String>,
    /// Encoding entry from the font dictionary, if present.
    pub encoding: Option<String>,
    /// First character code covered by `widths`.
    pub first_char: u32,
    /// Glyph advances in thousandths of an em, indexed from `first_char`.
    pub widths: Vec<f32>,
    /// `Flags` entry of the font descriptor.
    pub descriptor_flags: Option<i64>,
    /// `FontWeight` entry of the font descriptor.
    pub font_weight: Option<f32>,
    /// `Ascent` of the font descriptor, in thousandths of an em.
    pub ascent: Option<f32>,
    /// `Descent` of the font descriptor, in thousandths of an em (negative).
    pub descent: Option<f32>,
}

impl BackendFontInfo {
    /// Composite (`Type0`) fonts address glyphs with two-byte codes.
    pub fn is_composite(&self) -> bool {
        self.subtype.as_deref() == Some("Type0")
    }

    /// Advance of a single-byte character code, in thousandths of an em.
    pub fn width_of(&self, code: u8) -> Option<f32> {
        let idx = (code as u32).checked_sub(self.first_char)? as usize;
        self.widths.get(idx).copied().filter(|w| *w > 0.0)
    }
}

/// Kind of an XObject found in a resource dictionary.
#[derive(Debug, Clone, PartialEq)]
pub enum XObjectKind {
    Image,
    /// A form XObject carrying its own content stream and form matrix.
    Form { matrix: [f32; 6] },
    Other,
}

/// An XObject resource entry.
#[derive(Debug, Clone, PartialEq)]
pub struct XObjectInfo {
    /// Resource key (e.g. `b"Im1"`).
    pub name: Vec<u8>,
    /// Indirect object id, or `None` for direct (inline) streams.
    pub id: Option<ObjectId>,
    pub kind: XObjectKind,
}

/// A simplified, lopdf-independent representation of a PDF value.
///
/// This enum decouples higher-level logic from the concrete `lopdf::Object`
/// type so that the functional core can work with pure data.
#[derive(Debug, Clone, PartialEq)]
pub enum PdfValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f32),
    Name(Vec<u8>),
    Str(Vec<u8>),
    Array(Vec<PdfValue>),
    Dict(Vec<(Vec<u8>, PdfValue)>),
    Reference(ObjectId),
}

/// A single content-stream operation (operator + operands).
#[derive(Debug, Clone)]
pub struct ContentOp {
    pub operator: String,
    pub operands: Vec<PdfValue>,
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Extract an `f32` from a [`PdfValue`], accepting both `Integer` and `Real`.
pub fn get_number_from_value(val: &PdfValue) -> Option<f32> {
    match val {
        PdfValue::Integer(i) => Some(*i as f32),
        PdfValue::Real(f) => Some(*f),
        _ => None,
    }
}

/// Convert a `lopdf::Object` into a [`PdfValue`].
///
/// References are preserved as `PdfValue::Reference`.  Stream dictionaries
/// are converted but the raw stream bytes are discarded.
pub fn convert_object(obj: &lopdf::Object) -> PdfValue {
    match obj {
        lopdf::Object::Null => PdfValue::Null,
        lopdf::Object::Boolean(b) => PdfValue::Bool(*b),
        lopdf::Object::Integer(i) => PdfValue::Integer(*i),
        lopdf::Object::Real(f) => PdfValue::Real(*f),
        lopdf::Object::Name(n) => PdfValue::Name(n.clone()),
        lopdf::Object::String(s, _) => PdfValue::Str(s.clone()),
        lopdf::Object::Array(arr) => PdfValue::Array(arr.iter().map(convert_object).collect()),
        lopdf::Object::Dictionary(dict) => PdfValue::Dict(
            dict.iter()
                .map(|(k, v)| (k.clone(), convert_object(v)))
                .collect(),
        ),
        lopdf::Object::Stream(stream) => PdfValue::Dict(
            stream
                .dict
                .iter()
                .map(|(k, v)| (k.clone(), convert_object(v)))
                .collect(),
        ),
        lopdf::Object::Reference(id) => PdfValue::Reference(*id),
    }
}

/// Best-effort decoding of raw PDF string bytes into a Rust `String`.
///
/// Handles three cases in order:
/// 1. UTF-16BE with BOM (`\xFE\xFF` prefix) -- strips BOM and decodes.
/// 2. Valid UTF-8 -- returned as-is.
/// 3. Fallback to Latin-1 (ISO 8859-1) -- each byte mapped to its Unicode
///    code point.
pub fn decode_text_simple(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let code_units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
            .collect();
        return String::from_utf16_lossy(&code_units);
    }

    if let Ok(s) = std::str::from_utf8(bytes) {
        return s.to_string();
    }

    bytes.iter().map(|&b| b as char).collect()
}

// ---------------------------------------------------------------------------
// PdfBackend trait
// ---------------------------------------------------------------------------

/// Abstraction over a PDF parsing backend (currently backed by `lopdf`).
///
/// Resource-bearing methods take a *scope*: either a page id or the id of a
/// form XObject whose content is being interpreted.
pub trait PdfBackend {
    /// Return a mapping from 1-based page number to [`PageId`].
    fn pages(&self) -> BTreeMap<u32, PageId>;

    /// The page's MediaBox (inherited through the page tree if needed).
    fn page_box(&self, page: PageId) -> Result<Rect, PdfError>;

    /// Return font information for every font in the scope's resources.
    fn page_fonts(&self, scope: ObjectId) -> Result<Vec<BackendFontInfo>, PdfError>;

    /// Return every XObject in the scope's resources.
    fn page_xobjects(&self, scope: ObjectId) -> Result<Vec<XObjectInfo>, PdfError>;

    /// Return the decompressed content stream bytes for a page or form.
    fn page_content(&self, scope: ObjectId) -> Result<Vec<u8>, PdfError>;

    /// Decode raw content-stream bytes into a sequence of [`ContentOp`]s.
    fn decode_content(&self, data: &[u8]) -> Result<Vec<ContentOp>, PdfError>;

    /// Decode raw string bytes found in a text-showing operator, using any
    /// font-specific encoding information the backend can find.
    fn decode_text(&self, scope: ObjectId, font_name: &[u8], bytes: &[u8]) -> String;
}

// ---------------------------------------------------------------------------
// LopdfBackend
// ---------------------------------------------------------------------------

/// Concrete [`PdfBackend`] implementation backed by [`lopdf::Document`].
pub struct LopdfBackend {
    doc: lopdf::Document,
}

impl LopdfBackend {
    /// Parse a PDF from an in-memory byte slice.
    pub fn load_bytes(data: &[u8]) -> Result<Self, PdfError> {
        let doc = lopdf::Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        if doc.is_encrypted() {
            return Err(PdfError::Encrypted);
        }

        Ok(Self { doc })
    }

    /// Direct access to the underlying `lopdf::Document`.
    pub fn raw_doc(&self) -> &lopdf::Document {
        &self.doc
    }

    /// Total number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// Follow a single level of indirection.
    pub fn resolve<'a>(&'a self, obj: &'a lopdf::Object) -> &'a lopdf::Object {
        match obj {
            lopdf::Object::Reference(id) => self.doc.get_object(*id).unwrap_or(obj),
            _ => obj,
        }
    }

    fn resolve_dict<'a>(&'a self, obj: &'a lopdf::Object) -> Option<&'a lopdf::Dictionary> {
        match self.resolve(obj) {
            lopdf::Object::Dictionary(d) => Some(d),
            lopdf::Object::Stream(s) => Some(&s.dict),
            _ => None,
        }
    }

    fn number(&self, obj: &lopdf::Object) -> Option<f32> {
        match self.resolve(obj) {
            lopdf::Object::Integer(i) => Some(*i as f32),
            lopdf::Object::Real(f) => Some(*f),
            _ => None,
        }
    }

    fn numbers(&self, obj: &lopdf::Object) -> Option<Vec<f32>> {
        let arr = self.resolve(obj).as_array().ok()?;
        arr.iter().map(|o| self.number(o)).collect()
    }

    /// Find the resource dictionary of a page (walking up `Parent`) or of a
    /// form XObject.
    fn resources(&self, scope: ObjectId) -> Option<&lopdf::Dictionary> {
        match self.doc.get_object(scope).ok()? {
            lopdf::Object::Stream(stream) => {
                let res = stream.dict.get(b"Resources").ok()?;
                self.resolve_dict(res)
            }
            lopdf::Object::Dictionary(dict) => self.inherited_resources(dict, 0),
            _ => None,
        }
    }

    fn inherited_resources<'a>(
        &'a self,
        dict: &'a lopdf::Dictionary,
        depth: usize,
    ) -> Option<&'a lopdf::Dictionary> {
        if let Some(res) = dict.get(b"Resources").ok().and_then(|o| self.resolve_dict(o)) {
            return Some(res);
        }
        if depth > 32 {
            return None;
        }
        let parent = dict.get(b"Parent").ok().and_then(|o| self.resolve_dict(o))?;
        self.inherited_resources(parent, depth + 1)
    }

    /// Walk up the page tree to find the MediaBox array.
    fn find_media_box(&self, dict: &lopdf::Dictionary, depth: usize) -> Option<Vec<f32>> {
        if let Some(nums) = dict.get(b"MediaBox").ok().and_then(|o| self.numbers(o)) {
            return Some(nums);
        }
        if depth > 32 {
            return None;
        }
        let parent = dict.get(b"Parent").ok().and_then(|o| self.resolve_dict(o))?;
        self.find_media_box(parent, depth + 1)
    }

    fn font_info(&self, name: &[u8], dict: &lopdf::Dictionary) -> BackendFontInfo {
        let name_of = |d: &lopdf::Dictionary, key: &[u8]| {
            d.get(key)
                .ok()
                .and_then(|o| self.resolve(o).as_name().ok())
                .map(|n| String::from_utf8_lossy(n).into_owned())
        };

        let subtype = name_of(dict, b"Subtype");
        let mut info = BackendFontInfo {
            name: name.to_vec(),
            base_font: name_of(dict, b"BaseFont"),
            encoding: name_of(dict, b"Encoding"),
            subtype,
            ..Default::default()
        };

        info.first_char = dict
            .get(b"FirstChar")
            .ok()
            .and_then(|o| self.number(o))
            .map(|v| v.max(0.0) as u32)
            .unwrap_or(0);
        info.widths = dict
            .get(b"Widths")
            .ok()
            .and_then(|o| self.numbers(o))
            .unwrap_or_default();

        // Composite fonts keep their descriptor on the first descendant.
        let descriptor_owner = if info.is_composite() {
            dict.get(b"DescendantFonts")
                .ok()
                .and_then(|o| self.resolve(o).as_array().ok())
                .and_then(|arr| arr.first())
                .and_then(|o| self.resolve_dict(o))
        } else {
            Some(dict)
        };

        if let Some(descriptor) = descriptor_owner
            .and_then(|d| d.get(b"FontDescriptor").ok())
            .and_then(|o| self.resolve_dict(o))
        {
            let num = |key: &[u8]| descriptor.get(key).ok().and_then(|o| self.number(o));
            info.descriptor_flags = num(b"Flags").map(|f| f as i64);
            info.font_weight = num(b"FontWeight");
            info.ascent = num(b"Ascent");
            info.descent = num(b"Descent");
        }

        info
    }

    /// Look up the encoding name for a font in a scope.
    fn font_encoding_name(&self, scope: ObjectId, font_name: &[u8]) -> Option<String> {
        let fonts = self
            .resources(scope)?
            .get(b"Font")
            .ok()
            .and_then(|o| self.resolve_dict(o))?;
        let font_dict = fonts.get(font_name).ok().and_then(|o| self.resolve_dict(o))?;
        match self.resolve(font_dict.get(b"Encoding").ok()?) {
            lopdf::Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// PdfBackend implementation for LopdfBackend
// ---------------------------------------------------------------------------

impl PdfBackend for LopdfBackend {
    fn pages(&self) -> BTreeMap<u32, PageId> {
        self.doc.get_pages()
    }

    fn page_box(&self, page: PageId) -> Result<Rect, PdfError> {
        let page_dict = self
            .doc
            .get_object(page)
            .and_then(|o| o.as_dict())
            .map_err(|e| PdfError::Parse(format!("cannot get page dictionary: {}", e)))?;

        let nums = self
            .find_media_box(page_dict, 0)
            .ok_or_else(|| PdfError::Parse("MediaBox not found for page".into()))?;
        if nums.len() < 4 {
            return Err(PdfError::Parse(format!(
                "MediaBox has {} elements, expected 4",
                nums.len()
            )));
        }

        Ok(Rect::from_corners(nums[0], nums[1], nums[2], nums[3]))
    }

    fn page_fonts(&self, scope: ObjectId) -> Result<Vec<BackendFontInfo>, PdfError> {
        let Some(fonts) = self
            .resources(scope)
            .and_then(|res| res.get(b"Font").ok())
            .and_then(|o| self.resolve_dict(o))
        else {
            return Ok(Vec::new());
        };

        Ok(fonts
            .iter()
            .filter_map(|(name, obj)| {
                self.resolve_dict(obj)
                    .map(|dict| self.font_info(name, dict))
            })
            .collect())
    }

    fn page_xobjects(&self, scope: ObjectId) -> Result<Vec<XObjectInfo>, PdfError> {
        let Some(xobjects) = self
            .resources(scope)
            .and_then(|res| res.get(b"XObject").ok())
            .and_then(|o| self.resolve_dict(o))
        else {
            return Ok(Vec::new());
        };

        let mut result = Vec::with_capacity(xobjects.len());
        for (name, obj) in xobjects.iter() {
            let id = obj.as_reference().ok();
            let Ok(stream) = self.resolve(obj).as_stream() else {
                continue;
            };
            let subtype = stream
                .dict
                .get(b"Subtype")
                .ok()
                .and_then(|o| o.as_name().ok());
            let kind = match subtype {
                Some(b"Image") => XObjectKind::Image,
                Some(b"Form") => {
                    let matrix = stream
                        .dict
                        .get(b"Matrix")
                        .ok()
                        .and_then(|o| self.numbers(o))
                        .filter(|m| m.len() == 6)
                        .map(|m| [m[0], m[1], m[2], m[3], m[4], m[5]])
                        .unwrap_or([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
                    XObjectKind::Form { matrix }
                }
                _ => XObjectKind::Other,
            };
            result.push(XObjectInfo {
                name: name.clone(),
                id,
                kind,
            });
        }

        Ok(result)
    }

    fn page_content(&self, scope: ObjectId) -> Result<Vec<u8>, PdfError> {
        match self.doc.get_object(scope) {
            Ok(lopdf::Object::Stream(stream)) => Ok(stream
                .decompressed_content()
                .unwrap_or_else(|_| stream.content.clone())),
            Ok(_) => self
                .doc
                .get_page_content(scope)
                .map_err(|e| PdfError::Parse(format!("cannot get page content: {}", e))),
            Err(e) => Err(PdfError::Parse(format!("cannot get object: {}", e))),
        }
    }

    fn decode_content(&self, data: &[u8]) -> Result<Vec<ContentOp>, PdfError> {
        let content = Content::decode(data)
            .map_err(|e| PdfError::Parse(format!("content stream decode error: {}", e)))?;

        Ok(content
            .operations
            .into_iter()
            .map(|op| ContentOp {
                operator: op.operator,
                operands: op.operands.iter().map(convert_object).collect(),
            })
            .collect())
    }

    fn decode_text(&self, scope: ObjectId, font_name: &[u8], bytes: &[u8]) -> String {
        if let Some(enc_name) = self.font_encoding_name(scope, font_name) {
            // Identity-H / Identity-V fonts typically use 2-byte CID codes
            // that map to Unicode.  Try UTF-16BE decoding.
            if enc_name.contains("Identity") && bytes.len() >= 2 && bytes.len() % 2 == 0 {
                let code_units: Vec<u16> = bytes
                    .chunks(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                let decoded = String::from_utf16_lossy(&code_units);
                if !decoded.is_empty() && !decoded.chars().all(|c| c == '\u{FFFD}' || c == '\0') {
                    return decoded;
                }
            }
        }

        decode_text_simple(bytes)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
