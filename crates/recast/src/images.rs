use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::path::Path;

use crate::parser::backend::{LopdfBackend, ObjectId, PdfBackend, XObjectKind};
use crate::parser::layout::interpret_page;
use crate::types::{ImageData, ImageFormat, ImageRecord, Rect};
use crate::PdfError;

// ---------------------------------------------------------------------------
// Pure types for raw image handling
// ---------------------------------------------------------------------------

/// Device space decoded pixels end up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
}

impl ColorSpace {
    fn from_components(n: i64) -> Option<Self> {
        match n {
            1 => Some(ColorSpace::Gray),
            3 => Some(ColorSpace::Rgb),
            4 => Some(ColorSpace::Cmyk),
            _ => None,
        }
    }

    fn channels(self) -> u8 {
        match self {
            ColorSpace::Gray => 1,
            ColorSpace::Rgb => 3,
            ColorSpace::Cmyk => 4,
        }
    }
}

/// How the samples of an image stream map to colors.
#[derive(Debug, Clone, PartialEq)]
enum SampleSpace {
    Device(ColorSpace),
    /// One sample per pixel indexing `hival + 1` entries of `base` color.
    Indexed {
        base: ColorSpace,
        hival: u8,
        lookup: Vec<u8>,
    },
    /// `ImageMask` stencil. Painted samples come out black.
    Stencil { paint_on_one: bool },
    /// `Separation` or `DeviceN` tints rendered through the alternate space.
    Tint {
        inputs: u8,
        alternate: ColorSpace,
        transform: TintTransform,
    },
}

impl SampleSpace {
    fn channels(&self) -> u8 {
        match self {
            SampleSpace::Device(space) => space.channels(),
            SampleSpace::Indexed { .. } | SampleSpace::Stencil { .. } => 1,
            SampleSpace::Tint { inputs, .. } => *inputs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TintTransform {
    /// Type 2 function: `C0 + t^N * (C1 - C0)`.
    Exponential { c0: Vec<f32>, c1: Vec<f32>, exponent: f32 },
    /// Any other function. Tints are read as ink coverage.
    Ink,
}

/// Parsed image metadata from a PDF stream dictionary.
#[derive(Debug, Clone, PartialEq)]
struct RawImageMeta {
    width: u32,
    height: u32,
    bits_per_component: u8,
    space: SampleSpace,
}

impl RawImageMeta {
    fn channels(&self) -> u8 {
        self.space.channels()
    }

    /// Expected raw byte count for this image's pixel data.
    /// Accounts for sub-byte pixel packing with per-row byte alignment.
    fn expected_byte_count(&self) -> usize {
        self.bytes_per_row() * self.height as usize
    }

    fn bytes_per_row(&self) -> usize {
        let bits_per_row =
            self.width as usize * self.channels() as usize * self.bits_per_component as usize;
        bits_per_row.div_ceil(8)
    }
}

/// How an image payload becomes a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Codec {
    /// JPEG, written as stored.
    Dct,
    /// JPEG 2000, transcoded to PNG.
    Jpx,
    /// Fax data, decoded from the raw stream.
    Ccitt,
    /// Pixel samples, encoded as PNG.
    Raw,
}

impl Codec {
    /// Codec named by the last filter of a stream. Payload bytes are never
    /// sniffed: raw samples can start with any signature.
    fn from_filter(filter: Option<&str>) -> Self {
        match filter {
            Some("DCTDecode") | Some("DCT") => Codec::Dct,
            Some("JPXDecode") => Codec::Jpx,
            Some("CCITTFaxDecode") | Some("CCF") => Codec::Ccitt,
            _ => Codec::Raw,
        }
    }
}

// ---------------------------------------------------------------------------
// Color spaces
// ---------------------------------------------------------------------------

/// Parse image metadata from a PDF stream dictionary.
fn extract_image_meta(doc: &lopdf::Document, dict: &lopdf::Dictionary) -> Option<RawImageMeta> {
    let width = dict.get(b"Width").ok()?.as_i64().ok()? as u32;
    let height = dict.get(b"Height").ok()?.as_i64().ok()? as u32;

    let image_mask = dict
        .get(b"ImageMask")
        .ok()
        .and_then(|obj| obj.as_bool().ok())
        .unwrap_or(false);
    if image_mask {
        // Decode [1 0] paints where the sample is 1.
        let paint_on_one = dict
            .get(b"Decode")
            .ok()
            .and_then(|obj| resolve_object(doc, obj).as_array().ok())
            .and_then(|arr| arr.first())
            .and_then(|obj| obj.as_float().ok())
            .is_some_and(|v| v >= 0.5);
        return Some(RawImageMeta {
            width,
            height,
            bits_per_component: 1,
            space: SampleSpace::Stencil { paint_on_one },
        });
    }

    let bits_per_component = dict
        .get(b"BitsPerComponent")
        .ok()
        .and_then(|obj| obj.as_i64().ok())
        .map(|v| v as u8)
        .unwrap_or(8);

    let space = sample_space(doc, dict.get(b"ColorSpace").ok()?)?;

    Some(RawImageMeta {
        width,
        height,
        bits_per_component,
        space,
    })
}

fn sample_space(doc: &lopdf::Document, obj: &lopdf::Object) -> Option<SampleSpace> {
    let lopdf::Object::Array(arr) = resolve_object(doc, obj) else {
        return device_space(doc, obj).map(SampleSpace::Device);
    };

    match arr.first()?.as_name().ok()? {
        b"Indexed" | b"I" => {
            let base = device_space(doc, arr.get(1)?)?;
            let hival = resolve_object(doc, arr.get(2)?).as_i64().ok()?.clamp(0, 255) as u8;
            let lookup = match resolve_object(doc, arr.get(3)?) {
                lopdf::Object::String(bytes, _) => bytes.clone(),
                lopdf::Object::Stream(stream) => stream
                    .decompressed_content()
                    .unwrap_or_else(|_| stream.content.clone()),
                _ => return None,
            };
            Some(SampleSpace::Indexed {
                base,
                hival,
                lookup,
            })
        }
        b"Separation" => tint_space(doc, 1, arr.get(2)?, arr.get(3)?),
        b"DeviceN" => {
            let names = resolve_object(doc, arr.get(1)?).as_array().ok()?;
            let inputs = u8::try_from(names.len()).ok()?;
            tint_space(doc, inputs, arr.get(2)?, arr.get(3)?)
        }
        _ => device_space(doc, obj).map(SampleSpace::Device),
    }
}

/// Color spaces whose samples are already colors.
///
/// `ICCBased` spaces are resolved through the profile's `N` entry.
fn device_space(doc: &lopdf::Document, obj: &lopdf::Object) -> Option<ColorSpace> {
    match resolve_object(doc, obj) {
        lopdf::Object::Name(name) => match name.as_slice() {
            b"DeviceRGB" | b"CalRGB" | b"RGB" => Some(ColorSpace::Rgb),
            b"DeviceGray" | b"CalGray" | b"G" => Some(ColorSpace::Gray),
            b"DeviceCMYK" | b"CMYK" => Some(ColorSpace::Cmyk),
            _ => None,
        },
        lopdf::Object::Array(arr) => match arr.first()?.as_name().ok()? {
            b"ICCBased" => {
                let profile = resolve_object(doc, arr.get(1)?).as_stream().ok()?;
                let n = profile.dict.get(b"N").ok()?.as_i64().ok()?;
                ColorSpace::from_components(n)
            }
            b"CalRGB" => Some(ColorSpace::Rgb),
            b"CalGray" => Some(ColorSpace::Gray),
            _ => None,
        },
        _ => None,
    }
}

fn tint_space(
    doc: &lopdf::Document,
    inputs: u8,
    alternate: &lopdf::Object,
    function: &lopdf::Object,
) -> Option<SampleSpace> {
    if inputs == 0 {
        return None;
    }
    let alternate = device_space(doc, alternate)?;
    let transform = exponential_function(doc, function)
        .filter(|_| inputs == 1)
        .unwrap_or(TintTransform::Ink);
    Some(SampleSpace::Tint {
        inputs,
        alternate,
        transform,
    })
}

fn exponential_function(doc: &lopdf::Document, obj: &lopdf::Object) -> Option<TintTransform> {
    let dict = match resolve_object(doc, obj) {
        lopdf::Object::Dictionary(dict) => dict,
        lopdf::Object::Stream(stream) => &stream.dict,
        _ => return None,
    };
    if dict.get(b"FunctionType").ok()?.as_i64().ok()? != 2 {
        return None;
    }

    let floats = |key: &[u8], default: f32| -> Vec<f32> {
        dict.get(key)
            .ok()
            .and_then(|obj| resolve_object(doc, obj).as_array().ok())
            .map(|arr| arr.iter().filter_map(|o| o.as_float().ok()).collect())
            .unwrap_or_else(|| vec![default])
    };

    Some(TintTransform::Exponential {
        c0: floats(b"C0", 0.0),
        c1: floats(b"C1", 1.0),
        exponent: dict.get(b"N").ok()?.as_float().ok()?,
    })
}

// ---------------------------------------------------------------------------
// Pure image conversion functions
// ---------------------------------------------------------------------------

/// Re-encode raw pixel data as PNG.
fn encode_raw_as_png(meta: &RawImageMeta, raw_bytes: &[u8]) -> Result<Vec<u8>, String> {
    if meta.width == 0 || meta.height == 0 {
        return Err(format!("empty image ({}x{})", meta.width, meta.height));
    }
    let expected = meta.expected_byte_count();
    if raw_bytes.len() < expected {
        return Err(format!(
            "expected {} bytes of pixel data, found {}",
            expected,
            raw_bytes.len()
        ));
    }

    let samples = unpack_samples(&raw_bytes[..expected], meta).ok_or_else(|| {
        format!(
            "unsupported bits per component: {}",
            meta.bits_per_component
        )
    })?;
    let (space, pixels) = render_samples(meta, &samples);
    write_png(space, meta.width, meta.height, pixels)
}

/// Split packed rows into one unscaled value per sample.
fn unpack_samples(raw_bytes: &[u8], meta: &RawImageMeta) -> Option<Vec<u16>> {
    let bpc = meta.bits_per_component as usize;
    if !matches!(bpc, 1 | 2 | 4 | 8 | 16) {
        return None;
    }
    let per_row = meta.width as usize * meta.channels() as usize;
    let mask = ((1u32 << bpc) - 1) as u16;

    let mut samples = Vec::with_capacity(per_row * meta.height as usize);
    for row in raw_bytes.chunks_exact(meta.bytes_per_row()) {
        for i in 0..per_row {
            let bit = i * bpc;
            let value = match bpc {
                16 => u16::from_be_bytes([row[bit / 8], row[bit / 8 + 1]]),
                8 => row[i] as u16,
                _ => (row[bit / 8] >> (8 - bpc - bit % 8)) as u16 & mask,
            };
            samples.push(value);
        }
    }
    Some(samples)
}

/// Scale a sample of `bits` bits to 0..=255.
fn scale(value: u16, bits: u8) -> u8 {
    let max = (1u32 << bits) - 1;
    (value as u32 * 255 / max) as u8
}

/// Map samples into device pixels.
fn render_samples(meta: &RawImageMeta, samples: &[u16]) -> (ColorSpace, Vec<u8>) {
    let bits = meta.bits_per_component;
    match &meta.space {
        SampleSpace::Device(space) => (*space, samples.iter().map(|&v| scale(v, bits)).collect()),
        SampleSpace::Indexed {
            base,
            hival,
            lookup,
        } => {
            let n = base.channels() as usize;
            let mut pixels = Vec::with_capacity(samples.len() * n);
            for &index in samples {
                let start = index.min(*hival as u16) as usize * n;
                pixels.extend((start..start + n).map(|i| lookup.get(i).copied().unwrap_or(0)));
            }
            (*base, pixels)
        }
        SampleSpace::Stencil { paint_on_one } => {
            let pixels = samples
                .iter()
                .map(|&v| if (v == 1) == *paint_on_one { 0 } else { 255 })
                .collect();
            (ColorSpace::Gray, pixels)
        }
        SampleSpace::Tint {
            inputs,
            alternate,
            transform,
        } => render_tints(samples, bits, *inputs, *alternate, transform),
    }
}

fn render_tints(
    samples: &[u16],
    bits: u8,
    inputs: u8,
    alternate: ColorSpace,
    transform: &TintTransform,
) -> (ColorSpace, Vec<u8>) {
    match transform {
        TintTransform::Exponential { c0, c1, exponent } => {
            let n = alternate.channels() as usize;
            let mut pixels = Vec::with_capacity(samples.len() * n);
            for &v in samples {
                let t = (scale(v, bits) as f32 / 255.0).powf(*exponent);
                for j in 0..n {
                    let from = c0.get(j).copied().unwrap_or(0.0);
                    let to = c1.get(j).copied().unwrap_or(0.0);
                    let value = (from + t * (to - from)).clamp(0.0, 1.0);
                    pixels.push((value * 255.0).round() as u8);
                }
            }
            (alternate, pixels)
        }
        // Four inks over a CMYK alternate are process colors.
        TintTransform::Ink if inputs == 4 && alternate == ColorSpace::Cmyk => (
            ColorSpace::Cmyk,
            samples.iter().map(|&v| scale(v, bits)).collect(),
        ),
        TintTransform::Ink => {
            let pixels = samples
                .chunks_exact(inputs as usize)
                .map(|tints| {
                    let coverage = tints.iter().map(|&v| scale(v, bits)).max().unwrap_or(0);
                    255 - coverage
                })
                .collect();
            (ColorSpace::Gray, pixels)
        }
    }
}

fn write_png(
    space: ColorSpace,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
) -> Result<Vec<u8>, String> {
    let dyn_image = match space {
        ColorSpace::Gray => image::GrayImage::from_raw(width, height, pixels)
            .map(image::DynamicImage::ImageLuma8),
        ColorSpace::Rgb => {
            image::RgbImage::from_raw(width, height, pixels).map(image::DynamicImage::ImageRgb8)
        }
        ColorSpace::Cmyk => image::RgbImage::from_raw(width, height, cmyk_to_rgb(&pixels))
            .map(image::DynamicImage::ImageRgb8),
    }
    .ok_or_else(|| format!("pixel buffer does not fill {}x{}", width, height))?;

    let mut buf = Vec::new();
    dyn_image
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| e.to_string())?;
    Ok(buf)
}

/// Convert CMYK pixel bytes to RGB.
fn cmyk_to_rgb(cmyk_bytes: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(cmyk_bytes.len() / 4 * 3);
    for pixel in cmyk_bytes.chunks_exact(4) {
        let (c, m, y, k) = (
            pixel[0] as u16,
            pixel[1] as u16,
            pixel[2] as u16,
            pixel[3] as u16,
        );
        let r = 255u16.saturating_sub((c + k).min(255)) as u8;
        let g = 255u16.saturating_sub((m + k).min(255)) as u8;
        let b = 255u16.saturating_sub((y + k).min(255)) as u8;
        rgb.extend_from_slice(&[r, g, b]);
    }
    rgb
}

// ---------------------------------------------------------------------------
// CCITT fax
// ---------------------------------------------------------------------------

/// Decode CCITT fax data into a PNG image.
///
/// `K < 0` is Group 4. `K >= 0` is read as Group 3 with EOL markers; mixed
/// 1D/2D Group 3 (`K > 0`) fails to decode.
fn decode_ccitt(dict: &lopdf::Dictionary, raw_bytes: &[u8]) -> Result<Vec<u8>, String> {
    let decode_parms = extract_decode_parms(dict);
    let int = |key: &[u8], default: i64| {
        decode_parms
            .and_then(|parms| parms.get(key).ok())
            .and_then(|obj| obj.as_i64().ok())
            .unwrap_or(default)
    };

    let width = u16::try_from(int(b"Columns", 1728))
        .map_err(|_| "CCITT column count out of range".to_string())?;
    let height = u16::try_from(int(b"Rows", 0)).ok().filter(|&rows| rows > 0);
    let k = int(b"K", 0);
    let black_is_1 = decode_parms
        .and_then(|parms| parms.get(b"BlackIs1").ok())
        .and_then(|obj| obj.as_bool().ok())
        .unwrap_or(false);

    let bytes_per_row = (width as usize).div_ceil(8);
    let mut rows: Vec<Vec<u8>> = Vec::new();
    let mut push_row = |transitions: &[u16]| {
        let mut row = pack_row_bits(transitions, width);
        // Gray samples read 0 as black.
        if !black_is_1 {
            row.iter_mut().for_each(|b| *b = !*b);
        }
        row.resize(bytes_per_row, 0);
        rows.push(row);
    };

    let decoded = if k < 0 {
        fax::decoder::decode_g4(raw_bytes.iter().copied(), width, height, &mut push_row)
    } else {
        fax::decoder::decode_g3(raw_bytes.iter().copied(), &mut push_row)
    };
    decoded.ok_or_else(|| {
        let group = if k < 0 { "Group 4" } else { "Group 3" };
        format!("malformed CCITT {} data (K = {})", group, k)
    })?;

    if let Some(height) = height {
        rows.truncate(height as usize);
    }
    if width == 0 || rows.is_empty() {
        return Err("CCITT data holds no rows".to_string());
    }

    let meta = RawImageMeta {
        width: width as u32,
        height: rows.len() as u32,
        bits_per_component: 1,
        space: SampleSpace::Device(ColorSpace::Gray),
    };
    let pixel_data: Vec<u8> = rows.into_iter().flatten().collect();
    encode_raw_as_png(&meta, &pixel_data)
}

/// Extract the DecodeParms dictionary from a stream dictionary.
fn extract_decode_parms(dict: &lopdf::Dictionary) -> Option<&lopdf::Dictionary> {
    let obj = dict.get(b"DecodeParms").ok()?;
    match obj {
        lopdf::Object::Dictionary(d) => Some(d),
        lopdf::Object::Array(arr) => arr.last().and_then(|o| o.as_dict().ok()),
        _ => None,
    }
}

/// Convert fax transition positions into a packed 1-bit byte array with
/// black pixels set.
fn pack_row_bits(transitions: &[u16], width: u16) -> Vec<u8> {
    let bytes_per_row = (width as usize).div_ceil(8);
    let mut row = vec![0u8; bytes_per_row];

    let mut set_black_run = |start: u16, end: u16| {
        for col in start..end.min(width) {
            let byte_idx = col as usize / 8;
            let bit_idx = 7 - (col as usize % 8);
            row[byte_idx] |= 1 << bit_idx;
        }
    };

    let mut is_black = false;
    let mut prev_pos: u16 = 0;

    for &pos in transitions {
        if is_black {
            set_black_run(prev_pos, pos);
        }
        prev_pos = pos;
        is_black = !is_black;
    }

    if is_black {
        set_black_run(prev_pos, width);
    }

    row
}

// ---------------------------------------------------------------------------
// JPEG 2000
// ---------------------------------------------------------------------------

/// One decoded JPEG 2000 component.
struct Plane<'a> {
    width: u32,
    height: u32,
    precision: u32,
    samples: &'a [i32],
}

impl Plane<'_> {
    fn scaled(&self, i: usize) -> u8 {
        let max = (1i64 << self.precision.clamp(1, 16)) - 1;
        let value = (self.samples[i] as i64).clamp(0, max);
        (value * 255 / max) as u8
    }
}

/// Decode a JPEG 2000 codestream or JP2 file into a PNG.
fn decode_jpx(bytes: &[u8]) -> Result<Vec<u8>, String> {
    let image =
        jpeg2k::Image::from_bytes(bytes).map_err(|e| format!("invalid JPEG 2000 data: {}", e))?;
    let planes: Vec<Plane> = image
        .components()
        .iter()
        .map(|component| Plane {
            width: component.width(),
            height: component.height(),
            precision: component.precision(),
            samples: component.data(),
        })
        .collect();
    planes_to_png(&planes)
}

/// Interleave decoded components into a gray or RGB PNG.
///
/// A second component after gray, or a fourth after RGB, is dropped.
fn planes_to_png(planes: &[Plane]) -> Result<Vec<u8>, String> {
    let space = match planes.len() {
        0 => return Err("JPEG 2000 image has no components".to_string()),
        1 | 2 => ColorSpace::Gray,
        _ => ColorSpace::Rgb,
    };
    let used = &planes[..space.channels() as usize];
    let (width, height) = (used[0].width, used[0].height);
    let count = width as usize * height as usize;
    if used
        .iter()
        .any(|p| p.width != width || p.height != height || p.samples.len() < count)
    {
        return Err("subsampled JPEG 2000 components are not supported".to_string());
    }

    let mut pixels = Vec::with_capacity(count * used.len());
    for i in 0..count {
        pixels.extend(used.iter().map(|plane| plane.scaled(i)));
    }
    write_png(space, width, height, pixels)
}

/// Check that a payload decodes into a raster image.
fn validate_raster(bytes: &[u8]) -> Result<(), String> {
    image::load_from_memory(bytes)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Extract a single image XObject by its object id.
///
/// The last stream filter picks the codec. DCT payloads are returned as
/// stored; JPX, CCITT and raw pixel data are re-encoded as PNG. Every
/// payload is decoded once to check it is a well-formed raster before it is
/// returned.
pub fn extract_image(backend: &LopdfBackend, id: ObjectId) -> Result<ImageData, PdfError> {
    let doc = backend.raw_doc();
    let decode_error = |reason: String| PdfError::ImageDecode { xref: id.0, reason };

    let stream = doc
        .get_object(id)
        .ok()
        .and_then(|obj| obj.as_stream().ok())
        .ok_or_else(|| PdfError::ImageNotFound(format!("{} {} R", id.0, id.1)))?;

    let codec = Codec::from_filter(extract_filter_name(&stream.dict).as_deref());
    let payload = || {
        stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone())
    };

    let (format, bytes) = match codec {
        // lopdf cannot decompress this: decode from the raw stream.
        Codec::Ccitt => (
            ImageFormat::Png,
            decode_ccitt(&stream.dict, &stream.content).map_err(decode_error)?,
        ),
        Codec::Dct => (ImageFormat::Jpeg, payload()),
        Codec::Jpx => (ImageFormat::Png, decode_jpx(&payload()).map_err(decode_error)?),
        Codec::Raw => {
            let meta = extract_image_meta(doc, &stream.dict)
                .ok_or_else(|| decode_error("unsupported color space".to_string()))?;
            (
                ImageFormat::Png,
                encode_raw_as_png(&meta, &payload()).map_err(decode_error)?,
            )
        }
    };

    validate_raster(&bytes).map_err(decode_error)?;
    log::debug!(
        "extracted image {} ({:?}) as {} ({} bytes)",
        id.0,
        codec,
        format,
        bytes.len()
    );

    Ok(ImageData {
        id: id.0,
        format,
        bytes,
    })
}

/// Locate every image of the document and write it to `image_dir`.
///
/// Returns a map from 0-based page index to that page's records. Each
/// record covers one image on one page and lists every rectangle the image
/// is painted at, in paint order. Images painted on the page come first, in
/// first-placement order, followed by images the page declares but never
/// paints. Files are named `page<N>_image<K>.<ext>`.
///
/// A payload that cannot be decoded aborts the whole scan.
pub fn locate_images(
    backend: &LopdfBackend,
    image_dir: &Path,
) -> Result<BTreeMap<usize, Vec<ImageRecord>>, PdfError> {
    std::fs::create_dir_all(image_dir)?;

    let mut extracted: HashMap<ObjectId, ImageData> = HashMap::new();
    let mut records = BTreeMap::new();

    for (page_index, &page_id) in backend.pages().values().enumerate() {
        let placements = page_image_placements(backend, page_index, page_id);
        let mut page_records = Vec::with_capacity(placements.len());

        for (k, (id, rects)) in placements.into_iter().enumerate() {
            let data = match extracted.get(&id) {
                Some(data) => data.clone(),
                None => {
                    let data = extract_image(backend, id)?;
                    extracted.insert(id, data.clone());
                    data
                }
            };

            let extension = data.format.extension().to_string();
            let file_name = format!("page{}_image{}.{}", page_index, k + 1, extension);
            std::fs::write(image_dir.join(&file_name), &data.bytes)?;
            log::debug!(
                "page {}: wrote {} ({} placement(s))",
                page_index,
                file_name,
                rects.len()
            );

            page_records.push(ImageRecord {
                page_index,
                cross_reference_id: id.0,
                raw_bytes: data.bytes,
                extension,
                placement_rects: rects,
            });
        }

        records.insert(page_index, page_records);
    }

    Ok(records)
}

/// Image ids of one page with their placement rects, in first-placement order.
fn page_image_placements(
    backend: &LopdfBackend,
    page_index: usize,
    page_id: ObjectId,
) -> Vec<(ObjectId, Vec<Rect>)> {
    let mut order: Vec<(ObjectId, Vec<Rect>)> = Vec::new();

    match interpret_page(backend, page_id) {
        Ok(marks) => {
            for placement in marks.images {
                let Some(id) = placement.id else {
                    continue;
                };
                match order.iter_mut().find(|(seen, _)| *seen == id) {
                    Some((_, rects)) => rects.push(placement.rect),
                    None => order.push((id, vec![placement.rect])),
                }
            }
        }
        Err(e) => log::warn!("page {}: no image placements ({})", page_index, e),
    }

    let declared = backend.page_xobjects(page_id).unwrap_or_default();
    for info in declared {
        if info.kind != XObjectKind::Image {
            continue;
        }
        if let Some(id) = info.id {
            if !order.iter().any(|(seen, _)| *seen == id) {
                order.push((id, Vec::new()));
            }
        }
    }

    order
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Resolve a `lopdf::Object` that might be a `Reference` to the actual object.
fn resolve_object<'a>(doc: &'a lopdf::Document, obj: &'a lopdf::Object) -> &'a lopdf::Object {
    match obj {
        lopdf::Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

/// Name of the last filter of a stream, which decides the payload codec.
///
/// The `Filter` entry can be a single `Name` or an `Array` of names.
fn extract_filter_name(dict: &lopdf::Dictionary) -> Option<String> {
    let filter_obj = dict.get(b"Filter").ok()?;
    match filter_obj {
        lopdf::Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
        lopdf::Object::Array(arr) => arr.last().and_then(|o| match o {
            lopdf::Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
            _ => None,
        }),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use lopdf::{dictionary, Object, Stream, StringFormat};

    use super::*;

    const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    fn meta(width: u32, height: u32, bits: u8, space: ColorSpace) -> RawImageMeta {
        RawImageMeta {
            width,
            height,
            bits_per_component: bits,
            space: SampleSpace::Device(space),
        }
    }

    fn name(value: &str) -> Object {
        Object::Name(value.as_bytes().to_vec())
    }

    fn image_dict(width: i64, height: i64, color_space: &str) -> lopdf::Dictionary {
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width,
            "Height" => height,
            "ColorSpace" => color_space,
            "BitsPerComponent" => 8,
        }
    }

    /// RGB bytes of the PNG produced for `raw` under `dict`.
    fn render(doc: &lopdf::Document, dict: &lopdf::Dictionary, raw: &[u8]) -> Vec<u8> {
        let meta = extract_image_meta(doc, dict).unwrap();
        let png = encode_raw_as_png(&meta, raw).unwrap();
        image::load_from_memory(&png).unwrap().to_rgb8().into_raw()
    }

    fn rgb_pixels(png: &[u8]) -> Vec<u8> {
        image::load_from_memory(png).unwrap().to_rgb8().into_raw()
    }

    /// A one-page document painting `Im7` at the given rects.
    fn document_with_image(stream: Stream, rects: &[[i64; 4]]) -> Vec<u8> {
        let mut doc = lopdf::Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let image_id = doc.add_object(stream);

        let mut content = String::new();
        for [x, y, w, h] in rects {
            content.push_str(&format!("q {} 0 0 {} {} {} cm /Im7 Do Q\n", w, h, x, y));
        }
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(200),
                Object::Integer(200),
            ],
            "Contents" => content_id,
            "Resources" => dictionary! { "XObject" => dictionary! { "Im7" => image_id } },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    // -- codec selection ------------------------------------------------------

    #[test]
    fn test_codec_comes_from_filter_only() {
        assert_eq!(Codec::from_filter(Some("DCTDecode")), Codec::Dct);
        assert_eq!(Codec::from_filter(Some("JPXDecode")), Codec::Jpx);
        assert_eq!(Codec::from_filter(Some("CCITTFaxDecode")), Codec::Ccitt);
        assert_eq!(Codec::from_filter(Some("FlateDecode")), Codec::Raw);
        assert_eq!(Codec::from_filter(None), Codec::Raw);
    }

    #[test]
    fn test_last_filter_decides_codec() {
        let dict = dictionary! {
            "Filter" => vec![name("ASCII85Decode"), name("DCTDecode")],
        };
        assert_eq!(extract_filter_name(&dict).as_deref(), Some("DCTDecode"));
    }

    #[test]
    fn test_pixels_with_file_signatures_stay_raw() {
        // Every pixel is (66, 77, 0): the payload starts with "BM".
        let stream = Stream::new(image_dict(4, 4, "DeviceRGB"), [66u8, 77, 0].repeat(16));
        let bytes = document_with_image(stream, &[[0, 0, 40, 40]]);
        let backend = LopdfBackend::load_bytes(&bytes).unwrap();

        let records = locate_images(&backend, tempfile::tempdir().unwrap().path()).unwrap();
        let record = &records[&0][0];
        assert_eq!(record.extension, "png");
        assert_eq!(rgb_pixels(&record.raw_bytes), [66u8, 77, 0].repeat(16));

        // A payload that looks like PNG is still read as samples.
        let mut png_looking = PNG_MAGIC.to_vec();
        png_looking.extend_from_slice(&[0; 4]);
        let stream = Stream::new(image_dict(2, 2, "DeviceRGB"), png_looking.clone());
        let bytes = document_with_image(stream, &[[0, 0, 10, 10]]);
        let backend = LopdfBackend::load_bytes(&bytes).unwrap();
        let records = locate_images(&backend, tempfile::tempdir().unwrap().path()).unwrap();
        assert_eq!(rgb_pixels(&records[&0][0].raw_bytes), png_looking);
    }

    // -- color spaces ---------------------------------------------------------

    #[test]
    fn test_extract_meta_device_spaces() {
        let doc = lopdf::Document::new();
        let rgb = extract_image_meta(&doc, &image_dict(100, 50, "DeviceRGB")).unwrap();
        assert_eq!((rgb.width, rgb.height, rgb.channels()), (100, 50, 3));

        let gray = extract_image_meta(&doc, &image_dict(2, 2, "DeviceGray")).unwrap();
        assert_eq!(gray.space, SampleSpace::Device(ColorSpace::Gray));

        let cmyk = extract_image_meta(&doc, &image_dict(2, 2, "DeviceCMYK")).unwrap();
        assert_eq!(cmyk.channels(), 4);
    }

    #[test]
    fn test_extract_meta_icc_based_uses_component_count() {
        let mut doc = lopdf::Document::new();
        let profile = doc.add_object(Stream::new(dictionary! { "N" => 3 }, vec![]));
        let mut dict = image_dict(4, 4, "DeviceRGB");
        dict.set(
            "ColorSpace",
            vec![name("ICCBased"), Object::Reference(profile)],
        );
        let meta = extract_image_meta(&doc, &dict).unwrap();
        assert_eq!(meta.space, SampleSpace::Device(ColorSpace::Rgb));
    }

    #[test]
    fn test_extract_meta_rejects_unsupported() {
        let doc = lopdf::Document::new();
        assert!(extract_image_meta(&doc, &image_dict(4, 4, "Pattern")).is_none());

        let mut lab = image_dict(4, 4, "DeviceRGB");
        lab.set("ColorSpace", vec![name("Lab"), Object::Dictionary(dictionary! {})]);
        assert!(extract_image_meta(&doc, &lab).is_none());

        let mut no_width = image_dict(4, 4, "DeviceRGB");
        no_width.remove(b"Width");
        assert!(extract_image_meta(&doc, &no_width).is_none());
    }

    #[test]
    fn test_indexed_expands_through_lookup_string() {
        let doc = lopdf::Document::new();
        let mut dict = image_dict(2, 2, "DeviceRGB");
        dict.set(
            "ColorSpace",
            vec![
                name("Indexed"),
                name("DeviceRGB"),
                Object::Integer(1),
                Object::String(vec![0xFF, 0, 0, 0, 0, 0xFF], StringFormat::Hexadecimal),
            ],
        );

        let pixels = render(&doc, &dict, &[0, 1, 1, 0]);
        assert_eq!(pixels, vec![255, 0, 0, 0, 0, 255, 0, 0, 255, 255, 0, 0]);

        // Indices past hival use the last entry.
        let pixels = render(&doc, &dict, &[0, 9, 9, 9]);
        assert_eq!(pixels[3..6], [0, 0, 255]);
    }

    #[test]
    fn test_indexed_lookup_stream_with_packed_indices() {
        let mut doc = lopdf::Document::new();
        let lookup = doc.add_object(Stream::new(dictionary! {}, vec![0, 0, 0, 255, 255, 255]));
        let mut dict = image_dict(3, 1, "DeviceRGB");
        dict.set("BitsPerComponent", 1);
        dict.set(
            "ColorSpace",
            vec![
                name("Indexed"),
                name("DeviceRGB"),
                Object::Integer(1),
                Object::Reference(lookup),
            ],
        );

        let pixels = render(&doc, &dict, &[0b0100_0000]);
        assert_eq!(pixels, vec![0, 0, 0, 255, 255, 255, 0, 0, 0]);
    }

    #[test]
    fn test_image_mask_paints_zero_samples_by_default() {
        let doc = lopdf::Document::new();
        let dict = dictionary! {
            "Subtype" => "Image",
            "Width" => 8,
            "Height" => 1,
            "ImageMask" => true,
        };
        let meta = extract_image_meta(&doc, &dict).unwrap();
        assert_eq!(meta.bits_per_component, 1);

        let pixels = render(&doc, &dict, &[0b0000_1111]);
        let gray: Vec<u8> = pixels.chunks(3).map(|p| p[0]).collect();
        assert_eq!(gray, vec![0, 0, 0, 0, 255, 255, 255, 255]);
    }

    #[test]
    fn test_image_mask_inverted_decode() {
        let doc = lopdf::Document::new();
        let dict = dictionary! {
            "Subtype" => "Image",
            "Width" => 8,
            "Height" => 1,
            "ImageMask" => true,
            "Decode" => vec![Object::Integer(1), Object::Integer(0)],
        };
        let pixels = render(&doc, &dict, &[0b0000_1111]);
        let gray: Vec<u8> = pixels.chunks(3).map(|p| p[0]).collect();
        assert_eq!(gray, vec![255, 255, 255, 255, 0, 0, 0, 0]);
    }

    #[test]
    fn test_separation_uses_exponential_tint_transform() {
        let doc = lopdf::Document::new();
        let mut dict = image_dict(2, 1, "DeviceRGB");
        dict.set(
            "ColorSpace",
            vec![
                name("Separation"),
                name("Spot"),
                name("DeviceRGB"),
                Object::Dictionary(dictionary! {
                    "FunctionType" => 2,
                    "Domain" => vec![Object::Integer(0), Object::Integer(1)],
                    "C0" => vec![Object::Integer(1), Object::Integer(1), Object::Integer(1)],
                    "C1" => vec![Object::Integer(1), Object::Integer(0), Object::Integer(0)],
                    "N" => 1,
                }),
            ],
        );

        let pixels = render(&doc, &dict, &[255, 0]);
        assert_eq!(pixels, vec![255, 0, 0, 255, 255, 255]);
    }

    #[test]
    fn test_separation_without_exponential_reads_ink() {
        let doc = lopdf::Document::new();
        let mut dict = image_dict(2, 1, "DeviceGray");
        dict.set(
            "ColorSpace",
            vec![
                name("Separation"),
                name("Black"),
                name("DeviceGray"),
                Object::Dictionary(dictionary! { "FunctionType" => 4 }),
            ],
        );

        let pixels = render(&doc, &dict, &[255, 64]);
        assert_eq!(pixels, vec![0, 0, 0, 191, 191, 191]);
    }

    #[test]
    fn test_device_n_process_inks_map_to_cmyk() {
        let doc = lopdf::Document::new();
        let mut dict = image_dict(2, 1, "DeviceCMYK");
        dict.set(
            "ColorSpace",
            vec![
                name("DeviceN"),
                vec![name("Cyan"), name("Magenta"), name("Yellow"), name("Black")].into(),
                name("DeviceCMYK"),
                Object::Dictionary(dictionary! { "FunctionType" => 4 }),
            ],
        );
        let meta = extract_image_meta(&doc, &dict).unwrap();
        assert_eq!(meta.channels(), 4);

        let pixels = render(&doc, &dict, &[0, 0, 0, 255, 255, 0, 0, 0]);
        assert_eq!(pixels, vec![0, 0, 0, 0, 255, 255]);
    }

    // -- encode_raw_as_png ----------------------------------------------------

    #[test]
    fn test_byte_counts_respect_row_padding() {
        assert_eq!(meta(10, 5, 8, ColorSpace::Rgb).expected_byte_count(), 150);
        assert_eq!(meta(10, 1, 1, ColorSpace::Gray).expected_byte_count(), 2);
        assert_eq!(meta(3, 2, 4, ColorSpace::Gray).expected_byte_count(), 4);
    }

    #[test]
    fn test_encode_each_color_space() {
        let rgb = encode_raw_as_png(&meta(2, 2, 8, ColorSpace::Rgb), &[0u8; 12]).unwrap();
        assert_eq!(rgb[..8], PNG_MAGIC);
        let gray = encode_raw_as_png(&meta(8, 1, 1, ColorSpace::Gray), &[0xFF]).unwrap();
        assert_eq!(rgb_pixels(&gray), vec![255; 24]);
        let cmyk = encode_raw_as_png(&meta(2, 2, 8, ColorSpace::Cmyk), &[0u8; 16]).unwrap();
        assert_eq!(rgb_pixels(&cmyk), vec![255; 12]);
    }

    #[test]
    fn test_sub_byte_and_wide_samples_scale() {
        let two_bit = encode_raw_as_png(&meta(4, 1, 2, ColorSpace::Gray), &[0b0001_1011]).unwrap();
        let gray: Vec<u8> = rgb_pixels(&two_bit).chunks(3).map(|p| p[0]).collect();
        assert_eq!(gray, vec![0, 85, 170, 255]);

        let wide = encode_raw_as_png(&meta(2, 1, 16, ColorSpace::Gray), &[0xFF, 0xFF, 0x80, 0x00])
            .unwrap();
        let gray: Vec<u8> = rgb_pixels(&wide).chunks(3).map(|p| p[0]).collect();
        assert_eq!(gray, vec![255, 127]);
    }

    #[test]
    fn test_encode_rejects_short_or_empty_payload() {
        let m = meta(2, 2, 8, ColorSpace::Rgb);
        assert!(encode_raw_as_png(&m, &[0u8; 10]).is_err());
        assert!(encode_raw_as_png(&m, &[]).is_err());
        assert!(encode_raw_as_png(&meta(0, 4, 8, ColorSpace::Rgb), &[0u8; 4]).is_err());
        assert!(encode_raw_as_png(&meta(1, 1, 5, ColorSpace::Gray), &[0u8; 4]).is_err());
    }

    #[test]
    fn test_cmyk_conversion() {
        assert_eq!(cmyk_to_rgb(&[0, 0, 0, 0]), vec![255, 255, 255]);
        assert_eq!(cmyk_to_rgb(&[0, 0, 0, 255]), vec![0, 0, 0]);
        assert_eq!(cmyk_to_rgb(&[255, 0, 0, 0]), vec![0, 255, 255]);
    }

    // -- CCITT ----------------------------------------------------------------

    fn ccitt_dict(k: i64, columns: i64, rows: i64) -> lopdf::Dictionary {
        dictionary! {
            "Filter" => "CCITTFaxDecode",
            "DecodeParms" => dictionary! { "K" => k, "Columns" => columns, "Rows" => rows },
        }
    }

    fn gray_row(png: &[u8]) -> Vec<u8> {
        rgb_pixels(png).chunks(3).map(|p| p[0]).collect()
    }

    #[test]
    fn test_pack_row_transitions() {
        assert_eq!(pack_row_bits(&[], 8), vec![0x00]);
        assert_eq!(pack_row_bits(&[0], 8), vec![0xFF]);
        assert_eq!(pack_row_bits(&[4], 8), vec![0x0F]);
    }

    #[test]
    fn test_decode_ccitt_group3() {
        // EOL, white 4 (1011), black 4 (011), then six EOLs.
        let data = [
            0x00, 0x1B, 0x60, 0x02, 0x00, 0x20, 0x02, 0x00, 0x20, 0x02, 0x00, 0x20,
        ];
        let png = decode_ccitt(&ccitt_dict(0, 8, 1), &data).unwrap();
        assert_eq!(gray_row(&png), vec![255, 255, 255, 255, 0, 0, 0, 0]);
    }

    #[test]
    fn test_decode_ccitt_group4() {
        use fax::Color::{Black, White};

        let mut encoder = fax::encoder::Encoder::new(fax::VecWriter::new());
        let first = [White, White, Black, Black, Black, Black, White, White];
        encoder.encode_line(first.into_iter(), 8).unwrap();
        encoder.encode_line([White; 8].into_iter(), 8).unwrap();
        let data = encoder.finish().unwrap().finish();

        let png = decode_ccitt(&ccitt_dict(-1, 8, 2), &data).unwrap();
        let image = image::load_from_memory(&png).unwrap().to_luma8();
        assert_eq!(image.dimensions(), (8, 2));
        assert_eq!(
            image.as_raw()[..8],
            [255, 255, 0, 0, 0, 0, 255, 255]
        );
        assert!(image.as_raw()[8..].iter().all(|&v| v == 255));
    }

    #[test]
    fn test_decode_ccitt_rejects_malformed_data() {
        let err = decode_ccitt(&ccitt_dict(0, 8, 1), &[0x00]).unwrap_err();
        assert!(err.contains("Group 3"));
        assert!(decode_ccitt(&ccitt_dict(0, 100_000, 1), &[0x00]).is_err());
    }

    // -- JPEG 2000 ------------------------------------------------------------

    #[test]
    fn test_jpx_planes_interleave_into_rgb() {
        let (r, g, b): ([i32; 2], [i32; 2], [i32; 2]) = ([255, 0], [0, 255], [0, 0]);
        let planes = [&r, &g, &b].map(|samples| Plane {
            width: 2,
            height: 1,
            precision: 8,
            samples,
        });
        let png = planes_to_png(&planes).unwrap();
        assert_eq!(rgb_pixels(&png), vec![255, 0, 0, 0, 255, 0]);
    }

    #[test]
    fn test_jpx_planes_scale_by_precision() {
        let samples: [i32; 4] = [0, 1, 2, 3];
        let planes = [Plane {
            width: 4,
            height: 1,
            precision: 2,
            samples: &samples,
        }];
        let png = planes_to_png(&planes).unwrap();
        assert_eq!(gray_row(&png), vec![0, 85, 170, 255]);
    }

    #[test]
    fn test_jpx_subsampled_planes_are_rejected() {
        let (full, half): ([i32; 4], [i32; 1]) = ([0; 4], [0; 1]);
        let planes = [
            Plane { width: 2, height: 2, precision: 8, samples: &full },
            Plane { width: 1, height: 1, precision: 8, samples: &half },
            Plane { width: 1, height: 1, precision: 8, samples: &half },
        ];
        assert!(planes_to_png(&planes).is_err());
        assert!(planes_to_png(&[]).is_err());
    }

    #[test]
    fn test_corrupt_jpx_is_fatal() {
        let mut dict = image_dict(4, 4, "DeviceRGB");
        dict.set("Filter", "JPXDecode");
        let stream = Stream::new(dict, b"not a codestream".to_vec());
        let bytes = document_with_image(stream, &[[0, 0, 10, 10]]);
        let backend = LopdfBackend::load_bytes(&bytes).unwrap();

        let err = locate_images(&backend, tempfile::tempdir().unwrap().path()).unwrap_err();
        match err {
            PdfError::ImageDecode { reason, .. } => assert!(reason.contains("JPEG 2000")),
            other => panic!("unexpected error: {other}"),
        }
    }

    // -- extract_image / locate_images ----------------------------------------

    #[test]
    fn test_extract_raw_rgb_as_png() {
        let stream = Stream::new(image_dict(2, 2, "DeviceRGB"), vec![255; 12]);
        let bytes = document_with_image(stream, &[[0, 0, 50, 50]]);
        let backend = LopdfBackend::load_bytes(&bytes).unwrap();

        let records = locate_images(&backend, tempfile::tempdir().unwrap().path()).unwrap();
        let record = &records[&0][0];
        let data = extract_image(&backend, (record.cross_reference_id, 0)).unwrap();
        assert_eq!(data.format, ImageFormat::Png);
        assert_eq!(data.bytes[..8], PNG_MAGIC);
    }

    #[test]
    fn test_image_placed_twice_gives_one_record_and_one_file() {
        let stream = Stream::new(image_dict(2, 2, "DeviceGray"), vec![0, 128, 128, 255]);
        let bytes = document_with_image(stream, &[[0, 0, 50, 50], [60, 0, 50, 50]]);
        let backend = LopdfBackend::load_bytes(&bytes).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let records = locate_images(&backend, dir.path()).unwrap();

        assert_eq!(records.len(), 1);
        let page = &records[&0];
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].page_index, 0);
        assert_eq!(page[0].extension, "png");
        assert_eq!(
            page[0].placement_rects,
            vec![
                Rect::new(0.0, 0.0, 50.0, 50.0),
                Rect::new(60.0, 0.0, 110.0, 50.0)
            ]
        );

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        assert!(dir.path().join("page0_image1.png").exists());
    }

    #[test]
    fn test_truncated_payload_is_fatal() {
        let stream = Stream::new(image_dict(4, 4, "DeviceRGB"), vec![0; 5]);
        let bytes = document_with_image(stream, &[[0, 0, 10, 10]]);
        let backend = LopdfBackend::load_bytes(&bytes).unwrap();

        let err = locate_images(&backend, tempfile::tempdir().unwrap().path()).unwrap_err();
        assert!(matches!(err, PdfError::ImageDecode { .. }));
    }

    #[test]
    fn test_corrupt_jpeg_is_fatal() {
        let mut dict = image_dict(4, 4, "DeviceRGB");
        dict.set("Filter", "DCTDecode");
        let stream = Stream::new(dict, vec![0xFF, 0xD8, 0xFF, 0x00, 0x01, 0x02]);
        let bytes = document_with_image(stream, &[[0, 0, 10, 10]]);
        let backend = LopdfBackend::load_bytes(&bytes).unwrap();

        let err = locate_images(&backend, tempfile::tempdir().unwrap().path()).unwrap_err();
        assert!(matches!(err, PdfError::ImageDecode { .. }));
    }

    #[test]
    fn test_missing_object_is_not_found() {
        let bytes = document_with_image(
            Stream::new(image_dict(1, 1, "DeviceGray"), vec![0]),
            &[],
        );
        let backend = LopdfBackend::load_bytes(&bytes).unwrap();
        assert!(matches!(
            extract_image(&backend, (999, 0)),
            Err(PdfError::ImageNotFound(_))
        ));
    }

    #[test]
    fn test_declared_but_unpainted_image_has_no_rects() {
        let stream = Stream::new(image_dict(1, 1, "DeviceGray"), vec![0]);
        let bytes = document_with_image(stream, &[]);
        let backend = LopdfBackend::load_bytes(&bytes).unwrap();

        let records = locate_images(&backend, tempfile::tempdir().unwrap().path()).unwrap();
        assert_eq!(records[&0].len(), 1);
        assert!(records[&0][0].placement_rects.is_empty());
    }
}
