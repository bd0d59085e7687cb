//! Fixture PDFs built with lopdf.

#![allow(dead_code)]

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};

/// `FontDescriptor` flag for italic faces.
pub const ITALIC: i64 = 1 << 6;

pub struct FixturePage {
    media_box: [f32; 4],
    operations: Vec<Operation>,
    images: Vec<(String, ObjectId)>,
}

impl FixturePage {
    pub fn new(width: f32, height: f32) -> Self {
        FixturePage {
            media_box: [0.0, 0.0, width, height],
            operations: Vec::new(),
            images: Vec::new(),
        }
    }

    /// Show `text` with font `/F1` (plain) or `/F2` (italic) at `(x, y)`.
    pub fn text(mut self, font: &str, text: &str, x: f32, y: f32, size: f32) -> Self {
        self.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(font.as_bytes().to_vec()), size.into()]),
            Operation::new("Td", vec![x.into(), y.into()]),
            Operation::new(
                "Tj",
                vec![Object::String(text.as_bytes().to_vec(), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ]);
        self
    }

    /// Paint image `name` into `[x, y, x + w, y + h]`.
    pub fn image(mut self, name: &str, id: ObjectId, x: f32, y: f32, w: f32, h: f32) -> Self {
        if !self.images.iter().any(|(n, _)| n == name) {
            self.images.push((name.to_string(), id));
        }
        self.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![w.into(), Object::Real(0.0), Object::Real(0.0), h.into(), x.into(), y.into()],
            ),
            Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ]);
        self
    }

    /// Stroke a ruled grid with the given column and row boundaries.
    pub fn grid(mut self, xs: &[f32], ys: &[f32]) -> Self {
        let (left, right) = (xs[0], xs[xs.len() - 1]);
        let (bottom, top) = (ys[0], ys[ys.len() - 1]);
        for &y in ys {
            self.operations.extend([
                Operation::new("m", vec![left.into(), y.into()]),
                Operation::new("l", vec![right.into(), y.into()]),
                Operation::new("S", vec![]),
            ]);
        }
        for &x in xs {
            self.operations.extend([
                Operation::new("m", vec![x.into(), bottom.into()]),
                Operation::new("l", vec![x.into(), top.into()]),
                Operation::new("S", vec![]),
            ]);
        }
        self
    }
}

pub struct Fixture {
    doc: Document,
    pages_id: ObjectId,
    fonts: ObjectId,
    kids: Vec<Object>,
}

impl Fixture {
    pub fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let italic_descriptor = doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => "Arial-ItalicMT",
            "Flags" => 32 | ITALIC,
        });
        let plain = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Arial",
        });
        let italic = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Arial",
            "FontDescriptor" => italic_descriptor,
        });
        let fonts = doc.add_object(dictionary! { "F1" => plain, "F2" => italic });

        Fixture {
            doc,
            pages_id,
            fonts,
            kids: Vec::new(),
        }
    }

    /// Add an uncompressed `DeviceRGB` image filled with one color.
    pub fn rgb_image(&mut self, width: u32, height: u32, rgb: [u8; 3]) -> ObjectId {
        let pixels = rgb.repeat((width * height) as usize);
        self.doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            pixels,
        ))
    }

    /// Add an uncompressed image XObject described by `dict`.
    pub fn image_object(&mut self, mut dict: lopdf::Dictionary, samples: Vec<u8>) -> ObjectId {
        dict.set("Type", "XObject");
        dict.set("Subtype", "Image");
        self.doc.add_object(Stream::new(dict, samples))
    }

    /// Add an image whose payload claims to be JPEG but is not.
    pub fn broken_jpeg(&mut self) -> ObjectId {
        self.doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 4,
                "Height" => 4,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            vec![0xFF, 0xD8, 0xFF, 0x00, 0x01, 0x02],
        ))
    }

    pub fn page(&mut self, page: FixturePage) -> &mut Self {
        let content = Content {
            operations: page.operations,
        }
        .encode()
        .unwrap();
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, content));

        let mut xobjects = lopdf::Dictionary::new();
        for (name, id) in page.images {
            xobjects.set(name.into_bytes(), id);
        }

        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => page.media_box.iter().map(|v| Object::Real(*v)).collect::<Vec<_>>(),
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => self.fonts,
                "XObject" => xobjects,
            },
        });
        self.kids.push(Object::Reference(page_id));
        self
    }

    pub fn to_bytes(&mut self) -> Vec<u8> {
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

        let mut bytes = Vec::new();
        self.doc.save_to(&mut bytes).unwrap();
        bytes
    }

    /// Write the fixture to `dir/name` and return its path.
    pub fn write(&mut self, dir: &std::path::Path, name: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.to_bytes()).unwrap();
        path
    }
}

/// Operations of page `number` (1-based) of a saved PDF.
pub fn page_operations(doc: &Document, number: u32) -> Vec<Operation> {
    let page_id = doc.get_pages()[&number];
    let bytes = doc.get_page_content(page_id).unwrap();
    Content::decode(&bytes).unwrap().operations
}

/// MediaBox of page `number` (1-based) of a saved PDF.
pub fn media_box(doc: &Document, number: u32) -> Vec<f32> {
    let page_id = doc.get_pages()[&number];
    doc.get_object(page_id)
        .unwrap()
        .as_dict()
        .unwrap()
        .get(b"MediaBox")
        .unwrap()
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o.as_float().unwrap())
        .collect()
}

/// Image XObjects a page references, by resource name order.
pub fn page_xobjects(doc: &Document, number: u32) -> Vec<ObjectId> {
    let page_id = doc.get_pages()[&number];
    doc.get_dictionary(page_id)
        .unwrap()
        .get(b"Resources")
        .unwrap()
        .as_dict()
        .unwrap()
        .get(b"XObject")
        .unwrap()
        .as_dict()
        .unwrap()
        .iter()
        .map(|(_, obj)| obj.as_reference().unwrap())
        .collect()
}

/// Number of image streams stored in a saved PDF.
pub fn image_stream_count(doc: &Document) -> usize {
    doc.objects
        .values()
        .filter(|obj| {
            obj.as_stream()
                .ok()
                .and_then(|s| s.dict.get(b"Subtype").ok())
                .and_then(|n| n.as_name().ok())
                == Some(b"Image".as_slice())
        })
        .count()
}

/// RGB bytes of an image file written by a conversion.
pub fn rgb_pixels(path: &std::path::Path) -> Vec<u8> {
    let bytes = std::fs::read(path).unwrap();
    image::load_from_memory(&bytes).unwrap().to_rgb8().into_raw()
}

pub fn floats(operation: &Operation) -> Vec<f32> {
    operation
        .operands
        .iter()
        .map(|o| o.as_float().unwrap())
        .collect()
}
