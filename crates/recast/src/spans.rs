//! Span extraction: text-page leaves to sidecar records.

use crate::parser::backend::{PageId, PdfBackend};
use crate::parser::layout::{
    extract_text_page, LayoutBlock, NativeColor, TextLine, TextPage, TextSpan, FLAG_BOLD,
    FLAG_ITALIC,
};
use crate::types::{Rgb, Span};
use crate::PdfError;

/// What to do with a fill color that cannot be expressed as RGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorPolicy {
    /// Substitute the given color.
    Fallback(Rgb),
    /// Fail with [`PdfError::ColorDecode`].
    Strict,
}

impl Default for ColorPolicy {
    fn default() -> Self {
        ColorPolicy::Fallback(Rgb::BLACK)
    }
}

impl ColorPolicy {
    pub fn resolve(&self, color: &NativeColor) -> Result<Rgb, PdfError> {
        match (decode_color(color), self) {
            (Ok(rgb), _) => Ok(rgb),
            (Err(e), ColorPolicy::Strict) => Err(e),
            (Err(e), ColorPolicy::Fallback(rgb)) => {
                log::debug!("{}, using {}", e, rgb);
                Ok(*rgb)
            }
        }
    }
}

fn channel(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn from_cmyk(c: f32, m: f32, y: f32, k: f32) -> Rgb {
    let k = k.clamp(0.0, 1.0);
    Rgb::new(
        channel((1.0 - c.clamp(0.0, 1.0)) * (1.0 - k)),
        channel((1.0 - m.clamp(0.0, 1.0)) * (1.0 - k)),
        channel((1.0 - y.clamp(0.0, 1.0)) * (1.0 - k)),
    )
}

/// Convert a native fill color to 8-bit RGB.
///
/// Raw `sc`/`scn` components are read as gray, RGB or CMYK by their count.
/// Patterns and other component counts have no RGB equivalent.
pub fn decode_color(color: &NativeColor) -> Result<Rgb, PdfError> {
    match color {
        NativeColor::Gray(g) => Ok(Rgb::new(channel(*g), channel(*g), channel(*g))),
        NativeColor::Rgb(r, g, b) => Ok(Rgb::new(channel(*r), channel(*g), channel(*b))),
        NativeColor::Cmyk(c, m, y, k) => Ok(from_cmyk(*c, *m, *y, *k)),
        NativeColor::Components(v) => match v.as_slice() {
            [g] => Ok(Rgb::new(channel(*g), channel(*g), channel(*g))),
            [r, g, b] => Ok(Rgb::new(channel(*r), channel(*g), channel(*b))),
            [c, m, y, k] => Ok(from_cmyk(*c, *m, *y, *k)),
            other => Err(PdfError::ColorDecode(format!(
                "{} color components",
                other.len()
            ))),
        },
        NativeColor::Pattern(name) => Err(PdfError::ColorDecode(format!(
            "pattern /{}",
            String::from_utf8_lossy(name)
        ))),
    }
}

pub fn is_bold(flags: u32) -> bool {
    flags & FLAG_BOLD != 0
}

pub fn is_italic(flags: u32) -> bool {
    flags & FLAG_ITALIC != 0
}

/// Turn one layout leaf into a record. Font name, size and bbox are copied
/// as they are.
pub fn to_span(leaf: TextSpan, policy: &ColorPolicy) -> Result<Span, PdfError> {
    let color = policy.resolve(&leaf.color)?;
    Ok(Span {
        content: leaf.text,
        font_name: leaf.font_name,
        font_size: leaf.font_size,
        color,
        bold: is_bold(leaf.flags),
        italic: is_italic(leaf.flags),
        bbox: leaf.bbox,
    })
}

/// Spans of one page in reading order.
///
/// Walks text blocks only and skips leaves whose text is blank. Consumes
/// the text page it was built from.
pub struct PageSpans {
    blocks: std::vec::IntoIter<LayoutBlock>,
    lines: std::vec::IntoIter<TextLine>,
    leaves: std::vec::IntoIter<TextSpan>,
    policy: ColorPolicy,
}

impl PageSpans {
    pub fn new(page: TextPage, policy: ColorPolicy) -> Self {
        PageSpans {
            blocks: page.blocks.into_iter(),
            lines: Vec::new().into_iter(),
            leaves: Vec::new().into_iter(),
            policy,
        }
    }

    pub fn empty(policy: ColorPolicy) -> Self {
        Self::new(
            TextPage {
                page_box: crate::types::Rect::new(0.0, 0.0, 0.0, 0.0),
                blocks: Vec::new(),
            },
            policy,
        )
    }
}

impl Iterator for PageSpans {
    type Item = Result<Span, PdfError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(leaf) = self.leaves.next() {
                if leaf.text.trim().is_empty() {
                    continue;
                }
                return Some(to_span(leaf, &self.policy));
            }
            if let Some(line) = self.lines.next() {
                self.leaves = line.spans.into_iter();
                continue;
            }
            match self.blocks.next()? {
                LayoutBlock::Text { lines, .. } => self.lines = lines.into_iter(),
                LayoutBlock::Image { .. } => {}
            }
        }
    }
}

/// Spans of one page.
///
/// A page whose content cannot be read yields no spans; the failure is
/// logged and not returned.
pub fn page_spans(
    backend: &dyn PdfBackend,
    page_id: PageId,
    page_index: usize,
    policy: ColorPolicy,
) -> PageSpans {
    match extract_text_page(backend, page_id) {
        Ok(page) => PageSpans::new(page, policy),
        Err(e) => {
            log::warn!("page {}: treating as empty ({})", page_index, e);
            PageSpans::empty(policy)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::backend::{PdfValue, XObjectInfo, XObjectKind};
    use crate::parser::layout::tests::{make_op, nums, text_ops, MockBackend};
    use crate::parser::layout::FLAG_SERIF;
    use crate::types::Rect;

    fn leaf(text: &str, flags: u32) -> TextSpan {
        TextSpan {
            text: text.to_string(),
            font_name: "Arial".to_string(),
            font_size: 12.0,
            flags,
            color: NativeColor::Gray(0.0),
            bbox: Rect::new(10.0, 10.0, 100.0, 30.0),
            baseline: 14.0,
        }
    }

    fn page_of(blocks: Vec<LayoutBlock>) -> TextPage {
        TextPage {
            page_box: Rect::new(0.0, 0.0, 612.0, 792.0),
            blocks,
        }
    }

    fn text_block(leaves: Vec<TextSpan>) -> LayoutBlock {
        LayoutBlock::Text {
            bbox: leaves[0].bbox,
            lines: vec![TextLine {
                bbox: leaves[0].bbox,
                spans: leaves,
            }],
        }
    }

    #[test]
    fn test_bold_italic_truth_table() {
        assert!(is_bold(FLAG_BOLD) && !is_italic(FLAG_BOLD));
        assert!(is_bold(FLAG_BOLD | FLAG_ITALIC) && is_italic(FLAG_BOLD | FLAG_ITALIC));
        assert!(!is_bold(0) && !is_italic(0));
        // Other bits are ignored.
        assert!(!is_bold(FLAG_SERIF) && !is_italic(FLAG_SERIF));
    }

    #[test]
    fn test_decode_device_colors() {
        assert_eq!(decode_color(&NativeColor::Gray(1.0)).unwrap(), Rgb::new(255, 255, 255));
        assert_eq!(
            decode_color(&NativeColor::Rgb(1.0, 0.5, 0.0)).unwrap(),
            Rgb::new(255, 128, 0)
        );
        assert_eq!(
            decode_color(&NativeColor::Cmyk(0.0, 0.0, 0.0, 1.0)).unwrap(),
            Rgb::BLACK
        );
        assert_eq!(
            decode_color(&NativeColor::Cmyk(1.0, 0.0, 0.0, 0.0)).unwrap(),
            Rgb::new(0, 255, 255)
        );
        assert_eq!(
            decode_color(&NativeColor::Components(vec![0.0, 0.0, 1.0])).unwrap(),
            Rgb::new(0, 0, 255)
        );
    }

    #[test]
    fn test_color_policy() {
        let pattern = NativeColor::Pattern(b"P0".to_vec());
        assert!(decode_color(&pattern).is_err());

        let lenient = ColorPolicy::default();
        assert_eq!(lenient.resolve(&pattern).unwrap(), Rgb::BLACK);

        let grey = ColorPolicy::Fallback(Rgb::new(9, 9, 9));
        assert_eq!(
            grey.resolve(&NativeColor::Components(vec![0.1, 0.2])).unwrap(),
            Rgb::new(9, 9, 9)
        );

        assert!(matches!(
            ColorPolicy::Strict.resolve(&pattern),
            Err(PdfError::ColorDecode(_))
        ));
    }

    #[test]
    fn test_hello_italic_span() {
        let page = page_of(vec![text_block(vec![leaf("hello", FLAG_ITALIC)])]);
        let spans: Vec<Span> = PageSpans::new(page, ColorPolicy::default())
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(spans.len(), 1);
        let span = &spans[0];
        assert_eq!(span.content, "hello");
        assert_eq!(span.font_name, "Arial");
        assert_eq!(span.font_size, 12.0);
        assert!(span.italic);
        assert!(!span.bold);
        assert_eq!(span.bbox, Rect::new(10.0, 10.0, 100.0, 30.0));
    }

    #[test]
    fn test_skips_images_and_blank_leaves() {
        let page = page_of(vec![
            text_block(vec![leaf("first", 0), leaf("   ", 0)]),
            LayoutBlock::Image {
                bbox: Rect::new(0.0, 0.0, 10.0, 10.0),
                name: b"Im1".to_vec(),
            },
            text_block(vec![leaf("second", FLAG_BOLD)]),
        ]);
        let spans: Vec<Span> = PageSpans::new(page, ColorPolicy::default())
            .collect::<Result<_, _>>()
            .unwrap();

        let contents: Vec<&str> = spans.iter().map(|s| s.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
        assert!(spans[1].bold);
    }

    #[test]
    fn test_strict_policy_surfaces_error() {
        let mut pattern_leaf = leaf("x", 0);
        pattern_leaf.color = NativeColor::Pattern(b"P1".to_vec());
        let page = page_of(vec![text_block(vec![pattern_leaf])]);

        let mut spans = PageSpans::new(page, ColorPolicy::Strict);
        assert!(spans.next().unwrap().is_err());
        assert!(spans.next().is_none());
    }

    #[test]
    fn test_page_spans_from_content_stream() {
        let mut ops = vec![make_op("rg", nums(&[1.0, 0.0, 0.0]))];
        ops.extend(text_ops(b"Hello", 72.0, 700.0, 12.0));
        ops.push(make_op("Do", vec![PdfValue::Name(b"Im1".to_vec())]));
        let mut backend = MockBackend::new(ops);
        backend.xobjects = vec![XObjectInfo {
            name: b"Im1".to_vec(),
            id: Some((5, 0)),
            kind: XObjectKind::Image,
        }];

        let spans: Vec<Span> = page_spans(&backend, (1, 0), 0, ColorPolicy::default())
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].content, "Hello");
        assert_eq!(spans[0].font_name, "Helvetica");
        assert_eq!(spans[0].color, Rgb::new(255, 0, 0));
    }

    #[test]
    fn test_malformed_page_yields_no_spans() {
        let mut backend = MockBackend::new(vec![]);
        backend.broken_content = true;
        assert_eq!(
            page_spans(&backend, (1, 0), 3, ColorPolicy::default()).count(),
            0
        );
    }
}
