//! Styled markup fragments for spans.

use std::fmt;

use crate::types::{Rgb, Span};

/// A content mutation applied to every span before it is re-inserted.
pub trait TextTransform: fmt::Debug {
    /// Short name used in output file names.
    fn label(&self) -> &str;

    fn apply(&self, text: &str) -> String;
}

/// Upper-cases span text.
#[derive(Debug, Clone, Copy, Default)]
pub struct Uppercase;

impl TextTransform for Uppercase {
    fn label(&self) -> &str {
        "uppercase"
    }

    fn apply(&self, text: &str) -> String {
        text.to_uppercase()
    }
}

/// Render a span as an inline-styled `<span>` fragment.
///
/// The font name is written as it is; the transformed text is HTML-escaped.
pub fn render_markup(span: &Span, transform: &dyn TextTransform) -> String {
    let mut style = format!(
        "font-family:{}; font-size:{}pt; color:{};",
        span.font_name, span.font_size, span.color
    );
    if span.italic {
        style.push_str(" font-style:italic;");
    }
    if span.bold {
        style.push_str(" font-weight:bold;");
    }

    let text = transform.apply(&span.content);
    format!(
        "<span style=\"{}\">{}</span>",
        style,
        html_escape::encode_text(&text)
    )
}

/// A fragment produced by [`render_markup`], read back into its parts.
#[derive(Debug, Clone, PartialEq)]
pub struct StyledFragment {
    pub font_family: String,
    pub font_size: f32,
    pub color: Rgb,
    pub italic: bool,
    pub bold: bool,
    pub text: String,
}

impl StyledFragment {
    /// Parse a `<span style="...">text</span>` fragment.
    ///
    /// Unknown declarations are ignored; a missing size or color, or a
    /// fragment that is not a single styled span, yields `None`.
    pub fn parse(fragment: &str) -> Option<StyledFragment> {
        let rest = fragment.trim().strip_prefix("<span style=\"")?;
        let (style, rest) = rest.split_once("\">")?;
        let body = rest.strip_suffix("</span>")?;

        let mut font_family = String::new();
        let mut font_size = None;
        let mut color = None;
        let mut italic = false;
        let mut bold = false;

        for declaration in style.split(';') {
            let Some((key, value)) = declaration.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "font-family" => font_family = value.to_string(),
                "font-size" => font_size = value.strip_suffix("pt")?.parse::<f32>().ok(),
                "color" => color = value.parse::<Rgb>().ok(),
                "font-style" => italic = value == "italic",
                "font-weight" => bold = value == "bold",
                _ => {}
            }
        }

        Some(StyledFragment {
            font_family,
            font_size: font_size?,
            color: color?,
            italic,
            bold,
            text: html_escape::decode_html_entities(body).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Rect;

    fn span(content: &str, italic: bool, bold: bool) -> Span {
        Span {
            content: content.to_string(),
            font_name: "Arial".to_string(),
            font_size: 12.0,
            color: Rgb::new(10, 20, 30),
            bold,
            italic,
            bbox: Rect::new(10.0, 10.0, 100.0, 30.0),
        }
    }

    #[test]
    fn test_markup_format() {
        assert_eq!(
            render_markup(&span("hello", true, false), &Uppercase),
            "<span style=\"font-family:Arial; font-size:12pt; color:rgb(10,20,30); \
             font-style:italic;\">HELLO</span>"
        );
        assert_eq!(
            render_markup(&span("x", false, false), &Uppercase),
            "<span style=\"font-family:Arial; font-size:12pt; color:rgb(10,20,30);\">X</span>"
        );
    }

    #[test]
    fn test_markup_escapes_text() {
        let markup = render_markup(&span("a < b & c", false, true), &Uppercase);
        assert!(markup.contains("A &lt; B &amp; C"));
        assert!(markup.contains(" font-weight:bold;"));
    }

    #[test]
    fn test_fragment_round_trip() {
        let markup = render_markup(&span("fish & chips", true, true), &Uppercase);
        let fragment = StyledFragment::parse(&markup).unwrap();

        assert_eq!(fragment.font_family, "Arial");
        assert_eq!(fragment.font_size, 12.0);
        assert_eq!(fragment.color, Rgb::new(10, 20, 30));
        assert!(fragment.italic && fragment.bold);
        assert_eq!(fragment.text, "FISH & CHIPS");
    }

    #[test]
    fn test_fractional_size() {
        let mut s = span("x", false, false);
        s.font_size = 9.5;
        let fragment = StyledFragment::parse(&render_markup(&s, &Uppercase)).unwrap();
        assert_eq!(fragment.font_size, 9.5);
    }

    #[test]
    fn test_parse_rejects_other_markup() {
        assert!(StyledFragment::parse("<p>hello</p>").is_none());
        assert!(StyledFragment::parse("<span style=\"color:rgb(0,0,0);\">x</span>").is_none());
    }

    #[test]
    fn test_uppercase_is_idempotent() {
        let once = Uppercase.apply("Straße élan");
        assert_eq!(Uppercase.apply(&once), once);
    }
}
