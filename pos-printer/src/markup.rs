//! Tag-markup encoder for USB and Bluetooth printers
//!
//! USB and Bluetooth jobs go through a formatting backend that understands a
//! small tag language:
//!
//! - `[L]`, `[C]`, `[R]` at the start of a line select alignment
//! - `<b>…</b>` bold
//! - `<font size='big'|'tall'|'wide'|'small'>…</font>` character size
//!
//! Receipt text is escaped (`&amp;`, `&lt;`, `&gt;`, `&#91;`) so that
//! user content never reads as a tag.
//!
//! [`encode`] places the tags from the same [`ReceiptLayout`] the raw encoder
//! uses. Turning tags into bytes and cutting the paper is the job of a
//! [`MarkupRenderer`]; [`TagRenderer`] is the bundled one.

use crate::error::PrintResult;
use crate::escpos::EscPosBuilder;
use crate::layout::{Alignment, Emphasis, ReceiptLayout};
use crate::model::PaperProfile;
use tracing::instrument;

/// Character size selectable with a `<font>` tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontSize {
    Big,
    Tall,
    Wide,
    Small,
}

impl FontSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            FontSize::Big => "big",
            FontSize::Tall => "tall",
            FontSize::Wide => "wide",
            FontSize::Small => "small",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "big" => Some(FontSize::Big),
            "tall" => Some(FontSize::Tall),
            "wide" => Some(FontSize::Wide),
            "small" => Some(FontSize::Small),
            _ => None,
        }
    }
}

/// Escape text so it prints literally inside markup
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '[' => out.push_str("&#91;"),
            c => out.push(c),
        }
    }
    out
}

const ENTITIES: [(&str, char); 4] = [("&amp;", '&'), ("&lt;", '<'), ("&gt;", '>'), ("&#91;", '[')];

/// Reverse [`escape`]. Unknown entities are kept as written.
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];
        match ENTITIES.iter().find(|(entity, _)| rest.starts_with(entity)) {
            Some((entity, c)) => {
                out.push(*c);
                rest = &rest[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn alignment_tag(alignment: Alignment) -> &'static str {
    match alignment {
        Alignment::Left => "[L]",
        Alignment::Center => "[C]",
        Alignment::Right => "[R]",
    }
}

/// String-based markup builder
///
/// Unlike [`EscPosBuilder`], which emits control bytes, this accumulates the
/// tag language as a UTF-8 string.
pub struct MarkupBuilder {
    buf: String,
}

impl MarkupBuilder {
    pub fn new() -> Self {
        Self { buf: String::new() }
    }

    /// Write markup as is
    pub fn write(&mut self, s: &str) -> &mut Self {
        self.buf.push_str(s);
        self
    }

    /// Write text escaped
    pub fn text(&mut self, s: &str) -> &mut Self {
        self.buf.push_str(&escape(s));
        self
    }

    /// Write a newline
    pub fn newline(&mut self) -> &mut Self {
        self.buf.push('\n');
        self
    }

    /// Open a line with an alignment tag
    pub fn align(&mut self, alignment: Alignment) -> &mut Self {
        self.write(alignment_tag(alignment))
    }

    /// Write `s` wrapped in bold tags
    pub fn bold(&mut self, s: &str) -> &mut Self {
        self.buf.push_str("<b>");
        self.buf.push_str(s);
        self.buf.push_str("</b>");
        self
    }

    /// Write `s` wrapped in a font size tag
    pub fn font(&mut self, size: FontSize, s: &str) -> &mut Self {
        self.buf.push_str("<font size='");
        self.buf.push_str(size.as_str());
        self.buf.push_str("'>");
        self.buf.push_str(s);
        self.buf.push_str("</font>");
        self
    }

    /// Finalize and return the accumulated string
    pub fn finalize(self) -> String {
        self.buf
    }
}

impl Default for MarkupBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a receipt layout as tag markup.
///
/// Every non-empty line carries its own alignment tag; empty lines are bare
/// newlines. Line text is escaped.
#[instrument(skip(layout), fields(width = layout.width))]
pub fn encode(layout: &ReceiptLayout) -> String {
    let mut m = MarkupBuilder::new();

    for line in layout.lines() {
        if line.text.is_empty() {
            m.newline();
            continue;
        }
        m.align(line.alignment);
        let text = escape(&line.text);
        match line.emphasis {
            Emphasis::Normal => m.write(&text),
            Emphasis::Title => {
                let mut inner = MarkupBuilder::new();
                inner.font(FontSize::Big, &text);
                m.bold(&inner.finalize())
            }
            Emphasis::Small => m.font(FontSize::Small, &text),
        };
        m.newline();
    }

    for _ in 0..layout.feed_lines {
        m.newline();
    }
    m.finalize()
}

/// Formatting backend that turns markup into printer bytes, cut included
pub trait MarkupRenderer: Send + Sync {
    fn render(&self, markup: &str, paper: &PaperProfile) -> PrintResult<Vec<u8>>;
}

/// Bundled renderer for the tag subset produced by [`encode`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TagRenderer;

impl MarkupRenderer for TagRenderer {
    #[instrument(skip(self, markup), fields(len = markup.len(), cpl = paper.chars_per_line()))]
    fn render(&self, markup: &str, paper: &PaperProfile) -> PrintResult<Vec<u8>> {
        let mut b = EscPosBuilder::new();

        let mut lines: Vec<&str> = markup.split('\n').collect();
        // A trailing newline terminates the last line rather than opening a new one
        if lines.last() == Some(&"") {
            lines.pop();
        }

        for line in lines {
            let (alignment, rest) = split_alignment(line);
            b.align(alignment);
            render_inline(&mut b, rest);
            b.newline();
        }

        b.partial_cut();
        Ok(b.build())
    }
}

fn split_alignment(line: &str) -> (Alignment, &str) {
    for alignment in [Alignment::Left, Alignment::Center, Alignment::Right] {
        if let Some(rest) = line.strip_prefix(alignment_tag(alignment)) {
            return (alignment, rest);
        }
    }
    (Alignment::Left, line)
}

/// Emit text and style commands for the inline tags of one line.
/// Unrecognized `<...>` sequences, unknown font sizes included, are printed
/// as text.
fn render_inline(b: &mut EscPosBuilder, mut rest: &str) {
    let mut bold = false;
    let mut sized = false;

    while !rest.is_empty() {
        let Some(start) = rest.find('<') else {
            b.text(&unescape(rest));
            break;
        };
        b.text(&unescape(&rest[..start]));
        rest = &rest[start..];

        let Some(end) = rest.find('>') else {
            b.text(&unescape(rest));
            break;
        };
        let tag = &rest[..=end];
        match tag {
            "<b>" => {
                b.bold();
                bold = true;
            }
            "</b>" => {
                b.bold_off();
                bold = false;
            }
            "</font>" => {
                b.reset_size();
                sized = false;
            }
            _ => match tag
                .strip_prefix("<font size='")
                .and_then(|t| t.strip_suffix("'>"))
                .and_then(FontSize::parse)
            {
                Some(size) => {
                    match size {
                        FontSize::Big => b.double_size(),
                        FontSize::Tall => b.double_height(),
                        FontSize::Wide => b.double_width(),
                        FontSize::Small => b.reset_size(),
                    };
                    sized = true;
                }
                None => {
                    b.text(&unescape(tag));
                }
            },
        }
        rest = &rest[end + 1..];
    }

    // Styles never leak into the next line
    if bold {
        b.bold_off();
    }
    if sized {
        b.reset_size();
    }
}
