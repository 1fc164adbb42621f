//! ESC/POS command builder and raw receipt encoder
//!
//! The raw encoder is used for network printers: it writes literal control
//! bytes interleaved with the UTF-8 text of each layout line. The exact byte
//! sequence is what deployed printers expect, so changes here are wire-visible.

use crate::layout::{Alignment, Emphasis, ReceiptLayout};
use tracing::instrument;

/// ESC/POS command builder
///
/// Builds ESC/POS byte sequences for thermal printers.
pub struct EscPosBuilder {
    buf: Vec<u8>,
}

impl EscPosBuilder {
    /// Create a new builder. Line widths are already fixed by the layout.
    pub fn new() -> Self {
        let mut buf = Vec::with_capacity(1024);
        // Initialize printer (ESC @)
        buf.extend_from_slice(&[0x1B, 0x40]);
        Self { buf }
    }

    // === Text Output ===

    /// Write raw text
    pub fn text(&mut self, s: &str) -> &mut Self {
        self.buf.extend_from_slice(s.as_bytes());
        self
    }

    /// Write text followed by newline
    pub fn line(&mut self, s: &str) -> &mut Self {
        self.text(s);
        self.buf.push(b'\n');
        self
    }

    /// Write empty line
    pub fn newline(&mut self) -> &mut Self {
        self.buf.push(b'\n');
        self
    }

    // === Alignment ===

    /// Align text to center
    pub fn center(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x61, 0x01]);
        self
    }

    /// Align text to left (default)
    pub fn left(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x61, 0x00]);
        self
    }

    /// Align text to right
    pub fn right(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x61, 0x02]);
        self
    }

    pub fn align(&mut self, alignment: Alignment) -> &mut Self {
        match alignment {
            Alignment::Left => self.left(),
            Alignment::Center => self.center(),
            Alignment::Right => self.right(),
        }
    }

    // === Text Style ===

    /// Enable bold text
    pub fn bold(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x45, 0x01]);
        self
    }

    /// Disable bold text
    pub fn bold_off(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1B, 0x45, 0x00]);
        self
    }

    /// Double width and height
    pub fn double_size(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1D, 0x21, 0x11]);
        self
    }

    /// Double height only
    pub fn double_height(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1D, 0x21, 0x01]);
        self
    }

    /// Double width only
    pub fn double_width(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1D, 0x21, 0x10]);
        self
    }

    /// Reset to normal size
    pub fn reset_size(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1D, 0x21, 0x00]);
        self
    }

    // === Paper Control ===

    /// Partial cut after feeding to the cutter (GS V 66 0)
    pub fn partial_cut(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[0x1D, 0x56, 0x42, 0x00]);
        self
    }

    // === Build ===

    /// Build the final byte buffer
    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for EscPosBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a receipt layout as a raw ESC/POS byte stream.
///
/// Each section opens with an explicit alignment command; the title line is
/// wrapped in bold + double size and followed by a full style reset.
#[instrument(skip(layout), fields(width = layout.width))]
pub fn encode(layout: &ReceiptLayout) -> Vec<u8> {
    let mut b = EscPosBuilder::new();

    for section in layout.sections() {
        let Some(first) = section.first() else {
            continue;
        };
        let mut current = first.alignment;
        b.align(current);

        for line in section {
            if line.alignment != current {
                current = line.alignment;
                b.align(current);
            }
            match line.emphasis {
                Emphasis::Title => {
                    b.bold().double_size().line(&line.text);
                    b.bold_off().reset_size().left();
                    current = Alignment::Left;
                }
                // No small font in the conservative command subset
                Emphasis::Normal | Emphasis::Small => {
                    b.line(&line.text);
                }
            }
        }
    }

    for _ in 0..layout.feed_lines {
        b.newline();
    }
    b.partial_cut();
    b.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::render;
    use crate::model::{PaperProfile, PaperWidth, ReceiptDocument};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builder_basic() {
        let mut b = EscPosBuilder::new();
        b.center().double_size().line("TITLE").reset_size().left().line("body");

        let data = b.build();
        assert_eq!(&data[..2], &[0x1B, 0x40]);
        let s = String::from_utf8_lossy(&data);
        assert!(s.contains("TITLE\n"));
        assert!(s.contains("body\n"));
    }

    #[test]
    fn test_encode_exact_bytes() {
        let doc = ReceiptDocument::new("T", "Hi").with_timestamp("1");
        let layout = render(&doc, &PaperProfile::new(PaperWidth::Mm58));
        let sep = "=".repeat(32);

        let mut expected: Vec<u8> = vec![0x1B, 0x40];
        expected.extend_from_slice(&[0x1B, 0x61, 0x01, 0x1B, 0x45, 0x01, 0x1D, 0x21, 0x11]);
        expected.extend_from_slice(b"T\n");
        expected.extend_from_slice(&[0x1B, 0x45, 0x00, 0x1D, 0x21, 0x00, 0x1B, 0x61, 0x00]);
        expected.extend_from_slice(&[0x1B, 0x61, 0x00]);
        expected.extend_from_slice(format!("{sep}\nHi\n\nTime: 1\n{sep}\n\n").as_bytes());
        expected.extend_from_slice(&[0x1B, 0x61, 0x01]);
        expected.extend_from_slice(b"Thank you!\nPlease come again\n\n\n\n");
        expected.extend_from_slice(&[0x1D, 0x56, 0x42, 0x00]);

        assert_eq!(encode(&layout), expected);
    }

    #[test]
    fn test_encode_keeps_utf8_text() {
        let doc = ReceiptDocument::new("Café", "Teh Ais");
        let data = encode(&render(&doc, &PaperProfile::default()));
        let s = String::from_utf8_lossy(&data);
        assert!(s.contains("Café\n"));
    }
}
