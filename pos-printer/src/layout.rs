//! Receipt layout engine
//!
//! Turns a [`ReceiptDocument`] into transport-agnostic [`LayoutLine`]s laid out
//! on the character grid of a [`PaperProfile`]. Both wire encoders
//! ([`crate::escpos`] and [`crate::markup`]) are driven from the same
//! [`ReceiptLayout`], so 58mm/80mm formatting is identical across transports.
//!
//! Content lines are classified one at a time:
//!
//! - blank: kept as an empty line
//! - item: `"{name} x {qty} RM {price}"`, price aligned to the right edge
//! - total: `"{label}: {value}"`, value aligned to the right edge
//! - plain: printed verbatim
//!
//! A line that cannot be split as its class requires is printed verbatim.

use crate::model::{PaperProfile, ReceiptDocument};
use crate::text::{pad_left, pad_right, rule, text_width};

/// Separator between an item name and its quantity
const ITEM_SEPARATOR: &str = " x ";

/// Currency marker that starts the price part of an item line
const CURRENCY_MARKER: &str = "RM";

/// Labels that mark a line as a total/summary line
const TOTAL_LABELS: [&str; 8] = [
    "RM",
    "Subtotal:",
    "Tax",
    "Service",
    "Total:",
    "Payment:",
    "Paid:",
    "Change:",
];

/// Paper widths at or above this many characters keep item lines on one row
const WIDE_PAPER_CHARS: usize = 48;

/// Blank lines fed before the cut
pub const FEED_LINES: u8 = 3;

/// Horizontal alignment of a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Center,
    Right,
}

/// Character styling of a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emphasis {
    Normal,
    /// Bold, double width and height
    Title,
    /// Secondary text such as the timestamp
    Small,
}

/// One line of output after classification and alignment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutLine {
    pub text: String,
    pub alignment: Alignment,
    pub emphasis: Emphasis,
}

impl LayoutLine {
    pub fn left(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            alignment: Alignment::Left,
            emphasis: Emphasis::Normal,
        }
    }

    pub fn center(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            alignment: Alignment::Center,
            emphasis: Emphasis::Normal,
        }
    }

    pub fn blank() -> Self {
        Self::left(String::new())
    }

    fn with_emphasis(mut self, emphasis: Emphasis) -> Self {
        self.emphasis = emphasis;
        self
    }
}

/// Classification of one source content line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Blank,
    Item,
    Total,
    Plain,
}

/// Classify a content line. Pure function of the text.
pub fn classify(line: &str) -> LineKind {
    if line.trim().is_empty() {
        LineKind::Blank
    } else if line.contains(ITEM_SEPARATOR) {
        LineKind::Item
    } else if TOTAL_LABELS.iter().any(|label| line.contains(label)) {
        LineKind::Total
    } else {
        LineKind::Plain
    }
}

/// Lay out one content line on a grid of `width` characters.
///
/// Returns one text row per printed line. Lines whose class cannot be
/// applied come back verbatim.
pub fn format_content_line(line: &str, width: usize) -> Vec<String> {
    let formatted = match classify(line) {
        LineKind::Blank => Some(vec![String::new()]),
        LineKind::Item => format_item(line, width),
        LineKind::Total => format_total(line, width).map(|row| vec![row]),
        LineKind::Plain => None,
    };
    formatted.unwrap_or_else(|| vec![line.to_string()])
}

/// `"Nasi Lemak x 2 RM 12.00"` -> name, quantity and price aligned to `width`
fn format_item(line: &str, width: usize) -> Option<Vec<String>> {
    let (name, remaining) = line.split_once(ITEM_SEPARATOR)?;
    let name = name.trim();
    let remaining = remaining.trim();

    let price_index = remaining.rfind(CURRENCY_MARKER)?;
    let quantity = remaining[..price_index].trim();
    let price = remaining[price_index..].trim();

    let left = format!("{}{}{}", name, ITEM_SEPARATOR, quantity);
    if width >= WIDE_PAPER_CHARS {
        let left_width = width.saturating_sub(text_width(price));
        Some(vec![format!("{}{}", pad_right(&left, left_width), price)])
    } else {
        Some(vec![left, pad_left(price, width)])
    }
}

/// `"Subtotal: RM 24.00"` -> label left, value flush right
fn format_total(line: &str, width: usize) -> Option<String> {
    let colon = line.find(':')?;
    let label = line[..=colon].trim();
    let value = line[colon + 1..].trim();

    let label_width = width.saturating_sub(text_width(value));
    Some(format!("{}{}", pad_right(label, label_width), value))
}

/// Complete layout of one receipt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptLayout {
    pub width: usize,
    /// Title block
    pub header: Vec<LayoutLine>,
    /// Separators, content, timestamp
    pub body: Vec<LayoutLine>,
    /// Closing message
    pub footer: Vec<LayoutLine>,
    /// Blank lines fed before the paper cut
    pub feed_lines: u8,
}

impl ReceiptLayout {
    /// Sections in print order
    pub fn sections(&self) -> [&[LayoutLine]; 3] {
        [&self.header, &self.body, &self.footer]
    }

    /// All lines in print order
    pub fn lines(&self) -> impl Iterator<Item = &LayoutLine> {
        self.header
            .iter()
            .chain(self.body.iter())
            .chain(self.footer.iter())
    }
}

/// Lay out a receipt for the given paper profile.
///
/// The width is read once from `paper` and used for every row.
pub fn render(doc: &ReceiptDocument, paper: &PaperProfile) -> ReceiptLayout {
    let width = paper.chars_per_line();
    let separator = rule('=', width);

    let header = vec![LayoutLine::center(doc.title.clone()).with_emphasis(Emphasis::Title)];

    let mut body = vec![LayoutLine::left(separator.clone())];
    for line in doc.content.split('\n') {
        body.extend(
            format_content_line(line, width)
                .into_iter()
                .map(LayoutLine::left),
        );
    }
    if let Some(timestamp) = doc.printable_timestamp() {
        body.push(LayoutLine::blank());
        body.push(LayoutLine::left(format!("Time: {}", timestamp)).with_emphasis(Emphasis::Small));
    }
    body.push(LayoutLine::left(separator));
    body.push(LayoutLine::blank());

    let footer = vec![
        LayoutLine::center("Thank you!"),
        LayoutLine::center("Please come again"),
    ];

    ReceiptLayout {
        width,
        header,
        body,
        footer,
        feed_lines: FEED_LINES,
    }
}
