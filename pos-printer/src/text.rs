//! Fixed-width text helpers
//!
//! Widths are counted in characters: the receipt grid is one character per
//! cell and the command subset in use never selects a double-byte codepage.

/// Character width of a string
pub fn text_width(s: &str) -> usize {
    s.chars().count()
}

/// Truncate a string to at most `max_width` characters
pub fn truncate(s: &str, max_width: usize) -> String {
    s.chars().take(max_width).collect()
}

/// Pad (or truncate) `s` to exactly `width` characters, text on the left
pub fn pad_right(s: &str, width: usize) -> String {
    pad(s, width, false)
}

/// Pad (or truncate) `s` to exactly `width` characters, text on the right
pub fn pad_left(s: &str, width: usize) -> String {
    pad(s, width, true)
}

fn pad(s: &str, width: usize, align_right: bool) -> String {
    let current_width = text_width(s);
    if current_width >= width {
        return truncate(s, width);
    }
    let spaces = " ".repeat(width - current_width);
    if align_right {
        format!("{}{}", spaces, s)
    } else {
        format!("{}{}", s, spaces)
    }
}

/// A full-width rule made of `ch`
pub fn rule(ch: char, width: usize) -> String {
    std::iter::repeat_n(ch, width).collect()
}
