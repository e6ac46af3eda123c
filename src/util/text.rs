use std::borrow::Cow;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const ELLIPSIS: &str = "...";

/// Display width of a string in terminal columns.
///
/// ```
/// use factfeed::util::display_width;
///
/// assert_eq!(display_width("Hello"), 5);
/// assert_eq!(display_width("你好"), 4);
/// ```
pub fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Truncates a string to at most `max_width` terminal columns, appending
/// "..." when something was cut.
///
/// Returns `Cow::Borrowed` when the string already fits. Widths of 3 or less
/// leave no room for the ellipsis, so the text is cut without one.
///
/// ```
/// use factfeed::util::truncate_to_width;
///
/// assert_eq!(truncate_to_width("Short", 10), "Short");
/// assert_eq!(truncate_to_width("Hello World", 8), "Hello...");
/// assert_eq!(truncate_to_width("Test", 2), "Te");
/// ```
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if display_width(s) <= max_width {
        return Cow::Borrowed(s);
    }

    let (budget, suffix) = if max_width > ELLIPSIS.len() {
        (max_width - ELLIPSIS.len(), ELLIPSIS)
    } else {
        (max_width, "")
    };

    let mut used = 0;
    let mut cut = 0;
    for (idx, c) in s.char_indices() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        cut = idx + c.len_utf8();
    }

    Cow::Owned(format!("{}{}", &s[..cut], suffix))
}

/// SEC-001: Strip terminal control characters and ANSI escape sequences.
///
/// Fact text is user-submitted and printed straight to the terminal, so
/// escape sequences must not survive. Tab and newline are kept; carriage
/// return becomes a space so it cannot overwrite the start of the line.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let needs_strip = s
        .chars()
        .any(|c| c.is_control() && c != '\t' && c != '\n');
    if !needs_strip {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\x1b' => match chars.peek() {
                // CSI: parameters until a final byte in 0x40..=0x7e
                Some('[') => {
                    chars.next();
                    for c in chars.by_ref() {
                        if ('\x40'..='\x7e').contains(&c) {
                            break;
                        }
                    }
                }
                // OSC: until BEL or ESC-backslash
                Some(']') => {
                    chars.next();
                    while let Some(c) = chars.next() {
                        if c == '\x07' {
                            break;
                        }
                        if c == '\x1b' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            },
            '\r' => out.push(' '),
            '\t' | '\n' => out.push(c),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}
