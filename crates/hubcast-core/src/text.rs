//! UTF-8–safe string truncation for log previews.

/// Truncate a string to at most `max_bytes` bytes at a char boundary.
#[inline]
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Short preview of a raw message for logs and error values.
///
/// Appends `...` when the input was cut.
pub fn preview(s: &str, max_bytes: usize) -> String {
    let cut = truncate_str(s, max_bytes);
    if cut.len() == s.len() {
        s.to_owned()
    } else {
        format!("{cut}...")
    }
}
