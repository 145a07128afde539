//! Char-indexed string helpers.
//!
//! Every offset stored in the tree counts Unicode scalar values, never bytes,
//! so slicing through these helpers can not land inside a code point.

/// Number of chars in `s`.
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte index of the char at `offset`, clamped to the end of the string.
pub fn byte_index(s: &str, offset: usize) -> usize {
    s.char_indices()
        .nth(offset)
        .map(|(idx, _)| idx)
        .unwrap_or(s.len())
}

/// Split `s` at a char offset.
pub fn split_at_char(s: &str, offset: usize) -> (&str, &str) {
    s.split_at(byte_index(s, offset))
}

/// Chars in `start..end` of `s`.
pub fn char_slice(s: &str, start: usize, end: usize) -> &str {
    let from = byte_index(s, start);
    let to = byte_index(s, end.max(start));
    &s[from..to]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multibyte_offsets() {
        let s = "héllo";
        assert_eq!(char_len(s), 5);
        assert_eq!(split_at_char(s, 2), ("hé", "llo"));
        assert_eq!(char_slice(s, 1, 3), "él");
    }

    #[test]
    fn test_offsets_clamp_to_end() {
        assert_eq!(byte_index("abc", 10), 3);
        assert_eq!(split_at_char("abc", 7), ("abc", ""));
        assert_eq!(char_slice("abc", 2, 1), "");
    }
}
