//! UTF-8–safe truncation.
//!
//! Byte-indexed slicing panics mid-character, so these helpers cut at the
//! last char boundary at or below the limit. Compaction uses them to
//! hard-truncate retained transcript entries; the plan store uses them
//! for derived titles.

/// Longest prefix of `s` that fits in `max_bytes` without splitting a
/// character.
#[inline]
#[must_use]
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let cut = s
        .char_indices()
        .take_while(|&(i, _)| i <= max_bytes)
        .last()
        .map_or(0, |(i, _)| i);
    &s[..cut]
}

/// Like [`truncate_str`], but marks the cut with `suffix`. The result
/// never exceeds `max_bytes` (suffix included) as long as the suffix
/// itself fits; strings that already fit come back unchanged, and a
/// budget smaller than the suffix degenerates to just the suffix.
#[must_use]
pub fn truncate_with_suffix(s: &str, max_bytes: usize, suffix: &str) -> String {
    if s.len() <= max_bytes {
        return s.to_owned();
    }
    let keep = truncate_str(s, max_bytes.saturating_sub(suffix.len()));
    let mut out = String::with_capacity(keep.len() + suffix.len());
    out.push_str(keep);
    out.push_str(suffix);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_strings_pass_through() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello", 5), "hello");
    }

    #[test]
    fn ascii_cut_at_limit() {
        assert_eq!(truncate_str("hello world", 5), "hello");
        assert_eq!(truncate_str("hello", 0), "");
    }

    #[test]
    fn cut_snaps_below_multibyte_char() {
        // '—' (U+2014) spans bytes 2..5
        let s = "ab—cd";
        assert_eq!(truncate_str(s, 3), "ab");
        assert_eq!(truncate_str(s, 4), "ab");
        assert_eq!(truncate_str(s, 5), "ab—");
    }

    #[test]
    fn four_byte_scalar() {
        let s = "hi🦀bye";
        assert_eq!(truncate_str(s, 3), "hi");
        assert_eq!(truncate_str(s, 6), "hi🦀");
    }

    #[test]
    fn suffix_only_on_overflow() {
        assert_eq!(truncate_with_suffix("hello", 10, "..."), "hello");
        assert_eq!(truncate_with_suffix("hello world", 8, "..."), "hello...");
    }

    #[test]
    fn result_never_exceeds_budget() {
        let out = truncate_with_suffix("héllo wörld", 7, "...");
        assert!(out.len() <= 7);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn budget_smaller_than_suffix() {
        assert_eq!(truncate_with_suffix("hello", 2, "..."), "...");
    }
}
