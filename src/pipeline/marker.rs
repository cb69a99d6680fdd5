//! Helpers for locating delimiters that may straddle fragment boundaries

/// Length of the longest suffix of `haystack` that is a proper prefix of `marker`.
///
/// The returned length always falls on a char boundary of `haystack`, and is
/// at most `marker.len() - 1`.
pub fn partial_suffix_len(haystack: &str, marker: &str) -> usize {
    if marker.is_empty() {
        return 0;
    }
    let max = haystack.len().min(marker.len() - 1);
    (1..=max)
        .rev()
        .find(|&n| {
            let start = haystack.len() - n;
            haystack.is_char_boundary(start) && marker.as_bytes().starts_with(&haystack.as_bytes()[start..])
        })
        .unwrap_or(0)
}

/// Split `text` at the start of a trailing partial marker.
///
/// Returns `(settled, held)` where `held` might still grow into `marker`.
pub fn split_partial<'a>(text: &'a str, marker: &str) -> (&'a str, &'a str) {
    let held = partial_suffix_len(text, marker);
    text.split_at(text.len() - held)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_suffix_len() {
        assert_eq!(partial_suffix_len("abc<thi", "<think>"), 4);
        assert_eq!(partial_suffix_len("abc<", "<think>"), 1);
        assert_eq!(partial_suffix_len("abc", "<think>"), 0);
        assert_eq!(partial_suffix_len("", "<think>"), 0);
    }

    #[test]
    fn test_complete_marker_is_not_partial() {
        assert_eq!(partial_suffix_len("x<think>", "<think>"), 0);
    }

    #[test]
    fn test_bounded_by_marker_len() {
        assert_eq!(partial_suffix_len("TOPI", "TOPIC:"), 4);
        assert_eq!(partial_suffix_len("TOPIC", "TOPIC:"), 5);
    }

    #[test]
    fn test_respects_char_boundaries() {
        assert_eq!(partial_suffix_len("héllo", "é"), 0);
        assert_eq!(partial_suffix_len("ab", "b"), 0);
    }

    #[test]
    fn test_split_partial() {
        assert_eq!(split_partial("hello</thi", "</think>"), ("hello", "</thi"));
        assert_eq!(split_partial("hello", "</think>"), ("hello", ""));
    }
}
