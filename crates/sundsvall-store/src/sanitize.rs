//! Search-input sanitation for LIKE queries.

/// Sanitize caller-provided search input.
///
/// Truncates to `max_length` characters, strips control characters, and
/// escapes backslash, `%` and `_` in that order so the result is safe
/// inside a `LIKE … ESCAPE '\'` pattern.
pub fn sanitize_search_input(value: &str, max_length: usize) -> String {
    let truncated: String = value
        .chars()
        .take(max_length)
        .filter(|c| !matches!(*c as u32, 0x00..=0x1f | 0x7f))
        .collect();

    truncated
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncates_to_max_length() {
        let long = "a".repeat(250);
        assert_eq!(sanitize_search_input(&long, 100).len(), 100);
    }

    #[test]
    fn test_strips_control_characters() {
        assert_eq!(sanitize_search_input("ab\x00c\x1fd\x7fe", 100), "abcde");
    }

    #[test]
    fn test_escapes_like_wildcards() {
        assert_eq!(sanitize_search_input("50%_done", 100), "50\\%\\_done");
    }

    #[test]
    fn test_escapes_backslash_first() {
        // A backslash followed by a percent must not double-escape.
        assert_eq!(sanitize_search_input("a\\%", 100), "a\\\\\\%");
    }

    #[test]
    fn test_trims_whitespace() {
        assert_eq!(sanitize_search_input("  Testbolaget  ", 100), "Testbolaget");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(sanitize_search_input("", 100), "");
    }
}
