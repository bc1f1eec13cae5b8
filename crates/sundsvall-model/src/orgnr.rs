//! Organization-number normalization.

/// Strip separators from an organization number.
///
/// `"556012-5791"` and `"556012 5791"` both normalize to `"5560125791"`.
/// Normalization is idempotent.
pub fn normalize_orgnr(orgnr: &str) -> String {
    orgnr.chars().filter(|c| *c != '-' && *c != ' ').collect()
}

/// Format an organization number for the registry API.
///
/// 10-digit numbers get the standard `NNNNNN-NNNN` hyphenation. 12-digit
/// personal-number form is passed through verbatim. Anything else is
/// returned as given.
pub fn format_orgnr(orgnr: &str) -> String {
    let clean = normalize_orgnr(orgnr);
    match clean.len() {
        10 => format!("{}-{}", &clean[..6], &clean[6..]),
        12 => clean,
        _ => orgnr.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_separators() {
        assert_eq!(normalize_orgnr("556012-5791"), "5560125791");
        assert_eq!(normalize_orgnr("556012 5791"), "5560125791");
        assert_eq!(normalize_orgnr("5560125791"), "5560125791");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize_orgnr("556012-5791");
        assert_eq!(normalize_orgnr(&once), once);
    }

    #[test]
    fn test_format_ten_digits() {
        assert_eq!(format_orgnr("5560125791"), "556012-5791");
        assert_eq!(format_orgnr("556012-5791"), "556012-5791");
    }

    #[test]
    fn test_format_personal_number_verbatim() {
        assert_eq!(format_orgnr("195001012345"), "195001012345");
    }

    #[test]
    fn test_format_odd_length_passthrough() {
        assert_eq!(format_orgnr("12345"), "12345");
    }
}
