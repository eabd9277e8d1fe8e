//! URL canonicalisation and SERP overlap scoring.

use std::collections::HashSet;

/// Canonical form used when comparing result URLs: query string and fragment
/// dropped, trailing slashes removed, lowercased. Empty input stays empty.
pub fn normalize_url(url: &str) -> String {
    let without_suffix = match url.find(&['?', '#'][..]) {
        Some(idx) => &url[..idx],
        None => url,
    };
    without_suffix.trim_end_matches('/').to_lowercase()
}

fn normalized_set(urls: &[String]) -> HashSet<String> {
    urls.iter()
        .map(|u| normalize_url(u))
        .filter(|u| !u.is_empty())
        .collect()
}

/// Percentage of `original` that also appears in `candidate`, in [0, 100].
///
/// The denominator is the size of the *original* set, not the union: the score
/// answers "how much of the seed's result page does this keyword reproduce",
/// so `url_overlap(a, b)` and `url_overlap(b, a)` generally differ.
pub fn url_overlap(original: &[String], candidate: &[String]) -> f64 {
    let original = normalized_set(original);
    let candidate = normalized_set(candidate);
    if original.is_empty() || candidate.is_empty() {
        return 0.0;
    }

    let shared = original.intersection(&candidate).count();
    shared as f64 / original.len() as f64 * 100.0
}

/// Normalized URLs present in both lists, sorted.
pub fn matching_urls(original: &[String], candidate: &[String]) -> Vec<String> {
    let original = normalized_set(original);
    let candidate = normalized_set(candidate);
    let mut shared: Vec<String> = original.intersection(&candidate).cloned().collect();
    shared.sort();
    shared
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn normalize_strips_query_fragment_and_slash() {
        assert_eq!(
            normalize_url("https://Example.com/Guide/?utm_source=x"),
            "https://example.com/guide"
        );
        assert_eq!(normalize_url("https://a.com/page#section"), "https://a.com/page");
        assert_eq!(normalize_url("https://a.com/p#frag?notquery"), "https://a.com/p");
        assert_eq!(normalize_url("https://a.com/"), "https://a.com");
    }

    #[test]
    fn normalize_empty_is_empty() {
        assert_eq!(normalize_url(""), "");
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = [
            "https://A.com/x/?q=1",
            "https://a.com//",
            "HTTP://a.com/b#c",
            "https://a.com/a/b/c/",
            "/",
            "?only-query",
            "",
        ];
        for s in samples {
            let once = normalize_url(s);
            assert_eq!(normalize_url(&once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn overlap_with_self_is_full() {
        let a = urls(&["https://a.com", "https://b.com/x", "https://c.com/y/"]);
        assert_eq!(url_overlap(&a, &a), 100.0);
    }

    #[test]
    fn overlap_with_empty_side_is_zero() {
        let a = urls(&["https://a.com"]);
        assert_eq!(url_overlap(&a, &[]), 0.0);
        assert_eq!(url_overlap(&[], &a), 0.0);
        assert_eq!(url_overlap(&[], &[]), 0.0);
    }

    #[test]
    fn overlap_divides_by_original_size() {
        let original = urls(&["https://a.com", "https://b.com", "https://c.com", "https://d.com"]);
        let candidate = urls(&["https://a.com/", "https://B.com?ref=1"]);
        assert_eq!(url_overlap(&original, &candidate), 50.0);
        // Reversed: both candidate URLs are in the original set.
        assert_eq!(url_overlap(&candidate, &original), 100.0);
    }

    #[test]
    fn overlap_stays_in_range() {
        let original = urls(&["https://a.com", "https://a.com/", "https://b.com"]);
        let candidate = urls(&["https://a.com", "https://b.com", "https://c.com", "https://d.com"]);
        let score = url_overlap(&original, &candidate);
        assert!((0.0..=100.0).contains(&score));
        assert_eq!(score, 100.0);
    }

    #[test]
    fn matching_urls_are_normalized_and_sorted() {
        let original = urls(&["https://z.com/", "https://a.com/x?y=1", "https://m.com"]);
        let candidate = urls(&["https://A.com/x", "https://z.com"]);
        assert_eq!(
            matching_urls(&original, &candidate),
            vec!["https://a.com/x".to_string(), "https://z.com".to_string()]
        );
    }
}
