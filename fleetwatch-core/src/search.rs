use std::ops::Range;

fn same_ignoring_case(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

/// Character range of the first case-insensitive occurrence of `needle`
pub fn find_match(haystack: &str, needle: &str) -> Option<Range<usize>> {
    let needle: Vec<char> = needle.chars().collect();
    if needle.is_empty() {
        return None;
    }
    let hay: Vec<char> = haystack.chars().collect();
    if needle.len() > hay.len() {
        return None;
    }
    (0..=hay.len() - needle.len())
        .find(|&start| {
            needle
                .iter()
                .zip(&hay[start..])
                .all(|(n, h)| same_ignoring_case(*n, *h))
        })
        .map(|start| start..start + needle.len())
}

/// An empty search matches everything
pub fn matches(haystack: &str, needle: &str) -> bool {
    needle.is_empty() || find_match(haystack, needle).is_some()
}

/// Keep the ids whose identity matches, preserving order
pub fn filter<'a, I, F>(ids: I, needle: &str, identity: F) -> Vec<String>
where
    I: IntoIterator<Item = &'a String>,
    F: Fn(&str) -> Option<String>,
{
    ids.into_iter()
        .filter(|id| identity(id).is_some_and(|label| matches(&label, needle)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_occurrence_only() {
        assert_eq!(find_match("web-web", "web"), Some(0..3));
        assert_eq!(find_match("db-WEB-1", "web"), Some(3..6));
        assert_eq!(find_match("db-1", "web"), None);
        assert_eq!(find_match("ab", "abc"), None);
        assert_eq!(find_match("anything", ""), None);
    }

    #[test]
    fn test_char_positions_not_bytes() {
        assert_eq!(find_match("śrv-Web", "web"), Some(4..7));
    }

    #[test]
    fn test_filter_web_hosts() {
        let ids: Vec<String> = vec!["web-1".into(), "web-2".into(), "db-1".into()];
        let identity = |id: &str| Some(id.to_string());

        assert_eq!(filter(&ids, "web", identity), vec!["web-1", "web-2"]);
        assert_eq!(filter(&ids, "web-2", identity), vec!["web-2"]);
        // deleting a character widens the match again
        assert_eq!(filter(&ids, "web-", identity), vec!["web-1", "web-2"]);
        assert_eq!(filter(&ids, "", identity), ids);
    }
}
