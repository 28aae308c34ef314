//! Close-name suggestions for unknown task references.

/// Candidates that look like the input: case-insensitive prefix or suffix match,
/// or within edit distance 3. At most `limit` results, in candidate order.
pub fn similar_names(input: &str, candidates: &[String], limit: usize) -> Vec<String> {
    let input_lower = input.to_lowercase();

    candidates
        .iter()
        .filter(|candidate| {
            let lower = candidate.to_lowercase();
            if lower == input_lower {
                return false;
            }
            lower.starts_with(&input_lower)
                || lower.ends_with(&input_lower)
                || levenshtein(&input_lower, &lower) <= 3
        })
        .take(limit)
        .cloned()
        .collect()
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();
    let mut current = vec![0usize; b_chars.len() + 1];

    for (i, a_char) in a_chars.iter().enumerate() {
        current[0] = i + 1;
        for (j, b_char) in b_chars.iter().enumerate() {
            let cost = usize::from(a_char != b_char);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b_chars.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn typos_are_suggested() {
        let candidates = names(&["compile", "compile-less", "docs"]);
        assert_eq!(similar_names("complie", &candidates, 3), vec!["compile"]);
    }

    #[test]
    fn prefixes_are_suggested() {
        let candidates = names(&["jshint:core", "jshint:test", "jscs:core"]);
        assert_eq!(
            similar_names("jshint", &candidates, 3),
            vec!["jshint:core", "jshint:test"]
        );
    }

    #[test]
    fn unrelated_names_are_not_suggested() {
        let candidates = names(&["compile", "docs"]);
        assert!(similar_names("uglify:build", &candidates, 3).is_empty());
    }

    #[test]
    fn levenshtein_distances() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("docs", "docs"), 0);
    }
}
