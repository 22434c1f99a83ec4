use std::path::{Path, PathBuf};

use unicode_normalization::UnicodeNormalization;

pub fn normalize_name(name: &str) -> String {
    name
        .trim()
        .nfkc()
        .collect::<String>()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect()
}

pub fn normalize_path(path: &Path) -> PathBuf {
    path.to_string_lossy()
        .to_lowercase()
        .replace('\\', "/")
        .into()
}

/// Matcher-grade text normalization: NFKD decomposition (so accented
/// characters fold to their base letter once combining marks are dropped),
/// lowercase, then keep only alphanumerics and whitespace, collapsing runs
/// of whitespace to single spaces. Distinct from `normalize_name` (which
/// keeps NFKC form for display names); this is purely for Jaccard/word
/// overlap comparison in the Matcher.
pub fn normalize_for_matching(text: &str) -> String {
    let folded: String = text
        .nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect();

    let cleaned: String = folded
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();

    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Word-set Jaccard similarity between two already-normalized strings.
pub fn word_jaccard_similarity(a: &str, b: &str) -> f64 {
    use std::collections::HashSet;

    let set_a: HashSet<&str> = a.split_whitespace().collect();
    let set_b: HashSet<&str> = b.split_whitespace().collect();

    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }

    let intersection = set_a.intersection(&set_b).count() as f64;
    let union = set_a.union(&set_b).count() as f64;

    intersection / union
}