//! Edit-distance name suggestions.
//!
//! Pure functions over string sets: given the names a topology declares and
//! a name it references, find the declared name the author most likely
//! meant. Suggestions are attached to errors as advisory text only.

/// Minimum similarity (1.0 = identical) for a name to be suggested.
pub const SUGGESTION_THRESHOLD: f64 = 0.6;

/// Levenshtein distance between two strings, counted in characters.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Case-insensitive similarity in `[0.0, 1.0]`.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - edit_distance(&a, &b) as f64 / longest as f64
}

/// Nearest candidate at or above [`SUGGESTION_THRESHOLD`]. Ties go to the
/// candidate listed first.
pub fn suggest<'a, I>(name: &str, candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut best: Option<(&'a str, f64)> = None;
    for candidate in candidates {
        let score = similarity(name, candidate);
        if score < SUGGESTION_THRESHOLD {
            continue;
        }
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((candidate, score));
        }
    }
    best.map(|(candidate, _)| candidate)
}

/// Up to `limit` candidates ordered by ascending case-insensitive edit
/// distance, no threshold applied.
pub fn closest<'a, I>(name: &str, candidates: I, limit: usize) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let needle = name.to_lowercase();
    let mut scored: Vec<(usize, usize, &'a str)> = candidates
        .into_iter()
        .enumerate()
        .map(|(order, candidate)| (edit_distance(&needle, &candidate.to_lowercase()), order, candidate))
        .collect();
    scored.sort();
    scored.into_iter().take(limit).map(|(_, _, c)| c).collect()
}

/// Render the "did you mean" tail appended to reference errors.
pub fn hint(suggestion: Option<&str>) -> String {
    suggestion
        .map(|s| format!(" (did you mean '{}'?)", s))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("tet-net", "test-net"), 1);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("same", "same"), 0);
    }

    #[test]
    fn test_suggest_typo() {
        let declared = ["test-net", "db-net"];
        assert_eq!(suggest("tet-net", declared), Some("test-net"));
        assert_eq!(suggest("TEST-NET", declared), Some("test-net"));
    }

    #[test]
    fn test_suggest_nothing_close() {
        assert_eq!(suggest("completely-different", ["web"]), None);
        assert_eq!(suggest("web", std::iter::empty::<&str>()), None);
    }

    #[test]
    fn test_closest_ordering() {
        let catalog = ["ubuntu-22.04", "ubuntu-20.04", "windows-2022", "debian-12"];
        assert_eq!(
            closest("ubuntu-22.4", catalog, 2),
            vec!["ubuntu-22.04", "ubuntu-20.04"]
        );
    }
}
