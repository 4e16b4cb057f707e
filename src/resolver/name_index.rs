//! Fuzzy name index used for author -> editor and columnist -> writer
//! resolution. The scoring function is pluggable; Jaro-Winkler is the
//! default because person names are short and prefix-heavy.

use strsim::jaro_winkler;

/// Minimum similarity for two names to be treated as the same person.
pub const MIN_NAME_SIMILARITY: f64 = 0.88;

pub type Scorer = fn(&str, &str) -> f64;

pub struct NameIndex<T> {
    entries: Vec<(String, T)>,
    scorer: Scorer,
    floor: f64,
}

impl<T> NameIndex<T> {
    /// Build an index over (display name, candidate) pairs.
    pub fn build<I>(candidates: I) -> Self
    where
        I: IntoIterator<Item = (String, T)>,
    {
        Self {
            entries: candidates
                .into_iter()
                .map(|(name, value)| (normalize(&name), value))
                .collect(),
            scorer: jaro_winkler,
            floor: MIN_NAME_SIMILARITY,
        }
    }

    pub fn with_scorer(mut self, scorer: Scorer, floor: f64) -> Self {
        self.scorer = scorer;
        self.floor = floor;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Single best match above the similarity floor, or None.
    pub fn best_match(&self, name: &str) -> Option<&T> {
        let query = normalize(name);
        if query.is_empty() {
            return None;
        }
        let mut best: Option<(f64, &T)> = None;
        for (candidate, value) in &self.entries {
            let score = (self.scorer)(&query, candidate);
            if score < self.floor {
                continue;
            }
            if best.map(|(s, _)| score > s).unwrap_or(true) {
                best = Some((score, value));
            }
        }
        best.map(|(_, v)| v)
    }
}

/// Lowercase and collapse interior whitespace so formatting differences do
/// not depress the similarity score.
fn normalize(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> NameIndex<u32> {
        NameIndex::build(vec![
            ("Ayşe Demir".to_string(), 1),
            ("Mehmet Yıldırım".to_string(), 2),
            ("Elif Şahin".to_string(), 3),
        ])
    }

    #[test]
    fn exact_and_near_names_match() {
        let idx = index();
        assert_eq!(idx.best_match("Ayşe Demir"), Some(&1));
        assert_eq!(idx.best_match("  ayşe   demir "), Some(&1));
        assert_eq!(idx.best_match("Mehmet Yildirim"), Some(&2));
    }

    #[test]
    fn unrelated_names_return_none() {
        let idx = index();
        assert_eq!(idx.best_match("Hasan Kurt"), None);
        assert_eq!(idx.best_match(""), None);
    }

    #[test]
    fn scorer_is_swappable() {
        fn exact(a: &str, b: &str) -> f64 {
            if a == b {
                1.0
            } else {
                0.0
            }
        }
        let idx = index().with_scorer(exact, 1.0);
        assert_eq!(idx.best_match("ayşe demir"), Some(&1));
        assert_eq!(idx.best_match("Ayse Demir"), None);
    }
}
