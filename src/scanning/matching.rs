//! Substring-based matching of extracted names against local reference
//! tables (drugs, biomarkers).

use uuid::Uuid;

use crate::models::{Biomarker, Drug};

const MIN_PARTIAL_LEN: usize = 3;

/// Lowercase, fold common Latin accents, collapse everything that is not a
/// letter or digit into single spaces.
pub fn normalize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_space = false;
    for c in input.chars().flat_map(char::to_lowercase) {
        let c = fold_accent(c);
        if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(c);
        } else {
            pending_space = true;
        }
    }
    out
}

fn fold_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        other => other,
    }
}

/// A row of a reference table with its normalised lookup keys.
#[derive(Debug, Clone)]
pub struct MatchCandidate {
    pub id: Uuid,
    pub name: String,
    keys: Vec<String>,
}

impl MatchCandidate {
    pub fn new<'a>(id: Uuid, name: &'a str, extra_keys: impl IntoIterator<Item = &'a str>) -> Self {
        let mut keys: Vec<String> = std::iter::once(name)
            .chain(extra_keys)
            .map(normalize)
            .filter(|k| !k.is_empty())
            .collect();
        keys.dedup();
        Self {
            id,
            name: name.to_string(),
            keys,
        }
    }

    pub fn from_drug(drug: &Drug) -> Self {
        Self::new(drug.id, &drug.name, drug.active_ingredient.as_deref())
    }

    pub fn from_biomarker(biomarker: &Biomarker) -> Self {
        Self::new(
            biomarker.id,
            &biomarker.name,
            biomarker
                .code
                .as_deref()
                .into_iter()
                .chain(biomarker.aliases.iter().map(String::as_str)),
        )
    }
}

/// Best candidate for `query`.
///
/// An exact normalised key match wins. Otherwise a key containing the query,
/// or contained in it, matches when both sides have at least three
/// characters; among those the smallest length difference wins, earlier
/// candidates winning ties.
pub fn best_match<'a>(query: &str, candidates: &'a [MatchCandidate]) -> Option<&'a MatchCandidate> {
    let query = normalize(query);
    if query.is_empty() {
        return None;
    }

    if let Some(exact) = candidates.iter().find(|c| c.keys.iter().any(|k| *k == query)) {
        return Some(exact);
    }

    if query.chars().count() < MIN_PARTIAL_LEN {
        return None;
    }

    let mut best: Option<(usize, &MatchCandidate)> = None;
    for candidate in candidates {
        let distance = candidate
            .keys
            .iter()
            .filter(|k| k.chars().count() >= MIN_PARTIAL_LEN)
            .filter(|k| k.contains(query.as_str()) || query.contains(k.as_str()))
            .map(|k| k.chars().count().abs_diff(query.chars().count()))
            .min();
        if let Some(distance) = distance {
            if best.map_or(true, |(d, _)| distance < d) {
                best = Some((distance, candidate));
            }
        }
    }
    best.map(|(_, c)| c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, extra: &[&str]) -> MatchCandidate {
        MatchCandidate::new(Uuid::new_v4(), name, extra.iter().copied())
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize("  Glycémie (à jeun) "), "glycemie a jeun");
        assert_eq!(normalize("HbA1c"), "hba1c");
        assert_eq!(normalize("Vitamin B-12!!"), "vitamin b 12");
        assert_eq!(normalize("---"), "");
    }

    #[test]
    fn exact_match_beats_partial() {
        let candidates = vec![candidate("Metformin Extended", &[]), candidate("Metformin", &[])];
        let found = best_match("METFORMIN", &candidates).unwrap();
        assert_eq!(found.name, "Metformin");
    }

    #[test]
    fn alias_match() {
        let candidates = vec![candidate("Glucose", &["glycémie", "blood sugar"])];
        assert_eq!(best_match("Glycemie", &candidates).unwrap().name, "Glucose");
    }

    #[test]
    fn substring_either_direction() {
        let candidates = vec![candidate("Metformin", &[]), candidate("Amoxicillin", &[])];
        assert_eq!(best_match("Metformin 500mg", &candidates).unwrap().name, "Metformin");
        assert_eq!(best_match("amoxicil", &candidates).unwrap().name, "Amoxicillin");
    }

    #[test]
    fn closest_length_wins() {
        let candidates = vec![
            candidate("Vitamin D3 high dose supplement", &[]),
            candidate("Vitamin D3", &[]),
        ];
        assert_eq!(best_match("vitamin d", &candidates).unwrap().name, "Vitamin D3");
    }

    #[test]
    fn short_queries_need_exact_match() {
        let candidates = vec![candidate("Iron", &["fe"])];
        assert!(best_match("ir", &candidates).is_none());
        assert_eq!(best_match("Fe", &candidates).unwrap().name, "Iron");
        assert!(best_match("", &candidates).is_none());
    }

    #[test]
    fn no_match() {
        let candidates = vec![candidate("Metformin", &[])];
        assert!(best_match("Paracetamol", &candidates).is_none());
    }
}
