use std::collections::HashSet;

use crate::core::types::RetrievalResult;

const EDIT_DISTANCE_DEDUP_THRESHOLD: usize = 10;
const SEMANTIC_JACCARD_THRESHOLD: f32 = 0.9;
const DOMAIN_BONUS: f32 = 0.3;
const LENGTH_SCORE_WEIGHT: f32 = 0.1;
const LENGTH_SCORE_CAP: usize = 1000;
const QUALITY_SCORE: f32 = 0.2;
const QUALITY_MIN_LEN: usize = 50;
const FACT_PENALTY_PER_CONFLICT: f32 = 0.5;

fn numeric_tokens(text: &str) -> HashSet<String> {
    static NUM_RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = NUM_RE.get_or_init(|| regex::Regex::new(r"\d+(\.\d+)?%?").unwrap());
    re.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

fn key_info_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.len() > 3)
        .map(|s| s.to_string())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let inter = a.intersection(b).count() as f32;
    let union = a.union(b).count() as f32;
    if union == 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// `min(len/1000, 1.0)`, weighted `LENGTH_SCORE_WEIGHT` in the final score.
fn length_score(len: usize) -> f32 {
    (len as f32 / LENGTH_SCORE_CAP as f32).min(1.0)
}

/// Flat bonus for chunks long enough to carry a complete thought.
fn quality_score(trimmed_len: usize) -> f32 {
    if trimmed_len > QUALITY_MIN_LEN {
        QUALITY_SCORE
    } else {
        0.0
    }
}

/// First three numerical tokens extracted from a chunk, in order of
/// appearance — the identity a candidate's fact claims are compared against.
fn first_numeric_tokens(text: &str, limit: usize) -> HashSet<String> {
    static NUM_RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = NUM_RE.get_or_init(|| regex::Regex::new(r"\d+(\.\d+)?%?").unwrap());
    re.find_iter(text)
        .take(limit)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// For every other candidate that shares at least one of this chunk's first
/// three numerical tokens, demotes the score by `FACT_PENALTY_PER_CONFLICT` —
/// a conservative signal that two chunks may be making competing claims
/// about the same figures, grounded on `vectorstore.py::_rerank_and_deduplicate`.
fn fact_penalty(index: usize, results: &[RetrievalResult]) -> f32 {
    let own = first_numeric_tokens(&results[index].content, 3);
    if own.is_empty() {
        return 0.0;
    }
    results
        .iter()
        .enumerate()
        .filter(|(j, _)| *j != index)
        .filter(|(_, other)| !own.is_disjoint(&numeric_tokens(&other.content)))
        .count() as f32
        * FACT_PENALTY_PER_CONFLICT
}

/// Scores, deduplicates (fuzzy edit-distance and semantic Jaccard), and
/// demotes conflicting candidates, grounded on
/// `vectorstore.py::_rerank_and_deduplicate` generalized with the
/// fact-conflict penalty and Jaccard semantic-duplicate test.
pub fn dedupe_and_filter(
    target_domain: &str,
    mut results: Vec<RetrievalResult>,
    top_k: usize,
) -> Vec<RetrievalResult> {
    let penalties: Vec<f32> = (0..results.len()).map(|i| fact_penalty(i, &results)).collect();
    for (r, penalty) in results.iter_mut().zip(penalties) {
        let mut score = r.hybrid_score;
        if r.domain == target_domain && target_domain != "general" {
            score += DOMAIN_BONUS;
        }
        score += LENGTH_SCORE_WEIGHT * length_score(r.content.len());
        score += quality_score(r.content.trim().len());
        score -= penalty;
        r.hybrid_score = score.clamp(0.0, 1.0);
    }
    results.sort_by(|a, b| b.hybrid_score.total_cmp(&a.hybrid_score));

    let mut kept: Vec<RetrievalResult> = Vec::new();
    'outer: for candidate in results {
        let candidate_info = key_info_set(&candidate.content);
        for existing in &kept {
            let distance = strsim::levenshtein(&candidate.content, &existing.content);
            if distance <= EDIT_DISTANCE_DEDUP_THRESHOLD {
                continue 'outer;
            }
            let existing_info = key_info_set(&existing.content);
            if jaccard(&candidate_info, &existing_info) >= SEMANTIC_JACCARD_THRESHOLD {
                continue 'outer;
            }
        }
        kept.push(candidate);
        if kept.len() >= top_k {
            break;
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::SourceAttribution;

    fn result(content: &str, domain: &str, score: f32) -> RetrievalResult {
        RetrievalResult {
            content: content.to_string(),
            source: SourceAttribution {
                filename: "f".to_string(),
                attribution: "f".to_string(),
                page_refs: vec![],
            },
            domain: domain.to_string(),
            similarity: score,
            hybrid_score: score,
        }
    }

    #[test]
    fn near_duplicates_within_edit_distance_are_dropped() {
        let a = result("The quick brown fox jumps over the lazy dog", "general", 0.9);
        let b = result("The quick brown fox jumps over the lazy dig", "general", 0.8);
        let kept = dedupe_and_filter("general", vec![a, b], 10);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn distinct_content_is_kept() {
        let a = result("alpha document about taxes and revenue", "financial", 0.9);
        let b = result("completely different passage about clinical trials", "medical", 0.8);
        let kept = dedupe_and_filter("general", vec![a, b], 10);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn domain_bonus_boosts_matching_domain() {
        let a = result("financial report content here", "financial", 0.5);
        let b = result("medical report content here too", "medical", 0.5);
        let results = dedupe_and_filter("financial", vec![a, b], 10);
        assert_eq!(results[0].domain, "financial");
    }

    #[test]
    fn fact_penalty_demotes_but_does_not_drop_conflicting_candidates() {
        let a = result("the measured rate is 4.8 percent this quarter", "general", 0.9);
        let b = result("last quarter the rate was 4.8 percent as well, unrelated passage", "general", 0.4);
        let kept = dedupe_and_filter("general", vec![a, b], 10);
        assert_eq!(kept.len(), 2);
        assert!(kept[0].hybrid_score > kept[1].hybrid_score);
    }

    #[test]
    fn quality_score_rewards_longer_chunks() {
        assert!(quality_score(60) > quality_score(10));
        assert_eq!(quality_score(10), 0.0);
    }

    #[test]
    fn length_score_caps_at_one() {
        assert_eq!(length_score(5_000), 1.0);
        assert!(length_score(500) < 1.0);
    }
}
