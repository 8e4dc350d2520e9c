use std::collections::HashSet;

use crate::core::app_state::AppState;
use crate::core::types::{RetrievalResult, SourceAttribution};
use crate::error::CoreError;

const HYBRID_FUSION_MIN_CANDIDATES: usize = 4;
const VECTOR_WEIGHT: f32 = 0.7;
const KEYWORD_WEIGHT: f32 = 0.3;
const DOMAIN_BOOST: f32 = 0.2;
const MIN_SIMILARITY: f32 = 0.3;

/// Builds a human-readable source attribution from `{title, page, section}`
/// only — never from internal fields like `chunk_type` or id.
fn build_attribution(title: &str, section: Option<&str>, page: Option<u32>) -> String {
    let mut parts = vec![title.to_string()];
    if let Some(section) = section {
        parts.push(section.to_string());
    }
    if let Some(page) = page {
        parts.push(format!("page {page}"));
    }
    parts.join(" — ")
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.len() > 2)
        .map(|s| s.to_string())
        .collect()
}

fn keyword_score(query_tokens: &HashSet<String>, content: &str) -> f32 {
    if query_tokens.is_empty() {
        return 0.0;
    }
    let content_tokens = tokenize(content);
    let overlap = query_tokens.intersection(&content_tokens).count() as f32;
    overlap / query_tokens.len() as f32
}

/// Combines dense similarity with a sparse keyword overlap score once at
/// least `HYBRID_FUSION_MIN_CANDIDATES` candidates are present, matching
/// `vectorstore.py::_apply_hybrid_search`'s 0.7/0.3 weighting exactly.
fn apply_hybrid_fusion(query: &str, mut results: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
    if results.len() < HYBRID_FUSION_MIN_CANDIDATES {
        for r in &mut results {
            r.hybrid_score = r.similarity;
        }
        return results;
    }
    let query_tokens = tokenize(query);
    for r in &mut results {
        let kw = keyword_score(&query_tokens, &r.content);
        r.hybrid_score = VECTOR_WEIGHT * r.similarity + KEYWORD_WEIGHT * kw;
    }
    results
}

async fn cross_encoder_rerank(
    state: &AppState,
    query: &str,
    mut results: Vec<RetrievalResult>,
) -> Vec<RetrievalResult> {
    let Some(url) = state.config.cross_encoder_endpoint_url.clone() else {
        return results;
    };
    if !state.reranker_enabled {
        return results;
    }

    #[derive(serde::Serialize)]
    struct Req<'a> {
        query: &'a str,
        passages: Vec<&'a str>,
    }
    #[derive(serde::Deserialize)]
    struct Resp {
        scores: Vec<f32>,
    }

    let passages: Vec<&str> = results.iter().map(|r| r.content.as_str()).collect();
    let outcome = state
        .http_client
        .post(&url)
        .json(&Req { query, passages })
        .timeout(state.config.http_timeout)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map(|r| r.json::<Resp>());

    match outcome {
        Ok(fut) => match fut.await {
            Ok(resp) if resp.scores.len() == results.len() => {
                for (r, score) in results.iter_mut().zip(resp.scores) {
                    r.hybrid_score = score;
                }
                results.sort_by(|a, b| b.hybrid_score.total_cmp(&a.hybrid_score));
                results
            }
            _ => {
                tracing::warn!("cross-encoder rerank returned malformed output; using base ranking");
                results
            }
        },
        Err(e) => {
            tracing::warn!("cross-encoder endpoint unavailable, degrading to base ranking: {}", e);
            results
        }
    }
}

/// Retrieves and ranks chunks for a query:
/// 1. Over-fetches `min(n_results*3, 15)` candidates from the vector index.
/// 2. Applies a domain-match boost on top of raw similarity, then drops
///    anything below `MIN_SIMILARITY`.
/// 3. Fuses in a sparse keyword score once ≥4 candidates remain.
/// 4. Optionally reranks with a cross-encoder when configured.
pub async fn retrieve(
    state: &AppState,
    query: &str,
    query_embedding: &[f32],
    n_results: usize,
    filename_filter: Option<&str>,
    domain_filter: Option<&str>,
) -> Result<Vec<RetrievalResult>, CoreError> {
    let over_fetch = (n_results * 3).min(15);
    let target_domain = crate::query::classify_query(state, query).await;

    let chunks = state
        .index
        .query(query_embedding, over_fetch, filename_filter, domain_filter)
        .await?;

    let mut results: Vec<RetrievalResult> = chunks
        .into_iter()
        .map(|(chunk, similarity)| {
            let boosted = if chunk.domain == target_domain && target_domain != "general" {
                (similarity + DOMAIN_BOOST).min(1.0)
            } else {
                similarity
            };
            RetrievalResult {
                source: SourceAttribution {
                    filename: chunk.filename.clone(),
                    attribution: build_attribution(&chunk.title, chunk.section.as_deref(), chunk.page_refs.first().copied()),
                    page_refs: chunk.page_refs.clone(),
                },
                domain: chunk.domain,
                content: chunk.content,
                similarity: boosted,
                hybrid_score: boosted,
            }
        })
        .filter(|r| r.similarity >= MIN_SIMILARITY)
        .collect();

    results = apply_hybrid_fusion(query, results);
    results.sort_by(|a, b| b.hybrid_score.total_cmp(&a.hybrid_score));
    results = cross_encoder_rerank(state, query, results).await;
    results.truncate(n_results.max(1) * 2);

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(content: &str, similarity: f32) -> RetrievalResult {
        RetrievalResult {
            content: content.to_string(),
            source: SourceAttribution {
                filename: "f".to_string(),
                attribution: "f".to_string(),
                page_refs: vec![],
            },
            domain: "general".to_string(),
            similarity,
            hybrid_score: 0.0,
        }
    }

    #[test]
    fn fusion_skipped_below_threshold() {
        let results = vec![result("alpha beta", 0.5), result("gamma delta", 0.4)];
        let fused = apply_hybrid_fusion("alpha", results);
        assert_eq!(fused[0].hybrid_score, 0.5);
    }

    #[test]
    fn fusion_applies_0_7_0_3_weighting_at_threshold() {
        let results = vec![
            result("alpha tokens here", 0.5),
            result("beta", 0.4),
            result("gamma", 0.3),
            result("delta", 0.2),
        ];
        let fused = apply_hybrid_fusion("alpha tokens", results);
        let expected = 0.7 * 0.5 + 0.3 * 1.0;
        assert!((fused[0].hybrid_score - expected).abs() < 1e-6);
    }
}
