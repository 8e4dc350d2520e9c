use sha2::{Digest, Sha256};

use crate::core::app_state::AppState;
use crate::core::types::Chunk;
use crate::error::CoreError;

const DOMAIN_KEYWORDS: &[(&str, &[&str])] = &[
    ("legal", &["contract", "clause", "plaintiff", "statute", "liability"]),
    ("financial", &["revenue", "invoice", "balance sheet", "audit", "expense"]),
    ("medical", &["patient", "diagnosis", "treatment", "dosage", "clinical"]),
    ("technical", &["configuration", "specification", "architecture", "deployment"]),
];

fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn extract_page_refs(text: &str) -> Vec<u32> {
    static PAGE_RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = PAGE_RE.get_or_init(|| regex::Regex::new(r"(?i)page\s+(\d+)").unwrap());
    re.captures_iter(text)
        .filter_map(|c| c.get(1).and_then(|m| m.as_str().parse::<u32>().ok()))
        .collect()
}

fn keyword_classify(sample: &str) -> String {
    let lower = sample.to_lowercase();
    let mut best = ("general", 0usize);
    for (domain, keywords) in DOMAIN_KEYWORDS {
        let count = keywords.iter().filter(|k| lower.contains(*k)).count();
        if count > best.1 {
            best = (domain, count);
        }
    }
    best.0.to_string()
}

async fn llm_classify_domain(
    state: &AppState,
    prefix: &str,
    filename: &str,
) -> Result<String, CoreError> {
    #[derive(serde::Serialize)]
    struct Req<'a> {
        prompt: String,
        filename: &'a str,
    }
    #[derive(serde::Deserialize)]
    struct Resp {
        domain: String,
    }

    let prompt = format!(
        "Classify the domain of this document in a single word (legal, financial, medical, technical, or general): {prefix}"
    );

    let resp = state
        .http_client
        .post(&state.config.llm_endpoint_url)
        .json(&Req { prompt, filename })
        .timeout(state.config.http_timeout)
        .send()
        .await
        .map_err(|e| CoreError::ClassificationFailed(e.to_string()))?
        .error_for_status()
        .map_err(|e| CoreError::ClassificationFailed(e.to_string()))?
        .json::<Resp>()
        .await
        .map_err(|e| CoreError::ClassificationFailed(e.to_string()))?;

    Ok(resp.domain.trim().to_lowercase())
}

/// Classifies a document's domain, preferring an LLM round-trip with a
/// keyword-vote fallback on any failure, cached by a hash of the sample
/// prefix plus filename (TTL 24h), grounded on
/// `document.py::_enhance_metadata` / `DocumentClassifier.classify_document`.
pub async fn classify_domain(state: &AppState, filename: &str, sample_text: &str) -> String {
    let prefix: String = sample_text.chars().take(1000).collect();
    let cache_key_input: String = format!("{}{filename}", &prefix.chars().take(500).collect::<String>());
    let mut hasher = Sha256::new();
    hasher.update(cache_key_input.as_bytes());
    let cache_key = format!("{:x}", hasher.finalize());

    if let Some(cached) = state.domain_cache.get(&cache_key).await {
        return cached;
    }

    let domain = match llm_classify_domain(state, &prefix, filename).await {
        Ok(d) if !d.is_empty() => d,
        _ => keyword_classify(&prefix),
    };

    state.domain_cache.insert(cache_key, domain.clone()).await;
    domain
}

/// Sanitizes content and extracts page references for every chunk of a
/// document, then stamps the shared domain classification onto each.
pub async fn enrich_chunks(state: &AppState, filename: &str, mut chunks: Vec<Chunk>) -> Vec<Chunk> {
    let sample: String = chunks
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let domain = classify_domain(state, filename, &sample).await;

    for chunk in &mut chunks {
        chunk.content = sanitize(&chunk.content);
        if chunk.page_refs.is_empty() {
            chunk.page_refs = extract_page_refs(&chunk.content);
        }
        chunk.domain = domain.clone();
        chunk
            .metadata
            .insert("word_count".to_string(), chunk.content.split_whitespace().count().to_string());
        chunk
            .metadata
            .insert("char_count".to_string(), chunk.content.len().to_string());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_collapses_whitespace() {
        assert_eq!(sanitize("a   b\n\nc"), "a b c");
    }

    #[test]
    fn keyword_classify_prefers_highest_hit_count() {
        let text = "The plaintiff filed suit citing breach of contract and liability clause violations.";
        assert_eq!(keyword_classify(text), "legal");
    }

    #[test]
    fn keyword_classify_defaults_to_general() {
        assert_eq!(keyword_classify("a sunny day at the park"), "general");
    }

    #[test]
    fn extract_page_refs_finds_all_matches() {
        assert_eq!(extract_page_refs("see page 3 and page 12"), vec![3, 12]);
    }
}
