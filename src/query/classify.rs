use sha2::{Digest, Sha256};

use crate::core::app_state::AppState;

const DOMAIN_KEYWORDS: &[(&str, &[&str])] = &[
    ("legal", &["contract", "clause", "lawsuit", "statute", "liability"]),
    ("financial", &["revenue", "invoice", "budget", "audit", "expense"]),
    ("medical", &["patient", "diagnosis", "treatment", "dosage", "symptom"]),
    ("technical", &["configuration", "deploy", "architecture", "api", "server"]),
];

fn keyword_classify(query: &str) -> String {
    let lower = query.to_lowercase();
    let mut best = ("general", 0usize);
    for (domain, keywords) in DOMAIN_KEYWORDS {
        let count = keywords.iter().filter(|k| lower.contains(*k)).count();
        if count > best.1 {
            best = (domain, count);
        }
    }
    best.0.to_string()
}

async fn llm_classify(state: &AppState, query: &str) -> anyhow::Result<String> {
    #[derive(serde::Serialize)]
    struct Req<'a> {
        prompt: String,
        query: &'a str,
    }
    #[derive(serde::Deserialize)]
    struct Resp {
        domain: String,
    }

    let resp = state
        .http_client
        .post(&state.config.llm_endpoint_url)
        .json(&Req {
            prompt: format!(
                "Classify the domain of this question in a single word (legal, financial, medical, technical, or general): {query}"
            ),
            query,
        })
        .timeout(state.config.http_timeout)
        .send()
        .await?
        .error_for_status()?
        .json::<Resp>()
        .await?;
    Ok(resp.domain.trim().to_lowercase())
}

/// Classifies a query's target domain, LLM round-trip with keyword-vote
/// fallback on any error, cached by `sha256(query)` with a 1h TTL.
pub async fn classify_query(state: &AppState, query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.as_bytes());
    let key = format!("{:x}", hasher.finalize());

    if let Some(cached) = state.query_class_cache.get(&key).await {
        return cached;
    }

    let domain = match llm_classify(state, query).await {
        Ok(d) if !d.is_empty() => d,
        _ => keyword_classify(query),
    };

    state.query_class_cache.insert(key, domain.clone()).await;
    domain
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_classify_picks_dominant_domain() {
        assert_eq!(keyword_classify("what does the statute say about liability"), "legal");
        assert_eq!(keyword_classify("how do I configure the deploy architecture"), "technical");
        assert_eq!(keyword_classify("nice weather today"), "general");
    }
}
