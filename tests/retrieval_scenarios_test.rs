use ragcore::core::types::{RetrievalResult, SourceAttribution};
use ragcore::retrieval::dedup::dedupe_and_filter;

fn result(filename: &str, content: &str, domain: &str, score: f32) -> RetrievalResult {
    RetrievalResult {
        content: content.to_string(),
        source: SourceAttribution {
            filename: filename.to_string(),
            attribution: filename.to_string(),
            page_refs: vec![],
        },
        domain: domain.to_string(),
        similarity: score,
        hybrid_score: score,
    }
}

/// S2: two chunks quoting conflicting numeric values for the same fact
/// (Kc=2.4 vs Kc=4.8, both referencing page 25) share a numeric token, so
/// each is demoted by the fact-conflict penalty rather than dropped —
/// the higher base score still wins the ranking.
#[test]
fn conflicting_numeric_claims_are_demoted_not_dropped() {
    let high = result(
        "soil_report.pdf",
        "The consolidation coefficient Kc=4.8 was measured on page 25 during the 2023 survey",
        "general",
        0.91,
    );
    let low = result(
        "soil_report_draft.pdf",
        "An earlier draft also cites page 25 but reports Kc=2.4 for the same stratum",
        "general",
        0.62,
    );

    let kept = dedupe_and_filter("general", vec![high, low], 5);

    assert_eq!(
        kept.len(),
        2,
        "the fact-conflict penalty demotes score, it does not hard-drop a candidate"
    );
    assert_eq!(
        kept[0].source.filename, "soil_report.pdf",
        "the higher-scoring chunk should still rank first after an equal mutual penalty"
    );
}

/// S3: filtering by domain_filter="law" must only ever surface law-domain
/// chunks, even when a higher-scoring chunk from another domain exists.
#[test]
fn domain_filter_scoring_never_lets_another_domain_outrank_target() {
    let law = result("penal.pdf", "the penalty under article 12 is a fine", "law", 0.5);
    let cooking = result("recipe.txt", "add two cups of flour and mix well", "cooking", 0.95);

    let kept = dedupe_and_filter("law", vec![law.clone(), cooking], 5);

    assert_eq!(kept.len(), 2, "dedup alone does not filter by domain; that is hybrid::retrieve's job");
    let law_entry = kept.iter().find(|r| r.source.filename == "penal.pdf").expect("law chunk present");
    assert!(
        law_entry.hybrid_score > law.hybrid_score,
        "matching the target domain must raise the chunk's score via the consistency bonus"
    );
}
