//! Search result quality enhancements.
//!
//! Applied in order: match-position boost on the symbol name (exact > prefix
//! > suffix > substring), falling through to field boosts (name > signature >
//! doc comment), then modest kind weighting, a quality floor, and a re-sort.
//! Boosted scores are clamped to 1.0 and intentionally NOT re-normalized:
//! a query with no good match should keep low absolute scores.

use crate::embeddings::vector_store::SearchHit;

/// Scores below this are noise and are dropped after boosting.
pub const QUALITY_FLOOR: f32 = 0.1;

/// Boost by where the query matches the symbol name. Falls through to field
/// boosting when the name does not contain the query at all.
pub fn boost_by_match_position(hit: &SearchHit, query: &str) -> f32 {
    let base = hit.score;
    let query = query.to_lowercase();
    let query = query.trim();
    let name = hit.name.to_lowercase();

    if query.is_empty() || name.is_empty() {
        return base;
    }

    if name == query {
        (base * 3.0).min(1.0)
    } else if name.starts_with(query) {
        (base * 2.0).min(1.0)
    } else if name.ends_with(query) {
        (base * 1.5).min(1.0)
    } else if name.contains(query) {
        base
    } else {
        boost_by_field_match(hit, query)
    }
}

/// Field-match boost: name substring x3.0, signature x1.5, doc comment x1.0.
fn boost_by_field_match(hit: &SearchHit, query_lower: &str) -> f32 {
    let base = hit.score;
    let name = hit.name.to_lowercase();
    let signature = hit.signature.as_deref().unwrap_or("").to_lowercase();
    let doc_comment = hit.doc_comment.as_deref().unwrap_or("").to_lowercase();

    if name.contains(query_lower) {
        (base * 3.0).min(1.0)
    } else if signature.contains(query_lower) {
        (base * 1.5).min(1.0)
    } else if doc_comment.contains(query_lower) {
        base
    } else {
        base
    }
}

/// Modest kind weighting: definitions people actually search for float up,
/// imports and file stubs sink. Weights are small so relevance still
/// dominates; everything clamps at 1.0.
pub fn apply_kind_weighting(hit: &SearchHit) -> f32 {
    let weight = match hit.kind.as_str() {
        "function" | "class" => 1.1,
        "method" | "interface" | "type" | "struct" => 1.05,
        "enum" | "constant" => 1.0,
        "variable" | "field" => 0.9,
        "parameter" => 0.85,
        "import" => 0.6,
        "namespace" => 0.7,
        "file" => 0.65,
        _ => 1.0,
    };
    (hit.score * weight).min(1.0)
}

/// Run the full enhancement pipeline over a result list.
pub fn apply_search_enhancements(mut hits: Vec<SearchHit>, query: &str) -> Vec<SearchHit> {
    if hits.is_empty() {
        return hits;
    }

    for hit in &mut hits {
        hit.score = boost_by_match_position(hit, query);
        hit.score = apply_kind_weighting(hit);
    }

    hits.retain(|hit| hit.score >= QUALITY_FLOOR);
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(name: &str, kind: &str, score: f32) -> SearchHit {
        SearchHit {
            id: format!("id-{name}"),
            name: name.to_string(),
            kind: kind.to_string(),
            language: "python".to_string(),
            file_path: "a.py".to_string(),
            start_line: 1,
            end_line: 2,
            signature: Some(format!("def {name}()")),
            doc_comment: None,
            score,
        }
    }

    #[test]
    fn exact_match_outranks_prefix_and_substring() {
        let hits = vec![
            hit("get_user_data_loader", "function", 0.3),
            hit("get_user", "function", 0.3),
            hit("forget_user", "function", 0.3),
        ];
        let ranked = apply_search_enhancements(hits, "get_user");
        assert_eq!(ranked[0].name, "get_user");
        // prefix beats suffix-ish substring
        assert_eq!(ranked[1].name, "get_user_data_loader");
    }

    #[test]
    fn kind_weighting_sinks_imports() {
        let hits = vec![hit("logger", "import", 0.5), hit("logger", "function", 0.5)];
        let ranked = apply_search_enhancements(hits, "logger");
        assert_eq!(ranked[0].kind, "function");
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn scores_stay_in_unit_range_and_descend() {
        let hits = vec![
            hit("alpha", "function", 0.9),
            hit("alphabet", "class", 0.8),
            hit("unrelated", "variable", 0.2),
        ];
        let ranked = apply_search_enhancements(hits, "alpha");
        for window in ranked.windows(2) {
            assert!(window[0].score >= window[1].score);
        }
        assert!(ranked.iter().all(|h| h.score > 0.0 && h.score <= 1.0));
    }

    #[test]
    fn quality_floor_drops_noise() {
        let hits = vec![hit("zzz", "variable", 0.05)];
        let ranked = apply_search_enhancements(hits, "completely different");
        assert!(ranked.is_empty());
    }
}
