use crate::domain::{Chunk, ChunkKind, IntentTag, ScoreBreakdown, ScoredChunk};

use super::enrichment::{split_identifier, QueryFeatures};

const WEIGHT_VECTOR: f32 = 0.50;
const WEIGHT_KEYWORD: f32 = 0.18;
const WEIGHT_SYMBOL: f32 = 0.12;
const WEIGHT_INTENT: f32 = 0.12;
const WEIGHT_STRUCTURAL: f32 = 0.08;

/// Multiplicative heuristics applied after the weighted sum; the final
/// score is clamped to `[0, 1]` after these.
#[derive(Debug, Clone, Copy)]
pub struct HeuristicMultipliers {
    pub route_boost: f32,
    pub intent_boost: f32,
    pub noise_penalty: f32,
}

impl Default for HeuristicMultipliers {
    fn default() -> Self {
        Self {
            route_boost: 1.3,
            intent_boost: 1.2,
            noise_penalty: 0.7,
        }
    }
}

/// Scores one candidate against the query features.
pub fn score_candidate(
    features: &QueryFeatures,
    chunk: &Chunk,
    cosine_similarity: f32,
    multipliers: &HeuristicMultipliers,
) -> ScoredChunk {
    let vector = cosine_similarity.clamp(0.0, 1.0);

    let matched_keywords: Vec<String> = features
        .keywords
        .iter()
        .filter(|kw| chunk.keywords.contains(kw))
        .cloned()
        .collect();
    let keyword = matched_keywords.len() as f32 / features.keywords.len().max(1) as f32;

    let symbol = symbol_score(&features.raw_tokens, &chunk.symbol);

    let matched_intents: Vec<IntentTag> = features
        .intents
        .iter()
        .filter(|tag| chunk.intent_tags.contains(tag))
        .copied()
        .collect();
    let intent_matched = !matched_intents.is_empty();
    let intent = if intent_matched {
        1.0
    } else if method_matches(features, chunk) {
        0.5
    } else {
        0.0
    };

    let structural = match chunk.kind {
        ChunkKind::Route if features.route_shaped => 1.0,
        ChunkKind::Route | ChunkKind::Function | ChunkKind::Method => 0.75,
        ChunkKind::Class => 0.5,
        ChunkKind::Block => 0.25,
    };

    let weighted = WEIGHT_VECTOR * vector
        + WEIGHT_KEYWORD * keyword
        + WEIGHT_SYMBOL * symbol
        + WEIGHT_INTENT * intent
        + WEIGHT_STRUCTURAL * structural;

    // The two boosts are exclusive: an intent match on a route chunk takes
    // the route boost, on anything else the intent boost.
    let route_boost = if intent_matched && chunk.kind == ChunkKind::Route {
        multipliers.route_boost
    } else {
        1.0
    };
    let intent_boost = if intent_matched && chunk.kind != ChunkKind::Route {
        multipliers.intent_boost
    } else {
        1.0
    };
    let noise_penalty = if is_noise_path(&chunk.path) {
        multipliers.noise_penalty
    } else {
        1.0
    };

    let score = (weighted * route_boost * intent_boost * noise_penalty).clamp(0.0, 1.0);

    let breakdown = ScoreBreakdown {
        vector,
        keyword,
        symbol,
        intent,
        structural,
        route_boost,
        intent_boost,
        noise_penalty,
    };

    let explanation = explain(&breakdown);

    ScoredChunk {
        chunk: chunk.clone(),
        score,
        breakdown,
        matched_intents,
        matched_keywords,
        explanation,
    }
}

/// Sorts candidates by score descending; ties break by vector score
/// descending, then path ascending, then start line ascending.
pub fn rank(candidates: &mut [ScoredChunk]) {
    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(b.breakdown.vector.total_cmp(&a.breakdown.vector))
            .then_with(|| a.chunk.path.cmp(&b.chunk.path))
            .then(a.chunk.start_line.cmp(&b.chunk.start_line))
    });
}

/// `1.0` for an exact symbol match or full coverage of the symbol's
/// identifier tokens by the query; `0.5` for a substring match of length
/// ≥ 3; `0.0` otherwise.
fn symbol_score(query_tokens: &[String], symbol: &str) -> f32 {
    if symbol.is_empty() || query_tokens.is_empty() {
        return 0.0;
    }
    let symbol_lower = symbol.to_lowercase();
    if query_tokens.iter().any(|t| *t == symbol_lower) {
        return 1.0;
    }

    let symbol_tokens = split_identifier(symbol);
    if !symbol_tokens.is_empty()
        && symbol_tokens.iter().all(|st| query_tokens.contains(st))
    {
        return 1.0;
    }

    if query_tokens
        .iter()
        .any(|t| t.len() >= 3 && symbol_lower.contains(t.as_str()))
    {
        return 0.5;
    }
    0.0
}

fn method_matches(features: &QueryFeatures, chunk: &Chunk) -> bool {
    match (&features.http_method, &chunk.http_method) {
        (Some(q), Some(c)) => q.eq_ignore_ascii_case(c),
        _ => false,
    }
}

/// Paths that look like tests or vendored code are penalized as noise.
pub fn is_noise_path(path: &str) -> bool {
    let lowered = path.to_lowercase();
    let components: Vec<&str> = lowered.split(['/', '\\']).collect();
    let noisy_dir = components.iter().any(|c| {
        matches!(
            *c,
            "test" | "tests" | "__tests__" | "spec" | "specs" | "vendor" | "vendored"
                | "node_modules" | "third_party"
        )
    });
    let noisy_file = components.last().is_some_and(|f| {
        f.contains(".test.") || f.contains(".spec.") || f.contains("_test.") || f.starts_with("test_")
    });
    noisy_dir || noisy_file
}

/// Deterministic explanation: every component with a nonzero contribution,
/// then any heuristic multipliers that fired.
fn explain(b: &ScoreBreakdown) -> String {
    let mut parts = Vec::new();
    for (name, score, weight) in [
        ("vector", b.vector, WEIGHT_VECTOR),
        ("keyword", b.keyword, WEIGHT_KEYWORD),
        ("symbol", b.symbol, WEIGHT_SYMBOL),
        ("intent", b.intent, WEIGHT_INTENT),
        ("structural", b.structural, WEIGHT_STRUCTURAL),
    ] {
        if score > 0.0 {
            parts.push(format!("{name}={score:.2}\u{d7}{weight:.2}"));
        }
    }
    let mut explanation = parts.join("; ");

    let mut boosts = Vec::new();
    if b.route_boost != 1.0 {
        boosts.push(format!("route\u{d7}{:.2}", b.route_boost));
    }
    if b.intent_boost != 1.0 {
        boosts.push(format!("intent\u{d7}{:.2}", b.intent_boost));
    }
    if b.noise_penalty != 1.0 {
        boosts.push(format!("noise\u{d7}{:.2}", b.noise_penalty));
    }
    if !boosts.is_empty() {
        explanation.push_str(" | ");
        explanation.push_str(&boosts.join(", "));
    }
    explanation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::services::enrichment::derive_query_features;
    use crate::domain::Chunk;

    fn chunk(symbol: &str, kind: ChunkKind, path: &str) -> Chunk {
        let mut c = Chunk::new("repo", path, 1, 10, symbol, kind, "h", 100);
        c.keywords = split_identifier(symbol);
        c
    }

    #[test]
    fn exact_symbol_coverage_scores_full() {
        let features = derive_query_features("get user score");
        let c = chunk("getUserScore", ChunkKind::Function, "src/score.js");
        let scored = score_candidate(&features, &c, 0.3, &HeuristicMultipliers::default());

        assert_eq!(scored.breakdown.symbol, 1.0);
        assert!(scored.breakdown.keyword >= 0.66);
    }

    #[test]
    fn substring_symbol_scores_half() {
        let features = derive_query_features("score handling");
        let c = chunk("getUserScore", ChunkKind::Function, "src/score.js");
        let scored = score_candidate(&features, &c, 0.0, &HeuristicMultipliers::default());
        assert_eq!(scored.breakdown.symbol, 0.5);
    }

    #[test]
    fn route_with_intent_gets_route_boost_only() {
        let features = derive_query_features("create new user score");
        let mut c = chunk("anonymous", ChunkKind::Route, "src/server.js");
        c.intent_tags = vec![IntentTag::CreateResource];
        c.http_method = Some("POST".into());

        let scored = score_candidate(&features, &c, 0.2, &HeuristicMultipliers::default());
        assert_eq!(scored.breakdown.structural, 1.0);
        assert_eq!(scored.breakdown.route_boost, 1.3);
        assert_eq!(scored.breakdown.intent_boost, 1.0);
        assert!(scored.matched_intents.contains(&IntentTag::CreateResource));
    }

    #[test]
    fn function_with_intent_gets_intent_boost() {
        let features = derive_query_features("get user score");
        let mut c = chunk("getUserScore", ChunkKind::Function, "src/score.js");
        c.intent_tags = vec![IntentTag::ReadResource];

        let scored = score_candidate(&features, &c, 0.2, &HeuristicMultipliers::default());
        assert_eq!(scored.breakdown.intent_boost, 1.2);
        assert_eq!(scored.breakdown.route_boost, 1.0);
    }

    #[test]
    fn method_match_without_intent_scores_half() {
        let features = derive_query_features("post something unusual");
        let mut c = chunk("handler", ChunkKind::Route, "src/server.js");
        c.http_method = Some("POST".into());
        // No intent tags on the chunk; only the HTTP method lines up.
        let scored = score_candidate(&features, &c, 0.0, &HeuristicMultipliers::default());
        assert_eq!(scored.breakdown.intent, 0.5);
        assert_eq!(scored.breakdown.intent_boost, 1.0);
    }

    #[test]
    fn noise_paths_are_penalized() {
        let features = derive_query_features("score");
        let clean = chunk("score", ChunkKind::Function, "src/score.js");
        let noisy = chunk("score", ChunkKind::Function, "tests/score.test.js");

        let clean_score = score_candidate(&features, &clean, 0.5, &HeuristicMultipliers::default());
        let noisy_score = score_candidate(&features, &noisy, 0.5, &HeuristicMultipliers::default());
        assert!(noisy_score.score < clean_score.score);
        assert_eq!(noisy_score.breakdown.noise_penalty, 0.7);
    }

    #[test]
    fn score_stays_in_unit_interval() {
        let features = derive_query_features("create user");
        let mut c = chunk("createUser", ChunkKind::Route, "src/server.js");
        c.intent_tags = vec![IntentTag::CreateResource];
        let scored = score_candidate(&features, &c, 1.0, &HeuristicMultipliers::default());
        assert!(scored.score <= 1.0);
        assert!(scored.score >= 0.0);
    }

    #[test]
    fn negative_similarity_clamps_to_zero() {
        let features = derive_query_features("anything");
        let c = chunk("unrelated", ChunkKind::Block, "src/x.js");
        let scored = score_candidate(&features, &c, -0.4, &HeuristicMultipliers::default());
        assert_eq!(scored.breakdown.vector, 0.0);
    }

    #[test]
    fn explanation_lists_only_nonzero_components() {
        let features = derive_query_features("zzz qqq");
        let c = chunk("unrelated", ChunkKind::Block, "src/x.js");
        let scored = score_candidate(&features, &c, 0.0, &HeuristicMultipliers::default());

        // Only structural contributes here.
        assert!(scored.explanation.contains("structural="));
        assert!(!scored.explanation.contains("vector="));
        assert!(!scored.explanation.contains("keyword="));
    }

    #[test]
    fn rank_breaks_ties_deterministically() {
        let features = derive_query_features("score");
        let a = chunk("score", ChunkKind::Function, "src/b.js");
        let b = chunk("score", ChunkKind::Function, "src/a.js");

        let mut scored = vec![
            score_candidate(&features, &a, 0.5, &HeuristicMultipliers::default()),
            score_candidate(&features, &b, 0.5, &HeuristicMultipliers::default()),
        ];
        rank(&mut scored);
        assert_eq!(scored[0].chunk.path, "src/a.js");
        assert_eq!(scored[1].chunk.path, "src/b.js");
    }
}
