use std::sync::LazyLock;

use regex::Regex;

use crate::domain::{ChunkKind, IntentTag};

use super::chunking::ChunkDraft;

/// Filler words stripped during keyword extraction. Intent verbs (get,
/// create, delete, ...) are deliberately kept: they carry signal for both
/// keyword overlap and intent derivation.
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "some", "any",
    "which", "that", "this", "these", "those",
    "for", "from", "in", "on", "at", "to", "of", "with", "by", "via",
    "is", "are", "was", "were", "be", "been", "being",
    "do", "does", "did", "have", "has", "had",
    "can", "could", "will", "would", "should", "may", "might",
    "me", "my", "i", "we", "it", "its", "and", "or", "not", "if", "else",
    "function", "method", "code", "where", "how", "what", "when",
    "return", "returns", "const", "let", "var", "async", "await", "pub", "fn",
];

/// Registration-style route declarations: `app.get("/x", ...)`,
/// `router.delete('/y', ...)`, Express `app.METHOD`.
static ROUTE_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?m)\b(?:app|router|server|api|r)\s*\.\s*(get|post|put|patch|delete)\s*\(\s*["'`]([^"'`]+)["'`]"#,
    )
    .expect("route call pattern")
});

/// Decorator-style route declarations: `@app.post("/x")`, `@router.get(...)`.
static ROUTE_DECORATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)@\s*\w+\s*\.\s*(get|post|put|patch|delete)\s*\(\s*["']([^"']+)["']"#)
        .expect("route decorator pattern")
});

/// Query-side features derived with the same rules as chunk enrichment.
#[derive(Debug, Clone, Default)]
pub struct QueryFeatures {
    /// Stop-filtered lowercase keywords, in order of first appearance.
    pub keywords: Vec<String>,
    /// Raw lowercase tokens before stop filtering, for symbol matching.
    pub raw_tokens: Vec<String>,
    pub intents: Vec<IntentTag>,
    pub http_method: Option<String>,
    /// True when the query names an intent verb or an HTTP method.
    pub route_shaped: bool,
}

/// Splits identifiers on underscores, hyphens, and camelCase humps and
/// lowercases the parts. `getUserScore` becomes `[get, user, score]`.
pub fn split_identifier(token: &str) -> Vec<String> {
    let mut parts = Vec::new();
    for piece in token.split(|c: char| !c.is_alphanumeric()) {
        if piece.is_empty() {
            continue;
        }
        let mut current = String::new();
        let chars: Vec<char> = piece.chars().collect();
        for (i, &ch) in chars.iter().enumerate() {
            let prev_lower = i > 0 && chars[i - 1].is_lowercase();
            let next_lower = chars.get(i + 1).is_some_and(|c| c.is_lowercase());
            // Hump start: lower→Upper, or the last capital of an acronym run.
            if ch.is_uppercase() && !current.is_empty() && (prev_lower || next_lower) {
                parts.push(std::mem::take(&mut current));
            }
            current.extend(ch.to_lowercase());
        }
        if !current.is_empty() {
            parts.push(current);
        }
    }
    parts
}

/// Extracts lowercased identifier keywords from a text, stop-filtered and
/// deduplicated in order of first appearance.
pub fn extract_keywords(text: &str) -> Vec<String> {
    const MAX_KEYWORDS: usize = 64;

    let mut seen = std::collections::HashSet::new();
    let mut keywords = Vec::new();

    for raw in text.split(|c: char| !c.is_alphanumeric() && c != '_') {
        if raw.is_empty() {
            continue;
        }
        for part in split_identifier(raw) {
            if part.len() < 2 || part.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            if STOP_WORDS.contains(&part.as_str()) {
                continue;
            }
            if seen.insert(part.clone()) {
                keywords.push(part);
                if keywords.len() >= MAX_KEYWORDS {
                    return keywords;
                }
            }
        }
    }
    keywords
}

/// Enriches a freshly built chunk in place: route detection, intent tags,
/// and keywords. Pure pattern matching; no model calls.
pub fn enrich_chunk(draft: &mut ChunkDraft) {
    let chunk = &mut draft.chunk;

    let mut keywords = extract_keywords(&chunk.symbol);
    for kw in extract_keywords(&draft.source) {
        if !keywords.contains(&kw) {
            keywords.push(kw);
        }
    }
    chunk.keywords = keywords;

    if let Some((method, path)) = detect_route(&draft.source) {
        chunk.kind = ChunkKind::Route;
        chunk.resource = route_resource(&path);
        if let Some(intent) = IntentTag::from_http_method(&method) {
            push_unique(&mut chunk.intent_tags, intent);
        }
        chunk.http_method = Some(method);
        chunk.refresh_description();
    }

    if let Some(first) = split_identifier(&chunk.symbol).first() {
        if let Some(intent) = IntentTag::from_verb(first) {
            push_unique(&mut chunk.intent_tags, intent);
        }
    }
}

/// Derives query-side features: keywords, intents, HTTP method, and
/// route-shapedness, using the same tokenization as chunk enrichment.
pub fn derive_query_features(query: &str) -> QueryFeatures {
    let raw_tokens: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .flat_map(split_identifier)
        .collect();

    let keywords = extract_keywords(query);

    let mut intents = Vec::new();
    let mut http_method = None;
    for token in &raw_tokens {
        if matches!(token.as_str(), "get" | "post" | "put" | "patch" | "delete") {
            let method = token.to_ascii_uppercase();
            if let Some(intent) = IntentTag::from_http_method(&method) {
                push_unique(&mut intents, intent);
            }
            if http_method.is_none() {
                http_method = Some(method);
            }
        }
        if let Some(intent) = IntentTag::from_verb(token) {
            push_unique(&mut intents, intent);
        }
    }

    let route_shaped = !intents.is_empty() || http_method.is_some();

    QueryFeatures {
        keywords,
        raw_tokens,
        intents,
        http_method,
        route_shaped,
    }
}

/// Returns `(METHOD, path)` for the first route registration in `source`.
pub fn detect_route(source: &str) -> Option<(String, String)> {
    for pattern in [&*ROUTE_DECORATOR, &*ROUTE_CALL] {
        if let Some(caps) = pattern.captures(source) {
            let method = caps[1].to_ascii_uppercase();
            let path = caps[2].to_string();
            return Some((method, path));
        }
    }
    None
}

/// Last non-parameter path segment, trivially singularized.
fn route_resource(path: &str) -> Option<String> {
    let segment = path
        .split('/')
        .filter(|s| !s.is_empty())
        .filter(|s| !s.starts_with(':') && !s.starts_with('{') && !s.starts_with('<'))
        .next_back()?;

    let lowered = segment.to_lowercase();
    let singular = if lowered.len() > 3 && lowered.ends_with('s') {
        lowered[..lowered.len() - 1].to_string()
    } else {
        lowered
    };
    Some(singular)
}

fn push_unique(tags: &mut Vec<IntentTag>, tag: IntentTag) {
    if !tags.contains(&tag) {
        tags.push(tag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Chunk, ChunkKind};

    fn draft(symbol: &str, source: &str) -> ChunkDraft {
        ChunkDraft {
            chunk: Chunk::new("repo", "src/a.js", 1, 10, symbol, ChunkKind::Function, "h", 50),
            source: source.to_string(),
        }
    }

    #[test]
    fn splits_camel_case_and_snake_case() {
        assert_eq!(split_identifier("getUserScore"), vec!["get", "user", "score"]);
        assert_eq!(split_identifier("get_user_score"), vec!["get", "user", "score"]);
        assert_eq!(split_identifier("HTTPServer"), vec!["http", "server"]);
        assert_eq!(split_identifier("score"), vec!["score"]);
    }

    #[test]
    fn keywords_are_stop_filtered_but_keep_verbs() {
        let keywords = extract_keywords("find the function that gets the user score");
        assert!(keywords.contains(&"gets".to_string()) || keywords.contains(&"get".to_string()));
        assert!(keywords.contains(&"user".to_string()));
        assert!(keywords.contains(&"score".to_string()));
        assert!(!keywords.contains(&"the".to_string()));
        assert!(!keywords.contains(&"that".to_string()));
    }

    #[test]
    fn detects_express_route_calls() {
        let source = r#"app.post('/users/:userId/score/recompute', async (req, res) => {"#;
        let (method, path) = detect_route(source).unwrap();
        assert_eq!(method, "POST");
        assert_eq!(path, "/users/:userId/score/recompute");
    }

    #[test]
    fn detects_decorator_routes() {
        let source = "@app.delete(\"/items/{item_id}\")\ndef remove_item(item_id):";
        let (method, path) = detect_route(source).unwrap();
        assert_eq!(method, "DELETE");
        assert_eq!(path, "/items/{item_id}");
    }

    #[test]
    fn route_resource_skips_parameters_and_singularizes() {
        assert_eq!(route_resource("/users/:userId/scores"), Some("score".into()));
        assert_eq!(route_resource("/users/:id"), Some("user".into()));
        assert_eq!(route_resource("/:id"), None);
    }

    #[test]
    fn enrich_marks_route_chunks() {
        let mut d = draft(
            "anonymous",
            r#"app.post('/users/:userId/score/recompute', handler)"#,
        );
        enrich_chunk(&mut d);

        assert_eq!(d.chunk.kind, ChunkKind::Route);
        assert_eq!(d.chunk.http_method.as_deref(), Some("POST"));
        assert_eq!(d.chunk.resource.as_deref(), Some("recompute"));
        assert!(d.chunk.intent_tags.contains(&IntentTag::CreateResource));
        assert!(d.chunk.description.starts_with("Route"));
    }

    #[test]
    fn enrich_derives_symbol_verb_intent_and_keywords() {
        let mut d = draft("getUserScore", "function getUserScore(userId) { return scores[userId]; }");
        enrich_chunk(&mut d);

        assert!(d.chunk.intent_tags.contains(&IntentTag::ReadResource));
        assert!(d.chunk.keywords.contains(&"get".to_string()));
        assert!(d.chunk.keywords.contains(&"user".to_string()));
        assert!(d.chunk.keywords.contains(&"score".to_string()));
        // Symbol tokens come first.
        assert_eq!(d.chunk.keywords[0], "get");
    }

    #[test]
    fn query_features_detect_intent_and_method() {
        let features = derive_query_features("create new user score");
        assert!(features.intents.contains(&IntentTag::CreateResource));
        assert!(features.route_shaped);

        let features = derive_query_features("POST to the score endpoint");
        assert_eq!(features.http_method.as_deref(), Some("POST"));
        assert!(features.route_shaped);

        let features = derive_query_features("score averaging logic");
        assert!(!features.route_shaped);
    }
}
