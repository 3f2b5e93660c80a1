use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::application::{LlmCollaborator, LlmVerdict, RerankCandidate};
use crate::connector::adapter::ChatClient;
use crate::domain::{DomainError, Selection};

/// Source excerpt cap for the summarization prompt.
const SUMMARY_SOURCE_LIMIT: usize = 4000;

const REWRITE_SYSTEM_PROMPT: &str = "\
You turn natural-language questions about a codebase into terse technical \
search descriptions.

Rules:
1. Return ONLY the rewritten description, one line, no quotes, no prose.
2. Keep identifiers, HTTP verbs, and resource names the user mentioned.
3. Prefer concrete technical vocabulary over conversational phrasing.
4. Maximum 15 words.";

const SUMMARIZE_SYSTEM_PROMPT: &str = "\
You describe what a piece of source code does for a code search index.

Rules:
1. Return ONLY the description, one or two sentences, no markdown.
2. Mention the behavior and the data it touches, not the syntax.
3. Stay under the character limit given in the request.";

const RERANK_SYSTEM_PROMPT: &str = "\
You rank code search candidates for a developer's question and pick the one \
place to jump to.

Rules:
1. Return ONLY a JSON object, no prose, no code fences.
2. Shape: {\"order\": [indices, best first], \"selection\": {\"file\": \"...\", \
\"line\": N, \"reason\": \"...\"}}.
3. \"order\" uses the zero-based indices from the candidate list.
4. \"reason\" is one short sentence.";

/// LLM collaborator speaking through any [`ChatClient`]. Every call runs
/// under a hard timeout; callers treat any `Err` as a silent fallback.
pub struct ChatCollaborator {
    client: Arc<dyn ChatClient>,
    model: String,
    rewrite_model: String,
    summary_model: String,
    timeout: Duration,
}

impl ChatCollaborator {
    pub fn new(client: Arc<dyn ChatClient>, model: impl Into<String>, timeout: Duration) -> Self {
        let model = model.into();
        Self {
            client,
            rewrite_model: model.clone(),
            summary_model: model.clone(),
            model,
            timeout,
        }
    }

    pub fn with_rewrite_model(mut self, model: impl Into<String>) -> Self {
        self.rewrite_model = model.into();
        self
    }

    pub fn with_summary_model(mut self, model: impl Into<String>) -> Self {
        self.summary_model = model.into();
        self
    }

    async fn complete_bounded(
        &self,
        model: &str,
        system: &str,
        user: &str,
    ) -> Result<String, DomainError> {
        match tokio::time::timeout(self.timeout, self.client.complete(model, system, user)).await {
            Ok(result) => result,
            Err(_) => Err(DomainError::llm(format!(
                "{} call exceeded {} ms",
                self.client.provider_name(),
                self.timeout.as_millis()
            ))),
        }
    }

    /// Extracts the first JSON object from the model's text and parses the
    /// verdict. Text around the object is tolerated.
    fn parse_verdict(text: &str) -> Result<LlmVerdict, DomainError> {
        #[derive(Deserialize)]
        struct RawVerdict {
            order: Vec<usize>,
            selection: RawSelection,
        }
        #[derive(Deserialize)]
        struct RawSelection {
            file: String,
            line: u32,
            reason: String,
        }

        let start = text.find('{');
        let end = text.rfind('}');
        let (Some(s), Some(e)) = (start, end) else {
            return Err(DomainError::llm(format!(
                "no JSON object in rerank response: {text}"
            )));
        };

        let raw: RawVerdict = serde_json::from_str(&text[s..=e])
            .map_err(|e| DomainError::llm(format!("unparseable rerank response: {e}")))?;

        Ok(LlmVerdict {
            order: raw.order,
            selection: Selection {
                file: raw.selection.file,
                line: raw.selection.line,
                reason: raw.selection.reason,
            },
        })
    }
}

#[async_trait]
impl LlmCollaborator for ChatCollaborator {
    async fn rewrite(&self, query: &str) -> Result<String, DomainError> {
        let text = self
            .complete_bounded(&self.rewrite_model, REWRITE_SYSTEM_PROMPT, query)
            .await?;
        let rewritten = text.trim().trim_matches('"').trim().to_string();
        debug!("Query rewrite: {:?} -> {:?}", query, rewritten);
        if rewritten.is_empty() {
            return Err(DomainError::llm("empty rewrite"));
        }
        Ok(rewritten)
    }

    async fn summarize(
        &self,
        description: &str,
        source: &str,
        max_chars: usize,
    ) -> Result<String, DomainError> {
        let excerpt: String = source.chars().take(SUMMARY_SOURCE_LIMIT).collect();
        let user = format!(
            "Limit: {max_chars} characters.\nContext: {description}\n\nCode:\n{excerpt}"
        );
        let text = self
            .complete_bounded(&self.summary_model, SUMMARIZE_SYSTEM_PROMPT, &user)
            .await?;

        let mut summary = text.trim().to_string();
        if summary.is_empty() {
            return Err(DomainError::llm("empty summary"));
        }
        if summary.chars().count() > max_chars {
            summary = summary.chars().take(max_chars).collect();
        }
        Ok(summary)
    }

    async fn rerank_and_select(
        &self,
        query: &str,
        candidates: &[RerankCandidate],
    ) -> Result<LlmVerdict, DomainError> {
        let listing = serde_json::to_string_pretty(candidates)
            .map_err(|e| DomainError::llm(format!("failed to serialize candidates: {e}")))?;
        let user = format!("Question: {query}\n\nCandidates:\n{listing}");

        let text = self
            .complete_bounded(&self.model, RERANK_SYSTEM_PROMPT, &user)
            .await?;
        let verdict = Self::parse_verdict(&text)?;

        if verdict.order.iter().any(|&i| i >= candidates.len()) {
            warn!("LLM rerank returned out-of-range indices; using valid prefix");
        }
        Ok(verdict)
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn rewrite_model_id(&self) -> &str {
        &self.rewrite_model
    }

    fn summary_model_id(&self) -> &str {
        &self.summary_model
    }
}

/// Provider used when LLM assistance is turned off; every call reports
/// itself as unavailable so callers take their fallback path.
pub struct DisabledLlm;

#[async_trait]
impl LlmCollaborator for DisabledLlm {
    async fn rewrite(&self, _query: &str) -> Result<String, DomainError> {
        Err(DomainError::llm("LLM disabled"))
    }

    async fn summarize(
        &self,
        _description: &str,
        _source: &str,
        _max_chars: usize,
    ) -> Result<String, DomainError> {
        Err(DomainError::llm("LLM disabled"))
    }

    async fn rerank_and_select(
        &self,
        _query: &str,
        _candidates: &[RerankCandidate],
    ) -> Result<LlmVerdict, DomainError> {
        Err(DomainError::llm("LLM disabled"))
    }

    fn model_id(&self) -> &str {
        "disabled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedClient {
        response: String,
        delay: Duration,
    }

    #[async_trait]
    impl ChatClient for ScriptedClient {
        async fn complete(
            &self,
            _model: &str,
            _system: &str,
            _user: &str,
        ) -> Result<String, DomainError> {
            tokio::time::sleep(self.delay).await;
            Ok(self.response.clone())
        }

        fn provider_name(&self) -> &'static str {
            "scripted"
        }
    }

    fn collaborator(response: &str, delay: Duration) -> ChatCollaborator {
        ChatCollaborator::new(
            Arc::new(ScriptedClient {
                response: response.to_string(),
                delay,
            }),
            "test-model",
            Duration::from_millis(100),
        )
    }

    #[tokio::test]
    async fn rewrite_strips_quotes_and_whitespace() {
        let c = collaborator("  \"score lookup by user id\"  ", Duration::ZERO);
        let rewritten = c.rewrite("where do we get the user score?").await.unwrap();
        assert_eq!(rewritten, "score lookup by user id");
    }

    #[tokio::test]
    async fn timeout_degrades_to_error() {
        let c = collaborator("late answer", Duration::from_millis(500));
        let err = c.rewrite("anything").await.unwrap_err();
        assert!(matches!(err, DomainError::LlmError(_)));
    }

    #[tokio::test]
    async fn summary_is_truncated_to_limit() {
        let c = collaborator(&"x".repeat(600), Duration::ZERO);
        let summary = c.summarize("Function f in a.js", "fn f() {}", 320).await.unwrap();
        assert_eq!(summary.chars().count(), 320);
    }

    #[test]
    fn parse_verdict_tolerates_surrounding_prose() {
        let text = r#"Here you go: {"order": [2, 0, 1], "selection": {"file": "src/score.js", "line": 10, "reason": "computes the score"}} hope that helps"#;
        let verdict = ChatCollaborator::parse_verdict(text).unwrap();
        assert_eq!(verdict.order, vec![2, 0, 1]);
        assert_eq!(verdict.selection.file, "src/score.js");
        assert_eq!(verdict.selection.line, 10);
    }

    #[test]
    fn parse_verdict_rejects_non_json() {
        assert!(ChatCollaborator::parse_verdict("no json here").is_err());
    }

    #[tokio::test]
    async fn disabled_llm_always_errors() {
        let llm = DisabledLlm;
        assert!(llm.rewrite("q").await.is_err());
        assert!(llm.summarize("d", "s", 100).await.is_err());
        assert_eq!(llm.model_id(), "disabled");
    }
}
