use crate::domain::{DomainError, Language, NodeRange};

/// Produces named source ranges from a file. Deterministic and
/// side-effect-free; languages without a grammar fall back to a single
/// whole-file block range.
pub trait ParserService: Send + Sync {
    fn parse(
        &self,
        content: &str,
        path: &str,
        language: Language,
    ) -> Result<Vec<NodeRange>, DomainError>;

    fn supports(&self, language: Language) -> bool;
}
