use super::ChunkKind;

/// A named source range produced by the syntax parser. Lines are inclusive
/// and 1-based. Nested declarations (methods inside a class, functions
/// inside an impl) are attached as children.
#[derive(Debug, Clone)]
pub struct NodeRange {
    pub kind: ChunkKind,
    pub symbol: String,
    pub start_line: u32,
    pub end_line: u32,
    pub source: String,
    pub children: Vec<NodeRange>,
}

impl NodeRange {
    pub fn new(
        kind: ChunkKind,
        symbol: impl Into<String>,
        start_line: u32,
        end_line: u32,
        source: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            symbol: symbol.into(),
            start_line,
            end_line,
            source: source.into(),
            children: Vec::new(),
        }
    }

    /// Whole-file fallback for languages without a grammar.
    pub fn whole_file(source: impl Into<String>, line_count: u32) -> Self {
        Self::new(ChunkKind::Block, "", 1, line_count.max(1), source)
    }

    pub fn contains(&self, other: &NodeRange) -> bool {
        self.start_line <= other.start_line
            && self.end_line >= other.end_line
            && (self.start_line, self.end_line) != (other.start_line, other.end_line)
    }

    pub fn line_count(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}
