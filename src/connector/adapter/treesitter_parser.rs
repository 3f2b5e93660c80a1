use streaming_iterator::StreamingIterator;
use tracing::{debug, warn};
use tree_sitter::{Parser, Query, QueryCursor};

use crate::application::ParserService;
use crate::domain::{ChunkKind, DomainError, Language, NodeRange};

/// Grammar-driven parser producing named declaration ranges. Deterministic
/// and side-effect-free; a fresh `Parser` is created per call because
/// tree-sitter parsers are stateful.
pub struct TreeSitterParser {
    supported: Vec<Language>,
}

impl TreeSitterParser {
    pub fn new() -> Self {
        Self {
            supported: vec![
                Language::Rust,
                Language::Python,
                Language::JavaScript,
                Language::TypeScript,
                Language::Go,
            ],
        }
    }

    fn grammar(language: Language) -> Option<tree_sitter::Language> {
        match language {
            Language::Rust => Some(tree_sitter_rust::LANGUAGE.into()),
            Language::Python => Some(tree_sitter_python::LANGUAGE.into()),
            Language::JavaScript => Some(tree_sitter_javascript::LANGUAGE.into()),
            Language::TypeScript => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
            Language::Go => Some(tree_sitter_go::LANGUAGE.into()),
            Language::Unknown => None,
        }
    }

    fn query_patterns(language: Language) -> &'static str {
        match language {
            Language::Rust => {
                r#"
                (function_item name: (identifier) @name) @function
                (impl_item) @class
                (struct_item name: (type_identifier) @name) @class
                (enum_item name: (type_identifier) @name) @class
                (trait_item name: (type_identifier) @name) @class
                "#
            }
            Language::Python => {
                r#"
                (decorated_definition definition: (function_definition name: (identifier) @name)) @function
                (decorated_definition definition: (class_definition name: (identifier) @name)) @class
                (function_definition name: (identifier) @name) @function
                (class_definition name: (identifier) @name) @class
                "#
            }
            Language::JavaScript => {
                r#"
                (function_declaration name: (identifier) @name) @function
                (class_declaration name: (identifier) @name) @class
                (method_definition name: (property_identifier) @name) @method
                (lexical_declaration (variable_declarator name: (identifier) @name value: [(arrow_function) (function_expression)])) @function
                (expression_statement (call_expression)) @block
                "#
            }
            Language::TypeScript => {
                r#"
                (function_declaration name: (identifier) @name) @function
                (class_declaration name: (type_identifier) @name) @class
                (method_definition name: (property_identifier) @name) @method
                (lexical_declaration (variable_declarator name: (identifier) @name value: [(arrow_function) (function_expression)])) @function
                (interface_declaration name: (type_identifier) @name) @class
                (expression_statement (call_expression)) @block
                "#
            }
            Language::Go => {
                r#"
                (function_declaration name: (identifier) @name) @function
                (method_declaration name: (field_identifier) @name) @method
                (type_declaration (type_spec name: (type_identifier) @name)) @class
                "#
            }
            Language::Unknown => "",
        }
    }

    /// Runs the declaration query and returns flat `(kind, symbol, range)`
    /// entries sorted by position.
    fn collect_ranges(
        content: &str,
        language: Language,
    ) -> Result<Vec<NodeRange>, DomainError> {
        let grammar = Self::grammar(language)
            .ok_or_else(|| DomainError::parse(format!("no grammar for {}", language)))?;

        let mut parser = Parser::new();
        parser
            .set_language(&grammar)
            .map_err(|e| DomainError::parse(format!("failed to load {} grammar: {}", language, e)))?;

        let tree = parser
            .parse(content, None)
            .ok_or_else(|| DomainError::parse(format!("{} parse returned no tree", language)))?;

        let query = Query::new(&grammar, Self::query_patterns(language))
            .map_err(|e| DomainError::parse(format!("bad {} query: {}", language, e)))?;

        let capture_names = query.capture_names();
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, tree.root_node(), content.as_bytes());

        let mut ranges: Vec<NodeRange> = Vec::new();
        while let Some(m) = matches.next() {
            let mut kind = None;
            let mut node = None;
            let mut symbol = String::new();

            for capture in m.captures {
                let name = capture_names[capture.index as usize];
                match name {
                    "name" => {
                        symbol = capture
                            .node
                            .utf8_text(content.as_bytes())
                            .unwrap_or("")
                            .to_string();
                    }
                    "function" => {
                        kind = Some(ChunkKind::Function);
                        node = Some(capture.node);
                    }
                    "method" => {
                        kind = Some(ChunkKind::Method);
                        node = Some(capture.node);
                    }
                    "class" => {
                        kind = Some(ChunkKind::Class);
                        node = Some(capture.node);
                    }
                    "block" => {
                        kind = Some(ChunkKind::Block);
                        node = Some(capture.node);
                    }
                    _ => {}
                }
            }

            let (Some(kind), Some(node)) = (kind, node) else {
                continue;
            };
            let start_line = node.start_position().row as u32 + 1;
            let end_line = node.end_position().row as u32 + 1;
            let source = node
                .utf8_text(content.as_bytes())
                .unwrap_or("")
                .to_string();
            ranges.push(NodeRange::new(kind, symbol, start_line, end_line, source));
        }

        // Position order, outermost first, then drop duplicate spans kept
        // by overlapping patterns (e.g. a decorated def and its inner def).
        ranges.sort_by(|a, b| {
            a.start_line
                .cmp(&b.start_line)
                .then(b.end_line.cmp(&a.end_line))
        });
        ranges.dedup_by(|a, b| {
            a.start_line == b.start_line && a.end_line == b.end_line
        });

        Ok(ranges)
    }

    /// Nests flat ranges by line containment. Functions directly under a
    /// class become methods.
    fn nest_ranges(flat: Vec<NodeRange>) -> Vec<NodeRange> {
        let mut top: Vec<NodeRange> = Vec::new();
        // Stack of (indices into a path down the forest) realized by
        // recursing over the last inserted chain.
        let mut stack: Vec<NodeRange> = Vec::new();

        fn close_into(top: &mut Vec<NodeRange>, stack: &mut Vec<NodeRange>, next: Option<&NodeRange>) {
            loop {
                match stack.last() {
                    Some(open) if next.is_some_and(|n| open.contains(n)) => break,
                    Some(_) => {}
                    None => break,
                }
                let Some(mut finished) = stack.pop() else { break };
                if let Some(parent) = stack.last_mut() {
                    if parent.kind == ChunkKind::Class && finished.kind == ChunkKind::Function {
                        finished.kind = ChunkKind::Method;
                    }
                    parent.children.push(finished);
                } else {
                    top.push(finished);
                }
            }
        }

        for range in flat {
            close_into(&mut top, &mut stack, Some(&range));
            stack.push(range);
        }
        close_into(&mut top, &mut stack, None);
        top
    }
}

impl Default for TreeSitterParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserService for TreeSitterParser {
    fn parse(
        &self,
        content: &str,
        path: &str,
        language: Language,
    ) -> Result<Vec<NodeRange>, DomainError> {
        let line_count = content.lines().count() as u32;

        if !self.supports(language) {
            debug!("No grammar for {}; {} becomes one block", language, path);
            return Ok(vec![NodeRange::whole_file(content, line_count)]);
        }

        let flat = match Self::collect_ranges(content, language) {
            Ok(ranges) => ranges,
            Err(e) => {
                warn!("Parsing {} failed ({}); falling back to one block", path, e);
                return Ok(vec![NodeRange::whole_file(content, line_count)]);
            }
        };

        if flat.is_empty() {
            return Ok(vec![NodeRange::whole_file(content, line_count)]);
        }
        Ok(Self::nest_ranges(flat))
    }

    fn supports(&self, language: Language) -> bool {
        self.supported.contains(&language)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str, language: Language) -> Vec<NodeRange> {
        TreeSitterParser::new()
            .parse(content, "test_input", language)
            .unwrap()
    }

    #[test]
    fn extracts_rust_functions_and_types() {
        let code = r#"
pub fn add(a: i32, b: i32) -> i32 {
    a + b
}

struct Counter {
    value: u64,
}

impl Counter {
    fn bump(&mut self) {
        self.value += 1;
    }
}
"#;
        let ranges = parse(code, Language::Rust);
        let symbols: Vec<&str> = ranges.iter().map(|r| r.symbol.as_str()).collect();
        assert!(symbols.contains(&"add"));
        assert!(symbols.contains(&"Counter"));

        // `bump` nests inside the impl block and becomes a method.
        let impl_range = ranges
            .iter()
            .find(|r| r.kind == ChunkKind::Class && r.symbol.is_empty())
            .expect("impl range");
        assert_eq!(impl_range.children.len(), 1);
        assert_eq!(impl_range.children[0].symbol, "bump");
        assert_eq!(impl_range.children[0].kind, ChunkKind::Method);
    }

    #[test]
    fn extracts_python_classes_with_methods_nested() {
        let code = r#"
class Calculator:
    def add(self, x):
        return x

    def sub(self, x):
        return -x

def standalone():
    pass
"#;
        let ranges = parse(code, Language::Python);
        assert_eq!(ranges.len(), 2);

        let class = ranges.iter().find(|r| r.symbol == "Calculator").unwrap();
        assert_eq!(class.kind, ChunkKind::Class);
        assert_eq!(class.children.len(), 2);
        assert!(class.children.iter().all(|c| c.kind == ChunkKind::Method));

        let standalone = ranges.iter().find(|r| r.symbol == "standalone").unwrap();
        assert_eq!(standalone.kind, ChunkKind::Function);
    }

    #[test]
    fn python_decorated_function_keeps_decorator_in_source() {
        let code = r#"
@app.post("/items")
def create_item(item):
    return item
"#;
        let ranges = parse(code, Language::Python);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].symbol, "create_item");
        assert!(ranges[0].source.contains("@app.post"));
    }

    #[test]
    fn javascript_route_registrations_become_blocks() {
        let code = r#"
const express = require('express');

function getUserScore(userId) {
  return scores[userId];
}

app.post('/users/:userId/score/recompute', async (req, res) => {
  res.json(recompute(req.params.userId));
});
"#;
        let ranges = parse(code, Language::JavaScript);
        let symbols: Vec<&str> = ranges.iter().map(|r| r.symbol.as_str()).collect();
        assert!(symbols.contains(&"getUserScore"));

        let registration = ranges
            .iter()
            .find(|r| r.source.contains("app.post"))
            .expect("route registration range");
        assert_eq!(registration.kind, ChunkKind::Block);
    }

    #[test]
    fn javascript_arrow_constants_are_functions() {
        let code = "const average = (values) => values.reduce((a, b) => a + b, 0) / values.length;\n";
        let ranges = parse(code, Language::JavaScript);
        assert_eq!(ranges[0].symbol, "average");
        assert_eq!(ranges[0].kind, ChunkKind::Function);
    }

    #[test]
    fn go_methods_are_detected() {
        let code = r#"
package main

type Server struct{}

func (s *Server) Handle() {}

func main() {}
"#;
        let ranges = parse(code, Language::Go);
        let handle = ranges.iter().find(|r| r.symbol == "Handle").unwrap();
        assert_eq!(handle.kind, ChunkKind::Method);
        let main_fn = ranges.iter().find(|r| r.symbol == "main").unwrap();
        assert_eq!(main_fn.kind, ChunkKind::Function);
    }

    #[test]
    fn unknown_language_falls_back_to_whole_file() {
        let parser = TreeSitterParser::new();
        let ranges = parser
            .parse("some opaque text\nwith lines\n", "notes.txt", Language::Unknown)
            .unwrap();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].kind, ChunkKind::Block);
        assert_eq!(ranges[0].start_line, 1);
        assert_eq!(ranges[0].end_line, 2);
    }

    #[test]
    fn file_with_no_declarations_falls_back_to_whole_file() {
        let ranges = parse("x = 1\n", Language::Python);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].kind, ChunkKind::Block);
    }
}
