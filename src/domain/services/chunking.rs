use crate::domain::{compute_content_hash, Chunk, ChunkKind, NodeRange};

use super::enrichment::detect_route;

/// Token budget for chunk construction.
#[derive(Debug, Clone, Copy)]
pub struct ChunkLimits {
    pub min_tokens: u32,
    pub max_tokens: u32,
}

impl Default for ChunkLimits {
    fn default() -> Self {
        Self {
            min_tokens: 200,
            max_tokens: 800,
        }
    }
}

/// A chunk plus the source text it was cut from. The source is needed
/// downstream for enrichment and summarization but is never persisted.
#[derive(Debug, Clone)]
pub struct ChunkDraft {
    pub chunk: Chunk,
    pub source: String,
}

/// Estimates the token count of a source slice: alphanumeric runs and
/// punctuation characters, scaled by 1.3 to approximate subword inflation.
pub fn estimate_tokens(text: &str) -> u32 {
    let mut count: u64 = 0;
    let mut in_word = false;
    for ch in text.chars() {
        if ch.is_alphanumeric() || ch == '_' {
            if !in_word {
                count += 1;
                in_word = true;
            }
        } else {
            in_word = false;
            if !ch.is_whitespace() {
                count += 1;
            }
        }
    }
    ((count as f64) * 1.3).ceil() as u32
}

/// One splittable unit derived from a parsed range. `group` identifies the
/// unit's parent (0 is the file itself; shards of an oversized range get
/// that range's own group) so merging never crosses parents.
struct Unit {
    kind: ChunkKind,
    symbol: String,
    start_line: u32,
    end_line: u32,
    source: String,
    tokens: u32,
    group: usize,
}

/// Turns parsed node ranges into token-bounded chunks.
///
/// Oversized ranges split at child boundaries, then at blank-line statement
/// boundaries; shards inherit symbol and kind with an index suffix.
/// Undersized adjacent siblings merge while staying within one parent and
/// under the max budget.
pub fn build_chunks(
    repo_id: &str,
    path: &str,
    ranges: &[NodeRange],
    limits: ChunkLimits,
) -> Vec<ChunkDraft> {
    const FILE_GROUP: usize = 0;

    let mut units = Vec::new();
    for (idx, range) in ranges.iter().enumerate() {
        split_range(range, limits, FILE_GROUP, idx + 1, &mut units);
    }

    let merged = merge_units(units, limits);

    merged
        .into_iter()
        .map(|u| {
            let content_hash = compute_content_hash(u.source.as_bytes());
            let chunk = Chunk::new(
                repo_id,
                path,
                u.start_line,
                u.end_line,
                u.symbol,
                u.kind,
                content_hash,
                u.tokens,
            );
            ChunkDraft {
                chunk,
                source: u.source,
            }
        })
        .collect()
}

fn split_range(
    range: &NodeRange,
    limits: ChunkLimits,
    sibling_group: usize,
    own_group: usize,
    out: &mut Vec<Unit>,
) {
    let tokens = estimate_tokens(&range.source);
    if tokens <= limits.max_tokens {
        out.push(Unit {
            kind: range.kind,
            symbol: range.symbol.clone(),
            start_line: range.start_line,
            end_line: range.end_line,
            source: range.source.clone(),
            tokens,
            group: sibling_group,
        });
        return;
    }

    let segments = if range.children.is_empty() {
        cut_at_blank_lines(range, limits)
    } else {
        cut_at_children(range, limits)
    };

    if segments.len() <= 1 {
        // A single indivisible span is allowed to exceed the budget.
        out.push(Unit {
            kind: range.kind,
            symbol: range.symbol.clone(),
            start_line: range.start_line,
            end_line: range.end_line,
            source: range.source.clone(),
            tokens,
            group: sibling_group,
        });
        return;
    }

    for (i, seg) in segments.into_iter().enumerate() {
        let symbol = if range.symbol.is_empty() {
            String::new()
        } else {
            format!("{}#{}", range.symbol, i + 1)
        };
        let tokens = estimate_tokens(&seg.source);
        out.push(Unit {
            kind: range.kind,
            symbol,
            start_line: seg.start_line,
            end_line: seg.end_line,
            source: seg.source,
            tokens,
            group: own_group,
        });
    }
}

struct Segment {
    start_line: u32,
    end_line: u32,
    source: String,
}

/// Cuts an oversized parent at the start lines of its children, greedily
/// packing consecutive spans under the token budget.
fn cut_at_children(range: &NodeRange, limits: ChunkLimits) -> Vec<Segment> {
    let lines: Vec<&str> = range.source.lines().collect();
    let mut boundaries: Vec<u32> = range
        .children
        .iter()
        .map(|c| c.start_line)
        .filter(|&l| l > range.start_line && l <= range.end_line)
        .collect();
    boundaries.sort_unstable();
    boundaries.dedup();

    pack_segments(&lines, range.start_line, &boundaries, limits)
}

/// Cuts an oversized leaf range at blank lines.
fn cut_at_blank_lines(range: &NodeRange, limits: ChunkLimits) -> Vec<Segment> {
    let lines: Vec<&str> = range.source.lines().collect();
    let boundaries: Vec<u32> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| l.trim().is_empty())
        .map(|(i, _)| range.start_line + i as u32 + 1)
        .filter(|&l| l > range.start_line && l <= range.end_line)
        .collect();

    if boundaries.is_empty() {
        return hard_cut(&lines, range.start_line, limits);
    }
    pack_segments(&lines, range.start_line, &boundaries, limits)
}

/// Greedily packs line spans delimited by `boundaries` into segments whose
/// estimated token count stays under the max budget.
fn pack_segments(
    lines: &[&str],
    first_line: u32,
    boundaries: &[u32],
    limits: ChunkLimits,
) -> Vec<Segment> {
    let mut cut_points: Vec<usize> = boundaries
        .iter()
        .map(|&l| (l - first_line) as usize)
        .filter(|&i| i > 0 && i < lines.len())
        .collect();
    cut_points.push(lines.len());
    cut_points.dedup();

    let mut segments = Vec::new();
    let mut span_start = 0usize;
    let mut acc_start = 0usize;
    let mut acc_tokens = 0u32;

    for &cut in &cut_points {
        let span = lines[span_start..cut].join("\n");
        let span_tokens = estimate_tokens(&span);

        if acc_tokens > 0 && acc_tokens + span_tokens > limits.max_tokens {
            segments.push(make_segment(lines, acc_start, span_start, first_line));
            acc_start = span_start;
            acc_tokens = span_tokens;
        } else {
            acc_tokens += span_tokens;
        }
        span_start = cut;
    }
    if acc_start < lines.len() {
        segments.push(make_segment(lines, acc_start, lines.len(), first_line));
    }
    segments
}

/// Last resort for a leaf with no internal boundaries: cut by raw lines.
fn hard_cut(lines: &[&str], first_line: u32, limits: ChunkLimits) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut acc_start = 0usize;
    let mut acc_tokens = 0u32;

    for (i, line) in lines.iter().enumerate() {
        let line_tokens = estimate_tokens(line);
        if acc_tokens > 0 && acc_tokens + line_tokens > limits.max_tokens {
            segments.push(make_segment(lines, acc_start, i, first_line));
            acc_start = i;
            acc_tokens = line_tokens;
        } else {
            acc_tokens += line_tokens;
        }
    }
    if acc_start < lines.len() {
        segments.push(make_segment(lines, acc_start, lines.len(), first_line));
    }
    segments
}

fn make_segment(lines: &[&str], start: usize, end: usize, first_line: u32) -> Segment {
    Segment {
        start_line: first_line + start as u32,
        end_line: first_line + end.saturating_sub(1) as u32,
        source: lines[start..end].join("\n"),
    }
}

/// Merges adjacent undersized units from the same parent group. Units
/// holding a route registration never merge in either direction: each HTTP
/// handler stays its own retrieval atom.
fn merge_units(units: Vec<Unit>, limits: ChunkLimits) -> Vec<Unit> {
    let mut merged: Vec<Unit> = Vec::with_capacity(units.len());

    for unit in units {
        let absorb = match merged.last() {
            Some(prev) => {
                prev.group == unit.group
                    && prev.tokens < limits.min_tokens
                    && prev.tokens + unit.tokens <= limits.max_tokens
                    && detect_route(&prev.source).is_none()
                    && detect_route(&unit.source).is_none()
            }
            None => false,
        };

        match merged.last_mut() {
            Some(prev) if absorb => {
                if prev.kind != unit.kind {
                    prev.kind = ChunkKind::Block;
                }
                if prev.symbol.is_empty() {
                    prev.symbol = unit.symbol;
                }
                prev.end_line = unit.end_line;
                prev.source.push_str("\n\n");
                prev.source.push_str(&unit.source);
                prev.tokens = estimate_tokens(&prev.source);
            }
            _ => merged.push(unit),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NodeRange;

    fn limits(min: u32, max: u32) -> ChunkLimits {
        ChunkLimits {
            min_tokens: min,
            max_tokens: max,
        }
    }

    #[test]
    fn token_estimate_counts_words_and_punctuation() {
        // 5 identifier runs + 8 punctuation chars, scaled by 1.3.
        let estimate = estimate_tokens("fn add(a: i32) {}");
        assert!(estimate >= 10 && estimate <= 20, "estimate was {estimate}");
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn small_range_becomes_one_chunk() {
        let range = NodeRange::new(
            ChunkKind::Function,
            "add",
            3,
            5,
            "function add(a, b) {\n  return a + b;\n}",
        );
        let chunks = build_chunks("repo", "src/m.js", &[range], limits(1, 800));

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk.symbol, "add");
        assert_eq!(chunks[0].chunk.start_line, 3);
        assert_eq!(chunks[0].chunk.end_line, 5);
        assert_eq!(chunks[0].chunk.kind, ChunkKind::Function);
    }

    #[test]
    fn oversized_leaf_splits_at_blank_lines_with_suffixes() {
        let body = (0..12)
            .map(|i| format!("let v{i} = compute_value({i}, {i}, {i});\n\n"))
            .collect::<String>();
        let line_count = body.lines().count() as u32;
        let range = NodeRange::new(ChunkKind::Function, "big", 1, line_count, body);

        let chunks = build_chunks("repo", "a.js", &[range], limits(5, 40));
        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].chunk.symbol, "big#1");
        assert_eq!(chunks[1].chunk.symbol, "big#2");
        for c in &chunks {
            assert!(c.chunk.end_line >= c.chunk.start_line);
        }
    }

    #[test]
    fn oversized_parent_splits_at_child_boundaries() {
        let mut lines = Vec::new();
        lines.push("class Big {".to_string());
        for m in 0..6 {
            lines.push(format!("  method{m}() {{"));
            lines.push(format!("    return do_work({m}, {m}, {m});"));
            lines.push("  }".to_string());
        }
        lines.push("}".to_string());
        let source = lines.join("\n");
        let end = lines.len() as u32;

        let mut parent = NodeRange::new(ChunkKind::Class, "Big", 1, end, source);
        for m in 0..6u32 {
            let start = 2 + m * 3;
            parent.children.push(NodeRange::new(
                ChunkKind::Method,
                format!("method{m}"),
                start,
                start + 2,
                "",
            ));
        }

        let chunks = build_chunks("repo", "a.js", &[parent], limits(5, 30));
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chunk.kind == ChunkKind::Class));
        assert!(chunks[0].chunk.symbol.starts_with("Big#"));
        // Shards tile the parent without gaps.
        assert_eq!(chunks[0].chunk.start_line, 1);
        assert_eq!(chunks.last().unwrap().chunk.end_line, end);
    }

    #[test]
    fn tiny_siblings_merge_within_budget() {
        let ranges = vec![
            NodeRange::new(ChunkKind::Function, "a", 1, 1, "const a = 1;"),
            NodeRange::new(ChunkKind::Function, "b", 3, 3, "const b = 2;"),
            NodeRange::new(ChunkKind::Function, "c", 5, 5, "const c = 3;"),
        ];
        let chunks = build_chunks("repo", "a.js", &ranges, limits(50, 200));

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk.symbol, "a");
        assert_eq!(chunks[0].chunk.start_line, 1);
        assert_eq!(chunks[0].chunk.end_line, 5);
    }

    #[test]
    fn merge_never_exceeds_max() {
        let big = "x ".repeat(120);
        let ranges = vec![
            NodeRange::new(ChunkKind::Function, "a", 1, 1, big.clone()),
            NodeRange::new(ChunkKind::Function, "b", 2, 2, big),
        ];
        let chunks = build_chunks("repo", "a.js", &ranges, limits(200, 250));
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn route_registrations_never_merge() {
        let ranges = vec![
            NodeRange::new(
                ChunkKind::Block,
                "",
                1,
                3,
                "app.get('/users/:id/score', (req, res) => {\n  res.json(getUserScore(req.params.id));\n});",
            ),
            NodeRange::new(
                ChunkKind::Block,
                "",
                5,
                7,
                "app.post('/users/:id/score/recompute', (req, res) => {\n  res.json(recompute(req.params.id));\n});",
            ),
        ];
        let chunks = build_chunks("repo", "src/server.js", &ranges, limits(200, 800));
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn indivisible_single_line_is_forced_through() {
        let one_line = "call(); ".repeat(300);
        let range = NodeRange::new(ChunkKind::Function, "wall", 1, 1, one_line);
        let chunks = build_chunks("repo", "a.js", &[range], limits(200, 400));

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].chunk.tokens > 400);
    }
}
