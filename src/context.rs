//! Ancestor context for expansion requests
//!
//! Walks parent links from a segment through a flat segment collection
//! and renders the chain as a short text block. The walk is bounded in
//! depth and the rendered text in length, so deep trees cost the same as
//! shallow ones.

use crate::segment::{Segment, SegmentId};
use std::collections::HashMap;

/// Ancestors included before the walk stops
pub const DEFAULT_MAX_DEPTH: usize = 4;

/// Characters allowed in a rendered context block
pub const DEFAULT_CHAR_BUDGET: usize = 2000;

/// Appended when a context block had to be cut
pub const TRUNCATION_MARKER: &str = "[context truncated]";

const PATH_HEADER: &str = "\nContext path:";

/// Where a segment sits in the exploration tree.
///
/// Computed on demand, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentContext {
    /// Number of ancestors found (0 for a root segment)
    pub level: usize,
    /// Ancestors ordered from the topmost reached to the immediate parent
    pub parent_segments: Vec<Segment>,
    /// Ancestor titles followed by the segment's own title
    pub full_path: Vec<String>,
    pub original_query: String,
}

impl SegmentContext {
    /// Render without any length bound
    pub fn render(&self) -> String {
        let mut out = format!("Original search: \"{}\"", self.original_query);
        if self.level == 0 {
            return out;
        }

        out.push_str(PATH_HEADER);
        for (depth, parent) in self.parent_segments.iter().enumerate() {
            out.push('\n');
            out.push_str(&"  ".repeat(depth));
            out.push_str("- ");
            out.push_str(&parent.title);
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct ContextBuilder {
    max_depth: usize,
    char_budget: usize,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            char_budget: DEFAULT_CHAR_BUDGET,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_char_budget(mut self, char_budget: usize) -> Self {
        self.char_budget = char_budget;
        self
    }

    /// Reconstruct the ancestor chain of `segment` from `known`.
    ///
    /// A parent id that cannot be resolved ends the walk without error.
    pub fn context_for(
        &self,
        segment: &Segment,
        known: &[Segment],
        original_query: &str,
    ) -> SegmentContext {
        let index: HashMap<SegmentId, &Segment> = known.iter().map(|s| (s.id, s)).collect();

        let mut ancestors = Vec::new();
        let mut next = segment.parent_id;
        while let Some(parent_id) = next {
            if ancestors.len() >= self.max_depth {
                break;
            }
            let Some(parent) = index.get(&parent_id) else {
                break;
            };
            ancestors.push((*parent).clone());
            next = parent.parent_id;
        }
        ancestors.reverse();

        let mut full_path: Vec<String> = ancestors.iter().map(|s| s.title.clone()).collect();
        full_path.push(segment.title.clone());

        SegmentContext {
            level: ancestors.len(),
            parent_segments: ancestors,
            full_path,
            original_query: original_query.to_string(),
        }
    }

    /// Render the bounded context block for an expansion request
    pub fn build(&self, segment: &Segment, known: &[Segment], original_query: &str) -> String {
        let rendered = self.context_for(segment, known, original_query).render();
        truncate_at_line(&rendered, self.char_budget)
    }
}

/// Cut `text` to at most `budget` characters at the last whole line, then
/// mark it. A path header left without any path line goes too.
///
/// A first line longer than the budget is cut mid-line instead.
fn truncate_at_line(text: &str, budget: usize) -> String {
    if text.chars().count() <= budget {
        return text.to_string();
    }

    let cut = text
        .char_indices()
        .nth(budget)
        .map_or(text.len(), |(i, _)| i);

    let head = &text[..cut];
    let kept = if text[cut..].starts_with('\n') {
        head
    } else {
        match head.rfind('\n') {
            Some(pos) => &head[..pos],
            None => head,
        }
    };
    let kept = kept.strip_suffix(PATH_HEADER).unwrap_or(kept);

    format!("{kept}\n{TRUNCATION_MARKER}")
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A chain root -> level1 -> ... -> level{n-1}, returned root first
    fn chain(n: usize) -> Vec<Segment> {
        let mut out: Vec<Segment> = Vec::new();
        for i in 0..n {
            let seg = match out.last() {
                Some(parent) => Segment::child_of(parent.id, format!("Level {i}"), "..."),
                None => Segment::new("Level 0", "..."),
            };
            out.push(seg);
        }
        out
    }

    #[test]
    fn root_segment_renders_only_original_search() {
        let root = Segment::new("Light reactions", "Happen in thylakoids.");
        let text = ContextBuilder::new().build(&root, &[root.clone()], "photosynthesis");

        assert_eq!(text, "Original search: \"photosynthesis\"");
    }

    #[test]
    fn context_path_lists_ancestors_root_first_with_indentation() {
        let segs = chain(3);
        let leaf = &segs[2];
        let text = ContextBuilder::new().build(leaf, &segs, "photosynthesis");

        assert_eq!(
            text,
            "Original search: \"photosynthesis\"\nContext path:\n- Level 0\n  - Level 1"
        );
    }

    #[test]
    fn ancestor_chain_of_ten_lists_at_most_four() {
        let segs = chain(11);
        let leaf = &segs[10];
        let builder = ContextBuilder::new();

        let ctx = builder.context_for(leaf, &segs, "q");
        assert_eq!(ctx.level, 4);
        assert_eq!(
            ctx.full_path,
            vec!["Level 6", "Level 7", "Level 8", "Level 9", "Level 10"]
        );

        let text = builder.build(leaf, &segs, "q");
        let path_lines = text.lines().filter(|l| l.trim_start().starts_with("- ")).count();
        assert_eq!(path_lines, 4);
        assert!(!text.contains("Level 5"));
    }

    #[test]
    fn dangling_parent_truncates_walk() {
        let segs = chain(4);
        // Drop Level 1 so Level 2's parent cannot be resolved
        let known: Vec<Segment> = segs.iter().filter(|s| s.title != "Level 1").cloned().collect();
        let ctx = ContextBuilder::new().context_for(&segs[3], &known, "q");

        assert_eq!(ctx.level, 1);
        assert_eq!(ctx.parent_segments[0].title, "Level 2");
    }

    #[test]
    fn unknown_parent_is_treated_as_level_zero() {
        let orphan = Segment::child_of(SegmentId::new(), "Orphan", "...");
        let ctx = ContextBuilder::new().context_for(&orphan, &[], "q");

        assert_eq!(ctx.level, 0);
        assert_eq!(ctx.render(), "Original search: \"q\"");
    }

    #[test]
    fn over_budget_context_is_cut_at_line_and_marked() {
        let mut segs = vec![Segment::new("A".repeat(30), "...")];
        for _ in 0..3 {
            let parent = segs.last().unwrap().id;
            segs.push(Segment::child_of(parent, "B".repeat(30), "..."));
        }
        let leaf = segs.last().unwrap();

        let full = ContextBuilder::new().build(leaf, &segs, "q");
        let bounded = ContextBuilder::new().with_char_budget(70).build(leaf, &segs, "q");

        assert!(full.len() > 70);
        assert!(bounded.ends_with(TRUNCATION_MARKER));
        let body = bounded.trim_end_matches(TRUNCATION_MARKER).trim_end_matches('\n');
        assert!(full.starts_with(body));
        assert!(body.len() <= 70);
        // Every kept line is a whole line of the untruncated block
        for line in body.lines() {
            assert!(full.lines().any(|l| l == line));
        }
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "Original search: \"日本語の光合成\"";
        let cut = truncate_at_line(text, 22);
        assert!(cut.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn char_budget_counts_characters_not_bytes() {
        let grandparent = Segment::new("葉緑体", "...");
        let parent = Segment::child_of(grandparent.id, "明反応", "...");
        let leaf = Segment::child_of(parent.id, "光化学系", "...");
        let known = vec![grandparent, parent, leaf.clone()];

        let full = ContextBuilder::new().build(&leaf, &known, "光合成");
        assert!(full.chars().count() <= 60);
        assert!(full.len() > 60);

        let bounded = ContextBuilder::new()
            .with_char_budget(60)
            .build(&leaf, &known, "光合成");
        assert_eq!(bounded, full);
    }

    #[test]
    fn non_ascii_cut_keeps_whole_lines_within_char_budget() {
        let mut segs = vec![Segment::new("葉緑体".repeat(5), "...")];
        for _ in 0..3 {
            let parent = segs.last().unwrap().id;
            segs.push(Segment::child_of(parent, "明反応".repeat(5), "..."));
        }
        let leaf = segs.last().unwrap();

        let full = ContextBuilder::new().build(leaf, &segs, "光合成");
        let bounded = ContextBuilder::new().with_char_budget(60).build(leaf, &segs, "光合成");

        let body = bounded.trim_end_matches(TRUNCATION_MARKER).trim_end_matches('\n');
        assert!(body.chars().count() <= 60);
        assert!(body.contains(&"葉緑体".repeat(5)));
        for line in body.lines() {
            assert!(full.lines().any(|l| l == line));
        }
    }

    #[test]
    fn header_without_path_lines_is_dropped() {
        let parent = Segment::new("葉緑体".repeat(10), "...");
        let leaf = Segment::child_of(parent.id, "明反応", "...");
        let known = vec![parent, leaf.clone()];

        let text = ContextBuilder::new()
            .with_char_budget(40)
            .build(&leaf, &known, "光合成");

        assert_eq!(text, format!("Original search: \"光合成\"\n{TRUNCATION_MARKER}"));
    }

    #[test]
    fn truncation_keeps_line_ending_exactly_at_budget() {
        let text = "first line\nsecond line";
        let cut = truncate_at_line(text, 10);
        assert_eq!(cut, format!("first line\n{TRUNCATION_MARKER}"));
    }
}
