//! Segment Tree Construction
//!
//! Page texts are concatenated once; every segment is a contiguous byte
//! range of that document string, so child texts always partition their
//! parent's text in document order. Splitting prefers paragraph breaks,
//! then sentence ends, then whitespace, then a hard cut at a char
//! boundary. Fully deterministic for a fixed input.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use thiserror::Error;
use tracing::info;

use crate::loader::PageUnit;

/// Separator inserted between page texts when concatenating.
const PAGE_SEPARATOR: &str = "\n\n";

#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("No pages to chunk")]
    NoInput,
}

/// Provenance carried by every segment in a tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentMetadata {
    pub filename: String,
    pub file_path: String,
    pub collection: String,
    /// First 1-indexed page this segment covers.
    pub page_start: u32,
    /// Last 1-indexed page this segment covers.
    pub page_end: u32,
    pub total_pages: u32,
    pub source_type: String,
}

/// One node in the hierarchical document tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    /// Stable id derived from content and position, never reused.
    pub id: String,
    /// Raw content, immutable after creation.
    pub text: String,
    /// 0 = root, increasing toward leaves.
    pub level: u32,
    pub parent_id: Option<String>,
    /// Ordered in document order; empty for leaves.
    pub child_ids: Vec<String>,
    pub metadata: SegmentMetadata,
}

impl Segment {
    pub fn is_leaf(&self) -> bool {
        self.child_ids.is_empty()
    }
}

/// Complete segment tree for one document.
#[derive(Debug, Clone)]
pub struct Hierarchy {
    pub collection: String,
    pub segments: Vec<Segment>,
}

impl Hierarchy {
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Leaf segments in document order.
    pub fn leaves(&self) -> Vec<&Segment> {
        self.segments.iter().filter(|s| s.is_leaf()).collect()
    }

    /// Non-leaf segments in document order.
    pub fn interior(&self) -> Vec<&Segment> {
        self.segments.iter().filter(|s| !s.is_leaf()).collect()
    }

    /// Id-indexed lookup table for ancestor traversal.
    pub fn lookup(&self) -> std::collections::HashMap<&str, &Segment> {
        self.segments.iter().map(|s| (s.id.as_str(), s)).collect()
    }
}

/// Builds segment trees from page units.
pub struct HierarchicalChunker {
    level_sizes: Vec<usize>,
}

impl HierarchicalChunker {
    /// `level_sizes` are byte budgets, coarsest first, strictly
    /// decreasing, all positive.
    pub fn new(level_sizes: Vec<usize>) -> Result<Self, ChunkError> {
        if level_sizes.is_empty() {
            return Err(ChunkError::InvalidConfiguration(
                "at least one level size is required".to_string(),
            ));
        }
        if level_sizes.iter().any(|&s| s == 0) {
            return Err(ChunkError::InvalidConfiguration(
                "level sizes must be positive".to_string(),
            ));
        }
        if level_sizes.windows(2).any(|w| w[0] <= w[1]) {
            return Err(ChunkError::InvalidConfiguration(format!(
                "level sizes must be strictly decreasing, got {:?}",
                level_sizes
            )));
        }
        Ok(Self { level_sizes })
    }

    /// Build the tree: level 0 is the whole document, `level_sizes[i]`
    /// bounds level `i + 1`, the last level's segments are the leaves.
    pub fn build(&self, pages: &[PageUnit]) -> Result<Hierarchy, ChunkError> {
        if pages.is_empty() {
            return Err(ChunkError::NoInput);
        }

        // Concatenate pages, remembering each page's byte range.
        let mut doc = String::new();
        let mut page_ranges: Vec<(usize, usize)> = Vec::with_capacity(pages.len());
        for (i, page) in pages.iter().enumerate() {
            if i > 0 {
                doc.push_str(PAGE_SEPARATOR);
            }
            let start = doc.len();
            doc.push_str(&page.text);
            page_ranges.push((start, doc.len()));
        }

        let first = &pages[0];
        let collection = first.collection.clone();

        let mut segments: Vec<Segment> = Vec::new();
        // (index into `segments`, byte range) for the level being split.
        let mut current: Vec<(usize, (usize, usize))> = Vec::new();

        let root_range = (0, doc.len());
        let root = self.make_segment(&doc, root_range, 0, None, first, &page_ranges);
        segments.push(root);
        current.push((0, root_range));

        for (depth, &budget) in self.level_sizes.iter().enumerate() {
            let level = depth as u32 + 1;
            let mut next: Vec<(usize, (usize, usize))> = Vec::new();

            for (parent_idx, range) in current {
                let parent_id = segments[parent_idx].id.clone();
                for child_range in split_range(&doc, range.0, range.1, budget) {
                    let child = self.make_segment(
                        &doc,
                        child_range,
                        level,
                        Some(parent_id.clone()),
                        first,
                        &page_ranges,
                    );
                    let child_id = child.id.clone();
                    let child_idx = segments.len();
                    segments.push(child);
                    segments[parent_idx].child_ids.push(child_id);
                    next.push((child_idx, child_range));
                }
            }
            current = next;
        }

        let leaf_count = current.len();
        info!(
            collection = %collection,
            total = segments.len(),
            leaves = leaf_count,
            "Built segment hierarchy"
        );

        Ok(Hierarchy {
            collection,
            segments,
        })
    }

    fn make_segment(
        &self,
        doc: &str,
        range: (usize, usize),
        level: u32,
        parent_id: Option<String>,
        source: &PageUnit,
        page_ranges: &[(usize, usize)],
    ) -> Segment {
        let text = doc[range.0..range.1].to_string();
        let (page_start, page_end) = page_span(range, page_ranges);
        Segment {
            id: segment_id(&source.collection, level, range.0, &text),
            text,
            level,
            parent_id,
            child_ids: Vec::new(),
            metadata: SegmentMetadata {
                filename: source.filename.clone(),
                file_path: source.file_path.clone(),
                collection: source.collection.clone(),
                page_start,
                page_end,
                total_pages: source.total_pages,
                source_type: "pdf".to_string(),
            },
        }
    }
}

/// Deterministic segment id from collection, level, position, and content.
fn segment_id(collection: &str, level: u32, start: usize, text: &str) -> String {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    format!("{}-{}-{:06}-{:016x}", collection, level, start, hasher.finish())
}

/// 1-indexed page span covered by a byte range.
fn page_span(range: (usize, usize), page_ranges: &[(usize, usize)]) -> (u32, u32) {
    let mut first = None;
    let mut last = None;
    for (i, &(start, end)) in page_ranges.iter().enumerate() {
        if end > range.0 && start < range.1 {
            if first.is_none() {
                first = Some(i as u32 + 1);
            }
            last = Some(i as u32 + 1);
        }
    }
    match (first, last) {
        (Some(f), Some(l)) => (f, l),
        // Range falls entirely inside a page separator; attribute it to
        // the preceding page.
        _ => {
            let before = page_ranges
                .iter()
                .take_while(|&&(start, _)| start <= range.0)
                .count()
                .max(1) as u32;
            (before, before)
        }
    }
}

/// Split a byte range into consecutive sub-ranges of at most `budget`
/// bytes, cutting at natural boundaries where possible.
fn split_range(text: &str, start: usize, end: usize, budget: usize) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut cursor = start;
    while end - cursor > budget {
        let cut = find_break(text, cursor, cursor + budget);
        ranges.push((cursor, cut));
        cursor = cut;
    }
    ranges.push((cursor, end));
    ranges
}

/// Best cut position in `(start, limit]`: paragraph break, then sentence
/// end, then whitespace, then a hard cut at the last char boundary.
fn find_break(text: &str, start: usize, limit: usize) -> usize {
    let mut limit = limit;
    while !text.is_char_boundary(limit) {
        limit -= 1;
    }
    let window = &text[start..limit];

    // Paragraph boundary: cut after the blank line.
    if let Some(pos) = window.rfind("\n\n") {
        if pos > 0 {
            return start + pos + 2;
        }
    }

    // Sentence boundary: cut after terminal punctuation followed by
    // whitespace.
    let mut sentence_cut = None;
    let mut chars = window.char_indices().peekable();
    while let Some((idx, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(_, next)) = chars.peek() {
                if next.is_whitespace() && idx > 0 {
                    sentence_cut = Some(idx + c.len_utf8());
                }
            }
        }
    }
    if let Some(cut) = sentence_cut {
        return start + cut;
    }

    // Whitespace: cut after the last whitespace character.
    let mut ws_cut = None;
    for (idx, c) in window.char_indices() {
        if c.is_whitespace() && idx + c.len_utf8() < window.len() {
            ws_cut = Some(idx + c.len_utf8());
        }
    }
    if let Some(cut) = ws_cut {
        if cut > 0 {
            return start + cut;
        }
    }

    // Hard cut at the window edge.
    if limit > start {
        limit
    } else {
        // Budget smaller than one character; advance by a single char.
        let mut cut = start + 1;
        while cut < text.len() && !text.is_char_boundary(cut) {
            cut += 1;
        }
        cut
    }
}
