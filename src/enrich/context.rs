//! Leaf Breadcrumbs
//!
//! Walks each leaf's ancestor chain through an id-indexed lookup table,
//! joins the ancestor synopses root-to-leaf, and prefixes the result to
//! the leaf text. The enriched text is what gets embedded; the raw leaf
//! text stays untouched in the node store.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

use crate::chunk::{Segment, SegmentMetadata};

use super::SynopsisMap;

/// Joins ancestor synopses inside the context marker.
pub const BREADCRUMB_SEPARATOR: &str = " → ";

/// A leaf prepared for embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedLeaf {
    /// Same id as the source leaf segment, so retrieval can map back.
    pub leaf_id: String,
    /// Breadcrumb-prefixed text; equals the raw leaf text when no
    /// ancestor synopsis was available.
    pub embedded_text: String,
    /// Number of breadcrumb entries actually used, not tree depth.
    pub hierarchy_depth: u32,
    pub has_context: bool,
    pub metadata: SegmentMetadata,
}

/// Enrich every leaf among `segments` with its ancestor breadcrumb.
///
/// Missing synopses are skipped silently: a broken chain just shortens
/// the breadcrumb, it never fails the leaf.
pub fn enrich_leaves(segments: &[Segment], synopses: &SynopsisMap) -> Vec<IndexedLeaf> {
    let table: HashMap<&str, &Segment> =
        segments.iter().map(|s| (s.id.as_str(), s)).collect();

    let leaves: Vec<IndexedLeaf> = segments
        .iter()
        .filter(|s| s.is_leaf())
        .map(|leaf| enrich_one(leaf, &table, synopses))
        .collect();

    let with_context = leaves.iter().filter(|l| l.has_context).count();
    info!(
        leaves = leaves.len(),
        with_context = with_context,
        "Enriched leaf segments"
    );
    leaves
}

fn enrich_one(
    leaf: &Segment,
    table: &HashMap<&str, &Segment>,
    synopses: &SynopsisMap,
) -> IndexedLeaf {
    // Collect ancestor synopses leaf-to-root, then reverse.
    let mut chain: Vec<&str> = Vec::new();
    let mut current = leaf.parent_id.as_deref();
    while let Some(parent_id) = current {
        let Some(parent) = table.get(parent_id) else {
            break;
        };
        if let Some(synopsis) = synopses.get(parent_id) {
            chain.push(synopsis.text.as_str());
        }
        current = parent.parent_id.as_deref();
    }
    chain.reverse();

    let depth = chain.len() as u32;
    let embedded_text = if chain.is_empty() {
        leaf.text.clone()
    } else {
        format!(
            "[CONTEXT: {}]\n\n{}",
            chain.join(BREADCRUMB_SEPARATOR),
            leaf.text
        )
    };

    IndexedLeaf {
        leaf_id: leaf.id.clone(),
        embedded_text,
        hierarchy_depth: depth,
        has_context: depth > 0,
        metadata: leaf.metadata.clone(),
    }
}
