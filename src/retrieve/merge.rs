//! Auto-Merge Rule
//!
//! Pure function over a set of retrieved leaf ids and a segment table.
//! Whenever the retrieved fraction of a parent's children exceeds the
//! threshold, the children collapse into the parent; the rule re-applies
//! one level up until nothing changes, then ancestors subsume any
//! descendants still present. Deterministic: iteration runs over ordered
//! sets, and the output is sorted by id.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

use crate::chunk::Segment;

/// Apply the merge rule and return the surviving segment ids, sorted.
///
/// `threshold` is strict: a parent with exactly half its children
/// retrieved is NOT merged at the default of 0.5.
pub fn auto_merge(
    leaf_ids: &[String],
    table: &HashMap<String, Segment>,
    threshold: f64,
) -> Vec<String> {
    // Ids the table does not know cannot participate in merging.
    let mut set: BTreeSet<String> = leaf_ids
        .iter()
        .filter(|id| table.contains_key(*id))
        .cloned()
        .collect();

    // Promote until fixpoint. A parent promoted in one pass counts as a
    // retrieved child of its own parent in the next.
    loop {
        let mut groups: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for id in &set {
            let Some(segment) = table.get(id) else { continue };
            let Some(parent_id) = segment.parent_id.as_deref() else {
                continue;
            };
            if table.contains_key(parent_id) {
                groups.entry(parent_id).or_default().insert(id);
            }
        }

        let mut promoted: Vec<(String, Vec<String>)> = Vec::new();
        for (parent_id, members) in &groups {
            let total = table[*parent_id].child_ids.len();
            if total == 0 {
                continue;
            }
            let fraction = members.len() as f64 / total as f64;
            if fraction > threshold {
                promoted.push((
                    parent_id.to_string(),
                    members.iter().map(|m| m.to_string()).collect(),
                ));
            }
        }

        if promoted.is_empty() {
            break;
        }
        for (parent_id, members) in promoted {
            debug!(parent = %parent_id, children = members.len(), "Merged children into parent");
            for member in members {
                set.remove(&member);
            }
            set.insert(parent_id);
        }
    }

    // Never return both a node and its ancestor: keep the highest.
    let survivors: Vec<String> = set
        .iter()
        .filter(|id| !has_ancestor_in(id, &set, table))
        .cloned()
        .collect();
    survivors
}

fn has_ancestor_in(
    id: &str,
    set: &BTreeSet<String>,
    table: &HashMap<String, Segment>,
) -> bool {
    let mut current = table.get(id).and_then(|s| s.parent_id.as_deref());
    while let Some(parent_id) = current {
        if set.contains(parent_id) {
            return true;
        }
        current = table.get(parent_id).and_then(|s| s.parent_id.as_deref());
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::SegmentMetadata;

    fn metadata() -> SegmentMetadata {
        SegmentMetadata {
            filename: "doc.pdf".to_string(),
            file_path: "/doc.pdf".to_string(),
            collection: "doc".to_string(),
            page_start: 1,
            page_end: 1,
            total_pages: 1,
            source_type: "pdf".to_string(),
        }
    }

    fn add(table: &mut HashMap<String, Segment>, id: &str, level: u32, parent: Option<&str>, children: &[&str]) {
        table.insert(
            id.to_string(),
            Segment {
                id: id.to_string(),
                text: format!("text {}", id),
                level,
                parent_id: parent.map(|p| p.to_string()),
                child_ids: children.iter().map(|c| c.to_string()).collect(),
                metadata: metadata(),
            },
        );
    }

    /// root -> {p1: [a, b], p2: [c, d, e]}
    fn two_parent_table() -> HashMap<String, Segment> {
        let mut table = HashMap::new();
        add(&mut table, "root", 0, None, &["p1", "p2"]);
        add(&mut table, "p1", 1, Some("root"), &["a", "b"]);
        add(&mut table, "p2", 1, Some("root"), &["c", "d", "e"]);
        for leaf in ["a", "b"] {
            add(&mut table, leaf, 2, Some("p1"), &[]);
        }
        for leaf in ["c", "d", "e"] {
            add(&mut table, leaf, 2, Some("p2"), &[]);
        }
        table
    }

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_half_is_not_merged() {
        // 1 of 2 children retrieved: exactly 50%, threshold is strict.
        let table = two_parent_table();
        let result = auto_merge(&ids(&["a"]), &table, 0.5);
        assert_eq!(result, ids(&["a"]));
    }

    #[test]
    fn test_majority_is_merged() {
        // 2 of 3 children retrieved: 66% > 50%, promote to parent.
        let table = two_parent_table();
        let result = auto_merge(&ids(&["c", "d"]), &table, 0.5);
        assert_eq!(result, ids(&["p2"]));
    }

    #[test]
    fn test_both_children_merge_then_root() {
        // All leaves retrieved: both parents promote, and the two
        // promoted parents are 2 of 2 root children, so root wins.
        let table = two_parent_table();
        let result = auto_merge(&ids(&["a", "b", "c", "d", "e"]), &table, 0.5);
        assert_eq!(result, ids(&["root"]));
    }

    #[test]
    fn test_ancestor_subsumes_descendant() {
        // p2 promotes from {c, d, e}; leaf "a" stays. A result set
        // containing both p2 and a descendant of p2 would be wrong.
        let table = two_parent_table();
        let result = auto_merge(&ids(&["a", "c", "d", "e"]), &table, 0.5);
        assert_eq!(result, ids(&["a", "p2"]));
        // Descendants of p2 are gone.
        assert!(!result.contains(&"c".to_string()));
    }

    #[test]
    fn test_unknown_ids_are_dropped() {
        let table = two_parent_table();
        let result = auto_merge(&ids(&["a", "phantom"]), &table, 0.5);
        assert_eq!(result, ids(&["a"]));
    }

    #[test]
    fn test_duplicate_ids_count_once() {
        let table = two_parent_table();
        // "c" twice plus "d" is still 2 distinct of 3 children.
        let result = auto_merge(&ids(&["c", "c", "d"]), &table, 0.5);
        assert_eq!(result, ids(&["p2"]));
        // But "c" alone, however often retrieved, is 1 of 3.
        let result = auto_merge(&ids(&["c", "c", "c"]), &table, 0.5);
        assert_eq!(result, ids(&["c"]));
    }

    #[test]
    fn test_deterministic_for_fixed_inputs() {
        let table = two_parent_table();
        let input = ids(&["e", "a", "d", "b"]);
        let first = auto_merge(&input, &table, 0.5);
        let second = auto_merge(&input, &table, 0.5);
        assert_eq!(first, second);
    }

    #[test]
    fn test_threshold_is_configurable() {
        let table = two_parent_table();
        // At threshold 0.0 any retrieved child promotes its parent, and
        // promotion cascades to the root.
        let result = auto_merge(&ids(&["a"]), &table, 0.0);
        assert_eq!(result, ids(&["root"]));
        // At threshold 1.0 nothing ever promotes.
        let result = auto_merge(&ids(&["c", "d", "e"]), &table, 1.0);
        assert_eq!(result, ids(&["c", "d", "e"]));
    }
}
