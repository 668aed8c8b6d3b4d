//! Hierarchical order labels for summary display
//!
//! Stored `order_num` is zero-based and per-parent; summaries display a
//! 1-based dotted convention ("2", "2.1", "2.1.3"). Labels are recomputed on
//! every render and never persisted.
//!
//! Convention: roots are labeled by their 1-based rank among siblings sorted
//! by `(order_num, id)` — not by raw `order_num` (the storage value may have
//! gaps after reorders).

use std::collections::HashMap;

use crate::models::AgendaNode;

/// Label assigned to nodes with no computed position (orphaned, or deeper
/// than the three rendered levels).
pub const UNRANKED_LABEL: &str = "0";

#[derive(Debug, Clone)]
pub struct Outline {
    labels: HashMap<i64, String>,
}

impl Outline {
    /// Compute labels for the active nodes of one meeting. Renders roots,
    /// children, and grandchildren; anything deeper keeps [`UNRANKED_LABEL`].
    pub fn build(nodes: &[AgendaNode]) -> Self {
        let mut labels = HashMap::new();

        let mut roots: Vec<&AgendaNode> = nodes.iter().filter(|n| n.is_root()).collect();
        roots.sort_by_key(|n| (n.order_num, n.id));

        for (root_rank, root) in roots.iter().enumerate() {
            let root_label = (root_rank + 1).to_string();

            let mut children: Vec<&AgendaNode> =
                nodes.iter().filter(|n| n.parent_id == Some(root.id)).collect();
            children.sort_by_key(|n| (n.order_num, n.id));

            for (child_rank, child) in children.iter().enumerate() {
                let child_label = format!("{}.{}", root_label, child_rank + 1);

                let mut grandchildren: Vec<&AgendaNode> = nodes
                    .iter()
                    .filter(|n| n.parent_id == Some(child.id))
                    .collect();
                grandchildren.sort_by_key(|n| (n.order_num, n.id));

                for (gc_rank, gc) in grandchildren.iter().enumerate() {
                    labels.insert(gc.id, format!("{}.{}", child_label, gc_rank + 1));
                }
                labels.insert(child.id, child_label);
            }
            labels.insert(root.id, root_label);
        }

        Self { labels }
    }

    pub fn label(&self, id: i64) -> &str {
        self.labels.get(&id).map(String::as_str).unwrap_or(UNRANKED_LABEL)
    }

    /// Numeric sort key for display ordering ("1.10" after "1.2").
    pub fn sort_key(label: &str) -> Vec<i64> {
        label.split('.').filter_map(|part| part.parse().ok()).collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================
