//! Agenda tree arena — pure structural logic for the hierarchical agenda
//!
//! Agendas form a forest per meeting via `parent_id` references with a cached
//! `level` (root = 0). All structural validation happens here, against an
//! id-indexed arena of the meeting's active nodes:
//! - cycle prevention (a node may never become its own ancestor)
//! - cross-meeting parent rejection
//! - eager level recomputation over the moved subtree
//!
//! The arena never touches the database; callers load the active node set,
//! ask for a plan, and persist the resulting row updates transactionally.

use std::collections::HashMap;

use crate::error::QuorumError;
use crate::models::AgendaNode;

/// The structural fields of one agenda row, detached from display data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeEntry {
    pub id: i64,
    pub meeting_id: i64,
    pub parent_id: Option<i64>,
    pub level: i32,
    pub order_num: i32,
}

impl From<&AgendaNode> for TreeEntry {
    fn from(node: &AgendaNode) -> Self {
        Self {
            id: node.id,
            meeting_id: node.meeting_id,
            parent_id: node.parent_id,
            level: node.level,
            order_num: node.order_num,
        }
    }
}

/// The validated outcome of a move: the node's new position plus the level
/// shift for every node in its subtree. Persisted as one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct MovePlan {
    pub node_id: i64,
    pub new_parent_id: Option<i64>,
    pub new_level: i32,
    pub new_order_num: i32,
    /// `(descendant_id, new_level)` for every descendant, empty when the
    /// node's own level is unchanged.
    pub descendant_levels: Vec<(i64, i32)>,
}

/// Id-indexed arena of one meeting's active (non-deleted) agenda nodes.
#[derive(Debug, Default)]
pub struct AgendaArena {
    nodes: HashMap<i64, TreeEntry>,
}

impl AgendaArena {
    pub fn from_entries(entries: impl IntoIterator<Item = TreeEntry>) -> Self {
        Self {
            nodes: entries.into_iter().map(|e| (e.id, e)).collect(),
        }
    }

    pub fn from_nodes(nodes: &[AgendaNode]) -> Self {
        Self::from_entries(nodes.iter().map(TreeEntry::from))
    }

    pub fn get(&self, id: i64) -> Option<&TreeEntry> {
        self.nodes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct children of `parent_id` (`None` = roots), sibling-ordered by
    /// `(order_num, id)` — order_num is not unique at storage level, so the
    /// id breaks ties for a stable sort.
    pub fn children_of(&self, parent_id: Option<i64>) -> Vec<i64> {
        let mut children: Vec<&TreeEntry> = self
            .nodes
            .values()
            .filter(|e| e.parent_id == parent_id)
            .collect();
        children.sort_by_key(|e| (e.order_num, e.id));
        children.iter().map(|e| e.id).collect()
    }

    /// Every node below `id`, computed by repeated id-indexed child lookups
    /// (explicit work queue — no recursion, no depth limit).
    pub fn descendants_of(&self, id: i64) -> Vec<i64> {
        let mut result = Vec::new();
        let mut queue = vec![id];
        while let Some(current) = queue.pop() {
            for child in self.children_of(Some(current)) {
                result.push(child);
                queue.push(child);
            }
        }
        result
    }

    pub fn is_descendant(&self, candidate_id: i64, ancestor_id: i64) -> bool {
        self.descendants_of(ancestor_id).contains(&candidate_id)
    }

    /// Next `order_num` among the active siblings under `parent_id`:
    /// `max + 1`, or 0 when the sibling set is empty.
    pub fn next_order_num(&self, parent_id: Option<i64>) -> i32 {
        self.nodes
            .values()
            .filter(|e| e.parent_id == parent_id)
            .map(|e| e.order_num)
            .max()
            .map(|m| m + 1)
            .unwrap_or(0)
    }

    /// Level a new child of `parent_id` would get; validates the parent
    /// exists and belongs to `meeting_id`.
    pub fn child_level(
        &self,
        meeting_id: i64,
        parent_id: Option<i64>,
    ) -> Result<i32, QuorumError> {
        match parent_id {
            None => Ok(0),
            Some(pid) => {
                let parent = self
                    .get(pid)
                    .ok_or_else(|| QuorumError::not_found(format!("agenda {pid}")))?;
                if parent.meeting_id != meeting_id {
                    return Err(QuorumError::invalid(
                        "Parent agenda must belong to the same meeting",
                    ));
                }
                Ok(parent.level + 1)
            }
        }
    }

    /// Validate and plan a structural move.
    ///
    /// Rejections: missing node or parent (NotFound), moving under itself or
    /// its own descendant (Invalid — would create a cycle), or a parent from
    /// another meeting (Invalid). The plan carries the recomputed level for
    /// the full subtree so a reader never observes a node with an updated
    /// level but stale descendant levels.
    pub fn plan_move(
        &self,
        node_id: i64,
        new_parent_id: Option<i64>,
        new_order_num: i32,
    ) -> Result<MovePlan, QuorumError> {
        let node = self
            .get(node_id)
            .ok_or_else(|| QuorumError::not_found(format!("agenda {node_id}")))?;

        let new_level = match new_parent_id {
            None => 0,
            Some(pid) => {
                let parent = self
                    .get(pid)
                    .ok_or_else(|| QuorumError::not_found(format!("agenda {pid}")))?;
                if pid == node_id || self.is_descendant(pid, node_id) {
                    return Err(QuorumError::invalid(
                        "Cannot move agenda to its own descendant",
                    ));
                }
                if parent.meeting_id != node.meeting_id {
                    return Err(QuorumError::invalid(
                        "Cannot move agenda to a different meeting",
                    ));
                }
                parent.level + 1
            }
        };

        let level_diff = new_level - node.level;
        let descendant_levels = if level_diff != 0 {
            self.descendants_of(node_id)
                .into_iter()
                .map(|id| (id, self.nodes[&id].level + level_diff))
                .collect()
        } else {
            Vec::new()
        };

        Ok(MovePlan {
            node_id,
            new_parent_id,
            new_level,
            new_order_num,
            descendant_levels,
        })
    }

    /// Apply a plan to the in-memory arena (mirrors what the store persists).
    pub fn apply_move(&mut self, plan: &MovePlan) {
        if let Some(node) = self.nodes.get_mut(&plan.node_id) {
            node.parent_id = plan.new_parent_id;
            node.level = plan.new_level;
            node.order_num = plan.new_order_num;
        }
        for (id, level) in &plan.descendant_levels {
            if let Some(node) = self.nodes.get_mut(id) {
                node.level = *level;
            }
        }
    }

    /// Depth of `id` obtained by walking the parent chain. Returns `None`
    /// for unknown ids or a broken/cyclic chain (walk bounded by arena size).
    pub fn walked_depth(&self, id: i64) -> Option<i32> {
        let mut depth = 0;
        let mut current = self.get(id)?;
        let mut hops = 0;
        while let Some(pid) = current.parent_id {
            current = self.get(pid)?;
            depth += 1;
            hops += 1;
            if hops > self.nodes.len() {
                return None;
            }
        }
        Some(depth)
    }
}

// ============================================================================
// TESTS
// ============================================================================
