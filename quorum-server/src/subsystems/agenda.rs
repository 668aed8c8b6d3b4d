//! Agenda store subsystem — the hierarchical agenda tree per meeting
//!
//! Persistence layer around `quorum_core::tree`:
//! - create/update/soft-delete with same-meeting parent validation
//! - `reorder` (bulk order_num) and `move` (validated reparenting with
//!   eager subtree level recomputation, persisted in one transaction)
//! - flat and nested listings; nested loading expands parent ids level by
//!   level with a work queue, so depth is unbounded
//! - oracle-generated discussion questions per agenda
//!
//! Every query filters `deleted_at IS NULL`; soft-deleting a node hides its
//! whole subtree from the listings. Concurrent moves from two operator
//! sessions are last-write-wins (single-operator-per-meeting usage).

use serde::Serialize;
use sqlx::PgPool;

use quorum_core::error::QuorumError;
use quorum_core::ipc::{AgendaPatch, ReorderItem};
use quorum_core::models::{AgendaNode, AgendaQuestion, Meeting};
use quorum_core::oracle::SummarizationOracle;
use quorum_core::outline::Outline;
use quorum_core::tree::AgendaArena;

/// Default number of questions generated per agenda.
const DEFAULT_QUESTION_COUNT: usize = 4;

const AGENDA_COLUMNS: &str = "id, meeting_id, parent_id, level, order_num, title, description, \
     status, started_at_seconds, time_segments, deleted_at, created_at";

// ============================================================================
// Lookups
// ============================================================================

pub async fn get_meeting(pool: &PgPool, meeting_id: i64) -> Result<Meeting, QuorumError> {
    sqlx::query_as::<_, Meeting>(
        "SELECT id, title, deleted_at, created_at FROM meetings \
         WHERE id = $1 AND deleted_at IS NULL",
    )
    .bind(meeting_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| QuorumError::not_found(format!("meeting {meeting_id}")))
}

pub async fn get_agenda(pool: &PgPool, agenda_id: i64) -> Result<AgendaNode, QuorumError> {
    sqlx::query_as::<_, AgendaNode>(&format!(
        "SELECT {AGENDA_COLUMNS} FROM agendas WHERE id = $1 AND deleted_at IS NULL"
    ))
    .bind(agenda_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| QuorumError::not_found(format!("agenda {agenda_id}")))
}

/// All active agendas of a meeting in tree order `(level, order_num, id)`.
pub async fn load_active(pool: &PgPool, meeting_id: i64) -> Result<Vec<AgendaNode>, QuorumError> {
    let nodes = sqlx::query_as::<_, AgendaNode>(&format!(
        "SELECT {AGENDA_COLUMNS} FROM agendas \
         WHERE meeting_id = $1 AND deleted_at IS NULL \
         ORDER BY level, order_num, id"
    ))
    .bind(meeting_id)
    .fetch_all(pool)
    .await?;
    Ok(nodes)
}

// ============================================================================
// Mutations
// ============================================================================

pub async fn create_agenda(
    pool: &PgPool,
    meeting_id: i64,
    title: &str,
    description: Option<&str>,
    parent_id: Option<i64>,
) -> Result<AgendaNode, QuorumError> {
    get_meeting(pool, meeting_id).await?;

    let level = match parent_id {
        None => 0,
        Some(pid) => {
            let parent = get_agenda(pool, pid).await?;
            if parent.meeting_id != meeting_id {
                return Err(QuorumError::invalid(
                    "Parent agenda must belong to the same meeting",
                ));
            }
            parent.level + 1
        }
    };

    let arena = AgendaArena::from_nodes(&load_active(pool, meeting_id).await?);
    let order_num = arena.next_order_num(parent_id);

    let node = sqlx::query_as::<_, AgendaNode>(&format!(
        "INSERT INTO agendas (meeting_id, parent_id, level, order_num, title, description, status) \
         VALUES ($1, $2, $3, $4, $5, $6, 'pending') \
         RETURNING {AGENDA_COLUMNS}"
    ))
    .bind(meeting_id)
    .bind(parent_id)
    .bind(level)
    .bind(order_num)
    .bind(title)
    .bind(description)
    .fetch_one(pool)
    .await?;

    tracing::info!(meeting_id, agenda_id = node.id, level, "Created agenda");
    Ok(node)
}

/// Apply a partial update to a fetched node. Only provided fields change.
/// A parent change through a patch skips cycle validation and level
/// recomputation; `move_agenda` is the checked path for structural moves.
fn apply_patch(node: &mut AgendaNode, patch: AgendaPatch) {
    if let Some(title) = patch.title {
        node.title = title;
    }
    if let Some(description) = patch.description {
        node.description = description;
    }
    if let Some(order_num) = patch.order_num {
        node.order_num = order_num;
    }
    if let Some(status) = patch.status {
        node.status = status;
    }
    if let Some(started_at_seconds) = patch.started_at_seconds {
        node.started_at_seconds = started_at_seconds;
    }
    if let Some(time_segments) = patch.time_segments {
        node.time_segments = sqlx::types::Json(time_segments);
    }
    if let Some(parent_id) = patch.parent_id {
        node.parent_id = parent_id;
    }
}

pub async fn update_agenda(
    pool: &PgPool,
    agenda_id: i64,
    patch: AgendaPatch,
) -> Result<AgendaNode, QuorumError> {
    let mut node = get_agenda(pool, agenda_id).await?;
    apply_patch(&mut node, patch);

    let node = sqlx::query_as::<_, AgendaNode>(&format!(
        "UPDATE agendas SET parent_id = $1, order_num = $2, title = $3, description = $4, \
         status = $5, started_at_seconds = $6, time_segments = $7 \
         WHERE id = $8 \
         RETURNING {AGENDA_COLUMNS}"
    ))
    .bind(node.parent_id)
    .bind(node.order_num)
    .bind(&node.title)
    .bind(&node.description)
    .bind(node.status)
    .bind(node.started_at_seconds)
    .bind(&node.time_segments)
    .bind(agenda_id)
    .fetch_one(pool)
    .await?;

    Ok(node)
}

/// Soft delete: the row stays, the subtree disappears from tree listings.
pub async fn delete_agenda(pool: &PgPool, agenda_id: i64) -> Result<(), QuorumError> {
    get_agenda(pool, agenda_id).await?;

    sqlx::query("UPDATE agendas SET deleted_at = now() WHERE id = $1")
        .bind(agenda_id)
        .execute(pool)
        .await?;

    tracing::info!(agenda_id, "Soft-deleted agenda");
    Ok(())
}

/// Bulk order_num update scoped to one meeting. Ids outside the meeting (or
/// soft-deleted) are silently skipped; returns the number of rows actually
/// updated. Does not touch `parent_id` or `level`.
pub async fn reorder_agendas(
    pool: &PgPool,
    meeting_id: i64,
    items: &[ReorderItem],
) -> Result<u64, QuorumError> {
    get_meeting(pool, meeting_id).await?;

    let mut updated = 0u64;
    for item in items {
        let result = sqlx::query(
            "UPDATE agendas SET order_num = $1 \
             WHERE id = $2 AND meeting_id = $3 AND deleted_at IS NULL",
        )
        .bind(item.order_num)
        .bind(item.id)
        .bind(meeting_id)
        .execute(pool)
        .await?;
        updated += result.rows_affected();
    }

    Ok(updated)
}

/// Validated structural move. The arena of the meeting's active nodes plans
/// the reparenting (cycle/cross-meeting rejection, subtree level shift); the
/// plan is persisted in one transaction so a reader never sees the moved node
/// with stale descendant levels.
pub async fn move_agenda(
    pool: &PgPool,
    agenda_id: i64,
    new_parent_id: Option<i64>,
    new_order_num: i32,
) -> Result<AgendaNode, QuorumError> {
    let node = get_agenda(pool, agenda_id).await?;

    if let Some(pid) = new_parent_id {
        let parent = get_agenda(pool, pid).await?;
        if parent.meeting_id != node.meeting_id {
            return Err(QuorumError::invalid(
                "Cannot move agenda to a different meeting",
            ));
        }
    }

    let nodes = load_active(pool, node.meeting_id).await?;
    let plan = AgendaArena::from_nodes(&nodes).plan_move(agenda_id, new_parent_id, new_order_num)?;

    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE agendas SET parent_id = $1, level = $2, order_num = $3 WHERE id = $4")
        .bind(plan.new_parent_id)
        .bind(plan.new_level)
        .bind(plan.new_order_num)
        .bind(plan.node_id)
        .execute(&mut *tx)
        .await?;

    for (descendant_id, level) in &plan.descendant_levels {
        sqlx::query("UPDATE agendas SET level = $1 WHERE id = $2")
            .bind(level)
            .bind(descendant_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    tracing::info!(
        agenda_id,
        new_parent_id = ?plan.new_parent_id,
        new_level = plan.new_level,
        descendants = plan.descendant_levels.len(),
        "Moved agenda"
    );

    get_agenda(pool, agenda_id).await
}

// ============================================================================
// Listings
// ============================================================================

/// One node of the nested listing.
#[derive(Debug, Serialize)]
pub struct AgendaTreeNode {
    #[serde(flatten)]
    pub node: AgendaNode,
    pub children: Vec<AgendaTreeNode>,
}

/// Nest a flat active-node set into root-first trees, sibling-ordered by
/// `(order_num, id)`. Children of missing (deleted) parents are unreachable.
pub fn assemble_tree(nodes: Vec<AgendaNode>) -> Vec<AgendaTreeNode> {
    use std::collections::HashMap;

    let mut by_parent: HashMap<Option<i64>, Vec<AgendaNode>> = HashMap::new();
    for node in nodes {
        by_parent.entry(node.parent_id).or_default().push(node);
    }
    for children in by_parent.values_mut() {
        children.sort_by_key(|n| (n.order_num, n.id));
    }

    fn attach(
        parent_id: Option<i64>,
        by_parent: &mut HashMap<Option<i64>, Vec<AgendaNode>>,
    ) -> Vec<AgendaTreeNode> {
        let nodes = by_parent.remove(&parent_id).unwrap_or_default();
        nodes
            .into_iter()
            .map(|node| {
                let children = attach(Some(node.id), by_parent);
                AgendaTreeNode { node, children }
            })
            .collect()
    }

    attach(None, &mut by_parent)
}

pub async fn list_flat(pool: &PgPool, meeting_id: i64) -> Result<Vec<AgendaNode>, QuorumError> {
    get_meeting(pool, meeting_id).await?;
    load_active(pool, meeting_id).await
}

/// Nested listing. Rows are fetched breadth-first — roots, then children of
/// the collected ids, repeating until a level comes back empty — so the
/// nesting depth is unbounded rather than capped at a fixed eager-load depth.
pub async fn list_tree(
    pool: &PgPool,
    meeting_id: i64,
) -> Result<Vec<AgendaTreeNode>, QuorumError> {
    get_meeting(pool, meeting_id).await?;

    let mut collected: Vec<AgendaNode> = sqlx::query_as::<_, AgendaNode>(&format!(
        "SELECT {AGENDA_COLUMNS} FROM agendas \
         WHERE meeting_id = $1 AND parent_id IS NULL AND deleted_at IS NULL \
         ORDER BY order_num, id"
    ))
    .bind(meeting_id)
    .fetch_all(pool)
    .await?;

    let mut frontier: Vec<i64> = collected.iter().map(|n| n.id).collect();
    while !frontier.is_empty() {
        let children: Vec<AgendaNode> = sqlx::query_as::<_, AgendaNode>(&format!(
            "SELECT {AGENDA_COLUMNS} FROM agendas \
             WHERE parent_id = ANY($1) AND deleted_at IS NULL \
             ORDER BY parent_id, order_num, id"
        ))
        .bind(&frontier)
        .fetch_all(pool)
        .await?;

        frontier = children.iter().map(|n| n.id).collect();
        collected.extend(children);
    }

    Ok(assemble_tree(collected))
}

/// One row of the rendered outline.
#[derive(Debug, Serialize)]
pub struct OutlineEntry {
    pub agenda_id: i64,
    pub label: String,
    pub title: String,
}

/// Dotted order labels for every active node, in display order.
pub async fn render_outline(
    pool: &PgPool,
    meeting_id: i64,
) -> Result<Vec<OutlineEntry>, QuorumError> {
    let nodes = list_flat(pool, meeting_id).await?;
    let outline = Outline::build(&nodes);

    let mut entries: Vec<OutlineEntry> = nodes
        .iter()
        .map(|n| OutlineEntry {
            agenda_id: n.id,
            label: outline.label(n.id).to_string(),
            title: n.title.clone(),
        })
        .collect();
    entries.sort_by_key(|e| Outline::sort_key(&e.label));
    Ok(entries)
}

// ============================================================================
// Questions
// ============================================================================

pub async fn list_questions(
    pool: &PgPool,
    agenda_id: i64,
) -> Result<Vec<AgendaQuestion>, QuorumError> {
    get_agenda(pool, agenda_id).await?;

    let questions = sqlx::query_as::<_, AgendaQuestion>(
        "SELECT id, agenda_id, question, order_num, is_generated, answered \
         FROM agenda_questions WHERE agenda_id = $1 ORDER BY order_num, id",
    )
    .bind(agenda_id)
    .fetch_all(pool)
    .await?;
    Ok(questions)
}

/// Ask the oracle for discussion questions and persist them after the
/// existing ones. Oracle failures propagate — question generation is an
/// explicit operator action, not a background enrichment.
pub async fn generate_questions(
    pool: &PgPool,
    oracle: &dyn SummarizationOracle,
    agenda_id: i64,
    count: Option<usize>,
) -> Result<Vec<AgendaQuestion>, QuorumError> {
    let node = get_agenda(pool, agenda_id).await?;
    let count = count.unwrap_or(DEFAULT_QUESTION_COUNT);

    let generated = oracle
        .agenda_questions(&node.title, node.description.as_deref(), count)
        .await?;

    let (next_order,): (i32,) = sqlx::query_as(
        "SELECT COALESCE(MAX(order_num), -1) + 1 FROM agenda_questions WHERE agenda_id = $1",
    )
    .bind(agenda_id)
    .fetch_one(pool)
    .await?;

    let mut tx = pool.begin().await?;
    let mut inserted = Vec::with_capacity(generated.len());
    for (offset, question) in generated.iter().enumerate() {
        let row = sqlx::query_as::<_, AgendaQuestion>(
            "INSERT INTO agenda_questions (agenda_id, question, order_num, is_generated, answered) \
             VALUES ($1, $2, $3, true, false) \
             RETURNING id, agenda_id, question, order_num, is_generated, answered",
        )
        .bind(agenda_id)
        .bind(question)
        .bind(next_order + offset as i32)
        .fetch_one(&mut *tx)
        .await?;
        inserted.push(row);
    }
    tx.commit().await?;

    tracing::info!(agenda_id, count = inserted.len(), "Generated agenda questions");
    Ok(inserted)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use quorum_core::models::{AgendaStatus, TimeRange};
    use sqlx::types::Json;

    fn node(id: i64, parent_id: Option<i64>, level: i32, order_num: i32) -> AgendaNode {
        AgendaNode {
            id,
            meeting_id: 1,
            parent_id,
            level,
            order_num,
            title: format!("agenda {id}"),
            description: None,
            status: AgendaStatus::Pending,
            started_at_seconds: None,
            time_segments: Json(vec![]),
            deleted_at: None,
            created_at: Utc::now(),
        }
    }

    // ========================================================================
    // TEST 1: patch applies only the provided fields
    // ========================================================================
    #[test]
    fn test_apply_patch_partial() {
        let mut n = node(1, None, 0, 0);
        n.description = Some("keep me".to_string());

        apply_patch(
            &mut n,
            AgendaPatch {
                title: Some("renamed".to_string()),
                status: Some(AgendaStatus::Completed),
                ..Default::default()
            },
        );

        assert_eq!(n.title, "renamed");
        assert_eq!(n.status, AgendaStatus::Completed);
        assert_eq!(n.description.as_deref(), Some("keep me"));
        assert_eq!(n.order_num, 0);
    }

    // ========================================================================
    // TEST 2: double-option fields distinguish "absent" from "set to null"
    // ========================================================================
    #[test]
    fn test_apply_patch_double_option() {
        let mut n = node(1, Some(7), 1, 0);
        n.started_at_seconds = Some(30);

        // Absent: untouched.
        apply_patch(&mut n, AgendaPatch::default());
        assert_eq!(n.parent_id, Some(7));
        assert_eq!(n.started_at_seconds, Some(30));

        // Explicit null: cleared.
        apply_patch(
            &mut n,
            AgendaPatch {
                parent_id: Some(None),
                started_at_seconds: Some(None),
                ..Default::default()
            },
        );
        assert_eq!(n.parent_id, None);
        assert_eq!(n.started_at_seconds, None);
    }

    // ========================================================================
    // TEST 3: patch replaces the whole time_segments list
    // ========================================================================
    #[test]
    fn test_apply_patch_time_segments() {
        let mut n = node(1, None, 0, 0);
        n.time_segments = Json(vec![TimeRange::new(0, Some(10))]);

        apply_patch(
            &mut n,
            AgendaPatch {
                time_segments: Some(vec![TimeRange::new(20, None)]),
                ..Default::default()
            },
        );
        assert_eq!(n.time_segments.0, vec![TimeRange::new(20, None)]);
    }

    // ========================================================================
    // TEST 4: tree assembly nests children under parents in sibling order
    // ========================================================================
    #[test]
    fn test_assemble_tree_nesting() {
        let nodes = vec![
            node(1, None, 0, 0),
            node(2, None, 0, 1),
            node(3, Some(1), 1, 1),
            node(4, Some(1), 1, 0),
            node(5, Some(4), 2, 0),
        ];
        let tree = assemble_tree(nodes);

        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].node.id, 1);
        assert_eq!(tree[1].node.id, 2);
        // Children of 1 sorted by order_num: 4 then 3.
        let child_ids: Vec<i64> = tree[0].children.iter().map(|c| c.node.id).collect();
        assert_eq!(child_ids, vec![4, 3]);
        assert_eq!(tree[0].children[0].children[0].node.id, 5);
        assert!(tree[1].children.is_empty());
    }

    // ========================================================================
    // TEST 5: children of a missing parent never surface in the tree
    // ========================================================================
    #[test]
    fn test_assemble_tree_orphans_hidden() {
        // Parent 9 is not in the active set (soft-deleted); its child must
        // not be reachable from the roots.
        let nodes = vec![node(1, None, 0, 0), node(2, Some(9), 1, 0)];
        let tree = assemble_tree(nodes);

        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].node.id, 1);
        assert!(tree[0].children.is_empty());
    }

    // ========================================================================
    // TEST 6: deep chains nest without a depth cap
    // ========================================================================
    #[test]
    fn test_assemble_tree_unbounded_depth() {
        let mut nodes = vec![node(0, None, 0, 0)];
        for id in 1..8 {
            nodes.push(node(id, Some(id - 1), id as i32, 0));
        }
        let tree = assemble_tree(nodes);

        let mut depth = 0;
        let mut cursor = &tree[0];
        while let Some(child) = cursor.children.first() {
            cursor = child;
            depth += 1;
        }
        assert_eq!(depth, 7);
    }
}
