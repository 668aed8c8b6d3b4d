//! Segment-to-agenda timeline mapping
//!
//! Transcript segments carry their own timestamps; agenda nodes carry zero or
//! more attributed `time_segments` ranges (or a legacy single
//! `started_at_seconds` stamp). This module decides which node owns a given
//! instant:
//! - **start-based** (`owner_at`) — used by live mismatch detection; tests the
//!   segment's start against each node's ranges, first match in tree order wins
//! - **midpoint-based** (`segments_for`) — used by per-agenda summarization;
//!   more lenient on a speaker starting a sentence just before/after the
//!   operator clicks over to the next agenda item
//!
//! Overlapping ranges between nodes are not forbidden by the data model; the
//! first node encountered in tree order `(level, order_num, id)` wins.

use crate::models::{AgendaNode, Transcript, TranscriptSegment};

/// One transcript segment in the meeting-wide flattened view. The flattening
/// is read-time only — `global_index` is the segment's position in
/// per-transcript concatenation order, which is how callers address segments
/// for analysis and reassignment.
#[derive(Debug, Clone)]
pub struct FlatSegment {
    pub transcript_id: i64,
    /// Index within the owning transcript's `segments` array.
    pub local_index: usize,
    /// Index within the meeting-wide concatenation.
    pub global_index: usize,
    pub segment: TranscriptSegment,
}

/// Flatten a meeting's transcripts into the global segment view,
/// preserving per-transcript storage order.
pub fn flatten_segments(transcripts: &[Transcript]) -> Vec<FlatSegment> {
    let mut flat = Vec::new();
    for transcript in transcripts {
        for (local_index, segment) in transcript.segments.0.iter().enumerate() {
            flat.push(FlatSegment {
                transcript_id: transcript.id,
                local_index,
                global_index: flat.len(),
                segment: segment.clone(),
            });
        }
    }
    flat
}

/// Sort nodes into tree order: `(level, order_num, id)`. This is the
/// iteration order for first-match-wins ownership tests.
pub fn sort_tree_order(nodes: &mut [AgendaNode]) {
    nodes.sort_by_key(|n| (n.level, n.order_num, n.id));
}

/// End boundary for a legacy single-timestamp node: the next
/// chronologically-started node's stamp, or infinity for the last one.
fn legacy_end(nodes: &[AgendaNode], node: &AgendaNode) -> f64 {
    let stamp = match node.started_at_seconds {
        Some(s) => s,
        None => return f64::INFINITY,
    };
    let mut stamped: Vec<(i64, i64)> = nodes
        .iter()
        .filter_map(|n| n.started_at_seconds.map(|s| (s, n.id)))
        .collect();
    stamped.sort();
    stamped
        .iter()
        .position(|&(s, id)| s == stamp && id == node.id)
        .and_then(|idx| stamped.get(idx + 1))
        .map(|&(s, _)| s as f64)
        .unwrap_or(f64::INFINITY)
}

/// Does `node` own instant `t`? Explicit ranges take priority; a node with
/// no ranges falls back to its legacy stamp, bounded by the next stamped node.
fn owns_instant(node: &AgendaNode, nodes: &[AgendaNode], t: f64) -> bool {
    if !node.time_segments.0.is_empty() {
        return node.time_segments.0.iter().any(|range| range.contains(t));
    }
    match node.started_at_seconds {
        Some(stamp) => (stamp as f64) <= t && t < legacy_end(nodes, node),
        None => false,
    }
}

/// Resolve the owner of instant `t` among `nodes` (which must already be in
/// tree order — see [`sort_tree_order`]). First matching node wins; `None`
/// means the instant is unowned.
pub fn owner_at<'a>(nodes: &'a [AgendaNode], t: f64) -> Option<&'a AgendaNode> {
    nodes.iter().find(|node| owns_instant(node, nodes, t))
}

/// Midpoint-based per-agenda collection for summarization: the indices into
/// `segments` whose midpoint falls inside one of `node`'s ranges (or its
/// legacy window). Nodes are tested independently, so overlapping ranges may
/// attribute one segment to several nodes — the summary feed tolerates that.
pub fn segments_for(
    node: &AgendaNode,
    nodes: &[AgendaNode],
    segments: &[FlatSegment],
) -> Vec<usize> {
    segments
        .iter()
        .enumerate()
        .filter(|(_, flat)| {
            !flat.segment.text.is_empty() && owns_instant(node, nodes, flat.segment.midpoint())
        })
        .map(|(idx, _)| idx)
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AgendaStatus, TimeRange};
    use chrono::Utc;
    use sqlx::types::Json;

    fn node(id: i64, ranges: Vec<TimeRange>, legacy: Option<i64>) -> AgendaNode {
        AgendaNode {
            id,
            meeting_id: 1,
            parent_id: None,
            level: 0,
            order_num: id as i32,
            title: format!("agenda {id}"),
            description: None,
            status: AgendaStatus::Pending,
            started_at_seconds: legacy,
            time_segments: Json(ranges),
            deleted_at: None,
            created_at: Utc::now(),
        }
    }

    fn seg(start: f64, end: Option<f64>, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            start,
            end,
            text: text.to_string(),
            speaker: None,
            confidence: None,
            matched_agenda_id: None,
            suggested_agenda_id: None,
            suggestion_accepted: None,
        }
    }

    fn transcript(id: i64, segments: Vec<TranscriptSegment>) -> Transcript {
        Transcript {
            id,
            meeting_id: 1,
            segments: Json(segments),
            created_at: Utc::now(),
        }
    }

    // ========================================================================
    // TEST 1: the two-agenda scenario — [0,60) then [60,∞)
    // ========================================================================
    #[test]
    fn test_owner_at_explicit_ranges() {
        let nodes = vec![
            node(1, vec![TimeRange::new(0, Some(60))], None),
            node(2, vec![TimeRange::new(60, None)], None),
        ];

        assert_eq!(owner_at(&nodes, 30.0).map(|n| n.id), Some(1));
        assert_eq!(owner_at(&nodes, 90.0).map(|n| n.id), Some(2));
        // Half-open boundary: second 60 already belongs to agenda 2.
        assert_eq!(owner_at(&nodes, 60.0).map(|n| n.id), Some(2));
        assert_eq!(owner_at(&nodes, 59.999).map(|n| n.id), Some(1));
    }

    // ========================================================================
    // TEST 2: open-ended range extends to infinity
    // ========================================================================
    #[test]
    fn test_owner_at_open_ended() {
        let nodes = vec![node(1, vec![TimeRange::new(120, None)], None)];
        assert_eq!(owner_at(&nodes, 1e9).map(|n| n.id), Some(1));
        assert!(owner_at(&nodes, 119.0).is_none());
    }

    // ========================================================================
    // TEST 3: legacy stamps are bounded by the next stamped node
    // ========================================================================
    #[test]
    fn test_legacy_fallback_bounded() {
        let nodes = vec![
            node(1, vec![], Some(0)),
            node(2, vec![], Some(100)),
            node(3, vec![], None),
        ];

        assert_eq!(owner_at(&nodes, 50.0).map(|n| n.id), Some(1));
        assert_eq!(owner_at(&nodes, 100.0).map(|n| n.id), Some(2));
        // Last stamped node is open-ended.
        assert_eq!(owner_at(&nodes, 5000.0).map(|n| n.id), Some(2));
        // A node with neither ranges nor a stamp never owns anything.
        assert!(owner_at(&nodes, 50.0).map(|n| n.id) != Some(3));
    }

    // ========================================================================
    // TEST 4: explicit ranges win over an earlier node's legacy window
    // ========================================================================
    #[test]
    fn test_ranges_and_legacy_mixed() {
        // Node 1 has an explicit range, node 2 only a stamp.
        let nodes = vec![
            node(1, vec![TimeRange::new(0, Some(30))], None),
            node(2, vec![], Some(10)),
        ];
        // Inside node 1's range: node 1 wins even though node 2's window covers it.
        assert_eq!(owner_at(&nodes, 20.0).map(|n| n.id), Some(1));
        // Past node 1's range, node 2's open legacy window owns it.
        assert_eq!(owner_at(&nodes, 40.0).map(|n| n.id), Some(2));
    }

    // ========================================================================
    // TEST 5: overlapping ranges — first node in tree order wins
    // ========================================================================
    #[test]
    fn test_overlap_first_match_wins() {
        let nodes = vec![
            node(1, vec![TimeRange::new(0, Some(100))], None),
            node(2, vec![TimeRange::new(50, Some(150))], None),
        ];
        assert_eq!(owner_at(&nodes, 75.0).map(|n| n.id), Some(1));
        assert_eq!(owner_at(&nodes, 120.0).map(|n| n.id), Some(2));
    }

    // ========================================================================
    // TEST 6: mapping is deterministic — re-running yields identical owners
    // ========================================================================
    #[test]
    fn test_mapping_idempotent() {
        let nodes = vec![
            node(1, vec![TimeRange::new(0, Some(60))], None),
            node(2, vec![TimeRange::new(60, Some(200)), TimeRange::new(300, None)], None),
        ];
        let instants = [0.0, 59.0, 60.0, 150.0, 250.0, 350.0];
        let first: Vec<Option<i64>> = instants
            .iter()
            .map(|&t| owner_at(&nodes, t).map(|n| n.id))
            .collect();
        let second: Vec<Option<i64>> = instants
            .iter()
            .map(|&t| owner_at(&nodes, t).map(|n| n.id))
            .collect();
        assert_eq!(first, second);
        assert_eq!(first, vec![Some(1), Some(1), Some(2), Some(2), None, Some(2)]);
    }

    // ========================================================================
    // TEST 7: flattening preserves per-transcript order and global indices
    // ========================================================================
    #[test]
    fn test_flatten_global_index() {
        let transcripts = vec![
            transcript(10, vec![seg(0.0, Some(5.0), "a"), seg(5.0, Some(9.0), "b")]),
            transcript(11, vec![seg(9.0, Some(12.0), "c")]),
        ];
        let flat = flatten_segments(&transcripts);
        assert_eq!(flat.len(), 3);
        assert_eq!(
            flat.iter()
                .map(|f| (f.global_index, f.transcript_id, f.local_index))
                .collect::<Vec<_>>(),
            vec![(0, 10, 0), (1, 10, 1), (2, 11, 0)]
        );
        assert_eq!(flat[2].segment.text, "c");
    }

    // ========================================================================
    // TEST 8: midpoint variant tolerates a segment straddling the boundary
    // ========================================================================
    #[test]
    fn test_midpoint_leniency() {
        let a1 = node(1, vec![TimeRange::new(0, Some(60))], None);
        let a2 = node(2, vec![TimeRange::new(60, None)], None);
        let nodes = vec![a1.clone(), a2.clone()];

        // Starts at 58 but mostly spoken after the switch: midpoint 63.
        let transcripts = vec![transcript(1, vec![seg(58.0, Some(68.0), "straddler")])];
        let flat = flatten_segments(&transcripts);

        // Start-based test says agenda 1...
        assert_eq!(owner_at(&nodes, flat[0].segment.start).map(|n| n.id), Some(1));
        // ...midpoint collection hands it to agenda 2.
        assert!(segments_for(&a1, &nodes, &flat).is_empty());
        assert_eq!(segments_for(&a2, &nodes, &flat), vec![0]);
    }

    // ========================================================================
    // TEST 9: multi-range node collects a revisited topic
    // ========================================================================
    #[test]
    fn test_segments_for_multi_range() {
        let revisited = node(
            1,
            vec![TimeRange::new(0, Some(30)), TimeRange::new(90, Some(120))],
            None,
        );
        let other = node(2, vec![TimeRange::new(30, Some(90))], None);
        let nodes = vec![revisited.clone(), other];

        let transcripts = vec![transcript(
            1,
            vec![
                seg(5.0, Some(10.0), "first pass"),
                seg(40.0, Some(50.0), "other topic"),
                seg(100.0, Some(110.0), "back again"),
                seg(101.0, Some(102.0), ""),
            ],
        )];
        let flat = flatten_segments(&transcripts);

        // Empty-text segments are excluded from the summary feed.
        assert_eq!(segments_for(&revisited, &nodes, &flat), vec![0, 2]);
    }

    // ========================================================================
    // TEST 10: unowned instants map to no agenda
    // ========================================================================
    #[test]
    fn test_unowned_instant() {
        let nodes = vec![node(1, vec![TimeRange::new(100, Some(200))], None)];
        assert!(owner_at(&nodes, 50.0).is_none());
        assert!(owner_at(&[], 50.0).is_none());
    }

    // ========================================================================
    // TEST 11: tree-order sort is (level, order_num, id)
    // ========================================================================
    #[test]
    fn test_sort_tree_order() {
        let mut nodes = vec![
            node(3, vec![], None),
            node(1, vec![], None),
            node(2, vec![], None),
        ];
        nodes[0].level = 1;
        nodes[1].order_num = 5;
        nodes[2].order_num = 5;
        nodes[1].id = 9; // order tie with node 2's order_num=5 — id breaks it

        sort_tree_order(&mut nodes);
        assert_eq!(
            nodes.iter().map(|n| n.id).collect::<Vec<_>>(),
            vec![2, 9, 3]
        );
    }
}
