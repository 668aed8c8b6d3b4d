//! Mismatch analyzer subsystem — oracle-backed review of segment attribution
//!
//! Flattens a meeting's transcript segments, resolves each one's current
//! agenda through the start-based timeline mapper, and asks the
//! summarization oracle — in a single batched round-trip — whether each
//! attribution looks right. Verdicts below the confidence gate, self-matches,
//! and matched-correctly verdicts are discarded; the survivors become
//! suggestions, persisted onto the segments and returned to the caller.
//!
//! This is a best-effort enrichment: any oracle failure degrades to an
//! empty-suggestions report with an error string instead of failing the
//! request. Nothing is written until the full batch reply has parsed, so a
//! failed run never leaves partially-written suggestions.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use quorum_core::config::AnalysisConfig;
use quorum_core::error::QuorumError;
use quorum_core::models::AgendaNode;
use quorum_core::oracle::{
    AgendaCandidate, OracleError, SegmentForReview, SegmentVerdict, SummarizationOracle,
};
use quorum_core::timeline::{self, FlatSegment};

use super::{agenda, transcripts};

/// Filler/meta utterances skipped regardless of length: acknowledgements,
/// hesitations, and bare meta words like "again" / "end".
fn filler_pattern() -> &'static Regex {
    static FILLER: OnceLock<Regex> = OnceLock::new();
    FILLER.get_or_init(|| {
        Regex::new(r"(?i)^(yes|yeah|no|ok(ay)?|right|sure|again|end|done|u+h+m*|m+h*m+)[.!?]*$")
            .expect("filler pattern must compile")
    })
}

/// One proposed re-attribution, preview-truncated for display.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentSuggestion {
    pub segment_index: usize,
    pub segment_text: String,
    pub current_agenda_id: Option<i64>,
    pub current_agenda_title: Option<String>,
    pub suggested_agenda_id: i64,
    /// `None` when the oracle suggested an id outside the candidate list;
    /// the suggestion is still recorded and re-validated on move.
    pub suggested_agenda_title: Option<String>,
    pub confidence: f64,
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct AnalysisReport {
    pub analysis_id: Uuid,
    pub total_segments: usize,
    pub analyzed: usize,
    pub mismatches_found: usize,
    pub suggestions: Vec<SegmentSuggestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisReport {
    fn empty(analysis_id: Uuid, total_segments: usize) -> Self {
        Self {
            analysis_id,
            total_segments,
            analyzed: 0,
            mismatches_found: 0,
            suggestions: Vec::new(),
            error: None,
        }
    }

    fn degraded(analysis_id: Uuid, total_segments: usize, analyzed: usize, error: String) -> Self {
        Self {
            analysis_id,
            total_segments,
            analyzed,
            mismatches_found: 0,
            suggestions: Vec::new(),
            error: Some(error),
        }
    }
}

/// Segments excluded from analysis: too short to be meaningful, or a filler
/// utterance.
fn should_skip(text: &str, min_chars: usize) -> bool {
    let text = text.trim();
    text.chars().count() < min_chars || filler_pattern().is_match(text)
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{truncated}...")
    } else {
        text.to_string()
    }
}

/// One flattened segment selected for the oracle batch, carrying its storage
/// address for the post-parse suggestion write-back.
#[derive(Debug, Clone)]
struct BatchEntry {
    global_index: usize,
    transcript_id: i64,
    local_index: usize,
    text: String,
    current_agenda_id: Option<i64>,
    current_agenda_title: Option<String>,
}

/// Select the segments worth analyzing and resolve their current owners.
fn build_batch(
    flat: &[FlatSegment],
    nodes: &[AgendaNode],
    force_reanalyze: bool,
    min_chars: usize,
) -> Vec<BatchEntry> {
    let mut batch = Vec::new();
    for entry in flat {
        // Already flagged and the caller did not ask to re-ask.
        if !force_reanalyze && entry.segment.suggested_agenda_id.is_some() {
            continue;
        }
        if should_skip(&entry.segment.text, min_chars) {
            continue;
        }

        let owner = timeline::owner_at(nodes, entry.segment.start);
        batch.push(BatchEntry {
            global_index: entry.global_index,
            transcript_id: entry.transcript_id,
            local_index: entry.local_index,
            text: entry.segment.text.clone(),
            current_agenda_id: owner.map(|n| n.id),
            current_agenda_title: owner.map(|n| n.title.clone()),
        });
    }
    batch
}

/// Turn oracle verdicts into recorded suggestions. A verdict survives only
/// when the oracle says not-matched, names a target, clears the confidence
/// gate, and the target differs from the current owner.
fn select_suggestions(
    verdicts: &[SegmentVerdict],
    batch: &[BatchEntry],
    titles: &HashMap<i64, String>,
    config: &AnalysisConfig,
) -> Vec<SegmentSuggestion> {
    let by_index: HashMap<usize, &BatchEntry> =
        batch.iter().map(|e| (e.global_index, e)).collect();

    let mut suggestions = Vec::new();
    for verdict in verdicts {
        let Some(entry) = by_index.get(&verdict.index) else {
            continue;
        };
        if verdict.is_matched_correctly {
            continue;
        }
        let Some(suggested_id) = verdict.suggested_agenda_id else {
            continue;
        };
        if verdict.confidence < config.min_confidence {
            continue;
        }
        // Self-match: proposing the owner it already has is not a mismatch.
        if entry.current_agenda_id == Some(suggested_id) {
            continue;
        }

        suggestions.push(SegmentSuggestion {
            segment_index: entry.global_index,
            segment_text: preview(&entry.text, config.preview_chars),
            current_agenda_id: entry.current_agenda_id,
            current_agenda_title: entry.current_agenda_title.clone(),
            suggested_agenda_id: suggested_id,
            suggested_agenda_title: titles.get(&suggested_id).cloned(),
            confidence: verdict.confidence,
            reason: verdict.reason.clone(),
        });
    }
    suggestions
}

/// Analyze every transcript segment of a meeting for agenda mismatches.
pub async fn analyze_segments(
    pool: &PgPool,
    oracle: &dyn SummarizationOracle,
    config: &AnalysisConfig,
    meeting_id: i64,
    force_reanalyze: bool,
) -> Result<AnalysisReport, QuorumError> {
    let analysis_id = Uuid::new_v4();

    agenda::get_meeting(pool, meeting_id).await?;
    let nodes = agenda::load_active(pool, meeting_id).await?;
    let transcript_rows = transcripts::load_transcripts(pool, meeting_id).await?;

    let flat = timeline::flatten_segments(&transcript_rows);
    if flat.is_empty() {
        return Ok(AnalysisReport::empty(analysis_id, 0));
    }

    let batch = build_batch(&flat, &nodes, force_reanalyze, config.min_text_chars);
    if batch.is_empty() {
        return Ok(AnalysisReport::empty(analysis_id, flat.len()));
    }

    let candidates: Vec<AgendaCandidate> = nodes
        .iter()
        .map(|n| AgendaCandidate {
            id: n.id,
            title: n.title.clone(),
            description: n.description.clone(),
            level: n.level,
        })
        .collect();

    let review: Vec<SegmentForReview> = batch
        .iter()
        .map(|e| SegmentForReview {
            index: e.global_index,
            text: e.text.clone(),
            current_agenda_id: e.current_agenda_id,
            current_agenda_title: e.current_agenda_title.clone(),
        })
        .collect();

    tracing::info!(
        %analysis_id,
        meeting_id,
        total = flat.len(),
        batch = batch.len(),
        "Submitting segment batch for mismatch review"
    );

    let verdicts = match oracle.review_segments(&candidates, &review).await {
        Ok(verdicts) => verdicts,
        Err(e @ OracleError::MalformedReply(_)) => {
            tracing::error!(%analysis_id, error = %e, "Oracle reply could not be parsed");
            return Ok(AnalysisReport::degraded(
                analysis_id,
                flat.len(),
                batch.len(),
                e.to_string(),
            ));
        }
        Err(e) => {
            tracing::error!(%analysis_id, error = %e, "Oracle call failed");
            return Ok(AnalysisReport::degraded(analysis_id, flat.len(), 0, e.to_string()));
        }
    };

    let titles: HashMap<i64, String> =
        nodes.iter().map(|n| (n.id, n.title.clone())).collect();
    let suggestions = select_suggestions(&verdicts, &batch, &titles, config);

    if !suggestions.is_empty() {
        persist_suggestions(pool, &transcript_rows, &batch, &suggestions).await?;
    }

    tracing::info!(
        %analysis_id,
        meeting_id,
        mismatches = suggestions.len(),
        "Mismatch analysis complete"
    );

    Ok(AnalysisReport {
        analysis_id,
        total_segments: flat.len(),
        analyzed: batch.len(),
        mismatches_found: suggestions.len(),
        suggestions,
        error: None,
    })
}

/// Write accepted suggestions onto their segments, one transaction for the
/// whole batch — the report and the stored state never diverge.
async fn persist_suggestions(
    pool: &PgPool,
    transcript_rows: &[quorum_core::models::Transcript],
    batch: &[BatchEntry],
    suggestions: &[SegmentSuggestion],
) -> Result<(), QuorumError> {
    let address: HashMap<usize, (i64, usize)> = batch
        .iter()
        .map(|e| (e.global_index, (e.transcript_id, e.local_index)))
        .collect();

    // Mutate in-memory copies of the affected transcripts.
    let mut updated: HashMap<i64, quorum_core::models::Transcript> = HashMap::new();
    for suggestion in suggestions {
        let Some(&(transcript_id, local_index)) = address.get(&suggestion.segment_index) else {
            continue;
        };
        if !updated.contains_key(&transcript_id) {
            let Some(row) = transcript_rows.iter().find(|t| t.id == transcript_id) else {
                continue;
            };
            updated.insert(transcript_id, row.clone());
        }
        let Some(transcript) = updated.get_mut(&transcript_id) else {
            continue;
        };
        if let Some(segment) = transcript.segments.0.get_mut(local_index) {
            segment.suggested_agenda_id = Some(suggestion.suggested_agenda_id);
        }
    }

    let mut tx = pool.begin().await?;
    for transcript in updated.values() {
        sqlx::query("UPDATE transcripts SET segments = $1 WHERE id = $2")
            .bind(&transcript.segments)
            .bind(transcript.id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use quorum_core::models::{AgendaStatus, TimeRange, Transcript, TranscriptSegment};
    use sqlx::types::Json;

    fn node(id: i64, ranges: Vec<TimeRange>) -> AgendaNode {
        AgendaNode {
            id,
            meeting_id: 1,
            parent_id: None,
            level: 0,
            order_num: id as i32,
            title: format!("agenda {id}"),
            description: None,
            status: AgendaStatus::Pending,
            started_at_seconds: None,
            time_segments: Json(ranges),
            deleted_at: None,
            created_at: Utc::now(),
        }
    }

    fn seg(start: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            start,
            end: Some(start + 5.0),
            text: text.to_string(),
            speaker: None,
            confidence: None,
            matched_agenda_id: None,
            suggested_agenda_id: None,
            suggestion_accepted: None,
        }
    }

    fn flat(segments: Vec<TranscriptSegment>) -> Vec<FlatSegment> {
        let transcript = Transcript {
            id: 1,
            meeting_id: 1,
            segments: Json(segments),
            created_at: Utc::now(),
        };
        timeline::flatten_segments(&[transcript])
    }

    fn verdict(
        index: usize,
        matched: bool,
        suggested: Option<i64>,
        confidence: f64,
    ) -> SegmentVerdict {
        SegmentVerdict {
            index,
            is_matched_correctly: matched,
            suggested_agenda_id: suggested,
            confidence,
            reason: "because".to_string(),
        }
    }

    // ========================================================================
    // TEST 1: short and filler segments are skipped
    // ========================================================================
    #[test]
    fn test_should_skip() {
        assert!(should_skip("ok", 10));
        assert!(should_skip("   yes   ", 2), "filler skipped regardless of length");
        assert!(should_skip("Okay.", 2));
        assert!(should_skip("mhm", 2));
        assert!(should_skip("again", 2));
        assert!(!should_skip("let us review the budget numbers", 10));
    }

    // ========================================================================
    // TEST 2: batch drops already-suggested segments unless forced
    // ========================================================================
    #[test]
    fn test_build_batch_respects_existing_suggestions() {
        let nodes = vec![node(1, vec![TimeRange::new(0, None)])];
        let mut first = seg(0.0, "long enough to analyze, one");
        first.suggested_agenda_id = Some(2);
        let second = seg(10.0, "long enough to analyze, two");
        let flat = flat(vec![first, second]);

        let batch = build_batch(&flat, &nodes, false, 10);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].global_index, 1);

        let batch = build_batch(&flat, &nodes, true, 10);
        assert_eq!(batch.len(), 2, "force_reanalyze re-asks about flagged segments");
    }

    // ========================================================================
    // TEST 3: batch entries carry the mapper-resolved current owner
    // ========================================================================
    #[test]
    fn test_build_batch_resolves_owner() {
        let nodes = vec![
            node(1, vec![TimeRange::new(0, Some(60))]),
            node(2, vec![TimeRange::new(60, None)]),
        ];
        let flat = flat(vec![
            seg(30.0, "discussion inside the first agenda"),
            seg(90.0, "discussion inside the second agenda"),
            seg(500.0, "late discussion owned by the open-ended agenda"),
        ]);

        let batch = build_batch(&flat, &nodes, false, 10);
        assert_eq!(batch[0].current_agenda_id, Some(1));
        assert_eq!(batch[0].current_agenda_title.as_deref(), Some("agenda 1"));
        assert_eq!(batch[1].current_agenda_id, Some(2));
        assert_eq!(batch[2].current_agenda_id, Some(2));
    }

    // ========================================================================
    // TEST 4: confidence below 0.7 never becomes a suggestion
    // ========================================================================
    #[test]
    fn test_confidence_gate() {
        let nodes = vec![node(1, vec![TimeRange::new(0, None)]), node(2, vec![])];
        let flat = flat(vec![seg(0.0, "long enough to analyze, one")]);
        let batch = build_batch(&flat, &nodes, false, 10);
        let titles: HashMap<i64, String> =
            nodes.iter().map(|n| (n.id, n.title.clone())).collect();
        let config = AnalysisConfig::default();

        for confidence in [0.0, 0.3, 0.699] {
            let verdicts = vec![verdict(0, false, Some(2), confidence)];
            assert!(
                select_suggestions(&verdicts, &batch, &titles, &config).is_empty(),
                "confidence {confidence} must be discarded"
            );
        }

        let verdicts = vec![verdict(0, false, Some(2), 0.7)];
        assert_eq!(select_suggestions(&verdicts, &batch, &titles, &config).len(), 1);
    }

    // ========================================================================
    // TEST 5: matched-correctly, null-target, and self-match verdicts drop
    // ========================================================================
    #[test]
    fn test_verdict_filters() {
        let nodes = vec![node(1, vec![TimeRange::new(0, None)]), node(2, vec![])];
        let flat = flat(vec![seg(0.0, "long enough to analyze, one")]);
        let batch = build_batch(&flat, &nodes, false, 10);
        let titles: HashMap<i64, String> =
            nodes.iter().map(|n| (n.id, n.title.clone())).collect();
        let config = AnalysisConfig::default();

        // Oracle says matched — even a confident target is ignored.
        let verdicts = vec![verdict(0, true, Some(2), 0.95)];
        assert!(select_suggestions(&verdicts, &batch, &titles, &config).is_empty());

        // Not matched but no target named.
        let verdicts = vec![verdict(0, false, None, 0.95)];
        assert!(select_suggestions(&verdicts, &batch, &titles, &config).is_empty());

        // Target equals the current owner — a self-match, not a mismatch.
        let verdicts = vec![verdict(0, false, Some(1), 0.95)];
        assert!(select_suggestions(&verdicts, &batch, &titles, &config).is_empty());

        // Index the batch never contained.
        let verdicts = vec![verdict(42, false, Some(2), 0.95)];
        assert!(select_suggestions(&verdicts, &batch, &titles, &config).is_empty());
    }

    // ========================================================================
    // TEST 6: unknown suggested ids are recorded without a title
    // ========================================================================
    #[test]
    fn test_unknown_suggested_id_kept() {
        let nodes = vec![node(1, vec![TimeRange::new(0, None)])];
        let flat = flat(vec![seg(0.0, "long enough to analyze, one")]);
        let batch = build_batch(&flat, &nodes, false, 10);
        let titles: HashMap<i64, String> =
            nodes.iter().map(|n| (n.id, n.title.clone())).collect();

        let verdicts = vec![verdict(0, false, Some(777), 0.9)];
        let suggestions =
            select_suggestions(&verdicts, &batch, &titles, &AnalysisConfig::default());

        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].suggested_agenda_id, 777);
        assert_eq!(suggestions[0].suggested_agenda_title, None);
    }

    // ========================================================================
    // TEST 7: previews truncate at the configured length
    // ========================================================================
    #[test]
    fn test_preview_truncation() {
        let long = "x".repeat(150);
        assert_eq!(preview(&long, 100).chars().count(), 103);
        assert!(preview(&long, 100).ends_with("..."));
        assert_eq!(preview("short", 100), "short");
    }
}
