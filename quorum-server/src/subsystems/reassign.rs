//! Segment reassignment subsystem — committing accept/reject decisions
//!
//! Applies an operator's decision on a mismatch suggestion (or a manual
//! re-attribution): the segment's bookkeeping fields and the target agenda's
//! `time_segments` are updated together in one transaction, so a reader
//! never sees a reassigned segment whose agenda lacks the matching range or
//! vice versa.
//!
//! Validation problems (unknown segment index, unknown or foreign target
//! agenda) come back as a structured failure outcome rather than an error —
//! accepting a suggestion is a user-facing action that is expected to
//! sometimes fail validation.

use serde::Serialize;
use sqlx::PgPool;

use quorum_core::error::QuorumError;
use quorum_core::models::{TimeRange, Transcript, TranscriptSegment};

use super::{agenda, transcripts};

#[derive(Debug, Serialize)]
pub struct MoveOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moved_to_agenda_id: Option<i64>,
    pub time_segments_updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MoveOutcome {
    fn failure(error: &str) -> Self {
        Self {
            success: false,
            segment_index: None,
            moved_to_agenda_id: None,
            time_segments_updated: false,
            error: Some(error.to_string()),
        }
    }
}

/// Resolve a meeting-wide flattened segment index back to its storage
/// address: `(position in the transcript list, index within that transcript)`.
fn locate_segment(transcript_rows: &[Transcript], global_index: usize) -> Option<(usize, usize)> {
    let mut seen = 0;
    for (row_pos, transcript) in transcript_rows.iter().enumerate() {
        let count = transcript.segments.0.len();
        if global_index < seen + count {
            return Some((row_pos, global_index - seen));
        }
        seen += count;
    }
    None
}

/// The range appended to the target agenda. Segment boundaries are float
/// seconds while agenda ranges are whole seconds, so the range is widened to
/// `[floor(start), ceil(end)]`; a segment with no end gets one second.
fn range_for(segment: &TranscriptSegment) -> TimeRange {
    let start = segment.start.floor() as i64;
    let end = segment.end.unwrap_or(segment.start + 1.0).ceil() as i64;
    TimeRange::new(start, Some(end))
}

/// Mutate the segment's bookkeeping in place. Accepting consumes the
/// suggestion; rejecting records the decision but leaves the suggestion
/// visible for audit.
fn apply_decision(segment: &mut TranscriptSegment, target_agenda_id: i64, accept: bool) {
    segment.matched_agenda_id = Some(target_agenda_id);
    segment.suggestion_accepted = Some(accept);
    if accept {
        segment.suggested_agenda_id = None;
    }
}

/// Move one segment (by meeting-wide flattened index) to `target_agenda_id`.
pub async fn move_segment(
    pool: &PgPool,
    meeting_id: i64,
    segment_index: usize,
    target_agenda_id: i64,
    accept_suggestion: bool,
) -> Result<MoveOutcome, QuorumError> {
    agenda::get_meeting(pool, meeting_id).await?;

    let mut transcript_rows = transcripts::load_transcripts(pool, meeting_id).await?;

    let Some((row_pos, local_index)) = locate_segment(&transcript_rows, segment_index) else {
        return Ok(MoveOutcome::failure("Segment not found"));
    };

    let mut target = match agenda::get_agenda(pool, target_agenda_id).await {
        Ok(node) if node.meeting_id == meeting_id => node,
        Ok(_) | Err(QuorumError::NotFound(_)) => {
            return Ok(MoveOutcome::failure("Target agenda not found"));
        }
        Err(e) => return Err(e),
    };

    let transcript = &mut transcript_rows[row_pos];
    let Some(segment) = transcript.segments.0.get_mut(local_index) else {
        return Ok(MoveOutcome::failure("Segment not found"));
    };

    apply_decision(segment, target_agenda_id, accept_suggestion);
    // No merging of overlapping ranges — repeated moves append repeatedly.
    target.time_segments.0.push(range_for(segment));

    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE transcripts SET segments = $1 WHERE id = $2")
        .bind(&transcript.segments)
        .bind(transcript.id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE agendas SET time_segments = $1 WHERE id = $2")
        .bind(&target.time_segments)
        .bind(target.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(
        meeting_id,
        segment_index,
        target_agenda_id,
        accepted = accept_suggestion,
        "Reassigned segment"
    );

    Ok(MoveOutcome {
        success: true,
        segment_index: Some(segment_index),
        moved_to_agenda_id: Some(target_agenda_id),
        time_segments_updated: true,
        error: None,
    })
}

// ============================================================================
// TESTS
// ============================================================================
