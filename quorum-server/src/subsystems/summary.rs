//! Summary subsystem — whole-meeting digest through the oracle
//!
//! Assembles one oracle request from the meeting's data: the full transcript
//! plus a per-agenda section built with the midpoint-based timeline variant
//! (a speaker starting a sentence just before the operator clicks over still
//! lands in the agenda actually being discussed). Sections carry the dotted
//! outline labels so the digest reads in display order.
//!
//! Unlike mismatch analysis, a failed oracle call here propagates to the
//! caller — the digest is the point of the request, not an enrichment.

use serde::Serialize;
use sqlx::PgPool;

use quorum_core::error::QuorumError;
use quorum_core::models::AgendaNode;
use quorum_core::oracle::{
    ActionItemEntry, AgendaSection, DecisionEntry, SummarizationOracle,
};
use quorum_core::outline::Outline;
use quorum_core::timeline::{self, FlatSegment};

use super::{agenda, transcripts};

#[derive(Debug, Serialize)]
pub struct DigestDiscussion {
    pub agenda_id: i64,
    pub agenda_title: String,
    /// Dotted order label ("1.2.1"), recomputed at render time.
    pub agenda_order: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct MeetingDigest {
    pub summary: String,
    pub discussions: Vec<DigestDiscussion>,
    pub decisions: Vec<DecisionEntry>,
    pub action_items: Vec<ActionItemEntry>,
}

/// Build the per-agenda oracle sections: outline label, level, title, and the
/// midpoint-attributed transcript text (empty when nothing maps).
fn build_sections(nodes: &[AgendaNode], flat: &[FlatSegment]) -> Vec<AgendaSection> {
    let outline = Outline::build(nodes);

    let mut sections: Vec<AgendaSection> = nodes
        .iter()
        .map(|node| {
            let text = timeline::segments_for(node, nodes, flat)
                .into_iter()
                .map(|idx| flat[idx].segment.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            AgendaSection {
                agenda_id: node.id,
                label: outline.label(node.id).to_string(),
                level: node.level,
                title: node.title.clone(),
                transcript: text,
            }
        })
        .collect();
    sections.sort_by_key(|s| Outline::sort_key(&s.label));
    sections
}

/// Generate the structured digest for one meeting.
pub async fn summarize_meeting(
    pool: &PgPool,
    oracle: &dyn SummarizationOracle,
    meeting_id: i64,
) -> Result<MeetingDigest, QuorumError> {
    agenda::get_meeting(pool, meeting_id).await?;
    let nodes = agenda::load_active(pool, meeting_id).await?;
    let transcript_rows = transcripts::load_transcripts(pool, meeting_id).await?;

    // Chronological view for the prompt; the stored order stays untouched.
    let mut flat = timeline::flatten_segments(&transcript_rows);
    flat.sort_by(|a, b| a.segment.start.total_cmp(&b.segment.start));

    let full_transcript = flat
        .iter()
        .map(|f| f.segment.text.as_str())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if full_transcript.is_empty() {
        tracing::warn!(meeting_id, "No transcript text found for meeting");
    }

    let sections = build_sections(&nodes, &flat);

    tracing::info!(
        meeting_id,
        agendas = sections.len(),
        segments = flat.len(),
        "Requesting meeting digest"
    );

    let reply = oracle.meeting_summary(&sections, &full_transcript).await?;

    let outline = Outline::build(&nodes);
    let mut discussions = Vec::new();
    for entry in reply.discussions {
        let Some(node) = nodes.iter().find(|n| n.id == entry.agenda_id) else {
            tracing::warn!(
                meeting_id,
                agenda_id = entry.agenda_id,
                "Digest referenced an unknown agenda id — dropping entry"
            );
            continue;
        };
        discussions.push(DigestDiscussion {
            agenda_id: node.id,
            agenda_title: node.title.clone(),
            agenda_order: outline.label(node.id).to_string(),
            content: entry.content,
        });
    }
    discussions.sort_by_key(|d| Outline::sort_key(&d.agenda_order));

    Ok(MeetingDigest {
        summary: reply.summary,
        discussions,
        decisions: reply.decisions,
        action_items: reply.action_items,
    })
}

// ============================================================================
// TESTS
// ============================================================================
