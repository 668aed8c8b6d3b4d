use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

/// One timestamped utterance inside a transcript's `segments` JSONB column.
///
/// Segments are value objects: produced once by the transcription engine and
/// thereafter mutated in place (the `matched_agenda_id` / `suggested_agenda_id`
/// / `suggestion_accepted` bookkeeping), never individually deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    #[serde(default)]
    pub end: Option<f64>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_agenda_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_agenda_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion_accepted: Option<bool>,
}

impl TranscriptSegment {
    /// Midpoint of the utterance; a segment with no end collapses to its start.
    pub fn midpoint(&self) -> f64 {
        (self.start + self.end.unwrap_or(self.start)) / 2.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transcript {
    pub id: i64,
    pub meeting_id: i64,
    pub segments: Json<Vec<TranscriptSegment>>,
    pub created_at: DateTime<Utc>,
}
