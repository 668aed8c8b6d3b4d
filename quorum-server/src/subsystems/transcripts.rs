//! Transcript row access shared by the analyzer, reassignment, and summary
//! subsystems. Transcripts are loaded in id order so the flattened global
//! segment index is stable across reads.

use sqlx::PgPool;

use quorum_core::error::QuorumError;
use quorum_core::models::Transcript;

pub async fn load_transcripts(
    pool: &PgPool,
    meeting_id: i64,
) -> Result<Vec<Transcript>, QuorumError> {
    let transcripts = sqlx::query_as::<_, Transcript>(
        "SELECT id, meeting_id, segments, created_at FROM transcripts \
         WHERE meeting_id = $1 ORDER BY id",
    )
    .bind(meeting_id)
    .fetch_all(pool)
    .await?;
    Ok(transcripts)
}
