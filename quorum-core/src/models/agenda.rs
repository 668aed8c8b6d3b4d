use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "agenda_status", rename_all = "snake_case")]
pub enum AgendaStatus {
    Pending,
    InProgress,
    Completed,
}

/// A span of meeting-recording seconds attributed to an agenda node.
/// `end = None` means open-ended (extends to the end of the recording).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: Option<i64>,
}

impl TimeRange {
    pub fn new(start: i64, end: Option<i64>) -> Self {
        Self { start, end }
    }

    /// Half-open containment test: `start <= t < end`, open end = infinity.
    pub fn contains(&self, t: f64) -> bool {
        let end = self.end.map(|e| e as f64).unwrap_or(f64::INFINITY);
        (self.start as f64) <= t && t < end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AgendaNode {
    pub id: i64,
    pub meeting_id: i64,
    pub parent_id: Option<i64>,
    pub level: i32,
    pub order_num: i32,
    pub title: String,
    pub description: Option<String>,
    pub status: AgendaStatus,
    pub started_at_seconds: Option<i64>,
    pub time_segments: Json<Vec<TimeRange>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AgendaNode {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}
