use serde::{Deserialize, Serialize};

use crate::models::{AgendaStatus, TimeRange};

/// Partial-update payload for an agenda node. `parent_id` is doubly optional:
/// absent = untouched, `null` = detach to root. A parent change through a
/// plain update bypasses cycle checking — structural moves go through
/// `AgendaMove`.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AgendaPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_num: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AgendaStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_seconds: Option<Option<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_segments: Option<Vec<TimeRange>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Option<i64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderItem {
    pub id: i64,
    pub order_num: i32,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum QuorumRequest {
    Ping,
    Health,
    AgendaCreate {
        meeting_id: i64,
        title: String,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        parent_id: Option<i64>,
    },
    AgendaUpdate {
        agenda_id: i64,
        patch: AgendaPatch,
    },
    AgendaDelete {
        agenda_id: i64,
    },
    AgendaReorder {
        meeting_id: i64,
        items: Vec<ReorderItem>,
    },
    AgendaMove {
        agenda_id: i64,
        #[serde(default)]
        new_parent_id: Option<i64>,
        new_order_num: i32,
    },
    AgendaList {
        meeting_id: i64,
        #[serde(default)]
        as_tree: bool,
    },
    AgendaOutline {
        meeting_id: i64,
    },
    GenerateQuestions {
        agenda_id: i64,
        #[serde(default)]
        count: Option<usize>,
    },
    ListQuestions {
        agenda_id: i64,
    },
    AnalyzeSegments {
        meeting_id: i64,
        #[serde(default)]
        force_reanalyze: bool,
    },
    MoveSegment {
        meeting_id: i64,
        segment_index: usize,
        target_agenda_id: i64,
        #[serde(default = "default_accept")]
        accept_suggestion: bool,
    },
    Summarize {
        meeting_id: i64,
    },
}

fn default_accept() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct QuorumResponse {
    pub status: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub version: String,
}

impl QuorumResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: "ok".to_string(),
            data: Some(data),
            error: None,
            version: "0.1.0".to_string(),
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(msg.into()),
            version: "0.1.0".to_string(),
        }
    }

    pub fn pong() -> Self {
        Self::ok(serde_json::json!({"pong": true}))
    }
}
