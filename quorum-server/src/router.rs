use crate::subsystems::{agenda, analyzer, reassign, summary};
use quorum_core::error::QuorumError;
use quorum_core::ipc::{QuorumRequest, QuorumResponse};
use quorum_core::oracle::{GeminiOracleClient, OracleConfig};
use sqlx::PgPool;

pub async fn handle_request(request: QuorumRequest, pool: &PgPool) -> QuorumResponse {
    handle_request_with_config(request, pool, None).await
}

/// Handle a request with optional config (the oracle-backed operations need it).
pub async fn handle_request_with_config(
    request: QuorumRequest,
    pool: &PgPool,
    config: Option<quorum_core::QuorumConfig>,
) -> QuorumResponse {
    match request {
        QuorumRequest::Ping => QuorumResponse::pong(),
        QuorumRequest::Health => {
            let pg_ver = match quorum_core::db::health_check(pool).await {
                Ok(v) => v,
                Err(e) => return QuorumResponse::err(format!("DB health check failed: {}", e)),
            };
            let meetings = match quorum_core::db::count_active_meetings(pool).await {
                Ok(n) => n,
                Err(e) => return QuorumResponse::err(format!("Meeting count failed: {}", e)),
            };
            QuorumResponse::ok(serde_json::json!({
                "postgresql": pg_ver,
                "active_meetings": meetings,
                "status": "healthy"
            }))
        }
        QuorumRequest::AgendaCreate {
            meeting_id,
            title,
            description,
            parent_id,
        } => to_response(
            agenda::create_agenda(pool, meeting_id, &title, description.as_deref(), parent_id)
                .await,
        ),
        QuorumRequest::AgendaUpdate { agenda_id, patch } => {
            to_response(agenda::update_agenda(pool, agenda_id, patch).await)
        }
        QuorumRequest::AgendaDelete { agenda_id } => {
            match agenda::delete_agenda(pool, agenda_id).await {
                Ok(()) => QuorumResponse::ok(serde_json::json!({"deleted": true, "id": agenda_id})),
                Err(e) => QuorumResponse::err(e.to_string()),
            }
        }
        QuorumRequest::AgendaReorder { meeting_id, items } => {
            match agenda::reorder_agendas(pool, meeting_id, &items).await {
                Ok(updated) => QuorumResponse::ok(serde_json::json!({"updated": updated})),
                Err(e) => QuorumResponse::err(e.to_string()),
            }
        }
        QuorumRequest::AgendaMove {
            agenda_id,
            new_parent_id,
            new_order_num,
        } => to_response(agenda::move_agenda(pool, agenda_id, new_parent_id, new_order_num).await),
        QuorumRequest::AgendaList {
            meeting_id,
            as_tree,
        } => {
            if as_tree {
                to_response(agenda::list_tree(pool, meeting_id).await)
            } else {
                to_response(agenda::list_flat(pool, meeting_id).await)
            }
        }
        QuorumRequest::AgendaOutline { meeting_id } => {
            to_response(agenda::render_outline(pool, meeting_id).await)
        }
        QuorumRequest::GenerateQuestions { agenda_id, count } => {
            let oracle = match create_oracle(config.as_ref()) {
                Ok(o) => o,
                Err(resp) => return resp,
            };
            to_response(agenda::generate_questions(pool, &oracle, agenda_id, count).await)
        }
        QuorumRequest::ListQuestions { agenda_id } => {
            to_response(agenda::list_questions(pool, agenda_id).await)
        }
        QuorumRequest::AnalyzeSegments {
            meeting_id,
            force_reanalyze,
        } => {
            let Some(config) = config else {
                return QuorumResponse::err("No config available for segment analysis");
            };
            let oracle = match create_oracle(Some(&config)) {
                Ok(o) => o,
                Err(resp) => return resp,
            };
            to_response(
                analyzer::analyze_segments(
                    pool,
                    &oracle,
                    &config.analysis,
                    meeting_id,
                    force_reanalyze,
                )
                .await,
            )
        }
        QuorumRequest::MoveSegment {
            meeting_id,
            segment_index,
            target_agenda_id,
            accept_suggestion,
        } => to_response(
            reassign::move_segment(
                pool,
                meeting_id,
                segment_index,
                target_agenda_id,
                accept_suggestion,
            )
            .await,
        ),
        QuorumRequest::Summarize { meeting_id } => {
            let oracle = match create_oracle(config.as_ref()) {
                Ok(o) => o,
                Err(resp) => return resp,
            };
            to_response(summary::summarize_meeting(pool, &oracle, meeting_id).await)
        }
    }
}

/// Serialize an operation result into the response envelope. NotFound and
/// Invalid reasons pass through verbatim — the operator UI shows them as-is.
fn to_response<T: serde::Serialize>(result: Result<T, QuorumError>) -> QuorumResponse {
    match result {
        Ok(data) => match serde_json::to_value(data) {
            Ok(value) => QuorumResponse::ok(value),
            Err(e) => QuorumResponse::err(format!("Serialization error: {}", e)),
        },
        Err(e) => QuorumResponse::err(e.to_string()),
    }
}

fn create_oracle(
    config: Option<&quorum_core::QuorumConfig>,
) -> Result<GeminiOracleClient, QuorumResponse> {
    let Some(config) = config else {
        return Err(QuorumResponse::err("No config available for the oracle"));
    };
    GeminiOracleClient::new(OracleConfig::new(None, &config.oracle))
        .map_err(|e| QuorumResponse::err(format!("Oracle unavailable: {}", e)))
}
