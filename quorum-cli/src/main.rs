//! quorum-cli — operator frontend for the Quorum IPC socket
//!
//! Speaks the server's wire protocol directly: 4-byte little-endian length
//! prefix + MessagePack payload over a Unix socket.
//!
//! # Subcommands
//! - `status`                                        — server health
//! - `agendas <meeting_id> [--tree] [--json]`        — list the agenda tree
//! - `outline <meeting_id>`                          — dotted order labels
//! - `analyze <meeting_id> [--force]`                — run mismatch analysis
//! - `move-segment <meeting_id> <index> <agenda_id>` — accept/reject a suggestion

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;

use clap::{Parser, Subcommand};
use quorum_core::ipc::{QuorumRequest, QuorumResponse};

const DEFAULT_SOCKET: &str = "/tmp/quorum.sock";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "quorum-cli",
    version,
    about = "Quorum meeting backend — operator CLI"
)]
struct Cli {
    /// Server socket path (overrides QUORUM_SOCKET env var)
    #[arg(long, env = "QUORUM_SOCKET", default_value = DEFAULT_SOCKET)]
    socket: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show server status
    Status,

    /// List a meeting's agendas
    Agendas {
        meeting_id: i64,

        /// Nested tree instead of the flat level-ordered list
        #[arg(long)]
        tree: bool,

        /// Raw JSON output
        #[arg(long)]
        json: bool,
    },

    /// Print dotted order labels for a meeting's agendas
    Outline { meeting_id: i64 },

    /// Run mismatch analysis over a meeting's transcript segments
    Analyze {
        meeting_id: i64,

        /// Re-analyze segments that already carry a suggestion
        #[arg(long)]
        force: bool,
    },

    /// Move a transcript segment to another agenda
    MoveSegment {
        meeting_id: i64,

        /// Meeting-wide flattened segment index
        segment_index: usize,

        target_agenda_id: i64,

        /// Record the move as a rejected suggestion instead of an accepted one
        #[arg(long)]
        reject: bool,
    },
}

// ============================================================================
// IPC client
// ============================================================================

/// One request/response round-trip over the Unix socket.
fn send_request(socket_path: &str, request: &QuorumRequest) -> anyhow::Result<QuorumResponse> {
    let mut stream = match UnixStream::connect(socket_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("quorum-cli: cannot reach {} — {}", socket_path, e);
            std::process::exit(1);
        }
    };

    let payload = rmp_serde::to_vec_named(request)?;
    stream.write_all(&(payload.len() as u32).to_le_bytes())?;
    stream.write_all(&payload)?;

    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf)?;

    Ok(rmp_serde::from_slice(&buf)?)
}

/// Unwrap the response envelope or exit with the server's error.
fn expect_data(response: QuorumResponse) -> serde_json::Value {
    if response.status != "ok" {
        eprintln!(
            "quorum-cli: server error: {}",
            response.error.unwrap_or_else(|| "unknown".to_string())
        );
        std::process::exit(1);
    }
    response.data.unwrap_or(serde_json::Value::Null)
}

// ============================================================================
// Output formatting
// ============================================================================

/// One line of the flat agenda listing, indented by level.
fn format_agenda_line(agenda: &serde_json::Value) -> String {
    let level = agenda["level"].as_u64().unwrap_or(0) as usize;
    let id = agenda["id"].as_i64().unwrap_or(0);
    let title = agenda["title"].as_str().unwrap_or("?");
    let status = agenda["status"].as_str().unwrap_or("?");
    format!("{}[{}] {} ({})", "  ".repeat(level), id, title, status)
}

fn format_outline_line(entry: &serde_json::Value) -> String {
    let label = entry["label"].as_str().unwrap_or("0");
    let title = entry["title"].as_str().unwrap_or("?");
    format!("{:<8} {}", label, title)
}

fn format_suggestion_line(s: &serde_json::Value) -> String {
    let index = s["segment_index"].as_u64().unwrap_or(0);
    let confidence = s["confidence"].as_f64().unwrap_or(0.0);
    let current = s["current_agenda_title"].as_str().unwrap_or("(unmapped)");
    let suggested = s["suggested_agenda_title"]
        .as_str()
        .map(String::from)
        .unwrap_or_else(|| format!("agenda {}", s["suggested_agenda_id"]));
    let reason = s["reason"].as_str().unwrap_or("");
    format!(
        "#{:<4} {:>3.0}%  {} -> {}: {}",
        index,
        confidence * 100.0,
        current,
        suggested,
        reason
    )
}

// ============================================================================
// Subcommand handlers
// ============================================================================

fn do_status(socket: &str) -> anyhow::Result<()> {
    let response = send_request(socket, &QuorumRequest::Health)?;
    let data = expect_data(response);
    println!("Quorum server:   {}", data["status"].as_str().unwrap_or("unknown"));
    println!("PostgreSQL:      {}", data["postgresql"].as_str().unwrap_or("?"));
    println!("Active meetings: {}", data["active_meetings"]);
    Ok(())
}

fn do_agendas(socket: &str, meeting_id: i64, tree: bool, json: bool) -> anyhow::Result<()> {
    let response = send_request(
        socket,
        &QuorumRequest::AgendaList {
            meeting_id,
            as_tree: tree,
        },
    )?;
    let data = expect_data(response);

    if json || tree {
        // The nested form is easiest to consume as JSON.
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    let items = data.as_array().cloned().unwrap_or_default();
    if items.is_empty() {
        eprintln!("No agendas for meeting {}", meeting_id);
        return Ok(());
    }
    for agenda in &items {
        println!("{}", format_agenda_line(agenda));
    }
    Ok(())
}

fn do_outline(socket: &str, meeting_id: i64) -> anyhow::Result<()> {
    let response = send_request(socket, &QuorumRequest::AgendaOutline { meeting_id })?;
    let data = expect_data(response);
    for entry in data.as_array().cloned().unwrap_or_default() {
        println!("{}", format_outline_line(&entry));
    }
    Ok(())
}

fn do_analyze(socket: &str, meeting_id: i64, force: bool) -> anyhow::Result<()> {
    let response = send_request(
        socket,
        &QuorumRequest::AnalyzeSegments {
            meeting_id,
            force_reanalyze: force,
        },
    )?;
    let data = expect_data(response);

    println!(
        "Analyzed {} of {} segments, {} mismatch suggestion(s)",
        data["analyzed"], data["total_segments"], data["mismatches_found"]
    );
    if let Some(error) = data["error"].as_str() {
        eprintln!("warning: analysis degraded: {}", error);
    }
    for suggestion in data["suggestions"].as_array().cloned().unwrap_or_default() {
        println!("{}", format_suggestion_line(&suggestion));
    }
    Ok(())
}

fn do_move_segment(
    socket: &str,
    meeting_id: i64,
    segment_index: usize,
    target_agenda_id: i64,
    reject: bool,
) -> anyhow::Result<()> {
    let response = send_request(
        socket,
        &QuorumRequest::MoveSegment {
            meeting_id,
            segment_index,
            target_agenda_id,
            accept_suggestion: !reject,
        },
    )?;
    let data = expect_data(response);

    if data["success"].as_bool().unwrap_or(false) {
        println!(
            "Segment {} moved to agenda {}",
            segment_index, target_agenda_id
        );
    } else {
        eprintln!(
            "quorum-cli: move failed: {}",
            data["error"].as_str().unwrap_or("unknown")
        );
        std::process::exit(1);
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Status => do_status(&cli.socket),
        Commands::Agendas {
            meeting_id,
            tree,
            json,
        } => do_agendas(&cli.socket, meeting_id, tree, json),
        Commands::Outline { meeting_id } => do_outline(&cli.socket, meeting_id),
        Commands::Analyze { meeting_id, force } => do_analyze(&cli.socket, meeting_id, force),
        Commands::MoveSegment {
            meeting_id,
            segment_index,
            target_agenda_id,
            reject,
        } => do_move_segment(
            &cli.socket,
            meeting_id,
            segment_index,
            target_agenda_id,
            reject,
        ),
    };

    if let Err(e) = result {
        eprintln!("quorum-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ========================================================================
    // TEST 1: agenda lines indent by level
    // ========================================================================
    #[test]
    fn test_format_agenda_line_indents() {
        let root = json!({"id": 1, "level": 0, "title": "Budget", "status": "pending"});
        let child = json!({"id": 2, "level": 2, "title": "Q3", "status": "completed"});

        assert_eq!(format_agenda_line(&root), "[1] Budget (pending)");
        assert_eq!(format_agenda_line(&child), "    [2] Q3 (completed)");
    }

    // ========================================================================
    // TEST 2: outline lines pad the label column
    // ========================================================================
    #[test]
    fn test_format_outline_line() {
        let entry = json!({"agenda_id": 3, "label": "1.2", "title": "Hiring"});
        assert_eq!(format_outline_line(&entry), "1.2      Hiring");
    }

    // ========================================================================
    // TEST 3: suggestion lines name the unresolved target by id
    // ========================================================================
    #[test]
    fn test_format_suggestion_line_unresolved_target() {
        let s = json!({
            "segment_index": 7,
            "confidence": 0.85,
            "current_agenda_title": "Budget",
            "suggested_agenda_id": 42,
            "suggested_agenda_title": null,
            "reason": "mentions hiring"
        });
        let line = format_suggestion_line(&s);
        assert!(line.starts_with("#7"));
        assert!(line.contains("85%"));
        assert!(line.contains("Budget -> agenda 42"));
        assert!(line.ends_with("mentions hiring"));
    }

    // ========================================================================
    // TEST 4: unmapped current agenda renders a placeholder
    // ========================================================================
    #[test]
    fn test_format_suggestion_line_unmapped_current() {
        let s = json!({
            "segment_index": 0,
            "confidence": 0.7,
            "current_agenda_id": null,
            "current_agenda_title": null,
            "suggested_agenda_id": 3,
            "suggested_agenda_title": "Roadmap",
            "reason": "roadmap talk"
        });
        let line = format_suggestion_line(&s);
        assert!(line.contains("(unmapped) -> Roadmap"));
    }
}
