//! Summarization oracle — the LLM collaborator behind mismatch analysis,
//! per-agenda question generation, and meeting summaries
//!
//! Provides a `SummarizationOracle` trait so callers take an injected
//! collaborator instead of a module-level singleton, with one implementation:
//! - **Gemini** — structured-JSON generation via the Gemini API
//!
//! The oracle is best-effort from the caller's point of view: transport and
//! provider errors surface as `OracleError` and the mismatch analyzer degrades
//! to an empty-suggestions report rather than failing the request.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use crate::config::OracleSettings;

// ============================================================================
// Contract types
// ============================================================================

/// One agenda node offered to the oracle as a candidate owner.
#[derive(Debug, Clone, Serialize)]
pub struct AgendaCandidate {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub level: i32,
}

/// One transcript segment submitted for attribution review.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentForReview {
    pub index: usize,
    pub text: String,
    pub current_agenda_id: Option<i64>,
    pub current_agenda_title: Option<String>,
}

/// Per-segment verdict returned by the oracle. Unknown ids are passed
/// through unresolved — callers re-validate before acting on them.
#[derive(Debug, Clone, Deserialize)]
pub struct SegmentVerdict {
    pub index: usize,
    #[serde(default = "default_true")]
    pub is_matched_correctly: bool,
    #[serde(default)]
    pub suggested_agenda_id: Option<i64>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reason: String,
}

fn default_true() -> bool {
    true
}

/// One agenda's share of the meeting, fed to the summary prompt.
#[derive(Debug, Clone, Serialize)]
pub struct AgendaSection {
    pub agenda_id: i64,
    /// Dotted outline label ("2.1.3").
    pub label: String,
    pub level: i32,
    pub title: String,
    /// Concatenated transcript text attributed to this agenda; empty when
    /// nothing mapped to it.
    pub transcript: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscussionEntry {
    pub agenda_id: i64,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionEntry {
    #[serde(default)]
    pub agenda_id: Option<i64>,
    pub content: String,
    #[serde(default, rename = "type")]
    pub decision_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionItemEntry {
    #[serde(default)]
    pub agenda_id: Option<i64>,
    #[serde(default)]
    pub assignee: Option<String>,
    pub content: String,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
}

/// Structured whole-meeting summary reply.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeetingSummary {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub discussions: Vec<DiscussionEntry>,
    #[serde(default)]
    pub decisions: Vec<DecisionEntry>,
    #[serde(default)]
    pub action_items: Vec<ActionItemEntry>,
}

// ============================================================================
// SummarizationOracle trait
// ============================================================================

/// Abstraction over the text-understanding provider.
#[async_trait]
pub trait SummarizationOracle: Send + Sync {
    /// Review a batch of segments against the agenda candidate list: is each
    /// segment's current attribution correct, and if not, which candidate is
    /// more likely, with what confidence?
    async fn review_segments(
        &self,
        agendas: &[AgendaCandidate],
        segments: &[SegmentForReview],
    ) -> Result<Vec<SegmentVerdict>, OracleError>;

    /// Generate up to `count` open-ended discussion questions for one agenda.
    async fn agenda_questions(
        &self,
        title: &str,
        description: Option<&str>,
        count: usize,
    ) -> Result<Vec<String>, OracleError>;

    /// Produce the structured whole-meeting summary from per-agenda sections
    /// plus the full transcript as fallback context.
    async fn meeting_summary(
        &self,
        sections: &[AgendaSection],
        full_transcript: &str,
    ) -> Result<MeetingSummary, OracleError>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Malformed oracle reply: {0}")]
    MalformedReply(String),

    #[error("Missing API key")]
    MissingApiKey,

    #[error("All {attempts} retry attempts failed")]
    RetryExhausted { attempts: usize },
}

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub api_key: String,
    pub model: String,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub max_output_tokens: u32,
}

impl OracleConfig {
    pub fn new(api_key: Option<String>, settings: &OracleSettings) -> Self {
        let api_key = api_key
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .unwrap_or_default();

        Self {
            api_key,
            model: settings.model.clone(),
            max_retries: settings.max_retries,
            retry_delay_ms: settings.retry_delay_ms,
            max_output_tokens: settings.max_output_tokens,
        }
    }
}

// ============================================================================
// Gemini API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f64,
    max_output_tokens: u32,
    response_mime_type: String,
}

#[derive(Debug, Deserialize)]
struct GeminiReply {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiReplyContent,
}

#[derive(Debug, Deserialize)]
struct GeminiReplyContent {
    #[serde(default)]
    parts: Vec<GeminiReplyPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiReplyPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    code: u16,
    message: String,
}

// ============================================================================
// GeminiOracleClient
// ============================================================================

/// Gemini-backed oracle — calls `generateContent` and parses the reply text
/// as JSON (after stripping markdown code fences the model sometimes emits).
#[derive(Debug, Clone)]
pub struct GeminiOracleClient {
    client: Client,
    config: OracleConfig,
    base_url: String,
}

/// Strip a surrounding markdown code fence from a model reply, if present.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    // Drop the opening fence line (```json etc.) and the closing fence.
    let body = match trimmed.find('\n') {
        Some(pos) => &trimmed[pos + 1..],
        None => return trimmed,
    };
    body.trim_end().trim_end_matches("```").trim()
}

impl GeminiOracleClient {
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        if config.api_key.is_empty() {
            return Err(OracleError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            config,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        })
    }

    /// Create a client with a custom base URL (for testing / integration)
    pub fn with_base_url(config: OracleConfig, base_url: String) -> Result<Self, OracleError> {
        if config.api_key.is_empty() {
            return Err(OracleError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    /// One prompt round-trip with retry; returns the raw reply text.
    async fn generate_text(
        &self,
        prompt: &str,
        temperature: f64,
    ) -> Result<String, OracleError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries);

        let result = Retry::spawn(retry_strategy, || self.generate_once(prompt, temperature)).await;

        match result {
            Ok(text) => Ok(text),
            Err(e) => {
                tracing::error!(
                    attempts = self.config.max_retries,
                    error = %e,
                    "All oracle retry attempts failed"
                );
                Err(OracleError::RetryExhausted {
                    attempts: self.config.max_retries,
                })
            }
        }
    }

    /// One prompt round-trip, parsed into a JSON value. Parse failures are
    /// not retried — they surface as `MalformedReply` so callers can degrade.
    async fn generate_json(
        &self,
        prompt: &str,
        temperature: f64,
    ) -> Result<serde_json::Value, OracleError> {
        let text = self.generate_text(prompt, temperature).await?;
        let body = strip_code_fences(&text);
        serde_json::from_str(body).map_err(|e| {
            let preview: String = body.chars().take(200).collect();
            tracing::error!(error = %e, preview = %preview, "Oracle reply is not valid JSON");
            OracleError::MalformedReply(e.to_string())
        })
    }

    async fn generate_once(&self, prompt: &str, temperature: f64) -> Result<String, OracleError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.config.model, self.config.api_key
        );

        let request = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature,
                max_output_tokens: self.config.max_output_tokens,
                response_mime_type: "application/json".to_string(),
            },
        };

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let error_detail = serde_json::from_str::<GeminiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error);

            let (code, message) = error_detail
                .map(|e| (e.code, e.message))
                .unwrap_or((status.as_u16(), error_body));

            tracing::error!(code = code, message = %message, "Gemini API error");

            return Err(OracleError::Api { code, message });
        }

        let reply: GeminiReply = response.json().await?;

        let text = reply
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .unwrap_or_default();

        if text.is_empty() {
            return Err(OracleError::Api {
                code: 200,
                message: "Empty candidate list in reply".to_string(),
            });
        }

        Ok(text)
    }
}

// ============================================================================
// Prompt builders
// ============================================================================

fn review_prompt(agendas: &[AgendaCandidate], segments: &[SegmentForReview]) -> String {
    let agenda_json =
        serde_json::to_string_pretty(agendas).unwrap_or_else(|_| "[]".to_string());
    let segment_json =
        serde_json::to_string_pretty(segments).unwrap_or_else(|_| "[]".to_string());

    format!(
        r#"You are an expert meeting-minutes analyst.

## Agenda candidates
```json
{agenda_json}
```

## Transcript segments to review
```json
{segment_json}
```

## Task
For each segment, judge whether its current agenda attribution is correct.

## Reply format (JSON array, one object per segment)
```json
[
  {{"index": 0, "is_matched_correctly": true, "suggested_agenda_id": null, "confidence": 0.0, "reason": "why"}},
  {{"index": 1, "is_matched_correctly": false, "suggested_agenda_id": 47, "confidence": 0.85, "reason": "directly discusses the topic of agenda 47"}}
]
```

## Rules
1. A segment matches an agenda only when its content directly relates to the agenda's title or description.
2. When several agendas could apply, pick the most relevant one.
3. If your confidence is below 0.7, set suggested_agenda_id to null.
4. If is_matched_correctly is true, suggested_agenda_id must be null.
5. Reply with JSON only, no surrounding text."#
    )
}

fn questions_prompt(title: &str, description: Option<&str>, count: usize) -> String {
    let description_text = description
        .map(|d| format!("\nDescription: {d}"))
        .unwrap_or_default();

    format!(
        r#"You are a meeting facilitation expert. Generate {count} open-ended discussion questions for the following agenda item.

Agenda Title: {title}{description_text}

Requirements:
1. Questions must be specific and actionable
2. Avoid yes/no questions - use open-ended format
3. Focus on key information needed for decision-making
4. Include at least one question about risks or concerns
5. Respond with a JSON array of strings only"#
    )
}

fn summary_prompt(sections: &[AgendaSection], full_transcript: &str) -> String {
    let mut section_parts = Vec::new();
    for section in sections {
        let indent = "  ".repeat(section.level as usize);
        let mut part = format!(
            "\n{indent}### Agenda [ID:{}] {}: {}",
            section.agenda_id, section.label, section.title
        );
        if section.transcript.is_empty() {
            part.push_str("\n[no recorded discussion for this agenda]");
        } else {
            part.push_str(&format!("\n[discussion]\n{}", section.transcript));
        }
        section_parts.push(part);
    }
    let sections_text = section_parts.join("\n");

    let transcript_section = if full_transcript.trim().is_empty() {
        String::new()
    } else {
        format!("\n## Full transcript (reference)\n{full_transcript}")
    };

    format!(
        r#"You are an expert meeting-minutes writer.

## Per-agenda discussion
{sections_text}
{transcript_section}

Requirements:
1. When an agenda has its own discussion text, base its entry only on that text
2. When an agenda has none ("[no recorded discussion for this agenda]"), look for related content in the full transcript
3. Identify explicit decisions and action items (assignee, content, due date)
4. Never invent content that is not in the source material
5. Use the numeric agenda_id shown as "[ID:n]" in every entry
6. Reply with JSON only

Output format:
{{
  "summary": "Overall meeting summary",
  "discussions": [{{"agenda_id": 123, "content": "..."}}],
  "decisions": [{{"agenda_id": 123, "content": "...", "type": "approved|postponed|rejected"}}],
  "action_items": [{{"agenda_id": 123, "assignee": "Name", "content": "...", "due_date": "YYYY-MM-DD or null", "priority": "high|medium|low"}}]
}}"#
    )
}

// ============================================================================
// SummarizationOracle impl
// ============================================================================

#[async_trait]
impl SummarizationOracle for GeminiOracleClient {
    async fn review_segments(
        &self,
        agendas: &[AgendaCandidate],
        segments: &[SegmentForReview],
    ) -> Result<Vec<SegmentVerdict>, OracleError> {
        let prompt = review_prompt(agendas, segments);
        let value = self.generate_json(&prompt, 0.2).await?;

        // The reply is an array of verdicts, or occasionally an object
        // wrapping one under "results".
        let array = match value {
            serde_json::Value::Array(_) => value,
            serde_json::Value::Object(ref map) => match map.get("results") {
                Some(inner @ serde_json::Value::Array(_)) => inner.clone(),
                _ => {
                    return Err(OracleError::MalformedReply(
                        "expected a JSON array of verdicts".to_string(),
                    ))
                }
            },
            _ => {
                return Err(OracleError::MalformedReply(
                    "expected a JSON array of verdicts".to_string(),
                ))
            }
        };

        serde_json::from_value(array).map_err(|e| OracleError::MalformedReply(e.to_string()))
    }

    async fn agenda_questions(
        &self,
        title: &str,
        description: Option<&str>,
        count: usize,
    ) -> Result<Vec<String>, OracleError> {
        let prompt = questions_prompt(title, description, count);
        let value = self.generate_json(&prompt, 0.7).await?;

        // Bare array or {"questions": [...]}.
        let items = match value {
            serde_json::Value::Array(items) => items,
            serde_json::Value::Object(mut map) => match map.remove("questions") {
                Some(serde_json::Value::Array(items)) => items,
                _ => {
                    return Err(OracleError::MalformedReply(
                        "expected a JSON array of questions".to_string(),
                    ))
                }
            },
            _ => {
                return Err(OracleError::MalformedReply(
                    "expected a JSON array of questions".to_string(),
                ))
            }
        };

        Ok(items
            .into_iter()
            .filter_map(|v| v.as_str().map(String::from))
            .take(count)
            .collect())
    }

    async fn meeting_summary(
        &self,
        sections: &[AgendaSection],
        full_transcript: &str,
    ) -> Result<MeetingSummary, OracleError> {
        let prompt = summary_prompt(sections, full_transcript);
        let value = self.generate_json(&prompt, 0.3).await?;
        serde_json::from_value(value).map_err(|e| OracleError::MalformedReply(e.to_string()))
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ============================================================================
// TESTS
// ============================================================================
