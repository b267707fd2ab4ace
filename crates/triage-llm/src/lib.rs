// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use reqwest::StatusCode;
use reqwest::blocking::Client as HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;
use triage_app::{AnalysisOutcome, InputRecord, PriorityScore};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid llm config: {0}")]
    Config(String),
    #[error("cannot reach {base_url}")]
    Transport {
        base_url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("server error ({status}): {message}")]
    Status { status: u16, message: String },
    #[error("could not process the model's output: {reason}")]
    Malformed { reason: String },
    #[error("expected {expected} analyses, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
}

impl AnalysisError {
    fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: String,
    /// `None` waits for the service indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            model: DEFAULT_MODEL.to_owned(),
            api_key: String::new(),
            timeout: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    model: String,
    api_key: String,
    timeout: Option<Duration>,
    http: HttpClient,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self, AnalysisError> {
        let base_url = config.base_url.trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            return Err(AnalysisError::Config(
                "llm.base_url must not be empty".to_owned(),
            ));
        }
        let parsed = Url::parse(&base_url).map_err(|error| {
            AnalysisError::Config(format!("llm.base_url {base_url:?} is not a URL: {error}"))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AnalysisError::Config(format!(
                "llm.base_url {base_url:?} must use http or https"
            )));
        }
        if config.model.trim().is_empty() {
            return Err(AnalysisError::Config(
                "llm.model must not be empty".to_owned(),
            ));
        }

        let http = HttpClient::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|error| AnalysisError::Config(format!("build HTTP client: {error}")))?;

        Ok(Self {
            base_url,
            model: config.model,
            api_key: config.api_key,
            timeout: config.timeout,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Summarizes and scores `records` with one call to the service. The
    /// returned outcomes line up with `records` by position.
    ///
    /// Any reply whose outcome count differs from `records.len()` is an
    /// `AnalysisError::CountMismatch`. That includes a reply without an
    /// `analyses` field, which [`parse_analyses`] alone would accept as an
    /// empty list.
    pub fn analyze(&self, records: &[InputRecord]) -> Result<Vec<AnalysisOutcome>, AnalysisError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let prompt = build_analysis_prompt(records);
        tracing::debug!(
            model = %self.model,
            records = records.len(),
            "requesting email analysis"
        );
        let text = self.generate_json(&prompt, analysis_schema())?;
        let outcomes = parse_analyses(&text).inspect_err(|error| {
            tracing::warn!(%error, raw = %text, "model output rejected");
        })?;

        if outcomes.len() != records.len() {
            tracing::warn!(
                expected = records.len(),
                actual = outcomes.len(),
                "model returned wrong number of analyses"
            );
            return Err(AnalysisError::CountMismatch {
                expected: records.len(),
                actual: outcomes.len(),
            });
        }
        Ok(outcomes)
    }

    /// Sends `prompt` and asks for JSON matching `schema`; returns the raw
    /// text of the first candidate.
    pub fn generate_json(&self, prompt: &str, schema: Value) -> Result<String, AnalysisError> {
        let request = GenerateContentRequest::new(prompt, schema);
        let response = self
            .http
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .map_err(|source| AnalysisError::Transport {
                base_url: self.base_url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(clean_error_response(status, &body));
        }

        let body = response
            .text()
            .map_err(|source| AnalysisError::Transport {
                base_url: self.base_url.clone(),
                source,
            })?;
        let parsed: GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|error| AnalysisError::malformed(format!("decode response: {error}")))?;
        Ok(parsed.text())
    }
}

pub fn build_analysis_prompt(records: &[InputRecord]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Analyze the following {} emails and provide a high-level summary and priority score (1-5) for each.\n",
        records.len()
    ));
    out.push_str("Return exactly one analysis per email, in the same order as listed.\n");
    out.push_str("Rules:\n");
    out.push_str("1. Summary must be exactly one sentence.\n");
    out.push_str("2. Priority score from 1 (Low) to 5 (Urgent).\n");
    out.push_str("3. No hallucination.\n");
    out.push_str("\nEmails to analyze:\n");
    let emails = records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            format!(
                "Email {}:\nFrom: {}\nSubject: {}\nBody: {}",
                index + 1,
                record.sender,
                record.subject,
                record.body
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    out.push_str(&emails);
    out.push('\n');
    out
}

/// Structured-output schema declared to the service.
pub fn analysis_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "analyses": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "summary": {
                            "type": "STRING",
                            "description": "A one-sentence summary of the email."
                        },
                        "priorityScore": {
                            "type": "NUMBER",
                            "description": "Priority from 1 to 5."
                        }
                    },
                    "required": ["summary", "priorityScore"]
                }
            }
        },
        "required": ["analyses"]
    })
}

/// Parses model output. A document without an `analyses` field yields an
/// empty list; callers that know how many entries to expect must check.
pub fn parse_analyses(text: &str) -> Result<Vec<AnalysisOutcome>, AnalysisError> {
    let envelope: AnalysesEnvelope = serde_json::from_str(text.trim())
        .map_err(|error| AnalysisError::malformed(error.to_string()))?;
    let Some(entries) = envelope.analyses else {
        return Ok(Vec::new());
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let priority_score = score_from_number(entry.priority_score).ok_or_else(|| {
                AnalysisError::malformed(format!(
                    "analysis {} has priorityScore {}; expected an integer from 1 to 5",
                    index + 1,
                    entry.priority_score
                ))
            })?;
            Ok(AnalysisOutcome {
                summary: entry.summary.trim().to_owned(),
                priority_score,
            })
        })
        .collect()
}

fn score_from_number(value: f64) -> Option<PriorityScore> {
    if !value.is_finite() || value.fract() != 0.0 {
        return None;
    }
    PriorityScore::new(value as i64)
}

fn clean_error_response(status: StatusCode, body: &str) -> AnalysisError {
    if let Ok(parsed) = serde_json::from_str::<ServiceErrorEnvelope>(body)
        && let Some(error) = parsed.error
        && !error.message.is_empty()
    {
        return AnalysisError::Status {
            status: status.as_u16(),
            message: error.message,
        };
    }

    let message = if !body.is_empty() && body.len() < 100 && !body.contains('{') {
        body.trim().to_owned()
    } else {
        status
            .canonical_reason()
            .unwrap_or("unexpected status")
            .to_owned()
    };
    AnalysisError::Status {
        status: status.as_u16(),
        message,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

impl<'a> GenerateContentRequest<'a> {
    fn new(prompt: &'a str, schema: Value) -> Self {
        Self {
            contents: [Content {
                role: "user",
                parts: [TextPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: schema,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [TextPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    fn text(&self) -> String {
        let text: String = self
            .candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|part| part.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default();
        if text.trim().is_empty() {
            "{}".to_owned()
        } else {
            text
        }
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnalysesEnvelope {
    analyses: Option<Vec<AnalysisEntry>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisEntry {
    summary: String,
    priority_score: f64,
}

#[derive(Debug, Deserialize)]
struct ServiceErrorEnvelope {
    error: Option<ServiceErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    message: String,
}
