// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow};
use serde_json::{Value, json};
use std::io::Read;
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use tiny_http::{Header, Response, Server};
use triage_app::{InputRecord, RecordId};

pub const SEED_SCENARIO_SCORES: [i64; 3] = [4, 1, 5];

pub fn record(id: &str, sender: &str, subject: &str, body: &str) -> InputRecord {
    InputRecord {
        id: RecordId::from(id),
        sender: sender.to_owned(),
        subject: subject.to_owned(),
        body: body.to_owned(),
    }
}

/// JSON text the model is asked to produce.
pub fn analyses_text(entries: &[(&str, i64)]) -> String {
    let analyses: Vec<Value> = entries
        .iter()
        .map(|(summary, score)| json!({ "summary": summary, "priorityScore": score }))
        .collect();
    json!({ "analyses": analyses }).to_string()
}

/// Wraps model output text in a `generateContent` response envelope.
pub fn generate_content_body(text: &str) -> String {
    json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [{ "text": text }]
            },
            "finishReason": "STOP"
        }]
    })
    .to_string()
}

pub fn seed_scenario_body() -> String {
    generate_content_body(&analyses_text(&[
        (
            "HR needs approval today to fix an executive payroll error.",
            SEED_SCENARIO_SCORES[0],
        ),
        (
            "Marketing shared a newsletter draft with no deadline.",
            SEED_SCENARIO_SCORES[1],
        ),
        (
            "An unrecognized device tried to log into the account.",
            SEED_SCENARIO_SCORES[2],
        ),
    ]))
}

pub fn service_error_body(code: u16, message: &str) -> String {
    json!({
        "error": { "code": code, "message": message, "status": "INVALID_ARGUMENT" }
    })
    .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedRequest {
    pub url: String,
    pub api_key: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CannedResponse {
    pub status: u16,
    pub body: String,
}

impl CannedResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// One-shot HTTP server that answers each incoming request with the next
/// canned response and records what it received.
pub struct MockService {
    base_url: String,
    handle: Option<JoinHandle<()>>,
    captured: Receiver<CapturedRequest>,
}

impl MockService {
    pub fn start(responses: Vec<CannedResponse>) -> Result<Self> {
        let server =
            Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
        let base_url = format!("http://{}/v1beta", server.server_addr());
        let (tx, captured) = mpsc::channel();

        let handle = thread::spawn(move || {
            for canned in responses {
                let Ok(mut request) = server.recv() else {
                    return;
                };
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                let api_key = request
                    .headers()
                    .iter()
                    .find(|header| header.field.equiv("x-goog-api-key"))
                    .map(|header| header.value.as_str().to_owned());
                let _ = tx.send(CapturedRequest {
                    url: request.url().to_owned(),
                    api_key,
                    body,
                });

                let mut response =
                    Response::from_string(canned.body).with_status_code(canned.status);
                if let Ok(header) = Header::from_bytes("Content-Type", "application/json") {
                    response = response.with_header(header);
                }
                let _ = request.respond(response);
            }
        });

        Ok(Self {
            base_url,
            handle: Some(handle),
            captured,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Waits for the server thread to answer every canned response, then
    /// returns the requests it saw.
    pub fn finish(mut self) -> Result<Vec<CapturedRequest>> {
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| anyhow!("mock server thread panicked"))?;
        }
        Ok(self.captured.try_iter().collect())
    }
}
