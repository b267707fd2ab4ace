// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use std::sync::mpsc::Sender;
use std::thread;
use triage_app::InputRecord;
use triage_llm::Client;
use triage_tui::{InternalEvent, analysis_event};

pub struct LlmRuntime {
    client: Client,
}

impl LlmRuntime {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl triage_tui::AppRuntime for LlmRuntime {
    fn spawn_analysis(
        &mut self,
        request_id: u64,
        records: Vec<InputRecord>,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let client = self.client.clone();
        thread::Builder::new()
            .name(format!("analysis-{request_id}"))
            .spawn(move || {
                let result = client.analyze(&records).map_err(anyhow::Error::from);
                if tx.send(analysis_event(request_id, result)).is_err() {
                    tracing::debug!(request_id, "ui closed before analysis finished");
                }
            })?;
        Ok(())
    }
}
