// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use time::OffsetDateTime;

use crate::{
    AnalysisOutcome, AnalysisPhase, AppMode, DisplayResult, InputRecord, RecordField, RecordId,
    RecordStore,
};

pub const ANALYSIS_FAILED_MESSAGE: &str =
    "Failed to analyze emails. Please check your API configuration.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub mode: AppMode,
    pub records: RecordStore,
    pub phase: AnalysisPhase,
    pub results: Vec<DisplayResult>,
    pub error: Option<String>,
    pub analyzed_at: Option<OffsetDateTime>,
    pub status_line: Option<String>,
    in_flight: Vec<InputRecord>,
    last_request_id: u64,
}

impl Default for AppState {
    fn default() -> Self {
        Self::with_records(RecordStore::seeded())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    EnterEditMode,
    ExitToNav,
    EditField {
        id: RecordId,
        field: RecordField,
        value: String,
    },
    BeginAnalysis,
    CompleteAnalysis {
        request_id: u64,
        outcomes: Vec<AnalysisOutcome>,
        at: OffsetDateTime,
    },
    FailAnalysis {
        request_id: u64,
        cause: String,
    },
    SetStatus(String),
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    ModeChanged(AppMode),
    RecordEdited {
        id: RecordId,
        field: RecordField,
    },
    AnalysisStarted {
        request_id: u64,
        records: Vec<InputRecord>,
    },
    AnalysisIgnored,
    ResultsReplaced {
        count: usize,
    },
    AnalysisFailed {
        cause: String,
    },
    StaleResponseDropped {
        request_id: u64,
    },
    StatusUpdated(String),
    StatusCleared,
}

impl AppState {
    pub fn with_records(records: RecordStore) -> Self {
        Self {
            mode: AppMode::Nav,
            records,
            phase: AnalysisPhase::Idle,
            results: Vec::new(),
            error: None,
            analyzed_at: None,
            status_line: None,
            in_flight: Vec::new(),
            last_request_id: 0,
        }
    }

    pub const fn is_loading(&self) -> bool {
        matches!(self.phase, AnalysisPhase::Loading { .. })
    }

    pub fn dispatch(&mut self, command: AppCommand) -> Vec<AppEvent> {
        match command {
            AppCommand::EnterEditMode => {
                self.mode = AppMode::Edit;
                vec![AppEvent::ModeChanged(self.mode)]
            }
            AppCommand::ExitToNav => {
                self.mode = AppMode::Nav;
                vec![AppEvent::ModeChanged(self.mode)]
            }
            AppCommand::EditField { id, field, value } => {
                if self.records.update(&id, field, value) {
                    vec![AppEvent::RecordEdited { id, field }]
                } else {
                    Vec::new()
                }
            }
            AppCommand::BeginAnalysis => self.begin_analysis(),
            AppCommand::CompleteAnalysis {
                request_id,
                outcomes,
                at,
            } => self.complete_analysis(request_id, outcomes, at),
            AppCommand::FailAnalysis { request_id, cause } => {
                if !self.owns_request(request_id) {
                    return vec![AppEvent::StaleResponseDropped { request_id }];
                }
                self.fail_in_flight(cause)
            }
            AppCommand::SetStatus(message) => vec![self.set_status(message)],
            AppCommand::ClearStatus => {
                self.status_line = None;
                vec![AppEvent::StatusCleared]
            }
        }
    }

    fn begin_analysis(&mut self) -> Vec<AppEvent> {
        if self.is_loading() {
            return vec![AppEvent::AnalysisIgnored];
        }

        self.last_request_id = self.last_request_id.saturating_add(1);
        let request_id = self.last_request_id;
        self.phase = AnalysisPhase::Loading { request_id };
        self.error = None;
        self.in_flight = self.records.snapshot();
        vec![
            AppEvent::AnalysisStarted {
                request_id,
                records: self.in_flight.clone(),
            },
            self.set_status("analyzing..."),
        ]
    }

    fn complete_analysis(
        &mut self,
        request_id: u64,
        outcomes: Vec<AnalysisOutcome>,
        at: OffsetDateTime,
    ) -> Vec<AppEvent> {
        if !self.owns_request(request_id) {
            return vec![AppEvent::StaleResponseDropped { request_id }];
        }

        match merge_results(&self.in_flight, outcomes) {
            Ok(results) => {
                let count = results.len();
                self.results = results;
                self.analyzed_at = Some(at);
                self.finish_in_flight();
                vec![
                    AppEvent::ResultsReplaced { count },
                    self.set_status(format!("analyzed {count} emails")),
                ]
            }
            Err(error) => self.fail_in_flight(format!("{error:#}")),
        }
    }

    fn fail_in_flight(&mut self, cause: String) -> Vec<AppEvent> {
        self.error = Some(ANALYSIS_FAILED_MESSAGE.to_owned());
        self.finish_in_flight();
        vec![
            AppEvent::AnalysisFailed { cause },
            self.set_status("analysis failed"),
        ]
    }

    fn finish_in_flight(&mut self) {
        self.phase = AnalysisPhase::Idle;
        self.in_flight.clear();
    }

    fn owns_request(&self, request_id: u64) -> bool {
        self.phase == AnalysisPhase::Loading { request_id }
    }

    fn set_status(&mut self, message: impl Into<String>) -> AppEvent {
        let message = message.into();
        self.status_line = Some(message.clone());
        AppEvent::StatusUpdated(message)
    }
}

/// Joins each outcome with the record at the same position and orders the
/// result by descending priority.
pub fn merge_results(
    records: &[InputRecord],
    outcomes: Vec<AnalysisOutcome>,
) -> Result<Vec<DisplayResult>> {
    if records.len() != outcomes.len() {
        bail!(
            "expected {} analyses, got {}; results cannot be matched to emails",
            records.len(),
            outcomes.len()
        );
    }

    let mut results: Vec<DisplayResult> = records
        .iter()
        .cloned()
        .zip(outcomes)
        .map(|(record, outcome)| DisplayResult { record, outcome })
        .collect();
    sort_by_priority(&mut results);
    Ok(results)
}

/// Stable: equal scores keep their relative order.
pub fn sort_by_priority(results: &mut [DisplayResult]) {
    results.sort_by(|left, right| right.priority().cmp(&left.priority()));
}

#[cfg(test)]
mod tests {
    use super::{
        ANALYSIS_FAILED_MESSAGE, AppCommand, AppEvent, AppState, merge_results, sort_by_priority,
    };
    use crate::{
        AnalysisOutcome, AnalysisPhase, AppMode, PriorityScore, RecordField, RecordId, RecordStore,
    };
    use time::OffsetDateTime;

    fn outcome(summary: &str, score: i64) -> AnalysisOutcome {
        AnalysisOutcome {
            summary: summary.to_owned(),
            priority_score: PriorityScore::new(score).expect("valid score"),
        }
    }

    fn started_request_id(events: &[AppEvent]) -> u64 {
        events
            .iter()
            .find_map(|event| match event {
                AppEvent::AnalysisStarted { request_id, .. } => Some(*request_id),
                _ => None,
            })
            .expect("analysis should start")
    }

    #[test]
    fn merge_sorts_seed_scenario_by_priority() -> anyhow::Result<()> {
        let records = RecordStore::seeded().snapshot();
        let results = merge_results(
            &records,
            vec![
                outcome("Payroll needs approval today.", 4),
                outcome("Newsletter draft is ready for review.", 1),
                outcome("Someone tried to log in from abroad.", 5),
            ],
        )?;

        let order: Vec<(&str, u8)> = results
            .iter()
            .map(|r| (r.record.id.as_str(), r.priority().get()))
            .collect();
        assert_eq!(order, vec![("3", 5), ("1", 4), ("2", 1)]);
        assert_eq!(results[0].record.sender, "Security Alerts");
        assert_eq!(
            results[0].outcome.summary,
            "Someone tried to log in from abroad."
        );
        Ok(())
    }

    #[test]
    fn merge_keeps_original_order_for_ties() -> anyhow::Result<()> {
        let records = RecordStore::seeded().snapshot();
        let results = merge_results(
            &records,
            vec![outcome("a", 3), outcome("b", 3), outcome("c", 3)],
        )?;
        let ids: Vec<&str> = results.iter().map(|r| r.record.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        Ok(())
    }

    #[test]
    fn sorting_sorted_results_is_idempotent() -> anyhow::Result<()> {
        let records = RecordStore::seeded().snapshot();
        let mut results = merge_results(
            &records,
            vec![outcome("a", 2), outcome("b", 5), outcome("c", 2)],
        )?;
        let once = results.clone();
        sort_by_priority(&mut results);
        assert_eq!(results, once);
        Ok(())
    }

    #[test]
    fn merge_rejects_count_mismatch() {
        let records = RecordStore::seeded().snapshot();
        let error = merge_results(&records, vec![outcome("only one", 2)])
            .expect_err("mismatched counts should fail");
        assert!(error.to_string().contains("expected 3 analyses, got 1"));
    }

    #[test]
    fn begin_analysis_enters_loading_and_clears_error() {
        let mut state = AppState {
            error: Some("old".to_owned()),
            ..AppState::default()
        };

        let events = state.dispatch(AppCommand::BeginAnalysis);
        let request_id = started_request_id(&events);
        assert_eq!(state.phase, AnalysisPhase::Loading { request_id });
        assert!(state.error.is_none());
        assert!(matches!(
            &events[0],
            AppEvent::AnalysisStarted { records, .. } if records.len() == 3
        ));
    }

    #[test]
    fn begin_analysis_while_loading_is_ignored() {
        let mut state = AppState::default();
        let first = state.dispatch(AppCommand::BeginAnalysis);
        let request_id = started_request_id(&first);

        let second = state.dispatch(AppCommand::BeginAnalysis);
        assert_eq!(second, vec![AppEvent::AnalysisIgnored]);
        assert_eq!(state.phase, AnalysisPhase::Loading { request_id });
    }

    #[test]
    fn completion_replaces_results_and_returns_to_idle() {
        let mut state = AppState::default();
        let request_id = started_request_id(&state.dispatch(AppCommand::BeginAnalysis));

        let events = state.dispatch(AppCommand::CompleteAnalysis {
            request_id,
            outcomes: vec![outcome("a", 4), outcome("b", 1), outcome("c", 5)],
            at: OffsetDateTime::UNIX_EPOCH,
        });

        assert_eq!(events[0], AppEvent::ResultsReplaced { count: 3 });
        assert_eq!(state.phase, AnalysisPhase::Idle);
        assert_eq!(state.results.len(), 3);
        assert_eq!(state.results[0].record.id, RecordId::from("3"));
        assert_eq!(state.analyzed_at, Some(OffsetDateTime::UNIX_EPOCH));
    }

    #[test]
    fn results_use_snapshot_taken_at_trigger_time() {
        let mut state = AppState::default();
        let request_id = started_request_id(&state.dispatch(AppCommand::BeginAnalysis));

        state.dispatch(AppCommand::EditField {
            id: RecordId::from("1"),
            field: RecordField::Sender,
            value: "edited mid-flight".to_owned(),
        });
        state.dispatch(AppCommand::CompleteAnalysis {
            request_id,
            outcomes: vec![outcome("a", 1), outcome("b", 1), outcome("c", 1)],
            at: OffsetDateTime::UNIX_EPOCH,
        });

        assert_eq!(state.results[0].record.sender, "Sarah Jenkins (HR)");
        assert_eq!(
            state
                .records
                .get(&RecordId::from("1"))
                .map(|r| r.sender.as_str()),
            Some("edited mid-flight")
        );
    }

    #[test]
    fn failure_preserves_previous_results() {
        let mut state = AppState::default();
        let first = started_request_id(&state.dispatch(AppCommand::BeginAnalysis));
        state.dispatch(AppCommand::CompleteAnalysis {
            request_id: first,
            outcomes: vec![outcome("a", 2), outcome("b", 3), outcome("c", 1)],
            at: OffsetDateTime::UNIX_EPOCH,
        });
        let previous = state.results.clone();

        let second = started_request_id(&state.dispatch(AppCommand::BeginAnalysis));
        let events = state.dispatch(AppCommand::FailAnalysis {
            request_id: second,
            cause: "model output was not valid JSON".to_owned(),
        });

        assert_eq!(
            events,
            vec![
                AppEvent::AnalysisFailed {
                    cause: "model output was not valid JSON".to_owned(),
                },
                AppEvent::StatusUpdated("analysis failed".to_owned()),
            ]
        );
        assert_eq!(state.error.as_deref(), Some(ANALYSIS_FAILED_MESSAGE));
        assert_eq!(state.results, previous);
        assert_eq!(state.phase, AnalysisPhase::Idle);
    }

    #[test]
    fn failure_replaces_loading_status() {
        let mut state = AppState::default();
        let request_id = started_request_id(&state.dispatch(AppCommand::BeginAnalysis));
        assert_eq!(state.status_line.as_deref(), Some("analyzing..."));

        state.dispatch(AppCommand::FailAnalysis {
            request_id,
            cause: "cannot reach http://127.0.0.1:1/v1beta".to_owned(),
        });

        assert_eq!(state.status_line.as_deref(), Some("analysis failed"));
        assert!(!state.is_loading());
    }

    #[test]
    fn completion_with_wrong_count_is_a_failure() {
        let mut state = AppState::default();
        let request_id = started_request_id(&state.dispatch(AppCommand::BeginAnalysis));

        let events = state.dispatch(AppCommand::CompleteAnalysis {
            request_id,
            outcomes: Vec::new(),
            at: OffsetDateTime::UNIX_EPOCH,
        });

        assert!(matches!(&events[0], AppEvent::AnalysisFailed { cause } if cause.contains("got 0")));
        assert!(state.results.is_empty());
        assert_eq!(state.error.as_deref(), Some(ANALYSIS_FAILED_MESSAGE));
        assert!(!state.is_loading());
    }

    #[test]
    fn stale_responses_are_dropped() {
        let mut state = AppState::default();
        let events = state.dispatch(AppCommand::CompleteAnalysis {
            request_id: 42,
            outcomes: Vec::new(),
            at: OffsetDateTime::UNIX_EPOCH,
        });
        assert_eq!(events, vec![AppEvent::StaleResponseDropped { request_id: 42 }]);

        let events = state.dispatch(AppCommand::FailAnalysis {
            request_id: 42,
            cause: "late".to_owned(),
        });
        assert_eq!(events, vec![AppEvent::StaleResponseDropped { request_id: 42 }]);
        assert!(state.error.is_none());
    }

    #[test]
    fn edit_unknown_record_emits_nothing() {
        let mut state = AppState::default();
        let before = state.records.clone();
        let events = state.dispatch(AppCommand::EditField {
            id: RecordId::from("99"),
            field: RecordField::Body,
            value: "x".to_owned(),
        });
        assert!(events.is_empty());
        assert_eq!(state.records, before);
    }

    #[test]
    fn mode_transitions() {
        let mut state = AppState::default();

        state.dispatch(AppCommand::EnterEditMode);
        assert_eq!(state.mode, AppMode::Edit);

        state.dispatch(AppCommand::ExitToNav);
        assert_eq!(state.mode, AppMode::Nav);
    }
}
