// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{InputRecord, RecordField, RecordId};

const SEED_RECORDS: [(&str, &str, &str, &str); 3] = [
    (
        "1",
        "Sarah Jenkins (HR)",
        "Urgent: Payroll Discrepancy for Q3",
        "Hello, we noticed a major error in the payroll calculations for the executive team. We need your approval to correct this by end of day to ensure everyone is paid correctly tomorrow.",
    ),
    (
        "2",
        "John Doe (Marketing)",
        "Newsletter Draft for October",
        "Hi, here is the first draft of our upcoming newsletter. Please take a look whenever you have a chance this week. No rush on the feedback.",
    ),
    (
        "3",
        "Security Alerts",
        "Unauthorized Login Attempt Detected",
        "Alert: An unrecognized device attempted to log into your account from a location in Eastern Europe. If this was not you, please secure your account immediately.",
    ),
];

/// Ordered, fixed-size set of editable records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordStore {
    records: Vec<InputRecord>,
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::seeded()
    }
}

impl RecordStore {
    pub fn seeded() -> Self {
        let records = SEED_RECORDS
            .iter()
            .map(|(id, sender, subject, body)| InputRecord {
                id: RecordId::from(*id),
                sender: (*sender).to_owned(),
                subject: (*subject).to_owned(),
                body: (*body).to_owned(),
            })
            .collect();
        Self { records }
    }

    pub fn records(&self) -> &[InputRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &RecordId) -> Option<&InputRecord> {
        self.records.iter().find(|record| &record.id == id)
    }

    /// Replaces one field of the record with `id`. Returns false and leaves
    /// the store untouched when no record matches.
    pub fn update(&mut self, id: &RecordId, field: RecordField, value: impl Into<String>) -> bool {
        let Some(record) = self.records.iter_mut().find(|record| &record.id == id) else {
            return false;
        };
        record.set_field(field, value);
        true
    }

    pub fn snapshot(&self) -> Vec<InputRecord> {
        self.records.clone()
    }
}
