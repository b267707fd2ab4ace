// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::ids::RecordId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRecord {
    pub id: RecordId,
    pub sender: String,
    pub subject: String,
    pub body: String,
}

impl InputRecord {
    pub fn field(&self, field: RecordField) -> &str {
        match field {
            RecordField::Sender => &self.sender,
            RecordField::Subject => &self.subject,
            RecordField::Body => &self.body,
        }
    }

    fn field_mut(&mut self, field: RecordField) -> &mut String {
        match field {
            RecordField::Sender => &mut self.sender,
            RecordField::Subject => &mut self.subject,
            RecordField::Body => &mut self.body,
        }
    }

    pub fn set_field(&mut self, field: RecordField, value: impl Into<String>) {
        *self.field_mut(field) = value.into();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordField {
    Sender,
    Subject,
    Body,
}

impl RecordField {
    pub const ALL: [Self; 3] = [Self::Sender, Self::Subject, Self::Body];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sender => "sender",
            Self::Subject => "subject",
            Self::Body => "body",
        }
    }

    pub const fn is_multiline(self) -> bool {
        matches!(self, Self::Body)
    }
}

/// Priority on the 1 (low) to 5 (urgent) scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PriorityScore(u8);

impl PriorityScore {
    pub const MIN: Self = Self(1);
    pub const MAX: Self = Self(5);

    pub const fn new(value: i64) -> Option<Self> {
        if value >= Self::MIN.0 as i64 && value <= Self::MAX.0 as i64 {
            Some(Self(value as u8))
        } else {
            None
        }
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    pub const fn label(self) -> &'static str {
        match self.0 {
            1 => "Low",
            2 => "Normal",
            3 => "Elevated",
            4 => "High",
            _ => "Urgent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisOutcome {
    pub summary: String,
    pub priority_score: PriorityScore,
}

/// A record joined with the outcome produced for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayResult {
    pub record: InputRecord,
    pub outcome: AnalysisOutcome,
}

impl DisplayResult {
    pub fn priority(&self) -> PriorityScore {
        self.outcome.priority_score
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    Nav,
    Edit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisPhase {
    Idle,
    Loading { request_id: u64 },
}

#[cfg(test)]
mod tests {
    use super::{InputRecord, PriorityScore, RecordField};
    use crate::RecordId;

    #[test]
    fn priority_score_accepts_only_one_through_five() {
        assert_eq!(PriorityScore::new(0), None);
        assert_eq!(PriorityScore::new(6), None);
        assert_eq!(PriorityScore::new(-3), None);
        for value in 1..=5 {
            let score = PriorityScore::new(value).expect("score in range");
            assert_eq!(i64::from(score.get()), value);
        }
    }

    #[test]
    fn priority_labels_follow_scale() {
        let labels: Vec<&str> = (1..=5)
            .filter_map(PriorityScore::new)
            .map(PriorityScore::label)
            .collect();
        assert_eq!(labels, vec!["Low", "Normal", "Elevated", "High", "Urgent"]);
    }

    #[test]
    fn set_field_touches_only_named_field() {
        let mut record = InputRecord {
            id: RecordId::from("7"),
            sender: "a".to_owned(),
            subject: "b".to_owned(),
            body: "c".to_owned(),
        };
        record.set_field(RecordField::Subject, "changed");
        assert_eq!(record.sender, "a");
        assert_eq!(record.subject, "changed");
        assert_eq!(record.body, "c");
        assert_eq!(record.field(RecordField::Subject), "changed");
    }
}
