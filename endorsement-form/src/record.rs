use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::catalog::{Endorsement, Policy};

/// Written in place of an empty explanation.
pub const NO_EXPLANATION: &str = "No explanation provided";

/// Locale-independent write-time timestamp format.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Column order of every persisted row. Remote sinks write the first nine.
pub const COLUMNS: [&str; 10] = [
    "account_name",
    "company_name",
    "project_name",
    "ics_link",
    "policy",
    "endorsement",
    "audit_resolution",
    "agree_with_ai",
    "explanation",
    "timestamp",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum YesNo {
    Yes,
    No,
}

impl YesNo {
    pub fn as_str(&self) -> &'static str {
        match self {
            YesNo::Yes => "Yes",
            YesNo::No => "No",
        }
    }
}

impl fmt::Display for YesNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One flattened output row for a fully answered (policy, endorsement) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub account_name: String,
    pub company_name: String,
    pub project_name: String,
    pub ics_link: String,
    pub policy: Policy,
    pub endorsement: Endorsement,
    pub audit_resolution: YesNo,
    pub agree_with_ai: YesNo,
    pub explanation: String,
    /// Set by the sink at write time, never by expansion.
    pub timestamp: Option<NaiveDateTime>,
}

impl Record {
    pub fn stamped(&self, at: NaiveDateTime) -> Record {
        Record {
            timestamp: Some(at),
            ..self.clone()
        }
    }

    /// The nine answer columns, in persisted order.
    pub fn answer_fields(&self) -> [String; 9] {
        [
            self.account_name.clone(),
            self.company_name.clone(),
            self.project_name.clone(),
            self.ics_link.clone(),
            self.policy.to_string(),
            self.endorsement.to_string(),
            self.audit_resolution.to_string(),
            self.agree_with_ai.to_string(),
            self.explanation.clone(),
        ]
    }

    /// All ten columns. An unstamped record has an empty timestamp cell.
    pub fn row(&self) -> Vec<String> {
        let mut row = self.answer_fields().to_vec();
        row.push(
            self.timestamp
                .map(|t| t.format(TIMESTAMP_FORMAT).to_string())
                .unwrap_or_default(),
        );
        row
    }
}
