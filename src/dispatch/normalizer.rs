use serde::{Deserialize, Serialize};

use crate::handlers::{HandlerOutput, Value};

/// What came out of one query, before it is put on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success { values: Value, data: Option<Value> },
    Failure { error: String },
}

impl Outcome {
    pub fn failure(error: impl ToString) -> Self {
        Outcome::Failure {
            error: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

impl From<HandlerOutput> for Outcome {
    fn from(output: HandlerOutput) -> Self {
        Outcome::Success {
            values: output.values,
            data: output.data,
        }
    }
}

/// One element of `results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub values: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Response body of `POST /query`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    Results { results: Vec<ResultEntry> },
    Error { error: String },
}

/// Map an outcome onto the wire shape. A success always carries exactly one
/// result entry.
pub fn normalize(outcome: Outcome) -> Envelope {
    match outcome {
        Outcome::Success { values, data } => Envelope::Results {
            results: vec![ResultEntry { values, data }],
        },
        Outcome::Failure { error } => Envelope::Error { error },
    }
}

impl From<Outcome> for Envelope {
    fn from(outcome: Outcome) -> Self {
        normalize(outcome)
    }
}
