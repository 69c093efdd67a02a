use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

pub const NO_EXISTING_QUESTIONS: &str = "No existing questions to compare against.";
pub const NOT_ENOUGH_QUESTIONS: &str = "Not enough questions to form a group.";

/// One question/answer pair from the reference set, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "Question", default, deserialize_with = "null_as_empty")]
    pub question: String,
    #[serde(rename = "Answer", default, deserialize_with = "null_as_empty")]
    pub answer: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl Record {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

/// Records connected through above-threshold similarities, in corpus order.
pub type Cluster = Vec<Record>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Yes,
    No,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Yes => f.write_str("yes"),
            Verdict::No => f.write_str("no"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRequest {
    pub questions_url: Option<String>,
    pub question: Option<String>,
    pub embedding_provider: Option<String>,
    pub reasoning_provider: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRequest {
    pub questions_url: Option<String>,
    pub embedding_provider: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResponse {
    pub response: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_questions: Option<Vec<Record>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CheckResponse {
    /// `yes` with the matches, or a bare `no` when nothing matched.
    pub fn from_matches(matches: Vec<Record>) -> Self {
        if matches.is_empty() {
            Self::no_match()
        } else {
            Self {
                response: Verdict::Yes,
                matched_questions: Some(matches),
                reason: None,
            }
        }
    }

    pub fn no_match() -> Self {
        Self {
            response: Verdict::No,
            matched_questions: None,
            reason: None,
        }
    }

    pub fn empty_corpus() -> Self {
        Self {
            response: Verdict::No,
            matched_questions: None,
            reason: Some(NO_EXISTING_QUESTIONS.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupResponse {
    pub response: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_groups: Option<Vec<Cluster>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl GroupResponse {
    pub fn from_groups(groups: Vec<Cluster>) -> Self {
        if groups.is_empty() {
            Self::no_groups()
        } else {
            Self {
                response: Verdict::Yes,
                matched_groups: Some(groups),
                reason: None,
            }
        }
    }

    pub fn no_groups() -> Self {
        Self {
            response: Verdict::No,
            matched_groups: None,
            reason: None,
        }
    }

    pub fn not_enough_items() -> Self {
        Self {
            response: Verdict::No,
            matched_groups: None,
            reason: Some(NOT_ENOUGH_QUESTIONS.to_string()),
        }
    }
}
