//! Payload shapes carried by each envelope type.

use serde::{Deserialize, Serialize};

/// One prior question/answer exchange, oldest first in a history sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Question asked by the user.
    pub query: String,
    /// Answer returned for it.
    pub answer: String,
}

/// Payload of an `UPLOAD` envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadPayload {
    /// Paths of the uploaded files, in upload order.
    pub file_paths: Vec<String>,
    /// Question to answer.
    pub query: String,
    /// Prior chat turns.
    pub history: Vec<ChatTurn>,
}

/// Payload of a `PARSED` envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsedPayload {
    /// Extracted text, one entry per uploaded file.
    pub documents: Vec<String>,
    /// Question to answer.
    pub query: String,
    /// Prior chat turns.
    pub history: Vec<ChatTurn>,
}

/// Payload of a `RETRIEVED` envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievedPayload {
    /// Retrieved chunk texts, nearest first.
    pub retrieved_context: Vec<String>,
    /// Question to answer.
    pub query: String,
    /// Prior chat turns.
    pub history: Vec<ChatTurn>,
}

/// Payload of an `ANSWERED` envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnsweredPayload {
    /// Question that was answered.
    pub query: String,
    /// Generated answer text.
    pub answer: String,
    /// Chunks the answer was grounded on.
    pub sources: Vec<String>,
}
