//! Message envelope passed between pipeline stages.
//!
//! Every stage consumes one [`Envelope`] and produces the next one. The `type` tag and the
//! payload travel together as a [`MessageBody`] variant, so a stage matches on the variant it
//! expects instead of probing string keys. On the wire an envelope is a flat JSON object:
//!
//! ```json
//! { "sender": "UI", "receiver": "IngestionStage", "type": "UPLOAD",
//!   "trace_id": "…", "payload": { "file_paths": [], "query": "", "history": [] } }
//! ```

mod payload;

pub use payload::{AnsweredPayload, ChatTurn, ParsedPayload, RetrievedPayload, UploadPayload};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Sender name used for envelopes originating outside the pipeline.
pub const UI: &str = "UI";
/// Name of the parsing dispatcher stage.
pub const INGESTION_STAGE: &str = "IngestionStage";
/// Name of the indexing and retrieval stage.
pub const RETRIEVAL_STAGE: &str = "RetrievalStage";
/// Name of the answer composition stage.
pub const ANSWER_STAGE: &str = "AnswerStage";

/// Errors raised while converting envelopes to and from plain values.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The value did not describe a valid envelope.
    #[error("Failed to decode envelope: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Tag identifying which payload an envelope carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    /// Files were uploaded with a question.
    Upload,
    /// Files were turned into text.
    Parsed,
    /// Relevant chunks were retrieved for the question.
    Retrieved,
    /// The question was answered.
    Answered,
}

impl MessageKind {
    /// Wire name of the tag.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "UPLOAD",
            Self::Parsed => "PARSED",
            Self::Retrieved => "RETRIEVED",
            Self::Answered => "ANSWERED",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed payload of an envelope, one variant per [`MessageKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    /// Upload request entering the pipeline.
    Upload(UploadPayload),
    /// Extracted document texts.
    Parsed(ParsedPayload),
    /// Retrieved context for the question.
    Retrieved(RetrievedPayload),
    /// Final answer with cited sources.
    Answered(AnsweredPayload),
}

impl MessageBody {
    /// Tag matching this payload.
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Upload(_) => MessageKind::Upload,
            Self::Parsed(_) => MessageKind::Parsed,
            Self::Retrieved(_) => MessageKind::Retrieved,
            Self::Answered(_) => MessageKind::Answered,
        }
    }

    fn to_payload_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Upload(payload) => serde_json::to_value(payload),
            Self::Parsed(payload) => serde_json::to_value(payload),
            Self::Retrieved(payload) => serde_json::to_value(payload),
            Self::Answered(payload) => serde_json::to_value(payload),
        }
    }

    fn from_payload_value(kind: MessageKind, payload: Value) -> Result<Self, serde_json::Error> {
        // A missing payload decodes as the empty payload of the tagged type.
        let payload = match payload {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        Ok(match kind {
            MessageKind::Upload => Self::Upload(serde_json::from_value(payload)?),
            MessageKind::Parsed => Self::Parsed(serde_json::from_value(payload)?),
            MessageKind::Retrieved => Self::Retrieved(serde_json::from_value(payload)?),
            MessageKind::Answered => Self::Answered(serde_json::from_value(payload)?),
        })
    }
}

/// Typed, traceable unit of communication between pipeline stages.
///
/// The trace identifier is fixed at construction; follow-up envelopes of the same request are
/// created with [`Envelope::reply`], which carries it over unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireEnvelope", into = "WireEnvelope")]
pub struct Envelope {
    sender: String,
    receiver: String,
    trace_id: String,
    body: MessageBody,
}

impl Envelope {
    /// Start a new trace with a freshly generated identifier.
    pub fn new(sender: impl Into<String>, receiver: impl Into<String>, body: MessageBody) -> Self {
        Self::with_trace_id(sender, receiver, String::new(), body)
    }

    /// Build an envelope within an existing trace. An empty identifier starts a new trace.
    pub fn with_trace_id(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        trace_id: impl Into<String>,
        body: MessageBody,
    ) -> Self {
        let trace_id = trace_id.into();
        let trace_id = if trace_id.trim().is_empty() {
            generate_trace_id()
        } else {
            trace_id
        };
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            trace_id,
            body,
        }
    }

    /// Build the next envelope of this trace.
    pub fn reply(
        &self,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        body: MessageBody,
    ) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            trace_id: self.trace_id.clone(),
            body,
        }
    }

    /// Stage that produced the envelope.
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Stage the envelope is addressed to.
    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    /// Correlation identifier shared by every envelope of one request.
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Tag of the carried payload.
    pub fn kind(&self) -> MessageKind {
        self.body.kind()
    }

    /// Borrow the typed payload.
    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    /// Consume the envelope, returning the typed payload.
    pub fn into_body(self) -> MessageBody {
        self.body
    }

    /// Convert into a plain `{sender, receiver, type, trace_id, payload}` object.
    pub fn to_value(&self) -> Result<Value, EnvelopeError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Reconstruct an envelope from a plain object produced by [`Envelope::to_value`].
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_value(value)?)
    }
}

fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Flat wire representation shared by serialization and deserialization.
#[derive(Serialize, Deserialize)]
struct WireEnvelope {
    sender: String,
    receiver: String,
    #[serde(rename = "type")]
    kind: MessageKind,
    #[serde(default)]
    trace_id: Option<String>,
    #[serde(default)]
    payload: Value,
}

impl TryFrom<WireEnvelope> for Envelope {
    type Error = serde_json::Error;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        let body = MessageBody::from_payload_value(wire.kind, wire.payload)?;
        Ok(Self::with_trace_id(
            wire.sender,
            wire.receiver,
            wire.trace_id.unwrap_or_default(),
            body,
        ))
    }
}

impl From<Envelope> for WireEnvelope {
    fn from(envelope: Envelope) -> Self {
        let kind = envelope.kind();
        // Payload structs contain only strings and sequences, which always serialize.
        let payload = envelope
            .body
            .to_payload_value()
            .unwrap_or_else(|_| Value::Object(Default::default()));
        Self {
            sender: envelope.sender,
            receiver: envelope.receiver,
            kind,
            trace_id: Some(envelope.trace_id),
            payload,
        }
    }
}
