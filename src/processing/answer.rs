//! Answer composition stage: `RETRIEVED` in, `ANSWERED` out.

use super::types::PipelineError;
use crate::generation::GenerationClient;
use crate::protocol::{
    ANSWER_STAGE, AnsweredPayload, ChatTurn, Envelope, MessageBody, RetrievedPayload, UI,
};
use std::sync::Arc;

/// Build the prompt sent to the generation model.
///
/// The layout is fixed: prior turns as `User:`/`Bot:` lines, then the context chunks one per line,
/// then the question. With no history the prompt starts with the blank separator line.
pub fn compose_prompt(chunks: &[String], query: &str, history: &[ChatTurn]) -> String {
    let history_lines = history
        .iter()
        .map(|turn| format!("User: {}\nBot: {}", turn.query, turn.answer))
        .collect::<Vec<_>>()
        .join("\n");
    let context = chunks.join("\n");

    format!(
        "{history_lines}\n\nUse the following context to answer the question.\n\nContext:\n{context}\n\nQuestion: {query}\nAnswer:"
    )
}

/// Asks the generation model to answer from the retrieved context.
#[derive(Clone)]
pub struct AnswerStage {
    generation: Arc<dyn GenerationClient>,
}

impl AnswerStage {
    /// Wrap a shared generation client.
    pub fn new(generation: Arc<dyn GenerationClient>) -> Self {
        Self { generation }
    }

    /// Generate the answer and reply with it, citing the retrieved chunks as sources.
    pub async fn handle(&self, envelope: Envelope) -> Result<Envelope, PipelineError> {
        let MessageBody::Retrieved(RetrievedPayload {
            retrieved_context,
            query,
            history,
        }) = envelope.body()
        else {
            return Err(PipelineError::UnsupportedType {
                stage: ANSWER_STAGE,
                kind: envelope.kind(),
            });
        };

        let prompt = compose_prompt(retrieved_context, query, history);
        tracing::debug!(
            trace_id = envelope.trace_id(),
            prompt_chars = prompt.chars().count(),
            "Requesting answer"
        );
        let answer = self.generation.generate(&prompt).await?;
        tracing::info!(trace_id = envelope.trace_id(), "Answer generated");

        Ok(envelope.reply(
            ANSWER_STAGE,
            UI,
            MessageBody::Answered(AnsweredPayload {
                query: query.clone(),
                answer,
                sources: retrieved_context.clone(),
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationClientError;
    use crate::protocol::{MessageKind, RETRIEVAL_STAGE};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingClient {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl GenerationClient for RecordingClient {
        async fn generate(&self, prompt: &str) -> Result<String, GenerationClientError> {
            self.prompts
                .lock()
                .expect("prompt log")
                .push(prompt.to_string());
            Ok("  The sky is blue.\n".to_string())
        }
    }

    struct FailingClient;

    #[async_trait]
    impl GenerationClient for FailingClient {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationClientError> {
            Err(GenerationClientError::GenerationFailed("quota".into()))
        }
    }

    fn retrieved(history: Vec<ChatTurn>) -> Envelope {
        Envelope::new(
            RETRIEVAL_STAGE,
            ANSWER_STAGE,
            MessageBody::Retrieved(RetrievedPayload {
                retrieved_context: vec!["The sky is blue.".into(), "Grass is green.".into()],
                query: "What color is the sky?".into(),
                history,
            }),
        )
    }

    #[test]
    fn prompt_without_history_starts_with_separator() {
        let prompt = compose_prompt(&["c1".into(), "c2".into()], "q?", &[]);
        assert_eq!(
            prompt,
            "\n\nUse the following context to answer the question.\n\nContext:\nc1\nc2\n\nQuestion: q?\nAnswer:"
        );
    }

    #[test]
    fn prompt_lists_history_turns_in_order() {
        let history = vec![
            ChatTurn {
                query: "Hi".into(),
                answer: "Hello".into(),
            },
            ChatTurn {
                query: "How are you?".into(),
                answer: "Fine".into(),
            },
        ];
        let prompt = compose_prompt(&["ctx".into()], "q", &history);
        assert!(prompt.starts_with("User: Hi\nBot: Hello\nUser: How are you?\nBot: Fine\n\n"));
        assert!(prompt.ends_with("Context:\nctx\n\nQuestion: q\nAnswer:"));
    }

    #[tokio::test]
    async fn answer_is_returned_verbatim_with_sources() {
        let client = Arc::new(RecordingClient::default());
        let stage = AnswerStage::new(client.clone());
        let history = vec![ChatTurn {
            query: "Hi".into(),
            answer: "Hello".into(),
        }];
        let envelope = retrieved(history);

        let reply = stage.handle(envelope.clone()).await.expect("answered");
        assert_eq!(reply.kind(), MessageKind::Answered);
        assert_eq!(reply.trace_id(), envelope.trace_id());
        assert_eq!(reply.receiver(), UI);

        let MessageBody::Answered(payload) = reply.into_body() else {
            panic!("expected answered payload");
        };
        assert_eq!(payload.answer, "  The sky is blue.\n");
        assert_eq!(payload.query, "What color is the sky?");
        assert_eq!(payload.sources, vec!["The sky is blue.", "Grass is green."]);

        let prompts = client.prompts.lock().expect("prompt log");
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].starts_with("User: Hi\nBot: Hello\n\n"));
    }

    #[tokio::test]
    async fn generation_errors_propagate() {
        let stage = AnswerStage::new(Arc::new(FailingClient));
        let error = stage.handle(retrieved(Vec::new())).await.expect_err("failure");
        assert!(matches!(error, PipelineError::Generation(_)));
    }

    #[tokio::test]
    async fn rejects_other_envelope_types() {
        let stage = AnswerStage::new(Arc::new(RecordingClient::default()));
        let envelope = Envelope::new(
            RETRIEVAL_STAGE,
            ANSWER_STAGE,
            MessageBody::Answered(AnsweredPayload::default()),
        );
        let error = stage.handle(envelope).await.expect_err("unsupported");
        assert!(matches!(
            error,
            PipelineError::UnsupportedType {
                stage: ANSWER_STAGE,
                kind: MessageKind::Answered
            }
        ));
    }
}
