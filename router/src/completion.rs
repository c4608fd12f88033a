//! Chat-completion response built from the collected replies.

use crate::{collector::OutputCollector, ReplyEvent};

#[derive(serde::Serialize, Debug, Clone, PartialEq)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

#[derive(serde::Serialize, Debug, Clone, PartialEq)]
pub struct Choice {
    pub index: u32,
    pub message: AssistantMessage,
    pub logprobs: Option<serde_json::Value>,
    pub finish_reason: &'static str,
}

#[derive(serde::Serialize, Debug, Clone, PartialEq)]
pub struct AssistantMessage {
    pub role: &'static str,
    /// `null` when the pipeline produced no reply, or a reply without text.
    pub content: Option<String>,
}

#[derive(serde::Serialize, Debug, Clone, Default, PartialEq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl ChatCompletionResponse {
    /// Only the first reply is surfaced, the others are dropped.
    pub fn from_replies(replies: &[ReplyEvent], model: &str, created: i64) -> Self {
        let content = replies.first().and_then(|reply| reply.text.clone());

        if replies.len() > 1 {
            tracing::debug!(dropped = replies.len() - 1, "Surfacing first reply only");
        }

        Self {
            id: String::new(),
            object: "chat.completion",
            created,
            model: model.to_string(),
            choices: vec![Choice {
                index: 0,
                message: AssistantMessage {
                    role: "assistant",
                    content,
                },
                logprobs: None,
                finish_reason: "stop",
            }],
            usage: Usage::default(),
        }
    }
}

/// Formats whatever the collector holds, stamped with the current time.
pub fn format(collector: &mut OutputCollector, model: &str) -> ChatCompletionResponse {
    let created = chrono::Utc::now().timestamp();
    ChatCompletionResponse::from_replies(collector.snapshot(), model, created)
}
