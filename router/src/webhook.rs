//! HTTP surface: liveness check and the chat-completions webhook.

use crate::{
    completion::{self, ChatCompletionResponse},
    extract,
    pipeline::{self, DispatchOutcome, Pipeline},
    InboundRequest, MessageEnvelope, DEFAULT_CHANNEL_NAME, DEFAULT_MODEL,
};

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use http::HeaderMap;
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span};

/// Turns webhook calls into pipeline messages and pipeline replies into
/// chat completions.
#[derive(Clone)]
pub struct WebhookHandler {
    pipeline: Arc<dyn Pipeline>,
    channel_name: String,
    model: String,
    deadline: Option<Duration>,
    shutdown: CancellationToken,
    span: Span,
}

impl WebhookHandler {
    pub fn new(pipeline: Arc<dyn Pipeline>) -> Self {
        Self {
            pipeline,
            channel_name: DEFAULT_CHANNEL_NAME.to_string(),
            model: DEFAULT_MODEL.to_string(),
            deadline: None,
            shutdown: CancellationToken::new(),
            span: tracing::info_span!("chat_webhook"),
        }
    }

    /// Channel reported when the request does not name one.
    pub fn with_channel_name(mut self, channel_name: impl Into<String>) -> Self {
        self.channel_name = channel_name.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Upper bound on a single pipeline call.
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// In-flight pipeline calls are cancelled once `shutdown` fires.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Parent span of every request handled by this instance.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/", get(health))
            .route("/webhook", post(receive))
            .with_state(self)
    }

    /// Always produces a completion, whatever the pipeline did.
    pub async fn handle(
        &self,
        request: InboundRequest,
        headers: HeaderMap,
    ) -> ChatCompletionResponse {
        let span = tracing::info_span!(
            parent: &self.span,
            "chat_message",
            sender_id = tracing::field::Empty,
            input_channel = tracing::field::Empty,
        );
        self.process(request, headers).instrument(span).await
    }

    async fn process(
        &self,
        request: InboundRequest,
        headers: HeaderMap,
    ) -> ChatCompletionResponse {
        let sender_id = extract::resolve_sender(&request);
        let text = extract::extract_message(&request);
        let input_channel = extract::extract_input_channel(&request, &self.channel_name);
        let metadata = extract::extract_metadata(&request);

        let span = Span::current();
        span.record("sender_id", sender_id.as_deref());
        span.record("input_channel", input_channel.as_str());

        let message = MessageEnvelope {
            text: text.clone(),
            sender_id,
            input_channel,
            metadata,
            headers,
        };

        let mut outcome =
            pipeline::dispatch(self.pipeline.as_ref(), message, self.deadline, &self.shutdown)
                .await;

        match &outcome {
            DispatchOutcome::Completed(_) => {
                tracing::debug!("Pipeline finished");
            }
            DispatchOutcome::Cancelled(_, cause) => {
                tracing::error!(text = text.as_deref(), %cause, "chat.message.received.timeout");
            }
            DispatchOutcome::Failed(_, error) => {
                tracing::error!(
                    text = text.as_deref(),
                    error = ?error,
                    "chat.message.received.failure"
                );
            }
        }

        completion::format(outcome.output(), &self.model)
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn receive(
    State(handler): State<WebhookHandler>,
    headers: HeaderMap,
    Json(request): Json<InboundRequest>,
) -> Json<ChatCompletionResponse> {
    Json(handler.handle(request, headers).await)
}
