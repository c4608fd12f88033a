//! Pipeline reached over HTTP.
//!
//! The message is posted as `{"sender", "message", "input_channel", "metadata"}`
//! and the endpoint answers with a JSON array of reply events.

use crate::{
    collector::ReplySink,
    pipeline::{Pipeline, PipelineError},
    MessageEnvelope, ReplyEvent,
};

use anyhow::Context as _;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;
use tracing::instrument;

#[derive(serde::Serialize, Debug)]
struct RestMessage<'a> {
    sender: Option<&'a str>,
    message: Option<&'a str>,
    input_channel: &'a str,
    metadata: Option<&'a Value>,
}

pub struct RestPipeline {
    client: reqwest::Client,
    url: String,
}

impl Debug for RestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestPipeline")
            .field("url", &self.url)
            .finish()
    }
}

impl RestPipeline {
    pub fn new(url: &str) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    pub fn with_client(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_owned(),
        }
    }
}

#[async_trait]
impl Pipeline for RestPipeline {
    #[instrument(skip_all, fields(url = %self.url, replies))]
    async fn handle(
        &self,
        message: MessageEnvelope,
        output: ReplySink,
    ) -> Result<(), PipelineError> {
        let body = RestMessage {
            sender: message.sender_id.as_deref(),
            message: message.text.as_deref(),
            input_channel: &message.input_channel,
            metadata: message.metadata.as_ref(),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .context("Failed to reach pipeline")?
            .error_for_status()
            .context("Pipeline rejected message")?;

        let replies: Vec<ReplyEvent> = response
            .json()
            .await
            .context("Pipeline answered with invalid replies")?;

        tracing::Span::current().record("replies", replies.len());
        for reply in replies {
            output.append(reply);
        }

        Ok(())
    }
}
