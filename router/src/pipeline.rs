//! Seam to the external message-processing pipeline.

use crate::{
    collector::{OutputCollector, ReplySink},
    MessageEnvelope,
};

use async_trait::async_trait;
use std::{fmt, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("message processing was cancelled")]
    Cancelled,
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

/// Processes one message, emitting any number of replies into `output`.
#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn handle(&self, message: MessageEnvelope, output: ReplySink)
        -> Result<(), PipelineError>;
}

/// What stopped a pipeline call before it finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cancellation {
    /// The per-request deadline elapsed.
    Deadline,
    /// The host is shutting down.
    Shutdown,
    /// The pipeline aborted the call itself.
    Pipeline,
}

impl fmt::Display for Cancellation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cancellation::Deadline => f.write_str("deadline"),
            Cancellation::Shutdown => f.write_str("shutdown"),
            Cancellation::Pipeline => f.write_str("pipeline"),
        }
    }
}

/// Result of handing a message to the pipeline. Every variant carries the
/// replies emitted up to the point the call ended.
#[derive(Debug)]
pub enum DispatchOutcome {
    Completed(OutputCollector),
    Cancelled(OutputCollector, Cancellation),
    Failed(OutputCollector, anyhow::Error),
}

impl DispatchOutcome {
    pub fn output(&mut self) -> &mut OutputCollector {
        match self {
            DispatchOutcome::Completed(output)
            | DispatchOutcome::Cancelled(output, _)
            | DispatchOutcome::Failed(output, _) => output,
        }
    }
}

/// Runs the pipeline for `message` until it completes, fails, runs past
/// `deadline` or `shutdown` fires. Never retries.
#[instrument(skip_all, fields(sender_id = message.sender_id.as_deref()))]
pub async fn dispatch(
    pipeline: &dyn Pipeline,
    message: MessageEnvelope,
    deadline: Option<Duration>,
    shutdown: &CancellationToken,
) -> DispatchOutcome {
    let (output, reply_sink) = OutputCollector::new();

    let call = async {
        let handled = pipeline.handle(message, reply_sink);
        match deadline {
            Some(deadline) => match tokio::time::timeout(deadline, handled).await {
                Ok(result) => result.map_err(|e| (e, Cancellation::Pipeline)),
                Err(_) => Err((PipelineError::Cancelled, Cancellation::Deadline)),
            },
            None => handled.await.map_err(|e| (e, Cancellation::Pipeline)),
        }
    };

    let result = tokio::select! {
        result = call => result,
        _ = shutdown.cancelled() => Err((PipelineError::Cancelled, Cancellation::Shutdown)),
    };

    match result {
        Ok(()) => DispatchOutcome::Completed(output),
        Err((PipelineError::Cancelled, cause)) => DispatchOutcome::Cancelled(output, cause),
        Err((PipelineError::Failed(error), _)) => DispatchOutcome::Failed(output, error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReplyEvent;
    use anyhow::anyhow;
    use http::HeaderMap;

    fn envelope(text: &str) -> MessageEnvelope {
        MessageEnvelope {
            text: Some(text.to_string()),
            sender_id: Some("alice".to_string()),
            input_channel: "chat".to_string(),
            metadata: None,
            headers: HeaderMap::new(),
        }
    }

    fn texts(outcome: &mut DispatchOutcome) -> Vec<String> {
        outcome
            .output()
            .snapshot()
            .iter()
            .filter_map(|event| event.text.clone())
            .collect()
    }

    struct Echo;

    #[async_trait]
    impl Pipeline for Echo {
        async fn handle(
            &self,
            message: MessageEnvelope,
            output: ReplySink,
        ) -> Result<(), PipelineError> {
            output.append(ReplyEvent::text(message.sender_id, message.text.unwrap_or_default()));
            Ok(())
        }
    }

    /// Emits one reply, then hangs until cancelled from outside.
    struct Stalled;

    #[async_trait]
    impl Pipeline for Stalled {
        async fn handle(&self, _: MessageEnvelope, output: ReplySink) -> Result<(), PipelineError> {
            output.append(ReplyEvent::text(None, "partial"));
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl Pipeline for Broken {
        async fn handle(&self, _: MessageEnvelope, output: ReplySink) -> Result<(), PipelineError> {
            output.append(ReplyEvent::text(None, "partial"));
            Err(anyhow!("tracker store unavailable").into())
        }
    }

    struct SelfCancelled;

    #[async_trait]
    impl Pipeline for SelfCancelled {
        async fn handle(&self, _: MessageEnvelope, _: ReplySink) -> Result<(), PipelineError> {
            Err(PipelineError::Cancelled)
        }
    }

    #[tokio::test]
    async fn completed_carries_replies() {
        let mut outcome = dispatch(&Echo, envelope("hi"), None, &CancellationToken::new()).await;
        assert!(matches!(outcome, DispatchOutcome::Completed(_)));
        assert_eq!(texts(&mut outcome), ["hi"]);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels_with_partial_output() {
        let mut outcome = dispatch(
            &Stalled,
            envelope("hi"),
            Some(Duration::from_secs(30)),
            &CancellationToken::new(),
        )
        .await;
        assert!(matches!(outcome, DispatchOutcome::Cancelled(_, Cancellation::Deadline)));
        assert_eq!(texts(&mut outcome), ["partial"]);
    }

    #[tokio::test]
    async fn shutdown_cancels_in_flight_call() {
        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move { trigger.cancel() });

        let mut outcome = dispatch(&Stalled, envelope("hi"), None, &shutdown).await;
        assert!(matches!(outcome, DispatchOutcome::Cancelled(_, Cancellation::Shutdown)));
        assert_eq!(texts(&mut outcome), ["partial"]);
    }

    #[tokio::test]
    async fn failure_keeps_partial_output() {
        let mut outcome = dispatch(&Broken, envelope("hi"), None, &CancellationToken::new()).await;
        match &outcome {
            DispatchOutcome::Failed(_, error) => {
                assert_eq!(error.to_string(), "tracker store unavailable")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(texts(&mut outcome), ["partial"]);
    }

    #[tokio::test]
    async fn pipeline_may_report_cancellation() {
        let outcome =
            dispatch(&SelfCancelled, envelope("hi"), None, &CancellationToken::new()).await;
        assert!(matches!(outcome, DispatchOutcome::Cancelled(_, Cancellation::Pipeline)));
    }
}
