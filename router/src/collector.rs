use crate::ReplyEvent;
use tokio::sync::mpsc;

/// Write half of an [`OutputCollector`], handed to the pipeline.
#[derive(Debug, Clone)]
pub struct ReplySink {
    reply_tx: mpsc::UnboundedSender<ReplyEvent>,
}

impl ReplySink {
    pub fn append(&self, event: ReplyEvent) {
        // The request was already answered, nobody will read this.
        if self.reply_tx.send(event).is_err() {
            tracing::debug!("Dropping reply emitted after the response was sent");
        }
    }
}

/// Accumulates the replies emitted for a single request, in emission order.
#[derive(Debug)]
pub struct OutputCollector {
    reply_rx: mpsc::UnboundedReceiver<ReplyEvent>,
    events: Vec<ReplyEvent>,
}

impl OutputCollector {
    pub fn new() -> (Self, ReplySink) {
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let collector = Self {
            reply_rx,
            events: Vec::new(),
        };
        (collector, ReplySink { reply_tx })
    }

    /// Events appended so far.
    pub fn snapshot(&mut self) -> &[ReplyEvent] {
        while let Ok(event) = self.reply_rx.try_recv() {
            self.events.push(event);
        }
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_until_appended() {
        let (mut collector, _sink) = OutputCollector::new();
        assert!(collector.snapshot().is_empty());
    }

    #[test]
    fn keeps_emission_order() {
        let (mut collector, sink) = OutputCollector::new();
        sink.append(ReplyEvent::text(None, "first"));
        sink.clone().append(ReplyEvent::text(None, "second"));
        sink.append(ReplyEvent::text(None, "third"));

        let texts: Vec<_> = collector
            .snapshot()
            .iter()
            .map(|event| event.text.as_deref().unwrap())
            .collect();
        assert_eq!(texts, ["first", "second", "third"]);
    }

    #[test]
    fn snapshot_is_stable_without_new_appends() {
        let (mut collector, sink) = OutputCollector::new();
        sink.append(ReplyEvent::text(Some("alice".into()), "hi"));

        let first = collector.snapshot().to_vec();
        let second = collector.snapshot().to_vec();
        assert_eq!(first, second);

        sink.append(ReplyEvent::text(Some("alice".into()), "again"));
        assert_eq!(collector.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn append_from_another_task() {
        let (mut collector, sink) = OutputCollector::new();
        tokio::spawn(async move { sink.append(ReplyEvent::text(None, "from task")) })
            .await
            .unwrap();
        assert_eq!(collector.snapshot()[0].text.as_deref(), Some("from task"));
    }

    #[test]
    fn append_after_collector_dropped_is_ignored() {
        let (collector, sink) = OutputCollector::new();
        drop(collector);
        sink.append(ReplyEvent::text(None, "late"));
    }
}
