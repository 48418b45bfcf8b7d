use futures::{pin_mut, Stream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::allowlist::AllowList;
use crate::llm::CompletionService;
use crate::platform::{InboundEvent, IncomingMessage, OutboundReply, ReplySink};

/// Reply sent to anyone not on the allow-list
pub const REJECTION_TEXT: &str = "You are not my bro! I don't talk to strangers!";

/// What happened to a single event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No message payload
    Skipped,
    /// Sender not allowed; rejection notice sent
    Rejected,
    /// Completion forwarded to the chat
    Replied,
    /// Completion failed; nothing sent
    Failed,
}

/// The dispatch loop: filter each message, ask the completion service,
/// send the answer back.
///
/// Events are handled one at a time. The next event is not pulled from the
/// feed until the current one, including its completion call, is finished.
pub struct Relay<C, S> {
    allowed_users: AllowList,
    completion: C,
    sink: S,
}

impl<C: CompletionService, S: ReplySink> Relay<C, S> {
    pub fn new(allowed_users: AllowList, completion: C, sink: S) -> Self {
        Self {
            allowed_users,
            completion,
            sink,
        }
    }

    /// Consume the feed until it ends.
    pub async fn run(&self, events: impl Stream<Item = InboundEvent>) {
        pin_mut!(events);

        info!("Relay is ready, awaiting messages...");
        while let Some(event) = events.next().await {
            let outcome = self.handle(event).await;
            debug!("Event handled: {:?}", outcome);
        }
        warn!("Event feed ended");
    }

    pub async fn handle(&self, event: InboundEvent) -> Outcome {
        let Some(msg) = event.message else {
            debug!("Skipping update {} without a message", event.id);
            return Outcome::Skipped;
        };

        let sender = msg.sender.as_deref().unwrap_or_default();

        if !self.allowed_users.is_authorized(sender) {
            info!(
                "Rejecting message from '{}' in chat {}",
                sender, msg.chat_id.0
            );
            self.reply(&msg, REJECTION_TEXT.to_string()).await;
            return Outcome::Rejected;
        }

        info!("Message from {} in chat {}: {}", sender, msg.chat_id.0, msg.text);

        match self.completion.complete(&msg.text).await {
            Ok(text) => {
                self.reply(&msg, text).await;
                Outcome::Replied
            }
            Err(e) => {
                error!("Completion failed for {}: {:#}", sender, e);
                Outcome::Failed
            }
        }
    }

    async fn reply(&self, msg: &IncomingMessage, text: String) {
        let reply = OutboundReply {
            chat_id: msg.chat_id,
            text,
        };
        if let Err(e) = self.sink.send(reply).await {
            warn!("Failed to deliver reply: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use anyhow::Result;
    use async_trait::async_trait;
    use teloxide::types::ChatId;

    /// Completion stub returning scripted results and recording prompts.
    #[derive(Clone, Default)]
    struct ScriptedCompletion {
        prompts: Arc<Mutex<Vec<String>>>,
        results: Arc<Mutex<VecDeque<Result<String>>>>,
    }

    impl ScriptedCompletion {
        fn with(results: Vec<Result<String>>) -> Self {
            Self {
                prompts: Arc::default(),
                results: Arc::new(Mutex::new(results.into())),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionService for ScriptedCompletion {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok("default reply".to_string()))
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        sent: Arc<Mutex<Vec<OutboundReply>>>,
        fail: bool,
    }

    impl RecordingSink {
        fn sent(&self) -> Vec<OutboundReply> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReplySink for RecordingSink {
        async fn send(&self, reply: OutboundReply) -> Result<()> {
            self.sent.lock().unwrap().push(reply);
            if self.fail {
                anyhow::bail!("chat not found");
            }
            Ok(())
        }
    }

    fn message(id: u32, sender: Option<&str>, chat: i64, text: &str) -> InboundEvent {
        InboundEvent {
            id,
            message: Some(IncomingMessage {
                sender: sender.map(str::to_string),
                chat_id: ChatId(chat),
                text: text.to_string(),
            }),
        }
    }

    fn relay(
        completion: &ScriptedCompletion,
        sink: &RecordingSink,
    ) -> Relay<ScriptedCompletion, RecordingSink> {
        Relay::new(
            AllowList::parse("alice,bob").unwrap(),
            completion.clone(),
            sink.clone(),
        )
    }

    #[tokio::test]
    async fn test_event_without_message_is_skipped() {
        let completion = ScriptedCompletion::default();
        let sink = RecordingSink::default();

        let outcome = relay(&completion, &sink)
            .handle(InboundEvent { id: 1, message: None })
            .await;

        assert_eq!(outcome, Outcome::Skipped);
        assert!(sink.sent().is_empty());
        assert!(completion.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_unauthorized_sender_gets_rejection() {
        let completion = ScriptedCompletion::default();
        let sink = RecordingSink::default();

        let outcome = relay(&completion, &sink)
            .handle(message(1, Some("eve"), 666, "let me in"))
            .await;

        assert_eq!(outcome, Outcome::Rejected);
        assert_eq!(
            sink.sent(),
            vec![OutboundReply {
                chat_id: ChatId(666),
                text: REJECTION_TEXT.to_string(),
            }]
        );
        assert!(completion.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_sender_without_username_is_rejected() {
        let completion = ScriptedCompletion::default();
        let sink = RecordingSink::default();

        let outcome = relay(&completion, &sink)
            .handle(message(1, None, 5, "hi"))
            .await;

        assert_eq!(outcome, Outcome::Rejected);
        assert_eq!(sink.sent()[0].text, REJECTION_TEXT);
        assert!(completion.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_allow_list_is_case_sensitive() {
        let completion = ScriptedCompletion::default();
        let sink = RecordingSink::default();

        let outcome = relay(&completion, &sink)
            .handle(message(1, Some("Alice"), 5, "hi"))
            .await;

        assert_eq!(outcome, Outcome::Rejected);
        assert!(completion.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_authorized_message_is_relayed() {
        let completion = ScriptedCompletion::with(vec![Ok("Hi there".to_string())]);
        let sink = RecordingSink::default();

        let outcome = relay(&completion, &sink)
            .handle(message(1, Some("alice"), 100, "Hello"))
            .await;

        assert_eq!(outcome, Outcome::Replied);
        assert_eq!(completion.prompts(), vec!["Hello"]);
        assert_eq!(
            sink.sent(),
            vec![OutboundReply {
                chat_id: ChatId(100),
                text: "Hi there".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_empty_text_is_still_forwarded() {
        let completion = ScriptedCompletion::with(vec![Ok("?".to_string())]);
        let sink = RecordingSink::default();

        let outcome = relay(&completion, &sink)
            .handle(message(1, Some("bob"), 7, ""))
            .await;

        assert_eq!(outcome, Outcome::Replied);
        assert_eq!(completion.prompts(), vec![""]);
        assert_eq!(sink.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_completion_error_sends_nothing() {
        let completion = ScriptedCompletion::with(vec![Err(anyhow::anyhow!("quota exceeded"))]);
        let sink = RecordingSink::default();

        let outcome = relay(&completion, &sink)
            .handle(message(1, Some("alice"), 100, "Hello"))
            .await;

        assert_eq!(outcome, Outcome::Failed);
        assert_eq!(completion.prompts().len(), 1);
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_failure_does_not_change_outcome() {
        let completion = ScriptedCompletion::with(vec![Ok("Hi".to_string())]);
        let sink = RecordingSink {
            fail: true,
            ..Default::default()
        };

        let outcome = relay(&completion, &sink)
            .handle(message(1, Some("alice"), 100, "Hello"))
            .await;

        assert_eq!(outcome, Outcome::Replied);
        assert_eq!(sink.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_run_continues_after_failures() {
        let completion = ScriptedCompletion::with(vec![
            Err(anyhow::anyhow!("connection reset")),
            Ok("second answer".to_string()),
        ]);
        let sink = RecordingSink::default();

        let events = futures::stream::iter(vec![
            InboundEvent { id: 1, message: None },
            message(2, Some("alice"), 100, "first"),
            message(3, Some("eve"), 666, "intruder"),
            message(4, Some("bob"), 200, "second"),
        ]);

        relay(&completion, &sink).run(events).await;

        assert_eq!(completion.prompts(), vec!["first", "second"]);
        assert_eq!(
            sink.sent(),
            vec![
                OutboundReply {
                    chat_id: ChatId(666),
                    text: REJECTION_TEXT.to_string(),
                },
                OutboundReply {
                    chat_id: ChatId(200),
                    text: "second answer".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_replayed_event_is_handled_twice() {
        let completion = ScriptedCompletion::with(vec![
            Ok("one".to_string()),
            Ok("two".to_string()),
        ]);
        let sink = RecordingSink::default();
        let event = message(9, Some("alice"), 100, "Hello");

        let events = futures::stream::iter(vec![event.clone(), event]);
        relay(&completion, &sink).run(events).await;

        assert_eq!(completion.prompts(), vec!["Hello", "Hello"]);
        let texts: Vec<String> = sink.sent().into_iter().map(|r| r.text).collect();
        assert_eq!(texts, vec!["one", "two"]);
    }
}
