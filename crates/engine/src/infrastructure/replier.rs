//! Canned assistant replies for the reference backend.

use async_trait::async_trait;

use crate::infrastructure::ports::{ReplyError, ReplyPort};

const GREETINGS: [&str; 3] = ["hello", "hi", "hey"];
const GREETING_REPLY: &str = "Hi, how can I help?";
const TOPIC_PREVIEW_CHARS: usize = 60;

/// Answers greetings and acknowledges everything else.
///
/// Stands in for the consultant (human or model) behind a production backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct CannedReplier;

impl CannedReplier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ReplyPort for CannedReplier {
    async fn reply(&self, prompt: &str) -> Result<String, ReplyError> {
        let prompt = prompt.trim();
        if is_greeting(prompt) {
            return Ok(GREETING_REPLY.to_string());
        }

        let mut topic: String = prompt.chars().take(TOPIC_PREVIEW_CHARS).collect();
        if prompt.chars().count() > TOPIC_PREVIEW_CHARS {
            topic.push_str("...");
        }
        Ok(format!(
            "Thanks, noted: \"{}\". A consultant will follow up shortly.",
            topic
        ))
    }
}

fn is_greeting(prompt: &str) -> bool {
    let first_word = prompt
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    GREETINGS.contains(&first_word.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn greets_back() {
        let reply = CannedReplier::new().reply("Hello!").await.expect("reply");
        assert_eq!(reply, GREETING_REPLY);

        let reply = CannedReplier::new().reply("hey there").await.expect("reply");
        assert_eq!(reply, GREETING_REPLY);
    }

    #[tokio::test]
    async fn acknowledges_other_topics() {
        let reply = CannedReplier::new()
            .reply("Our migration to the new region stalled")
            .await
            .expect("reply");
        assert!(reply.contains("Our migration to the new region stalled"));
    }

    #[tokio::test]
    async fn long_topics_are_shortened() {
        let prompt = "x".repeat(200);
        let reply = CannedReplier::new().reply(&prompt).await.expect("reply");
        assert!(reply.contains(&format!("{}...", "x".repeat(TOPIC_PREVIEW_CHARS))));
        assert!(!reply.contains(&prompt));
    }

    #[test]
    fn greeting_detection_ignores_words_that_merely_start_alike() {
        assert!(is_greeting("Hi, quick question"));
        assert!(!is_greeting("history of our account"));
        assert!(!is_greeting(""));
    }
}
