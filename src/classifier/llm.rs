use async_trait::async_trait;

use super::ClassifierService;
use crate::Result;
use crate::services::{ChatClient, ChatMessage};

const PREAMBLE: &str = "\
You sort spoken requests for a phone assistant into categories. Never answer the request itself; \
reply only with the category followed by the relevant words from the request.

Categories:
- general <question>: anything a chatbot can answer without live data (\"who was akbar?\" -> \"general who was akbar?\").
- realtime <question>: needs current information such as news, weather, prices or today's date.
- open <app or site>: open an application or website (\"open chrome\" -> \"open chrome\").
- close <app>: close an application.
- play <song>: play a song or other media.
- system <task>: device tasks such as volume up, volume down, home, back or taking a screenshot.
- content <topic>: write something (an email, an essay, code).
- google search <topic>: search the web for a topic.
- youtube search <topic>: search YouTube for a topic.
- exit: the user says goodbye or wants to stop.

For several tasks in one request reply with a comma-separated list, for example \
\"open facebook, open telegram, close whatsapp\". If you cannot decide, use general.";

/// Few-shot history sent before every request
const EXAMPLES: &[(&str, &str)] = &[
    ("how are you?", "general how are you?"),
    (
        "open chrome and tell me about mahatma gandhi.",
        "open chrome, general tell me about mahatma gandhi.",
    ),
    ("open chrome and firefox", "open chrome, open firefox"),
    ("what's the weather in new york right now", "realtime what's the weather in new york right now"),
    ("turn the volume up", "system volume up"),
    ("bye for now", "exit"),
    ("chat with me.", "general chat with me."),
];

/// Classifier backed by a chat completion model
#[derive(Debug, Clone)]
pub struct LlmClassifier {
    client: ChatClient,
    model: String,
    temperature: f32,
}

impl LlmClassifier {
    #[must_use]
    pub fn new(client: ChatClient, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
        }
    }
}

fn build_messages(text: &str) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(EXAMPLES.len() * 2 + 2);
    messages.push(ChatMessage::system(PREAMBLE));
    for (question, reply) in EXAMPLES {
        messages.push(ChatMessage::user(*question));
        messages.push(ChatMessage::assistant(*reply));
    }
    messages.push(ChatMessage::user(text));
    messages
}

#[async_trait]
impl ClassifierService for LlmClassifier {
    async fn classify(&self, text: &str) -> Result<String> {
        self.client
            .complete(&self.model, build_messages(text), self.temperature)
            .await
    }
}
