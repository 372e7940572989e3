//! Wire format for one classification round trip
//!
//! OpenRouter speaks the OpenAI chat-completions format. A classification is
//! a single system prompt plus a single question, answered by one short
//! reply, so only that slice of the format is modelled here.

use serde::{Deserialize, Serialize};

/// Author of a prompt message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Request body. Sampling is always pinned, so retries of the same pair ask
/// the same question.
#[derive(Debug, Serialize)]
pub(crate) struct ClassifyRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Message],
    pub temperature: f32,
    pub max_tokens: usize,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ClassifyResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Reply,
}

#[derive(Debug, Deserialize)]
struct Reply {
    /// Null when the model produced no text, e.g. after a content filter
    content: Option<String>,
}

/// Text of the first reply and the model that actually served it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub model: String,
    pub text: String,
}

impl ClassifyResponse {
    /// `None` when there is no reply text to read a kind from
    pub(crate) fn into_answer(self) -> Option<Answer> {
        let text = self.choices.into_iter().next()?.message.content?;
        Some(Answer {
            model: self.model,
            text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_pins_sampling() {
        let messages = [Message::system("Classify."), Message::user("Aria and Kael?")];
        let request = ClassifyRequest {
            model: "test/model",
            messages: &messages,
            temperature: 0.0,
            max_tokens: 16,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "test/model");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Aria and Kael?");
        assert_eq!(json["temperature"], 0.0);
        assert_eq!(json["max_tokens"], 16);
    }

    #[test]
    fn test_first_reply_becomes_answer() {
        let json = r#"{
            "id": "gen-123",
            "model": "anthropic/claude-3-5-haiku",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "rival"}, "finish_reason": "stop"},
                {"index": 1, "message": {"role": "assistant", "content": "ally"}, "finish_reason": "stop"}
            ],
            "usage": {"prompt_tokens": 40, "completion_tokens": 1}
        }"#;

        let response: ClassifyResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            response.into_answer(),
            Some(Answer {
                model: "anthropic/claude-3-5-haiku".to_string(),
                text: "rival".to_string(),
            })
        );
    }

    #[test]
    fn test_missing_reply_text_is_no_answer() {
        let empty: ClassifyResponse = serde_json::from_str(r#"{"model": "m", "choices": []}"#).unwrap();
        assert!(empty.into_answer().is_none());

        let filtered: ClassifyResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": null}, "finish_reason": "content_filter"}]}"#,
        )
        .unwrap();
        assert!(filtered.into_answer().is_none());
    }
}
