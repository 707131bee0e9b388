use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tracing::debug;

use weft_core::config::ChatConfig;
use weft_core::error::Result;
use weft_core::traits::ChatCompletionProvider;
use weft_core::types::{ChatRequest, ChatResponse, Role, TokenUsage};

use super::Endpoint;

/// Non-streaming chat client for OpenAI-compatible APIs (OpenRouter, OpenAI, Ollama, ...).
pub struct ChatClient {
    endpoint: Endpoint,
}

impl ChatClient {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new(
                &config.provider,
                config.base_url.as_deref(),
                config.api_key.as_deref(),
                config.timeout_secs,
                &config.extra_headers,
            )?,
        })
    }
}

// Request types
#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

// Response types, shared with the image client
#[derive(Deserialize, Debug)]
pub(crate) struct CompletionResponse {
    #[serde(default)]
    pub(crate) choices: Vec<Choice>,
    #[serde(default)]
    pub(crate) usage: Option<WireUsage>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct Choice {
    pub(crate) message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
pub(crate) struct ResponseMessage {
    #[serde(default)]
    pub(crate) content: Option<String>,
    #[serde(default)]
    pub(crate) images: Vec<ResponseImage>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct ResponseImage {
    pub(crate) image_url: ImageUrl,
}

#[derive(Deserialize, Debug)]
pub(crate) struct ImageUrl {
    pub(crate) url: String,
}

#[derive(Deserialize, Debug)]
pub(crate) struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl From<WireUsage> for TokenUsage {
    fn from(u: WireUsage) -> Self {
        TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        }
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn build_request(req: &ChatRequest) -> CompletionRequest<'_> {
    let mut messages = Vec::with_capacity(req.messages.len() + 1);
    if let Some(system) = req.system_prompt.as_deref().filter(|s| !s.is_empty()) {
        messages.push(WireMessage {
            role: "system",
            content: system,
        });
    }
    messages.extend(req.messages.iter().map(|m| WireMessage {
        role: role_name(m.role),
        content: &m.content,
    }));

    CompletionRequest {
        model: &req.model,
        messages,
        temperature: req.temperature,
        max_tokens: req.max_tokens,
        stream: false,
    }
}

fn into_chat_response(resp: CompletionResponse) -> ChatResponse {
    ChatResponse {
        text: resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content),
        usage: resp.usage.map(Into::into),
    }
}

impl ChatCompletionProvider for ChatClient {
    fn complete(&self, request: ChatRequest) -> BoxFuture<'_, Result<ChatResponse>> {
        Box::pin(async move {
            let body = build_request(&request);
            let resp: CompletionResponse = self.endpoint.post(&body).await?;
            let response = into_chat_response(resp);
            debug!(
                model = %request.model,
                has_content = response.text.is_some(),
                "Chat completion finished"
            );
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::types::ChatMessage;

    fn request(system: Option<&str>) -> ChatRequest {
        ChatRequest {
            model: "openai/gpt-4o-mini".into(),
            messages: vec![ChatMessage::user("Describe the image")],
            system_prompt: system.map(str::to_string),
            temperature: 0.7,
            max_tokens: 2048,
        }
    }

    #[test]
    fn test_system_prompt_goes_first() {
        let req = request(Some("You are terse."));
        let json = serde_json::to_value(build_request(&req)).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["max_tokens"], 2048);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "You are terse.");
        assert_eq!(json["messages"][1]["role"], "user");
    }

    #[test]
    fn test_empty_system_prompt_omitted() {
        let req = request(Some(""));
        let json = serde_json::to_value(build_request(&req)).unwrap();
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_parse_content_and_usage() {
        let body = r#"{
            "id": "gen-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "A red fox."}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 4}
        }"#;
        let resp: CompletionResponse = serde_json::from_str(body).unwrap();
        let out = into_chat_response(resp);
        assert_eq!(out.text.as_deref(), Some("A red fox."));
        assert_eq!(out.usage.unwrap().completion_tokens, 4);
    }

    #[test]
    fn test_missing_content_is_none() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": null}}]}"#;
        let resp: CompletionResponse = serde_json::from_str(body).unwrap();
        assert!(into_chat_response(resp).text.is_none());

        let resp: CompletionResponse = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(into_chat_response(resp).text.is_none());
    }
}
