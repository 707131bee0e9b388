//! Mock providers and workflow fixtures shared by the Weft test suites.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;

use weft_core::error::{Result, WeftError};
use weft_core::traits::{ChatCompletionProvider, ImageGenerationProvider};
use weft_core::types::*;

/// Image data returned by [`MockImageProvider`] unless overridden.
pub const MOCK_IMAGE: &str = "data:image/png;base64,bW9jay1pbWFnZQ==";
pub const IMAGE_MODEL: &str = "mock/image-model";
pub const CHAT_MODEL: &str = "mock/chat-model";

pub fn test_user() -> UserId {
    UserId::from_string("user-1")
}

pub fn other_user() -> UserId {
    UserId::from_string("user-2")
}

/// Tracks how many calls are in flight and the highest concurrency seen.
#[derive(Default)]
struct Concurrency {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Concurrency {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// MockImageProvider
// ---------------------------------------------------------------------------

/// Image provider that answers from memory and records every request.
pub struct MockImageProvider {
    image: String,
    latency: Duration,
    max_inputs: usize,
    fail_models: HashSet<String>,
    fail_prompts: Vec<String>,
    requests: Mutex<Vec<ImageRequest>>,
    concurrency: Concurrency,
}

impl Default for MockImageProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockImageProvider {
    pub fn new() -> Self {
        Self {
            image: MOCK_IMAGE.to_string(),
            latency: Duration::ZERO,
            max_inputs: 3,
            fail_models: HashSet::new(),
            fail_prompts: Vec::new(),
            requests: Mutex::new(Vec::new()),
            concurrency: Concurrency::default(),
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_max_inputs(mut self, max: usize) -> Self {
        self.max_inputs = max;
        self
    }

    /// Every request for `model` fails.
    pub fn failing_model(mut self, model: impl Into<String>) -> Self {
        self.fail_models.insert(model.into());
        self
    }

    /// Every request whose prompt contains `marker` fails.
    pub fn failing_prompt(mut self, marker: impl Into<String>) -> Self {
        self.fail_prompts.push(marker.into());
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<ImageRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Highest number of overlapping `generate` calls observed.
    pub fn peak_concurrency(&self) -> usize {
        self.concurrency.peak.load(Ordering::SeqCst)
    }

    fn should_fail(&self, request: &ImageRequest) -> bool {
        self.fail_models.contains(&request.model)
            || self.fail_prompts.iter().any(|m| request.prompt.contains(m.as_str()))
    }
}

impl ImageGenerationProvider for MockImageProvider {
    fn generate(&self, request: ImageRequest) -> BoxFuture<'_, Result<ImageResponse>> {
        Box::pin(async move {
            if let Ok(mut log) = self.requests.lock() {
                log.push(request.clone());
            }

            self.concurrency.enter();
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.concurrency.exit();

            if self.should_fail(&request) {
                return Err(WeftError::Provider(format!(
                    "HTTP 500: mock failure for {}",
                    request.model
                )));
            }

            Ok(ImageResponse {
                image_data: self.image.clone(),
                usage: Some(TokenUsage {
                    prompt_tokens: 10,
                    completion_tokens: 1,
                }),
            })
        })
    }

    fn max_input_images(&self, _model: &str) -> usize {
        self.max_inputs
    }
}

// ---------------------------------------------------------------------------
// MockChatProvider
// ---------------------------------------------------------------------------

/// What [`MockChatProvider`] answers with.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Echo the user prompt back.
    Echo,
    Fixed(String),
    /// A response with no text content.
    Empty,
}

/// Chat provider that answers from memory and records every request.
pub struct MockChatProvider {
    reply: MockReply,
    latency: Duration,
    fail_models: HashSet<String>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl Default for MockChatProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChatProvider {
    pub fn new() -> Self {
        Self {
            reply: MockReply::Echo,
            latency: Duration::ZERO,
            fail_models: HashSet::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_reply(mut self, reply: MockReply) -> Self {
        self.reply = reply;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn failing_model(mut self, model: impl Into<String>) -> Self {
        self.fail_models.insert(model.into());
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests.lock().ok().and_then(|r| r.last().cloned())
    }
}

impl ChatCompletionProvider for MockChatProvider {
    fn complete(&self, request: ChatRequest) -> BoxFuture<'_, Result<ChatResponse>> {
        Box::pin(async move {
            if let Ok(mut log) = self.requests.lock() {
                log.push(request.clone());
            }
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }

            if self.fail_models.contains(&request.model) {
                return Err(WeftError::Provider(format!(
                    "HTTP 429: mock rate limit for {}",
                    request.model
                )));
            }

            let text = match &self.reply {
                MockReply::Echo => request.messages.last().map(|m| m.content.clone()),
                MockReply::Fixed(text) => Some(text.clone()),
                MockReply::Empty => None,
            };
            Ok(ChatResponse {
                text,
                usage: Some(TokenUsage {
                    prompt_tokens: 5,
                    completion_tokens: 5,
                }),
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Workflow fixtures
// ---------------------------------------------------------------------------

pub fn upload_data(tag: &str) -> String {
    format!("data:image/png;base64,{}", tag)
}

/// `u -> g1 -> g2`, each imageGen with its own prompt.
pub fn linear_chain(user: UserId) -> Workflow {
    Workflow::new(
        user,
        "linear chain",
        vec![
            Node::image_upload("u", upload_data("VQ==")),
            Node::image_gen("g1", IMAGE_MODEL, "make it blue"),
            Node::image_gen("g2", IMAGE_MODEL, "add a hat"),
        ],
        vec![
            Edge::new("u", "g1", InputSlot::Input0),
            Edge::new("g1", "g2", InputSlot::Input0),
        ],
    )
}

/// `u -> {a, b, c}`.
pub fn fan_out(user: UserId) -> Workflow {
    Workflow::new(
        user,
        "fan out",
        vec![
            Node::image_upload("u", upload_data("VQ==")),
            Node::image_gen("a", IMAGE_MODEL, "variant a"),
            Node::image_gen("b", IMAGE_MODEL, "variant b"),
            Node::image_gen("c", IMAGE_MODEL, "variant c"),
        ],
        vec![
            Edge::new("u", "a", InputSlot::Input0),
            Edge::new("u", "b", InputSlot::Input0),
            Edge::new("u", "c", InputSlot::Input0),
        ],
    )
}

/// `{p, s} -> x` on slots input-0 and input-1.
pub fn fan_in(user: UserId) -> Workflow {
    Workflow::new(
        user,
        "fan in",
        vec![
            Node::image_upload("p", upload_data("UA==")),
            Node::image_upload("s", upload_data("Uw==")),
            Node::image_gen("x", IMAGE_MODEL, "put the subject in the scene"),
        ],
        vec![
            Edge::new("p", "x", InputSlot::Input0),
            Edge::new("s", "x", InputSlot::Input1),
        ],
    )
}

/// `t -> agent`, where `t` holds `text`.
pub fn text_to_agent(user: UserId, text: &str) -> Workflow {
    Workflow::new(
        user,
        "text to agent",
        vec![
            Node::text_input("t", text),
            Node::ai_agent("agent", CHAT_MODEL, "Rewrite: {{input}}"),
        ],
        vec![Edge::new("t", "agent", InputSlot::Input0)],
    )
}
