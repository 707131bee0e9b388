use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use weft_core::error::{Result, WeftError};
use weft_core::traits::{ChatCompletionProvider, GeneratedImageStore, ImageGenerationProvider};
use weft_core::types::*;

use crate::context::ExecutionContext;

/// Placeholder in an aiAgent user-prompt template.
pub const INPUT_PLACEHOLDER: &str = "{{input}}";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Executes exactly one node against the external providers.
///
/// Knows nothing about graphs or scheduling: it receives a node and its
/// already-resolved inputs and returns a completed or failed result.
#[derive(Clone)]
pub struct NodeExecutor {
    image_provider: Arc<dyn ImageGenerationProvider>,
    chat_provider: Arc<dyn ChatCompletionProvider>,
    images: Arc<dyn GeneratedImageStore>,
}

impl NodeExecutor {
    pub fn new(
        image_provider: Arc<dyn ImageGenerationProvider>,
        chat_provider: Arc<dyn ChatCompletionProvider>,
        images: Arc<dyn GeneratedImageStore>,
    ) -> Self {
        Self {
            image_provider,
            chat_provider,
            images,
        }
    }

    /// Run `node`. Failures come back as a `failed` result carrying the error text.
    pub async fn execute(
        &self,
        node: &Node,
        inputs: &[NodeInput],
        ctx: &ExecutionContext,
    ) -> NodeResult {
        let started = Instant::now();

        let outcome = match node.kind {
            NodeKind::ImageUpload => image_upload(node),
            NodeKind::TextInput => Ok(text_input(node)),
            NodeKind::ImageGen => self.image_gen(node, inputs, ctx, started).await,
            NodeKind::AiAgent => self.ai_agent(node, inputs, ctx).await,
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(result) => {
                debug!(node_id = %node.id, kind = %node.kind, elapsed_ms, "Node completed");
                result.with_generation_time(elapsed_ms)
            }
            Err(e) => {
                let message = match e {
                    WeftError::NodeExecution { message, .. } => message,
                    other => other.to_string(),
                };
                warn!(node_id = %node.id, kind = %node.kind, error = %message, "Node failed");
                NodeResult::failed(message).with_generation_time(elapsed_ms)
            }
        }
    }

    async fn image_gen(
        &self,
        node: &Node,
        inputs: &[NodeInput],
        ctx: &ExecutionContext,
        started: Instant,
    ) -> Result<NodeResult> {
        let model = required(node, node.data.model.as_deref(), "model")?;
        let prompt = required(node, node.data.prompt.as_deref(), "prompt")?;
        let negative_prompt = node
            .data
            .negative_prompt
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string);

        let input_images: Vec<String> = inputs
            .iter()
            .filter_map(|i| i.value.as_image())
            .map(str::to_string)
            .collect();

        if input_images.len() < inputs.len() {
            debug!(
                node_id = %node.id,
                dropped = inputs.len() - input_images.len(),
                "Ignoring non-image inputs"
            );
        }

        let max = self.image_provider.max_input_images(model);
        if input_images.len() > max {
            return Err(WeftError::node(
                &node.id,
                format!("Model supports maximum {} input images", max),
            ));
        }

        let response = self
            .image_provider
            .generate(ImageRequest {
                model: model.to_string(),
                prompt: prompt.to_string(),
                negative_prompt: negative_prompt.clone(),
                input_images: input_images.clone(),
            })
            .await?;

        let settings = ImageSettings {
            input_images_count: input_images.len(),
            has_input_images: !input_images.is_empty(),
        };
        let image_id = self
            .images
            .save_image(NewGeneratedImage {
                user_id: ctx.user_id.clone(),
                prompt: prompt.to_string(),
                model_id: model.to_string(),
                image_data: response.image_data.clone(),
                negative_prompt: negative_prompt.unwrap_or_default(),
                settings,
                metadata: serde_json::json!({
                    "workflow_execution": true,
                    "generation_time_ms": started.elapsed().as_millis() as u64,
                    "usage": response.usage,
                }),
            })
            .await?;

        Ok(NodeResult::completed_image(response.image_data, Some(image_id)))
    }

    async fn ai_agent(
        &self,
        node: &Node,
        inputs: &[NodeInput],
        ctx: &ExecutionContext,
    ) -> Result<NodeResult> {
        let model = required(node, node.data.model.as_deref(), "model")?;

        let texts: Vec<&str> = inputs.iter().filter_map(|i| i.value.as_text()).collect();
        let user_prompt = render_prompt(node.data.user_prompt_template.as_deref(), &texts);
        let system_prompt =
            build_system_prompt(node.data.system_prompt.as_deref(), ctx.preferences.as_ref());

        let response = self
            .chat_provider
            .complete(ChatRequest {
                model: model.to_string(),
                messages: vec![ChatMessage::user(user_prompt)],
                system_prompt,
                temperature: node.data.temperature.unwrap_or(DEFAULT_TEMPERATURE),
                max_tokens: node.data.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            })
            .await?;

        match response.text {
            Some(text) if !text.trim().is_empty() => Ok(NodeResult::completed_text(text)),
            _ => Err(WeftError::node(&node.id, "No response from AI model")),
        }
    }
}

fn image_upload(node: &Node) -> Result<NodeResult> {
    match node.data.image_url.as_deref().filter(|s| !s.is_empty()) {
        Some(image) => Ok(NodeResult::completed_image(image, None)),
        None => Err(WeftError::node(&node.id, "No image uploaded")),
    }
}

fn text_input(node: &Node) -> NodeResult {
    NodeResult::completed_text(node.data.text.clone().unwrap_or_default())
}

fn required<'a>(node: &Node, value: Option<&'a str>, field: &str) -> Result<&'a str> {
    value.filter(|v| !v.trim().is_empty()).ok_or_else(|| {
        WeftError::node(&node.id, format!("{} node requires a {}", node.kind, field))
    })
}

/// Substitute joined text inputs into the user-prompt template.
///
/// Inputs are joined with a blank line. Without a placeholder in the template
/// the joined inputs are appended after a blank line.
pub fn render_prompt(template: Option<&str>, texts: &[&str]) -> String {
    let template = template
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(INPUT_PLACEHOLDER);
    let joined = texts.join("\n\n");

    if template.contains(INPUT_PLACEHOLDER) {
        template.replacen(INPUT_PLACEHOLDER, &joined, 1)
    } else if joined.is_empty() {
        template.to_string()
    } else {
        format!("{}\n\n{}", template, joined)
    }
}

/// The node's system prompt followed by the caller's preference block.
pub fn build_system_prompt(base: Option<&str>, prefs: Option<&Preferences>) -> Option<String> {
    let base = base.map(str::trim).filter(|s| !s.is_empty());
    let block = prefs.and_then(Preferences::prompt_block);

    match (base, block) {
        (Some(base), Some(block)) => Some(format!("{}\n\n{}", base, block)),
        (Some(base), None) => Some(base.to_string()),
        (None, Some(block)) => Some(block),
        (None, None) => None,
    }
}
