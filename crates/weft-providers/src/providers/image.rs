use std::collections::HashMap;

use futures::future::BoxFuture;
use serde::Serialize;
use tracing::debug;

use weft_core::config::ImageConfig;
use weft_core::error::{Result, WeftError};
use weft_core::traits::ImageGenerationProvider;
use weft_core::types::{ImageRequest, ImageResponse};

use super::chat::CompletionResponse;
use super::Endpoint;

/// Image generation through a multimodal chat-completions endpoint.
///
/// The prompt and reference images go out as content parts; the image comes
/// back in `choices[0].message.images`.
pub struct ImageClient {
    endpoint: Endpoint,
    input_limits: HashMap<String, usize>,
    default_input_limit: usize,
}

impl ImageClient {
    pub fn new(config: &ImageConfig) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new(
                &config.provider,
                config.base_url.as_deref(),
                config.api_key.as_deref(),
                config.timeout_secs,
                &config.extra_headers,
            )?,
            input_limits: config.input_limits.clone(),
            default_input_limit: config.default_input_limit,
        })
    }
}

#[derive(Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    messages: [UserMessage<'a>; 1],
    modalities: [&'static str; 2],
    stream: bool,
}

#[derive(Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: String },
    ImageUrl { image_url: PartUrl<'a> },
}

#[derive(Serialize)]
struct PartUrl<'a> {
    url: &'a str,
}

fn prompt_text(req: &ImageRequest) -> String {
    match req.negative_prompt.as_deref().map(str::trim) {
        Some(neg) if !neg.is_empty() => format!("{}\n\nAvoid: {}", req.prompt, neg),
        _ => req.prompt.clone(),
    }
}

fn build_request(req: &ImageRequest) -> GenerationRequest<'_> {
    let mut content = Vec::with_capacity(req.input_images.len() + 1);
    content.push(ContentPart::Text {
        text: prompt_text(req),
    });
    content.extend(req.input_images.iter().map(|url| ContentPart::ImageUrl {
        image_url: PartUrl { url: url.as_str() },
    }));

    GenerationRequest {
        model: &req.model,
        messages: [UserMessage {
            role: "user",
            content,
        }],
        modalities: ["image", "text"],
        stream: false,
    }
}

fn into_image_response(resp: CompletionResponse) -> Result<ImageResponse> {
    let image_data = resp
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.images.into_iter().next())
        .map(|img| img.image_url.url)
        .ok_or_else(|| WeftError::Provider("No image returned by model".to_string()))?;

    Ok(ImageResponse {
        image_data,
        usage: resp.usage.map(Into::into),
    })
}

impl ImageGenerationProvider for ImageClient {
    fn generate(&self, request: ImageRequest) -> BoxFuture<'_, Result<ImageResponse>> {
        Box::pin(async move {
            let body = build_request(&request);
            let resp: CompletionResponse = self.endpoint.post(&body).await?;
            let image = into_image_response(resp)?;
            debug!(
                model = %request.model,
                inputs = request.input_images.len(),
                bytes = image.image_data.len(),
                "Image generated"
            );
            Ok(image)
        })
    }

    fn max_input_images(&self, model: &str) -> usize {
        self.input_limits
            .get(model)
            .copied()
            .unwrap_or(self.default_input_limit)
    }
}
