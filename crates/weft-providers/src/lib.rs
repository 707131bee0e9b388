pub mod providers;

use std::sync::Arc;

use weft_core::config::AppConfig;
use weft_core::error::Result;
use weft_core::traits::{ChatCompletionProvider, ImageGenerationProvider};

pub use providers::{ChatClient, ImageClient};

/// Create the chat-completion provider from the `[chat]` section.
pub fn create_chat_provider(config: &AppConfig) -> Result<Arc<dyn ChatCompletionProvider>> {
    Ok(Arc::new(ChatClient::new(&config.chat)?))
}

/// Create the image-generation provider from the `[image]` section.
pub fn create_image_provider(config: &AppConfig) -> Result<Arc<dyn ImageGenerationProvider>> {
    Ok(Arc::new(ImageClient::new(&config.image)?))
}
