use std::collections::HashMap;

/// Defaults for a named OpenAI-compatible endpoint.
pub struct ProviderPreset {
    pub default_base_url: &'static str,
    pub needs_api_key: bool,
    pub extra_headers: &'static [(&'static str, &'static str)],
}

/// Look up a provider preset by name.
pub fn get_preset(provider: &str) -> Option<ProviderPreset> {
    match provider {
        "openrouter" => Some(ProviderPreset {
            default_base_url: "https://openrouter.ai/api/v1",
            needs_api_key: true,
            extra_headers: &[("X-Title", "Weft")],
        }),
        "openai" => Some(ProviderPreset {
            default_base_url: "https://api.openai.com/v1",
            needs_api_key: true,
            extra_headers: &[],
        }),
        "ollama" => Some(ProviderPreset {
            default_base_url: "http://localhost:11434/v1",
            needs_api_key: false,
            extra_headers: &[],
        }),
        "groq" => Some(ProviderPreset {
            default_base_url: "https://api.groq.com/openai/v1",
            needs_api_key: true,
            extra_headers: &[],
        }),
        "together" => Some(ProviderPreset {
            default_base_url: "https://api.together.xyz/v1",
            needs_api_key: true,
            extra_headers: &[],
        }),
        _ => None,
    }
}

/// Resolve the `/chat/completions` URL for a provider, preferring an explicit base URL.
pub fn completions_url(provider: &str, base_url: Option<&str>) -> Option<String> {
    let base = match base_url {
        Some(url) => url.to_string(),
        None => get_preset(provider)?.default_base_url.to_string(),
    };
    Some(format!("{}/chat/completions", base.trim_end_matches('/')))
}

/// Build extra headers from a preset + user config overrides.
pub fn build_extra_headers(
    preset: Option<&ProviderPreset>,
    user_headers: &HashMap<String, String>,
) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = preset
        .map(|p| p.extra_headers)
        .unwrap_or_default()
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    for (k, v) in user_headers {
        // User overrides take precedence
        if let Some(pos) = headers.iter().position(|(hk, _)| hk == k) {
            headers[pos].1 = v.clone();
        } else {
            headers.push((k.clone(), v.clone()));
        }
    }

    headers
}

/// List all known preset provider names.
pub fn all_preset_names() -> &'static [&'static str] {
    &["openrouter", "openai", "ollama", "groq", "together"]
}
