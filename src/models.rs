use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Generation settings as sent by the browser. Anything left unset falls
/// back to [`GenerationOptions::default`] when the upstream request is built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatOptions {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    #[serde(alias = "repeat_penalty")]
    pub repeat_penalty: Option<f32>,
    pub max_tokens: Option<u32>,
    pub context_length: Option<u32>,
}

/// The `options` object of an Ollama chat request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub repeat_penalty: f32,
    pub num_predict: u32,
    pub num_ctx: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            top_p: 0.9,
            top_k: 40,
            repeat_penalty: 1.1,
            num_predict: 2048,
            num_ctx: 2048,
        }
    }
}

impl GenerationOptions {
    pub fn resolve(options: &ChatOptions) -> Self {
        let defaults = Self::default();
        Self {
            temperature: options.temperature.unwrap_or(defaults.temperature),
            top_p: options.top_p.unwrap_or(defaults.top_p),
            top_k: options.top_k.unwrap_or(defaults.top_k),
            repeat_penalty: options.repeat_penalty.unwrap_or(defaults.repeat_penalty),
            num_predict: options.max_tokens.unwrap_or(defaults.num_predict),
            num_ctx: options.context_length.unwrap_or(defaults.num_ctx),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub domain: String,
}

impl SearchResult {
    pub fn new(title: impl Into<String>, url: impl Into<String>, snippet: impl Into<String>) -> Self {
        let url = url.into();
        let domain = domain_of(&url);
        Self {
            title: title.into(),
            url,
            snippet: snippet.into(),
            domain,
        }
    }
}

fn domain_of(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return String::new();
    };

    match (parsed.host_str(), parsed.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        _ => String::new(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub options: ChatOptions,
    #[serde(default, rename = "webSearch")]
    pub web_search: bool,
    #[serde(default)]
    pub system: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRequest {
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptResponse {
    pub prompt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub filename: String,
    pub path: String,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_options_resolve_to_documented_defaults() {
        let resolved = GenerationOptions::resolve(&ChatOptions::default());
        assert_eq!(
            resolved,
            GenerationOptions {
                temperature: 0.8,
                top_p: 0.9,
                top_k: 40,
                repeat_penalty: 1.1,
                num_predict: 2048,
                num_ctx: 2048,
            }
        );
    }

    #[test]
    fn caller_options_override_defaults_individually() {
        let options: ChatOptions =
            serde_json::from_str(r#"{"temperature":0.2,"topK":10,"maxTokens":512}"#).unwrap();
        let resolved = GenerationOptions::resolve(&options);
        assert_eq!(resolved.temperature, 0.2);
        assert_eq!(resolved.top_k, 10);
        assert_eq!(resolved.num_predict, 512);
        assert_eq!(resolved.top_p, 0.9);
        assert_eq!(resolved.num_ctx, 2048);
    }

    #[test]
    fn repeat_penalty_accepts_both_spellings() {
        let camel: ChatOptions = serde_json::from_str(r#"{"repeatPenalty":1.3}"#).unwrap();
        let snake: ChatOptions = serde_json::from_str(r#"{"repeat_penalty":1.3}"#).unwrap();
        assert_eq!(camel.repeat_penalty, Some(1.3));
        assert_eq!(snake.repeat_penalty, Some(1.3));
    }

    #[test]
    fn search_result_domain_comes_from_url_host() {
        let result = SearchResult::new("Rust", "https://www.rust-lang.org/learn", "Learn Rust");
        assert_eq!(result.domain, "www.rust-lang.org");

        let with_port = SearchResult::new("Local", "http://localhost:8080/x", "");
        assert_eq!(with_port.domain, "localhost:8080");

        let broken = SearchResult::new("Broken", "not a url", "");
        assert_eq!(broken.domain, "");
    }

    #[test]
    fn chat_request_uses_browser_field_names() {
        let request: ChatRequest = serde_json::from_str(
            r#"{"model":"llama3","messages":[{"role":"user","content":"hi"}],"webSearch":true}"#,
        )
        .unwrap();
        assert!(request.web_search);
        assert_eq!(request.messages[0].role, Role::User);
        assert!(request.system.is_none());
    }
}
