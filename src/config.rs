use std::env;
use std::path::PathBuf;

use crate::search::SearchProvider;

const DEFAULT_SPEECH_MODEL: &str = "whisper-1";

#[derive(Clone, Debug)]
pub struct ExtractConfig {
    pub max_chars: usize,
    pub tesseract_bin: String,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_chars: 15_000,
            tesseract_bin: "tesseract".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub provider: SearchProvider,
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: SearchProvider::DuckDuckGo {
                base_url: DUCKDUCKGO_HTML_URL.to_string(),
            },
            max_results: 5,
        }
    }
}

/// Speech-to-text endpoint speaking the `/audio/transcriptions` multipart API.
#[derive(Clone, Debug)]
pub struct SpeechConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            model: DEFAULT_SPEECH_MODEL.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub prompt_file: PathBuf,
    pub history_file: PathBuf,
    pub ollama_base_url: String,
    pub ollama_bin: String,
    pub default_model: String,
    pub max_upload_bytes: usize,
    pub extract: ExtractConfig,
    pub search: SearchConfig,
    pub speech: SpeechConfig,
}

const DUCKDUCKGO_HTML_URL: &str = "https://html.duckduckgo.com/html/";

impl AppConfig {
    pub fn from_env() -> Self {
        let data_dir = env::var("CHAT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let provider = match env::var("SEARCH_PROVIDER")
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str()
        {
            "searxng" => SearchProvider::Searxng {
                base_url: env::var("SEARXNG_URL")
                    .unwrap_or_else(|_| "http://127.0.0.1:8888".to_string()),
            },
            _ => SearchProvider::DuckDuckGo {
                base_url: env::var("DUCKDUCKGO_URL")
                    .unwrap_or_else(|_| DUCKDUCKGO_HTML_URL.to_string()),
            },
        };

        Self {
            bind_addr: env::var("CHAT_BIND").unwrap_or_else(|_| "127.0.0.1:5001".to_string()),
            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("uploads")),
            prompt_file: env::var("SYSTEM_PROMPT_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("system_prompt.txt")),
            history_file: env::var("HISTORY_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("history.json")),
            data_dir,
            ollama_base_url: env::var("OLLAMA_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:11434".to_string()),
            ollama_bin: env::var("OLLAMA_BIN").unwrap_or_else(|_| "ollama".to_string()),
            default_model: env::var("DEFAULT_MODEL").unwrap_or_else(|_| "llama3".to_string()),
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES", 50 * 1024 * 1024),
            extract: ExtractConfig {
                max_chars: parse_env("MAX_EXTRACT_CHARS", 15_000),
                tesseract_bin: env::var("TESSERACT_BIN")
                    .unwrap_or_else(|_| "tesseract".to_string()),
            },
            search: SearchConfig {
                provider,
                max_results: parse_env("SEARCH_MAX_RESULTS", 5),
            },
            speech: SpeechConfig {
                api_url: env::var("SPEECH_API_URL").ok().filter(|v| !v.trim().is_empty()),
                api_key: env::var("SPEECH_API_KEY").ok().filter(|v| !v.trim().is_empty()),
                model: env::var("SPEECH_MODEL")
                    .unwrap_or_else(|_| DEFAULT_SPEECH_MODEL.to_string()),
            },
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
