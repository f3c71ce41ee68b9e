use anyhow::Result;
use regex::Regex;
use serde_json::Value;

use crate::extract::DocumentExtractor;
use crate::models::{ChatMessage, ChatRequest, GenerationOptions, Role, SearchResult};
use crate::ollama::{ChatPayload, OllamaClient};
use crate::search::WebSearchClient;
use crate::storage::UploadStore;

pub const NO_SOURCES_NOTE: &str = "No relevant sources found for your question";
pub const SOURCES_FOUND_NOTE: &str = "I found these sources to help answer your question:";

const ATTACHMENT_PATTERN: &str = r"📄 Attached file: (.+?)\n";

/// Outcome of the optional web search step.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchContext {
    pub results: Vec<SearchResult>,
    pub note: String,
}

impl SearchContext {
    fn no_sources() -> Self {
        Self {
            results: Vec::new(),
            note: NO_SOURCES_NOTE.to_string(),
        }
    }
}

#[derive(Clone)]
pub struct ChatService {
    default_model: String,
    ollama: OllamaClient,
    search: WebSearchClient,
    extractor: DocumentExtractor,
    uploads: UploadStore,
}

impl ChatService {
    pub fn new(
        default_model: impl Into<String>,
        ollama: OllamaClient,
        search: WebSearchClient,
        extractor: DocumentExtractor,
        uploads: UploadStore,
    ) -> Self {
        Self {
            default_model: default_model.into(),
            ollama,
            search,
            extractor,
            uploads,
        }
    }

    /// Builds the upstream chat request, forwards it, and relays the answer.
    /// Search hits, when any were used, are attached to the response as
    /// `web_search_results` and `webSearchNote`.
    pub async fn converse(&self, request: ChatRequest) -> Result<Value> {
        let options = GenerationOptions::resolve(&request.options);
        let mut system = request.system;

        let mut search_context = None;
        if request.web_search {
            let context = self.gather_search_context(&request.messages).await;
            if !context.results.is_empty() {
                let block = build_search_block(&context.results);
                system = Some(match system {
                    Some(existing) => format!("{existing}\n\n{block}"),
                    None => block,
                });
            }
            search_context = Some(context);
        }

        let mut messages = request.messages;
        self.attach_files(&mut messages).await;

        let model = request
            .model
            .as_deref()
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .unwrap_or(self.default_model.as_str());

        tracing::info!(
            model,
            messages = messages.len(),
            web_search = request.web_search,
            "forwarding chat request"
        );

        let payload = ChatPayload {
            model,
            messages: &messages,
            stream: false,
            options,
            system,
        };
        let mut response = self.ollama.chat(&payload).await?;

        if let Some(context) = search_context.filter(|c| !c.results.is_empty()) {
            if let Value::Object(map) = &mut response {
                map.insert(
                    "web_search_results".to_string(),
                    serde_json::to_value(&context.results)?,
                );
                map.insert("webSearchNote".to_string(), Value::String(context.note));
            }
        }

        Ok(response)
    }

    /// Searches with the latest user message. Without one, no search is made.
    pub async fn gather_search_context(&self, messages: &[ChatMessage]) -> SearchContext {
        let Some(query) = messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.as_str())
        else {
            return SearchContext::no_sources();
        };

        let results = self.search.search(query).await;
        if results.is_empty() {
            return SearchContext::no_sources();
        }

        SearchContext {
            results,
            note: SOURCES_FOUND_NOTE.to_string(),
        }
    }

    /// Appends extracted file text to messages that reference an upload.
    /// References to files that are not in the upload dir are left alone.
    pub async fn attach_files(&self, messages: &mut [ChatMessage]) {
        for message in messages.iter_mut() {
            let Some(filename) = attachment_filename(&message.content) else {
                continue;
            };

            let Some(path) = self.uploads.resolve(&filename).await else {
                tracing::debug!(%filename, "attached file not found, skipping");
                continue;
            };

            let text = self.extractor.extract(&path).await;
            message.content.push_str("\n\nFile content:\n");
            message.content.push_str(&text);
        }
    }
}

fn attachment_filename(content: &str) -> Option<String> {
    let re = Regex::new(ATTACHMENT_PATTERN).ok()?;
    let name = re.captures(content)?.get(1)?.as_str().trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn build_search_block(results: &[SearchResult]) -> String {
    let mut block = String::from("### Current Web Search Results:\n");
    block.push_str(
        "Use these search results to provide a direct answer to the user's question. \
         Cite sources using their domain names in parentheses. \
         When possible, provide specific facts, figures, or quotes from the sources.\n\n",
    );

    for (i, result) in results.iter().enumerate() {
        block.push_str(&format!("{}. [{}]({})\n", i + 1, result.title, result.url));
        block.push_str(&format!("   Summary: {}\n\n", result.snippet));
    }

    block
}
