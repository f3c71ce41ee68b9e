pub mod ocr;
pub mod office;
pub mod pdf;
pub mod speech;
pub mod tabular;

use std::path::{Path, PathBuf};

use anyhow::Context;
use thiserror::Error;

use crate::config::ExtractConfig;
use speech::{SpeechClient, SpeechError};

/// Floor on the raw workbook text kept before normalization; column padding
/// collapses away later.
const XLSX_MIN_BUDGET: usize = 1 << 20;

const CODE_EXTENSIONS: &[&str] = &[
    "py", "js", "html", "css", "java", "cpp", "c", "php", "rb", "go", "rs", "ts", "sh",
];

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported file format: {extension}")]
    Unsupported { extension: String },
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("file is not valid UTF-8 text")]
    NotUtf8,
    #[error("`{0}` is not installed or not on PATH")]
    MissingTool(&'static str),
    #[error("{tool} failed: {message}")]
    ToolFailed { tool: &'static str, message: String },
    #[error("speech recognition failed: {0}")]
    Speech(#[from] SpeechError),
    #[error("{0:#}")]
    Format(anyhow::Error),
}

impl From<anyhow::Error> for ExtractError {
    fn from(value: anyhow::Error) -> Self {
        ExtractError::Format(value)
    }
}

/// Format family of an uploaded file, decided by extension only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentFormat {
    PlainText,
    Pdf,
    WordProcessor,
    Spreadsheet,
    LegacySpreadsheet,
    Csv,
    Presentation,
    Image,
    Audio,
    Other(String),
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Self {
        let ext = extension_of(path);
        match ext.trim_start_matches('.') {
            "txt" => DocumentFormat::PlainText,
            code if CODE_EXTENSIONS.contains(&code) => DocumentFormat::PlainText,
            "pdf" => DocumentFormat::Pdf,
            "docx" | "doc" => DocumentFormat::WordProcessor,
            "xlsx" => DocumentFormat::Spreadsheet,
            "xls" => DocumentFormat::LegacySpreadsheet,
            "csv" => DocumentFormat::Csv,
            "pptx" | "ppt" => DocumentFormat::Presentation,
            "png" | "jpg" | "jpeg" | "bmp" | "tiff" => DocumentFormat::Image,
            "wav" | "mp3" | "flac" => DocumentFormat::Audio,
            _ => DocumentFormat::Other(ext.clone()),
        }
    }
}

/// Lowercased extension including the leading dot, or an empty string.
fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

#[derive(Clone)]
pub struct DocumentExtractor {
    config: ExtractConfig,
    speech: SpeechClient,
}

impl DocumentExtractor {
    pub fn new(config: ExtractConfig, speech: SpeechClient) -> Self {
        Self { config, speech }
    }

    /// Best-effort plain text for `path`. Failures are reported inline as
    /// `[Unsupported file format: ..]` or `[Error processing file: ..]`.
    pub async fn extract(&self, path: &Path) -> String {
        match self.try_extract(path).await {
            Ok(text) => self.finish(&text),
            Err(ExtractError::Unsupported { extension }) => {
                self.finish(&format!("[Unsupported file format: {extension}]"))
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "extraction failed");
                format!("[Error processing file: {err}]")
            }
        }
    }

    /// Raw extracted text before whitespace normalization and truncation.
    pub async fn try_extract(&self, path: &Path) -> Result<String, ExtractError> {
        let format = DocumentFormat::from_path(path);
        tracing::debug!(path = %path.display(), ?format, "extracting document text");

        match format {
            DocumentFormat::PlainText => read_utf8(path).await,
            DocumentFormat::Pdf => pdf::extract_pdf_text(path).await,
            DocumentFormat::WordProcessor => {
                run_blocking(path, |path| office::extract_docx_text(&path)).await
            }
            DocumentFormat::Spreadsheet => {
                let budget = self.config.max_chars.saturating_mul(4).max(XLSX_MIN_BUDGET);
                run_blocking(path, move |path| office::extract_xlsx_text(&path, budget)).await
            }
            DocumentFormat::LegacySpreadsheet => {
                run_blocking(path, |path| tabular::extract_xls_text(&path)).await
            }
            DocumentFormat::Csv => run_blocking(path, |path| tabular::extract_csv_text(&path)).await,
            DocumentFormat::Presentation => {
                run_blocking(path, |path| office::extract_pptx_text(&path)).await
            }
            DocumentFormat::Image => ocr::extract_image_text(path, &self.config.tesseract_bin).await,
            DocumentFormat::Audio => Ok(self.speech.transcribe(path).await?),
            DocumentFormat::Other(extension) => read_utf8(path)
                .await
                .map_err(|_| ExtractError::Unsupported { extension }),
        }
    }

    fn finish(&self, text: &str) -> String {
        truncate_chars(&normalize_whitespace(text), self.config.max_chars)
    }
}

async fn read_utf8(path: &Path) -> Result<String, ExtractError> {
    let bytes = tokio::fs::read(path).await?;
    String::from_utf8(bytes).map_err(|_| ExtractError::NotUtf8)
}

async fn run_blocking<F>(path: &Path, job: F) -> Result<String, ExtractError>
where
    F: FnOnce(PathBuf) -> anyhow::Result<String> + Send + 'static,
{
    let path = path.to_path_buf();
    let text = tokio::task::spawn_blocking(move || job(path))
        .await
        .context("extraction task panicked")??;
    Ok(text)
}

/// Collapses every run of whitespace to one space and trims the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}
