use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use tokio::process::Command;

use super::ExtractError;

/// Page texts joined with a trailing newline per page. Uses poppler's
/// `pdftotext` when it is available and falls back to `pdf-extract`.
pub async fn extract_pdf_text(pdf_path: &Path) -> Result<String, ExtractError> {
    if has_command("pdftotext").await {
        match extract_with_poppler(pdf_path).await {
            Ok(pages) if !pages.is_empty() => return Ok(join_pages(&pages)),
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(path = %pdf_path.display(), error = %err, "pdftotext failed, using pdf-extract");
            }
        }
    }

    let pdf_path = pdf_path.to_path_buf();
    let pages = tokio::task::spawn_blocking(move || extract_with_pdf_extract(&pdf_path))
        .await
        .context("PDF extraction task panicked")??;

    Ok(join_pages(&pages))
}

fn extract_with_pdf_extract(pdf_path: &Path) -> Result<Vec<String>> {
    pdf_extract::extract_text_by_pages(pdf_path).context("failed to extract text from PDF")
}

fn join_pages(pages: &[String]) -> String {
    let mut text = String::new();
    for page in pages {
        text.push_str(page);
        text.push('\n');
    }
    text
}

async fn extract_with_poppler(pdf_path: &Path) -> Result<Vec<String>> {
    let page_count = get_pdf_page_count(pdf_path).await?;
    let mut pages = Vec::with_capacity(page_count);

    for page in 1..=page_count {
        let output = Command::new("pdftotext")
            .arg("-f")
            .arg(page.to_string())
            .arg("-l")
            .arg(page.to_string())
            .arg("-layout")
            .arg("-nopgbrk")
            .arg(pdf_path)
            .arg("-")
            .output()
            .await
            .with_context(|| format!("failed to run pdftotext for page {}", page))?;

        if !output.status.success() {
            anyhow::bail!(
                "pdftotext exited with {} on page {}: {}",
                output.status,
                page,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        pages.push(String::from_utf8_lossy(&output.stdout).to_string());
    }

    Ok(pages)
}

async fn get_pdf_page_count(pdf_path: &Path) -> Result<usize> {
    let output = Command::new("pdfinfo")
        .arg(pdf_path)
        .output()
        .await
        .context("failed to run pdfinfo")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("pdfinfo exited with non-zero status"));
    }

    parse_page_count(&String::from_utf8_lossy(&output.stdout))
}

fn parse_page_count(pdfinfo_output: &str) -> Result<usize> {
    let regex = Regex::new(r"(?m)^Pages:\s+(\d+)\s*$")?;
    regex
        .captures(pdfinfo_output)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<usize>().ok())
        .ok_or_else(|| anyhow::anyhow!("unable to parse page count from pdfinfo"))
}

pub(crate) async fn has_command(binary: &str) -> bool {
    // pdftotext and tesseract disagree on version flags; `which` works for both.
    Command::new("which")
        .arg(binary)
        .output()
        .await
        .map(|out| out.status.success() && !out.stdout.is_empty())
        .unwrap_or(false)
}
