use std::path::Path;

use tokio::process::Command;

use super::pdf::has_command;
use super::ExtractError;

/// Whole-image OCR through the `tesseract` CLI.
pub async fn extract_image_text(image_path: &Path, tesseract_bin: &str) -> Result<String, ExtractError> {
    if !has_command(tesseract_bin).await {
        return Err(ExtractError::MissingTool("tesseract"));
    }

    let output = Command::new(tesseract_bin)
        .arg(image_path)
        .arg("stdout")
        .output()
        .await?;

    if !output.status.success() {
        return Err(ExtractError::ToolFailed {
            tool: "tesseract",
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
