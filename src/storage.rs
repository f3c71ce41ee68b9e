use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

/// Single persisted system prompt; last write wins.
#[derive(Clone, Debug)]
pub struct PromptStore {
    path: PathBuf,
}

impl PromptStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn load(&self) -> Result<String> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(DEFAULT_SYSTEM_PROMPT.to_string());
        }

        tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read system prompt: {}", self.path.display()))
    }

    pub async fn save(&self, prompt: &str) -> Result<()> {
        ensure_parent(&self.path).await?;
        tokio::fs::write(&self.path, prompt)
            .await
            .with_context(|| format!("failed to write system prompt: {}", self.path.display()))
    }
}

#[derive(Clone, Debug)]
pub struct HistoryFile {
    path: PathBuf,
}

impl HistoryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Truncates the file to zero length, creating it when absent.
    pub async fn clear(&self) -> Result<()> {
        ensure_parent(&self.path).await?;
        tokio::fs::File::create(&self.path)
            .await
            .with_context(|| format!("failed to clear history: {}", self.path.display()))?;
        Ok(())
    }
}

/// Flat directory of uploads keyed by original file name.
#[derive(Clone, Debug)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes `bytes` under the final component of `filename`, replacing any
    /// earlier upload with the same name.
    pub async fn save(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        let name = safe_file_name(filename)
            .with_context(|| format!("invalid upload file name: {filename:?}"))?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create upload dir: {}", self.dir.display()))?;

        let path = self.dir.join(name);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("failed to store upload: {}", path.display()))?;

        tracing::info!(path = %path.display(), bytes = bytes.len(), "stored upload");
        Ok(path)
    }

    /// Path of a previously stored upload, if it exists.
    pub async fn resolve(&self, filename: &str) -> Option<PathBuf> {
        let path = self.dir.join(safe_file_name(filename)?);
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Some(path),
            _ => None,
        }
    }
}

fn safe_file_name(filename: &str) -> Option<&str> {
    let name = Path::new(filename.trim()).file_name()?.to_str()?;
    (!name.is_empty() && name != "." && name != "..").then_some(name)
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prompt_defaults_until_saved() {
        let dir = tempfile::tempdir().unwrap();
        let store = PromptStore::new(dir.path().join("system_prompt.txt"));

        assert_eq!(store.load().await.unwrap(), DEFAULT_SYSTEM_PROMPT);

        store.save("Be terse.").await.unwrap();
        store.save("Answer in French.").await.unwrap();
        assert_eq!(store.load().await.unwrap(), "Answer in French.");
    }

    #[tokio::test]
    async fn history_clear_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, r#"[{"role":"user"}]"#).unwrap();

        HistoryFile::new(&path).clear().await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

        let fresh = dir.path().join("nested/history.json");
        HistoryFile::new(&fresh).clear().await.unwrap();
        assert!(fresh.exists());
    }

    #[tokio::test]
    async fn uploads_overwrite_by_name_and_stay_in_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path().join("uploads"));

        let first = store.save("notes.txt", b"one").await.unwrap();
        let second = store.save("notes.txt", b"two").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(std::fs::read_to_string(&second).unwrap(), "two");

        let escaped = store.save("../../etc/passwd", b"x").await.unwrap();
        assert_eq!(escaped, dir.path().join("uploads").join("passwd"));

        assert!(store.save("..", b"x").await.is_err());
        assert!(store.save("", b"x").await.is_err());
    }

    #[tokio::test]
    async fn resolve_only_finds_existing_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::new(dir.path());
        store.save("report.pdf", b"%PDF").await.unwrap();

        assert_eq!(
            store.resolve("report.pdf").await,
            Some(dir.path().join("report.pdf"))
        );
        assert_eq!(store.resolve("missing.pdf").await, None);
    }
}
