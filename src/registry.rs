use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum ModelListError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Locally installed models as reported by the `ollama` CLI.
#[derive(Clone)]
pub struct ModelRegistry {
    ollama_bin: String,
}

#[derive(Deserialize)]
struct ListedModel {
    name: String,
}

impl ModelRegistry {
    pub fn new(ollama_bin: impl Into<String>) -> Self {
        Self {
            ollama_bin: ollama_bin.into(),
        }
    }

    /// Tries the machine-readable listing first, then the human table.
    pub async fn list_models(&self) -> Result<Vec<String>, ModelListError> {
        if let Some(stdout) = self.run(&["list", "--json"]).await? {
            if let Some(models) = parse_json_listing(&stdout) {
                return Ok(models);
            }
            tracing::debug!("`ollama list --json` output was not usable, parsing table");
        }

        match self.run(&["list"]).await? {
            Some(stdout) => Ok(parse_table_listing(&stdout)),
            None => Ok(Vec::new()),
        }
    }

    /// Stdout of a successful run with non-blank output.
    async fn run(&self, args: &[&str]) -> Result<Option<String>, ModelListError> {
        let output = Command::new(&self.ollama_bin)
            .args(args)
            .output()
            .await
            .map_err(|source| ModelListError::Spawn {
                command: format!("{} {}", self.ollama_bin, args.join(" ")),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() || stdout.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(stdout))
    }
}

/// Accepts either a bare array of `{name}` objects or `{"models": [...]}`.
fn parse_json_listing(stdout: &str) -> Option<Vec<String>> {
    let value: Value = serde_json::from_str(stdout.trim()).ok()?;
    let list = match value {
        Value::Array(items) => Value::Array(items),
        Value::Object(mut map) => map.remove("models")?,
        _ => return None,
    };

    let models: Vec<ListedModel> = serde_json::from_value(list).ok()?;
    Some(models.into_iter().map(|m| m.name).collect())
}

fn parse_table_listing(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .map(|name| match name.rsplit_once('/') {
            Some((_, short)) => short.to_string(),
            None => name.to_string(),
        })
        .collect()
}
