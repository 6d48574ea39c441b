use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sampling settings sent with every completion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplingOptions {
    pub temperature: f32,
    /// Upper bound on generated tokens
    pub num_predict: u32,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            num_predict: 2048,
        }
    }
}

/// `/api/generate` client for one Ollama server and model.
pub struct OllamaClient {
    http: Client,
    base_url: String,
    model: String,
    options: SamplingOptions,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    stream: bool,
    options: SamplingOptions,
}

#[derive(Deserialize)]
struct CompletionResponse {
    response: String,
    #[serde(default)]
    done_reason: Option<String>,
}

#[derive(Deserialize)]
struct TagList {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

const SYSTEM_PROMPT: &str =
    "You repair Java unit tests. Reply with the complete corrected Java file only.";

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        Self::with_options(base_url, model, SamplingOptions::default(), Duration::from_secs(120))
    }

    pub fn with_options(
        base_url: &str,
        model: &str,
        options: SamplingOptions,
        request_timeout: Duration,
    ) -> Self {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            options,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Non-streaming completion of `prompt` under the repair system prompt.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let body = CompletionRequest {
            model: &self.model,
            system: SYSTEM_PROMPT,
            prompt,
            stream: false,
            options: self.options,
        };

        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Ollama at {} unreachable", self.base_url))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama returned {}: {}", status, text.trim());
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .context("Unexpected completion payload from Ollama")?;
        if completion.done_reason.as_deref() == Some("length") {
            tracing::warn!(
                "{} stopped at the {}-token limit; the repaired file may be truncated",
                self.model,
                self.options.num_predict
            );
        }
        Ok(completion.response)
    }

    /// True when the server answers and has the configured model pulled.
    pub async fn is_available(&self) -> bool {
        let response = match self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
        {
            Ok(r) if r.status().is_success() => r,
            _ => return false,
        };
        match response.json::<TagList>().await {
            Ok(tags) => has_model(&tags.models, &self.model),
            Err(_) => false,
        }
    }
}

/// Tag names carry an implicit `:latest` when no tag is given.
fn has_model(models: &[TagEntry], wanted: &str) -> bool {
    let normalize = |name: &str| {
        if name.contains(':') {
            name.to_string()
        } else {
            format!("{}:latest", name)
        }
    };
    let wanted = normalize(wanted);
    models.iter().any(|m| normalize(&m.name) == wanted)
}
