//! Language-model backend for the repair loop.

mod ollama;

pub use ollama::{OllamaClient, SamplingOptions};

use crate::config::OllamaEndpoint;
use crate::repair::RepairAdapter;
use async_trait::async_trait;
use std::time::Duration;

/// Repair adapter backed by one Ollama endpoint.
pub struct OllamaRepairAdapter {
    client: OllamaClient,
    endpoint: String,
}

impl OllamaRepairAdapter {
    pub fn new(client: OllamaClient, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RepairAdapter for OllamaRepairAdapter {
    async fn repair(&self, prompt: &str) -> anyhow::Result<String> {
        tracing::debug!(
            "Requesting repair from {} ({})",
            self.endpoint,
            self.client.model()
        );
        self.client.generate(prompt).await
    }
}

/// First enabled endpoint that answers and has its model, as a ready adapter.
pub async fn find_available_endpoint(endpoints: &[OllamaEndpoint]) -> Option<OllamaRepairAdapter> {
    for endpoint in endpoints.iter().filter(|e| e.enabled) {
        let client = OllamaClient::with_options(
            &endpoint.url,
            &endpoint.model,
            SamplingOptions {
                temperature: endpoint.temperature,
                num_predict: endpoint.max_tokens,
            },
            Duration::from_secs(endpoint.request_timeout_seconds),
        );
        if client.is_available().await {
            tracing::info!("Using repair endpoint {} ({})", endpoint.name, endpoint.model);
            return Some(OllamaRepairAdapter::new(client, endpoint.name.clone()));
        }
        tracing::debug!("Endpoint {} not available, trying next", endpoint.name);
    }
    None
}
