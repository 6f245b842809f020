//! Named-entity recognition.
//!
//! An optional capability consulted before pattern extraction. The retriever
//! works without one; a failing recognizer only costs the NER candidates.

use crate::config::NerConfig;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A (surface text, label) pair returned by a recognizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizedEntity {
    pub text: String,
    pub label: String,
}

#[async_trait]
pub trait EntityRecognizer: Send + Sync + std::fmt::Debug {
    async fn recognize(&self, text: &str) -> Result<Vec<RecognizedEntity>>;
}

// =============================================================================
// REST API Request/Response Types
// =============================================================================

/// Request body for the /extract endpoint.
#[derive(Debug, Serialize)]
struct ExtractRequest<'a> {
    text: &'a str,
    options: ExtractOptions,
}

#[derive(Debug, Serialize)]
struct ExtractOptions {
    extract_entities: bool,
    extract_relations: bool,
    coreference: bool,
}

/// Response from the /extract endpoint; relations are ignored.
#[derive(Debug, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    entities: Vec<EntityDto>,
}

#[derive(Debug, Deserialize)]
struct EntityDto {
    text: String,
    label: String,
}

// =============================================================================
// External NLP Recognizer
// =============================================================================

/// Client for an external NLP service (SpaCy, Stanza, ...) exposing `POST /extract`.
#[derive(Debug, Clone)]
pub struct ExternalNlpRecognizer {
    client: Client,
    base_url: String,
}

impl ExternalNlpRecognizer {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("Failed to build NLP client: {e}"))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &NerConfig) -> Result<Self> {
        Self::new(
            config.base_url.clone(),
            Duration::from_millis(config.timeout_ms),
        )
    }
}

#[async_trait]
impl EntityRecognizer for ExternalNlpRecognizer {
    async fn recognize(&self, text: &str) -> Result<Vec<RecognizedEntity>> {
        let url = format!("{}/extract", self.base_url);

        let request = ExtractRequest {
            text,
            options: ExtractOptions {
                extract_entities: true,
                extract_relations: false,
                coreference: false,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to connect to NLP service: {e}"))?;

        if !response.status().is_success() {
            return Err(anyhow!("NLP service returned error: {}", response.status()));
        }

        let body: ExtractResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse NLP response: {e}"))?;

        Ok(body
            .entities
            .into_iter()
            .map(|e| RecognizedEntity {
                text: e.text,
                label: e.label,
            })
            .collect())
    }
}
