//! Generation pipeline: prompt assembly and model invocation.
//!
//! Composes the retrieved context, the rendered conversation history, and
//! the new question into a single prompt, invokes the language model, and
//! persists the exchange only after generation succeeds. Retrieval problems
//! degrade to an empty context rather than failing the request; model
//! problems fail the request without corrupting stored history.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::OllamaConfig;
use crate::error::GenerationError;
use crate::history::{render_history, MessageStore};
use crate::index::IndexManager;
use crate::models::Chunk;

/// Instruction template sent to the model. The content contract (answer
/// strictly from the supplied context, in English, cite sources, admit
/// ignorance) binds the model, not this code; our responsibility ends at
/// assembling the slots correctly.
const PROMPT_TEMPLATE: &str = "\
You are an AI assistant with expertise in the following documents. Your goal is to provide accurate and helpful answers based strictly on the provided context. Do not include information that isn't present in the context. If you don't know the answer, politely say so and Provide concise answers in English only.

Context:
{context}

Conversation History:
{chat_history}

Question: {question}

Instructions:
- Provide clear and concise answers in English only.
- Cite the source document when relevant.
- Use a friendly and professional tone.
- Do not use external information not included in the context.

Answer:";

/// Opaque generation model service.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Generation provider backed by the Ollama `/api/generate` endpoint.
pub struct OllamaGenerator {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaGenerator {
    pub fn new(cfg: &OllamaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            base_url: cfg.base_url.clone(),
            model: cfg.chat_model.clone(),
            client,
        })
    }
}

#[async_trait]
impl GenerationProvider for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
            })
            .send()
            .await
            .context("Failed to reach Ollama generate API")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Ollama generate API error {}: {}", status, body);
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .context("Failed to parse Ollama generate response")?;

        Ok(parsed.response)
    }
}

/// Concatenate retrieved chunk texts with a blank-line separator, keeping
/// retrieval rank order.
pub fn join_chunks(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Substitute the three prompt slots.
pub fn render_prompt(context: &str, chat_history: &str, question: &str) -> String {
    PROMPT_TEMPLATE
        .replace("{context}", context)
        .replace("{chat_history}", chat_history)
        .replace("{question}", question)
}

/// The per-request answer path: history + retrieval + generation + persist.
pub struct ChatPipeline {
    store: MessageStore,
    index: Arc<IndexManager>,
    generator: Arc<dyn GenerationProvider>,
}

impl ChatPipeline {
    pub fn new(
        store: MessageStore,
        index: Arc<IndexManager>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Self {
        Self {
            store,
            index,
            generator,
        }
    }

    /// Answer `question` for `user_id` and persist the exchange.
    ///
    /// Persisting only happens after generation succeeds; any earlier
    /// failure surfaces as a single [`GenerationError`] with no partial
    /// conversation state written.
    pub async fn answer(&self, user_id: i64, question: &str) -> Result<String, GenerationError> {
        // History as stored so far, excluding the in-flight question.
        let messages = self.store.history(user_id).await?;

        // Index problems degrade to "no context available" rather than
        // failing the chat request.
        let context = match self.index.retriever().await {
            Ok(retriever) => match retriever.retrieve(question, self.index.top_k()).await {
                Ok(chunks) => join_chunks(&chunks),
                Err(e) => {
                    warn!(error = %e, "retrieval failed, answering without context");
                    String::new()
                }
            },
            Err(e) => {
                warn!(error = %e, "no retriever available, answering without context");
                String::new()
            }
        };

        let chat_history = render_history(&messages);
        let prompt = render_prompt(&context, &chat_history, question);

        let output = self
            .generator
            .generate(&prompt)
            .await
            .map_err(GenerationError::Model)?;

        self.store
            .append_exchange(user_id, question, &output)
            .await
            .map_err(GenerationError::Persist)?;

        Ok(output)
    }
}
