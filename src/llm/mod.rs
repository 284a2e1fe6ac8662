// LLM gateway: named-template invocation with provider fallback and
// output-schema repair
//
// The gateway walks an ordered provider chain. A transport-class failure
// (unreachable, rate-limited, empty, unconfigured key) advances the chain
// permanently for the rest of the process; a schema-class failure gets one
// repair retry on the same provider and is then surfaced as a stage error.

pub mod client;
pub mod schema;

pub use client::{ChatMessage, ChatTransport, HttpChatTransport};
pub use schema::{
    classification_schema, competitors_schema, gaps_schema, overview_schema, problem_schema,
    OutputSchema,
};

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use thiserror::Error;

use crate::config::ProviderConfig;
use crate::prompts::{self, PromptResolver};
use crate::utils::lock_mutex_recover;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("provider '{provider}' transport failure: {message}")]
    Transport { provider: String, message: String },

    #[error("provider '{provider}' rate limited")]
    RateLimited { provider: String },

    #[error("provider '{provider}' returned an empty response")]
    EmptyResponse { provider: String },

    #[error("provider '{provider}' has no API key configured ({env})")]
    MissingKey { provider: String, env: String },

    #[error("model output failed validation after repair: {0}")]
    InvalidOutput(String),

    #[error("prompt template error: {0}")]
    Template(String),

    #[error("all providers in the fallback chain failed")]
    ChainExhausted,
}

impl LlmError {
    /// Failures that condemn the provider and advance the fallback chain.
    /// Output-validation failures stay with the call: another provider is
    /// not more likely to satisfy the schema than a repair retry was.
    pub fn advances_chain(&self) -> bool {
        matches!(
            self,
            LlmError::Transport { .. }
                | LlmError::RateLimited { .. }
                | LlmError::EmptyResponse { .. }
                | LlmError::MissingKey { .. }
        )
    }
}

pub struct LlmGateway {
    providers: Vec<ProviderConfig>,
    transport: Arc<dyn ChatTransport>,
    resolver: Mutex<PromptResolver>,
    /// Index of the first provider still eligible. Only ever increases;
    /// a switch is permanent for the process lifetime.
    active: AtomicUsize,
}

impl LlmGateway {
    pub fn new(providers: Vec<ProviderConfig>, data_dir: &Path) -> Self {
        Self::with_transport(
            providers,
            PromptResolver::new().with_data_dir(data_dir),
            Arc::new(HttpChatTransport::new()),
        )
    }

    /// Construct with an explicit transport (tests substitute a scripted one)
    pub fn with_transport(
        providers: Vec<ProviderConfig>,
        resolver: PromptResolver,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        LlmGateway {
            providers,
            transport,
            resolver: Mutex::new(resolver),
            active: AtomicUsize::new(0),
        }
    }

    /// ID of the provider the next call will try first
    pub fn active_provider_id(&self) -> Option<&str> {
        self.providers
            .get(self.active.load(Ordering::SeqCst))
            .map(|p| p.id.as_str())
    }

    /// Resolve and render a named template, send it to the active provider,
    /// and return the schema-validated JSON output.
    pub async fn invoke(
        &self,
        template_name: &str,
        bindings: &tera::Context,
        schema: &OutputSchema,
    ) -> Result<Value, LlmError> {
        let prompt = {
            let mut resolver = lock_mutex_recover(&self.resolver);
            prompts::render_prompt(&mut resolver, template_name, bindings)
                .map_err(|e| LlmError::Template(e.to_string()))?
        };

        let start = self.active.load(Ordering::SeqCst);
        for index in start..self.providers.len() {
            let provider = &self.providers[index];
            log::debug!(
                "LLM invoke '{}' via provider '{}' (model {})",
                template_name,
                provider.id,
                provider.model
            );

            match self.call_with_repair(provider, &prompt, schema).await {
                Ok(value) => return Ok(value),
                Err(e) if e.advances_chain() => {
                    log::warn!(
                        "Provider '{}' failed ({}); advancing fallback chain permanently",
                        provider.id,
                        e
                    );
                    // fetch_max: never move the chain backwards, even if a
                    // slow concurrent call reports a stale failure
                    self.active.fetch_max(index + 1, Ordering::SeqCst);
                }
                Err(e) => return Err(e),
            }
        }

        log::error!("LLM fallback chain exhausted for template '{}'", template_name);
        Err(LlmError::ChainExhausted)
    }

    /// One provider attempt: initial call, then a single repair retry when
    /// the output fails JSON extraction or schema validation.
    async fn call_with_repair(
        &self,
        provider: &ProviderConfig,
        prompt: &str,
        schema: &OutputSchema,
    ) -> Result<Value, LlmError> {
        let messages = vec![ChatMessage::user(prompt)];
        let raw = self.transport.complete(provider, &messages).await?;

        let first_error = match parse_and_validate(&raw, schema) {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        log::warn!(
            "Provider '{}' produced invalid '{}' output ({}); issuing repair retry",
            provider.id,
            schema.name,
            first_error
        );

        let mut repair = messages;
        repair.push(ChatMessage::assistant(raw));
        repair.push(ChatMessage::user(repair_instruction(&first_error, schema)));

        let raw = self.transport.complete(provider, &repair).await?;
        parse_and_validate(&raw, schema).map_err(LlmError::InvalidOutput)
    }
}

fn parse_and_validate(raw: &str, schema: &OutputSchema) -> Result<Value, String> {
    let value = schema::extract_json(raw)?;
    schema.validate(&value)?;
    Ok(value)
}

fn repair_instruction(error: &str, schema: &OutputSchema) -> String {
    format!(
        "Your previous reply could not be used: {}. Reply again with ONLY a valid JSON object \
         matching this shape, no markdown and no commentary: {}",
        error,
        schema.describe()
    )
}
