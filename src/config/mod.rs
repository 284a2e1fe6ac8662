// Runtime configuration for the research server
//
// LLM providers are described by static presets (endpoint, default model,
// API key env var) and assembled into an ordered fallback chain at startup.
// Every preset speaks the OpenAI chat-completions wire format, so the
// gateway needs one request/response codec regardless of vendor.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Static description of a supported LLM provider endpoint
#[derive(Debug, Clone, Copy)]
pub struct ProviderPreset {
    /// Short identifier (e.g., "gemini", "openai")
    pub id: &'static str,
    /// Display name
    pub name: &'static str,
    /// Chat-completions base URL, without the trailing `/chat/completions`
    pub base_url: &'static str,
    /// Model sent when the chain entry does not override it
    pub default_model: &'static str,
    /// Environment variable holding the API key
    pub api_key_env: &'static str,
}

/// All supported provider presets, in default fallback order
pub static PROVIDER_PRESETS: &[ProviderPreset] = &[
    ProviderPreset {
        id: "gemini",
        name: "Google Gemini",
        base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
        default_model: "gemini-2.0-flash",
        api_key_env: "GEMINI_API_KEY",
    },
    ProviderPreset {
        id: "openai",
        name: "OpenAI",
        base_url: "https://api.openai.com/v1",
        default_model: "gpt-4o-mini",
        api_key_env: "OPENAI_API_KEY",
    },
    ProviderPreset {
        id: "groq",
        name: "Groq",
        base_url: "https://api.groq.com/openai/v1",
        default_model: "llama-3.3-70b-versatile",
        api_key_env: "GROQ_API_KEY",
    },
    ProviderPreset {
        id: "openrouter",
        name: "OpenRouter",
        base_url: "https://openrouter.ai/api/v1",
        default_model: "meta-llama/llama-3.3-70b-instruct",
        api_key_env: "OPENROUTER_API_KEY",
    },
];

/// Look up a provider preset by its ID
pub fn get_provider_preset(id: &str) -> Option<&'static ProviderPreset> {
    PROVIDER_PRESETS.iter().find(|p| p.id == id)
}

/// One resolved entry in the LLM fallback chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub id: String,
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
}

impl ProviderConfig {
    pub fn from_preset(preset: &ProviderPreset) -> Self {
        ProviderConfig {
            id: preset.id.to_string(),
            base_url: preset.base_url.to_string(),
            model: preset.default_model.to_string(),
            api_key_env: preset.api_key_env.to_string(),
        }
    }

    /// Resolve the API key from the environment. Empty values count as
    /// missing so a blank export does not produce authorization failures.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

/// Parse a comma-separated provider ID list into a fallback chain
pub fn parse_provider_chain(ids: &str) -> Result<Vec<ProviderConfig>, String> {
    let mut chain = Vec::new();
    for id in ids.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let preset = get_provider_preset(id).ok_or_else(|| {
            format!(
                "Unknown provider '{}'. Supported providers: {}",
                id,
                PROVIDER_PRESETS
                    .iter()
                    .map(|p| p.id)
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        })?;
        chain.push(ProviderConfig::from_preset(preset));
    }
    Ok(chain)
}

/// The full preset table as a chain, in default order
pub fn default_provider_chain() -> Vec<ProviderConfig> {
    PROVIDER_PRESETS.iter().map(ProviderConfig::from_preset).collect()
}

/// Fallback replies for small-talk/off-topic prompts, used when the model
/// call fails. One is chosen uniformly at random.
pub static QUICK_RESPONSE_FALLBACKS: &[&str] = &[
    "Hi! I research product markets. Tell me about a product you want to build or explore and I'll dig into the competition.",
    "Hello! Describe a product idea, or a market you're curious about, and I'll pull together competitive research for you.",
    "Hey there. I'm best at competitive research. What product or market should we look into?",
];

/// Generate a short reference code for fatal errors (logged server-side and
/// included in the client-facing error event)
pub fn generate_error_code() -> String {
    use rand::Rng;
    let n: u32 = rand::thread_rng().gen_range(0..0x0100_0000);
    format!("BP-{:06X}", n)
}

/// Settings for the evidence fan-out providers
#[derive(Debug, Clone)]
pub struct EvidenceConfig {
    /// Env var for the Tavily search API key
    pub tavily_api_key_env: String,
    /// Env var for the Serper search API key (fallback search provider)
    pub serper_api_key_env: String,
    /// Concurrent page fetches allowed against the reader endpoint
    pub page_fetch_concurrency: usize,
    /// Truncation limit applied to fetched page text
    pub max_page_chars: usize,
    /// Results requested per search query
    pub results_per_query: usize,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        EvidenceConfig {
            tavily_api_key_env: "TAVILY_API_KEY".to_string(),
            serper_api_key_env: "SERPER_API_KEY".to_string(),
            // The reader endpoint rate-limits aggressively; two in flight
            // is the negotiated ceiling
            page_fetch_concurrency: 2,
            max_page_chars: 6000,
            results_per_query: 8,
        }
    }
}

/// Top-level runtime configuration, assembled in main.rs from CLI flags
/// and environment variables
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub bind_address: String,
    /// Root under which `.blueprint/` state is kept
    pub data_dir: PathBuf,
    /// None means wildcard CORS (development default)
    pub cors_origins: Option<Vec<String>>,
    pub providers: Vec<ProviderConfig>,
    pub evidence: EvidenceConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.providers.is_empty() {
            return Err("At least one LLM provider must be configured".to_string());
        }
        if self.bind_address.trim().is_empty() {
            return Err("Bind address cannot be empty".to_string());
        }
        if let Some(origins) = &self.cors_origins {
            if origins.iter().any(|o| o.trim().is_empty()) {
                return Err("CORS origins cannot contain empty entries".to_string());
            }
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            port: 4400,
            bind_address: "127.0.0.1".to_string(),
            data_dir: PathBuf::from("."),
            cors_origins: None,
            providers: default_provider_chain(),
            evidence: EvidenceConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_provider_preset() {
        let preset = get_provider_preset("gemini");
        assert!(preset.is_some());
        assert_eq!(preset.unwrap().api_key_env, "GEMINI_API_KEY");

        assert!(get_provider_preset("nonexistent").is_none());
    }

    #[test]
    fn test_preset_urls_have_no_trailing_slash() {
        for preset in PROVIDER_PRESETS {
            assert!(
                !preset.base_url.ends_with('/'),
                "preset '{}' has a trailing slash",
                preset.id
            );
        }
    }

    #[test]
    fn test_parse_provider_chain() {
        let chain = parse_provider_chain("openai,gemini").unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].id, "openai");
        assert_eq!(chain[1].id, "gemini");
    }

    #[test]
    fn test_parse_provider_chain_trims_whitespace() {
        let chain = parse_provider_chain(" groq , openrouter ").unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].id, "groq");
    }

    #[test]
    fn test_parse_provider_chain_unknown_id() {
        let result = parse_provider_chain("openai,banana");
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("banana"));
    }

    #[test]
    fn test_api_key_missing_or_blank() {
        let provider = ProviderConfig {
            id: "test".to_string(),
            base_url: "https://example.com/v1".to_string(),
            model: "test-model".to_string(),
            api_key_env: "BLUEPRINT_TEST_KEY_THAT_IS_NOT_SET".to_string(),
        };
        assert_eq!(provider.api_key(), None);

        std::env::set_var("BLUEPRINT_TEST_KEY_BLANK", "   ");
        let provider = ProviderConfig {
            api_key_env: "BLUEPRINT_TEST_KEY_BLANK".to_string(),
            ..provider
        };
        assert_eq!(provider.api_key(), None);
    }

    #[test]
    fn test_generate_error_code_format() {
        for _ in 0..32 {
            let code = generate_error_code();
            assert!(code.starts_with("BP-"));
            assert_eq!(code.len(), 9);
            assert!(code[3..].chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_default_config_validates() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.port, 4400);
        assert_eq!(config.evidence.page_fetch_concurrency, 2);
    }

    #[test]
    fn test_validate_rejects_empty_chain() {
        let config = AppConfig {
            providers: vec![],
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_cors_entry() {
        let config = AppConfig {
            cors_origins: Some(vec!["http://localhost:3000".to_string(), "".to_string()]),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
