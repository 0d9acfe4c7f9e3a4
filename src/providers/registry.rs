use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{Config, OpenAiConfig};

use super::{LlmProvider, ProviderError, ollama::OllamaProvider, openai::OpenAiProvider};

pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    pub fn from_config(cfg: &Config) -> Result<Self, ProviderError> {
        let mut map: HashMap<String, Arc<dyn LlmProvider>> = HashMap::new();

        // Ollama is always available for local dev
        let oc = cfg.ollama.clone().unwrap_or_default();
        let p = OllamaProvider::new(oc.effective_base_url(), oc.effective_model())?;
        map.insert("ollama".into(), Arc::new(p));

        // OpenAI-compatible: a config section is enough, local servers need no key
        let openai = match &cfg.openai {
            Some(c) => Some(c.clone()),
            None => std::env::var("OPENAI_API_KEY").ok().map(|key| OpenAiConfig {
                api_key: Some(key),
                ..OpenAiConfig::default()
            }),
        };
        if let Some(c) = openai {
            let p = OpenAiProvider::new(
                c.effective_base_url(),
                c.effective_api_key(),
                c.effective_model(),
            )?;
            map.insert("openai".into(), Arc::new(p));
        }

        Ok(Self { providers: map })
    }

    pub fn get(&self, key: &str) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        self.providers
            .get(key)
            .cloned()
            .ok_or_else(|| ProviderError::Config(format!("unknown provider: {key}")))
    }

    pub fn list(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.providers.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OllamaConfig;

    #[test]
    fn openai_section_registers_provider() {
        let cfg = Config {
            ollama: Some(OllamaConfig {
                base_url: Some("http://box:11434".into()),
                default_model: Some("llama3.1".into()),
            }),
            openai: Some(OpenAiConfig {
                api_key: None,
                base_url: Some("http://localhost:1234/v1".into()),
                default_model: Some("local".into()),
            }),
            ..Config::default()
        };
        let registry = ProviderRegistry::from_config(&cfg).unwrap();
        assert_eq!(registry.list(), vec!["ollama", "openai"]);
        assert_eq!(registry.get("openai").unwrap().default_model(), "local");
        assert_eq!(registry.get("ollama").unwrap().name(), "ollama");
    }

    #[test]
    fn unknown_key_is_a_config_error() {
        let registry = ProviderRegistry::from_config(&Config::default()).unwrap();
        assert!(matches!(registry.get("nope"), Err(ProviderError::Config(_))));
    }
}
