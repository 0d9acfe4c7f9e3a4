use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a capable AI assistant. Let's think step by step.";
pub const DEFAULT_NUM_CTX: usize = 8 * 1024;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_MODEL: &str = "qwen3:8b";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub ollama: Option<OllamaConfig>,
    pub openai: Option<OpenAiConfig>,
    pub model: Option<ModelConfig>,
    pub prompt: Option<PromptConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OllamaConfig {
    pub base_url: Option<String>,
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelConfig {
    /// Provider key: ollama | openai
    pub provider: Option<String>,
    /// Model used when thinking is off
    pub instruct: Option<String>,
    /// Model used when thinking is on
    pub thinking: Option<String>,
    pub options: Option<OptionsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OptionsConfig {
    pub num_ctx: Option<usize>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PromptConfig {
    pub system: Option<String>,
    /// Read the system prompt from this file instead; takes precedence
    pub system_file: Option<String>,
}

impl Config {
    pub fn load(path: Option<&str>) -> Result<Self> {
        if let Some(p) = path {
            let text = fs::read_to_string(p).with_context(|| format!("reading config at {p}"))?;
            return parse(&text).with_context(|| "parsing config");
        }
        let default = Self::default_path()?;
        if default.exists() {
            let text = fs::read_to_string(&default)
                .with_context(|| format!("reading config at {}", default.display()))?;
            parse(&text).with_context(|| "parsing config")
        } else {
            Ok(Self::default())
        }
    }

    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir().ok_or_else(|| anyhow!("cannot resolve config dir"))?;
        Ok(base.join("ollama-chat").join("config.toml"))
    }

    pub fn write_example_if_absent() -> Result<PathBuf> {
        let path = Self::default_path()?;
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let example = r#"# ollama-chat config (TOML)

[ollama]
# OLLAMA_HOST overrides this when set
base_url = "http://localhost:11434"

[openai]
# api_key can be omitted to use env var OPENAI_API_KEY
# base_url can point at any OpenAI-compatible server
base_url = "https://api.openai.com/v1"
default_model = "gpt-4o-mini"

[model]
provider = "ollama"
instruct = "qwen3:8b"
thinking = "qwen3:8b"

[model.options]
# context window in tokens, at least 2048
num_ctx = 8192
# 0.0 - 1.0
temperature = 0.7

[prompt]
system = "You are a capable AI assistant. Let's think step by step."
# system_file = "/path/to/system_prompt.md"
"#;
            fs::write(&path, example)?;
        }
        Ok(path)
    }

    pub fn provider_key(&self) -> String {
        self.model
            .as_ref()
            .and_then(|m| m.provider.clone())
            .unwrap_or_else(|| "ollama".into())
    }

    pub fn instruct_model(&self) -> Option<String> {
        self.model.as_ref().and_then(|m| m.instruct.clone())
    }

    /// Falls back to the instruct model.
    pub fn thinking_model(&self) -> Option<String> {
        self.model
            .as_ref()
            .and_then(|m| m.thinking.clone())
            .or_else(|| self.instruct_model())
    }

    pub fn num_ctx(&self) -> usize {
        self.options().and_then(|o| o.num_ctx).unwrap_or(DEFAULT_NUM_CTX)
    }

    pub fn temperature(&self) -> f32 {
        self.options()
            .and_then(|o| o.temperature)
            .unwrap_or(DEFAULT_TEMPERATURE)
    }

    fn options(&self) -> Option<&OptionsConfig> {
        self.model.as_ref().and_then(|m| m.options.as_ref())
    }

    /// Resolves the default system prompt: `system_file`, then `system`, then
    /// the built-in prompt.
    pub fn system_prompt(&self) -> Result<String> {
        let prompt = self.prompt.as_ref();
        if let Some(file) = prompt.and_then(|p| p.system_file.as_deref()) {
            let text = fs::read_to_string(file)
                .with_context(|| format!("reading system prompt at {file}"))?;
            if !text.trim().is_empty() {
                return Ok(text);
            }
        }
        Ok(prompt
            .and_then(|p| p.system.clone())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.into()))
    }
}

fn parse(text: &str) -> Result<Config> {
    toml::from_str(text).map_err(|e| anyhow!(e))
}

impl OllamaConfig {
    pub fn effective_base_url(&self) -> String {
        std::env::var("OLLAMA_HOST")
            .ok()
            .filter(|h| !h.trim().is_empty())
            .map(|h| normalize_host(&h))
            .or_else(|| self.base_url.clone())
            .unwrap_or_else(|| DEFAULT_OLLAMA_URL.into())
    }

    pub fn effective_model(&self) -> String {
        self.default_model
            .clone()
            .unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.into())
    }
}

impl OpenAiConfig {
    pub fn effective_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }

    pub fn effective_base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_URL.into())
    }

    pub fn effective_model(&self) -> String {
        self.default_model
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.into())
    }
}

/// `OLLAMA_HOST` is often given as `host:port` without a scheme.
fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.contains("://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = parse("").unwrap();
        assert_eq!(cfg.provider_key(), "ollama");
        assert_eq!(cfg.num_ctx(), DEFAULT_NUM_CTX);
        assert_eq!(cfg.temperature(), DEFAULT_TEMPERATURE);
        assert_eq!(cfg.system_prompt().unwrap(), DEFAULT_SYSTEM_PROMPT);
        assert!(cfg.instruct_model().is_none());
    }

    #[test]
    fn parses_model_section() {
        let cfg = parse(
            r#"
[model]
provider = "openai"
instruct = "qwen3:4b"

[model.options]
num_ctx = 4096
temperature = 0.2

[prompt]
system = "Be brief."
"#,
        )
        .unwrap();
        assert_eq!(cfg.provider_key(), "openai");
        assert_eq!(cfg.instruct_model().as_deref(), Some("qwen3:4b"));
        assert_eq!(cfg.thinking_model().as_deref(), Some("qwen3:4b"));
        assert_eq!(cfg.num_ctx(), 4096);
        assert_eq!(cfg.temperature(), 0.2);
        assert_eq!(cfg.system_prompt().unwrap(), "Be brief.");
    }

    #[test]
    fn system_file_takes_precedence() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "From file.").unwrap();
        let cfg = Config {
            prompt: Some(PromptConfig {
                system: Some("Inline.".into()),
                system_file: Some(file.path().to_string_lossy().into_owned()),
            }),
            ..Config::default()
        };
        assert_eq!(cfg.system_prompt().unwrap(), "From file.");
    }

    #[test]
    fn missing_system_file_is_an_error() {
        let cfg = Config {
            prompt: Some(PromptConfig {
                system: None,
                system_file: Some("/definitely/not/here.md".into()),
            }),
            ..Config::default()
        };
        assert!(cfg.system_prompt().is_err());
    }

    #[test]
    fn invalid_toml_is_rejected() {
        assert!(parse("[model\nprovider =").is_err());
    }

    #[test]
    fn host_normalization() {
        assert_eq!(normalize_host("127.0.0.1:11434"), "http://127.0.0.1:11434");
        assert_eq!(normalize_host("https://box:11434/"), "https://box:11434");
    }
}
