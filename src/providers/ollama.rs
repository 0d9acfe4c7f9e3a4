use super::{
    ChatRequest, Fragment, FragmentStream, LlmProvider, ProviderError, body_lines,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    default_model: String,
}

impl OllamaProvider {
    pub fn new(base_url: String, default_model: String) -> Result<Self, ProviderError> {
        let client = Client::builder().build()?;
        Ok(Self { client, base_url, default_model })
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Options {
    num_ctx: usize,
    temperature: f32,
}

#[derive(Serialize)]
struct Body<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    stream: bool,
    think: bool,
    options: Options,
}

#[derive(Deserialize, Default)]
struct ChunkMsg {
    #[serde(default)]
    content: String,
    #[serde(default)]
    thinking: String,
}

#[derive(Deserialize)]
struct Chunk {
    #[serde(default)]
    message: Option<ChunkMsg>,
    #[serde(default)]
    error: Option<String>,
}

fn build_body(req: &ChatRequest) -> Body<'_> {
    Body {
        model: &req.model,
        messages: req
            .messages
            .iter()
            .map(|m| Msg { role: m.role.as_str(), content: &m.content })
            .collect(),
        stream: true,
        think: req.think,
        options: Options { num_ctx: req.options.num_ctx, temperature: req.options.temperature },
    }
}

/// Turns a non-2xx response into `Api`, keeping Ollama's `{"error": ...}` text.
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ProviderError::Api(error_message(status, &body)))
}

fn error_message(status: StatusCode, body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: String,
    }
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(e) => format!("{status}: {}", e.error),
        Err(_) if body.trim().is_empty() => status.to_string(),
        Err(_) => format!("{status}: {}", body.trim()),
    }
}

/// Maps one NDJSON line of `/api/chat` output to a fragment.
fn parse_line(line: &str) -> Result<Fragment, ProviderError> {
    let chunk: Chunk = serde_json::from_str(line)?;
    if let Some(err) = chunk.error {
        return Err(ProviderError::Api(err));
    }
    let msg = chunk.message.unwrap_or_default();
    Ok(Fragment { reasoning: msg.thinking, answer: msg.content })
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str { "ollama" }
    fn default_model(&self) -> &str { &self.default_model }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        #[derive(Deserialize)]
        struct Model { name: String }
        #[derive(Deserialize)]
        struct Resp { models: Vec<Model> }
        let url = format!("{}/api/tags", self.base_url.trim_end_matches('/'));
        let resp = self.client.get(url).send().await?;
        let resp: Resp = check_status(resp).await?.json().await?;
        Ok(resp.models.into_iter().map(|m| m.name).collect())
    }

    async fn chat_stream(&self, req: ChatRequest) -> Result<FragmentStream, ProviderError> {
        let body = build_body(&req);
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        debug!(model = %req.model, think = req.think, messages = req.messages.len(), "ollama chat request");
        let resp = self.client.post(url).json(&body).send().await?;
        let resp = check_status(resp).await?;

        let stream = body_lines(resp.bytes_stream())
            .map(|line| line.and_then(|l| parse_line(&l)))
            .boxed();

        Ok(stream)
    }
}
