use super::{ChatRequest, Fragment, FragmentStream, LlmProvider, ProviderError, body_lines};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// OpenAI-compatible chat completions (OpenAI, DeepSeek, vLLM, LM Studio, ...).
#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    default_model: String,
}

impl OpenAiProvider {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        default_model: String,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
            default_model,
        })
    }

    fn authorized(&self, rb: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => rb.bearer_auth(key),
            None => rb,
        }
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Body<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize, Default)]
struct DeltaMsg {
    content: Option<String>,
    // DeepSeek and vLLM use `reasoning_content`, some gateways `reasoning`
    #[serde(alias = "reasoning")]
    reasoning_content: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    delta: DeltaMsg,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Deserialize)]
struct Chunk {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiError>,
}

/// Maps one SSE line to a fragment. Non-data lines and `[DONE]` map to `None`.
fn parse_line(line: &str) -> Option<Result<Fragment, ProviderError>> {
    let data = line.trim().strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        return None;
    }
    let chunk: Chunk = match serde_json::from_str(data) {
        Ok(c) => c,
        Err(e) => return Some(Err(ProviderError::Serde(e))),
    };
    if let Some(err) = chunk.error {
        return Some(Err(ProviderError::Api(err.message)));
    }
    let mut fragment = Fragment::default();
    for choice in chunk.choices {
        if let Some(r) = choice.delta.reasoning_content {
            fragment.reasoning.push_str(&r);
        }
        if let Some(c) = choice.delta.content {
            fragment.answer.push_str(&c);
        }
    }
    Some(Ok(fragment))
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }
    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        #[derive(Deserialize)]
        struct Model {
            id: String,
        }
        #[derive(Deserialize)]
        struct Resp {
            data: Vec<Model>,
        }
        let url = format!("{}/models", self.base_url.trim_end_matches('/'));
        let resp: Resp = self
            .authorized(self.client.get(url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.data.into_iter().map(|m| m.id).collect())
    }

    async fn chat_stream(&self, req: ChatRequest) -> Result<FragmentStream, ProviderError> {
        // num_ctx is a server-side setting here; only the window we trim to applies
        let body = Body {
            model: &req.model,
            messages: req
                .messages
                .iter()
                .map(|m| Msg {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            temperature: req.options.temperature,
            stream: true,
        };
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        debug!(model = %req.model, messages = req.messages.len(), "openai chat request");
        let resp = self
            .authorized(self.client.post(url))
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let stream = body_lines(resp.bytes_stream())
            .filter_map(|line| {
                let item = match line {
                    Ok(l) => parse_line(&l),
                    Err(e) => Some(Err(e)),
                };
                futures_util::future::ready(item)
            })
            .boxed();

        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_delta() {
        let f = parse_line(r#"data: {"choices":[{"index":0,"delta":{"content":"Hel"}}]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(f, Fragment::answer("Hel"));
    }

    #[test]
    fn reasoning_delta_under_either_name() {
        let a = parse_line(r#"data: {"choices":[{"delta":{"reasoning_content":"hmm","content":null}}]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(a, Fragment::reasoning("hmm"));
        let b = parse_line(r#"data: {"choices":[{"delta":{"reasoning":"hmm"}}]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(b, Fragment::reasoning("hmm"));
    }

    #[test]
    fn done_and_comments_are_skipped() {
        assert!(parse_line("data: [DONE]").is_none());
        assert!(parse_line(": keep-alive").is_none());
        assert!(parse_line("event: ping").is_none());
    }

    #[test]
    fn finish_chunk_is_an_empty_tick() {
        let f = parse_line(r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(f, Fragment::default());
    }

    #[test]
    fn error_payload() {
        let err = parse_line(r#"data: {"error":{"message":"overloaded"}}"#)
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, ProviderError::Api(ref m) if m == "overloaded"));
    }
}
