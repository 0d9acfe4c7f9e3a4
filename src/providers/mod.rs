pub mod ollama;
pub mod openai;
pub mod registry;

use crate::memory::Message;
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("serde: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("api: {0}")]
    Api(String),
    #[error("config: {0}")]
    Config(String),
    #[error("other: {0}")]
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelOptions {
    pub num_ctx: usize,
    pub temperature: f32,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    /// System instruction first, then the bounded history.
    pub messages: Vec<Message>,
    pub think: bool,
    pub options: ModelOptions,
}

/// One streamed item. At most one of the two fields is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    pub reasoning: String,
    pub answer: String,
}

impl Fragment {
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self { reasoning: text.into(), answer: String::new() }
    }
    pub fn answer(text: impl Into<String>) -> Self {
        Self { reasoning: String::new(), answer: text.into() }
    }
}

pub type FragmentStream = BoxStream<'static, Result<Fragment, ProviderError>>;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;
    fn default_model(&self) -> &str;
    async fn list_models(&self) -> Result<Vec<String>, ProviderError>;
    async fn chat_stream(&self, req: ChatRequest) -> Result<FragmentStream, ProviderError>;
}

/// Fails unless the server is reachable and serves `model`.
pub async fn ensure_model_available(
    provider: &dyn LlmProvider,
    model: &str,
) -> Result<(), ProviderError> {
    if model.trim().is_empty() {
        return Err(ProviderError::Config("model name is empty".into()));
    }
    let models = provider.list_models().await?;
    if models.iter().any(|m| m == model) {
        Ok(())
    } else {
        Err(ProviderError::Config(format!(
            "model '{}' not found on {}",
            model,
            provider.name()
        )))
    }
}

/// Splits a byte stream into lines, keeping partial lines across chunks.
#[derive(Debug, Default)]
pub(crate) struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..pos]);
            let text = text.trim_end_matches('\r');
            if !text.trim().is_empty() {
                lines.push(text.to_string());
            }
        }
        lines
    }

    pub(crate) fn finish(self) -> Option<String> {
        let text = String::from_utf8_lossy(&self.buf).trim().to_string();
        if text.is_empty() { None } else { Some(text) }
    }
}

struct LineState<S> {
    body: S,
    decoder: Option<LineDecoder>,
    ready: VecDeque<String>,
}

/// Turns a response body into a stream of non-empty lines.
pub(crate) fn body_lines<S, B>(body: S) -> BoxStream<'static, Result<String, ProviderError>>
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = LineState { body: Box::pin(body), decoder: Some(LineDecoder::default()), ready: VecDeque::new() };
    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(line) = st.ready.pop_front() {
                return Some((Ok(line), st));
            }
            let decoder = st.decoder.as_mut()?;
            match st.body.next().await {
                Some(Ok(chunk)) => {
                    let lines = decoder.push(chunk.as_ref());
                    st.ready.extend(lines);
                }
                Some(Err(e)) => {
                    st.decoder = None;
                    return Some((Err(ProviderError::Http(e)), st));
                }
                None => {
                    if let Some(rest) = st.decoder.take().and_then(LineDecoder::finish) {
                        st.ready.push_back(rest);
                    }
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::sync::Mutex;

    pub enum Script {
        Fragments(Vec<Fragment>),
        /// Yields the fragments, then fails.
        FailAfter(Vec<Fragment>, String),
        /// Yields the fragments, then never ends.
        Stall(Vec<Fragment>),
        /// Fails before any stream is produced.
        Refuse(String),
    }

    /// Replays one script per call and records the requests it saw.
    pub struct MockProvider {
        scripts: Mutex<VecDeque<Script>>,
        pub requests: Mutex<Vec<ChatRequest>>,
        models: Vec<String>,
    }

    impl MockProvider {
        pub fn new(scripts: Vec<Script>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into()),
                requests: Mutex::new(Vec::new()),
                models: vec!["instruct".into(), "thinker".into()],
            }
        }

        pub fn last_request(&self) -> ChatRequest {
            self.requests.lock().unwrap().last().cloned().expect("no request recorded")
        }
    }

    #[async_trait]
    impl LlmProvider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }
        fn default_model(&self) -> &str {
            "instruct"
        }
        async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
            Ok(self.models.clone())
        }
        async fn chat_stream(&self, req: ChatRequest) -> Result<FragmentStream, ProviderError> {
            self.requests.lock().unwrap().push(req);
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Script::Fragments(vec![Fragment::answer("(mock: script exhausted)")]));
            match script {
                Script::Fragments(frags) => Ok(stream::iter(frags.into_iter().map(Ok)).boxed()),
                Script::FailAfter(frags, msg) => {
                    let items = frags
                        .into_iter()
                        .map(Ok)
                        .chain(std::iter::once(Err(ProviderError::Other(msg))));
                    Ok(stream::iter(items).boxed())
                }
                Script::Stall(frags) => {
                    let items = stream::iter(frags.into_iter().map(Ok)).chain(stream::pending());
                    Ok(items.boxed())
                }
                Script::Refuse(msg) => Err(ProviderError::Api(msg)),
            }
        }
    }
}
