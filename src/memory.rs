use crate::estimator::{HeuristicEstimator, TokenEstimator};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemoryError {
    #[error("{0} is empty")]
    EmptyInput(&'static str),
    #[error("context window of {window} tokens is too small")]
    WindowTooSmall { window: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Conversation memory for a single session.
///
/// Two transcripts are kept side by side. The model transcript is what gets
/// sent back to the model and never contains reasoning. The rendered
/// transcript is what the user sees and may embed a reasoning block in each
/// assistant entry. Both hold the same user messages and, after every
/// completed turn, the same number of entries.
#[derive(Debug, Clone)]
pub struct Memory<E = HeuristicEstimator> {
    system: String,
    model: Vec<Message>,
    rendered: Vec<Message>,
    estimator: E,
}

impl Default for Memory<HeuristicEstimator> {
    fn default() -> Self {
        Self::with_estimator(HeuristicEstimator)
    }
}

impl Memory<HeuristicEstimator> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<E: TokenEstimator> Memory<E> {
    pub fn with_estimator(estimator: E) -> Self {
        Self { system: String::new(), model: Vec::new(), rendered: Vec::new(), estimator }
    }

    pub fn set_system_instruction(&mut self, text: &str) -> Result<(), MemoryError> {
        ensure_not_blank(text, "system instruction")?;
        self.system = text.to_string();
        Ok(())
    }

    pub fn system_instruction(&self) -> Message {
        Message::system(self.system.clone())
    }

    pub fn add_user_message(&mut self, text: &str) -> Result<(), MemoryError> {
        ensure_not_blank(text, "user message")?;
        self.model.push(Message::user(text));
        self.rendered.push(Message::user(text));
        Ok(())
    }

    /// Appends an answer, without reasoning, to the model transcript only.
    pub fn add_assistant_message(&mut self, text: &str) -> Result<(), MemoryError> {
        ensure_not_blank(text, "assistant message")?;
        self.model.push(Message::assistant(text));
        Ok(())
    }

    /// Appends a rendered reply, possibly with a reasoning block, to the
    /// rendered transcript only.
    pub fn add_assistant_response(&mut self, text: &str) -> Result<(), MemoryError> {
        ensure_not_blank(text, "assistant response")?;
        self.rendered.push(Message::assistant(text));
        Ok(())
    }

    /// Appends both halves of an assistant turn, or neither.
    pub fn commit_turn(&mut self, rendered: &str, answer: &str) -> Result<(), MemoryError> {
        ensure_not_blank(rendered, "assistant response")?;
        ensure_not_blank(answer, "assistant message")?;
        self.add_assistant_response(rendered)?;
        self.add_assistant_message(answer)
    }

    /// Adds the user message and returns the context for the upcoming call.
    ///
    /// When the context does not fit, the message is withdrawn again and the
    /// memory is exactly as it was before the call.
    pub fn begin_turn(&mut self, text: &str, window: usize) -> Result<Vec<Message>, MemoryError> {
        self.add_user_message(text)?;
        match self.context(window) {
            Ok(context) => Ok(context),
            Err(e) => {
                self.model.pop();
                self.rendered.pop();
                Err(e)
            }
        }
    }

    /// Returns the system instruction followed by the longest recent slice of
    /// the model transcript whose estimated size stays below `window`.
    ///
    /// The slice always starts with a user message. While a user message is
    /// waiting for its reply the slice length is odd.
    pub fn context(&self, window: usize) -> Result<Vec<Message>, MemoryError> {
        let mut used = self.estimator.estimate(&self.system);
        if used > window {
            return Err(MemoryError::WindowTooSmall { window });
        }

        let mut n = 0usize;
        for message in self.model.iter().rev() {
            used += self.estimator.estimate(&message.content);
            if used >= window {
                break;
            }
            n += 1;
        }

        if n > 0 && n % 2 == 0 {
            n -= 1;
        }
        // history ending in an assistant reply: an odd slice would start with it
        if n > 0 && self.model[self.model.len() - n].role != Role::User {
            n -= 1;
        }
        if n == 0 {
            return Err(MemoryError::WindowTooSmall { window });
        }

        debug!(window, kept = n, dropped = self.model.len() - n, "context window computed");
        let mut out = Vec::with_capacity(n + 1);
        out.push(self.system_instruction());
        out.extend_from_slice(&self.model[self.model.len() - n..]);
        Ok(out)
    }

    pub fn rendered_history(&self) -> Vec<Message> {
        self.rendered.clone()
    }

    pub(crate) fn rendered(&self) -> &[Message] {
        &self.rendered
    }

    /// Drops both transcripts. The system instruction is kept.
    pub fn clear(&mut self) {
        self.model.clear();
        self.rendered.clear();
    }

    pub fn len(&self) -> usize {
        self.model.len()
    }

    pub fn is_empty(&self) -> bool {
        self.model.is_empty()
    }
}

fn ensure_not_blank(text: &str, what: &'static str) -> Result<(), MemoryError> {
    if text.trim().is_empty() {
        return Err(MemoryError::EmptyInput(what));
    }
    Ok(())
}
