use crate::demux::{Demultiplexer, Progress, Turn, TurnOutcome};
use crate::memory::{Memory, MemoryError, Message};
use crate::providers::{ChatRequest, LlmProvider, ModelOptions};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Smallest context window a session accepts.
pub const MIN_NUM_CTX: usize = 2048;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error("invalid setting: {0}")]
    InvalidSetting(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    pub instruct_model: String,
    pub thinking_model: String,
    pub num_ctx: usize,
    pub temperature: f32,
}

impl ChatSettings {
    pub fn validate(&self) -> Result<(), SessionError> {
        validate_num_ctx(self.num_ctx)?;
        validate_temperature(self.temperature)
    }

    pub fn model_for(&self, think: bool) -> &str {
        if think { &self.thinking_model } else { &self.instruct_model }
    }

    fn options(&self) -> ModelOptions {
        ModelOptions { num_ctx: self.num_ctx, temperature: self.temperature }
    }
}

fn validate_num_ctx(num_ctx: usize) -> Result<(), SessionError> {
    if num_ctx < MIN_NUM_CTX {
        return Err(SessionError::InvalidSetting(format!(
            "num_ctx={num_ctx} is below {MIN_NUM_CTX}"
        )));
    }
    Ok(())
}

fn validate_temperature(temperature: f32) -> Result<(), SessionError> {
    if !(0.0..=1.0).contains(&temperature) {
        return Err(SessionError::InvalidSetting(format!(
            "temperature={temperature} is not between 0.0 and 1.0"
        )));
    }
    Ok(())
}

/// One conversation: its memory, the model collaborator and the current
/// settings. Sessions share nothing mutable with each other.
pub struct Session {
    memory: Memory,
    provider: Arc<dyn LlmProvider>,
    settings: ChatSettings,
    defaults: ChatSettings,
    default_system: String,
}

impl Session {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        settings: ChatSettings,
        system_prompt: &str,
    ) -> Result<Self, SessionError> {
        settings.validate()?;
        let mut memory = Memory::new();
        memory.set_system_instruction(system_prompt)?;
        Ok(Self {
            memory,
            provider,
            defaults: settings.clone(),
            settings,
            default_system: system_prompt.to_string(),
        })
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn history(&self) -> Vec<Message> {
        self.memory.rendered_history()
    }

    pub fn clear(&mut self) {
        self.memory.clear();
    }

    /// Applies new settings. A blank system prompt restores the default one.
    /// Nothing changes unless every value is valid.
    pub fn save_settings(
        &mut self,
        system_prompt: &str,
        num_ctx: usize,
        temperature: f32,
    ) -> Result<(), SessionError> {
        validate_num_ctx(num_ctx)?;
        validate_temperature(temperature)?;
        let system = if system_prompt.trim().is_empty() {
            self.default_system.as_str()
        } else {
            system_prompt
        };
        self.memory.set_system_instruction(system)?;
        self.settings.num_ctx = num_ctx;
        self.settings.temperature = temperature;
        info!(num_ctx, temperature, "settings saved");
        Ok(())
    }

    pub fn reset_settings(&mut self) -> Result<(), SessionError> {
        self.memory.set_system_instruction(&self.default_system)?;
        self.settings = self.defaults.clone();
        info!("settings reset");
        Ok(())
    }

    pub async fn send<F>(
        &mut self,
        text: &str,
        think: bool,
        on_progress: F,
    ) -> Result<TurnOutcome, SessionError>
    where
        F: FnMut(&Progress<'_>),
    {
        self.send_until(text, think, std::future::pending::<()>(), on_progress)
            .await
    }

    /// Runs one turn. Fails without touching memory when the input is empty
    /// or does not fit the window; once the request is out, every outcome
    /// (errors, cancellation, a dropped future) is committed as a turn.
    pub async fn send_until<C, F>(
        &mut self,
        text: &str,
        think: bool,
        cancel: C,
        mut on_progress: F,
    ) -> Result<TurnOutcome, SessionError>
    where
        C: Future<Output = ()>,
        F: FnMut(&Progress<'_>),
    {
        let context = self.memory.begin_turn(text, self.settings.num_ctx)?;
        let req = ChatRequest {
            model: self.settings.model_for(think).to_string(),
            messages: context,
            think,
            options: self.settings.options(),
        };

        let mut turn = Turn::new(Demultiplexer::new(think), &mut self.memory);
        turn.tick(&mut on_progress);

        let mut cancel = std::pin::pin!(cancel);
        let opened = tokio::select! {
            biased;
            _ = &mut cancel => None,
            res = self.provider.chat_stream(req) => Some(res),
        };
        match opened {
            Some(Ok(stream)) => turn.drive(stream, cancel, &mut on_progress).await,
            Some(Err(e)) => {
                warn!(provider = self.provider.name(), error = %e, "model call failed");
                turn.fail(&e.to_string(), &mut on_progress);
            }
            None => turn.cancel(&mut on_progress),
        }
        Ok(turn.commit()?)
    }
}
