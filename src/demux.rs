use crate::estimator::{HeuristicEstimator, TokenEstimator};
use crate::memory::{Memory, MemoryError, Message};
use crate::providers::{Fragment, ProviderError};
use futures_util::{Stream, StreamExt};
use std::future::Future;
use tracing::{debug, warn};

/// Stored in the model transcript when a turn produced no answer text.
pub const NO_RESPONSE: &str = "[no response]";
pub const CANCELLED: &str = "[cancelled]";

/// Wraps accumulated reasoning in a collapsible block. Re-rendered whole on
/// every update so the markers stay balanced.
pub fn reasoning_block(reasoning: &str) -> String {
    format!("<details>\n<summary>Thinking process</summary>\n{reasoning}\n</details>\n\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    AwaitingFirstFragment,
    AccumulatingReasoning,
    AccumulatingAnswer,
    Committed,
}

/// What a caller can render after each processed item.
#[derive(Debug)]
pub struct Progress<'a> {
    pub state: TurnState,
    pub reasoning: &'a str,
    pub answer: &'a str,
    /// The in-progress rendered assistant message.
    pub pending: &'a Message,
    /// Rendered history committed so far, ending with this turn's user message.
    pub history: &'a [Message],
}

impl Progress<'_> {
    /// Full rendered transcript including the in-progress reply.
    pub fn snapshot(&self) -> Vec<Message> {
        let mut out = self.history.to_vec();
        out.push(self.pending.clone());
        out
    }
}

/// What ended up in memory for a finished turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub rendered: String,
    pub answer: String,
    /// `[ERROR] ...` or `[cancelled]` when the turn was broken off.
    pub marker: Option<String>,
}

impl TurnOutcome {
    pub fn interrupted(&self) -> bool {
        self.marker.is_some()
    }
}

/// Splits one model reply into the rendered transcript (reasoning block plus
/// answer) and the model transcript (answer only).
///
/// One instance per turn: `commit` consumes it.
#[derive(Debug)]
pub struct Demultiplexer {
    think: bool,
    state: TurnState,
    reasoning: String,
    answer: String,
    rendered: Message,
    marker: Option<String>,
}

impl Demultiplexer {
    pub fn new(think: bool) -> Self {
        Self {
            think,
            state: TurnState::AwaitingFirstFragment,
            reasoning: String::new(),
            answer: String::new(),
            rendered: Message::assistant(String::new()),
            marker: None,
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn push(&mut self, fragment: Fragment) {
        if self.marker.is_some() || self.state == TurnState::Committed {
            return;
        }
        if !fragment.reasoning.is_empty() {
            self.push_reasoning(&fragment.reasoning);
        }
        if !fragment.answer.is_empty() {
            self.answer.push_str(&fragment.answer);
            self.rendered.content.push_str(&fragment.answer);
            self.state = TurnState::AccumulatingAnswer;
        }
    }

    fn push_reasoning(&mut self, text: &str) {
        if !self.think {
            debug!("reasoning fragment ignored, think is off");
            return;
        }
        if self.state == TurnState::AccumulatingAnswer {
            warn!("reasoning fragment after answer started, ignored");
            return;
        }
        self.reasoning.push_str(text);
        self.rendered.content = reasoning_block(&self.reasoning);
        self.state = TurnState::AccumulatingReasoning;
    }

    /// Marks the turn as broken off. Nothing is accepted afterwards.
    pub fn fail(&mut self, reason: &str) {
        self.interrupt(format!("[ERROR] {reason}"));
    }

    pub fn cancel(&mut self) {
        self.interrupt(CANCELLED.to_string());
    }

    fn interrupt(&mut self, marker: String) {
        if self.marker.is_some() {
            return;
        }
        if !self.rendered.content.is_empty() {
            self.rendered.content.push_str("\n\n");
        }
        self.rendered.content.push_str(&marker);
        self.marker = Some(marker);
    }

    pub fn progress<'a>(&'a self, history: &'a [Message]) -> Progress<'a> {
        Progress {
            state: self.state,
            reasoning: &self.reasoning,
            answer: &self.answer,
            pending: &self.rendered,
            history,
        }
    }

    /// Writes the turn to both transcripts in one step.
    pub fn commit<E: TokenEstimator>(
        mut self,
        memory: &mut Memory<E>,
    ) -> Result<TurnOutcome, MemoryError> {
        let rendered = if self.rendered.content.trim().is_empty() {
            NO_RESPONSE.to_string()
        } else {
            std::mem::take(&mut self.rendered.content)
        };
        let answer = if self.answer.trim().is_empty() {
            NO_RESPONSE.to_string()
        } else {
            std::mem::take(&mut self.answer)
        };
        memory.commit_turn(&rendered, &answer)?;
        self.state = TurnState::Committed;
        debug!(
            rendered_len = rendered.len(),
            answer_len = answer.len(),
            marker = ?self.marker,
            "turn committed"
        );
        Ok(TurnOutcome { rendered, answer, marker: self.marker })
    }

    pub async fn consume<S, E, F>(
        self,
        stream: S,
        memory: &mut Memory<E>,
        on_progress: F,
    ) -> Result<TurnOutcome, MemoryError>
    where
        S: Stream<Item = Result<Fragment, ProviderError>>,
        E: TokenEstimator,
        F: FnMut(&Progress<'_>),
    {
        self.consume_until(stream, memory, std::future::pending::<()>(), on_progress)
            .await
    }

    /// Drives `stream` to the end, or until `cancel` resolves, then commits.
    pub async fn consume_until<S, E, C, F>(
        self,
        stream: S,
        memory: &mut Memory<E>,
        cancel: C,
        on_progress: F,
    ) -> Result<TurnOutcome, MemoryError>
    where
        S: Stream<Item = Result<Fragment, ProviderError>>,
        E: TokenEstimator,
        C: Future<Output = ()>,
        F: FnMut(&Progress<'_>),
    {
        let mut turn = Turn::new(self, memory);
        turn.drive(stream, cancel, on_progress).await;
        turn.commit()
    }
}

/// A turn in flight: the demultiplexer plus the memory it commits into.
///
/// Dropping it before `commit` (a timed-out or aborted future) commits what
/// arrived so far with a `[cancelled]` marker, so the user message never
/// stays without a reply.
pub struct Turn<'m, E: TokenEstimator = HeuristicEstimator> {
    demux: Demultiplexer,
    memory: &'m mut Memory<E>,
    committed: bool,
}

impl<'m, E: TokenEstimator> Turn<'m, E> {
    /// `memory` must already hold this turn's user message.
    pub fn new(demux: Demultiplexer, memory: &'m mut Memory<E>) -> Self {
        Self { demux, memory, committed: false }
    }

    pub fn tick<F: FnMut(&Progress<'_>)>(&self, on_progress: &mut F) {
        on_progress(&self.demux.progress(self.memory.rendered()));
    }

    pub fn fail<F: FnMut(&Progress<'_>)>(&mut self, reason: &str, on_progress: &mut F) {
        self.demux.fail(reason);
        self.tick(on_progress);
    }

    pub fn cancel<F: FnMut(&Progress<'_>)>(&mut self, on_progress: &mut F) {
        self.demux.cancel();
        self.tick(on_progress);
    }

    /// Feeds `stream` through the demultiplexer until it ends, fails, or
    /// `cancel` resolves.
    pub async fn drive<S, C, F>(&mut self, stream: S, cancel: C, mut on_progress: F)
    where
        S: Stream<Item = Result<Fragment, ProviderError>>,
        C: Future<Output = ()>,
        F: FnMut(&Progress<'_>),
    {
        let mut stream = std::pin::pin!(stream);
        let mut cancel = std::pin::pin!(cancel);
        loop {
            let item = tokio::select! {
                biased;
                _ = &mut cancel => {
                    debug!("turn cancelled");
                    self.cancel(&mut on_progress);
                    return;
                }
                item = stream.next() => item,
            };
            match item {
                Some(Ok(fragment)) => {
                    self.demux.push(fragment);
                    self.tick(&mut on_progress);
                }
                Some(Err(e)) => {
                    warn!(error = %e, "model stream failed mid-turn");
                    self.fail(&e.to_string(), &mut on_progress);
                    return;
                }
                None => return,
            }
        }
    }

    pub fn commit(mut self) -> Result<TurnOutcome, MemoryError> {
        self.committed = true;
        let demux = std::mem::replace(&mut self.demux, Demultiplexer::new(false));
        demux.commit(&mut *self.memory)
    }
}

impl<E: TokenEstimator> Drop for Turn<'_, E> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut demux = std::mem::replace(&mut self.demux, Demultiplexer::new(false));
        demux.cancel();
        match demux.commit(&mut *self.memory) {
            Ok(_) => debug!("dropped turn committed as cancelled"),
            Err(e) => warn!(error = %e, "dropped turn could not be committed"),
        }
    }
}
