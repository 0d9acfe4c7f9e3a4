//! Streaming terminal chat over Ollama and OpenAI-compatible servers with a
//! token-budgeted conversation memory.

pub mod cli;
pub mod config;
pub mod demux;
pub mod estimator;
pub mod export;
pub mod memory;
pub mod providers;
pub mod repl;
pub mod session;
