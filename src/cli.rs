use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "ollama-chat", author, version, about = "Terminal chat for Ollama and OpenAI-compatible models", long_about = None)]
pub struct Cli {
    /// Optional path to a config file (toml)
    #[arg(short, long)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Chat with a model (interactive unless --prompt is given)
    Chat(ChatArgs),
    /// List models for a provider
    ListModels(ListModelsArgs),
    /// Show available providers
    Providers,
    /// Print the default config path
    ConfigPath,
    /// Create an example config file if missing
    InitConfig,
}

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Provider key: ollama | openai (defaults to the config's model.provider)
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Model used when thinking is off
    #[arg(short, long)]
    pub model: Option<String>,

    /// Model used when thinking is on (defaults to --model)
    #[arg(long)]
    pub thinking_model: Option<String>,

    /// Start with thinking enabled
    #[arg(long)]
    pub think: bool,

    /// Context window in tokens (>= 2048)
    #[arg(long, value_name = "TOKENS")]
    pub num_ctx: Option<usize>,

    /// Temperature (0.0 - 1.0)
    #[arg(long)]
    pub temperature: Option<f32>,

    /// System prompt; overrides the configured one
    #[arg(long)]
    pub system: Option<String>,

    /// Send a single message and exit
    #[arg(long)]
    pub prompt: Option<String>,

    /// Export the conversation to this file on exit (md|json|html by extension)
    #[arg(long)]
    pub export: Option<String>,

    /// Skip checking that the models are served before chatting
    #[arg(long)]
    pub no_check: bool,
}

#[derive(Args, Debug)]
pub struct ListModelsArgs {
    /// Provider key: ollama | openai
    #[arg(short, long)]
    pub provider: Option<String>,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_flags() {
        let cli = <Cli as Parser>::try_parse_from([
            "ollama-chat",
            "chat",
            "--think",
            "--num-ctx",
            "4096",
            "--temperature",
            "0.3",
            "--prompt",
            "Hi",
        ])
        .unwrap();
        match cli.command {
            Commands::Chat(args) => {
                assert!(args.think);
                assert_eq!(args.num_ctx, Some(4096));
                assert_eq!(args.temperature, Some(0.3));
                assert_eq!(args.prompt.as_deref(), Some("Hi"));
                assert!(args.provider.is_none());
            }
            other => panic!("expected chat, got {other:?}"),
        }
    }

    #[test]
    fn verifies_clap_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
