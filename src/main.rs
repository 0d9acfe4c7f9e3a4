use anyhow::{Context, Result};
use colored::*;
use ollama_chat::cli::{ChatArgs, Cli, Commands};
use ollama_chat::config::Config;
use ollama_chat::providers::{self, registry::ProviderRegistry};
use ollama_chat::session::{ChatSettings, Session};
use ollama_chat::{export, repl};
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let cfg = Config::load(cli.config.as_deref())?;

    let registry = ProviderRegistry::from_config(&cfg)?;

    match cli.command {
        Commands::Chat(cmd) => run_chat(cmd, &cfg, &registry).await?,
        Commands::ListModels(cmd) => {
            let key = cmd.provider.unwrap_or_else(|| cfg.provider_key());
            let provider = registry.get(&key)?;
            let models = provider
                .list_models()
                .await
                .with_context(|| format!("listing models from {key}"))?;
            for m in models {
                println!("{}", m);
            }
        }
        Commands::Providers => {
            println!("{}", "Available providers:".bold());
            for key in registry.list() {
                match registry.get(&key) {
                    Ok(p) => println!("- {} (default model {})", key, p.default_model()),
                    Err(_) => println!("- {}", key),
                }
            }
        }
        Commands::ConfigPath => {
            println!("{}", Config::default_path()?.display());
        }
        Commands::InitConfig => {
            let path = Config::write_example_if_absent()?;
            println!("Wrote example config to {}", path.display());
        }
    }

    Ok(())
}

async fn run_chat(cmd: ChatArgs, cfg: &Config, registry: &ProviderRegistry) -> Result<()> {
    let key = cmd.provider.clone().unwrap_or_else(|| cfg.provider_key());
    let provider = registry.get(&key)?;

    let instruct_model = cmd
        .model
        .clone()
        .or_else(|| cfg.instruct_model())
        .unwrap_or_else(|| provider.default_model().to_string());
    let thinking_model = cmd
        .thinking_model
        .clone()
        .or_else(|| cmd.model.clone())
        .or_else(|| cfg.thinking_model())
        .unwrap_or_else(|| instruct_model.clone());
    let settings = ChatSettings {
        instruct_model,
        thinking_model,
        num_ctx: cmd.num_ctx.unwrap_or_else(|| cfg.num_ctx()),
        temperature: cmd.temperature.unwrap_or_else(|| cfg.temperature()),
    };

    if !cmd.no_check {
        let mut models = vec![&settings.instruct_model];
        if settings.thinking_model != settings.instruct_model {
            models.push(&settings.thinking_model);
        }
        for model in models {
            providers::ensure_model_available(provider.as_ref(), model)
                .await
                .with_context(|| format!("checking {key} for model '{model}'"))?;
        }
    }

    let system = match cmd.system.clone() {
        Some(s) => s,
        None => cfg.system_prompt()?,
    };
    let mut session = Session::new(provider, settings, &system)?;
    tracing::info!(provider = %key, "session started");

    match cmd.prompt.as_deref() {
        Some(prompt) => {
            repl::turn(&mut session, prompt, cmd.think).await?;
            if let Some(path) = cmd.export.as_deref() {
                export::save(Path::new(path), &session.history())?;
            }
        }
        None => repl::run(&mut session, cmd.think, cmd.export.as_deref()).await?,
    }
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "ollama_chat=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
