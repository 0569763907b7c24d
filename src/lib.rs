pub mod config;
pub mod logging;
pub mod model;
pub mod model_gateway;
pub mod providers;
pub mod repl;
pub mod server;
pub mod shutdown;
pub mod suggest;
pub mod terminal;
pub mod transcript;

use anyhow::{Context, Result};
use reqwest::Client;
use std::env;
use std::sync::Arc;
use tracing::info;

use config::Config;
use model::ModelRequest;
use model_gateway::{GeminiGateway, ModelGateway};
use repl::run_repl;
use server::AppState;
use shutdown::Shutdown;

/// What the binary was asked to do, parsed from its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Repl,
    Serve { addr: Option<String> },
    Prompt(String),
}

impl Command {
    pub fn parse(args: &[String]) -> Self {
        match args {
            [] => Self::Repl,
            [first, rest @ ..] if first == "serve" && rest.len() <= 1 => Self::Serve {
                addr: rest.first().cloned(),
            },
            _ => Self::Prompt(args.join(" ")),
        }
    }
}

pub async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init();

    let cfg = Config::from_env();
    info!(
        model = %cfg.model,
        model_base_url = %cfg.model_base_url,
        model_timeout_secs = cfg.model_timeout_secs,
        stream_timeout_secs = cfg.stream_timeout_secs,
        max_history_turns = cfg.max_history_turns,
        "loaded runtime configuration"
    );
    cfg.require_api_key()?;

    let client = Client::builder()
        .build()
        .context("Failed to initialize HTTP client")?;
    let cfg = Arc::new(cfg);
    let gateway = Arc::new(GeminiGateway::new(client, cfg.clone()));

    let args: Vec<String> = env::args().skip(1).collect();
    match Command::parse(&args) {
        Command::Repl => {
            let shutdown = Shutdown::install();
            tokio::spawn(async move {
                shutdown.wait().await;
                println!("\n{}", terminal::paint(terminal::CYAN, "Bye!"));
                std::process::exit(0);
            });
            run_repl(gateway.as_ref(), &cfg).await
        }
        Command::Serve { addr } => {
            let addr = addr.unwrap_or_else(|| cfg.server_addr.clone());
            server::serve(AppState::new(gateway, cfg), &addr).await
        }
        Command::Prompt(prompt) => {
            let mut conversation =
                transcript::Transcript::new(&cfg.system_prompt, cfg.max_history_turns);
            conversation.push_user(prompt);
            let reply = gateway
                .generate(ModelRequest {
                    model: cfg.model.clone(),
                    contents: conversation.turns().to_vec(),
                })
                .await?;
            println!("{}", reply.text.trim());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Command;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn no_arguments_starts_repl() {
        assert_eq!(Command::parse(&[]), Command::Repl);
    }

    #[test]
    fn serve_takes_optional_address() {
        assert_eq!(
            Command::parse(&args(&["serve"])),
            Command::Serve { addr: None }
        );
        assert_eq!(
            Command::parse(&args(&["serve", "127.0.0.1:9000"])),
            Command::Serve {
                addr: Some("127.0.0.1:9000".to_string())
            }
        );
    }

    #[test]
    fn other_arguments_form_a_one_shot_prompt() {
        assert_eq!(
            Command::parse(&args(&["what", "is", "dharma?"])),
            Command::Prompt("what is dharma?".to_string())
        );
        assert_eq!(
            Command::parse(&args(&["serve", "the", "seeker"])),
            Command::Prompt("serve the seeker".to_string())
        );
    }
}
